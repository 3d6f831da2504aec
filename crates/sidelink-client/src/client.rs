//! Client façade: lifecycle and outbound traffic.
//!
//! [`SideClientBuilder`] collects the config and the method registrations;
//! [`SideClient`] drives the connection and the background dispatch loop.
//! All connection-lifecycle state (`connected`, `authenticated`, auth mode,
//! recorded server name) lives here in one owned session struct — the
//! dispatch loop and `send_packet` only borrow read/write access.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rmpv::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use sidelink_core::error::Result;
use sidelink_core::protocol::{Envelope, MessageCode};

use crate::config::ClientConfig;
use crate::connection::{Connection, WriteHandle};
use crate::dispatch::{self, DispatchContext, LoopState, StateCell, SERVER_NAME_NOT_SET};
use crate::registry::{MethodArgs, MethodHandler, MethodRegistry, ParamSpec};
use crate::storage::FileSink;

/// Fluent builder for a [`SideClient`].
pub struct SideClientBuilder {
    cfg: ClientConfig,
    registry: MethodRegistry,
}

impl SideClientBuilder {
    pub fn new(cfg: ClientConfig) -> Self {
        Self {
            cfg,
            registry: MethodRegistry::new(),
        }
    }

    /// Register a method handler under its plain name.
    pub fn method<F, Fut>(self, name: &str, params: Vec<ParamSpec>, f: F) -> Self
    where
        F: Fn(MethodArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.registry.register_fn(name, params, f);
        self
    }

    /// Register a handler object under its plain name.
    pub fn handler(self, name: &str, handler: Arc<dyn MethodHandler>) -> Self {
        self.registry.register(name, handler);
        self
    }

    /// Register a capability by its `net_`-prefixed convention name; names
    /// outside the convention are ignored with a warning.
    pub fn capability(self, raw_name: &str, handler: Arc<dyn MethodHandler>) -> Self {
        if !self.registry.register_prefixed(raw_name, handler) {
            warn!(raw_name, "capability name outside convention, ignored");
        }
        self
    }

    pub fn build(self) -> SideClient {
        let auth_lp = self.cfg.auth.use_login_password;
        SideClient {
            inner: Arc::new(ClientInner {
                cfg: self.cfg,
                registry: Arc::new(self.registry),
                writer: WriteHandle::detached(),
                connected: AtomicBool::new(false),
                authenticated: AtomicBool::new(false),
                auth_lp: Arc::new(AtomicBool::new(auth_lp)),
                server_name: Arc::new(Mutex::new(SERVER_NAME_NOT_SET.to_string())),
                loop_state: Arc::new(StateCell::default()),
                task: Mutex::new(None),
            }),
        }
    }
}

struct ClientInner {
    cfg: ClientConfig,
    registry: Arc<MethodRegistry>,
    writer: WriteHandle,
    connected: AtomicBool,
    authenticated: AtomicBool,
    auth_lp: Arc<AtomicBool>,
    server_name: Arc<Mutex<String>>,
    loop_state: Arc<StateCell>,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

/// Push-channel client over one persistent connection.
#[derive(Clone)]
pub struct SideClient {
    inner: Arc<ClientInner>,
}

impl SideClient {
    pub fn builder(cfg: ClientConfig) -> SideClientBuilder {
        SideClientBuilder::new(cfg)
    }

    /// Open the connection and start the dispatch loop as a background
    /// task. No-op when already connected.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.connected.load(Ordering::SeqCst) {
            debug!("connect called while already connected");
            return Ok(());
        }

        let cfg = &self.inner.cfg;
        let conn = Connection::open(
            &cfg.server.host,
            cfg.server.port,
            cfg.limits.max_frame_bytes,
        )
        .await?;
        let (reader, write_half) = conn.into_parts();
        self.inner.writer.attach(write_half).await;

        let ctx = DispatchContext {
            registry: self.inner.registry.clone(),
            writer: self.inner.writer.clone(),
            sink: FileSink::new(cfg.storage.content_root.clone()),
            auth: cfg.auth.clone(),
            auth_lp: self.inner.auth_lp.clone(),
            server_name: self.inner.server_name.clone(),
            state: self.inner.loop_state.clone(),
        };

        let handle = tokio::spawn(dispatch::run(reader, ctx));
        *self.inner.task.lock().await = Some(handle);
        self.inner.connected.store(true, Ordering::SeqCst);
        debug!(host = %cfg.server.host, port = cfg.server.port, "connected");
        Ok(())
    }

    /// Close the connection and stop the dispatch loop. Idempotent: calling
    /// it while already disconnected does nothing and does not fail.
    pub async fn disconnect(&self) -> Result<()> {
        self.inner.connected.store(false, Ordering::SeqCst);

        let task = self.inner.task.lock().await.take();
        if let Some(handle) = task {
            self.inner.loop_state.set(LoopState::Stopping);
            handle.abort();
            match handle.await {
                // Cancellation is the expected shutdown path.
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(%e, "dispatch task ended abnormally"),
                // The loop may already have stopped on a stream error;
                // that terminal error was logged by the loop itself.
                Ok(_) => {}
            }
            self.inner.loop_state.set(LoopState::Stopped);
        }

        self.inner.writer.close().await?;
        self.inner.authenticated.store(false, Ordering::SeqCst);
        debug!("disconnected");
        Ok(())
    }

    /// Build, serialize, frame, and write one outbound envelope. This path
    /// is independent of the dispatch loop's read side; writes are
    /// serialized by the shared write handle. Fails with `StreamNotSet`
    /// when no connection is open.
    pub async fn send_packet(
        &self,
        code: MessageCode,
        fields: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<()> {
        let mut envelope = Envelope::new(code);
        for (name, value) in fields {
            envelope = envelope.field(name, value);
        }
        self.send_envelope(envelope).await
    }

    /// Like [`send_packet`](Self::send_packet) for a pre-built envelope.
    pub async fn send_envelope(&self, envelope: Envelope) -> Result<()> {
        let payload = envelope.serialize()?;
        self.inner.writer.write_frame(&payload).await
    }

    /// True iff the connection is open *and* authenticated.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
            && self.inner.authenticated.load(Ordering::SeqCst)
    }

    /// Select which auth-answer variant replies to a challenge:
    /// login/password (`true`) or registration (`false`).
    pub fn set_auth_lp(&self, value: bool) {
        self.inner.auth_lp.store(value, Ordering::SeqCst);
    }

    pub fn get_auth_lp(&self) -> bool {
        self.inner.auth_lp.load(Ordering::SeqCst)
    }

    /// The protocol carries no auth confirmation message; the application
    /// flips this flag when its own exchange completes.
    pub fn set_authenticated(&self, value: bool) {
        self.inner.authenticated.store(value, Ordering::SeqCst);
    }

    /// Server name recorded from the last auth challenge.
    pub async fn server_name(&self) -> String {
        self.inner.server_name.lock().await.clone()
    }

    /// Observable dispatch-loop state.
    pub fn loop_state(&self) -> LoopState {
        self.inner.loop_state.get()
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.inner.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> SideClient {
        SideClient::builder(ClientConfig::for_server("127.0.0.1", 9))
            .method("echo", vec![], |_args| async { Ok(()) })
            .build()
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_idempotent() {
        let client = test_client();
        assert!(!client.is_connected());
        client.disconnect().await.unwrap();
        client.disconnect().await.unwrap();
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn send_packet_without_connection_is_usage_error() {
        let client = test_client();
        let err = client
            .send_packet(MessageCode::ReqNet, std::iter::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SidelinkError::StreamNotSet));
    }

    #[tokio::test]
    async fn is_connected_requires_both_flags() {
        let client = test_client();
        // authenticated alone is not enough
        client.set_authenticated(true);
        assert!(!client.is_connected());
    }

    #[test]
    fn auth_mode_defaults_from_config_and_toggles() {
        let client = test_client();
        assert!(client.get_auth_lp());
        client.set_auth_lp(false);
        assert!(!client.get_auth_lp());
    }

    #[test]
    fn builder_registers_methods() {
        let client = test_client();
        assert_eq!(
            client.registry().registered_methods(),
            vec!["echo".to_string()]
        );
    }
}

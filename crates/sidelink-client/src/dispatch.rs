//! Dispatch loop: the continuous read-classify-route cycle over one
//! connection.
//!
//! Each step reads one framed envelope, classifies it by `code`, and routes
//! it to the method registry, the log sink, the auth responder, or the file
//! sink. Per-frame problems (decode failures, unknown codes, registry
//! misses, handler errors) are logged and skipped — availability of the
//! long-lived connection wins over strict error visibility. Only
//! stream-level failures terminate the loop; they become the background
//! task's terminal error.
//!
//! States: `Idle -> Running -> Stopping -> Stopped`. The façade drives
//! `Stopping`/`Stopped` when it cancels the task; the loop itself only
//! moves `Running -> Stopped` on a fatal error.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use rmpv::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use sidelink_core::error::{Result, SidelinkError};
use sidelink_core::protocol::{Envelope, MessageCode};

use crate::config::AuthSection;
use crate::connection::{FrameReader, WriteHandle};
use crate::registry::MethodRegistry;
use crate::storage::FileSink;

/// Sentinel recorded until an auth challenge names the peer.
pub const SERVER_NAME_NOT_SET: &str = "not set";

/// Observable dispatch-loop state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LoopState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            3 => LoopState::Stopped,
            _ => LoopState::Idle,
        }
    }
}

/// Atomic cell the loop and the façade both observe.
#[derive(Debug, Default)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: LoopState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Everything one dispatch step can touch, borrowed from the façade.
pub(crate) struct DispatchContext {
    pub registry: Arc<MethodRegistry>,
    pub writer: WriteHandle,
    pub sink: FileSink,
    pub auth: AuthSection,
    pub auth_lp: Arc<AtomicBool>,
    pub server_name: Arc<Mutex<String>>,
    pub state: Arc<StateCell>,
}

/// Run the loop until a stream-level failure or external cancellation.
pub(crate) async fn run(mut reader: FrameReader, ctx: DispatchContext) -> Result<()> {
    ctx.state.set(LoopState::Running);

    let result = loop {
        let payload = match reader.read_frame().await {
            Ok(p) => p,
            Err(e) => break Err(e),
        };

        let envelope = match Envelope::deserialize(&payload) {
            Ok(env) => env,
            Err(e) => {
                error!(%e, "dropping malformed frame");
                continue;
            }
        };

        if let Err(e) = dispatch_envelope(envelope, &ctx).await {
            // Only the auth answer writes from inside the loop; a failure
            // there is connection-level.
            break Err(e);
        }
    };

    ctx.state.set(LoopState::Stopped);
    if let Err(e) = &result {
        info!(%e, "dispatch loop stopped");
    }
    result
}

/// One classify-and-route step. Per-frame errors are consumed here; only
/// write failures escape.
async fn dispatch_envelope(env: Envelope, ctx: &DispatchContext) -> Result<()> {
    let Some(code) = env.message_code() else {
        let e = SidelinkError::UnknownCode(env.code());
        error!(%e, "dropping frame with unknown code");
        return Ok(());
    };

    match code {
        MessageCode::ReqNet => {
            let Some(method) = env.get_str("type") else {
                error!("net request without method type");
                return Ok(());
            };
            if let Err(e) = ctx.registry.invoke(method, env.fields()).await {
                error!(method, %e, "net method dispatch failed");
            }
        }

        MessageCode::ReqLogDebug
        | MessageCode::ReqLogInfo
        | MessageCode::ReqLogWarning
        | MessageCode::ReqLogError => forward_log(code, &env),

        MessageCode::ReqAuth => answer_auth(&env, ctx).await?,

        MessageCode::ReqFileDownload => store_chunk(&env, ctx).await,

        MessageCode::AnswerAuthAlp | MessageCode::AnswerAuthReg => {
            // Answer codes only ever travel client -> server.
            warn!(code = env.code(), "auth answer code arrived from server");
        }
    }

    Ok(())
}

/// Forward a leveled log push to the local tracing sink.
fn forward_log(code: MessageCode, env: &Envelope) {
    let Some(message) = env.get_str("message") else {
        warn!(envelope = ?env, "log push without message field");
        return;
    };
    match code {
        MessageCode::ReqLogDebug => debug!(remote = true, "{message}"),
        MessageCode::ReqLogInfo => info!(remote = true, "{message}"),
        MessageCode::ReqLogWarning => warn!(remote = true, "{message}"),
        _ => error!(remote = true, "{message}"),
    }
}

/// Record the challenger's name and send back the configured credentials in
/// the shape the auth mode selects.
async fn answer_auth(env: &Envelope, ctx: &DispatchContext) -> Result<()> {
    let server_name = env.get_str("server_name").unwrap_or(SERVER_NAME_NOT_SET);
    *ctx.server_name.lock().await = server_name.to_string();

    let code = if ctx.auth_lp.load(Ordering::SeqCst) {
        MessageCode::AnswerAuthAlp
    } else {
        MessageCode::AnswerAuthReg
    };

    let answer = Envelope::new(code)
        .field("login", Value::from(ctx.auth.login.as_str()))
        .field("password", Value::from(ctx.auth.password.as_str()));

    let payload = match answer.serialize() {
        Ok(p) => p,
        Err(e) => {
            error!(%e, "auth answer serialization failed");
            return Ok(());
        }
    };

    debug!(server_name, answer = ?code, "answering auth challenge");
    ctx.writer.write_frame(&payload).await
}

/// Persist one file chunk. Skips with a debug log when either required
/// field is missing; write failures are logged, never propagated.
async fn store_chunk(env: &Envelope, ctx: &DispatchContext) {
    let file_name = env.get_str("file_name");
    let chunk = env.get_bin("chunk");
    let (Some(file_name), Some(chunk)) = (file_name, chunk) else {
        debug!("file push missing file_name or chunk, skipped");
        return;
    };

    let server_name = ctx.server_name.lock().await.clone();
    match ctx.sink.write_chunk(&server_name, file_name, chunk).await {
        Ok(path) => debug!(?path, bytes = chunk.len(), "stored file chunk"),
        Err(e) => error!(file_name, %e, "file chunk write failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_ctx(sink_root: &std::path::Path) -> DispatchContext {
        DispatchContext {
            registry: Arc::new(MethodRegistry::new()),
            writer: WriteHandle::detached(),
            sink: FileSink::new(sink_root),
            auth: AuthSection {
                login: "user".into(),
                password: "secret".into(),
                use_login_password: true,
            },
            auth_lp: Arc::new(AtomicBool::new(true)),
            server_name: Arc::new(Mutex::new(SERVER_NAME_NOT_SET.to_string())),
            state: Arc::new(StateCell::default()),
        }
    }

    #[tokio::test]
    async fn unknown_code_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let env = Envelope::with_raw_code(999);
        assert!(!SidelinkError::UnknownCode(env.code()).is_fatal());
        dispatch_envelope(env, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_method_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let env = Envelope::new(MessageCode::ReqNet)
            .field("type", Value::from("doesNotExist"));
        dispatch_envelope(env, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn log_push_without_message_is_non_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        dispatch_envelope(Envelope::new(MessageCode::ReqLogInfo), &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn auth_answer_write_failure_is_fatal() {
        // Detached writer: the answer cannot be sent, which must escape as
        // a stream-level error.
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        let env = Envelope::new(MessageCode::ReqAuth)
            .field("server_name", Value::from("srv1"));
        let err = dispatch_envelope(env, &ctx).await.unwrap_err();
        assert!(matches!(err, SidelinkError::StreamNotSet));
        assert_eq!(&*ctx.server_name.lock().await, "srv1");
    }

    #[tokio::test]
    async fn file_push_missing_fields_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());

        // chunk without file_name
        let env = Envelope::new(MessageCode::ReqFileDownload)
            .field("chunk", Value::from(&b"data"[..]));
        dispatch_envelope(env, &ctx).await.unwrap();

        // file_name without chunk
        let env = Envelope::new(MessageCode::ReqFileDownload)
            .field("file_name", Value::from("a.bin"));
        dispatch_envelope(env, &ctx).await.unwrap();

        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn file_push_lands_under_recorded_server_name() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_ctx(dir.path());
        *ctx.server_name.lock().await = "srv1".to_string();

        let env = Envelope::new(MessageCode::ReqFileDownload)
            .field("file_name", Value::from("dump.bin"))
            .field("chunk", Value::from(&b"abc"[..]));
        dispatch_envelope(env, &ctx).await.unwrap();

        let data = std::fs::read(dir.path().join("srv1").join("dump.bin")).unwrap();
        assert_eq!(&data, b"abc");
    }
}

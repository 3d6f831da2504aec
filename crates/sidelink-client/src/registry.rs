//! Method registry: name → handler map routing inbound `ReqNet` envelopes.
//!
//! Registration is explicit (builder-style): each capability is registered
//! once at startup under its plain name, or via [`MethodRegistry::register_prefixed`]
//! which derives the key by stripping the fixed `net_` capability prefix.
//! Lookups are read-only in the steady state used by the dispatch loop.
//!
//! Invocation is deliberately permissive about inputs: envelope fields a
//! handler does not declare are silently dropped, so unrelated protocol
//! fields never fail a call. Declared parameter types, when present, are
//! checked against the supplied value's runtime kind before the handler
//! runs. Handler failures come back as plain `Err` values; the dispatch
//! loop logs them and keeps going.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use rmpv::Value;

use sidelink_core::error::{Result, SidelinkError};

/// Fixed naming convention marking a callable as a remote capability.
pub const CAPABILITY_PREFIX: &str = "net_";

/// Keyword-style arguments delivered to a handler.
pub type MethodArgs = BTreeMap<String, Value>;

/// Expected runtime kind of one declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Integer,
    Float,
    Str,
    Bool,
    Binary,
    Map,
    Array,
}

impl ParamType {
    /// Does `value`'s runtime kind satisfy this expectation?
    pub fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Float => value.is_f64(),
            ParamType::Str => value.is_str(),
            ParamType::Bool => value.is_bool(),
            ParamType::Binary => value.is_bin(),
            ParamType::Map => value.is_map(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ParamType::Integer => "integer",
            ParamType::Float => "float",
            ParamType::Str => "string",
            ParamType::Bool => "bool",
            ParamType::Binary => "binary",
            ParamType::Map => "map",
            ParamType::Array => "array",
        }
    }

    /// Human-readable kind of a supplied value, for mismatch diagnostics.
    pub fn kind_of(value: &Value) -> &'static str {
        match value {
            Value::Nil => "nil",
            Value::Boolean(_) => "bool",
            Value::Integer(_) => "integer",
            Value::F32(_) | Value::F64(_) => "float",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Ext(..) => "ext",
        }
    }
}

/// One declared handler parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: &'static str,
    /// `None` means any runtime kind is accepted.
    pub ty: Option<ParamType>,
}

impl ParamSpec {
    pub fn any(name: &'static str) -> Self {
        Self { name, ty: None }
    }

    pub fn typed(name: &'static str, ty: ParamType) -> Self {
        Self { name, ty: Some(ty) }
    }
}

/// A locally registered capability.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Declared parameters. Supplied fields outside this list are dropped
    /// before the call.
    fn params(&self) -> &[ParamSpec];

    async fn call(&self, args: MethodArgs) -> Result<()>;
}

/// Adapter turning an async closure into a [`MethodHandler`].
struct FnHandler<F> {
    params: Vec<ParamSpec>,
    f: F,
}

#[async_trait]
impl<F, Fut> MethodHandler for FnHandler<F>
where
    F: Fn(MethodArgs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    async fn call(&self, args: MethodArgs) -> Result<()> {
        (self.f)(args).await
    }
}

/// Name → handler map. Built once at startup, read-only afterwards.
#[derive(Default)]
pub struct MethodRegistry {
    methods: DashMap<String, Arc<dyn MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self {
            methods: DashMap::new(),
        }
    }

    /// Register a handler under its plain name. Re-registering a name
    /// replaces the previous handler (last wins).
    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn MethodHandler>) {
        self.methods.insert(name.into(), handler);
    }

    /// Register an async closure under its plain name.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, params: Vec<ParamSpec>, f: F)
    where
        F: Fn(MethodArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(name, Arc::new(FnHandler { params, f }));
    }

    /// Register a capability by its convention name, deriving the registry
    /// key by stripping the `net_` prefix. Names outside the convention are
    /// ignored; returns whether the registration happened.
    pub fn register_prefixed(&self, raw_name: &str, handler: Arc<dyn MethodHandler>) -> bool {
        match raw_name.strip_prefix(CAPABILITY_PREFIX) {
            Some(derived) if !derived.is_empty() => {
                self.register(derived, handler);
                true
            }
            _ => false,
        }
    }

    /// Pure lookup. `None` is a logged skip for the dispatch loop, never a
    /// failure.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn MethodHandler>> {
        self.methods.get(name).map(|e| e.value().clone())
    }

    pub fn registered_methods(&self) -> Vec<String> {
        self.methods.iter().map(|e| e.key().clone()).collect()
    }

    /// Resolve and invoke `name` with the envelope's fields as
    /// keyword-style arguments.
    ///
    /// Fields the handler does not declare are dropped; declared types are
    /// validated before the call (mismatch skips the invocation). Handler
    /// failures surface as `SidelinkError::Handler`.
    pub async fn invoke(&self, name: &str, supplied: &MethodArgs) -> Result<()> {
        let handler = self
            .resolve(name)
            .ok_or_else(|| SidelinkError::MethodNotFound(name.to_string()))?;

        let mut args = MethodArgs::new();
        for spec in handler.params() {
            let Some(value) = supplied.get(spec.name) else {
                continue;
            };
            if let Some(expected) = spec.ty {
                if !expected.matches(value) {
                    return Err(SidelinkError::ParamType {
                        method: name.to_string(),
                        param: spec.name.to_string(),
                        expected: expected.name(),
                        got: ParamType::kind_of(value),
                    });
                }
            }
            args.insert(spec.name.to_string(), value.clone());
        }

        handler.call(args).await.map_err(|e| SidelinkError::Handler {
            method: name.to_string(),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Noop;

    #[async_trait]
    impl MethodHandler for Noop {
        fn params(&self) -> &[ParamSpec] {
            &[]
        }

        async fn call(&self, _args: MethodArgs) -> Result<()> {
            Ok(())
        }
    }

    fn noop(registry: &MethodRegistry, name: &str) {
        registry.register(name, Arc::new(Noop));
    }

    #[test]
    fn prefixed_registration_derives_keys() {
        let registry = MethodRegistry::new();
        let handler: Arc<dyn MethodHandler> = Arc::new(Noop);

        assert!(registry.register_prefixed("net_foo", handler.clone()));
        assert!(registry.register_prefixed("net_bar", handler.clone()));
        assert!(!registry.register_prefixed("helper_baz", handler.clone()));
        assert!(!registry.register_prefixed("net_", handler));

        let mut names = registry.registered_methods();
        names.sort();
        assert_eq!(names, vec!["bar".to_string(), "foo".to_string()]);
    }

    #[test]
    fn last_registration_wins() {
        let registry = MethodRegistry::new();
        noop(&registry, "dup");
        noop(&registry, "dup");
        assert_eq!(registry.registered_methods(), vec!["dup".to_string()]);
    }

    #[tokio::test]
    async fn unknown_method_is_reported_not_panicked() {
        let registry = MethodRegistry::new();
        let err = registry.invoke("doesNotExist", &MethodArgs::new()).await;
        assert!(matches!(err, Err(SidelinkError::MethodNotFound(_))));
    }

    #[tokio::test]
    async fn undeclared_fields_are_dropped() {
        let registry = MethodRegistry::new();
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        registry.register_fn(
            "echo",
            vec![ParamSpec::typed("n", ParamType::Integer)],
            move |args| {
                let seen = seen2.clone();
                async move {
                    assert_eq!(args.len(), 1);
                    seen.store(args["n"].as_u64().unwrap_or(0), Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        let mut supplied = MethodArgs::new();
        supplied.insert("n".into(), Value::from(7));
        supplied.insert("type".into(), Value::from("echo"));
        supplied.insert("irrelevant".into(), Value::from("x"));

        registry.invoke("echo", &supplied).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn type_mismatch_skips_invocation() {
        let registry = MethodRegistry::new();
        let called = Arc::new(AtomicU64::new(0));
        let called2 = called.clone();
        registry.register_fn(
            "echo",
            vec![ParamSpec::typed("n", ParamType::Integer)],
            move |_args| {
                let called = called2.clone();
                async move {
                    called.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        );

        let mut supplied = MethodArgs::new();
        supplied.insert("n".into(), Value::from("not an int"));

        let err = registry.invoke("echo", &supplied).await.unwrap_err();
        assert!(matches!(err, SidelinkError::ParamType { .. }));
        assert_eq!(called.load(Ordering::SeqCst), 0, "handler must not run");
    }

    #[tokio::test]
    async fn missing_declared_param_still_calls() {
        // Declared-but-unsupplied params are simply absent from args.
        let registry = MethodRegistry::new();
        registry.register_fn(
            "echo",
            vec![ParamSpec::any("optional")],
            |args| async move {
                assert!(args.is_empty());
                Ok(())
            },
        );
        registry.invoke("echo", &MethodArgs::new()).await.unwrap();
    }

    #[tokio::test]
    async fn handler_failure_surfaces_as_error_value() {
        let registry = MethodRegistry::new();
        registry.register_fn("boom", vec![], |_args| async {
            Err(SidelinkError::Decode("business failure".into()))
        });

        let err = registry.invoke("boom", &MethodArgs::new()).await.unwrap_err();
        assert!(matches!(err, SidelinkError::Handler { .. }));
        assert!(!err.is_fatal());
    }
}

//! Shared error type across sidelink crates.

use thiserror::Error;

/// Shared result type.
pub type Result<T> = std::result::Result<T, SidelinkError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum SidelinkError {
    /// Transport-level I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame: truncated length prefix or payload.
    #[error("frame: {0}")]
    Frame(String),

    /// Declared frame length exceeds the configured bound.
    #[error("frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Envelope could not be serialized.
    #[error("encode: {0}")]
    Encode(String),

    /// Payload does not decode into a well-formed envelope mapping.
    #[error("decode: {0}")]
    Decode(String),

    /// Envelope lacks an integer `code` field.
    #[error("envelope missing integer code field")]
    MissingCode,

    /// Peer sent a code outside the protocol's closed set.
    #[error("unknown code from server: {0}")]
    UnknownCode(i64),

    /// Write attempted with no open stream.
    #[error("stream not set")]
    StreamNotSet,

    /// Peer closed the stream mid-frame or before one.
    #[error("connection closed")]
    ConnectionClosed,

    /// `ReqNet` named a method no one registered.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// Supplied argument's runtime type does not match the declared one.
    #[error("method {method}: argument {param} expected {expected}, got {got}")]
    ParamType {
        method: String,
        param: String,
        expected: &'static str,
        got: &'static str,
    },

    /// A registered handler reported a failure.
    #[error("handler {method} failed: {source}")]
    Handler {
        method: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Bad configuration.
    #[error("config: {0}")]
    Config(String),
}

impl SidelinkError {
    /// True when the error must tear down the connection.
    ///
    /// Per-frame problems (decode, registry miss, handler failure) are
    /// logged and skipped by the dispatch loop; only stream-level failures
    /// terminate it.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SidelinkError::Io(_)
                | SidelinkError::Frame(_)
                | SidelinkError::FrameTooLarge { .. }
                | SidelinkError::ConnectionClosed
                | SidelinkError::StreamNotSet
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_fatal() {
        assert!(SidelinkError::ConnectionClosed.is_fatal());
        assert!(SidelinkError::Frame("short read".into()).is_fatal());
        assert!(SidelinkError::FrameTooLarge { len: 10, max: 1 }.is_fatal());
        assert!(SidelinkError::StreamNotSet.is_fatal());
    }

    #[test]
    fn per_frame_errors_are_not_fatal() {
        assert!(!SidelinkError::MissingCode.is_fatal());
        assert!(!SidelinkError::Decode("not a map".into()).is_fatal());
        assert!(!SidelinkError::UnknownCode(999).is_fatal());
        assert!(!SidelinkError::MethodNotFound("doesNotExist".into()).is_fatal());
        assert!(!SidelinkError::ParamType {
            method: "echo".into(),
            param: "n".into(),
            expected: "integer",
            got: "string",
        }
        .is_fatal());
    }
}

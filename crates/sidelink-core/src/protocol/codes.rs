//! Message-code enumeration.
//!
//! The integer values are the wire contract between peers and must match on
//! both ends. Treat this as a closed set: anything else is reported as
//! `UnknownCode` by the dispatch loop and skipped.

/// Envelope kind discriminator carried in the mandatory `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    /// Server-initiated authentication challenge.
    ReqAuth,
    /// Client's auth answer, login/password variant.
    AnswerAuthAlp,
    /// Client's auth answer, registration variant.
    AnswerAuthReg,
    /// Inbound RPC invocation request (`type` names the method).
    ReqNet,
    /// Leveled log pushes (`message` carries the text).
    ReqLogDebug,
    ReqLogInfo,
    ReqLogWarning,
    ReqLogError,
    /// File chunk push (`file_name` + `chunk`).
    ReqFileDownload,
}

impl MessageCode {
    /// Wire value for this code.
    pub fn code(self) -> i64 {
        match self {
            MessageCode::ReqAuth => 1,
            MessageCode::AnswerAuthAlp => 2,
            MessageCode::AnswerAuthReg => 3,
            MessageCode::ReqNet => 4,
            MessageCode::ReqLogDebug => 10,
            MessageCode::ReqLogInfo => 11,
            MessageCode::ReqLogWarning => 12,
            MessageCode::ReqLogError => 13,
            MessageCode::ReqFileDownload => 20,
        }
    }

    /// Classify a wire value. `None` for anything outside the closed set.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(MessageCode::ReqAuth),
            2 => Some(MessageCode::AnswerAuthAlp),
            3 => Some(MessageCode::AnswerAuthReg),
            4 => Some(MessageCode::ReqNet),
            10 => Some(MessageCode::ReqLogDebug),
            11 => Some(MessageCode::ReqLogInfo),
            12 => Some(MessageCode::ReqLogWarning),
            13 => Some(MessageCode::ReqLogError),
            20 => Some(MessageCode::ReqFileDownload),
            _ => None,
        }
    }
}

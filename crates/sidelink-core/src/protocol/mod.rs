//! Protocol modules (frame codec + envelope + message codes).
//!
//! One wire message is `[4-byte big-endian length][msgpack envelope]`.
//! Request/response and async push traffic all share this one shape and are
//! told apart by the envelope's integer `code` field.
//!
//! All parsers are panic-free: malformed input is reported as
//! `SidelinkError` instead of panicking or indexing raw buffers, keeping a
//! long-lived connection resilient to hostile traffic.

pub mod codes;
pub mod envelope;
pub mod frame;

pub use codes::MessageCode;
pub use envelope::Envelope;
pub use frame::{decode_length, encode_frame, LEN_PREFIX_SIZE};

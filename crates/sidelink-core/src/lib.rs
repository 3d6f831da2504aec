//! sidelink core: transport-agnostic protocol primitives and error types.
//!
//! This crate defines the wire-level contracts shared by the client runtime
//! and any tooling that needs to speak the push-channel protocol: the
//! length-prefixed frame codec, the msgpack envelope, and the message-code
//! enumeration. It intentionally carries no transport or runtime
//! dependencies so it can be reused outside the tokio client.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `SidelinkError`/`Result` so a
//! long-lived connection does not crash on malformed peer traffic.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{Result, SidelinkError};

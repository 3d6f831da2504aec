//! sidelink client runtime.
//!
//! This crate wires the connection, method registry, dispatch loop, file
//! sink, and configuration into the public client façade. It is intended to
//! be consumed by applications embedding the push-channel client and by
//! integration tests.
//!
//! Lifecycle: [`SideClient::connect`] opens the TCP stream and spawns the
//! dispatch loop as a background task; the loop continuously reads framed
//! envelopes and routes them to registered method handlers, the log sink,
//! the auth responder, or the file sink. Outbound [`SideClient::send_packet`]
//! traffic goes straight through the shared write handle, independent of
//! the read side.

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod storage;

pub use client::{SideClient, SideClientBuilder};
pub use config::ClientConfig;
pub use dispatch::LoopState;
pub use registry::{MethodArgs, MethodHandler, MethodRegistry, ParamSpec, ParamType};
pub use sidelink_core::{Result, SidelinkError};

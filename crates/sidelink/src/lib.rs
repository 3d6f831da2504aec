//! Top-level facade crate for sidelink.
//!
//! Re-exports the protocol core and the client runtime so users can depend
//! on a single crate.

pub mod core {
    pub use sidelink_core::*;
}

pub mod client {
    pub use sidelink_client::*;
}

pub use sidelink_client::{SideClient, SideClientBuilder};
pub use sidelink_core::protocol::{Envelope, MessageCode};
pub use sidelink_core::{Result, SidelinkError};

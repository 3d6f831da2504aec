//! Client config loader (strict parsing).

pub mod schema;

use std::fs;
use std::path::Path;

use sidelink_core::error::{Result, SidelinkError};

pub use schema::{AuthSection, ClientConfig, LimitsSection, ServerSection, StorageSection};

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ClientConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| SidelinkError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<ClientConfig> {
    let cfg: ClientConfig = serde_yaml::from_str(s)
        .map_err(|e| SidelinkError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

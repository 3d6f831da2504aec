use std::path::PathBuf;

use serde::Deserialize;
use sidelink_core::error::{Result, SidelinkError};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    pub server: ServerSection,

    #[serde(default)]
    pub auth: AuthSection,

    #[serde(default)]
    pub storage: StorageSection,

    #[serde(default)]
    pub limits: LimitsSection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(SidelinkError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }
        if self.server.host.is_empty() {
            return Err(SidelinkError::Config("server.host must not be empty".into()));
        }
        if self.server.port == 0 {
            return Err(SidelinkError::Config("server.port must not be 0".into()));
        }
        self.limits.validate()?;
        Ok(())
    }

    /// Programmatic construction for embedders that do not load YAML.
    pub fn for_server(host: impl Into<String>, port: u16) -> Self {
        Self {
            version: 1,
            server: ServerSection {
                host: host.into(),
                port,
            },
            auth: AuthSection::default(),
            storage: StorageSection::default(),
            limits: LimitsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

/// Credential source used to answer auth challenges.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,

    /// Selects the login/password answer variant over the registration one.
    #[serde(default = "default_use_login_password")]
    pub use_login_password: bool,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            login: String::new(),
            password: String::new(),
            use_login_password: default_use_login_password(),
        }
    }
}

fn default_use_login_password() -> bool {
    true
}

/// Root directory file-chunk pushes are persisted under.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    #[serde(default = "default_content_root")]
    pub content_root: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            content_root: default_content_root(),
        }
    }
}

fn default_content_root() -> PathBuf {
    PathBuf::from("content")
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsSection {
    /// Upper bound on one inbound frame's declared payload length.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl LimitsSection {
    pub fn validate(&self) -> Result<()> {
        if !(1024..=u32::MAX as usize).contains(&self.max_frame_bytes) {
            return Err(SidelinkError::Config(
                "limits.max_frame_bytes must be between 1024 and u32::MAX".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_frame_bytes() -> usize {
    16 * 1024 * 1024
}

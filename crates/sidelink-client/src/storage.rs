//! File sink for inbound chunk pushes.
//!
//! Chunks land under `content_root/<server_name>/<file_name>`, appended in
//! arrival order. Path components supplied by the peer are validated so a
//! push can never write outside the content root.

use std::path::{Component, Path, PathBuf};

use tokio::io::AsyncWriteExt;

use sidelink_core::error::{Result, SidelinkError};

/// Persists file-chunk pushes under one content root.
#[derive(Debug, Clone)]
pub struct FileSink {
    root: PathBuf,
}

impl FileSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one chunk, creating the server directory on first use.
    pub async fn write_chunk(
        &self,
        server_name: &str,
        file_name: &str,
        chunk: &[u8],
    ) -> Result<PathBuf> {
        let dir = self.root.join(checked_component(server_name)?);
        let path = dir.join(checked_component(file_name)?);

        tokio::fs::create_dir_all(&dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(chunk).await?;
        file.flush().await?;
        Ok(path)
    }
}

/// Accept only a single normal path component. Peers do not get to pick
/// absolute paths or traverse upwards.
fn checked_component(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(SidelinkError::Decode("empty path component".into()));
    }
    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(name),
        _ => Err(SidelinkError::Decode(format!(
            "unsafe path component: {name:?}"
        ))),
    }
}

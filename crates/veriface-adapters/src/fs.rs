//! Filesystem-backed model byte and key sources.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use veriface_core::inference::KEY_LEN;
use veriface_core::ports::{KeySource, ModelByteSource};

/// Extension carried by encrypted model payloads on disk.
const ENCRYPTED_EXTENSION: &str = "enc";

/// Reads `{dir}/{name}.enc` payloads.
pub struct FsModelByteSource {
    dir: PathBuf,
}

impl FsModelByteSource {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn payload_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{ENCRYPTED_EXTENSION}"))
    }
}

impl ModelByteSource for FsModelByteSource {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.payload_path(name);
        debug!(model = name, path = %path.display(), "reading model payload");
        std::fs::read(&path)
            .with_context(|| format!("reading model payload {}", path.display()))
    }
}

/// Reads a raw 32-byte key from a side file.
pub struct FsKeySource {
    path: PathBuf,
}

impl FsKeySource {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeySource for FsKeySource {
    fn get(&self) -> Result<[u8; KEY_LEN]> {
        let bytes = std::fs::read(&self.path)
            .with_context(|| format!("reading model key {}", self.path.display()))?;
        let key: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!(
                "model key {} is {} bytes, expected {KEY_LEN}",
                self.path.display(),
                bytes.len()
            )
        })?;
        Ok(key)
    }
}

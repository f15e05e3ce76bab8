//! The Scar File Loader external collaborator: returns the identity
//! definition as a structured document. The core owns the file handle only
//! for the duration of `load()`.

use anyhow::Context;
use std::path::{Path, PathBuf};

pub trait ScarLoader: Send + Sync {
    fn load(&self) -> anyhow::Result<serde_json::Value>;
}

/// Reads the scar document from a JSON file on disk.
pub struct FileScarLoader {
    path: PathBuf,
}

impl FileScarLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScarLoader for FileScarLoader {
    fn load(&self) -> anyhow::Result<serde_json::Value> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading scar document at {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing scar document at {} as JSON", self.path.display()))
    }
}

/// An in-memory scar document, useful for tests and for embedding a default
/// identity directly in a binary.
pub struct StaticScarLoader(pub serde_json::Value);

impl ScarLoader for StaticScarLoader {
    fn load(&self) -> anyhow::Result<serde_json::Value> {
        Ok(self.0.clone())
    }
}

pub fn path_loader(path: impl AsRef<Path>) -> FileScarLoader {
    FileScarLoader::new(path.as_ref().to_path_buf())
}

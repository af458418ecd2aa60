use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Narrow seam to the host application's note storage. The workflow compiler
/// and runner read canvas and file-node content through this trait; the
/// bridge's create-note handler writes through it.
#[async_trait]
pub trait VaultReader: Send + Sync + Debug {
    /// Returns the note content, or an error if the note does not exist.
    async fn read(&self, path: &str) -> Result<String>;
    async fn exists(&self, path: &str) -> bool;
    async fn create_note(&self, path: &str, content: &str) -> Result<()>;
}

/// Filesystem-backed vault rooted at the project directory. Paths are
/// vault-relative; escaping the root is rejected.
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        if rel.is_absolute() {
            bail!("vault paths must be relative: {path}");
        }
        for component in rel.components() {
            if matches!(component, Component::ParentDir) {
                bail!("vault paths may not traverse upwards: {path}");
            }
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl VaultReader for FsVault {
    async fn read(&self, path: &str) -> Result<String> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read_to_string(&full).await?)
    }

    async fn exists(&self, path: &str) -> bool {
        match self.resolve(path) {
            Ok(full) => tokio::fs::try_exists(&full).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn create_note(&self, path: &str, content: &str) -> Result<()> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }
}

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub trait SnapshotStore: Send + Sync {
    fn put(&self, name: &str, contents: &[u8]) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SnapshotStore for FsSnapshotStore {
    fn put(&self, name: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root).with_context(|| {
            format!(
                "Failed to create snapshot directory: {}",
                self.root.display()
            )
        })?;
        let path = self.root.join(name);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write snapshot: {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSnapshotStore;

impl SnapshotStore for NullSnapshotStore {
    fn put(&self, _name: &str, _contents: &[u8]) -> Result<()> {
        Ok(())
    }
}

//! Advisory run lock
//!
//! Mutating commands hold an exclusive lock on `<data_dir>/tidemark.lock`
//! so two runs never drive the same target store at once.

use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "tidemark.lock";

pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, failing at once if another process holds it
    pub fn acquire(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().map_err(|e| {
            anyhow::anyhow!(
                "Another tidemark run holds {} ({}); wait for it to finish",
                path.display(),
                e
            )
        })?;
        tracing::debug!("Acquired run lock {}", path.display());

        Ok(Self { file, path })
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Closing the handle releases the lock as well
        let _ = FileExt::unlock(&self.file);
        tracing::debug!("Released run lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_lock_fails_until_released() {
        let dir = TempDir::new().unwrap();

        let first = RunLock::acquire(dir.path()).unwrap();
        assert!(RunLock::acquire(dir.path()).is_err());

        drop(first);
        assert!(RunLock::acquire(dir.path()).is_ok());
    }
}

//! File system utils.

use std::fs::{File, OpenOptions};
use std::path::Path;

use anyhow::Context;
use fs2::FileExt;

pub struct FsHandler;

impl FsHandler {
    pub fn set_writable(path: &Path) -> anyhow::Result<()> {
        let metadata = std::fs::metadata(path).context("Failed to get metadata for file")?;

        let mut perms = metadata.permissions();

        perms.set_readonly(false);

        std::fs::set_permissions(path, perms)
            .context("Failed to set permissions on registry directory")?;

        Ok(())
    }

    // Create the directory (and parents) if it doesn't exist yet
    pub fn create_dir(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(path).context(format!(
            "Failed to create directory {}",
            path.display()
        ))?;
        tracing::debug!("Created directory: {}", path.display());

        Self::set_writable(path)
            .context("Failed to set permissions on created directory")?;

        Ok(())
    }

    /// Take an exclusive advisory lock on `path`, creating the file if needed.
    ///
    /// The lock is released when the returned file is dropped. Fails immediately
    /// if another process (or another handle in this one) holds it.
    pub fn lock_exclusive(path: &Path) -> anyhow::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .context(format!("Failed to open lock file {}", path.display()))?;

        file.try_lock_exclusive().context(format!(
            "Registry is locked by another run: {}",
            path.display()
        ))?;

        Ok(file)
    }
}

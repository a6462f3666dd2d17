//! Where memolint keeps its data between invocations

use anyhow::{anyhow, Result};
use std::path::PathBuf;

/// Data directory (~/.local/share/memolint on Unix platforms)
pub fn data_dir() -> Result<PathBuf> {
    #[cfg(windows)]
    {
        let base = dirs::data_local_dir()
            .ok_or_else(|| anyhow!("Could not determine local data directory"))?;
        Ok(base.join("memolint"))
    }

    #[cfg(not(windows))]
    {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not determine home directory"))?;
        Ok(home.join(".local").join("share").join("memolint"))
    }
}

/// Report cache directory
pub fn cache_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("cache"))
}

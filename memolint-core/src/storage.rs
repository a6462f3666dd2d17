use crate::cache::{CachedReport, ReportCacheKey};
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Storage abstraction for cached QA reports
pub trait ReportStorage {
    fn get_report(&self, cache_key: &ReportCacheKey) -> Result<Option<CachedReport>>;
    fn store_report(&self, cache_key: &ReportCacheKey, entry: &CachedReport) -> Result<()>;
}

/// One JSON file per report under `<cache_dir>/reports/`
pub struct FileStorage {
    reports_dir: PathBuf,
}

impl FileStorage {
    pub fn new(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let reports_dir = cache_dir.as_ref().join("reports");
        fs::create_dir_all(&reports_dir)
            .with_context(|| format!("Failed to create {}", reports_dir.display()))?;
        Ok(Self { reports_dir })
    }

    fn report_path(&self, cache_key: &ReportCacheKey) -> PathBuf {
        self.reports_dir.join(format!("{}.json", cache_key.file_stem()))
    }

    /// Delete entries that are expired or unreadable. Returns how many went.
    pub fn prune(&self, max_age: Duration) -> Result<usize> {
        let now = Utc::now();
        let mut removed = 0;
        for entry in fs::read_dir(&self.reports_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let expired = match read_entry(&path) {
                Ok(cached) => cached.is_expired(max_age, now),
                Err(e) => {
                    tracing::debug!("Dropping unreadable cache entry {}: {e:#}", path.display());
                    true
                }
            };
            if expired {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!("Pruned {removed} cached reports from {}", self.reports_dir.display());
        }
        Ok(removed)
    }
}

fn read_entry(path: &Path) -> Result<CachedReport> {
    let json_str = fs::read_to_string(path)?;
    serde_json::from_str(&json_str).map_err(|e| anyhow!("Failed to deserialize cached report: {}", e))
}

impl ReportStorage for FileStorage {
    fn get_report(&self, cache_key: &ReportCacheKey) -> Result<Option<CachedReport>> {
        let path = self.report_path(cache_key);
        if path.exists() {
            read_entry(&path).map(Some)
        } else {
            Ok(None)
        }
    }

    fn store_report(&self, cache_key: &ReportCacheKey, entry: &CachedReport) -> Result<()> {
        let json_str = serde_json::to_string_pretty(entry)
            .map_err(|e| anyhow!("Failed to serialize cached report: {}", e))?;
        fs::write(self.report_path(cache_key), json_str)?;
        Ok(())
    }
}

/// Caching disabled
#[derive(Default)]
pub struct NoOpStorage;

impl NoOpStorage {
    pub fn new() -> Self {
        Self
    }
}

impl ReportStorage for NoOpStorage {
    fn get_report(&self, _cache_key: &ReportCacheKey) -> Result<Option<CachedReport>> {
        Ok(None)
    }

    fn store_report(&self, _cache_key: &ReportCacheKey, _entry: &CachedReport) -> Result<()> {
        Ok(())
    }
}

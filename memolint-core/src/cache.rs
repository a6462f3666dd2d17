//! Report cache entries.
//!
//! A report depends on the memo text and on the compiled rule tables, so the
//! key is the text hash plus `RuleTables::fingerprint`. Changing a severity
//! override, a word limit or an alias therefore misses instead of serving a
//! report graded under the old rules.

use crate::rules::RuleTables;
use crate::types::QaReport;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MEMOLINT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ReportCacheKey {
    pub text_hash: String,
    pub rules_fingerprint: String,
    pub memolint_version: String,
}

impl ReportCacheKey {
    pub fn for_document(text: &str, tables: &RuleTables) -> Self {
        Self {
            text_hash: hash_text(text),
            rules_fingerprint: tables.fingerprint().to_string(),
            memolint_version: MEMOLINT_VERSION.to_string(),
        }
    }

    /// File stem the entry is stored under.
    pub fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.text_hash, &self.rules_fingerprint, &self.memolint_version] {
            hasher.update(part);
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }
}

/// A stored report. `stored_at` is the only wall-clock time on disk; the
/// report itself stays timestamp-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedReport {
    pub report: QaReport,
    pub stored_at: DateTime<Utc>,
    pub validation_ms: u64,
    pub memolint_version: String,
}

impl CachedReport {
    pub fn new(report: QaReport, validation_ms: u64) -> Self {
        Self {
            report,
            stored_at: Utc::now(),
            validation_ms,
            memolint_version: MEMOLINT_VERSION.to_string(),
        }
    }

    /// The document id is part of the report, so a hit only counts for the
    /// same id.
    pub fn serves(&self, document_id: &str) -> bool {
        self.report.document_id == document_id
    }

    /// Entries written by another build or older than `max_age` get pruned.
    pub fn is_expired(&self, max_age: Duration, now: DateTime<Utc>) -> bool {
        self.memolint_version != MEMOLINT_VERSION || now - self.stored_at > max_age
    }
}

fn hash_text(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::types::{RuleId, Severity};

    fn report(id: &str) -> QaReport {
        let tables = RuleTables::with_defaults().unwrap();
        let document = crate::rules::SectionParser::new(&tables).parse("## Facts\nNone.");
        crate::report::ReportAggregator::aggregate(
            id,
            &document,
            Vec::new(),
            Default::default(),
            Default::default(),
        )
    }

    #[test]
    fn test_key_follows_text() {
        let tables = RuleTables::with_defaults().unwrap();
        let a = ReportCacheKey::for_document("## Facts", &tables);
        let b = ReportCacheKey::for_document("## Facts ", &tables);
        assert_ne!(a.file_stem(), b.file_stem());
        assert_eq!(a.file_stem(), ReportCacheKey::for_document("## Facts", &tables).file_stem());
    }

    #[test]
    fn test_key_follows_severity_overrides() {
        let defaults = RuleTables::with_defaults().unwrap();
        let mut config = ValidationConfig::default();
        config.severities = config.severities.with_override(RuleId::MissingPincite, Severity::High);
        let stricter = RuleTables::new(config).unwrap();

        let a = ReportCacheKey::for_document("memo", &defaults);
        let b = ReportCacheKey::for_document("memo", &stricter);
        assert_eq!(a.text_hash, b.text_hash);
        assert_ne!(a.file_stem(), b.file_stem());
    }

    #[test]
    fn test_entry_serves_only_its_document() {
        let entry = CachedReport::new(report("a.md"), 3);
        assert!(entry.serves("a.md"));
        assert!(!entry.serves("b.md"));
    }

    #[test]
    fn test_expiry() {
        let mut entry = CachedReport::new(report("a.md"), 3);
        let now = entry.stored_at;
        assert!(!entry.is_expired(Duration::days(30), now + Duration::days(29)));
        assert!(entry.is_expired(Duration::days(30), now + Duration::days(31)));

        entry.memolint_version = "0.0.0-old".to_string();
        assert!(entry.is_expired(Duration::days(30), now));
    }
}

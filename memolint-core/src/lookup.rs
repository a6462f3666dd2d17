use crate::types::{Citation, CitationType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Note attached to every citation whose lookup did not settle the question.
pub const MANUAL_CHECK_NOTE: &str = "Unknown—needs manual check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupStatus {
    Exists,
    NotFound,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupOutcome {
    pub status: LookupStatus,
    pub source_url: Option<String>,
}

impl LookupOutcome {
    pub fn exists(source_url: impl Into<String>) -> Self {
        Self {
            status: LookupStatus::Exists,
            source_url: Some(source_url.into()),
        }
    }

    pub fn not_found(source_url: impl Into<String>) -> Self {
        Self {
            status: LookupStatus::NotFound,
            source_url: Some(source_url.into()),
        }
    }

    pub fn unknown() -> Self {
        Self {
            status: LookupStatus::Unknown,
            source_url: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no online source for {0} citations")]
    Unsupported(CitationType),
}

/// Checks whether a cited authority exists at a public source.
pub trait CitationLookup: Send + Sync {
    fn lookup(&self, citation_type: CitationType, key: &str) -> Result<LookupOutcome, LookupError>;
}

/// Lookup result for one citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationEntry {
    pub raw_text: String,
    pub citation_type: CitationType,
    pub key: String,
    pub section: String,
    pub status: LookupStatus,
    pub source_url: Option<String>,
    pub note: Option<String>,
}

/// Lookup results for a memo. Kept apart from the QA report so online
/// checks never change validation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub document_id: String,
    pub checked_at: DateTime<Utc>,
    pub entries: Vec<VerificationEntry>,
    pub exists: usize,
    pub not_found: usize,
    pub unknown: usize,
}

/// Look every citation up once per (type, key). Lookup errors never
/// propagate; they become `unknown` with the manual-check note.
pub fn verify_citations(
    document_id: &str,
    citations: &[Citation],
    lookup: &dyn CitationLookup,
) -> VerificationReport {
    let mut resolved: BTreeMap<(CitationType, String), (LookupOutcome, Option<String>)> = BTreeMap::new();
    let mut entries = Vec::with_capacity(citations.len());

    for citation in citations {
        let (outcome, note) = resolved
            .entry((citation.citation_type, citation.key.clone()))
            .or_insert_with(|| match lookup.lookup(citation.citation_type, &citation.key) {
                Ok(outcome) if outcome.status == LookupStatus::Unknown => {
                    (outcome, Some(MANUAL_CHECK_NOTE.to_string()))
                }
                Ok(outcome) => (outcome, None),
                Err(e) => {
                    tracing::debug!("Lookup of {} failed: {}", citation.raw_text, e);
                    (
                        LookupOutcome::unknown(),
                        Some(format!("{MANUAL_CHECK_NOTE} ({e})")),
                    )
                }
            })
            .clone();

        entries.push(VerificationEntry {
            raw_text: citation.raw_text.clone(),
            citation_type: citation.citation_type,
            key: citation.key.clone(),
            section: citation.section.clone(),
            status: outcome.status,
            source_url: outcome.source_url,
            note,
        });
    }

    let count = |status: LookupStatus| entries.iter().filter(|e| e.status == status).count();
    let report = VerificationReport {
        document_id: document_id.to_string(),
        checked_at: Utc::now(),
        exists: count(LookupStatus::Exists),
        not_found: count(LookupStatus::NotFound),
        unknown: count(LookupStatus::Unknown),
        entries,
    };
    tracing::info!(
        "Verified {} citations: {} exist, {} not found, {} unknown",
        report.entries.len(),
        report.exists,
        report.not_found,
        report.unknown
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLookup {
        calls: AtomicUsize,
    }

    impl CitationLookup for FakeLookup {
        fn lookup(&self, citation_type: CitationType, key: &str) -> Result<LookupOutcome, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match (citation_type, key) {
                (CitationType::Irc, "951A") => Ok(LookupOutcome::exists("https://example.test/951A")),
                (CitationType::Irc, _) => Ok(LookupOutcome::not_found("https://example.test/x")),
                (CitationType::IrsNoticeOrRuling, _) => {
                    Err(LookupError::Timeout(Duration::from_secs(10)))
                }
                (other, _) => Err(LookupError::Unsupported(other)),
            }
        }
    }

    fn citation(citation_type: CitationType, key: &str) -> Citation {
        Citation {
            raw_text: key.to_string(),
            citation_type,
            section: "Analysis".to_string(),
            offset: 0,
            key: key.to_string(),
            has_pincite: false,
            has_italics: false,
            has_court_and_year: false,
            has_irb_reference: false,
            has_symbol_mark: true,
            labeled_secondary: false,
        }
    }

    #[test]
    fn test_errors_become_unknown_with_note() {
        let lookup = FakeLookup { calls: AtomicUsize::new(0) };
        let citations = vec![
            citation(CitationType::Irc, "951A"),
            citation(CitationType::Irc, "9999"),
            citation(CitationType::IrsNoticeOrRuling, "Notice 2020-69"),
        ];
        let report = verify_citations("memo.md", &citations, &lookup);
        assert_eq!((report.exists, report.not_found, report.unknown), (1, 1, 1));
        let note = report.entries[2].note.as_deref().unwrap();
        assert!(note.starts_with(MANUAL_CHECK_NOTE));
        assert!(report.entries[0].note.is_none());
    }

    #[test]
    fn test_repeated_keys_are_looked_up_once() {
        let lookup = FakeLookup { calls: AtomicUsize::new(0) };
        let citations = vec![
            citation(CitationType::Irc, "951A"),
            citation(CitationType::Irc, "951A"),
        ];
        let report = verify_citations("memo.md", &citations, &lookup);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);
    }
}

use crate::cache::{CachedReport, ReportCacheKey};
use crate::config::ValidationConfig;
use crate::error::ParseError;
use crate::report::ReportAggregator;
use crate::rules::{
    CitationExtractor, CitationFindings, CitationValidator, RuleTables, SectionParser,
    StructuralOutcome, StructureChecker,
};
use crate::storage::{FileStorage, NoOpStorage, ReportStorage};
use crate::types::*;
use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Captured intermediate outputs from each pipeline stage
/// Used for testing and diagnostics: each stage boundary can be inspected
#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineStages {
    pub document: ParsedDocument,
    pub citations: Vec<Citation>,
    pub citation_issues: Vec<ValidationIssue>,
    pub structural_issues: Vec<ValidationIssue>,
    pub report: QaReport,
}

/// Cached reports older than this are deleted when a cache is opened.
pub const CACHE_MAX_AGE_DAYS: i64 = 30;

/// Pipeline stages that get timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CacheLookup,
    SectionParsing,
    CitationExtraction,
    CitationValidation,
    StructureChecks,
    ReportAggregation,
    CacheStore,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::CacheLookup => "cache lookup",
            Stage::SectionParsing => "section parsing",
            Stage::CitationExtraction => "citation extraction",
            Stage::CitationValidation => "citation validation",
            Stage::StructureChecks => "structure checks",
            Stage::ReportAggregation => "report aggregation",
            Stage::CacheStore => "cache store",
        }
    }
}

/// Per-stage timings for one document. Disabled timings cost one branch.
pub struct StageTimings {
    enabled: bool,
    timings: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            timings: Vec::new(),
        }
    }

    pub fn time<F, R>(&mut self, stage: Stage, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if !self.enabled {
            return f();
        }
        let start = Instant::now();
        let result = f();
        let elapsed = start.elapsed();
        tracing::trace!("{} took {}µs", stage.label(), elapsed.as_micros());
        self.timings.push((stage, elapsed));
        result
    }

    pub fn timings(&self) -> &[(Stage, Duration)] {
        &self.timings
    }

    /// Stages in run order with their share of the total, one per line.
    pub fn summary(&self, document_id: &str) -> Option<String> {
        if self.timings.is_empty() {
            return None;
        }
        let total: Duration = self.timings.iter().map(|(_, d)| *d).sum();
        let mut out = format!("⏱️  {document_id}\n");
        for (stage, duration) in &self.timings {
            let share = if total.is_zero() {
                0.0
            } else {
                duration.as_secs_f64() / total.as_secs_f64() * 100.0
            };
            out.push_str(&format!(
                "   {:.<28} {}µs ({:.1}%)\n",
                stage.label(),
                duration.as_micros(),
                share
            ));
        }
        out.push_str(&format!("   {:.<28} {}µs\n", "total", total.as_micros()));
        Some(out)
    }
}

/// Runs memos through the validation pipeline:
/// text → sections → {citations → citation issues, structural rules} → report.
pub struct MemoProcessor {
    tables: RuleTables,
    storage: Box<dyn ReportStorage + Send + Sync>,
    profiling: bool,
}

impl MemoProcessor {
    /// Create MemoProcessor with full dependency injection
    pub fn new_with_dependencies(
        config: ValidationConfig,
        storage: Box<dyn ReportStorage + Send + Sync>,
    ) -> Result<Self> {
        Ok(Self {
            tables: RuleTables::new(config)?,
            storage,
            profiling: false,
        })
    }

    /// No caching.
    pub fn new(config: ValidationConfig) -> Result<Self> {
        Self::new_with_dependencies(config, Box::new(NoOpStorage::new()))
    }

    /// Cache reports under `cache_dir`, pruning entries older than
    /// `CACHE_MAX_AGE_DAYS` first.
    pub fn new_with_cache(config: ValidationConfig, cache_dir: impl AsRef<Path>) -> Result<Self> {
        let storage = FileStorage::new(cache_dir)?;
        if let Err(e) = storage.prune(chrono::Duration::days(CACHE_MAX_AGE_DAYS)) {
            tracing::warn!("Failed to prune report cache: {e:#}");
        }
        Self::new_with_dependencies(config, Box::new(storage))
    }

    /// Write per-stage timings to stderr for single-document validations.
    pub fn with_profiling(mut self, enabled: bool) -> Self {
        self.profiling = enabled;
        self
    }

    pub fn tables(&self) -> &RuleTables {
        &self.tables
    }

    pub fn config(&self) -> &ValidationConfig {
        self.tables.config()
    }

    pub fn validate_text(&self, id: &str, text: &str) -> Result<QaReport, ParseError> {
        let document = Document::from_text(id, text)?;
        Ok(self.validate_document(&document))
    }

    pub fn validate_bytes(&self, id: &str, bytes: &[u8]) -> Result<QaReport, ParseError> {
        let document = Document::from_bytes(id, bytes)?;
        Ok(self.validate_document(&document))
    }

    pub fn validate_file(&self, path: &Path) -> Result<QaReport, ParseError> {
        let document = Document::load(path)?;
        Ok(self.validate_document(&document))
    }

    /// Validate several files in parallel. Results come back in input order.
    pub fn validate_batch(&self, paths: &[PathBuf]) -> Vec<Result<QaReport, ParseError>> {
        tracing::info!("Validating {} documents", paths.len());
        paths
            .par_iter()
            .map(|path| {
                let document = Document::load(path)?;
                Ok(self.run_cached(&document, &mut StageTimings::new(false)))
            })
            .collect()
    }

    /// Validate a decoded document, consulting the report cache first.
    pub fn validate_document(&self, document: &Document) -> QaReport {
        let mut timings = StageTimings::new(self.profiling);
        let report = self.run_cached(document, &mut timings);
        // stdout is reserved for the report
        if let Some(summary) = timings.summary(document.id()) {
            eprint!("{summary}");
        }
        report
    }

    /// Run every stage and keep each intermediate output.
    pub fn capture_stages(&self, id: &str, text: &str) -> Result<PipelineStages, ParseError> {
        let document = Document::from_text(id, text)?;
        let (parsed, citations, findings, outcome) =
            self.run_stages(&document, &mut StageTimings::new(false));

        tracing::debug!(
            "Captured {} sections, {} citations, {} citation issues, {} structural issues",
            parsed.sections.len(),
            citations.len(),
            findings.issues.len(),
            outcome.issues.len()
        );

        let citation_issues = findings.issues.clone();
        let structural_issues = outcome.issues.clone();
        let report =
            ReportAggregator::aggregate(document.id(), &parsed, citations.clone(), findings, outcome);

        Ok(PipelineStages {
            document: parsed,
            citations,
            citation_issues,
            structural_issues,
            report,
        })
    }

    fn run_cached(&self, document: &Document, timings: &mut StageTimings) -> QaReport {
        let start_time = Instant::now();
        let cache_key = ReportCacheKey::for_document(document.text(), &self.tables);

        match timings.time(Stage::CacheLookup, || self.storage.get_report(&cache_key)) {
            Ok(Some(cached)) if cached.serves(document.id()) => {
                tracing::debug!("Cache hit for {}", document.id());
                return cached.report;
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Report cache lookup failed: {e:#}"),
        }

        let (parsed, citations, findings, outcome) = self.run_stages(document, timings);
        let report = timings.time(Stage::ReportAggregation, || {
            ReportAggregator::aggregate(document.id(), &parsed, citations, findings, outcome)
        });

        let entry = CachedReport::new(report.clone(), start_time.elapsed().as_millis() as u64);
        if let Err(e) = timings.time(Stage::CacheStore, || self.storage.store_report(&cache_key, &entry)) {
            tracing::warn!("Failed to store report in cache: {e:#}");
        }
        report
    }

    fn run_stages(
        &self,
        document: &Document,
        timings: &mut StageTimings,
    ) -> (ParsedDocument, Vec<Citation>, CitationFindings, StructuralOutcome) {
        let tables = &self.tables;
        tracing::debug!("Validating {} ({} bytes)", document.id(), document.text().len());

        let parsed = timings.time(Stage::SectionParsing, || {
            SectionParser::new(tables).parse(document.text())
        });
        let citations = timings.time(Stage::CitationExtraction, || {
            CitationExtractor::new(tables).extract_all(&parsed)
        });
        let findings = timings.time(Stage::CitationValidation, || {
            CitationValidator::new(tables).validate_with_tally(&citations)
        });
        let outcome = timings.time(Stage::StructureChecks, || {
            StructureChecker::new(tables).check(&parsed, &citations)
        });

        (parsed, citations, findings, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_parse_error() {
        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        assert!(matches!(
            processor.validate_text("memo.md", "   "),
            Err(ParseError::Empty { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let result = processor.validate_file(Path::new("/nonexistent/memo.md"));
        assert!(matches!(result, Err(ParseError::Io { .. })));
    }

    #[test]
    fn test_timings_record_stages_in_order() {
        let mut timings = StageTimings::new(true);
        assert_eq!(timings.time(Stage::SectionParsing, || 7), 7);
        timings.time(Stage::StructureChecks, || ());
        let stages: Vec<Stage> = timings.timings().iter().map(|(stage, _)| *stage).collect();
        assert_eq!(stages, vec![Stage::SectionParsing, Stage::StructureChecks]);

        let summary = timings.summary("memo.md").unwrap();
        assert!(summary.starts_with("⏱️  memo.md\n"));
        assert!(summary.contains("section parsing"));
        assert!(summary.contains("total"));
    }

    #[test]
    fn test_disabled_timings_record_nothing() {
        let mut timings = StageTimings::new(false);
        timings.time(Stage::CacheLookup, || ());
        assert!(timings.timings().is_empty());
        assert!(timings.summary("memo.md").is_none());
    }

    #[test]
    fn test_cache_misses_after_severity_change() {
        let cache_dir = tempfile::tempdir().unwrap();
        let text = "## Facts\nThe client sold shares.";
        let lenient = MemoProcessor::new_with_cache(ValidationConfig::default(), cache_dir.path()).unwrap();
        let first = lenient.validate_text("memo.md", text).unwrap();

        let mut config = ValidationConfig::default();
        config.severities = config.severities.with_override(RuleId::MissingSection, Severity::Low);
        let relaxed = MemoProcessor::new_with_cache(config, cache_dir.path()).unwrap();
        let second = relaxed.validate_text("memo.md", text).unwrap();

        assert!(first
            .issues()
            .any(|issue| issue.rule == RuleId::MissingSection && issue.severity == Severity::High));
        assert!(second
            .issues()
            .filter(|issue| issue.rule == RuleId::MissingSection)
            .all(|issue| issue.severity == Severity::Low));
        assert_eq!(std::fs::read_dir(cache_dir.path().join("reports")).unwrap().count(), 2);
    }

    #[test]
    fn test_processor_is_sync() {
        fn assert_sync<T: Sync>() {}
        assert_sync::<MemoProcessor>();
    }
}

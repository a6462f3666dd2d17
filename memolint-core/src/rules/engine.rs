use crate::config::ValidationConfig;
use crate::types::*;
use anyhow::Result;
use regex::Regex;
use sha2::{Digest, Sha256};

use super::citation_extraction::{default_matchers, CitationMatcher};

/// A document-level rule. Rules read the shared context and append to the
/// outcome; none of them can stop the others from running.
pub trait DocumentRule: Send + Sync {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome);
    fn name(&self) -> &str;
}

/// Everything a document rule may look at.
pub struct CheckContext<'a> {
    pub tables: &'a RuleTables,
    pub document: &'a ParsedDocument,
    pub citations: &'a [Citation],
    pub opinion_level: Option<OpinionLevel>,
}

/// Output of the structure checker: issues plus the facts it measured along the way.
#[derive(Debug, Clone, Default)]
pub struct StructuralOutcome {
    pub issues: Vec<ValidationIssue>,
    pub tally: CheckTally,
    pub executive_answer_word_count: Option<usize>,
    pub red_team_argument_count: Option<usize>,
    pub opinion_level: Option<OpinionLevel>,
}

impl StructuralOutcome {
    /// Record one rule evaluation, pushing an issue when it failed.
    pub fn record(&mut self, failure: Option<ValidationIssue>) {
        self.tally.record(failure.is_none());
        if let Some(issue) = failure {
            self.issues.push(issue);
        }
    }
}

/// Regexes shared by the content rules, compiled once.
pub struct ContentPatterns {
    pub url: Regex,
    pub email: Regex,
    pub exact_amount: Regex,
    pub unverified_flag: Regex,
}

impl ContentPatterns {
    fn new() -> Result<Self> {
        Ok(Self {
            url: Regex::new(r#"https?://[^\s)\]>"']+"#)?,
            email: Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b")?,
            exact_amount: Regex::new(r"\$\s?\d{1,3}(?:,\d{3})*\.\d{2}\b|\$\s?\d+\.\d{2}\b")?,
            unverified_flag: Regex::new(r"(?i)\bunknown\s*(?:—|–|--|\s-\s)\s*needs\s+manual\s+check")?,
        })
    }
}

/// Bumped whenever matcher or rule logic changes what a report contains.
pub const RULES_VERSION: &str = "1.1.0";

/// Immutable rule tables: the loaded config plus everything compiled from it.
/// Built once and shared by reference across every document and worker.
pub struct RuleTables {
    config: ValidationConfig,
    headings: Vec<(SectionKind, Vec<String>)>,
    matchers: Vec<Box<dyn CitationMatcher>>,
    content: ContentPatterns,
    fingerprint: String,
}

impl RuleTables {
    pub fn new(config: ValidationConfig) -> Result<Self> {
        let headings = SectionKind::ALL
            .iter()
            .map(|kind| {
                let mut names = vec![normalize_heading(kind.canonical_name())];
                if let Some(aliases) = config.sections.aliases.get(kind) {
                    names.extend(
                        aliases
                            .iter()
                            .map(|alias| normalize_heading(alias))
                            .filter(|alias| !alias.is_empty()),
                    );
                }
                (*kind, names)
            })
            .collect();

        let matchers = default_matchers()?;
        tracing::debug!(
            "Compiled rule tables: {} citation matchers, {} pipeline rules",
            matchers.len(),
            config.pipeline.rules.len()
        );

        let fingerprint = fingerprint(&config, &matchers)?;
        Ok(Self {
            config,
            headings,
            matchers,
            content: ContentPatterns::new()?,
            fingerprint,
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(ValidationConfig::default())
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn matchers(&self) -> &[Box<dyn CitationMatcher>] {
        &self.matchers
    }

    pub fn content_patterns(&self) -> &ContentPatterns {
        &self.content
    }

    /// Hash of everything that decides a report besides the memo text:
    /// the rules version, the config, the resolved severity of every rule
    /// and the matcher order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn severity(&self, rule: RuleId) -> Severity {
        self.config.severities.severity(rule)
    }

    /// Build an issue whose severity comes from the severity table.
    pub fn issue(
        &self,
        subject: IssueSubject,
        rule: RuleId,
        recommendation: impl Into<String>,
    ) -> ValidationIssue {
        ValidationIssue {
            subject,
            rule,
            severity: self.severity(rule),
            recommendation: recommendation.into(),
        }
    }

    /// Match heading text against the canonical names and aliases, in canonical order.
    pub fn match_heading(&self, heading: &str) -> Option<SectionKind> {
        let normalized = normalize_heading(heading);
        if normalized.is_empty() {
            return None;
        }
        self.headings.iter().find_map(|(kind, names)| {
            names
                .iter()
                .any(|name| {
                    normalized == *name
                        || normalized
                            .strip_prefix(name.as_str())
                            .is_some_and(|rest| rest.starts_with(' '))
                })
                .then_some(*kind)
        })
    }
}

fn fingerprint(config: &ValidationConfig, matchers: &[Box<dyn CitationMatcher>]) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(RULES_VERSION);
    hasher.update(serde_json::to_vec(config)?);
    for rule in RuleId::ALL {
        hasher.update(format!("{}={};", rule.as_str(), config.severities.severity(rule)));
    }
    for matcher in matchers {
        hasher.update(format!("{:?};", matcher.citation_type()));
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lowercase, turn `-` `/` `_` into spaces, drop other punctuation, collapse whitespace.
pub fn normalize_heading(text: &str) -> String {
    let mapped: String = text
        .chars()
        .filter_map(|c| match c {
            '-' | '/' | '_' | '–' | '—' => Some(' '),
            c if c.is_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .flat_map(char::to_lowercase)
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace-delimited runs.
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading("Law & Authorities"), "law authorities");
        assert_eq!(normalize_heading("Red-Team (Counter-Arguments)"), "red team counter arguments");
        assert_eq!(normalize_heading("  Exhibits / Evidence   List "), "exhibits evidence list");
        assert_eq!(normalize_heading("Follow_Ups:"), "follow ups");
    }

    #[test]
    fn test_match_heading_variants() {
        let tables = RuleTables::with_defaults().unwrap();
        assert_eq!(tables.match_heading("Facts (Sanitized)"), Some(SectionKind::Facts));
        assert_eq!(
            tables.match_heading("Red-Team (Counter-Arguments)"),
            Some(SectionKind::RedTeam)
        );
        assert_eq!(
            tables.match_heading("Law and Authorities"),
            Some(SectionKind::LawAndAuthorities)
        );
        assert_eq!(
            tables.match_heading("Follow-Ups & Assumptions"),
            Some(SectionKind::FollowUps)
        );
        assert_eq!(
            tables.match_heading("Exhibits / Evidence List"),
            Some(SectionKind::Exhibits)
        );
        assert_eq!(tables.match_heading("QA Checklist"), None);
        // prefix must end on a word boundary
        assert_eq!(tables.match_heading("Factsheet"), None);
    }

    #[test]
    fn test_severity_comes_from_table() {
        let tables = RuleTables::with_defaults().unwrap();
        let issue = tables.issue(IssueSubject::Document, RuleId::MemoTooShort, "expand");
        assert_eq!(issue.severity, Severity::Low);
    }

    #[test]
    fn test_fingerprint_follows_severity_overrides() {
        let defaults = RuleTables::with_defaults().unwrap();
        let again = RuleTables::with_defaults().unwrap();
        assert_eq!(defaults.fingerprint(), again.fingerprint());

        let mut config = ValidationConfig::default();
        config.severities = config.severities.with_override(RuleId::MemoTooShort, Severity::High);
        let overridden = RuleTables::new(config).unwrap();
        assert_ne!(defaults.fingerprint(), overridden.fingerprint());
    }

    #[test]
    fn test_fingerprint_follows_rule_settings() {
        let defaults = RuleTables::with_defaults().unwrap();
        let mut config = ValidationConfig::default();
        config.red_team.required_blocks = 2;
        let relaxed = RuleTables::new(config).unwrap();
        assert_ne!(defaults.fingerprint(), relaxed.fingerprint());
    }

    #[test]
    fn test_unverified_flag_variants() {
        let tables = RuleTables::with_defaults().unwrap();
        let flag = &tables.content_patterns().unverified_flag;
        assert!(flag.is_match("Unknown—needs manual check"));
        assert!(flag.is_match("Unknown -- needs manual check"));
        assert!(flag.is_match("Unknown - needs manual check"));
        assert!(!flag.is_match("Unknown needs manual check"));
    }

    #[test]
    fn test_rule_tables_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RuleTables>();
    }
}

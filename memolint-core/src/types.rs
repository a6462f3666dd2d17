use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// The schema version stamped on every report.
/// Bump this when the report shape changes.
pub const SCHEMA_VERSION: &str = "0.1.0";

// ===== DOCUMENT =====

/// A memo loaded from a path or an in-memory buffer. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: String,
    text: String,
}

impl Document {
    /// Build a document from text that is already decoded.
    ///
    /// Zero-length and whitespace-only text is rejected before any check runs.
    pub fn from_text(id: impl Into<String>, text: impl Into<String>) -> Result<Self, ParseError> {
        let id = id.into();
        let mut text = text.into();
        if text.starts_with('\u{feff}') {
            text.drain(..'\u{feff}'.len_utf8());
        }
        if text.trim().is_empty() {
            return Err(ParseError::Empty { id });
        }
        Ok(Self { id, text })
    }

    /// Decode raw bytes as UTF-8 and build a document.
    pub fn from_bytes(id: impl Into<String>, bytes: &[u8]) -> Result<Self, ParseError> {
        let id = id.into();
        if bytes.is_empty() {
            return Err(ParseError::Empty { id });
        }
        match std::str::from_utf8(bytes) {
            Ok(text) => Self::from_text(id, text),
            Err(e) => Err(ParseError::Encoding {
                id,
                valid_up_to: e.valid_up_to(),
            }),
        }
    }

    /// Read and decode a document from disk. The path becomes the identifier.
    pub fn load(path: &Path) -> Result<Self, ParseError> {
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(path.display().to_string(), &bytes)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

// ===== SECTIONS =====

/// The ten canonical memo sections, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    ExecutiveAnswer,
    IssuePresented,
    Facts,
    LawAndAuthorities,
    Analysis,
    Conclusion,
    RedTeam,
    RiskAndPenaltyShield,
    FollowUps,
    Exhibits,
}

impl SectionKind {
    pub const ALL: [SectionKind; 10] = [
        SectionKind::ExecutiveAnswer,
        SectionKind::IssuePresented,
        SectionKind::Facts,
        SectionKind::LawAndAuthorities,
        SectionKind::Analysis,
        SectionKind::Conclusion,
        SectionKind::RedTeam,
        SectionKind::RiskAndPenaltyShield,
        SectionKind::FollowUps,
        SectionKind::Exhibits,
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            SectionKind::ExecutiveAnswer => "Executive Answer",
            SectionKind::IssuePresented => "Issue Presented",
            SectionKind::Facts => "Facts",
            SectionKind::LawAndAuthorities => "Law & Authorities",
            SectionKind::Analysis => "Analysis",
            SectionKind::Conclusion => "Conclusion",
            SectionKind::RedTeam => "Red-Team",
            SectionKind::RiskAndPenaltyShield => "Risk & Penalty Shield",
            SectionKind::FollowUps => "Follow-Ups",
            SectionKind::Exhibits => "Exhibits",
        }
    }

    /// Risk & Penalty Shield is only required for the stronger opinion levels.
    pub fn is_conditional(self) -> bool {
        matches!(self, SectionKind::RiskAndPenaltyShield)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    /// Canonical name of the section
    pub name: String,
    /// Heading text as written in the memo
    pub heading: String,
    /// Position among the parsed sections (0-based)
    pub order: usize,
    /// 1-based line number of the heading
    pub line: usize,
    pub content: String,
    pub word_count: usize,
}

/// Output of the section parser: ordered sections plus what was missing or unrecognized.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ParsedDocument {
    pub sections: Vec<Section>,
    pub missing_required: Vec<SectionKind>,
    pub extra_headings: Vec<String>,
    pub duplicate_issues: Vec<ValidationIssue>,
    pub total_words: usize,
}

impl ParsedDocument {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn has(&self, kind: SectionKind) -> bool {
        self.section(kind).is_some()
    }
}

// ===== CITATIONS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CitationType {
    #[serde(rename = "IRC")]
    Irc,
    #[serde(rename = "TreasuryReg")]
    TreasuryReg,
    #[serde(rename = "IRSNoticeOrRuling")]
    IrsNoticeOrRuling,
    #[serde(rename = "Case")]
    Case,
    #[serde(rename = "Treaty")]
    Treaty,
    #[serde(rename = "OECD")]
    Oecd,
    #[serde(rename = "Secondary")]
    Secondary,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl CitationType {
    pub fn label(self) -> &'static str {
        match self {
            CitationType::Irc => "IRC",
            CitationType::TreasuryReg => "Treasury Regulation",
            CitationType::IrsNoticeOrRuling => "IRS Notice/Ruling",
            CitationType::Case => "Case",
            CitationType::Treaty => "Treaty",
            CitationType::Oecd => "OECD",
            CitationType::Secondary => "Secondary",
            CitationType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for CitationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A citation found in a section. Derived data; never mutated after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub raw_text: String,
    pub citation_type: CitationType,
    /// Canonical name of the section the citation was found in
    pub section: String,
    /// Byte offset of the span within the section content
    pub offset: usize,
    /// Normalized lookup key (e.g. "951A", "1.951A-2", "Notice 2020-69")
    pub key: String,
    pub has_pincite: bool,
    pub has_italics: bool,
    pub has_court_and_year: bool,
    pub has_irb_reference: bool,
    pub has_symbol_mark: bool,
    pub labeled_secondary: bool,
}

// ===== ISSUES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Fixed rule catalog. Every issue names exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleId {
    // Citation format rules
    MissingSymbol,
    CaseFormat,
    MissingPincite,
    MissingIrbReference,
    PossibleFabrication,
    IncompleteCitation,
    AmbiguousAuthority,
    SecondaryUnlabeled,
    FormatDeviation,
    // Structural rules
    MissingSection,
    DuplicateSection,
    ExecAnswerTooLong,
    RedTeamIncomplete,
    OpinionLevelMissing,
    RiskSectionSuperfluous,
    // Content rules
    UnverifiedCitation,
    UrlMissingAccessDate,
    FactsNotSanitized,
    MemoTooShort,
}

impl RuleId {
    pub const ALL: [RuleId; 19] = [
        RuleId::MissingSymbol,
        RuleId::CaseFormat,
        RuleId::MissingPincite,
        RuleId::MissingIrbReference,
        RuleId::PossibleFabrication,
        RuleId::IncompleteCitation,
        RuleId::AmbiguousAuthority,
        RuleId::SecondaryUnlabeled,
        RuleId::FormatDeviation,
        RuleId::MissingSection,
        RuleId::DuplicateSection,
        RuleId::ExecAnswerTooLong,
        RuleId::RedTeamIncomplete,
        RuleId::OpinionLevelMissing,
        RuleId::RiskSectionSuperfluous,
        RuleId::UnverifiedCitation,
        RuleId::UrlMissingAccessDate,
        RuleId::FactsNotSanitized,
        RuleId::MemoTooShort,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RuleId::MissingSymbol => "missing-symbol",
            RuleId::CaseFormat => "case-format",
            RuleId::MissingPincite => "missing-pincite",
            RuleId::MissingIrbReference => "missing-irb-reference",
            RuleId::PossibleFabrication => "possible-fabrication",
            RuleId::IncompleteCitation => "incomplete-citation",
            RuleId::AmbiguousAuthority => "ambiguous-authority",
            RuleId::SecondaryUnlabeled => "secondary-unlabeled",
            RuleId::FormatDeviation => "format-deviation",
            RuleId::MissingSection => "missing-section",
            RuleId::DuplicateSection => "duplicate-section",
            RuleId::ExecAnswerTooLong => "exec-answer-too-long",
            RuleId::RedTeamIncomplete => "red-team-incomplete",
            RuleId::OpinionLevelMissing => "opinion-level-missing",
            RuleId::RiskSectionSuperfluous => "risk-section-superfluous",
            RuleId::UnverifiedCitation => "unverified-citation",
            RuleId::UrlMissingAccessDate => "url-missing-access-date",
            RuleId::FactsNotSanitized => "facts-not-sanitized",
            RuleId::MemoTooShort => "memo-too-short",
        }
    }

    /// Built-in severity table. `SeverityTable` starts from these values.
    pub fn default_severity(self) -> Severity {
        match self {
            RuleId::MissingSymbol
            | RuleId::CaseFormat
            | RuleId::MissingIrbReference
            | RuleId::PossibleFabrication
            | RuleId::MissingSection
            | RuleId::RedTeamIncomplete
            | RuleId::OpinionLevelMissing => Severity::High,
            RuleId::MissingPincite
            | RuleId::IncompleteCitation
            | RuleId::AmbiguousAuthority
            | RuleId::SecondaryUnlabeled
            | RuleId::DuplicateSection
            | RuleId::ExecAnswerTooLong
            | RuleId::UnverifiedCitation => Severity::Medium,
            RuleId::FormatDeviation
            | RuleId::RiskSectionSuperfluous
            | RuleId::UrlMissingAccessDate
            | RuleId::FactsNotSanitized
            | RuleId::MemoTooShort => Severity::Low,
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an issue is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueSubject {
    Citation { raw_text: String, section: String },
    Section { name: String },
    Document,
}

impl IssueSubject {
    pub fn citation(citation: &Citation) -> Self {
        IssueSubject::Citation {
            raw_text: citation.raw_text.clone(),
            section: citation.section.clone(),
        }
    }

    pub fn section(kind: SectionKind) -> Self {
        IssueSubject::Section {
            name: kind.canonical_name().to_string(),
        }
    }
}

impl fmt::Display for IssueSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueSubject::Citation { raw_text, section } => write!(f, "\"{raw_text}\" ({section})"),
            IssueSubject::Section { name } => write!(f, "section \"{name}\""),
            IssueSubject::Document => f.write_str("document"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub subject: IssueSubject,
    pub rule: RuleId,
    pub severity: Severity,
    pub recommendation: String,
}

// ===== OPINION LEVELS =====

/// Confidence tier stated in the Conclusion, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpinionLevel {
    ReasonableAuthority,
    SubstantialAuthority,
    MoreLikelyThanNot,
    Should,
}

impl OpinionLevel {
    pub const ALL: [OpinionLevel; 4] = [
        OpinionLevel::ReasonableAuthority,
        OpinionLevel::SubstantialAuthority,
        OpinionLevel::MoreLikelyThanNot,
        OpinionLevel::Should,
    ];

    pub fn label(self) -> &'static str {
        match self {
            OpinionLevel::ReasonableAuthority => "Reasonable authority",
            OpinionLevel::SubstantialAuthority => "Substantial authority",
            OpinionLevel::MoreLikelyThanNot => "More likely than not",
            OpinionLevel::Should => "Should",
        }
    }

    /// The Risk & Penalty Shield section is mandatory at these levels.
    pub fn requires_risk_section(self) -> bool {
        matches!(self, OpinionLevel::MoreLikelyThanNot | OpinionLevel::Should)
    }
}

impl fmt::Display for OpinionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ===== REPORT =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallAssessment {
    Ready,
    NeedsRevision,
    MajorIssues,
}

impl fmt::Display for OverallAssessment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OverallAssessment::Ready => "ready",
            OverallAssessment::NeedsRevision => "needs_revision",
            OverallAssessment::MajorIssues => "major_issues",
        })
    }
}

/// Running count of rule evaluations, used for the report score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTally {
    pub total: usize,
    pub passed: usize,
}

impl CheckTally {
    pub fn record(&mut self, passed: bool) {
        self.total += 1;
        if passed {
            self.passed += 1;
        }
    }

    pub fn merge(&mut self, other: CheckTally) {
        self.total += other.total;
        self.passed += other.passed;
    }
}

/// The quality report for one memo. Computed once per run; contains no
/// timestamps so identical input serializes to identical bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub schema_version: String,
    pub document_id: String,
    pub sections_present: BTreeMap<String, bool>,
    pub missing_sections: Vec<String>,
    pub extra_headings: Vec<String>,
    pub executive_answer_word_count: Option<usize>,
    pub red_team_argument_count: Option<usize>,
    pub opinion_level: Option<OpinionLevel>,
    pub total_citations: usize,
    pub citation_summary: BTreeMap<CitationType, usize>,
    pub citations: Vec<Citation>,
    pub citation_issues: Vec<ValidationIssue>,
    pub structural_issues: Vec<ValidationIssue>,
    pub checks_total: usize,
    pub checks_passed: usize,
    pub score: f64,
    pub overall_assessment: OverallAssessment,
}

impl QaReport {
    /// All issues, citation issues first.
    pub fn issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.citation_issues.iter().chain(self.structural_issues.iter())
    }

    pub fn issues_for_rule(&self, rule: RuleId) -> Vec<&ValidationIssue> {
        self.issues().filter(|issue| issue.rule == rule).collect()
    }
}

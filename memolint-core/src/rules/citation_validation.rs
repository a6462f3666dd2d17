use super::engine::RuleTables;
use crate::types::*;
use regex::Regex;
use std::sync::LazyLock;

static PAREN_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((?:[^()]*?\D)?(\d{4})(?:\)|$)").unwrap());
static GUIDANCE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-\d+\b").unwrap());

/// House-style shapes. A citation with no other issue that does not fit its
/// shape gets a low `format-deviation`.
static CANONICAL_IRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:IRC )?§§? \d+[A-Z]*(?:\([0-9A-Za-z]+\))*(?:-\d+[A-Z]*)?$")
        .unwrap()
});
static CANONICAL_REG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Treas\. Reg\. §§? \d+\.\d+[A-Z]*-\d+[A-Z]?(?:\([0-9A-Za-z]+\))*$")
        .unwrap()
});
static CANONICAL_CASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\*[^*]+\*|_[^_]+_), \d+ [A-Z][A-Za-z0-9.' ]*? \d+(?:, \d+(?:[-–]\d+)?)? \([^()]*\d{4}\)$")
        .unwrap()
});
static CANONICAL_GUIDANCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:Notice|Rev\. Rul\.|Rev\. Proc\.) \d{2,4}-\d+, \d{4}(?:-\d+)? (?:I\.R\.B\.|C\.B\.) \d+|(?:CCA|PLR) \d+)$")
        .unwrap()
});
static CANONICAL_TREATY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:, Art\. \d+[A-Za-z]?(?:\(\d+\))*(?:\([a-z]\))*$|^Art\. \d+[A-Za-z]?(?:\(\d+\))* of the )")
        .unwrap()
});
static CANONICAL_OECD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:Art\. \d|¶ ?\d|para\. \d)").unwrap());

#[derive(Debug, Clone, Default)]
pub struct CitationFindings {
    pub issues: Vec<ValidationIssue>,
    pub tally: CheckTally,
}

/// Applies the per-type format rules to extracted citations.
pub struct CitationValidator<'a> {
    tables: &'a RuleTables,
}

impl<'a> CitationValidator<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self { tables }
    }

    pub fn validate_all(&self, citations: &[Citation]) -> Vec<ValidationIssue> {
        self.validate_with_tally(citations).issues
    }

    /// Validate every citation, counting each one as a single check that
    /// passes when it has no issues.
    pub fn validate_with_tally(&self, citations: &[Citation]) -> CitationFindings {
        let mut findings = CitationFindings::default();
        for citation in citations {
            let issues = self.validate(citation);
            findings.tally.record(issues.is_empty());
            findings.issues.extend(issues);
        }
        tracing::debug!(
            "Validated {} citations: {} issues",
            citations.len(),
            findings.issues.len()
        );
        findings
    }

    /// Every rule is evaluated; issues come back in catalog order.
    pub fn validate(&self, citation: &Citation) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut flag = |rule: RuleId, recommendation: String| {
            issues.push(self.tables.issue(IssueSubject::citation(citation), rule, recommendation));
        };

        match citation.citation_type {
            CitationType::Irc if !citation.has_symbol_mark => flag(
                RuleId::MissingSymbol,
                format!("Use 'IRC § {}' not '{}'", citation.key, citation.raw_text),
            ),
            CitationType::TreasuryReg if !citation.has_symbol_mark => flag(
                RuleId::MissingSymbol,
                format!("Use 'Treas. Reg. § {}'", citation.key),
            ),
            _ => {}
        }

        if citation.citation_type == CitationType::Case {
            if !citation.has_italics || !citation.has_court_and_year {
                let mut missing = Vec::new();
                if !citation.has_italics {
                    missing.push("italicize the case name");
                }
                if !citation.has_court_and_year {
                    missing.push("add the reporter and court/year parenthetical, e.g. (Fed. Cir. 2010)");
                }
                flag(RuleId::CaseFormat, format!("Bluebook format: {}", missing.join("; ")));
            } else if !citation.has_pincite {
                flag(
                    RuleId::MissingPincite,
                    "Add a pincite to the page relied on, e.g. '95 T.C. 348, 352 (1990)'".to_string(),
                );
            }
        }

        if citation.citation_type == CitationType::IrsNoticeOrRuling
            && !is_unpublished_guidance(citation)
            && !citation.has_irb_reference
        {
            flag(
                RuleId::MissingIrbReference,
                format!(
                    "Add the I.R.B. citation, e.g. '{}, 2020-40 I.R.B. 600'",
                    citation.key
                ),
            );
        }

        if let Some(reason) = self.fabrication_signal(citation) {
            flag(
                RuleId::PossibleFabrication,
                format!("{reason}: verify against source; mark Unknown if unverifiable"),
            );
        }

        if let Some(reason) = incompleteness(&citation.raw_text) {
            flag(RuleId::IncompleteCitation, format!("Complete the citation ({reason})"));
        }

        if citation.citation_type == CitationType::Unknown {
            flag(
                RuleId::AmbiguousAuthority,
                "Resembles an authority but matches no known format; cite it properly or mark 'Unknown—needs manual check'".to_string(),
            );
        }

        if citation.citation_type == CitationType::Secondary && !citation.labeled_secondary {
            flag(
                RuleId::SecondaryUnlabeled,
                "Label secondary sources with '(secondary)'".to_string(),
            );
        }

        if issues.is_empty() {
            if let Some(expected) = format_deviation(citation) {
                issues.push(self.tables.issue(
                    IssueSubject::citation(citation),
                    RuleId::FormatDeviation,
                    expected,
                ));
            }
        }

        issues
    }

    /// Years outside the plausible range, or a section number without digits.
    fn fabrication_signal(&self, citation: &Citation) -> Option<String> {
        let range = self.tables.config().citations.plausible_years;
        let mut years = PAREN_YEAR
            .captures_iter(&citation.raw_text)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .collect::<Vec<_>>();
        if citation.citation_type == CitationType::IrsNoticeOrRuling {
            years.extend(
                GUIDANCE_YEAR
                    .captures_iter(&citation.raw_text)
                    .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok()),
            );
        }
        if let Some(year) = years.into_iter().find(|year| !range.contains(*year)) {
            return Some(format!(
                "Year {} is outside {}-{}",
                year, range.min, range.max
            ));
        }

        let numbered = matches!(
            citation.citation_type,
            CitationType::Irc | CitationType::TreasuryReg
        );
        if numbered && !citation.key.is_empty() && !citation.key.chars().any(|c| c.is_ascii_digit()) {
            return Some(format!("Section '{}' has no number", citation.key));
        }
        None
    }
}

/// CCAs and PLRs are not published in the I.R.B.
fn is_unpublished_guidance(citation: &Citation) -> bool {
    citation.key.starts_with("CCA ") || citation.key.starts_with("PLR ")
}

fn incompleteness(raw: &str) -> Option<&'static str> {
    let count = |c: char| raw.chars().filter(|&x| x == c).count();
    if count('(') != count(')') {
        return Some("unbalanced parentheses");
    }
    if count('[') != count(']') {
        return Some("unbalanced brackets");
    }
    let trimmed = raw.trim_end();
    if trimmed.ends_with('§') || trimmed.ends_with(',') {
        return Some("dangling section mark or comma");
    }
    if trimmed.ends_with("Art.") {
        return Some("article number missing");
    }
    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        return Some("truncated with an ellipsis");
    }
    None
}

fn format_deviation(citation: &Citation) -> Option<String> {
    let raw = citation.raw_text.as_str();
    if raw.contains("  ") || raw.contains(" ,") {
        return Some("Remove extra spacing".to_string());
    }
    let expected = match citation.citation_type {
        CitationType::Irc if !CANONICAL_IRC.is_match(raw) => "IRC § 951A(a)(1)",
        CitationType::TreasuryReg if !CANONICAL_REG.is_match(raw) => "Treas. Reg. § 1.951A-2(b)(2)(i)",
        CitationType::Case if !CANONICAL_CASE.is_match(raw) => {
            "*Name v. Name*, 123 F.3d 456, 460 (Fed. Cir. 2010)"
        }
        CitationType::IrsNoticeOrRuling if !CANONICAL_GUIDANCE.is_match(raw) => {
            "Notice 2020-69, 2020-40 I.R.B. 600"
        }
        CitationType::Treaty if !CANONICAL_TREATY.is_match(raw) => "[Treaty name], Art. 10(2)",
        CitationType::Oecd if !CANONICAL_OECD.is_match(raw) => {
            "OECD Model Tax Convention, Art. 5, Commentary ¶ 12"
        }
        _ => return None,
    };
    Some(format!("Use house style, e.g. '{expected}'"))
}

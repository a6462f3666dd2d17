use super::content::{FactsSanitizedRule, MemoLengthRule, UnverifiedCitationsRule, UrlAccessDatesRule};
use super::engine::{CheckContext, DocumentRule, RuleTables, StructuralOutcome};
use super::red_team::analyze_blocks;
use crate::types::*;
use regex::Regex;
use std::sync::LazyLock;

static EMPHASIZED_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\*\*|__|\*|_)\s*(should|more likely than not|substantial authority|reasonable authority)\s*[.:]?\s*(?:\*\*|__|\*|_)").unwrap()
});
static PLAIN_LEVEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(more likely than not|substantial authority|reasonable authority)\b").unwrap()
});
static LIST_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s").unwrap());
static LEGEND_ODDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*[~<>]?\s*\d+(?:\s*-\s*\d+)?\s*%").unwrap());

/// Applies the document-level rules in pipeline order.
pub struct StructureChecker<'a> {
    tables: &'a RuleTables,
    rules: Vec<Box<dyn DocumentRule>>,
}

impl<'a> StructureChecker<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self {
            tables,
            rules: vec![
                Box::new(RequiredSectionsRule),
                Box::new(ExecutiveAnswerLengthRule),
                Box::new(RedTeamRule),
                Box::new(OpinionLevelRule),
                Box::new(UnverifiedCitationsRule),
                Box::new(UrlAccessDatesRule),
                Box::new(FactsSanitizedRule),
                Box::new(MemoLengthRule),
            ],
        }
    }

    pub fn check(&self, document: &ParsedDocument, citations: &[Citation]) -> StructuralOutcome {
        let opinion_level = document
            .section(SectionKind::Conclusion)
            .and_then(|conclusion| detect_opinion_level(&conclusion.content));
        let ctx = CheckContext {
            tables: self.tables,
            document,
            citations,
            opinion_level,
        };
        let mut outcome = StructuralOutcome {
            opinion_level,
            ..StructuralOutcome::default()
        };

        outcome.tally.record(document.duplicate_issues.is_empty());
        outcome.issues.extend(document.duplicate_issues.iter().cloned());

        let config = self.tables.config();
        for rule in &self.rules {
            if !config.pipeline.is_enabled(rule.name()) {
                tracing::debug!("Skipping disabled rule: {}", rule.name());
                continue;
            }
            let before = outcome.issues.len();
            rule.check(&ctx, &mut outcome);
            tracing::trace!("{}: {} issues", rule.name(), outcome.issues.len() - before);
        }

        tracing::debug!(
            "Structure check: {}/{} checks passed, {} issues",
            outcome.tally.passed,
            outcome.tally.total,
            outcome.issues.len()
        );
        outcome
    }
}

/// Opinion level stated in the Conclusion. Emphasized levels win over plain
/// ones and prose lines are searched before list lines. Legend lines that
/// give the odds of a level, like "- **Should** (~70-80%)", never count.
pub fn detect_opinion_level(conclusion: &str) -> Option<OpinionLevel> {
    let (list_lines, prose_lines): (Vec<&str>, Vec<&str>) = conclusion
        .lines()
        .filter(|line| !LEGEND_ODDS.is_match(line))
        .partition(|line| LIST_LINE.is_match(line));

    for lines in [&prose_lines, &list_lines] {
        for pattern in [&*EMPHASIZED_LEVEL, &*PLAIN_LEVEL] {
            let found = lines.iter().find_map(|line| {
                let caps = pattern.captures(line)?;
                parse_level(caps.get(1)?.as_str())
            });
            if found.is_some() {
                return found;
            }
        }
    }
    None
}

fn parse_level(text: &str) -> Option<OpinionLevel> {
    let lowered = text.to_lowercase();
    OpinionLevel::ALL
        .into_iter()
        .find(|level| level.label().to_lowercase() == lowered)
}

// ===== RULES =====

/// Every canonical section except the conditional Risk & Penalty Shield.
pub struct RequiredSectionsRule;

impl DocumentRule for RequiredSectionsRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        for kind in SectionKind::ALL.into_iter().filter(|kind| !kind.is_conditional()) {
            let failure = (!ctx.document.has(kind)).then(|| {
                ctx.tables.issue(
                    IssueSubject::section(kind),
                    RuleId::MissingSection,
                    format!("Add a \"## {}\" section", kind.canonical_name()),
                )
            });
            outcome.record(failure);
        }
    }

    fn name(&self) -> &str {
        "RequiredSections"
    }
}

pub struct ExecutiveAnswerLengthRule;

impl DocumentRule for ExecutiveAnswerLengthRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        let Some(section) = ctx.document.section(SectionKind::ExecutiveAnswer) else {
            return;
        };
        let limit = ctx.tables.config().executive_answer.word_limit;
        outcome.executive_answer_word_count = Some(section.word_count);
        let failure = (section.word_count > limit).then(|| {
            ctx.tables.issue(
                IssueSubject::section(SectionKind::ExecutiveAnswer),
                RuleId::ExecAnswerTooLong,
                format!(
                    "Executive Answer is {} words; cut it to {} or fewer",
                    section.word_count, limit
                ),
            )
        });
        outcome.record(failure);
    }

    fn name(&self) -> &str {
        "ExecutiveAnswerLength"
    }
}

/// Exactly N counter-arguments, each with thesis, authority, likelihood and mitigation.
pub struct RedTeamRule;

impl DocumentRule for RedTeamRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        let Some(section) = ctx.document.section(SectionKind::RedTeam) else {
            return;
        };
        let config = &ctx.tables.config().red_team;
        let blocks = analyze_blocks(section, ctx.citations, &config.likelihood_tokens);
        outcome.red_team_argument_count = Some(blocks.len());

        let mut problems = Vec::new();
        if blocks.len() != config.required_blocks {
            problems.push(format!(
                "found {} counter-arguments, expected exactly {}",
                blocks.len(),
                config.required_blocks
            ));
        }
        for (i, block) in blocks.iter().enumerate() {
            let missing = block.missing_fields();
            if !missing.is_empty() {
                problems.push(format!("counter-argument {} lacks {}", i + 1, missing.join(", ")));
            }
        }

        let failure = (!problems.is_empty()).then(|| {
            ctx.tables.issue(
                IssueSubject::section(SectionKind::RedTeam),
                RuleId::RedTeamIncomplete,
                format!("Red-Team: {}", problems.join("; ")),
            )
        });
        outcome.record(failure);
    }

    fn name(&self) -> &str {
        "RedTeam"
    }
}

/// Opinion level in the Conclusion, and the Risk & Penalty Shield it implies.
pub struct OpinionLevelRule;

impl DocumentRule for OpinionLevelRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        // a missing Conclusion is already a missing-section
        if !ctx.document.has(SectionKind::Conclusion) {
            return;
        }
        let failure = ctx.opinion_level.is_none().then(|| {
            let levels: Vec<&str> = OpinionLevel::ALL.iter().map(|l| l.label()).collect();
            ctx.tables.issue(
                IssueSubject::section(SectionKind::Conclusion),
                RuleId::OpinionLevelMissing,
                format!("State an opinion level in bold: {}", levels.join(", ")),
            )
        });
        outcome.record(failure);

        let Some(level) = ctx.opinion_level else {
            return;
        };
        let has_risk = ctx.document.has(SectionKind::RiskAndPenaltyShield);
        let failure = match (level.requires_risk_section(), has_risk) {
            (true, false) => Some(ctx.tables.issue(
                IssueSubject::section(SectionKind::RiskAndPenaltyShield),
                RuleId::MissingSection,
                format!(
                    "An opinion of \"{}\" requires a Risk & Penalty Shield section",
                    level
                ),
            )),
            (false, true) => Some(ctx.tables.issue(
                IssueSubject::section(SectionKind::RiskAndPenaltyShield),
                RuleId::RiskSectionSuperfluous,
                format!(
                    "Risk & Penalty Shield is only needed above \"{}\"; remove it or raise the opinion level",
                    OpinionLevel::SubstantialAuthority
                ),
            )),
            _ => None,
        };
        outcome.record(failure);
    }

    fn name(&self) -> &str {
        "OpinionLevel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::citation_extraction::CitationExtractor;
    use crate::rules::section_detection::SectionParser;

    fn check(text: &str) -> StructuralOutcome {
        let tables = RuleTables::with_defaults().unwrap();
        let document = SectionParser::new(&tables).parse(text);
        let citations = CitationExtractor::new(&tables).extract_all(&document);
        StructureChecker::new(&tables).check(&document, &citations)
    }

    fn rules(outcome: &StructuralOutcome) -> Vec<RuleId> {
        outcome.issues.iter().map(|issue| issue.rule).collect()
    }

    #[test]
    fn test_detect_emphasized_level() {
        assert_eq!(
            detect_opinion_level("On balance, we assess **Should** that the income is excluded."),
            Some(OpinionLevel::Should)
        );
    }

    #[test]
    fn test_plain_should_is_not_a_level() {
        assert_eq!(detect_opinion_level("The client should file by April."), None);
    }

    #[test]
    fn test_plain_multiword_level() {
        assert_eq!(
            detect_opinion_level("It is more likely than not that the position holds."),
            Some(OpinionLevel::MoreLikelyThanNot)
        );
    }

    #[test]
    fn test_prose_wins_over_legend() {
        let conclusion = "We conclude there is **Substantial authority**.\n\nOpinion levels:\n- **Reasonable authority** (~20-30%)\n- **Should** (~70-80%)\n";
        assert_eq!(
            detect_opinion_level(conclusion),
            Some(OpinionLevel::SubstantialAuthority)
        );
    }

    #[test]
    fn test_legend_alone_is_not_a_level() {
        let conclusion = "On balance, we assess [Opinion Level].\n\n- **Reasonable authority** (~20-30%)\n- More likely than not (>50%): likely to be sustained\n";
        assert_eq!(detect_opinion_level(conclusion), None);
    }

    #[test]
    fn test_bulleted_level_counts() {
        assert_eq!(
            detect_opinion_level("Opinion:\n- **More likely than not**\n"),
            Some(OpinionLevel::MoreLikelyThanNot)
        );
    }

    #[test]
    fn test_missing_conclusion_reports_only_missing_section() {
        let outcome = check("## Analysis\n\nText.\n");
        assert!(!rules(&outcome).contains(&RuleId::OpinionLevelMissing));
        assert!(rules(&outcome).contains(&RuleId::MissingSection));
    }

    #[test]
    fn test_conclusion_without_level() {
        let outcome = check("## Conclusion\n\nThe client should proceed.\n");
        assert!(rules(&outcome).contains(&RuleId::OpinionLevelMissing));
    }

    #[test]
    fn test_risk_section_not_required_without_level() {
        let outcome = check("## Conclusion\n\nNo view.\n");
        let risk: Vec<_> = outcome
            .issues
            .iter()
            .filter(|issue| issue.subject == IssueSubject::section(SectionKind::RiskAndPenaltyShield))
            .collect();
        assert!(risk.is_empty());
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let mut config = crate::config::ValidationConfig::default();
        for rule in &mut config.pipeline.rules {
            rule.enabled = rule.name != "RequiredSections";
        }
        let tables = RuleTables::new(config).unwrap();
        let document = SectionParser::new(&tables).parse("## Analysis\n\nText.\n");
        let outcome = StructureChecker::new(&tables).check(&document, &[]);
        assert!(!outcome.issues.iter().any(|i| i.rule == RuleId::MissingSection));
    }
}

use super::engine::{CheckContext, DocumentRule, StructuralOutcome};
use crate::types::*;

/// Content rules can be switched off as a group.
fn content_enabled(ctx: &CheckContext<'_>) -> bool {
    ctx.tables.config().content.enabled
}

/// Sections still carrying the "Unknown—needs manual check" marker.
pub struct UnverifiedCitationsRule;

impl DocumentRule for UnverifiedCitationsRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        if !content_enabled(ctx) {
            return;
        }
        let flag = &ctx.tables.content_patterns().unverified_flag;
        let flagged: Vec<ValidationIssue> = ctx
            .document
            .sections
            .iter()
            .filter_map(|section| {
                let count = flag.find_iter(&section.content).count();
                (count > 0).then(|| {
                    ctx.tables.issue(
                        IssueSubject::section(section.kind),
                        RuleId::UnverifiedCitation,
                        format!(
                            "{} citation(s) still marked \"Unknown—needs manual check\"; verify or remove them",
                            count
                        ),
                    )
                })
            })
            .collect();

        outcome.tally.record(flagged.is_empty());
        outcome.issues.extend(flagged);
    }

    fn name(&self) -> &str {
        "UnverifiedCitations"
    }
}

/// Every URL needs an access date shortly after it.
pub struct UrlAccessDatesRule;

impl DocumentRule for UrlAccessDatesRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        if !content_enabled(ctx) {
            return;
        }
        let config = &ctx.tables.config().content;
        let url = &ctx.tables.content_patterns().url;
        let markers: Vec<String> = config.access_markers.iter().map(|m| m.to_lowercase()).collect();

        for section in &ctx.document.sections {
            let content = section.content.as_str();
            for found in url.find_iter(content) {
                let window_end = floor_char_boundary(content, found.end() + config.url_access_window);
                let window = content[found.end()..window_end].to_lowercase();
                let dated = markers.iter().any(|marker| window.contains(marker.as_str()));
                let failure = (!dated).then(|| {
                    ctx.tables.issue(
                        IssueSubject::section(section.kind),
                        RuleId::UrlMissingAccessDate,
                        format!("Add an access date after {}", found.as_str()),
                    )
                });
                outcome.record(failure);
            }
        }
    }

    fn name(&self) -> &str {
        "UrlAccessDates"
    }
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    if index >= text.len() {
        return text.len();
    }
    (0..=index).rev().find(|&i| text.is_char_boundary(i)).unwrap_or(0)
}

/// Facts must not carry e-mail addresses or exact amounts.
pub struct FactsSanitizedRule;

impl DocumentRule for FactsSanitizedRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        if !content_enabled(ctx) {
            return;
        }
        let Some(facts) = ctx.document.section(SectionKind::Facts) else {
            return;
        };
        let patterns = ctx.tables.content_patterns();
        let emails = patterns.email.find_iter(&facts.content).count();
        let amounts = patterns.exact_amount.find_iter(&facts.content).count();

        let failure = (emails + amounts > 0).then(|| {
            let mut found = Vec::new();
            if emails > 0 {
                found.push(format!("{} e-mail address(es)", emails));
            }
            if amounts > 0 {
                found.push(format!("{} exact dollar amount(s)", amounts));
            }
            ctx.tables.issue(
                IssueSubject::section(SectionKind::Facts),
                RuleId::FactsNotSanitized,
                format!(
                    "Facts contain {}; replace them with placeholders such as [Email] or [Amount]",
                    found.join(" and ")
                ),
            )
        });
        outcome.record(failure);
    }

    fn name(&self) -> &str {
        "FactsSanitized"
    }
}

pub struct MemoLengthRule;

impl DocumentRule for MemoLengthRule {
    fn check(&self, ctx: &CheckContext<'_>, outcome: &mut StructuralOutcome) {
        if !content_enabled(ctx) {
            return;
        }
        let minimum = ctx.tables.config().content.min_total_words;
        let total = ctx.document.total_words;
        let failure = (total < minimum).then(|| {
            ctx.tables.issue(
                IssueSubject::Document,
                RuleId::MemoTooShort,
                format!("Memo has {} words; expected at least {}", total, minimum),
            )
        });
        outcome.record(failure);
    }

    fn name(&self) -> &str {
        "MemoLength"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::engine::RuleTables;
    use crate::rules::section_detection::SectionParser;

    fn run(rule: &dyn DocumentRule, text: &str) -> StructuralOutcome {
        let tables = RuleTables::with_defaults().unwrap();
        let document = SectionParser::new(&tables).parse(text);
        let ctx = CheckContext {
            tables: &tables,
            document: &document,
            citations: &[],
            opinion_level: None,
        };
        let mut outcome = StructuralOutcome::default();
        rule.check(&ctx, &mut outcome);
        outcome
    }

    #[test]
    fn test_unverified_flag_one_issue_per_section() {
        let text = "## Law & Authorities\n\nNotice 2099-1 (Unknown—needs manual check); Rev. Rul. 2098-2 (Unknown -- needs manual check)\n\n## Analysis\n\nFine.\n";
        let outcome = run(&UnverifiedCitationsRule, text);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].recommendation.starts_with("2 citation(s)"));
        assert_eq!(outcome.tally, CheckTally { total: 1, passed: 0 });
    }

    #[test]
    fn test_url_access_date() {
        let text = "## Exhibits\n\n- https://www.irs.gov/pub/irs-drop/n-20-69.pdf (accessed Jan. 5, 2024)\n- https://example.com/report\n";
        let outcome = run(&UrlAccessDatesRule, text);
        assert_eq!(outcome.tally.total, 2);
        assert_eq!(outcome.issues.len(), 1);
        assert!(outcome.issues[0].recommendation.contains("example.com"));
        assert_eq!(outcome.issues[0].severity, Severity::Low);
    }

    #[test]
    fn test_facts_with_email_and_amount() {
        let text = "## Facts\n\nContact cfo@client.com about the $1,234,567.89 payment.\n";
        let outcome = run(&FactsSanitizedRule, text);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].rule, RuleId::FactsNotSanitized);
    }

    #[test]
    fn test_rounded_amounts_are_sanitized() {
        let text = "## Facts\n\n[Third Party Entity A] paid approximately $1.2 million.\n";
        let outcome = run(&FactsSanitizedRule, text);
        assert!(outcome.issues.is_empty());
        assert_eq!(outcome.tally.passed, 1);
    }

    #[test]
    fn test_short_memo() {
        let outcome = run(&MemoLengthRule, "## Facts\n\nToo short.\n");
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].subject, IssueSubject::Document);
    }

    #[test]
    fn test_floor_char_boundary() {
        let text = "a—b";
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 40), text.len());
    }
}

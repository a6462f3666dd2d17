//! Pipeline tests over the fixture memos in `test_fixtures/`.
//!
//! `complete_memo.md` is a clean memo that validates as `ready`. Most tests
//! take it, swap one section or one citation, and assert the exact issues
//! the change produces.

use memolint_core::storage::FileStorage;
use memolint_core::*;
use std::path::PathBuf;

// ============================================================================
// Fixture helpers
// ============================================================================

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_fixtures")
}

fn load_fixture(name: &str) -> String {
    let path = fixtures_dir().join(name);
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Missing fixture: {}", path.display()))
}

fn complete_memo() -> String {
    load_fixture("complete_memo.md")
}

fn validate(text: &str) -> QaReport {
    let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
    processor.validate_text("memo.md", text).unwrap()
}

/// Byte range of a level-2 section's body, from the line after its heading
/// up to the next level-2 heading.
fn section_body_range(text: &str, heading: &str) -> std::ops::Range<usize> {
    let marker = format!("## {heading}\n");
    let start = text
        .find(&marker)
        .unwrap_or_else(|| panic!("fixture has no heading {heading:?}"))
        + marker.len();
    let end = text[start..]
        .find("\n## ")
        .map(|i| start + i + 1)
        .unwrap_or(text.len());
    start..end
}

fn replace_section_body(text: &str, heading: &str, body: &str) -> String {
    let range = section_body_range(text, heading);
    format!("{}\n{}\n\n{}", &text[..range.start], body.trim(), &text[range.end..])
}

fn remove_section(text: &str, heading: &str) -> String {
    let range = section_body_range(text, heading);
    let heading_start = range.start - format!("## {heading}\n").len();
    format!("{}{}", &text[..heading_start], &text[range.end..])
}

fn words(n: usize) -> String {
    vec!["word"; n].join(" ")
}

fn rules(issues: &[ValidationIssue]) -> Vec<RuleId> {
    issues.iter().map(|issue| issue.rule).collect()
}

// ============================================================================
// Complete memo
// ============================================================================

mod complete_memo {
    use super::*;

    #[test]
    fn validates_as_ready() {
        let report = validate(&complete_memo());
        assert_eq!(report.overall_assessment, OverallAssessment::Ready);
        assert!(report.missing_sections.is_empty(), "{:?}", report.missing_sections);
        assert!(report.extra_headings.is_empty(), "{:?}", report.extra_headings);
        assert!(
            report.issues().all(|issue| issue.severity == Severity::Low),
            "unexpected issues: {:#?}",
            report.issues().collect::<Vec<_>>()
        );
    }

    #[test]
    fn every_section_present() {
        let report = validate(&complete_memo());
        assert_eq!(report.sections_present.len(), 10);
        assert!(report.sections_present.values().all(|present| *present));
    }

    #[test]
    fn counts_are_reported() {
        let report = validate(&complete_memo());
        assert_eq!(report.executive_answer_word_count, Some(110));
        assert_eq!(report.red_team_argument_count, Some(3));
        assert_eq!(report.opinion_level, Some(OpinionLevel::Should));
    }

    #[test]
    fn every_citation_type_is_found() {
        let report = validate(&complete_memo());
        for citation_type in [
            CitationType::Irc,
            CitationType::TreasuryReg,
            CitationType::IrsNoticeOrRuling,
            CitationType::Case,
            CitationType::Treaty,
            CitationType::Oecd,
            CitationType::Secondary,
        ] {
            assert!(
                report.citation_summary.get(&citation_type).copied().unwrap_or(0) > 0,
                "no {citation_type:?} citation found"
            );
        }
        assert_eq!(report.citation_summary.get(&CitationType::Unknown), None);
        assert_eq!(report.total_citations, report.citations.len());
    }

    #[test]
    fn citations_are_in_document_order() {
        let report = validate(&complete_memo());
        let first = &report.citations[0];
        assert_eq!(first.section, "Law & Authorities");
        assert_eq!(first.raw_text, "IRC § 951A(c)(2)(A)");
        assert!(report.citations.iter().any(|c| c.section == "Red-Team"));
    }

    #[test]
    fn json_output_is_idempotent() {
        let text = complete_memo();
        let first = to_json(&validate(&text)).unwrap();
        let second = to_json(&validate(&text)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn text_report_shows_ready_status() {
        let rendered = render_text(&validate(&complete_memo()));
        assert!(rendered.contains("QA REPORT: memo.md"));
        assert!(rendered.contains("✓ READY"));
    }
}

// ============================================================================
// Citation defects
// ============================================================================

mod citation_defects {
    use super::*;

    #[test]
    fn missing_symbol_memo_has_major_issues() {
        let report = validate(&load_fixture("missing_symbol_memo.md"));
        assert_eq!(rules(&report.citation_issues), vec![RuleId::MissingSymbol]);
        let issue = &report.citation_issues[0];
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(
            issue.subject,
            IssueSubject::Citation {
                raw_text: "IRC Section 951A(c)(2)(A)".to_string(),
                section: "Analysis".to_string(),
            }
        );
        assert_eq!(report.overall_assessment, OverallAssessment::MajorIssues);
    }

    #[test]
    fn case_without_pincite_needs_revision() {
        let text = complete_memo().replacen("95 T.C. 348, 352 (1990)", "95 T.C. 348 (1990)", 1);
        let report = validate(&text);
        assert_eq!(rules(&report.citation_issues), vec![RuleId::MissingPincite]);
        assert_eq!(report.citation_issues[0].severity, Severity::Medium);
        assert_eq!(report.overall_assessment, OverallAssessment::NeedsRevision);
    }

    #[test]
    fn notice_without_irb_reference() {
        let text = complete_memo().replacen("Notice 2020-69, 2020-39 I.R.B. 604", "Notice 2020-69", 1);
        let report = validate(&text);
        assert_eq!(rules(&report.citation_issues), vec![RuleId::MissingIrbReference]);
    }

    #[test]
    fn citation_issues_lower_the_score() {
        let clean = validate(&complete_memo());
        let defective = validate(&load_fixture("missing_symbol_memo.md"));
        assert_eq!(clean.checks_total, defective.checks_total);
        assert_eq!(defective.checks_passed + 1, clean.checks_passed);
        assert!(defective.score < clean.score);
    }
}

// ============================================================================
// Structural rules
// ============================================================================

mod structure {
    use super::*;

    #[test]
    fn executive_answer_at_limit_passes() {
        let text = replace_section_body(&complete_memo(), "Executive Answer", &words(150));
        let report = validate(&text);
        assert_eq!(report.executive_answer_word_count, Some(150));
        assert!(report.issues_for_rule(RuleId::ExecAnswerTooLong).is_empty());
    }

    #[test]
    fn executive_answer_over_limit() {
        let text = replace_section_body(&complete_memo(), "Executive Answer", &words(151));
        let report = validate(&text);
        assert_eq!(rules(&report.structural_issues), vec![RuleId::ExecAnswerTooLong]);
        assert_eq!(report.structural_issues[0].severity, Severity::Medium);
        assert_eq!(report.overall_assessment, OverallAssessment::NeedsRevision);
    }

    #[test]
    fn two_red_team_blocks_is_incomplete() {
        let memo = complete_memo();
        let start = memo.find("### 3. ").unwrap();
        let end = memo.find("## Risk & Penalty Shield").unwrap();
        let text = format!("{}{}", &memo[..start], &memo[end..]);

        let report = validate(&text);
        assert_eq!(report.red_team_argument_count, Some(2));
        assert_eq!(rules(&report.structural_issues), vec![RuleId::RedTeamIncomplete]);
        assert_eq!(report.structural_issues[0].severity, Severity::High);
    }

    #[test]
    fn should_without_risk_section() {
        let text = remove_section(&complete_memo(), "Risk & Penalty Shield");
        let report = validate(&text);
        assert_eq!(rules(&report.structural_issues), vec![RuleId::MissingSection]);
        let issue = &report.structural_issues[0];
        assert_eq!(issue.severity, Severity::High);
        assert_eq!(issue.subject, IssueSubject::section(SectionKind::RiskAndPenaltyShield));
        assert_eq!(report.overall_assessment, OverallAssessment::MajorIssues);
        assert_eq!(report.sections_present.get("Risk & Penalty Shield"), Some(&false));
    }

    #[test]
    fn reasonable_authority_with_risk_section() {
        let text = replace_section_body(
            &complete_memo(),
            "Conclusion",
            "On balance, we assess **Reasonable authority** that the election is available for 2021.",
        );
        let report = validate(&text);
        assert_eq!(report.opinion_level, Some(OpinionLevel::ReasonableAuthority));
        assert_eq!(rules(&report.structural_issues), vec![RuleId::RiskSectionSuperfluous]);
        assert_eq!(report.structural_issues[0].severity, Severity::Low);
        assert_eq!(report.overall_assessment, OverallAssessment::Ready);
    }

    #[test]
    fn conclusion_without_opinion_level() {
        let text = replace_section_body(
            &complete_memo(),
            "Conclusion",
            "On balance, the election is available for 2021.",
        );
        let report = validate(&text);
        assert_eq!(report.opinion_level, None);
        assert_eq!(rules(&report.structural_issues), vec![RuleId::OpinionLevelMissing]);
    }

    #[test]
    fn missing_required_sections_are_listed() {
        let text = remove_section(&complete_memo(), "Issue Presented");
        let report = validate(&text);
        assert_eq!(report.missing_sections, vec!["Issue Presented".to_string()]);
        assert_eq!(report.sections_present.get("Issue Presented"), Some(&false));
        assert_eq!(report.overall_assessment, OverallAssessment::MajorIssues);
    }

    #[test]
    fn disabled_rule_does_not_run() {
        let mut config = ValidationConfig::default();
        config.pipeline.rules.retain(|rule| rule.name != "ExecutiveAnswerLength");
        let processor = MemoProcessor::new(config).unwrap();
        let text = replace_section_body(&complete_memo(), "Executive Answer", &words(400));
        let report = processor.validate_text("memo.md", &text).unwrap();
        assert!(report.structural_issues.is_empty());
    }
}

// ============================================================================
// Memo layouts
// ============================================================================

mod layouts {
    use super::*;

    const RED_TEAM: &str = "Red-Team (Counter-Arguments)";

    fn with_red_team(body: &str) -> QaReport {
        validate(&replace_section_body(&complete_memo(), RED_TEAM, body))
    }

    #[test]
    fn nested_heading_naming_a_section_stays_in_its_parent() {
        let memo = complete_memo();
        let facts = section_body_range(&memo, "Facts (Sanitized)");
        let body = format!("{}\n\n### Analysis Notes\n\nThe board minutes are attached.", memo[facts].trim());
        let text = replace_section_body(&memo, "Facts (Sanitized)", &body);

        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let stages = processor.capture_stages("memo.md", &text).unwrap();
        let facts = stages.document.section(SectionKind::Facts).unwrap();
        assert!(facts.content.contains("### Analysis Notes"));
        assert!(stages.report.issues_for_rule(RuleId::DuplicateSection).is_empty());
        assert_eq!(stages.report.overall_assessment, OverallAssessment::Ready);
    }

    #[test]
    fn follow_up_subheadings_are_content() {
        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let stages = processor.capture_stages("memo.md", &complete_memo()).unwrap();
        let follow_ups = stages.document.section(SectionKind::FollowUps).unwrap();
        assert!(follow_ups.content.contains("### Follow-Up Questions"));
        assert!(stages.document.duplicate_issues.is_empty());
    }

    #[test]
    fn repeated_section_heading_needs_revision() {
        let memo = complete_memo();
        let text = memo.replacen(
            "## Conclusion\n",
            "## Analysis\n\nA second pass over the timing question.\n\n## Conclusion\n",
            1,
        );
        let report = validate(&text);
        assert_eq!(rules(&report.structural_issues), vec![RuleId::DuplicateSection]);
        let issue = &report.structural_issues[0];
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.subject, IssueSubject::section(SectionKind::Analysis));
        assert_eq!(report.overall_assessment, OverallAssessment::NeedsRevision);
    }

    #[test]
    fn red_team_with_bold_titles_and_bulleted_fields() {
        let body: String = (1..=3)
            .map(|n| {
                format!(
                    "**Counter-argument {n}**\n\n\
                     - **Thesis:** The Service could challenge point {n}.\n\
                     - **Authority:** IRC § 951A(c)(2)(A)\n\
                     - **Likelihood:** Low\n\
                     - **Mitigation:** Keep the workpapers for point {n}.\n\n"
                )
            })
            .collect();
        let report = with_red_team(&body);
        assert_eq!(report.red_team_argument_count, Some(3));
        assert!(report.issues_for_rule(RuleId::RedTeamIncomplete).is_empty());
        assert_eq!(report.overall_assessment, OverallAssessment::Ready);
    }

    #[test]
    fn red_team_with_inline_labels_around_a_case_name() {
        let body: String = (1..=3)
            .map(|n| {
                format!(
                    "### Counter-argument {n}\n\n\
                     **Thesis:** Under Smith v. Jones the Service could argue point {n}. **Likelihood:** Low\n\n\
                     **Authority:** IRC § 951A(c)(2)(A)\n\n\
                     **Mitigation:** Keep the workpapers.\n\n"
                )
            })
            .collect();
        let report = with_red_team(&body);
        assert_eq!(report.red_team_argument_count, Some(3));
        assert!(report.issues_for_rule(RuleId::RedTeamIncomplete).is_empty());
        assert!(
            !report
                .citations
                .iter()
                .any(|c| c.section == "Red-Team" && c.citation_type == CitationType::Case),
            "{:#?}",
            report.citations
        );
        assert_eq!(report.overall_assessment, OverallAssessment::Ready);
    }

    #[test]
    fn treaty_citing_the_oecd_model_in_a_parenthetical() {
        let text = complete_memo().replacen(
            "governs dividend withholding on later distributions.",
            "governs dividend withholding on later distributions (see OECD Model Tax Convention, Art. 10).",
            1,
        );
        let report = validate(&text);
        let raws: Vec<(&CitationType, &str)> = report
            .citations
            .iter()
            .filter(|c| matches!(c.citation_type, CitationType::Treaty | CitationType::Oecd))
            .map(|c| (&c.citation_type, c.raw_text.as_str()))
            .collect();
        assert!(raws.contains(&(&CitationType::Treaty, "Art. 10(2) of the U.S.-Netherlands Income Tax Treaty")));
        assert!(raws.contains(&(&CitationType::Oecd, "OECD Model Tax Convention, Art. 10")));
        assert!(report.citation_issues.is_empty(), "{:#?}", report.citation_issues);
        assert_eq!(report.overall_assessment, OverallAssessment::Ready);
    }
}

// ============================================================================
// Input errors
// ============================================================================

mod input_errors {
    use super::*;

    #[test]
    fn invalid_utf8_is_encoding_error() {
        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let result = processor.validate_bytes("memo.md", b"## Executive Answer\n\xff\xfe");
        assert!(matches!(result, Err(ParseError::Encoding { valid_up_to: 20, .. })));
    }

    #[test]
    fn heading_free_text_is_a_report_not_an_error() {
        let report = validate("Just a paragraph about IRC § 951A.");
        assert_eq!(report.missing_sections.len(), 9);
        assert!(report.sections_present.values().all(|present| !*present));
        assert_eq!(report.overall_assessment, OverallAssessment::MajorIssues);
    }
}

// ============================================================================
// Processor plumbing
// ============================================================================

mod processor {
    use super::*;

    #[test]
    fn batch_results_keep_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let clean = dir.path().join("clean.md");
        let empty = dir.path().join("empty.md");
        let defective = dir.path().join("defective.md");
        std::fs::write(&clean, complete_memo()).unwrap();
        std::fs::write(&empty, "").unwrap();
        std::fs::write(&defective, load_fixture("missing_symbol_memo.md")).unwrap();

        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let results = processor.validate_batch(&[clean.clone(), empty, defective.clone()]);

        assert_eq!(results.len(), 3);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.document_id, clean.display().to_string());
        assert_eq!(first.overall_assessment, OverallAssessment::Ready);
        assert!(matches!(results[1], Err(ParseError::Empty { .. })));
        let third = results[2].as_ref().unwrap();
        assert_eq!(third.document_id, defective.display().to_string());
        assert_eq!(third.overall_assessment, OverallAssessment::MajorIssues);
    }

    #[test]
    fn captured_stages_match_report() {
        let processor = MemoProcessor::new(ValidationConfig::default()).unwrap();
        let stages = processor
            .capture_stages("memo.md", &load_fixture("missing_symbol_memo.md"))
            .unwrap();
        assert_eq!(stages.document.sections.len(), 10);
        assert_eq!(stages.citations.len(), stages.report.total_citations);
        assert_eq!(stages.citation_issues, stages.report.citation_issues);
        assert_eq!(stages.structural_issues, stages.report.structural_issues);
    }

    #[test]
    fn file_cache_serves_repeat_validations() {
        let cache_dir = tempfile::tempdir().unwrap();
        let storage = Box::new(FileStorage::new(cache_dir.path()).unwrap());
        let processor =
            MemoProcessor::new_with_dependencies(ValidationConfig::default(), storage).unwrap();
        let text = load_fixture("missing_symbol_memo.md");

        let fresh = processor.validate_text("memo.md", &text).unwrap();
        let cached_files = std::fs::read_dir(cache_dir.path().join("reports")).unwrap().count();
        assert_eq!(cached_files, 1);

        let cached = processor.validate_text("memo.md", &text).unwrap();
        assert_eq!(cached.citation_issues, fresh.citation_issues);
        assert_eq!(cached.overall_assessment, fresh.overall_assessment);
        assert_eq!(cached.checks_passed, fresh.checks_passed);
    }

    #[test]
    fn cached_report_is_not_reused_for_another_id() {
        let cache_dir = tempfile::tempdir().unwrap();
        let processor =
            MemoProcessor::new_with_cache(ValidationConfig::default(), cache_dir.path()).unwrap();
        let text = complete_memo();
        processor.validate_text("first.md", &text).unwrap();
        let second = processor.validate_text("second.md", &text).unwrap();
        assert_eq!(second.document_id, "second.md");
    }
}

use crate::rules::{CitationFindings, StructuralOutcome};
use crate::types::*;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Folds citation findings and the structural outcome into one report.
pub struct ReportAggregator;

impl ReportAggregator {
    pub fn aggregate(
        document_id: &str,
        document: &ParsedDocument,
        citations: Vec<Citation>,
        findings: CitationFindings,
        outcome: StructuralOutcome,
    ) -> QaReport {
        let sections_present: BTreeMap<String, bool> = SectionKind::ALL
            .iter()
            .map(|kind| (kind.canonical_name().to_string(), document.has(*kind)))
            .collect();
        let missing_sections = document
            .missing_required
            .iter()
            .filter(|kind| !kind.is_conditional())
            .map(|kind| kind.canonical_name().to_string())
            .collect();

        let mut citation_summary: BTreeMap<CitationType, usize> = BTreeMap::new();
        for citation in &citations {
            *citation_summary.entry(citation.citation_type).or_default() += 1;
        }

        let mut tally = findings.tally;
        tally.merge(outcome.tally);
        let score = if tally.total == 0 {
            1.0
        } else {
            tally.passed as f64 / tally.total as f64
        };
        let overall_assessment = assess(findings.issues.iter().chain(outcome.issues.iter()));

        tracing::info!(
            "{}: {} ({}/{} checks passed)",
            document_id,
            overall_assessment,
            tally.passed,
            tally.total
        );

        QaReport {
            schema_version: SCHEMA_VERSION.to_string(),
            document_id: document_id.to_string(),
            sections_present,
            missing_sections,
            extra_headings: document.extra_headings.clone(),
            executive_answer_word_count: outcome.executive_answer_word_count,
            red_team_argument_count: outcome.red_team_argument_count,
            opinion_level: outcome.opinion_level,
            total_citations: citations.len(),
            citation_summary,
            citations,
            citation_issues: findings.issues,
            structural_issues: outcome.issues,
            checks_total: tally.total,
            checks_passed: tally.passed,
            score,
            overall_assessment,
        }
    }
}

/// `major_issues` on any high issue or missing section, `needs_revision` on
/// any medium issue, otherwise `ready`.
pub fn assess<'a>(issues: impl IntoIterator<Item = &'a ValidationIssue>) -> OverallAssessment {
    issues
        .into_iter()
        .fold(OverallAssessment::Ready, |current, issue| {
            let this = if issue.severity == Severity::High || issue.rule == RuleId::MissingSection {
                OverallAssessment::MajorIssues
            } else if issue.severity == Severity::Medium {
                OverallAssessment::NeedsRevision
            } else {
                OverallAssessment::Ready
            };
            worst(current, this)
        })
}

fn worst(a: OverallAssessment, b: OverallAssessment) -> OverallAssessment {
    fn rank(assessment: OverallAssessment) -> u8 {
        match assessment {
            OverallAssessment::Ready => 0,
            OverallAssessment::NeedsRevision => 1,
            OverallAssessment::MajorIssues => 2,
        }
    }
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

pub fn to_json(report: &QaReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize QA report")
}

fn glyph(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "✗",
        Severity::Medium | Severity::Low => "⚠",
    }
}

/// Human-readable report.
pub fn render_text(report: &QaReport) -> String {
    let rule = "=".repeat(60);
    let thin = "-".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{rule}");
    let _ = writeln!(
        out,
        "QA REPORT: {} ({}/{} checks, {:.0}%)",
        report.document_id,
        report.checks_passed,
        report.checks_total,
        report.score * 100.0
    );
    let status = match report.overall_assessment {
        OverallAssessment::Ready => "✓ READY",
        OverallAssessment::NeedsRevision => "⚠ NEEDS REVISION",
        OverallAssessment::MajorIssues => "✗ MAJOR ISSUES",
    };
    let _ = writeln!(out, "Status: {status}");
    let _ = writeln!(out, "{rule}");

    let _ = writeln!(out, "\nSECTIONS:");
    let _ = writeln!(out, "{thin}");
    for kind in SectionKind::ALL {
        let present = report
            .sections_present
            .get(kind.canonical_name())
            .copied()
            .unwrap_or(false);
        let mark = match (present, kind.is_conditional()) {
            (true, _) => "✓",
            (false, true) => "-",
            (false, false) => "✗",
        };
        let _ = writeln!(out, "  {mark} {}", kind.canonical_name());
    }
    for heading in &report.extra_headings {
        let _ = writeln!(out, "  ? {heading} (unrecognized heading)");
    }

    let _ = writeln!(out, "\nCOUNTS:");
    let _ = writeln!(out, "{thin}");
    if let Some(words) = report.executive_answer_word_count {
        let _ = writeln!(out, "  Executive Answer words: {words}");
    }
    if let Some(blocks) = report.red_team_argument_count {
        let _ = writeln!(out, "  Red-Team counter-arguments: {blocks}");
    }
    match report.opinion_level {
        Some(level) => {
            let _ = writeln!(out, "  Opinion level: {level}");
        }
        None => {
            let _ = writeln!(out, "  Opinion level: (not found)");
        }
    }
    let _ = writeln!(out, "  Citations: {}", report.total_citations);
    for (citation_type, count) in &report.citation_summary {
        let _ = writeln!(out, "    - {citation_type}: {count}");
    }

    for (title, issues) in [
        ("CITATION ISSUES", &report.citation_issues),
        ("STRUCTURE ISSUES", &report.structural_issues),
    ] {
        let _ = writeln!(out, "\n{title}:");
        let _ = writeln!(out, "{thin}");
        if issues.is_empty() {
            let _ = writeln!(out, "  ✓ none");
        }
        for issue in issues {
            let _ = writeln!(
                out,
                "  {} [{}] {} {}",
                glyph(issue.severity),
                issue.severity,
                issue.rule,
                issue.subject
            );
            let _ = writeln!(out, "      {}", issue.recommendation);
        }
    }

    let high = report.issues().filter(|i| i.severity == Severity::High).count();
    let medium = report.issues().filter(|i| i.severity == Severity::Medium).count();
    let low = report.issues().filter(|i| i.severity == Severity::Low).count();
    let _ = writeln!(out, "\n{rule}");
    let _ = writeln!(out, "Summary: {high} high, {medium} medium, {low} low");
    let _ = write!(out, "{rule}");
    out
}

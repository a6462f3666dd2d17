use super::engine::{word_count, RuleTables};
use crate::types::*;
use std::collections::HashSet;

/// Splits memo text into canonical sections.
pub struct SectionParser<'a> {
    tables: &'a RuleTables,
}

/// A heading line recognised while scanning. `level` is `None` for
/// bold-only lines.
#[derive(Debug, PartialEq, Eq)]
enum HeadingLine {
    Canonical {
        kind: SectionKind,
        heading: String,
        level: Option<usize>,
    },
    Extra { heading: String, level: usize },
}

struct OpenSection {
    kind: SectionKind,
    heading: String,
    level: Option<usize>,
    line: usize,
    content_start: usize,
}

/// Deeper ATX headings belong to the open section.
fn encloses(open_level: Option<usize>, level: Option<usize>) -> bool {
    matches!((open_level, level), (Some(open), Some(nested)) if nested > open)
}

impl<'a> SectionParser<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self { tables }
    }

    /// Parse the text into ordered sections. Never fails: unrecognised
    /// structure shows up as missing sections and extra headings.
    pub fn parse(&self, text: &str) -> ParsedDocument {
        let mut parsed = ParsedDocument {
            total_words: word_count(text),
            ..ParsedDocument::default()
        };
        let mut seen: HashSet<SectionKind> = HashSet::new();
        let mut open: Option<OpenSection> = None;
        let mut section_level: Option<usize> = None;
        let mut unmatched: Vec<(usize, String)> = Vec::new();
        let mut fence: Option<char> = None;
        let mut offset = 0usize;

        for (index, raw_line) in text.split_inclusive('\n').enumerate() {
            let line_start = offset;
            offset += raw_line.len();
            let line = raw_line.trim_end_matches(['\n', '\r']);

            if let Some(marker) = fence_marker(line) {
                match fence {
                    Some(open_marker) if open_marker == marker => fence = None,
                    None => fence = Some(marker),
                    _ => {}
                }
                continue;
            }
            if fence.is_some() {
                continue;
            }

            let open_level = open.as_ref().and_then(|section| section.level);
            match self.classify_line(line) {
                // subheadings are part of the open section's content
                Some(HeadingLine::Canonical { level, .. }) if encloses(open_level, level) => {}
                Some(HeadingLine::Extra { level, .. }) if encloses(open_level, Some(level)) => {}
                Some(HeadingLine::Canonical { kind, heading, level }) => {
                    if let Some(level) = level {
                        section_level = Some(section_level.map_or(level, |current| current.min(level)));
                    }
                    if let Some(section) = open.take() {
                        self.close_section(&mut parsed, section, &text[..line_start]);
                    }
                    let line_number = index + 1;
                    if seen.insert(kind) {
                        open = Some(OpenSection {
                            kind,
                            heading,
                            level,
                            line: line_number,
                            content_start: offset,
                        });
                    } else {
                        tracing::debug!("Duplicate section heading \"{}\" at line {}", heading, line_number);
                        parsed.duplicate_issues.push(self.tables.issue(
                            IssueSubject::section(kind),
                            RuleId::DuplicateSection,
                            format!(
                                "Merge the repeated \"{}\" heading at line {} into the first occurrence",
                                kind.canonical_name(),
                                line_number
                            ),
                        ));
                    }
                }
                Some(HeadingLine::Extra { heading, level }) => unmatched.push((level, heading)),
                None => {}
            }
        }

        if let Some(section) = open.take() {
            self.close_section(&mut parsed, section, text);
        }

        // Headings above the section level (the memo title) are not extra
        parsed.extra_headings = unmatched
            .into_iter()
            .filter(|(level, _)| section_level.map_or(true, |sections| *level >= sections))
            .map(|(_, heading)| heading)
            .collect();

        parsed.missing_required = SectionKind::ALL
            .iter()
            .copied()
            .filter(|kind| !seen.contains(kind))
            .collect();

        tracing::debug!(
            "Parsed {} sections ({} missing, {} extra headings)",
            parsed.sections.len(),
            parsed.missing_required.len(),
            parsed.extra_headings.len()
        );
        parsed
    }

    fn close_section(&self, parsed: &mut ParsedDocument, section: OpenSection, text_until_end: &str) {
        let body = text_until_end
            .get(section.content_start..)
            .unwrap_or_default()
            .trim();
        parsed.sections.push(Section {
            kind: section.kind,
            name: section.kind.canonical_name().to_string(),
            heading: section.heading,
            order: parsed.sections.len(),
            line: section.line,
            content: body.to_string(),
            word_count: word_count(body),
        });
    }

    fn classify_line(&self, line: &str) -> Option<HeadingLine> {
        if let Some((level, heading)) = atx_heading(line) {
            return Some(match self.tables.match_heading(heading) {
                Some(kind) => HeadingLine::Canonical {
                    kind,
                    heading: heading.to_string(),
                    level: Some(level),
                },
                None => HeadingLine::Extra {
                    heading: heading.to_string(),
                    level,
                },
            });
        }
        // Bold-only lines only count when they name a canonical section
        let heading = bold_heading_text(line)?;
        self.tables.match_heading(heading).map(|kind| HeadingLine::Canonical {
            kind,
            heading: heading.to_string(),
            level: None,
        })
    }
}

pub(crate) fn atx_heading_text(line: &str) -> Option<&str> {
    atx_heading(line).map(|(_, text)| text)
}

/// `#`..`######` followed by whitespace, up to three spaces of indent.
/// Returns the heading level and its text.
fn atx_heading(line: &str) -> Option<(usize, &str)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let hashes = rest.len() - rest.trim_start_matches('#').len();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let after = &rest[hashes..];
    if !after.is_empty() && !after.starts_with([' ', '\t']) {
        return None;
    }
    let text = after.trim().trim_end_matches('#').trim();
    (!text.is_empty()).then_some((hashes, text))
}

/// A line made only of `**Name**` (trailing colon allowed).
fn bold_heading_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    let inner = trimmed.strip_prefix("**")?;
    let inner = inner
        .strip_suffix("**")
        .or_else(|| inner.strip_suffix("**:"))?;
    if inner.contains("**") {
        return None;
    }
    let text = inner.trim().trim_end_matches(':').trim();
    (!text.is_empty()).then_some(text)
}

fn fence_marker(line: &str) -> Option<char> {
    let trimmed = line.trim_start();
    if trimmed.starts_with("```") {
        Some('`')
    } else if trimmed.starts_with("~~~") {
        Some('~')
    } else {
        None
    }
}

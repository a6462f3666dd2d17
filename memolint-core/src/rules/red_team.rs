use super::section_detection::atx_heading_text;
use crate::types::{Citation, Section};
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static FIELD_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__)?(?P<label>(?i:thesis|argument|authority|likelihood|mitigation|response))(?:\*\*|__)?\s*:\s*(?:\*\*|__)?(?P<value>.*)$").unwrap()
});
// A label at line start, bold anywhere, or plain after a sentence end
static INLINE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^\s*(?:[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__)?|(?:\*\*|__)|[.;]\s+)(?P<label>(?i:thesis|argument|authority|likelihood|mitigation|response))(?:\*\*|__)?\s*:\s*(?:\*\*|__)?").unwrap()
});
static NUMBERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+[.)]\s").unwrap());
static BULLET_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[-*+]\s").unwrap());

/// One counter-argument and which of its required parts were found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RedTeamBlock {
    pub span: Range<usize>,
    pub has_thesis: bool,
    pub has_authority: bool,
    pub likelihood: Option<String>,
    pub has_mitigation: bool,
}

impl RedTeamBlock {
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.has_thesis {
            missing.push("thesis");
        }
        if !self.has_authority {
            missing.push("authority citation");
        }
        if self.likelihood.is_none() {
            missing.push("likelihood");
        }
        if !self.has_mitigation {
            missing.push("mitigation");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    fn record_field(
        &mut self,
        label: &str,
        value: &str,
        value_range: &Range<usize>,
        section: &Section,
        citations: &[Citation],
        likelihood_tokens: &[String],
    ) {
        match label.to_ascii_lowercase().as_str() {
            "thesis" | "argument" => self.has_thesis = true,
            "mitigation" | "response" => self.has_mitigation = true,
            "authority" => {
                self.has_authority |= citations
                    .iter()
                    .any(|c| c.section == section.name && value_range.contains(&c.offset));
            }
            "likelihood" => {
                let first = value
                    .split(|c: char| !c.is_alphabetic())
                    .find(|w| !w.is_empty())
                    .unwrap_or_default();
                if let Some(token) = likelihood_tokens
                    .iter()
                    .find(|token| token.eq_ignore_ascii_case(first))
                {
                    self.likelihood = Some(token.clone());
                }
            }
            _ => {}
        }
    }
}

fn lines_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut offset = 0;
    text.split_inclusive('\n')
        .map(|raw| {
            let start = offset;
            offset += raw.len();
            (start, raw.trim_end_matches(['\n', '\r']))
        })
        .collect()
}

fn is_heading(line: &str) -> bool {
    atx_heading_text(line).is_some()
}

/// List items carrying an authority, likelihood or mitigation label continue
/// the current block; only a thesis opens one.
fn opens_block(line: &str) -> bool {
    match FIELD_LABEL.captures(line).and_then(|caps| caps.name("label")) {
        Some(label) => matches!(label.as_str().to_ascii_lowercase().as_str(), "thesis" | "argument"),
        None => true,
    }
}

fn is_numbered_item(line: &str) -> bool {
    NUMBERED_ITEM.is_match(line) && opens_block(line)
}

/// `**Counter-argument 1**` on a line of its own. A bare `**Thesis:**`
/// is a label, not a title.
fn is_bold_title(line: &str) -> bool {
    let trimmed = line.trim();
    let inner = trimmed
        .strip_prefix("**")
        .and_then(|rest| rest.strip_suffix("**").or_else(|| rest.strip_suffix("**:")));
    match inner {
        Some(inner) => !inner.trim().is_empty() && !inner.contains("**") && !FIELD_LABEL.is_match(line),
        None => false,
    }
}

fn is_bullet_item(line: &str) -> bool {
    BULLET_ITEM.is_match(line) && opens_block(line)
}

/// Block boundaries, first kind present wins: headings, numbered items, bold
/// title lines, then top-level bullets.
pub fn split_blocks(content: &str) -> Vec<Range<usize>> {
    let lines = lines_with_offsets(content);
    let delimiters: [fn(&str) -> bool; 4] = [is_heading, is_numbered_item, is_bold_title, is_bullet_item];

    for is_delimiter in delimiters {
        let starts: Vec<usize> = lines
            .iter()
            .filter(|(_, line)| is_delimiter(line))
            .map(|(start, _)| *start)
            .collect();
        if starts.is_empty() {
            continue;
        }
        return starts
            .iter()
            .enumerate()
            .map(|(i, &start)| start..starts.get(i + 1).copied().unwrap_or(content.len()))
            .collect();
    }
    Vec::new()
}

/// Strip emphasis markers; bracketed template placeholders count as empty.
fn filled_value(value: &str) -> Option<&str> {
    let cleaned = value.trim().trim_matches(['*', '_']).trim();
    if cleaned.is_empty() || (cleaned.starts_with('[') && cleaned.ends_with(']')) {
        None
    } else {
        Some(cleaned)
    }
}

/// Analyse the Red-Team section. `citations` are the extracted citations of
/// the whole memo; an authority counts when one of them starts inside its value.
pub fn analyze_blocks(
    section: &Section,
    citations: &[Citation],
    likelihood_tokens: &[String],
) -> Vec<RedTeamBlock> {
    let content = section.content.as_str();
    split_blocks(content)
        .into_iter()
        .map(|span| {
            let mut block = RedTeamBlock {
                span: span.clone(),
                ..RedTeamBlock::default()
            };
            let lines = lines_with_offsets(&content[span.clone()]);

            for (index, (line_start, line)) in lines.iter().enumerate() {
                let labels: Vec<_> = INLINE_LABEL.captures_iter(line).collect();
                for (position, caps) in labels.iter().enumerate() {
                    let (Some(whole), Some(label)) = (caps.get(0), caps.name("label")) else {
                        continue;
                    };
                    let value_end = labels
                        .get(position + 1)
                        .and_then(|next| next.get(0))
                        .map_or(line.len(), |next| next.start());
                    let base = span.start + line_start;
                    let mut value_range = base + whole.end()..base + value_end;
                    // label on its own line: the value is the next non-empty line
                    if position + 1 == labels.len() && line[whole.end()..].trim().is_empty() {
                        if let Some((next_start, next)) = lines[index + 1..]
                            .iter()
                            .find(|(_, l)| !l.trim().is_empty())
                            .filter(|(_, l)| !FIELD_LABEL.is_match(l))
                        {
                            value_range = span.start + next_start..span.start + next_start + next.len();
                        }
                    }
                    let Some(filled) = filled_value(&content[value_range.clone()]) else {
                        continue;
                    };
                    block.record_field(label.as_str(), filled, &value_range, section, citations, likelihood_tokens);
                }
            }

            if block.likelihood.is_none() {
                block.likelihood = inline_likelihood(&content[span], likelihood_tokens);
            }
            block
        })
        .collect()
}

/// "High likelihood" written inline instead of under a label.
fn inline_likelihood(text: &str, tokens: &[String]) -> Option<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphabetic())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    words.windows(2).find_map(|pair| {
        if pair[1] != "likelihood" {
            return None;
        }
        tokens
            .iter()
            .find(|token| token.eq_ignore_ascii_case(&pair[0]))
            .cloned()
    })
}

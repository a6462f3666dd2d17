use super::engine::RuleTables;
use crate::types::*;
use anyhow::Result;
use regex::{Captures, Regex};

/// A span claimed by one matcher, before it becomes a `Citation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedSpan {
    pub start: usize,
    pub end: usize,
    pub key: String,
    pub has_pincite: bool,
    pub has_italics: bool,
    pub has_court_and_year: bool,
}

impl MatchedSpan {
    /// Span over `[start, end)` with trailing whitespace dropped.
    fn new(text: &str, start: usize, end: usize, key: impl Into<String>) -> Self {
        let trimmed = text[start..end].trim_end();
        Self {
            start,
            end: start + trimmed.len(),
            key: key.into(),
            has_pincite: false,
            has_italics: false,
            has_court_and_year: false,
        }
    }
}

/// One entry of the ordered pattern table.
pub trait CitationMatcher: Send + Sync {
    fn citation_type(&self) -> CitationType;
    fn find(&self, text: &str) -> Vec<MatchedSpan>;
}

/// The matcher table in priority order, most specific first.
pub fn default_matchers() -> Result<Vec<Box<dyn CitationMatcher>>> {
    Ok(vec![
        Box::new(CaseMatcher::new()?),
        Box::new(TreasuryRegMatcher::new()?),
        Box::new(IrcMatcher::new()?),
        Box::new(IrsGuidanceMatcher::new()?),
        Box::new(TreatyMatcher::new()?),
        Box::new(OecdMatcher::new()?),
        Box::new(SecondaryMatcher::new()?),
        Box::new(UnknownMatcher::new()?),
    ])
}

// Shared fragments
const SUBSECTIONS: &str = r"(?:\([0-9A-Za-z]{1,6}\)?)*";
const REPORTER: &str =
    r",\s*(?P<volume>\d+)\s+(?P<reporter>[A-Z][A-Za-z0-9.' ]*?)\s+(?P<page>\d+)";
const PINCITE: &str = r"(?:[,:]\s*(?:at\s+)?(?P<pincite>\d+(?:[-–]\d+)?))?";
const COURT_YEAR: &str = r"(?:\s*\((?P<court_year>[^()\n]{0,40}?\d{4})(?P<close>\))?)?";
const ARTICLE: &str = r"(?:,?\s*Art(?:icle|\.)(?:\s*\d+[A-Za-z]?(?:\(\d+\))*(?:\([a-z]\))*)?)?";

/// Leading words that belong to the sentence, not the citation.
const SIGNAL_WORDS: [&str; 12] = [
    "See", "Cf.", "Accord", "Compare", "Contra", "The", "This", "That", "Such", "Under", "Per", "In",
];

fn strip_leading_signals(text: &str, mut start: usize, end: usize) -> usize {
    loop {
        let rest = &text[start..end];
        let Some(word) = rest.split_whitespace().next() else {
            return start;
        };
        let bare = word.trim_end_matches(',');
        if !SIGNAL_WORDS.contains(&bare) || rest.len() == word.len() {
            return start;
        }
        let skipped = rest.len() - rest[word.len()..].trim_start().len();
        start += skipped;
    }
}

fn strip_subsections(section: &str) -> &str {
    section.split('(').next().unwrap_or(section)
}

// ===== CASE =====

pub struct CaseMatcher {
    star_italic: Regex,
    underscore_italic: Regex,
    plain: Regex,
}

impl CaseMatcher {
    pub fn new() -> Result<Self> {
        let tail = format!("(?:{REPORTER}{PINCITE})?{COURT_YEAR}");
        let name_with_party = r"(?:\bv\.|\bvs\.|\bIn re\b)";
        let party = r"[A-Z][\w.'&-]*(?:,?\s+(?:[A-Z][\w.'&-]*|of|the|and|&|de|du)){0,6}";
        Ok(Self {
            // Emphasis must open and close flush against the name, and a
            // `*` belonging to `**` never opens it
            star_italic: Regex::new(&format!(
                r"(?:^|[^*\w])\*(?P<name>(?:{name_with_party}|[^*\s][^*\n]*?{name_with_party})(?:[^*\n]*[^*\s])?)\*{tail}"
            ))?,
            underscore_italic: Regex::new(&format!(
                r"(?:^|[^_\w])_(?P<name>(?:{name_with_party}|[^_\s][^_\n]*?{name_with_party})(?:[^_\n]*[^_\s])?)_{tail}"
            ))?,
            plain: Regex::new(&format!(
                r"(?P<name>{party}\s+vs?\.\s+{party}){REPORTER}{PINCITE}{COURT_YEAR}"
            ))?,
        })
    }

    fn span_from(text: &str, caps: &Captures<'_>, italic: bool) -> Option<MatchedSpan> {
        let whole = caps.get(0)?;
        let name = caps.name("name")?;
        let start = if italic {
            // the opening `*` or `_`
            name.start() - 1
        } else {
            strip_leading_signals(text, whole.start(), name.end())
        };
        let key = text[start.max(name.start())..name.end()].trim().to_string();
        let mut span = MatchedSpan::new(text, start, whole.end(), key);
        span.has_italics = italic;
        span.has_pincite = caps.name("pincite").is_some();
        span.has_court_and_year = caps.name("court_year").is_some();
        Some(span)
    }
}

impl CitationMatcher for CaseMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Case
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        let italic = self
            .star_italic
            .captures_iter(text)
            .chain(self.underscore_italic.captures_iter(text))
            .filter_map(|caps| Self::span_from(text, &caps, true));
        let plain = self
            .plain
            .captures_iter(text)
            .filter_map(|caps| Self::span_from(text, &caps, false));
        italic.chain(plain).collect()
    }
}

// ===== TREASURY REGULATIONS =====

pub struct TreasuryRegMatcher {
    pattern: Regex,
}

impl TreasuryRegMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(&format!(
                r"\b(?:Treas\.?\s*Regs?\.?|Treasury\s+Regulations?)(?:\s*§§?)?(?:\s*(?i:section|sec\.))?\s*(?P<sec>\d+\.[0-9A-Za-z]+(?:-[0-9A-Za-z]+)*{SUBSECTIONS})"
            ))?,
        })
    }
}

impl CitationMatcher for TreasuryRegMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::TreasuryReg
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let sec = caps.name("sec")?.as_str();
                Some(MatchedSpan::new(
                    text,
                    whole.start(),
                    whole.end(),
                    strip_subsections(sec),
                ))
            })
            .collect()
    }
}

// ===== IRC =====

pub struct IrcMatcher {
    prefixed: Regex,
    bare: Regex,
}

impl IrcMatcher {
    pub fn new() -> Result<Self> {
        let range = r"(?:[-–]\d[0-9A-Za-z]*)?";
        Ok(Self {
            prefixed: Regex::new(&format!(
                r"\b(?:IRC|I\.R\.C\.)(?:\s*§§?\s*(?P<sym_sec>(?:\d[0-9A-Za-z]*|[A-Z]{{1,4}}\b){SUBSECTIONS}{range})?|\s+(?:(?i:section|sec\.)\s*)?(?P<sec>\d[0-9A-Za-z]*{SUBSECTIONS}{range}))"
            ))?,
            bare: Regex::new(&format!(r"§§?\s*(?P<sec>\d[0-9A-Za-z]*{SUBSECTIONS})"))?,
        })
    }

    /// `§ 1.951A-2` is a regulation cited without its prefix, not a Code section.
    fn continues_as_regulation(rest: &str) -> bool {
        let mut chars = rest.chars();
        matches!(
            (chars.next(), chars.next()),
            (Some('.') | Some('-'), Some(d)) if d.is_ascii_digit()
        )
    }
}

impl CitationMatcher for IrcMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Irc
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        let prefixed = self.prefixed.captures_iter(text).filter_map(|caps| {
            let whole = caps.get(0)?;
            let sec = caps
                .name("sym_sec")
                .or_else(|| caps.name("sec"))
                .map(|m| strip_subsections(m.as_str()))
                .unwrap_or_default();
            Some(MatchedSpan::new(text, whole.start(), whole.end(), sec))
        });
        let bare = self.bare.captures_iter(text).filter_map(|caps| {
            let whole = caps.get(0)?;
            if Self::continues_as_regulation(&text[whole.end()..]) {
                return None;
            }
            let sec = strip_subsections(caps.name("sec")?.as_str());
            Some(MatchedSpan::new(text, whole.start(), whole.end(), sec))
        });
        prefixed.chain(bare).collect()
    }
}

// ===== IRS GUIDANCE =====

pub struct IrsGuidanceMatcher {
    pattern: Regex,
}

impl IrsGuidanceMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(
                r"\b(?P<kind>Notice|Rev\.\s?Rul\.|Rev\.\s?Proc\.|CCA|PLR)\s+(?P<id>\d{2,4}-\d+|\d{6,})(?P<publication>,\s*\d{4}(?:-\d+)?\s+(?:I\.R\.B\.|C\.B\.)(?:\s+\d+)?)?",
            )?,
        })
    }

    fn normalize_kind(kind: &str) -> &'static str {
        if kind.starts_with("Notice") {
            "Notice"
        } else if kind.contains("Rul") {
            "Rev. Rul."
        } else if kind.contains("Proc") {
            "Rev. Proc."
        } else if kind == "CCA" {
            "CCA"
        } else {
            "PLR"
        }
    }
}

impl CitationMatcher for IrsGuidanceMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::IrsNoticeOrRuling
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let kind = Self::normalize_kind(caps.name("kind")?.as_str());
                let key = format!("{} {}", kind, caps.name("id")?.as_str());
                Some(MatchedSpan::new(text, whole.start(), whole.end(), key))
            })
            .collect()
    }
}

// ===== TREATY =====

pub struct TreatyMatcher {
    patterns: Vec<Regex>,
}

impl TreatyMatcher {
    pub fn new() -> Result<Self> {
        let patterns = [
            // Art. 5 of the U.S.-Canada Treaty
            r"\bArt(?:icle|\.)\s*\d+[A-Za-z]?(?:\(\d+\))*\s+of\s+the\s+[^,;\n()]{0,100}?\b(?:Treaty|Convention)\b".to_string(),
            format!(r"\bConvention\s+[Bb]etween\s+(?:the\s+)?[^,;\n()]{{3,120}}{ARTICLE}"),
            format!(r"\bTechnical\s+Explanation(?:\s+(?:of|to)\s+the\s+[^,;\n()]{{3,120}})?{ARTICLE}"),
            format!(r"\b[A-Z][A-Za-z.]*(?:[-– ][A-Z][A-Za-z.]*)*[ ](?:Treaty|Convention)\b{ARTICLE}"),
        ];
        Ok(Self {
            patterns: patterns
                .iter()
                .map(|p| Regex::new(p))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }
}

impl CitationMatcher for TreatyMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Treaty
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        let mut spans = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.find_iter(text) {
                let start = strip_leading_signals(text, m.start(), m.end());
                let raw = &text[start..m.end()];
                // Model conventions belong to the OECD matcher; a treaty
                // that goes on to name the OECD Model ends before it
                let raw = match raw.find("OECD") {
                    Some(0) => continue,
                    Some(cut) => trim_trailing_connectors(&raw[..cut]),
                    None if raw.contains("Model") => continue,
                    None => raw,
                };
                if !raw.contains("Treaty") && !raw.contains("Convention") {
                    continue;
                }
                let name = raw.split(", Art").next().unwrap_or(raw).trim();
                if matches!(name, "Treaty" | "Convention") {
                    continue;
                }
                let mut span = MatchedSpan::new(text, start, start + raw.len(), name);
                span.has_pincite = raw.contains("Art");
                spans.push(span);
            }
        }
        spans
    }
}

/// "...the Netherlands, following the " -> "...the Netherlands"
fn trim_trailing_connectors(mut text: &str) -> &str {
    loop {
        text = text.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '('));
        match text.rsplit_once(char::is_whitespace) {
            Some((head, last)) if last.chars().all(|c| c.is_lowercase()) => text = head,
            _ => return text,
        }
    }
}

// ===== OECD =====

pub struct OecdMatcher {
    pattern: Regex,
    locator: Regex,
}

impl OecdMatcher {
    pub fn new() -> Result<Self> {
        let keyword = r"(?:Model(?:\s+Tax)?(?:\s+(?:Convention|Rules))?(?:\s+on\s+Income(?:\s+and\s+on\s+Capital)?)?|Commentar(?:y|ies)|Administrative\s+Guidance|(?:Transfer\s+Pricing\s+)?Guidelines)";
        let locators = r"(?:,?\s*(?:Art(?:icle|\.)\s*\d+(?:\.\d+)*[A-Za-z]?(?:\(\d+\))*|Commentary|¶+\s*\d+(?:\.\d+)*|§\s*\d+(?:\.\d+)*|para(?:graph)?s?\.?\s*\d+(?:\.\d+)*|\((?:[A-Za-z]+\s+)?\d{4}\)))*";
        Ok(Self {
            pattern: Regex::new(&format!(
                r"\bOECD\b(?P<base>[^.;\n]{{0,60}}?\b{keyword})(?P<locators>{locators})"
            ))?,
            locator: Regex::new(r"Art|¶|§|para")?,
        })
    }
}

impl CitationMatcher for OecdMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Oecd
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let base = caps.name("base")?;
                let key = text[whole.start()..base.end()].to_string();
                let mut span = MatchedSpan::new(text, whole.start(), whole.end(), key);
                span.has_pincite = caps
                    .name("locators")
                    .is_some_and(|m| self.locator.is_match(m.as_str()));
                Some(span)
            })
            .collect()
    }
}

// ===== SECONDARY =====

pub struct SecondaryMatcher {
    label: Regex,
    marker: Regex,
    list_marker: Regex,
}

impl SecondaryMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            label: Regex::new(r"(?i)\(secondary\)")?,
            marker: Regex::new(
                r"(?:\b\d+\s+)?(?:\bTax\s+Notes(?:\s+(?:International|Int'l|Federal|State|Today))?|\b[A-Z][A-Za-z.]*\s+L\.\s?Rev\.|\bJ\.\s?Tax'n|\bTax\s+Mgmt\.(?:\s+(?:Portfolio|Port\.))?(?:\s+(?:No\.\s*)?\d+(?:-\d+)*(?:\s+[A-Z]{2,4})?)?|\b(?:BNA\s+)?Portfolio\s+(?:No\.\s*)?\d+(?:-\d+)*|\bTreatise\b)(?:\s+\d+(?:,\s*\d+)?)?(?:\s*\((?:[A-Za-z.]+\s+)?\d{4}\))?",
            )?,
            list_marker: Regex::new(r"^(?:[-*+]|\d+[.)])\s+")?,
        })
    }

    /// Start of the clause a `(secondary)` label closes: the line or `;`-separated part.
    fn clause_start(&self, text: &str, label_start: usize) -> usize {
        let before = &text[..label_start];
        let mut start = before.rfind(['\n', ';']).map(|i| i + 1).unwrap_or(0);
        let clause = &text[start..label_start];
        start += clause.len() - clause.trim_start().len();
        if let Some(m) = self.list_marker.find(&text[start..label_start]) {
            start += m.end();
        }
        start
    }
}

impl CitationMatcher for SecondaryMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Secondary
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        let labeled = self.label.find_iter(text).filter_map(|label| {
            let start = self.clause_start(text, label.start());
            let clause = text[start..label.start()].trim();
            if clause.is_empty() {
                return None;
            }
            Some(MatchedSpan::new(text, start, label.end(), clause))
        });
        let marked = self
            .marker
            .find_iter(text)
            .map(|m| MatchedSpan::new(text, m.start(), m.end(), m.as_str().trim()));
        labeled.chain(marked).collect()
    }
}

// ===== UNKNOWN =====

pub struct UnknownMatcher {
    enclosed: Regex,
    year: Regex,
}

impl UnknownMatcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            enclosed: Regex::new(
                r#"\[(?P<bracket>[^\[\]\n]{2,200})\]|"(?P<quote>[^"\n]{2,200})"|“(?P<curly>[^“”\n]{2,200})”"#,
            )?,
            year: Regex::new(r"\(\d{4}\)")?,
        })
    }
}

impl CitationMatcher for UnknownMatcher {
    fn citation_type(&self) -> CitationType {
        CitationType::Unknown
    }

    fn find(&self, text: &str) -> Vec<MatchedSpan> {
        self.enclosed
            .captures_iter(text)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let inner = caps
                    .name("bracket")
                    .or_else(|| caps.name("quote"))
                    .or_else(|| caps.name("curly"))?
                    .as_str();
                let looks_like_authority =
                    self.year.is_match(inner) || inner.contains('§') || inner.contains("Art.");
                looks_like_authority
                    .then(|| MatchedSpan::new(text, whole.start(), whole.end(), inner.trim()))
            })
            .collect()
    }
}

// ===== EXTRACTOR =====

/// Runs the matcher table over section text. Earlier matchers claim spans
/// first; any later span overlapping a claimed one is dropped whole.
pub struct CitationExtractor<'a> {
    tables: &'a RuleTables,
}

impl<'a> CitationExtractor<'a> {
    pub fn new(tables: &'a RuleTables) -> Self {
        Self { tables }
    }

    pub fn extract(&self, section: &Section) -> Vec<Citation> {
        self.extract_from_text(&section.content, &section.name)
    }

    /// Citations of every section, in section order then offset order.
    pub fn extract_all(&self, document: &ParsedDocument) -> Vec<Citation> {
        let citations: Vec<Citation> = document
            .sections
            .iter()
            .flat_map(|section| self.extract(section))
            .collect();
        tracing::debug!(
            "Extracted {} citations from {} sections",
            citations.len(),
            document.sections.len()
        );
        citations
    }

    pub fn extract_from_text(&self, text: &str, section_name: &str) -> Vec<Citation> {
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        let mut citations = Vec::new();

        for matcher in self.tables.matchers() {
            for span in matcher.find(text) {
                if span.start >= span.end {
                    continue;
                }
                let overlaps = claimed
                    .iter()
                    .any(|&(start, end)| span.start < end && start < span.end);
                if overlaps {
                    continue;
                }
                claimed.push((span.start, span.end));
                citations.push(build_citation(text, section_name, matcher.citation_type(), span));
            }
        }

        citations.sort_by_key(|citation| citation.offset);
        citations
    }
}

fn build_citation(
    text: &str,
    section_name: &str,
    citation_type: CitationType,
    span: MatchedSpan,
) -> Citation {
    let raw = &text[span.start..span.end];
    let following = text[span.end..].trim_start();
    let labeled_secondary = raw.to_ascii_lowercase().contains("(secondary)")
        || following
            .get(..11)
            .is_some_and(|next| next.eq_ignore_ascii_case("(secondary)"));
    Citation {
        raw_text: raw.to_string(),
        citation_type,
        section: section_name.to_string(),
        offset: span.start,
        key: span.key,
        has_pincite: span.has_pincite,
        has_italics: span.has_italics,
        has_court_and_year: span.has_court_and_year,
        has_irb_reference: raw.contains("I.R.B.") || raw.contains("C.B."),
        has_symbol_mark: raw.contains('§'),
        labeled_secondary,
    }
}

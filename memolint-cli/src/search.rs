//! Keyword search over public guidance indexes: the yearly Internal Revenue
//! Bulletin index on irs.gov and the OECD Pillar Two page.
//!
//! Both pages are link lists, so a hit is any anchor whose text contains the
//! search term.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use std::time::Duration;

use crate::source_lookup::{http_agent, OECD_TAX_BASE};

const IRS_BASE: &str = "https://www.irs.gov";
const OECD_BASE: &str = "https://www.oecd.org";

static ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#).unwrap()
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceKind {
    Notice,
    RevenueRuling,
    RevenueProcedure,
    Announcement,
    PrivateLetterRuling,
    ChiefCounselAdvice,
    PillarTwo,
    Other,
}

impl GuidanceKind {
    /// Guess the kind of IRS guidance from a link title.
    pub fn detect(title: &str) -> Self {
        let lower = title.to_lowercase();
        let has_word = |word: &str| lower.split(|c: char| !c.is_alphanumeric()).any(|w| w == word);
        if lower.contains("notice") {
            GuidanceKind::Notice
        } else if lower.contains("revenue ruling") || lower.contains("rev. rul.") {
            GuidanceKind::RevenueRuling
        } else if lower.contains("revenue procedure") || lower.contains("rev. proc.") {
            GuidanceKind::RevenueProcedure
        } else if lower.contains("announcement") {
            GuidanceKind::Announcement
        } else if lower.contains("private letter ruling") || has_word("plr") {
            GuidanceKind::PrivateLetterRuling
        } else if lower.contains("chief counsel advice") || has_word("cca") {
            GuidanceKind::ChiefCounselAdvice
        } else {
            GuidanceKind::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GuidanceKind::Notice => "Notice",
            GuidanceKind::RevenueRuling => "Revenue Ruling",
            GuidanceKind::RevenueProcedure => "Revenue Procedure",
            GuidanceKind::Announcement => "Announcement",
            GuidanceKind::PrivateLetterRuling => "Private Letter Ruling",
            GuidanceKind::ChiefCounselAdvice => "Chief Counsel Advice",
            GuidanceKind::PillarTwo => "Pillar Two",
            GuidanceKind::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub kind: GuidanceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// `(title, absolute url)` of every anchor whose text contains `term`,
/// case-insensitively, in page order.
pub fn matching_links(html: &str, origin: &str, term: &str) -> Vec<(String, String)> {
    let term = term.to_lowercase();
    ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let href = caps.get(1)?.as_str().trim();
            let title = anchor_text(caps.get(2)?.as_str());
            if title.is_empty() || !title.to_lowercase().contains(&term) {
                return None;
            }
            let url = if href.starts_with('/') {
                format!("{origin}{href}")
            } else {
                href.to_string()
            };
            Some((title, url))
        })
        .collect()
}

fn anchor_text(inner: &str) -> String {
    let text = TAG.replace_all(inner, " ");
    let text = text
        .replace("&nbsp;", " ")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// HTTP search client for the guidance indexes
pub struct GuidanceSearch {
    agent: ureq::Agent,
}

impl GuidanceSearch {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
        }
    }

    /// Search one year's Internal Revenue Bulletin index.
    pub fn search_irb(&self, year: i32, term: &str) -> Result<Vec<SearchHit>> {
        let html = self.fetch(&format!("{IRS_BASE}/irb/{year}"))?;
        Ok(matching_links(&html, IRS_BASE, term)
            .into_iter()
            .map(|(title, url)| SearchHit {
                kind: GuidanceKind::detect(&title),
                title,
                url,
                year: Some(year),
            })
            .collect())
    }

    /// Search the bulletin indexes of `years`, newest first. A year whose
    /// index cannot be fetched is logged and skipped.
    pub fn search_irb_years(&self, years: impl IntoIterator<Item = i32>, term: &str) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        for year in years {
            match self.search_irb(year, term) {
                Ok(found) => hits.extend(found),
                Err(e) => tracing::warn!("Skipping IRB {year}: {e:#}"),
            }
        }
        hits
    }

    /// Search the OECD Pillar Two model rules page.
    pub fn search_oecd(&self, keyword: &str) -> Result<Vec<SearchHit>> {
        let html = self.fetch(&format!("{OECD_TAX_BASE}/beps/pillar-two-model-rules.htm"))?;
        Ok(matching_links(&html, OECD_BASE, keyword)
            .into_iter()
            .map(|(title, url)| SearchHit {
                title,
                url,
                kind: GuidanceKind::PillarTwo,
                year: None,
            })
            .collect())
    }

    fn fetch(&self, url: &str) -> Result<String> {
        tracing::debug!("GET {}", url);
        let response = self
            .agent
            .get(url)
            .call()
            .with_context(|| format!("Failed to fetch {url}"))?;
        response
            .into_string()
            .with_context(|| format!("Failed to read {url}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IRB_INDEX: &str = r#"
        <ul>
          <li><a href="/irb/2020-41_IRB">Internal Revenue Bulletin: 2020-41</a></li>
          <li><a class="x" href="/pub/irs-drop/n-20-69.pdf"><span>Notice 2020-69</span>: Section&nbsp;951A
              high-tax exclusion</a></li>
          <li><a href='https://www.irs.gov/pub/irs-drop/rr-20-19.pdf'>Rev. Rul. 2020-19 &amp; 951A</a></li>
          <li><a href="/help">Help</a></li>
        </ul>"#;

    #[test]
    fn test_matching_links_filters_and_absolutizes() {
        let links = matching_links(IRB_INDEX, IRS_BASE, "951a");
        assert_eq!(
            links,
            vec![
                (
                    "Notice 2020-69 : Section 951A high-tax exclusion".to_string(),
                    "https://www.irs.gov/pub/irs-drop/n-20-69.pdf".to_string()
                ),
                (
                    "Rev. Rul. 2020-19 & 951A".to_string(),
                    "https://www.irs.gov/pub/irs-drop/rr-20-19.pdf".to_string()
                ),
            ]
        );
    }

    #[test]
    fn test_no_match_is_empty() {
        assert!(matching_links(IRB_INDEX, IRS_BASE, "Subpart F").is_empty());
        assert!(matching_links("", IRS_BASE, "951A").is_empty());
    }

    #[test]
    fn test_guidance_kind_detection() {
        assert_eq!(GuidanceKind::detect("Notice 2020-69"), GuidanceKind::Notice);
        assert_eq!(GuidanceKind::detect("Rev. Rul. 2020-19"), GuidanceKind::RevenueRuling);
        assert_eq!(GuidanceKind::detect("Revenue Procedure 2021-34"), GuidanceKind::RevenueProcedure);
        assert_eq!(GuidanceKind::detect("Announcement 2020-12"), GuidanceKind::Announcement);
        assert_eq!(GuidanceKind::detect("PLR 202001001"), GuidanceKind::PrivateLetterRuling);
        assert_eq!(GuidanceKind::detect("CCA 202101001"), GuidanceKind::ChiefCounselAdvice);
        assert_eq!(GuidanceKind::detect("Accurate withholding"), GuidanceKind::Other);
    }

    #[test]
    fn test_hit_serializes_without_missing_year() {
        let hit = SearchHit {
            title: "GloBE Model Rules".to_string(),
            url: "https://www.oecd.org/x.pdf".to_string(),
            kind: GuidanceKind::PillarTwo,
            year: None,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(json["kind"], "pillar_two");
        assert!(json.get("year").is_none());
    }
}

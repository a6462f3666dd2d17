//! Online citation lookup against public sources
//!
//! IRS guidance is looked up in the irs.gov drop directory, code sections and
//! regulations on Cornell LII, OECD material on oecd.org. A `HEAD` answering
//! 200 means the authority exists, 404 means it does not; anything else is
//! left to the caller.

use memolint_core::{CitationLookup, CitationType, LookupError, LookupOutcome};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

const IRS_DROP_BASE: &str = "https://www.irs.gov/pub/irs-drop";
const LII_USCODE_BASE: &str = "https://www.law.cornell.edu/uscode/text/26";
const LII_CFR_BASE: &str = "https://www.law.cornell.edu/cfr/text/26";
pub const OECD_TAX_BASE: &str = "https://www.oecd.org/tax";

static BEPS_ACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bAction\s+(\d{1,2})\b").unwrap());

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP `CitationLookup` over irs.gov, Cornell LII and oecd.org
pub struct PublicSourceLookup {
    agent: ureq::Agent,
    timeout: Duration,
}

impl PublicSourceLookup {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: http_agent(timeout),
            timeout,
        }
    }

    /// Where an authority would be published, if we know a source for it.
    pub fn source_url(citation_type: CitationType, key: &str) -> Result<String, LookupError> {
        match citation_type {
            CitationType::Irc => Ok(format!("{LII_USCODE_BASE}/{key}")),
            CitationType::TreasuryReg => Ok(format!("{LII_CFR_BASE}/{key}")),
            CitationType::IrsNoticeOrRuling => {
                irs_drop_url(key).ok_or(LookupError::Unsupported(citation_type))
            }
            CitationType::Oecd => oecd_url(key).ok_or(LookupError::Unsupported(citation_type)),
            other => Err(LookupError::Unsupported(other)),
        }
    }

    fn head(&self, url: &str) -> Result<LookupOutcome, LookupError> {
        tracing::debug!("HEAD {}", url);
        match self.agent.head(url).call() {
            Ok(response) if response.status() == 200 => Ok(LookupOutcome::exists(url)),
            Ok(response) => Err(LookupError::Transport(format!(
                "unexpected status {} from {}",
                response.status(),
                url
            ))),
            Err(ureq::Error::Status(404, _)) => Ok(LookupOutcome::not_found(url)),
            Err(ureq::Error::Status(code, _)) => {
                Err(LookupError::Transport(format!("status {code} from {url}")))
            }
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(LookupError::Timeout(self.timeout))
                } else {
                    Err(LookupError::Transport(transport.to_string()))
                }
            }
        }
    }
}

impl Default for PublicSourceLookup {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl CitationLookup for PublicSourceLookup {
    fn lookup(&self, citation_type: CitationType, key: &str) -> Result<LookupOutcome, LookupError> {
        let url = Self::source_url(citation_type, key)?;
        self.head(&url)
    }
}

/// Blocking HTTP agent identifying itself as memolint
pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .user_agent(concat!("memolint/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// `Notice 2020-69` → `.../irs-drop/n-20-69.pdf`. CCAs and PLRs are not
/// published in the drop directory.
fn irs_drop_url(key: &str) -> Option<String> {
    let (kind, id) = key.rsplit_once(' ')?;
    let prefix = match kind {
        "Notice" => "n",
        "Rev. Rul." => "rr",
        "Rev. Proc." => "rp",
        _ => return None,
    };
    let (year, number) = id.split_once('-')?;
    let year = year.get(year.len().checked_sub(2)?..)?;
    let number: u32 = number.parse().ok()?;
    Some(format!("{IRS_DROP_BASE}/{prefix}-{year}-{number:02}.pdf"))
}

/// OECD keys name a product, not a document, so each maps to its landing
/// page. Keys naming none of them are left to manual checking.
fn oecd_url(key: &str) -> Option<String> {
    if key.contains("Model") && key.contains("Convention") {
        return Some(format!(
            "{OECD_TAX_BASE}/treaties/model-tax-convention-on-income-and-on-capital-condensed-version-20745419.htm"
        ));
    }
    if key.contains("Pillar Two") || key.contains("GloBE") {
        return Some(format!("{OECD_TAX_BASE}/beps/pillar-two-model-rules.htm"));
    }
    if key.contains("BEPS") {
        let action = BEPS_ACTION.captures(key)?.get(1)?.as_str();
        return Some(format!("{OECD_TAX_BASE}/beps/beps-actions/action{action}"));
    }
    if key.contains("Transfer Pricing") {
        return Some(format!("{OECD_TAX_BASE}/transfer-pricing"));
    }
    None
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    std::error::Error::source(transport)
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .map(|io| matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irs_drop_urls() {
        assert_eq!(
            irs_drop_url("Notice 2020-69").as_deref(),
            Some("https://www.irs.gov/pub/irs-drop/n-20-69.pdf")
        );
        assert_eq!(
            irs_drop_url("Rev. Rul. 2019-1").as_deref(),
            Some("https://www.irs.gov/pub/irs-drop/rr-19-01.pdf")
        );
        assert_eq!(
            irs_drop_url("Rev. Proc. 2021-34").as_deref(),
            Some("https://www.irs.gov/pub/irs-drop/rp-21-34.pdf")
        );
        assert_eq!(irs_drop_url("PLR 202001001"), None);
    }

    #[test]
    fn test_lii_urls() {
        assert_eq!(
            PublicSourceLookup::source_url(CitationType::Irc, "951A").unwrap(),
            "https://www.law.cornell.edu/uscode/text/26/951A"
        );
        assert_eq!(
            PublicSourceLookup::source_url(CitationType::TreasuryReg, "1.951A-2").unwrap(),
            "https://www.law.cornell.edu/cfr/text/26/1.951A-2"
        );
    }

    #[test]
    fn test_oecd_urls() {
        assert_eq!(
            oecd_url("OECD Model Tax Convention").as_deref(),
            Some("https://www.oecd.org/tax/treaties/model-tax-convention-on-income-and-on-capital-condensed-version-20745419.htm")
        );
        assert_eq!(
            oecd_url("OECD Pillar Two Model Rules").as_deref(),
            Some("https://www.oecd.org/tax/beps/pillar-two-model-rules.htm")
        );
        assert_eq!(
            oecd_url("OECD BEPS Action 7 Guidelines").as_deref(),
            Some("https://www.oecd.org/tax/beps/beps-actions/action7")
        );
        assert_eq!(
            oecd_url("OECD Transfer Pricing Guidelines").as_deref(),
            Some("https://www.oecd.org/tax/transfer-pricing")
        );
        assert_eq!(oecd_url("OECD BEPS Guidelines"), None);
        assert_eq!(oecd_url("OECD Commentary"), None);
    }

    #[test]
    fn test_unsupported_types() {
        assert!(matches!(
            PublicSourceLookup::source_url(CitationType::Case, "Gregory v. Helvering"),
            Err(LookupError::Unsupported(CitationType::Case))
        ));
        assert!(matches!(
            PublicSourceLookup::source_url(CitationType::IrsNoticeOrRuling, "CCA 202101001"),
            Err(LookupError::Unsupported(CitationType::IrsNoticeOrRuling))
        ));
    }
}

use crate::types::{RuleId, SectionKind, Severity};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;

// Default value functions for serde
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub sections: SectionConfig,
    #[serde(default)]
    pub executive_answer: ExecutiveAnswerConfig,
    #[serde(default)]
    pub red_team: RedTeamConfig,
    #[serde(default)]
    pub citations: CitationConfig,
    #[serde(default)]
    pub content: ContentCheckConfig,
    /// Rule -> severity overrides. Rules not listed keep their built-in severity.
    #[serde(default)]
    pub severities: SeverityTable,
    /// Structural and content rules to run, in order
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Alternate heading spellings per canonical section, matched after normalization
    pub aliases: BTreeMap<SectionKind, Vec<String>>,
}

impl Default for SectionConfig {
    fn default() -> Self {
        let mut aliases = BTreeMap::new();
        aliases.insert(
            SectionKind::LawAndAuthorities,
            vec!["Law and Authorities".to_string()],
        );
        aliases.insert(
            SectionKind::RedTeam,
            vec![
                "Red Team".to_string(),
                "Counter-Arguments".to_string(),
                "Counterarguments".to_string(),
            ],
        );
        aliases.insert(
            SectionKind::RiskAndPenaltyShield,
            vec![
                "Risk and Penalty Shield".to_string(),
                "Penalty Shield".to_string(),
            ],
        );
        aliases.insert(
            SectionKind::FollowUps,
            vec![
                "Follow-Up".to_string(),
                "Follow Ups".to_string(),
                "Follow-Ups and Assumptions".to_string(),
            ],
        );
        aliases.insert(
            SectionKind::Exhibits,
            vec!["Evidence List".to_string()],
        );
        Self { aliases }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutiveAnswerConfig {
    /// Maximum words allowed in the Executive Answer (inclusive)
    pub word_limit: usize,
}

impl Default for ExecutiveAnswerConfig {
    fn default() -> Self {
        Self { word_limit: 150 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedTeamConfig {
    /// Exact number of counter-argument blocks required
    pub required_blocks: usize,
    /// Accepted likelihood tokens (case-insensitive)
    pub likelihood_tokens: Vec<String>,
}

impl Default for RedTeamConfig {
    fn default() -> Self {
        Self {
            required_blocks: 3,
            likelihood_tokens: vec!["Low".to_string(), "Medium".to_string(), "High".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitationConfig {
    /// Years outside this range flag `possible-fabrication`
    pub plausible_years: YearRange,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            plausible_years: YearRange {
                min: 1850,
                max: 2035,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: u32,
    pub max: u32,
}

impl YearRange {
    pub fn contains(&self, year: u32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentCheckConfig {
    /// Whether the content rules run at all
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Memos shorter than this are flagged `memo-too-short`
    pub min_total_words: usize,
    /// Characters after a URL searched for an access note
    pub url_access_window: usize,
    /// Words that count as an access note after a URL
    pub access_markers: Vec<String>,
}

impl Default for ContentCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_total_words: 500,
            url_access_window: 100,
            access_markers: vec!["accessed".to_string(), "retrieved".to_string()],
        }
    }
}

/// Severity of every rule. Fixed once the config is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeverityTable {
    overrides: BTreeMap<RuleId, Severity>,
}

impl SeverityTable {
    pub fn severity(&self, rule: RuleId) -> Severity {
        self.overrides
            .get(&rule)
            .copied()
            .unwrap_or_else(|| rule.default_severity())
    }

    pub fn with_override(mut self, rule: RuleId, severity: Severity) -> Self {
        self.overrides.insert(rule, severity);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// List of rules to run in order
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Name of the rule
    pub name: String,
    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PipelineConfig {
    pub fn is_enabled(&self, name: &str) -> bool {
        self.rules
            .iter()
            .find(|rule| rule.name == name)
            .map(|rule| rule.enabled)
            .unwrap_or(false)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let names = [
            "RequiredSections",
            "ExecutiveAnswerLength",
            "RedTeam",
            "OpinionLevel",
            "UnverifiedCitations",
            "UrlAccessDates",
            "FactsSanitized",
            "MemoLength",
        ];
        Self {
            rules: names
                .iter()
                .map(|name| RuleConfig {
                    name: name.to_string(),
                    enabled: true,
                })
                .collect(),
        }
    }
}

impl ValidationConfig {
    /// Load config from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path))?;
        let config: ValidationConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path))?;
        Ok(config)
    }

    /// Load config with fallback to default
    pub fn load_with_fallback(path: Option<&str>) -> Self {
        match path {
            Some(p) => Self::load_from_file(p).unwrap_or_else(|e| {
                tracing::warn!("⚠️  Failed to load config from {}, using defaults: {:#}", p, e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "executive_answer:\n  word_limit: 200\n";
        let config: ValidationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.executive_answer.word_limit, 200);
        assert_eq!(config.red_team.required_blocks, 3);
        assert_eq!(config.citations.plausible_years.min, 1850);
        assert!(config.pipeline.is_enabled("RedTeam"));
    }

    #[test]
    fn test_severity_override() {
        let yaml = "severities:\n  memo-too-short: medium\n";
        let config: ValidationConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.severities.severity(RuleId::MemoTooShort), Severity::Medium);
        assert_eq!(config.severities.severity(RuleId::MissingSymbol), Severity::High);
    }

    #[test]
    fn test_default_config_round_trips_through_yaml() {
        let yaml = ValidationConfig::default().to_yaml().unwrap();
        let parsed: ValidationConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.sections.aliases.len(), 5);
        assert_eq!(parsed.content.min_total_words, 500);
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = ValidationConfig::load_with_fallback(Some("/nonexistent/memolint.yaml"));
        assert_eq!(config.executive_answer.word_limit, 150);
    }
}

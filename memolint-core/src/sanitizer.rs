use regex::{Captures, Regex};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static ENTITY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b[A-Z][a-zA-Z&'\-]+(?:[ \t]+[A-Z][a-zA-Z&'\-]+)*[ \t]+(?:LLC\b|L\.L\.C\.|Inc\.|Inc\b|Incorporated\b|Corp\.|Corp\b|Corporation\b|Ltd\.|Limited\b|LLP\b|L\.P\.|LP\b)").unwrap(),
        Regex::new(r"\b[A-Z][a-zA-Z&'\-]+(?:[ \t]+[A-Z][a-zA-Z&'\-]+)*[ \t]+(?:GmbH|AG|SA|SAS|BV|NV|AB|SpA|Oy)\b").unwrap(),
    ]
});
static TITLED_PEOPLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b([A-Z][a-z]+[ \t]+[A-Z][a-z]+),?[ \t]+(CFO|CEO|President|VP|Vice President)\b").unwrap(),
        Regex::new(r"\b([A-Z][a-z]+[ \t]+[A-Z][a-z]+),?[ \t]+(Manager|Director|Controller|Treasurer)\b").unwrap(),
        Regex::new(r"\b([A-Z][a-z]+[ \t]+[A-Z][a-z]+)[ \t]+\((CFO|CEO|Manager|Director|VP)\)").unwrap(),
    ]
});
static NAME_CONTEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"((?i:signed by|prepared by|reviewed by|contact)[ \t]+)([A-Z][a-z]+[ \t]+[A-Z][a-z]+)").unwrap()
});
static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});
static AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$\s*[\d,]*\d(?:\.\d{2})?(?:\s*(?:million|billion|thousand|USD|EUR|GBP)\b)?").unwrap()
});
static WRITTEN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:one|two|three|four|five|six|seven|eight|nine|ten|twenty|thirty|forty|fifty|hundred|thousand|million|billion)\s+(?:(?:hundred|thousand|million|billion)\s+)?dollars?\b").unwrap()
});
static SENSITIVE_DATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"((?i:signed on|executed on|dated)\s+)([A-Z][a-z]+\s+\d{1,2},\s+\d{4})").unwrap(),
        Regex::new(r"((?i:birth date|DOB|born on)\s*:?\s*)(\d{1,2}/\d{1,2}/\d{4})").unwrap(),
    ]
});

/// What the sanitizer replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RedactionReport {
    pub entities_redacted: usize,
    pub people_redacted: usize,
    pub amounts_redacted: usize,
    pub emails_redacted: usize,
    pub dates_redacted: usize,
    pub total_redactions: usize,
    pub details: Vec<String>,
    /// Placeholder → original. Never serialized.
    #[serde(skip)]
    pub reverse_map: BTreeMap<String, String>,
}

/// Replaces confidential facts with fixed placeholder tokens before a memo
/// is drafted. Independent of the validation pipeline.
#[derive(Debug, Clone)]
pub struct FactSanitizer {
    client: Option<String>,
    preserve_structure: bool,
}

impl Default for FactSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

impl FactSanitizer {
    pub fn new() -> Self {
        Self {
            client: None,
            preserve_structure: true,
        }
    }

    /// Entities starting with the client's name become "[<Client> Entity A]"
    /// instead of "[Third Party Entity A]".
    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        let client = client.into();
        self.client = (!client.trim().is_empty()).then(|| client.trim().to_string());
        self
    }

    /// With `false`, amounts become "[REDACTED]" instead of "[Amount]".
    pub fn preserve_structure(mut self, preserve: bool) -> Self {
        self.preserve_structure = preserve;
        self
    }

    pub fn sanitize(&self, text: &str) -> (String, RedactionReport) {
        let mut pass = Redaction {
            sanitizer: self,
            report: RedactionReport::default(),
            entities: BTreeMap::new(),
            people: BTreeMap::new(),
            person_counter: 0,
        };
        let text = pass.redact_entities(text);
        let text = pass.redact_people(&text);
        let text = pass.redact_emails(&text);
        let text = pass.redact_amounts(&text);
        let text = pass.redact_dates(&text);

        let mut report = pass.report;
        report.total_redactions = report.entities_redacted
            + report.people_redacted
            + report.amounts_redacted
            + report.emails_redacted
            + report.dates_redacted;
        for (original, placeholder) in pass.entities.into_iter().chain(pass.people) {
            report.reverse_map.insert(placeholder, original);
        }
        tracing::debug!("Sanitized text: {} redactions", report.total_redactions);
        (text, report)
    }
}

/// State of a single sanitize call.
struct Redaction<'a> {
    sanitizer: &'a FactSanitizer,
    report: RedactionReport,
    entities: BTreeMap<String, String>,
    people: BTreeMap<String, String>,
    person_counter: usize,
}

fn letter(n: usize) -> String {
    match u8::try_from(n) {
        Ok(n @ 1..=26) => char::from(b'A' + n - 1).to_string(),
        _ => n.to_string(),
    }
}

impl Redaction<'_> {
    fn redact_entities(&mut self, text: &str) -> String {
        let mut text = text.to_string();
        for pattern in ENTITY_PATTERNS.iter() {
            text = pattern
                .replace_all(&text, |caps: &Captures| {
                    let entity = caps[0].to_string();
                    if let Some(placeholder) = self.entities.get(&entity) {
                        return placeholder.clone();
                    }
                    let label = match &self.sanitizer.client {
                        Some(client) if entity.starts_with(client.as_str()) => format!("{client} Entity"),
                        _ => "Third Party Entity".to_string(),
                    };
                    let placeholder = format!("[{} {}]", label, letter(self.entities.len() + 1));
                    self.report.details.push(format!("Entity: {entity} → {placeholder}"));
                    self.report.entities_redacted += 1;
                    self.entities.insert(entity, placeholder.clone());
                    placeholder
                })
                .into_owned();
        }
        text
    }

    fn redact_people(&mut self, text: &str) -> String {
        let mut text = text.to_string();
        for pattern in TITLED_PEOPLE.iter() {
            text = pattern
                .replace_all(&text, |caps: &Captures| {
                    let name = caps[1].to_string();
                    let placeholder = format!("[{}]", &caps[2]);
                    if !self.people.contains_key(&name) {
                        self.report.details.push(format!("Person: {name} → {placeholder}"));
                        self.report.people_redacted += 1;
                        self.people.insert(name, placeholder.clone());
                    }
                    placeholder
                })
                .into_owned();
        }

        NAME_CONTEXT
            .replace_all(&text, |caps: &Captures| {
                let name = caps[2].to_string();
                let placeholder = match self.people.get(&name) {
                    Some(placeholder) => placeholder.clone(),
                    None => {
                        self.person_counter += 1;
                        let placeholder = format!("[Person {}]", self.person_counter);
                        self.report.details.push(format!("Person: {name} → {placeholder}"));
                        self.report.people_redacted += 1;
                        self.people.insert(name, placeholder.clone());
                        placeholder
                    }
                };
                format!("{}{}", &caps[1], placeholder)
            })
            .into_owned()
    }

    fn redact_emails(&mut self, text: &str) -> String {
        EMAIL
            .replace_all(text, |caps: &Captures| {
                self.report.emails_redacted += 1;
                self.report.details.push(format!("Email redacted: {}", &caps[0]));
                "[Email]".to_string()
            })
            .into_owned()
    }

    fn redact_amounts(&mut self, text: &str) -> String {
        let token = if self.sanitizer.preserve_structure {
            "[Amount]"
        } else {
            "[REDACTED]"
        };
        let text = AMOUNT
            .replace_all(text, |caps: &Captures| {
                self.report.amounts_redacted += 1;
                self.report.details.push(format!("Amount redacted: {}", &caps[0]));
                token.to_string()
            })
            .into_owned();
        WRITTEN_AMOUNT
            .replace_all(&text, |caps: &Captures| {
                self.report.amounts_redacted += 1;
                self.report.details.push(format!("Amount redacted: {}", &caps[0]));
                token.to_string()
            })
            .into_owned()
    }

    fn redact_dates(&mut self, text: &str) -> String {
        let mut text = text.to_string();
        for pattern in SENSITIVE_DATES.iter() {
            text = pattern
                .replace_all(&text, |caps: &Captures| {
                    self.report.dates_redacted += 1;
                    self.report.details.push(format!("Date redacted: {}", &caps[2]));
                    format!("{}[Date]", &caps[1])
                })
                .into_owned();
        }
        text
    }
}

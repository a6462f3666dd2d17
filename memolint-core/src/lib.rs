// Memolint Core Library
//
// Validates citations and section structure of structured tax memoranda.
// Main interface for turning memo text into a QA report.

pub mod types;
pub mod error;
pub mod config;
pub mod rules;
pub mod report;
pub mod processor;
pub mod cache;
pub mod storage;
pub mod lookup;
pub mod sanitizer;
pub mod template;

// Re-export main types and functions for easy use
pub use types::*;
pub use error::ParseError;
pub use config::ValidationConfig;
pub use processor::{MemoProcessor, PipelineStages};
pub use report::{render_text, to_json, ReportAggregator};
pub use lookup::{verify_citations, CitationLookup, LookupError, LookupOutcome, LookupStatus, VerificationReport};
pub use sanitizer::{FactSanitizer, RedactionReport};
pub use template::{MemoTemplate, PlanRequest};

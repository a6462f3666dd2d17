// Main rules module - delegates to semantic sub-modules
// - engine.rs: RuleTables, DocumentRule trait and shared utilities
// - section_detection.rs: heading-based section splitting
// - citation_extraction.rs: citation matchers and span claiming
// - citation_validation.rs: per-type citation format rules
// - red_team.rs: counter-argument block analysis
// - structure.rs: document-level structural rules
// - content.rs: content rules (unverified flags, URLs, sanitized facts, length)

pub mod engine;
pub mod section_detection;
pub mod citation_extraction;
pub mod citation_validation;
pub mod red_team;
pub mod structure;
pub mod content;

pub use engine::*;
pub use section_detection::SectionParser;
pub use citation_extraction::{CitationExtractor, CitationMatcher, MatchedSpan};
pub use citation_validation::{CitationFindings, CitationValidator};
pub use red_team::{analyze_blocks, RedTeamBlock};
pub use structure::{detect_opinion_level, StructureChecker};

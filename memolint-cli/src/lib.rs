// All validation lives in memolint-core
// This CLI acts as a thin wrapper around the core library

// CLI-specific modules
pub mod paths;
pub mod search;
pub mod source_lookup;

// Re-export core types for convenience
pub use memolint_core::*;

// Re-export CLI utilities
pub use search::{GuidanceSearch, SearchHit};
pub use source_lookup::PublicSourceLookup;

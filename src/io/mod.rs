//! Input/output operations and error handling.

/// Command-line interface for the demo binary
pub mod cli;
/// Named tunables and `BuildConfig`/`GenerateOptions`
pub mod configuration;
/// `CoreError`, `Result`, and context-enrichment helpers
pub mod error;
/// Serialization of a trained generator to JSON
pub mod persistence;
/// Epoch/loss progress reporting
pub mod progress;

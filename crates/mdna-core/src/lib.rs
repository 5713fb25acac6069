//! # MD&A Harness Core
//!
//! Pure analysis logic for MD&A Harness: the table model, schema
//! inference, financial metrics, chunking, retrieval, narrative
//! generation and report assembly.
//!
//! This crate does no HTTP, filesystem I/O or process setup. External
//! services enter only through the [`capability`] traits, so every stage
//! can run offline with deterministic fallbacks.

pub mod capability;
pub mod chunk;
pub mod format;
pub mod metrics;
pub mod narrative;
pub mod report;
pub mod retrieval;
pub mod schema;
pub mod table;

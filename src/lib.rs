//! # MD&A Harness
//!
//! Generates Management Discussion & Analysis reports from tabular
//! financial data (CSV, TSV, XLSX).
//!
//! The analysis itself (schema inference, metrics, chunking, retrieval and
//! narrative generation) lives in the `mdna-core` crate. This crate adds the
//! application around it: configuration, file loading, the OpenAI and
//! Ollama capability providers, the `mdna` CLI and the HTTP service.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────┐   ┌───────────────┐
//! │   Loader     │──▶│       mdna-core           │──▶│ ReportPayload │
//! │ CSV/TSV/XLSX │   │ metrics → chunks → index  │   │ JSON/markdown │
//! └──────────────┘   │  → narrative (LLM/tmpl)   │   └───────────────┘
//!                    └─────────────┬─────────────┘
//!                                  │ Capability<dyn Embedder>
//!                                  │ Capability<dyn LanguageModel>
//!                           ┌──────┴──────┐
//!                           │ OpenAI /    │
//!                           │ Ollama HTTP │
//!                           └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mdna analyze ./quarterly.csv --format markdown
//! mdna metrics ./quarterly.xlsx
//! mdna serve                    # POST /api/analyze
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Table loading from uploaded bytes |
//! | [`embedding`] | Embedding providers |
//! | [`llm`] | Language-model providers |
//! | [`analyze`] | CLI commands |
//! | [`server`] | HTTP service |

pub mod analyze;
pub mod config;
pub mod embedding;
pub mod http;
pub mod llm;
pub mod loader;
pub mod server;
pub mod timeout;

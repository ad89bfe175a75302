//! Encrypted credential vault for message-broker and cloud backends.
//!
//! Stores per-server usernames, passwords, and extra configuration encrypted
//! at rest, resolves them from a human-entered server address, and records
//! every administrative mutation in an append-only audit trail.
//!
//! ## Modules
//! - `cli` — Command-line handlers
//! - `core` — Business logic (cipher, vault, resolver, audit, probes)
//! - `http` — JSON admin API
//! - `models` — Data structures
//! - `util` — Filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod http;
pub mod models;
pub mod telemetry;
pub mod util;

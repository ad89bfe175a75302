//! Data structures shared by the vault, resolver, and audit trail.

pub mod activity;
pub mod backend;
pub mod config;
pub mod secret;
pub mod server;

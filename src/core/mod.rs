//! Core business logic modules.

pub mod admin;
pub mod audit_log;
pub mod cipher;
pub mod config;
pub mod file_lock;
pub mod mutation;
pub mod paths;
pub mod probe;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod vault;

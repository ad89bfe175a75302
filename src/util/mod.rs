//! Filesystem helpers shared by the stores and the CLI.

pub mod fs;

//! CLI command implementations.

pub mod build;
pub mod graph;
pub mod init;

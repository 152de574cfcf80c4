//! CLI command implementations.

pub mod ingest;
pub mod list;
pub mod whoami;

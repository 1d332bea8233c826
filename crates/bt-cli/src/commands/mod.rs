//! CLI subcommand implementations.

pub mod backup;
pub mod host;
pub mod report;
pub mod sessions;
pub mod status;
pub mod util;

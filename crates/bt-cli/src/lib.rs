//! Browser usage timer CLI library.
//!
//! This crate provides the native messaging host and the offline commands
//! behind the `bt` binary.

mod cli;
pub mod commands;
mod config;
pub mod protocol;

pub use cli::{Cli, Commands, SessionsAction};
pub use config::Config;

//! toggl-watch CLI library.
//!
//! This crate provides the CLI interface for toggl-watch.

mod cli;
pub mod commands;
mod config;
mod source;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use source::TogglSource;

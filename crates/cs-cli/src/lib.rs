//! Cat scale CLI library.
//!
//! This crate provides the CLI interface and the local trigger adapters for
//! the cat scale pipeline.

mod cli;
pub mod commands;
mod config;

pub use cli::{CatsAction, Cli, Commands, Stage};
pub use config::Config;

//! CLI subcommand implementations.

pub mod cats;
pub mod classify;
pub mod events;
pub mod ingest;
pub mod process;
pub mod status;
pub mod util;

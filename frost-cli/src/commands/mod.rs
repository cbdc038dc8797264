//! CLI subcommands.

pub mod config;
pub mod download;
pub mod progress;
pub mod scan;
pub mod serve;

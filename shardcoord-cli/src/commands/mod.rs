//! Subcommand implementations

pub mod config;
pub mod control;
pub mod run;
pub mod status;

//! Subcommand implementations for the update-scout binary.

pub mod doctor;
pub mod run_cmd;

//! CLI subcommand implementations for the dropcart binary.

pub mod check_cmd;
pub mod classify_cmd;
pub mod output;
pub mod run_cmd;

//! revstore command-line library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (reads, writes, watch, gc, run)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, KeyArgs, MatchArg, PayloadArgs};
pub use commands::{execute, execute_once, init_logging, load_settings, Store};

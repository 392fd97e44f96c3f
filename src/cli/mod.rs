//! Command-line interface for tunedex.
//!
//! Scans the library into the catalog, lists it, and serves single tracks
//! through the transcoding proxy.

mod commands;

pub use commands::{Cli, Commands, run_command};

//! Command-line interface: argument parsing and command execution.

pub mod args;
pub mod commands;

pub use args::{Args, Commands, ConvertArgs, InspectArgs};

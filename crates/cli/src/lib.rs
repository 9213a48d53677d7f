//! rkcache CLI library
//!
//! The binary in `main.rs` is a thin wrapper: it parses arguments, installs
//! tracing and hands the command to [`commands::execute`].

pub mod cli;
pub mod commands;
pub mod tracing;

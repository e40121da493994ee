//! TeamForge Migration Library
//!
//! Wiring and output formatting for the `teamforge-migrate` CLI. The binary
//! (main.rs) only parses arguments and dispatches.

pub mod context;
pub mod render;

//! Configuration module
//!
//! Handles user configuration (`~/.config/branch-cleaner/config.toml`),
//! layered with `BC_*` environment variables and CLI overrides.

mod settings;

pub use settings::*;

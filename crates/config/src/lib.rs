//! Typed configuration for the indexing pipeline, loaded from TOML by the caller.

pub mod config;

pub use config::*;

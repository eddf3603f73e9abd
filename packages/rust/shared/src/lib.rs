//! Shared types, error model, and configuration for SchoolForge.
//!
//! This crate is the foundation depended on by all other SchoolForge crates.
//! It provides:
//! - [`SchoolForgeError`] — the unified error type
//! - Domain types ([`School`], [`Field`], [`FieldValue`], [`SourceConfig`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchConfig, FetchConfig, StoreConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{Result, SchoolForgeError};
pub use types::{
    Association, Field, FieldKind, FieldValue, FieldValues, MISSING_SENTINEL, School, SchoolId,
    SourceConfig, SourceSummary,
};

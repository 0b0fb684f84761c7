//! Shared types, error model, and configuration for Arxivist.
//!
//! This crate is the foundation depended on by all other Arxivist crates.
//! It provides:
//! - [`ArxivistError`] — the unified error type
//! - Domain types ([`Paper`], [`Chunk`], [`ContextMatch`], [`ToolServer`], [`RunId`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CompletionConfig, FirecrawlConfig, NotionConfig, PathsConfig, PineconeConfig,
    SearchConfig, TimeoutsConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, notion_database_id, resolve_path, validate_credentials,
};
pub use error::{ArxivistError, Result};
pub use types::{
    Chunk, ChunkMeta, ContextMatch, Interaction, MatchMeta, Paper, Phase, RunId, SourceRef,
    ToolServer,
};

//! Configuration module for Bconomy-Sync
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use bconomy_sync::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawling {} shards", config.crawler.shard_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, ConnectionConfig, CrawlerConfig, OutputConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, endpoint_url, load_config, load_config_with_hash, CLIENT_TOKEN_ENV,
};

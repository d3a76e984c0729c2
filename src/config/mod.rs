//! Configuration module for Sumi-Extract
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! All sections are optional; missing keys fall back to their defaults.
//!
//! # Example
//!
//! ```no_run
//! use sumi_extract::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sumi.toml")).unwrap();
//! println!("Overwrite existing records: {}", config.pipeline.overwrite);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{Config, FetchConfig, PipelineConfig, StorageConfig, UserAgentConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

// Re-export validation for settings changed after loading
pub use validation::validate;

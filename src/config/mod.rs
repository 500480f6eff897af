//! Configuration module for Site-Mirror
//!
//! This module handles loading and validating the optional TOML configuration
//! file, and resolving it into the immutable [`RuntimeSettings`] a crawl run
//! shares between its workers.
//!
//! # Example
//!
//! ```no_run
//! use site_mirror::config::{load_config, RuntimeSettings};
//! use std::path::Path;
//!
//! let config = load_config(Path::new("mirror.toml")).unwrap();
//! let settings = RuntimeSettings::resolve(&config).unwrap();
//! println!("Mirroring {} into {}", settings.target_domain, settings.crawl_root.display());
//! ```

mod parser;
mod settings;
mod types;
mod validation;

// Re-export types
pub use types::{Config, ConsistencyMode, CrawlerConfig, OutputConfig, UserAgentConfig};

pub use parser::{compute_config_hash, load_config, parse_config};
pub use settings::{RuntimeSettings, DOCUMENTS_DIR, LOG_FILENAME, STORE_FILENAME};
pub use validation::validate;

//! Immutable per-run settings
//!
//! A [`RuntimeSettings`] value is resolved once from a validated [`Config`]
//! and shared read-only (behind an `Arc`) by every worker.

use crate::config::parser::compute_config_hash;
use crate::config::types::{Config, ConsistencyMode};
use crate::config::validation::validate;
use crate::url::{canonicalize, domain_key, output_folder_name};
use crate::{ConfigError, MirrorError};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Subdirectory of the crawl root that holds downloaded documents
pub const DOCUMENTS_DIR: &str = "crawled";

/// Task store file inside the crawl root
pub const STORE_FILENAME: &str = "queue.sqlite3";

/// Log file inside the crawl root
pub const LOG_FILENAME: &str = "crawler.log";

/// Everything a crawl run needs to know, resolved up front
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    /// Canonical start URL, also the seed task
    pub start_url: Url,

    /// Domain key every crawled URL must share
    pub target_domain: String,

    /// `<output-dir>/<site folder>`: store, log and pid lock live here
    pub crawl_root: PathBuf,

    /// `<crawl root>/crawled`: mirrored documents live here
    pub documents_root: PathBuf,

    pub store_path: PathBuf,

    /// `None` when logging to stdout
    pub log_path: Option<PathBuf>,

    pub workers: usize,
    pub http_timeout: Duration,
    pub pause_between_jobs: Duration,
    pub consistency: ConsistencyMode,
    pub user_agent: String,

    /// Replaces the built-in public suffix list when set
    pub public_suffix_list: Option<PathBuf>,

    /// Hash of the effective configuration, recorded with each run
    pub config_hash: String,
}

impl RuntimeSettings {
    /// Validates `config` and derives the run settings from it
    pub fn resolve(config: &Config) -> Result<Self, MirrorError> {
        validate(config)?;

        let raw_url = config
            .crawler
            .start_url
            .as_deref()
            .ok_or(ConfigError::Missing("start-url"))?;
        let start_url = canonicalize(raw_url)?;
        let target_domain = domain_key(&start_url)?;

        let output_dir = config
            .output
            .output_dir
            .as_ref()
            .ok_or(ConfigError::Missing("output-dir"))?;
        let output_dir = std::fs::canonicalize(output_dir)
            .map_err(|e| MirrorError::filesystem(output_dir, e))?;

        let crawl_root = output_dir.join(output_folder_name(&start_url)?);
        let documents_root = crawl_root.join(DOCUMENTS_DIR);
        let store_path = crawl_root.join(STORE_FILENAME);
        let log_path = if config.output.log_to_stdout {
            None
        } else {
            Some(crawl_root.join(LOG_FILENAME))
        };

        Ok(Self {
            start_url,
            target_domain,
            crawl_root,
            documents_root,
            store_path,
            log_path,
            workers: config.crawler.workers as usize,
            http_timeout: Duration::from_secs(config.crawler.http_timeout),
            pause_between_jobs: Duration::from_millis(config.crawler.pause_between_jobs),
            consistency: config.crawler.consistency,
            user_agent: config.user_agent.header_value(),
            public_suffix_list: config.crawler.public_suffix_list.clone(),
            config_hash: compute_config_hash(config)?,
        })
    }

    /// Creates the crawl root and documents directory if missing
    pub fn prepare_dirs(&self) -> Result<(), MirrorError> {
        for dir in [&self.crawl_root, &self.documents_root] {
            std::fs::create_dir_all(dir).map_err(|e| MirrorError::filesystem(dir, e))?;
        }
        Ok(())
    }
}

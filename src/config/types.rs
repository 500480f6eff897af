use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Main configuration structure for Site-Mirror
///
/// Every section may be omitted from the file; CLI flags fill in or override
/// individual values before validation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub output: OutputConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Absolute URL where crawling starts; defines the target domain
    pub start_url: Option<String>,

    /// Number of workers fetching in parallel
    pub workers: u32,

    /// Per-request timeout (seconds)
    pub http_timeout: u64,

    /// Pause between jobs, and between polls of an empty queue (milliseconds)
    pub pause_between_jobs: u64,

    /// How dequeued-but-unfinished tasks are tracked
    pub consistency: ConsistencyMode,

    /// Public suffix list file (publicsuffix.org format) for the cookie jar;
    /// the built-in list is used when unset
    pub public_suffix_list: Option<PathBuf>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            start_url: None,
            workers: 1,
            http_timeout: 5,
            pause_between_jobs: 200,
            consistency: ConsistencyMode::default(),
            public_suffix_list: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Existing directory that receives one subfolder per crawled site
    pub output_dir: Option<PathBuf>,

    /// Log to stdout instead of `crawler.log` in the crawl root
    pub log_to_stdout: bool,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// Name of the crawler
    pub crawler_name: String,

    /// Version of the crawler
    pub crawler_version: String,

    /// URL with information about the crawler
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: env!("CARGO_PKG_NAME").to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Formats the `User-Agent` header value
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(url) => format!(
                "{}/{} (+{})",
                self.crawler_name, self.crawler_version, url
            ),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// How the task store treats tasks between dequeue and `mark_processed`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyMode {
    /// Dequeue removes the task outright; the filesystem check is the only
    /// guard for a task lost to a crash
    #[default]
    Split,

    /// Dequeue records a durable claim that is requeued on the next open
    Journaled,
}

impl ConsistencyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Split => "split",
            Self::Journaled => "journaled",
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsistencyMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(Self::Split),
            "journaled" => Ok(Self::Journaled),
            other => Err(ConfigError::Validation(format!(
                "consistency must be 'split' or 'journaled', got '{}'",
                other
            ))),
        }
    }
}

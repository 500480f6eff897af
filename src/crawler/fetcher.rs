//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building one HTTP client per run with the configured user agent,
//!   timeout and a public-suffix-aware cookie jar
//! - GET requests that classify the response before the body is stored
//! - Mapping Content-Type values to file extensions
//! - Error classification

use crate::config::RuntimeSettings;
use crate::MirrorError;
use publicsuffix::List;
use reqwest::{header::CONTENT_TYPE, redirect::Policy, Client, ClientBuilder};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use std::path::Path;
use std::sync::Arc;
use url::Url;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// Public suffixes used when no list file is configured
const BUILTIN_PUBLIC_SUFFIXES: &str = include_str!("public_suffix_list.dat");

/// Content types worth mirroring, with the extension their documents get
pub const ALLOWED_CONTENT_TYPES: &[(&str, &str)] = &[
    ("text/html", "html"),
    ("text/css", "css"),
    ("application/javascript", "js"),
    ("text/javascript", "js"),
    ("text/plain", "txt"),
    ("application/json", "json"),
    ("application/xml", "xml"),
    ("text/xml", "xml"),
];

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched a document of an allowed type
    Success {
        /// HTTP status code
        status_code: u16,
        /// Normalized media type (parameters stripped, lowercase)
        content_type: String,
        /// Extension derived from the media type
        extension: &'static str,
        /// Raw body
        body: Vec<u8>,
    },

    /// Status outside [200, 300)
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Media type is not in [`ALLOWED_CONTENT_TYPES`]
    ContentMismatch {
        /// The normalized Content-Type received
        content_type: String,
    },

    /// Transport failure: connection refused, timeout, too many redirects,
    /// truncated body, ...
    NetworkError {
        /// Error description
        error: String,
    },
}

impl FetchResult {
    /// True if the body is an HTML document worth scanning for links
    pub fn is_html(&self) -> bool {
        matches!(self, Self::Success { content_type, .. } if content_type == "text/html")
    }
}

/// Normalizes a raw Content-Type header value
///
/// Parameters are stripped, then whitespace trimmed and the result lowercased,
/// so `"Text/HTML ; charset=utf-8"` becomes `"text/html"`.
pub fn normalize_content_type(raw: &str) -> String {
    raw.split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// Maps a raw Content-Type header value to its file extension
///
/// Returns `None` for media types the crawler does not mirror.
pub fn classify_content_type(raw: &str) -> Option<&'static str> {
    let media_type = normalize_content_type(raw);
    ALLOWED_CONTENT_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == media_type)
        .map(|(_, ext)| *ext)
}

/// Distinct extensions a stored document can carry
pub fn allowed_extensions() -> Vec<&'static str> {
    let mut extensions: Vec<&'static str> = Vec::new();
    for (_, ext) in ALLOWED_CONTENT_TYPES {
        if !extensions.contains(ext) {
            extensions.push(ext);
        }
    }
    extensions
}

/// Loads the public suffix list the cookie jar checks `Domain` attributes
/// against
///
/// Reads `path` when given, otherwise the built-in list.
pub fn load_public_suffix_list(path: Option<&Path>) -> Result<List, MirrorError> {
    let (source_name, text) = match path {
        Some(path) => (
            path.display().to_string(),
            std::fs::read_to_string(path).map_err(|e| MirrorError::filesystem(path, e))?,
        ),
        None => ("(built-in)".to_string(), BUILTIN_PUBLIC_SUFFIXES.to_string()),
    };

    text.parse::<List>()
        .map_err(|e| MirrorError::PublicSuffixList {
            source_name,
            reason: format!("{:?}", e),
        })
}

/// HTTP client shared by all workers of a run
///
/// Cloning is cheap; clones share the connection pool and the cookie jar, so
/// cookies set by the site persist for the whole run. The jar refuses cookies
/// whose `Domain` is a public suffix, so a site cannot plant cookies for its
/// neighbours under the same suffix.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    /// Builds the run's HTTP client
    ///
    /// # Arguments
    ///
    /// * `settings` - Supplies the user agent, per-request timeout and
    ///   public suffix list
    ///
    /// # Returns
    ///
    /// * `Ok(Fetcher)` - Successfully built HTTP client
    /// * `Err(MirrorError)` - Unreadable suffix list, or the client failed to
    ///   build (e.g. TLS backend init)
    pub fn new(settings: &RuntimeSettings) -> Result<Self, MirrorError> {
        let suffixes = load_public_suffix_list(settings.public_suffix_list.as_deref())?;
        let client = client_builder(settings, suffixes).build()?;

        Ok(Self { client })
    }

    /// Fetches a URL and classifies the response
    ///
    /// # Classification
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | Transport failure or timeout | `NetworkError` |
    /// | Status outside [200, 300) | `HttpError` |
    /// | Media type not allowed | `ContentMismatch` |
    /// | Body read fails | `NetworkError` |
    /// | Otherwise | `Success` |
    ///
    /// Only a `Success` reads the body.
    pub async fn fetch(&self, url: &Url) -> FetchResult {
        let response = match self.client.get(url.as_str()).send().await {
            Ok(response) => response,
            Err(e) => return classify_transport_error(&e),
        };

        let status = response.status();
        if !status.is_success() {
            return FetchResult::HttpError {
                status_code: status.as_u16(),
            };
        }

        let raw_content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        let content_type = normalize_content_type(raw_content_type);

        let Some(extension) = classify_content_type(&content_type) else {
            return FetchResult::ContentMismatch { content_type };
        };

        match response.bytes().await {
            Ok(body) => FetchResult::Success {
                status_code: status.as_u16(),
                content_type,
                extension,
                body: body.to_vec(),
            },
            Err(e) => classify_transport_error(&e),
        }
    }
}

fn client_builder(settings: &RuntimeSettings, suffixes: List) -> ClientBuilder {
    let jar = CookieStoreMutex::new(CookieStore::new(Some(suffixes)));

    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(settings.http_timeout)
        .connect_timeout(settings.http_timeout)
        .redirect(Policy::limited(MAX_REDIRECTS))
        .cookie_provider(Arc::new(jar))
        .gzip(true)
        .brotli(true)
}

fn classify_transport_error(e: &reqwest::Error) -> FetchResult {
    let error = if e.is_timeout() {
        format!("Request timeout: {}", e)
    } else if e.is_connect() {
        format!("Connection failed: {}", e)
    } else if e.is_redirect() {
        format!("Redirect error: {}", e)
    } else {
        e.to_string()
    };
    FetchResult::NetworkError { error }
}

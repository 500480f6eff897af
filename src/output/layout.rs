//! Mapping from URLs to document paths on disk
//!
//! A URL path maps to a directory tree under the documents root. The last
//! path segment becomes the file name; an empty last segment (the site root or
//! any URL ending in `/`) becomes [`ROOT_FILENAME`]. Query parameters are
//! folded into the name, sorted by parameter name, so `/list?b=2&a=1` and
//! `/list?a=1&b=2` land on the same file.
//!
//! Names without an extension get one derived from the response's Content-Type,
//! which is only known after fetching. Root names additionally get an
//! extension-less marker file, so the "already downloaded" check can find
//! them without knowing the extension.

use crate::crawler::allowed_extensions;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use url::Url;

/// File name used for URLs with an empty last path segment
pub const ROOT_FILENAME: &str = "index";

/// Suffix of in-progress downloads
pub const TEMP_SUFFIX: &str = ".temp";

/// Where a URL's document lives under the documents root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPath {
    dir: PathBuf,
    stem: String,
    has_extension: bool,
    is_root: bool,
}

impl DocumentPath {
    /// Derives the document path for `url`
    pub fn for_url(documents_root: &Path, url: &Url) -> Self {
        let trimmed = url.path().trim_matches('/');
        let mut segments: Vec<String> = trimmed
            .split('/')
            .filter(|s| !s.is_empty())
            .map(sanitize_segment)
            .collect();

        let last = if url.path().ends_with('/') {
            None
        } else {
            segments.pop()
        };

        let mut dir = documents_root.to_path_buf();
        for segment in &segments {
            dir.push(segment);
        }

        let (base, is_root) = match last {
            Some(name) => (name, false),
            None => (ROOT_FILENAME.to_string(), true),
        };
        let has_extension = !is_root && base.contains('.');

        let stem = match query_suffix(url) {
            Some(suffix) => format!("{}__{}", base, suffix),
            None => base,
        };

        Self {
            dir,
            stem,
            has_extension,
            is_root,
        }
    }

    /// Directory that holds the document
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name before any derived extension
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// True if the URL's own name already carries an extension
    pub fn has_extension(&self) -> bool {
        self.has_extension
    }

    /// True for URLs with an empty last path segment
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// Path named exactly after the URL: the document itself when the URL
    /// carries an extension, the marker file for root URLs
    pub fn exact_path(&self) -> PathBuf {
        self.dir.join(&self.stem)
    }

    /// Final document path once the Content-Type's extension is known
    pub fn final_path(&self, extension: &str) -> PathBuf {
        if self.has_extension {
            self.exact_path()
        } else {
            self.dir.join(format!("{}.{}", self.stem, extension))
        }
    }

    /// Marker file path; only root documents get one
    pub fn marker_path(&self) -> Option<PathBuf> {
        self.is_root.then(|| self.exact_path())
    }

    /// Every path under which this URL's document may already be stored,
    /// documents before the marker
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        if !self.has_extension {
            for ext in allowed_extensions() {
                candidates.push(self.final_path(ext));
            }
        }
        candidates.push(self.exact_path());
        candidates
    }
}

/// Temp sibling of a final document path
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut name = final_path.as_os_str().to_os_string();
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

/// Makes one URL path segment safe to use as a file or directory name
fn sanitize_segment(segment: &str) -> String {
    match segment {
        "." | ".." => "_".to_string(),
        _ => segment.replace(['*', '\\'], "_"),
    }
}

/// Query parameters sorted by name, `name-v1-v2` joined with `_`
fn query_suffix(url: &Url) -> Option<String> {
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.into_owned())
            .or_default()
            .push(value.into_owned());
    }

    if params.is_empty() {
        return None;
    }

    let suffix = params
        .into_iter()
        .map(|(name, values)| format!("{}-{}", name, values.join("-")))
        .collect::<Vec<_>>()
        .join("_");

    // Decoded values may contain separators
    Some(suffix.replace(['/', '\\', '*'], "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str) -> DocumentPath {
        DocumentPath::for_url(Path::new("/out"), &Url::parse(url).unwrap())
    }

    #[test]
    fn test_site_root() {
        let d = doc("https://example.com/");
        assert!(d.is_root());
        assert!(!d.has_extension());
        assert_eq!(d.dir(), Path::new("/out"));
        assert_eq!(d.final_path("html"), PathBuf::from("/out/index.html"));
        assert_eq!(d.marker_path(), Some(PathBuf::from("/out/index")));
    }

    #[test]
    fn test_root_and_index_html_share_final_path() {
        let root = doc("https://example.com/");
        let index = doc("https://example.com/index.html");

        assert!(!index.is_root());
        assert!(index.has_extension());
        assert_eq!(root.final_path("html"), index.final_path("css"));
    }

    #[test]
    fn test_trailing_slash_directory() {
        let d = doc("https://example.com/docs/guide/");
        assert!(d.is_root());
        assert_eq!(d.dir(), Path::new("/out/docs/guide"));
        assert_eq!(d.final_path("html"), PathBuf::from("/out/docs/guide/index.html"));
    }

    #[test]
    fn test_extensionless_name_gets_derived_extension() {
        let d = doc("https://example.com/docs/about");
        assert!(!d.is_root());
        assert!(!d.has_extension());
        assert_eq!(d.final_path("html"), PathBuf::from("/out/docs/about.html"));
        assert_eq!(d.marker_path(), None);
    }

    #[test]
    fn test_name_with_extension_is_kept() {
        let d = doc("https://example.com/static/site.css");
        assert_eq!(d.final_path("txt"), PathBuf::from("/out/static/site.css"));
    }

    #[test]
    fn test_query_params_sorted() {
        let a = doc("https://example.com/list?b=2&a=1&a=3");
        let b = doc("https://example.com/list?a=1&a=3&b=2");

        assert_eq!(a.stem(), "list__a-1-3_b-2");
        assert_eq!(a, b);
        assert_eq!(a.final_path("html"), PathBuf::from("/out/list__a-1-3_b-2.html"));
    }

    #[test]
    fn test_query_dot_does_not_count_as_extension() {
        let d = doc("https://example.com/page?v=1.2");
        assert!(!d.has_extension());
        assert_eq!(d.final_path("html"), PathBuf::from("/out/page__v-1.2.html"));
    }

    #[test]
    fn test_query_separators_sanitized() {
        let d = doc("https://example.com/search?q=a%2Fb");
        assert_eq!(d.stem(), "search__q-a_b");
    }

    #[test]
    fn test_asterisk_replaced() {
        let d = doc("https://example.com/a*b/c*d");
        assert_eq!(d.final_path("txt"), PathBuf::from("/out/a_b/c_d.txt"));
    }

    #[test]
    fn test_candidates() {
        let d = doc("https://example.com/");
        let candidates = d.candidates();
        assert_eq!(candidates.first(), Some(&PathBuf::from("/out/index.html")));
        assert_eq!(candidates.last(), Some(&PathBuf::from("/out/index")));
        assert_eq!(candidates.len(), allowed_extensions().len() + 1);

        let d = doc("https://example.com/index.html");
        assert_eq!(d.candidates(), vec![PathBuf::from("/out/index.html")]);
    }

    #[test]
    fn test_temp_path() {
        assert_eq!(
            temp_path(Path::new("/out/index.html")),
            PathBuf::from("/out/index.html.temp")
        );
    }
}

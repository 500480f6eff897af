use crate::UrlError;
use url::{Host, Url};

/// Computes the domain key of a URL
///
/// The key is the lowercase host without a leading `www.` label, followed by
/// `:port` when the URL carries a non-default port. The scheme is ignored, so
/// `http://www.example.com/` and `https://example.com/` share a key. Two URLs
/// belong to the same site iff their keys are equal.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_mirror::url::domain_key;
///
/// let url = Url::parse("https://WWW.Example.com/path").unwrap();
/// assert_eq!(domain_key(&url).unwrap(), "example.com");
///
/// let url = Url::parse("http://example.com:8080/").unwrap();
/// assert_eq!(domain_key(&url).unwrap(), "example.com:8080");
/// ```
pub fn domain_key(url: &Url) -> Result<String, UrlError> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlError::MissingDomain)?
        .to_lowercase();

    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    // `Url::port` is None for the scheme's default port
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns true if `url` belongs to the site identified by `target_key`
pub fn is_same_site(url: &Url, target_key: &str) -> bool {
    domain_key(url).map(|key| key == target_key).unwrap_or(false)
}

/// Name of the per-site output subfolder
///
/// Dots become underscores and a non-default port is appended, so several
/// crawlers can share one output directory as long as they mirror different
/// sites. Punycode labels are shown in their Unicode form.
pub fn output_folder_name(url: &Url) -> Result<String, UrlError> {
    let key = domain_key(url)?;
    let key = match url.host() {
        Some(Host::Domain(_)) => {
            let (host, port) = match key.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (key.as_str(), None),
            };
            let host = url::quirks::domain_to_unicode(host);
            match port {
                Some(port) => format!("{}:{}", host, port),
                None => host,
            }
        }
        // IP literals have no Unicode form
        _ => key,
    };
    Ok(key.replace(['.', ':'], "_"))
}

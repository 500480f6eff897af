use crate::UrlError;
use url::Url;

/// Canonicalizes an absolute URL string
///
/// The canonical string is the identity of a crawl task, so two spellings of
/// the same document must canonicalize to the same value.
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed (`UrlError::Parse`)
/// 2. Accept only `http` and `https` schemes
/// 3. Lowercase scheme and host, drop the default port, resolve `.` and `..`
///    path segments (done by the parser)
/// 4. Normalize percent-encoding: decode escaped unreserved characters,
///    uppercase the hex digits of the remaining escapes
/// 5. Remove an empty query (`page?` becomes `page`)
/// 6. Remove the fragment, which is never sent to the server
///
/// Trailing slashes and query parameter order are kept as-is: both can change
/// what a server returns.
///
/// # Examples
///
/// ```
/// use site_mirror::url::canonicalize;
///
/// let url = canonicalize("HTTP://Example.COM:80/a/./b/../c#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/a/c");
/// ```
pub fn canonicalize(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    normalize(url)
}

/// Resolves a (possibly relative) reference against a base URL and
/// canonicalizes the result
///
/// # Examples
///
/// ```
/// use site_mirror::url::canonicalize_with_base;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/docs/intro").unwrap();
/// let url = canonicalize_with_base("../about", &base).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/about");
/// ```
pub fn canonicalize_with_base(raw: &str, base: &Url) -> Result<Url, UrlError> {
    let url = base
        .join(raw.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;
    normalize(url)
}

fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    let path = normalize_percent_escapes(url.path());
    url.set_path(&path);

    match url.query() {
        Some("") => url.set_query(None),
        Some(query) => {
            let query = normalize_percent_escapes(query);
            url.set_query(Some(&query));
        }
        None => {}
    }

    url.set_fragment(None);

    Ok(url)
}

/// Decodes escapes of unreserved characters and uppercases all other escapes
fn normalize_percent_escapes(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(high), Some(low)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                let decoded = (high << 4) | low;
                if is_unreserved(decoded) {
                    out.push(decoded);
                } else {
                    out.push(b'%');
                    out.push(bytes[i + 1].to_ascii_uppercase());
                    out.push(bytes[i + 2].to_ascii_uppercase());
                }
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).unwrap_or_else(|_| input.to_string())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// RFC 3986 unreserved characters
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

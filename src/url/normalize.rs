use crate::UrlError;
use url::Url;

/// Query parameters that identify a campaign rather than a resource
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "mc_eid", "mc_cid", "_ga"];

/// Normalizes a URL string into the canonical form used for crawl identity
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but `http` and `https`
/// 3. Lowercase the host (the scheme is left as written)
/// 4. Normalize path:
///    - Remove dot segments (. and ..) and duplicate slashes
///    - Remove trailing slash (except for root /)
/// 5. Remove fragment
/// 6. Remove tracking query parameters, sort the rest by key
/// 7. Remove empty query string
///
/// # Examples
///
/// ```
/// use harvester::url::normalize_url;
///
/// let url = normalize_url("https://Example.TEST/docs//intro/?b=2&a=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.test/docs/intro?a=1&b=2");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize(url)
}

/// Normalizes an already-parsed URL
///
/// Used for links resolved by the encoder, which arrive as [`Url`] values.
pub fn normalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?.to_lowercase();
    if host.is_empty() {
        return Err(UrlError::MissingHost);
    }
    url.set_host(Some(&host))
        .map_err(|e| UrlError::Parse(format!("invalid host '{}': {}", host, e)))?;

    let path = normalize_path(url.path());
    url.set_path(&path);
    url.set_fragment(None);

    if url.query().is_some() {
        let params = retained_query_params(&url);
        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

/// Returns true when both URLs name the same host
///
/// Scheme and port are ignored, so `http` and `https` pages of one site
/// belong together. Hosts compare case-insensitively.
pub fn same_host(a: &Url, b: &Url) -> bool {
    match (a.host_str(), b.host_str()) {
        (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
        _ => false,
    }
}

/// Collapses dot segments and repeated slashes, drops the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn retained_query_params(url: &Url) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    // Stable sort keeps repeated keys in their original relative order
    params.sort_by(|a, b| a.0.cmp(&b.0));
    params
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}

//! URL validation and normalization.

use url::Url;

use crate::error::{Error, Result};

/// Parse a tool argument into an absolute http(s) URL.
///
/// Runs before any network access; everything that is not a well-formed
/// absolute `http`/`https` URL with a host is a validation error.
pub fn validate_target(input: &str) -> Result<Url> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("url is required".into()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| Error::Validation(format!("malformed url `{trimmed}`: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(Error::Validation(format!(
                "unsupported scheme `{other}`, expected http or https"
            )))
        }
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(Error::Validation(format!("url `{trimmed}` has no host")));
    }

    Ok(url)
}

/// Like [`validate_target`], and additionally rejects documents the browser
/// cannot render as a page.
pub fn validate_render_target(input: &str) -> Result<Url> {
    let url = validate_target(input)?;
    if url.path().to_ascii_lowercase().ends_with(".pdf") {
        return Err(Error::Validation(format!(
            "PDF documents are not supported: {url}"
        )));
    }
    Ok(url)
}

/// Normalize a link target: fragment removed, default port removed,
/// trailing slash removed except on the root path.
pub fn normalize(url: &Url) -> Url {
    // Default ports (`:80`, `:443`) are already elided by the parser.
    let mut normalized = url.clone();
    normalized.set_fragment(None);

    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
        if normalized.path().is_empty() {
            normalized.set_path("/");
        }
    }

    normalized
}

/// Deduplication key: the normalized URL without its query string.
pub fn dedup_key(url: &Url) -> String {
    let mut key = normalize(url);
    key.set_query(None);
    key.to_string()
}

/// Lower-cased host without port.
pub fn host_of(url: &Url) -> Option<String> {
    url.host_str().map(str::to_ascii_lowercase)
}

/// Exact host comparison; subdomains are different hosts.
pub fn same_host(origin: &Url, target: &Url) -> bool {
    match (host_of(origin), host_of(target)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Permalink pattern of `url` relative to the path of `base`.
///
/// `/blog/2024/post-a` under base `/` becomes `/blog/2024/*/`; paths with a
/// single segment are their own pattern.
pub fn permalink_pattern(url: &Url, base: &Url) -> String {
    let base_path = base.path().trim_matches('/');
    let full_path = url.path().trim_matches('/');

    let relative = if !base_path.is_empty() && full_path.starts_with(base_path) {
        full_path[base_path.len()..].trim_matches('/')
    } else {
        full_path
    };

    let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() >= 2 {
        format!("/{}/*/", parts[..parts.len() - 1].join("/"))
    } else {
        url.path().to_string()
    }
}

// src/utils/url.rs

//! URL canonicalization.
//!
//! Links arriving in feeds are noisy: tracking parameters, default ports,
//! `www.` prefixes, fragments and trailing slashes all vary between fetches
//! of the same article. [`normalize`] reduces a link to a stable comparison
//! key so that entries without a GUID keep a stable identity.

use url::Url;

/// Query parameters dropped in addition to every `utm_*` parameter.
const TRACKING_PARAMETERS: &[&str] = &["fbclid", "gclid", "gclsrc", "mc_cid", "mc_eid"];

/// Canonicalize a raw link for storage and comparison.
///
/// Best effort: input that is not an absolute URL is returned trimmed but
/// otherwise unchanged.
///
/// # Examples
/// ```
/// use courier::utils::url::normalize;
///
/// assert_eq!(
///     normalize(" HTTPS://www.Example.COM:443/a/../b/?utm_source=x&id=1#top "),
///     "https://example.com/b?id=1"
/// );
/// ```
pub fn normalize(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let mut parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };

    strip_www(&mut parsed);

    // The parser already lowercased scheme and host, dropped default ports and
    // resolved dot segments; only the path shape is left to settle.
    if !parsed.cannot_be_a_base() {
        let path = clean_path(parsed.path());
        parsed.set_path(&path);
    }

    parsed.set_fragment(None);
    strip_tracking_query(&mut parsed);

    parsed.to_string()
}

fn strip_www(url: &mut Url) {
    let Some(host) = url.host_str() else {
        return;
    };
    if let Some(rest) = host.strip_prefix("www.") {
        if !rest.is_empty() {
            let rest = rest.to_string();
            // Host rejection leaves the URL untouched, which is the best-effort contract.
            let _ = url.set_host(Some(&rest));
        }
    }
}

/// Collapse empty segments and drop a trailing slash, keeping a bare root.
fn clean_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return "/".to_string();
    }
    format!("/{}", segments.join("/"))
}

fn strip_tracking_query(url: &mut Url) {
    if url.query().is_none() {
        return;
    }

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_parameter(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
        return;
    }

    // Stable sort by name keeps repeated values in their original order.
    kept.sort_by(|a, b| a.0.cmp(&b.0));
    url.query_pairs_mut().clear().extend_pairs(kept.iter());
}

fn is_tracking_parameter(name: &str) -> bool {
    let lower = name.to_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMETERS.contains(&lower.as_str())
}

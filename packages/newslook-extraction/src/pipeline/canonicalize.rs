//! URL canonicalization ahead of id derivation:
//! lower-case scheme/host, strip tracking query params, resolve
//! relative URLs before hashing so the same article reached through
//! different link variants hashes to the same id.

use url::Url;

/// Query parameters known to vary per-link-instance without changing
/// the referenced resource (campaign/referrer tracking).
const TRACKING_PARAMS: &[&str] = &[
    "utm_source", "utm_medium", "utm_campaign", "utm_term", "utm_content",
    "spm", "from", "refer", "ref",
];

/// Canonicalize `raw_url`, optionally resolving it against `base` first
/// when it is relative. Returns `None` if the input is not a parseable
/// URL even after resolution.
pub fn canonicalize_url(raw_url: &str, base: Option<&str>) -> Option<String> {
    let parsed = match Url::parse(raw_url) {
        Ok(url) => url,
        Err(_) => {
            let base = Url::parse(base?).ok()?;
            base.join(raw_url).ok()?
        }
    };

    let mut url = parsed;
    let _ = url.set_scheme(&url.scheme().to_ascii_lowercase());
    if let Some(host) = url.host_str() {
        let lowered = host.to_ascii_lowercase();
        let _ = url.set_host(Some(&lowered));
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&retained);
    }

    url.set_fragment(None);

    Some(url.to_string())
}

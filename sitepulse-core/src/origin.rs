//! Trusted-origin matching for CORS and the ingestion handler's
//! defense-in-depth re-check.

/// Returns true if `origin` matches one of the trusted entries.
///
/// Entries are exact origins (`https://www.example.com`) or wildcard
/// subdomain patterns (`https://*.example.com`). A wildcard needs at
/// least one subdomain label and the suffix match is anchored at a label
/// boundary, so `https://example.com.evil.com` never matches
/// `https://*.example.com` and neither does the bare apex.
pub fn origin_allowed(origin: &str, trusted: &[String]) -> bool {
    trusted.iter().any(|entry| match entry.split_once("://*.") {
        Some((scheme, apex)) => origin
            .strip_prefix(scheme)
            .and_then(|rest| rest.strip_prefix("://"))
            .and_then(|host| host.strip_suffix(apex))
            .is_some_and(|prefix| prefix.len() > 1 && prefix.ends_with('.')),
        None => entry == origin,
    })
}

//! Matching Search Console properties against the managed site
//!
//! Properties come in two syntaxes: domain properties (`sc-domain:example.com`)
//! and URL-prefix properties (`https://www.example.com/`). Both are reduced to
//! a base domain (lowercased, leading `www.` removed) and compared exactly.

use url::Url;

use super::SiteEntry;

/// Prefix used by domain properties
const DOMAIN_PROPERTY_PREFIX: &str = "sc-domain:";

/// Lowercases a host and strips a single leading `www.`
pub fn base_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Extracts the base domain a property refers to, if it has one
fn property_base_domain(property: &str) -> Option<String> {
    if let Some(domain) = property.strip_prefix(DOMAIN_PROPERTY_PREFIX) {
        return Some(base_domain(domain));
    }
    let url = Url::parse(property).ok()?;
    url.host_str().map(base_domain)
}

/// Returns the properties that belong to the site served at `site_host`
///
/// Properties whose text does not mention the base domain at all are skipped
/// without parsing. The rest are kept only when their base domain equals the
/// site's, so `notexample.com` and `example.com.evil.net` never match
/// `example.com`.
pub fn filter_sites(sites: &[SiteEntry], site_host: &str) -> Vec<String> {
    let wanted = base_domain(site_host);
    if wanted.is_empty() {
        return Vec::new();
    }

    sites
        .iter()
        .filter(|site| {
            if !site.site_url.to_ascii_lowercase().contains(&wanted) {
                return false;
            }
            property_base_domain(&site.site_url).is_some_and(|candidate| candidate == wanted)
        })
        .map(|site| site.site_url.clone())
        .collect()
}

/// Extracts the host of a configured site URL
pub fn site_host(site_url: &str) -> Option<String> {
    Url::parse(site_url)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
}

//! Maps a request URL to the category that decides its caching strategy.
//!
//! Rules are evaluated in table order and the first match wins. The default
//! table puts precache manifest entries first, then static-asset suffixes,
//! font rules, image rules (suffixes before the image CDN host) and API
//! rules. A `.woff2` served from an image CDN therefore classifies as a font.
//! Anything unmatched is `Category::Default`.

use crate::config::{CategoryRule, Matcher};
use crate::models::Category;
use url::Url;

pub fn classify(rules: &[CategoryRule], url: &Url) -> Category {
    rules
        .iter()
        .find(|rule| rule.matcher.matches(url))
        .map(|rule| rule.category)
        .unwrap_or(Category::Default)
}

impl Matcher {
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            Self::ExactUrl(expected) => without_fragment(url) == *expected,
            Self::PathSuffix(suffix) => url
                .path()
                .to_ascii_lowercase()
                .ends_with(&suffix.to_ascii_lowercase()),
            Self::PathPrefix(prefix) => url.path().starts_with(prefix.as_str()),
            Self::PathContains(needle) => url.path().contains(needle.as_str()),
            Self::Host(host) => url.host_str().map_or(false, |h| h.eq_ignore_ascii_case(host)),
        }
    }
}

fn without_fragment(url: &Url) -> String {
    match url.fragment() {
        Some(_) => {
            let mut url = url.clone();
            url.set_fragment(None);
            url.to_string()
        }
        None => url.to_string(),
    }
}

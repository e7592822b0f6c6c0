//! Racecard scraper for jra.go.jp
//!
//! Provides static and browser fetching, HTML parsing, and the scrape
//! orchestrator that ties them together.

pub mod browser;
pub mod fetch;
pub mod orchestrator;
pub mod parsers;
pub mod race_data;

use regex::Regex;
use std::sync::LazyLock;

pub use orchestrator::{RaceScraper, ScrapeRequest};

/// Base origin of the racing authority site
pub const BASE_URL: &str = "https://www.jra.go.jp";

/// Query parameter carrying a detail-page code
pub const CODE_PARAM: &str = "cname";

/// `doAction('/JRADB/accessK.html', 'pw04kmk001158/EF')`
static ACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"doAction\('([^']+)'\s*,\s*'([^']+)'").unwrap());

/// Make a link absolute against [`BASE_URL`].
pub fn resolve_href(href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }
    if href.starts_with('/') {
        return format!("{}{}", BASE_URL.trim_end_matches('/'), href);
    }
    href.to_string()
}

/// Build a fetchable URL from an inline `doAction(path, code)` handler.
///
/// The site posts `code` through a hidden form; the code is carried as a
/// query parameter here and turned back into a POST by the static fetcher.
pub fn resolve_action(action: &str) -> String {
    let Some(caps) = ACTION_RE.captures(action) else {
        return String::new();
    };
    let path = &caps[1];
    let code = &caps[2];
    let sep = if path.starts_with('/') { "" } else { "/" };
    format!(
        "{}{}{}?{}={}",
        BASE_URL.trim_end_matches('/'),
        sep,
        path,
        CODE_PARAM,
        code
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_href() {
        assert_eq!(resolve_href(""), "");
        assert_eq!(
            resolve_href("https://example.com/a"),
            "https://example.com/a"
        );
        assert_eq!(
            resolve_href("/JRADB/accessU.html"),
            "https://www.jra.go.jp/JRADB/accessU.html"
        );
        assert_eq!(resolve_href("relative.html"), "relative.html");
    }

    #[test]
    fn test_resolve_action() {
        assert_eq!(
            resolve_action("return doAction('/JRADB/accessK.html', 'pw04kmk001158/EF');"),
            "https://www.jra.go.jp/JRADB/accessK.html?cname=pw04kmk001158/EF"
        );
        assert_eq!(
            resolve_action("doAction('JRADB/accessU.html','pw01dud1020')"),
            "https://www.jra.go.jp/JRADB/accessU.html?cname=pw01dud1020"
        );
    }

    #[test]
    fn test_resolve_action_no_match() {
        assert_eq!(resolve_action(""), "");
        assert_eq!(resolve_action("return false;"), "");
        assert_eq!(resolve_action("doAction('/only-one')"), "");
    }
}

pub mod http;

use once_cell::sync::Lazy;
use regex::Regex;

static LINK_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").unwrap());

/// First http(s) link in a message, if any.
pub fn extract_link(text: &str) -> Option<&str> {
    LINK_REGEX.find(text).map(|m| m.as_str())
}

use std::sync::LazyLock;

use regex::Regex;

pub static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b([-a-zA-Z0-9()@:%_\+.~#?&/=]*)",
    )
    .unwrap()
});

/// First http(s) URL in free-form tool output.
pub fn first_url(text: &str) -> Option<&str> {
    URL_REGEX.find(text).map(|m| m.as_str())
}

use std::sync::LazyLock;

use regex::Regex;

/// Title cards are links whose `href` starts with this prefix.
pub const TITLE_LINK_PREFIX: &str = "/title/";

static TITLE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/title/([0-9a-f-]+)").unwrap());

/// Host-assigned handle for one rendered card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardKey(pub usize);

/// A title link as found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLink {
    pub key: CardKey,
    pub href: String,
}

impl CardLink {
    pub fn new(key: usize, href: impl Into<String>) -> Self {
        Self {
            key: CardKey(key),
            href: href.into(),
        }
    }

    pub fn title_id(&self) -> Option<&str> {
        parse_title_id(&self.href)
    }
}

/// Extract the hex-with-hyphens title id from a title link.
///
/// Returns `None` for links that are not title links or carry no parseable id.
pub fn parse_title_id(href: &str) -> Option<&str> {
    if !href.starts_with(TITLE_LINK_PREFIX) {
        return None;
    }
    TITLE_ID
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

//! Which MangaDex pages the filter runs on.

use url::Url;

const LISTING_PREFIX: &str = "/titles";

/// Sub-routes of the listing that the filter must not touch.
pub const EXCLUDED_PREFIXES: &[&str] = &[
    "/titles/feed",
    "/titles/recent",
    "/titles/latest",
    "/titles/follows",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The title search page the filter augments.
    Listing,
    /// Feed, recent, latest or follows.
    Excluded,
    Other,
}

impl Route {
    pub fn from_path(path: &str) -> Self {
        if EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
            Self::Excluded
        } else if path.starts_with(LISTING_PREFIX) {
            Self::Listing
        } else {
            Self::Other
        }
    }

    /// Classify a full URL, or a bare path when `location` is not absolute.
    pub fn from_location(location: &str) -> Self {
        match Url::parse(location) {
            Ok(url) => Self::from_path(url.path()),
            Err(_) => Self::from_path(location),
        }
    }
}

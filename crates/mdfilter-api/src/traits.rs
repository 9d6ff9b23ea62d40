//! Trait definitions for reading-status sources.
//!
//! The filter engine only talks to [`StatusSource`], so it can run against the
//! MangaDex client or an in-memory fake.

use std::collections::HashMap;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::mangadex::Credentials;

/// A source of the authenticated user's per-title reading statuses.
pub trait StatusSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Log in now, replacing any cached session.
    fn authenticate(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Switch accounts. The next request logs in with `credentials`.
    fn update_credentials(&self, credentials: Credentials) -> impl Future<Output = ()> + Send;

    /// Status of a single title, or `None` when the title is not in the user's list.
    fn get_status(
        &self,
        title_id: &str,
    ) -> impl Future<Output = Result<Option<ReadingStatus>, Self::Error>> + Send;

    /// Every title the user has any status for.
    fn get_all_statuses(&self) -> impl Future<Output = Result<StatusMap, Self::Error>> + Send;

    /// Only the titles whose status is `status`.
    fn get_filtered_statuses(
        &self,
        status: ReadingStatus,
    ) -> impl Future<Output = Result<StatusMap, Self::Error>> + Send;
}

/// A user's reading status for a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    Reading,
    OnHold,
    PlanToRead,
    Dropped,
    ReReading,
    Completed,
}

impl ReadingStatus {
    /// Dropdown order.
    pub const ALL: &[ReadingStatus] = &[
        Self::Reading,
        Self::OnHold,
        Self::PlanToRead,
        Self::Dropped,
        Self::ReReading,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reading => "Reading",
            Self::OnHold => "On Hold",
            Self::PlanToRead => "Plan to Read",
            Self::Dropped => "Dropped",
            Self::ReReading => "Re-Reading",
            Self::Completed => "Completed",
        }
    }

    /// Value used by the MangaDex API and the persisted selection.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::OnHold => "on_hold",
            Self::PlanToRead => "plan_to_read",
            Self::Dropped => "dropped",
            Self::ReReading => "re_reading",
            Self::Completed => "completed",
        }
    }

    pub fn from_api_str(s: &str) -> Option<Self> {
        match s {
            "reading" => Some(Self::Reading),
            "on_hold" => Some(Self::OnHold),
            "plan_to_read" => Some(Self::PlanToRead),
            "dropped" => Some(Self::Dropped),
            "re_reading" => Some(Self::ReReading),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Title id to status label, as returned by the bulk status endpoint.
///
/// Labels are kept as raw strings: the filter only cares whether a title has
/// a non-empty status, not which one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMap(HashMap<String, Option<String>>);

impl StatusMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, title_id: impl Into<String>, status: impl Into<String>) {
        self.0.insert(title_id.into(), Some(status.into()));
    }

    /// The status recorded for `title_id`, if it is present and non-empty.
    pub fn get(&self, title_id: &str) -> Option<&str> {
        self.0
            .get(title_id)
            .and_then(|s| s.as_deref())
            .filter(|s| !s.is_empty())
    }

    /// Whether `title_id` carries a non-empty status.
    pub fn is_marked(&self, title_id: &str) -> bool {
        self.get(title_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StatusMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

use std::str::FromStr;

use mdfilter_api::{ReadingStatus, StatusMap};

/// The read-status filter chosen in the dropdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatusSelection {
    /// Show everything; nothing is fetched.
    #[default]
    All,
    /// Titles the user has no status for.
    NotAdded,
    Status(ReadingStatus),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown read status filter: {0:?}")]
pub struct UnknownSelection(pub String);

impl StatusSelection {
    /// Every dropdown option, in display order.
    pub fn options() -> Vec<StatusSelection> {
        let mut options = vec![Self::All, Self::NotAdded];
        options.extend(ReadingStatus::ALL.iter().copied().map(Self::Status));
        options
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::NotAdded => "Not Added",
            Self::Status(s) => s.as_str(),
        }
    }

    /// Value stored under `lastFilterStatus` and used as the option value.
    pub fn as_stored_str(&self) -> &'static str {
        match self {
            Self::All => "",
            Self::NotAdded => "null",
            Self::Status(s) => s.as_api_str(),
        }
    }

    pub fn from_stored_str(s: &str) -> Option<Self> {
        match s {
            "" => Some(Self::All),
            "null" => Some(Self::NotAdded),
            other => ReadingStatus::from_api_str(other).map(Self::Status),
        }
    }

    /// Whether a filter pass has to fetch anything for this selection.
    pub fn needs_fetch(&self) -> bool {
        !matches!(self, Self::All)
    }

    /// Visibility of a card with `title_id` given the map fetched for this selection.
    pub fn is_visible(&self, title_id: &str, statuses: &StatusMap) -> bool {
        match self {
            Self::All => true,
            Self::NotAdded => !statuses.is_marked(title_id),
            Self::Status(_) => statuses.is_marked(title_id),
        }
    }
}

impl std::fmt::Display for StatusSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Accepts stored values plus the spellings people type on a command line
/// (`all`, `not-added`, `plan-to-read`, ...).
impl FromStr for StatusSelection {
    type Err = UnknownSelection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "all" => Ok(Self::All),
            "not_added" | "none" => Ok(Self::NotAdded),
            other => Self::from_stored_str(other).ok_or_else(|| UnknownSelection(s.to_string())),
        }
    }
}

use serde::{Deserialize, Deserializer};

use crate::traits::StatusMap;

// ── Status endpoint responses ───────────────────────────────────

/// `GET /manga/{id}/status`
#[derive(Debug, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: Option<String>,
}

/// `GET /manga/status`
#[derive(Debug, Deserialize)]
pub struct StatusMapResponse {
    #[serde(default, deserialize_with = "lenient_status_map")]
    pub statuses: StatusMap,
}

/// The API serialises an empty map as `[]`; accept that alongside objects and `null`.
fn lenient_status_map<'de, D>(deserializer: D) -> Result<StatusMap, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(StatusMap::new()),
        serde_json::Value::Array(items) if items.is_empty() => Ok(StatusMap::new()),
        other => serde_json::from_value(other).map_err(serde::de::Error::custom),
    }
}

use std::sync::Arc;

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::auth::{AuthClient, Credentials};
use super::error::FetchError;
use super::types::{StatusMapResponse, StatusResponse};
use crate::traits::{ReadingStatus, StatusMap, StatusSource};

pub const BASE_URL: &str = "https://api.mangadex.org";

/// Bearer-authenticated client for the MangaDex reading-status endpoints.
pub struct MangaDexClient {
    auth: Arc<AuthClient>,
    http: Client,
    base_url: String,
}

impl MangaDexClient {
    pub fn new(auth: Arc<AuthClient>, http: Client) -> Self {
        Self {
            auth,
            http,
            base_url: BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn auth(&self) -> &Arc<AuthClient> {
        &self.auth
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, FetchError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(FetchError::Api {
                status,
                message: body,
            })
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let token = self.auth.ensure_valid_session().await?;
        let resp = self
            .http
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }

    /// Reading status of one title; `None` when the title is not in the user's list.
    pub async fn fetch_status(&self, title_id: &str) -> Result<Option<ReadingStatus>, FetchError> {
        let body: StatusResponse = self
            .get_json(&format!("/manga/{title_id}/status"), &[])
            .await?;

        match body.status.as_deref() {
            None | Some("") => Ok(None),
            Some(s) => ReadingStatus::from_api_str(s)
                .map(Some)
                .ok_or_else(|| FetchError::Parse(format!("unknown reading status: {s}"))),
        }
    }

    /// Bulk status map, optionally narrowed to one status.
    pub async fn fetch_status_map(
        &self,
        filter: Option<ReadingStatus>,
    ) -> Result<StatusMap, FetchError> {
        let query: Vec<(&str, &str)> = filter
            .map(|s| vec![("statuses[]", s.as_api_str())])
            .unwrap_or_default();
        let body: StatusMapResponse = self.get_json("/manga/status", &query).await?;

        tracing::debug!(
            filter = filter.map(|s| s.as_api_str()).unwrap_or("any"),
            titles = body.statuses.len(),
            "fetched status map"
        );
        Ok(body.statuses)
    }
}

impl StatusSource for MangaDexClient {
    type Error = FetchError;

    async fn authenticate(&self) -> Result<(), FetchError> {
        Ok(self.auth.login().await?)
    }

    async fn update_credentials(&self, credentials: Credentials) {
        self.auth.set_credentials(credentials).await;
    }

    async fn get_status(&self, title_id: &str) -> Result<Option<ReadingStatus>, FetchError> {
        self.fetch_status(title_id).await
    }

    async fn get_all_statuses(&self) -> Result<StatusMap, FetchError> {
        self.fetch_status_map(None).await
    }

    async fn get_filtered_statuses(&self, status: ReadingStatus) -> Result<StatusMap, FetchError> {
        self.fetch_status_map(Some(status)).await
    }
}

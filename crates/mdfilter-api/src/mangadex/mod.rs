pub mod auth;
pub mod client;
pub mod error;
pub mod types;

use std::time::Duration;

pub use auth::{AuthClient, Credentials, Session};
pub use client::MangaDexClient;
pub use error::{AuthError, FetchError};

const USER_AGENT: &str = concat!("mdfilter/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client. Every request made through it is bounded by `timeout`.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

//! MangaDex API access for the read-status filter: password-grant login and
//! the reading-status endpoints.

pub mod mangadex;
pub mod traits;

pub use mangadex::{AuthClient, AuthError, Credentials, FetchError, MangaDexClient};
pub use traits::{ReadingStatus, StatusMap, StatusSource};

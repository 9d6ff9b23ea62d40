pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod models;
pub mod page;
pub mod route;
pub mod store;

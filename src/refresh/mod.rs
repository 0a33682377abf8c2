//! Token refresh: the endpoint client and the single-flight coordinator.

pub mod client;
pub mod coordinator;

pub use client::{HttpRefreshClient, RefreshClient, DEFAULT_REFRESH_PATH};
pub use coordinator::RefreshCoordinator;

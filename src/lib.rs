//! Authenticated HTTP transport for the hub admin dashboard backend.
//!
//! - [`credentials`] holds the access/refresh pair and its decoded claims
//! - [`expiry`] decides when a token is close enough to expiry to refresh
//! - [`refresh`] runs at most one refresh call at a time and fans out its result
//! - [`pipeline`] attaches the bearer token and replays a request once after a 401
//! - [`session`] ends sessions and exposes the hooks other subsystems use

pub mod config;
pub mod credentials;
pub mod error;
pub mod expiry;
pub mod net;
pub mod pipeline;
pub mod refresh;
pub mod session;

pub use config::Config;
pub use credentials::{CredentialEvent, CredentialPair, CredentialStore, DecodedClaims};
pub use error::{ErrorKind, RefreshError, SessionError, TransportError};
pub use pipeline::{ApiClient, ApiRequest, ApiResponse, HttpMethod};
pub use session::Session;

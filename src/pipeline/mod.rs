//! Outbound request pipeline.
//!
//! [`Transport`] sends exactly once and classifies the outcome;
//! [`ApiClient`] layers bearer credentials, refresh-on-401 and a single
//! replay on top of it.

pub mod client;
pub mod request;
pub mod response;
pub mod transport;

pub use client::ApiClient;
pub use request::{is_absolute_url, ApiRequest, HttpMethod};
pub use response::{ApiResponse, BackendResponse, Endpoint};
pub use transport::{RawResponse, Transport};

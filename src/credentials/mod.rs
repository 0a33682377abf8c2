//! Credential handling: the token pair, its decoded claims, durable storage
//! and the shared store that ties them together.

pub mod claims;
pub mod pair;
pub mod storage;
pub mod store;

pub use claims::{DecodedClaims, QueryTokenCheck, validate_query_token};
pub use pair::CredentialPair;
#[cfg(feature = "system-keyring")]
pub use storage::KeyringCredentialStorage;
pub use storage::{
    ACCESS_TOKEN_KEY, CredentialStorage, FileCredentialStorage, MemoryCredentialStorage,
    REFRESH_TOKEN_KEY, origin_namespace,
};
pub use store::{CredentialEvent, CredentialStore, ListenerId};

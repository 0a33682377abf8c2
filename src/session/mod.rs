//! Session facade.
//!
//! Wires the credential store, terminator, refresh coordinator and request
//! pipeline together from a [`Config`], and exposes the small surface other
//! subsystems consume: the current access token, change notifications and a
//! forced logout.

pub mod navigator;
pub mod terminator;

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use navigator::{Navigator, RecordingNavigator, TracingNavigator};
pub use terminator::SessionTerminator;

use crate::config::{Config, StorageBackend};
#[cfg(feature = "system-keyring")]
use crate::credentials::KeyringCredentialStorage;
use crate::credentials::{
    CredentialEvent, CredentialPair, CredentialStorage, CredentialStore, DecodedClaims,
    FileCredentialStorage, ListenerId, MemoryCredentialStorage, QueryTokenCheck,
    validate_query_token,
};
use crate::error::{RefreshError, SessionError};
use crate::net::HttpClient;
use crate::pipeline::{ApiClient, Transport};
use crate::refresh::{HttpRefreshClient, RefreshClient, RefreshCoordinator};

/// A fully wired authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    client: ApiClient,
    config: Arc<Config>,
}

impl Session {
    /// Build a session with every collaborator taken from `config`.
    pub fn from_config(config: Config) -> Result<Self, SessionError> {
        Self::builder(config).build()
    }

    pub fn builder(config: Config) -> SessionBuilder {
        SessionBuilder {
            config,
            storage: None,
            navigator: None,
            refresh_client: None,
            http: None,
        }
    }

    /// The authenticated request pipeline.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn store(&self) -> &CredentialStore {
        self.client.store()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn terminator(&self) -> &SessionTerminator {
        self.client.coordinator().terminator()
    }

    // -- Collaborator hooks --

    pub fn access_token(&self) -> Option<String> {
        self.store().access_token()
    }

    /// Be told about every login, refresh and logout.
    pub fn on_credentials_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CredentialEvent) + Send + Sync + 'static,
    {
        self.store().subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.store().unsubscribe(id)
    }

    /// Clear credentials and go to the login boundary.
    pub fn force_logout(&self) {
        info!("Logout requested");
        self.terminator().terminate();
    }

    // -- Login flows --

    /// Store the pair issued by a completed login.
    pub fn login(&self, pair: CredentialPair) -> Result<(), SessionError> {
        self.store().set(pair)?;
        info!(
            subject = ?self.store().claims().and_then(|c| c.subject),
            "Logged in"
        );
        Ok(())
    }

    /// Finish a login redirect carrying `token`, `refresh` and `email`.
    ///
    /// With all three present the pair is stored and the host moves on to the
    /// post-login location; otherwise it is sent back to login. Returns the
    /// email the backend reported.
    pub fn complete_login_callback(&self, query: &str) -> Result<String, SessionError> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let (mut token, mut refresh, mut email) = (None, None, None);
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "token" => &mut token,
                "refresh" => &mut refresh,
                "email" => &mut email,
                _ => continue,
            };
            *slot = Some(value.into_owned()).filter(|v: &String| !v.is_empty());
        }

        let navigator = self.terminator().navigator();
        match (token, refresh, email) {
            (Some(token), Some(refresh), Some(email)) => {
                self.login(CredentialPair::new(token, refresh))?;
                navigator.navigate(&self.config.auth.post_login_url);
                Ok(email)
            }
            _ => {
                warn!("Login callback is missing details, returning to login");
                navigator.navigate(&self.config.auth.login_url);
                Err(SessionError::MissingLoginDetails)
            }
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store().access_token().is_some()
    }

    /// Claims of the signed-in user.
    pub fn current_user(&self) -> Option<DecodedClaims> {
        self.store().claims()
    }

    /// Whether `query_token` belongs to the signed-in user.
    pub fn check_query_token(&self, query_token: Option<&str>) -> QueryTokenCheck {
        let current = self.current_user().and_then(|c| c.subject);
        validate_query_token(query_token, current.as_deref())
    }

    /// Refresh ahead of time if the access token is close to expiry.
    pub async fn ensure_fresh(&self) -> Result<(), RefreshError> {
        self.client.ensure_fresh().await
    }
}

/// Builder for [`Session`]. Anything not supplied comes from the config.
pub struct SessionBuilder {
    config: Config,
    storage: Option<Arc<dyn CredentialStorage>>,
    navigator: Option<Arc<dyn Navigator>>,
    refresh_client: Option<Arc<dyn RefreshClient>>,
    http: Option<HttpClient>,
}

impl SessionBuilder {
    pub fn with_storage(mut self, storage: Arc<dyn CredentialStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn with_refresh_client(mut self, client: Arc<dyn RefreshClient>) -> Self {
        self.refresh_client = Some(client);
        self
    }

    pub fn with_http_client(mut self, http: HttpClient) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Result<Session, SessionError> {
        let config = self.config;
        let base_url = config.transport.parsed_base_url().map_err(|e| {
            SessionError::Config(format!(
                "invalid transport.base_url '{}': {e}",
                config.transport.base_url
            ))
        })?;

        let storage = match self.storage {
            Some(storage) => storage,
            None => storage_from_config(&config, &base_url),
        };
        let store = CredentialStore::open_shared(storage)?;
        debug!(
            backend = store.storage_name(),
            authenticated = store.get().is_some(),
            "Credential store opened"
        );

        let navigator = self
            .navigator
            .unwrap_or_else(|| Arc::new(TracingNavigator::new()));
        let terminator = SessionTerminator::new(store.clone(), navigator, &config.auth.login_url);

        let http = self
            .http
            .unwrap_or_else(|| HttpClient::from_config(&config.transport));
        let transport = Transport::new(http, base_url);

        let refresh_client = self.refresh_client.unwrap_or_else(|| {
            Arc::new(HttpRefreshClient::new(
                transport.clone(),
                &config.auth.refresh_path,
            ))
        });
        let coordinator = RefreshCoordinator::new(store, refresh_client, terminator);

        let client = ApiClient::new(transport, coordinator)
            .with_refresh_path(&config.auth.refresh_path)
            .with_reactive_buffer(config.auth.reactive_buffer_secs)
            .with_proactive_buffer(config.auth.proactive_buffer_secs);

        Ok(Session {
            client,
            config: Arc::new(config),
        })
    }
}

fn storage_from_config(config: &Config, origin: &url::Url) -> Arc<dyn CredentialStorage> {
    match config.storage.backend {
        StorageBackend::File => Arc::new(FileCredentialStorage::for_origin(
            &config.storage.dir,
            origin,
        )),
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keyring => Arc::new(KeyringCredentialStorage::for_origin(origin)),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keyring => {
            warn!(
                "Keyring storage requested but system-keyring feature not enabled, falling back to file storage"
            );
            Arc::new(FileCredentialStorage::for_origin(
                &config.storage.dir,
                origin,
            ))
        }
        StorageBackend::Memory => Arc::new(MemoryCredentialStorage::new()),
    }
}

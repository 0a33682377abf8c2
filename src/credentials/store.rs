//! The process-wide credential store.
//!
//! Holds the current [`CredentialPair`], mirrors it into a
//! [`CredentialStorage`] backend and keeps the decoded claims of the access
//! token cached next to it. Dependents observe changes through an explicit
//! listener list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::claims::DecodedClaims;
use super::pair::CredentialPair;
use super::storage::{
    CredentialStorage, MemoryCredentialStorage, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY,
};
use crate::error::CredentialError;

/// Change notification delivered to store listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialEvent {
    /// A new pair was stored (login or refresh).
    Set(CredentialPair),
    /// The pair was removed (logout or session termination).
    Cleared,
}

/// Handle returned by [`CredentialStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&CredentialEvent) + Send + Sync>;

#[derive(Default)]
struct State {
    pair: Option<CredentialPair>,
    claims: Option<DecodedClaims>,
    generation: u64,
}

struct Inner {
    state: RwLock<State>,
    // Serializes writers so the two persisted keys never interleave.
    write_lock: Mutex<()>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    next_listener: AtomicU64,
    storage: Arc<dyn CredentialStorage>,
}

/// Shared handle to the credential store. Clones refer to the same store.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("CredentialStore")
            .field("storage", &self.inner.storage.name())
            .field("authenticated", &state.pair.is_some())
            .field("generation", &state.generation)
            .finish()
    }
}

impl CredentialStore {
    /// Open a store over `storage`, restoring any persisted pair.
    ///
    /// If only one of the two keys is present the orphan is removed and the
    /// store starts without a session.
    pub fn open(storage: impl CredentialStorage + 'static) -> Result<Self, CredentialError> {
        Self::open_shared(Arc::new(storage))
    }

    /// Same as [`CredentialStore::open`] for an already shared backend.
    pub fn open_shared(storage: Arc<dyn CredentialStorage>) -> Result<Self, CredentialError> {
        let access = storage.load(ACCESS_TOKEN_KEY)?;
        let refresh = storage.load(REFRESH_TOKEN_KEY)?;

        let pair = match (access, refresh) {
            (Some(access), Some(refresh)) => Some(CredentialPair::new(access, refresh)),
            (None, None) => None,
            (access, _) => {
                let orphan = if access.is_some() {
                    ACCESS_TOKEN_KEY
                } else {
                    REFRESH_TOKEN_KEY
                };
                warn!(key = orphan, backend = storage.name(), "Removing orphaned credential");
                storage.remove(orphan)?;
                None
            }
        };

        let store = Self::from_parts(storage, pair);
        if let Some(c) = store.claims() {
            debug!(
                subject = ?c.subject,
                expires_at = ?c.expires_at,
                backend = store.storage_name(),
                "Restored credentials"
            );
        }
        Ok(store)
    }

    /// A store backed by fresh in-memory storage.
    pub fn in_memory() -> Self {
        Self::with_memory(MemoryCredentialStorage::new())
    }

    /// A store over existing in-memory storage.
    pub fn with_memory(storage: MemoryCredentialStorage) -> Self {
        let shared: Arc<dyn CredentialStorage> = Arc::new(storage);
        Self::open_shared(Arc::clone(&shared)).unwrap_or_else(|_| Self::from_parts(shared, None))
    }

    fn from_parts(storage: Arc<dyn CredentialStorage>, pair: Option<CredentialPair>) -> Self {
        let claims = pair
            .as_ref()
            .and_then(|p| DecodedClaims::decode(&p.access_token));
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State {
                    pair,
                    claims,
                    generation: 0,
                }),
                write_lock: Mutex::new(()),
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                storage,
            }),
        }
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.inner.state.read().pair.clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .pair
            .as_ref()
            .map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner
            .state
            .read()
            .pair
            .as_ref()
            .map(|p| p.refresh_token.clone())
    }

    /// Claims of the current access token, or `None` when absent or opaque.
    pub fn claims(&self) -> Option<DecodedClaims> {
        self.inner.state.read().claims.clone()
    }

    /// Bumped on every change of the held pair.
    pub fn generation(&self) -> u64 {
        self.inner.state.read().generation
    }

    pub fn storage_name(&self) -> &str {
        self.inner.storage.name()
    }

    /// Current pair together with the generation it belongs to.
    pub fn snapshot(&self) -> (Option<CredentialPair>, u64) {
        let state = self.inner.state.read();
        (state.pair.clone(), state.generation)
    }

    /// Store `pair` and persist both tokens.
    ///
    /// The in-memory pair is replaced even when persistence fails; the
    /// persistence error is still returned.
    pub fn set(&self, pair: CredentialPair) -> Result<(), CredentialError> {
        self.write_pair(pair, None).map(|_| ())
    }

    /// Store `pair` only if nothing changed since `generation`.
    ///
    /// Returns `Ok(false)` without touching anything when another writer got
    /// there first.
    pub fn set_if_generation(
        &self,
        pair: CredentialPair,
        generation: u64,
    ) -> Result<bool, CredentialError> {
        self.write_pair(pair, Some(generation))
    }

    fn write_pair(
        &self,
        pair: CredentialPair,
        expected: Option<u64>,
    ) -> Result<bool, CredentialError> {
        if !pair.is_complete() {
            return Err(CredentialError::IncompletePair);
        }

        let persisted = {
            let _guard = self.inner.write_lock.lock();
            if let Some(expected) = expected {
                let current = self.inner.state.read().generation;
                if current != expected {
                    debug!(expected, current, "Credentials changed concurrently, skipping write");
                    return Ok(false);
                }
            }

            let persisted = self.persist(&pair);

            let claims = DecodedClaims::decode(&pair.access_token);
            debug!(
                subject = ?claims.as_ref().and_then(|c| c.subject.as_deref()),
                expires_at = ?claims.as_ref().and_then(|c| c.expires_at),
                "Credentials updated"
            );

            let mut state = self.inner.state.write();
            state.pair = Some(pair.clone());
            state.claims = claims;
            state.generation += 1;
            persisted
        };

        if let Err(e) = &persisted {
            warn!(error = %e, backend = self.inner.storage.name(), "Failed to persist credentials");
        }

        self.notify(&CredentialEvent::Set(pair));
        persisted.map(|()| true)
    }

    /// Remove both tokens. Safe to call repeatedly.
    pub fn clear(&self) -> Result<(), CredentialError> {
        let (changed, removed) = {
            let _guard = self.inner.write_lock.lock();
            let removed = self
                .inner
                .storage
                .remove(ACCESS_TOKEN_KEY)
                .and(self.inner.storage.remove(REFRESH_TOKEN_KEY));

            let mut state = self.inner.state.write();
            let changed = state.pair.take().is_some();
            state.claims = None;
            if changed {
                state.generation += 1;
            }
            (changed, removed)
        };

        if let Err(e) = &removed {
            warn!(error = %e, backend = self.inner.storage.name(), "Failed to remove persisted credentials");
        }

        if changed {
            debug!("Credentials cleared");
            self.notify(&CredentialEvent::Cleared);
        }
        removed
    }

    /// Register a listener invoked after every `set` and effective `clear`.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CredentialEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    fn persist(&self, pair: &CredentialPair) -> Result<(), CredentialError> {
        let storage = &self.inner.storage;
        storage.save(ACCESS_TOKEN_KEY, &pair.access_token)?;
        if let Err(e) = storage.save(REFRESH_TOKEN_KEY, &pair.refresh_token) {
            // Both tokens or neither: the old refresh token must not outlive
            // the access token it belonged with.
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                if let Err(remove_err) = storage.remove(key) {
                    warn!(key, error = %remove_err, "Failed to roll back partial credential write");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    // Listeners run outside every lock so they may call back into the store.
    fn notify(&self, event: &CredentialEvent) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

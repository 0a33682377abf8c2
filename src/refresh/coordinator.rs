//! Single-flight token refresh.
//!
//! At most one refresh call is in flight at any instant. Callers arriving
//! while it runs are queued and all of them receive the outcome of that one
//! call. The Idle to Refreshing transition happens under the state lock before
//! anything is awaited, and the refresh itself runs on its own task so a
//! caller that stops waiting cannot strand the cycle.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::client::RefreshClient;
use crate::credentials::{CredentialPair, CredentialStore};
use crate::error::{CredentialError, RefreshError};
use crate::session::SessionTerminator;

type Outcome = Result<CredentialPair, RefreshError>;
type Waiter = oneshot::Sender<Outcome>;

#[derive(Default)]
struct CycleState {
    refreshing: bool,
    waiters: Vec<Waiter>,
}

struct Inner {
    store: CredentialStore,
    client: Arc<dyn RefreshClient>,
    terminator: SessionTerminator,
    state: Mutex<CycleState>,
}

/// Coordinates refreshes for one credential store.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(
        store: CredentialStore,
        client: Arc<dyn RefreshClient>,
        terminator: SessionTerminator,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                client,
                terminator,
                state: Mutex::new(CycleState::default()),
            }),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn terminator(&self) -> &SessionTerminator {
        &self.inner.terminator
    }

    /// Whether a refresh call is outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.inner.state.lock().refreshing
    }

    /// Obtain a fresh pair, joining the cycle in flight if there is one.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn refresh(&self) -> Result<CredentialPair, RefreshError> {
        self.refresh_rejected(None).await
    }

    /// Like [`refresh`](Self::refresh), for a request rejected while it carried
    /// `rejected_token`.
    ///
    /// If the store already moved past that token the current pair is returned
    /// without a network call.
    pub async fn refresh_rejected(
        &self,
        rejected_token: Option<&str>,
    ) -> Result<CredentialPair, RefreshError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.inner.state.lock();

            if !state.refreshing {
                let (pair, generation) = self.inner.store.snapshot();

                if let (Some(rejected), Some(current)) = (rejected_token, pair.as_ref()) {
                    if current.access_token != rejected {
                        debug!("Rejected token already replaced, reusing current credentials");
                        return Ok(current.clone());
                    }
                }

                let Some(pair) = pair.filter(|p| !p.refresh_token.is_empty()) else {
                    drop(state);
                    warn!("No refresh token available, ending session");
                    self.inner.terminator.terminate();
                    return Err(RefreshError::MissingRefreshToken);
                };

                state.refreshing = true;
                state.waiters.push(tx);

                let coordinator = self.clone();
                tokio::spawn(async move { coordinator.run_cycle(pair, generation).await });
            } else {
                debug!(queued = state.waiters.len() + 1, "Refresh in flight, waiting");
                state.waiters.push(tx);
            }
        }

        rx.await.unwrap_or(Err(RefreshError::Interrupted))
    }

    async fn run_cycle(&self, pair: CredentialPair, generation: u64) {
        let mut guard = SettleOnDrop {
            coordinator: self,
            settled: false,
        };

        info!("Refreshing credentials");
        let result = self.inner.client.refresh(&pair).await;
        let outcome = self.apply(result, generation);

        guard.settled = true;
        self.settle(outcome);
    }

    fn apply(&self, result: Outcome, generation: u64) -> Outcome {
        match result {
            Ok(fresh) => match self.inner.store.set_if_generation(fresh.clone(), generation) {
                Ok(true) => {
                    info!("Credentials refreshed");
                    Ok(fresh)
                }
                Ok(false) => self.superseded(),
                // Memory already holds the new pair.
                Err(CredentialError::Storage(_)) => Ok(fresh),
                Err(CredentialError::IncompletePair) => {
                    let err = RefreshError::MalformedResponse("incomplete credential pair".into());
                    self.fail(err, generation)
                }
            },
            Err(err) => self.fail(err, generation),
        }
    }

    fn fail(&self, err: RefreshError, generation: u64) -> Outcome {
        if self.inner.store.generation() != generation {
            return self.superseded();
        }
        warn!(error = %err, "Refresh failed, ending session");
        self.inner.terminator.terminate();
        Err(err)
    }

    // Login or logout happened while the call was outstanding.
    fn superseded(&self) -> Outcome {
        info!("Session changed during refresh, discarding result");
        self.inner.store.get().ok_or(RefreshError::SessionEnded)
    }

    fn settle(&self, outcome: Outcome) {
        let waiters = {
            let mut state = self.inner.state.lock();
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        debug!(waiters = waiters.len(), ok = outcome.is_ok(), "Refresh cycle settled");
        for waiter in waiters {
            // A waiter that stopped listening just drops the outcome.
            let _ = waiter.send(outcome.clone());
        }
    }
}

struct SettleOnDrop<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl Drop for SettleOnDrop<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.coordinator.settle(Err(RefreshError::Interrupted));
        }
    }
}

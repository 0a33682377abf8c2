//! The single place a session ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, info, warn};

use super::navigator::Navigator;
use crate::credentials::{CredentialEvent, CredentialStore};

struct Inner {
    store: CredentialStore,
    navigator: Arc<dyn Navigator>,
    login_url: String,
    // Set once a redirect for the current session went out; reset on login.
    navigated: AtomicBool,
}

/// Clears credentials and sends the host to the login boundary.
///
/// Idempotent: any number of concurrent calls clear the store and produce at
/// most one navigation until a new pair is stored.
#[derive(Clone)]
pub struct SessionTerminator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionTerminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTerminator")
            .field("login_url", &self.inner.login_url)
            .field("navigated", &self.inner.navigated.load(Ordering::SeqCst))
            .finish()
    }
}

impl SessionTerminator {
    pub fn new(
        store: CredentialStore,
        navigator: Arc<dyn Navigator>,
        login_url: impl Into<String>,
    ) -> Self {
        let inner = Arc::new(Inner {
            store: store.clone(),
            navigator,
            login_url: login_url.into(),
            navigated: AtomicBool::new(false),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        store.subscribe(move |event| {
            if let (CredentialEvent::Set(_), Some(inner)) = (event, weak.upgrade()) {
                inner.navigated.store(false, Ordering::SeqCst);
            }
        });

        Self { inner }
    }

    pub fn login_url(&self) -> &str {
        &self.inner.login_url
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.inner.navigator
    }

    /// End the session.
    pub fn terminate(&self) {
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear persisted credentials during logout");
        }

        if self.inner.navigator.current_location().as_deref() == Some(self.inner.login_url.as_str())
        {
            debug!("Already at login, skipping redirect");
            return;
        }

        if self.inner.navigated.swap(true, Ordering::SeqCst) {
            debug!("Redirect to login already issued");
            return;
        }

        info!(login_url = %self.inner.login_url, "Session ended, redirecting to login");
        self.inner.navigator.navigate(&self.inner.login_url);
    }
}

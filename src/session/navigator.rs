//! Navigation boundary.
//!
//! The transport never knows what "going to the login page" means for its
//! host; it calls a [`Navigator`].

use parking_lot::{Mutex, RwLock};
use tracing::info;

/// Performs hard navigations on behalf of the session.
pub trait Navigator: Send + Sync {
    /// Where the host currently is, if known.
    fn current_location(&self) -> Option<String>;

    /// Leave the current location for `location`.
    fn navigate(&self, location: &str);
}

/// Navigator for headless hosts: logs the redirect and remembers it.
#[derive(Debug, Default)]
pub struct TracingNavigator {
    location: RwLock<Option<String>>,
}

impl TracingNavigator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Navigator for TracingNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.read().clone()
    }

    fn navigate(&self, location: &str) {
        info!(location, "Redirecting");
        *self.location.write() = Some(location.to_string());
    }
}

/// Test helper: records every navigation instead of performing it.
///
/// Public so integration tests and embedding hosts can assert on redirects.
/// The last recorded location doubles as the current one, so a recorded
/// visit to the login page suppresses further redirects there.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visits: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every location navigated to, oldest first.
    pub fn visits(&self) -> Vec<String> {
        self.visits.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.visits.lock().len()
    }
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> Option<String> {
        self.visits.lock().last().cloned()
    }

    fn navigate(&self, location: &str) {
        self.visits.lock().push(location.to_string());
    }
}

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::Session;

/// Every session opened during a deployment, so they can all be released on shutdown.
/// Clones share the same sessions.
#[derive(Debug)]
pub struct SessionRegistry<S> {
    sessions: Arc<Mutex<Vec<Arc<S>>>>,
}

impl<S> Clone for SessionRegistry<S> {
    fn clone(&self) -> Self {
        Self { sessions: Arc::clone(&self.sessions) }
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self { sessions: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<S: Session> SessionRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracks `session` until [`shutdown_all`](Self::shutdown_all).
    pub fn register(&self, session: Arc<S>) {
        debug!(switch = session.switch(), "Registered session");
        self.sessions.lock().push(session);
    }

    /// Number of sessions tracked.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Returns `true` if no session is tracked.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    /// Shuts every registered session down and forgets it. Failures are logged and do not stop
    /// the remaining sessions from being released. Returns the number of sessions closed
    /// cleanly.
    pub async fn shutdown_all(&self) -> usize {
        let sessions = std::mem::take(&mut *self.sessions.lock());

        let mut closed = 0;
        for session in sessions {
            match session.shutdown().await {
                Ok(()) => closed += 1,
                Err(e) => warn!(switch = session.switch(), err = %e, "Failed to shut down session"),
            }
        }

        debug!(closed, "Shut down all sessions");
        closed
    }
}

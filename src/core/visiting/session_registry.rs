use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::debug;

use crate::metrics::VISIT_SESSIONS_ACTIVE;
use crate::VisitorSession;

pub type SessionId = String;

/// Live visitor sessions, keyed by an id generated at registration.
///
/// A session can finish before the task that created it has registered it.
/// [`SessionRegistry::deregister`] therefore waits for the registering side
/// to signal before removing the entry.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<dyn VisitorSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        id: SessionId,
        session: Arc<dyn VisitorSession>,
        registered: oneshot::Sender<()>,
    ) {
        debug!(session = %id, "visitor session registered");
        self.sessions.insert(id, session);
        VISIT_SESSIONS_ACTIVE.set(self.sessions.len() as i64);
        let _ = registered.send(());
    }

    /// Removes the session once it is registered. `None` if it was already
    /// taken by [`SessionRegistry::destroy_all`].
    pub async fn deregister(
        &self,
        id: &str,
        registered: oneshot::Receiver<()>,
    ) -> Option<Arc<dyn VisitorSession>> {
        // a dropped sender means registration will never happen
        let _ = registered.await;
        let removed = self.sessions.remove(id).map(|(_, session)| session);
        VISIT_SESSIONS_ACTIVE.set(self.sessions.len() as i64);
        debug!(session = %id, found = removed.is_some(), "visitor session deregistered");
        removed
    }

    pub fn abort_all(&self) -> usize {
        let mut aborted = 0;
        for entry in self.sessions.iter() {
            entry.value().abort();
            aborted += 1;
        }
        aborted
    }

    /// Removes and destroys every remaining session.
    pub fn destroy_all(&self) -> usize {
        let ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut destroyed = 0;
        for id in ids {
            if let Some((_, session)) = self.sessions.remove(&id) {
                session.abort();
                session.destroy();
                destroyed += 1;
            }
        }
        VISIT_SESSIONS_ACTIVE.set(self.sessions.len() as i64);
        destroyed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(
        &self,
        id: &str,
    ) -> bool {
        self.sessions.contains_key(id)
    }
}

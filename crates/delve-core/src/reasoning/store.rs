//! Explicit registry of running sessions, owned by the calling layer.

use std::collections::HashMap;

use uuid::Uuid;

use super::error::ReasoningResult;
use super::session::{ReasoningSession, SessionHandle, SessionOutcome};

/// Tracks spawned sessions by id. Entries live until waited on or evicted.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<Uuid, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `session` and registers its handle.
    pub fn start(&mut self, session: ReasoningSession) -> Uuid {
        let handle = session.start();
        let id = handle.id();
        tracing::debug!(session = %id, "session registered");
        self.sessions.insert(id, handle);
        id
    }

    /// Requests cancellation. Returns false for unknown ids.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.sessions.get(&id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<&SessionHandle> {
        self.sessions.get(&id)
    }

    /// Returns whether the session has ended, or `None` for unknown ids.
    pub fn is_finished(&self, id: Uuid) -> Option<bool> {
        self.sessions.get(&id).map(SessionHandle::is_finished)
    }

    /// Removes the session and waits for its outcome.
    pub async fn wait(&mut self, id: Uuid) -> Option<ReasoningResult<SessionOutcome>> {
        let handle = self.sessions.remove(&id)?;
        Some(handle.wait().await)
    }

    /// Drops a session, cancelling it first if it is still running.
    pub fn evict(&mut self, id: Uuid) -> bool {
        let Some(handle) = self.sessions.remove(&id) else {
            return false;
        };
        if !handle.is_finished() {
            handle.cancel();
        }
        tracing::debug!(session = %id, "session evicted");
        true
    }

    /// Drops every finished session and returns how many were removed.
    pub fn evict_finished(&mut self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| !handle.is_finished());
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.sessions.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::core::context::ResearchContext;
    use crate::providers::ModelGateway;
    use crate::reasoning::session::{SessionOptions, SessionStatus};
    use crate::reasoning::test_support::ScriptedGateway;

    fn session(script: ScriptedGateway) -> ReasoningSession {
        let options = SessionOptions {
            timeout: None,
            ..SessionOptions::default()
        };
        let gateway: Arc<dyn ModelGateway> = Arc::new(script);
        ReasoningSession::new("task", ResearchContext::new(), options, gateway)
    }

    #[tokio::test]
    async fn test_start_and_wait_removes_entry() {
        let mut store = SessionStore::new();
        let id = store.start(session(ScriptedGateway::new([
            "1. Only", "done", "COMPLETE", "answer",
        ])));

        assert_eq!(store.len(), 1);
        assert_eq!(store.ids(), vec![id]);
        let outcome = store.wait(id).await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Completed);
        assert!(store.is_empty());
        assert!(store.wait(id).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_running_session() {
        let mut store = SessionStore::new();
        let script = ScriptedGateway::new([
            "1. One\n2. Two\n3. Three",
            "r1",
            "COMPLETE",
            "r2",
            "COMPLETE",
            "r3",
            "COMPLETE",
            "answer",
        ])
        .with_delay(Duration::from_secs(1));
        let id = store.start(session(script));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(store.cancel(id));
        assert!(store.get(id).unwrap().is_cancelled());

        let outcome = store.wait(id).await.unwrap().unwrap();
        assert_eq!(outcome.status, SessionStatus::Cancelled);
        assert!(outcome.results.len() < 3);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let mut store = SessionStore::new();
        let id = Uuid::new_v4();
        assert!(!store.cancel(id));
        assert!(!store.evict(id));
        assert!(store.get(id).is_none());
        assert_eq!(store.is_finished(id), None);
    }

    #[tokio::test]
    async fn test_evict_finished_keeps_running_sessions() {
        let mut store = SessionStore::new();
        let done = store.start(session(ScriptedGateway::new(["no list"; 3])));
        let running = store.start(session(
            ScriptedGateway::new(["1. Slow"]).with_delay(Duration::from_secs(3600)),
        ));

        while !store.is_finished(done).unwrap() {
            tokio::task::yield_now().await;
        }
        assert_eq!(store.evict_finished(), 1);
        assert_eq!(store.ids(), vec![running]);

        assert!(store.evict(running));
        assert!(store.is_empty());
    }
}

//! Observable session store.
//!
//! Holds the single [`SessionState`] and publishes every accepted change to
//! subscribers through a `tokio::sync::watch` channel.

use super::session::{SessionAction, SessionState};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle to the session state.
///
/// Cloning is cheap; all clones observe and mutate the same state.
#[derive(Clone)]
pub struct SessionStore {
    sender: Arc<watch::Sender<SessionState>>,
}

impl SessionStore {
    /// Create a store in the `Initializing` phase
    pub fn new(online: bool) -> Self {
        let (sender, _) = watch::channel(SessionState::new(online));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Get a copy of the current state
    pub fn snapshot(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Read the current state without copying it
    pub fn read<R>(&self, f: impl FnOnce(&SessionState) -> R) -> R {
        f(&self.sender.borrow())
    }

    /// Subscribe to state changes.
    ///
    /// The receiver starts out holding the current state; dropping it
    /// unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Apply an action and notify subscribers if it changed anything.
    ///
    /// Returns whether the action was applied.
    pub fn dispatch(&self, action: SessionAction) -> bool {
        log::trace!("session action: {:?}", action);
        self.sender.send_if_modified(|state| state.reduce(action))
    }

    /// Wait until the state satisfies `predicate` and return that state
    pub async fn wait_for<F>(&self, mut predicate: F) -> SessionState
    where
        F: FnMut(&SessionState) -> bool,
    {
        let mut receiver = self.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        match receiver.wait_for(|state| predicate(state)).await {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Operation;
    use std::time::Duration;

    #[test]
    fn test_dispatch_updates_snapshot() {
        let store = SessionStore::new(true);
        assert!(store.dispatch(SessionAction::Failed("boom".to_string())));
        assert_eq!(store.snapshot().error_message.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_subscriber_sees_changes() {
        let store = SessionStore::new(true);
        let mut rx = store.subscribe();

        store.dispatch(SessionAction::ConnectivityChanged(false));
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().online);
    }

    #[tokio::test]
    async fn test_unchanged_dispatch_does_not_notify() {
        let store = SessionStore::new(true);
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert!(!store.dispatch(SessionAction::ClearError));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_resolves_on_matching_state() {
        let store = SessionStore::new(true);
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait_for(|s| s.initialized).await })
        };

        store.dispatch(SessionAction::OperationStarted(Operation::Login));
        store.dispatch(SessionAction::Initialized);

        let state = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(state.initialized);
        assert!(state.loading);
    }
}

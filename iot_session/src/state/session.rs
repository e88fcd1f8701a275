//! Session state, the actions that mutate it, and the reducer.

use crate::auth::models::{Operation, UserProfile};
use serde::Serialize;

/// Stage of a profile publication within one resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Stage {
    /// Built from identity fields only
    #[default]
    Minimal,
    /// Identity fields merged with the stored document
    Merged,
    /// Identity went away
    Cleared,
}

/// Monotonic tag carried by every profile publication.
///
/// Each resolution or sign-out takes a new epoch; within one epoch the
/// minimal publication orders before the merged one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Freshness {
    pub epoch: u64,
    pub stage: Stage,
}

impl Freshness {
    pub fn new(epoch: u64, stage: Stage) -> Self {
        Self { epoch, stage }
    }
}

/// Observable phase of the session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Initializing,
    Unauthenticated,
    Authenticating,
    Authenticated,
    OperationInFlight,
}

/// Snapshot handed to every consumer of the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub current_user: Option<UserProfile>,
    pub loading: bool,
    pub error_message: Option<String>,
    pub success_message: Option<String>,
    pub online: bool,
    /// Set once the first identity-change notification has been handled
    pub initialized: bool,
    /// Operations currently in flight
    pub pending_operations: usize,
    pub last_operation: Option<Operation>,
    pub freshness: Freshness,
}

/// State transitions accepted by [`SessionState::reduce`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    OperationStarted(Operation),
    OperationFinished(Operation),
    Failed(String),
    Succeeded(String),
    ClearError,
    ClearSuccess,
    ProfilePublished {
        profile: UserProfile,
        freshness: Freshness,
    },
    SignedOut {
        freshness: Freshness,
    },
    ConnectivityChanged(bool),
    Initialized,
}

impl SessionState {
    pub fn new(online: bool) -> Self {
        Self {
            current_user: None,
            loading: true,
            error_message: None,
            success_message: None,
            online,
            initialized: false,
            pending_operations: 0,
            last_operation: None,
            freshness: Freshness::default(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.pending_operations > 0 {
            if self.current_user.is_some() {
                return SessionPhase::OperationInFlight;
            }
            if self.last_operation.is_some_and(|op| op.signs_in()) {
                return SessionPhase::Authenticating;
            }
        }

        if !self.initialized && self.pending_operations == 0 {
            SessionPhase::Initializing
        } else if self.current_user.is_some() {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Unauthenticated
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user.is_some()
    }

    /// Apply an action. Returns `false` when the action changed nothing,
    /// which includes stale profile publications.
    pub fn reduce(&mut self, action: SessionAction) -> bool {
        match action {
            SessionAction::OperationStarted(op) => {
                self.pending_operations += 1;
                self.last_operation = Some(op);
                self.loading = true;
                self.error_message = None;
                self.success_message = None;
                true
            }
            SessionAction::OperationFinished(_) => {
                self.pending_operations = self.pending_operations.saturating_sub(1);
                if self.pending_operations == 0 {
                    self.loading = false;
                }
                true
            }
            SessionAction::Failed(message) => {
                self.error_message = Some(message);
                true
            }
            SessionAction::Succeeded(message) => {
                self.success_message = Some(message);
                true
            }
            SessionAction::ClearError => self.error_message.take().is_some(),
            SessionAction::ClearSuccess => self.success_message.take().is_some(),
            SessionAction::ProfilePublished { profile, freshness } => {
                if freshness <= self.freshness {
                    return false;
                }
                self.freshness = freshness;
                self.current_user = Some(profile);
                true
            }
            SessionAction::SignedOut { freshness } => {
                if freshness <= self.freshness {
                    return false;
                }
                self.freshness = freshness;
                self.current_user = None;
                true
            }
            SessionAction::ConnectivityChanged(online) => {
                let changed = self.online != online;
                self.online = online;
                changed
            }
            SessionAction::Initialized => {
                if self.initialized {
                    return false;
                }
                self.initialized = true;
                self.loading = self.pending_operations > 0;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::Role;
    use chrono::DateTime;

    fn profile(id: &str) -> UserProfile {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        UserProfile {
            id: id.to_string(),
            display_name: "Operator".to_string(),
            email: "ops@plant.example".to_string(),
            avatar_url: None,
            phone_number: None,
            role: Role::IndustrialClient,
            created_at: at,
            last_login_at: at,
        }
    }

    #[test]
    fn test_new_state_is_initializing_and_loading() {
        let state = SessionState::new(true);
        assert!(state.loading);
        assert_eq!(state.phase(), SessionPhase::Initializing);
    }

    #[test]
    fn test_initialized_fires_once() {
        let mut state = SessionState::new(true);
        assert!(state.reduce(SessionAction::Initialized));
        assert!(!state.loading);
        assert_eq!(state.phase(), SessionPhase::Unauthenticated);
        assert!(!state.reduce(SessionAction::Initialized));
    }

    #[test]
    fn test_operation_clears_messages_and_tracks_loading() {
        let mut state = SessionState::new(true);
        state.reduce(SessionAction::Initialized);
        state.reduce(SessionAction::Failed("old".to_string()));
        state.reduce(SessionAction::Succeeded("old".to_string()));

        state.reduce(SessionAction::OperationStarted(Operation::Login));
        assert!(state.loading);
        assert!(state.error_message.is_none());
        assert!(state.success_message.is_none());
        assert_eq!(state.phase(), SessionPhase::Authenticating);

        state.reduce(SessionAction::OperationFinished(Operation::Login));
        assert!(!state.loading);
    }

    #[test]
    fn test_overlapping_operations_keep_loading_until_last() {
        let mut state = SessionState::new(true);
        state.reduce(SessionAction::OperationStarted(Operation::Login));
        state.reduce(SessionAction::OperationStarted(Operation::ResetPassword));
        state.reduce(SessionAction::OperationFinished(Operation::Login));
        assert!(state.loading);
        state.reduce(SessionAction::OperationFinished(Operation::ResetPassword));
        assert!(!state.loading);
    }

    #[test]
    fn test_operation_finishing_before_initialization_clears_loading() {
        let mut state = SessionState::new(true);
        state.reduce(SessionAction::OperationStarted(Operation::Login));
        state.reduce(SessionAction::OperationFinished(Operation::Login));
        assert!(!state.loading);
    }

    #[test]
    fn test_stale_publication_rejected() {
        let mut state = SessionState::new(true);
        assert!(state.reduce(SessionAction::ProfilePublished {
            profile: profile("a"),
            freshness: Freshness::new(2, Stage::Merged),
        }));
        assert!(!state.reduce(SessionAction::ProfilePublished {
            profile: profile("b"),
            freshness: Freshness::new(2, Stage::Minimal),
        }));
        assert!(!state.reduce(SessionAction::ProfilePublished {
            profile: profile("c"),
            freshness: Freshness::new(1, Stage::Merged),
        }));
        assert_eq!(state.current_user.unwrap().id, "a");
    }

    #[test]
    fn test_sign_out_beats_late_merge() {
        let mut state = SessionState::new(true);
        state.reduce(SessionAction::ProfilePublished {
            profile: profile("a"),
            freshness: Freshness::new(1, Stage::Minimal),
        });
        state.reduce(SessionAction::SignedOut {
            freshness: Freshness::new(2, Stage::Cleared),
        });
        let applied = state.reduce(SessionAction::ProfilePublished {
            profile: profile("a"),
            freshness: Freshness::new(1, Stage::Merged),
        });
        assert!(!applied);
        assert!(state.current_user.is_none());
    }

    #[test]
    fn test_phase_in_flight_when_authenticated() {
        let mut state = SessionState::new(true);
        state.reduce(SessionAction::Initialized);
        state.reduce(SessionAction::ProfilePublished {
            profile: profile("a"),
            freshness: Freshness::new(1, Stage::Minimal),
        });
        assert_eq!(state.phase(), SessionPhase::Authenticated);
        state.reduce(SessionAction::OperationStarted(Operation::Logout));
        assert_eq!(state.phase(), SessionPhase::OperationInFlight);
    }

    #[test]
    fn test_connectivity_change_reports_only_real_transitions() {
        let mut state = SessionState::new(true);
        assert!(!state.reduce(SessionAction::ConnectivityChanged(true)));
        assert!(state.reduce(SessionAction::ConnectivityChanged(false)));
        assert!(!state.online);
    }
}

//! # IoT Session
//!
//! Authentication session management for the IoT monitoring dashboard.
//!
//! The crate keeps a single observable [`SessionState`] in sync with an
//! external identity provider, a profile document store and a connectivity
//! signal. User operations and provider notifications both flow through
//! [`SessionManager`], which is the only writer of the state.
//!
//! ## Core Modules
//!
//! - [`auth`]: Session manager, error normalization and profile resolution
//! - [`state`]: Session state, its reducer and the observable store
//! - [`providers`]: Collaborator contracts with Firebase and in-memory implementations
//! - [`config`]: Environment-driven configuration
//!
//! ## Example
//!
//! ```
//! use iot_session::state::{SessionPhase, SessionStore};
//!
//! let store = SessionStore::new(true);
//! assert_eq!(store.snapshot().phase(), SessionPhase::Initializing);
//! ```

/// Session lifecycle, errors and profile models.
pub mod auth;
pub use auth::{IdentityError, Role, SessionManager, SessionTasks, UserProfile};

/// Time source for profile timestamps.
pub mod clock;

pub mod config;
pub use config::{SessionConfig, SessionSettings};

/// External collaborators.
pub mod providers;

/// Observable session state.
pub mod state;
pub use state::{SessionPhase, SessionState, SessionStore};

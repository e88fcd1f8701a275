//! Authentication session management.
//!
//! [`SessionManager`] runs the session lifecycle on top of an identity
//! provider and a profile store: sign-in, registration, OAuth flows,
//! password reset and sign-out, plus reconciliation with identity and
//! connectivity changes that happen outside of any user operation.
//!
//! ## Example
//!
//! ```no_run
//! use iot_session::auth::SessionManager;
//! use iot_session::config::SessionSettings;
//! use iot_session::providers::{ManualConnectivity, MemoryIdentityProvider, MemoryProfileStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = SessionManager::new(
//!         Arc::new(MemoryIdentityProvider::new()),
//!         Arc::new(MemoryProfileStore::new()),
//!         Arc::new(ManualConnectivity::new(true)),
//!         SessionSettings::default(),
//!     );
//!     let _tasks = manager.start();
//!
//!     manager
//!         .register("operator@plant.example", "secret12", Some("Operator"), None)
//!         .await;
//!     println!("{:?}", manager.snapshot().current_user);
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod profile;

pub use errors::{
    GENERIC_AUTH_FAILURE, IdentityError, IdentityResult, OFFLINE_NOTICE, ProfileStoreError,
    ProfileStoreResult, SIGN_OUT_FAILURE,
};
pub use manager::{SessionManager, SessionManagerBuilder, SessionTasks};
pub use models::{
    DEFAULT_DISPLAY_NAME, Identity, OAuthProvider, Operation, ProfileDocument, ProfileSeed, Role,
    SetMode, USERS_COLLECTION, UserProfile,
};

//! Contracts for the external collaborators of the session manager.
//!
//! The identity provider, profile store and connectivity signal are
//! trait objects so the manager can run against Firebase, the in-memory
//! implementations, or anything else speaking the same contract.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::auth::{
    IdentityResult, ProfileStoreResult,
    models::{Identity, OAuthProvider, ProfileDocument, SetMode},
};

pub mod connectivity;
pub mod firebase;
pub mod memory;

pub use connectivity::{ManualConnectivity, ProbeConnectivity};
pub use firebase::{FirebaseAuth, FirebaseConfig, Firestore};
pub use memory::{MemoryIdentityProvider, MemoryProfileStore};

/// Identity provider operations
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate with email and password
    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    /// Create a new email/password identity and sign it in
    async fn create_user(&self, email: &str, password: &str) -> IdentityResult<Identity>;

    /// Authenticate through a popup window
    async fn sign_in_with_popup(&self, provider: &OAuthProvider) -> IdentityResult<Identity>;

    /// Start a redirect-based sign-in; the result arrives on the next load
    async fn sign_in_with_redirect(&self, provider: &OAuthProvider) -> IdentityResult<()>;

    /// Take the result of a pending redirect sign-in, if there is one
    async fn consume_redirect_result(&self) -> IdentityResult<Option<Identity>>;

    /// Send a password reset email
    async fn send_password_reset(&self, email: &str) -> IdentityResult<()>;

    /// End the current provider session
    async fn sign_out(&self) -> IdentityResult<()>;

    /// Subscribe to identity changes.
    ///
    /// The receiver's initial value is the identity at subscription time.
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// Profile document store operations
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a document, `None` if it does not exist
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> ProfileStoreResult<Option<ProfileDocument>>;

    /// Write a document
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        fields: ProfileDocument,
        mode: SetMode,
    ) -> ProfileStoreResult<()>;

    /// Enable or disable network access for subsequent requests
    async fn set_network_enabled(&self, enabled: bool) -> ProfileStoreResult<()>;
}

/// Online/offline signal
pub trait ConnectivitySignal: Send + Sync {
    fn is_online(&self) -> bool;

    /// Subscribe to transitions; dropping the receiver unsubscribes
    fn subscribe(&self) -> watch::Receiver<bool>;
}

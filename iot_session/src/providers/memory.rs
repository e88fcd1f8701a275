//! In-memory identity provider and profile store.
//!
//! Used by the console's demo backend and throughout the tests. Both types
//! can be scripted to fail so every error path of the session manager can
//! be exercised without a network.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};
use tokio::sync::{Notify, Semaphore, watch};
use uuid::Uuid;

use super::{IdentityProvider, ProfileStore};
use crate::auth::{
    IdentityError, IdentityResult, ProfileStoreError, ProfileStoreResult,
    models::{Identity, OAuthProvider, ProfileDocument, SetMode},
};

/// Provider call that a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderCall {
    SignIn,
    CreateUser,
    Popup,
    Redirect,
    ConsumeRedirect,
    PasswordReset,
    SignOut,
}

#[derive(Debug, Clone)]
struct Account {
    identity: Identity,
    password: String,
}

/// Identity provider keeping accounts in a map
pub struct MemoryIdentityProvider {
    accounts: Mutex<HashMap<String, Account>>,
    oauth_identity: Mutex<Option<Identity>>,
    pending_redirect: Mutex<Option<Identity>>,
    failures: Mutex<HashMap<ProviderCall, IdentityError>>,
    password_resets: Mutex<Vec<String>>,
    current: watch::Sender<Option<Identity>>,
    calls: AtomicUsize,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            oauth_identity: Mutex::new(None),
            pending_redirect: Mutex::new(None),
            failures: Mutex::new(HashMap::new()),
            password_resets: Mutex::new(Vec::new()),
            current,
            calls: AtomicUsize::new(0),
        }
    }

    /// Add an email/password account
    pub fn with_account(self, identity: Identity, password: &str) -> Self {
        self.add_account(identity, password);
        self
    }

    /// Identity returned by popup and redirect sign-ins
    pub fn with_oauth_identity(self, identity: Identity) -> Self {
        *self.oauth_identity.lock().unwrap() = Some(identity);
        self
    }

    /// Pretend a redirect sign-in completed before this load
    pub fn with_pending_redirect(self, identity: Identity) -> Self {
        *self.pending_redirect.lock().unwrap() = Some(identity);
        self
    }

    /// Start out with an identity already signed in
    pub fn with_signed_in(self, identity: Identity) -> Self {
        self.current.send_replace(Some(identity));
        self
    }

    pub fn add_account(&self, identity: Identity, password: &str) {
        let email = identity.email.clone().unwrap_or_default();
        self.accounts.lock().unwrap().insert(
            email,
            Account {
                identity,
                password: password.to_string(),
            },
        );
    }

    /// Make the next call of `call` fail with `error`
    pub fn fail_next(&self, call: ProviderCall, error: IdentityError) {
        self.failures.lock().unwrap().insert(call, error);
    }

    /// Simulate the session ending elsewhere, e.g. a revoked token
    pub fn revoke_session(&self) {
        self.current.send_replace(None);
    }

    /// Identity currently signed in
    pub fn current_identity(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }

    /// Total number of provider operations invoked so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Addresses a password reset was sent to
    pub fn password_resets(&self) -> Vec<String> {
        self.password_resets.lock().unwrap().clone()
    }

    fn enter(&self, call: ProviderCall) -> IdentityResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failures.lock().unwrap().remove(&call) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn signed_in(&self, mut identity: Identity) -> Identity {
        identity.last_sign_in_at = Some(Utc::now());
        self.current.send_replace(Some(identity.clone()));
        identity
    }

    fn oauth_identity(&self) -> IdentityResult<Identity> {
        self.oauth_identity
            .lock()
            .unwrap()
            .clone()
            .ok_or(IdentityError::PopupClosedByUser)
    }
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.enter(ProviderCall::SignIn)?;

        let account = self
            .accounts
            .lock()
            .unwrap()
            .get(email)
            .cloned()
            .ok_or(IdentityError::UserNotFound)?;

        if account.password != password {
            return Err(IdentityError::WrongPassword);
        }

        Ok(self.signed_in(account.identity))
    }

    async fn create_user(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        self.enter(ProviderCall::CreateUser)?;

        if !email.contains('@') {
            return Err(IdentityError::InvalidEmail);
        }
        if password.len() < 6 {
            return Err(IdentityError::WeakPassword);
        }

        let identity = {
            let mut accounts = self.accounts.lock().unwrap();
            if accounts.contains_key(email) {
                return Err(IdentityError::EmailAlreadyInUse);
            }

            let identity = Identity {
                uid: Uuid::new_v4().simple().to_string(),
                email: Some(email.to_string()),
                created_at: Some(Utc::now()),
                ..Default::default()
            };
            accounts.insert(
                email.to_string(),
                Account {
                    identity: identity.clone(),
                    password: password.to_string(),
                },
            );
            identity
        };

        Ok(self.signed_in(identity))
    }

    async fn sign_in_with_popup(&self, _provider: &OAuthProvider) -> IdentityResult<Identity> {
        self.enter(ProviderCall::Popup)?;
        let identity = self.oauth_identity()?;
        Ok(self.signed_in(identity))
    }

    async fn sign_in_with_redirect(&self, _provider: &OAuthProvider) -> IdentityResult<()> {
        self.enter(ProviderCall::Redirect)?;
        let identity = self.oauth_identity()?;
        *self.pending_redirect.lock().unwrap() = Some(identity);
        Ok(())
    }

    async fn consume_redirect_result(&self) -> IdentityResult<Option<Identity>> {
        self.enter(ProviderCall::ConsumeRedirect)?;
        let pending = self.pending_redirect.lock().unwrap().take();
        Ok(pending.map(|identity| self.signed_in(identity)))
    }

    async fn send_password_reset(&self, email: &str) -> IdentityResult<()> {
        self.enter(ProviderCall::PasswordReset)?;
        if !self.accounts.lock().unwrap().contains_key(email) {
            return Err(IdentityError::UserNotFound);
        }
        self.password_resets.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.enter(ProviderCall::SignOut)?;
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

/// Profile store keeping documents in a map
pub struct MemoryProfileStore {
    documents: Mutex<HashMap<(String, String), ProfileDocument>>,
    network_enabled: AtomicBool,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    read_gate: Mutex<Option<Arc<Semaphore>>>,
    read_started: Notify,
    writes: AtomicUsize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(HashMap::new()),
            network_enabled: AtomicBool::new(true),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            read_gate: Mutex::new(None),
            read_started: Notify::new(),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn with_document(self, collection: &str, key: &str, document: ProfileDocument) -> Self {
        self.documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), key.to_string()), document);
        self
    }

    pub fn document(&self, collection: &str, key: &str) -> Option<ProfileDocument> {
        self.documents
            .lock()
            .unwrap()
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::SeqCst)
    }

    /// Number of successful writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Park every subsequent read until [`release_reads`](Self::release_reads)
    pub fn hold_reads(&self) {
        *self.read_gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let `count` parked reads continue
    pub fn release_reads(&self, count: usize) {
        if let Some(gate) = self.read_gate.lock().unwrap().as_ref() {
            gate.add_permits(count);
        }
    }

    /// Resolves once a read has started
    pub async fn read_started(&self) {
        self.read_started.notified().await;
    }

    fn check_network(&self) -> ProfileStoreResult<()> {
        if self.network_enabled() {
            Ok(())
        } else {
            Err(ProfileStoreError::NetworkDisabled)
        }
    }
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> ProfileStoreResult<Option<ProfileDocument>> {
        self.read_started.notify_one();

        let gate = self.read_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| ProfileStoreError::Transport("read gate closed".to_string()))?
                .forget();
        }

        self.check_network()?;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ProfileStoreError::Transport("read rejected".to_string()));
        }
        Ok(self.document(collection, key))
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        fields: ProfileDocument,
        mode: SetMode,
    ) -> ProfileStoreResult<()> {
        self.check_network()?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ProfileStoreError::PermissionDenied(
                "write rejected".to_string(),
            ));
        }

        let mut documents = self.documents.lock().unwrap();
        let slot = (collection.to_string(), key.to_string());
        match mode {
            SetMode::Replace => {
                documents.insert(slot, fields);
            }
            SetMode::Merge => documents.entry(slot).or_default().merge(fields),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_network_enabled(&self, enabled: bool) -> ProfileStoreResult<()> {
        self.network_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{Role, USERS_COLLECTION};

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let provider = MemoryIdentityProvider::new()
            .with_account(Identity::new("u1").with_email("ops@plant.example"), "hunter22");

        let err = provider
            .sign_in_with_password("ops@plant.example", "nope")
            .await
            .unwrap_err();
        assert_eq!(err, IdentityError::WrongPassword);

        let identity = provider
            .sign_in_with_password("ops@plant.example", "hunter22")
            .await
            .unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(provider.current_identity().unwrap().uid, "u1");
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates_and_weak_passwords() {
        let provider = MemoryIdentityProvider::new();
        assert_eq!(
            provider.create_user("a@b.example", "123").await.unwrap_err(),
            IdentityError::WeakPassword
        );
        provider.create_user("a@b.example", "123456").await.unwrap();
        assert_eq!(
            provider
                .create_user("a@b.example", "123456")
                .await
                .unwrap_err(),
            IdentityError::EmailAlreadyInUse
        );
    }

    #[tokio::test]
    async fn test_scripted_failure_is_one_shot() {
        let provider = MemoryIdentityProvider::new();
        provider.fail_next(ProviderCall::SignOut, IdentityError::NetworkRequestFailed);

        assert!(provider.sign_out().await.is_err());
        assert!(provider.sign_out().await.is_ok());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_redirect_result_consumed_once() {
        let provider =
            MemoryIdentityProvider::new().with_oauth_identity(Identity::new("g1"));
        provider
            .sign_in_with_redirect(&OAuthProvider::google())
            .await
            .unwrap();

        let first = provider.consume_redirect_result().await.unwrap();
        assert_eq!(first.unwrap().uid, "g1");
        assert!(provider.consume_redirect_result().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_merge_and_replace() {
        let store = MemoryProfileStore::new();
        store
            .set_document(
                USERS_COLLECTION,
                "u1",
                ProfileDocument {
                    name: Some("Line 4".to_string()),
                    role: Some(Role::Integrator),
                    ..Default::default()
                },
                SetMode::Replace,
            )
            .await
            .unwrap();
        store
            .set_document(
                USERS_COLLECTION,
                "u1",
                ProfileDocument {
                    last_login: Some(Utc::now()),
                    ..Default::default()
                },
                SetMode::Merge,
            )
            .await
            .unwrap();

        let doc = store.document(USERS_COLLECTION, "u1").unwrap();
        assert_eq!(doc.role, Some(Role::Integrator));
        assert!(doc.last_login.is_some());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_store_fails_fast_with_network_disabled() {
        let store = MemoryProfileStore::new();
        store.set_network_enabled(false).await.unwrap();

        let err = store.get_document(USERS_COLLECTION, "u1").await.unwrap_err();
        assert!(matches!(err, ProfileStoreError::NetworkDisabled));
    }
}

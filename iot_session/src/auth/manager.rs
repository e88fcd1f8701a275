//! Session manager implementation.

use super::{
    errors::{IdentityError, IdentityResult, OFFLINE_NOTICE, SIGN_OUT_FAILURE},
    models::{Identity, Operation, ProfileSeed, Role, SetMode, USERS_COLLECTION, UserProfile},
    profile::{
        last_login_update, merge_profile, minimal_profile, registration_document, seed_document,
    },
};
use crate::{
    clock::{Clock, SystemClock},
    config::SessionSettings,
    providers::{ConnectivitySignal, IdentityProvider, ProfileStore},
    state::{Freshness, SessionAction, SessionState, SessionStore, Stage},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use tokio::{
    sync::{Mutex as AsyncMutex, watch},
    task::JoinHandle,
};

const LOGIN_SUCCESS: &str = "Login successful!";
const REGISTER_SUCCESS: &str = "Account created successfully!";
const GOOGLE_LOGIN_SUCCESS: &str = "Google login successful!";
const RESET_SUCCESS: &str = "Password reset email sent! Check your inbox.";

/// Session manager
///
/// Owns the session state and is the only thing that mutates it. Cloning
/// is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    connectivity: Arc<dyn ConnectivitySignal>,
    store: SessionStore,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    /// Serializes profile resolutions and registration writes
    resolution: AsyncMutex<()>,
    epochs: AtomicU64,
    /// Registration details per identity id, consulted by minimal profiles
    seeds: Mutex<HashMap<String, ProfileSeed>>,
    redirect_checked: AtomicBool,
}

/// Builder for [`SessionManager`]
pub struct SessionManagerBuilder {
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    connectivity: Arc<dyn ConnectivitySignal>,
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
}

impl SessionManagerBuilder {
    pub fn settings(mut self, settings: SessionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> SessionManager {
        let store = SessionStore::new(self.connectivity.is_online());
        SessionManager {
            inner: Arc::new(Inner {
                identity: self.identity,
                profiles: self.profiles,
                connectivity: self.connectivity,
                store,
                settings: self.settings,
                clock: self.clock,
                resolution: AsyncMutex::new(()),
                epochs: AtomicU64::new(0),
                seeds: Mutex::new(HashMap::new()),
                redirect_checked: AtomicBool::new(false),
            }),
        }
    }
}

/// Background tasks feeding provider and connectivity events into a session.
///
/// Dropping the value stops the tasks.
pub struct SessionTasks {
    handles: Vec<JoinHandle<()>>,
}

impl SessionTasks {
    /// Stop all background tasks
    pub fn shutdown(mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for SessionTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

/// Marks an operation in flight for as long as it lives
struct OperationGuard {
    store: SessionStore,
    operation: Operation,
}

impl OperationGuard {
    fn begin(store: &SessionStore, operation: Operation) -> Self {
        store.dispatch(SessionAction::OperationStarted(operation));
        Self {
            store: store.clone(),
            operation,
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.store
            .dispatch(SessionAction::OperationFinished(self.operation));
    }
}

impl SessionManager {
    /// Create a session manager with the given collaborators
    ///
    /// # Arguments
    ///
    /// * `identity` - Identity provider
    /// * `profiles` - Profile document store
    /// * `connectivity` - Online/offline signal
    /// * `settings` - Session settings
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        connectivity: Arc<dyn ConnectivitySignal>,
        settings: SessionSettings,
    ) -> Self {
        Self::builder(identity, profiles, connectivity)
            .settings(settings)
            .build()
    }

    pub fn builder(
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        connectivity: Arc<dyn ConnectivitySignal>,
    ) -> SessionManagerBuilder {
        SessionManagerBuilder {
            identity,
            profiles,
            connectivity,
            settings: SessionSettings::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Observable session state
    pub fn store(&self) -> &SessionStore {
        &self.inner.store
    }

    pub fn snapshot(&self) -> SessionState {
        self.inner.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.store.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.inner.store.read(|state| state.online)
    }

    /// Start reconciling with the outside world.
    ///
    /// Spawns the pending-redirect check, the identity-change watcher and
    /// the connectivity watcher. The first identity notification ends the
    /// `Initializing` phase.
    pub fn start(&self) -> SessionTasks {
        let redirect = {
            let manager = self.clone();
            tokio::spawn(async move { manager.check_redirect_result().await })
        };

        let identity_watch = {
            let manager = self.clone();
            let mut changes = self.inner.identity.subscribe();
            tokio::spawn(async move {
                loop {
                    let identity = changes.borrow_and_update().clone();
                    manager.handle_identity_change(identity).await;
                    if changes.changed().await.is_err() {
                        log::debug!("Identity provider closed its change feed");
                        break;
                    }
                }
            })
        };

        let connectivity_watch = {
            let manager = self.clone();
            let mut changes = self.inner.connectivity.subscribe();
            tokio::spawn(async move {
                let online = *changes.borrow_and_update();
                if !online || online != manager.is_online() {
                    manager.handle_connectivity_change(online).await;
                }
                while changes.changed().await.is_ok() {
                    let online = *changes.borrow_and_update();
                    manager.handle_connectivity_change(online).await;
                }
                log::debug!("Connectivity signal closed");
            })
        };

        SessionTasks {
            handles: vec![redirect, identity_watch, connectivity_watch],
        }
    }

    /// Sign in with email and password
    pub async fn login(&self, email: &str, password: &str) {
        let op = Operation::Login;
        if !self.require_online(op) {
            return;
        }
        let _guard = OperationGuard::begin(&self.inner.store, op);

        match self.inner.identity.sign_in_with_password(email, password).await {
            Ok(identity) => {
                if self.resolve_profile(&identity).await.is_some() {
                    self.succeed(op, LOGIN_SUCCESS);
                }
            }
            Err(err) => self.fail(op, &err),
        }
    }

    /// Create an account and its profile document.
    ///
    /// A profile store failure does not fail the registration. The admin
    /// role cannot be requested here.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        role: Option<Role>,
    ) {
        let op = Operation::Register;
        if !self.require_online(op) {
            return;
        }
        let _guard = OperationGuard::begin(&self.inner.store, op);

        let role = match role {
            Some(Role::Admin) => {
                log::warn!(
                    "Registration cannot grant the admin role, using {}",
                    Role::default()
                );
                Role::default()
            }
            Some(role) => role,
            None => Role::default(),
        };
        let name = name.filter(|n| !n.trim().is_empty());

        let identity = match self.inner.identity.create_user(email, password).await {
            Ok(identity) => identity,
            Err(err) => {
                self.fail(op, &err);
                return;
            }
        };

        {
            let _resolving = self.inner.resolution.lock().await;
            self.remember_seed(
                &identity.uid,
                ProfileSeed {
                    name: name.map(str::to_string),
                    role: Some(role),
                },
            );

            if self.is_online() {
                let document = registration_document(
                    name,
                    role,
                    &self.inner.settings.default_display_name,
                    self.inner.clock.now(),
                );
                if let Err(err) = self
                    .inner
                    .profiles
                    .set_document(USERS_COLLECTION, &identity.uid, document, SetMode::Replace)
                    .await
                {
                    log::error!(
                        "Profile store error during registration of {}: {}",
                        identity.uid,
                        err
                    );
                }
            }

            if self.resolve_locked(&identity).await.is_none() {
                return;
            }
        }

        self.succeed(op, REGISTER_SUCCESS);
    }

    /// Sign in through the OAuth popup.
    ///
    /// Unlike the other operations the provider error is also returned, so
    /// the caller can fall back to [`google_login_redirect`](Self::google_login_redirect).
    pub async fn google_login(&self) -> IdentityResult<()> {
        let op = Operation::GoogleLogin;
        if !self.require_online(op) {
            return Ok(());
        }
        let _guard = OperationGuard::begin(&self.inner.store, op);

        match self
            .inner
            .identity
            .sign_in_with_popup(&self.inner.settings.oauth_provider)
            .await
        {
            Ok(identity) => {
                if self.resolve_profile(&identity).await.is_some() {
                    self.succeed(op, GOOGLE_LOGIN_SUCCESS);
                }
                Ok(())
            }
            Err(err) => {
                self.fail(op, &err);
                Err(err)
            }
        }
    }

    /// Start the OAuth redirect flow; the result is picked up by
    /// [`check_redirect_result`](Self::check_redirect_result) on the next start
    pub async fn google_login_redirect(&self) {
        let op = Operation::GoogleLoginRedirect;
        if !self.require_online(op) {
            return;
        }
        let _guard = OperationGuard::begin(&self.inner.store, op);

        match self
            .inner
            .identity
            .sign_in_with_redirect(&self.inner.settings.oauth_provider)
            .await
        {
            Ok(()) => log::info!(
                "Redirecting to {} for sign-in",
                self.inner.settings.oauth_provider.provider_id
            ),
            Err(err) => self.fail(op, &err),
        }
    }

    /// Ask the provider to send a password reset email
    pub async fn reset_password(&self, email: &str) {
        let op = Operation::ResetPassword;
        if !self.require_online(op) {
            return;
        }
        let _guard = OperationGuard::begin(&self.inner.store, op);

        match self.inner.identity.send_password_reset(email).await {
            Ok(()) => self.succeed(op, RESET_SUCCESS),
            Err(err) => self.fail(op, &err),
        }
    }

    /// Sign out, regardless of connectivity.
    ///
    /// If the provider refuses, the current user is kept: the provider stays
    /// the source of truth.
    pub async fn logout(&self) {
        let op = Operation::Logout;
        let _guard = OperationGuard::begin(&self.inner.store, op);

        match self.inner.identity.sign_out().await {
            Ok(()) => {
                self.clear_user();
                log::info!("Signed out");
            }
            Err(err) => {
                log::error!("Logout error: {}", err);
                self.inner
                    .store
                    .dispatch(SessionAction::Failed(SIGN_OUT_FAILURE.to_string()));
            }
        }
    }

    pub fn clear_error(&self) {
        self.inner.store.dispatch(SessionAction::ClearError);
    }

    pub fn clear_success(&self) {
        self.inner.store.dispatch(SessionAction::ClearSuccess);
    }

    /// Derive and publish the profile for an authenticated identity.
    ///
    /// Publishes a minimal profile first, then the store-merged one when the
    /// store answers. Store failures are logged and never unauthenticate.
    ///
    /// Returns the profile this resolution arrived at, or `None` when the
    /// provider no longer reports `identity` as signed in. Nothing is
    /// published or written in that case.
    pub async fn resolve_profile(&self, identity: &Identity) -> Option<UserProfile> {
        let _resolving = self.inner.resolution.lock().await;
        self.resolve_locked(identity).await
    }

    /// React to an identity-change notification from the provider
    pub async fn handle_identity_change(&self, identity: Option<Identity>) {
        match identity {
            Some(identity) => {
                log::debug!("Identity change: {} signed in", identity.uid);
                self.resolve_profile(&identity).await;
            }
            None => {
                log::debug!("Identity change: signed out");
                self.clear_user();
            }
        }

        if self.inner.store.dispatch(SessionAction::Initialized) {
            log::info!("Session initialized");
        }
    }

    /// React to a connectivity transition
    pub async fn handle_connectivity_change(&self, online: bool) {
        if let Err(err) = self.inner.profiles.set_network_enabled(online).await {
            log::error!(
                "Failed to {} profile store network: {}",
                if online { "enable" } else { "disable" },
                err
            );
        }

        if self
            .inner
            .store
            .dispatch(SessionAction::ConnectivityChanged(online))
        {
            log::info!("Connectivity: {}", if online { "online" } else { "offline" });
        }
    }

    /// Consume a pending redirect sign-in. Runs at most once per manager.
    pub async fn check_redirect_result(&self) {
        if self.inner.redirect_checked.swap(true, Ordering::SeqCst) {
            return;
        }

        match self.inner.identity.consume_redirect_result().await {
            Ok(Some(identity)) => {
                log::info!("Completing redirect sign-in for {}", identity.uid);
                self.resolve_profile(&identity).await;
            }
            Ok(None) => {}
            Err(err) => {
                log::error!("Redirect result error: {}", err);
                self.inner
                    .store
                    .dispatch(SessionAction::Failed(err.user_message().to_string()));
            }
        }
    }

    async fn resolve_locked(&self, identity: &Identity) -> Option<UserProfile> {
        if !self.is_current_identity(&identity.uid) {
            log::debug!("Skipping resolution of {}: no longer signed in", identity.uid);
            return None;
        }

        let epoch = self.next_epoch();
        let seed = self.seed_for(&identity.uid);
        let minimal = minimal_profile(
            identity,
            seed.as_ref(),
            &self.inner.settings.default_display_name,
            self.inner.clock.now(),
        );
        self.publish(minimal.clone(), Freshness::new(epoch, Stage::Minimal));

        if !self.is_online() {
            log::debug!("Offline, keeping minimal profile for {}", identity.uid);
            return Some(minimal);
        }

        let profiles = &self.inner.profiles;
        let lookup = profiles.get_document(USERS_COLLECTION, &identity.uid).await;
        if !self.is_current_identity(&identity.uid) {
            log::debug!("{} signed out during resolution", identity.uid);
            return None;
        }

        let resolved = match lookup {
            Ok(Some(document)) => {
                let merged = merge_profile(&minimal, &document);
                self.publish(merged.clone(), Freshness::new(epoch, Stage::Merged));

                if let Err(err) = profiles
                    .set_document(
                        USERS_COLLECTION,
                        &identity.uid,
                        last_login_update(&merged),
                        SetMode::Merge,
                    )
                    .await
                {
                    log::warn!("Failed to record last login for {}: {}", identity.uid, err);
                }
                merged
            }
            Ok(None) => {
                log::info!("Creating profile document for {}", identity.uid);
                if let Err(err) = profiles
                    .set_document(
                        USERS_COLLECTION,
                        &identity.uid,
                        seed_document(&minimal),
                        SetMode::Replace,
                    )
                    .await
                {
                    log::warn!(
                        "Failed to create profile document for {}: {}",
                        identity.uid,
                        err
                    );
                }
                minimal
            }
            Err(err) => {
                log::warn!(
                    "Profile store error while resolving {}: {}",
                    identity.uid,
                    err
                );
                minimal
            }
        };
        Some(resolved)
    }

    /// Whether the provider still reports `uid` as the signed-in identity
    fn is_current_identity(&self, uid: &str) -> bool {
        self.inner
            .identity
            .subscribe()
            .borrow()
            .as_ref()
            .is_some_and(|current| current.uid == uid)
    }

    fn publish(&self, profile: UserProfile, freshness: Freshness) {
        let id = profile.id.clone();
        let applied = self
            .inner
            .store
            .dispatch(SessionAction::ProfilePublished { profile, freshness });
        if !applied {
            log::debug!("Dropped stale profile for {} ({:?})", id, freshness);
        }
    }

    fn clear_user(&self) {
        if let Ok(mut seeds) = self.inner.seeds.lock() {
            seeds.clear();
        }
        let freshness = Freshness::new(self.next_epoch(), Stage::Cleared);
        self.inner
            .store
            .dispatch(SessionAction::SignedOut { freshness });
    }

    fn next_epoch(&self) -> u64 {
        self.inner.epochs.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn remember_seed(&self, uid: &str, seed: ProfileSeed) {
        if let Ok(mut seeds) = self.inner.seeds.lock() {
            seeds.insert(uid.to_string(), seed);
        }
    }

    fn seed_for(&self, uid: &str) -> Option<ProfileSeed> {
        self.inner
            .seeds
            .lock()
            .ok()
            .and_then(|seeds| seeds.get(uid).cloned())
    }

    /// Check the connectivity precondition, recording the offline notice
    fn require_online(&self, op: Operation) -> bool {
        if self.is_online() {
            return true;
        }
        log::info!("{} skipped: offline", op);
        self.inner.store.dispatch(SessionAction::ClearSuccess);
        self.inner
            .store
            .dispatch(SessionAction::Failed(OFFLINE_NOTICE.to_string()));
        false
    }

    fn succeed(&self, op: Operation, message: &str) {
        log::info!("{} succeeded", op);
        self.inner
            .store
            .dispatch(SessionAction::Succeeded(message.to_string()));
    }

    fn fail(&self, op: Operation, err: &IdentityError) {
        log::warn!("{} failed: {}", op, err);
        self.inner
            .store
            .dispatch(SessionAction::Failed(err.user_message().to_string()));
    }
}

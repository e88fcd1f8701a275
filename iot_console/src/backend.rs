//! Builds a session manager from configuration.

use anyhow::{Context, Result};
use iot_session::{
    SessionConfig, SessionManager,
    config::Backend,
    providers::{
        ConnectivitySignal, FirebaseAuth, Firestore, IdentityProvider, ManualConnectivity,
        MemoryIdentityProvider, MemoryProfileStore, ProbeConnectivity, ProfileStore,
    },
};
use std::sync::Arc;

/// A wired session manager
pub struct Session {
    pub manager: SessionManager,
    /// Present when connectivity is driven from the console instead of a probe
    pub manual_connectivity: Option<Arc<ManualConnectivity>>,
}

/// Create the providers named by `config` and a manager on top of them.
///
/// Must be called inside a tokio runtime when a probe is configured.
pub fn build(config: &SessionConfig) -> Result<Session> {
    let (identity, profiles): (Arc<dyn IdentityProvider>, Arc<dyn ProfileStore>) =
        match &config.backend {
            Backend::Memory => (
                Arc::new(MemoryIdentityProvider::new()) as Arc<dyn IdentityProvider>,
                Arc::new(MemoryProfileStore::new()) as Arc<dyn ProfileStore>,
            ),
            Backend::Firebase(firebase) => {
                let auth = Arc::new(
                    FirebaseAuth::new(firebase.clone())
                        .context("Failed to create Firebase Authentication client")?,
                );
                let store = Firestore::new(firebase.clone(), auth.clone())
                    .context("Failed to create Firestore client")?;
                (auth as Arc<dyn IdentityProvider>, Arc::new(store) as Arc<dyn ProfileStore>)
            }
        };

    let (connectivity, manual_connectivity): (Arc<dyn ConnectivitySignal>, _) = match &config.probe
    {
        Some(probe) => {
            tracing::info!("Probing connectivity via {}", probe.addr);
            (
                Arc::new(ProbeConnectivity::spawn(probe.addr, probe.interval, probe.timeout))
                    as Arc<dyn ConnectivitySignal>,
                None,
            )
        }
        None => {
            let manual = Arc::new(ManualConnectivity::new(true));
            (manual.clone() as Arc<dyn ConnectivitySignal>, Some(manual))
        }
    };

    let manager = SessionManager::new(identity, profiles, connectivity, config.settings.clone());

    Ok(Session {
        manager,
        manual_connectivity,
    })
}

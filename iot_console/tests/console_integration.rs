//! Integration tests for iot_console backend wiring.
//!
//! Tests unreachable identity backends and probe-driven connectivity.

use iot_console::{backend, commands::parse_command, console::Console};
use iot_session::{
    SessionConfig, SessionSettings,
    config::{Backend, ProbeConfig},
    providers::FirebaseConfig,
};
use std::time::Duration;
use tokio::time::timeout;

/// Firebase config pointing at a port nothing listens on
fn unreachable_firebase() -> FirebaseConfig {
    let mut firebase = FirebaseConfig::new("test-key", "demo-plant");
    firebase.auth_url = "http://127.0.0.1:19999".to_string();
    firebase.firestore_url = "http://127.0.0.1:19999".to_string();
    firebase.request_timeout = Duration::from_secs(2);
    firebase
}

#[tokio::test]
async fn test_unreachable_identity_backend() {
    let config = SessionConfig {
        backend: Backend::Firebase(unreachable_firebase()),
        settings: SessionSettings::default(),
        probe: None,
    };
    let session = backend::build(&config).unwrap();
    let console = Console::new(session.manager.clone(), session.manual_connectivity);

    let out = timeout(
        Duration::from_secs(5),
        console.execute(parse_command("login ops@plant.example hunter22").unwrap()),
    )
    .await
    .expect("login should not hang")
    .unwrap();

    assert!(out.contains("Error: Network error. Please check your connection"));
    let state = session.manager.snapshot();
    assert!(state.current_user.is_none());
    assert!(!state.loading);
}

#[tokio::test]
async fn test_browser_flows_report_generic_failure() {
    let config = SessionConfig {
        backend: Backend::Firebase(unreachable_firebase()),
        settings: SessionSettings::default(),
        probe: None,
    };
    let session = backend::build(&config).unwrap();

    assert!(session.manager.google_login().await.is_err());
    assert_eq!(
        session.manager.snapshot().error_message.as_deref(),
        Some("Authentication failed. Please try again")
    );
}

#[tokio::test]
async fn test_probe_reports_offline() {
    // Reserve a port, then close it so probes are refused
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let config = SessionConfig {
        backend: Backend::Memory,
        settings: SessionSettings::default(),
        probe: Some(ProbeConfig {
            addr,
            interval: Duration::from_millis(50),
            timeout: Duration::from_millis(50),
        }),
    };
    let session = backend::build(&config).unwrap();
    assert!(session.manual_connectivity.is_none());

    let _tasks = session.manager.start();
    let state = timeout(
        Duration::from_secs(2),
        session.manager.store().wait_for(|s| !s.online),
    )
    .await
    .expect("probe should report offline");
    assert!(!state.online);

    let console = Console::new(session.manager.clone(), None);
    let out = console
        .execute(parse_command("online").unwrap())
        .await
        .unwrap();
    assert!(out.contains("cannot be set by hand"));
}

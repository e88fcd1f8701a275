//! Interactive session console.

use crate::commands::{Command, HELP_TEXT};
use crate::logging::log_session_event;
use iot_session::{SessionManager, SessionState, providers::ManualConnectivity};
use std::{sync::Arc, time::Duration};

/// Runs console commands against a session
pub struct Console {
    manager: SessionManager,
    manual_connectivity: Option<Arc<ManualConnectivity>>,
}

impl Console {
    pub fn new(
        manager: SessionManager,
        manual_connectivity: Option<Arc<ManualConnectivity>>,
    ) -> Self {
        Self {
            manager,
            manual_connectivity,
        }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Execute a command and return the text to show.
    ///
    /// Returns `None` for [`Command::Quit`].
    pub async fn execute(&self, command: Command) -> Option<String> {
        let operation = match command {
            Command::Login { email, password } => {
                self.manager.login(&email, &password).await;
                "login"
            }
            Command::Register {
                email,
                password,
                role,
                name,
            } => {
                self.manager
                    .register(&email, &password, name.as_deref(), role)
                    .await;
                "register"
            }
            Command::Google => {
                if let Err(err) = self.manager.google_login().await {
                    tracing::debug!("Popup sign-in failed with {}", err.code());
                }
                "google_login"
            }
            Command::GoogleRedirect => {
                self.manager.google_login_redirect().await;
                "google_login_redirect"
            }
            Command::Reset { email } => {
                self.manager.reset_password(&email).await;
                "reset_password"
            }
            Command::Logout => {
                self.manager.logout().await;
                "logout"
            }
            Command::Online => return Some(self.set_online(true).await),
            Command::Offline => return Some(self.set_online(false).await),
            Command::Clear => {
                self.manager.clear_error();
                self.manager.clear_success();
                return Some(render_state(&self.manager.snapshot()));
            }
            Command::Status => return Some(render_state(&self.manager.snapshot())),
            Command::Help => return Some(HELP_TEXT.to_string()),
            Command::Quit => return None,
        };

        let state = self.manager.snapshot();
        log_session_event(
            operation,
            state.current_user.as_ref().map(|u| u.id.as_str()),
            state
                .error_message
                .as_deref()
                .or(state.success_message.as_deref()),
        );
        Some(render_state(&state))
    }

    async fn set_online(&self, online: bool) -> String {
        let Some(manual) = &self.manual_connectivity else {
            return "Connectivity is probed from IOT_PROBE_ADDR and cannot be set by hand"
                .to_string();
        };

        manual.set_online(online);
        let settled = tokio::time::timeout(
            Duration::from_secs(1),
            self.manager.store().wait_for(|s| s.online == online),
        )
        .await;
        if settled.is_err() {
            tracing::warn!("Session did not observe the connectivity change");
        }
        render_state(&self.manager.snapshot())
    }
}

/// Render a session state for the terminal
pub fn render_state(state: &SessionState) -> String {
    let mut lines = vec![format!(
        "Phase: {:?} ({})",
        state.phase(),
        if state.online { "online" } else { "offline" }
    )];

    match &state.current_user {
        Some(user) => lines.push(format!(
            "User: {} <{}> [{}] id={}",
            user.display_name, user.email, user.role, user.id
        )),
        None => lines.push("User: signed out".to_string()),
    }
    if let Some(error) = &state.error_message {
        lines.push(format!("Error: {}", error));
    }
    if let Some(success) = &state.success_message {
        lines.push(format!("OK: {}", success));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::parse_command;
    use iot_session::{
        SessionSettings,
        providers::{MemoryIdentityProvider, MemoryProfileStore},
    };

    fn console() -> Console {
        let connectivity = Arc::new(ManualConnectivity::new(true));
        let manager = SessionManager::new(
            Arc::new(MemoryIdentityProvider::new()),
            Arc::new(MemoryProfileStore::new()),
            connectivity.clone(),
            SessionSettings::default(),
        );
        Console::new(manager, Some(connectivity))
    }

    async fn run(console: &Console, line: &str) -> String {
        console
            .execute(parse_command(line).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_then_logout() {
        let console = console();
        let _tasks = console.manager().start();

        let out = run(&console, "register jane@plant.example hunter22 integrator Jane").await;
        assert!(out.contains("User: Jane <jane@plant.example> [integrator]"));
        assert!(out.contains("OK: Account created successfully!"));

        let out = run(&console, "logout").await;
        assert!(out.contains("User: signed out"));
    }

    #[tokio::test]
    async fn test_offline_command_blocks_login() {
        let console = console();
        let _tasks = console.manager().start();

        let out = run(&console, "offline").await;
        assert!(out.contains("(offline)"));

        let out = run(&console, "login jane@plant.example hunter22").await;
        assert!(out.contains("Error: You are offline. Please check your connection."));
    }

    #[tokio::test]
    async fn test_quit_ends_session() {
        let console = console();
        assert!(console.execute(Command::Quit).await.is_none());
        assert!(run(&console, "help").await.contains("register EMAIL PASSWORD"));
    }
}

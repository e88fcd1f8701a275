//! Session configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use std::{net::SocketAddr, time::Duration};

use crate::auth::models::{DEFAULT_DISPLAY_NAME, OAuthProvider};
use crate::providers::FirebaseConfig;

/// Complete configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Which identity/profile backend to use
    pub backend: Backend,
    /// Behaviour of the session manager itself
    pub settings: SessionSettings,
    /// Optional TCP probe used as connectivity signal
    pub probe: Option<ProbeConfig>,
}

/// Identity and profile backend
#[derive(Debug, Clone)]
pub enum Backend {
    /// In-process accounts and documents
    Memory,
    /// Firebase Authentication and Cloud Firestore over REST
    Firebase(FirebaseConfig),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory => "memory",
            Backend::Firebase(_) => "firebase",
        }
    }
}

/// Session manager settings
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Display name for identities that carry none
    pub default_display_name: String,
    /// Provider used by the Google sign-in operations
    pub oauth_provider: OAuthProvider,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            default_display_name: DEFAULT_DISPLAY_NAME.to_string(),
            oauth_provider: OAuthProvider::google(),
        }
    }
}

/// Connectivity probe settings
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Address that must accept TCP connections while online
    pub addr: SocketAddr,
    /// Time between probes
    pub interval: Duration,
    /// Connect timeout per probe
    pub timeout: Duration,
}

impl SessionConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `backend_override` - Optional backend name override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(backend_override: Option<String>) -> Result<Self, ConfigError> {
        let backend_name = backend_override
            .or_else(|| std::env::var("IOT_AUTH_BACKEND").ok())
            .unwrap_or_else(|| "memory".to_string());

        let backend = match backend_name.to_lowercase().as_str() {
            "memory" => Backend::Memory,
            "firebase" => Backend::Firebase(firebase_from_env()?),
            other => {
                return Err(ConfigError::Invalid {
                    var: "IOT_AUTH_BACKEND".to_string(),
                    reason: format!("Unknown backend '{other}', expected 'memory' or 'firebase'"),
                });
            }
        };

        let settings = SessionSettings {
            default_display_name: std::env::var("IOT_DEFAULT_DISPLAY_NAME")
                .unwrap_or_else(|_| DEFAULT_DISPLAY_NAME.to_string()),
            oauth_provider: OAuthProvider::google(),
        };

        let probe = match std::env::var("IOT_PROBE_ADDR") {
            Ok(raw) => {
                let addr = raw.parse().map_err(|_| ConfigError::Invalid {
                    var: "IOT_PROBE_ADDR".to_string(),
                    reason: format!("'{raw}' is not a socket address (e.g. 8.8.8.8:53)"),
                })?;
                Some(ProbeConfig {
                    addr,
                    interval: Duration::from_secs(parse_env_or("IOT_PROBE_INTERVAL_SECS", 5)),
                    timeout: Duration::from_secs(parse_env_or("IOT_PROBE_TIMEOUT_SECS", 2)),
                })
            }
            Err(_) => None,
        };

        Ok(SessionConfig {
            backend,
            settings,
            probe,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settings.default_display_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "IOT_DEFAULT_DISPLAY_NAME".to_string(),
                reason: "Must not be blank".to_string(),
            });
        }

        if let Backend::Firebase(firebase) = &self.backend {
            if firebase.api_key.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    var: "FIREBASE_API_KEY".to_string(),
                    reason: "Must not be blank".to_string(),
                });
            }
            if firebase.project_id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    var: "FIREBASE_PROJECT_ID".to_string(),
                    reason: "Must not be blank".to_string(),
                });
            }
        }

        if let Some(probe) = &self.probe {
            if probe.interval.is_zero() {
                return Err(ConfigError::Invalid {
                    var: "IOT_PROBE_INTERVAL_SECS".to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
            if probe.timeout > probe.interval {
                return Err(ConfigError::Invalid {
                    var: "IOT_PROBE_TIMEOUT_SECS".to_string(),
                    reason: format!(
                        "Must not exceed the probe interval ({}s)",
                        probe.interval.as_secs()
                    ),
                });
            }
        }

        Ok(())
    }
}

fn firebase_from_env() -> Result<FirebaseConfig, ConfigError> {
    let api_key = std::env::var("FIREBASE_API_KEY").map_err(|_| ConfigError::MissingRequired {
        var: "FIREBASE_API_KEY".to_string(),
        hint: "Copy the Web API key from the Firebase console project settings".to_string(),
    })?;
    let project_id =
        std::env::var("FIREBASE_PROJECT_ID").map_err(|_| ConfigError::MissingRequired {
            var: "FIREBASE_PROJECT_ID".to_string(),
            hint: "Use the project id shown in the Firebase console".to_string(),
        })?;

    let mut config = FirebaseConfig::new(api_key, project_id);
    config.auth_domain = std::env::var("FIREBASE_AUTH_DOMAIN").ok();
    if let Ok(url) = std::env::var("FIREBASE_AUTH_URL") {
        config.auth_url = url;
    }
    if let Ok(url) = std::env::var("FIREBASE_TOKEN_URL") {
        config.token_url = url;
    }
    if let Ok(url) = std::env::var("FIRESTORE_URL") {
        config.firestore_url = url;
    }
    config.request_timeout = Duration::from_secs(parse_env_or("FIREBASE_TIMEOUT_SECS", 10));
    Ok(config)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Firebase Authentication and Cloud Firestore over their REST APIs.

use std::time::Duration;

pub mod auth;
pub mod firestore;

pub use auth::FirebaseAuth;
pub use firestore::Firestore;

const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com";
const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// Firebase project settings
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Web API key of the project
    pub api_key: String,
    pub project_id: String,
    /// Hosting domain used for OAuth handlers, informational outside a browser
    pub auth_domain: Option<String>,
    /// Identity Toolkit base URL, overridable for the emulator
    pub auth_url: String,
    /// Secure Token base URL used to refresh ID tokens
    pub token_url: String,
    /// Firestore base URL, overridable for the emulator
    pub firestore_url: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            auth_domain: None,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            firestore_url: DEFAULT_FIRESTORE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

fn http_client(config: &FirebaseConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
}

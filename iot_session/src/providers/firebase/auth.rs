//! Identity Toolkit REST client.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::RwLock;
use tokio::sync::watch;

use super::{FirebaseConfig, http_client};
use crate::auth::{
    IdentityError, IdentityResult,
    models::{Identity, OAuthProvider},
};
use crate::providers::IdentityProvider;

const UNSUPPORTED_FLOW: &str = "auth/operation-not-supported-in-this-environment";

/// ID tokens are refreshed this long before they expire
const REFRESH_MARGIN_SECS: i64 = 60;
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Tokens of the signed-in account
#[derive(Debug, Clone)]
struct Credentials {
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Credentials {
    fn issued(id_token: String, refresh_token: String, expires_in: Option<&str>) -> Self {
        let lifetime = expires_in
            .and_then(|secs| secs.parse::<i64>().ok())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        Self {
            id_token,
            refresh_token,
            expires_at: Utc::now() + TimeDelta::seconds(lifetime),
        }
    }

    fn needs_refresh(&self) -> bool {
        self.expires_at - TimeDelta::seconds(REFRESH_MARGIN_SECS) <= Utc::now()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

/// Secure Token API answers in snake_case
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    phone_number: Option<String>,
    /// Milliseconds since the epoch, as a string
    created_at: Option<String>,
    last_login_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Firebase Authentication client for email/password accounts.
///
/// Popup and redirect flows need a browser and fail with
/// `auth/operation-not-supported-in-this-environment`.
///
/// The ID token is refreshed through the Secure Token API when it is about
/// to expire. If the refresh token is rejected the session has ended and
/// subscribers are told the identity is gone.
pub struct FirebaseAuth {
    config: FirebaseConfig,
    client: reqwest::Client,
    credentials: RwLock<Option<Credentials>>,
    current: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseConfig) -> reqwest::Result<Self> {
        let client = http_client(&config)?;
        let (current, _) = watch::channel(None);
        Ok(Self {
            config,
            client,
            credentials: RwLock::new(None),
            current,
        })
    }

    /// Valid ID token of the signed-in account, used as bearer token by Firestore
    pub async fn id_token(&self) -> Option<String> {
        let current = self.credentials.read().ok().and_then(|creds| creds.clone())?;
        if !current.needs_refresh() {
            return Some(current.id_token);
        }

        match self.refresh(&current.refresh_token).await {
            Ok(refreshed) => {
                log::debug!("Refreshed Firebase ID token");
                let credentials = Credentials::issued(
                    refreshed.id_token,
                    refreshed.refresh_token,
                    refreshed.expires_in.as_deref(),
                );
                let id_token = credentials.id_token.clone();
                self.store_credentials(Some(credentials));
                Some(id_token)
            }
            Err(IdentityError::NetworkRequestFailed) => {
                log::warn!("Token refresh unreachable, keeping current ID token");
                Some(current.id_token)
            }
            Err(err) => {
                log::warn!("Refresh token rejected ({}), ending session", err.code());
                self.end_session(&current.refresh_token);
                None
            }
        }
    }

    async fn refresh(&self, refresh_token: &str) -> IdentityResult<RefreshResponse> {
        let url = format!(
            "{}/v1/token?key={}",
            self.config.token_url.trim_end_matches('/'),
            self.config.api_key
        );
        let response = self
            .client
            .post(url)
            .form(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await
            .map_err(|e| {
                log::warn!("Secure Token request failed: {}", e);
                IdentityError::NetworkRequestFailed
            })?;
        decode_response(response).await
    }

    fn store_credentials(&self, credentials: Option<Credentials>) {
        if let Ok(mut creds) = self.credentials.write() {
            *creds = credentials;
        }
    }

    /// Drop the credentials issued with `refresh_token` and announce the
    /// sign-out, unless a newer sign-in replaced them meanwhile
    fn end_session(&self, refresh_token: &str) {
        let ended = match self.credentials.write() {
            Ok(mut creds) => {
                let same = creds
                    .as_ref()
                    .is_some_and(|c| c.refresh_token == refresh_token);
                if same {
                    *creds = None;
                }
                same
            }
            Err(_) => false,
        };
        if ended {
            self.current.send_replace(None);
        }
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/accounts:{}?key={}",
            self.config.auth_url.trim_end_matches('/'),
            method,
            self.config.api_key
        )
    }

    async fn call<B, R>(&self, method: &str, body: &B) -> IdentityResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(method))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                log::warn!("Identity Toolkit {} request failed: {}", method, e);
                IdentityError::NetworkRequestFailed
            })?;
        decode_response(response).await
    }

    /// Finish a password sign-in or sign-up: fetch the full account and
    /// announce the new identity.
    async fn establish(&self, tokens: TokenResponse) -> Identity {
        let lookup = self
            .call::<_, LookupResponse>(
                "lookup",
                &LookupRequest {
                    id_token: &tokens.id_token,
                },
            )
            .await;

        let identity = match lookup.map(|r| r.users.into_iter().next()) {
            Ok(Some(account)) => identity_from_account(account),
            Ok(None) | Err(_) => {
                log::debug!("Account lookup unavailable, using token response fields");
                Identity {
                    uid: tokens.local_id.clone(),
                    display_name: tokens.display_name.clone(),
                    email: tokens.email.clone(),
                    last_sign_in_at: Some(Utc::now()),
                    ..Default::default()
                }
            }
        };

        self.store_credentials(Some(Credentials::issued(
            tokens.id_token,
            tokens.refresh_token,
            tokens.expires_in.as_deref(),
        )));
        self.current.send_replace(Some(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        let tokens: TokenResponse = self
            .call(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.establish(tokens).await)
    }

    async fn create_user(&self, email: &str, password: &str) -> IdentityResult<Identity> {
        let tokens: TokenResponse = self
            .call(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(self.establish(tokens).await)
    }

    async fn sign_in_with_popup(&self, provider: &OAuthProvider) -> IdentityResult<Identity> {
        Err(IdentityError::from_code(
            UNSUPPORTED_FLOW,
            format!("popup sign-in with {} needs a browser", provider.provider_id),
        ))
    }

    async fn sign_in_with_redirect(&self, provider: &OAuthProvider) -> IdentityResult<()> {
        Err(IdentityError::from_code(
            UNSUPPORTED_FLOW,
            format!("redirect sign-in with {} needs a browser", provider.provider_id),
        ))
    }

    async fn consume_redirect_result(&self) -> IdentityResult<Option<Identity>> {
        Ok(None)
    }

    async fn send_password_reset(&self, email: &str) -> IdentityResult<()> {
        let _: serde_json::Value = self
            .call(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    email,
                },
            )
            .await?;
        Ok(())
    }

    async fn sign_out(&self) -> IdentityResult<()> {
        self.store_credentials(None);
        self.current.send_replace(None);
        Ok(())
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

async fn decode_response<R: DeserializeOwned>(response: reqwest::Response) -> IdentityResult<R> {
    let status = response.status();
    if !status.is_success() {
        let envelope = response.json::<ErrorEnvelope>().await;
        return Err(match envelope {
            Ok(envelope) => map_rest_error(&envelope.error.message),
            Err(_) => IdentityError::from_code("auth/internal-error", format!("HTTP {status}")),
        });
    }

    response
        .json::<R>()
        .await
        .map_err(|e| IdentityError::from_code("auth/internal-error", e.to_string()))
}

fn identity_from_account(account: AccountInfo) -> Identity {
    Identity {
        uid: account.local_id,
        display_name: account.display_name,
        email: account.email,
        photo_url: account.photo_url,
        phone_number: account.phone_number,
        created_at: account.created_at.as_deref().and_then(parse_millis),
        last_sign_in_at: account.last_login_at.as_deref().and_then(parse_millis),
    }
}

fn parse_millis(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// Translate an Identity Toolkit error message into an `auth/*` error.
///
/// Messages look like `EMAIL_NOT_FOUND` or `WEAK_PASSWORD : Password should be at least 6 characters`.
pub fn map_rest_error(message: &str) -> IdentityError {
    let code = message.split(" : ").next().unwrap_or(message).trim();
    match code {
        "EMAIL_NOT_FOUND" => IdentityError::UserNotFound,
        "INVALID_PASSWORD" => IdentityError::WrongPassword,
        "EMAIL_EXISTS" => IdentityError::EmailAlreadyInUse,
        "WEAK_PASSWORD" => IdentityError::WeakPassword,
        "INVALID_EMAIL" | "MISSING_EMAIL" => IdentityError::InvalidEmail,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => IdentityError::TooManyRequests,
        other => IdentityError::from_code(
            &format!("auth/{}", other.to_lowercase().replace('_', "-")),
            message,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_map_known_rest_errors() {
        assert_eq!(map_rest_error("EMAIL_NOT_FOUND"), IdentityError::UserNotFound);
        assert_eq!(map_rest_error("INVALID_PASSWORD"), IdentityError::WrongPassword);
        assert_eq!(
            map_rest_error("WEAK_PASSWORD : Password should be at least 6 characters"),
            IdentityError::WeakPassword
        );
        assert_eq!(
            map_rest_error("TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account has been temporarily disabled"),
            IdentityError::TooManyRequests
        );
    }

    #[test]
    fn test_map_unknown_rest_error_keeps_code() {
        let err = map_rest_error("INVALID_LOGIN_CREDENTIALS");
        assert_eq!(err.code(), "auth/invalid-login-credentials");
        assert_eq!(err.user_message(), "Authentication failed. Please try again");
    }

    #[test]
    fn test_account_info_decoding() {
        let body = r#"{
            "users": [{
                "localId": "abc123",
                "email": "eng@plant.example",
                "displayName": "Plant Engineer",
                "photoUrl": "https://img.example/e.png",
                "createdAt": "1700000000000",
                "lastLoginAt": "1700000360000"
            }]
        }"#;
        let lookup: LookupResponse = serde_json::from_str(body).unwrap();
        let identity = identity_from_account(lookup.users.into_iter().next().unwrap());

        assert_eq!(identity.uid, "abc123");
        assert_eq!(identity.display_name.as_deref(), Some("Plant Engineer"));
        assert_eq!(identity.created_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(identity.last_sign_in_at.unwrap().timestamp(), 1_700_000_360);
        assert!(identity.phone_number.is_none());
    }

    #[test]
    fn test_endpoint_uses_configured_base() {
        let mut config = FirebaseConfig::new("k3y", "demo");
        config.auth_url = "http://127.0.0.1:9099/identitytoolkit.googleapis.com/".to_string();
        let auth = FirebaseAuth::new(config).unwrap();
        assert_eq!(
            auth.endpoint("signUp"),
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/v1/accounts:signUp?key=k3y"
        );
    }

    #[tokio::test]
    async fn test_browser_flows_unsupported() {
        let auth = FirebaseAuth::new(FirebaseConfig::new("k", "p")).unwrap();
        let err = auth
            .sign_in_with_popup(&OAuthProvider::google())
            .await
            .unwrap_err();
        assert_eq!(err.code(), UNSUPPORTED_FLOW);
        assert!(auth.consume_redirect_result().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_out_clears_identity() {
        let auth = FirebaseAuth::new(FirebaseConfig::new("k", "p")).unwrap();
        let rx = auth.subscribe();
        auth.sign_out().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(auth.id_token().await.is_none());
    }

    /// Answer the next request on a local port with a canned response
    async fn respond_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !String::from_utf8_lossy(&request).contains("grant_type") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn signed_in_with_expired_token(token_url: String) -> FirebaseAuth {
        let mut config = FirebaseConfig::new("k", "p");
        config.token_url = token_url;
        let auth = FirebaseAuth::new(config).unwrap();
        auth.store_credentials(Some(Credentials {
            id_token: "stale".to_string(),
            refresh_token: "r1".to_string(),
            expires_at: Utc::now() - TimeDelta::seconds(5),
        }));
        auth.current.send_replace(Some(Identity::new("u1")));
        auth
    }

    #[tokio::test]
    async fn test_valid_token_used_without_refresh() {
        let auth = FirebaseAuth::new(FirebaseConfig::new("k", "p")).unwrap();
        auth.store_credentials(Some(Credentials::issued(
            "fresh".to_string(),
            "r1".to_string(),
            Some("3600"),
        )));
        assert_eq!(auth.id_token().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed() {
        let url = respond_once(
            "200 OK",
            r#"{"id_token":"renewed","refresh_token":"r2","expires_in":"3600","token_type":"Bearer"}"#,
        )
        .await;
        let auth = signed_in_with_expired_token(url);

        assert_eq!(auth.id_token().await.as_deref(), Some("renewed"));
        // Served from the new credentials, no second request
        assert_eq!(auth.id_token().await.as_deref(), Some("renewed"));
        assert!(auth.subscribe().borrow().is_some());
    }

    #[tokio::test]
    async fn test_rejected_refresh_ends_session() {
        let url = respond_once(
            "400 Bad Request",
            r#"{"error":{"code":400,"message":"TOKEN_EXPIRED","status":"INVALID_ARGUMENT"}}"#,
        )
        .await;
        let auth = signed_in_with_expired_token(url);
        let rx = auth.subscribe();

        assert!(auth.id_token().await.is_none());
        assert!(rx.borrow().is_none());
        assert!(auth.id_token().await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_refresh_keeps_session() {
        let auth = signed_in_with_expired_token("http://127.0.0.1:1".to_string());

        assert_eq!(auth.id_token().await.as_deref(), Some("stale"));
        assert!(auth.subscribe().borrow().is_some());
    }
}

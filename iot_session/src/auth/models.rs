//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// Display name used when neither the identity nor the store carries one
pub const DEFAULT_DISPLAY_NAME: &str = "New User";

/// Collection holding one profile document per identity
pub const USERS_COLLECTION: &str = "users";

/// Application role attached to a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Integrator,
    #[default]
    IndustrialClient,
    /// Only ever read from a store document; the session manager never assigns it.
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Integrator => "integrator",
            Role::IndustrialClient => "industrial_client",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "integrator" => Ok(Role::Integrator),
            "industrial_client" => Ok(Role::IndustrialClient),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Identity as reported by the identity provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Profile the dashboard renders for the signed-in user.
///
/// Always derived from an [`Identity`] plus an optional store document and
/// replaced wholesale when fresher data arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub phone_number: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login_at: DateTime<Utc>,
}

/// Profile store record for one identity
///
/// Absent fields are left untouched by merge writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    /// Merge `other` over `self`, keeping fields `other` leaves empty.
    pub fn merge(&mut self, other: ProfileDocument) {
        macro_rules! take {
            ($($field:ident),*) => {
                $(if other.$field.is_some() {
                    self.$field = other.$field;
                })*
            };
        }
        take!(name, email, role, phone_number, avatar, created_at, last_login);
    }
}

impl From<&UserProfile> for ProfileDocument {
    fn from(profile: &UserProfile) -> Self {
        Self {
            name: Some(profile.display_name.clone()),
            email: Some(profile.email.clone()),
            role: Some(profile.role),
            phone_number: profile.phone_number.clone(),
            avatar: profile.avatar_url.clone(),
            created_at: Some(profile.created_at),
            last_login: Some(profile.last_login_at),
        }
    }
}

/// How a document write treats fields already stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Replace the whole document
    Replace,
    /// Overwrite only the fields present in the write
    Merge,
}

/// Federated sign-in provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthProvider {
    pub provider_id: String,
    pub custom_parameters: BTreeMap<String, String>,
    pub scopes: Vec<String>,
}

impl OAuthProvider {
    /// Google account chooser with offline access and profile scopes
    pub fn google() -> Self {
        let custom_parameters = [
            ("prompt", "select_account"),
            ("include_granted_scopes", "true"),
            ("access_type", "offline"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            provider_id: "google.com".to_string(),
            custom_parameters,
            scopes: vec!["email".to_string(), "profile".to_string()],
        }
    }
}

/// Details captured at registration that the identity itself cannot carry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileSeed {
    pub name: Option<String>,
    pub role: Option<Role>,
}

/// User-initiated session operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Login,
    Register,
    GoogleLogin,
    GoogleLoginRedirect,
    ResetPassword,
    Logout,
}

impl Operation {
    /// Whether the operation tries to establish a new identity
    pub fn signs_in(&self) -> bool {
        matches!(
            self,
            Operation::Login
                | Operation::Register
                | Operation::GoogleLogin
                | Operation::GoogleLoginRedirect
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Login => "login",
            Operation::Register => "register",
            Operation::GoogleLogin => "google_login",
            Operation::GoogleLoginRedirect => "google_login_redirect",
            Operation::ResetPassword => "reset_password",
            Operation::Logout => "logout",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

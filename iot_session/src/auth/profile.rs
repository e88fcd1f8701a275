//! Deriving a [`UserProfile`] from an identity and its stored document.

use chrono::{DateTime, Utc};

use super::models::{DEFAULT_DISPLAY_NAME, Identity, ProfileDocument, ProfileSeed, Role, UserProfile};

/// Build the profile published before the store has answered.
///
/// Only identity fields and registration hints are used.
pub fn minimal_profile(
    identity: &Identity,
    seed: Option<&ProfileSeed>,
    default_name: &str,
    now: DateTime<Utc>,
) -> UserProfile {
    let display_name = seed
        .and_then(|s| s.name.clone())
        .or_else(|| identity.display_name.clone())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| default_name.to_string());

    UserProfile {
        id: identity.uid.clone(),
        display_name,
        email: identity.email.clone().unwrap_or_default(),
        avatar_url: identity.photo_url.clone(),
        phone_number: identity.phone_number.clone(),
        role: seed.and_then(|s| s.role).unwrap_or_default(),
        created_at: identity.created_at.unwrap_or(now),
        last_login_at: identity.last_sign_in_at.unwrap_or(now),
    }
}

/// Overlay a stored document on the minimal profile.
///
/// Stored role, name, phone number, avatar and creation time win when
/// present; email and last login always come from the fresh identity.
pub fn merge_profile(minimal: &UserProfile, document: &ProfileDocument) -> UserProfile {
    UserProfile {
        id: minimal.id.clone(),
        display_name: document
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| minimal.display_name.clone()),
        email: minimal.email.clone(),
        avatar_url: document.avatar.clone().or_else(|| minimal.avatar_url.clone()),
        phone_number: document
            .phone_number
            .clone()
            .or_else(|| minimal.phone_number.clone()),
        role: document.role.unwrap_or(minimal.role),
        created_at: document.created_at.unwrap_or(minimal.created_at),
        last_login_at: minimal.last_login_at,
    }
}

/// Document written for an identity that has none yet
pub fn seed_document(profile: &UserProfile) -> ProfileDocument {
    ProfileDocument::from(profile)
}

/// Document written at registration
pub fn registration_document(
    name: Option<&str>,
    role: Role,
    default_name: &str,
    now: DateTime<Utc>,
) -> ProfileDocument {
    ProfileDocument {
        name: Some(name.unwrap_or(default_name).to_string()),
        role: Some(role),
        created_at: Some(now),
        last_login: Some(now),
        ..Default::default()
    }
}

/// Merge write recording a fresh login
pub fn last_login_update(profile: &UserProfile) -> ProfileDocument {
    ProfileDocument {
        last_login: Some(profile.last_login_at),
        ..Default::default()
    }
}

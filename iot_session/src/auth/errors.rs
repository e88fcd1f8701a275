//! Authentication error types and the user-facing normalization table.

use thiserror::Error;

/// Message shown for any provider code without a dedicated sentence.
pub const GENERIC_AUTH_FAILURE: &str = "Authentication failed. Please try again";

/// Message shown when an operation is attempted without connectivity.
pub const OFFLINE_NOTICE: &str = "You are offline. Please check your connection.";

/// Message shown when the provider refuses to sign the user out.
pub const SIGN_OUT_FAILURE: &str = "Failed to sign out";

/// Errors raised by an identity provider, keyed by machine code.
///
/// Every provider adapter converts its native failures into this type, so
/// the rest of the crate never sees raw provider error shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("auth/user-not-found")]
    UserNotFound,

    #[error("auth/wrong-password")]
    WrongPassword,

    #[error("auth/email-already-in-use")]
    EmailAlreadyInUse,

    #[error("auth/weak-password")]
    WeakPassword,

    #[error("auth/invalid-email")]
    InvalidEmail,

    #[error("auth/too-many-requests")]
    TooManyRequests,

    #[error("auth/network-request-failed")]
    NetworkRequestFailed,

    #[error("auth/popup-closed-by-user")]
    PopupClosedByUser,

    #[error("auth/cancelled-popup-request")]
    CancelledPopupRequest,

    #[error("auth/popup-blocked")]
    PopupBlocked,

    #[error("auth/account-exists-with-different-credential")]
    AccountExistsWithDifferentCredential,

    #[error("auth/unauthorized-domain")]
    UnauthorizedDomain,

    /// Any code the normalization table does not know about.
    #[error("{code}: {message}")]
    Unrecognized { code: String, message: String },
}

impl IdentityError {
    /// Build an error from a provider machine code such as `auth/wrong-password`.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        match code {
            "auth/user-not-found" => Self::UserNotFound,
            "auth/wrong-password" => Self::WrongPassword,
            "auth/email-already-in-use" => Self::EmailAlreadyInUse,
            "auth/weak-password" => Self::WeakPassword,
            "auth/invalid-email" => Self::InvalidEmail,
            "auth/too-many-requests" => Self::TooManyRequests,
            "auth/network-request-failed" => Self::NetworkRequestFailed,
            "auth/popup-closed-by-user" => Self::PopupClosedByUser,
            "auth/cancelled-popup-request" => Self::CancelledPopupRequest,
            "auth/popup-blocked" => Self::PopupBlocked,
            "auth/account-exists-with-different-credential" => {
                Self::AccountExistsWithDifferentCredential
            }
            "auth/unauthorized-domain" => Self::UnauthorizedDomain,
            other => Self::Unrecognized {
                code: other.to_string(),
                message: message.into(),
            },
        }
    }

    /// Machine code of this error.
    pub fn code(&self) -> &str {
        match self {
            Self::UserNotFound => "auth/user-not-found",
            Self::WrongPassword => "auth/wrong-password",
            Self::EmailAlreadyInUse => "auth/email-already-in-use",
            Self::WeakPassword => "auth/weak-password",
            Self::InvalidEmail => "auth/invalid-email",
            Self::TooManyRequests => "auth/too-many-requests",
            Self::NetworkRequestFailed => "auth/network-request-failed",
            Self::PopupClosedByUser => "auth/popup-closed-by-user",
            Self::CancelledPopupRequest => "auth/cancelled-popup-request",
            Self::PopupBlocked => "auth/popup-blocked",
            Self::AccountExistsWithDifferentCredential => {
                "auth/account-exists-with-different-credential"
            }
            Self::UnauthorizedDomain => "auth/unauthorized-domain",
            Self::Unrecognized { code, .. } => code,
        }
    }

    /// Get the fixed sentence shown to the user for this error.
    ///
    /// The mapping is total and never echoes provider text.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "No account found with this email address",
            Self::WrongPassword => "Incorrect password",
            Self::EmailAlreadyInUse => "An account with this email already exists",
            Self::WeakPassword => "Password should be at least 6 characters",
            Self::InvalidEmail => "Invalid email address",
            Self::TooManyRequests => "Too many failed attempts. Please try again later",
            Self::NetworkRequestFailed => "Network error. Please check your connection",
            Self::PopupClosedByUser | Self::CancelledPopupRequest => "Login cancelled",
            Self::PopupBlocked => "Popup blocked by browser. Please allow popups or try again",
            Self::AccountExistsWithDifferentCredential => {
                "An account already exists with the same email but different sign-in credentials"
            }
            Self::UnauthorizedDomain => {
                "This domain is not authorized for Google sign-in. Please contact support."
            }
            Self::Unrecognized { .. } => GENERIC_AUTH_FAILURE,
        }
    }
}

/// Result type for identity provider calls
pub type IdentityResult<T> = Result<T, IdentityError>;

/// Errors raised by the profile document store
#[derive(Debug, Error)]
pub enum ProfileStoreError {
    /// Network access was disabled because the client is offline
    #[error("profile store network is disabled")]
    NetworkDisabled,

    /// The store rejected the request for the current credentials
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Request could not be delivered or the store answered with a failure status
    #[error("transport error: {0}")]
    Transport(String),

    /// Stored document could not be decoded
    #[error("malformed document: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProfileStoreError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Result type for profile store calls
pub type ProfileStoreResult<T> = Result<T, ProfileStoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KNOWN_CODES: [&str; 12] = [
        "auth/user-not-found",
        "auth/wrong-password",
        "auth/email-already-in-use",
        "auth/weak-password",
        "auth/invalid-email",
        "auth/too-many-requests",
        "auth/network-request-failed",
        "auth/popup-closed-by-user",
        "auth/cancelled-popup-request",
        "auth/popup-blocked",
        "auth/account-exists-with-different-credential",
        "auth/unauthorized-domain",
    ];

    #[test]
    fn test_wrong_password_message() {
        let err = IdentityError::from_code("auth/wrong-password", "ignored");
        assert_eq!(err, IdentityError::WrongPassword);
        assert_eq!(err.user_message(), "Incorrect password");
    }

    #[test]
    fn test_known_codes_keep_their_code() {
        for code in KNOWN_CODES {
            let err = IdentityError::from_code(code, "");
            assert_eq!(err.code(), code);
            assert!(!matches!(err, IdentityError::Unrecognized { .. }));
            assert_ne!(err.user_message(), GENERIC_AUTH_FAILURE);
        }
    }

    #[test]
    fn test_popup_cancellations_share_message() {
        assert_eq!(
            IdentityError::PopupClosedByUser.user_message(),
            IdentityError::CancelledPopupRequest.user_message()
        );
    }

    #[test]
    fn test_unrecognized_code_falls_back_to_generic() {
        let err = IdentityError::from_code("auth/internal-error", "INTERNAL stack trace");
        assert_eq!(err.code(), "auth/internal-error");
        assert_eq!(err.user_message(), GENERIC_AUTH_FAILURE);
    }

    proptest! {
        #[test]
        fn user_message_never_leaks_provider_text(code in "[a-z/\\-]{1,40}", message in ".{0,60}") {
            let err = IdentityError::from_code(&code, message.clone());
            let shown = err.user_message();
            prop_assert!(!shown.is_empty());
            if !KNOWN_CODES.contains(&code.as_str()) {
                prop_assert_eq!(shown, GENERIC_AUTH_FAILURE);
            }
            if message.len() > 12 {
                prop_assert!(!shown.contains(message.as_str()));
            }
        }
    }
}

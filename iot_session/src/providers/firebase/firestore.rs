//! Cloud Firestore REST client for profile documents.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde_json::{Map, Value, json};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use super::{FirebaseAuth, FirebaseConfig, http_client};
use crate::auth::{
    ProfileStoreError, ProfileStoreResult,
    models::{ProfileDocument, Role, SetMode},
};
use crate::providers::ProfileStore;

/// Firestore client authenticated with the current Firebase ID token
pub struct Firestore {
    config: FirebaseConfig,
    client: reqwest::Client,
    auth: Arc<FirebaseAuth>,
    network_enabled: AtomicBool,
}

impl Firestore {
    pub fn new(config: FirebaseConfig, auth: Arc<FirebaseAuth>) -> reqwest::Result<Self> {
        let client = http_client(&config)?;
        Ok(Self {
            config,
            client,
            auth,
            network_enabled: AtomicBool::new(true),
        })
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/(default)/documents/{}/{}",
            self.config.firestore_url.trim_end_matches('/'),
            self.config.project_id,
            collection,
            key
        )
    }

    fn ensure_network(&self) -> ProfileStoreResult<()> {
        if self.network_enabled.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ProfileStoreError::NetworkDisabled)
        }
    }

    async fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth.id_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ProfileStore for Firestore {
    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> ProfileStoreResult<Option<ProfileDocument>> {
        self.ensure_network()?;

        let response = self
            .authorize(self.client.get(self.document_url(collection, key)))
            .await
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => return Err(status_error(status, response).await),
            _ => {}
        }

        let body: Value = response.json().await?;
        let fields = body
            .get("fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        decode_document(&fields).map(Some)
    }

    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        fields: ProfileDocument,
        mode: SetMode,
    ) -> ProfileStoreResult<()> {
        self.ensure_network()?;

        let encoded = encode_document(&fields);
        let mut request = self
            .authorize(self.client.patch(self.document_url(collection, key)))
            .await
            .json(&json!({ "fields": encoded }));

        if mode == SetMode::Merge {
            let mask: Vec<(&str, &str)> = encoded
                .keys()
                .map(|path| ("updateMask.fieldPaths", path.as_str()))
                .collect();
            request = request.query(&mask);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), response).await);
        }
        Ok(())
    }

    async fn set_network_enabled(&self, enabled: bool) -> ProfileStoreResult<()> {
        self.network_enabled.store(enabled, Ordering::SeqCst);
        log::debug!(
            "Firestore network {}",
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}

async fn status_error(status: StatusCode, response: reqwest::Response) -> ProfileStoreError {
    let detail = response
        .text()
        .await
        .unwrap_or_else(|e| format!("Failed to read error response: {}", e));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProfileStoreError::PermissionDenied(format!("{status}: {detail}"))
        }
        _ => ProfileStoreError::Transport(format!("{status}: {detail}")),
    }
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn timestamp_value(value: &DateTime<Utc>) -> Value {
    json!({ "timestampValue": value.to_rfc3339_opts(SecondsFormat::Micros, true) })
}

/// Encode the present fields of a document as Firestore typed values
pub fn encode_document(document: &ProfileDocument) -> Map<String, Value> {
    let mut fields = Map::new();
    if let Some(name) = &document.name {
        fields.insert("name".to_string(), string_value(name));
    }
    if let Some(email) = &document.email {
        fields.insert("email".to_string(), string_value(email));
    }
    if let Some(role) = &document.role {
        fields.insert("role".to_string(), string_value(role.as_str()));
    }
    if let Some(phone) = &document.phone_number {
        fields.insert("phoneNumber".to_string(), string_value(phone));
    }
    if let Some(avatar) = &document.avatar {
        fields.insert("avatar".to_string(), string_value(avatar));
    }
    if let Some(created_at) = &document.created_at {
        fields.insert("createdAt".to_string(), timestamp_value(created_at));
    }
    if let Some(last_login) = &document.last_login {
        fields.insert("lastLogin".to_string(), timestamp_value(last_login));
    }
    fields
}

/// Decode Firestore typed values into a document.
///
/// Unknown fields are ignored and an unknown role is treated as absent.
pub fn decode_document(fields: &Map<String, Value>) -> ProfileStoreResult<ProfileDocument> {
    let role = match read_string(fields, "role") {
        Some(raw) => match raw.parse::<Role>() {
            Ok(role) => Some(role),
            Err(reason) => {
                log::warn!("Ignoring stored role: {}", reason);
                None
            }
        },
        None => None,
    };

    Ok(ProfileDocument {
        name: read_string(fields, "name"),
        email: read_string(fields, "email"),
        role,
        phone_number: read_string(fields, "phoneNumber"),
        avatar: read_string(fields, "avatar"),
        created_at: read_timestamp(fields, "createdAt")?,
        last_login: read_timestamp(fields, "lastLogin")?,
    })
}

fn read_string(fields: &Map<String, Value>, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(|v| v.get("stringValue"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn read_timestamp(
    fields: &Map<String, Value>,
    name: &str,
) -> ProfileStoreResult<Option<DateTime<Utc>>> {
    let Some(raw) = fields
        .get(name)
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
    else {
        return Ok(None);
    };

    DateTime::parse_from_rfc3339(raw)
        .map(|ts| Some(ts.with_timezone(&Utc)))
        .map_err(|e| ProfileStoreError::Malformed(format!("{name}: {e}")))
}

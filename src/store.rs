//! Conversation history persistence.
//!
//! [`HistoryStore`] is the port the orchestrator talks to; [`FirestoreStore`]
//! is the production adapter backed by the Cloud Firestore REST API. Each
//! message is one document in the `messages` collection.

use crate::config::FirebaseSettings;
use crate::error::HistoryError;
use crate::message::{ChatMessage, ChatRole};
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::RwLock;
use tokio::time::Duration;

const COLLECTION: &str = "messages";
const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

/// Port for durable conversation history.
///
/// Uses native async fn in traits (no async_trait macro).
pub trait HistoryStore: Send + Sync + 'static {
    /// Durably append one message.
    fn save(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send;

    /// All messages of a user, newest first.
    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, HistoryError>> + Send;

    /// Remove a single message.
    fn delete(
        &self,
        message_id: &str,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send;
}

/// Firestore REST adapter.
///
/// Requests are authorized with the signed-in user's ID token, so the
/// project's security rules apply exactly as they would for a web client.
pub struct FirestoreStore {
    client: reqwest::Client,
    documents_url: String,
    api_key: String,
    id_token: RwLock<Option<String>>,
}

impl FirestoreStore {
    pub fn new(settings: &FirebaseSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_BASE, settings.project_id
            ),
            api_key: settings.api_key.clone(),
            id_token: RwLock::new(None),
        })
    }

    /// Install or clear the ID token used for requests
    pub fn set_id_token(&self, token: Option<String>) {
        let mut guard = self.id_token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }

    pub(crate) fn token(&self) -> Result<String, HistoryError> {
        self.id_token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(HistoryError::Unauthenticated)
    }

    async fn check(response: reqwest::Response) -> Result<String, HistoryError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = %status, body = %body, "Firestore error response");
            return Err(HistoryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn create_document(&self, message: &ChatMessage) -> Result<(), HistoryError> {
        let token = self.token()?;
        let url = format!("{}/{}", self.documents_url, COLLECTION);
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[("key", self.api_key.as_str())]);
        if let Some(id) = &message.id {
            request = request.query(&[("documentId", id.as_str())]);
        }

        let response = request.json(&encode_document(message)).send().await?;
        Self::check(response).await?;
        tracing::debug!(id = ?message.id, role = %message.role, "message saved");
        Ok(())
    }

    async fn run_query(&self, user_id: &str) -> Result<Vec<ChatMessage>, HistoryError> {
        let token = self.token()?;
        let url = format!("{}:runQuery", self.documents_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .query(&[("key", self.api_key.as_str())])
            .json(&user_query(user_id))
            .send()
            .await?;

        let body = Self::check(response).await?;
        let messages = decode_query_response(&body)?;
        tracing::debug!(user = %user_id, count = messages.len(), "history fetched");
        Ok(messages)
    }

    async fn delete_document(&self, message_id: &str) -> Result<(), HistoryError> {
        let token = self.token()?;
        let url = format!("{}/{}/{}", self.documents_url, COLLECTION, message_id);
        let response = self
            .client
            .delete(&url)
            .bearer_auth(token)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

impl HistoryStore for FirestoreStore {
    fn save(
        &self,
        message: &ChatMessage,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send {
        self.create_document(message)
    }

    fn list_by_user(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<Vec<ChatMessage>, HistoryError>> + Send {
        self.run_query(user_id)
    }

    fn delete(
        &self,
        message_id: &str,
    ) -> impl Future<Output = Result<(), HistoryError>> + Send {
        self.delete_document(message_id)
    }
}

/// Firestore document body for a message
pub fn encode_document(message: &ChatMessage) -> Value {
    json!({
        "fields": {
            "userId": { "stringValue": message.user_id.clone().unwrap_or_default() },
            "role": { "stringValue": message.role.to_string() },
            "content": { "stringValue": message.content },
            "timestamp": {
                "timestampValue": message.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
            },
        }
    })
}

fn user_query(user_id: &str) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": COLLECTION }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": "userId" },
                    "op": "EQUAL",
                    "value": { "stringValue": user_id }
                }
            },
            "orderBy": [{
                "field": { "fieldPath": "timestamp" },
                "direction": "DESCENDING"
            }]
        }
    })
}

/// Decode a Firestore document into a message
pub fn decode_document(document: &Value) -> Result<ChatMessage, HistoryError> {
    let fields = document
        .get("fields")
        .ok_or_else(|| HistoryError::Malformed("document has no fields".to_string()))?;

    let string_field = |name: &str| -> Option<String> {
        fields
            .get(name)
            .and_then(|v| v.get("stringValue"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let role = string_field("role")
        .ok_or_else(|| HistoryError::Malformed("missing role".to_string()))?;
    let role = role
        .parse::<ChatRole>()
        .map_err(|_| HistoryError::Malformed(format!("unknown role '{}'", role)))?;

    let timestamp = fields
        .get("timestamp")
        .and_then(|v| v.get("timestampValue"))
        .and_then(Value::as_str)
        .ok_or_else(|| HistoryError::Malformed("missing timestamp".to_string()))?;
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| HistoryError::Malformed(format!("bad timestamp: {}", e)))?
        .with_timezone(&Utc);

    let id = document
        .get("name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit('/').next())
        .map(str::to_string);

    Ok(ChatMessage {
        id,
        role,
        content: string_field("content").unwrap_or_default(),
        timestamp,
        user_id: string_field("userId").filter(|uid| !uid.is_empty()),
    })
}

/// Decode a `runQuery` response body, preserving the server's order
pub fn decode_query_response(body: &str) -> Result<Vec<ChatMessage>, HistoryError> {
    let rows: Vec<Value> = serde_json::from_str(body)
        .map_err(|e| HistoryError::Malformed(e.to_string()))?;

    // Rows without a document only carry a readTime
    rows.iter()
        .filter_map(|row| row.get("document"))
        .map(decode_document)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChatMessage {
        let mut message = ChatMessage::assistant("💡 remember the units", Some("uid-1".into()));
        message.timestamp = DateTime::parse_from_rfc3339("2024-05-01T08:30:00.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        message
    }

    #[test]
    fn test_encode_document_fields() {
        let doc = encode_document(&sample());
        assert_eq!(doc["fields"]["userId"]["stringValue"], "uid-1");
        assert_eq!(doc["fields"]["role"]["stringValue"], "assistant");
        assert_eq!(doc["fields"]["content"]["stringValue"], "💡 remember the units");
        assert_eq!(
            doc["fields"]["timestamp"]["timestampValue"],
            "2024-05-01T08:30:00.123456Z"
        );
    }

    #[test]
    fn test_decode_document_takes_id_from_name() {
        let original = sample();
        let mut doc = encode_document(&original);
        doc["name"] = json!("projects/p/databases/(default)/documents/messages/abc123");

        let decoded = decode_document(&doc).unwrap();
        assert_eq!(decoded.id.as_deref(), Some("abc123"));
        assert_eq!(decoded.role, ChatRole::Assistant);
        assert_eq!(decoded.content, original.content);
        assert_eq!(decoded.timestamp, original.timestamp);
        assert_eq!(decoded.user_id.as_deref(), Some("uid-1"));
    }

    #[test]
    fn test_decode_rejects_unknown_role() {
        let doc = json!({
            "fields": {
                "role": { "stringValue": "system" },
                "timestamp": { "timestampValue": "2024-05-01T08:30:00Z" }
            }
        });
        assert!(matches!(decode_document(&doc), Err(HistoryError::Malformed(_))));
    }

    #[test]
    fn test_query_response_skips_read_time_rows() {
        let body = r#"[
            {"document": {"name": "x/messages/2", "fields": {
                "userId": {"stringValue": "u"}, "role": {"stringValue": "assistant"},
                "content": {"stringValue": "second"}, "timestamp": {"timestampValue": "2024-05-01T08:31:00Z"}}},
             "readTime": "2024-05-01T09:00:00Z"},
            {"document": {"name": "x/messages/1", "fields": {
                "userId": {"stringValue": "u"}, "role": {"stringValue": "user"},
                "content": {"stringValue": "first"}, "timestamp": {"timestampValue": "2024-05-01T08:30:00Z"}}},
             "readTime": "2024-05-01T09:00:00Z"}
        ]"#;
        let messages = decode_query_response(body).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "second");
        assert_eq!(messages[1].role, ChatRole::User);

        let empty = decode_query_response(r#"[{"readTime": "2024-05-01T09:00:00Z"}]"#).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_user_query_orders_newest_first() {
        let query = user_query("uid-9");
        let q = &query["structuredQuery"];
        assert_eq!(q["where"]["fieldFilter"]["value"]["stringValue"], "uid-9");
        assert_eq!(q["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(q["orderBy"][0]["field"]["fieldPath"], "timestamp");
    }

    #[tokio::test]
    async fn test_requests_need_a_token() {
        let store = FirestoreStore::new(&FirebaseSettings {
            api_key: "k".into(),
            project_id: "demo".into(),
        })
        .unwrap();
        assert!(matches!(
            store.list_by_user("u").await,
            Err(HistoryError::Unauthenticated)
        ));

        store.set_id_token(Some("token".into()));
        assert_eq!(store.token().unwrap(), "token");
        assert!(store.documents_url.ends_with("/projects/demo/databases/(default)/documents"));
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use crate::claims::ClaimsMap;
use crate::config::ClaimsConfig;
use crate::error::StoreError;

/// Document database capable of field-level merge upserts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Creates the document if absent, otherwise overwrites only `fields`.
    /// `server_timestamp_field` is set to the store's own write time.
    async fn upsert_merge(
        &self,
        collection: &str,
        document_id: &str,
        fields: &ClaimsMap,
        server_timestamp_field: &str,
    ) -> Result<(), StoreError>;
}

/// Firestore REST client (production, or the emulator).
#[derive(Clone)]
pub struct FirestoreClient {
    client: Client,
    base_url: String,
    project_id: String,
    bearer: Option<String>,
}

impl FirestoreClient {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url, project_id)
    }

    pub fn with_client(
        client: Client,
        base_url: impl Into<String>,
        project_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            bearer: None,
        }
    }

    pub fn from_config(client: Client, config: &ClaimsConfig) -> Self {
        let mut store = Self::with_client(client, config.firestore_base_url(), &config.project_id);
        store.bearer = config.store_token();
        store
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn database(&self) -> String {
        format!("projects/{}/databases/(default)", self.project_id)
    }

    fn commit_url(&self) -> String {
        format!("{}/v1/{}/documents:commit", self.base_url, self.database())
    }

    fn commit_body(
        &self,
        collection: &str,
        document_id: &str,
        fields: &ClaimsMap,
        server_timestamp_field: &str,
    ) -> Result<Value, StoreError> {
        let mut encoded = Map::new();
        let mut field_paths = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            encoded.insert(key.clone(), encode_value(key, value)?);
            field_paths.push(Value::String(field_path(key)));
        }

        Ok(json!({
            "writes": [{
                "update": {
                    "name": format!("{}/documents/{collection}/{document_id}", self.database()),
                    "fields": encoded,
                },
                "updateMask": { "fieldPaths": field_paths },
                "updateTransforms": [{
                    "fieldPath": field_path(server_timestamp_field),
                    "setToServerValue": "REQUEST_TIME",
                }],
            }]
        }))
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn upsert_merge(
        &self,
        collection: &str,
        document_id: &str,
        fields: &ClaimsMap,
        server_timestamp_field: &str,
    ) -> Result<(), StoreError> {
        let body = self.commit_body(collection, document_id, fields, server_timestamp_field)?;
        let mut request = self.client.post(self.commit_url()).json(&body);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected { status, message });
        }
        Ok(())
    }
}

/// Encodes a JSON value as a Firestore typed `Value`.
fn encode_value(key: &str, value: &Value) -> Result<Value, StoreError> {
    let encoded = match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(flag) => json!({ "booleanValue": flag }),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                json!({ "integerValue": int.to_string() })
            } else if number.is_u64() {
                return Err(StoreError::UnsupportedValue(key.to_string()));
            } else {
                let double = number
                    .as_f64()
                    .ok_or_else(|| StoreError::UnsupportedValue(key.to_string()))?;
                json!({ "doubleValue": double })
            }
        }
        Value::String(text) => json!({ "stringValue": text }),
        Value::Array(items) => {
            let values = items
                .iter()
                .map(|item| encode_value(key, item))
                .collect::<Result<Vec<_>, _>>()?;
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => {
            let mut fields = Map::new();
            for (name, item) in map {
                fields.insert(name.clone(), encode_value(name, item)?);
            }
            json!({ "mapValue": { "fields": fields } })
        }
    };
    Ok(encoded)
}

/// Simple names pass through; anything else is backtick-quoted.
fn field_path(name: &str) -> String {
    let mut chars = name.chars();
    let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
    if simple {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

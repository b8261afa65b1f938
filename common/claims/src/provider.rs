use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::claims::ClaimsMap;
use crate::config::ClaimsConfig;
use crate::error::ProviderError;

/// Identity record as returned by the provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityRecord {
    pub identity_id: String,
    pub custom_claims: Option<ClaimsMap>,
}

/// Identity provider capable of replacing and reading custom claims.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Replaces all custom claims on the identity. `None` clears them.
    async fn set_claims(
        &self,
        identity_id: &str,
        claims: Option<&ClaimsMap>,
    ) -> Result<(), ProviderError>;

    async fn get_identity(&self, identity_id: &str) -> Result<IdentityRecord, ProviderError>;
}

/// Identity Toolkit REST client (Firebase Auth, or its emulator).
#[derive(Clone)]
pub struct IdentityToolkitClient {
    client: Client,
    base_url: String,
    project_id: String,
    bearer: Option<String>,
}

impl IdentityToolkitClient {
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
        let mut provider =
            Self::with_client(client, config.identity_toolkit_base_url(), &config.project_id);
        provider.bearer = config.provider_token();
        provider
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1/projects/{}/accounts:{method}",
            self.base_url, self.project_id
        )
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &B,
        identity_id: &str,
    ) -> Result<Response, ProviderError> {
        let mut request = self.client.post(self.endpoint(method)).json(body);
        if let Some(token) = &self.bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let message = response
            .json::<ApiErrorResponse>()
            .await
            .map(|body| body.error.message)
            .unwrap_or_default();
        if message.starts_with("USER_NOT_FOUND") {
            return Err(ProviderError::NotFound(identity_id.to_string()));
        }
        Err(ProviderError::Rejected { status, message })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    async fn set_claims(
        &self,
        identity_id: &str,
        claims: Option<&ClaimsMap>,
    ) -> Result<(), ProviderError> {
        let custom_attributes = match claims {
            Some(map) => serde_json::to_string(map)
                .map_err(|err| ProviderError::Decode(err.to_string()))?,
            None => "{}".to_string(),
        };
        let body = UpdateRequest {
            local_id: identity_id,
            custom_attributes,
        };
        self.post("update", &body, identity_id).await?;
        Ok(())
    }

    async fn get_identity(&self, identity_id: &str) -> Result<IdentityRecord, ProviderError> {
        let body = LookupRequest {
            local_id: [identity_id],
        };
        let response = self.post("lookup", &body, identity_id).await?;
        let lookup: LookupResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        let user = lookup
            .users
            .into_iter()
            .find(|user| user.local_id == identity_id)
            .ok_or_else(|| ProviderError::NotFound(identity_id.to_string()))?;

        let custom_claims = match user.custom_attributes.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => match serde_json::from_str::<Value>(raw)
                .map_err(|err| ProviderError::Decode(err.to_string()))?
            {
                Value::Object(map) => Some(map),
                Value::Null => None,
                other => {
                    return Err(ProviderError::Decode(format!(
                        "customAttributes is not an object: {other}"
                    )))
                }
            },
        };

        Ok(IdentityRecord {
            identity_id: user.local_id,
            custom_claims,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    local_id: &'a str,
    custom_attributes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    local_id: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<UserEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserEntry {
    local_id: String,
    #[serde(default)]
    custom_attributes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

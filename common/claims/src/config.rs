use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::Client;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com";
const EMULATOR_TOKEN: &str = "owner";

/// What the manager does when the mirror write fails after the claims were set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MirrorFailurePolicy {
    /// Return the store error and leave the claims in place.
    #[default]
    Propagate,
    /// Restore the previous claims before returning the store error.
    Compensate,
}

impl FromStr for MirrorFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "propagate" => Ok(MirrorFailurePolicy::Propagate),
            "compensate" => Ok(MirrorFailurePolicy::Compensate),
            other => Err(anyhow!("unknown mirror failure policy '{other}'")),
        }
    }
}

/// Runtime configuration for the provider and store clients.
#[derive(Debug, Clone)]
pub struct ClaimsConfig {
    /// Firebase / GCP project owning both the identities and the database.
    pub project_id: String,
    /// OAuth bearer used against the REST APIs.
    pub access_token: Option<String>,
    /// `host:port` of a local Auth emulator.
    pub auth_emulator_host: Option<String>,
    /// `host:port` of a local Firestore emulator.
    pub firestore_emulator_host: Option<String>,
    pub users_collection: String,
    pub timestamp_field: String,
    pub mirror_failure: MirrorFailurePolicy,
    pub http_timeout: Duration,
}

impl ClaimsConfig {
    /// Construct config with defaults (`users` collection, `updatedAt`, 10 second timeout).
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: None,
            auth_emulator_host: None,
            firestore_emulator_host: None,
            users_collection: "users".to_string(),
            timestamp_field: "updatedAt".to_string(),
            mirror_failure: MirrorFailurePolicy::Propagate,
            http_timeout: Duration::from_secs(10),
        }
    }

    pub fn identity_toolkit_base_url(&self) -> String {
        match &self.auth_emulator_host {
            Some(host) => format!("http://{host}/identitytoolkit.googleapis.com"),
            None => IDENTITY_TOOLKIT_URL.to_string(),
        }
    }

    pub fn firestore_base_url(&self) -> String {
        match &self.firestore_emulator_host {
            Some(host) => format!("http://{host}"),
            None => FIRESTORE_URL.to_string(),
        }
    }

    /// Bearer for the identity provider; emulators accept the `owner` token.
    pub fn provider_token(&self) -> Option<String> {
        self.access_token.clone().or_else(|| {
            self.auth_emulator_host
                .as_ref()
                .map(|_| EMULATOR_TOKEN.to_string())
        })
    }

    pub fn store_token(&self) -> Option<String> {
        self.access_token.clone().or_else(|| {
            self.firestore_emulator_host
                .as_ref()
                .map(|_| EMULATOR_TOKEN.to_string())
        })
    }

    pub fn http_client(&self) -> Result<Client> {
        Client::builder()
            .timeout(self.http_timeout)
            .build()
            .context("Failed to build HTTP client")
    }
}

pub fn load_claims_config() -> Result<ClaimsConfig> {
    claims_config_from(|key| env::var(key).ok())
}

/// Builds config from an arbitrary variable lookup.
pub fn claims_config_from<F>(lookup: F) -> Result<ClaimsConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let project_id = lookup("CLAIMS_PROJECT_ID")
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("CLAIMS_PROJECT_ID must be set"))?;

    let mut config = ClaimsConfig::new(project_id);
    config.access_token = lookup("CLAIMS_ACCESS_TOKEN").and_then(|value| normalize_optional(&value));
    config.auth_emulator_host =
        lookup("FIREBASE_AUTH_EMULATOR_HOST").and_then(|value| normalize_optional(&value));
    config.firestore_emulator_host =
        lookup("FIRESTORE_EMULATOR_HOST").and_then(|value| normalize_optional(&value));

    let has_emulators =
        config.auth_emulator_host.is_some() && config.firestore_emulator_host.is_some();
    if config.access_token.is_none() && !has_emulators {
        return Err(anyhow!(
            "CLAIMS_ACCESS_TOKEN must be set unless both FIREBASE_AUTH_EMULATOR_HOST and FIRESTORE_EMULATOR_HOST are"
        ));
    }

    if let Some(collection) =
        lookup("CLAIMS_USERS_COLLECTION").and_then(|value| normalize_optional(&value))
    {
        config.users_collection = collection;
    }
    if let Some(field) = lookup("CLAIMS_TIMESTAMP_FIELD").and_then(|value| normalize_optional(&value))
    {
        config.timestamp_field = field;
    }

    config.mirror_failure = lookup("CLAIMS_MIRROR_FAILURE")
        .map(|value| value.parse::<MirrorFailurePolicy>())
        .transpose()
        .context("Failed to parse CLAIMS_MIRROR_FAILURE")?
        .unwrap_or_default();

    if let Some(raw) = lookup("CLAIMS_HTTP_TIMEOUT_SECS") {
        let seconds: u64 = raw
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse CLAIMS_HTTP_TIMEOUT_SECS '{raw}'"))?;
        config.http_timeout = Duration::from_secs(seconds);
    }

    Ok(config)
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

use std::env;
use std::net::{IpAddr, SocketAddr};

use anyhow::{anyhow, Context, Result};
use common_claims::{claims_config_from, ClaimsConfig};

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub host: IpAddr,
    pub port: u16,
    /// Bearer token admin callers must present.
    pub admin_token: String,
    pub allowed_origins: Vec<String>,
    pub claims: ClaimsConfig,
}

impl ServiceConfig {
    pub fn new(admin_token: impl Into<String>, claims: ClaimsConfig) -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 8095,
            admin_token: admin_token.into(),
            allowed_origins: default_origins(),
            claims,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    service_config_from(|key| env::var(key).ok())
}

pub fn service_config_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let claims = claims_config_from(&lookup)?;

    let admin_token = lookup("CLAIMS_ADMIN_TOKEN")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("CLAIMS_ADMIN_TOKEN must be set"))?;

    let mut config = ServiceConfig::new(admin_token, claims);

    if let Some(host) = lookup("HOST") {
        config.host = host
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse HOST '{host}'"))?;
    }
    if let Some(port) = lookup("PORT") {
        config.port = port
            .trim()
            .parse()
            .with_context(|| format!("Failed to parse PORT '{port}'"))?;
    }
    if let Some(origins) = lookup("CLAIMS_ALLOWED_ORIGINS") {
        config.allowed_origins = origins
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();
    }

    Ok(config)
}

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://localhost:5173".to_string(),
    ]
}

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::claims::ClaimsMap;
use crate::error::{ProviderError, StoreError};
use crate::provider::{IdentityProvider, IdentityRecord};
use crate::store::DocumentStore;

#[derive(Default)]
struct ProviderState {
    identities: HashMap<String, Option<ClaimsMap>>,
    write_failure: Option<ProviderError>,
}

/// Thread-safe identity provider kept in process memory.
///
/// Identities must be registered before claims can be set on them, matching the
/// hosted provider's behavior for unknown ids.
#[derive(Clone, Default)]
pub struct InMemoryIdentityProvider {
    inner: Arc<RwLock<ProviderState>>,
    set_calls: Arc<AtomicUsize>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let provider = Self::new();
        for id in ids {
            provider.register(id);
        }
        provider
    }

    pub fn register(&self, identity_id: impl Into<String>) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.identities.entry(identity_id.into()).or_insert(None);
    }

    /// Makes every subsequent `set_claims` fail with `error` until cleared.
    pub fn fail_writes(&self, error: Option<ProviderError>) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.write_failure = error;
    }

    pub fn claims(&self, identity_id: &str) -> Option<ClaimsMap> {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard.identities.get(identity_id).cloned().flatten()
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn set_claims(
        &self,
        identity_id: &str,
        claims: Option<&ClaimsMap>,
    ) -> Result<(), ProviderError> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.write().expect("rwlock poisoned");
        if let Some(err) = guard.write_failure.clone() {
            return Err(err);
        }
        let entry = guard
            .identities
            .get_mut(identity_id)
            .ok_or_else(|| ProviderError::NotFound(identity_id.to_string()))?;
        *entry = claims.filter(|map| !map.is_empty()).cloned();
        Ok(())
    }

    async fn get_identity(&self, identity_id: &str) -> Result<IdentityRecord, ProviderError> {
        let guard = self.inner.read().expect("rwlock poisoned");
        let claims = guard
            .identities
            .get(identity_id)
            .ok_or_else(|| ProviderError::NotFound(identity_id.to_string()))?;
        Ok(IdentityRecord {
            identity_id: identity_id.to_string(),
            custom_claims: claims.clone(),
        })
    }
}

#[derive(Default)]
struct StoreState {
    documents: HashMap<(String, String), ClaimsMap>,
    write_failure: Option<StoreError>,
}

/// Thread-safe document store kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    inner: Arc<RwLock<StoreState>>,
    writes: Arc<AtomicUsize>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces a document wholesale, bypassing merge semantics.
    pub fn insert_document(&self, collection: &str, document_id: &str, fields: ClaimsMap) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard
            .documents
            .insert((collection.to_string(), document_id.to_string()), fields);
    }

    pub fn document(&self, collection: &str, document_id: &str) -> Option<ClaimsMap> {
        let guard = self.inner.read().expect("rwlock poisoned");
        guard
            .documents
            .get(&(collection.to_string(), document_id.to_string()))
            .cloned()
    }

    pub fn fail_writes(&self, error: Option<StoreError>) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.write_failure = error;
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn upsert_merge(
        &self,
        collection: &str,
        document_id: &str,
        fields: &ClaimsMap,
        server_timestamp_field: &str,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.inner.write().expect("rwlock poisoned");
        if let Some(err) = guard.write_failure.clone() {
            return Err(err);
        }
        let document = guard
            .documents
            .entry((collection.to_string(), document_id.to_string()))
            .or_default();
        for (key, value) in fields {
            document.insert(key.clone(), value.clone());
        }
        document.insert(
            server_timestamp_field.to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        Ok(())
    }
}

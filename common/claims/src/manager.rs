use std::sync::Arc;

use common_observability::ClaimsMetrics;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::claims::{ClaimsMap, RoleClaims};
use crate::config::{ClaimsConfig, MirrorFailurePolicy};
use crate::error::{ClaimsError, ClaimsResult};
use crate::provider::IdentityProvider;
use crate::roles::StaffRole;
use crate::store::DocumentStore;

pub const MSG_CLAIMS_SET: &str = "Claims set successfully";
pub const MSG_PATIENT_CLAIMS_SET: &str = "Patient claims set successfully";
pub const MSG_CLAIMS_REMOVED: &str = "Claims removed successfully";

const OP_ASSIGN_STAFF: &str = "assign_staff_role";
const OP_ASSIGN_PATIENT: &str = "assign_patient_role";
const OP_REVOKE: &str = "revoke_role";
const OP_READ: &str = "read_role";

/// Descriptor returned by every successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimsUpdate {
    pub success: bool,
    pub message: String,
}

impl ClaimsUpdate {
    fn ok(message: &str) -> Self {
        Self {
            success: true,
            message: message.to_string(),
        }
    }
}

/// Assigns role claims on the identity provider and mirrors them into the
/// document store under `{collection}/{identity_id}`.
///
/// The two writes are independent: a mirror failure after the claims were set
/// leaves the stores diverged unless [`MirrorFailurePolicy::Compensate`] is
/// selected.
#[derive(Clone)]
pub struct ClaimsManager {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    collection: String,
    timestamp_field: String,
    mirror_failure: MirrorFailurePolicy,
    metrics: Option<ClaimsMetrics>,
}

impl ClaimsManager {
    pub fn new(provider: Arc<dyn IdentityProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            provider,
            store,
            collection: "users".to_string(),
            timestamp_field: "updatedAt".to_string(),
            mirror_failure: MirrorFailurePolicy::Propagate,
            metrics: None,
        }
    }

    pub fn from_config(
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        config: &ClaimsConfig,
    ) -> Self {
        Self::new(provider, store)
            .with_collection(config.users_collection.clone())
            .with_timestamp_field(config.timestamp_field.clone())
            .with_mirror_failure(config.mirror_failure)
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }

    pub fn with_mirror_failure(mut self, policy: MirrorFailurePolicy) -> Self {
        self.mirror_failure = policy;
        self
    }

    pub fn with_metrics(mut self, metrics: ClaimsMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Grants a staff role (`medical_staff` when `role` is `None`).
    pub async fn assign_staff_role(
        &self,
        identity_id: &str,
        facility_id: &str,
        role: Option<StaffRole>,
    ) -> ClaimsResult<ClaimsUpdate> {
        let role = role.unwrap_or_default();
        let claims = RoleClaims::staff(role, facility_id);
        self.assign(OP_ASSIGN_STAFF, identity_id, &claims).await?;
        info!(identity_id, facility_id, %role, "staff claims mirrored");
        self.record(OP_ASSIGN_STAFF, "success");
        Ok(ClaimsUpdate::ok(MSG_CLAIMS_SET))
    }

    /// Grants the patient role. `date_of_birth` is stored verbatim.
    pub async fn assign_patient_role(
        &self,
        identity_id: &str,
        facility_id: &str,
        patient_id: &str,
        date_of_birth: &str,
    ) -> ClaimsResult<ClaimsUpdate> {
        let claims = RoleClaims::patient(facility_id, patient_id, date_of_birth);
        self.assign(OP_ASSIGN_PATIENT, identity_id, &claims).await?;
        info!(identity_id, facility_id, patient_id, "patient claims mirrored");
        self.record(OP_ASSIGN_PATIENT, "success");
        Ok(ClaimsUpdate::ok(MSG_PATIENT_CLAIMS_SET))
    }

    /// Clears every custom claim. The mirror document is left as is.
    pub async fn revoke_role(&self, identity_id: &str) -> ClaimsResult<ClaimsUpdate> {
        if let Err(err) = self.provider.set_claims(identity_id, None).await {
            return Err(self.fail(OP_REVOKE, identity_id, err.into()));
        }
        info!(identity_id, "custom claims removed");
        self.record(OP_REVOKE, "success");
        Ok(ClaimsUpdate::ok(MSG_CLAIMS_REMOVED))
    }

    /// Current custom claims, or an empty map when none are set.
    pub async fn read_role(&self, identity_id: &str) -> ClaimsResult<ClaimsMap> {
        match self.provider.get_identity(identity_id).await {
            Ok(record) => {
                self.record(OP_READ, "success");
                Ok(record.custom_claims.unwrap_or_default())
            }
            Err(err) => Err(self.fail(OP_READ, identity_id, err.into())),
        }
    }

    async fn assign(
        &self,
        operation: &'static str,
        identity_id: &str,
        claims: &RoleClaims,
    ) -> ClaimsResult<()> {
        if !is_document_id(identity_id) {
            let err = ClaimsError::InvalidIdentityId(identity_id.to_string());
            return Err(self.fail(operation, identity_id, err));
        }

        let previous = match self.mirror_failure {
            MirrorFailurePolicy::Propagate => None,
            MirrorFailurePolicy::Compensate => match self.provider.get_identity(identity_id).await
            {
                Ok(record) => Some(record.custom_claims),
                Err(err) => return Err(self.fail(operation, identity_id, err.into())),
            },
        };

        let fields = claims.to_map();
        if let Err(err) = self.provider.set_claims(identity_id, Some(&fields)).await {
            return Err(self.fail(operation, identity_id, err.into()));
        }
        info!(operation, identity_id, "custom claims set on identity provider");

        if let Err(err) = self
            .store
            .upsert_merge(
                &self.collection,
                identity_id,
                &fields,
                &self.timestamp_field,
            )
            .await
        {
            if let Some(metrics) = &self.metrics {
                metrics.mirror_divergence();
            }
            if let Some(previous) = previous {
                self.restore(identity_id, previous).await;
            }
            return Err(self.fail(operation, identity_id, err.into()));
        }

        Ok(())
    }

    async fn restore(&self, identity_id: &str, previous: Option<ClaimsMap>) {
        match self
            .provider
            .set_claims(identity_id, previous.as_ref())
            .await
        {
            Ok(()) => {
                warn!(identity_id, "mirror write failed; previous claims restored");
                self.record_compensation("restored");
            }
            Err(err) => {
                error!(identity_id, error = %err, "mirror write failed and claims could not be restored");
                self.record_compensation("failed");
            }
        }
    }

    fn fail(&self, operation: &'static str, identity_id: &str, err: ClaimsError) -> ClaimsError {
        error!(operation, identity_id, error = %err, "custom claims operation failed");
        self.record(operation, "failure");
        err
    }

    fn record(&self, operation: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.operation(operation, outcome);
        }
    }

    fn record_compensation(&self, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.compensation(outcome);
        }
    }
}

/// Mirror documents live at `{collection}/{identity_id}`, so the id must be a
/// single path segment.
fn is_document_id(identity_id: &str) -> bool {
    !identity_id.is_empty() && !identity_id.contains('/') && identity_id != "." && identity_id != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ProviderError, StoreError};
    use crate::memory::{InMemoryDocumentStore, InMemoryIdentityProvider};
    use serde_json::{json, Value};
    use std::io;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct Harness {
        provider: InMemoryIdentityProvider,
        store: InMemoryDocumentStore,
        metrics: ClaimsMetrics,
        manager: ClaimsManager,
    }

    fn harness(policy: MirrorFailurePolicy) -> Harness {
        let provider = InMemoryIdentityProvider::with_identities(["u1", "u2"]);
        let store = InMemoryDocumentStore::new();
        let metrics = ClaimsMetrics::new().expect("metrics");
        let manager = ClaimsManager::new(Arc::new(provider.clone()), Arc::new(store.clone()))
            .with_mirror_failure(policy)
            .with_metrics(metrics.clone());
        Harness {
            provider,
            store,
            metrics,
            manager,
        }
    }

    fn as_map(value: Value) -> ClaimsMap {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn staff_assignment_sets_claims_and_mirror() {
        let h = harness(MirrorFailurePolicy::Propagate);
        let update = h
            .manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect("assign staff");
        assert_eq!(update, ClaimsUpdate::ok(MSG_CLAIMS_SET));
        assert!(update.success);

        let claims = h.manager.read_role("u1").await.expect("read");
        assert_eq!(
            Value::Object(claims),
            json!({"role": "medical_staff", "facilityId": "fac_1", "type": "staff"})
        );

        let doc = h.store.document("users", "u1").expect("mirror document");
        assert_eq!(doc["role"], "medical_staff");
        assert_eq!(doc["facilityId"], "fac_1");
        assert_eq!(doc["type"], "staff");
        assert!(doc.contains_key("updatedAt"));
        assert_eq!(doc.len(), 4);
    }

    #[tokio::test]
    async fn patient_assignment_replaces_prior_staff_claims() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.manager
            .assign_staff_role("u2", "fac_9", Some(StaffRole::Admin))
            .await
            .expect("assign staff");
        let update = h
            .manager
            .assign_patient_role("u2", "fac_1", "P001", "1990-01-15T00:00:00.000Z")
            .await
            .expect("assign patient");
        assert_eq!(update.message, MSG_PATIENT_CLAIMS_SET);

        let claims = h.manager.read_role("u2").await.expect("read");
        assert_eq!(
            Value::Object(claims),
            json!({
                "role": "patient",
                "facilityId": "fac_1",
                "patientId": "P001",
                "dateOfBirth": "1990-01-15T00:00:00.000Z",
                "type": "patient"
            })
        );
    }

    #[tokio::test]
    async fn staff_assignment_after_patient_drops_patient_fields() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.manager
            .assign_patient_role("u1", "fac_1", "P001", "1990-01-15T00:00:00.000Z")
            .await
            .expect("assign patient");
        h.manager
            .assign_staff_role("u1", "fac_1", Some(StaffRole::Admin))
            .await
            .expect("assign staff");

        let claims = h.manager.read_role("u1").await.expect("read");
        assert_eq!(
            Value::Object(claims),
            json!({"role": "admin", "facilityId": "fac_1", "type": "staff"})
        );
    }

    #[tokio::test]
    async fn revoke_clears_claims_but_keeps_mirror() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect("assign");
        let update = h.manager.revoke_role("u1").await.expect("revoke");
        assert_eq!(update.message, MSG_CLAIMS_REMOVED);

        let claims = h.manager.read_role("u1").await.expect("read");
        assert!(claims.is_empty());
        let doc = h.store.document("users", "u1").expect("mirror kept");
        assert_eq!(doc["role"], "medical_staff");
        assert_eq!(h.store.writes(), 1);
    }

    #[tokio::test]
    async fn repeated_assignment_is_idempotent() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.manager
            .assign_staff_role("u1", "fac_1", Some(StaffRole::Admin))
            .await
            .expect("first");
        let once = h.manager.read_role("u1").await.expect("read once");
        h.manager
            .assign_staff_role("u1", "fac_1", Some(StaffRole::Admin))
            .await
            .expect("second");
        let twice = h.manager.read_role("u1").await.expect("read twice");
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn mirror_merge_preserves_unrelated_fields() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.store.insert_document(
            "users",
            "u1",
            as_map(json!({"foo": "keep me", "role": "patient"})),
        );
        h.manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect("assign");

        let doc = h.store.document("users", "u1").expect("document");
        assert_eq!(doc["foo"], "keep me");
        assert_eq!(doc["role"], "medical_staff");
    }

    #[tokio::test]
    async fn provider_failure_skips_mirror_write() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.provider.fail_writes(Some(ProviderError::Rejected {
            status: 403,
            message: "PERMISSION_DENIED".into(),
        }));

        let err = h
            .manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect_err("provider failure");
        assert!(matches!(err, ClaimsError::Provider(ProviderError::Rejected { status: 403, .. })));
        assert_eq!(h.store.writes(), 0);
        assert!(h.store.document("users", "u1").is_none());
        assert_eq!(h.metrics.operation_count(OP_ASSIGN_STAFF, "failure"), 1);
    }

    #[tokio::test]
    async fn unknown_identity_propagates_not_found() {
        let h = harness(MirrorFailurePolicy::Propagate);
        let err = h.manager.read_role("ghost").await.expect_err("not found");
        assert!(matches!(err, ClaimsError::Provider(ProviderError::NotFound(_))));

        let err = h.manager.revoke_role("ghost").await.expect_err("not found");
        assert!(matches!(err, ClaimsError::Provider(ProviderError::NotFound(_))));
    }

    #[tokio::test]
    async fn mirror_failure_propagates_and_leaves_claims() {
        let h = harness(MirrorFailurePolicy::Propagate);
        h.store
            .fail_writes(Some(StoreError::Transport("connection reset".into())));

        let err = h
            .manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect_err("store failure");
        assert!(matches!(err, ClaimsError::Store(StoreError::Transport(_))));

        let claims = h.provider.claims("u1").expect("claims remain set");
        assert_eq!(claims["role"], "medical_staff");
        assert_eq!(h.metrics.divergence_count(), 1);
        assert_eq!(h.metrics.compensation_count("restored"), 0);
    }

    #[tokio::test]
    async fn compensation_restores_previous_claims() {
        let h = harness(MirrorFailurePolicy::Compensate);
        h.manager
            .assign_staff_role("u1", "fac_1", Some(StaffRole::Admin))
            .await
            .expect("initial assignment");
        h.store
            .fail_writes(Some(StoreError::Rejected {
                status: 503,
                message: "UNAVAILABLE".into(),
            }));

        let err = h
            .manager
            .assign_patient_role("u1", "fac_1", "P001", "1990-01-15T00:00:00.000Z")
            .await
            .expect_err("store failure");
        assert!(matches!(err, ClaimsError::Store(_)));

        let claims = h.manager.read_role("u1").await.expect("read");
        assert_eq!(
            Value::Object(claims),
            json!({"role": "admin", "facilityId": "fac_1", "type": "staff"})
        );
        assert_eq!(h.metrics.compensation_count("restored"), 1);
    }

    #[tokio::test]
    async fn compensation_clears_claims_that_did_not_exist() {
        let h = harness(MirrorFailurePolicy::Compensate);
        h.store
            .fail_writes(Some(StoreError::Transport("timeout".into())));

        h.manager
            .assign_staff_role("u2", "fac_1", None)
            .await
            .expect_err("store failure");
        assert!(h.provider.claims("u2").is_none());
    }

    #[tokio::test]
    async fn custom_collection_and_timestamp_field() {
        let provider = InMemoryIdentityProvider::with_identities(["u1"]);
        let store = InMemoryDocumentStore::new();
        let mut config = ClaimsConfig::new("demo");
        config.users_collection = "staff_directory".into();
        config.timestamp_field = "claimsUpdatedAt".into();
        let manager =
            ClaimsManager::from_config(Arc::new(provider), Arc::new(store.clone()), &config);

        manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect("assign");
        let doc = store
            .document("staff_directory", "u1")
            .expect("custom collection");
        assert!(doc.contains_key("claimsUpdatedAt"));
        assert_eq!(manager.collection(), "staff_directory");
    }

    #[tokio::test]
    async fn nested_identity_ids_are_rejected_before_any_write() {
        let h = harness(MirrorFailurePolicy::Compensate);
        h.provider.register("u1/private");

        for id in ["u1/private", "", ".", ".."] {
            let err = h
                .manager
                .assign_staff_role(id, "fac_1", None)
                .await
                .expect_err("invalid id");
            assert!(matches!(err, ClaimsError::InvalidIdentityId(ref bad) if bad == id));
        }
        let err = h
            .manager
            .assign_patient_role("users/u1", "fac_1", "P001", "1990-01-15")
            .await
            .expect_err("invalid id");
        assert!(matches!(err, ClaimsError::InvalidIdentityId(_)));

        assert_eq!(h.provider.set_calls(), 0);
        assert!(h.provider.claims("u1/private").is_none());
        assert_eq!(h.store.writes(), 0);
        assert_eq!(h.metrics.operation_count(OP_ASSIGN_STAFF, "failure"), 4);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn claims_write_is_logged_even_when_mirror_fails() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let h = harness(MirrorFailurePolicy::Propagate);
        h.store
            .fail_writes(Some(StoreError::Transport("connection reset".into())));
        h.manager
            .assign_staff_role("u1", "fac_1", None)
            .await
            .expect_err("store failure");

        let output = logs.contents();
        assert!(output.contains("custom claims set on identity provider"));
        assert!(output.contains("custom claims operation failed"));
        assert!(!output.contains("staff claims mirrored"));
    }
}

pub mod claims;
pub mod config;
pub mod error;
pub mod manager;
pub mod memory;
pub mod provider;
pub mod roles;
pub mod store;

pub use claims::{ClaimsMap, RoleClaims};
pub use config::{claims_config_from, load_claims_config, ClaimsConfig, MirrorFailurePolicy};
pub use error::{ClaimsError, ClaimsResult, ProviderError, StoreError, UnknownRole};
pub use manager::{ClaimsManager, ClaimsUpdate};
pub use memory::{InMemoryDocumentStore, InMemoryIdentityProvider};
pub use provider::{IdentityProvider, IdentityRecord, IdentityToolkitClient};
pub use roles::{
    IdentityType, Role, StaffRole, ROLE_ADMIN, ROLE_MEDICAL_STAFF, ROLE_PATIENT, TYPE_PATIENT,
    TYPE_STAFF,
};
pub use store::{DocumentStore, FirestoreClient};

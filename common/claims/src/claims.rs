use serde_json::{Map, Value};

use crate::roles::{IdentityType, Role, StaffRole};

pub const FIELD_ROLE: &str = "role";
pub const FIELD_FACILITY_ID: &str = "facilityId";
pub const FIELD_TYPE: &str = "type";
pub const FIELD_PATIENT_ID: &str = "patientId";
pub const FIELD_DATE_OF_BIRTH: &str = "dateOfBirth";

/// Custom-claims mapping as stored on an identity record.
pub type ClaimsMap = Map<String, Value>;

/// Typed view of the role claims written by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleClaims {
    Staff {
        role: StaffRole,
        facility_id: String,
    },
    Patient {
        facility_id: String,
        patient_id: String,
        date_of_birth: String,
    },
}

impl RoleClaims {
    pub fn staff(role: StaffRole, facility_id: impl Into<String>) -> Self {
        Self::Staff {
            role,
            facility_id: facility_id.into(),
        }
    }

    pub fn patient(
        facility_id: impl Into<String>,
        patient_id: impl Into<String>,
        date_of_birth: impl Into<String>,
    ) -> Self {
        Self::Patient {
            facility_id: facility_id.into(),
            patient_id: patient_id.into(),
            date_of_birth: date_of_birth.into(),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            RoleClaims::Staff { role, .. } => (*role).into(),
            RoleClaims::Patient { .. } => Role::Patient,
        }
    }

    pub fn identity_type(&self) -> IdentityType {
        self.role().identity_type()
    }

    pub fn facility_id(&self) -> &str {
        match self {
            RoleClaims::Staff { facility_id, .. } | RoleClaims::Patient { facility_id, .. } => {
                facility_id
            }
        }
    }

    /// Complete claims object for the identity; every write replaces the previous one.
    pub fn to_map(&self) -> ClaimsMap {
        let mut map = ClaimsMap::new();
        map.insert(FIELD_ROLE.into(), Value::from(self.role().as_str()));
        map.insert(FIELD_FACILITY_ID.into(), Value::from(self.facility_id()));
        map.insert(FIELD_TYPE.into(), Value::from(self.identity_type().as_str()));
        if let RoleClaims::Patient {
            patient_id,
            date_of_birth,
            ..
        } = self
        {
            map.insert(FIELD_PATIENT_ID.into(), Value::from(patient_id.as_str()));
            map.insert(FIELD_DATE_OF_BIRTH.into(), Value::from(date_of_birth.as_str()));
        }
        map
    }
}

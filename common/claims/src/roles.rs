use std::fmt;
use std::str::FromStr;

use crate::error::UnknownRole;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_MEDICAL_STAFF: &str = "medical_staff";
pub const ROLE_PATIENT: &str = "patient";

pub const TYPE_STAFF: &str = "staff";
pub const TYPE_PATIENT: &str = "patient";

/// Roles that may be granted through a staff assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Admin,
    #[default]
    MedicalStaff,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => ROLE_ADMIN,
            StaffRole::MedicalStaff => ROLE_MEDICAL_STAFF,
        }
    }
}

impl From<StaffRole> for Role {
    fn from(value: StaffRole) -> Self {
        match value {
            StaffRole::Admin => Role::Admin,
            StaffRole::MedicalStaff => Role::MedicalStaff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Admin,
    MedicalStaff,
    Patient,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => ROLE_ADMIN,
            Role::MedicalStaff => ROLE_MEDICAL_STAFF,
            Role::Patient => ROLE_PATIENT,
        }
    }

    /// The identity type implied by the role.
    pub fn identity_type(&self) -> IdentityType {
        match self {
            Role::Admin | Role::MedicalStaff => IdentityType::Staff,
            Role::Patient => IdentityType::Patient,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityType {
    Staff,
    Patient,
}

impl IdentityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityType::Staff => TYPE_STAFF,
            IdentityType::Patient => TYPE_PATIENT,
        }
    }
}

impl FromStr for StaffRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ROLE_ADMIN => Ok(StaffRole::Admin),
            ROLE_MEDICAL_STAFF => Ok(StaffRole::MedicalStaff),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Role checks consumed by page-guard logic

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// User roles known to the procurement backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    EndUser,
    ProcurementOfficer,
    Canvasser,
    BacSecretariat,
    BacChair,
    BacMember,
    Supplier,
    Admin,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::EndUser,
        Role::ProcurementOfficer,
        Role::Canvasser,
        Role::BacSecretariat,
        Role::BacChair,
        Role::BacMember,
        Role::Supplier,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::EndUser => "END_USER",
            Role::ProcurementOfficer => "PROCUREMENT_OFFICER",
            Role::Canvasser => "CANVASSER",
            Role::BacSecretariat => "BAC_SECRETARIAT",
            Role::BacChair => "BAC_CHAIR",
            Role::BacMember => "BAC_MEMBER",
            Role::Supplier => "SUPPLIER",
            Role::Admin => "ADMIN",
        }
    }

    pub fn is_procurement_staff(&self) -> bool {
        matches!(
            self,
            Role::ProcurementOfficer | Role::BacSecretariat | Role::BacChair | Role::BacMember
        )
    }

    /// Roles that can approve documents
    pub fn is_approver(&self) -> bool {
        matches!(
            self,
            Role::ProcurementOfficer | Role::BacChair | Role::BacMember
        )
    }

    pub fn is_bac_member(&self) -> bool {
        matches!(self, Role::BacChair | Role::BacMember)
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a page-access check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted,
    /// Not signed in; the shell should show the login surface
    LoginRequired,
    /// Signed in without a permitted role
    Forbidden,
}

/// Role membership check. No role means no access.
pub fn is_role_allowed<S: AsRef<str>>(role: Option<&str>, allowed: &[S]) -> bool {
    match role {
        Some(role) => allowed.iter().any(|r| r.as_ref() == role),
        None => false,
    }
}

/// Decide whether a page may be shown. `required = None` means any signed-in user.
pub fn check_access<S: AsRef<str>>(
    authenticated: bool,
    role: Option<&str>,
    required: Option<&[S]>,
) -> AccessDecision {
    if !authenticated {
        return AccessDecision::LoginRequired;
    }
    match required {
        Some(allowed) if !is_role_allowed(role, allowed) => AccessDecision::Forbidden,
        _ => AccessDecision::Granted,
    }
}

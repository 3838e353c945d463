//! Permission resolution for the CRM.
//!
//! A request is authorized against a permission code (`"applications.edit"`)
//! in a fixed order:
//!
//! 1. principals with the `admin` role are always allowed;
//! 2. a per-user override for the code decides if one exists;
//! 3. otherwise the role default for the code decides if one exists;
//! 4. otherwise the request is denied.
//!
//! Denial is an ordinary [`Decision`]; only storage faults are errors, and no
//! error path ever produces [`Decision::Allow`].

pub mod catalog;
pub mod guard;
pub mod resolver;
pub mod store;

use serde::{Deserialize, Serialize};

pub use resolver::AccessResolver;
pub use store::{DbPolicyStore, PolicyStore};

/// Role name that bypasses every permission lookup.
pub const ADMIN_ROLE: &str = "admin";

/// The authenticated actor on whose behalf a check runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: i32,
    pub role: String,
}

impl Principal {
    pub fn new(user_id: i32, role: impl Into<String>) -> Self {
        Self {
            user_id,
            role: role.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl From<bool> for Decision {
    fn from(granted: bool) -> Self {
        if granted {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

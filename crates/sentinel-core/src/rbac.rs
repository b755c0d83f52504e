//! Role-based permissions
//!
//! Pure permission algebra: a role holds `(resource, actions)` grants,
//! `*` matches anything, and `Admin` matches everything.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Operator,
    Observer,
    Maintenance,
}

/// One grant: a resource plus the set of allowed actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub actions: BTreeSet<String>,
}

impl Permission {
    pub fn new<R, A, I>(resource: R, actions: I) -> Self
    where
        R: Into<String>,
        A: Into<String>,
        I: IntoIterator<Item = A>,
    {
        Self {
            resource: resource.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    fn allows(&self, resource: &str, action: &str) -> bool {
        (self.resource == "*" || self.resource == resource)
            && (self.actions.contains("*") || self.actions.contains(action))
    }
}

/// Role-to-grant table with the platform defaults.
#[derive(Debug, Clone)]
pub struct RbacTable {
    grants: BTreeMap<Role, Vec<Permission>>,
}

impl Default for RbacTable {
    fn default() -> Self {
        let mut grants = BTreeMap::new();
        grants.insert(Role::Admin, vec![Permission::new("*", ["*"])]);
        grants.insert(
            Role::Operator,
            vec![
                Permission::new("mission", ["create", "execute", "abort"]),
                Permission::new("sensors", ["configure", "read"]),
                Permission::new("navigation", ["control"]),
            ],
        );
        grants.insert(
            Role::Observer,
            vec![
                Permission::new("mission", ["read"]),
                Permission::new("sensors", ["read"]),
                Permission::new("telemetry", ["read"]),
            ],
        );
        grants.insert(
            Role::Maintenance,
            vec![
                Permission::new("sensors", ["configure", "calibrate", "diagnose"]),
                Permission::new("system", ["diagnose", "update"]),
            ],
        );
        Self { grants }
    }
}

impl RbacTable {
    /// Pure check: does `role` hold `(resource, action)`?
    pub fn check(&self, role: Role, resource: &str, action: &str) -> bool {
        if role == Role::Admin {
            return true;
        }
        self.grants
            .get(&role)
            .is_some_and(|perms| perms.iter().any(|p| p.allows(resource, action)))
    }

    /// Replace the grants for one role.
    pub fn set_grants(&mut self, role: Role, grants: Vec<Permission>) {
        self.grants.insert(role, grants);
    }
}

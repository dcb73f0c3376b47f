//! TOML fixtures for seeding an [`InMemoryRoleStore`].
//!
//! ```toml
//! # Seed super_admin, admin, manager, agent and user first (default: true).
//! include_default_roles = true
//!
//! [[roles]]
//! name = "auditor"
//! display_name = "Auditor"
//! hierarchy_level = 3
//! permissions = { audit_logs = ["read", "export"] }
//!
//! [[assignments]]
//! user_id = "6f1c2a52-93a3-4d7e-9a43-1f0d2b8e7c11"
//! role = "auditor"
//! expires_at = "2031-01-01T00:00:00Z"
//! ```
//!
//! A fixture role with the same name as a built-in role replaces it and keeps
//! the system flag.

use std::path::Path;
use std::sync::Arc;

use opsdesk_authz::clock::Clock;
use opsdesk_authz::types::default_roles;
use opsdesk_authz::{AuthzError, AuthzResult, PermissionMap, Role, UserId, UserRoleAssignment};
use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::store::{InMemoryRoleStore, StoreState};

/// Actor recorded as `assigned_by` when a fixture assignment names none.
pub const FIXTURE_ACTOR: Uuid = Uuid::nil();

/// Parsed fixture file.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_true")]
    pub include_default_roles: bool,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,

    #[serde(default)]
    pub assignments: Vec<AssignmentSpec>,
}

/// A role declared in a fixture.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleSpec {
    pub name: String,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    pub hierarchy_level: u32,

    #[serde(default)]
    pub permissions: PermissionMap,

    #[serde(default)]
    pub system: bool,

    #[serde(default = "default_true")]
    pub active: bool,
}

/// An assignment declared in a fixture, referencing its role by name.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentSpec {
    pub user_id: UserId,

    pub role: String,

    #[serde(default)]
    pub assigned_by: Option<UserId>,

    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

fn default_true() -> bool {
    true
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            include_default_roles: true,
            roles: Vec::new(),
            assignments: Vec::new(),
        }
    }
}

impl Fixture {
    /// Parses a fixture from TOML text.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` if the text is not a valid fixture.
    pub fn from_toml_str(text: &str) -> AuthzResult<Self> {
        toml::from_str(text).map_err(|e| AuthzError::configuration(format!("invalid fixture: {e}")))
    }

    /// Reads and parses a fixture file.
    ///
    /// # Errors
    ///
    /// Returns `AuthzError::Configuration` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> AuthzResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            AuthzError::configuration(format!("cannot read fixture {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Builds a store holding this fixture's roles and assignments.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Two fixture roles share a name
    /// - A role has an empty name or hierarchy level 0
    /// - An assignment references an unknown role
    pub fn into_store(self, clock: Arc<dyn Clock>) -> AuthzResult<InMemoryRoleStore> {
        let now = clock.now();
        let mut state = StoreState::default();

        let mut builtin: Vec<Role> = if self.include_default_roles {
            default_roles()
        } else {
            Vec::new()
        };

        let mut declared = Vec::with_capacity(self.roles.len());
        for spec in self.roles {
            if spec.name.trim().is_empty() || spec.hierarchy_level == 0 {
                return Err(AuthzError::configuration(format!(
                    "fixture role '{}' needs a name and a hierarchy_level >= 1",
                    spec.name
                )));
            }
            let replaced = builtin
                .iter()
                .position(|r| r.name == spec.name)
                .map(|i| builtin.remove(i));

            let mut builder = Role::builder(spec.name.clone(), spec.hierarchy_level)
                .permissions(spec.permissions)
                .system(spec.system || replaced.as_ref().is_some_and(|r| r.is_system_role))
                .active(spec.active);
            if let Some(replaced) = &replaced {
                builder = builder.id(replaced.id);
            }
            if let Some(display_name) = spec.display_name {
                builder = builder.display_name(display_name);
            }
            if let Some(description) = spec.description {
                builder = builder.description(description);
            }
            declared.push(builder.build());
        }

        for role in builtin.into_iter().chain(declared) {
            state.insert_role(role)?;
        }

        for spec in self.assignments {
            let role_id = state
                .role_by_name(&spec.role)
                .map(|r| r.id)
                .ok_or_else(|| {
                    AuthzError::configuration(format!(
                        "assignment for {} references unknown role '{}'",
                        spec.user_id, spec.role
                    ))
                })?;
            let mut assignment = UserRoleAssignment::new(
                spec.user_id,
                role_id,
                spec.assigned_by.unwrap_or(FIXTURE_ACTOR),
                now,
            );
            if let Some(expires_at) = spec.expires_at {
                assignment = assignment.expiring_at(expires_at);
            }
            state.assignments.push(assignment);
        }

        tracing::debug!(
            roles = state.roles.len(),
            assignments = state.assignments.len(),
            "Loaded role fixture"
        );
        Ok(InMemoryRoleStore::from_state(state, clock))
    }
}

//! Role definitions.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::permission::{ActionId, PermissionMap, ResourceId};

/// Name of the built-in super administrator role.
pub const SUPER_ADMIN_ROLE: &str = "super_admin";

/// Name of the built-in administrator role.
pub const ADMIN_ROLE: &str = "admin";

/// Role name reported when a user holds no active assignment.
pub const DEFAULT_ROLE: &str = "user";

// =============================================================================
// Role Type
// =============================================================================

/// A named bundle of resource → action grants plus a hierarchy level.
///
/// `hierarchy_level` orders roles for display and "highest role" selection
/// (1 is the most privileged). It never grants permissions by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier for the role.
    pub id: Uuid,

    /// Unique role name (e.g. "admin", "agent").
    pub name: String,

    /// Human-readable name shown in the console.
    pub display_name: String,

    /// Description of the role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Explicit permission grants.
    #[serde(default)]
    pub permissions: PermissionMap,

    /// Rank used for ordering; lower is more privileged.
    pub hierarchy_level: u32,

    /// System roles cannot be deleted.
    #[serde(default)]
    pub is_system_role: bool,

    /// Inactive roles grant nothing.
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// When the role was created.
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub created_at: OffsetDateTime,

    /// When the role was last updated.
    #[serde(with = "time::serde::rfc3339", default = "OffsetDateTime::now_utc")]
    pub updated_at: OffsetDateTime,
}

fn default_true() -> bool {
    true
}

impl Role {
    /// Creates an active, non-system role with no permissions.
    #[must_use]
    pub fn new(name: impl Into<String>, hierarchy_level: u32) -> Self {
        let name = name.into();
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            display_name: name.clone(),
            name,
            description: None,
            permissions: PermissionMap::new(),
            hierarchy_level,
            is_system_role: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new role builder.
    #[must_use]
    pub fn builder(name: impl Into<String>, hierarchy_level: u32) -> RoleBuilder {
        RoleBuilder {
            role: Role::new(name, hierarchy_level),
        }
    }

    /// Returns `true` if this role grants `action` on `resource`.
    #[must_use]
    pub fn allows(&self, resource: &ResourceId, action: &ActionId) -> bool {
        self.is_active && self.permissions.allows(resource, action)
    }

    /// Returns `true` if this is one of the administrator roles.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.name == ADMIN_ROLE || self.name == SUPER_ADMIN_ROLE
    }
}

// =============================================================================
// Role Builder
// =============================================================================

/// Builder for creating `Role` instances.
pub struct RoleBuilder {
    role: Role,
}

impl RoleBuilder {
    /// Sets the role ID.
    #[must_use]
    pub fn id(mut self, id: Uuid) -> Self {
        self.role.id = id;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.role.display_name = display_name.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.role.description = Some(description.into());
        self
    }

    /// Sets the whole permission map.
    #[must_use]
    pub fn permissions(mut self, permissions: PermissionMap) -> Self {
        self.role.permissions = permissions;
        self
    }

    /// Grants `action` on `resource`.
    #[must_use]
    pub fn grant(mut self, resource: impl Into<ResourceId>, action: impl Into<ActionId>) -> Self {
        self.role.permissions.grant(resource, action);
        self
    }

    /// Marks the role as a system role.
    #[must_use]
    pub fn system(mut self, is_system: bool) -> Self {
        self.role.is_system_role = is_system;
        self
    }

    /// Sets whether the role is active.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.role.is_active = active;
        self
    }

    /// Builds the role.
    #[must_use]
    pub fn build(self) -> Role {
        self.role
    }
}

// =============================================================================
// Default Roles
// =============================================================================

/// Returns the system roles every tenant starts with.
#[must_use]
pub fn default_roles() -> Vec<Role> {
    use ActionId::*;
    use ResourceId::*;

    let everything = |builder: RoleBuilder| {
        [
            Users,
            Roles,
            Documents,
            Agents,
            Conversations,
            Contacts,
            Whatsapp,
            EmailCampaigns,
            Flows,
            Webhooks,
            Analytics,
            Settings,
            AuditLogs,
            Billing,
        ]
        .into_iter()
        .fold(builder, |b, resource| {
            [Read, Create, Update, Delete, ManageAll]
                .into_iter()
                .fold(b, |b, action| b.grant(resource.clone(), action))
        })
    };

    vec![
        everything(Role::builder(SUPER_ADMIN_ROLE, 1))
            .display_name("Super Administrador")
            .description("Full access across every tenant")
            .system(true)
            .build(),
        everything(Role::builder(ADMIN_ROLE, 2))
            .display_name("Administrador")
            .description("Full access within the tenant")
            .system(true)
            .build(),
        Role::builder("manager", 3)
            .display_name("Gerente")
            .description("Manages agents, campaigns and flows")
            .grant(Agents, Read)
            .grant(Agents, Manage)
            .grant(Conversations, Read)
            .grant(Conversations, ManageAll)
            .grant(EmailCampaigns, Read)
            .grant(EmailCampaigns, Create)
            .grant(EmailCampaigns, Send)
            .grant(Flows, Read)
            .grant(Flows, Create)
            .grant(Flows, Execute)
            .grant(Analytics, Read)
            .grant(Analytics, Export)
            .system(true)
            .build(),
        Role::builder("agent", 4)
            .display_name("Agente")
            .description("Handles conversations and contacts")
            .grant(Conversations, Read)
            .grant(Conversations, Update)
            .grant(Contacts, Read)
            .grant(Contacts, Create)
            .grant(Whatsapp, Send)
            .grant(Documents, Read)
            .system(true)
            .build(),
        Role::builder(DEFAULT_ROLE, 5)
            .display_name("Usuário")
            .description("Read-only access to shared documents")
            .grant(Documents, Read)
            .system(true)
            .build(),
    ]
}

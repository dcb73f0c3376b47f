//! Resource and action identifiers and the merged permission map.
//!
//! Known console resources and actions are closed enumerations; names the
//! engine does not recognize survive as [`ResourceId::Other`] /
//! [`ActionId::Other`] so that a store can grant new resources before this
//! crate learns about them.

use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $( $(#[$vmeta])* $variant, )+
            /// A name outside the known set, carried through verbatim.
            Other(String),
        }

        impl $name {
            /// Returns the wire name.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $text, )+
                    Self::Other(name) => name.as_str(),
                }
            }

            /// Returns `true` if the name is not one of the known variants.
            #[must_use]
            pub fn is_unknown(&self) -> bool {
                matches!(self, Self::Other(_))
            }
        }

        impl FromStr for $name {
            type Err = Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(match s {
                    $( $text => Self::$variant, )+
                    other => Self::Other(other.to_string()),
                })
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                match s.parse() {
                    Ok(id) => id,
                    Err(never) => match never {},
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::from(s.as_str())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.as_str().to_string()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    /// A protected category of console data or operations.
    pub enum ResourceId {
        /// Console user accounts.
        Users => "users",
        /// Role definitions and assignments.
        Roles => "roles",
        /// Knowledge-base documents.
        Documents => "documents",
        /// Chat agents.
        Agents => "agents",
        /// Chat conversations.
        Conversations => "conversations",
        /// Contact lists.
        Contacts => "contacts",
        /// WhatsApp instances and messages.
        Whatsapp => "whatsapp",
        /// Email marketing campaigns.
        EmailCampaigns => "email_campaigns",
        /// Automation flows.
        Flows => "flows",
        /// Outbound webhooks.
        Webhooks => "webhooks",
        /// Dashboards and reports.
        Analytics => "analytics",
        /// Tenant settings.
        Settings => "settings",
        /// Security audit trail.
        AuditLogs => "audit_logs",
        /// Plans and invoices.
        Billing => "billing",
    }
}

string_enum! {
    /// An operation on a resource.
    pub enum ActionId {
        /// View records.
        Read => "read",
        /// Create records.
        Create => "create",
        /// Modify records.
        Update => "update",
        /// Remove records.
        Delete => "delete",
        /// Manage records owned by the caller's team.
        Manage => "manage",
        /// Manage every record of the tenant.
        ManageAll => "manage_all",
        /// Export records.
        Export => "export",
        /// Bulk import records.
        Import => "import",
        /// Send messages or campaigns.
        Send => "send",
        /// Run flows or jobs.
        Execute => "execute",
    }
}

// =============================================================================
// Permission Map
// =============================================================================

/// Resource → allowed actions mapping.
///
/// Grants are explicit: an action is allowed only if it is listed for the
/// resource. Merging two maps yields the union of their grants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionMap(BTreeMap<ResourceId, BTreeSet<ActionId>>);

impl PermissionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `action` on `resource`.
    pub fn grant(&mut self, resource: impl Into<ResourceId>, action: impl Into<ActionId>) {
        self.0
            .entry(resource.into())
            .or_default()
            .insert(action.into());
    }

    /// Grants `action` on `resource`, builder style.
    #[must_use]
    pub fn with(mut self, resource: impl Into<ResourceId>, action: impl Into<ActionId>) -> Self {
        self.grant(resource, action);
        self
    }

    /// Returns `true` if `action` is granted on `resource`.
    #[must_use]
    pub fn allows(&self, resource: &ResourceId, action: &ActionId) -> bool {
        self.0
            .get(resource)
            .is_some_and(|actions| actions.contains(action))
    }

    /// Adds every grant of `other` to this map.
    pub fn merge(&mut self, other: &PermissionMap) {
        for (resource, actions) in &other.0 {
            self.0
                .entry(resource.clone())
                .or_default()
                .extend(actions.iter().cloned());
        }
    }

    /// Returns the actions granted on `resource`.
    #[must_use]
    pub fn actions(&self, resource: &ResourceId) -> Option<&BTreeSet<ActionId>> {
        self.0.get(resource)
    }

    /// Iterates over resources and their granted actions.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &BTreeSet<ActionId>)> {
        self.0.iter()
    }

    /// Returns `true` if nothing is granted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeSet::is_empty)
    }
}

impl<R, A> FromIterator<(R, A)> for PermissionMap
where
    R: Into<ResourceId>,
    A: Into<ActionId>,
{
    fn from_iter<I: IntoIterator<Item = (R, A)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (resource, action) in iter {
            map.grant(resource, action);
        }
        map
    }
}

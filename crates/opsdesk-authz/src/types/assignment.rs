//! User ↔ role assignments.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Identity of a console user.
pub type UserId = Uuid;

/// Links a user to a role.
///
/// A user may hold several assignments at once; only those that are active
/// and not yet expired contribute to the user's effective permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRoleAssignment {
    /// Unique identifier for the assignment.
    pub id: Uuid,

    /// The user holding the role.
    pub user_id: UserId,

    /// The assigned role.
    pub role_id: Uuid,

    /// Actor that created the assignment.
    pub assigned_by: UserId,

    /// When the assignment was created.
    #[serde(with = "time::serde::rfc3339")]
    pub assigned_at: OffsetDateTime,

    /// Optional expiry; the assignment stops counting at this instant.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,

    /// Revoked assignments are kept with `is_active = false`.
    pub is_active: bool,
}

impl UserRoleAssignment {
    /// Creates an active assignment without expiry.
    #[must_use]
    pub fn new(user_id: UserId, role_id: Uuid, assigned_by: UserId, at: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            role_id,
            assigned_by,
            assigned_at: at,
            expires_at: None,
            is_active: true,
        }
    }

    /// Sets the expiry instant.
    #[must_use]
    pub fn expiring_at(mut self, expires_at: OffsetDateTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns `true` if the assignment is active and unexpired at `now`.
    #[must_use]
    pub fn is_effective(&self, now: OffsetDateTime) -> bool {
        self.is_active && self.expires_at.is_none_or(|exp| exp > now)
    }
}

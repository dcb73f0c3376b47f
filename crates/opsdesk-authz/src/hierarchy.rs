//! Role hierarchy resolution.
//!
//! Coarse questions answered from already-resolved data, without touching the
//! store. Hierarchy levels only order roles; permissions always come from the
//! explicit grants of each role.

use crate::types::{ADMIN_ROLE, AuthorizationContext, Role, SUPER_ADMIN_ROLE};

/// Role names that qualify for the admin bypass.
pub const ADMIN_ROLES: &[&str] = &[SUPER_ADMIN_ROLE, ADMIN_ROLE];

/// Returns `true` if the user holds `admin` or `super_admin`.
///
/// Looks at every active role, not only the highest one.
#[must_use]
pub fn is_admin(context: &AuthorizationContext) -> bool {
    ADMIN_ROLES.iter().any(|role| context.has_role(role))
}

/// Returns `true` if the user holds `super_admin`.
#[must_use]
pub fn is_super_admin(context: &AuthorizationContext) -> bool {
    context.has_role(SUPER_ADMIN_ROLE)
}

/// Returns the most privileged role (lowest level; ties go to the lowest id).
#[must_use]
pub fn highest_role(roles: &[Role]) -> Option<&Role> {
    roles
        .iter()
        .min_by(|a, b| (a.hierarchy_level, a.id).cmp(&(b.hierarchy_level, b.id)))
}

/// Sorts roles from most to least privileged, using the same tie-break as
/// [`highest_role`].
pub fn sort_by_hierarchy(roles: &mut [Role]) {
    roles.sort_by(|a, b| (a.hierarchy_level, a.id).cmp(&(b.hierarchy_level, b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PermissionMap;
    use uuid::Uuid;

    fn context_with(roles: &[&str]) -> AuthorizationContext {
        AuthorizationContext {
            user_id: Uuid::new_v4(),
            user_role: roles.first().copied().unwrap_or("user").to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            permissions: PermissionMap::new(),
            ip_address: None,
            user_agent: None,
        }
    }

    #[test]
    fn test_is_admin_uses_full_role_set() {
        // Highest role is "agent" in this ordering, but "admin" is also held.
        let ctx = context_with(&["agent", "admin"]);
        assert!(is_admin(&ctx));
        assert!(!is_super_admin(&ctx));

        assert!(is_admin(&context_with(&["super_admin"])));
        assert!(is_super_admin(&context_with(&["super_admin"])));
        assert!(!is_admin(&context_with(&["manager", "agent"])));
        assert!(!is_admin(&context_with(&[])));
    }

    #[test]
    fn test_highest_role_ignores_input_order() {
        let a = Role::new("agent", 4);
        let m = Role::new("admin", 1);
        let g = Role::new("manager", 2);

        for roles in [
            vec![a.clone(), m.clone(), g.clone()],
            vec![g.clone(), a.clone(), m.clone()],
            vec![m.clone(), g.clone(), a.clone()],
        ] {
            assert_eq!(highest_role(&roles).map(|r| r.name.as_str()), Some("admin"));
        }
    }

    #[test]
    fn test_highest_role_tie_break_is_deterministic() {
        let low = Role::builder("first", 2)
            .id(Uuid::from_u128(1))
            .build();
        let high = Role::builder("second", 2)
            .id(Uuid::from_u128(2))
            .build();

        assert_eq!(
            highest_role(&[high.clone(), low.clone()]).map(|r| r.id),
            Some(low.id)
        );
        assert_eq!(highest_role(&[low.clone(), high]).map(|r| r.id), Some(low.id));
    }

    #[test]
    fn test_highest_role_empty() {
        assert!(highest_role(&[]).is_none());
    }

    #[test]
    fn test_sort_by_hierarchy() {
        let mut roles = vec![Role::new("user", 5), Role::new("super_admin", 1), Role::new("agent", 4)];
        sort_by_hierarchy(&mut roles);
        let names: Vec<_> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["super_admin", "agent", "user"]);
    }
}

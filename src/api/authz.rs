//! Role-based authorization checks.
//!
//! Roles are strictly ordered (Staff < Admin < Super Admin) and every check
//! is monotonic: anything permitted at a level is permitted at every higher
//! level. Two exceptions sit on top of the ladder: acting on a Super Admin
//! account requires being a Super Admin, and no account may delete itself.

use crate::api::auth::Identity;
use crate::api::error::ApiError;
use crate::db::Role;

/// Require the actor to hold `required` or a higher role.
pub fn require_role(identity: &Identity, required: Role) -> Result<(), ApiError> {
    if identity.role.satisfies(required) {
        return Ok(());
    }
    tracing::warn!(
        username = %identity.username,
        role = %identity.role.as_str(),
        required = %required.as_str(),
        "Access denied"
    );
    Err(ApiError::forbidden(
        "You do not have permission to perform this action.",
    ))
}

/// May `actor` assign `target` as a role on a new or existing account?
/// Anonymous callers (self-registration) are confined to Staff.
pub fn check_role_assignment(actor: Option<&Identity>, target: Role) -> Result<(), ApiError> {
    match actor {
        None => {
            if target != Role::Staff {
                return Err(ApiError::forbidden(
                    "You do not have permission to assign this role.",
                ));
            }
        }
        Some(actor) => {
            if target == Role::SuperAdmin && actor.role != Role::SuperAdmin {
                return Err(ApiError::forbidden(
                    "Only a Super Admin may assign the Super Admin role.",
                ));
            }
            if target == Role::Admin && !actor.role.satisfies(Role::Admin) {
                return Err(ApiError::forbidden(
                    "You do not have permission to assign this role.",
                ));
            }
        }
    }
    Ok(())
}

/// May `actor` modify or delete the account holding `target_role`?
/// Super Admin accounts are off-limits to everyone below Super Admin.
pub fn check_target_user(actor: &Identity, target_role: Role) -> Result<(), ApiError> {
    if target_role == Role::SuperAdmin && actor.role != Role::SuperAdmin {
        return Err(ApiError::forbidden(
            "Only a Super Admin may manage a Super Admin account.",
        ));
    }
    Ok(())
}

/// Self-deletion is denied for every role, Super Admin included.
pub fn deny_self_delete(actor: &Identity, target_user_id: &str) -> Result<(), ApiError> {
    if actor.user_id == target_user_id {
        return Err(ApiError::forbidden("You cannot delete your own account."));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(role: Role) -> Identity {
        Identity {
            user_id: "u1".into(),
            username: "tester".into(),
            role,
        }
    }

    #[test]
    fn role_checks_are_monotonic() {
        let ladder = [Role::Staff, Role::Admin, Role::SuperAdmin];
        for (i, actor) in ladder.iter().enumerate() {
            for (j, required) in ladder.iter().enumerate() {
                let ok = require_role(&identity(*actor), *required).is_ok();
                assert_eq!(ok, i >= j, "{:?} vs {:?}", actor, required);
            }
        }
    }

    #[test]
    fn anonymous_assignment_is_staff_only() {
        assert!(check_role_assignment(None, Role::Staff).is_ok());
        assert!(check_role_assignment(None, Role::Admin).is_err());
        assert!(check_role_assignment(None, Role::SuperAdmin).is_err());
    }

    #[test]
    fn only_super_admin_assigns_super_admin() {
        let admin = identity(Role::Admin);
        let superadmin = identity(Role::SuperAdmin);
        assert!(check_role_assignment(Some(&admin), Role::Admin).is_ok());
        assert!(check_role_assignment(Some(&admin), Role::SuperAdmin).is_err());
        assert!(check_role_assignment(Some(&superadmin), Role::SuperAdmin).is_ok());
        // Staff cannot mint Admin
        let staff = identity(Role::Staff);
        assert!(check_role_assignment(Some(&staff), Role::Admin).is_err());
        assert!(check_role_assignment(Some(&staff), Role::Staff).is_ok());
    }

    #[test]
    fn super_admin_target_requires_super_admin_actor() {
        assert!(check_target_user(&identity(Role::Admin), Role::SuperAdmin).is_err());
        assert!(check_target_user(&identity(Role::SuperAdmin), Role::SuperAdmin).is_ok());
        assert!(check_target_user(&identity(Role::Admin), Role::Staff).is_ok());
    }

    #[test]
    fn self_delete_is_always_denied() {
        let actor = identity(Role::SuperAdmin);
        assert!(deny_self_delete(&actor, "u1").is_err());
        assert!(deny_self_delete(&actor, "u2").is_ok());
    }
}

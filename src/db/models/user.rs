//! User account and session models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Role hierarchy for authorization. Variant order matters: the derived
/// `Ord` puts `Staff` below `Admin` below `SuperAdmin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    Staff,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Staff => "Staff",
            Role::Admin => "Admin",
            Role::SuperAdmin => "Super Admin",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "Staff" => Some(Role::Staff),
            "Admin" => Some(Role::Admin),
            "Super Admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    /// True when this role meets a requirement of `required`. A role always
    /// satisfies itself and everything junior to it.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String,
    pub is_active: i64,
    pub login_attempts: i64,
    pub locked_until: Option<String>,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::Staff)
    }

    pub fn is_active(&self) -> bool {
        self.is_active != 0
    }
}

/// User shape returned by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub user_id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
    pub is_active: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
            is_active: user.is_active != 0,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

/// Server-side session row. Holds an identity snapshot (user id, username,
/// role) plus the per-session CSRF token; only a digest of the bearer token
/// is stored.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub token_hash: String,
    pub csrf_token: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub csrf_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_order_is_staff_admin_superadmin() {
        assert!(Role::Staff < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
    }

    #[test]
    fn role_round_trips_through_text() {
        for role in [Role::Staff, Role::Admin, Role::SuperAdmin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("superadmin"), None);
    }

    #[test]
    fn satisfies_is_monotonic() {
        for required in [Role::Staff, Role::Admin, Role::SuperAdmin] {
            // Anything Staff may do, Admin and Super Admin may do too.
            if Role::Staff.satisfies(required) {
                assert!(Role::Admin.satisfies(required));
                assert!(Role::SuperAdmin.satisfies(required));
            }
            if Role::Admin.satisfies(required) {
                assert!(Role::SuperAdmin.satisfies(required));
            }
        }
        assert!(!Role::Staff.satisfies(Role::Admin));
        assert!(!Role::Admin.satisfies(Role::SuperAdmin));
        assert!(Role::SuperAdmin.satisfies(Role::Staff));
    }
}

//! Authentication: password hashing, login throttling with account lockout,
//! server-side sessions, CSRF verification and the per-request identity
//! extractors.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, State},
    http::{request::Parts, HeaderMap},
    Json,
};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::api::audit::{extract_client_ip, record};
use crate::api::authz;
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::config::AuthConfig;
use crate::db::{
    actions, tables, LoginRequest, LoginResponse, RegisterRequest, Role, Session, User,
    UserResponse,
};
use crate::{AppState, DbPool};
use serde::Serialize;

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of a credential check. The login handler maps each variant to a
/// fixed user-facing message; internal detail stays server-side.
#[derive(Debug)]
pub enum AuthOutcome {
    Success(User),
    /// No such username. Surfaced identically to a wrong password so
    /// usernames cannot be enumerated.
    UnknownUser,
    WrongPassword {
        remaining: i64,
    },
    /// This attempt crossed the threshold and set the lock.
    JustLocked,
    /// The account was already locked; the attempt is not counted.
    Locked,
    Deactivated,
}

/// Verify credentials and maintain the failed-attempt counter.
///
/// The counter update is a single `UPDATE ... RETURNING` statement, so
/// concurrent failures against the same account serialize inside the
/// database and never under-count toward the lockout threshold.
pub async fn authenticate(
    db: &DbPool,
    policy: &AuthConfig,
    username: &str,
    password: &str,
) -> Result<AuthOutcome, sqlx::Error> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(db)
        .await?;

    let Some(user) = user else {
        return Ok(AuthOutcome::UnknownUser);
    };

    if let Some(locked_until) = &user.locked_until {
        if let Ok(until) = chrono::DateTime::parse_from_rfc3339(locked_until) {
            if until > chrono::Utc::now() {
                return Ok(AuthOutcome::Locked);
            }
        }
    }

    if !user.is_active() {
        return Ok(AuthOutcome::Deactivated);
    }

    if verify_password(password, &user.password_hash) {
        let now = chrono::Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE users SET last_login = ?, login_attempts = 0, locked_until = NULL WHERE user_id = ?",
        )
        .bind(&now)
        .bind(&user.user_id)
        .execute(db)
        .await?;

        return Ok(AuthOutcome::Success(user));
    }

    // Failed password: one atomic increment; the same statement sets the
    // lock when the new count reaches the threshold.
    let lock_until = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::minutes(policy.lockout_minutes))
        .unwrap_or_else(chrono::Utc::now)
        .to_rfc3339();

    let attempts: i64 = sqlx::query_scalar(
        r#"
        UPDATE users
        SET login_attempts = login_attempts + 1,
            locked_until = CASE WHEN login_attempts + 1 >= ? THEN ? ELSE locked_until END
        WHERE user_id = ?
        RETURNING login_attempts
        "#,
    )
    .bind(policy.max_login_attempts)
    .bind(&lock_until)
    .bind(&user.user_id)
    .fetch_one(db)
    .await?;

    if attempts >= policy.max_login_attempts {
        tracing::warn!(username = %user.username, attempts, "Account locked after repeated failures");
        Ok(AuthOutcome::JustLocked)
    } else {
        Ok(AuthOutcome::WrongPassword {
            remaining: policy.max_login_attempts - attempts,
        })
    }
}

/// Create a session row for an authenticated user. Returns the opaque
/// bearer token (stored only as a digest) and the CSRF token.
pub async fn start_session(
    db: &DbPool,
    policy: &AuthConfig,
    user: &User,
) -> Result<(String, String), sqlx::Error> {
    let token = generate_token();
    let token_hash = hash_token(&token);
    let csrf_token = generate_token();

    let now = chrono::Utc::now();
    let expires_at = now
        .checked_add_signed(chrono::Duration::hours(policy.session_ttl_hours))
        .unwrap_or(now)
        .to_rfc3339();

    sqlx::query(
        r#"
        INSERT INTO sessions (id, user_id, username, role, token_hash, csrf_token, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user.user_id)
    .bind(&user.username)
    .bind(&user.role)
    .bind(&token_hash)
    .bind(&csrf_token)
    .bind(&expires_at)
    .bind(now.to_rfc3339())
    .execute(db)
    .await?;

    Ok((token, csrf_token))
}

/// Look up a live session by bearer token. Expired rows are deleted on
/// sight so the identifier cannot be replayed.
pub async fn resolve_session(db: &DbPool, token: &str) -> Result<Option<Session>, sqlx::Error> {
    let token_hash = hash_token(token);
    let session: Option<Session> = sqlx::query_as("SELECT * FROM sessions WHERE token_hash = ?")
        .bind(&token_hash)
        .fetch_optional(db)
        .await?;

    let Some(session) = session else {
        return Ok(None);
    };

    let expired = chrono::DateTime::parse_from_rfc3339(&session.expires_at)
        .map(|exp| exp <= chrono::Utc::now())
        .unwrap_or(true);

    if expired {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(&session.id)
            .execute(db)
            .await?;
        return Ok(None);
    }

    Ok(Some(session))
}

/// Destroy the session bound to `token`, if any. Returns the identity it
/// carried so the caller can audit the logout.
pub async fn end_session(db: &DbPool, token: &str) -> Result<Option<Session>, sqlx::Error> {
    let Some(session) = resolve_session(db, token).await? else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(&session.id)
        .execute(db)
        .await?;

    Ok(Some(session))
}

/// Authenticated identity threaded through every protected handler.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl From<&Session> for Identity {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id.clone(),
            username: session.username.clone(),
            role: Role::parse(&session.role).unwrap_or(Role::Staff),
        }
    }
}

fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required."))?;

        let session = resolve_session(&state.db, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Authentication required."))?;

        Ok(Identity::from(&session))
    }
}

/// Constant-time CSRF token comparison; length must match first
fn csrf_matches(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();
    expected.len() == provided.len() && bool::from(expected.ct_eq(provided))
}

/// Extractor for state-changing requests: resolves the session and verifies
/// the `X-CSRF-Token` header before the handler body runs. On mismatch the
/// request is rejected with 403 and no collaborator is touched.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub identity: Identity,
    pub ip: Option<String>,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Mutation {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Authentication required."))?;

        let session = resolve_session(&state.db, &token)
            .await?
            .ok_or_else(|| ApiError::unauthorized("Authentication required."))?;

        let provided = parts
            .headers
            .get("X-CSRF-Token")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| ApiError::forbidden("Invalid request token."))?;

        if !csrf_matches(&session.csrf_token, provided) {
            return Err(ApiError::forbidden("Invalid request token."));
        }

        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        let ip = extract_client_ip(&parts.headers, peer.as_ref());

        Ok(Mutation {
            identity: Identity::from(&session),
            ip,
        })
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(ApiError::bad_request("Please enter username and password."));
    }

    let policy = &state.config.auth;
    let outcome = authenticate(&state.db, policy, &request.username, &request.password).await?;

    let user = match outcome {
        AuthOutcome::Success(user) => user,
        AuthOutcome::UnknownUser => {
            return Err(ApiError::unauthorized("Invalid username or password."));
        }
        AuthOutcome::WrongPassword { remaining } => {
            return Err(ApiError::unauthorized(format!(
                "Invalid credentials. {} attempt(s) remaining.",
                remaining
            )));
        }
        AuthOutcome::JustLocked => {
            return Err(ApiError::unauthorized(format!(
                "Account locked for {} minutes after {} failed attempts.",
                policy.lockout_minutes, policy.max_login_attempts
            )));
        }
        AuthOutcome::Locked => {
            return Err(ApiError::unauthorized("Account locked. Try again later."));
        }
        AuthOutcome::Deactivated => {
            return Err(ApiError::forbidden(
                "Account deactivated. Contact administrator.",
            ));
        }
    };

    let (token, csrf_token) = start_session(&state.db, policy, &user).await?;

    let ip = extract_client_ip(&headers, peer.as_ref().map(|ci| &ci.0));
    record(
        &state.db,
        &user.user_id,
        "User logged in",
        actions::LOGIN,
        None,
        None,
        ip.as_deref(),
    )
    .await;

    tracing::info!(username = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        token,
        csrf_token,
        user: UserResponse::from(user),
    }))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// POST /api/auth/logout
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(token) = extract_token(&headers) else {
        return Err(ApiError::unauthorized("Authentication required."));
    };

    if let Some(session) = end_session(&state.db, &token).await? {
        let ip = extract_client_ip(&headers, peer.as_ref().map(|ci| &ci.0));
        record(
            &state.db,
            &session.user_id,
            "User logged out",
            actions::LOGOUT,
            None,
            None,
            ip.as_deref(),
        )
        .await;
        tracing::info!(username = %session.username, "User logged out");
    }

    Ok(Json(MessageResponse {
        message: "You have been logged out successfully.".to_string(),
    }))
}

/// Validate and insert a new user row. Shared by self-registration and the
/// user-management endpoint.
pub async fn create_user(
    db: &DbPool,
    actor: Option<&Identity>,
    request: &RegisterRequest,
) -> Result<User, ApiError> {
    let full_name = format!(
        "{} {}",
        request.first_name.trim(),
        request.last_name.trim()
    );

    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_username(&request.username) {
        errors.add("username", e);
    }
    if let Err(e) = validation::validate_email(&request.email) {
        errors.add("email", e);
    }
    if let Err(e) = validation::validate_password(&request.password) {
        errors.add("password", e);
    }
    if request.password != request.password_confirm {
        errors.add("password_confirm", "Passwords do not match.");
    }
    if let Err(e) = validation::validate_full_name(&full_name) {
        errors.add("first_name", e);
    }
    errors.finish()?;

    // Anonymous self-registration is always Staff; elevation requires an
    // Admin actor, and Super Admin targets a Super Admin actor.
    let requested = request.role.as_deref().unwrap_or("Staff");
    let role = Role::parse(requested)
        .ok_or_else(|| ApiError::validation_field("role", "Invalid role selected."))?;
    authz::check_role_assignment(actor, role)?;

    let existing: Option<(String,)> =
        sqlx::query_as("SELECT user_id FROM users WHERE username = ?")
            .bind(&request.username)
            .fetch_optional(db)
            .await?;
    if existing.is_some() {
        return Err(ApiError::validation_field(
            "username",
            "Username already exists. Please choose a different one.",
        ));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT user_id FROM users WHERE email = ?")
        .bind(&request.email)
        .fetch_optional(db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::validation_field(
            "email",
            "Email already registered. Please use a different one.",
        ));
    }

    let password_hash = hash_password(&request.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    let user = User {
        user_id: uuid::Uuid::new_v4().to_string(),
        username: request.username.clone(),
        email: request.email.clone(),
        password_hash,
        full_name,
        role: role.as_str().to_string(),
        is_active: 1,
        login_attempts: 0,
        locked_until: None,
        last_login: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };

    sqlx::query(
        r#"
        INSERT INTO users (user_id, username, email, password_hash, full_name, role, is_active, login_attempts, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?)
        "#,
    )
    .bind(&user.user_id)
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.full_name)
    .bind(&user.role)
    .bind(&user.created_at)
    .execute(db)
    .await?;

    Ok(user)
}

/// POST /api/auth/register
///
/// Anonymous submissions create a Staff account; an authenticated
/// Admin/Super Admin may assign a higher role.
pub async fn register(
    State(state): State<Arc<AppState>>,
    actor: Option<Identity>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = create_user(&state.db, actor.as_ref(), &request).await?;

    if let Some(actor) = &actor {
        let ip = extract_client_ip(&headers, peer.as_ref().map(|ci| &ci.0));
        record(
            &state.db,
            &actor.user_id,
            &format!("Registered new user: {} ({})", user.username, user.role),
            actions::CREATE,
            Some(tables::USERS),
            Some(&user.user_id),
            ip.as_deref(),
        )
        .await;
    }

    tracing::info!(username = %user.username, role = %user.role, "User registered");

    Ok(Json(UserResponse::from(user)))
}

/// Seed the first Super Admin account when the user table is empty.
///
/// When no admin password is configured, a random one is generated and
/// written to the startup log in plaintext, once. This is the only place a
/// credential ever reaches the log; operators should set `admin_password`
/// or rotate the account after first login.
pub async fn ensure_admin_user(db: &DbPool, config: &AuthConfig) -> anyhow::Result<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    if count > 0 {
        return Ok(());
    }

    let password = match &config.admin_password {
        Some(p) => p.clone(),
        None => {
            let generated = generate_token();
            tracing::info!("Generated admin password: {}", generated);
            generated
        }
    };

    let password_hash = hash_password(&password)
        .map_err(|e| anyhow::anyhow!("Failed to hash admin password: {}", e))?;

    sqlx::query(
        r#"
        INSERT INTO users (user_id, username, email, password_hash, full_name, role, is_active, login_attempts, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&config.admin_username)
    .bind(&config.admin_email)
    .bind(&password_hash)
    .bind("System Administrator")
    .bind(Role::SuperAdmin.as_str())
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(db)
    .await?;

    tracing::info!(username = %config.admin_username, "Seeded initial Super Admin account");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn seed_user(db: &DbPool, username: &str, password: &str, role: Role) -> String {
        let user_id = uuid::Uuid::new_v4().to_string();
        let hash = hash_password(password).unwrap();
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, email, password_hash, full_name, role, is_active, login_attempts, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, 0, ?)
            "#,
        )
        .bind(&user_id)
        .bind(username)
        .bind(format!("{}@x.com", username))
        .bind(&hash)
        .bind("Test User")
        .bind(role.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(db)
        .await
        .unwrap();
        user_id
    }

    async fn attempts_of(db: &DbPool, username: &str) -> i64 {
        sqlx::query_scalar("SELECT login_attempts FROM users WHERE username = ?")
            .bind(username)
            .fetch_one(db)
            .await
            .unwrap()
    }

    fn policy() -> AuthConfig {
        AuthConfig::default()
    }

    #[test]
    fn csrf_comparison_requires_exact_match() {
        assert!(csrf_matches("abc123", "abc123"));
        assert!(!csrf_matches("abc123", "abc124"));
        assert!(!csrf_matches("abc123", "abc12"));
        assert!(!csrf_matches("abc123", ""));
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[tokio::test]
    async fn unknown_user_is_generic() {
        let db = test_pool().await;
        let outcome = authenticate(&db, &policy(), "nobody", "whatever")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::UnknownUser));
    }

    #[tokio::test]
    async fn lockout_sequence() {
        let db = test_pool().await;
        seed_user(&db, "alice", "correct-password", Role::Staff).await;

        // Four failures count down the remaining attempts
        for expected_remaining in [4, 3, 2, 1] {
            let outcome = authenticate(&db, &policy(), "alice", "wrong")
                .await
                .unwrap();
            match outcome {
                AuthOutcome::WrongPassword { remaining } => {
                    assert_eq!(remaining, expected_remaining)
                }
                other => panic!("expected WrongPassword, got {:?}", other),
            }
        }

        // The fifth failure locks the account
        let outcome = authenticate(&db, &policy(), "alice", "wrong")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::JustLocked));

        let locked_until: Option<String> =
            sqlx::query_scalar("SELECT locked_until FROM users WHERE username = 'alice'")
                .fetch_one(&db)
                .await
                .unwrap();
        let until = chrono::DateTime::parse_from_rfc3339(&locked_until.unwrap()).unwrap();
        assert!(until > chrono::Utc::now());

        // While locked, even the correct password is refused and the
        // counter does not move
        let outcome = authenticate(&db, &policy(), "alice", "correct-password")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Locked));
        assert_eq!(attempts_of(&db, "alice").await, 5);
    }

    #[tokio::test]
    async fn successful_login_resets_counter_and_lock() {
        let db = test_pool().await;
        let user_id = seed_user(&db, "bob", "hunter2-hunter2", Role::Staff).await;

        // Simulate an expired lock with a stale counter
        let past = (chrono::Utc::now() - chrono::Duration::minutes(30)).to_rfc3339();
        sqlx::query("UPDATE users SET login_attempts = 4, locked_until = ? WHERE user_id = ?")
            .bind(&past)
            .bind(&user_id)
            .execute(&db)
            .await
            .unwrap();

        let outcome = authenticate(&db, &policy(), "bob", "hunter2-hunter2")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Success(_)));

        let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(user.login_attempts, 0);
        assert!(user.locked_until.is_none());
        assert!(user.last_login.is_some());
    }

    #[tokio::test]
    async fn deactivated_account_is_refused() {
        let db = test_pool().await;
        let user_id = seed_user(&db, "carol", "password123", Role::Staff).await;
        sqlx::query("UPDATE users SET is_active = 0 WHERE user_id = ?")
            .bind(&user_id)
            .execute(&db)
            .await
            .unwrap();

        let outcome = authenticate(&db, &policy(), "carol", "password123")
            .await
            .unwrap();
        assert!(matches!(outcome, AuthOutcome::Deactivated));
        // No attempt consumed
        assert_eq!(attempts_of(&db, "carol").await, 0);
    }

    #[tokio::test]
    async fn concurrent_failures_never_under_count() {
        use sqlx::sqlite::SqlitePoolOptions;

        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite:{}?mode=rwc", db_path.display()))
            .await
            .unwrap();
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&db)
            .await
            .unwrap();
        crate::db::run_migrations(&db).await.unwrap();

        seed_user(&db, "dave", "real-password", Role::Staff).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                authenticate(&db, &AuthConfig::default(), "dave", "wrong")
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Four concurrent failures count exactly four
        assert_eq!(attempts_of(&db, "dave").await, 4);
    }

    #[tokio::test]
    async fn session_round_trip_and_logout() {
        let db = test_pool().await;
        let user_id = seed_user(&db, "erin", "password-123", Role::Admin).await;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&db)
            .await
            .unwrap();

        let (token, csrf) = start_session(&db, &policy(), &user).await.unwrap();
        assert_ne!(token, csrf);

        let session = resolve_session(&db, &token).await.unwrap().unwrap();
        assert_eq!(session.user_id, user_id);
        assert_eq!(session.username, "erin");
        assert_eq!(Role::parse(&session.role), Some(Role::Admin));

        // A bogus token resolves to nothing
        assert!(resolve_session(&db, "deadbeef").await.unwrap().is_none());

        let ended = end_session(&db, &token).await.unwrap();
        assert!(ended.is_some());
        // Destroyed session cannot be replayed
        assert!(resolve_session(&db, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_destroyed() {
        let db = test_pool().await;
        let user_id = seed_user(&db, "frank", "password-123", Role::Staff).await;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&db)
            .await
            .unwrap();

        let (token, _) = start_session(&db, &policy(), &user).await.unwrap();
        let past = (chrono::Utc::now() - chrono::Duration::hours(1)).to_rfc3339();
        sqlx::query("UPDATE sessions SET expires_at = ?")
            .bind(&past)
            .execute(&db)
            .await
            .unwrap();

        assert!(resolve_session(&db, &token).await.unwrap().is_none());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    async fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(
            crate::config::Config::default(),
            test_pool().await,
        ))
    }

    fn write_request(token: &str, csrf: Option<&str>) -> Parts {
        let mut builder = axum::http::Request::builder()
            .uri("/api/residents")
            .header("Authorization", format!("Bearer {}", token));
        if let Some(csrf) = csrf {
            builder = builder.header("X-CSRF-Token", csrf);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn csrf_mismatch_blocks_before_any_write() {
        let state = test_state().await;
        let user_id = seed_user(&state.db, "grace", "password-123", Role::Admin).await;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        let (token, csrf) = start_session(&state.db, &policy(), &user).await.unwrap();

        // Missing header
        let mut parts = write_request(&token, None);
        let err = Mutation::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::api::error::ErrorCode::Forbidden);

        // Wrong token, live session
        let mut parts = write_request(&token, Some("not-the-token"));
        let err = Mutation::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert_eq!(err.code(), crate::api::error::ErrorCode::Forbidden);

        // The rejection happened before any handler ran: no domain rows,
        // no audit entries
        for table in ["residents", "activity_log"] {
            let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&state.db)
                .await
                .unwrap();
            assert_eq!(count, 0, "{} not empty", table);
        }

        // Matching token passes and carries the identity
        let mut parts = write_request(&token, Some(&csrf));
        let mutation = Mutation::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(mutation.identity.username, "grace");
        assert_eq!(mutation.identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn mutation_extractor_picks_up_the_socket_peer() {
        let state = test_state().await;
        let user_id = seed_user(&state.db, "henry", "password-123", Role::Staff).await;
        let user: User = sqlx::query_as("SELECT * FROM users WHERE user_id = ?")
            .bind(&user_id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        let (token, csrf) = start_session(&state.db, &policy(), &user).await.unwrap();

        let mut parts = write_request(&token, Some(&csrf));
        let addr: SocketAddr = "192.0.2.4:5000".parse().unwrap();
        parts.extensions.insert(ConnectInfo(addr));

        let mutation = Mutation::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert_eq!(mutation.ip.as_deref(), Some("192.0.2.4"));
    }

    #[tokio::test]
    async fn registration_enforces_uniqueness_and_length() {
        let db = test_pool().await;
        seed_user(&db, "bob", "password-123", Role::Staff).await;

        // Short password: no row inserted
        let request = RegisterRequest {
            first_name: "Bob".into(),
            last_name: "Cruz".into(),
            username: "bob2".into(),
            email: "bob2@x.com".into(),
            password: "short".into(),
            password_confirm: "short".into(),
            role: None,
        };
        assert!(create_user(&db, None, &request).await.is_err());
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);

        // Duplicate username
        let request = RegisterRequest {
            first_name: "Bob".into(),
            last_name: "Cruz".into(),
            username: "bob".into(),
            email: "unique@x.com".into(),
            password: "long-enough".into(),
            password_confirm: "long-enough".into(),
            role: None,
        };
        let err = create_user(&db, None, &request).await.unwrap_err();
        assert!(err.message().contains("Username already exists"));

        // Duplicate email
        let request = RegisterRequest {
            first_name: "Bob".into(),
            last_name: "Cruz".into(),
            username: "brand-new".into(),
            email: "bob@x.com".into(),
            password: "long-enough".into(),
            password_confirm: "long-enough".into(),
            role: None,
        };
        let err = create_user(&db, None, &request).await.unwrap_err();
        assert!(err.message().contains("Email already registered"));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn anonymous_registration_cannot_elevate() {
        let db = test_pool().await;
        let request = RegisterRequest {
            first_name: "Eve".into(),
            last_name: "Mallory".into(),
            username: "eve".into(),
            email: "eve@x.com".into(),
            password: "long-enough".into(),
            password_confirm: "long-enough".into(),
            role: Some("Admin".into()),
        };
        assert!(create_user(&db, None, &request).await.is_err());

        // Staff is fine anonymously
        let request = RegisterRequest {
            role: Some("Staff".into()),
            ..request
        };
        let user = create_user(&db, None, &request).await.unwrap();
        assert_eq!(user.role(), Role::Staff);
    }

    #[tokio::test]
    async fn admin_may_mint_admin_but_not_super_admin() {
        let db = test_pool().await;
        let actor = Identity {
            user_id: "actor".into(),
            username: "actor".into(),
            role: Role::Admin,
        };

        let request = RegisterRequest {
            first_name: "New".into(),
            last_name: "Admin".into(),
            username: "newadmin".into(),
            email: "newadmin@x.com".into(),
            password: "long-enough".into(),
            password_confirm: "long-enough".into(),
            role: Some("Admin".into()),
        };
        let user = create_user(&db, Some(&actor), &request).await.unwrap();
        assert_eq!(user.role(), Role::Admin);

        let request = RegisterRequest {
            username: "newsuper".into(),
            email: "newsuper@x.com".into(),
            role: Some("Super Admin".into()),
            ..request
        };
        let err = create_user(&db, Some(&actor), &request).await.unwrap_err();
        assert!(err.message().contains("Super"));
    }

    #[tokio::test]
    async fn ensure_admin_user_seeds_once() {
        let db = test_pool().await;
        let config = AuthConfig {
            admin_password: Some("seed-password-1".into()),
            ..AuthConfig::default()
        };

        ensure_admin_user(&db, &config).await.unwrap();
        ensure_admin_user(&db, &config).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let outcome = authenticate(&db, &config, "admin", "seed-password-1")
            .await
            .unwrap();
        match outcome {
            AuthOutcome::Success(user) => assert_eq!(user.role(), Role::SuperAdmin),
            other => panic!("expected Success, got {:?}", other),
        }
    }
}

//! HTTP API surface.
//!
//! Authentication and CSRF checks live in the `Identity` and `Mutation`
//! extractors, so a route is protected simply by taking one of them.

use axum::{
    routing::{get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub mod assistance;
pub mod audit;
pub mod auth;
pub mod authz;
pub mod backups;
pub mod beneficiaries;
pub mod categories;
pub mod dashboard;
pub mod error;
pub mod residents;
pub mod users;
pub mod validation;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/register", post(auth::register))
        .route("/api/dashboard", get(dashboard::summary))
        .route("/api/activity", get(audit::list_activity))
        .route(
            "/api/residents",
            get(residents::list_residents).post(residents::create_resident),
        )
        .route(
            "/api/residents/:id",
            get(residents::get_resident)
                .put(residents::update_resident)
                .delete(residents::delete_resident),
        )
        .route(
            "/api/residents/:id/categories",
            get(beneficiaries::list_for_resident),
        )
        .route(
            "/api/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/api/categories/:id",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/api/beneficiaries",
            get(beneficiaries::list_classified).post(beneficiaries::assign),
        )
        .route("/api/beneficiaries/:id", axum::routing::delete(beneficiaries::unassign))
        .route(
            "/api/assistance",
            get(assistance::list_records).post(assistance::create_record),
        )
        .route(
            "/api/assistance/:id",
            get(assistance::get_record)
                .put(assistance::update_record)
                .delete(assistance::delete_record),
        )
        .route("/api/users", get(users::list_users))
        .route(
            "/api/users/:id",
            put(users::update_user).delete(users::delete_user),
        )
        .route(
            "/api/backups",
            get(backups::list_backups).post(backups::create_backup),
        )
        .route(
            "/api/backups/:filename",
            axum::routing::delete(backups::delete_backup),
        )
        .route("/api/backups/:filename/download", get(backups::download_backup))
        .route("/api/backups/:filename/restore", post(backups::restore_backup))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

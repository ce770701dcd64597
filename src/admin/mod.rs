//! Admin API: read-only view of the gateway, on its own listener.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::waf::PathPolicyStore;

/// State shared by the admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub policies: Arc<PathPolicyStore>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/policies", get(get_policies))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::waf::InspectionPolicy;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub registered_paths: usize,
}

#[derive(Serialize)]
pub struct PolicyEntry {
    pub path: String,
    #[serde(flatten)]
    pub policy: InspectionPolicy,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        registered_paths: state.policies.len(),
    })
}

pub async fn get_policies(State(state): State<AdminState>) -> Json<Vec<PolicyEntry>> {
    Json(
        state
            .policies
            .snapshot()
            .into_iter()
            .map(|(path, policy)| PolicyEntry { path, policy })
            .collect(),
    )
}

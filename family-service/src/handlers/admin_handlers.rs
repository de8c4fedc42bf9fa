use axum::{
    extract::{Extension, State},
    Json,
};
use famledger_shared::cleanup::cleanup_orphaned_family_references;
use famledger_shared::models::now_str;
use log::info;

use crate::error::{AppError, Result};
use crate::state::{AppState, CleanupRunStatus};

/// POST /admin/cleanup
/// On-demand run of the orphaned-family-reference sweep, recording metrics.
pub async fn run_manual_cleanup(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>> {
    info!("Manual cleanup triggered by user {}", user_id);

    let report = cleanup_orphaned_family_references(
        state.users.as_ref(),
        state.families.as_ref(),
        state.expenses.as_ref(),
    )
    .await?;

    let status = CleanupRunStatus {
        ran_at: now_str(),
        report,
    };
    *state.last_cleanup.write().await = Some(status.clone());

    Ok(Json(serde_json::json!({ "cleanup": status })))
}

/// GET /admin/cleanup/status
pub async fn get_cleanup_status(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    match state.last_cleanup.read().await.clone() {
        Some(status) => Ok(Json(serde_json::json!({ "cleanup": status }))),
        None => Err(AppError::not_found(
            "No cleanup run has been recorded yet".to_string(),
        )),
    }
}

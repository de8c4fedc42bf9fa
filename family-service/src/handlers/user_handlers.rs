use axum::{
    extract::{Extension, State},
    Json,
};
use famledger_shared::models::{now_str, PushToken};
use log::info;

use crate::error::{AppError, Result};
use crate::models::RegisterPushTokenRequest;
use crate::state::AppState;

/// PUT /users/push-token
/// Register or update a push notification token for the caller's device.
pub async fn register_push_token(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(request): Json<RegisterPushTokenRequest>,
) -> Result<Json<serde_json::Value>> {
    info!(
        "Registering push token for user: {}, platform: {}",
        user_id, request.platform
    );

    // Validate platform
    if request.platform != "ios" && request.platform != "android" {
        return Err(AppError::bad_request(format!(
            "Invalid platform: {}. Must be 'ios' or 'android'",
            request.platform
        )));
    }

    // Validate push token format (Expo push tokens start with "ExponentPushToken[")
    if !request.push_token.starts_with("ExponentPushToken[") {
        return Err(AppError::bad_request(
            "Invalid push token format. Expected Expo push token.".to_string(),
        ));
    }

    let token = PushToken {
        user_id: user_id.clone(),
        push_token: request.push_token,
        platform: request.platform,
        updated_at: now_str(),
    };

    state.push_tokens.save_push_token(token).await?;

    info!("Successfully registered push token for user: {}", user_id);

    Ok(Json(serde_json::json!({
        "message": "Push token registered successfully"
    })))
}

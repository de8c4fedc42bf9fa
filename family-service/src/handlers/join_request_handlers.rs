use std::collections::HashSet;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Duration, Utc};
use famledger_shared::models::{now_str, parse_ts, Family, JoinRequest, JoinRequestStatus};
use log::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{
    CancelJoinRequestRequest, CreateJoinRequestRequest, FamilyResponse, JoinRequestResponse,
    ResendJoinRequestRequest, ResendMessageRequest,
};
use crate::notifications::{FamilyEvent, FamilyNotifier};
use crate::state::AppState;

/// An initial request plus four resends may land inside the rolling window;
/// the sixth attempt is always blocked.
const MAX_JOIN_ATTEMPTS: usize = 5;

/// Rolling attempt window, trailing from now.
const JOIN_ATTEMPT_WINDOW_HOURS: i64 = 7 * 24;

/// Fixed user-facing throttle message; clients branch on the reason tag.
const MAX_RETRIES_MESSAGE: &str =
    "You have reached the maximum number of join attempts for this family. Please try again later.";

/// Counts the attempts that consume throttle budget: everything inside the
/// trailing window except CANCELLED rows. The window boundary is a hard
/// cutoff; an attempt older than the window never counts whatever its status.
fn attempts_in_window(history: &[JoinRequest], now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::hours(JOIN_ATTEMPT_WINDOW_HOURS);
    history
        .iter()
        .filter(|request| request.status != JoinRequestStatus::Cancelled)
        .filter(|request| match parse_ts(&request.created_at) {
            Some(created_at) => created_at > cutoff,
            None => false,
        })
        .count()
}

/// Loads the attempt history for the pair and rejects when the window budget
/// is spent. Returns the history so callers can reuse it.
async fn check_throttle(
    state: &AppState,
    requester_id: &str,
    family_id: &str,
) -> Result<Vec<JoinRequest>> {
    let history = state
        .join_requests
        .find_by_requester_and_family(requester_id, family_id)
        .await?;

    if attempts_in_window(&history, Utc::now()) >= MAX_JOIN_ATTEMPTS {
        warn!(
            "Throttling join attempt: requester={} family={}",
            requester_id, family_id
        );
        return Err(AppError::conflict_with_reason(
            "MAX_RETRIES",
            MAX_RETRIES_MESSAGE.to_string(),
        ));
    }

    Ok(history)
}

// POST /join-requests
pub async fn request_to_join(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<CreateJoinRequestRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let requester = state.users.get_user(&user_id).await?;
    if requester.family_id.is_some() {
        return Err(AppError::conflict(
            "You already belong to a family".to_string(),
        ));
    }

    let family = state
        .families
        .get_family_by_alias(&payload.alias_name)
        .await?;

    let history = check_throttle(&state, &user_id, &family.id).await?;
    if history
        .iter()
        .any(|request| request.status == JoinRequestStatus::Pending)
    {
        return Err(AppError::conflict(
            "A join request for this family is already pending".to_string(),
        ));
    }

    let request = JoinRequest::new(user_id.clone(), family.id.clone(), payload.message);
    let request = state.join_requests.save_join_request(request).await?;

    if let Some(notification_id) = payload.notification_id {
        if let Err(e) = state.notifications.mark_read(&notification_id).await {
            warn!(
                "Could not mark notification {} handled: {}",
                notification_id, e
            );
        }
    }

    info!(
        "User {} requested to join family {} (request {})",
        user_id, family.id, request.id
    );

    FamilyNotifier::from_state(&state).notify(FamilyEvent::JoinRequested {
        family,
        requester,
        request: request.clone(),
        resend: false,
    });

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "joinRequest": JoinRequestResponse::from(request) })),
    ))
}

/// Shared resend path: reject the prior PENDING row and insert a fresh one.
async fn perform_resend(
    state: &AppState,
    user_id: &str,
    family: Family,
    message: Option<String>,
) -> Result<JoinRequest> {
    let requester = state.users.get_user(user_id).await?;
    if requester.family_id.is_some() {
        return Err(AppError::conflict(
            "You already belong to a family".to_string(),
        ));
    }

    let history = check_throttle(state, user_id, &family.id).await?;
    if history.is_empty() {
        return Err(AppError::not_found(
            "No join request to resend for this family".to_string(),
        ));
    }

    for mut previous in history
        .into_iter()
        .filter(|request| request.status == JoinRequestStatus::Pending)
    {
        previous.status = JoinRequestStatus::Rejected;
        previous.updated_at = now_str();
        state.join_requests.save_join_request(previous).await?;
    }

    let request = JoinRequest::new(user_id.to_string(), family.id.clone(), message);
    let request = state.join_requests.save_join_request(request).await?;

    info!(
        "User {} re-sent join request to family {} (request {})",
        user_id, family.id, request.id
    );

    FamilyNotifier::from_state(state).notify(FamilyEvent::JoinRequested {
        family,
        requester,
        request: request.clone(),
        resend: true,
    });

    Ok(request)
}

// POST /join-requests/resend
pub async fn resend_join_request(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<ResendJoinRequestRequest>,
) -> Result<Json<serde_json::Value>> {
    let family = state
        .families
        .get_family_by_alias(&payload.alias_name)
        .await?;

    let request = perform_resend(&state, &user_id, family, payload.message).await?;

    Ok(Json(
        serde_json::json!({ "joinRequest": JoinRequestResponse::from(request) }),
    ))
}

// POST /join-requests/:id/resend
pub async fn resend_join_request_by_id(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<ResendMessageRequest>,
) -> Result<Json<serde_json::Value>> {
    let prior = state.join_requests.get_join_request(&request_id).await?;
    if prior.requester_id != user_id {
        return Err(AppError::forbidden(
            "You can only resend your own join requests".to_string(),
        ));
    }

    let family = state.families.get_family(&prior.family_id).await?;

    let request = perform_resend(&state, &user_id, family, payload.message).await?;

    Ok(Json(
        serde_json::json!({ "joinRequest": JoinRequestResponse::from(request) }),
    ))
}

// POST /join-requests/cancel
pub async fn cancel_join_request(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<CancelJoinRequestRequest>,
) -> Result<Json<serde_json::Value>> {
    let family = state
        .families
        .get_family_by_alias(&payload.alias_name)
        .await?;

    let mut request = state
        .join_requests
        .find_by_requester_and_family_and_status(&user_id, &family.id, JoinRequestStatus::Pending)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            AppError::not_found("No pending join request for this family".to_string())
        })?;

    request.status = JoinRequestStatus::Cancelled;
    request.updated_at = now_str();
    let request = state.join_requests.save_join_request(request).await?;

    info!(
        "User {} cancelled join request {} for family {}",
        user_id, request.id, family.id
    );

    let requester = state.users.get_user(&user_id).await?;
    FamilyNotifier::from_state(&state).notify(FamilyEvent::JoinCancelled {
        family,
        requester,
        request: request.clone(),
    });

    Ok(Json(
        serde_json::json!({ "joinRequest": JoinRequestResponse::from(request) }),
    ))
}

// GET /join-requests/pending
pub async fn get_own_pending_join_requests(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>> {
    let pending = state
        .join_requests
        .find_by_requester_and_status(&user_id, JoinRequestStatus::Pending)
        .await?;

    // The store returns newest-first, so the first row per family is the
    // most recent PENDING attempt.
    let mut seen_families = HashSet::new();
    let latest: Vec<JoinRequestResponse> = pending
        .into_iter()
        .filter(|request| seen_families.insert(request.family_id.clone()))
        .map(JoinRequestResponse::from)
        .collect();

    Ok(Json(serde_json::json!({ "joinRequests": latest })))
}

/// Loads a request and authorizes the caller as head of its family.
async fn load_request_as_head(
    state: &AppState,
    request_id: &str,
    user_id: &str,
) -> Result<(JoinRequest, Family)> {
    let request = state.join_requests.get_join_request(request_id).await?;
    let family = state.families.get_family(&request.family_id).await?;

    if family.head_id != user_id {
        return Err(AppError::forbidden(
            "Only the family head can act on join requests".to_string(),
        ));
    }

    if request.status != JoinRequestStatus::Pending {
        return Err(AppError::conflict(
            "Join request is no longer pending".to_string(),
        ));
    }

    Ok((request, family))
}

// POST /join-requests/:id/accept
pub async fn accept_join_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>> {
    let (mut request, mut family) = load_request_as_head(&state, &request_id, &user_id).await?;

    let mut requester = state.users.get_user(&request.requester_id).await?;

    // Membership is exclusive: a requester who joined elsewhere in the
    // meantime makes this request moot, and it stays PENDING untouched.
    if requester.family_id.is_some() {
        return Err(AppError::conflict(
            "The requester already belongs to a family".to_string(),
        ));
    }

    if family.is_full() {
        return Err(AppError::conflict(format!(
            "Family \"{}\" is already at its maximum size",
            family.name
        )));
    }

    family.members_ids.push(requester.id.clone());
    family.pending_member_emails.remove(&requester.email);
    family.updated_at = now_str();
    let family = state.families.save_family(family).await?;

    request.status = JoinRequestStatus::Accepted;
    request.updated_at = now_str();
    let request = state.join_requests.save_join_request(request).await?;

    requester.family_id = Some(family.id.clone());
    requester.updated_at = now_str();
    state.users.save_user(requester).await?;

    info!(
        "Head {} accepted join request {} into family {}",
        user_id, request.id, family.id
    );

    FamilyNotifier::from_state(&state).notify(FamilyEvent::JoinAccepted {
        family: family.clone(),
        request: request.clone(),
    });

    Ok(Json(serde_json::json!({
        "joinRequest": JoinRequestResponse::from(request),
        "family": FamilyResponse::from(family),
    })))
}

// POST /join-requests/:id/reject
pub async fn reject_join_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>> {
    let (mut request, family) = load_request_as_head(&state, &request_id, &user_id).await?;

    request.status = JoinRequestStatus::Rejected;
    request.updated_at = now_str();
    let request = state.join_requests.save_join_request(request).await?;

    info!(
        "Head {} rejected join request {} for family {}",
        user_id, request.id, family.id
    );

    FamilyNotifier::from_state(&state).notify(FamilyEvent::JoinRejected {
        family,
        request: request.clone(),
    });

    Ok(Json(
        serde_json::json!({ "joinRequest": JoinRequestResponse::from(request) }),
    ))
}

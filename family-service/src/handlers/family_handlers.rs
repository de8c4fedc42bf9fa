use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use famledger_shared::models::{
    generate_alias_name, now_str, Family, JoinRequestStatus, PendingInvite,
    DEFAULT_FAMILY_MAX_SIZE,
};
use famledger_shared::store::StoreError;
use log::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    CreateFamilyRequest, FamilyResponse, InviteMemberRequest, JoinFamilyRequest,
    RemoveMemberRequest,
};
use crate::notifications::{FamilyEvent, FamilyNotifier};
use crate::state::AppState;

/// Retry budget for alias-collision regeneration.
const MAX_ALIAS_ATTEMPTS: usize = 5;

/// Allocates an alias no existing family uses.
async fn allocate_alias(state: &AppState) -> Result<String> {
    for _ in 0..MAX_ALIAS_ATTEMPTS {
        let alias = generate_alias_name();
        match state.families.get_family_by_alias(&alias).await {
            Ok(_) => continue,
            Err(StoreError::NotFound(_)) => return Ok(alias),
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::internal_server_error(
        "Could not allocate a unique family alias".to_string(),
    ))
}

// POST /families
pub async fn create_family(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<CreateFamilyRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request(
            "Family name must not be blank".to_string(),
        ));
    }

    let mut user = state.users.get_user(&user_id).await?;
    if user.family_id.is_some() {
        return Err(AppError::conflict(
            "You already belong to a family".to_string(),
        ));
    }

    let alias_name = allocate_alias(&state).await?;
    let now = now_str();
    let family = Family {
        id: Uuid::new_v4().to_string(),
        alias_name,
        head_id: user_id.clone(),
        name: name.to_string(),
        max_size: DEFAULT_FAMILY_MAX_SIZE,
        members_ids: vec![user_id.clone()],
        pending_member_emails: Default::default(),
        created_at: now.clone(),
        updated_at: now,
    };

    let family = state.families.save_family(family).await?;

    user.family_id = Some(family.id.clone());
    user.updated_at = now_str();
    state.users.save_user(user).await?;

    info!(
        "User {} created family {} (alias {})",
        user_id, family.id, family.alias_name
    );

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "family": FamilyResponse::from(family) })),
    ))
}

// GET /families
pub async fn get_my_family(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
) -> Result<Json<serde_json::Value>> {
    let user = state.users.get_user(&user_id).await?;
    let family_id = user
        .family_id
        .ok_or_else(|| AppError::not_found("You do not belong to a family".to_string()))?;

    let family = state.families.get_family(&family_id).await?;

    Ok(Json(
        serde_json::json!({ "family": FamilyResponse::from(family) }),
    ))
}

// POST /families/join
pub async fn join_family(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<JoinFamilyRequest>,
) -> Result<Json<serde_json::Value>> {
    let mut user = state.users.get_user(&user_id).await?;
    if user.family_id.is_some() {
        return Err(AppError::conflict(
            "You already belong to a family".to_string(),
        ));
    }

    let mut family = state
        .families
        .get_family_by_alias(&payload.alias_name)
        .await?;

    if family.is_member(&user_id) {
        return Err(AppError::conflict(
            "You are already a member of this family".to_string(),
        ));
    }

    // Capacity is re-validated against the freshly loaded record right
    // before the write; concurrent joins race on this check, not on stale
    // in-process state.
    if family.is_full() {
        return Err(AppError::conflict(format!(
            "Family \"{}\" is already at its maximum size",
            family.name
        )));
    }

    family.members_ids.push(user_id.clone());
    family.pending_member_emails.remove(&user.email);
    family.updated_at = now_str();

    // A pending join request against this family is satisfied by the join.
    let pending = state
        .join_requests
        .find_by_requester_and_family_and_status(&user_id, &family.id, JoinRequestStatus::Pending)
        .await?;
    for mut request in pending {
        request.status = JoinRequestStatus::Accepted;
        request.updated_at = now_str();
        state.join_requests.save_join_request(request).await?;
    }

    let family = state.families.save_family(family).await?;

    user.family_id = Some(family.id.clone());
    user.updated_at = now_str();
    let user = state.users.save_user(user).await?;

    if let Some(notification_id) = payload.notification_id {
        // The join must not fail just because the inbox entry is gone.
        if let Err(e) = state.notifications.mark_read(&notification_id).await {
            warn!(
                "Could not mark notification {} handled: {}",
                notification_id, e
            );
        }
    }

    info!("User {} joined family {}", user_id, family.id);

    FamilyNotifier::from_state(&state).notify(FamilyEvent::MemberJoined {
        family: family.clone(),
        new_member: user,
    });

    Ok(Json(
        serde_json::json!({ "family": FamilyResponse::from(family) }),
    ))
}

/// Loads the caller and the family they belong to.
async fn load_caller_family(
    state: &AppState,
    user_id: &str,
) -> Result<(famledger_shared::models::ExpenseUser, Family)> {
    let user = state.users.get_user(user_id).await?;
    let family_id = user
        .family_id
        .clone()
        .ok_or_else(|| AppError::not_found("You do not belong to a family".to_string()))?;
    let family = state.families.get_family(&family_id).await?;
    Ok((user, family))
}

// POST /families/invitations
pub async fn invite_member(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<InviteMemberRequest>,
) -> Result<Json<serde_json::Value>> {
    let (caller, mut family) = load_caller_family(&state, &user_id).await?;

    if !family.is_member(&user_id) {
        return Err(AppError::forbidden(
            "Only family members can send invitations".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::bad_request("Email must not be blank".to_string()));
    }

    // An email may not be both a member's address and a pending invite.
    if let Some(target) = state.users.get_user_by_email(&email).await? {
        if family.is_member(&target.id) {
            return Err(AppError::conflict(format!(
                "{} is already a member of this family",
                email
            )));
        }
    }
    if family.pending_member_emails.contains_key(&email) {
        return Err(AppError::conflict(format!(
            "{} has already been invited",
            email
        )));
    }

    family.pending_member_emails.insert(
        email.clone(),
        PendingInvite {
            invited_by: user_id.clone(),
            message: payload.message.clone(),
            invited_at: now_str(),
        },
    );
    family.updated_at = now_str();
    let family = state.families.save_family(family).await?;

    info!("User {} invited {} to family {}", user_id, email, family.id);

    FamilyNotifier::from_state(&state).notify(FamilyEvent::InvitationSent {
        family,
        inviter: caller,
        email,
        message: payload.message,
        resend: false,
    });

    Ok(Json(serde_json::json!({
        "message": "Invitation sent successfully."
    })))
}

// POST /families/invitations/resend
pub async fn resend_invitation(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<InviteMemberRequest>,
) -> Result<Json<serde_json::Value>> {
    let (caller, family) = load_caller_family(&state, &user_id).await?;

    if !family.is_member(&user_id) {
        return Err(AppError::forbidden(
            "Only family members can send invitations".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    let invite = family
        .pending_member_emails
        .get(&email)
        .cloned()
        .ok_or_else(|| {
            AppError::conflict(format!("No pending invitation for {}", email))
        })?;

    // Same payload again; no pending state is duplicated or refreshed.
    let message = payload.message.or(invite.message);

    FamilyNotifier::from_state(&state).notify(FamilyEvent::InvitationSent {
        family,
        inviter: caller,
        email,
        message,
        resend: true,
    });

    Ok(Json(serde_json::json!({
        "message": "Invitation re-sent successfully."
    })))
}

// POST /families/members/remove
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(user_id): Extension<String>,
    Json(payload): Json<RemoveMemberRequest>,
) -> Result<Json<serde_json::Value>> {
    let (_, mut family) = load_caller_family(&state, &user_id).await?;

    if family.head_id != user_id {
        return Err(AppError::forbidden(
            "Only the family head can remove members".to_string(),
        ));
    }

    let email = payload.email.trim().to_lowercase();
    let mut target = state
        .users
        .get_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No user with email {}", email)))?;

    if target.id == user_id {
        return Err(AppError::bad_request(
            "The family head cannot remove themself".to_string(),
        ));
    }

    if !family.is_member(&target.id) {
        return Err(AppError::not_found(format!(
            "{} is not a member of your family",
            email
        )));
    }

    family.members_ids.retain(|id| id != &target.id);
    family.updated_at = now_str();
    let family = state.families.save_family(family).await?;

    target.family_id = None;
    target.updated_at = now_str();
    let target = state.users.save_user(target).await?;

    info!(
        "Head {} removed member {} from family {}",
        user_id, target.id, family.id
    );

    FamilyNotifier::from_state(&state).notify(FamilyEvent::MemberRemoved {
        family,
        removed: target,
        message: payload.message,
    });

    Ok(Json(serde_json::json!({
        "message": "Member removed successfully."
    })))
}

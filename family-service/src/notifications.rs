//! Family Notification Service.
//!
//! Translates domain events into push payloads, fans them out to every
//! active device token of the target users, and persists an inbox record per
//! receiver. The whole delivery runs on a spawned task: a dispatch failure
//! can never fail or delay the membership mutation that triggered it. Tokens
//! the dispatcher reports as permanently invalid are pruned from device
//! storage; pruning problems are only logged.

use std::collections::HashMap;
use std::sync::Arc;

use famledger_shared::models::{now_str, ExpenseUser, Family, JoinRequest, Notification};
use famledger_shared::push::NotificationDispatcher;
use famledger_shared::store::{NotificationStore, PushTokenStore, UserStore};
use log::{debug, error, info};
use serde_json::json;
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug)]
pub enum FamilyEvent {
    InvitationSent {
        family: Family,
        inviter: ExpenseUser,
        email: String,
        message: Option<String>,
        resend: bool,
    },
    JoinRequested {
        family: Family,
        requester: ExpenseUser,
        request: JoinRequest,
        resend: bool,
    },
    JoinAccepted {
        family: Family,
        request: JoinRequest,
    },
    JoinRejected {
        family: Family,
        request: JoinRequest,
    },
    JoinCancelled {
        family: Family,
        requester: ExpenseUser,
        request: JoinRequest,
    },
    MemberJoined {
        family: Family,
        new_member: ExpenseUser,
    },
    MemberRemoved {
        family: Family,
        removed: ExpenseUser,
        message: Option<String>,
    },
}

/// A fully resolved delivery: who gets which payload.
struct Delivery {
    sender_id: String,
    family_id: String,
    kind: &'static str,
    title: String,
    body: String,
    data: serde_json::Value,
    receiver_ids: Vec<String>,
}

#[derive(Clone)]
pub struct FamilyNotifier {
    users: Arc<dyn UserStore>,
    push_tokens: Arc<dyn PushTokenStore>,
    notifications: Arc<dyn NotificationStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl FamilyNotifier {
    pub fn from_state(state: &AppState) -> Self {
        FamilyNotifier {
            users: state.users.clone(),
            push_tokens: state.push_tokens.clone(),
            notifications: state.notifications.clone(),
            dispatcher: state.dispatcher.clone(),
        }
    }

    /// Fire-and-forget entry point used by the handlers.
    pub fn notify(&self, event: FamilyEvent) {
        let notifier = self.clone();
        tokio::spawn(async move {
            notifier.deliver(event).await;
        });
    }

    /// Resolves the event into receivers and a payload. `None` means there
    /// is nobody to notify (e.g. an invited email with no account yet).
    async fn plan(&self, event: FamilyEvent) -> Option<Delivery> {
        match event {
            FamilyEvent::InvitationSent {
                family,
                inviter,
                email,
                message,
                resend,
            } => {
                let invited = match self.users.get_user_by_email(&email).await {
                    Ok(Some(user)) => user,
                    Ok(None) => {
                        info!("Invited email {} has no account yet, skipping push", email);
                        return None;
                    }
                    Err(e) => {
                        error!("Failed to resolve invited email {}: {}", email, e);
                        return None;
                    }
                };

                if resend {
                    debug!("Re-sending invitation payload to {}", email);
                }

                Some(Delivery {
                    sender_id: inviter.id.clone(),
                    family_id: family.id.clone(),
                    kind: "family_invitation",
                    title: "Family Invitation".to_string(),
                    body: format!(
                        "{} invited you to join the family \"{}\".",
                        inviter.alias_name, family.name
                    ),
                    data: json!({
                        "type": "family_invitation",
                        "familyId": family.id,
                        "aliasName": family.alias_name,
                        "message": message,
                    }),
                    receiver_ids: vec![invited.id],
                })
            }
            FamilyEvent::JoinRequested {
                family,
                requester,
                request,
                resend,
            } => {
                if resend {
                    debug!(
                        "Re-sending join request payload for request {}",
                        request.id
                    );
                }

                Some(Delivery {
                    sender_id: requester.id.clone(),
                    family_id: family.id.clone(),
                    kind: "join_request",
                    title: "New Join Request".to_string(),
                    body: format!(
                        "{} asked to join \"{}\".",
                        requester.alias_name, family.name
                    ),
                    data: json!({
                        "type": "join_request",
                        "familyId": family.id,
                        "aliasName": family.alias_name,
                        "requestId": request.id,
                        "message": request.message,
                    }),
                    receiver_ids: vec![family.head_id],
                })
            }
            FamilyEvent::JoinAccepted { family, request } => Some(Delivery {
                sender_id: family.head_id.clone(),
                family_id: family.id.clone(),
                kind: "join_request_accepted",
                title: "Join Request Accepted".to_string(),
                body: format!("Your request to join \"{}\" was accepted.", family.name),
                data: json!({
                    "type": "join_request_accepted",
                    "familyId": family.id,
                    "requestId": request.id,
                }),
                receiver_ids: vec![request.requester_id],
            }),
            FamilyEvent::JoinRejected { family, request } => Some(Delivery {
                sender_id: family.head_id.clone(),
                family_id: family.id.clone(),
                kind: "join_request_rejected",
                title: "Join Request Rejected".to_string(),
                body: format!("Your request to join \"{}\" was rejected.", family.name),
                data: json!({
                    "type": "join_request_rejected",
                    "familyId": family.id,
                    "requestId": request.id,
                }),
                receiver_ids: vec![request.requester_id],
            }),
            FamilyEvent::JoinCancelled {
                family,
                requester,
                request,
            } => Some(Delivery {
                sender_id: requester.id.clone(),
                family_id: family.id.clone(),
                kind: "join_request_cancelled",
                title: "Join Request Cancelled".to_string(),
                body: format!(
                    "{} withdrew their request to join \"{}\".",
                    requester.alias_name, family.name
                ),
                data: json!({
                    "type": "join_request_cancelled",
                    "familyId": family.id,
                    "requestId": request.id,
                }),
                receiver_ids: vec![family.head_id],
            }),
            FamilyEvent::MemberJoined { family, new_member } => {
                let receiver_ids: Vec<String> = family
                    .members_ids
                    .iter()
                    .filter(|id| *id != &new_member.id)
                    .cloned()
                    .collect();

                Some(Delivery {
                    sender_id: new_member.id.clone(),
                    family_id: family.id.clone(),
                    kind: "member_joined",
                    title: "New Family Member".to_string(),
                    body: format!("{} joined \"{}\".", new_member.alias_name, family.name),
                    data: json!({
                        "type": "member_joined",
                        "familyId": family.id,
                        "memberId": new_member.id,
                    }),
                    receiver_ids,
                })
            }
            FamilyEvent::MemberRemoved {
                family,
                removed,
                message,
            } => Some(Delivery {
                sender_id: family.head_id.clone(),
                family_id: family.id.clone(),
                kind: "member_removed",
                title: "Removed from Family".to_string(),
                body: format!("You have been removed from \"{}\".", family.name),
                data: json!({
                    "type": "member_removed",
                    "familyId": family.id,
                    "message": message,
                }),
                receiver_ids: vec![removed.id],
            }),
        }
    }

    /// The actual fan-out. Public to the crate so tests can await it
    /// instead of racing the spawned task.
    pub(crate) async fn deliver(&self, event: FamilyEvent) {
        let delivery = match self.plan(event).await {
            Some(delivery) => delivery,
            None => return,
        };

        if delivery.receiver_ids.is_empty() {
            return;
        }

        // Inbox records first; these must exist even when no device listens.
        for receiver_id in &delivery.receiver_ids {
            let notification = Notification {
                id: Uuid::new_v4().to_string(),
                sender_id: delivery.sender_id.clone(),
                receiver_id: receiver_id.clone(),
                family_id: delivery.family_id.clone(),
                kind: delivery.kind.to_string(),
                created_at: now_str(),
                read: false,
            };

            if let Err(e) = self.notifications.save_notification(notification).await {
                error!(
                    "Failed to persist {} notification for {}: {}",
                    delivery.kind, receiver_id, e
                );
            }
        }

        // Every active device token of the targets, plus the legacy
        // single-device field, keyed back to its owner for pruning.
        let mut token_owners: HashMap<String, String> = HashMap::new();

        match self.push_tokens.get_push_tokens(&delivery.receiver_ids).await {
            Ok(tokens) => {
                for token in tokens {
                    token_owners.insert(token.push_token, token.user_id);
                }
            }
            Err(e) => error!("Failed to load push tokens: {}", e),
        }

        for receiver_id in &delivery.receiver_ids {
            match self.users.get_user(receiver_id).await {
                Ok(user) => {
                    if let Some(token) = user.fcm_token {
                        token_owners.entry(token).or_insert(user.id);
                    }
                }
                Err(e) => debug!("No user record for receiver {}: {}", receiver_id, e),
            }
        }

        if token_owners.is_empty() {
            info!(
                "No push tokens found for {} receivers of {}",
                delivery.receiver_ids.len(),
                delivery.kind
            );
            return;
        }

        let tokens: Vec<String> = token_owners.keys().cloned().collect();
        match self
            .dispatcher
            .send(&tokens, &delivery.title, &delivery.body, Some(delivery.data))
            .await
        {
            Ok(invalid_tokens) => {
                self.prune_invalid_tokens(&token_owners, &invalid_tokens)
                    .await;
            }
            Err(e) => error!("Push dispatch failed for {}: {}", delivery.kind, e),
        }
    }

    /// Removes permanently dead tokens from device storage and clears a
    /// matching legacy token from the owner's user record.
    async fn prune_invalid_tokens(
        &self,
        token_owners: &HashMap<String, String>,
        invalid_tokens: &[String],
    ) {
        for token in invalid_tokens {
            let user_id = match token_owners.get(token) {
                Some(user_id) => user_id,
                None => continue,
            };

            info!("Pruning invalid push token for user {}", user_id);
            if let Err(e) = self.push_tokens.delete_push_token(user_id, token).await {
                error!("Failed to prune push token for {}: {}", user_id, e);
            }

            match self.users.get_user(user_id).await {
                Ok(mut user) if user.fcm_token.as_deref() == Some(token.as_str()) => {
                    user.fcm_token = None;
                    user.updated_at = now_str();
                    if let Err(e) = self.users.save_user(user).await {
                        error!("Failed to clear legacy token for {}: {}", user_id, e);
                    }
                }
                Ok(_) => {}
                Err(e) => debug!("No user record while pruning {}: {}", user_id, e),
            }
        }
    }
}

use std::collections::HashMap;

use famledger_shared::models::{Family, JoinRequest, JoinRequestStatus, PendingInvite};
use serde::{Deserialize, Serialize};

// Request DTOs

#[derive(Deserialize, Debug)]
pub struct CreateFamilyRequest {
    pub name: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinFamilyRequest {
    pub alias_name: String,
    #[serde(default)]
    pub notification_id: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct InviteMemberRequest {
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct RemoveMemberRequest {
    pub email: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateJoinRequestRequest {
    pub alias_name: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notification_id: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResendJoinRequestRequest {
    pub alias_name: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ResendMessageRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CancelJoinRequestRequest {
    pub alias_name: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushTokenRequest {
    pub push_token: String,
    pub platform: String,
}

// Response DTOs

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FamilyResponse {
    pub id: String,
    pub alias_name: String,
    pub head_id: String,
    pub name: String,
    pub max_size: u32,
    pub members_ids: Vec<String>,
    pub pending_member_emails: HashMap<String, PendingInvite>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Family> for FamilyResponse {
    fn from(family: Family) -> Self {
        FamilyResponse {
            id: family.id,
            alias_name: family.alias_name,
            head_id: family.head_id,
            name: family.name,
            max_size: family.max_size,
            members_ids: family.members_ids,
            pending_member_emails: family.pending_member_emails,
            created_at: family.created_at,
            updated_at: family.updated_at,
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestResponse {
    pub id: String,
    pub requester_id: String,
    pub family_id: String,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JoinRequest> for JoinRequestResponse {
    fn from(request: JoinRequest) -> Self {
        JoinRequestResponse {
            id: request.id,
            requester_id: request.requester_id,
            family_id: request.family_id,
            message: request.message,
            status: request.status,
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

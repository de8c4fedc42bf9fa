use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ExpenseUser, Family, JoinRequest, JoinRequestStatus, Notification, PushToken};

pub mod dynamo;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("item not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Internal(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<serde_dynamo::Error> for StoreError {
    fn from(err: serde_dynamo::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Keyed persistence for Family aggregates.
#[async_trait]
pub trait FamilyStore: Send + Sync {
    async fn get_family(&self, id: &str) -> StoreResult<Family>;

    /// Resolves a family by its human-facing alias code.
    async fn get_family_by_alias(&self, alias_name: &str) -> StoreResult<Family>;

    async fn family_exists(&self, id: &str) -> StoreResult<bool>;

    async fn get_all_families(&self) -> StoreResult<Vec<Family>>;

    async fn save_family(&self, family: Family) -> StoreResult<Family>;
}

/// Keyed persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: &str) -> StoreResult<ExpenseUser>;

    /// Email lookup used when resolving invite targets; `None` when no user
    /// is registered under the address.
    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<ExpenseUser>>;

    async fn get_all_users(&self) -> StoreResult<Vec<ExpenseUser>>;

    async fn save_user(&self, user: ExpenseUser) -> StoreResult<ExpenseUser>;
}

/// Append-mostly persistence for join attempts.
#[async_trait]
pub trait JoinRequestStore: Send + Sync {
    async fn save_join_request(&self, request: JoinRequest) -> StoreResult<JoinRequest>;

    async fn get_join_request(&self, id: &str) -> StoreResult<JoinRequest>;

    /// All attempts for a (requester, family) pair, newest first.
    async fn find_by_requester_and_family(
        &self,
        requester_id: &str,
        family_id: &str,
    ) -> StoreResult<Vec<JoinRequest>>;

    async fn find_by_requester_and_status(
        &self,
        requester_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>>;

    async fn find_by_requester_and_family_and_status(
        &self,
        requester_id: &str,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>>;

    async fn find_by_requester(&self, requester_id: &str) -> StoreResult<Vec<JoinRequest>>;

    async fn find_by_family_and_status(
        &self,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>>;
}

/// The only expense operation this core performs: bulk deletion of the rows
/// belonging to an orphaned family. Returns the deleted count.
#[async_trait]
pub trait ExpenseStore: Send + Sync {
    async fn delete_by_family_id(&self, family_id: &str) -> StoreResult<usize>;
}

/// Inbox/audit persistence for delivered notifications.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn save_notification(&self, notification: Notification) -> StoreResult<Notification>;

    async fn mark_read(&self, id: &str) -> StoreResult<()>;
}

/// Device-token storage for push delivery.
#[async_trait]
pub trait PushTokenStore: Send + Sync {
    async fn get_push_tokens(&self, user_ids: &[String]) -> StoreResult<Vec<PushToken>>;

    async fn save_push_token(&self, token: PushToken) -> StoreResult<()>;

    /// Removes a token reported permanently invalid by the dispatcher.
    async fn delete_push_token(&self, user_id: &str, push_token: &str) -> StoreResult<()>;
}

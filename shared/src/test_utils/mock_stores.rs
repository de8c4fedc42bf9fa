//! In-memory store and dispatcher implementations backed by `RwLock`ed maps,
//! with write counters so tests can assert that an operation performed no
//! store mutation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::models::{ExpenseUser, Family, JoinRequest, JoinRequestStatus, Notification, PushToken};
use crate::push::{DispatchError, NotificationDispatcher};
use crate::store::{
    ExpenseStore, FamilyStore, JoinRequestStore, NotificationStore, PushTokenStore, StoreError,
    StoreResult, UserStore,
};

fn newest_first(requests: &mut [JoinRequest]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[derive(Default)]
pub struct MockFamilyStore {
    families: RwLock<HashMap<String, Family>>,
    saves: RwLock<usize>,
}

impl MockFamilyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, family: Family) {
        self.families.write().await.insert(family.id.clone(), family);
    }

    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }
}

#[async_trait]
impl FamilyStore for MockFamilyStore {
    async fn get_family(&self, id: &str) -> StoreResult<Family> {
        self.families
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("family {}", id)))
    }

    async fn get_family_by_alias(&self, alias_name: &str) -> StoreResult<Family> {
        self.families
            .read()
            .await
            .values()
            .find(|f| f.alias_name == alias_name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("family alias {}", alias_name)))
    }

    async fn family_exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.families.read().await.contains_key(id))
    }

    async fn get_all_families(&self) -> StoreResult<Vec<Family>> {
        Ok(self.families.read().await.values().cloned().collect())
    }

    async fn save_family(&self, family: Family) -> StoreResult<Family> {
        *self.saves.write().await += 1;
        self.families
            .write()
            .await
            .insert(family.id.clone(), family.clone());
        Ok(family)
    }
}

#[derive(Default)]
pub struct MockUserStore {
    users: RwLock<HashMap<String, ExpenseUser>>,
    saves: RwLock<usize>,
}

impl MockUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, user: ExpenseUser) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }
}

#[async_trait]
impl UserStore for MockUserStore {
    async fn get_user(&self, id: &str) -> StoreResult<ExpenseUser> {
        self.users
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<ExpenseUser>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn get_all_users(&self) -> StoreResult<Vec<ExpenseUser>> {
        let mut users: Vec<ExpenseUser> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn save_user(&self, user: ExpenseUser) -> StoreResult<ExpenseUser> {
        *self.saves.write().await += 1;
        self.users.write().await.insert(user.id.clone(), user.clone());
        Ok(user)
    }
}

#[derive(Default)]
pub struct MockJoinRequestStore {
    requests: RwLock<HashMap<String, JoinRequest>>,
    saves: RwLock<usize>,
}

impl MockJoinRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, request: JoinRequest) {
        self.requests
            .write()
            .await
            .insert(request.id.clone(), request);
    }

    pub async fn save_count(&self) -> usize {
        *self.saves.read().await
    }

    pub async fn all(&self) -> Vec<JoinRequest> {
        let mut requests: Vec<JoinRequest> =
            self.requests.read().await.values().cloned().collect();
        newest_first(&mut requests);
        requests
    }
}

#[async_trait]
impl JoinRequestStore for MockJoinRequestStore {
    async fn save_join_request(&self, request: JoinRequest) -> StoreResult<JoinRequest> {
        *self.saves.write().await += 1;
        self.requests
            .write()
            .await
            .insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn get_join_request(&self, id: &str) -> StoreResult<JoinRequest> {
        self.requests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("join request {}", id)))
    }

    async fn find_by_requester_and_family(
        &self,
        requester_id: &str,
        family_id: &str,
    ) -> StoreResult<Vec<JoinRequest>> {
        let mut requests: Vec<JoinRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.requester_id == requester_id && r.family_id == family_id)
            .cloned()
            .collect();
        newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester_and_status(
        &self,
        requester_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let mut requests: Vec<JoinRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.requester_id == requester_id && r.status == status)
            .cloned()
            .collect();
        newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester_and_family_and_status(
        &self,
        requester_id: &str,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let mut requests: Vec<JoinRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| {
                r.requester_id == requester_id && r.family_id == family_id && r.status == status
            })
            .cloned()
            .collect();
        newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester(&self, requester_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let mut requests: Vec<JoinRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_family_and_status(
        &self,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let mut requests: Vec<JoinRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|r| r.family_id == family_id && r.status == status)
            .cloned()
            .collect();
        newest_first(&mut requests);
        Ok(requests)
    }
}

#[derive(Default)]
pub struct MockExpenseStore {
    rows_by_family: RwLock<HashMap<String, usize>>,
    delete_calls: RwLock<Vec<String>>,
}

impl MockExpenseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds `count` expense rows under a family id.
    pub async fn seed(&self, family_id: &str, count: usize) {
        self.rows_by_family
            .write()
            .await
            .insert(family_id.to_string(), count);
    }

    pub async fn delete_calls(&self) -> Vec<String> {
        self.delete_calls.read().await.clone()
    }
}

#[async_trait]
impl ExpenseStore for MockExpenseStore {
    async fn delete_by_family_id(&self, family_id: &str) -> StoreResult<usize> {
        self.delete_calls.write().await.push(family_id.to_string());
        Ok(self
            .rows_by_family
            .write()
            .await
            .remove(family_id)
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct MockNotificationStore {
    notifications: RwLock<HashMap<String, Notification>>,
}

impl MockNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, notification: Notification) {
        self.notifications
            .write()
            .await
            .insert(notification.id.clone(), notification);
    }

    pub async fn get(&self, id: &str) -> Option<Notification> {
        self.notifications.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Notification> {
        let mut notifications: Vec<Notification> =
            self.notifications.read().await.values().cloned().collect();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        notifications
    }
}

#[async_trait]
impl NotificationStore for MockNotificationStore {
    async fn save_notification(&self, notification: Notification) -> StoreResult<Notification> {
        self.notifications
            .write()
            .await
            .insert(notification.id.clone(), notification.clone());
        Ok(notification)
    }

    async fn mark_read(&self, id: &str) -> StoreResult<()> {
        match self.notifications.write().await.get_mut(id) {
            Some(notification) => {
                notification.read = true;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("notification {}", id))),
        }
    }
}

#[derive(Default)]
pub struct MockPushTokenStore {
    tokens: RwLock<Vec<PushToken>>,
}

impl MockPushTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, token: PushToken) {
        self.tokens.write().await.push(token);
    }

    pub async fn tokens_for(&self, user_id: &str) -> Vec<String> {
        self.tokens
            .read()
            .await
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.push_token.clone())
            .collect()
    }
}

#[async_trait]
impl PushTokenStore for MockPushTokenStore {
    async fn get_push_tokens(&self, user_ids: &[String]) -> StoreResult<Vec<PushToken>> {
        Ok(self
            .tokens
            .read()
            .await
            .iter()
            .filter(|t| user_ids.contains(&t.user_id))
            .cloned()
            .collect())
    }

    async fn save_push_token(&self, token: PushToken) -> StoreResult<()> {
        let mut tokens = self.tokens.write().await;
        tokens.retain(|t| !(t.user_id == token.user_id && t.push_token == token.push_token));
        tokens.push(token);
        Ok(())
    }

    async fn delete_push_token(&self, user_id: &str, push_token: &str) -> StoreResult<()> {
        self.tokens
            .write()
            .await
            .retain(|t| !(t.user_id == user_id && t.push_token == push_token));
        Ok(())
    }
}

/// One recorded dispatcher call.
#[derive(Debug, Clone)]
pub struct SentPush {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
}

/// Dispatcher fake: records every send and reports a configurable set of
/// tokens as permanently invalid.
#[derive(Default)]
pub struct MockDispatcher {
    sent: RwLock<Vec<SentPush>>,
    invalid_tokens: RwLock<Vec<String>>,
    fail_transport: RwLock<bool>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_invalid(&self, token: &str) {
        self.invalid_tokens.write().await.push(token.to_string());
    }

    pub async fn fail_next_sends(&self, fail: bool) {
        *self.fail_transport.write().await = fail;
    }

    pub async fn sent(&self) -> Vec<SentPush> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationDispatcher for MockDispatcher {
    async fn send(
        &self,
        tokens: &[String],
        title: &str,
        body: &str,
        data: Option<serde_json::Value>,
    ) -> Result<Vec<String>, DispatchError> {
        if *self.fail_transport.read().await {
            return Err(DispatchError::Transport("simulated outage".to_string()));
        }

        self.sent.write().await.push(SentPush {
            tokens: tokens.to_vec(),
            title: title.to_string(),
            body: body.to_string(),
            data,
        });

        let invalid = self.invalid_tokens.read().await;
        Ok(tokens
            .iter()
            .filter(|t| invalid.contains(t))
            .cloned()
            .collect())
    }
}

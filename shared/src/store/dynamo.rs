//! DynamoDB-backed store implementations.
//!
//! Each store owns a client and a table name; table names come from the
//! environment with sensible defaults so local tooling can point the stores
//! at test tables.

use std::collections::HashMap;
use std::env;

use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use log::debug;
use serde_dynamo::aws_sdk_dynamodb_1::{from_item, from_items, to_item};

use crate::models::{ExpenseUser, Family, JoinRequest, JoinRequestStatus, Notification, PushToken};
use crate::store::{
    ExpenseStore, FamilyStore, JoinRequestStore, NotificationStore, PushTokenStore, StoreError,
    StoreResult, UserStore,
};

const DEFAULT_FAMILIES_TABLE: &str = "families";
const DEFAULT_USERS_TABLE: &str = "expense-users";
const DEFAULT_JOIN_REQUESTS_TABLE: &str = "join-requests";
const DEFAULT_EXPENSES_TABLE: &str = "expenses";
const DEFAULT_NOTIFICATIONS_TABLE: &str = "notifications";
const DEFAULT_PUSH_TOKENS_TABLE: &str = "push-tokens";

const ALIAS_INDEX: &str = "aliasName-index";
const EMAIL_INDEX: &str = "email-index";
const REQUESTER_INDEX: &str = "requesterId-index";
const FAMILY_INDEX: &str = "familyId-index";

async fn default_client() -> Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .load()
        .await;
    Client::new(&config)
}

fn table_from_env(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn internal<E: std::fmt::Debug>(context: &str, err: E) -> StoreError {
    StoreError::Internal(format!("{}: {:?}", context, err))
}

/// Runs a query against `index` keyed on a single attribute, following
/// pagination, with an optional filter expression.
async fn query_index(
    client: &Client,
    table_name: &str,
    index: &str,
    key_attr: &str,
    key_value: &str,
    filter: Option<(&str, Vec<(&str, &str)>, Vec<(&str, AttributeValue)>)>,
) -> StoreResult<Vec<HashMap<String, AttributeValue>>> {
    let mut items = Vec::new();
    let mut last_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut request = client
            .query()
            .table_name(table_name)
            .index_name(index)
            .key_condition_expression("#k = :k")
            .expression_attribute_names("#k", key_attr)
            .expression_attribute_values(":k", AttributeValue::S(key_value.to_string()));

        if let Some((expression, names, values)) = &filter {
            request = request.filter_expression(*expression);
            for (placeholder, attr) in names {
                request = request.expression_attribute_names(*placeholder, *attr);
            }
            for (placeholder, value) in values {
                request = request.expression_attribute_values(*placeholder, value.clone());
            }
        }

        if let Some(key) = last_key.take() {
            request = request.set_exclusive_start_key(Some(key));
        }

        let output = request
            .send()
            .await
            .map_err(|e| internal("query failed", e))?;

        if let Some(batch) = output.items {
            items.extend(batch);
        }

        last_key = output.last_evaluated_key;
        if last_key.is_none() {
            break;
        }
    }

    Ok(items)
}

/// Full-table scan following pagination. Used by the cleanup sweep and the
/// admin listings only.
async fn scan_all(
    client: &Client,
    table_name: &str,
) -> StoreResult<Vec<HashMap<String, AttributeValue>>> {
    let mut items = Vec::new();
    let mut last_key: Option<HashMap<String, AttributeValue>> = None;

    loop {
        let mut request = client.scan().table_name(table_name);
        if let Some(key) = last_key.take() {
            request = request.set_exclusive_start_key(Some(key));
        }

        let output = request
            .send()
            .await
            .map_err(|e| internal("scan failed", e))?;

        if let Some(batch) = output.items {
            items.extend(batch);
        }

        last_key = output.last_evaluated_key;
        if last_key.is_none() {
            break;
        }
    }

    Ok(items)
}

pub struct DynamoFamilyStore {
    client: Client,
    table_name: String,
}

impl DynamoFamilyStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("FAMILIES_TABLE", DEFAULT_FAMILIES_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait::async_trait]
impl FamilyStore for DynamoFamilyStore {
    async fn get_family(&self, id: &str) -> StoreResult<Family> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| internal("get_family failed", e))?;

        match output.item {
            Some(item) => Ok(from_item(item)?),
            None => Err(StoreError::NotFound(format!("family {}", id))),
        }
    }

    async fn get_family_by_alias(&self, alias_name: &str) -> StoreResult<Family> {
        let items = query_index(
            &self.client,
            &self.table_name,
            ALIAS_INDEX,
            "aliasName",
            alias_name,
            None,
        )
        .await?;

        let item = items
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("family alias {}", alias_name)))?;
        Ok(from_item(item)?)
    }

    async fn family_exists(&self, id: &str) -> StoreResult<bool> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .projection_expression("id")
            .send()
            .await
            .map_err(|e| internal("family_exists failed", e))?;

        Ok(output.item.is_some())
    }

    async fn get_all_families(&self) -> StoreResult<Vec<Family>> {
        let items = scan_all(&self.client, &self.table_name).await?;
        Ok(from_items(items)?)
    }

    async fn save_family(&self, family: Family) -> StoreResult<Family> {
        let item = to_item(&family)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| internal("save_family failed", e))?;
        debug!("Saved family id={} alias={}", family.id, family.alias_name);
        Ok(family)
    }
}

pub struct DynamoUserStore {
    client: Client,
    table_name: String,
}

impl DynamoUserStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("USERS_TABLE", DEFAULT_USERS_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait::async_trait]
impl UserStore for DynamoUserStore {
    async fn get_user(&self, id: &str) -> StoreResult<ExpenseUser> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| internal("get_user failed", e))?;

        match output.item {
            Some(item) => Ok(from_item(item)?),
            None => Err(StoreError::NotFound(format!("user {}", id))),
        }
    }

    async fn get_user_by_email(&self, email: &str) -> StoreResult<Option<ExpenseUser>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            EMAIL_INDEX,
            "email",
            email,
            None,
        )
        .await?;

        match items.into_iter().next() {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }

    async fn get_all_users(&self) -> StoreResult<Vec<ExpenseUser>> {
        let items = scan_all(&self.client, &self.table_name).await?;
        Ok(from_items(items)?)
    }

    async fn save_user(&self, user: ExpenseUser) -> StoreResult<ExpenseUser> {
        let item = to_item(&user)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| internal("save_user failed", e))?;
        Ok(user)
    }
}

pub struct DynamoJoinRequestStore {
    client: Client,
    table_name: String,
}

impl DynamoJoinRequestStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("JOIN_REQUESTS_TABLE", DEFAULT_JOIN_REQUESTS_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

/// Newest-first ordering shared by the requester-scoped lookups.
fn sort_newest_first(requests: &mut [JoinRequest]) {
    requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

#[async_trait::async_trait]
impl JoinRequestStore for DynamoJoinRequestStore {
    async fn save_join_request(&self, request: JoinRequest) -> StoreResult<JoinRequest> {
        let item = to_item(&request)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| internal("save_join_request failed", e))?;
        Ok(request)
    }

    async fn get_join_request(&self, id: &str) -> StoreResult<JoinRequest> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .send()
            .await
            .map_err(|e| internal("get_join_request failed", e))?;

        match output.item {
            Some(item) => Ok(from_item(item)?),
            None => Err(StoreError::NotFound(format!("join request {}", id))),
        }
    }

    async fn find_by_requester_and_family(
        &self,
        requester_id: &str,
        family_id: &str,
    ) -> StoreResult<Vec<JoinRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            REQUESTER_INDEX,
            "requesterId",
            requester_id,
            Some((
                "#f = :f",
                vec![("#f", "familyId")],
                vec![(":f", AttributeValue::S(family_id.to_string()))],
            )),
        )
        .await?;

        let mut requests: Vec<JoinRequest> = from_items(items)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester_and_status(
        &self,
        requester_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            REQUESTER_INDEX,
            "requesterId",
            requester_id,
            Some((
                "#s = :s",
                vec![("#s", "status")],
                vec![(":s", AttributeValue::S(status.as_str().to_string()))],
            )),
        )
        .await?;

        let mut requests: Vec<JoinRequest> = from_items(items)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester_and_family_and_status(
        &self,
        requester_id: &str,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            REQUESTER_INDEX,
            "requesterId",
            requester_id,
            Some((
                "#f = :f AND #s = :s",
                vec![("#f", "familyId"), ("#s", "status")],
                vec![
                    (":f", AttributeValue::S(family_id.to_string())),
                    (":s", AttributeValue::S(status.as_str().to_string())),
                ],
            )),
        )
        .await?;

        let mut requests: Vec<JoinRequest> = from_items(items)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_requester(&self, requester_id: &str) -> StoreResult<Vec<JoinRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            REQUESTER_INDEX,
            "requesterId",
            requester_id,
            None,
        )
        .await?;

        let mut requests: Vec<JoinRequest> = from_items(items)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }

    async fn find_by_family_and_status(
        &self,
        family_id: &str,
        status: JoinRequestStatus,
    ) -> StoreResult<Vec<JoinRequest>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            FAMILY_INDEX,
            "familyId",
            family_id,
            Some((
                "#s = :s",
                vec![("#s", "status")],
                vec![(":s", AttributeValue::S(status.as_str().to_string()))],
            )),
        )
        .await?;

        let mut requests: Vec<JoinRequest> = from_items(items)?;
        sort_newest_first(&mut requests);
        Ok(requests)
    }
}

pub struct DynamoExpenseStore {
    client: Client,
    table_name: String,
}

impl DynamoExpenseStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("EXPENSES_TABLE", DEFAULT_EXPENSES_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait::async_trait]
impl ExpenseStore for DynamoExpenseStore {
    async fn delete_by_family_id(&self, family_id: &str) -> StoreResult<usize> {
        let items = query_index(
            &self.client,
            &self.table_name,
            FAMILY_INDEX,
            "familyId",
            family_id,
            None,
        )
        .await?;

        let mut deleted = 0usize;
        for item in items {
            let id = match item.get("id").and_then(|v| v.as_s().ok()) {
                Some(id) => id.clone(),
                None => continue,
            };

            self.client
                .delete_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id))
                .send()
                .await
                .map_err(|e| internal("delete_by_family_id failed", e))?;
            deleted += 1;
        }

        debug!("Deleted {} expenses for family_id={}", deleted, family_id);
        Ok(deleted)
    }
}

pub struct DynamoNotificationStore {
    client: Client,
    table_name: String,
}

impl DynamoNotificationStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("NOTIFICATIONS_TABLE", DEFAULT_NOTIFICATIONS_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait::async_trait]
impl NotificationStore for DynamoNotificationStore {
    async fn save_notification(&self, notification: Notification) -> StoreResult<Notification> {
        let item = to_item(&notification)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| internal("save_notification failed", e))?;
        Ok(notification)
    }

    async fn mark_read(&self, id: &str) -> StoreResult<()> {
        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .update_expression("SET #r = :r")
            .expression_attribute_names("#r", "read")
            .expression_attribute_values(":r", AttributeValue::Bool(true))
            .condition_expression("attribute_exists(id)")
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if format!("{:?}", e).contains("ConditionalCheckFailed") => {
                Err(StoreError::NotFound(format!("notification {}", id)))
            }
            Err(e) => Err(internal("mark_read failed", e)),
        }
    }
}

pub struct DynamoPushTokenStore {
    client: Client,
    table_name: String,
}

impl DynamoPushTokenStore {
    pub async fn new() -> Self {
        Self {
            client: default_client().await,
            table_name: table_from_env("PUSH_TOKENS_TABLE", DEFAULT_PUSH_TOKENS_TABLE),
        }
    }

    pub fn with_client_and_table(client: Client, table_name: String) -> Self {
        Self { client, table_name }
    }
}

#[async_trait::async_trait]
impl PushTokenStore for DynamoPushTokenStore {
    async fn get_push_tokens(&self, user_ids: &[String]) -> StoreResult<Vec<PushToken>> {
        let mut tokens = Vec::new();
        // Table is keyed (userId, pushToken); one query per user.
        for user_id in user_ids {
            let output = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("#u = :u")
                .expression_attribute_names("#u", "userId")
                .expression_attribute_values(":u", AttributeValue::S(user_id.clone()))
                .send()
                .await
                .map_err(|e| internal("get_push_tokens failed", e))?;

            if let Some(items) = output.items {
                let batch: Vec<PushToken> = from_items(items)?;
                tokens.extend(batch);
            }
        }
        Ok(tokens)
    }

    async fn save_push_token(&self, token: PushToken) -> StoreResult<()> {
        let item = to_item(&token)?;
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| internal("save_push_token failed", e))?;
        Ok(())
    }

    async fn delete_push_token(&self, user_id: &str, push_token: &str) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("userId", AttributeValue::S(user_id.to_string()))
            .key("pushToken", AttributeValue::S(push_token.to_string()))
            .send()
            .await
            .map_err(|e| internal("delete_push_token failed", e))?;
        Ok(())
    }
}

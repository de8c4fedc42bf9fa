use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use chrono::{Duration, Utc};
use famledger_shared::models::{now_str, ExpenseUser, Family, JoinRequest, JoinRequestStatus};
use famledger_shared::test_utils::mock_stores::{
    MockDispatcher, MockExpenseStore, MockFamilyStore, MockJoinRequestStore,
    MockNotificationStore, MockPushTokenStore, MockUserStore,
};
use famledger_shared::test_utils::test_logging::init_test_logging;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::routes::create_router_with_state;
use crate::state::AppState;

mod join_request_handlers_test;

/// Handles on the mock stores behind a test app, for seeding and asserting.
pub struct TestContext {
    pub families: Arc<MockFamilyStore>,
    pub users: Arc<MockUserStore>,
    pub join_requests: Arc<MockJoinRequestStore>,
    pub expenses: Arc<MockExpenseStore>,
    pub notifications: Arc<MockNotificationStore>,
    pub push_tokens: Arc<MockPushTokenStore>,
    pub dispatcher: Arc<MockDispatcher>,
}

/// Builds the real router over mock stores.
pub fn create_test_app() -> (Router, TestContext) {
    init_test_logging();

    let ctx = TestContext {
        families: Arc::new(MockFamilyStore::new()),
        users: Arc::new(MockUserStore::new()),
        join_requests: Arc::new(MockJoinRequestStore::new()),
        expenses: Arc::new(MockExpenseStore::new()),
        notifications: Arc::new(MockNotificationStore::new()),
        push_tokens: Arc::new(MockPushTokenStore::new()),
        dispatcher: Arc::new(MockDispatcher::new()),
    };

    let state = AppState {
        families: ctx.families.clone(),
        users: ctx.users.clone(),
        join_requests: ctx.join_requests.clone(),
        expenses: ctx.expenses.clone(),
        notifications: ctx.notifications.clone(),
        push_tokens: ctx.push_tokens.clone(),
        dispatcher: ctx.dispatcher.clone(),
        last_cleanup: Arc::new(RwLock::new(None)),
    };

    let app = create_router_with_state(state, "");
    (app, ctx)
}

pub fn test_user(id: &str, email: &str, family_id: Option<&str>) -> ExpenseUser {
    ExpenseUser {
        id: id.to_string(),
        email: email.to_string(),
        alias_name: id.to_string(),
        family_id: family_id.map(|f| f.to_string()),
        fcm_token: None,
        created_at: now_str(),
        updated_at: now_str(),
    }
}

pub fn test_family(
    id: &str,
    alias_name: &str,
    head_id: &str,
    max_size: u32,
    members: &[&str],
) -> Family {
    Family {
        id: id.to_string(),
        alias_name: alias_name.to_string(),
        head_id: head_id.to_string(),
        name: format!("Family {}", alias_name),
        max_size,
        members_ids: members.iter().map(|m| m.to_string()).collect(),
        pending_member_emails: HashMap::new(),
        created_at: now_str(),
        updated_at: now_str(),
    }
}

/// A join attempt created `age_hours` ago.
pub fn aged_request(
    requester_id: &str,
    family_id: &str,
    status: JoinRequestStatus,
    age_hours: i64,
) -> JoinRequest {
    let created = (Utc::now() - Duration::hours(age_hours)).to_rfc3339();
    JoinRequest {
        id: Uuid::new_v4().to_string(),
        requester_id: requester_id.to_string(),
        family_id: family_id.to_string(),
        message: None,
        status,
        created_at: created.clone(),
        updated_at: created,
    }
}

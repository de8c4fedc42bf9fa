use std::sync::Arc;

use famledger_shared::cleanup::CleanupReport;
use famledger_shared::push::{ExpoPushClient, NotificationDispatcher};
use famledger_shared::store::dynamo::{
    DynamoExpenseStore, DynamoFamilyStore, DynamoJoinRequestStore, DynamoNotificationStore,
    DynamoPushTokenStore, DynamoUserStore,
};
use famledger_shared::store::{
    ExpenseStore, FamilyStore, JoinRequestStore, NotificationStore, PushTokenStore, UserStore,
};
use serde::Serialize;
use tokio::sync::RwLock;

/// Metrics of the most recent manual cleanup run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupRunStatus {
    pub ran_at: String,
    #[serde(flatten)]
    pub report: CleanupReport,
}

/// Everything a request handler needs, injected at router construction so
/// tests can swap the stores and the dispatcher for in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub families: Arc<dyn FamilyStore>,
    pub users: Arc<dyn UserStore>,
    pub join_requests: Arc<dyn JoinRequestStore>,
    pub expenses: Arc<dyn ExpenseStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub push_tokens: Arc<dyn PushTokenStore>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub last_cleanup: Arc<RwLock<Option<CleanupRunStatus>>>,
}

impl AppState {
    /// Production wiring: DynamoDB stores and the Expo push client.
    pub async fn new_dynamo() -> Self {
        AppState {
            families: Arc::new(DynamoFamilyStore::new().await),
            users: Arc::new(DynamoUserStore::new().await),
            join_requests: Arc::new(DynamoJoinRequestStore::new().await),
            expenses: Arc::new(DynamoExpenseStore::new().await),
            notifications: Arc::new(DynamoNotificationStore::new().await),
            push_tokens: Arc::new(DynamoPushTokenStore::new().await),
            dispatcher: Arc::new(ExpoPushClient::new()),
            last_cleanup: Arc::new(RwLock::new(None)),
        }
    }
}

use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use env_logger;
use famledger_shared::cleanup::cleanup_orphaned_family_references;
use famledger_shared::store::dynamo::{DynamoExpenseStore, DynamoFamilyStore, DynamoUserStore};
use lambda_runtime::{service_fn, Error, LambdaEvent};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting Cleanup Service Lambda");

    let user_store = Arc::new(DynamoUserStore::new().await);
    let family_store = Arc::new(DynamoFamilyStore::new().await);
    let expense_store = Arc::new(DynamoExpenseStore::new().await);

    lambda_runtime::run(service_fn(|event| {
        handler(
            event,
            user_store.clone(),
            family_store.clone(),
            expense_store.clone(),
        )
    }))
    .await?;

    Ok(())
}

/// Scheduled entry point: one full sweep per CloudWatch trigger.
async fn handler(
    _event: LambdaEvent<CloudWatchEvent>,
    user_store: Arc<DynamoUserStore>,
    family_store: Arc<DynamoFamilyStore>,
    expense_store: Arc<DynamoExpenseStore>,
) -> Result<(), Error> {
    info!("Cleanup service triggered");

    let report = match cleanup_orphaned_family_references(
        user_store.as_ref(),
        family_store.as_ref(),
        expense_store.as_ref(),
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("Cleanup sweep failed: {:?}", e);
            return Err(Error::from(format!("Cleanup sweep failed: {:?}", e)));
        }
    };

    info!(
        "Cleanup run finished: {}",
        serde_json::to_string(&report).unwrap_or_else(|_| format!("{:?}", report))
    );

    Ok(())
}

//! Orphaned family-reference cleanup.
//!
//! `ExpenseUser.family_id` is a weak reference with no integrity guarantee
//! from the store, so a deleted family leaves members pointing at nothing.
//! The sweep clears those references and removes the dead family's expense
//! rows. Users whose reference still resolves are not written at all, which
//! is what makes back-to-back runs idempotent.

use std::time::Instant;

use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::models::now_str;
use crate::store::{ExpenseStore, FamilyStore, StoreResult, UserStore};

/// Metrics for one cleanup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub users_processed: usize,
    pub orphans_cleaned: usize,
    pub expenses_deleted: usize,
    pub duration_ms: u64,
}

/// Scans every user and repairs dangling family references.
pub async fn cleanup_orphaned_family_references(
    users: &dyn UserStore,
    families: &dyn FamilyStore,
    expenses: &dyn ExpenseStore,
) -> StoreResult<CleanupReport> {
    let started = Instant::now();

    let all_users = users.get_all_users().await?;
    let users_processed = all_users.len();
    info!("Cleanup sweep over {} users", users_processed);

    let mut orphans_cleaned = 0usize;
    let mut expenses_deleted = 0usize;

    for mut user in all_users {
        let family_id = match user.family_id.clone() {
            Some(id) => id,
            None => continue,
        };

        match families.family_exists(&family_id).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                error!(
                    "Skipping user {}: family lookup for {} failed: {}",
                    user.id, family_id, e
                );
                continue;
            }
        }

        info!(
            "User {} references missing family {}, clearing",
            user.id, family_id
        );

        user.family_id = None;
        user.updated_at = now_str();
        if let Err(e) = users.save_user(user.clone()).await {
            error!("Failed to clear family reference for user {}: {}", user.id, e);
            continue;
        }
        orphans_cleaned += 1;

        match expenses.delete_by_family_id(&family_id).await {
            Ok(count) => {
                expenses_deleted += count;
                info!(
                    "Deleted {} expenses for orphaned family {}",
                    count, family_id
                );
            }
            Err(e) => {
                error!(
                    "Failed to delete expenses for orphaned family {}: {}",
                    family_id, e
                );
            }
        }
    }

    let report = CleanupReport {
        users_processed,
        orphans_cleaned,
        expenses_deleted,
        duration_ms: started.elapsed().as_millis() as u64,
    };

    info!(
        "Cleanup complete: processed {} users, cleaned {} orphans, deleted {} expenses in {}ms",
        report.users_processed, report.orphans_cleaned, report.expenses_deleted, report.duration_ms
    );

    Ok(report)
}

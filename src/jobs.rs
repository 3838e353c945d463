use crate::errors::DeskError;
use crate::storage;
use sea_orm::DatabaseConnection;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

/// Every hour, on the hour.
pub const TOKEN_CLEANUP_SCHEDULE: &str = "0 0 * * * *";

/// Initialize and start the job scheduler with all background tasks
pub async fn init_scheduler(db: DatabaseConnection) -> Result<JobScheduler, DeskError> {
    let sched = JobScheduler::new()
        .await
        .map_err(|e| DeskError::Other(format!("Failed to create job scheduler: {}", e)))?;

    let db_clone = db.clone();

    let cleanup_tokens_job = Job::new_async(TOKEN_CLEANUP_SCHEDULE, move |_uuid, _l| {
        let db = db_clone.clone();
        Box::pin(async move {
            // Failures are logged inside; the next run retries.
            let _ = run_token_cleanup(&db).await;
        })
    })
    .map_err(|e| DeskError::Other(format!("Failed to create cleanup tokens job: {}", e)))?;

    sched
        .add(cleanup_tokens_job)
        .await
        .map_err(|e| DeskError::Other(format!("Failed to add cleanup tokens job: {}", e)))?;

    sched
        .start()
        .await
        .map_err(|e| DeskError::Other(format!("Failed to start job scheduler: {}", e)))?;

    info!("Job scheduler started with {} jobs", 1);

    Ok(sched)
}

/// Purge expired and revoked access tokens, returning how many were removed.
pub async fn run_token_cleanup(db: &DatabaseConnection) -> Result<u64, DeskError> {
    info!("Running cleanup_expired_access_tokens job");
    match storage::cleanup_expired_access_tokens(db).await {
        Ok(count) => {
            info!("Cleaned up {} expired or revoked access tokens", count);
            Ok(count)
        }
        Err(e) => {
            error!("Failed to cleanup expired access tokens: {}", e);
            Err(e)
        }
    }
}

//! Command expiry background job.
//!
//! Sweeps the command store and expires pending/sent commands whose
//! expires_at has passed, so a lost poll response or a device that never
//! came back cannot leave a command live forever. Expired commands are
//! retryable through the batch retry endpoint.

use persistence::repositories::CommandRepository;
use sqlx::PgPool;
use tracing::info;

use crate::middleware::metrics::record_commands_expired;

use super::scheduler::{Job, JobFrequency};

/// Background job that expires overdue commands.
pub struct CommandExpiryJob {
    pool: PgPool,
    sweep_minutes: u64,
}

impl CommandExpiryJob {
    /// Create a new command expiry job.
    pub fn new(pool: PgPool, sweep_minutes: u64) -> Self {
        Self {
            pool,
            sweep_minutes,
        }
    }
}

#[async_trait::async_trait]
impl Job for CommandExpiryJob {
    fn name(&self) -> &'static str {
        "command_expiry"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.sweep_minutes.max(1))
    }

    async fn execute(&self) -> Result<(), String> {
        let repo = CommandRepository::new(self.pool.clone());

        let expired = repo
            .expire_overdue()
            .await
            .map_err(|e| format!("Failed to expire commands: {}", e))?;

        if expired > 0 {
            record_commands_expired(expired);
            info!(expired = expired, "Expired overdue commands");
        }

        Ok(())
    }
}

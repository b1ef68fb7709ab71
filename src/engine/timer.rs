//! Timeout source raced against running processes

use std::time::Duration;

use async_trait::async_trait;

/// Resolves once `limit` has elapsed for the run being timed.
#[async_trait]
pub trait Deadline: Send + Sync {
    async fn wait(&self, limit: Duration);
}

/// Real wall-clock timer
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClock;

#[async_trait]
impl Deadline for WallClock {
    async fn wait(&self, limit: Duration) {
        tokio::time::sleep(limit).await;
    }
}

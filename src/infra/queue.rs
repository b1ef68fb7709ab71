//! Job queue transport
//!
//! Requests and responses travel over named FIFO lists. Redis is the
//! production transport; [`MemoryQueue`] serves single-process setups and
//! tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::{Mutex, Notify};
use tracing::{info, warn};

use crate::error::QueueError;

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append `payload` to the tail of `queue`.
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError>;

    /// Pop from the head of `queue`, waiting up to `timeout`.
    /// Returns `Ok(None)` when nothing arrived in time.
    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError>;

    /// Drop the current transport so the next call starts from scratch.
    async fn reconnect(&self) -> Result<(), QueueError>;
}

/// Redis lists driven with RPUSH/BLPOP.
///
/// Blocking pops get their own connection so they never stall pushes
/// multiplexed on the other one.
pub struct RedisQueue {
    client: redis::Client,
    commands: Mutex<Option<MultiplexedConnection>>,
    blocking: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    /// Connect, retrying every `retry_backoff` until Redis answers.
    pub async fn connect(redis_url: &str, retry_backoff: Duration) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let conn = get_connection_with_retry(&client, retry_backoff).await;
        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client,
            commands: Mutex::new(Some(conn)),
            blocking: Mutex::new(None),
        })
    }

    async fn connection(
        &self,
        slot: &Mutex<Option<MultiplexedConnection>>,
    ) -> Result<MultiplexedConnection, QueueError> {
        let mut slot = slot.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        let mut conn = self.connection(&self.commands).await?;
        if let Err(e) = conn.rpush::<_, _, ()>(queue, payload).await {
            warn!("Redis RPUSH failed: {}. Reconnecting and retrying...", e);
            *self.commands.lock().await = None;
            let mut conn = self.connection(&self.commands).await?;
            conn.rpush::<_, _, ()>(queue, payload).await?;
        }
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        let mut conn = self.connection(&self.blocking).await?;
        let popped: Option<(String, String)> = match conn.blpop(queue, timeout.as_secs_f64()).await
        {
            Ok(popped) => popped,
            Err(e) => {
                *self.blocking.lock().await = None;
                return Err(e.into());
            }
        };
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn reconnect(&self) -> Result<(), QueueError> {
        *self.blocking.lock().await = None;
        *self.commands.lock().await = None;
        self.connection(&self.commands).await?;
        Ok(())
    }
}

async fn get_connection_with_retry(
    client: &redis::Client,
    retry_backoff: Duration,
) -> MultiplexedConnection {
    loop {
        match client.get_multiplexed_async_connection().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!(
                    "Failed to connect to Redis: {}. Retrying in {:?}...",
                    e, retry_backoff
                );
                tokio::time::sleep(retry_backoff).await;
            }
        }
    }
}

/// In-process queue with the same semantics as [`RedisQueue`]
#[derive(Default)]
pub struct MemoryQueue {
    queues: StdMutex<HashMap<String, VecDeque<String>>>,
    notify: Notify,
    #[cfg(test)]
    pub(crate) failures: testing::Failures,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, queue: &str) -> usize {
        self.lock().get(queue).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        // A poisoned map is still structurally valid
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take(&self, queue: &str) -> Option<String> {
        self.lock().get_mut(queue).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), QueueError> {
        self.lock()
            .entry(queue.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn pop(&self, queue: &str, timeout: Duration) -> Result<Option<String>, QueueError> {
        #[cfg(test)]
        self.failures.check()?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.take(queue) {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.take(queue));
            }
        }
    }

    async fn reconnect(&self) -> Result<(), QueueError> {
        #[cfg(test)]
        self.failures.reconnected();
        Ok(())
    }
}

//! Worker loop: take evaluation requests off the shared queue, judge them
//! and answer on the queue each request names.

pub mod evaluation;
pub mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::WorkerConfig;
use crate::error::QueueError;
use crate::infra::queue::JobQueue;
use crate::jobs::evaluation::Evaluator;
use crate::protocol::QueueMessage;

pub struct Worker {
    queue: Arc<dyn JobQueue>,
    evaluator: Arc<Evaluator>,
    request_queue: String,
    pop_timeout: Duration,
    retry_backoff: Duration,
}

impl Worker {
    pub fn new(queue: Arc<dyn JobQueue>, evaluator: Arc<Evaluator>, config: &WorkerConfig) -> Self {
        Self {
            queue,
            evaluator,
            request_queue: config.request_queue.clone(),
            pop_timeout: config.pop_timeout,
            retry_backoff: config.retry_backoff,
        }
    }

    /// Serve requests until the task is cancelled.
    pub async fn run(&self) {
        info!("Waiting for jobs on {}...", self.request_queue);
        loop {
            let raw = match self.queue.pop(&self.request_queue, self.pop_timeout).await {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        "Request queue failed: {}. Reconnecting in {:?}...",
                        e, self.retry_backoff
                    );
                    tokio::time::sleep(self.retry_backoff).await;
                    if let Err(e) = self.queue.reconnect().await {
                        error!("Reconnect failed: {}", e);
                    }
                    continue;
                }
            };

            if let Err(e) = self.handle(&raw).await {
                error!("Failed to deliver evaluation result: {}", e);
            }
        }
    }

    /// Judge one raw request. Malformed requests are logged and dropped.
    pub async fn handle(&self, raw: &str) -> Result<(), QueueError> {
        let message = match serde_json::from_str::<QueueMessage>(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping malformed request: {}", e);
                return Ok(());
            }
        };

        let QueueMessage::BeginEvaluation {
            output_queue,
            evaluation,
        } = message;
        info!(
            "Received {} job: evaluation_id={}, testcases={}",
            evaluation.kind(),
            evaluation.evaluation_id(),
            evaluation.testcases().len()
        );

        let response = self.evaluator.evaluate(&evaluation).await;
        info!(
            "Evaluation {} finished: verdict={}, max_time={}ms, max_memory={}KB",
            response.evaluation_id, response.verdict, response.max_time, response.max_memory
        );

        let payload = match serde_json::to_string(&response) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode evaluation {}: {}", response.evaluation_id, e);
                return Ok(());
            }
        };
        self.queue.push(&output_queue, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::verdict::Verdict;
    use crate::infra::queue::MemoryQueue;
    use crate::languages::Language;
    use crate::protocol::{BatchJob, EvaluationJob, EvaluationResponse, TestcaseSpec};
    use crate::test_support::fixture_evaluator;
    use base64::{engine::general_purpose, Engine as _};
    use tokio_test::assert_ok;

    fn worker(queue: Arc<MemoryQueue>, evaluator: Evaluator) -> Worker {
        Worker {
            queue,
            evaluator: Arc::new(evaluator),
            request_queue: "requests".to_string(),
            pop_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn request(id: u64, output_queue: &str) -> String {
        let job = EvaluationJob::Batch(BatchJob {
            id,
            code: general_purpose::STANDARD.encode("cat"),
            language: Language::Python,
            testcases: vec![TestcaseSpec {
                id: 1,
                input: "7\n".to_string(),
                output: Some("7\n".to_string()),
                cluster: None,
            }],
            time_limit: 2_000,
            memory_limit: 262_144,
            checker: None,
        });
        serde_json::to_string(&QueueMessage::BeginEvaluation {
            output_queue: output_queue.to_string(),
            evaluation: job,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_answers_on_requested_queue() {
        let queue = Arc::new(MemoryQueue::new());
        let (evaluator, _root) = fixture_evaluator();
        let worker = worker(queue.clone(), evaluator);

        assert_ok!(worker.handle(&request(42, "answers")).await);

        let raw = queue
            .pop("answers", Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        let response: EvaluationResponse = serde_json::from_str(&raw).unwrap();
        assert_eq!(response.evaluation_id, 42);
        assert_eq!(response.verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_malformed_request_is_dropped() {
        let queue = Arc::new(MemoryQueue::new());
        let (evaluator, _root) = fixture_evaluator();
        let worker = worker(queue.clone(), evaluator);

        assert_ok!(worker.handle("{\"Nope\": {}}").await);
        assert!(queue.is_empty("answers"));
    }

    #[tokio::test]
    async fn test_run_recovers_from_queue_failures() {
        let queue = Arc::new(MemoryQueue::new());
        queue.failures.fail_next_pops(2);
        let (evaluator, _root) = fixture_evaluator();
        let worker = worker(queue.clone(), evaluator);
        let running = tokio::spawn(async move { worker.run().await });
        while queue.failures.reconnects() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        queue.push("requests", &request(7, "answers")).await.unwrap();
        let raw = queue.pop("answers", Duration::from_secs(10)).await.unwrap();
        running.abort();

        assert!(raw.is_some());
        assert_eq!(queue.failures.reconnects(), 2);
    }
}

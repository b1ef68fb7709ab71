//! Evaluation Orchestrator
//!
//! Builds evaluation jobs, pushes them onto the shared request queue and
//! hands each caller the response carrying its `evaluation_id`. Responses
//! arrive on a queue owned by this instance and are matched against a
//! correlation map of pending listeners.

pub mod aggregator;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use rand::Rng;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::core::model::{EvaluationMode, Payload, ProblemRecord, SourceSubmission, SubmissionRecord};
use crate::error::{OrchestratorError, Result};
use crate::infra::queue::JobQueue;
use crate::infra::storage::BlobStore;
use crate::infra::store::DataStore;
use crate::languages::Language;
use crate::protocol::{
    BatchJob, EvaluationJob, EvaluationResponse, InteractiveJob, OutputOnlyJob, QueueMessage,
    TestcaseSpec,
};

/// Ids stay below 2^53 so JSON consumers without 64-bit integers read them intact
const MAX_EVALUATION_ID: u64 = 1 << 53;

type Listeners = Arc<Mutex<HashMap<u64, oneshot::Sender<EvaluationResponse>>>>;

fn lock(
    listeners: &Listeners,
) -> std::sync::MutexGuard<'_, HashMap<u64, oneshot::Sender<EvaluationResponse>>> {
    listeners.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes its listener when the waiting caller goes away
struct ListenerGuard {
    id: u64,
    listeners: Listeners,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        lock(&self.listeners).remove(&self.id);
    }
}

pub struct Orchestrator {
    queue: Arc<dyn JobQueue>,
    config: OrchestratorConfig,
    listeners: Listeners,
    subscriber: JoinHandle<()>,
}

impl Orchestrator {
    /// Start the response subscriber and return a ready orchestrator.
    pub fn start(queue: Arc<dyn JobQueue>, config: OrchestratorConfig) -> Self {
        let listeners: Listeners = Arc::default();
        let subscriber = tokio::spawn(subscribe(queue.clone(), config.clone(), listeners.clone()));
        info!("Orchestrator listening on {}", config.response_queue);

        Self {
            queue,
            config,
            listeners,
            subscriber,
        }
    }

    pub fn response_queue(&self) -> &str {
        &self.config.response_queue
    }

    /// Number of evaluations still waiting for a response
    pub fn pending(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn register(&self) -> (ListenerGuard, oneshot::Receiver<EvaluationResponse>) {
        let (tx, rx) = oneshot::channel();
        let mut listeners = lock(&self.listeners);
        let mut rng = rand::thread_rng();
        let id = loop {
            let id = rng.gen_range(1..MAX_EVALUATION_ID);
            if !listeners.contains_key(&id) {
                break id;
            }
        };
        listeners.insert(id, tx);

        let guard = ListenerGuard {
            id,
            listeners: self.listeners.clone(),
        };
        (guard, rx)
    }

    /// Dispatch `job` under a fresh evaluation id and wait for its response.
    ///
    /// Whatever id `job` carries is replaced.
    pub async fn evaluate(&self, mut job: EvaluationJob) -> Result<EvaluationResponse> {
        ensure_unique_ids(job.testcases())?;
        let (guard, rx) = self.register();
        let id = guard.id;
        job.set_evaluation_id(id);

        let message = QueueMessage::BeginEvaluation {
            output_queue: self.config.response_queue.clone(),
            evaluation: job,
        };
        let payload = serde_json::to_string(&message)?;
        self.queue.push(&self.config.request_queue, &payload).await?;
        debug!(evaluation_id = id, "evaluation dispatched");

        let response = match self.config.response_deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(response) => response,
                Err(_) => {
                    warn!(
                        "Evaluation {} got no response within {:?}; evicting listener",
                        id, limit
                    );
                    return Err(OrchestratorError::DeadlineExceeded(id));
                }
            },
            None => rx.await,
        };
        drop(guard);

        response.map_err(|_| OrchestratorError::ListenerDropped(id))
    }

    /// Judge a stored submission end to end and persist the outcome.
    pub async fn judge_submission(
        &self,
        store: &dyn DataStore,
        blobs: &dyn BlobStore,
        submission_id: u64,
        problem_id: u64,
        submission: &SourceSubmission,
    ) -> Result<SubmissionRecord> {
        let problem = store.load_problem(problem_id).await?;
        let testcases = resolve_testcases(&problem, blobs).await?;
        let job = build_job(0, &problem, submission, testcases)?;

        info!(
            "Judging submission {} for problem {} ({}, {} testcases)",
            submission_id,
            problem_id,
            job.kind(),
            job.testcases().len()
        );
        let response = self.evaluate(job).await?;

        let record = aggregator::aggregate(&problem, submission_id, &response);
        store.save_submission(&record).await?;
        info!(
            "Submission {} judged: verdict={}, score={}",
            record.id, record.verdict, record.score
        );
        Ok(record)
    }

    /// Stop the response subscriber. Pending evaluations never resolve.
    pub fn shutdown(&self) {
        self.subscriber.abort();
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.subscriber.abort();
    }
}

async fn subscribe(queue: Arc<dyn JobQueue>, config: OrchestratorConfig, listeners: Listeners) {
    loop {
        match queue.pop(&config.response_queue, config.pop_timeout).await {
            Ok(Some(raw)) => dispatch(&listeners, &raw),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    "Response queue failed: {}. Reconnecting in {:?}...",
                    e, config.retry_backoff
                );
                if let Err(e) = queue.reconnect().await {
                    error!("Reconnect failed: {}", e);
                }
                tokio::time::sleep(config.retry_backoff).await;
            }
        }
    }
}

fn dispatch(listeners: &Listeners, raw: &str) {
    let mut response: EvaluationResponse = match serde_json::from_str(raw) {
        Ok(response) => response,
        Err(e) => {
            warn!("Dropping malformed response: {}", e);
            return;
        }
    };
    if let Err(reason) = response.validate() {
        warn!(
            "Dropping invalid response for evaluation {}: {}",
            response.evaluation_id, reason
        );
        return;
    }
    response.normalize();

    let id = response.evaluation_id;
    let listener = lock(listeners).remove(&id);
    match listener {
        Some(tx) => {
            if tx.send(response).is_err() {
                debug!(evaluation_id = id, "listener went away before its response");
            }
        }
        None => warn!("Dropping response for unknown evaluation {}", id),
    }
}

/// A response carries one report per testcase id, so a job listing an id
/// twice could never be answered validly.
fn ensure_unique_ids(testcases: &[TestcaseSpec]) -> Result<()> {
    let mut seen = HashSet::with_capacity(testcases.len());
    match testcases.iter().find(|tc| !seen.insert(tc.id)) {
        Some(tc) => Err(OrchestratorError::InvalidJob(format!(
            "testcase {} is listed more than once",
            tc.id
        ))),
        None => Ok(()),
    }
}

/// Build the job variant matching the problem and the submission.
///
/// `memory_limit_bytes` is converted to the KiB the workers expect.
pub fn build_job(
    evaluation_id: u64,
    problem: &ProblemRecord,
    submission: &SourceSubmission,
    testcases: Vec<TestcaseSpec>,
) -> Result<EvaluationJob> {
    ensure_unique_ids(&testcases)?;
    let memory_limit = submission.memory_limit_bytes / 1024;

    if submission.language == Language::OutputOnly {
        if problem.mode == EvaluationMode::Interactive {
            return Err(OrchestratorError::InvalidJob(format!(
                "problem {} is interactive and cannot take an output-only answer",
                problem.id
            )));
        }
        let count = testcases.len();
        let mut testcases = testcases.into_iter();
        let testcase = match (testcases.next(), count) {
            (Some(testcase), 1) => testcase,
            _ => {
                return Err(OrchestratorError::InvalidJob(format!(
                    "output-only answers need exactly one testcase, problem {} has {}",
                    problem.id, count
                )))
            }
        };
        return Ok(EvaluationJob::OutputOnly(OutputOnlyJob {
            id: evaluation_id,
            output: submission.code.clone(),
            testcase,
            checker: problem.checker.clone(),
        }));
    }

    match problem.mode {
        EvaluationMode::OutputOnly => Err(OrchestratorError::InvalidJob(format!(
            "problem {} only accepts output-only answers, got {}",
            problem.id,
            submission.language.name()
        ))),
        EvaluationMode::Interactive => {
            let checker = problem.checker.clone().ok_or_else(|| {
                OrchestratorError::InvalidJob(format!(
                    "interactive problem {} has no checker",
                    problem.id
                ))
            })?;
            Ok(EvaluationJob::Interactive(InteractiveJob {
                id: evaluation_id,
                code: submission.code.clone(),
                language: submission.language,
                testcases,
                time_limit: submission.time_limit_ms,
                memory_limit,
                checker,
            }))
        }
        EvaluationMode::Batch => Ok(EvaluationJob::Batch(BatchJob {
            id: evaluation_id,
            code: submission.code.clone(),
            language: submission.language,
            testcases,
            time_limit: submission.time_limit_ms,
            memory_limit,
            checker: problem.checker.clone(),
        })),
    }
}

async fn resolve(blobs: &dyn BlobStore, payload: &Payload) -> Result<String> {
    match payload {
        Payload::Inline(text) => Ok(text.clone()),
        Payload::Blob(key) => Ok(blobs.fetch(key).await?),
    }
}

/// Materialize every testcase of `problem`, tagged with its cluster.
pub async fn resolve_testcases(
    problem: &ProblemRecord,
    blobs: &dyn BlobStore,
) -> Result<Vec<TestcaseSpec>> {
    let mut testcases = Vec::new();
    for cluster in &problem.clusters {
        for testcase in &cluster.testcases {
            let output = match &testcase.output {
                Some(payload) => Some(resolve(blobs, payload).await?),
                None => None,
            };
            testcases.push(TestcaseSpec {
                id: testcase.id,
                input: resolve(blobs, &testcase.input).await?,
                output,
                cluster: Some(cluster.id),
            });
        }
    }
    Ok(testcases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use base64::{engine::general_purpose, Engine as _};
    use tokio_test::assert_err;

    use crate::config::WorkerConfig;
    use crate::core::model::{ClusterRecord, TestcaseRecord};
    use crate::core::verdict::Verdict;
    use crate::infra::queue::MemoryQueue;
    use crate::infra::storage::MemoryBlobStore;
    use crate::infra::store::MemoryStore;
    use crate::jobs::Worker;
    use crate::protocol::{CheckerSpec, TestcaseReport};
    use crate::test_support::fixture_evaluator;

    fn config(deadline: Option<Duration>) -> OrchestratorConfig {
        OrchestratorConfig {
            request_queue: "requests".to_string(),
            response_queue: "responses".to_string(),
            pop_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(10),
            response_deadline: deadline,
        }
    }

    fn submission(language: Language, code: &str) -> SourceSubmission {
        SourceSubmission {
            language,
            code: general_purpose::STANDARD.encode(code),
            time_limit_ms: 2_000,
            memory_limit_bytes: 256 * 1024 * 1024,
        }
    }

    fn problem(mode: EvaluationMode, checker: Option<CheckerSpec>, testcases: u64) -> ProblemRecord {
        ProblemRecord {
            id: 5,
            mode,
            checker,
            clusters: vec![ClusterRecord {
                id: 1,
                score: 100,
                is_sample: false,
                testcases: (1..=testcases)
                    .map(|id| TestcaseRecord {
                        id,
                        input: Payload::Inline(format!("{}\n", id)),
                        output: Some(Payload::Inline(format!("{}\n", id))),
                    })
                    .collect(),
            }],
        }
    }

    fn spec(id: u64) -> TestcaseSpec {
        TestcaseSpec {
            id,
            input: String::new(),
            output: None,
            cluster: None,
        }
    }

    fn response(id: u64, verdict: Verdict) -> EvaluationResponse {
        EvaluationResponse {
            evaluation_id: id,
            verdict: verdict.clone(),
            max_time: 1,
            max_memory: 1,
            compiler_output: None,
            testcases: vec![TestcaseReport {
                id: 1,
                verdict,
                time: 1,
                memory: 1,
                exit_code: None,
                error: None,
                output: None,
            }],
        }
    }

    async fn pop_request(queue: &MemoryQueue) -> (String, EvaluationJob) {
        let raw = queue
            .pop("requests", Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        let QueueMessage::BeginEvaluation {
            output_queue,
            evaluation,
        } = serde_json::from_str(&raw).unwrap();
        (output_queue, evaluation)
    }

    #[test]
    fn test_build_job_variants() {
        let cpp = submission(Language::Cpp, "int main() {}");

        let job = build_job(1, &problem(EvaluationMode::Batch, None, 2), &cpp, vec![spec(1), spec(2)])
            .unwrap();
        match job {
            EvaluationJob::Batch(batch) => {
                assert_eq!(batch.memory_limit, 262_144);
                assert_eq!(batch.testcases.len(), 2);
            }
            other => panic!("expected batch job, got {:?}", other),
        }

        let err = build_job(1, &problem(EvaluationMode::Interactive, None, 1), &cpp, vec![spec(1)]);
        assert!(matches!(err, Err(OrchestratorError::InvalidJob(_))));

        let checker = CheckerSpec {
            script: "echo AC".to_string(),
            language: Language::Python,
        };
        let job = build_job(
            1,
            &problem(EvaluationMode::Interactive, Some(checker), 1),
            &cpp,
            vec![spec(1)],
        )
        .unwrap();
        assert_eq!(job.kind(), "interactive");
    }

    #[test]
    fn test_build_output_only_job() {
        let answer = submission(Language::OutputOnly, "42\n");
        let single = problem(EvaluationMode::OutputOnly, None, 1);

        let job = build_job(3, &single, &answer, vec![spec(1)]).unwrap();
        assert_eq!(job.kind(), "output_only");
        assert_eq!(job.testcases().len(), 1);

        let err = build_job(3, &single, &answer, vec![spec(1), spec(2)]);
        assert!(matches!(err, Err(OrchestratorError::InvalidJob(_))));

        let cpp = submission(Language::Cpp, "int main() {}");
        let err = build_job(3, &single, &cpp, vec![spec(1)]);
        assert!(matches!(err, Err(OrchestratorError::InvalidJob(_))));
    }

    #[test]
    fn test_build_job_rejects_repeated_testcase_ids() {
        let cpp = submission(Language::Cpp, "int main() {}");
        let err = build_job(1, &problem(EvaluationMode::Batch, None, 2), &cpp, vec![spec(1), spec(2), spec(1)]);
        assert!(matches!(err, Err(OrchestratorError::InvalidJob(_))));
    }

    #[tokio::test]
    async fn test_repeated_testcase_across_clusters_fails_before_dispatch() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(None));
        let store = MemoryStore::new();
        let mut problem = problem(EvaluationMode::Batch, None, 1);
        let mut second = problem.clusters[0].clone();
        second.id = 2;
        problem.clusters.push(second);
        store.insert_problem(problem);

        let judged = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.judge_submission(
                &store,
                &MemoryBlobStore::new(),
                1,
                5,
                &submission(Language::C, ""),
            ),
        )
        .await
        .expect("judging a problem with a repeated testcase must not hang");

        assert!(matches!(judged, Err(OrchestratorError::InvalidJob(_))));
        assert!(queue.is_empty("requests"));
        assert_eq!(orchestrator.pending(), 0);
    }

    #[tokio::test]
    async fn test_evaluate_rejects_repeated_testcase_ids() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(None));
        let mut job = build_job(0, &problem(EvaluationMode::Batch, None, 1), &submission(Language::C, ""), vec![spec(1)])
            .unwrap();
        if let EvaluationJob::Batch(batch) = &mut job {
            batch.testcases.push(spec(1));
        }

        let err = assert_err!(orchestrator.evaluate(job).await);
        assert!(matches!(err, OrchestratorError::InvalidJob(_)));
        assert!(queue.is_empty("requests"));
        assert_eq!(orchestrator.pending(), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(None));

        let worker = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let (first_queue, first) = pop_request(&queue).await;
                let (second_queue, second) = pop_request(&queue).await;
                // Answer in reverse order; each verdict names its job's testcase count
                for (output_queue, job) in [(second_queue, second), (first_queue, first)] {
                    let verdict = Verdict::Custom(job.testcases().len().to_string());
                    let payload =
                        serde_json::to_string(&response(job.evaluation_id(), verdict)).unwrap();
                    queue.push(&output_queue, &payload).await.unwrap();
                }
            })
        };

        let one = build_job(0, &problem(EvaluationMode::Batch, None, 1), &submission(Language::C, ""), vec![spec(1)])
            .unwrap();
        let three = build_job(
            0,
            &problem(EvaluationMode::Batch, None, 3),
            &submission(Language::C, ""),
            vec![spec(1), spec(2), spec(3)],
        )
        .unwrap();

        let (a, b) = tokio::join!(orchestrator.evaluate(one), orchestrator.evaluate(three));
        worker.await.unwrap();

        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.evaluation_id, b.evaluation_id);
        assert_eq!(a.verdict, Verdict::Custom("1".into()));
        assert_eq!(b.verdict, Verdict::Custom("3".into()));
        assert_eq!(orchestrator.pending(), 0);
    }

    #[tokio::test]
    async fn test_unmatched_and_invalid_responses_are_dropped() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(None));

        let job = build_job(0, &problem(EvaluationMode::Batch, None, 1), &submission(Language::C, ""), vec![spec(1)])
            .unwrap();
        let answering = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let (output_queue, job) = pop_request(&queue).await;
                queue.push(&output_queue, "not json").await.unwrap();
                let stranger = serde_json::to_string(&response(job.evaluation_id() + 1, Verdict::WrongAnswer))
                    .unwrap();
                queue.push(&output_queue, &stranger).await.unwrap();

                let mut duplicated = response(job.evaluation_id(), Verdict::WrongAnswer);
                duplicated.testcases.push(duplicated.testcases[0].clone());
                let duplicated = serde_json::to_string(&duplicated).unwrap();
                queue.push(&output_queue, &duplicated).await.unwrap();

                let mut compile_error = response(job.evaluation_id(), Verdict::Accepted);
                compile_error.verdict = Verdict::CompilationError;
                let compile_error = serde_json::to_string(&compile_error).unwrap();
                queue.push(&output_queue, &compile_error).await.unwrap();
            })
        };

        let response = orchestrator.evaluate(job).await.unwrap();
        answering.await.unwrap();

        assert_eq!(response.verdict, Verdict::CompilationError);
        assert_eq!(response.testcases[0].verdict, Verdict::CompilationError);
    }

    #[tokio::test]
    async fn test_subscriber_reconnects_after_failures() {
        let queue = Arc::new(MemoryQueue::new());
        queue.failures.fail_next_pops(3);
        let orchestrator = Orchestrator::start(queue.clone(), config(None));
        while queue.failures.reconnects() < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let answering = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let (output_queue, job) = pop_request(&queue).await;
                let payload = serde_json::to_string(&response(job.evaluation_id(), Verdict::Accepted))
                    .unwrap();
                queue.push(&output_queue, &payload).await.unwrap();
            })
        };

        let job = build_job(0, &problem(EvaluationMode::Batch, None, 1), &submission(Language::C, ""), vec![spec(1)])
            .unwrap();
        let response = orchestrator.evaluate(job).await.unwrap();
        answering.await.unwrap();
        assert_eq!(response.verdict, Verdict::Accepted);
    }

    #[tokio::test]
    async fn test_deadline_evicts_listener() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(Some(Duration::from_millis(50))));

        let job = build_job(0, &problem(EvaluationMode::Batch, None, 1), &submission(Language::C, ""), vec![spec(1)])
            .unwrap();
        let err = orchestrator.evaluate(job).await.unwrap_err();

        assert!(matches!(err, OrchestratorError::DeadlineExceeded(_)));
        assert_eq!(orchestrator.pending(), 0);
        assert_eq!(queue.len("requests"), 1);
    }

    #[tokio::test]
    async fn test_judge_submission_end_to_end() {
        let queue = Arc::new(MemoryQueue::new());
        let (evaluator, _root) = fixture_evaluator();
        let worker_config = WorkerConfig {
            request_queue: "requests".to_string(),
            pop_timeout: Duration::from_millis(50),
            retry_backoff: Duration::from_millis(10),
            ..WorkerConfig::from_env()
        };
        let worker = Worker::new(queue.clone(), Arc::new(evaluator), &worker_config);
        let running = tokio::spawn(async move { worker.run().await });

        let store = MemoryStore::new();
        let blobs = MemoryBlobStore::new();
        blobs.insert("p9/2.in", "5\n");
        blobs.insert("p9/2.out", "5\n");
        store.insert_problem(ProblemRecord {
            id: 9,
            mode: EvaluationMode::Batch,
            checker: None,
            clusters: vec![
                ClusterRecord {
                    id: 1,
                    score: 0,
                    is_sample: true,
                    testcases: vec![TestcaseRecord {
                        id: 1,
                        input: Payload::Inline("1\n".to_string()),
                        output: Some(Payload::Inline("1\n".to_string())),
                    }],
                },
                ClusterRecord {
                    id: 2,
                    score: 40,
                    is_sample: false,
                    testcases: vec![TestcaseRecord {
                        id: 2,
                        input: Payload::Blob("p9/2.in".to_string()),
                        output: Some(Payload::Blob("p9/2.out".to_string())),
                    }],
                },
                ClusterRecord {
                    id: 3,
                    score: 60,
                    is_sample: false,
                    testcases: vec![
                        TestcaseRecord {
                            id: 3,
                            input: Payload::Inline("3\n".to_string()),
                            output: Some(Payload::Inline("4\n".to_string())),
                        },
                        TestcaseRecord {
                            id: 4,
                            input: Payload::Inline("4\n".to_string()),
                            output: Some(Payload::Inline("4\n".to_string())),
                        },
                    ],
                },
            ],
        });

        let orchestrator = Orchestrator::start(queue.clone(), config(None));
        let record = orchestrator
            .judge_submission(&store, &blobs, 77, 9, &submission(Language::Python, "cat"))
            .await
            .unwrap();
        running.abort();

        assert_eq!(record.verdict, Verdict::WrongAnswer);
        assert_eq!(record.score, 40);
        assert_eq!(
            record.clusters.iter().map(|c| c.verdict.clone()).collect::<Vec<_>>(),
            vec![Verdict::Accepted, Verdict::Accepted, Verdict::WrongAnswer]
        );
        assert_eq!(record.clusters[2].testcases[1].verdict, Verdict::Skipped);
        assert_eq!(store.submission(77), Some(record));
    }

    #[tokio::test]
    async fn test_missing_blob_fails_before_dispatch() {
        let queue = Arc::new(MemoryQueue::new());
        let orchestrator = Orchestrator::start(queue.clone(), config(None));
        let store = MemoryStore::new();
        let mut problem = problem(EvaluationMode::Batch, None, 1);
        problem.clusters[0].testcases[0].input = Payload::Blob("missing".to_string());
        store.insert_problem(problem);

        let err = assert_err!(
            orchestrator
                .judge_submission(&store, &MemoryBlobStore::new(), 1, 5, &submission(Language::C, ""))
                .await
        );
        assert!(matches!(err, OrchestratorError::Store(_)));
        assert!(queue.is_empty("requests"));
    }
}

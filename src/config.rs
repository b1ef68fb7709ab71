use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_REQUEST_QUEUE: &str = "judge:queue";
const RESPONSE_QUEUE_PREFIX: &str = "judge:responses";

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_or(key, default_ms))
}

/// Limits and knobs used while judging a job
#[derive(Debug, Clone)]
pub struct EngineLimits {
    pub compile_timeout: Duration,
    pub checker_timeout: Duration,
    /// Added to the contestant's limit to bound an interactive session
    pub interactive_grace: Duration,
    pub memory_poll_interval: Duration,
    /// Characters of program output echoed back in results
    pub output_preview_limit: usize,
    /// Bytes of stdout/stderr kept per process
    pub output_capture_limit: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            compile_timeout: Duration::from_millis(30_000),
            checker_timeout: Duration::from_millis(10_000),
            interactive_grace: Duration::from_millis(1_000),
            memory_poll_interval: Duration::from_millis(5),
            output_preview_limit: 4096,
            output_capture_limit: 64 * 1024 * 1024,
        }
    }
}

impl EngineLimits {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            compile_timeout: env_ms("COMPILE_TIME_LIMIT_MS", 30_000),
            checker_timeout: env_ms("CHECKER_TIME_LIMIT_MS", 10_000),
            interactive_grace: env_ms("INTERACTIVE_GRACE_MS", 1_000),
            memory_poll_interval: env_ms("MEMORY_POLL_INTERVAL_MS", 5),
            output_preview_limit: env_or("OUTPUT_PREVIEW_LIMIT", default.output_preview_limit),
            output_capture_limit: env_or("OUTPUT_CAPTURE_LIMIT", default.output_capture_limit),
        }
    }
}

/// Judge worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub request_queue: String,
    pub scratch_dir: PathBuf,
    pub languages_config: Option<PathBuf>,
    pub http_addr: Option<String>,
    pub pop_timeout: Duration,
    pub retry_backoff: Duration,
    pub limits: EngineLimits,
}

impl WorkerConfig {
    pub fn from_env() -> Self {
        Self {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            request_queue: env::var("JUDGE_REQUEST_QUEUE")
                .unwrap_or_else(|_| DEFAULT_REQUEST_QUEUE.to_string()),
            scratch_dir: env::var("JUDGE_SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| env::temp_dir()),
            languages_config: env::var("LANGUAGES_CONFIG").ok().map(PathBuf::from),
            http_addr: env::var("JUDGE_HTTP_ADDR").ok().filter(|a| !a.is_empty()),
            pop_timeout: Duration::from_secs(env_or("QUEUE_POP_TIMEOUT_SECS", 5)),
            retry_backoff: env_ms("QUEUE_RETRY_BACKOFF_MS", 3_000),
            limits: EngineLimits::from_env(),
        }
    }
}

/// Orchestrator configuration; each instance owns its response queue
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub request_queue: String,
    pub response_queue: String,
    pub pop_timeout: Duration,
    pub retry_backoff: Duration,
    /// Evict listeners that wait longer than this; `None` waits forever
    pub response_deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_queue: DEFAULT_REQUEST_QUEUE.to_string(),
            response_queue: random_response_queue(),
            pop_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(3_000),
            response_deadline: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        Self {
            request_queue: env::var("JUDGE_REQUEST_QUEUE")
                .unwrap_or_else(|_| DEFAULT_REQUEST_QUEUE.to_string()),
            response_queue: env::var("JUDGE_RESPONSE_QUEUE")
                .unwrap_or_else(|_| random_response_queue()),
            pop_timeout: Duration::from_secs(env_or("QUEUE_POP_TIMEOUT_SECS", 5)),
            retry_backoff: env_ms("QUEUE_RETRY_BACKOFF_MS", 3_000),
            response_deadline: env::var("JUDGE_RESPONSE_DEADLINE_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis),
        }
    }
}

pub fn random_response_queue() -> String {
    format!("{}:{:016x}", RESPONSE_QUEUE_PREFIX, rand::random::<u64>())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_limit_defaults() {
        let limits = EngineLimits::default();
        assert_eq!(limits.compile_timeout, Duration::from_secs(30));
        assert_eq!(limits.checker_timeout, Duration::from_secs(10));
        assert_eq!(limits.output_preview_limit, 4096);
    }

    #[test]
    fn test_response_queues_are_distinct() {
        let a = OrchestratorConfig::default();
        let b = OrchestratorConfig::default();
        assert!(a.response_queue.starts_with("judge:responses:"));
        assert_ne!(a.response_queue, b.response_queue);
        assert!(a.response_deadline.is_none());
    }
}

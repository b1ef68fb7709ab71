//! Interactive checker protocol
//!
//! The contestant's stdout is relayed into the checker's stdin and the
//! checker's stdout into the contestant's stdin. The checker first receives
//! the testcase input framed by a random separator:
//!
//! ```text
//! <sep>\n<input>\n<sep>\n<contestant output...><sep>\nEND\n
//! ```
//!
//! and ends the dialogue by printing `<sep>`. Whatever it prints after that
//! is its verdict token and is no longer relayed to the contestant.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::components::checker::{parse_checker_token, random_separator, CheckerDecision};
use crate::core::verdict::{ErrorVerdict, EvaluationResult, SuccessVerdict};
use crate::engine::executer::{
    exit_code, kill_group, kill_unreaped, read_capped, spawn, wait_and_clear_group, Executer,
    Runnable,
};
use crate::engine::memory::MemorySampler;
use crate::error::ExecError;

/// Exit code of a process killed by SIGPIPE
const SIGPIPE_EXIT: i32 = 128 + 13;
const JOIN_GRACE: Duration = Duration::from_secs(1);

/// Splits a byte stream at the first occurrence of a sentinel.
///
/// Bytes before the sentinel are released as soon as they can no longer be
/// part of it; bytes after it are returned separately.
#[derive(Debug)]
pub(crate) struct SentinelSplitter {
    sentinel: Vec<u8>,
    pending: Vec<u8>,
    found: bool,
}

impl SentinelSplitter {
    pub(crate) fn new(sentinel: &[u8]) -> Self {
        Self {
            sentinel: sentinel.to_vec(),
            pending: Vec::new(),
            found: false,
        }
    }

    pub(crate) fn found(&self) -> bool {
        self.found
    }

    /// Returns `(before, after)` for this chunk.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> (Vec<u8>, Vec<u8>) {
        if self.found {
            return (Vec::new(), chunk.to_vec());
        }

        self.pending.extend_from_slice(chunk);
        if let Some(pos) = find(&self.pending, &self.sentinel) {
            self.found = true;
            let after = self.pending.split_off(pos + self.sentinel.len());
            self.pending.truncate(pos);
            return (std::mem::take(&mut self.pending), after);
        }

        let keep = partial_suffix(&self.pending, &self.sentinel);
        let release = self.pending.len() - keep;
        (self.pending.drain(..release).collect(), Vec::new())
    }

    /// Flush held-back bytes at end of stream.
    pub(crate) fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }
}

/// Length of the longest suffix of `data` that is a proper prefix of `sentinel`.
fn partial_suffix(data: &[u8], sentinel: &[u8]) -> usize {
    let max = sentinel.len().saturating_sub(1).min(data.len());
    (1..=max)
        .rev()
        .find(|&k| data.ends_with(&sentinel[..k]))
        .unwrap_or(0)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// How the session select ended
enum SessionEnd<T> {
    Finished(T),
    TimedOut,
    MemoryExceeded,
}

/// What the checker-to-contestant relay saw
#[derive(Debug, Default)]
struct RelayOutcome {
    concluded: bool,
    verdict: String,
}

/// Judges one testcase of an interactive problem
#[derive(Clone)]
pub struct InteractiveJudge {
    executer: Executer,
    grace: Duration,
}

impl InteractiveJudge {
    pub fn new(executer: Executer, grace: Duration) -> Self {
        Self { executer, grace }
    }

    /// Run `program` against `checker` on one testcase.
    ///
    /// The whole session is bounded by `time_limit` plus the grace period;
    /// at that point both process groups are killed. So they are when the
    /// contestant goes over `memory_limit_kb`.
    pub async fn judge(
        &self,
        program: &Runnable,
        checker: &Runnable,
        input: &str,
        time_limit: Duration,
        memory_limit_kb: u64,
    ) -> Result<EvaluationResult, ExecError> {
        let separator = random_separator();
        let capture_limit = self.executer.capture_limit();

        let mut checker_child = spawn(checker, false)?;
        let checker_pid = checker_child.id().ok_or(ExecError::MissingPid)?;
        let mut contestant = match spawn(program, true) {
            Ok(child) => child,
            Err(e) => {
                kill_group(checker_pid);
                return Err(e);
            }
        };
        let contestant_pid = match contestant.id() {
            Some(pid) => pid,
            None => {
                kill_group(checker_pid);
                return Err(ExecError::MissingPid);
            }
        };
        debug!(contestant_pid, checker_pid, "interactive session started");

        let mut sampler = MemorySampler::with_limit(
            contestant_pid,
            self.executer.poll_interval(),
            Some(memory_limit_kb),
        );
        let started = Instant::now();

        let to_checker: JoinHandle<()> = tokio::spawn(feed_checker(
            checker_child.stdin.take(),
            contestant.stdout.take(),
            separator.clone(),
            input.to_string(),
        ));
        let from_checker: JoinHandle<RelayOutcome> = tokio::spawn(relay_checker(
            checker_child.stdout.take(),
            contestant.stdin.take(),
            separator,
            capture_limit,
        ));
        let stderr: JoinHandle<Vec<u8>> = {
            let stderr = contestant.stderr.take();
            tokio::spawn(async move {
                match stderr {
                    Some(stderr) => read_capped(stderr, capture_limit).await,
                    None => Vec::new(),
                }
            })
        };

        let session = async {
            let contestant_status = wait_and_clear_group(&mut contestant, contestant_pid).await;
            let contestant_elapsed = started.elapsed();
            let checker_status = wait_and_clear_group(&mut checker_child, checker_pid).await;
            (contestant_status, contestant_elapsed, checker_status)
        };

        let end = tokio::select! {
            result = session => SessionEnd::Finished(result),
            _ = self.executer.deadline().wait(time_limit + self.grace) => SessionEnd::TimedOut,
            _ = sampler.exceeded() => SessionEnd::MemoryExceeded,
        };

        if !matches!(end, SessionEnd::Finished(_)) {
            kill_unreaped(&contestant);
            kill_unreaped(&checker_child);
            let _ = contestant.wait().await;
            let _ = checker_child.wait().await;
        }
        let contestant_elapsed_ms = started.elapsed().as_millis() as u64;

        let peak_memory_kb = sampler.stop().await;
        let relay = join_or_default(from_checker).await;
        let stderr = join_or_default(stderr).await;
        to_checker.abort();

        let time_limit_ms = time_limit.as_millis() as u64;

        let (contestant_status, contestant_elapsed, checker_status) = match end {
            SessionEnd::Finished((c, e, k)) => {
                (c.map_err(ExecError::Wait)?, e, k.map_err(ExecError::Wait)?)
            }
            SessionEnd::MemoryExceeded => {
                debug!(peak_memory_kb, "interactive contestant exceeded its memory limit");
                return Ok(EvaluationResult::Success {
                    verdict: SuccessVerdict::MemoryLimitExceeded,
                    time_ms: contestant_elapsed_ms.min(time_limit_ms),
                    memory_kb: peak_memory_kb,
                    output: None,
                });
            }
            SessionEnd::TimedOut => {
                debug!(concluded = relay.concluded, "interactive session timed out");
                let decision = if relay.concluded {
                    parse_checker_token(&relay.verdict)
                } else {
                    CheckerDecision::Failed(
                        "Interactive session timed out without a verdict".to_string(),
                    )
                };
                return Ok(decision.into_result(time_limit_ms, peak_memory_kb, None));
            }
        };

        let contestant_code = exit_code(contestant_status);
        let checker_code = exit_code(checker_status);
        let elapsed_ms = contestant_elapsed.as_millis() as u64;

        // A contestant still writing after the checker concluded dies of SIGPIPE
        let broken_pipe_after_verdict = contestant_code == SIGPIPE_EXIT && relay.concluded;
        if contestant_code != 0 && !broken_pipe_after_verdict {
            return Ok(EvaluationResult::Error {
                verdict: ErrorVerdict::RuntimeError,
                exit_code: Some(contestant_code),
                message: Some(String::from_utf8_lossy(&stderr).into_owned()),
            });
        }

        if peak_memory_kb > memory_limit_kb {
            return Ok(EvaluationResult::Success {
                verdict: SuccessVerdict::MemoryLimitExceeded,
                time_ms: elapsed_ms,
                memory_kb: peak_memory_kb,
                output: None,
            });
        }

        if elapsed_ms > time_limit_ms {
            return Ok(EvaluationResult::Success {
                verdict: SuccessVerdict::TimeLimitExceeded,
                time_ms: time_limit_ms,
                memory_kb: peak_memory_kb,
                output: None,
            });
        }

        let decision = if checker_code != 0 {
            warn!(checker_code, "interactive checker failed");
            CheckerDecision::Failed(format!("Checker exited with code {}", checker_code))
        } else if !relay.concluded {
            CheckerDecision::Failed("Checker ended without a verdict".to_string())
        } else {
            parse_checker_token(&relay.verdict)
        };

        Ok(decision.into_result(elapsed_ms, peak_memory_kb, None))
    }
}

/// Owns the checker's stdin: seed, contestant output, terminator.
async fn feed_checker(
    checker_stdin: Option<ChildStdin>,
    contestant_stdout: Option<ChildStdout>,
    separator: String,
    input: String,
) {
    let Some(mut checker_stdin) = checker_stdin else {
        return;
    };

    let seed = format!("{sep}\n{input}\n{sep}\n", sep = separator, input = input);
    let mut open = checker_stdin.write_all(seed.as_bytes()).await.is_ok();
    let mut last = b'\n';

    if let Some(mut stdout) = contestant_stdout {
        let mut buf = [0u8; 8192];
        loop {
            let n = match stdout.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            last = buf[n - 1];
            // Keep draining after the checker hangs up so the contestant never blocks on us
            if open && checker_stdin.write_all(&buf[..n]).await.is_err() {
                open = false;
            }
        }
    }

    if open {
        let mut tail = String::new();
        if last != b'\n' {
            tail.push('\n');
        }
        tail.push_str(&separator);
        tail.push_str("\nEND\n");
        let _ = checker_stdin.write_all(tail.as_bytes()).await;
        let _ = checker_stdin.shutdown().await;
    }
}

/// Owns the checker's stdout: relays it to the contestant until the
/// separator, then captures the verdict.
async fn relay_checker(
    checker_stdout: Option<ChildStdout>,
    contestant_stdin: Option<ChildStdin>,
    separator: String,
    capture_limit: usize,
) -> RelayOutcome {
    match checker_stdout {
        Some(stdout) => relay(stdout, contestant_stdin, separator.as_bytes(), capture_limit).await,
        None => RelayOutcome::default(),
    }
}

async fn relay<R, W>(
    mut from: R,
    to: Option<W>,
    separator: &[u8],
    capture_limit: usize,
) -> RelayOutcome
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut splitter = SentinelSplitter::new(separator);
    let mut to = to;
    let mut verdict = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        let n = match from.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        let (before, after) = splitter.feed(&buf[..n]);
        if !before.is_empty() {
            if let Some(w) = to.as_mut() {
                if w.write_all(&before).await.is_err() {
                    to = None;
                }
            }
        }
        if splitter.found() {
            // Closing the contestant's stdin
            to = None;
            let room = capture_limit.saturating_sub(verdict.len());
            verdict.extend_from_slice(&after[..after.len().min(room)]);
        }
    }

    if !splitter.found() {
        let rest = splitter.finish();
        if let Some(w) = to.as_mut() {
            let _ = w.write_all(&rest).await;
        }
    }

    RelayOutcome {
        concluded: splitter.found(),
        verdict: String::from_utf8_lossy(&verdict).into_owned(),
    }
}

async fn join_or_default<T: Default>(mut handle: JoinHandle<T>) -> T {
    match tokio::time::timeout(JOIN_GRACE, &mut handle).await {
        Ok(Ok(value)) => value,
        Ok(Err(_)) => T::default(),
        Err(_) => {
            handle.abort();
            T::default()
        }
    }
}

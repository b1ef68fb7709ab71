//! Simple checker protocol and output comparison
//!
//! A simple checker runs once per testcase after the contestant's program
//! exits. Its stdin is the input, the expected output and the program's
//! output, each introduced by a line holding a random separator. Its stdout
//! is a verdict token.

use std::time::Duration;

use tracing::debug;

use crate::core::verdict::{ErrorVerdict, EvaluationResult, SuccessVerdict};
use crate::engine::executer::{Executer, RunState, Runnable};
use crate::error::ExecError;

const CUSTOM_PREFIX: &str = "custom:";

/// What a checker decided about one testcase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerDecision {
    Accepted,
    WrongAnswer,
    Custom(String),
    /// The checker misbehaved; carries a description for the report
    Failed(String),
}

impl CheckerDecision {
    pub fn into_result(self, time_ms: u64, memory_kb: u64, output: Option<String>) -> EvaluationResult {
        let verdict = match self {
            CheckerDecision::Accepted => SuccessVerdict::Accepted,
            CheckerDecision::WrongAnswer => SuccessVerdict::WrongAnswer,
            CheckerDecision::Custom(payload) => SuccessVerdict::Custom(payload),
            CheckerDecision::Failed(message) => {
                return EvaluationResult::error(ErrorVerdict::EvaluationError, message)
            }
        };
        EvaluationResult::Success {
            verdict,
            time_ms,
            memory_kb,
            output,
        }
    }
}

/// Parse a checker's verdict token (case-insensitive).
pub fn parse_checker_token(stdout: &str) -> CheckerDecision {
    let token = stdout.trim();

    if token.eq_ignore_ascii_case("ac") || token.eq_ignore_ascii_case("accepted") {
        return CheckerDecision::Accepted;
    }
    if token.eq_ignore_ascii_case("wa") || token.eq_ignore_ascii_case("wrong_answer") {
        return CheckerDecision::WrongAnswer;
    }
    if let Some(prefix) = token.get(..CUSTOM_PREFIX.len()) {
        if prefix.eq_ignore_ascii_case(CUSTOM_PREFIX) {
            return CheckerDecision::Custom(token[CUSTOM_PREFIX.len()..].trim().to_string());
        }
    }

    let shown: String = token.chars().take(100).collect();
    CheckerDecision::Failed(format!("Unrecognized checker output: {:?}", shown))
}

/// Fresh separator; long enough never to appear in real payloads.
pub fn random_separator() -> String {
    format!("#{:032x}#", rand::random::<u128>())
}

fn simple_payload(separator: &str, input: &str, expected: &str, output: &str) -> String {
    format!(
        "{sep}\n{input}\n{sep}\n{expected}\n{sep}\n{output}",
        sep = separator,
    )
}

/// Runs a checker program once per testcase
#[derive(Clone)]
pub struct SimpleChecker {
    executer: Executer,
    timeout: Duration,
}

impl SimpleChecker {
    pub fn new(executer: Executer, timeout: Duration) -> Self {
        Self { executer, timeout }
    }

    /// Errors only when the checker could not be started.
    pub async fn check(
        &self,
        checker: &Runnable,
        input: &str,
        expected: Option<&str>,
        output: &str,
    ) -> Result<CheckerDecision, ExecError> {
        let payload = simple_payload(
            &random_separator(),
            input,
            expected.unwrap_or_default(),
            output,
        );
        let outcome = self
            .executer
            .run(checker, payload.as_bytes(), self.timeout)
            .await?;

        debug!(
            status = ?outcome.status,
            stdout = %outcome.stdout.chars().take(200).collect::<String>(),
            "checker finished"
        );

        Ok(match outcome.status {
            RunState::Completed => parse_checker_token(&outcome.stdout),
            RunState::TimedOut => CheckerDecision::Failed("Checker timed out".to_string()),
            RunState::MemoryExceeded => {
                CheckerDecision::Failed("Checker ran out of memory".to_string())
            }
            RunState::Crashed { exit_code } => {
                CheckerDecision::Failed(format!("Checker exited with code {}", exit_code))
            }
            RunState::Idle | RunState::Running { .. } => {
                CheckerDecision::Failed("Checker did not finish".to_string())
            }
        })
    }
}

/// Line-wise comparison ignoring trailing whitespace and trailing blank lines.
pub fn compare_output(actual: &str, expected: &str) -> bool {
    fn normalize(s: &str) -> Vec<&str> {
        let mut lines: Vec<&str> = s.lines().map(str::trim_end).collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        lines
    }

    normalize(actual) == normalize(expected)
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Verdict from judging, for a testcase or an aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    CompilationError,
    EvaluationError,
    SystemError,
    Skipped,
    /// Checker-defined outcome carrying its payload
    Custom(String),
}

impl Verdict {
    /// Accepted, or a custom checker outcome (which counts as accepting).
    pub fn is_accepting(&self) -> bool {
        matches!(self, Verdict::Accepted | Verdict::Custom(_))
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Accepted => "accepted",
            Verdict::WrongAnswer => "wrong_answer",
            Verdict::TimeLimitExceeded => "time_limit_exceeded",
            Verdict::MemoryLimitExceeded => "memory_limit_exceeded",
            Verdict::RuntimeError => "runtime_error",
            Verdict::CompilationError => "compilation_error",
            Verdict::EvaluationError => "evaluation_error",
            Verdict::SystemError => "system_error",
            Verdict::Skipped => "skipped",
            Verdict::Custom(payload) => return write!(f, "custom({})", payload),
        };
        write!(f, "{}", s)
    }
}

/// Verdicts a program run that finished can receive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SuccessVerdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    Custom(String),
}

impl From<SuccessVerdict> for Verdict {
    fn from(v: SuccessVerdict) -> Self {
        match v {
            SuccessVerdict::Accepted => Verdict::Accepted,
            SuccessVerdict::WrongAnswer => Verdict::WrongAnswer,
            SuccessVerdict::TimeLimitExceeded => Verdict::TimeLimitExceeded,
            SuccessVerdict::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
            SuccessVerdict::Custom(payload) => Verdict::Custom(payload),
        }
    }
}

/// Verdicts for runs that never produced a judgeable answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorVerdict {
    RuntimeError,
    CompilationError,
    EvaluationError,
    SystemError,
}

impl From<ErrorVerdict> for Verdict {
    fn from(v: ErrorVerdict) -> Self {
        match v {
            ErrorVerdict::RuntimeError => Verdict::RuntimeError,
            ErrorVerdict::CompilationError => Verdict::CompilationError,
            ErrorVerdict::EvaluationError => Verdict::EvaluationError,
            ErrorVerdict::SystemError => Verdict::SystemError,
        }
    }
}

/// Outcome of judging one testcase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EvaluationResult {
    Success {
        verdict: SuccessVerdict,
        time_ms: u64,
        memory_kb: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<String>,
    },
    Error {
        verdict: ErrorVerdict,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Skipped,
}

impl EvaluationResult {
    pub fn error(verdict: ErrorVerdict, message: impl Into<String>) -> Self {
        EvaluationResult::Error {
            verdict,
            exit_code: None,
            message: Some(message.into()),
        }
    }

    pub fn verdict(&self) -> Verdict {
        match self {
            EvaluationResult::Success { verdict, .. } => verdict.clone().into(),
            EvaluationResult::Error { verdict, .. } => (*verdict).into(),
            EvaluationResult::Skipped => Verdict::Skipped,
        }
    }

    /// Whether later testcases of the same cluster may still run.
    pub fn allows_continuation(&self) -> bool {
        matches!(
            self,
            EvaluationResult::Success {
                verdict: SuccessVerdict::Accepted | SuccessVerdict::Custom(_),
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verdict_wire_shape() {
        assert_eq!(
            serde_json::to_value(Verdict::Accepted).unwrap(),
            json!({"type": "accepted"})
        );
        assert_eq!(
            serde_json::to_value(Verdict::Custom("42".into())).unwrap(),
            json!({"type": "custom", "data": "42"})
        );
        let parsed: Verdict = serde_json::from_value(json!({"type": "time_limit_exceeded"})).unwrap();
        assert_eq!(parsed, Verdict::TimeLimitExceeded);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Accepted.to_string(), "accepted");
        assert_eq!(Verdict::WrongAnswer.to_string(), "wrong_answer");
        assert_eq!(Verdict::CompilationError.to_string(), "compilation_error");
    }

    #[test]
    fn test_evaluation_result_tagging() {
        let result = EvaluationResult::Error {
            verdict: ErrorVerdict::RuntimeError,
            exit_code: Some(139),
            message: None,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"status": "error", "verdict": "runtime_error", "exit_code": 139})
        );
        assert_eq!(
            serde_json::to_value(EvaluationResult::Skipped).unwrap(),
            json!({"status": "skipped"})
        );
    }

    #[test]
    fn test_continuation_only_after_accepting() {
        let ok = EvaluationResult::Success {
            verdict: SuccessVerdict::Custom("x".into()),
            time_ms: 1,
            memory_kb: 1,
            output: None,
        };
        let tle = EvaluationResult::Success {
            verdict: SuccessVerdict::TimeLimitExceeded,
            time_ms: 1000,
            memory_kb: 1,
            output: None,
        };
        assert!(ok.allows_continuation());
        assert!(!tle.allows_continuation());
        assert!(!EvaluationResult::error(ErrorVerdict::SystemError, "x").allows_continuation());
        assert!(!EvaluationResult::Skipped.allows_continuation());
    }
}

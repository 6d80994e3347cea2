//! The request/retry state machine and judgment validation.
//!
//! Each (row, code) unit runs one `annotate` call: issue the prompt, retry
//! transport and malformed-response failures up to the attempt budget with a
//! fixed backoff, then validate whatever text finally arrived. A received,
//! well-formed response is never retried, and an exhausted budget records
//! the same `"Error"` sentinel a failed validation does. The caller cannot
//! distinguish the two except by logs; persistence stays with the caller.

use crate::store::CellValue;
use crate::{LlmError, TextGenerator};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Cell rendering for exhausted retries and failed validation.
pub const ERROR_SENTINEL: &str = "Error";

// ── Policies ───────────────────────────────────────────────────────

/// Attempt budget and the fixed delay between attempts. The delay differs
/// by deployment (1–5 s observed), so it is policy, not a constant.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(5),
        }
    }
}

/// How a received response becomes a judgment. Both variants exist in
/// production use; neither is canonical.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationPolicy {
    /// Accept the first character when it is `'1'`/`'0'`, degrade anything
    /// else to `"Error"`.
    #[default]
    FirstChar,
    /// Store the raw trimmed response text as the judgment.
    Verbatim,
}

// ── Judgment ───────────────────────────────────────────────────────

/// The verdict for one (record, code) pair. Cell renderings are exactly
/// `"1"`, `"0"`, the raw model text, or `"Error"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Judgment {
    Present,
    Absent,
    Verbatim(String),
    Error,
}

impl Judgment {
    pub fn as_cell(&self) -> CellValue {
        CellValue::text(self.to_string())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for Judgment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Present => write!(f, "1"),
            Self::Absent => write!(f, "0"),
            Self::Verbatim(text) => write!(f, "{text}"),
            Self::Error => write!(f, "{ERROR_SENTINEL}"),
        }
    }
}

// ── State machine ──────────────────────────────────────────────────

enum State {
    /// Counter of attempts already spent.
    Attempting(u32),
    /// A response arrived; judge it.
    Validating(String),
}

/// Annotate one prompt. Single exit path: every run of the machine ends in
/// a `Judgment`, never a panic or an error the caller must branch on.
pub async fn annotate(
    generator: &dyn TextGenerator,
    prompt: &str,
    retry: &RetryPolicy,
    validation: ValidationPolicy,
) -> Judgment {
    let mut state = State::Attempting(0);
    loop {
        state = match state {
            State::Attempting(attempt) if attempt >= retry.max_attempts => {
                warn!(
                    "max retries ({}) reached, recording '{ERROR_SENTINEL}'",
                    retry.max_attempts
                );
                return Judgment::Error;
            }
            State::Attempting(attempt) => match generator.generate(prompt).await {
                Ok(text) => State::Validating(text),
                Err(err) => {
                    warn!("attempt {} failed: {err}", attempt + 1);
                    if attempt + 1 < retry.max_attempts {
                        tokio::time::sleep(retry.backoff).await;
                    }
                    State::Attempting(attempt + 1)
                }
            },
            State::Validating(text) => return validate(&text, validation),
        };
    }
}

fn validate(text: &str, policy: ValidationPolicy) -> Judgment {
    let text = text.trim();
    match policy {
        ValidationPolicy::FirstChar => match text.chars().next() {
            Some('1') => Judgment::Present,
            Some('0') => Judgment::Absent,
            _ => {
                debug!("unexpected response format: {text:?}");
                Judgment::Error
            }
        },
        ValidationPolicy::Verbatim => Judgment::Verbatim(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GenerateFuture;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Plays back a script of outcomes, then repeats the last one.
    struct ScriptedGenerator {
        script: Mutex<Vec<Result<String, String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(script: Vec<Result<String, String>>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextGenerator for ScriptedGenerator {
        fn generate(&self, _prompt: &str) -> GenerateFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let outcome = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            };
            Box::pin(async move { outcome.map_err(LlmError::Transport) })
        }
    }

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn two_failures_then_success_takes_three_attempts() {
        let generator = ScriptedGenerator::new(vec![
            Err("connection refused".into()),
            Err("connection refused".into()),
            Ok("1".into()),
        ]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::FirstChar,
        )
        .await;
        assert_eq!(judgment, Judgment::Present);
        assert_eq!(generator.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_failure_exhausts_exactly_max_attempts() {
        let generator = ScriptedGenerator::new(vec![Err("connection refused".into())]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::FirstChar,
        )
        .await;
        assert_eq!(judgment, Judgment::Error);
        assert_eq!(generator.calls(), 3, "no attempts beyond the budget");
    }

    #[tokio::test]
    async fn first_char_rule_accepts_a_prefixed_answer() {
        let generator = ScriptedGenerator::new(vec![Ok("1 because the task is hands-on".into())]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::FirstChar,
        )
        .await;
        assert_eq!(judgment, Judgment::Present);
        assert_eq!(judgment.as_cell(), CellValue::text("1"));
    }

    #[tokio::test]
    async fn verbatim_policy_stores_the_raw_text() {
        let generator = ScriptedGenerator::new(vec![Ok(" 1 because the task is hands-on ".into())]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::Verbatim,
        )
        .await;
        assert_eq!(
            judgment,
            Judgment::Verbatim("1 because the task is hands-on".into())
        );
    }

    #[tokio::test]
    async fn malformed_answer_is_not_retried() {
        let generator = ScriptedGenerator::new(vec![Ok("maybe?".into()), Ok("1".into())]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::FirstChar,
        )
        .await;
        assert_eq!(judgment, Judgment::Error);
        assert_eq!(
            generator.calls(),
            1,
            "a received response never triggers another attempt"
        );
    }

    #[tokio::test]
    async fn zero_and_newline_validates_as_absent() {
        let generator = ScriptedGenerator::new(vec![Ok("0\n".into())]);

        let judgment = annotate(
            &generator,
            "prompt",
            &fast_retry(3),
            ValidationPolicy::FirstChar,
        )
        .await;
        assert_eq!(judgment, Judgment::Absent);
        assert_eq!(judgment.as_cell(), CellValue::text("0"));
    }

    #[tokio::test]
    async fn deterministic_generator_reproduces_the_judgment() {
        for _ in 0..2 {
            let generator = ScriptedGenerator::new(vec![Ok("0".into())]);
            let judgment = annotate(
                &generator,
                "prompt",
                &fast_retry(3),
                ValidationPolicy::FirstChar,
            )
            .await;
            assert_eq!(judgment, Judgment::Absent);
        }
    }

    #[test]
    fn error_sentinel_renders_into_the_cell() {
        assert_eq!(Judgment::Error.as_cell(), CellValue::text("Error"));
        assert!(Judgment::Error.is_error());
    }
}

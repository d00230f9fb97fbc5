//! Test identifiers, per-test outcomes and suite totals.

use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    Subject,
    Situation,
}

/// A named grouping level a test was registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Context {
    pub kind: ContextKind,
    pub title: String,
}

/// Identifies one test method of one class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestId {
    pub class: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<Context>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TestId {
    /// The description when there is one, the method name otherwise
    pub fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// `Class > subject > situation > label`
    pub fn path(&self) -> String {
        let mut parts = vec![self.class.as_str()];
        parts.extend(self.context.iter().map(|c| c.title.as_str()));
        parts.push(self.label());
        parts.join(" > ")
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Outcome bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Passed,
    Failed,
    Error,
    Skipped,
    TodoExpectedFailure,
    TodoUnexpectedSuccess,
}

impl OutcomeKind {
    pub const ALL: [OutcomeKind; 6] = [
        OutcomeKind::Passed,
        OutcomeKind::Failed,
        OutcomeKind::Error,
        OutcomeKind::Skipped,
        OutcomeKind::TodoExpectedFailure,
        OutcomeKind::TodoUnexpectedSuccess,
    ];

    /// Whether this outcome lets the suite pass
    pub fn is_success(self) -> bool {
        matches!(
            self,
            OutcomeKind::Passed | OutcomeKind::Skipped | OutcomeKind::TodoExpectedFailure
        )
    }

    /// Label used by the console reporter
    pub fn label(self) -> &'static str {
        match self {
            OutcomeKind::Passed => "pass",
            OutcomeKind::Failed => "Fail",
            OutcomeKind::Error => "ERROR",
            OutcomeKind::Skipped => "skip",
            OutcomeKind::TodoExpectedFailure => "todo",
            OutcomeKind::TodoUnexpectedSuccess => "TODO",
        }
    }

    /// One-character progress mark
    pub fn mark(self) -> char {
        match self {
            OutcomeKind::Passed => '.',
            OutcomeKind::Failed => 'f',
            OutcomeKind::Error => 'E',
            OutcomeKind::Skipped => 's',
            OutcomeKind::TodoExpectedFailure => 't',
            OutcomeKind::TodoUnexpectedSuccess => 'T',
        }
    }
}

/// Classification of one test execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed { message: String, detail: String },
    Error { message: String, detail: String },
    Skipped { reason: String },
    TodoExpectedFailure { message: String },
    TodoUnexpectedSuccess,
}

impl Outcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Passed => OutcomeKind::Passed,
            Outcome::Failed { .. } => OutcomeKind::Failed,
            Outcome::Error { .. } => OutcomeKind::Error,
            Outcome::Skipped { .. } => OutcomeKind::Skipped,
            Outcome::TodoExpectedFailure { .. } => OutcomeKind::TodoExpectedFailure,
            Outcome::TodoUnexpectedSuccess => OutcomeKind::TodoUnexpectedSuccess,
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind().is_success()
    }

    /// An error outcome built from an error chain
    pub fn error(err: &anyhow::Error) -> Self {
        Outcome::Error {
            message: format!("{:#}", err),
            detail: format!("{:?}", err),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Outcome::Failed { message, .. }
            | Outcome::Error { message, .. }
            | Outcome::TodoExpectedFailure { message } => Some(message),
            Outcome::Skipped { reason } => Some(reason),
            Outcome::Passed | Outcome::TodoUnexpectedSuccess => None,
        }
    }
}

/// The single event produced by one test invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestOutcome {
    pub id: TestId,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Time spent in the test body
    #[serde(serialize_with = "as_secs")]
    pub elapsed: Duration,
    /// Deferred-callback, releaser and `after_each` failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cleanup_errors: Vec<String>,
}

impl TestOutcome {
    pub fn new(id: TestId, outcome: Outcome, elapsed: Duration) -> Self {
        Self {
            id,
            outcome,
            elapsed,
            cleanup_errors: Vec::new(),
        }
    }

    pub fn kind(&self) -> OutcomeKind {
        self.outcome.kind()
    }
}

/// Outcome counts for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuiteTotals {
    passed: usize,
    failed: usize,
    error: usize,
    skipped: usize,
    todo_expected_failure: usize,
    todo_unexpected_success: usize,
    /// `after_all` failures, which belong to no single test
    hook_errors: usize,
    #[serde(serialize_with = "as_secs")]
    elapsed: Duration,
}

impl SuiteTotals {
    pub(crate) fn record(&mut self, kind: OutcomeKind) {
        *self.slot(kind) += 1;
    }

    pub(crate) fn record_hook_error(&mut self) {
        self.hook_errors += 1;
    }

    pub(crate) fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    fn slot(&mut self, kind: OutcomeKind) -> &mut usize {
        match kind {
            OutcomeKind::Passed => &mut self.passed,
            OutcomeKind::Failed => &mut self.failed,
            OutcomeKind::Error => &mut self.error,
            OutcomeKind::Skipped => &mut self.skipped,
            OutcomeKind::TodoExpectedFailure => &mut self.todo_expected_failure,
            OutcomeKind::TodoUnexpectedSuccess => &mut self.todo_unexpected_success,
        }
    }

    pub fn count(&self, kind: OutcomeKind) -> usize {
        match kind {
            OutcomeKind::Passed => self.passed,
            OutcomeKind::Failed => self.failed,
            OutcomeKind::Error => self.error,
            OutcomeKind::Skipped => self.skipped,
            OutcomeKind::TodoExpectedFailure => self.todo_expected_failure,
            OutcomeKind::TodoUnexpectedSuccess => self.todo_unexpected_success,
        }
    }

    pub fn total(&self) -> usize {
        OutcomeKind::ALL.iter().map(|k| self.count(*k)).sum()
    }

    pub fn hook_errors(&self) -> usize {
        self.hook_errors
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        self.hook_errors == 0
            && OutcomeKind::ALL
                .iter()
                .filter(|k| !k.is_success())
                .all(|k| self.count(*k) == 0)
    }

    /// Process exit status for the run
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

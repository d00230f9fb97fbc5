//! Executes one test method.
//!
//! ```text
//! Initialized ─▶ FixturesResolving ─▶ Running ─▶ DeferredFlushing ─▶ Releasing ─▶ Done
//!      │                 │                                              ▲
//!      └──── Done        └──────────────── (error) ─────────────────────┘
//! ```
//!
//! Teardown always runs once anything was constructed; nothing raised by user
//! code escapes [`TestInvoker::invoke`].

use crate::class::{DeferredCallback, TestCaseDescriptor, TestClass, TestContext};
use crate::error::guard;
use crate::fixture::{FixtureGraph, FixtureResolver};
use crate::outcome::{Outcome, TestId, TestOutcome};
use crate::signal::{Signal, TestResult};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationState {
    Initialized,
    FixturesResolving,
    Running,
    DeferredFlushing,
    Releasing,
    Done,
}

/// Runs one case of one class
pub struct TestInvoker<'a, S> {
    class: &'a TestClass<S>,
    case: &'a TestCaseDescriptor<S>,
    delegate: Option<&'a dyn FixtureResolver>,
    id: TestId,
    state: InvocationState,
    transitions: Vec<InvocationState>,
}

impl<'a, S: 'static> TestInvoker<'a, S> {
    pub fn new(
        class: &'a TestClass<S>,
        case: &'a TestCaseDescriptor<S>,
        delegate: Option<&'a dyn FixtureResolver>,
    ) -> Self {
        Self {
            class,
            case,
            delegate,
            id: case.id(&class.name),
            state: InvocationState::Initialized,
            transitions: vec![InvocationState::Initialized],
        }
    }

    pub fn state(&self) -> InvocationState {
        self.state
    }

    /// States visited so far, in order
    pub fn transitions(&self) -> &[InvocationState] {
        &self.transitions
    }

    fn advance(&mut self, next: InvocationState) {
        tracing::debug!(test = %self.id, from = ?self.state, to = ?next, "invocation state");
        self.state = next;
        self.transitions.push(next);
    }

    /// Run the case to completion and produce its outcome
    pub fn invoke(&mut self) -> TestOutcome {
        let factory = &self.class.factory;
        let mut instance = match guard(|| Ok(factory())) {
            Ok(instance) => instance,
            Err(err) => {
                tracing::warn!(test = %self.id, error = %err, "instantiation failed");
                self.advance(InvocationState::Done);
                let err = err.context(format!("cannot instantiate test class {}", self.class.name));
                return TestOutcome::new(self.id.clone(), Outcome::error(&err), Duration::ZERO);
            }
        };

        if let Some(hook) = &self.class.hooks.before_each {
            if let Err(err) = guard(|| hook(&mut instance)) {
                tracing::warn!(test = %self.id, error = %err, "before_each failed");
                self.advance(InvocationState::Done);
                let err = err.context("before_each failed");
                return TestOutcome::new(self.id.clone(), Outcome::error(&err), Duration::ZERO);
            }
        }

        self.advance(InvocationState::FixturesResolving);
        let mut graph = FixtureGraph::new(
            &self.class.fixtures,
            self.delegate,
            self.class.name.as_str(),
            self.id.label(),
        );
        let mut cleanup_errors = Vec::new();
        let mut elapsed = Duration::ZERO;

        let mut outcome = match graph.resolve(&mut instance, &self.case.params) {
            Ok(args) => {
                self.advance(InvocationState::Running);
                let mut deferred = Vec::new();
                let started = Instant::now();
                let result = {
                    let mut cx = TestContext::new(&mut instance, &args, &mut deferred, &self.id);
                    guard(|| (self.case.body)(&mut cx))
                };
                elapsed = started.elapsed();
                let outcome = classify(result, self.case.todo);

                self.advance(InvocationState::DeferredFlushing);
                flush_deferred(deferred, outcome, &mut cleanup_errors)
            }
            Err(err) => {
                tracing::debug!(test = %self.id, error = %err, "fixture resolution failed");
                Outcome::error(&err)
            }
        };

        self.advance(InvocationState::Releasing);
        for err in graph.release(&mut instance) {
            outcome = escalate(outcome, &err, &mut cleanup_errors);
        }
        if let Some(hook) = &self.class.hooks.after_each {
            if let Err(err) = guard(|| hook(&mut instance)) {
                tracing::warn!(test = %self.id, error = %err, "after_each failed");
                let err = err.context("after_each failed");
                outcome = escalate(outcome, &err, &mut cleanup_errors);
            }
        }

        self.advance(InvocationState::Done);
        TestOutcome {
            id: self.id.clone(),
            outcome,
            elapsed,
            cleanup_errors,
        }
    }
}

/// Map the body's result onto an outcome; todo cases invert pass and fail
fn classify(result: TestResult, todo: bool) -> Outcome {
    match result {
        Ok(()) if todo => Outcome::TodoUnexpectedSuccess,
        Ok(()) => Outcome::Passed,
        Err(err) => match Signal::of(&err) {
            Signal::Skip(reason) => Outcome::Skipped { reason },
            Signal::Assertion(message) if todo => Outcome::TodoExpectedFailure { message },
            Signal::Assertion(message) => Outcome::Failed {
                message,
                detail: format!("{:?}", err),
            },
            Signal::Error => Outcome::error(&err),
        },
    }
}

/// Run deferred callbacks last-registered first
fn flush_deferred(
    deferred: Vec<DeferredCallback>,
    mut outcome: Outcome,
    cleanup_errors: &mut Vec<String>,
) -> Outcome {
    for callback in deferred.into_iter().rev() {
        let DeferredCallback { label, callback } = callback;
        if let Err(err) = guard(callback) {
            tracing::warn!(callback = %label, error = %err, "deferred callback failed");
            let err = err.context(format!("{} failed", label));
            outcome = escalate(outcome, &err, cleanup_errors);
        }
    }
    outcome
}

/// Record a cleanup failure; it only replaces an outcome that was a success
fn escalate(outcome: Outcome, err: &anyhow::Error, cleanup_errors: &mut Vec<String>) -> Outcome {
    cleanup_errors.push(format!("{:#}", err));
    if outcome.is_success() && !matches!(outcome, Outcome::Skipped { .. }) {
        Outcome::error(err)
    } else {
        outcome
    }
}

//! Signals a test body raises to steer its outcome.
//!
//! A body returns [`TestResult`]. [`AssertionFailure`] (or a panic from the
//! standard `assert!` family) marks the test failed, [`SkipTest`] marks it
//! skipped, and any other error is an unexpected error.

use crate::error::Panicked;
use thiserror::Error;

/// What every test body, hook and deferred callback returns
pub type TestResult = anyhow::Result<()>;

/// Raised by assertions; the test is reported as failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AssertionFailure {
    pub message: String,
}

impl AssertionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Raised to skip the rest of a test; the reason is reported verbatim
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("skipped: {reason}")]
pub struct SkipTest {
    pub reason: String,
}

/// Fail the current test with `message`.
pub fn fail(message: impl Into<String>) -> TestResult {
    Err(AssertionFailure::new(message).into())
}

/// Skip the current test.
///
/// ```
/// use oktest::signal::{skip, TestResult};
///
/// fn body() -> TestResult {
///     skip("requires network access")
/// }
/// # assert!(body().is_err());
/// ```
pub fn skip(reason: impl Into<String>) -> TestResult {
    Err(SkipTest {
        reason: reason.into(),
    }
    .into())
}

/// Skip the current test when `condition` holds; use with `?`.
pub fn skip_when(condition: bool, reason: impl Into<String>) -> TestResult {
    if condition {
        skip(reason)
    } else {
        Ok(())
    }
}

/// How an error leaving user code is classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Assertion(String),
    Skip(String),
    Error,
}

impl Signal {
    pub fn of(err: &anyhow::Error) -> Self {
        if let Some(failure) = err.downcast_ref::<AssertionFailure>() {
            return Signal::Assertion(failure.message.clone());
        }
        if let Some(skip) = err.downcast_ref::<SkipTest>() {
            return Signal::Skip(skip.reason.clone());
        }
        match err.downcast_ref::<Panicked>() {
            Some(panicked) if panicked.is_assertion() => Signal::Assertion(panicked.message.clone()),
            _ => Signal::Error,
        }
    }
}

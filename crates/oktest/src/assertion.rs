//! Fluent assertions.
//!
//! ```
//! use oktest::assertion::ok;
//!
//! # fn main() -> anyhow::Result<()> {
//! ok(1 + 1).eq(2)?;
//! ok("Haruhi").contains("ru")?;
//! ok(3).not_().is_in(&[1, 2])?;
//! # Ok(())
//! # }
//! ```
//!
//! Every check returns a [`TestResult`]; a failed check carries an
//! [`AssertionFailure`] so the test is reported as failed rather than errored.

use crate::signal::{AssertionFailure, TestResult};
use std::fmt::Debug;

/// Start an assertion about `actual`
pub fn ok<T>(actual: T) -> Assertion<T> {
    Assertion {
        actual,
        negated: false,
    }
}

#[derive(Debug)]
pub struct Assertion<T> {
    actual: T,
    negated: bool,
}

impl<T> Assertion<T> {
    /// Invert the next check
    pub fn not_(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn actual(&self) -> &T {
        &self.actual
    }

    fn check(&self, passed: bool, message: impl FnOnce(bool) -> String) -> TestResult {
        if passed != self.negated {
            Ok(())
        } else {
            Err(AssertionFailure::new(message(self.negated)).into())
        }
    }
}

fn not(negated: bool) -> &'static str {
    if negated {
        "not "
    } else {
        ""
    }
}

impl<T: Debug> Assertion<T> {
    pub fn eq<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialEq<U>,
    {
        self.compare(self.actual == expected, "==", "!=", &expected)
    }

    pub fn ne<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialEq<U>,
    {
        self.compare(self.actual != expected, "!=", "==", &expected)
    }

    pub fn lt<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialOrd<U>,
    {
        self.compare(self.actual < expected, "<", ">=", &expected)
    }

    pub fn le<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialOrd<U>,
    {
        self.compare(self.actual <= expected, "<=", ">", &expected)
    }

    pub fn gt<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialOrd<U>,
    {
        self.compare(self.actual > expected, ">", "<=", &expected)
    }

    pub fn ge<U: Debug>(&self, expected: U) -> TestResult
    where
        T: PartialOrd<U>,
    {
        self.compare(self.actual >= expected, ">=", "<", &expected)
    }

    /// `actual` is one of `items`
    pub fn is_in(&self, items: &[T]) -> TestResult
    where
        T: PartialEq,
    {
        let found = items.contains(&self.actual);
        self.check(found, |negated| {
            format!("{:?} {}in {:?}: failed.", self.actual, not(negated), items)
        })
    }

    fn compare<U: Debug>(&self, passed: bool, op: &str, inverse: &str, expected: &U) -> TestResult {
        self.check(passed, |negated| {
            let op = if negated { inverse } else { op };
            format!("{:?} {} {:?}: failed.", self.actual, op, expected)
        })
    }
}

impl Assertion<bool> {
    pub fn is_true(&self) -> TestResult {
        self.check(self.actual, |negated| {
            format!("{:?} is {}true: failed.", self.actual, not(negated))
        })
    }

    pub fn is_false(&self) -> TestResult {
        self.check(!self.actual, |negated| {
            format!("{:?} is {}false: failed.", self.actual, not(negated))
        })
    }
}

impl<T: AsRef<str> + Debug> Assertion<T> {
    pub fn contains(&self, needle: &str) -> TestResult {
        let found = self.actual.as_ref().contains(needle);
        self.check(found, |negated| {
            format!("{:?} {}in {:?}: failed.", needle, not(negated), self.actual)
        })
    }
}

impl<T: Debug> Assertion<Option<T>> {
    pub fn is_some(&self) -> TestResult {
        self.check(self.actual.is_some(), |negated| {
            format!("{:?} is {}Some: failed.", self.actual, not(negated))
        })
    }

    pub fn is_none(&self) -> TestResult {
        self.check(self.actual.is_none(), |negated| {
            format!("{:?} is {}None: failed.", self.actual, not(negated))
        })
    }
}

impl<T: Debug, E: Debug> Assertion<Result<T, E>> {
    /// The result is `Ok`
    pub fn is_ok(&self) -> TestResult {
        self.check(self.actual.is_ok(), |negated| {
            format!("{:?} is {}Ok: failed.", self.actual, not(negated))
        })
    }

    /// The result is `Err`; the error is handed back for further checks
    pub fn is_err(&self) -> anyhow::Result<&E> {
        match (&self.actual, self.negated) {
            (Err(err), false) => Ok(err),
            (actual, negated) => {
                Err(AssertionFailure::new(format!("{:?} is {}Err: failed.", actual, not(negated))).into())
            }
        }
    }
}

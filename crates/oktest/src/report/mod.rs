//! Report sinks - receive structured events from the runner

pub mod console;
pub mod json;

pub use console::ConsoleReporter;
pub use json::JsonReporter;

use crate::outcome::{SuiteTotals, TestId, TestOutcome};
use serde::Serialize;
use std::fmt;

/// Class-level hooks whose failures are reported outside any single test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassHook {
    BeforeAll,
    AfterAll,
}

impl fmt::Display for ClassHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassHook::BeforeAll => f.write_str("before_all"),
            ClassHook::AfterAll => f.write_str("after_all"),
        }
    }
}

/// Receives the events of a run, in order.
///
/// For every test the runner emits `on_test_start` followed by exactly one
/// `on_test_outcome`. All methods default to doing nothing.
pub trait ReportSink {
    fn on_suite_start(&mut self) {}

    fn on_class_start(&mut self, _class: &str) {}

    fn on_test_start(&mut self, _class: &str, _test: &TestId, _description: Option<&str>) {}

    fn on_test_outcome(&mut self, _outcome: &TestOutcome) {}

    fn on_class_hook_error(&mut self, _class: &str, _hook: ClassHook, _message: &str) {}

    fn on_class_end(&mut self, _class: &str) {}

    fn on_suite_end(&mut self, _totals: &SuiteTotals) {}
}

/// A sink that ignores everything
#[derive(Debug, Default)]
pub struct NullSink;

impl ReportSink for NullSink {}

/// One runner event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    SuiteStart,
    ClassStart {
        class: String,
    },
    TestStart {
        class: String,
        test: TestId,
        #[serde(skip_serializing_if = "Option::is_none")]
        description: Option<String>,
    },
    TestOutcome(TestOutcome),
    ClassHookError {
        class: String,
        hook: ClassHook,
        message: String,
    },
    ClassEnd {
        class: String,
    },
    SuiteEnd(SuiteTotals),
}

impl ReportEvent {
    pub(crate) fn test_start(class: &str, test: &TestId, description: Option<&str>) -> Self {
        ReportEvent::TestStart {
            class: class.to_string(),
            test: test.clone(),
            description: description.map(str::to_string),
        }
    }

    pub(crate) fn class_hook_error(class: &str, hook: ClassHook, message: &str) -> Self {
        ReportEvent::ClassHookError {
            class: class.to_string(),
            hook,
            message: message.to_string(),
        }
    }
}

/// Records every event it receives
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<ReportEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[ReportEvent] {
        &self.events
    }

    /// Outcomes in the order they were reported
    pub fn outcomes(&self) -> impl Iterator<Item = &TestOutcome> {
        self.events.iter().filter_map(|e| match e {
            ReportEvent::TestOutcome(outcome) => Some(outcome),
            _ => None,
        })
    }

    /// The outcome reported for the test labelled `label`
    pub fn outcome(&self, label: &str) -> Option<&TestOutcome> {
        self.outcomes().find(|o| o.id.label() == label)
    }

    pub fn totals(&self) -> Option<&SuiteTotals> {
        self.events.iter().rev().find_map(|e| match e {
            ReportEvent::SuiteEnd(totals) => Some(totals),
            _ => None,
        })
    }
}

impl ReportSink for EventLog {
    fn on_suite_start(&mut self) {
        self.events.push(ReportEvent::SuiteStart);
    }

    fn on_class_start(&mut self, class: &str) {
        self.events.push(ReportEvent::ClassStart {
            class: class.to_string(),
        });
    }

    fn on_test_start(&mut self, class: &str, test: &TestId, description: Option<&str>) {
        self.events
            .push(ReportEvent::test_start(class, test, description));
    }

    fn on_test_outcome(&mut self, outcome: &TestOutcome) {
        self.events.push(ReportEvent::TestOutcome(outcome.clone()));
    }

    fn on_class_hook_error(&mut self, class: &str, hook: ClassHook, message: &str) {
        self.events
            .push(ReportEvent::class_hook_error(class, hook, message));
    }

    fn on_class_end(&mut self, class: &str) {
        self.events.push(ReportEvent::ClassEnd {
            class: class.to_string(),
        });
    }

    fn on_suite_end(&mut self, totals: &SuiteTotals) {
        self.events.push(ReportEvent::SuiteEnd(totals.clone()));
    }
}

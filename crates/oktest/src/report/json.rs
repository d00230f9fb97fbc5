//! JSON reporter - one object per line for each runner event

use crate::outcome::{SuiteTotals, TestId, TestOutcome};
use crate::report::{ClassHook, ReportEvent, ReportSink};
use std::io::{self, Write};

pub struct JsonReporter<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out, error: None }
    }

    /// Give back the writer, or the first error seen while writing
    pub fn into_inner(self) -> io::Result<W> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.out),
        }
    }

    fn write_event(&mut self, event: &ReportEvent) {
        if self.error.is_some() {
            return;
        }
        let result = serde_json::to_writer(&mut self.out, event)
            .map_err(io::Error::from)
            .and_then(|_| self.out.write_all(b"\n"));
        if let Err(err) = result {
            self.error = Some(err);
        }
    }
}

impl<W: Write> ReportSink for JsonReporter<W> {
    fn on_suite_start(&mut self) {
        self.write_event(&ReportEvent::SuiteStart);
    }

    fn on_class_start(&mut self, class: &str) {
        self.write_event(&ReportEvent::ClassStart {
            class: class.to_string(),
        });
    }

    fn on_test_start(&mut self, class: &str, test: &TestId, description: Option<&str>) {
        self.write_event(&ReportEvent::test_start(class, test, description));
    }

    fn on_test_outcome(&mut self, outcome: &TestOutcome) {
        self.write_event(&ReportEvent::TestOutcome(outcome.clone()));
    }

    fn on_class_hook_error(&mut self, class: &str, hook: ClassHook, message: &str) {
        self.write_event(&ReportEvent::class_hook_error(class, hook, message));
    }

    fn on_class_end(&mut self, class: &str) {
        self.write_event(&ReportEvent::ClassEnd {
            class: class.to_string(),
        });
    }

    fn on_suite_end(&mut self, totals: &SuiteTotals) {
        self.write_event(&ReportEvent::SuiteEnd(totals.clone()));
        if let Err(err) = self.out.flush() {
            self.error.get_or_insert(err);
        }
    }
}

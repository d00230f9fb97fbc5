//! Suite runner - execute discovered tests class by class

use crate::discovery::{DiscoveredClass, Discovery, Suite, TestUnit};
use crate::fixture::FixtureResolver;
use crate::outcome::{Outcome, SuiteTotals, TestOutcome};
use crate::report::{ClassHook, ReportSink};
use oktest_config::loader::DEFAULT_TEST_PREFIX;
use oktest_config::Settings;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Configuration fixed for the duration of one run
#[derive(Clone)]
pub struct RunConfig {
    /// Plain methods whose name starts with this are tests
    pub test_prefix: String,
    /// Fallback for fixtures no class provides
    pub delegate: Option<Rc<dyn FixtureResolver>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            test_prefix: DEFAULT_TEST_PREFIX.to_string(),
            delegate: None,
        }
    }
}

impl RunConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            test_prefix: settings.test_prefix.clone(),
            delegate: None,
        }
    }

    pub fn with_delegate(mut self, delegate: impl FixtureResolver + 'static) -> Self {
        self.delegate = Some(Rc::new(delegate));
        self
    }

    pub fn with_test_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.test_prefix = prefix.into();
        self
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("test_prefix", &self.test_prefix)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}

/// Runs classes one after another and their tests one at a time
#[derive(Debug, Default)]
pub struct SuiteRunner {
    config: RunConfig,
}

impl SuiteRunner {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Select and order the tests of `suite`
    pub fn discover(&self, suite: &Suite) -> Discovery {
        Discovery::discover(suite, &self.config.test_prefix)
    }

    /// Discover and run everything in `suite`
    pub fn run_all(&self, suite: &Suite, sink: &mut dyn ReportSink) -> SuiteTotals {
        let discovery = self.discover(suite);
        self.run(suite, &discovery, sink)
    }

    /// Run a (possibly filtered) discovery of `suite`.
    ///
    /// A failing test never stops the run; every selected test produces
    /// exactly one outcome.
    pub fn run(&self, suite: &Suite, discovery: &Discovery, sink: &mut dyn ReportSink) -> SuiteTotals {
        let started = Instant::now();
        let mut totals = SuiteTotals::default();

        tracing::debug!(
            classes = discovery.classes.len(),
            tests = discovery.len(),
            "suite started"
        );
        sink.on_suite_start();

        for class in &discovery.classes {
            match suite.unit(class.index) {
                Some(unit) => self.run_class(unit, class, sink, &mut totals),
                None => tracing::warn!(class = %class.name, "class not in suite, skipped"),
            }
        }

        totals.finish(started.elapsed());
        tracing::debug!(
            total = totals.total(),
            elapsed = ?totals.elapsed(),
            "suite finished"
        );
        sink.on_suite_end(&totals);
        totals
    }

    fn run_class(
        &self,
        unit: &dyn TestUnit,
        class: &DiscoveredClass,
        sink: &mut dyn ReportSink,
        totals: &mut SuiteTotals,
    ) {
        let name = unit.name();
        sink.on_class_start(name);

        tracing::debug!(class = name, "before_all");
        match unit.run_before_all() {
            Ok(()) => {
                let delegate = self.config.delegate.as_deref();
                for case in &class.cases {
                    sink.on_test_start(name, &case.id, case.id.description.as_deref());
                    let outcome = unit.invoke(case.index, delegate);
                    totals.record(outcome.kind());
                    sink.on_test_outcome(&outcome);
                }
            }
            Err(err) => {
                let err = err.context(format!("before_all of {} failed", name));
                tracing::warn!(class = name, error = %format!("{:#}", err), "before_all failed");
                sink.on_class_hook_error(name, ClassHook::BeforeAll, &format!("{:#}", err));
                for case in &class.cases {
                    sink.on_test_start(name, &case.id, case.id.description.as_deref());
                    let outcome = TestOutcome::new(case.id.clone(), Outcome::error(&err), Duration::ZERO);
                    totals.record(outcome.kind());
                    sink.on_test_outcome(&outcome);
                }
            }
        }

        tracing::debug!(class = name, "after_all");
        if let Err(err) = unit.run_after_all() {
            let message = format!("{:#}", err.context(format!("after_all of {} failed", name)));
            tracing::warn!(class = name, error = %message, "after_all failed");
            totals.record_hook_error();
            sink.on_class_hook_error(name, ClassHook::AfterAll, &message);
        }

        sink.on_class_end(name);
    }
}

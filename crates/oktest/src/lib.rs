//! oktest - fixture-injecting test runner
//!
//! Test classes register fixture providers and releasers by name; each test
//! declares the fixtures it needs as parameters. For every test invocation
//! the runner resolves the dependency graph depth first, runs the body,
//! flushes callbacks the body deferred, and releases fixtures in exactly the
//! reverse order they were built.
//!
//! ```
//! use oktest::prelude::*;
//!
//! #[derive(Default)]
//! struct MathTest;
//!
//! let mut class = TestClass::<MathTest>::new("MathTest");
//! class.provide("two", (), |_| Ok(2_i32));
//! class.provide("four", ["two"], |args| Ok(args.get::<i32>("two")? * 2));
//! class.test("doubles", ["two", "four"], |cx| {
//!     let (two, four) = (*cx.arg::<i32>("two")?, *cx.arg::<i32>("four")?);
//!     ok(two * 2).eq(four)
//! });
//!
//! let suite = Suite::new().with(class);
//! let mut log = EventLog::new();
//! let totals = SuiteRunner::default().run_all(&suite, &mut log);
//! assert_eq!(totals.exit_code(), 0);
//! ```

pub mod assertion;
pub mod class;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod fixture;
pub mod invoker;
pub mod logging;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod signal;

pub use assertion::{ok, Assertion};
pub use class::{CaseKind, SourceLocation, TestCaseDescriptor, TestClass, TestContext};
pub use discovery::{CaseInfo, DiscoveredClass, Discovery, Suite, TestUnit};
pub use error::{FixtureError, Panicked};
pub use filter::TestFilter;
pub use fixture::{Args, DelegateFixtures, FixtureResolver, FixtureValue, Param, Params};
pub use invoker::{InvocationState, TestInvoker};
pub use outcome::{Context, ContextKind, Outcome, OutcomeKind, SuiteTotals, TestId, TestOutcome};
pub use report::{ConsoleReporter, EventLog, JsonReporter, ReportEvent, ReportSink};
pub use runner::{RunConfig, SuiteRunner};
pub use signal::{fail, skip, skip_when, AssertionFailure, SkipTest, TestResult};

pub use oktest_config::{ColorChoice, ConfigLoader, LogLevel, ReportStyle, Settings};

use anyhow::Context as _;

/// Everything a test module usually needs
pub mod prelude {
    pub use crate::assertion::ok;
    pub use crate::class::{TestClass, TestContext};
    pub use crate::discovery::Suite;
    pub use crate::fixture::{Args, DelegateFixtures, Param};
    pub use crate::report::EventLog;
    pub use crate::runner::{RunConfig, SuiteRunner};
    pub use crate::signal::{fail, skip, skip_when, TestResult};
}

/// Run `suite` with settings loaded from the current directory and the
/// environment, reporting to stdout.
pub fn run(suite: &Suite) -> anyhow::Result<SuiteTotals> {
    let cwd = std::env::current_dir().context("cannot determine current directory")?;
    let settings = ConfigLoader::new()
        .load_from_directory(&cwd)
        .context("failed to load oktest configuration")?;
    run_with(suite, &settings, RunConfig::from_settings(&settings))
}

/// Run `suite` with explicit settings and run configuration, reporting to
/// stdout.
pub fn run_with(suite: &Suite, settings: &Settings, config: RunConfig) -> anyhow::Result<SuiteTotals> {
    logging::init_logging(settings.log_level);
    if settings.color == ColorChoice::Always {
        colored::control::set_override(true);
    }

    let runner = SuiteRunner::new(config);
    let mut discovery = runner.discover(suite);
    if let Some(filter) = TestFilter::from_pattern(settings.filter.as_deref()) {
        discovery = filter.apply(discovery);
    }

    let mut reporter = ConsoleReporter::stdout(settings);
    let totals = runner.run(suite, &discovery, &mut reporter);
    reporter
        .into_inner()
        .context("failed to write the test report")?;
    Ok(totals)
}

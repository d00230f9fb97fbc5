//! Test discovery - select and order the test methods of each class

use crate::class::{SourceLocation, TestClass};
use crate::error::guard;
use crate::fixture::FixtureResolver;
use crate::invoker::TestInvoker;
use crate::outcome::{Outcome, TestId, TestOutcome};
use crate::signal::TestResult;
use std::cmp::Ordering;
use std::time::Duration;

/// A test class with its instance type erased
pub trait TestUnit {
    fn name(&self) -> &str;

    /// Every registered case, in registration order
    fn cases(&self) -> Vec<CaseInfo>;

    fn run_before_all(&self) -> TestResult;

    fn run_after_all(&self) -> TestResult;

    /// Run the case at `index` (as listed by [`cases`](Self::cases))
    fn invoke(&self, index: usize, delegate: Option<&dyn FixtureResolver>) -> TestOutcome;
}

/// What discovery needs to know about a registered case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseInfo {
    pub index: usize,
    pub id: TestId,
    pub location: Option<SourceLocation>,
}

impl CaseInfo {
    fn is_described(&self) -> bool {
        self.id.ordinal.is_some()
    }
}

impl<S: 'static> TestUnit for TestClass<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn cases(&self) -> Vec<CaseInfo> {
        self.cases
            .iter()
            .enumerate()
            .map(|(index, case)| CaseInfo {
                index,
                id: case.id(&self.name),
                location: case.location(),
            })
            .collect()
    }

    fn run_before_all(&self) -> TestResult {
        match &self.hooks.before_all {
            Some(hook) => guard(|| hook()),
            None => Ok(()),
        }
    }

    fn run_after_all(&self) -> TestResult {
        match &self.hooks.after_all {
            Some(hook) => guard(|| hook()),
            None => Ok(()),
        }
    }

    fn invoke(&self, index: usize, delegate: Option<&dyn FixtureResolver>) -> TestOutcome {
        match self.cases.get(index) {
            Some(case) => TestInvoker::new(self, case, delegate).invoke(),
            None => {
                let id = TestId {
                    class: self.name.clone(),
                    name: format!("#{}", index),
                    ordinal: None,
                    description: None,
                    context: Vec::new(),
                    tags: Vec::new(),
                };
                let err = anyhow::anyhow!("{} has no test case #{}", self.name, index);
                TestOutcome::new(id, Outcome::error(&err), Duration::ZERO)
            }
        }
    }
}

/// The test classes of a run, in the order they were added
#[derive(Default)]
pub struct Suite {
    units: Vec<Box<dyn TestUnit>>,
}

impl Suite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<S: 'static>(&mut self, class: TestClass<S>) -> &mut Self {
        self.units.push(Box::new(class));
        self
    }

    /// Builder form of [`add`](Self::add)
    pub fn with<S: 'static>(mut self, class: TestClass<S>) -> Self {
        self.add(class);
        self
    }

    pub fn unit(&self, index: usize) -> Option<&dyn TestUnit> {
        self.units.get(index).map(|u| u.as_ref())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// A class selected for running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredClass {
    /// Position of the class in its [`Suite`]
    pub index: usize,
    pub name: String,
    /// Selected cases, in run order
    pub cases: Vec<CaseInfo>,
}

/// The ordered selection of tests a run executes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    pub classes: Vec<DiscoveredClass>,
}

impl Discovery {
    /// Select the tests of every class in `suite`.
    ///
    /// Described tests always run, in ordinal order. Plain methods run when
    /// their name starts with `prefix`, after the described tests, ordered
    /// by registration site and then by name. Classes without tests are left
    /// out.
    pub fn discover(suite: &Suite, prefix: &str) -> Self {
        let mut classes = Vec::new();
        for (index, unit) in suite.units.iter().enumerate() {
            let mut cases: Vec<CaseInfo> = unit
                .cases()
                .into_iter()
                .filter(|c| c.is_described() || c.id.name.starts_with(prefix))
                .collect();
            cases.sort_by(run_order);

            if cases.is_empty() {
                tracing::debug!(class = unit.name(), "no tests found");
                continue;
            }
            tracing::debug!(class = unit.name(), tests = cases.len(), "discovered");
            classes.push(DiscoveredClass {
                index,
                name: unit.name().to_string(),
                cases,
            });
        }
        Self { classes }
    }

    /// Keep only the cases `keep` accepts; classes left empty are dropped
    pub fn retain<F>(mut self, mut keep: F) -> Self
    where
        F: FnMut(&CaseInfo) -> bool,
    {
        for class in &mut self.classes {
            class.cases.retain(&mut keep);
        }
        self.classes.retain(|c| !c.cases.is_empty());
        self
    }

    /// Total number of selected tests
    pub fn len(&self) -> usize {
        self.classes.iter().map(|c| c.cases.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

fn run_order(a: &CaseInfo, b: &CaseInfo) -> Ordering {
    match (a.id.ordinal, b.id.ordinal) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => {
            // Known locations first, then by name
            let position = |c: &CaseInfo| (c.location.is_none(), c.location);
            position(a)
                .cmp(&position(b))
                .then_with(|| a.id.name.cmp(&b.id.name))
        }
    }
}

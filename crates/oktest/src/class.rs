//! Test classes: fixtures, hooks and test cases registered up front.
//!
//! A [`TestClass<S>`] plays the role of a test class whose instances are of
//! type `S`. A fresh `S` is built for every test invocation; bound providers,
//! bound releasers, `before_each` and `after_each` receive it.
//!
//! ```
//! use oktest::prelude::*;
//!
//! #[derive(Default)]
//! struct UserTest;
//!
//! let mut class = TestClass::<UserTest>::new("UserTest");
//! class.provide("name", (), |_| Ok("Haruhi".to_string()));
//! class.subject("greet()", |c| {
//!     c.test("says hello", ["name"], |cx| {
//!         let name = cx.arg::<String>("name")?;
//!         ok(format!("Hello {}", name)).eq("Hello Haruhi".to_string())
//!     });
//! });
//! ```

use crate::fixture::{Args, FixtureRegistry, FixtureValue, Param, Params};
use crate::outcome::{Context, ContextKind, TestId};
use crate::signal::TestResult;
use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::rc::Rc;

type BodyFn<S> = dyn Fn(&mut TestContext<'_, S>) -> TestResult;
type ClassHookFn = dyn Fn() -> TestResult;
type InstanceHookFn<S> = dyn Fn(&mut S) -> TestResult;

/// Where a test was registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    #[track_caller]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// How a case was registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseKind {
    /// Registered with a description; runs in ordinal order
    Described { ordinal: usize, description: String },
    /// Registered as a plain method; a test only when its name carries the test prefix
    Method,
}

/// A registered test case
pub struct TestCaseDescriptor<S> {
    pub(crate) name: String,
    pub(crate) kind: CaseKind,
    pub(crate) params: Vec<Param>,
    pub(crate) body: Rc<BodyFn<S>>,
    pub(crate) tags: Vec<String>,
    pub(crate) todo: bool,
    pub(crate) location: Option<SourceLocation>,
    pub(crate) context: Vec<Context>,
}

impl<S> TestCaseDescriptor<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &CaseKind {
        &self.kind
    }

    pub fn ordinal(&self) -> Option<usize> {
        match self.kind {
            CaseKind::Described { ordinal, .. } => Some(ordinal),
            CaseKind::Method => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.kind {
            CaseKind::Described { description, .. } => Some(description),
            CaseKind::Method => None,
        }
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn is_todo(&self) -> bool {
        self.todo
    }

    pub fn location(&self) -> Option<SourceLocation> {
        self.location
    }

    /// Mark this case as expected to fail
    pub fn todo(&mut self) -> &mut Self {
        self.todo = true;
        self
    }

    pub fn tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    pub(crate) fn id(&self, class: &str) -> TestId {
        TestId {
            class: class.to_string(),
            name: self.name.clone(),
            ordinal: self.ordinal(),
            description: self.description().map(str::to_string),
            context: self.context.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl<S> Clone for TestCaseDescriptor<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
            params: self.params.clone(),
            body: Rc::clone(&self.body),
            tags: self.tags.clone(),
            todo: self.todo,
            location: self.location,
            context: self.context.clone(),
        }
    }
}

impl<S> fmt::Debug for TestCaseDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCaseDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("todo", &self.todo)
            .field("location", &self.location)
            .finish()
    }
}

/// A callback registered by a running test, flushed at end of test
pub struct DeferredCallback {
    pub label: String,
    pub(crate) callback: Box<dyn FnOnce() -> TestResult>,
}

impl fmt::Debug for DeferredCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCallback")
            .field("label", &self.label)
            .finish()
    }
}

/// What a test body sees: its instance, its resolved arguments, and the
/// deferred-callback list of the current invocation
pub struct TestContext<'a, S> {
    pub state: &'a mut S,
    args: &'a Args,
    deferred: &'a mut Vec<DeferredCallback>,
    id: &'a TestId,
}

impl<'a, S> TestContext<'a, S> {
    pub(crate) fn new(
        state: &'a mut S,
        args: &'a Args,
        deferred: &'a mut Vec<DeferredCallback>,
        id: &'a TestId,
    ) -> Self {
        Self {
            state,
            args,
            deferred,
            id,
        }
    }

    /// Borrow the fixture injected for parameter `name`
    pub fn arg<T: Any>(&self, name: &str) -> anyhow::Result<&T> {
        self.args.get(name)
    }

    /// The shared handle of the fixture injected for `name`
    pub fn value(&self, name: &str) -> anyhow::Result<FixtureValue> {
        self.args.value(name)
    }

    pub fn args(&self) -> &Args {
        self.args
    }

    pub fn id(&self) -> &TestId {
        self.id
    }

    /// Run `f` when the test body finishes, before fixtures are released.
    /// Callbacks run last-registered first.
    pub fn at_end<F>(&mut self, f: F)
    where
        F: FnOnce() -> TestResult + 'static,
    {
        let label = format!("at_end#{}", self.deferred.len() + 1);
        self.deferred.push(DeferredCallback {
            label,
            callback: Box::new(f),
        });
    }
}

/// Class and instance lifecycle hooks
pub(crate) struct Hooks<S> {
    pub before_all: Option<Rc<ClassHookFn>>,
    pub after_all: Option<Rc<ClassHookFn>>,
    pub before_each: Option<Rc<InstanceHookFn<S>>>,
    pub after_each: Option<Rc<InstanceHookFn<S>>>,
}

impl<S> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            before_all: None,
            after_all: None,
            before_each: None,
            after_each: None,
        }
    }
}

impl<S> Clone for Hooks<S> {
    fn clone(&self) -> Self {
        Self {
            before_all: self.before_all.clone(),
            after_all: self.after_all.clone(),
            before_each: self.before_each.clone(),
            after_each: self.after_each.clone(),
        }
    }
}

/// A test class
pub struct TestClass<S> {
    pub(crate) name: String,
    pub(crate) fixtures: FixtureRegistry<S>,
    pub(crate) cases: Vec<TestCaseDescriptor<S>>,
    pub(crate) hooks: Hooks<S>,
    pub(crate) factory: Rc<dyn Fn() -> S>,
    next_ordinal: usize,
    context: Vec<Context>,
}

impl<S: Default + 'static> TestClass<S> {
    /// A class whose instances are built with `S::default()`
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_factory(name, S::default)
    }
}

impl<S: 'static> TestClass<S> {
    /// A class whose instances are built by `factory`
    pub fn with_factory<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> S + 'static,
    {
        Self {
            name: name.into(),
            fixtures: FixtureRegistry::new(),
            cases: Vec::new(),
            hooks: Hooks::default(),
            factory: Rc::new(factory),
            next_ordinal: 1,
            context: Vec::new(),
        }
    }

    /// A subclass of `base`: fixtures, hooks and plain methods are inherited,
    /// and anything registered on the subclass under the same name overrides
    /// the inherited entry.
    pub fn extends(name: impl Into<String>, base: &TestClass<S>) -> Self {
        let mut fixtures = FixtureRegistry::new();
        fixtures.inherit_from(&base.fixtures);
        Self {
            name: name.into(),
            fixtures,
            cases: base
                .cases
                .iter()
                .filter(|c| c.kind == CaseKind::Method)
                .cloned()
                .collect(),
            hooks: base.hooks.clone(),
            factory: Rc::clone(&base.factory),
            next_ordinal: 1,
            context: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fixtures(&self) -> &FixtureRegistry<S> {
        &self.fixtures
    }

    pub fn cases(&self) -> &[TestCaseDescriptor<S>] {
        &self.cases
    }

    /// Register a provider that does not take the instance; `name` may be
    /// given as `provide_<name>` or `fixture_<name>`
    pub fn provide<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&Args) -> anyhow::Result<T> + 'static,
    {
        self.fixtures.provide(name, params, f);
        self
    }

    /// Register a provider that receives the test instance
    pub fn provide_bound<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&mut S, &Args) -> anyhow::Result<T> + 'static,
    {
        self.fixtures.provide_bound(name, params, f);
        self
    }

    /// Register a releaser; `name` may be given as `release_<name>`
    pub fn release<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T, &Args) -> anyhow::Result<()> + 'static,
    {
        self.fixtures.release(name, params, f);
        self
    }

    pub fn release_bound<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F) -> &mut Self
    where
        T: Any,
        F: Fn(&mut S, &T, &Args) -> anyhow::Result<()> + 'static,
    {
        self.fixtures.release_bound(name, params, f);
        self
    }

    pub fn before_all<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> TestResult + 'static,
    {
        self.hooks.before_all = Some(Rc::new(f));
        self
    }

    pub fn after_all<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> TestResult + 'static,
    {
        self.hooks.after_all = Some(Rc::new(f));
        self
    }

    pub fn before_each<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut S) -> TestResult + 'static,
    {
        self.hooks.before_each = Some(Rc::new(f));
        self
    }

    pub fn after_each<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut S) -> TestResult + 'static,
    {
        self.hooks.after_each = Some(Rc::new(f));
        self
    }

    /// Register a described test; it gets the next ordinal
    #[track_caller]
    pub fn test<F>(&mut self, description: &str, params: impl Into<Params>, body: F) -> &mut TestCaseDescriptor<S>
    where
        F: Fn(&mut TestContext<'_, S>) -> TestResult + 'static,
    {
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        let kind = CaseKind::Described {
            ordinal,
            description: description.to_string(),
        };
        self.push_case(format!("test_{:03}", ordinal), kind, params.into(), Rc::new(body))
    }

    /// Register a described test that is expected to fail
    #[track_caller]
    pub fn todo<F>(&mut self, description: &str, params: impl Into<Params>, body: F) -> &mut TestCaseDescriptor<S>
    where
        F: Fn(&mut TestContext<'_, S>) -> TestResult + 'static,
    {
        self.test(description, params, body).todo()
    }

    /// Register a plain method. It runs as a test only when its name starts
    /// with the run's test prefix; a method of the same name inherited from a
    /// base class is replaced.
    #[track_caller]
    pub fn method<F>(&mut self, name: &str, params: impl Into<Params>, body: F) -> &mut TestCaseDescriptor<S>
    where
        F: Fn(&mut TestContext<'_, S>) -> TestResult + 'static,
    {
        self.cases
            .retain(|c| !(c.kind == CaseKind::Method && c.name == name));
        self.push_case(name.to_string(), CaseKind::Method, params.into(), Rc::new(body))
    }

    /// Group the tests registered by `build` under a subject
    pub fn subject(&mut self, title: &str, build: impl FnOnce(&mut Self)) -> &mut Self {
        self.grouped(ContextKind::Subject, title, build)
    }

    /// Group the tests registered by `build` under a situation
    pub fn situation(&mut self, title: &str, build: impl FnOnce(&mut Self)) -> &mut Self {
        self.grouped(ContextKind::Situation, title, build)
    }

    fn grouped(&mut self, kind: ContextKind, title: &str, build: impl FnOnce(&mut Self)) -> &mut Self {
        self.context.push(Context {
            kind,
            title: title.to_string(),
        });
        build(self);
        self.context.pop();
        self
    }

    #[track_caller]
    fn push_case(
        &mut self,
        name: String,
        kind: CaseKind,
        params: Params,
        body: Rc<BodyFn<S>>,
    ) -> &mut TestCaseDescriptor<S> {
        let index = self.cases.len();
        self.cases.push(TestCaseDescriptor {
            name,
            kind,
            params: params.as_slice().to_vec(),
            body,
            tags: Vec::new(),
            todo: false,
            location: Some(SourceLocation::caller()),
            context: self.context.clone(),
        });
        &mut self.cases[index]
    }
}

impl<S> fmt::Debug for TestClass<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestClass")
            .field("name", &self.name)
            .field("fixtures", &self.fixtures.names())
            .field("cases", &self.cases)
            .finish()
    }
}

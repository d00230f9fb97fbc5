//! Fixtures: named values built by providers, injected into tests by
//! parameter name, and torn down by releasers.
//!
//! - [`registry`] maps fixture names to providers and releasers
//! - [`graph`] resolves one invocation's dependency graph and releases it

pub mod graph;
pub mod registry;

pub use graph::{FixtureGraph, NodeState, ResolutionNode, ResolutionPlan};
pub use registry::{
    DelegateFixtures, FixtureRegistry, FixtureResolver, FixtureScope, FixtureSpec, Lookup,
    Provider, ProviderSpec, Releaser, ReleaserSpec,
};

use crate::error::FixtureError;
use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;

/// A constructed fixture, shared by every consumer within one invocation
pub type FixtureValue = Rc<dyn Any>;

/// Wrap any value as a fixture value
pub fn value<T: Any>(v: T) -> FixtureValue {
    Rc::new(v)
}

/// A declared parameter of a test, provider or releaser
///
/// A parameter carrying a default is never resolved: the default is passed as is.
#[derive(Clone)]
pub struct Param {
    name: String,
    default: Option<FixtureValue>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn with_default<T: Any>(name: impl Into<String>, default: T) -> Self {
        Self {
            name: name.into(),
            default: Some(Rc::new(default)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&FixtureValue> {
        self.default.as_ref()
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("name", &self.name)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self {
        Param::new(name)
    }
}

impl From<String> for Param {
    fn from(name: String) -> Self {
        Param::new(name)
    }
}

/// An ordered parameter list
#[derive(Debug, Clone, Default)]
pub struct Params(Vec<Param>);

impl Params {
    pub fn as_slice(&self) -> &[Param] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(Param::name)
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::default()
    }
}

impl<const N: usize> From<[&str; N]> for Params {
    fn from(names: [&str; N]) -> Self {
        Params(names.into_iter().map(Param::from).collect())
    }
}

impl From<&[&str]> for Params {
    fn from(names: &[&str]) -> Self {
        Params(names.iter().copied().map(Param::from).collect())
    }
}

impl<const N: usize> From<[Param; N]> for Params {
    fn from(params: [Param; N]) -> Self {
        Params(params.into())
    }
}

impl From<Vec<Param>> for Params {
    fn from(params: Vec<Param>) -> Self {
        Params(params)
    }
}

/// Resolved arguments, in declared parameter order
#[derive(Clone, Default)]
pub struct Args {
    entries: Vec<(String, FixtureValue)>,
}

impl Args {
    pub(crate) fn push(&mut self, name: &str, value: FixtureValue) {
        self.entries.push((name.to_string(), value));
    }

    /// Borrow the argument `name` as a `T`
    pub fn get<T: Any>(&self, name: &str) -> anyhow::Result<&T> {
        let value = self.find(name)?;
        value.downcast_ref::<T>().ok_or_else(|| {
            FixtureError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            }
            .into()
        })
    }

    /// Borrow the argument at `index` as a `T`
    pub fn at<T: Any>(&self, index: usize) -> anyhow::Result<&T> {
        let (name, value) = self.entries.get(index).ok_or_else(|| FixtureError::UnknownArgument {
            name: format!("#{}", index),
        })?;
        value.downcast_ref::<T>().ok_or_else(|| {
            FixtureError::TypeMismatch {
                name: name.clone(),
                expected: type_name::<T>(),
            }
            .into()
        })
    }

    /// The shared handle for `name`; identity-equal across consumers
    pub fn value(&self, name: &str) -> anyhow::Result<FixtureValue> {
        self.find(name).map(Rc::clone)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find(&self, name: &str) -> anyhow::Result<&FixtureValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| {
                FixtureError::UnknownArgument {
                    name: name.to_string(),
                }
                .into()
            })
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Strip a `provide_` / `fixture_` method prefix: `provide_db` and `db` both name `db`
pub fn provider_name(name: &str) -> &str {
    name.strip_prefix("provide_")
        .or_else(|| name.strip_prefix("fixture_"))
        .unwrap_or(name)
}

/// Strip a `release_` method prefix
pub fn releaser_name(name: &str) -> &str {
    name.strip_prefix("release_").unwrap_or(name)
}

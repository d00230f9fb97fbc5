//! Fixture registry: name → provider/releaser lookup.
//!
//! Lookup is two-tiered. Providers registered on the test class (or inherited
//! from a base class) come first; otherwise the run-scoped delegate
//! [`FixtureResolver`] may supply the value as a dependency-free leaf.

use super::{value, Args, FixtureValue, Param, Params};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

type BoundProvideFn<S> = dyn Fn(&mut S, &Args) -> anyhow::Result<FixtureValue>;
type FreeProvideFn = dyn Fn(&Args) -> anyhow::Result<FixtureValue>;
type BoundReleaseFn<S> = dyn Fn(&mut S, &FixtureValue, &Args) -> anyhow::Result<()>;
type FreeReleaseFn = dyn Fn(&FixtureValue, &Args) -> anyhow::Result<()>;

/// A provider callable, tagged by whether it receives the test instance
pub enum Provider<S> {
    Bound(Rc<BoundProvideFn<S>>),
    Free(Rc<FreeProvideFn>),
}

impl<S> Provider<S> {
    pub fn call(&self, instance: &mut S, args: &Args) -> anyhow::Result<FixtureValue> {
        match self {
            Provider::Bound(f) => f(instance, args),
            Provider::Free(f) => f(args),
        }
    }

    pub fn is_bound(&self) -> bool {
        matches!(self, Provider::Bound(_))
    }
}

impl<S> Clone for Provider<S> {
    fn clone(&self) -> Self {
        match self {
            Provider::Bound(f) => Provider::Bound(Rc::clone(f)),
            Provider::Free(f) => Provider::Free(Rc::clone(f)),
        }
    }
}

/// A releaser callable, tagged by whether it receives the test instance
pub enum Releaser<S> {
    Bound(Rc<BoundReleaseFn<S>>),
    Free(Rc<FreeReleaseFn>),
}

impl<S> Releaser<S> {
    pub fn call(&self, instance: &mut S, value: &FixtureValue, args: &Args) -> anyhow::Result<()> {
        match self {
            Releaser::Bound(f) => f(instance, value, args),
            Releaser::Free(f) => f(value, args),
        }
    }
}

impl<S> Clone for Releaser<S> {
    fn clone(&self) -> Self {
        match self {
            Releaser::Bound(f) => Releaser::Bound(Rc::clone(f)),
            Releaser::Free(f) => Releaser::Free(Rc::clone(f)),
        }
    }
}

/// A provider with its declared dependencies
pub struct ProviderSpec<S> {
    pub params: Vec<Param>,
    pub provider: Provider<S>,
}

impl<S> Clone for ProviderSpec<S> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            provider: self.provider.clone(),
        }
    }
}

/// A releaser with the extra parameters it declares besides the value
pub struct ReleaserSpec<S> {
    pub params: Vec<Param>,
    pub releaser: Releaser<S>,
}

impl<S> Clone for ReleaserSpec<S> {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            releaser: self.releaser.clone(),
        }
    }
}

/// Which tier supplied a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureScope {
    /// Registered on the test class or one of its bases
    Class,
    /// Supplied by the run-scoped delegate resolver
    Delegate,
}

/// A class-scope fixture found by [`FixtureRegistry::lookup`]
pub struct FixtureSpec<'a, S> {
    pub name: &'a str,
    pub provider: &'a ProviderSpec<S>,
    pub releaser: Option<&'a ReleaserSpec<S>>,
}

impl<S> FixtureSpec<'_, S> {
    pub fn scope(&self) -> FixtureScope {
        FixtureScope::Class
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.provider.params.iter().map(Param::name)
    }
}

/// Result of a two-tier lookup
pub enum Lookup<'a, S> {
    Local(FixtureSpec<'a, S>),
    Delegate(&'a dyn FixtureResolver),
    NotFound,
}

/// Process-level fallback for fixtures no test class provides.
///
/// Part of the run configuration; it must not change while a run is in
/// progress.
pub trait FixtureResolver {
    /// Whether this resolver can provide `name`
    fn knows(&self, name: &str) -> bool;

    /// Build the value for `name`
    fn provide(&self, name: &str) -> anyhow::Result<FixtureValue>;

    /// Release a value this resolver provided
    fn release(&self, _name: &str, _value: &FixtureValue) -> anyhow::Result<()> {
        Ok(())
    }
}

type DelegateProvideFn = dyn Fn() -> anyhow::Result<FixtureValue>;
type DelegateReleaseFn = dyn Fn(&FixtureValue) -> anyhow::Result<()>;

/// A map-backed [`FixtureResolver`]
#[derive(Default)]
pub struct DelegateFixtures {
    providers: HashMap<String, Box<DelegateProvideFn>>,
    releasers: HashMap<String, Box<DelegateReleaseFn>>,
}

impl DelegateFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn provide<T, F>(mut self, name: &str, f: F) -> Self
    where
        T: Any,
        F: Fn() -> anyhow::Result<T> + 'static,
    {
        self.providers
            .insert(provider_key(name), Box::new(move || f().map(value)));
        self
    }

    pub fn release<T, F>(mut self, name: &str, f: F) -> Self
    where
        T: Any,
        F: Fn(&T) -> anyhow::Result<()> + 'static,
    {
        let name = super::releaser_name(name).to_string();
        let key = name.clone();
        self.releasers.insert(
            key,
            Box::new(move |v: &FixtureValue| f(downcast_value::<T>(&name, v)?)),
        );
        self
    }
}

impl FixtureResolver for DelegateFixtures {
    fn knows(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    fn provide(&self, name: &str) -> anyhow::Result<FixtureValue> {
        match self.providers.get(name) {
            Some(f) => f(),
            None => anyhow::bail!("delegate has no fixture '{}'", name),
        }
    }

    fn release(&self, name: &str, value: &FixtureValue) -> anyhow::Result<()> {
        match self.releasers.get(name) {
            Some(f) => f(value),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for DelegateFixtures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.providers.keys().collect();
        names.sort();
        f.debug_struct("DelegateFixtures")
            .field("providers", &names)
            .finish()
    }
}

/// Class-scope providers and releasers, built once per class
pub struct FixtureRegistry<S> {
    providers: HashMap<String, ProviderSpec<S>>,
    releasers: HashMap<String, ReleaserSpec<S>>,
}

impl<S> Default for FixtureRegistry<S> {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            releasers: HashMap::new(),
        }
    }
}

impl<S> Clone for FixtureRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            providers: self.providers.clone(),
            releasers: self.releasers.clone(),
        }
    }
}

impl<S: 'static> FixtureRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider; `name` may carry the `provide_` or `fixture_` prefix
    pub fn register_provider(&mut self, name: &str, params: impl Into<Params>, provider: Provider<S>) {
        let spec = ProviderSpec {
            params: params.into().as_slice().to_vec(),
            provider,
        };
        self.providers.insert(provider_key(name), spec);
    }

    /// Register a releaser; `name` may carry the `release_` prefix
    pub fn register_releaser(&mut self, name: &str, params: impl Into<Params>, releaser: Releaser<S>) {
        let spec = ReleaserSpec {
            params: params.into().as_slice().to_vec(),
            releaser,
        };
        self.releasers
            .insert(super::releaser_name(name).to_string(), spec);
    }

    pub fn provide<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F)
    where
        T: Any,
        F: Fn(&Args) -> anyhow::Result<T> + 'static,
    {
        let provider = Provider::Free(Rc::new(move |args: &Args| f(args).map(value)));
        self.register_provider(name, params, provider);
    }

    pub fn provide_bound<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F)
    where
        T: Any,
        F: Fn(&mut S, &Args) -> anyhow::Result<T> + 'static,
    {
        let provider =
            Provider::Bound(Rc::new(move |this: &mut S, args: &Args| f(this, args).map(value)));
        self.register_provider(name, params, provider);
    }

    pub fn release<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F)
    where
        T: Any,
        F: Fn(&T, &Args) -> anyhow::Result<()> + 'static,
    {
        let fixture = super::releaser_name(name).to_string();
        let releaser = Releaser::Free(Rc::new(move |v: &FixtureValue, args: &Args| {
            f(downcast_value::<T>(&fixture, v)?, args)
        }));
        self.register_releaser(name, params, releaser);
    }

    pub fn release_bound<T, F>(&mut self, name: &str, params: impl Into<Params>, f: F)
    where
        T: Any,
        F: Fn(&mut S, &T, &Args) -> anyhow::Result<()> + 'static,
    {
        let fixture = super::releaser_name(name).to_string();
        let releaser = Releaser::Bound(Rc::new(
            move |this: &mut S, v: &FixtureValue, args: &Args| {
                f(this, downcast_value::<T>(&fixture, v)?, args)
            },
        ));
        self.register_releaser(name, params, releaser);
    }
}

impl<S> FixtureRegistry<S> {
    /// Two-tier lookup: class scope, then the delegate
    pub fn lookup<'a>(&'a self, name: &str, delegate: Option<&'a dyn FixtureResolver>) -> Lookup<'a, S> {
        if let Some((key, provider)) = self.providers.get_key_value(name) {
            return Lookup::Local(FixtureSpec {
                name: key,
                provider,
                releaser: self.releasers.get(name),
            });
        }
        match delegate {
            Some(resolver) if resolver.knows(name) => Lookup::Delegate(resolver),
            _ => Lookup::NotFound,
        }
    }

    /// The class-scope releaser for `name`, if any
    pub fn releaser(&self, name: &str) -> Option<&ReleaserSpec<S>> {
        self.releasers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Copy in a base class's entries that this registry does not override
    pub fn inherit_from(&mut self, base: &FixtureRegistry<S>) {
        for (name, spec) in &base.providers {
            self.providers
                .entry(name.clone())
                .or_insert_with(|| spec.clone());
        }
        for (name, spec) in &base.releasers {
            self.releasers
                .entry(name.clone())
                .or_insert_with(|| spec.clone());
        }
    }

    /// Provider names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

fn provider_key(name: &str) -> String {
    super::provider_name(name).to_string()
}

fn downcast_value<'v, T: Any>(fixture: &str, v: &'v FixtureValue) -> anyhow::Result<&'v T> {
    v.downcast_ref::<T>().ok_or_else(|| {
        crate::error::FixtureError::TypeMismatch {
            name: fixture.to_string(),
            expected: std::any::type_name::<T>(),
        }
        .into()
    })
}

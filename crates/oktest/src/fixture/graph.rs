//! Per-invocation fixture resolution.
//!
//! Resolution is depth first and left to right over declared parameters. A
//! fixture is constructed at most once per invocation and shared by every
//! consumer. Release walks the construction order backwards, so teardown is
//! always the exact reverse of setup.

use super::registry::{FixtureRegistry, FixtureResolver, FixtureScope, Lookup};
use super::{Args, FixtureValue, Param};
use crate::error::{guard, FixtureError};
use anyhow::Context as _;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Unvisited,
    Visiting,
    Resolved,
}

/// One fixture in the graph of a single invocation
#[derive(Debug)]
pub struct ResolutionNode {
    pub name: String,
    pub state: NodeState,
    pub value: Option<FixtureValue>,
    /// Fixtures that requested this one, in first-request order
    pub dependents: Vec<String>,
    pub scope: Option<FixtureScope>,
}

impl ResolutionNode {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: NodeState::Unvisited,
            value: None,
            dependents: Vec::new(),
            scope: None,
        }
    }
}

/// Construction order of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    construction: Vec<String>,
}

impl ResolutionPlan {
    pub fn construction_order(&self) -> &[String] {
        &self.construction
    }

    /// Exactly the reverse of [`construction_order`](Self::construction_order)
    pub fn release_order(&self) -> impl Iterator<Item = &str> {
        self.construction.iter().rev().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.construction.is_empty()
    }
}

/// Resolves and releases the fixtures of one test invocation
pub struct FixtureGraph<'r, S> {
    registry: &'r FixtureRegistry<S>,
    delegate: Option<&'r dyn FixtureResolver>,
    class: String,
    test: String,
    nodes: HashMap<String, ResolutionNode>,
    stack: Vec<String>,
    plan: ResolutionPlan,
}

impl<'r, S> FixtureGraph<'r, S> {
    pub fn new(
        registry: &'r FixtureRegistry<S>,
        delegate: Option<&'r dyn FixtureResolver>,
        class: impl Into<String>,
        test: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            delegate,
            class: class.into(),
            test: test.into(),
            nodes: HashMap::new(),
            stack: Vec::new(),
            plan: ResolutionPlan::default(),
        }
    }

    pub fn plan(&self) -> &ResolutionPlan {
        &self.plan
    }

    pub fn node(&self, name: &str) -> Option<&ResolutionNode> {
        self.nodes.get(name)
    }

    /// Resolve the top-level parameters of a test.
    ///
    /// On error, whatever was constructed before the failure stays in the
    /// plan and must still be handed to [`release`](Self::release).
    pub fn resolve(&mut self, instance: &mut S, params: &[Param]) -> anyhow::Result<Args> {
        self.resolve_params(None, params, instance)
    }

    fn resolve_params(
        &mut self,
        owner: Option<&str>,
        params: &[Param],
        instance: &mut S,
    ) -> anyhow::Result<Args> {
        let mut args = Args::default();
        for param in params {
            let value = match param.default() {
                Some(default) => Rc::clone(default),
                None => self.resolve_name(param.name(), owner, instance)?,
            };
            args.push(param.name(), value);
        }
        Ok(args)
    }

    fn resolve_name(
        &mut self,
        name: &str,
        requester: Option<&str>,
        instance: &mut S,
    ) -> anyhow::Result<FixtureValue> {
        let node = self
            .nodes
            .entry(name.to_string())
            .or_insert_with(|| ResolutionNode::new(name));
        if let Some(requester) = requester {
            if !node.dependents.iter().any(|d| d == requester) {
                node.dependents.push(requester.to_string());
            }
        }

        match node.state {
            NodeState::Resolved => {
                if let Some(value) = &node.value {
                    return Ok(Rc::clone(value));
                }
            }
            NodeState::Visiting => return Err(self.looped(name).into()),
            NodeState::Unvisited => {}
        }
        node.state = NodeState::Visiting;

        self.stack.push(name.to_string());
        let constructed = self.construct(name, instance);
        self.stack.pop();

        let node = self
            .nodes
            .entry(name.to_string())
            .or_insert_with(|| ResolutionNode::new(name));
        match constructed {
            Ok((value, scope)) => {
                node.state = NodeState::Resolved;
                node.value = Some(Rc::clone(&value));
                node.scope = Some(scope);
                self.plan.construction.push(name.to_string());
                tracing::trace!(fixture = name, ?scope, "fixture constructed");
                Ok(value)
            }
            Err(err) => {
                node.state = NodeState::Unvisited;
                Err(err)
            }
        }
    }

    fn construct(
        &mut self,
        name: &str,
        instance: &mut S,
    ) -> anyhow::Result<(FixtureValue, FixtureScope)> {
        let registry = self.registry;
        match registry.lookup(name, self.delegate) {
            Lookup::Local(spec) => {
                let args = self.resolve_params(Some(name), &spec.provider.params, instance)?;
                let value = guard(|| spec.provider.provider.call(instance, &args))
                    .with_context(|| format!("provider of fixture '{}' failed", name))?;
                Ok((value, FixtureScope::Class))
            }
            Lookup::Delegate(resolver) => {
                let value = guard(|| resolver.provide(name))
                    .with_context(|| format!("delegate provider of fixture '{}' failed", name))?;
                Ok((value, FixtureScope::Delegate))
            }
            Lookup::NotFound => Err(FixtureError::MissingFixture {
                name: name.to_string(),
                class: self.class.clone(),
                test: self.test.clone(),
            }
            .into()),
        }
    }

    /// Render the cycle that re-enters `name`: the path leading into the
    /// cycle joined by `->`, the cycle itself by `=>`.
    fn looped(&self, name: &str) -> FixtureError {
        let entry = self.stack.iter().position(|n| n == name).unwrap_or(0);
        let mut path = self
            .stack
            .iter()
            .take(entry + 1)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("->");
        for step in self.stack.iter().skip(entry + 1) {
            path.push_str("=>");
            path.push_str(step);
        }
        path.push_str("=>");
        path.push_str(name);

        FixtureError::LoopedDependency {
            path,
            class: self.class.clone(),
            test: self.test.clone(),
        }
    }

    /// Run releasers in reverse construction order.
    ///
    /// Every releaser runs even when an earlier one fails; the failures are
    /// returned. Releaser parameters are taken from already resolved values
    /// only, providers are never invoked again.
    pub fn release(&mut self, instance: &mut S) -> Vec<anyhow::Error> {
        let mut failures = Vec::new();
        let order: Vec<String> = self.plan.release_order().map(str::to_string).collect();

        for name in &order {
            let Some(node) = self.nodes.get(name) else {
                continue;
            };
            let Some(value) = node.value.clone() else {
                continue;
            };

            let result = if let Some(spec) = self.registry.releaser(name) {
                self.release_args(name, &spec.params).and_then(|args| {
                    guard(|| spec.releaser.call(instance, &value, &args))
                        .with_context(|| format!("releaser of fixture '{}' failed", name))
                })
            } else if node.scope == Some(FixtureScope::Delegate) {
                match self.delegate {
                    Some(resolver) => guard(|| resolver.release(name, &value))
                        .with_context(|| format!("delegate releaser of fixture '{}' failed", name)),
                    None => Ok(()),
                }
            } else {
                Ok(())
            };

            match result {
                Ok(()) => tracing::trace!(fixture = %name, "fixture released"),
                Err(err) => {
                    tracing::warn!(fixture = %name, error = %err, "fixture release failed");
                    failures.push(err);
                }
            }
        }

        self.plan.construction.clear();
        failures
    }

    fn release_args(&self, fixture: &str, params: &[Param]) -> anyhow::Result<Args> {
        let mut args = Args::default();
        for param in params {
            let value = match param.default() {
                Some(default) => Rc::clone(default),
                None => self
                    .nodes
                    .get(param.name())
                    .filter(|n| n.state == NodeState::Resolved)
                    .and_then(|n| n.value.clone())
                    .ok_or_else(|| FixtureError::UnresolvedReleaseDependency {
                        fixture: fixture.to_string(),
                        name: param.name().to_string(),
                    })?,
            };
            args.push(param.name(), value);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{DelegateFixtures, Params};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    type Log = Rc<RefCell<Vec<String>>>;

    /// `specs` pairs a fixture name with its comma-separated dependencies
    fn logging_registry(log: &Log, specs: &[(&str, &str)]) -> FixtureRegistry<()> {
        let mut registry = FixtureRegistry::new();
        for (name, deps) in specs {
            let deps: Vec<&str> = deps.split(',').filter(|d| !d.is_empty()).collect();
            let name = name.to_string();
            let provide_log = Rc::clone(log);
            let provided = name.clone();
            registry.provide(&name, Params::from(deps.as_slice()), move |_| {
                provide_log.borrow_mut().push(format!("+{}", provided));
                Ok(provided.clone())
            });
            let release_log = Rc::clone(log);
            registry.release(&name, (), move |v: &String, _| {
                release_log.borrow_mut().push(format!("-{}", v));
                Ok(())
            });
        }
        registry
    }

    #[test]
    fn test_dependencies_constructed_first() {
        let log: Log = Rc::default();
        let registry = logging_registry(
            &log,
            &[
                ("x", "y1,z1"),
                ("y1", "y2"),
                ("y2", ""),
                ("z1", "z2"),
                ("z2", ""),
            ],
        );

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "order");
        let args = graph.resolve(&mut (), &[Param::new("x")]).unwrap();
        assert_eq!(args.get::<String>("x").unwrap(), "x");
        assert_eq!(
            graph.plan().construction_order(),
            &["y2", "y1", "z2", "z1", "x"]
        );

        assert!(graph.release(&mut ()).is_empty());
        assert_eq!(
            *log.borrow(),
            vec!["+y2", "+y1", "+z2", "+z1", "+x", "-x", "-z1", "-z2", "-y1", "-y2"]
        );
    }

    #[test]
    fn test_shared_dependency_resolved_once() {
        let log: Log = Rc::default();
        let registry = logging_registry(
            &log,
            &[("a", "shared"), ("b", "shared"), ("shared", "")],
        );

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "shared");
        graph
            .resolve(&mut (), &[Param::new("a"), Param::new("b")])
            .unwrap();

        assert_eq!(graph.plan().construction_order().join(","), "shared,a,b");
        assert_eq!(graph.node("shared").unwrap().dependents, vec!["a", "b"]);
        assert_eq!(log.borrow().iter().filter(|e| *e == "+shared").count(), 1);
    }

    #[test]
    fn test_cycle_path_rendering() {
        let log: Log = Rc::default();
        let registry = logging_registry(
            &log,
            &[("a", "b"), ("b", "e"), ("e", "g"), ("g", "b")],
        );

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "looped");
        let err = graph.resolve(&mut (), &[Param::new("a")]).unwrap_err();
        let fixture_err = err.downcast_ref::<FixtureError>().unwrap();
        assert_eq!(
            fixture_err,
            &FixtureError::LoopedDependency {
                path: "a->b=>e=>g=>b".to_string(),
                class: "FooTest".to_string(),
                test: "looped".to_string(),
            }
        );
        assert!(graph.plan().is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_self_loop() {
        let log: Log = Rc::default();
        let registry = logging_registry(&log, &[("a", "a")]);
        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "self");
        let err = graph.resolve(&mut (), &[Param::new("a")]).unwrap_err();
        assert!(err.to_string().contains("a=>a"), "{}", err);
    }

    #[test]
    fn test_missing_fixture_keeps_partial_plan() {
        let log: Log = Rc::default();
        let registry = logging_registry(&log, &[("ok", ""), ("broken", "nowhere")]);

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "partial");
        let err = graph
            .resolve(&mut (), &[Param::new("ok"), Param::new("broken")])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "fixture 'nowhere' not found (class: FooTest, test: 'partial')"
        );

        assert_eq!(graph.plan().construction_order().join(","), "ok");
        assert!(graph.release(&mut ()).is_empty());
        assert_eq!(*log.borrow(), vec!["+ok", "-ok"]);
    }

    #[test]
    fn test_param_default_skips_resolution() {
        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        registry.provide("greeting", [Param::with_default("name", "Haruhi")], |args| {
            Ok(format!("Hello {}", args.get::<&str>("name")?))
        });

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "defaults");
        let args = graph
            .resolve(
                &mut (),
                &[Param::new("greeting"), Param::with_default("unprovided", 0_u8)],
            )
            .unwrap();
        assert_eq!(args.get::<String>("greeting").unwrap(), "Hello Haruhi");
        assert_eq!(*args.get::<u8>("unprovided").unwrap(), 0);
        assert_eq!(graph.plan().construction_order().join(","), "greeting");
    }

    #[test]
    fn test_releasers_all_run_when_one_fails() {
        let log: Log = Rc::default();
        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        for name in ["first", "second", "third"] {
            registry.provide(name, (), move |_| Ok(name));
            let log = Rc::clone(&log);
            registry.release(name, (), move |v: &&str, _| {
                log.borrow_mut().push(v.to_string());
                if *v == "second" {
                    anyhow::bail!("disk full");
                }
                Ok(())
            });
        }

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "release");
        graph
            .resolve(
                &mut (),
                &[Param::new("first"), Param::new("second"), Param::new("third")],
            )
            .unwrap();
        let failures = graph.release(&mut ());

        assert_eq!(*log.borrow(), vec!["third", "second", "first"]);
        assert_eq!(failures.len(), 1);
        assert!(format!("{:#}", failures[0]).contains("disk full"));
    }

    #[test]
    fn test_releaser_params_use_resolved_values_only() {
        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        registry.provide("conn", (), |_| Ok("conn"));
        registry.provide("audit", (), |_| Ok("audit"));
        registry.release("conn", ["audit"], |_: &&str, args| {
            args.get::<&str>("audit")?;
            Ok(())
        });

        // `audit` resolved during setup: release succeeds
        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "with-audit");
        graph
            .resolve(&mut (), &[Param::new("conn"), Param::new("audit")])
            .unwrap();
        assert!(graph.release(&mut ()).is_empty());

        // `audit` never resolved: release fails rather than building it
        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "without-audit");
        graph.resolve(&mut (), &[Param::new("conn")]).unwrap();
        let failures = graph.release(&mut ());
        assert_eq!(failures.len(), 1);
        assert_eq!(
            failures[0].downcast_ref::<FixtureError>(),
            Some(&FixtureError::UnresolvedReleaseDependency {
                fixture: "conn".to_string(),
                name: "audit".to_string(),
            })
        );
        assert!(graph.node("audit").is_none());
    }

    #[test]
    fn test_delegate_leaf_and_release() {
        let released: Rc<RefCell<Vec<u32>>> = Rc::default();
        let sink = Rc::clone(&released);
        let delegate = DelegateFixtures::new()
            .provide("port", || Ok(8080_u32))
            .release("port", move |p: &u32| {
                sink.borrow_mut().push(*p);
                Ok(())
            });

        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        registry.provide("url", ["port"], |args| {
            Ok(format!("http://localhost:{}", args.get::<u32>("port")?))
        });

        let mut graph = FixtureGraph::new(&registry, Some(&delegate), "FooTest", "delegate");
        let args = graph.resolve(&mut (), &[Param::new("url")]).unwrap();
        assert_eq!(args.get::<String>("url").unwrap(), "http://localhost:8080");
        assert_eq!(
            graph.node("port").unwrap().scope,
            Some(FixtureScope::Delegate)
        );

        assert!(graph.release(&mut ()).is_empty());
        assert_eq!(*released.borrow(), vec![8080]);
    }

    #[test]
    fn test_provider_panic_becomes_error() {
        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        registry.provide("zero", (), |_| Ok(0_i32));
        registry.provide("ratio", ["zero"], |args| {
            let zero = *args.get::<i32>("zero")?;
            Ok(1 / zero)
        });

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "panic");
        let err = graph.resolve(&mut (), &[Param::new("ratio")]).unwrap_err();
        assert!(format!("{:#}", err).contains("attempt to divide by zero"));
        assert_eq!(graph.plan().construction_order().join(","), "zero");
    }

    #[test]
    fn test_every_handed_out_value_is_released() {
        let mut registry: FixtureRegistry<()> = FixtureRegistry::new();
        registry.provide("flaky", (), |_| -> anyhow::Result<u8> { anyhow::bail!("refused") });
        registry.provide("port", (), |_| Ok(8080_u16));
        let released = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&released);
        registry.release("port", (), move |v: &u16, _| {
            seen.borrow_mut().push(*v);
            Ok(())
        });

        let mut graph = FixtureGraph::new(&registry, None, "FooTest", "plan");
        assert!(graph.resolve(&mut (), &[Param::new("flaky")]).is_err());
        assert_eq!(graph.node("flaky").unwrap().state, NodeState::Unvisited);
        assert!(graph.node("flaky").unwrap().value.is_none());

        let args = graph.resolve(&mut (), &[Param::new("port")]).unwrap();
        let node = graph.node("port").unwrap();
        assert_eq!(node.state, NodeState::Resolved);
        assert!(Rc::ptr_eq(node.value.as_ref().unwrap(), &args.value("port").unwrap()));
        assert_eq!(graph.plan().construction_order().join(","), "port");

        assert!(graph.release(&mut ()).is_empty());
        assert_eq!(*released.borrow(), vec![8080]);
    }
}

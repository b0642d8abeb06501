//! Service graph and dependency layering.
//!
//! A [`ServiceGraph`] holds services keyed by name. Edges point from a service
//! to the services it depends on. Graphs are built once before a run and are
//! read-only while the orchestrator walks them.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::Duration;

use crate::error::GraphError;
use crate::probe::ReadinessCheck;

/// A deployable unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    name: String,
    dependencies: Vec<String>,
    readiness: ReadinessCheck,
    max_wait: Duration,
    retry_interval: Duration,
}

impl Service {
    /// Creates a service with no dependencies, a 60s readiness window and a
    /// 2s retry interval.
    pub fn new(name: impl Into<String>, readiness: ReadinessCheck) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            readiness,
            max_wait: Duration::from_secs(crate::config::DEFAULT_MAX_WAIT_SECS),
            retry_interval: Duration::from_secs(crate::config::DEFAULT_RETRY_INTERVAL_SECS),
        }
    }

    /// Adds a dependency.
    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds several dependencies.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn readiness(&self) -> &ReadinessCheck {
        &self.readiness
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Number of probe attempts allowed: `max_wait / retry_interval`, at
    /// least one.
    pub fn max_attempts(&self) -> u32 {
        if self.retry_interval.is_zero() {
            return 1;
        }
        let attempts = self.max_wait.as_nanos() / self.retry_interval.as_nanos();
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// The set of services of one deployment.
#[derive(Debug, Clone, Default)]
pub struct ServiceGraph {
    services: BTreeMap<String, Service>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

impl ServiceGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph of every service in a configuration file.
    pub fn from_config(config: &crate::config::Config) -> Result<Self, GraphError> {
        config.build_graph()
    }

    /// Adds a service.
    ///
    /// Dependencies are not checked here; see [`ServiceGraph::validate`].
    pub fn add_service(&mut self, service: Service) -> Result<(), GraphError> {
        if self.services.contains_key(service.name()) {
            return Err(GraphError::DuplicateService {
                name: service.name().to_string(),
            });
        }
        self.services.insert(service.name().to_string(), service);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Services in name order.
    pub fn services(&self) -> impl Iterator<Item = &Service> {
        self.services.values()
    }

    /// Checks that every dependency exists and that there are no cycles.
    ///
    /// Services are visited in name order and dependencies in declaration
    /// order, so the same graph always yields the same error.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut marks: HashMap<&str, Mark> = HashMap::with_capacity(self.services.len());
        let mut path: Vec<&str> = Vec::new();

        for name in self.services.keys() {
            if !marks.contains_key(name.as_str()) {
                self.visit(name, &mut marks, &mut path)?;
            }
        }
        Ok(())
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
    ) -> Result<(), GraphError> {
        marks.insert(name, Mark::Visiting);
        path.push(name);

        if let Some(service) = self.services.get(name) {
            for dep in &service.dependencies {
                if !self.services.contains_key(dep) {
                    return Err(GraphError::UnknownDependency {
                        service: name.to_string(),
                        missing: dep.clone(),
                    });
                }
                match marks.get(dep.as_str()).copied() {
                    Some(Mark::Visited) => {}
                    Some(Mark::Visiting) => {
                        let start = path.iter().position(|n| *n == dep.as_str()).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(dep.clone());
                        return Err(GraphError::Cycle { path: cycle });
                    }
                    None => self.visit(dep, marks, path)?,
                }
            }
        }

        path.pop();
        marks.insert(name, Mark::Visited);
        Ok(())
    }

    /// Topological layers of the graph.
    ///
    /// Each layer lists, in ascending name order, the services whose
    /// dependencies all appear in earlier layers. Layers are computed one at
    /// a time as the iterator advances. On a graph that fails
    /// [`validate`](Self::validate) the iterator stops before the services
    /// involved in the problem.
    pub fn layers(&self) -> Layers<'_> {
        Layers::new(self)
    }
}

/// Lazy iterator over the topological layers of a [`ServiceGraph`].
pub struct Layers<'a> {
    pending: HashMap<&'a str, usize>,
    dependents: HashMap<&'a str, Vec<&'a str>>,
    ready: BTreeSet<&'a str>,
}

impl<'a> Layers<'a> {
    fn new(graph: &'a ServiceGraph) -> Self {
        let mut pending = HashMap::with_capacity(graph.services.len());
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut ready = BTreeSet::new();

        for (name, service) in &graph.services {
            let deps: HashSet<&str> = service.dependencies.iter().map(String::as_str).collect();
            for dep in &deps {
                dependents.entry(*dep).or_default().push(name.as_str());
            }
            if deps.is_empty() {
                ready.insert(name.as_str());
            } else {
                pending.insert(name.as_str(), deps.len());
            }
        }

        Self {
            pending,
            dependents,
            ready,
        }
    }
}

impl Iterator for Layers<'_> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ready.is_empty() {
            return None;
        }

        let layer = std::mem::take(&mut self.ready);
        for name in &layer {
            let Some(children) = self.dependents.get(name) else {
                continue;
            };
            for child in children {
                if let Some(remaining) = self.pending.get_mut(child) {
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.pending.remove(child);
                        self.ready.insert(*child);
                    }
                }
            }
        }

        Some(layer.into_iter().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn svc(name: &str, deps: &[&str]) -> Service {
        Service::new(name, ReadinessCheck::tcp("localhost", 1))
            .with_dependencies(deps.iter().copied())
    }

    fn graph(services: &[(&str, &[&str])]) -> ServiceGraph {
        let mut graph = ServiceGraph::new();
        for (name, deps) in services {
            graph.add_service(svc(name, deps)).unwrap();
        }
        graph
    }

    #[test]
    fn test_duplicate_service_rejected_eagerly() {
        let mut g = graph(&[("db", &[])]);
        let err = g.add_service(svc("db", &[])).unwrap_err();
        assert_eq!(err, GraphError::DuplicateService { name: "db".into() });
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn test_unknown_dependency_reported_at_validate() {
        let mut g = ServiceGraph::new();
        g.add_service(svc("web", &["db"])).unwrap();

        assert_eq!(
            g.validate().unwrap_err(),
            GraphError::UnknownDependency {
                service: "web".into(),
                missing: "db".into(),
            }
        );
    }

    #[test]
    fn test_cycle_path_named() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"]), ("d", &[])]);
        assert_eq!(
            g.validate().unwrap_err(),
            GraphError::Cycle {
                path: vec!["a".into(), "b".into(), "c".into(), "a".into()],
            }
        );
    }

    #[test]
    fn test_self_dependency_is_cycle() {
        let g = graph(&[("a", &["a"])]);
        assert_eq!(
            g.validate().unwrap_err(),
            GraphError::Cycle {
                path: vec!["a".into(), "a".into()],
            }
        );
    }

    #[test]
    fn test_cycle_below_acyclic_prefix() {
        let g = graph(&[("app", &["x"]), ("x", &["y"]), ("y", &["x"])]);
        assert_eq!(
            g.validate().unwrap_err(),
            GraphError::Cycle {
                path: vec!["x".into(), "y".into(), "x".into()],
            }
        );
    }

    #[test]
    fn test_validate_is_idempotent() {
        let ok = graph(&[("db", &[]), ("web", &["db"])]);
        assert_eq!(ok.validate(), Ok(()));
        assert_eq!(ok.validate(), Ok(()));

        let bad = graph(&[("a", &["b"]), ("b", &["a"])]);
        let first = bad.validate();
        let second = bad.validate();
        assert!(first.is_err());
        assert_eq!(first, second);
        assert_eq!(bad.len(), 2);
    }

    #[test]
    fn test_layers_sorted_within_layer() {
        let g = graph(&[
            ("web", &["db", "cache"]),
            ("db", &[]),
            ("cache", &[]),
            ("cron", &["web"]),
        ]);
        let layers: Vec<Vec<String>> = g.layers().collect();
        assert_eq!(
            layers,
            vec![
                vec!["cache".to_string(), "db".to_string()],
                vec!["web".to_string()],
                vec!["cron".to_string()],
            ]
        );
    }

    #[test]
    fn test_layers_ignore_repeated_dependency() {
        let g = graph(&[("db", &[]), ("web", &["db", "db"])]);
        let layers: Vec<Vec<String>> = g.layers().collect();
        assert_eq!(layers.len(), 2);
        assert_eq!(layers[1], vec!["web".to_string()]);
    }

    #[test]
    fn test_layers_is_lazy_and_finite() {
        let g = graph(&[("a", &[]), ("b", &["a"])]);
        let mut layers = g.layers();
        assert_eq!(layers.next(), Some(vec!["a".to_string()]));
        assert_eq!(layers.next(), Some(vec!["b".to_string()]));
        assert_eq!(layers.next(), None);
        assert_eq!(layers.next(), None);
    }

    #[test]
    fn test_layers_stop_before_cycle() {
        let g = graph(&[("db", &[]), ("a", &["db", "b"]), ("b", &["a"])]);
        let layers: Vec<Vec<String>> = g.layers().collect();
        assert_eq!(layers, vec![vec!["db".to_string()]]);
    }

    #[test]
    fn test_empty_graph() {
        let g = ServiceGraph::new();
        assert!(g.is_empty());
        assert_eq!(g.validate(), Ok(()));
        assert_eq!(g.layers().count(), 0);
    }

    #[test]
    fn test_max_attempts() {
        let s = svc("a", &[])
            .with_max_wait(Duration::from_secs(10))
            .with_retry_interval(Duration::from_secs(3));
        assert_eq!(s.max_attempts(), 3);

        let s = s.with_max_wait(Duration::from_secs(1));
        assert_eq!(s.max_attempts(), 1);

        let s = s.with_retry_interval(Duration::ZERO);
        assert_eq!(s.max_attempts(), 1);
    }

    /// Random DAG: service `i` may only depend on services `< i`.
    fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1usize..24).prop_flat_map(|n| {
            (0..n)
                .map(|i| proptest::collection::vec(0..i.max(1), 0..=i.min(4)))
                .collect::<Vec<_>>()
                .prop_map(|deps| {
                    deps.into_iter()
                        .enumerate()
                        .map(|(i, ds)| ds.into_iter().filter(|d| *d < i).collect())
                        .collect()
                })
        })
    }

    proptest! {
        #[test]
        fn prop_layers_respect_dependencies(dag in arb_dag()) {
            let mut g = ServiceGraph::new();
            for (i, deps) in dag.iter().enumerate() {
                let names: Vec<String> = deps.iter().map(|d| format!("s{:02}", d)).collect();
                g.add_service(
                    Service::new(format!("s{:02}", i), ReadinessCheck::tcp("localhost", 1))
                        .with_dependencies(names),
                ).unwrap();
            }
            prop_assert!(g.validate().is_ok());

            let layers: Vec<Vec<String>> = g.layers().collect();
            let mut layer_of: HashMap<String, usize> = HashMap::new();
            for (idx, layer) in layers.iter().enumerate() {
                let mut sorted = layer.clone();
                sorted.sort();
                prop_assert_eq!(&sorted, layer);
                for name in layer {
                    prop_assert!(layer_of.insert(name.clone(), idx).is_none());
                }
            }
            prop_assert_eq!(layer_of.len(), g.len());

            for service in g.services() {
                let own = layer_of[service.name()];
                for dep in service.dependencies() {
                    prop_assert!(layer_of[dep] < own);
                }
            }
        }
    }
}

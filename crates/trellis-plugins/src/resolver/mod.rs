//! Dependency resolution.
//!
//! Resolution turns a requested set of ids into an [`ActivationPlan`]. The
//! closure of the request is walked breadth first; each declared dependency
//! is checked for presence, admission, and version compatibility. Cycles are
//! detected per strongly connected component, failures are propagated to
//! every transitive dependent, and what remains is ordered with Kahn's
//! algorithm, breaking ties by discovery order.
//!
//! Resolution is total: every requested id ends up in the plan, in the
//! failures, or in the blocked list. Independent parts of the request still
//! resolve when another part fails.

mod graph;
mod plan;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use tracing::debug;

use crate::catalog::{Catalog, PluginDescriptor};
use crate::error::{MissingReason, PluginError};
use crate::manifest::Dependency;

use self::graph::Graph;
pub use self::plan::{ActivationPlan, Resolution, ResolutionError};

/// Resolves `requested` against `catalog` with nothing excluded.
#[must_use]
pub fn resolve<I, S>(catalog: &Catalog, requested: I) -> Resolution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    resolve_excluding(catalog, requested, &BTreeSet::new())
}

/// Resolves `requested` against `catalog`, treating every id in `excluded`
/// as unavailable.
///
/// A requested id that is excluded fails with [`PluginError::Excluded`];
/// a dependency on an excluded id fails its dependent with
/// [`PluginError::MissingDependency`].
#[must_use]
pub fn resolve_excluding<I, S>(
    catalog: &Catalog,
    requested: I,
    excluded: &BTreeSet<String>,
) -> Resolution
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut failures = Vec::new();
    let roots = admit_roots(catalog, requested, excluded, &mut failures);

    let mut failed: BTreeMap<usize, &str> = BTreeMap::new();
    let graph = explore(catalog, &roots, excluded, &mut failures, &mut failed);

    for found in graph.cycles() {
        for &member in &found.members {
            failed.insert(graph.ordinal(member), member);
        }
        failures.push(PluginError::CyclicDependency {
            cycle: found.cycle.iter().map(|&id| id.to_owned()).collect(),
            members: found.members.iter().map(|&id| id.to_owned()).collect(),
        });
    }

    let blocked_by = graph.blocked_by(&failed);
    let rejected: HashSet<&str> = failed
        .values()
        .copied()
        .chain(blocked_by.values().map(|&(id, _)| id))
        .collect();
    let root_ids: Vec<&str> = roots.iter().map(|descriptor| descriptor.id()).collect();
    let plan = graph.plan(&root_ids, &rejected);
    let blocked = blocked_by
        .into_values()
        .map(|(id, ancestor)| PluginError::BlockedByAncestor {
            id: id.to_owned(),
            ancestor: ancestor.to_owned(),
        })
        .collect::<Vec<_>>();

    debug!(
        target: "trellis::resolve",
        event = "resolution.completed",
        planned = plan.len(),
        failures = failures.len(),
        blocked = blocked.len(),
        "resolved requested plugins"
    );
    Resolution::new(plan, failures, blocked)
}

/// Looks up each requested id once, recording unknown and excluded ids.
fn admit_roots<'c, I, S>(
    catalog: &'c Catalog,
    requested: I,
    excluded: &BTreeSet<String>,
    failures: &mut Vec<PluginError>,
) -> Vec<&'c PluginDescriptor>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut roots = Vec::new();
    for wanted in requested {
        let id = wanted.as_ref();
        if !seen.insert(id.to_owned()) {
            continue;
        }
        if excluded.contains(id) {
            failures.push(PluginError::Excluded { id: id.to_owned() });
            continue;
        }
        match catalog.get(id) {
            Some(descriptor) => roots.push(descriptor),
            None => failures.push(PluginError::UnknownPlugin { id: id.to_owned() }),
        }
    }
    roots
}

/// Walks the closure of `roots`, building the graph of satisfiable edges and
/// recording every unsatisfiable dependency.
fn explore<'c>(
    catalog: &'c Catalog,
    roots: &[&'c PluginDescriptor],
    excluded: &BTreeSet<String>,
    failures: &mut Vec<PluginError>,
    failed: &mut BTreeMap<usize, &'c str>,
) -> Graph<'c> {
    let mut graph = Graph::default();
    let mut visited: HashSet<&'c str> = HashSet::new();
    let mut queue: VecDeque<&'c PluginDescriptor> = VecDeque::new();
    for &root in roots {
        if visited.insert(root.id()) {
            queue.push_back(root);
        }
    }

    while let Some(node) = queue.pop_front() {
        graph.add_node(node.id(), node.ordinal());
        for dependency in node.dependencies() {
            match satisfy(catalog, excluded, dependency) {
                Ok(target) => {
                    graph.add_edge(node.id(), target.id());
                    if visited.insert(target.id()) {
                        queue.push_back(target);
                    }
                }
                Err(reason) => {
                    failed.insert(node.ordinal(), node.id());
                    failures.push(PluginError::MissingDependency {
                        dependent: node.id().to_owned(),
                        dependency: dependency.id().to_owned(),
                        constraint: dependency.constraint().clone(),
                        reason,
                    });
                }
            }
        }
    }
    graph.seal();
    graph
}

fn satisfy<'c>(
    catalog: &'c Catalog,
    excluded: &BTreeSet<String>,
    dependency: &Dependency,
) -> Result<&'c PluginDescriptor, MissingReason> {
    if excluded.contains(dependency.id()) {
        return Err(MissingReason::Excluded);
    }
    let target = catalog.get(dependency.id()).ok_or(MissingReason::Absent)?;
    if dependency.constraint().matches(target.version()) {
        Ok(target)
    } else {
        Err(MissingReason::Unsatisfied {
            found: Box::new(target.version().clone()),
        })
    }
}

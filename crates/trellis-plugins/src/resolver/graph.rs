//! Dependency graph over the closure of a requested set.
//!
//! Nodes are plugin ids borrowed from the catalog. Edges run from a
//! dependent to each dependency it declared, in declaration order, and only
//! exist for dependencies that were present, admitted, and version
//! compatible.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashMap, HashSet, VecDeque};

use super::plan::ActivationPlan;

/// A strongly connected component that contains a cycle.
#[derive(Debug)]
pub(super) struct Cycle<'c> {
    pub(super) cycle: Vec<&'c str>,
    pub(super) members: Vec<&'c str>,
}

#[derive(Debug, Default)]
pub(super) struct Graph<'c> {
    nodes: BTreeMap<usize, &'c str>,
    ordinals: HashMap<&'c str, usize>,
    edges: HashMap<&'c str, Vec<&'c str>>,
    dependents: HashMap<&'c str, Vec<&'c str>>,
}

impl<'c> Graph<'c> {
    pub(super) fn add_node(&mut self, id: &'c str, ordinal: usize) {
        self.nodes.insert(ordinal, id);
        self.ordinals.insert(id, ordinal);
        self.edges.entry(id).or_default();
    }

    pub(super) fn add_edge(&mut self, dependent: &'c str, dependency: &'c str) {
        self.edges.entry(dependent).or_default().push(dependency);
    }

    /// Builds the reverse adjacency once every edge is known. Dependents are
    /// listed in discovery order.
    pub(super) fn seal(&mut self) {
        self.dependents.clear();
        for &id in self.nodes.values() {
            let Some(dependencies) = self.edges.get(id) else {
                continue;
            };
            for &dependency in dependencies {
                self.dependents.entry(dependency).or_default().push(id);
            }
        }
    }

    pub(super) fn ordinal(&self, id: &str) -> usize {
        self.ordinals.get(id).copied().unwrap_or(usize::MAX)
    }

    fn dependencies_of(&self, id: &str) -> &[&'c str] {
        self.edges.get(id).map_or(&[], Vec::as_slice)
    }

    fn dependents_of(&self, id: &str) -> &[&'c str] {
        self.dependents.get(id).map_or(&[], Vec::as_slice)
    }

    fn reachable_from(&self, id: &'c str) -> HashSet<&'c str> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&'c str> = self.dependencies_of(id).to_vec();
        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend_from_slice(self.dependencies_of(node));
            }
        }
        seen
    }

    /// Returns every cyclic component, ordered by its lowest-ordinal member.
    pub(super) fn cycles(&self) -> Vec<Cycle<'c>> {
        let reach: HashMap<&'c str, HashSet<&'c str>> = self
            .nodes
            .values()
            .map(|&id| (id, self.reachable_from(id)))
            .collect();
        let reaches = |from: &str, to: &str| reach.get(from).is_some_and(|set| set.contains(to));

        let mut assigned: HashSet<&'c str> = HashSet::new();
        let mut cycles = Vec::new();
        for &root in self.nodes.values() {
            if assigned.contains(root) || !reaches(root, root) {
                continue;
            }
            let members: Vec<&'c str> = self
                .nodes
                .values()
                .copied()
                .filter(|&other| other == root || (reaches(root, other) && reaches(other, root)))
                .collect();
            assigned.extend(members.iter().copied());
            let component: HashSet<&'c str> = members.iter().copied().collect();
            cycles.push(Cycle {
                cycle: self.shortest_cycle(root, &component),
                members,
            });
        }
        cycles
    }

    /// Breadth-first search for the shortest path from `root` back to
    /// itself inside `component`.
    fn shortest_cycle(&self, root: &'c str, component: &HashSet<&'c str>) -> Vec<&'c str> {
        let mut parent: HashMap<&'c str, &'c str> = HashMap::new();
        let mut queue: VecDeque<&'c str> = VecDeque::from([root]);
        while let Some(node) = queue.pop_front() {
            for &next in self.dependencies_of(node) {
                if !component.contains(next) {
                    continue;
                }
                if next == root {
                    return unwind(&parent, root, node);
                }
                if !parent.contains_key(next) {
                    parent.insert(next, node);
                    queue.push_back(next);
                }
            }
        }
        vec![root]
    }

    /// Maps every node downstream of a failed node to the failure it
    /// inherits. Failed nodes are visited in discovery order, so each
    /// blocked node records its nearest failed ancestor, ties going to the
    /// lowest ordinal.
    pub(super) fn blocked_by(
        &self,
        failed: &BTreeMap<usize, &'c str>,
    ) -> BTreeMap<usize, (&'c str, &'c str)> {
        let mut origin: HashMap<&'c str, &'c str> =
            failed.values().map(|&id| (id, id)).collect();
        let mut queue: VecDeque<&'c str> = failed.values().copied().collect();
        let mut blocked = BTreeMap::new();
        while let Some(node) = queue.pop_front() {
            let Some(&ancestor) = origin.get(node) else {
                continue;
            };
            for &dependent in self.dependents_of(node) {
                if origin.contains_key(dependent) {
                    continue;
                }
                origin.insert(dependent, ancestor);
                blocked.insert(self.ordinal(dependent), (dependent, ancestor));
                queue.push_back(dependent);
            }
        }
        blocked
    }

    /// Kahn's algorithm over everything reachable from `roots` while
    /// avoiding `rejected`. Ready nodes leave the queue lowest ordinal
    /// first.
    pub(super) fn plan(&self, roots: &[&'c str], rejected: &HashSet<&'c str>) -> ActivationPlan {
        let needed = self.needed(roots, rejected);
        let mut pending: HashMap<&'c str, usize> = needed
            .iter()
            .map(|&id| (id, self.dependencies_of(id).len()))
            .collect();
        let mut ready: BinaryHeap<Reverse<(usize, &'c str)>> = pending
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&id, _)| Reverse((self.ordinal(id), id)))
            .collect();

        let mut order = Vec::with_capacity(needed.len());
        while let Some(Reverse((_, id))) = ready.pop() {
            order.push(id.to_owned());
            for &dependent in self.dependents_of(id) {
                let Some(count) = pending.get_mut(dependent) else {
                    continue;
                };
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(Reverse((self.ordinal(dependent), dependent)));
                }
            }
        }

        let dependencies = needed
            .iter()
            .map(|&id| {
                let deps = self
                    .dependencies_of(id)
                    .iter()
                    .map(|&dependency| dependency.to_owned())
                    .collect();
                (id.to_owned(), deps)
            })
            .collect();
        ActivationPlan::new(order, dependencies)
    }

    fn needed(&self, roots: &[&'c str], rejected: &HashSet<&'c str>) -> HashSet<&'c str> {
        let mut needed = HashSet::new();
        let mut stack: Vec<&'c str> = roots
            .iter()
            .copied()
            .filter(|id| !rejected.contains(id))
            .collect();
        while let Some(node) = stack.pop() {
            if needed.insert(node) {
                stack.extend(
                    self.dependencies_of(node)
                        .iter()
                        .copied()
                        .filter(|id| !rejected.contains(id)),
                );
            }
        }
        needed
    }
}

fn unwind<'c>(parent: &HashMap<&'c str, &'c str>, root: &'c str, last: &'c str) -> Vec<&'c str> {
    let mut path = vec![last];
    let mut cursor = last;
    while cursor != root {
        match parent.get(cursor) {
            Some(&previous) => {
                path.push(previous);
                cursor = previous;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

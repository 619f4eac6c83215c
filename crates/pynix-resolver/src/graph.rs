//! Dependency graph over resolved packages and cycle removal.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use pynix_core::package::ResolvedPackage;
use pynix_util::errors::{PynixError, PynixResult};

/// Which input sets of the source package an edge comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    BuildOnly,
    Propagated,
    Both,
}

/// Outcome of [`finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleSummary {
    pub module_count: usize,
    pub removed_edges: usize,
}

/// A cycle found by depth-first search: `path[0]` is the back edge's
/// target, the last element its source.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Cycle {
    path: Vec<NodeIndex>,
}

/// Name graph of a resolution result, backed by petgraph.
pub struct PackageGraph {
    graph: DiGraph<String, EdgeKind>,
    index: HashMap<String, NodeIndex>,
    roots: Vec<NodeIndex>,
}

impl PackageGraph {
    /// Build the graph. Dependencies naming no resolved package are skipped.
    pub fn new(packages: &[ResolvedPackage]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut sorted: Vec<&ResolvedPackage> = packages.iter().collect();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        for pkg in &sorted {
            let idx = graph.add_node(pkg.name.clone());
            index.insert(pkg.name.clone(), idx);
        }
        for pkg in &sorted {
            let from = index[&pkg.name];
            for dep in pkg.dependencies() {
                let Some(&to) = index.get(dep) else {
                    continue;
                };
                let kind = match (pkg.build_inputs.contains(dep), pkg.prop_build_inputs.contains(dep)) {
                    (true, true) => EdgeKind::Both,
                    (true, false) => EdgeKind::BuildOnly,
                    _ => EdgeKind::Propagated,
                };
                graph.add_edge(from, to, kind);
            }
        }
        let roots = sorted
            .iter()
            .filter(|p| p.is_root)
            .map(|p| index[&p.name])
            .collect();
        Self { graph, index, roots }
    }

    pub fn find(&self, name: &str) -> Option<NodeIndex> {
        self.index.get(name).copied()
    }

    pub fn name(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Direct dependencies in name order.
    pub fn dependencies_of(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| e.target())
            .collect();
        deps.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        deps
    }

    fn edge_kind(&self, from: NodeIndex, to: NodeIndex) -> Option<EdgeKind> {
        self.graph.find_edge(from, to).map(|e| self.graph[e])
    }

    /// Every node that can reach `idx`, excluding `idx`.
    pub fn ancestors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut seen = HashSet::from([idx]);
        let mut queue = VecDeque::from([idx]);
        let mut found = Vec::new();
        while let Some(node) = queue.pop_front() {
            for edge in self.graph.edges_directed(node, Direction::Incoming) {
                let parent = edge.source();
                if seen.insert(parent) {
                    found.push(parent);
                    queue.push_back(parent);
                }
            }
        }
        found
    }

    /// First cycle reachable from the roots, then from any other node, in
    /// sorted order.
    fn find_cycle(&self) -> Option<Cycle> {
        let mut starts = self.roots.clone();
        let mut rest: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| !self.roots.contains(idx))
            .collect();
        rest.sort_by(|a, b| self.graph[*a].cmp(&self.graph[*b]));
        starts.extend(rest);

        let mut done = HashSet::new();
        for start in starts {
            if let Some(cycle) = self.cycle_from(start, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    /// Iterative depth-first search from `start`, stopping at the first
    /// back edge.
    fn cycle_from(&self, start: NodeIndex, done: &mut HashSet<NodeIndex>) -> Option<Cycle> {
        if done.contains(&start) {
            return None;
        }
        let mut path: Vec<NodeIndex> = vec![start];
        let mut on_path: HashSet<NodeIndex> = HashSet::from([start]);
        let mut frames: Vec<(Vec<NodeIndex>, usize)> = vec![(self.dependencies_of(start), 0)];

        while let Some((children, next)) = frames.last_mut() {
            let Some(&child) = children.get(*next) else {
                frames.pop();
                if let Some(finished) = path.pop() {
                    on_path.remove(&finished);
                    done.insert(finished);
                }
                continue;
            };
            *next += 1;
            if on_path.contains(&child) {
                let begin = path.iter().position(|&n| n == child).unwrap_or(0);
                return Some(Cycle {
                    path: path[begin..].to_vec(),
                });
            }
            if done.contains(&child) {
                continue;
            }
            path.push(child);
            on_path.insert(child);
            frames.push((self.dependencies_of(child), 0));
        }
        None
    }

    /// The edge to cut: the back edge unless it is build-only, else the
    /// nearest edge before it on the cycle that is not.
    fn edge_to_cut(&self, cycle: &Cycle) -> PynixResult<(NodeIndex, NodeIndex)> {
        let path = &cycle.path;
        let (Some(&first), Some(&last)) = (path.first(), path.last()) else {
            return Err(PynixError::Generic {
                message: "empty dependency cycle".to_string(),
            });
        };
        let mut edges = vec![(last, first)];
        edges.extend(path.windows(2).rev().map(|w| (w[0], w[1])));

        edges
            .into_iter()
            .find(|&(from, to)| self.edge_kind(from, to) != Some(EdgeKind::BuildOnly))
            .ok_or_else(|| PynixError::CircularBuildDependency {
                from: self.graph[last].clone(),
                to: self.graph[first].clone(),
            })
    }
}

/// Break every dependency cycle, returning the cycle-free packages.
///
/// For each cut edge `u -> v`, `v` leaves both input sets of `u` and is
/// recorded in the removed set of `u` and of every package depending on
/// `u`, directly or not.
pub fn finalize(
    mut packages: Vec<ResolvedPackage>,
) -> PynixResult<(Vec<ResolvedPackage>, CycleSummary)> {
    let mut summary = CycleSummary {
        module_count: packages.len(),
        removed_edges: 0,
    };
    let position: HashMap<String, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.clone(), i))
        .collect();

    loop {
        let graph = PackageGraph::new(&packages);
        let Some(cycle) = graph.find_cycle() else {
            break;
        };
        let (from, to) = graph.edge_to_cut(&cycle)?;
        let source = graph.name(from).to_string();
        let target = graph.name(to).to_string();

        let cycle_names: Vec<&str> = cycle.path.iter().map(|&n| graph.name(n)).collect();
        tracing::warn!(
            "removing circular dependency {source} -> {target} (cycle: {})",
            cycle_names.join(" -> ")
        );

        let pkg = &mut packages[position[&source]];
        pkg.build_inputs.remove(&target);
        pkg.prop_build_inputs.remove(&target);
        pkg.removed_circular_deps.insert(target.clone());

        for ancestor in graph.ancestors(from) {
            let name = graph.name(ancestor);
            if name == target {
                continue;
            }
            packages[position[name]]
                .removed_circular_deps
                .insert(target.clone());
        }
        summary.removed_edges += 1;
    }

    tracing::info!(
        "{} modules, {} circular dependencies removed",
        summary.module_count,
        summary.removed_edges
    );
    Ok((packages, summary))
}

/// Render each root's dependency tree.
pub fn print_tree(packages: &[ResolvedPackage]) -> String {
    let graph = PackageGraph::new(packages);
    let labels: HashMap<&str, String> = packages
        .iter()
        .map(|p| (p.name.as_str(), p.label()))
        .collect();

    let mut output = String::new();
    for &root in &graph.roots {
        output.push_str(&format!("{}\n", labels[graph.name(root)]));
        let mut on_path = BTreeSet::from([root]);
        let deps = graph.dependencies_of(root);
        let count = deps.len();
        for (i, child) in deps.into_iter().enumerate() {
            print_subtree(&graph, &labels, &mut output, child, "", i == count - 1, &mut on_path);
        }
    }
    output
}

fn print_subtree(
    graph: &PackageGraph,
    labels: &HashMap<&str, String>,
    output: &mut String,
    idx: NodeIndex,
    prefix: &str,
    is_last: bool,
    on_path: &mut BTreeSet<NodeIndex>,
) {
    let connector = if is_last { "└── " } else { "├── " };
    output.push_str(&format!("{prefix}{connector}{}\n", labels[graph.name(idx)]));

    if !on_path.insert(idx) {
        return;
    }

    let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
    let deps = graph.dependencies_of(idx);
    let count = deps.len();
    for (i, child) in deps.into_iter().enumerate() {
        print_subtree(graph, labels, output, child, &child_prefix, i == count - 1, on_path);
    }

    on_path.remove(&idx);
}

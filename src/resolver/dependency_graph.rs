//! Dependency graph and deployment ordering.
//!
//! This module provides the graph data structure and algorithms needed to
//! deploy a bundle in an order where every item comes after the items it
//! references, including cycle detection.
//!
//! Edges are never stored in the bundle: they are derived from each template's
//! `dependency_ids` every time a graph is built.

use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::core::{ItemKind, Result, SolutionError};
use crate::models::Template;

/// One template in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyNode {
    /// Source-environment item id.
    pub owner_id: String,
    /// Catalog item type.
    pub kind: ItemKind,
}

impl DependencyNode {
    /// Create a node for a template.
    pub fn new(owner_id: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            owner_id: owner_id.into(),
            kind,
        }
    }

    /// Get a display name for this node.
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.owner_id, self.kind)
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Color states for cycle detection using DFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    /// Node has not been visited.
    White,
    /// Node is currently being visited (in the DFS stack).
    Gray,
    /// Node has been fully visited.
    Black,
}

/// Dependency graph over the templates of a bundle.
///
/// An edge `from → to` means `from` depends on `to`, so `to` must be deployed
/// first. Nodes keep the order templates were added in, which is the tie break
/// used by [`sequence`](Self::sequence).
pub struct DependencyGraph {
    /// The underlying directed graph.
    graph: DiGraph<DependencyNode, ()>,
    /// Map from owner ids to their graph indices.
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Build the graph of a template collection.
    ///
    /// Every template becomes a node, in collection order, before any edge is
    /// added. A dependency id naming no template of the collection is a
    /// [`SolutionError::MalformedTemplate`].
    pub fn from_templates(templates: &[Template]) -> Result<Self> {
        let mut graph = Self::new();
        for template in templates {
            graph.ensure_node(DependencyNode::new(&template.owner_id, template.kind.clone()));
        }
        for (from, to) in dependency_edges(templates)? {
            graph.add_dependency(&from, &to)?;
        }
        Ok(graph)
    }

    /// Add a node to the graph if it doesn't already exist.
    ///
    /// Returns the node index in the graph.
    pub fn ensure_node(&mut self, node: DependencyNode) -> NodeIndex {
        if let Some(&index) = self.node_map.get(&node.owner_id) {
            index
        } else {
            let key = node.owner_id.clone();
            let index = self.graph.add_node(node);
            self.node_map.insert(key, index);
            index
        }
    }

    /// Add a dependency relationship between two existing nodes.
    ///
    /// `from` depends on `to`, meaning `to` must be deployed before `from`.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = self.index_of(from, from)?;
        let to_idx = self.index_of(from, to)?;

        // Check if edge already exists to avoid duplicates
        if !self.graph.contains_edge(from_idx, to_idx) {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    fn index_of(&self, referrer: &str, owner_id: &str) -> Result<NodeIndex> {
        self.node_map.get(owner_id).copied().ok_or_else(|| {
            SolutionError::malformed(
                referrer,
                format!("dependency '{owner_id}' is not part of the bundle"),
            )
        })
    }

    /// Direct dependencies of a node, in the order they were added.
    fn ordered_neighbors(&self, node: NodeIndex) -> Vec<NodeIndex> {
        // petgraph yields outgoing neighbors most-recent first
        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors(node).collect();
        neighbors.reverse();
        neighbors
    }

    /// Detect cycles in the dependency graph using DFS with colors.
    ///
    /// Only the existence of a cycle is reported, not its members.
    pub fn detect_cycles(&self) -> Result<()> {
        self.sequence().map(|_| ())
    }

    /// Deployment order: every node appears after all of its dependencies.
    ///
    /// Depth first, starting from each unvisited node in insertion order and
    /// visiting dependencies in the order they were declared. Fails with
    /// [`SolutionError::CyclicDependency`] as soon as a node is reached while
    /// it is still being visited; no partial order is returned.
    pub fn sequence(&self) -> Result<Vec<String>> {
        let mut colors: HashMap<NodeIndex, Color> =
            self.graph.node_indices().map(|n| (n, Color::White)).collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        for node in self.graph.node_indices() {
            if matches!(colors.get(&node), Some(Color::White)) {
                self.dfs_visit(node, &mut colors, &mut order)?;
            }
        }
        Ok(order)
    }

    /// DFS visit pushing nodes in post-order.
    ///
    /// Walks with an explicit stack so chain depth is bounded by memory, not
    /// by the thread's call stack.
    fn dfs_visit(
        &self,
        start: NodeIndex,
        colors: &mut HashMap<NodeIndex, Color>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        colors.insert(start, Color::Gray);
        let mut stack = vec![(start, self.ordered_neighbors(start).into_iter())];

        while let Some((node, neighbors)) = stack.last_mut() {
            let node = *node;
            match neighbors.next() {
                Some(neighbor) => match colors.get(&neighbor) {
                    Some(Color::Gray) => {
                        tracing::debug!(
                            "Cycle reached at {} while visiting {}",
                            self.graph[neighbor],
                            self.graph[node]
                        );
                        return Err(SolutionError::CyclicDependency);
                    }
                    Some(Color::White) => {
                        colors.insert(neighbor, Color::Gray);
                        stack.push((neighbor, self.ordered_neighbors(neighbor).into_iter()));
                    }
                    _ => {}
                },
                None => {
                    colors.insert(node, Color::Black);
                    order.push(self.graph[node].owner_id.clone());
                    stack.pop();
                }
            }
        }
        Ok(())
    }

    /// All items the given item depends on, directly or indirectly.
    pub fn transitive_deps(&self, owner_id: &str) -> HashSet<String> {
        let mut deps = HashSet::new();
        let mut queue = VecDeque::new();

        if let Some(&node_idx) = self.node_map.get(owner_id) {
            queue.push_back(node_idx);

            while let Some(current) = queue.pop_front() {
                for neighbor in self.graph.neighbors(current) {
                    if deps.insert(self.graph[neighbor].owner_id.clone()) {
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        deps
    }

    /// Direct dependencies of an item, in declaration order.
    pub fn direct_deps(&self, owner_id: &str) -> Vec<&DependencyNode> {
        match self.node_map.get(owner_id) {
            Some(&idx) => self.ordered_neighbors(idx).into_iter().map(|n| &self.graph[n]).collect(),
            None => Vec::new(),
        }
    }

    /// Items no other item depends on, in insertion order.
    pub fn roots(&self) -> Vec<&DependencyNode> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph.neighbors_directed(idx, petgraph::Direction::Incoming).next().is_none()
            })
            .map(|idx| &self.graph[idx])
            .collect()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get the total number of edges (dependencies) in the graph.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Build a human-readable dependency tree rooted at `owner_id`.
    pub fn to_tree_string(&self, owner_id: &str) -> String {
        let mut result = String::new();
        let mut visited = HashSet::new();
        if let Some(&idx) = self.node_map.get(owner_id) {
            self.build_tree_string(idx, &mut result, "", true, &mut visited);
        }
        result
    }

    fn build_tree_string(
        &self,
        node: NodeIndex,
        result: &mut String,
        prefix: &str,
        is_last: bool,
        visited: &mut HashSet<NodeIndex>,
    ) {
        let connector = if is_last {
            "└── "
        } else {
            "├── "
        };
        result.push_str(&format!("{}{}{}\n", prefix, connector, self.graph[node].display_name()));

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };
        if !visited.insert(node) {
            result.push_str(&format!("{child_prefix}└── (circular reference)\n"));
            return;
        }

        let deps = self.ordered_neighbors(node);
        for (i, dep) in deps.iter().enumerate() {
            let is_last_child = i == deps.len() - 1;
            self.build_tree_string(*dep, result, &child_prefix, is_last_child, visited);
        }
        visited.remove(&node);
    }
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive the `(from, to)` dependency edges of a template collection.
///
/// Templates without dependencies contribute no edge. Fails when a template
/// names a dependency that is not in the collection.
pub fn dependency_edges(templates: &[Template]) -> Result<Vec<(String, String)>> {
    let known: HashSet<&str> = templates.iter().map(|t| t.owner_id.as_str()).collect();
    let mut edges = Vec::new();
    for template in templates {
        for dep in &template.dependency_ids {
            if !known.contains(dep.as_str()) {
                return Err(SolutionError::malformed(
                    &template.owner_id,
                    format!("dependency '{dep}' is not part of the bundle"),
                ));
            }
            edges.push((template.owner_id.clone(), dep.clone()));
        }
    }
    Ok(edges)
}

/// Order templates so that every dependency precedes its dependents.
///
/// ```rust
/// use serde_json::json;
/// use solution_deployer::core::ItemKind;
/// use solution_deployer::models::Template;
/// use solution_deployer::resolver::sequence;
///
/// let templates = vec![
///     Template::new("abc", ItemKind::WebMap, json!({})).with_dependencies(["ghi", "def"]),
///     Template::new("def", ItemKind::FeatureService, json!({})),
///     Template::new("ghi", ItemKind::FeatureService, json!({})),
/// ];
/// assert_eq!(sequence(&templates).unwrap(), vec!["ghi", "def", "abc"]);
/// ```
pub fn sequence(templates: &[Template]) -> Result<Vec<String>> {
    DependencyGraph::from_templates(templates)?.sequence()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(id: &str, deps: &[&str]) -> Template {
        Template::new(id, ItemKind::WebMap, json!({})).with_dependencies(deps.iter().copied())
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let templates =
            vec![template("abc", &["ghi", "def"]), template("def", &[]), template("ghi", &[])];
        let order = sequence(&templates).unwrap();
        assert_eq!(order.len(), 3);
        assert!(position(&order, "def") < position(&order, "abc"));
        assert!(position(&order, "ghi") < position(&order, "abc"));
    }

    #[test]
    fn test_order_is_stable_in_bundle_order() {
        let templates = vec![template("x", &[]), template("y", &[]), template("z", &["y"])];
        assert_eq!(sequence(&templates).unwrap(), vec!["x", "y", "z"]);
        let reversed = vec![template("z", &["y"]), template("y", &[]), template("x", &[])];
        assert_eq!(sequence(&reversed).unwrap(), vec!["y", "z", "x"]);
    }

    #[test]
    fn test_three_node_cycle() {
        let templates =
            vec![template("abc", &["ghi"]), template("ghi", &["def"]), template("def", &["abc"])];
        let err = sequence(&templates).unwrap_err();
        assert!(matches!(err, SolutionError::CyclicDependency));
        assert_eq!(err.to_string(), "Cyclical dependency graph detected");
    }

    #[test]
    fn test_self_dependency() {
        let templates = vec![template("a", &["a"])];
        assert!(matches!(sequence(&templates), Err(SolutionError::CyclicDependency)));
    }

    #[test]
    fn test_cycle_behind_acyclic_prefix() {
        let templates = vec![
            template("root", &[]),
            template("a", &["root", "b"]),
            template("b", &["c"]),
            template("c", &["b"]),
        ];
        assert!(matches!(sequence(&templates), Err(SolutionError::CyclicDependency)));
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let ids: Vec<String> = (0..100_000).map(|i| format!("t{i}")).collect();
        let templates: Vec<Template> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| match ids.get(i + 1) {
                Some(next) => template(id, &[next.as_str()]),
                None => template(id, &[]),
            })
            .collect();
        let order = sequence(&templates).unwrap();
        assert_eq!(order.len(), ids.len());
        assert_eq!(order.first(), ids.last());
        assert_eq!(order.last().map(String::as_str), Some("t0"));
    }

    #[test]
    fn test_missing_dependency_is_malformed() {
        let templates = vec![template("a", &["nope"])];
        let err = sequence(&templates).unwrap_err();
        assert!(matches!(err, SolutionError::MalformedTemplate { ref owner_id, .. } if owner_id == "a"));
    }

    #[test]
    fn test_diamond_dependency() {
        let templates = vec![
            template("A", &["B", "C"]),
            template("B", &["D"]),
            template("C", &["D"]),
            template("D", &[]),
        ];
        let graph = DependencyGraph::from_templates(&templates).unwrap();
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 4);
        let order = graph.sequence().unwrap();
        assert!(position(&order, "D") < position(&order, "B"));
        assert!(position(&order, "D") < position(&order, "C"));
        assert!(position(&order, "B") < position(&order, "A"));
        assert!(position(&order, "C") < position(&order, "A"));

        let deps = graph.transitive_deps("A");
        assert_eq!(deps.len(), 3);
        let direct: Vec<&str> = graph.direct_deps("A").iter().map(|n| n.owner_id.as_str()).collect();
        assert_eq!(direct, vec!["B", "C"]);
        let roots: Vec<&str> = graph.roots().iter().map(|n| n.owner_id.as_str()).collect();
        assert_eq!(roots, vec!["A"]);
    }

    #[test]
    fn test_duplicate_edges() {
        let templates = vec![template("a", &["b", "b"]), template("b", &[])];
        let graph = DependencyGraph::from_templates(&templates).unwrap();
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_empty_graph() {
        let graph = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.detect_cycles().is_ok());
        assert!(graph.sequence().unwrap().is_empty());
    }

    #[test]
    fn test_tree_string() {
        let templates = vec![template("app", &["map"]), template("map", &["svc"]), template("svc", &[])];
        let graph = DependencyGraph::from_templates(&templates).unwrap();
        let tree = graph.to_tree_string("app");
        assert_eq!(
            tree,
            "└── app (Web Map)\n    └── map (Web Map)\n        └── svc (Web Map)\n"
        );
        assert!(graph.to_tree_string("missing").is_empty());
    }
}

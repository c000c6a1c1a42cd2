//! Dependency manifest: which bundle files depend on which.
//!
//! Produced once per build by the engine and immutable afterwards. Entries
//! list direct dependencies only; transitive sets are found by repeated
//! lookup.

use crate::bundler::Result;
use crate::bundler::utils::fs;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;

/// Bundle file name to the file names it depends on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManifest {
    /// Version epoch (upload timestamp) of the build that produced it.
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    entries: BTreeMap<String, Vec<String>>,
}

impl DependencyManifest {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            entries: BTreeMap::new(),
        }
    }

    /// Records the direct dependencies of `file_name`.
    pub fn insert(&mut self, file_name: impl Into<String>, dependencies: Vec<String>) {
        self.entries.insert(file_name.into(), dependencies);
    }

    pub fn contains(&self, file_name: &str) -> bool {
        self.entries.contains_key(file_name)
    }

    /// Direct dependencies of `file_name` (empty if unknown).
    pub fn direct_dependencies(&self, file_name: &str) -> &[String] {
        self.entries
            .get(file_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Transitive dependencies of `file_name`, deepest first, each once.
    ///
    /// Traversal stops at files already visited, so a cyclic manifest still
    /// terminates here; [`find_cycle`](Self::find_cycle) reports the loop.
    pub fn all_dependencies(&self, file_name: &str) -> Vec<String> {
        let mut visited = HashSet::from([file_name.to_string()]);
        let mut out = Vec::new();
        self.collect(file_name, &mut visited, &mut out);
        out
    }

    fn collect(&self, file_name: &str, visited: &mut HashSet<String>, out: &mut Vec<String>) {
        for dep in self.direct_dependencies(file_name) {
            if visited.insert(dep.clone()) {
                self.collect(dep, visited, out);
                out.push(dep.clone());
            }
        }
    }

    /// Dependency graph with an edge from each file to each of its dependencies.
    pub fn graph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<String, NodeIndex> = HashMap::new();
        let mut node = |graph: &mut DiGraph<String, ()>, name: &str| {
            *nodes
                .entry(name.to_string())
                .or_insert_with(|| graph.add_node(name.to_string()))
        };
        for (file, deps) in &self.entries {
            let from = node(&mut graph, file);
            for dep in deps {
                let to = node(&mut graph, dep);
                graph.add_edge(from, to, ());
            }
        }
        (graph, nodes)
    }

    /// A dependency cycle, if the manifest has any.
    ///
    /// The returned chain starts and ends with the same file name and is the
    /// shortest loop through a node the topological sort got stuck on.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let (graph, _) = self.graph();
        let start = toposort(&graph, None).err()?.node_id();

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in graph.neighbors(node) {
                if next == start {
                    let mut back = Vec::new();
                    let mut at = node;
                    while at != start {
                        back.push(graph[at].clone());
                        match parent.get(&at) {
                            Some(prev) => at = *prev,
                            None => break,
                        }
                    }
                    back.reverse();
                    let mut chain = vec![graph[start].clone()];
                    chain.extend(back);
                    chain.push(graph[start].clone());
                    return Some(chain);
                }
                if let std::collections::hash_map::Entry::Vacant(entry) = parent.entry(next) {
                    entry.insert(node);
                    queue.push_back(next);
                }
            }
        }
        Some(vec![graph[start].clone()])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        fs::write_json(path, self).await
    }

    pub async fn load(path: &Path) -> Result<Option<Self>> {
        fs::read_json(path).await
    }

    /// Parses a manifest from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

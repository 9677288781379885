//
//  Copyright (C) 2022-2024  Chase Ruskin
//
//  This program is free software: you can redistribute it and/or modify
//  it under the terms of the GNU General Public License as published by
//  the Free Software Foundation, either version 3 of the License, or
//  (at your option) any later version.
//
//  This program is distributed in the hope that it will be useful,
//  but WITHOUT ANY WARRANTY; without even the implied warranty of
//  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//  GNU General Public License for more details.
//
//  You should have received a copy of the GNU General Public License
//  along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! The dependency graph model.
//!
//! Nodes and edges live in arenas owned by the `Graph` and refer to each other
//! by index, so shared subgraphs and cycles never require shared ownership.

use crate::core::config::Registries;
use crate::core::dependency::DependencyType;
use crate::core::depid::DepId;
use crate::core::manifest::Manifest;
use crate::core::package::{self, Package, PackageInventory, MODULES_DIR};
use crate::core::spec::Spec;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type NodeIndex = usize;
pub type EdgeIndex = usize;

#[derive(Debug, PartialEq)]
pub struct Node {
    id: DepId,
    package: Arc<Package>,
    edges_in: IndexSet<EdgeIndex>,
    edges_out: IndexMap<String, EdgeIndex>,
    is_root: bool,
    is_importer: bool,
    is_main_importer: bool,
}

impl Node {
    pub fn get_id(&self) -> &DepId {
        &self.id
    }

    pub fn get_package(&self) -> &Arc<Package> {
        &self.package
    }

    pub fn get_manifest(&self) -> &Manifest {
        self.package.get_manifest()
    }

    pub fn get_edges_in(&self) -> &IndexSet<EdgeIndex> {
        &self.edges_in
    }

    pub fn get_edges_out(&self) -> &IndexMap<String, EdgeIndex> {
        &self.edges_out
    }

    pub fn is_root(&self) -> bool {
        self.is_root
    }

    pub fn is_importer(&self) -> bool {
        self.is_importer
    }

    pub fn is_main_importer(&self) -> bool {
        self.is_main_importer
    }

    /// Checks if the node is placed in the store rather than linked where it is
    /// declared.
    pub fn in_store(&self) -> bool {
        package::is_in_place(&self.id) == false
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Edge {
    from: NodeIndex,
    name: String,
    dep_type: DependencyType,
    spec: Spec,
    to: Option<NodeIndex>,
}

impl Edge {
    pub fn get_from(&self) -> NodeIndex {
        self.from
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_type(&self) -> DependencyType {
        self.dep_type
    }

    pub fn get_spec(&self) -> &Spec {
        &self.spec
    }

    pub fn get_to(&self) -> Option<NodeIndex> {
        self.to
    }

    pub fn is_dangling(&self) -> bool {
        self.to.is_none()
    }

    pub fn is_dev(&self) -> bool {
        self.dep_type.is_dev()
    }

    pub fn is_optional(&self) -> bool {
        self.dep_type.is_optional()
    }

    pub fn is_peer_optional(&self) -> bool {
        self.dep_type.is_peer_optional()
    }
}

/// A changed dependency request for one importer.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct Requests {
    pub added: IndexSet<String>,
    pub removed: IndexSet<String>,
}

#[derive(Debug, PartialEq)]
pub struct Graph {
    project_root: PathBuf,
    registries: Registries,
    packages: PackageInventory,
    nodes: Vec<Node>,
    index: HashMap<DepId, NodeIndex>,
    edges: Vec<Option<Edge>>,
    pkg_nodes: HashMap<String, NodeIndex>,
    root: NodeIndex,
    importers: Vec<NodeIndex>,
    missing: IndexSet<EdgeIndex>,
    requests: IndexMap<NodeIndex, Requests>,
}

impl Graph {
    /// Creates a graph holding only the root importer described by `manifest`.
    pub fn new(project_root: &Path, manifest: Manifest, registries: Registries) -> Self {
        let id = DepId::root(manifest.get_name().unwrap_or(""));
        let mut graph = Self {
            project_root: project_root.to_path_buf(),
            registries: registries,
            packages: PackageInventory::new(),
            nodes: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            pkg_nodes: HashMap::new(),
            root: 0,
            importers: Vec::new(),
            missing: IndexSet::new(),
            requests: IndexMap::new(),
        };
        let (root, _) = graph.place_node(Package::new(id, manifest));
        graph.nodes[root].is_root = true;
        graph.nodes[root].is_main_importer = true;
        graph.nodes[root].is_importer = true;
        graph.root = root;
        graph.importers.push(root);
        graph
    }

    /// Adds a workspace importer living at `path` (relative to the project root).
    pub fn add_importer(&mut self, path: &str, manifest: Manifest) -> NodeIndex {
        let id = DepId::workspace(path, manifest.get_name().unwrap_or(""));
        let (i, _) = self.place_node(Package::new(id, manifest));
        self.nodes[i].is_importer = true;
        if self.importers.contains(&i) == false {
            self.importers.push(i);
        }
        i
    }

    /// Places a package into the graph.
    ///
    /// A node that already exists for the package's id is reused. Returns the
    /// node's index and whether it was newly created.
    pub fn place_node(&mut self, package: Package) -> (NodeIndex, bool) {
        if let Some(i) = self.index.get(package.get_origin()) {
            return (*i, false);
        }
        let package = self.packages.add(package);
        let i = self.nodes.len();
        let id = package.get_origin().clone();
        let key = package.get_key();
        self.nodes.push(Node {
            id: id.clone(),
            package: package,
            edges_in: IndexSet::new(),
            edges_out: IndexMap::new(),
            is_root: false,
            is_importer: false,
            is_main_importer: false,
        });
        self.index.insert(id, i);
        match self.packages.is_unique(&key) {
            true => {
                self.pkg_nodes.entry(key).or_insert(i);
            }
            false => {
                self.pkg_nodes.remove(&key);
            }
        }
        (i, true)
    }

    /// Connects `from` to `to` under the dependency `name`.
    ///
    /// An existing edge for the same name is detached first. A dangling
    /// non-optional edge is recorded as a missing dependency.
    pub fn add_edge(
        &mut self,
        from: NodeIndex,
        name: &str,
        dep_type: DependencyType,
        spec: Spec,
        to: Option<NodeIndex>,
    ) -> EdgeIndex {
        if let Some(old) = self.nodes[from].edges_out.get(name).copied() {
            self.remove_edge(old);
        }
        let e = self.edges.len();
        self.edges.push(Some(Edge {
            from: from,
            name: name.to_string(),
            dep_type: dep_type,
            spec: spec,
            to: to,
        }));
        self.nodes[from].edges_out.insert(name.to_string(), e);
        match to {
            Some(t) => {
                self.nodes[t].edges_in.insert(e);
            }
            None => {
                if dep_type.is_optional() == false {
                    self.missing.insert(e);
                }
            }
        }
        e
    }

    /// Detaches the edge `e` from both of its endpoints.
    pub fn remove_edge(&mut self, e: EdgeIndex) {
        let edge = match self.edges.get_mut(e).and_then(|s| s.take()) {
            Some(edge) => edge,
            None => return,
        };
        self.nodes[edge.from].edges_out.shift_remove(&edge.name);
        if let Some(t) = edge.to {
            self.nodes[t].edges_in.shift_remove(&e);
        }
        self.missing.shift_remove(&e);
    }

    pub fn get_project_root(&self) -> &PathBuf {
        &self.project_root
    }

    pub fn get_registries(&self) -> &Registries {
        &self.registries
    }

    pub fn get_packages(&self) -> &PackageInventory {
        &self.packages
    }

    pub fn get_packages_mut(&mut self) -> &mut PackageInventory {
        &mut self.packages
    }

    pub fn get_root(&self) -> NodeIndex {
        self.root
    }

    pub fn get_importers(&self) -> &Vec<NodeIndex> {
        &self.importers
    }

    pub fn get_node(&self, i: NodeIndex) -> &Node {
        &self.nodes[i]
    }

    pub fn get_edge(&self, e: EdgeIndex) -> Option<&Edge> {
        self.edges.get(e).and_then(|s| s.as_ref())
    }

    pub fn find(&self, id: &DepId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// Finds the node for a `name@version` key, if exactly one origin produced it.
    pub fn find_package(&self, key: &str) -> Option<NodeIndex> {
        self.pkg_nodes.get(key).copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &Node)> {
        self.nodes.iter().enumerate()
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeIndex, &Edge)> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i, e)))
    }

    /// Returns the edge `from` uses for the dependency `name`.
    pub fn edge_of(&self, from: NodeIndex, name: &str) -> Option<&Edge> {
        self.nodes[from]
            .edges_out
            .get(name)
            .and_then(|e| self.get_edge(*e))
    }

    /// Lists the outgoing edges of `from` sorted by dependency name.
    pub fn sorted_edges(&self, from: NodeIndex) -> Vec<(EdgeIndex, &Edge)> {
        let mut list: Vec<(EdgeIndex, &Edge)> = self.nodes[from]
            .edges_out
            .values()
            .filter_map(|e| self.get_edge(*e).map(|edge| (*e, edge)))
            .collect();
        list.sort_by(|a, b| a.1.name.cmp(&b.1.name));
        list
    }

    /// Lists the dangling edges of non-optional dependencies.
    pub fn get_missing(&self) -> Vec<&Edge> {
        self.missing
            .iter()
            .filter_map(|e| self.get_edge(*e))
            .collect()
    }

    /// Checks if an edge is satisfied.
    ///
    /// A dangling edge is valid only when optional. Otherwise the target's version
    /// must satisfy the edge's spec.
    pub fn is_valid(&self, e: EdgeIndex) -> bool {
        match self.get_edge(e) {
            Some(edge) => match edge.to {
                None => edge.is_optional(),
                Some(t) => edge
                    .spec
                    .accepts(self.nodes[t].package.get_version()),
            },
            None => false,
        }
    }

    /// Computes the absolute install location of node `i`.
    pub fn location(&self, i: NodeIndex) -> PathBuf {
        let rel = self.nodes[i].package.get_location();
        match rel == Path::new(".") {
            true => self.project_root.clone(),
            false => self.project_root.join(rel),
        }
    }

    /// Computes the absolute directory holding the dependency links of node `i`.
    ///
    /// Store nodes see their dependencies as siblings. Nodes linked in place get a
    /// `node_modules` directory of their own.
    pub fn modules_dir(&self, i: NodeIndex) -> PathBuf {
        let location = self.location(i);
        match self.nodes[i].in_store() {
            true => {
                // climb out of a scoped name
                let depth = Path::new(self.nodes[i].id.get_name()).components().count();
                let mut dir = location;
                for _ in 0..depth {
                    dir.pop();
                }
                dir
            }
            false => location.join(MODULES_DIR),
        }
    }

    /// Computes the absolute path of the link materializing edge `e`.
    pub fn link_path(&self, e: EdgeIndex) -> Option<PathBuf> {
        let edge = self.get_edge(e)?;
        Some(self.modules_dir(edge.from).join(&edge.name))
    }

    /// Checks if node `i` is installed inside the project directory.
    pub fn is_inside_project(&self, i: NodeIndex) -> bool {
        let rel = self.nodes[i].package.get_location();
        rel.is_absolute() == false
            && rel
                .components()
                .any(|c| c == std::path::Component::ParentDir)
                == false
    }

    /// Records the dependency names requested to change for importer `i`.
    pub fn set_requests(&mut self, i: NodeIndex, requests: Requests) {
        self.requests.insert(i, requests);
    }

    pub fn get_requests(&self) -> &IndexMap<NodeIndex, Requests> {
        &self.requests
    }

    /// Walks from every importer and returns the visited nodes in breadth-first
    /// order.
    pub fn reachable(&self) -> IndexSet<NodeIndex> {
        let mut seen: IndexSet<NodeIndex> = self.importers.iter().copied().collect();
        let mut i = 0;
        while let Some(n) = seen.get_index(i).copied() {
            for e in self.nodes[n].edges_out.values() {
                if let Some(t) = self.get_edge(*e).and_then(|edge| edge.to) {
                    seen.insert(t);
                }
            }
            i += 1;
        }
        seen
    }
}

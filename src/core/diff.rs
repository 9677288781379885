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

//! Computes the structural delta between the installed graph and the graph a
//! project should have.
//!
//! Nodes are compared by `DepId`. Edges are compared by the `DepId` of their
//! consumer together with the dependency name, and an edge whose target changed
//! counts as both deleted and added.

use crate::core::depid::DepId;
use crate::core::graph::{EdgeIndex, Graph, NodeIndex};
use indexmap::{IndexMap, IndexSet};

/// Identity of an edge across two graphs.
type EdgeKey<'g> = (&'g DepId, &'g str);

#[derive(Debug)]
pub struct Diff<'a> {
    from: &'a Graph,
    to: &'a Graph,
    nodes_add: Vec<NodeIndex>,
    nodes_delete: Vec<NodeIndex>,
    edges_add: Vec<EdgeIndex>,
    edges_delete: Vec<EdgeIndex>,
    importers_changed: IndexSet<NodeIndex>,
}

/// Maps every linked edge of `graph` to the identity of its target.
fn linked_edges(graph: &Graph) -> IndexMap<EdgeKey<'_>, (EdgeIndex, &DepId)> {
    graph
        .edges()
        .filter_map(|(e, edge)| {
            let to = edge.get_to()?;
            Some((
                (graph.get_node(edge.get_from()).get_id(), edge.get_name()),
                (e, graph.get_node(to).get_id()),
            ))
        })
        .collect()
}

/// Checks if the edges of node `i` are materialized by this project.
///
/// Dependencies of packages that live outside the project belong to that
/// package and are left alone.
fn owns_links(graph: &Graph, i: NodeIndex) -> bool {
    let node = graph.get_node(i);
    node.is_importer() == true || node.in_store() == true || graph.is_inside_project(i) == true
}

impl<'a> Diff<'a> {
    /// Compares the actual graph `from` against the ideal graph `to`.
    pub fn new(from: &'a Graph, to: &'a Graph) -> Self {
        // nodes
        let nodes_add: Vec<NodeIndex> = to
            .nodes()
            .filter(|(_, n)| n.in_store() == true && n.is_importer() == false)
            .filter(|(_, n)| from.find(n.get_id()).is_none())
            .map(|(i, _)| i)
            .collect();
        let nodes_delete: Vec<NodeIndex> = from
            .nodes()
            .filter(|(_, n)| n.in_store() == true && n.is_importer() == false)
            .filter(|(_, n)| to.find(n.get_id()).is_none())
            .map(|(i, _)| i)
            .collect();
        let deleted: IndexSet<&DepId> = nodes_delete
            .iter()
            .map(|i| from.get_node(*i).get_id())
            .collect();

        // edges
        let actual = linked_edges(from);
        let ideal = linked_edges(to);
        let edges_add: Vec<EdgeIndex> = ideal
            .iter()
            .filter(|(key, (_, target))| match actual.get(*key) {
                Some((_, t)) => t != target,
                None => true,
            })
            .filter_map(|(_, (e, _))| {
                let from_node = to.get_edge(*e)?.get_from();
                match owns_links(to, from_node) {
                    true => Some(*e),
                    false => None,
                }
            })
            .collect();
        let edges_delete: Vec<EdgeIndex> = actual
            .iter()
            .filter(|(key, (_, target))| match ideal.get(*key) {
                Some((_, t)) => t != target,
                None => true,
            })
            .filter_map(|(key, (e, _))| {
                // removing a store entry already removes the links nested in it
                if deleted.contains(key.0) == true {
                    return None;
                }
                let from_node = from.get_edge(*e)?.get_from();
                match owns_links(from, from_node) {
                    true => Some(*e),
                    false => None,
                }
            })
            .collect();

        // importers whose outgoing edges changed
        let mut changed_ids: IndexSet<&DepId> = IndexSet::new();
        edges_add
            .iter()
            .filter_map(|e| to.get_edge(*e))
            .for_each(|edge| {
                changed_ids.insert(to.get_node(edge.get_from()).get_id());
            });
        edges_delete
            .iter()
            .filter_map(|e| from.get_edge(*e))
            .for_each(|edge| {
                changed_ids.insert(from.get_node(edge.get_from()).get_id());
            });
        let importers_changed: IndexSet<NodeIndex> = to
            .get_importers()
            .iter()
            .copied()
            .filter(|i| changed_ids.contains(to.get_node(*i).get_id()))
            .collect();

        Self {
            from: from,
            to: to,
            nodes_add: nodes_add,
            nodes_delete: nodes_delete,
            edges_add: edges_add,
            edges_delete: edges_delete,
            importers_changed: importers_changed,
        }
    }

    pub fn get_from(&self) -> &Graph {
        self.from
    }

    pub fn get_to(&self) -> &Graph {
        self.to
    }

    /// Nodes of the ideal graph to place into the store.
    pub fn get_nodes_add(&self) -> &Vec<NodeIndex> {
        &self.nodes_add
    }

    /// Nodes of the actual graph to remove from the store.
    pub fn get_nodes_delete(&self) -> &Vec<NodeIndex> {
        &self.nodes_delete
    }

    /// Edges of the ideal graph to link.
    pub fn get_edges_add(&self) -> &Vec<EdgeIndex> {
        &self.edges_add
    }

    /// Edges of the actual graph to unlink.
    pub fn get_edges_delete(&self) -> &Vec<EdgeIndex> {
        &self.edges_delete
    }

    /// Importers of the ideal graph with any changed outgoing edge.
    pub fn get_importers_changed(&self) -> &IndexSet<NodeIndex> {
        &self.importers_changed
    }

    pub fn is_empty(&self) -> bool {
        self.nodes_add.is_empty()
            && self.nodes_delete.is_empty()
            && self.edges_add.is_empty()
            && self.edges_delete.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::config::Registries;
    use crate::core::dependency::DependencyType;
    use crate::core::manifest::Manifest;
    use crate::core::package::Package;
    use crate::core::spec::Spec;
    use std::path::Path;

    fn spec(name: &str, bare: &str) -> Spec {
        Spec::parse(name, bare, &Registries::new()).unwrap()
    }

    fn reg(name: &str, version: &str) -> Package {
        Package::new(
            DepId::registry("npm", name, version),
            Manifest::with(name, version),
        )
    }

    /// root -> foo@`foo` -> bar@1.0.0
    fn build(foo: &str) -> Graph {
        let mut g = Graph::new(
            Path::new("/proj"),
            Manifest::with("app", "1.0.0"),
            Registries::new(),
        );
        let root = g.get_root();
        let (f, _) = g.place_node(reg("foo", foo));
        let (b, _) = g.place_node(reg("bar", "1.0.0"));
        g.add_edge(root, "foo", DependencyType::Prod, spec("foo", "^1"), Some(f));
        g.add_edge(f, "bar", DependencyType::Prod, spec("bar", "^1"), Some(b));
        g
    }

    #[test]
    fn identical_graphs_have_no_delta() {
        let a = build("1.0.0");
        let b = build("1.0.0");
        let d = Diff::new(&a, &b);
        assert_eq!(d.is_empty(), true);
        assert_eq!(d.get_importers_changed().len(), 0);
    }

    #[test]
    fn changed_target_replaces_edge() {
        let actual = build("1.0.0");
        let ideal = build("1.1.0");
        let d = Diff::new(&actual, &ideal);
        assert_eq!(d.get_nodes_add().len(), 1);
        assert_eq!(d.get_nodes_delete().len(), 1);
        // root -> foo changed target; foo@1.1.0 -> bar is new
        assert_eq!(d.get_edges_add().len(), 2);
        // foo@1.0.0 -> bar lives inside the deleted store entry
        assert_eq!(d.get_edges_delete().len(), 1);
        let deleted = actual.get_edge(d.get_edges_delete()[0]).unwrap();
        assert_eq!(deleted.get_name(), "foo");
        assert_eq!(d.get_importers_changed().len(), 1);
        assert_eq!(d.get_importers_changed().contains(&ideal.get_root()), true);
    }

    #[test]
    fn external_links_are_left_alone() {
        let mut actual = build("1.0.0");
        let (ext, _) = actual.place_node(Package::new(DepId::file("../ext", "ext"), Manifest::new()));
        let (b, _) = actual.place_node(reg("bar", "1.0.0"));
        actual.add_edge(ext, "bar", DependencyType::Prod, spec("bar", "^1"), Some(b));
        let ideal = build("1.0.0");
        let d = Diff::new(&actual, &ideal);
        assert_eq!(d.is_empty(), true);
    }

    #[test]
    fn dangling_edges_are_not_linked() {
        let actual = build("1.0.0");
        let mut ideal = build("1.0.0");
        let root = ideal.get_root();
        ideal.add_edge(root, "gone", DependencyType::Prod, spec("gone", "^1"), None);
        let d = Diff::new(&actual, &ideal);
        assert_eq!(d.is_empty(), true);
    }
}

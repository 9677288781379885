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

/// Basic graph data structure
/// - source: http://smallcultfollowing.com/babysteps/blog/2015/04/06/modeling-graphs-in-rust-using-vector-indices/
pub type NodeIndex = usize;

type EdgeIndex = usize;

#[derive(Debug, PartialEq)]
struct NodeData<V> {
    node: V,
    first_outgoing_edge: Option<EdgeIndex>,
    first_incoming_edge: Option<EdgeIndex>,
}

#[derive(Debug, PartialEq)]
struct EdgeData {
    source: NodeIndex,
    target: NodeIndex,
    next_outgoing_edge: Option<EdgeIndex>,
    next_incoming_edge: Option<EdgeIndex>,
}

/// A directed graph where an edge `source -> target` means `source` must be
/// processed before `target`.
#[derive(Debug, PartialEq)]
pub struct Graph<V> {
    vertices: Vec<NodeData<V>>,
    edges: Vec<EdgeData>,
}

#[derive(Debug, PartialEq)]
pub enum EdgeStatus {
    SelfLoop,
    AlreadyExists,
    Success,
}

impl EdgeStatus {
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Success => true,
            _ => false,
        }
    }
}

impl<V> Graph<V> {
    /// Creates an empty `Graph` struct.
    pub fn new() -> Self {
        Self {
            edges: Vec::new(),
            vertices: Vec::new(),
        }
    }

    /// Adds a new node to the graph.
    ///
    /// Returns the `NodeIndex` to remember the node.
    pub fn add_node(&mut self, node: V) -> NodeIndex {
        let index = self.vertices.len();
        self.vertices.push(NodeData {
            node: node,
            first_outgoing_edge: None,
            first_incoming_edge: None,
        });
        index
    }

    /// Checks if a given `source` node is connected to the given `target` node.
    pub fn has_edge(&self, source: NodeIndex, target: NodeIndex) -> bool {
        let mut successors = self.successors(source);
        successors.find(|f| f == &target).is_some()
    }

    /// Returns the number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.vertices.len()
    }

    /// Accesses the node data label behind the `node` index.
    pub fn get_node(&self, node: NodeIndex) -> Option<&V> {
        Some(&self.vertices.get(node)?.node)
    }

    /// Adds a new edge to the graph from `source` to `target`.
    ///
    /// Duplicate edges and self-loops are rejected.
    pub fn add_edge(&mut self, source: NodeIndex, target: NodeIndex) -> EdgeStatus {
        // do not allow duplicate edges
        if self.has_edge(source, target) == true {
            return EdgeStatus::AlreadyExists;
        }
        // do not allow self-loops
        if source == target {
            return EdgeStatus::SelfLoop;
        }
        let edge_index = self.edges.len();
        let incoming_edge = self.vertices[target].first_incoming_edge;
        self.edges.push(EdgeData {
            source: source,
            target: target,
            next_outgoing_edge: self.vertices[source].first_outgoing_edge,
            next_incoming_edge: incoming_edge,
        });
        self.vertices[source].first_outgoing_edge = Some(edge_index);
        self.vertices[target].first_incoming_edge = Some(edge_index);
        EdgeStatus::Success
    }

    /// Returns the number of predecessors to the `target` node.
    pub fn in_degree(&self, target: NodeIndex) -> usize {
        self.predecessors(target).count()
    }

    /// Creates an iterator over the incoming nodes to the `target` source.
    pub fn predecessors(&self, target: NodeIndex) -> Predecessors<V> {
        let first_incoming_edge = self.vertices[target].first_incoming_edge;
        Predecessors {
            graph: self,
            current_edge_index: first_incoming_edge,
        }
    }

    /// Creates an iterator over the outgoing nodes from the `source` node.
    pub fn successors(&self, source: NodeIndex) -> Successors<V> {
        let first_outgoing_edge = self.vertices[source].first_outgoing_edge;
        Successors {
            graph: self,
            current_edge_index: first_outgoing_edge,
        }
    }

    /// Groups the nodes into layers that can be processed in order.
    ///
    /// Every node appears after all of its predecessors, and nodes within one
    /// layer are independent of each other. Nodes caught in a cycle cannot be
    /// ordered, so they are collected into one final layer.
    pub fn layers(&self) -> Vec<Vec<NodeIndex>> {
        let mut degrees: Vec<usize> = (0..self.node_count()).map(|i| self.in_degree(i)).collect();
        let mut done = vec![false; self.node_count()];
        let mut result = Vec::new();
        loop {
            let ready: Vec<NodeIndex> = (0..self.node_count())
                .filter(|i| done[*i] == false && degrees[*i] == 0)
                .collect();
            if ready.is_empty() == true {
                break;
            }
            for n in &ready {
                done[*n] = true;
                for s in self.successors(*n) {
                    degrees[s] -= 1;
                }
            }
            result.push(ready);
        }
        let leftover: Vec<NodeIndex> = (0..self.node_count())
            .filter(|i| done[*i] == false)
            .collect();
        if leftover.is_empty() == false {
            result.push(leftover);
        }
        result
    }
}

pub struct Predecessors<'graph, V> {
    graph: &'graph Graph<V>,
    current_edge_index: Option<EdgeIndex>,
}

impl<'graph, V> Iterator for Predecessors<'graph, V> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current_edge_index {
            None => None,
            Some(edge_num) => {
                let edge = &self.graph.edges[edge_num];
                self.current_edge_index = edge.next_incoming_edge;
                Some(edge.source)
            }
        }
    }
}

pub struct Successors<'graph, V> {
    graph: &'graph Graph<V>,
    current_edge_index: Option<EdgeIndex>,
}

impl<'graph, V> Iterator for Successors<'graph, V> {
    type Item = NodeIndex;

    fn next(&mut self) -> Option<Self::Item> {
        match self.current_edge_index {
            None => None,
            Some(edge_num) => {
                let edge = &self.graph.edges[edge_num];
                self.current_edge_index = edge.next_outgoing_edge;
                Some(edge.target)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_loops_and_duplicates() {
        let mut g = Graph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        assert_eq!(g.add_edge(a, b), EdgeStatus::Success);
        assert_eq!(g.add_edge(a, b), EdgeStatus::AlreadyExists);
        assert_eq!(g.add_edge(a, a), EdgeStatus::SelfLoop);
        assert_eq!(g.in_degree(b), 1);
        assert_eq!(g.get_node(b), Some(&"b"));
    }

    #[test]
    fn layers_respect_dependencies() {
        // a -> c, b -> c, c -> d
        let mut g = Graph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        let d = g.add_node("d");
        g.add_edge(a, c);
        g.add_edge(b, c);
        g.add_edge(c, d);
        assert_eq!(g.layers(), vec![vec![a, b], vec![c], vec![d]]);
    }

    #[test]
    fn cycles_form_a_final_layer() {
        let mut g = Graph::new();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        g.add_edge(b, c);
        g.add_edge(c, b);
        assert_eq!(g.layers(), vec![vec![a], vec![b, c]]);
    }
}

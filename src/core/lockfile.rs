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

//! Flattens a graph into the lockfile and reads it back.
//!
//! Nodes are listed in the `store` by their pre-order index. The `tree` holds one
//! record per importer and per edge of a pre-order walk:
//!
//! ```text
//! ; ; <post>; <ref>                  importer
//! <name>@<bare>; <type>; <post>; <ref>  edge
//! ```
//!
//! A `<ref>` equal to the number of nodes created so far introduces the next
//! node and opens its subtree. A smaller `<ref>` points back at a node already
//! listed. An empty `<ref>` is a dangling edge. The `<post>` index of every
//! record tells the reader which open record is its parent.
//!
//! Importers are written root first, then by workspace path, so the order in
//! which a graph discovered its workspaces never shows in the document.

use crate::core::config::Registries;
use crate::core::dependency::DependencyType;
use crate::core::depid::{DepId, OriginKind};
use crate::core::graph::{Graph, NodeIndex};
use crate::core::manifest::Manifest;
use crate::core::package::Package;
use crate::core::spec::Spec;
use crate::error::{Error, Hint};
use crate::util::anyerror::{at_path, AnyError, Fault};
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

pub const LOCKFILE: &str = "arbor-lock.json";

const FIELD_SEP: &str = "; ";

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct LockfileDocument {
    pub registries: Registries,
    pub store: Vec<String>,
    pub tree: Vec<String>,
}

impl LockfileDocument {
    /// Renders the document as it is written to disk.
    pub fn to_string(&self) -> Result<String, Fault> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Reads the lockfile in the directory `root`, if one exists.
    pub fn read(root: &Path) -> Result<Option<Self>, Fault> {
        let path = root.join(LOCKFILE);
        if path.exists() == false {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(at_path(&path))?;
        let doc: Self = serde_json::from_str(&text).map_err(at_path(&path))?;
        Ok(Some(doc))
    }

    /// Writes the lockfile into the directory `root`.
    pub fn write(&self, root: &Path) -> Result<(), Fault> {
        let path = root.join(LOCKFILE);
        std::fs::write(&path, self.to_string()?).map_err(at_path(&path))?;
        Ok(())
    }
}

/// A tree record before its post-order index is known.
struct Record {
    head: Option<String>,
    parent: Option<usize>,
    target: Option<usize>,
    opens: bool,
}

/// One step of the walk: the record of a node and its remaining edges.
struct Frame {
    record: usize,
    edges: Vec<(String, Option<NodeIndex>)>,
    next: usize,
}

fn store_record(graph: &Graph, i: NodeIndex) -> String {
    let package = graph.get_node(i).get_package();
    [
        package.get_key(),
        package.get_integrity().unwrap_or("").to_string(),
        package.get_origin().encode(),
    ]
    .join(FIELD_SEP)
}

fn frame_of(graph: &Graph, i: NodeIndex, record: usize) -> Frame {
    Frame {
        record: record,
        edges: graph
            .sorted_edges(i)
            .into_iter()
            .map(|(_, edge)| {
                let head = [
                    format!("{}@{}", edge.get_name(), edge.get_spec().get_bare()),
                    edge.get_type().as_short().to_string(),
                ]
                .join(FIELD_SEP);
                (head, edge.get_to())
            })
            .collect(),
        next: 0,
    }
}

/// Flattens `graph` into a lockfile document.
pub fn encode(graph: &Graph) -> LockfileDocument {
    let mut pre: HashMap<NodeIndex, usize> = HashMap::new();
    let mut store: Vec<String> = Vec::new();
    let mut records: Vec<Record> = Vec::new();

    let mut importers = graph.get_importers().clone();
    importers.sort_by_key(|i| {
        let node = graph.get_node(*i);
        (node.is_root() == false, node.get_id().get_locator().to_string())
    });

    // pre-order walk
    for imp in &importers {
        let fresh = pre.contains_key(imp) == false;
        if fresh == true {
            pre.insert(*imp, store.len());
            store.push(store_record(graph, *imp));
        }
        records.push(Record {
            head: None,
            parent: None,
            target: pre.get(imp).copied(),
            opens: fresh,
        });
        if fresh == false {
            continue;
        }
        let mut stack = vec![frame_of(graph, *imp, records.len() - 1)];
        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.edges.len() {
                stack.pop();
                continue;
            }
            let (head, to) = frame.edges[frame.next].clone();
            frame.next += 1;
            let parent = frame.record;
            let (target, opens) = match to {
                None => (None, false),
                Some(t) => match pre.get(&t) {
                    Some(p) => (Some(*p), false),
                    None => {
                        pre.insert(t, store.len());
                        store.push(store_record(graph, t));
                        (Some(store.len() - 1), true)
                    }
                },
            };
            records.push(Record {
                head: Some(head),
                parent: Some(parent),
                target: target,
                opens: opens,
            });
            if opens == true {
                if let Some(t) = to {
                    stack.push(frame_of(graph, t, records.len() - 1));
                }
            }
        }
    }

    // post-order numbering over the record tree
    let mut post: Vec<usize> = vec![0; records.len()];
    let mut counter = 0;
    let mut open: Vec<usize> = Vec::new();
    for (r, record) in records.iter().enumerate() {
        while let Some(top) = open.last() {
            if Some(*top) == record.parent {
                break;
            }
            post[*top] = counter;
            counter += 1;
            open.pop();
        }
        match record.opens {
            true => open.push(r),
            false => {
                post[r] = counter;
                counter += 1;
            }
        }
    }
    while let Some(top) = open.pop() {
        post[top] = counter;
        counter += 1;
    }

    let tree = records
        .iter()
        .zip(post.iter())
        .map(|(record, p)| {
            let target = record.target.map(|t| t.to_string()).unwrap_or_default();
            match &record.head {
                Some(head) => format!("{}{}{}{}{}", head, FIELD_SEP, p, FIELD_SEP, target),
                None => format!("; ; {}{}{}", p, FIELD_SEP, target),
            }
        })
        .collect();

    LockfileDocument {
        registries: graph.get_registries().clone(),
        store: store,
        tree: tree,
    }
}

/// A parsed `store` entry.
struct Entry {
    name: String,
    version: String,
    integrity: Option<String>,
    id: DepId,
}

/// Splits a record into at most `n` fields. Only the first field may hold a `;`.
fn fields_of(line: &str, n: usize) -> Vec<&str> {
    let mut fields: Vec<&str> = line.rsplitn(n, ';').map(|f| f.trim()).collect();
    fields.reverse();
    fields
}

fn parse_store(i: usize, line: &str) -> Result<Entry, Fault> {
    let fields = fields_of(line, 3);
    if fields.len() != 3 {
        return Err(AnyError(format!(
            "lockfile store entry {} is malformed: expected 3 fields but found {}",
            i,
            fields.len()
        )))?;
    }
    // versions never hold an '@', names may start with one
    let (name, version) = fields[0].rsplit_once('@').unwrap_or((fields[0], ""));
    Ok(Entry {
        name: name.to_string(),
        version: version.to_string(),
        integrity: match fields[1].is_empty() {
            true => None,
            false => Some(fields[1].to_string()),
        },
        id: DepId::decode(fields[2])?,
    })
}

fn malformed(i: usize, reason: String) -> Fault {
    Error::LockfileMalformed(i, reason, Hint::RegenerateLockfile).into()
}

/// Creates the node for a store entry that appears for the first time.
fn place(graph: &mut Graph, entry: &Entry) -> NodeIndex {
    let manifest = Manifest::with(&entry.name, &entry.version);
    match entry.id.get_kind() {
        OriginKind::Workspace => graph.add_importer(entry.id.get_locator(), manifest),
        _ => {
            let package = Package::new(entry.id.clone(), manifest).integrity(entry.integrity.clone());
            graph.place_node(package).0
        }
    }
}

/// Rebuilds the graph described by `doc` for the project at `project_root`.
pub fn decode(doc: &LockfileDocument, project_root: &Path) -> Result<Graph, Fault> {
    let store: Vec<Entry> = doc
        .store
        .iter()
        .enumerate()
        .map(|(i, line)| parse_store(i, line))
        .collect::<Result<Vec<Entry>, Fault>>()?;

    let mut graph: Option<Graph> = None;
    // graph node of every pre-order index created so far
    let mut nodes: Vec<NodeIndex> = Vec::new();
    // open records as (post index, node)
    let mut stack: Vec<(usize, NodeIndex)> = Vec::new();

    for (i, line) in doc.tree.iter().enumerate() {
        let fields = fields_of(line, 4);
        if fields.len() != 4 {
            return Err(malformed(
                i,
                format!("expected 4 fields but found {}", fields.len()),
            ));
        }
        if fields[2].is_empty() == true {
            return Err(Error::LockfileMissingPostOrder(i, Hint::RegenerateLockfile))?;
        }
        let post: usize = fields[2]
            .parse()
            .map_err(|_| malformed(i, format!("invalid post-order index {:?}", fields[2])))?;
        let target: Option<usize> = match fields[3].is_empty() {
            true => None,
            false => Some(
                fields[3]
                    .parse()
                    .map_err(|_| malformed(i, format!("invalid reference {:?}", fields[3])))?,
            ),
        };
        if let Some(t) = target {
            if t > nodes.len() || t >= store.len() {
                return Err(Error::LockfileBadReference(i, t, Hint::RegenerateLockfile))?;
            }
        }
        let fresh = target == Some(nodes.len());

        // importer
        if fields[0].is_empty() == true && fields[1].is_empty() == true {
            let t = match target {
                Some(t) => t,
                None => return Err(malformed(i, String::from("importer without a reference"))),
            };
            stack.clear();
            if fresh == false {
                continue;
            }
            let n = match graph.as_mut() {
                Some(g) => place(g, &store[t]),
                None => {
                    let entry = &store[t];
                    let g = Graph::new(
                        project_root,
                        Manifest::with(&entry.name, &entry.version),
                        doc.registries.clone(),
                    );
                    let root = g.get_root();
                    graph = Some(g);
                    root
                }
            };
            nodes.push(n);
            stack.push((post, n));
            continue;
        }

        // edge
        let g = match graph.as_mut() {
            Some(g) => g,
            None => return Err(malformed(i, String::from("edge before any importer"))),
        };
        while let Some((top, _)) = stack.last() {
            if *top < post {
                stack.pop();
            } else {
                break;
            }
        }
        let parent = match stack.last() {
            Some((_, p)) => *p,
            None => return Err(malformed(i, String::from("edge without a parent"))),
        };
        let dep_type = DependencyType::from_short(fields[1])?;
        let spec = Spec::parse_full(fields[0], &doc.registries)?;
        let to = match target {
            None => None,
            Some(t) => match fresh {
                true => {
                    let n = place(g, &store[t]);
                    nodes.push(n);
                    Some(n)
                }
                false => Some(nodes[t]),
            },
        };
        let name = spec.get_name().to_string();
        g.add_edge(parent, &name, dep_type, spec, to);
        if let (true, Some(n)) = (fresh, to) {
            stack.push((post, n));
        }
    }

    match graph {
        Some(g) => Ok(g),
        None => Err(AnyError(String::from("lockfile does not list any importers")))?,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::ideal::IdealBuilder;
    use crate::core::testing::MemoryRegistry;

    fn doc(store: &[&str], tree: &[&str]) -> LockfileDocument {
        LockfileDocument {
            registries: Registries::new(),
            store: store.iter().map(|s| s.to_string()).collect(),
            tree: tree.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Lists the node ids and the edges of `g` in a comparable form.
    fn shape(g: &Graph) -> (Vec<DepId>, Vec<String>) {
        let mut nodes: Vec<DepId> = g.nodes().map(|(_, n)| n.get_id().clone()).collect();
        nodes.sort();
        let mut edges: Vec<String> = g
            .edges()
            .map(|(_, e)| {
                format!(
                    "{} {} {} {} {}",
                    g.get_node(e.get_from()).get_id(),
                    e.get_name(),
                    e.get_type().as_short(),
                    e.get_spec().get_bare(),
                    e.get_to()
                        .map(|t| g.get_node(t).get_id().encode())
                        .unwrap_or_default()
                )
            })
            .collect();
        edges.sort();
        (nodes, edges)
    }

    fn app_foo(tree: &[&str]) -> LockfileDocument {
        let foo = DepId::registry("npm", "foo", "1.0.0").encode();
        let root = DepId::root("app").encode();
        doc(
            &[
                &format!("app@1.0.0; ; {}", root),
                &format!("foo@1.0.0; sha512-abc; {}", foo),
            ],
            tree,
        )
    }

    #[test]
    fn decode_two_nodes() {
        let g = decode(
            &app_foo(&["; ; 1; 0", "foo@^1.0.0; prod; 0; 1"]),
            Path::new("/proj"),
        )
        .unwrap();
        assert_eq!(g.node_count(), 2);
        let foo = g.find(&DepId::registry("npm", "foo", "1.0.0")).unwrap();
        let edge = g.edge_of(g.get_root(), "foo").unwrap();
        assert_eq!(edge.get_to(), Some(foo));
        assert_eq!(edge.get_type(), DependencyType::Prod);
        assert_eq!(edge.get_spec().get_bare(), "^1.0.0");
        assert_eq!(
            g.get_node(foo).get_package().get_integrity(),
            Some("sha512-abc")
        );
    }

    #[test]
    fn decode_errors() {
        let err = decode(
            &app_foo(&["; ; 1; 0", "foo@^1.0.0; bogus; 0; 1"]),
            Path::new("/proj"),
        )
        .unwrap_err();
        assert_eq!(err.to_string().starts_with("Dependency type not found"), true);

        let err = decode(&app_foo(&["; ; 1; 0", "foo@^1.0.0; prod; ; 1"]), Path::new("/proj"))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::LockfileMissingPostOrder(1, Hint::RegenerateLockfile))
        );

        let err = decode(&app_foo(&["; ; 1; 0", "foo@^1.0.0; prod; 0; 7"]), Path::new("/proj"))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::LockfileBadReference(1, 7, Hint::RegenerateLockfile))
        );

        let err = decode(&app_foo(&["foo@^1.0.0; prod; 0; "]), Path::new("/proj")).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::LockfileMalformed(0, _, _)) => (),
            _ => panic!("unexpected error {}", err),
        }
    }

    #[test]
    fn encode_two_nodes() {
        let g = decode(
            &app_foo(&["; ; 1; 0", "foo@^1.0.0; prod; 0; 1"]),
            Path::new("/proj"),
        )
        .unwrap();
        let d = encode(&g);
        assert_eq!(d.tree, vec!["; ; 1; 0", "foo@^1.0.0; prod; 0; 1"]);
        assert_eq!(d.store, app_foo(&[]).store);
    }

    #[test]
    fn round_trip_with_cycles_and_shared_nodes() {
        let reg = MemoryRegistry::new()
            .publish("a", "1.0.0", &[("b", "^1.0.0"), ("c", "^1.0.0")])
            .publish("b", "1.0.0", &[("a", "^1.0.0"), ("c", "^1.0.0")])
            .publish("c", "1.0.0", &[]);
        let root: Manifest =
            r#"{"name":"app","version":"0.1.0","dependencies":{"a":"^1.0.0","gone":"^2.0.0"}}"#
                .parse()
                .unwrap();
        let ideal = IdealBuilder::new(Path::new("/proj"), root, Registries::new(), &reg)
            .build()
            .unwrap();
        let d = encode(&ideal);
        assert_eq!(
            d.tree,
            vec![
                "; ; 6; 0",
                "a@^1.0.0; prod; 4; 1",
                "b@^1.0.0; prod; 2; 2",
                "a@^1.0.0; prod; 0; 1",
                "c@^1.0.0; prod; 1; 3",
                "c@^1.0.0; prod; 3; 3",
                "gone@^2.0.0; prod; 5; ",
            ]
        );
        let back = decode(&d, Path::new("/proj")).unwrap();
        assert_eq!(back.node_count(), ideal.node_count());
        assert_eq!(back.get_missing().len(), 1);
        assert_eq!(shape(&back), shape(&ideal));
        assert_eq!(encode(&back), d);

        let text = d.to_string().unwrap();
        let parsed: LockfileDocument = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn nameless_root_round_trip() {
        let reg = MemoryRegistry::new().publish("foo", "1.0.0", &[]);
        let root: Manifest = r#"{"dependencies":{"foo":"^1.0.0"}}"#.parse().unwrap();
        let ideal = IdealBuilder::new(Path::new("/proj"), root, Registries::new(), &reg)
            .build()
            .unwrap();
        let d = encode(&ideal);
        assert_eq!(d.store[0], format!("@; ; {}", DepId::root("").encode()));
        let back = decode(&d, Path::new("/proj")).unwrap();
        assert_eq!(back.get_node(back.get_root()).get_id(), &DepId::root(""));
        assert_eq!(shape(&back), shape(&ideal));
        assert_eq!(encode(&back), d);
    }

    #[test]
    fn workspace_order_survives_round_trip() {
        let mut g = Graph::new(
            Path::new("/proj"),
            Manifest::with("app", "1.0.0"),
            Registries::new(),
        );
        let root = g.get_root();
        g.add_importer("packages/a", Manifest::with("a", "1.0.0"));
        let b = g.add_importer("packages/b", Manifest::with("b", "1.0.0"));
        let spec = Spec::parse("b", "workspace:*", &Registries::new()).unwrap();
        g.add_edge(root, "b", DependencyType::Prod, spec, Some(b));

        let d = encode(&g);
        assert_eq!(
            d.tree,
            vec!["; ; 1; 0", "b@workspace:*; prod; 0; 1", "; ; 2; 2", "; ; 3; 1"]
        );
        let back = decode(&d, Path::new("/proj")).unwrap();
        assert_eq!(back.get_importers().len(), 3);
        assert_eq!(shape(&back), shape(&g));
        assert_eq!(encode(&back), d);
    }

    #[test]
    fn semicolons_in_specs_and_ids() {
        let url = "https://host/x.tgz;v=1";
        let mut g = Graph::new(
            Path::new("/proj"),
            Manifest::with("app", "1.0.0"),
            Registries::new(),
        );
        let root = g.get_root();
        let (x, _) = g.place_node(Package::new(
            DepId::remote(url, "x"),
            Manifest::with("x", "1.0.0"),
        ));
        let spec = Spec::parse("x", url, &Registries::new()).unwrap();
        g.add_edge(root, "x", DependencyType::Prod, spec, Some(x));

        let d = encode(&g);
        assert_eq!(d.tree[1], format!("x@{}; prod; 0; 1", url));
        let back = decode(&d, Path::new("/proj")).unwrap();
        assert_eq!(shape(&back), shape(&g));
        assert_eq!(encode(&back), d);
    }
}

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

//! Builds the graph a project should have installed.
//!
//! Resolution proceeds one level at a time: every spec declared by the nodes
//! created in the previous level is resolved in parallel, then the results are
//! placed into the graph in declaration order. Placement reuses the node of an
//! already known `DepId`, which both deduplicates shared packages and turns
//! cycles into back-edges.

use crate::core::config::Registries;
use crate::core::dependency::{self, Declared, DependencyType};
use crate::core::graph::{Graph, NodeIndex, Requests};
use crate::core::manifest::Manifest;
use crate::core::resolver::{Resolution, Resolver};
use crate::core::spec::{Spec, SpecKind};
use crate::core::version::Version;
use crate::error::Error;
use crate::util::anyerror::{AnyError, Fault};
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Path that identifies the root importer in requests.
pub const ROOT_IMPORTER: &str = ".";

/// A dependency requested to be added to an importer.
#[derive(Debug, PartialEq, Clone)]
pub struct AddRequest {
    name: String,
    bare: String,
    dep_type: DependencyType,
}

impl AddRequest {
    /// Creates a request for `name` at `bare`.
    ///
    /// The name may be empty when the specifier alone can locate a package
    /// (such as a directory or git remote). The resolved manifest then names it.
    pub fn new(name: &str, bare: &str, dep_type: DependencyType) -> Self {
        Self {
            name: name.to_string(),
            bare: bare.to_string(),
            dep_type: dep_type,
        }
    }

    /// Splits a `name@bare` request.
    pub fn parse(text: &str, dep_type: DependencyType) -> Self {
        let (name, bare) = crate::core::depid::split_name(text.trim());
        Self::new(name, bare.unwrap_or(""), dep_type)
    }
}

/// One dependency of one node waiting to be placed.
struct Task {
    from: NodeIndex,
    name: String,
    dep_type: DependencyType,
    spec: Spec,
    requested: bool,
    key: Option<String>,
}

pub struct IdealBuilder<'a> {
    project_root: PathBuf,
    root: Manifest,
    registries: Registries,
    resolver: &'a dyn Resolver,
    workspaces: Vec<(String, Manifest)>,
    adds: IndexMap<String, Vec<AddRequest>>,
    removes: IndexMap<String, IndexSet<String>>,
    locked: Option<&'a Graph>,
}

impl<'a> IdealBuilder<'a> {
    pub fn new(
        project_root: &Path,
        root: Manifest,
        registries: Registries,
        resolver: &'a dyn Resolver,
    ) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            root: root,
            registries: registries,
            resolver: resolver,
            workspaces: Vec::new(),
            adds: IndexMap::new(),
            removes: IndexMap::new(),
            locked: None,
        }
    }

    /// Adds a workspace importer found at `path` relative to the project root.
    pub fn workspace(mut self, path: &str, manifest: Manifest) -> Self {
        self.workspaces.push((path.to_string(), manifest));
        self
    }

    /// Requests to add a dependency to the importer at `importer`.
    pub fn add(mut self, importer: &str, request: AddRequest) -> Self {
        self.adds
            .entry(importer.to_string())
            .or_insert_with(Vec::new)
            .push(request);
        self
    }

    /// Requests to remove the dependency `name` from the importer at `importer`.
    pub fn remove(mut self, importer: &str, name: &str) -> Self {
        self.removes
            .entry(importer.to_string())
            .or_insert_with(IndexSet::new)
            .insert(name.to_string());
        self
    }

    /// Sets the previously locked graph whose versions are preferred.
    pub fn locked(mut self, graph: Option<&'a Graph>) -> Self {
        self.locked = graph;
        self
    }

    /// Resolves every importer's dependencies into a new graph.
    pub fn build(self) -> Result<Graph, Fault> {
        let mut graph = Graph::new(&self.project_root, self.root.clone(), self.registries.clone());
        // importer paths keyed by node
        let mut importer_paths: HashMap<NodeIndex, String> = HashMap::new();
        importer_paths.insert(graph.get_root(), ROOT_IMPORTER.to_string());
        for (path, manifest) in &self.workspaces {
            let i = graph.add_importer(path, manifest.clone());
            importer_paths.insert(i, path.clone());
        }
        for i in graph.get_importers().clone() {
            let id = graph.get_node(i).get_id().clone();
            graph.get_packages_mut().mark_pending(id);
        }

        let mut requests: IndexMap<NodeIndex, Requests> = IndexMap::new();
        loop {
            let pending = graph.get_packages_mut().take_pending();
            if pending.is_empty() == true {
                break;
            }
            let mut tasks = Vec::new();
            for id in pending {
                let n = match graph.find(&id) {
                    Some(n) => n,
                    None => continue,
                };
                let importer = importer_paths.get(&n);
                tasks.append(&mut self.collect_tasks(&graph, n, importer)?);
            }
            let results = self.resolve_level(&graph, &mut tasks);
            self.place_level(&mut graph, tasks, results, &mut requests)?;
        }
        // record the requested changes on their importers
        for (path, names) in &self.removes {
            if let Some((i, _)) = importer_paths.iter().find(|(_, p)| p == &path) {
                requests
                    .entry(*i)
                    .or_default()
                    .removed
                    .extend(names.iter().cloned());
            }
        }
        for (i, r) in requests {
            graph.set_requests(i, r);
        }
        let missing = graph.get_missing();
        if missing.is_empty() == false {
            log::warn!(
                "{} dependencies could not be resolved: {}",
                missing.len(),
                missing
                    .iter()
                    .map(|e| e.get_spec().to_string())
                    .collect::<Vec<String>>()
                    .join(", ")
            );
        }
        Ok(graph)
    }

    /// Lists the dependencies node `n` declares, applying the requested changes
    /// when it is an importer.
    fn collect_tasks(
        &self,
        graph: &Graph,
        n: NodeIndex,
        importer: Option<&String>,
    ) -> Result<Vec<Task>, Fault> {
        let node = graph.get_node(n);
        let mut declared = dependency::collect(node.get_manifest(), node.is_importer());
        let mut tasks = Vec::new();
        let mut adds: Vec<&AddRequest> = Vec::new();
        if let Some(path) = importer {
            if let Some(names) = self.removes.get(path) {
                declared.retain(|name, _| names.contains(name) == false);
            }
            if let Some(list) = self.adds.get(path) {
                for req in list {
                    match req.name.is_empty() {
                        // a named request replaces the declared entry
                        false => {
                            declared.shift_remove(&req.name);
                            adds.push(req);
                        }
                        true => adds.push(req),
                    }
                }
            }
        }
        for (name, Declared { bare, dep_type }) in declared {
            let spec = Spec::parse(&name, &bare, &self.registries)?;
            tasks.push(Task {
                from: n,
                name: name,
                dep_type: dep_type,
                spec: spec,
                requested: false,
                key: None,
            });
        }
        for req in adds {
            let spec = Spec::parse(&req.name, &req.bare, &self.registries)?;
            tasks.push(Task {
                from: n,
                name: req.name.clone(),
                dep_type: req.dep_type,
                spec: spec,
                requested: true,
                key: None,
            });
        }
        Ok(tasks)
    }

    /// Finds the version the locked graph chose for the same dependency of the
    /// same consumer.
    fn preferred(&self, graph: &Graph, task: &Task) -> Option<Version> {
        let locked = self.locked?;
        let consumer = locked.find(graph.get_node(task.from).get_id())?;
        let target = locked.edge_of(consumer, &task.name)?.get_to()?;
        locked.get_node(target).get_package().get_version().cloned()
    }

    /// Resolves the distinct specs of one level in parallel.
    ///
    /// Each task is assigned the key of its resolution.
    fn resolve_level(
        &self,
        graph: &Graph,
        tasks: &mut Vec<Task>,
    ) -> HashMap<String, Result<Resolution, Fault>> {
        let mut jobs: IndexMap<String, (Spec, PathBuf, Option<Version>)> = IndexMap::new();
        for task in tasks.iter_mut() {
            if let SpecKind::Workspace { .. } = task.spec.get_kind() {
                continue;
            }
            let base = graph.location(task.from);
            let prefer = match task.spec.get_kind() {
                SpecKind::Registry { .. } => self.preferred(graph, task),
                _ => None,
            };
            // only local paths depend on where they are declared
            let key = match task.spec.get_kind() {
                SpecKind::File { .. } => format!("{}\n{}", task.spec, base.display()),
                _ => task.spec.to_string(),
            };
            let key = match &prefer {
                Some(v) => format!("{}\n{}", key, v),
                None => key,
            };
            if jobs.contains_key(&key) == false {
                jobs.insert(key.clone(), (task.spec.clone(), base, prefer));
            }
            task.key = Some(key);
        }
        jobs.into_iter()
            .collect::<Vec<(String, (Spec, PathBuf, Option<Version>))>>()
            .into_par_iter()
            .map(|(key, (spec, base, prefer))| {
                log::debug!("resolving {}", spec);
                let result = self.resolver.resolve(&spec, &base, prefer.as_ref());
                (key, result)
            })
            .collect()
    }

    /// Places the resolved packages of one level and connects their edges.
    fn place_level(
        &self,
        graph: &mut Graph,
        tasks: Vec<Task>,
        mut results: HashMap<String, Result<Resolution, Fault>>,
        requests: &mut IndexMap<NodeIndex, Requests>,
    ) -> Result<(), Fault> {
        for task in tasks {
            let Task {
                from,
                name,
                dep_type,
                spec,
                requested,
                key,
            } = task;
            let key = match key {
                Some(k) => k,
                None => {
                    // workspace specs link to a sibling importer
                    let target = graph
                        .get_importers()
                        .iter()
                        .copied()
                        .find(|i| graph.get_node(*i).get_package().get_name() == name);
                    match target {
                        Some(t) => {
                            graph.add_edge(from, &name, dep_type, spec, Some(t));
                            if requested == true {
                                requests.entry(from).or_default().added.insert(name);
                            }
                        }
                        None => return Err(Error::WorkspaceNotFound(name))?,
                    }
                    continue;
                }
            };
            let outcome = match results.get(&key) {
                Some(Ok(r)) => Ok(r.clone()),
                Some(Err(e)) => {
                    let not_found = match e.downcast_ref::<Error>() {
                        Some(err) => err.is_not_found(),
                        None => false,
                    };
                    Err((not_found, e.to_string()))
                }
                None => Err((false, format!("{} was never resolved", spec))),
            };
            match outcome {
                Ok(resolution) => {
                    let name = match name.is_empty() {
                        true => resolution.id.get_name().to_string(),
                        false => name,
                    };
                    let spec = match spec.get_name().is_empty() {
                        true => spec.with_name(&name),
                        false => spec,
                    };
                    let (to, created) = graph.place_node(resolution.into_package());
                    if created == true {
                        let id = graph.get_node(to).get_id().clone();
                        graph.get_packages_mut().mark_pending(id);
                    }
                    graph.add_edge(from, &name, dep_type, spec, Some(to));
                    if requested == true {
                        requests.entry(from).or_default().added.insert(name);
                    }
                }
                Err((not_found, message)) => {
                    let tolerated = name.is_empty() == false
                        && (not_found == true || dep_type.is_optional() == true);
                    if tolerated == false {
                        return match results.remove(&key) {
                            Some(Err(e)) => Err(e),
                            _ => Err(AnyError(message))?,
                        };
                    }
                    match dep_type.is_optional() {
                        true => log::info!("skipping optional dependency {}: {}", spec, message),
                        false => log::warn!("missing dependency {}: {}", spec, message),
                    }
                    graph.add_edge(from, &name, dep_type, spec, None);
                    if requested == true {
                        requests.entry(from).or_default().added.insert(name);
                    }
                }
            }
        }
        Ok(())
    }
}

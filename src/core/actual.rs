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

//! Builds the graph of what is physically installed in a project.

use crate::core::config::Registries;
use crate::core::dependency::{self, Declared};
use crate::core::depid::{DepId, OriginKind};
use crate::core::graph::{Graph, NodeIndex};
use crate::core::manifest::{FromFile, Manifest, ManifestFile, MANIFEST_FILE};
use crate::core::package::{self, Package, STORE_DIR};
use crate::core::resolver::path_locator;
use crate::core::spec::Spec;
use crate::error::{Error, Hint};
use crate::util::anyerror::{at_path, Fault};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

/// What a dependency link resolved to.
#[derive(Debug)]
enum Probe {
    Importer(NodeIndex),
    Package(Package),
}

/// A declared dependency waiting to be probed.
struct Task {
    from: NodeIndex,
    name: String,
    declared: Declared,
    link: PathBuf,
}

pub struct ActualBuilder {
    project_root: PathBuf,
    registries: Registries,
    workspaces: Vec<String>,
    scan_store: bool,
}

impl ActualBuilder {
    pub fn new(project_root: &Path, registries: Registries) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            registries: registries,
            workspaces: Vec::new(),
            scan_store: false,
        }
    }

    /// Adds the workspace importer at `path`, relative to the project root.
    pub fn workspace(mut self, path: &str) -> Self {
        self.workspaces.push(path.to_string());
        self
    }

    /// Also lists the store and adds entries no importer reaches.
    pub fn scan_store(mut self, scan: bool) -> Self {
        self.scan_store = scan;
        self
    }

    pub fn build(self) -> Result<Graph, Fault> {
        let root = ManifestFile::read_dir(&self.project_root)?.into_manifest();
        let mut graph = Graph::new(&self.project_root, root, self.registries.clone());
        for ws in &self.workspaces {
            let manifest = ManifestFile::read_dir(&self.project_root.join(ws))?.into_manifest();
            graph.add_importer(ws, manifest);
        }

        let root_real = std::fs::canonicalize(&self.project_root).map_err(at_path(&self.project_root))?;
        let store_real = std::fs::canonicalize(root_real.join(STORE_DIR)).ok();
        let mut importers: HashMap<PathBuf, NodeIndex> = HashMap::new();
        for i in graph.get_importers() {
            if let Ok(real) = std::fs::canonicalize(graph.location(*i)) {
                importers.insert(real, *i);
            }
        }

        let mut level: Vec<NodeIndex> = graph.get_importers().clone();
        while level.is_empty() == false {
            let tasks: Vec<Task> = level
                .iter()
                .flat_map(|i| {
                    let node = graph.get_node(*i);
                    let modules = graph.modules_dir(*i);
                    dependency::collect(node.get_manifest(), node.is_importer())
                        .into_iter()
                        .map(move |(name, declared)| Task {
                            from: *i,
                            link: modules.join(&name),
                            name: name,
                            declared: declared,
                        })
                })
                .collect();
            log::trace!("probing {} installed dependencies", tasks.len());

            let probes: Vec<Result<Option<Probe>, Fault>> = tasks
                .par_iter()
                .map(|t| self.probe(t, &root_real, store_real.as_deref(), &importers))
                .collect();

            let mut next = Vec::new();
            for (task, probe) in tasks.iter().zip(probes) {
                let spec = Spec::parse(&task.name, &task.declared.bare, &self.registries)?;
                let target = match probe? {
                    None => {
                        log::debug!("{} is not installed at {:?}", spec, task.link);
                        None
                    }
                    Some(Probe::Importer(i)) => Some(i),
                    Some(Probe::Package(pkg)) => {
                        let (i, created) = graph.place_node(pkg);
                        let node = graph.get_node(i);
                        if created == true
                            && (node.in_store() == true || graph.is_inside_project(i) == true)
                        {
                            next.push(i);
                        }
                        Some(i)
                    }
                };
                graph.add_edge(task.from, &task.name, task.declared.dep_type, spec, target);
            }
            level = next;
        }

        if self.scan_store == true {
            if let Some(store) = &store_real {
                self.add_extraneous(&mut graph, store)?;
            }
        }
        Ok(graph)
    }

    /// Follows the link of one dependency to the package installed behind it.
    ///
    /// Returns `None` when nothing readable is installed.
    fn probe(
        &self,
        task: &Task,
        root_real: &Path,
        store_real: Option<&Path>,
        importers: &HashMap<PathBuf, NodeIndex>,
    ) -> Result<Option<Probe>, Fault> {
        let real = match std::fs::canonicalize(&task.link) {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };
        if let Some(i) = importers.get(&real) {
            return Ok(Some(Probe::Importer(*i)));
        }
        let manifest = match Manifest::from_file(&real.join(MANIFEST_FILE)) {
            Ok(m) => m,
            Err(_) => return Ok(None),
        };
        let in_store = store_real.and_then(|s| real.strip_prefix(s).ok());
        let id = match in_store.and_then(|rest| rest.components().next()) {
            Some(Component::Normal(segment)) => self.decode_entry(&segment.to_string_lossy())?,
            _ => DepId::file(&path_locator(&real, root_real), &task.name),
        };
        Ok(Some(Probe::Package(Package::new(id, manifest))))
    }

    /// Recovers the origin of a store entry from its directory name.
    fn decode_entry(&self, segment: &str) -> Result<DepId, Fault> {
        let id = DepId::decode(segment)?;
        if id.get_kind() == OriginKind::Registry {
            let alias = id.get_registry().unwrap_or_default();
            if self.registries.get(alias).is_none() {
                return Err(Error::UnknownStoreHost(
                    segment.to_string(),
                    alias.to_string(),
                    Hint::RegistriesTable,
                ))?;
            }
        }
        Ok(id)
    }

    /// Adds every store entry that no importer reached.
    fn add_extraneous(&self, graph: &mut Graph, store: &Path) -> Result<(), Fault> {
        let mut names: Vec<String> = std::fs::read_dir(store)
            .map_err(at_path(store))?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            // staged removals and tool files are hidden
            .filter(|n| n.starts_with('.') == false)
            .collect();
        names.sort();
        for name in names {
            let id = match self.decode_entry(&name) {
                Ok(id) => id,
                Err(e) => match e.downcast_ref::<Error>() {
                    Some(Error::UnknownStoreHost(..)) => return Err(e),
                    _ => {
                        log::warn!("skipping unrecognized store entry {:?}: {}", name, e);
                        continue;
                    }
                },
            };
            if graph.find(&id).is_some() == true {
                continue;
            }
            let location = graph.get_project_root().join(package::location_of(&id));
            let manifest = Manifest::from_file(&location.join(MANIFEST_FILE))
                .unwrap_or(Manifest::with(id.get_name(), id.get_version().unwrap_or("")));
            log::debug!("found extraneous store entry {}", name);
            graph.place_node(Package::new(id, manifest));
        }
        Ok(())
    }
}

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

//! Applies the delta between the actual and ideal graphs to the filesystem.
//!
//! Every change goes through one `RollbackRemove`: packages are fetched into
//! fresh store entries, links are created, and removals are staged as renames.
//! Lifecycle scripts then run. Only when all of that succeeded are the staged
//! entries handed off for deletion. Any failure before that point restores the
//! filesystem to exactly what it was.

pub mod fetch;
pub mod remover;
pub mod scripts;

use crate::core::diff::Diff;
use crate::core::graph::{EdgeIndex, Graph, NodeIndex};
use crate::core::manifest::ManifestFile;
use crate::core::package::STORE_DIR;
use crate::error::{Error, LastError};
use crate::util::anyerror::Fault;
use crate::util::filesystem;
use fetch::Fetcher;
use rayon::prelude::*;
use remover::{DeferredRemover, RollbackRemove};
use scripts::ScriptRunner;
use std::collections::HashSet;
use std::path::PathBuf;

/// What one reify changed.
#[derive(Debug, PartialEq, Default)]
pub struct ReifyReport {
    nodes_added: usize,
    nodes_removed: usize,
    links_added: usize,
    links_removed: usize,
    scripts: Vec<(String, String)>,
    manifests: Vec<PathBuf>,
    missing: Vec<String>,
    errors: Vec<String>,
}

impl ReifyReport {
    pub fn get_nodes_added(&self) -> usize {
        self.nodes_added
    }

    pub fn get_nodes_removed(&self) -> usize {
        self.nodes_removed
    }

    pub fn get_links_added(&self) -> usize {
        self.links_added
    }

    pub fn get_links_removed(&self) -> usize {
        self.links_removed
    }

    /// Lists the (package, event) pairs of the lifecycle scripts that ran.
    pub fn get_scripts(&self) -> &Vec<(String, String)> {
        &self.scripts
    }

    /// Lists the manifests that were rewritten.
    pub fn get_manifests(&self) -> &Vec<PathBuf> {
        &self.manifests
    }

    /// Lists the dependencies that could not be resolved, as `name@spec`.
    pub fn get_missing(&self) -> &Vec<String> {
        &self.missing
    }

    /// Lists the failures that happened after the store was committed.
    pub fn get_errors(&self) -> &Vec<String> {
        &self.errors
    }

    /// Checks if nothing on disk was touched.
    pub fn is_noop(&self) -> bool {
        self.nodes_added == 0
            && self.nodes_removed == 0
            && self.links_added == 0
            && self.links_removed == 0
            && self.scripts.is_empty()
            && self.manifests.is_empty()
    }
}

pub struct Reifier<'a> {
    fetcher: &'a dyn Fetcher,
    remover: &'a dyn DeferredRemover,
    scripts: Option<&'a dyn ScriptRunner>,
}

impl<'a> Reifier<'a> {
    pub fn new(fetcher: &'a dyn Fetcher, remover: &'a dyn DeferredRemover) -> Self {
        Self {
            fetcher: fetcher,
            remover: remover,
            scripts: None,
        }
    }

    /// Sets the runner for lifecycle scripts. Without one, scripts are skipped.
    pub fn scripts(mut self, runner: Option<&'a dyn ScriptRunner>) -> Self {
        self.scripts = runner;
        self
    }

    /// Makes the disk match `ideal`, given that it currently matches `actual`.
    pub fn reify(&self, actual: &Graph, ideal: &Graph) -> Result<ReifyReport, Fault> {
        let diff = Diff::new(actual, ideal);
        let mut report = ReifyReport::default();
        report.missing = ideal
            .get_missing()
            .iter()
            .map(|e| e.get_spec().to_string())
            .collect();

        if diff.is_empty() == true {
            log::info!("installed dependencies are up to date");
        } else {
            let rr = RollbackRemove::new();
            if let Err(e) = self.apply(&diff, &rr, &mut report) {
                log::error!("reify failed, rolling back: {}", e);
                if let Err(re) = rr.rollback() {
                    log::error!("rollback was incomplete: {}", re);
                }
                return Err(e);
            }
            // the store is consistent from here on
            if let Err(e) = rr.confirm(self.remover) {
                log::warn!("failed to remove staged entries: {}", e);
                report.errors.push(e.to_string());
            }
        }
        self.sync_manifests(ideal, &mut report);
        for m in &report.missing {
            log::warn!("missing dependency {}", m);
        }
        Ok(report)
    }

    /// Runs every step that can still be rolled back.
    fn apply(&self, diff: &Diff, rr: &RollbackRemove, report: &mut ReifyReport) -> Result<(), Fault> {
        report.nodes_added = self.fetch(diff, rr)?;
        let linked = self.link(diff, rr)?;
        report.links_added = linked.1;
        let (nodes, links) = self.delete(diff, rr, &linked.0)?;
        report.nodes_removed = nodes;
        report.links_removed = links;
        if let Some(runner) = self.scripts {
            report.scripts =
                scripts::run_lifecycle(diff.get_to(), diff.get_importers_changed(), runner)?;
        }
        Ok(())
    }

    /// Places every added node into its store entry.
    fn fetch(&self, diff: &Diff, rr: &RollbackRemove) -> Result<usize, Fault> {
        let ideal = diff.get_to();
        if diff.get_nodes_add().is_empty() == true {
            return Ok(0);
        }
        rr.create_dir_all(&ideal.get_project_root().join(STORE_DIR))?;
        diff.get_nodes_add()
            .par_iter()
            .map(|i| self.fetch_node(ideal, *i, rr))
            .collect::<Result<Vec<()>, Fault>>()?;
        Ok(diff.get_nodes_add().len())
    }

    fn fetch_node(&self, ideal: &Graph, i: NodeIndex, rr: &RollbackRemove) -> Result<(), Fault> {
        let node = ideal.get_node(i);
        let entry = ideal
            .get_project_root()
            .join(STORE_DIR)
            .join(node.get_id().encode());
        // a leftover entry was never fully installed
        rr.rm(&entry)?;
        rr.create_dir_all(&entry)?;
        log::debug!("fetching {}", node.get_package().get_key());
        self.fetcher.fetch(node.get_package(), &ideal.location(i))
    }

    /// Links every added edge. Returns the link paths of all added edges and the
    /// number of links actually created.
    fn link(&self, diff: &Diff, rr: &RollbackRemove) -> Result<(HashSet<PathBuf>, usize), Fault> {
        let ideal = diff.get_to();
        let created: Vec<Option<PathBuf>> = diff
            .get_edges_add()
            .par_iter()
            .map(|e| self.link_edge(ideal, *e, rr))
            .collect::<Result<Vec<Option<PathBuf>>, Fault>>()?;
        let count = created.iter().filter(|c| c.is_some()).count();
        let paths = diff
            .get_edges_add()
            .iter()
            .filter_map(|e| ideal.link_path(*e))
            .collect();
        Ok((paths, count))
    }

    fn link_edge(
        &self,
        ideal: &Graph,
        e: EdgeIndex,
        rr: &RollbackRemove,
    ) -> Result<Option<PathBuf>, Fault> {
        let (link, target) = match (ideal.link_path(e), ideal.get_edge(e).and_then(|x| x.get_to())) {
            (Some(l), Some(t)) => (l, ideal.location(t)),
            _ => return Ok(None),
        };
        if filesystem::is_link_to(&link, &target) == true {
            return Ok(None);
        }
        rr.rm(&link)?;
        if let Some(parent) = link.parent() {
            rr.create_dir_all(parent)?;
        }
        filesystem::link_dir(&target, &link)
            .map_err(|err| Error::LinkFailed(link.clone(), LastError(err.to_string())))?;
        rr.created(&link)?;
        log::trace!("linked {:?} -> {:?}", link, target);
        Ok(Some(link))
    }

    /// Stages the removal of deleted store entries, then of deleted links that
    /// were not replaced.
    fn delete(
        &self,
        diff: &Diff,
        rr: &RollbackRemove,
        relinked: &HashSet<PathBuf>,
    ) -> Result<(usize, usize), Fault> {
        let actual = diff.get_from();
        for i in diff.get_nodes_delete() {
            let entry = actual
                .get_project_root()
                .join(STORE_DIR)
                .join(actual.get_node(*i).get_id().encode());
            rr.rm(&entry)?;
        }
        let mut links = 0;
        for e in diff.get_edges_delete() {
            let link = match actual.link_path(*e) {
                Some(l) => l,
                None => continue,
            };
            if relinked.contains(&link) == true {
                continue;
            }
            rr.rm(&link)?;
            links += 1;
        }
        Ok((diff.get_nodes_delete().len(), links))
    }

    /// Rewrites the dependency fields of every importer with requested changes.
    ///
    /// Failures are collected into the report.
    fn sync_manifests(&self, ideal: &Graph, report: &mut ReifyReport) {
        for (i, requests) in ideal.get_requests() {
            let dir = ideal.location(*i);
            let mut file = match ManifestFile::read_dir(&dir) {
                Ok(f) => f,
                Err(e) => {
                    log::warn!("{}", e);
                    report.errors.push(e.to_string());
                    continue;
                }
            };
            let before = file.get_manifest().clone();
            for name in &requests.removed {
                file.get_manifest_mut().remove_dependency(name);
            }
            for name in &requests.added {
                let edge = match ideal.edge_of(*i, name) {
                    Some(e) => e,
                    None => continue,
                };
                let version = edge
                    .get_to()
                    .and_then(|t| ideal.get_node(t).get_package().get_version());
                let saved = edge.get_spec().to_saved(version);
                file.get_manifest_mut()
                    .set_dependency(name, &saved, edge.get_type());
            }
            if file.get_manifest() == &before {
                continue;
            }
            match file.write() {
                Ok(()) => {
                    log::info!("updated {:?}", file.get_path());
                    report.manifests.push(file.get_path().clone());
                }
                Err(e) => {
                    log::warn!("failed to write {:?}: {}", file.get_path(), e);
                    report.errors.push(e.to_string());
                }
            }
        }
    }
}

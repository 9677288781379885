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

use crate::core::graph::{Graph, NodeIndex};
use crate::core::package::{Package, MODULES_DIR};
use crate::error::Error;
use crate::util::anyerror::Fault;
use crate::util::environment::Environment;
use crate::util::graph::Graph as Scheduler;
use indexmap::IndexSet;
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Lifecycle events run for every changed importer, in order.
pub const LIFECYCLE_EVENTS: [&str; 2] = ["install", "prepare"];

/// Executes one lifecycle script.
pub trait ScriptRunner: Sync {
    /// Runs `script` for the `event` of `package` inside the directory `dir`.
    fn run(&self, event: &str, script: &str, package: &Package, dir: &Path)
        -> Result<(), Fault>;
}

/// Runs scripts through the platform shell.
#[derive(Debug, PartialEq, Clone)]
pub struct ShellRunner {
    project_root: PathBuf,
}

impl ShellRunner {
    pub fn new(project_root: &Path) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
        }
    }
}

impl ScriptRunner for ShellRunner {
    fn run(
        &self,
        event: &str,
        script: &str,
        package: &Package,
        dir: &Path,
    ) -> Result<(), Fault> {
        let env = Environment::new()
            .from_package(package, event, &self.project_root)
            .from_bins(&[
                dir.join(MODULES_DIR).join(".bin"),
                self.project_root.join(MODULES_DIR).join(".bin"),
            ])?;
        #[cfg(unix)]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.arg("-c").arg(script);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(script);
            c
        };
        cmd.current_dir(dir).stdin(Stdio::null());
        env.apply(&mut cmd);
        log::info!("running {} script of {}: {}", event, package.get_name(), script);
        let status = cmd.status()?;
        match status.code() {
            Some(0) => Ok(()),
            Some(num) => Err(Error::ScriptFailed(
                package.get_name().to_string(),
                event.to_string(),
                num,
            ))?,
            None => Err(Error::ScriptTerminated(
                package.get_name().to_string(),
                event.to_string(),
            ))?,
        }
    }
}

/// Finds the changed importers that `from` depends on, looking through
/// importers that did not change.
fn changed_dependencies(
    graph: &Graph,
    from: NodeIndex,
    changed: &IndexSet<NodeIndex>,
) -> Vec<NodeIndex> {
    let mut found = Vec::new();
    let mut visited: HashSet<NodeIndex> = HashSet::from([from]);
    let mut queue: VecDeque<NodeIndex> = VecDeque::from([from]);
    while let Some(i) = queue.pop_front() {
        for e in graph.get_node(i).get_edges_out().values() {
            let target = match graph.get_edge(*e).and_then(|edge| edge.get_to()) {
                Some(t) => t,
                None => continue,
            };
            if graph.get_node(target).is_importer() == false || visited.insert(target) == false {
                continue;
            }
            match changed.contains(&target) {
                // its own dependencies are ordered before it already
                true => found.push(target),
                false => queue.push_back(target),
            }
        }
    }
    found
}

/// Orders the `changed` importers so every importer comes after the importers
/// it depends on, directly or through unchanged importers. Importers within one
/// layer are independent.
pub fn schedule(graph: &Graph, changed: &IndexSet<NodeIndex>) -> Vec<Vec<NodeIndex>> {
    let mut sched: Scheduler<NodeIndex> = Scheduler::new();
    let slots: Vec<NodeIndex> = changed.iter().map(|i| sched.add_node(*i)).collect();
    for (slot, i) in changed.iter().enumerate() {
        for dep in changed_dependencies(graph, *i, changed) {
            if let Some(dep_slot) = changed.get_index_of(&dep) {
                // the dependency finishes before its consumer starts
                sched.add_edge(slots[dep_slot], slots[slot]);
            }
        }
    }
    sched
        .layers()
        .into_iter()
        .map(|layer| {
            layer
                .into_iter()
                .filter_map(|s| sched.get_node(s).copied())
                .collect()
        })
        .collect()
}

/// Runs the lifecycle scripts of the `changed` importers, layer by layer.
///
/// Returns the (package, event) pairs that ran.
pub fn run_lifecycle(
    graph: &Graph,
    changed: &IndexSet<NodeIndex>,
    runner: &dyn ScriptRunner,
) -> Result<Vec<(String, String)>, Fault> {
    let mut ran = Vec::new();
    for layer in schedule(graph, changed) {
        let results: Vec<Result<Vec<(String, String)>, Fault>> = layer
            .par_iter()
            .map(|i| {
                let node = graph.get_node(*i);
                let dir = graph.location(*i);
                let mut done = Vec::new();
                for event in LIFECYCLE_EVENTS {
                    // missing scripts are skipped
                    if let Some(script) = node.get_manifest().get_script(event) {
                        runner.run(event, script, node.get_package(), &dir)?;
                        done.push((node.get_package().get_name().to_string(), event.to_string()));
                    }
                }
                Ok(done)
            })
            .collect();
        for r in results {
            ran.append(&mut r?);
        }
    }
    Ok(ran)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::config::Registries;
    use crate::core::dependency::DependencyType;
    use crate::core::manifest::Manifest;
    use crate::core::spec::Spec;

    fn spec(name: &str) -> Spec {
        Spec::parse(name, "workspace:*", &Registries::new()).unwrap()
    }

    #[test]
    fn consumers_wait_for_dependencies() {
        let mut g = Graph::new(
            Path::new("/proj"),
            Manifest::with("app", "1.0.0"),
            Registries::new(),
        );
        let root = g.get_root();
        let ui = g.add_importer("packages/ui", Manifest::with("ui", "1.0.0"));
        let core = g.add_importer("packages/core", Manifest::with("core", "1.0.0"));
        g.add_edge(root, "ui", DependencyType::Prod, spec("ui"), Some(ui));
        g.add_edge(ui, "core", DependencyType::Prod, spec("core"), Some(core));

        let changed: IndexSet<NodeIndex> = [root, ui, core].into_iter().collect();
        assert_eq!(schedule(&g, &changed), vec![vec![core], vec![ui], vec![root]]);
        // an unchanged importer in between still orders its neighbors
        let changed: IndexSet<NodeIndex> = [root, core].into_iter().collect();
        assert_eq!(schedule(&g, &changed), vec![vec![core], vec![root]]);
        // unrelated importers share a layer
        let tools = g.add_importer("packages/tools", Manifest::with("tools", "1.0.0"));
        let changed: IndexSet<NodeIndex> = [root, tools, core].into_iter().collect();
        assert_eq!(schedule(&g, &changed), vec![vec![tools, core], vec![root]]);
    }

    #[cfg(unix)]
    #[test]
    fn shell_scripts_report_failures() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ShellRunner::new(dir.path());
        let pkg = Package::new(
            crate::core::depid::DepId::root("app"),
            Manifest::with("app", "1.0.0"),
        );
        runner
            .run("install", "echo $npm_lifecycle_event > out.txt", &pkg, dir.path())
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap().trim(),
            "install"
        );
        let err = runner.run("prepare", "exit 3", &pkg, dir.path()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<Error>(),
            Some(&Error::ScriptFailed(
                String::from("app"),
                String::from("prepare"),
                3
            ))
        );
    }
}

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

//! In-memory collaborators for exercising the engine without a network.

use crate::core::depid::DepId;
use crate::core::manifest::{Manifest, MANIFEST_FILE};
use crate::core::package::Package;
use crate::core::reify::fetch::Fetcher;
use crate::core::reify::scripts::ScriptRunner;
use crate::core::resolver::{Resolution, Resolver};
use crate::core::spec::{Selector, Spec, SpecKind};
use crate::core::version::{self, Version};
use crate::error::{Error, LastError};
use crate::util::anyerror::{AnyError, Fault};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A registry whose packages are published by the test itself.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: HashMap<String, BTreeMap<Version, Manifest>>,
    failing: HashSet<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `name@version` depending on `deps`.
    pub fn publish(self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        let mut manifest = Manifest::with(name, version).as_value();
        if deps.is_empty() == false {
            let table: Map<String, Value> = deps
                .iter()
                .map(|(n, r)| (n.to_string(), Value::String(r.to_string())))
                .collect();
            if let Value::Object(map) = &mut manifest {
                map.insert(String::from("dependencies"), Value::Object(table));
            }
        }
        self.publish_manifest(Manifest::from_value(manifest).unwrap())
    }

    pub fn publish_manifest(mut self, manifest: Manifest) -> Self {
        let name = manifest.get_name().unwrap().to_string();
        let version = manifest.get_version().unwrap();
        self.packages
            .entry(name)
            .or_default()
            .insert(version, manifest);
        self
    }

    /// Makes every lookup of `name` fail as if the registry was unreachable.
    pub fn fail(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    /// Counts how many times `name` was resolved.
    pub fn count(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl Resolver for MemoryRegistry {
    fn resolve(
        &self,
        spec: &Spec,
        _base: &Path,
        prefer: Option<&Version>,
    ) -> Result<Resolution, Fault> {
        let (registry, package, selector) = match spec.get_kind() {
            SpecKind::Registry {
                registry,
                package,
                selector,
            } => (registry, package, selector),
            _ => return Err(AnyError(format!("unsupported spec {}", spec)))?,
        };
        if package.is_empty() == true {
            return Err(Error::NoPackageName)?;
        }
        *self
            .calls
            .lock()
            .unwrap()
            .entry(package.to_string())
            .or_insert(0) += 1;
        if self.failing.contains(package) == true {
            return Err(Error::MetadataRetrievalFailed(
                package.to_string(),
                LastError(String::from("connection reset")),
            ))?;
        }
        let versions = match self.packages.get(package) {
            Some(v) => v,
            None => return Err(Error::PackageNotFound(package.to_string(), registry.to_string()))?,
        };
        let chosen = match selector {
            Selector::Range(range) => match prefer {
                Some(p) if versions.contains_key(p) && version::satisfies(p, range) => {
                    Some(p.clone())
                }
                _ => version::max_satisfying(versions.keys(), range).cloned(),
            },
            Selector::Tag(tag) => match tag.as_str() {
                "latest" => versions.keys().last().cloned(),
                _ => None,
            },
        };
        let chosen = match chosen {
            Some(c) => c,
            None => {
                return Err(Error::NoMatchingVersion(
                    package.to_string(),
                    selector.to_string(),
                ))?
            }
        };
        Ok(Resolution {
            id: DepId::registry(registry, package, &chosen.to_string()),
            manifest: versions[&chosen].clone(),
            integrity: None,
            resolved: None,
        })
    }
}

/// Writes only the manifest of each fetched package.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    failing: HashSet<String>,
    fetched: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn count(&self) -> usize {
        self.fetched.load(Ordering::SeqCst)
    }
}

impl Fetcher for MemoryFetcher {
    fn fetch(&self, package: &Package, dest: &Path) -> Result<(), Fault> {
        if self.failing.contains(package.get_name()) == true {
            return Err(Error::FetchFailed(
                package.get_key(),
                LastError(String::from("connection reset")),
            ))?;
        }
        std::fs::create_dir_all(dest)?;
        let text = serde_json::to_string_pretty(&package.get_manifest().as_value())?;
        std::fs::write(dest.join(MANIFEST_FILE), text)?;
        self.fetched.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records every script instead of running it.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    failing: HashSet<String>,
    ran: Mutex<Vec<(String, String)>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every script for `event` exit with an error.
    pub fn fail(mut self, event: &str) -> Self {
        self.failing.insert(event.to_string());
        self
    }

    pub fn get_ran(&self) -> Vec<(String, String)> {
        self.ran.lock().unwrap().clone()
    }
}

impl ScriptRunner for RecordingRunner {
    fn run(&self, event: &str, _script: &str, package: &Package, _dir: &Path) -> Result<(), Fault> {
        self.ran
            .lock()
            .unwrap()
            .push((package.get_name().to_string(), event.to_string()));
        match self.failing.contains(event) {
            true => Err(Error::ScriptFailed(
                package.get_name().to_string(),
                event.to_string(),
                1,
            ))?,
            false => Ok(()),
        }
    }
}

/// Lists every entry below `root` with its link target or file contents.
pub fn snapshot(root: &Path) -> Vec<String> {
    let mut list = Vec::new();
    walk(root, root, &mut list);
    list.sort();
    list
}

fn walk(root: &Path, dir: &Path, list: &mut Vec<String>) {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    for path in entries {
        let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
        let meta = std::fs::symlink_metadata(&path).unwrap();
        if meta.file_type().is_symlink() == true {
            list.push(format!("{} -> {}", rel, std::fs::read_link(&path).unwrap().display()));
        } else if meta.is_dir() == true {
            list.push(format!("{}/", rel));
            walk(root, &path, list);
        } else {
            list.push(format!("{}: {}", rel, std::fs::read_to_string(&path).unwrap()));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::config::Registries;

    #[test]
    fn memory_registry_picks_versions() {
        let reg = MemoryRegistry::new()
            .publish("foo", "1.0.0", &[])
            .publish("foo", "1.4.0", &[]);
        let spec = Spec::parse("foo", "^1.0.0", &Registries::new()).unwrap();
        let base = Path::new("/proj");
        let res = reg.resolve(&spec, base, None).unwrap();
        assert_eq!(res.id, DepId::registry("npm", "foo", "1.4.0"));
        let old = Version::from_str("1.0.0").unwrap();
        let res = reg.resolve(&spec, base, Some(&old)).unwrap();
        assert_eq!(res.id, DepId::registry("npm", "foo", "1.0.0"));
        assert_eq!(reg.count("foo"), 2);
    }
}

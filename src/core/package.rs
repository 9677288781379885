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

use crate::core::depid::{DepId, OriginKind};
use crate::core::manifest::Manifest;
use crate::core::version::Version;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory holding every installed dependency of a package.
pub const MODULES_DIR: &str = "node_modules";

/// Store directory, relative to the project root.
pub const STORE_DIR: &str = "node_modules/.arbor";

/// Checks if a file path names a package archive rather than a directory.
pub fn is_archive(path: &str) -> bool {
    path.ends_with(".tgz") || path.ends_with(".tar.gz") || path.ends_with(".tar")
}

/// Checks if packages with this id live where they are declared instead of in
/// the store.
pub fn is_in_place(id: &DepId) -> bool {
    match id.get_kind() {
        OriginKind::Workspace => true,
        OriginKind::File => is_archive(id.get_locator()) == false,
        _ => false,
    }
}

/// Computes the install location of the package with `id`, relative to the
/// project root.
pub fn location_of(id: &DepId) -> PathBuf {
    match is_in_place(id) {
        true => PathBuf::from(id.get_locator()),
        false => PathBuf::from(STORE_DIR)
            .join(id.encode())
            .join(MODULES_DIR)
            .join(id.get_name()),
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Package {
    name: String,
    version: Option<Version>,
    manifest: Manifest,
    location: PathBuf,
    origin: DepId,
    integrity: Option<String>,
    resolved: Option<String>,
}

impl Package {
    pub fn new(origin: DepId, manifest: Manifest) -> Self {
        Self {
            name: match manifest.get_name() {
                Some(n) => n.to_string(),
                None => origin.get_name().to_string(),
            },
            version: manifest.get_version(),
            location: location_of(&origin),
            manifest: manifest,
            origin: origin,
            integrity: None,
            resolved: None,
        }
    }

    pub fn integrity(mut self, s: Option<String>) -> Self {
        self.integrity = s;
        self
    }

    pub fn resolved(mut self, s: Option<String>) -> Self {
        self.resolved = s;
        self
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    pub fn get_manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// References the install path relative to the project root.
    pub fn get_location(&self) -> &Path {
        &self.location
    }

    pub fn get_origin(&self) -> &DepId {
        &self.origin
    }

    pub fn get_integrity(&self) -> Option<&str> {
        self.integrity.as_deref()
    }

    pub fn get_resolved(&self) -> Option<&str> {
        self.resolved.as_deref()
    }

    /// Forms the `name@version` key used by the inventory.
    pub fn get_key(&self) -> String {
        match &self.version {
            Some(v) => format!("{}@{}", self.name, v),
            None => format!("{}@", self.name),
        }
    }
}

/// Every package known to a graph, keyed by `name@version`.
#[derive(Debug, PartialEq)]
pub struct PackageInventory {
    packages: IndexMap<String, Arc<Package>>,
    ambiguous: HashSet<String>,
    pending: IndexSet<DepId>,
}

impl PackageInventory {
    pub fn new() -> Self {
        Self {
            packages: IndexMap::new(),
            ambiguous: HashSet::new(),
            pending: IndexSet::new(),
        }
    }

    /// Registers a package and returns the shared handle to it.
    ///
    /// When another origin already produced the same `name@version` the first
    /// registration is kept and the key is marked ambiguous.
    pub fn add(&mut self, package: Package) -> Arc<Package> {
        let key = package.get_key();
        let package = Arc::new(package);
        match self.packages.get(&key) {
            Some(existing) => {
                if existing.get_origin() != package.get_origin() {
                    self.ambiguous.insert(key);
                }
            }
            None => {
                self.packages.insert(key, package.clone());
            }
        }
        package
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Package>> {
        self.packages.get(key)
    }

    /// Checks if `key` identifies a single origin.
    pub fn is_unique(&self, key: &str) -> bool {
        self.packages.contains_key(key) == true && self.ambiguous.contains(key) == false
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Marks the package `id` as needing its dependencies walked.
    pub fn mark_pending(&mut self, id: DepId) {
        self.pending.insert(id);
    }

    pub fn is_pending(&self, id: &DepId) -> bool {
        self.pending.contains(id)
    }

    /// Removes and returns every pending package, in the order they were marked.
    pub fn take_pending(&mut self) -> Vec<DepId> {
        self.pending.drain(..).collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn store_locations() {
        let id = DepId::registry("npm", "@s/a", "1.0.0");
        assert_eq!(
            location_of(&id),
            PathBuf::from("node_modules/.arbor/registry··@s%2Fa@1.0.0/node_modules/@s/a")
        );
        assert_eq!(
            location_of(&DepId::workspace("packages/b", "b")),
            PathBuf::from("packages/b")
        );
        assert_eq!(
            location_of(&DepId::file("../libs/c", "c")),
            PathBuf::from("../libs/c")
        );
        assert_eq!(is_in_place(&DepId::file("./c.tgz", "c")), false);
        assert_eq!(is_in_place(&DepId::root("app")), true);
    }

    #[test]
    fn package_fields() {
        let id = DepId::registry("npm", "a", "1.2.3");
        let p = Package::new(id.clone(), Manifest::with("a", "1.2.3"))
            .integrity(Some(String::from("sha512-x")));
        assert_eq!(p.get_key(), "a@1.2.3");
        assert_eq!(p.get_origin(), &id);
        assert_eq!(p.get_integrity(), Some("sha512-x"));
        assert_eq!(p.get_resolved(), None);
        let p = Package::new(DepId::file("x", "x"), Manifest::new());
        assert_eq!(p.get_name(), "x");
        assert_eq!(p.get_key(), "x@");
    }

    #[test]
    fn inventory_tracks_ambiguity() {
        let mut inv = PackageInventory::new();
        inv.add(Package::new(
            DepId::registry("npm", "a", "1.0.0"),
            Manifest::with("a", "1.0.0"),
        ));
        assert_eq!(inv.is_unique("a@1.0.0"), true);
        inv.add(Package::new(
            DepId::registry("npm", "a", "1.0.0"),
            Manifest::with("a", "1.0.0"),
        ));
        assert_eq!(inv.is_unique("a@1.0.0"), true);
        inv.add(Package::new(
            DepId::registry("acme", "a", "1.0.0"),
            Manifest::with("a", "1.0.0"),
        ));
        assert_eq!(inv.is_unique("a@1.0.0"), false);
        assert_eq!(inv.len(), 1);
        assert_eq!(
            inv.get("a@1.0.0").unwrap().get_origin().get_registry(),
            Some("npm")
        );
    }

    #[test]
    fn pending_queue() {
        let mut inv = PackageInventory::new();
        let a = DepId::registry("npm", "a", "1.0.0");
        let b = DepId::registry("npm", "b", "1.0.0");
        inv.mark_pending(a.clone());
        inv.mark_pending(b.clone());
        inv.mark_pending(a.clone());
        assert_eq!(inv.is_pending(&b), true);
        assert_eq!(inv.take_pending(), vec![a.clone(), b]);
        assert_eq!(inv.is_pending(&a), false);
    }
}

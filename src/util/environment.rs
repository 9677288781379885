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

use crate::core::package::Package;
use crate::util::anyerror::Fault;
use std::collections::btree_set::BTreeSet;
use std::collections::btree_set::Iter;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Eq, Clone)]
pub struct EnvVar {
    key: String,
    value: String,
}

impl PartialEq for EnvVar {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Ord for EnvVar {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key.cmp(&other.key)
    }
}

impl PartialOrd for EnvVar {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for EnvVar {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // only hash by the key name
        self.key.hash(state);
    }
}

impl EnvVar {
    pub fn with(key: &str, value: &str) -> Self {
        Self::new().key(key).value(value)
    }

    pub fn new() -> Self {
        Self {
            key: String::new(),
            value: String::new(),
        }
    }

    /// Sets the environment key.
    ///
    /// Keys keep their case since lifecycle variables are lowercase.
    pub fn key(mut self, s: &str) -> Self {
        self.key = s.replace('-', "_");
        self
    }

    /// Sets the environment value.
    pub fn value(mut self, s: &str) -> Self {
        self.value = s.to_owned();
        self
    }

    pub fn get_key(&self) -> &str {
        &self.key
    }

    pub fn get_value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Debug for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}=\"{}\"", self.key, self.value)
    }
}

impl std::fmt::Display for EnvVar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone)]
pub struct Environment(BTreeSet<EnvVar>);

impl Environment {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    pub fn insert(&mut self, var: EnvVar) -> bool {
        self.0.insert(var)
    }

    pub fn add(mut self, var: EnvVar) -> Self {
        self.0.insert(var);
        self
    }

    pub fn overwrite(mut self, var: EnvVar) -> Self {
        self.0.replace(var);
        self
    }

    pub fn iter(&self) -> Iter<'_, EnvVar> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&EnvVar> {
        self.0.get(&EnvVar::new().key(key))
    }

    /// Loads the variables a lifecycle script of `package` expects.
    pub fn from_package(mut self, package: &Package, event: &str, init_cwd: &Path) -> Self {
        self.insert(EnvVar::with(NPM_LIFECYCLE_EVENT, event));
        self.insert(EnvVar::with(NPM_PACKAGE_NAME, package.get_name()));
        if let Some(v) = package.get_version() {
            self.insert(EnvVar::with(NPM_PACKAGE_VERSION, &v.to_string()));
        }
        self.insert(EnvVar::with(INIT_CWD, &init_cwd.to_string_lossy()));
        self
    }

    /// Prepends the `bins` directories to the current `PATH`.
    pub fn from_bins(mut self, bins: &[PathBuf]) -> Result<Self, Fault> {
        let mut paths: Vec<PathBuf> = bins.to_vec();
        if let Some(existing) = Self::read(PATH) {
            paths.extend(std::env::split_paths(&existing));
        }
        let joined = std::env::join_paths(paths)?;
        self.0
            .replace(EnvVar::with(PATH, &joined.to_string_lossy()));
        Ok(self)
    }

    /// Sets every variable on the process `cmd` will spawn.
    pub fn apply(&self, cmd: &mut Command) {
        self.0.iter().for_each(|e| {
            cmd.env(&e.key, &e.value);
        });
    }

    pub fn read(key: &str) -> Option<String> {
        match std::env::var(key) {
            Ok(v) => Some(v),
            Err(_) => None,
        }
    }
}

pub const ARBOR_HOME: &str = "ARBOR_HOME";
pub const ARBOR_LOG: &str = "ARBOR_LOG";
pub const NO_COLOR: &str = "NO_COLOR";

pub const PATH: &str = "PATH";
pub const INIT_CWD: &str = "INIT_CWD";

pub const NPM_LIFECYCLE_EVENT: &str = "npm_lifecycle_event";
pub const NPM_PACKAGE_NAME: &str = "npm_package_name";
pub const NPM_PACKAGE_VERSION: &str = "npm_package_version";

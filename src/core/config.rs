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

use crate::core::depid::DEFAULT_REGISTRY;
use crate::core::manifest::FromFile;
use crate::core::retry::RetryPolicy;
use crate::util::anyerror::{AnyError, Fault};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";

pub const PROJECT_CONFIG_FILE: &str = "arbor.toml";

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org/";

/// Mapping of registry aliases to their base URLs.
///
/// The default registry is always present.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Registries(IndexMap<String, String>);

impl Registries {
    pub fn new() -> Self {
        let mut map = IndexMap::new();
        map.insert(
            DEFAULT_REGISTRY.to_string(),
            DEFAULT_REGISTRY_URL.to_string(),
        );
        Self(map)
    }

    /// Sets the base `url` for `alias`, overwriting any existing entry.
    ///
    /// Base URLs are normalized to end with a '/'.
    pub fn insert(&mut self, alias: &str, url: &str) {
        let url = match url.ends_with('/') {
            true => url.to_string(),
            false => format!("{}/", url),
        };
        self.0.insert(alias.to_string(), url);
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.0.get(alias).map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Locality {
    Global,
    Local,
}

/// Stacks the configuration files that were found, in the order they were loaded.
#[derive(Debug, PartialEq)]
pub struct Configs {
    inner: Vec<(PathBuf, Config, Locality)>,
}

impl Configs {
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Loads the configuration at `file` when it exists.
    pub fn load(mut self, file: PathBuf, lvl: Locality) -> Result<Self, Fault> {
        if file.is_file() == true {
            let cfg = Config::from_file(&file)?;
            self.inner.push((file, cfg, lvl));
        }
        Ok(self)
    }
}

impl From<Configs> for Config {
    /// Transform the multi-layered configurations into a single level.
    ///
    /// The local file is processed first, then the global file. Once a value is
    /// set it is not overridden by a file later in the processing order.
    fn from(value: Configs) -> Self {
        let mut single = Config::new();
        let mut value = value;
        // process local file
        if let Some(i) = value.inner.iter().position(|p| p.2 == Locality::Local) {
            single.append(value.inner.remove(i).1);
        }
        // process global file
        if let Some(i) = value.inner.iter().position(|p| p.2 == Locality::Global) {
            single.append(value.inner.remove(i).1);
        }
        single
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Config {
    registry: Option<String>,
    registries: Option<IndexMap<String, String>>,
    fetch_retries: Option<u32>,
    fetch_retry_factor: Option<u32>,
    fetch_retry_mintimeout: Option<u64>,
    fetch_retry_maxtimeout: Option<u64>,
    ignore_scripts: Option<bool>,
    log_level: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            registry: None,
            registries: None,
            fetch_retries: None,
            fetch_retry_factor: None,
            fetch_retry_mintimeout: None,
            fetch_retry_maxtimeout: None,
            ignore_scripts: None,
            log_level: None,
        }
    }

    /// Adds the new information to the existing configuration to combine data.
    ///
    /// Existing data in `self` has precedence over any incoming data from `rhs`.
    pub fn append(&mut self, rhs: Self) {
        if self.registry.is_none() == true {
            self.registry = rhs.registry;
        }
        // combine '[registries]' table
        match &mut self.registries {
            Some(v) => {
                for (key, val) in rhs.registries.unwrap_or_default() {
                    if v.contains_key(&key) == false {
                        v.insert(key, val);
                    }
                }
            }
            None => self.registries = rhs.registries,
        }
        if self.fetch_retries.is_none() == true {
            self.fetch_retries = rhs.fetch_retries;
        }
        if self.fetch_retry_factor.is_none() == true {
            self.fetch_retry_factor = rhs.fetch_retry_factor;
        }
        if self.fetch_retry_mintimeout.is_none() == true {
            self.fetch_retry_mintimeout = rhs.fetch_retry_mintimeout;
        }
        if self.fetch_retry_maxtimeout.is_none() == true {
            self.fetch_retry_maxtimeout = rhs.fetch_retry_maxtimeout;
        }
        if self.ignore_scripts.is_none() == true {
            self.ignore_scripts = rhs.ignore_scripts;
        }
        if self.log_level.is_none() == true {
            self.log_level = rhs.log_level;
        }
    }

    /// Collects the known registries, including the default registry.
    pub fn get_registries(&self) -> Registries {
        let mut regs = Registries::new();
        if let Some(url) = &self.registry {
            regs.insert(DEFAULT_REGISTRY, url);
        }
        if let Some(table) = &self.registries {
            table.iter().for_each(|(alias, url)| regs.insert(alias, url));
        }
        regs
    }

    pub fn get_retry_policy(&self) -> RetryPolicy {
        let mut policy = RetryPolicy::new();
        if let Some(n) = self.fetch_retries {
            policy = policy.retries(n);
        }
        if let Some(n) = self.fetch_retry_factor {
            policy = policy.factor(n);
        }
        if let Some(ms) = self.fetch_retry_mintimeout {
            policy = policy.min_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.fetch_retry_maxtimeout {
            policy = policy.max_timeout(Duration::from_millis(ms));
        }
        policy
    }

    pub fn get_ignore_scripts(&self) -> bool {
        self.ignore_scripts.unwrap_or(false)
    }

    /// Returns the configured log level, if it names a known level.
    pub fn get_log_level(&self) -> Option<log::LevelFilter> {
        self.log_level
            .as_ref()
            .and_then(|s| log::LevelFilter::from_str(s).ok())
    }
}

impl FromStr for Config {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

impl FromFile for Config {
    fn from_file(path: &PathBuf) -> Result<Self, Fault> {
        // verify the path exists
        if path.is_file() == false {
            return Err(AnyError(format!(
                "failed to locate configuration file \"{}\"",
                path.display()
            )))?;
        }
        let contents = std::fs::read_to_string(&path)?;
        // parse toml syntax
        match Self::from_str(&contents) {
            Ok(r) => Ok(r),
            Err(e) => Err(AnyError(format!(
                "failed to parse \"{}\" file: {}",
                path.display(),
                e
            )))?,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const C_0: &str = r#"
# This is a blank configuration file.
"#;

    const C_1: &str = r#"
registry = "https://mirror.example.test"
fetch-retries = 4
fetch-retry-mintimeout = 50
ignore-scripts = true
log-level = "debug"

[registries]
acme = "https://registry.acme.test/"
"#;

    #[test]
    fn parse_empty_config() {
        assert_eq!(Config::from_str(C_0).unwrap(), Config::new());
        let regs = Config::new().get_registries();
        assert_eq!(regs.get("npm"), Some(DEFAULT_REGISTRY_URL));
        assert_eq!(regs.len(), 1);
    }

    #[test]
    fn parse_basic_config() {
        let cfg = Config::from_str(C_1).unwrap();
        let regs = cfg.get_registries();
        assert_eq!(regs.get("npm"), Some("https://mirror.example.test/"));
        assert_eq!(regs.get("acme"), Some("https://registry.acme.test/"));
        assert_eq!(cfg.get_retry_policy().get_retries(), 4);
        assert_eq!(cfg.get_ignore_scripts(), true);
        assert_eq!(cfg.get_log_level(), Some(log::LevelFilter::Debug));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Config::from_str("fetch_retries = 1").is_err());
        assert!(Config::from_str("colour = true").is_err());
    }

    #[test]
    fn local_overrides_global() {
        let dir = tempfile::tempdir().unwrap();
        let global = dir.path().join(CONFIG_FILE);
        let local = dir.path().join(PROJECT_CONFIG_FILE);
        std::fs::write(
            &global,
            "fetch-retries = 9\nignore-scripts = true\n[registries]\nacme = \"https://g.test/\"\n",
        )
        .unwrap();
        std::fs::write(
            &local,
            "fetch-retries = 1\n[registries]\nacme = \"https://l.test/\"\n",
        )
        .unwrap();
        let cfg: Config = Configs::new()
            .load(global, Locality::Global)
            .unwrap()
            .load(local, Locality::Local)
            .unwrap()
            .into();
        assert_eq!(cfg.get_retry_policy().get_retries(), 1);
        assert_eq!(cfg.get_ignore_scripts(), true);
        assert_eq!(cfg.get_registries().get("acme"), Some("https://l.test/"));
    }

    #[test]
    fn missing_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg: Config = Configs::new()
            .load(dir.path().join(CONFIG_FILE), Locality::Global)
            .unwrap()
            .into();
        assert_eq!(cfg, Config::new());
    }
}

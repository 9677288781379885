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

use crate::core::config::Registries;
use crate::core::depid::DepId;
use crate::core::manifest::Manifest;
use crate::core::resolver::Resolution;
use crate::core::retry::{self, Attempt, RetryPolicy};
use crate::core::spec::Selector;
use crate::core::version::{self, Range, Version};
use crate::error::{Error, Hint, LastError};
use crate::util::anyerror::Fault;
use curl::easy::{Easy, List};
use indexmap::IndexMap;
use serde_derive::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const RESPONSE_OKAY: u32 = 200;

const RESPONSE_NOT_FOUND: u32 = 404;

/// Abbreviated metadata documents are enough to resolve and fetch versions.
const CORGI_ACCEPT: &str =
    "application/vnd.npm.install-v1+json; q=1.0, application/json; q=0.8, */*";

/// Performs a GET request for `url`, retrying transient failures.
pub fn download(url: &str, accept: Option<&str>, policy: &RetryPolicy) -> Result<Vec<u8>, Fault> {
    policy.run(url, || {
        let mut body_bytes = Vec::new();
        let rc = {
            let mut easy = Easy::new();
            let mut setup = || -> Result<(), curl::Error> {
                easy.url(url)?;
                easy.follow_location(true)?;
                easy.useragent(concat!("arbor/", env!("CARGO_PKG_VERSION")))?;
                if let Some(a) = accept {
                    let mut list = List::new();
                    list.append(&format!("Accept: {}", a))?;
                    easy.http_headers(list)?;
                }
                Ok(())
            };
            setup().map_err(|e| Attempt::Permanent(e.into()))?;
            {
                let mut transfer = easy.transfer();
                transfer
                    .write_function(|data| {
                        body_bytes.extend_from_slice(data);
                        Ok(data.len())
                    })
                    .map_err(|e| Attempt::Permanent(e.into()))?;
                if let Err(e) = transfer.perform() {
                    return match retry::is_transient_curl(&e) {
                        true => Err(Attempt::Transient(e.into())),
                        false => Err(Attempt::Permanent(e.into())),
                    };
                }
            }
            easy.response_code()
                .map_err(|e| Attempt::Permanent(e.into()))?
        };
        match rc {
            RESPONSE_OKAY => Ok(body_bytes),
            code => {
                let err: Fault = Box::new(Error::BadResponse(url.to_string(), code));
                match retry::is_transient_status(code) {
                    true => Err(Attempt::Transient(err)),
                    false => Err(Attempt::Permanent(err)),
                }
            }
        }
    })
}

/// The metadata document a registry serves for one package name.
#[derive(Debug, PartialEq, Deserialize)]
pub struct Packument {
    #[serde(default)]
    name: String,
    #[serde(rename = "dist-tags", default)]
    dist_tags: IndexMap<String, String>,
    #[serde(default)]
    versions: IndexMap<String, Value>,
}

impl Packument {
    /// Chooses the version that fulfills `selector`.
    ///
    /// A preferred version wins when it exists and satisfies the range. Next the
    /// `latest` tag is used when it satisfies the range. Otherwise the highest
    /// satisfying version is picked.
    pub fn pick(&self, selector: &Selector, prefer: Option<&Version>) -> Option<(Version, &Value)> {
        let available: Vec<Version> = self
            .versions
            .keys()
            .filter_map(|k| Version::from_str(k).ok())
            .collect();
        let chosen = match selector {
            Selector::Tag(tag) => self
                .dist_tags
                .get(tag)
                .and_then(|v| Version::from_str(v).ok())?,
            Selector::Range(range) => Self::pick_range(&available, range, prefer, self.latest())?,
        };
        let manifest = self.versions.get(&chosen.to_string())?;
        Some((chosen, manifest))
    }

    fn latest(&self) -> Option<Version> {
        self.dist_tags
            .get("latest")
            .and_then(|v| Version::from_str(v).ok())
    }

    fn pick_range(
        available: &[Version],
        range: &Range,
        prefer: Option<&Version>,
        latest: Option<Version>,
    ) -> Option<Version> {
        if let Some(p) = prefer {
            if available.contains(p) == true && version::satisfies(p, range) == true {
                return Some(p.clone());
            }
        }
        if let Some(l) = latest {
            if available.contains(&l) == true && version::satisfies(&l, range) == true {
                return Some(l);
            }
        }
        version::max_satisfying(available.iter(), range).cloned()
    }
}

/// Fetches and caches package metadata from the configured registries.
pub struct RegistryClient {
    registries: Registries,
    policy: RetryPolicy,
    cache: Mutex<HashMap<String, Arc<Packument>>>,
}

impl RegistryClient {
    pub fn new(registries: Registries, policy: RetryPolicy) -> Self {
        Self {
            registries: registries,
            policy: policy,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Forms the metadata url of `name` on the registry at `base`.
    ///
    /// The slash of a scoped name is escaped.
    pub fn packument_url(base: &str, name: &str) -> String {
        format!("{}{}", base, name.replacen('/', "%2f", 1))
    }

    /// Retrieves the metadata document of `name` from the registry `alias`.
    pub fn packument(&self, alias: &str, name: &str) -> Result<Arc<Packument>, Fault> {
        let base = match self.registries.get(alias) {
            Some(b) => b,
            None => {
                return Err(Error::UnknownRegistry(
                    alias.to_string(),
                    Hint::RegistriesTable,
                ))?
            }
        };
        let url = Self::packument_url(base, name);
        if let Ok(cache) = self.cache.lock() {
            if let Some(p) = cache.get(&url) {
                return Ok(p.clone());
            }
        }
        log::debug!("requesting metadata from {}", url);
        let bytes = match download(&url, Some(CORGI_ACCEPT), &self.policy) {
            Ok(b) => b,
            Err(e) => {
                return match e.downcast_ref::<Error>() {
                    Some(Error::BadResponse(_, RESPONSE_NOT_FOUND)) => Err(
                        Error::PackageNotFound(name.to_string(), alias.to_string()),
                    )?,
                    _ => Err(Error::MetadataRetrievalFailed(
                        name.to_string(),
                        LastError(e.to_string()),
                    ))?,
                }
            }
        };
        let doc: Packument = serde_json::from_slice(&bytes).map_err(|e| {
            Error::MetadataRetrievalFailed(name.to_string(), LastError(e.to_string()))
        })?;
        let doc = Arc::new(doc);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(url, doc.clone());
        }
        Ok(doc)
    }

    /// Resolves `package` on registry `alias` to the version chosen by `selector`.
    pub fn resolve(
        &self,
        alias: &str,
        package: &str,
        selector: &Selector,
        prefer: Option<&Version>,
    ) -> Result<Resolution, Fault> {
        let doc = self.packument(alias, package)?;
        let (version, raw) = match doc.pick(selector, prefer) {
            Some(found) => found,
            None => {
                return Err(Error::NoMatchingVersion(
                    package.to_string(),
                    selector.to_string(),
                ))?
            }
        };
        let manifest = Manifest::from_value(raw.clone()).map_err(|e| {
            Error::MetadataRetrievalFailed(package.to_string(), LastError(e.to_string()))
        })?;
        let dist = raw.get("dist");
        let field = |key: &str| {
            dist.and_then(|d| d.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        let name = match doc.name.is_empty() {
            true => package,
            false => doc.name.as_str(),
        };
        Ok(Resolution {
            id: DepId::registry(alias, name, &version.to_string()),
            manifest: manifest,
            integrity: field("integrity"),
            resolved: field("tarball"),
        })
    }
}

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
use crate::core::extgit::ExtGit;
use crate::core::manifest::{FromFile, Manifest, MANIFEST_FILE};
use crate::core::package::{self, Package};
use crate::core::registry::{self, RegistryClient};
use crate::core::retry::RetryPolicy;
use crate::core::spec::{Spec, SpecKind};
use crate::core::tarball;
use crate::core::version::Version;
use crate::error::Error;
use crate::util::anyerror::{AnyError, Fault};
use crate::util::filesystem;
use std::path::{Path, PathBuf};

/// A spec resolved to one concrete package.
#[derive(Debug, PartialEq, Clone)]
pub struct Resolution {
    pub id: DepId,
    pub manifest: Manifest,
    pub integrity: Option<String>,
    pub resolved: Option<String>,
}

impl Resolution {
    pub fn into_package(self) -> Package {
        Package::new(self.id, self.manifest)
            .integrity(self.integrity)
            .resolved(self.resolved)
    }
}

/// Turns a declared spec into a concrete package.
pub trait Resolver: Sync {
    /// Resolves `spec` as declared by a consumer living in the directory `base`.
    ///
    /// `prefer` names a version to keep when it still satisfies the spec.
    fn resolve(&self, spec: &Spec, base: &Path, prefer: Option<&Version>)
        -> Result<Resolution, Fault>;
}

/// Formats a path relative to the project root the way it is stored in ids.
pub fn path_locator(path: &Path, project_root: &Path) -> String {
    filesystem::relative_to(path, project_root)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Chooses the package name from the spec, falling back to the manifest.
fn name_of(spec: &Spec, manifest: &Manifest) -> Result<String, Error> {
    match spec.get_name().is_empty() {
        false => Ok(spec.get_name().to_string()),
        true => match manifest.get_name() {
            Some(n) if n.is_empty() == false => Ok(n.to_string()),
            _ => Err(Error::NoPackageName),
        },
    }
}

/// Resolves specs against registries, git remotes, the filesystem and remote
/// archives.
pub struct PackageResolver {
    project_root: PathBuf,
    registry: RegistryClient,
    git: ExtGit,
}

impl PackageResolver {
    pub fn new(project_root: &Path, registries: Registries, policy: RetryPolicy) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            git: ExtGit::new().policy(policy.clone()),
            registry: RegistryClient::new(registries, policy),
        }
    }

    fn resolve_git(
        &self,
        spec: &Spec,
        remote: &str,
        committish: Option<&str>,
    ) -> Result<Resolution, Fault> {
        let url = ExtGit::clone_url(remote);
        let commit = self.git.resolve(&url, committish)?;
        let tmp = tempfile::tempdir()?;
        let dest = tmp.path().join("package");
        self.git.checkout(&url, &commit, &dest)?;
        let manifest = Manifest::from_file(&dest.join(MANIFEST_FILE))?;
        let name = name_of(spec, &manifest)?;
        Ok(Resolution {
            id: DepId::git(remote, &name, &commit),
            manifest: manifest,
            integrity: None,
            resolved: Some(format!("{}#{}", url, commit)),
        })
    }

    fn resolve_file(&self, spec: &Spec, base: &Path, path: &str) -> Result<Resolution, Fault> {
        let full = filesystem::normalize(&base.join(filesystem::expand_home(path)));
        let locator = path_locator(&full, &self.project_root);
        if full.is_dir() == true {
            let manifest = Manifest::from_file(&full.join(MANIFEST_FILE))?;
            let name = name_of(spec, &manifest)?;
            return Ok(Resolution {
                id: DepId::file(&locator, &name),
                manifest: manifest,
                integrity: None,
                resolved: None,
            });
        }
        if package::is_archive(path) == false {
            return Err(Error::PackageNotFound(
                spec.get_name().to_string(),
                full.display().to_string(),
            ))?;
        }
        let data = std::fs::read(&full).map_err(|e| {
            Error::PackageNotFound(
                spec.get_name().to_string(),
                format!("{} ({})", full.display(), e),
            )
        })?;
        let manifest = tarball::read_manifest(&data)?;
        let name = name_of(spec, &manifest)?;
        Ok(Resolution {
            id: DepId::file(&locator, &name),
            manifest: manifest,
            integrity: Some(tarball::integrity_of(&data)),
            resolved: None,
        })
    }

    fn resolve_remote(&self, spec: &Spec, url: &str) -> Result<Resolution, Fault> {
        let data = registry::download(url, None, self.registry.get_policy())?;
        let manifest = tarball::read_manifest(&data)?;
        let name = name_of(spec, &manifest)?;
        Ok(Resolution {
            id: DepId::remote(url, &name),
            manifest: manifest,
            integrity: Some(tarball::integrity_of(&data)),
            resolved: Some(url.to_string()),
        })
    }
}

impl Resolver for PackageResolver {
    fn resolve(
        &self,
        spec: &Spec,
        base: &Path,
        prefer: Option<&Version>,
    ) -> Result<Resolution, Fault> {
        match spec.get_kind() {
            SpecKind::Registry {
                registry,
                package,
                selector,
            } => {
                if package.is_empty() == true {
                    return Err(Error::NoPackageName)?;
                }
                self.registry.resolve(registry, package, selector, prefer)
            }
            SpecKind::Git { remote, committish } => {
                self.resolve_git(spec, remote, committish.as_deref())
            }
            SpecKind::File { path } => self.resolve_file(spec, base, path),
            SpecKind::Remote { url } => self.resolve_remote(spec, url),
            SpecKind::Workspace { .. } => Err(AnyError(format!(
                "workspace spec {} must be resolved against the project importers",
                spec
            )))?,
        }
    }
}

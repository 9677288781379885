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
use crate::core::depid::OriginKind;
use crate::core::extgit::ExtGit;
use crate::core::package::Package;
use crate::core::registry;
use crate::core::retry::RetryPolicy;
use crate::core::tarball;
use crate::error::{Error, Hint, LastError};
use crate::util::anyerror::Fault;
use std::path::{Path, PathBuf};

/// Obtains the contents of a resolved package.
pub trait Fetcher: Sync {
    /// Places the files of `package` into the directory `dest`.
    fn fetch(&self, package: &Package, dest: &Path) -> Result<(), Fault>;
}

/// Fetches packages from registries, git remotes, remote archives and local
/// archives.
#[derive(Debug, PartialEq, Clone)]
pub struct PackageFetcher {
    project_root: PathBuf,
    registries: Registries,
    policy: RetryPolicy,
    git: ExtGit,
}

impl PackageFetcher {
    pub fn new(project_root: &Path, registries: Registries, policy: RetryPolicy) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            registries: registries,
            git: ExtGit::new().policy(policy.clone()),
            policy: policy,
        }
    }

    /// Computes where the tarball of a registry package is served when the
    /// resolved url was not recorded.
    pub fn tarball_url(base: &str, name: &str, version: &str) -> String {
        let basename = match name.rsplit_once('/') {
            Some((_, b)) => b,
            None => name,
        };
        format!("{}{}/-/{}-{}.tgz", base, name, basename, version)
    }

    fn unpack(&self, package: &Package, data: &[u8], dest: &Path) -> Result<(), Fault> {
        if let Some(integrity) = package.get_integrity() {
            tarball::verify(package.get_name(), data, integrity)?;
        }
        tarball::extract(data, dest)
    }

    fn fetch_registry(&self, package: &Package, dest: &Path) -> Result<(), Fault> {
        let id = package.get_origin();
        let url = match package.get_resolved() {
            Some(url) => url.to_string(),
            None => {
                let alias = id.get_registry().unwrap_or_default();
                let base = match self.registries.get(alias) {
                    Some(b) => b,
                    None => {
                        return Err(Error::UnknownRegistry(
                            alias.to_string(),
                            Hint::RegistriesTable,
                        ))?
                    }
                };
                Self::tarball_url(base, id.get_name(), id.get_version().unwrap_or_default())
            }
        };
        log::debug!("downloading {}", url);
        let data = registry::download(&url, None, &self.policy)?;
        self.unpack(package, &data, dest)
    }
}

impl Fetcher for PackageFetcher {
    fn fetch(&self, package: &Package, dest: &Path) -> Result<(), Fault> {
        let id = package.get_origin();
        let result = match id.get_kind() {
            OriginKind::Registry => self.fetch_registry(package, dest),
            OriginKind::Git => {
                let url = ExtGit::clone_url(id.get_locator());
                self.git
                    .checkout(&url, id.get_version().unwrap_or_default(), dest)
            }
            OriginKind::Remote => registry::download(id.get_locator(), None, &self.policy)
                .and_then(|data| self.unpack(package, &data, dest)),
            OriginKind::File => {
                let archive = self.project_root.join(id.get_locator());
                match std::fs::read(&archive) {
                    Ok(data) => self.unpack(package, &data, dest),
                    Err(e) => Err(e.into()),
                }
            }
            // linked where they live
            OriginKind::Workspace => Ok(()),
        };
        result.map_err(|e| {
            Error::FetchFailed(package.get_key(), LastError(e.to_string())).into()
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::depid::DepId;
    use crate::core::manifest::{FromFile, Manifest, MANIFEST_FILE};

    #[test]
    fn default_tarball_urls() {
        assert_eq!(
            PackageFetcher::tarball_url("https://registry.npmjs.org/", "@s/a", "1.0.0"),
            "https://registry.npmjs.org/@s/a/-/a-1.0.0.tgz"
        );
        assert_eq!(
            PackageFetcher::tarball_url("https://r.test/", "foo", "2.1.0"),
            "https://r.test/foo/-/foo-2.1.0.tgz"
        );
    }

    #[test]
    fn fetch_local_archive() {
        let dir = tempfile::tempdir().unwrap();
        let data = tarball::pack(&[(MANIFEST_FILE, r#"{"name":"z","version":"1.0.0"}"#)]);
        std::fs::write(dir.path().join("z.tgz"), &data).unwrap();
        let fetcher = PackageFetcher::new(dir.path(), Registries::new(), RetryPolicy::new());
        let pkg = Package::new(DepId::file("z.tgz", "z"), Manifest::with("z", "1.0.0"))
            .integrity(Some(tarball::integrity_of(&data)));
        let dest = dir.path().join("out");
        fetcher.fetch(&pkg, &dest).unwrap();
        let m = Manifest::from_file(&dest.join(MANIFEST_FILE)).unwrap();
        assert_eq!(m.get_name(), Some("z"));

        // tampered archives are refused
        let bad = pkg.integrity(Some(tarball::integrity_of(b"other")));
        let err = fetcher.fetch(&bad, &dir.path().join("bad")).unwrap_err();
        assert_eq!(err.to_string().contains("integrity"), true);
    }
}

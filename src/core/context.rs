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

use crate::core::actual::ActualBuilder;
use crate::core::config::{Config, Configs, Locality, Registries, CONFIG_FILE, PROJECT_CONFIG_FILE};
use crate::core::ideal::{AddRequest, IdealBuilder};
use crate::core::lockfile::{self, LockfileDocument};
use crate::core::manifest::{ManifestFile, MANIFEST_FILE};
use crate::core::package::MODULES_DIR;
use crate::core::reify::fetch::PackageFetcher;
use crate::core::reify::remover::BackgroundRemover;
use crate::core::reify::scripts::{ScriptRunner, ShellRunner};
use crate::core::reify::{Reifier, ReifyReport};
use crate::core::resolver::PackageResolver;
use crate::core::retry::RetryPolicy;
use crate::util::anyerror::{at_path, AnyError, Fault};
use crate::util::environment::Environment;
use crate::util::logger;
use std::path::{Path, PathBuf};

/// Everything an operation needs to know about where it runs.
#[derive(Debug, PartialEq)]
pub struct Context {
    home_path: PathBuf,
    project_root: PathBuf,
    config: Config,
}

impl Context {
    pub fn new() -> Context {
        Context {
            home_path: PathBuf::new(),
            project_root: PathBuf::new(),
            config: Config::new(),
        }
    }

    /// Sets the home directory from the environment variable `key`, falling back
    /// to `$HOME/.arbor`. The default directory is created when missing.
    pub fn home(mut self, key: &str) -> Result<Context, Fault> {
        self.home_path = match Environment::read(key) {
            Some(s) => PathBuf::from(s),
            None => {
                let hp = match home::home_dir() {
                    Some(p) => p.join(".arbor"),
                    None => {
                        return Err(AnyError(format!(
                            "failed to detect user's home directory; please set the {} environment variable",
                            key
                        )))?
                    }
                };
                if hp.exists() == false {
                    std::fs::create_dir_all(&hp).map_err(at_path(&hp))?;
                }
                hp
            }
        };
        // do not allow a nonexistent directory to be set for the home
        if self.home_path.exists() == false {
            return Err(AnyError(format!(
                "directory {:?} does not exist for {}",
                self.home_path, key
            )))?;
        }
        Ok(self)
    }

    /// Sets the project root to the nearest directory at or above `dir` that
    /// holds a manifest.
    pub fn project(mut self, dir: &Path) -> Result<Context, Fault> {
        self.project_root = match Self::find_project_root(dir) {
            Some(p) => p,
            None => {
                return Err(AnyError(format!(
                    "no {} found in {:?} or any parent directory",
                    MANIFEST_FILE, dir
                )))?
            }
        };
        Ok(self)
    }

    /// Walks up from `dir` until finding a directory with a manifest.
    pub fn find_project_root(dir: &Path) -> Option<PathBuf> {
        dir.ancestors()
            .find(|p| p.join(MANIFEST_FILE).is_file() == true)
            .map(|p| p.to_path_buf())
    }

    /// Loads the global configuration from the home directory and the project
    /// configuration from the project root. Project values take precedence.
    pub fn settings(mut self) -> Result<Context, Fault> {
        let configs = Configs::new()
            .load(self.home_path.join(CONFIG_FILE), Locality::Global)?
            .load(self.project_root.join(PROJECT_CONFIG_FILE), Locality::Local)?;
        self.config = Config::from(configs);
        Ok(self)
    }

    /// Installs the process logger at the configured level.
    pub fn logger(self) -> Context {
        logger::init(self.config.get_log_level());
        self
    }

    pub fn get_home_path(&self) -> &PathBuf {
        &self.home_path
    }

    pub fn get_project_root(&self) -> &PathBuf {
        &self.project_root
    }

    pub fn get_config(&self) -> &Config {
        &self.config
    }

    pub fn get_registries(&self) -> Registries {
        self.config.get_registries()
    }

    pub fn get_retry_policy(&self) -> RetryPolicy {
        self.config.get_retry_policy()
    }

    pub fn resolver(&self) -> PackageResolver {
        PackageResolver::new(
            &self.project_root,
            self.get_registries(),
            self.get_retry_policy(),
        )
    }

    pub fn fetcher(&self) -> PackageFetcher {
        PackageFetcher::new(
            &self.project_root,
            self.get_registries(),
            self.get_retry_policy(),
        )
    }

    /// Lists the workspace importers declared by the root manifest, relative to
    /// the project root.
    ///
    /// Every entry is a glob-style pattern. Matching directories that hold a
    /// manifest are workspaces, except for those inside a modules directory.
    pub fn workspaces(&self) -> Result<Vec<String>, Fault> {
        let root = ManifestFile::read_dir(&self.project_root)?;
        let match_opts = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let base = glob::Pattern::escape(&self.project_root.to_string_lossy());
        let mut found: Vec<String> = Vec::new();
        for entry in root.get_manifest().get_workspaces() {
            let entry = entry.trim_end_matches('/');
            let pattern = format!("{}/{}", base, entry);
            let paths = glob::glob_with(&pattern, match_opts).map_err(|e| {
                AnyError(format!("invalid workspace pattern {:?}: {}", entry, e))
            })?;
            let mut matched = false;
            for path in paths.filter_map(|p| p.ok()) {
                let rel = match path.strip_prefix(&self.project_root) {
                    Ok(r) => r,
                    Err(_) => continue,
                };
                if rel.components().any(|c| c.as_os_str() == MODULES_DIR) == true
                    || path.join(MANIFEST_FILE).is_file() == false
                {
                    continue;
                }
                matched = true;
                let rel = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<String>>()
                    .join("/");
                if rel.is_empty() == false && found.contains(&rel) == false {
                    found.push(rel);
                }
            }
            if matched == false {
                log::warn!("workspace {:?} matched no directory with a {}", entry, MANIFEST_FILE);
            }
        }
        Ok(found)
    }

    /// Brings the installed dependencies in line with the manifests after
    /// applying the requested additions and removals. Both are keyed by the
    /// importer path.
    pub fn install(
        &self,
        adds: &[(String, AddRequest)],
        removes: &[(String, String)],
    ) -> Result<ReifyReport, Fault> {
        let root = &self.project_root;
        let registries = self.get_registries();
        let workspaces = self.workspaces()?;

        let locked = match LockfileDocument::read(root)? {
            Some(doc) => match lockfile::decode(&doc, root) {
                Ok(g) => Some(g),
                Err(e) => {
                    log::warn!("ignoring lockfile: {}", e);
                    None
                }
            },
            None => None,
        };

        let resolver = self.resolver();
        let manifest = ManifestFile::read_dir(root)?.into_manifest();
        let mut ideal = IdealBuilder::new(root, manifest, registries.clone(), &resolver)
            .locked(locked.as_ref());
        let mut actual = ActualBuilder::new(root, registries).scan_store(true);
        for ws in &workspaces {
            let manifest = ManifestFile::read_dir(&root.join(ws))?.into_manifest();
            ideal = ideal.workspace(ws, manifest);
            actual = actual.workspace(ws);
        }
        for (importer, request) in adds {
            ideal = ideal.add(importer, request.clone());
        }
        for (importer, name) in removes {
            ideal = ideal.remove(importer, name);
        }
        let ideal = ideal.build()?;
        let actual = actual.build()?;

        let fetcher = self.fetcher();
        let runner = ShellRunner::new(root);
        let scripts: Option<&dyn ScriptRunner> = match self.config.get_ignore_scripts() {
            true => None,
            false => Some(&runner),
        };
        let report = Reifier::new(&fetcher, &BackgroundRemover)
            .scripts(scripts)
            .reify(&actual, &ideal)?;
        lockfile::encode(&ideal).write(root)?;
        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn project(manifest: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), manifest).unwrap();
        dir
    }

    #[test]
    fn finds_the_nearest_manifest() {
        let dir = project(r#"{"name":"app"}"#);
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();
        assert_eq!(
            Context::find_project_root(&nested),
            Some(dir.path().to_path_buf())
        );
    }

    #[test]
    fn project_settings_win() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join(CONFIG_FILE),
            "registry = \"https://global.test/\"\nfetch-retries = 5\n",
        )
        .unwrap();
        let dir = project(r#"{"name":"app"}"#);
        std::fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            "registry = \"https://local.test/\"\n",
        )
        .unwrap();
        std::env::set_var("ARBOR_HOME_CONTEXT_TEST", home.path());
        let ctx = Context::new()
            .home("ARBOR_HOME_CONTEXT_TEST")
            .unwrap()
            .project(dir.path())
            .unwrap()
            .settings()
            .unwrap()
            .logger();
        assert_eq!(ctx.get_registries().get("npm"), Some("https://local.test/"));
        assert_eq!(ctx.get_retry_policy(), RetryPolicy::new().retries(5));
    }

    #[test]
    fn workspace_patterns() {
        let dir = project(r#"{"name":"app","workspaces":["packages/*","tools/cli","gone"]}"#);
        for ws in ["packages/b", "packages/a", "tools/cli"] {
            let p = dir.path().join(ws);
            std::fs::create_dir_all(&p).unwrap();
            std::fs::write(p.join(MANIFEST_FILE), r#"{"name":"x"}"#).unwrap();
        }
        std::fs::create_dir_all(dir.path().join("packages/empty")).unwrap();
        let ctx = Context::new().project(dir.path()).unwrap();
        assert_eq!(
            ctx.workspaces().unwrap(),
            vec!["packages/a", "packages/b", "tools/cli"]
        );
    }

    #[test]
    fn workspace_globs() {
        let dir = project(r#"{"name":"app","workspaces":["packages/ui-*","apps/**"]}"#);
        for ws in ["packages/ui-kit", "packages/core", "apps/web/site", "apps/web/site/node_modules/dep"] {
            let p = dir.path().join(ws);
            std::fs::create_dir_all(&p).unwrap();
            std::fs::write(p.join(MANIFEST_FILE), r#"{"name":"x"}"#).unwrap();
        }
        let ctx = Context::new().project(dir.path()).unwrap();
        assert_eq!(
            ctx.workspaces().unwrap(),
            vec!["packages/ui-kit", "apps/web/site"]
        );
    }

    #[test]
    fn install_without_dependencies() {
        let dir = project(r#"{"name":"app","version":"1.0.0"}"#);
        let ctx = Context::new().project(dir.path()).unwrap();
        let report = ctx.install(&[], &[]).unwrap();
        assert_eq!(report.is_noop(), true);
        let doc = LockfileDocument::read(dir.path()).unwrap().unwrap();
        assert_eq!(doc.tree, vec!["; ; 0; 0"]);
        assert_eq!(doc.store.len(), 1);
    }
}

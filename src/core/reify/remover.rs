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

use crate::util::anyerror::{at_path, AnyError, Fault};
use crate::util::filesystem;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Mutex, MutexGuard};

/// Marker inside the names of entries hidden away for deletion.
const HIDDEN_MARKER: &str = ".arbor-rm-";

/// Deletes entries that were already confirmed as garbage.
pub trait DeferredRemover: Sync {
    fn remove(&self, paths: Vec<PathBuf>) -> Result<(), Fault>;
}

/// Hands the entries to a detached process so the caller never waits on a slow
/// recursive delete.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct BackgroundRemover;

impl DeferredRemover for BackgroundRemover {
    fn remove(&self, paths: Vec<PathBuf>) -> Result<(), Fault> {
        if paths.is_empty() == true {
            return Ok(());
        }
        #[cfg(unix)]
        let mut cmd = {
            let mut c = Command::new("rm");
            c.arg("-rf").arg("--").args(&paths);
            c
        };
        #[cfg(windows)]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.arg("/C");
            let mut first = true;
            for p in &paths {
                if first == false {
                    c.arg("&");
                }
                c.args(["rmdir", "/S", "/Q"]).arg(p);
                first = false;
            }
            c
        };
        // the child is intentionally never waited on
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        log::debug!("handed {} entries to background removal", paths.len());
        Ok(())
    }
}

/// Deletes the entries before returning.
#[derive(Debug, PartialEq, Clone, Default)]
pub struct InlineRemover;

impl DeferredRemover for InlineRemover {
    fn remove(&self, paths: Vec<PathBuf>) -> Result<(), Fault> {
        for p in paths {
            filesystem::remove_entry(&p).map_err(at_path(&p))?;
        }
        Ok(())
    }
}

/// Tracks every filesystem change made during one reify so it can be undone.
///
/// Removals are staged by renaming the entry to a hidden sibling. Created
/// entries are remembered so a rollback can delete them again.
#[derive(Debug, Default)]
pub struct RollbackRemove {
    staged: Mutex<Vec<(PathBuf, PathBuf)>>,
    created: Mutex<Vec<PathBuf>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<T>, Fault> {
    m.lock()
        .map_err(|e| AnyError(format!("remover state is poisoned: {}", e)).into())
}

/// Forms the hidden sibling name used while `path` is staged for removal.
fn hidden_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let hidden = format!(
        ".{}{}{}",
        name,
        HIDDEN_MARKER,
        uuid::Uuid::new_v4().simple()
    );
    match path.parent() {
        Some(p) => p.join(hidden),
        None => PathBuf::from(hidden),
    }
}

/// Checks if a directory entry name belongs to an entry staged for removal.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.') == true && name.contains(HIDDEN_MARKER) == true
}

impl RollbackRemove {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages the removal of `path` by moving it to a hidden sibling.
    ///
    /// A path that does not exist is ignored.
    pub fn rm(&self, path: &Path) -> Result<(), Fault> {
        if filesystem::entry_exists(path) == false {
            return Ok(());
        }
        let hidden = hidden_path(path);
        std::fs::rename(path, &hidden).map_err(at_path(path))?;
        log::trace!("staged {:?} for removal", path);
        lock(&self.staged)?.push((path.to_path_buf(), hidden));
        Ok(())
    }

    /// Records that `path` was created during this reify.
    pub fn created(&self, path: &Path) -> Result<(), Fault> {
        lock(&self.created)?.push(path.to_path_buf());
        Ok(())
    }

    /// Creates the directory `dir` and any missing parents, recording the
    /// outermost directory that did not exist before.
    pub fn create_dir_all(&self, dir: &Path) -> Result<(), Fault> {
        let mut outermost = None;
        let mut cur = Some(dir);
        while let Some(p) = cur {
            if filesystem::entry_exists(p) == true {
                break;
            }
            outermost = Some(p);
            cur = p.parent();
        }
        if let Some(top) = outermost {
            std::fs::create_dir_all(dir).map_err(at_path(dir))?;
            self.created(top)?;
        }
        Ok(())
    }

    pub fn is_staged(&self, path: &Path) -> bool {
        match self.staged.lock() {
            Ok(list) => list.iter().any(|(orig, _)| orig == path),
            Err(_) => false,
        }
    }

    pub fn staged_count(&self) -> usize {
        match self.staged.lock() {
            Ok(list) => list.len(),
            Err(_) => 0,
        }
    }

    /// Keeps every change and passes the staged entries on for deletion.
    pub fn confirm(&self, remover: &dyn DeferredRemover) -> Result<(), Fault> {
        let hidden: Vec<PathBuf> = lock(&self.staged)?
            .drain(..)
            .map(|(_, hidden)| hidden)
            .collect();
        lock(&self.created)?.clear();
        remover.remove(hidden)
    }

    /// Undoes every change: created entries are deleted and staged entries are
    /// moved back to their original names.
    pub fn rollback(&self) -> Result<(), Fault> {
        let created: Vec<PathBuf> = lock(&self.created)?.drain(..).collect();
        for p in created.iter().rev() {
            filesystem::remove_entry(p).map_err(at_path(p))?;
        }
        let staged: Vec<(PathBuf, PathBuf)> = lock(&self.staged)?.drain(..).collect();
        for (orig, hidden) in staged.iter().rev() {
            // something may have been placed where the original entry lived
            filesystem::remove_entry(orig).map_err(at_path(orig))?;
            std::fs::rename(hidden, orig).map_err(at_path(hidden))?;
        }
        log::info!(
            "rolled back {} created and {} removed entries",
            created.len(),
            staged.len()
        );
        Ok(())
    }
}

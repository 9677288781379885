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

use std::path::{Component, Path, PathBuf};

/// Lexically removes `.` components and folds `..` components into their parent.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => (),
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => (),
                _ => result.push(".."),
            },
            _ => result.push(c),
        }
    }
    result
}

/// Computes the path that leads from the directory `base` to `path`.
///
/// Both paths are normalized first. They are expected to be both absolute or
/// both relative.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    let path = normalize(path);
    let base = normalize(base);
    let a: Vec<Component> = path.components().collect();
    let b: Vec<Component> = base.components().collect();
    let common = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    let mut result = PathBuf::new();
    for _ in common..b.len() {
        result.push("..");
    }
    for c in &a[common..] {
        result.push(c);
    }
    match result.as_os_str().is_empty() {
        true => PathBuf::from("."),
        false => result,
    }
}

/// Expands a leading `~/` into the user's home directory.
pub fn expand_home(s: &str) -> PathBuf {
    match s.strip_prefix("~/") {
        Some(rest) => match home::home_dir() {
            Some(h) => h.join(rest),
            None => PathBuf::from(s),
        },
        None => PathBuf::from(s),
    }
}

/// Creates a directory link at `link` that points to `target`.
///
/// The link stores a path relative to its own directory so the project can be
/// moved as a whole.
pub fn link_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    let rel = match link.parent() {
        Some(p) => relative_to(target, p),
        None => target.to_path_buf(),
    };
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&rel, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(&rel, link)
    }
}

/// Checks if `link` is a link that already resolves to `target`.
pub fn is_link_to(link: &Path, target: &Path) -> bool {
    let dest = match std::fs::read_link(link) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let resolved = match dest.is_absolute() {
        true => dest,
        false => match link.parent() {
            Some(p) => p.join(dest),
            None => dest,
        },
    };
    normalize(&resolved) == normalize(target)
}

/// Checks if anything (including a broken link) exists at `path`.
pub fn entry_exists(path: &Path) -> bool {
    std::fs::symlink_metadata(path).is_ok()
}

/// Removes whatever exists at `path`: a link, a file, or a directory tree.
///
/// Links are removed without touching what they point to.
pub fn remove_entry(path: &Path) -> std::io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if meta.file_type().is_symlink() == true {
        // windows directory links are removed as directories
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(_) => std::fs::remove_dir(path),
        }
    } else if meta.is_dir() == true {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalize_paths() {
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(normalize(Path::new("../a/b/..")), PathBuf::from("../a"));
        assert_eq!(normalize(Path::new("/..")), PathBuf::from("/"));
    }

    #[test]
    fn relative_paths() {
        assert_eq!(
            relative_to(Path::new("/p/node_modules/.arbor/x"), Path::new("/p/node_modules")),
            PathBuf::from(".arbor/x")
        );
        assert_eq!(
            relative_to(Path::new("/p/libs/a"), Path::new("/p/node_modules/@s")),
            PathBuf::from("../../libs/a")
        );
        assert_eq!(relative_to(Path::new("/p"), Path::new("/p")), PathBuf::from("."));
    }

    #[test]
    fn links_resolve_relative() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("store/a");
        let link = dir.path().join("node_modules/a");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::create_dir_all(link.parent().unwrap()).unwrap();
        link_dir(&target, &link).unwrap();
        assert_eq!(is_link_to(&link, &target), true);
        assert_eq!(is_link_to(&link, &dir.path().join("store/b")), false);
        assert_eq!(std::fs::read_link(&link).unwrap(), PathBuf::from("../store/a"));
        remove_entry(&link).unwrap();
        assert_eq!(entry_exists(&link), false);
        assert_eq!(target.exists(), true);
    }
}

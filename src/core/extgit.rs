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

use crate::core::retry::{self, Attempt, RetryPolicy};
use crate::error::{Error, LastError};
use crate::util::anyerror::Fault;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Calls the git executable as a subprocess.
#[derive(Debug, PartialEq, Clone)]
pub struct ExtGit {
    command: String,
    policy: RetryPolicy,
}

impl ExtGit {
    pub fn new() -> Self {
        Self {
            command: String::from("git"),
            policy: RetryPolicy::new(),
        }
    }

    /// Sets the command for calling git through processes.
    ///
    /// When `s` is `None`, the command assumes git is on path and is simply `git`.
    pub fn command(mut self, s: Option<String>) -> Self {
        self.command = s.unwrap_or(String::from("git"));
        self
    }

    pub fn policy(mut self, p: RetryPolicy) -> Self {
        self.policy = p;
        self
    }

    /// Expands hosted shortcuts (`github:`, `user/repo`, ...) into a cloneable url.
    pub fn clone_url(remote: &str) -> String {
        let remote = remote.trim_start_matches("git+");
        for (prefix, host) in [
            ("github:", "https://github.com/"),
            ("gitlab:", "https://gitlab.com/"),
            ("bitbucket:", "https://bitbucket.org/"),
        ] {
            if let Some(path) = remote.strip_prefix(prefix) {
                return format!("{}{}.git", host, path.trim_end_matches(".git"));
            }
        }
        if remote.contains(':') == false && remote.matches('/').count() == 1 {
            return format!("https://github.com/{}.git", remote.trim_end_matches(".git"));
        }
        remote.to_string()
    }

    /// Runs git with `args` in `dir`, retrying failures git reports as transient.
    fn run(&self, action: &str, url: &str, args: &[&str], dir: &Path) -> Result<String, Fault> {
        self.policy.run(&format!("git {} {}", action, url), || {
            let output = Command::new(&self.command)
                .args(args)
                .current_dir(dir)
                .stdin(Stdio::null())
                .output()
                .map_err(|e| Attempt::Permanent(e.into()))?;
            if output.status.success() == true {
                return Ok(String::from_utf8_lossy(&output.stdout).to_string());
            }
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let err: Fault = Box::new(Error::GitFailed(
                action.to_string(),
                url.to_string(),
                LastError(match output.status.code() {
                    Some(num) => format!("exited with error code {}: {}", num, stderr),
                    None => format!("terminated by signal: {}", stderr),
                }),
            ));
            match retry::is_transient_git(&stderr) {
                true => Err(Attempt::Transient(err)),
                false => Err(Attempt::Permanent(err)),
            }
        })
    }

    /// Lists the references of the repository at `url` as (commit, ref name) pairs.
    pub fn ls_remote(&self, url: &str) -> Result<Vec<(String, String)>, Fault> {
        let cwd = std::env::temp_dir();
        let out = self.run("ls-remote", url, &["ls-remote", url], &cwd)?;
        Ok(Self::parse_refs(&out))
    }

    fn parse_refs(out: &str) -> Vec<(String, String)> {
        out.lines()
            .filter_map(|line| {
                line.split_once('\t')
                    .map(|(sha, name)| (sha.trim().to_string(), name.trim().to_string()))
            })
            .collect()
    }

    /// Finds the commit named by `committish` among the refs of a repository.
    ///
    /// Full commit hashes are accepted as they are. Without a committish the
    /// default branch is used.
    pub fn find_commit(refs: &[(String, String)], committish: Option<&str>) -> Option<String> {
        let wanted = match committish {
            None | Some("") => {
                return refs
                    .iter()
                    .find(|(_, r)| r == "HEAD")
                    .map(|(sha, _)| sha.clone())
            }
            Some(c) => c,
        };
        if wanted.len() == 40 && wanted.chars().all(|c| c.is_ascii_hexdigit()) == true {
            return Some(wanted.to_lowercase());
        }
        // peeled tags point at the commit rather than the tag object
        let candidates = [
            format!("refs/tags/{}^{{}}", wanted),
            format!("refs/tags/{}", wanted),
            format!("refs/heads/{}", wanted),
            wanted.to_string(),
        ];
        candidates.iter().find_map(|name| {
            refs.iter()
                .find(|(_, r)| r == name)
                .map(|(sha, _)| sha.clone())
        })
    }

    /// Resolves `committish` of the repository at `url` to a full commit hash.
    pub fn resolve(&self, url: &str, committish: Option<&str>) -> Result<String, Fault> {
        let refs = self.ls_remote(url)?;
        match Self::find_commit(&refs, committish) {
            Some(sha) => Ok(sha),
            None => Err(Error::GitFailed(
                String::from("ls-remote"),
                url.to_string(),
                LastError(format!(
                    "no ref named {:?} exists",
                    committish.unwrap_or("HEAD")
                )),
            ))?,
        }
    }

    /// Places the tree of `commit` from the repository at `url` into `dest`.
    ///
    /// The repository is cloned into a temporary directory and only the working
    /// tree is copied out.
    pub fn checkout(&self, url: &str, commit: &str, dest: &Path) -> Result<(), Fault> {
        let tmp_path = tempfile::tempdir()?;
        let repo: PathBuf = tmp_path.path().join("repo");
        let repo_str = repo.to_string_lossy().to_string();
        self.run(
            "clone",
            url,
            &["clone", "--quiet", url, &repo_str],
            tmp_path.path(),
        )?;
        self.run(
            "checkout",
            url,
            &["checkout", "--quiet", commit],
            &repo,
        )?;
        std::fs::remove_dir_all(repo.join(".git"))?;
        // create the directories
        std::fs::create_dir_all(&dest)?;
        let mut from_paths = Vec::new();
        for dir_entry in std::fs::read_dir(&repo)? {
            from_paths.push(dir_entry?.path());
        }
        // copy rather than rename because of windows issues
        let options = fs_extra::dir::CopyOptions::new();
        fs_extra::copy_items(&from_paths, &dest, &options)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const REFS: &str = "\
1111111111111111111111111111111111111111\tHEAD
1111111111111111111111111111111111111111\trefs/heads/main
2222222222222222222222222222222222222222\trefs/tags/v1.0.0
3333333333333333333333333333333333333333\trefs/tags/v1.0.0^{}
";

    #[test]
    fn hosted_shortcuts() {
        assert_eq!(ExtGit::clone_url("github:me/pkg"), "https://github.com/me/pkg.git");
        assert_eq!(ExtGit::clone_url("me/pkg"), "https://github.com/me/pkg.git");
        assert_eq!(
            ExtGit::clone_url("git+https://host/me/pkg.git"),
            "https://host/me/pkg.git"
        );
        assert_eq!(ExtGit::clone_url("git@host:me/pkg.git"), "git@host:me/pkg.git");
    }

    #[test]
    fn find_commits() {
        let refs = ExtGit::parse_refs(REFS);
        assert_eq!(refs.len(), 4);
        assert_eq!(
            ExtGit::find_commit(&refs, None).unwrap(),
            "1111111111111111111111111111111111111111"
        );
        assert_eq!(
            ExtGit::find_commit(&refs, Some("v1.0.0")).unwrap(),
            "3333333333333333333333333333333333333333"
        );
        assert_eq!(
            ExtGit::find_commit(&refs, Some("main")).unwrap(),
            "1111111111111111111111111111111111111111"
        );
        assert_eq!(ExtGit::find_commit(&refs, Some("nope")), None);
        assert_eq!(
            ExtGit::find_commit(&refs, Some("ABCDEFABCDEFABCDEFABCDEFABCDEFABCDEFABCD")).unwrap(),
            "abcdefabcdefabcdefabcdefabcdefabcdefabcd"
        );
    }
}

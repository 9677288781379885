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

use colored::Colorize;
use std::{fmt::Display, path::PathBuf};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum Error {
    // resolution errors
    #[error("Trying to add a package but no name was found")]
    NoPackageName,
    #[error("package {0:?} does not exist in registry {1:?}")]
    PackageNotFound(String, String),
    #[error("no version of package {0:?} satisfies {1:?}")]
    NoMatchingVersion(String, String),
    #[error("invalid specifier {0:?}: {1}")]
    InvalidSpec(String, LastError),
    #[error("no workspace named {0:?} exists in this project")]
    WorkspaceNotFound(String),
    #[error("failed to read manifest at {0:?}: {1}")]
    ManifestUnreadable(PathBuf, LastError),
    #[error("manifest at {0:?} is invalid: {1}")]
    ManifestInvalid(PathBuf, LastError),
    // transport errors
    #[error("metadata retrieval failed for {0:?}: {1}")]
    MetadataRetrievalFailed(String, LastError),
    #[error("request to {0:?} failed with response code {1}")]
    BadResponse(String, u32),
    #[error("git {0} failed for {1:?}: {2}")]
    GitFailed(String, String, LastError),
    #[error("integrity check failed for {0:?}: expected {1} but computed {2}")]
    IntegrityMismatch(String, String, String),
    #[error("unsupported integrity algorithm {0:?} for {1:?}")]
    UnsupportedIntegrity(String, String),
    // consistency errors
    #[error("Dependency type not found: {0:?}")]
    DependencyTypeNotFound(String),
    #[error("unresolved registry alias {0:?}{1}")]
    UnknownRegistry(String, Hint),
    #[error("store entry {0:?} was produced by an unknown registry {1:?}{2}")]
    UnknownStoreHost(String, String, Hint),
    #[error("invalid dependency id {0:?}: {1}")]
    InvalidDepId(String, LastError),
    #[error("lockfile tree record {0} is missing its post-order index{1}")]
    LockfileMissingPostOrder(usize, Hint),
    #[error("lockfile tree record {0} is malformed: {1}{2}")]
    LockfileMalformed(usize, String, Hint),
    #[error("lockfile tree record {0} references unknown store entry {1}{2}")]
    LockfileBadReference(usize, usize, Hint),
    // reify errors
    #[error("failed to fetch package {0:?}: {1}")]
    FetchFailed(String, LastError),
    #[error("failed to link {0:?}: {1}")]
    LinkFailed(PathBuf, LastError),
    #[error("script {1:?} of {0:?} exited with error code: {2}")]
    ScriptFailed(String, String, i32),
    #[error("script {1:?} of {0:?} was terminated by signal")]
    ScriptTerminated(String, String),
}

impl Error {
    /// Checks if the error only reports that a package or version is absent from
    /// its origin.
    ///
    /// These failures produce dangling edges during ideal graph building instead
    /// of aborting the build.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PackageNotFound(_, _) | Self::NoMatchingVersion(_, _) => true,
            _ => false,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct LastError(pub String);

impl Display for LastError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Error::lowerize(self.0.to_string()))
    }
}

impl Error {
    pub fn lowerize(s: String) -> String {
        // get the first word
        let first_word = match s.split_whitespace().next() {
            Some(w) => w,
            None => return s,
        };
        // retain punctuation if the first word is all-caps and longer than 1 character
        if first_word.len() > 1
            && first_word
                .chars()
                .find(|c| c.is_ascii_lowercase() == true)
                .is_none()
        {
            s.to_string()
        } else {
            s.char_indices()
                .map(|(i, c)| if i == 0 { c.to_ascii_lowercase() } else { c })
                .collect()
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Hint {
    None,
    RegistriesTable,
    RegenerateLockfile,
}

impl Display for Hint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = match self {
            Self::None => return Ok(()),
            Self::RegistriesTable => {
                "add the alias to the [registries] table in arbor.toml"
            }
            Self::RegenerateLockfile => {
                "delete arbor-lock.json and install again to regenerate it"
            }
        };
        write!(
            f,
            "\n\n{}: {}",
            "hint".green(),
            Error::lowerize(message.to_string())
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lowerize_first_word() {
        assert_eq!(
            Error::lowerize(String::from("Connection refused")),
            "connection refused"
        );
        assert_eq!(
            Error::lowerize(String::from("HTTP error 503")),
            "HTTP error 503"
        );
        assert_eq!(Error::lowerize(String::new()), "");
    }

    #[test]
    fn required_messages() {
        assert_eq!(
            Error::NoPackageName.to_string(),
            "Trying to add a package but no name was found"
        );
        assert!(Error::DependencyTypeNotFound(String::from("bogus"))
            .to_string()
            .starts_with("Dependency type not found"));
    }

    #[test]
    fn not_found_classification() {
        assert_eq!(
            Error::PackageNotFound(String::from("a"), String::from("npm")).is_not_found(),
            true
        );
        assert_eq!(
            Error::MetadataRetrievalFailed(String::from("a"), LastError(String::from("x")))
                .is_not_found(),
            false
        );
    }
}

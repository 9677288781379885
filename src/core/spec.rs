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
use crate::core::depid::{self, DEFAULT_REGISTRY};
use crate::core::version::{Range, Version};
use crate::error::{Error, Hint, LastError};
use std::fmt::Display;
use std::str::FromStr;

/// How a registry spec selects its version.
#[derive(Debug, PartialEq, Clone)]
pub enum Selector {
    Range(Range),
    Tag(String),
}

impl Selector {
    fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if s.is_empty() == true {
            return Ok(Self::Range(Range::any()));
        }
        match Range::from_str(s) {
            Ok(r) => Ok(Self::Range(r)),
            Err(e) => match is_tag(s) {
                true => Ok(Self::Tag(s.to_string())),
                false => Err(Error::InvalidSpec(s.to_string(), LastError(e.to_string()))),
            },
        }
    }

    /// Checks if a concrete `version` is acceptable to this selector.
    ///
    /// Tags are resolved outside the range algebra, so any version is accepted.
    pub fn accepts(&self, version: &Version) -> bool {
        match self {
            Self::Range(r) => r.matches(version),
            Self::Tag(_) => true,
        }
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Range(r) => write!(f, "{}", r),
            Self::Tag(t) => write!(f, "{}", t),
        }
    }
}

fn is_tag(s: &str) -> bool {
    s.chars().next().map_or(false, |c| c.is_ascii_alphabetic())
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

#[derive(Debug, PartialEq, Clone)]
pub enum SpecKind {
    Registry {
        registry: String,
        package: String,
        selector: Selector,
    },
    Git {
        remote: String,
        committish: Option<String>,
    },
    File {
        path: String,
    },
    Remote {
        url: String,
    },
    Workspace {
        selector: String,
    },
}

/// A declared dependency specifier: the name it is installed under and the
/// bare text that describes where it comes from.
#[derive(Debug, PartialEq, Clone)]
pub struct Spec {
    name: String,
    bare: String,
    kind: SpecKind,
}

impl Spec {
    /// Classifies the `bare` specifier declared for dependency `name`.
    pub fn parse(name: &str, bare: &str, registries: &Registries) -> Result<Self, Error> {
        let bare = bare.trim();
        let kind = if let Some(path) = bare.strip_prefix("file:") {
            SpecKind::File {
                path: path.to_string(),
            }
        } else if bare.starts_with("./")
            || bare.starts_with("../")
            || bare.starts_with('/')
            || bare.starts_with("~/")
            || bare == "."
            || bare == ".."
        {
            SpecKind::File {
                path: bare.to_string(),
            }
        } else if let Some(sel) = bare.strip_prefix("workspace:") {
            SpecKind::Workspace {
                selector: sel.to_string(),
            }
        } else if Self::is_git(bare) == true {
            let (remote, committish) = match bare.split_once('#') {
                Some((r, c)) => (r, Some(c.to_string())),
                None => (bare, None),
            };
            SpecKind::Git {
                remote: remote.trim_start_matches("git+").to_string(),
                committish: committish,
            }
        } else if bare.starts_with("https://") || bare.starts_with("http://") {
            SpecKind::Remote {
                url: bare.to_string(),
            }
        } else if let Some((alias, rest)) = Self::split_alias(bare) {
            if registries.get(alias).is_none() {
                return Err(Error::UnknownRegistry(
                    alias.to_string(),
                    Hint::RegistriesTable,
                ));
            }
            let (package, selector) = depid::split_name(rest);
            if package.is_empty() == true {
                return Err(Error::InvalidSpec(
                    bare.to_string(),
                    LastError(String::from("missing package name after registry alias")),
                ));
            }
            SpecKind::Registry {
                registry: alias.to_string(),
                package: package.to_string(),
                selector: Selector::parse(selector.unwrap_or(""))?,
            }
        } else {
            SpecKind::Registry {
                registry: DEFAULT_REGISTRY.to_string(),
                package: name.to_string(),
                selector: Selector::parse(bare)?,
            }
        };
        Ok(Self {
            name: name.to_string(),
            bare: bare.to_string(),
            kind: kind,
        })
    }

    /// Classifies text in the `name@bare` form.
    pub fn parse_full(text: &str, registries: &Registries) -> Result<Self, Error> {
        let (name, bare) = depid::split_name(text.trim());
        Self::parse(name, bare.unwrap_or(""), registries)
    }

    fn is_git(bare: &str) -> bool {
        if bare.starts_with("git+")
            || bare.starts_with("git:")
            || bare.starts_with("git@")
            || bare.starts_with("github:")
            || bare.starts_with("gitlab:")
            || bare.starts_with("bitbucket:")
        {
            return true;
        }
        let without_ref = bare.split('#').next().unwrap_or(bare);
        if without_ref.ends_with(".git") == true {
            return true;
        }
        // "user/repo" is shorthand for a github repository
        match without_ref.split_once('/') {
            Some((user, repo)) => {
                bare.starts_with('@') == false
                    && without_ref.contains(':') == false
                    && user.is_empty() == false
                    && repo.is_empty() == false
                    && repo.contains('/') == false
            }
            None => false,
        }
    }

    /// Splits a `<alias>:<name>@<selector>` specifier.
    fn split_alias(bare: &str) -> Option<(&str, &str)> {
        let (alias, rest) = bare.split_once(':')?;
        match alias.is_empty() == false
            && alias
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            true => Some((alias, rest)),
            false => None,
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_bare(&self) -> &str {
        &self.bare
    }

    pub fn get_kind(&self) -> &SpecKind {
        &self.kind
    }

    /// Renames the dependency while keeping the same specifier.
    ///
    /// Used when an unnamed request learns its name from the resolved manifest.
    pub fn with_name(mut self, name: &str) -> Self {
        if let SpecKind::Registry { package, .. } = &mut self.kind {
            if package.is_empty() == true {
                *package = name.to_string();
            }
        }
        self.name = name.to_string();
        self
    }

    /// Checks if a node reached by this spec with the given `version` still
    /// fulfills it.
    ///
    /// Only registry specs constrain versions. Every other kind is satisfied by
    /// identity.
    pub fn accepts(&self, version: Option<&Version>) -> bool {
        match &self.kind {
            SpecKind::Registry { selector, .. } => match version {
                Some(v) => selector.accepts(v),
                None => false,
            },
            _ => true,
        }
    }

    /// Returns the specifier text to persist into a manifest once the spec
    /// resolved to `version`.
    ///
    /// Registry specs without an explicit range are saved as a caret range.
    pub fn to_saved(&self, version: Option<&Version>) -> String {
        match (&self.kind, version) {
            (SpecKind::Registry { selector, .. }, Some(v)) => {
                let empty = self.bare.trim().is_empty();
                match (selector, empty) {
                    (Selector::Tag(_), _) | (_, true) => match self.bare.split_once(':') {
                        Some((alias, rest)) if Self::split_alias(&self.bare).is_some() => {
                            format!("{}:{}@^{}", alias, depid::split_name(rest).0, v)
                        }
                        _ => format!("^{}", v),
                    },
                    _ => self.bare.clone(),
                }
            }
            _ => self.bare.clone(),
        }
    }
}

impl Display for Spec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.bare)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn regs() -> Registries {
        let mut r = Registries::new();
        r.insert("acme", "https://registry.acme.test/");
        r
    }

    #[test]
    fn registry_ranges_and_tags() {
        let s = Spec::parse("foo", "^1.0.0", &regs()).unwrap();
        assert_eq!(s.to_string(), "foo@^1.0.0");
        match s.get_kind() {
            SpecKind::Registry {
                registry,
                package,
                selector,
            } => {
                assert_eq!(registry, "npm");
                assert_eq!(package, "foo");
                assert_eq!(selector.to_string(), "^1.0.0");
            }
            _ => panic!("expected registry spec"),
        }
        let s = Spec::parse("foo", "latest", &regs()).unwrap();
        assert_eq!(
            s.get_kind(),
            &SpecKind::Registry {
                registry: String::from("npm"),
                package: String::from("foo"),
                selector: Selector::Tag(String::from("latest")),
            }
        );
        assert!(Spec::parse("foo", "!!", &regs()).is_err());
    }

    #[test]
    fn aliased_registries() {
        let s = Spec::parse("bar", "npm:foo@^2", &regs()).unwrap();
        match s.get_kind() {
            SpecKind::Registry { package, .. } => assert_eq!(package, "foo"),
            _ => panic!("expected registry spec"),
        }
        let s = Spec::parse("foo", "acme:foo@1.2.3", &regs()).unwrap();
        match s.get_kind() {
            SpecKind::Registry { registry, .. } => assert_eq!(registry, "acme"),
            _ => panic!("expected registry spec"),
        }
        assert_eq!(
            Spec::parse("foo", "nowhere:foo@1", &regs()).unwrap_err(),
            Error::UnknownRegistry(String::from("nowhere"), Hint::RegistriesTable)
        );
    }

    #[test]
    fn other_origins() {
        let r = regs();
        assert_eq!(
            Spec::parse("a", "file:../a", &r).unwrap().get_kind(),
            &SpecKind::File {
                path: String::from("../a")
            }
        );
        assert_eq!(
            Spec::parse("a", "./vendor/a.tgz", &r).unwrap().get_kind(),
            &SpecKind::File {
                path: String::from("./vendor/a.tgz")
            }
        );
        assert_eq!(
            Spec::parse("a", "github:me/a#v1.0.0", &r).unwrap().get_kind(),
            &SpecKind::Git {
                remote: String::from("github:me/a"),
                committish: Some(String::from("v1.0.0"))
            }
        );
        assert_eq!(
            Spec::parse("a", "git+https://host/a.git", &r).unwrap().get_kind(),
            &SpecKind::Git {
                remote: String::from("https://host/a.git"),
                committish: None
            }
        );
        assert_eq!(
            Spec::parse("a", "me/a", &r).unwrap().get_kind(),
            &SpecKind::Git {
                remote: String::from("me/a"),
                committish: None
            }
        );
        assert_eq!(
            Spec::parse("a", "https://host/a.tgz", &r).unwrap().get_kind(),
            &SpecKind::Remote {
                url: String::from("https://host/a.tgz")
            }
        );
        assert_eq!(
            Spec::parse("a", "workspace:*", &r).unwrap().get_kind(),
            &SpecKind::Workspace {
                selector: String::from("*")
            }
        );
    }

    #[test]
    fn parse_full_text() {
        let s = Spec::parse_full("@scope/x@~1.2", &regs()).unwrap();
        assert_eq!(s.get_name(), "@scope/x");
        assert_eq!(s.get_bare(), "~1.2");
        let s = Spec::parse_full("x", &regs()).unwrap();
        assert_eq!(s.get_bare(), "");
    }

    #[test]
    fn saved_form() {
        let v = Version::from_str("1.4.0").unwrap();
        let r = regs();
        assert_eq!(Spec::parse("a", "", &r).unwrap().to_saved(Some(&v)), "^1.4.0");
        assert_eq!(Spec::parse("a", "latest", &r).unwrap().to_saved(Some(&v)), "^1.4.0");
        assert_eq!(Spec::parse("a", "~1.3", &r).unwrap().to_saved(Some(&v)), "~1.3");
        assert_eq!(
            Spec::parse("a", "acme:a@latest", &r).unwrap().to_saved(Some(&v)),
            "acme:a@^1.4.0"
        );
        assert_eq!(Spec::parse("a", "file:../a", &r).unwrap().to_saved(None), "file:../a");
    }

    #[test]
    fn accepts_versions() {
        let r = regs();
        let v = Version::from_str("1.4.0").unwrap();
        assert_eq!(Spec::parse("a", "^1", &r).unwrap().accepts(Some(&v)), true);
        assert_eq!(Spec::parse("a", "^2", &r).unwrap().accepts(Some(&v)), false);
        assert_eq!(Spec::parse("a", "^2", &r).unwrap().accepts(None), false);
        assert_eq!(Spec::parse("a", "file:../a", &r).unwrap().accepts(None), true);
    }
}

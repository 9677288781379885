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

//! Canonical identity of a resolved package occurrence.
//!
//! A `DepId` is written as `<kind>·<locator>·<tail>` where every component is
//! percent-encoded, which makes the string safe to use both as a graph key and
//! as a single filesystem path segment inside the store.

use crate::error::{Error, LastError};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de;
use serde::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

/// Separates the three components of an encoded id.
pub const DELIMITER: char = '·';

/// Alias of the registry used when a spec does not name one.
pub const DEFAULT_REGISTRY: &str = "npm";

/// Characters that cannot appear raw within a path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'/')
    .add(b'\\')
    .add(b':')
    .add(b'*')
    .add(b'?')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'|')
    .add(b';')
    .add(b'%');

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum OriginKind {
    Registry,
    Git,
    File,
    Remote,
    Workspace,
}

impl Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Registry => "registry",
                Self::Git => "git",
                Self::File => "file",
                Self::Remote => "remote",
                Self::Workspace => "workspace",
            }
        )
    }
}

impl FromStr for OriginKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registry" => Ok(Self::Registry),
            "git" => Ok(Self::Git),
            "file" => Ok(Self::File),
            "remote" => Ok(Self::Remote),
            "workspace" => Ok(Self::Workspace),
            _ => Err(Error::InvalidDepId(
                s.to_string(),
                LastError(format!("unknown origin kind {:?}", s)),
            )),
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct DepId {
    kind: OriginKind,
    locator: String,
    tail: String,
}

impl DepId {
    /// Identifies `name@version` hosted on the registry known by `alias`.
    ///
    /// The default registry is stored with an empty locator.
    pub fn registry(alias: &str, name: &str, version: &str) -> Self {
        Self {
            kind: OriginKind::Registry,
            locator: match alias == DEFAULT_REGISTRY {
                true => String::new(),
                false => alias.to_string(),
            },
            tail: format!("{}@{}", name, version),
        }
    }

    pub fn git(remote: &str, name: &str, committish: &str) -> Self {
        Self {
            kind: OriginKind::Git,
            locator: remote.to_string(),
            tail: format!("{}@{}", name, committish),
        }
    }

    pub fn file(path: &str, name: &str) -> Self {
        Self {
            kind: OriginKind::File,
            locator: path.to_string(),
            tail: name.to_string(),
        }
    }

    pub fn remote(url: &str, name: &str) -> Self {
        Self {
            kind: OriginKind::Remote,
            locator: url.to_string(),
            tail: name.to_string(),
        }
    }

    pub fn workspace(path: &str, name: &str) -> Self {
        Self {
            kind: OriginKind::Workspace,
            locator: path.to_string(),
            tail: name.to_string(),
        }
    }

    /// Identity of the project root importer.
    pub fn root(name: &str) -> Self {
        Self::file(".", name)
    }

    pub fn get_kind(&self) -> OriginKind {
        self.kind
    }

    pub fn get_locator(&self) -> &str {
        &self.locator
    }

    /// Returns the registry alias for registry ids, substituting the default alias
    /// when the locator is empty.
    pub fn get_registry(&self) -> Option<&str> {
        match self.kind {
            OriginKind::Registry => match self.locator.is_empty() {
                true => Some(DEFAULT_REGISTRY),
                false => Some(&self.locator),
            },
            _ => None,
        }
    }

    /// References the package name encoded in the tail.
    pub fn get_name(&self) -> &str {
        match self.kind {
            OriginKind::Registry | OriginKind::Git => split_name(&self.tail).0,
            _ => &self.tail,
        }
    }

    /// References the version (registry) or committish (git) encoded in the tail.
    pub fn get_version(&self) -> Option<&str> {
        match self.kind {
            OriginKind::Registry | OriginKind::Git => split_name(&self.tail).1,
            _ => None,
        }
    }

    /// Encodes the id into its canonical string.
    pub fn encode(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.kind,
            utf8_percent_encode(&self.locator, SEGMENT),
            utf8_percent_encode(&self.tail, SEGMENT),
            d = DELIMITER
        )
    }

    /// Decodes an id from its canonical string.
    ///
    /// This is the exact inverse of `encode`.
    pub fn decode(s: &str) -> Result<Self, Error> {
        let fields: Vec<&str> = s.split(DELIMITER).collect();
        if fields.len() != 3 {
            return Err(Error::InvalidDepId(
                s.to_string(),
                LastError(format!("expected 3 fields but found {}", fields.len())),
            ));
        }
        let unescape = |field: &str| -> Result<String, Error> {
            match percent_decode_str(field).decode_utf8() {
                Ok(c) => Ok(c.to_string()),
                Err(e) => Err(Error::InvalidDepId(s.to_string(), LastError(e.to_string()))),
            }
        };
        let kind = match OriginKind::from_str(fields[0]) {
            Ok(k) => k,
            Err(_) => {
                return Err(Error::InvalidDepId(
                    s.to_string(),
                    LastError(format!("unknown origin kind {:?}", fields[0])),
                ))
            }
        };
        let id = Self {
            kind: kind,
            locator: unescape(fields[1])?,
            tail: unescape(fields[2])?,
        };
        if id.get_name().is_empty() == true && id != Self::root("") {
            return Err(Error::InvalidDepId(
                s.to_string(),
                LastError(String::from("missing package name")),
            ));
        }
        Ok(id)
    }
}

/// Splits `name@version` at the '@' that follows the (possibly scoped) name.
pub fn split_name(s: &str) -> (&str, Option<&str>) {
    let search_from = match s.starts_with('@') {
        true => 1,
        false => 0,
    };
    match s[search_from..].find('@') {
        Some(i) => (&s[..search_from + i], Some(&s[search_from + i + 1..])),
        None => (s, None),
    }
}

impl Display for DepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for DepId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl<'de> Deserialize<'de> for DepId {
    fn deserialize<D>(deserializer: D) -> Result<DepId, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct LayerVisitor;

        impl<'de> de::Visitor<'de> for LayerVisitor {
            type Value = DepId;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("an encoded dependency id")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match DepId::decode(v) {
                    Ok(r) => Ok(r),
                    Err(e) => Err(de::Error::custom(e)),
                }
            }
        }

        deserializer.deserialize_str(LayerVisitor)
    }
}

impl Serialize for DepId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.encode())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encode_registry_default() {
        let id = DepId::registry("npm", "foo", "1.0.0");
        assert_eq!(id.encode(), "registry··foo@1.0.0");
        assert_eq!(id.get_registry(), Some("npm"));
        assert_eq!(id.get_name(), "foo");
        assert_eq!(id.get_version(), Some("1.0.0"));
    }

    #[test]
    fn scoped_names_are_path_safe() {
        let id = DepId::registry("npm", "@scope/pkg", "2.1.0-beta.1");
        let s = id.encode();
        assert_eq!(s, "registry··@scope%2Fpkg@2.1.0-beta.1");
        assert_eq!(s.contains('/'), false);
        assert_eq!(id.get_name(), "@scope/pkg");
        assert_eq!(DepId::decode(&s).unwrap(), id);
    }

    #[test]
    fn origin_is_part_of_identity() {
        let a = DepId::registry("npm", "foo", "1.0.0");
        let b = DepId::registry("acme", "foo", "1.0.0");
        let c = DepId::registry("internal", "foo", "1.0.0");
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(b.encode(), c.encode());
        assert_eq!(b.get_registry(), Some("acme"));
    }

    #[test]
    fn decode_inverts_encode() {
        let ids = vec![
            DepId::git("github:a/b", "b", "0123abc"),
            DepId::file("../libs/my lib", "my-lib"),
            DepId::remote("https://example.com/x.tgz?a=1", "x"),
            DepId::workspace("packages/a", "a"),
            DepId::root("proj"),
        ];
        for id in ids {
            let s = id.encode();
            assert_eq!(s.matches(DELIMITER).count(), 2);
            assert_eq!(s.contains('/'), false);
            assert_eq!(DepId::from_str(&s).unwrap(), id);
        }
    }

    #[test]
    fn delimiter_within_component_is_escaped() {
        let id = DepId::file("odd·dir", "x");
        assert_eq!(DepId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn semicolons_are_escaped() {
        let id = DepId::remote("https://host/x.tgz;v=1", "x");
        assert_eq!(id.encode().contains(';'), false);
        assert_eq!(DepId::decode(&id.encode()).unwrap(), id);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(DepId::decode("registry·foo@1.0.0").is_err());
        assert!(DepId::decode("tarball··foo@1.0.0").is_err());
        assert!(DepId::decode("registry··").is_err());
        assert!(DepId::decode("registry··%FF@1").is_err());
    }

    #[test]
    fn split_scoped() {
        assert_eq!(split_name("@a/b@1.0.0"), ("@a/b", Some("1.0.0")));
        assert_eq!(split_name("a@^1"), ("a", Some("^1")));
        assert_eq!(split_name("@a/b"), ("@a/b", None));
        assert_eq!(split_name("a@npm:b@1"), ("a", Some("npm:b@1")));
    }
}

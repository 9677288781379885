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

use crate::core::manifest::Manifest;
use crate::error::Error;
use indexmap::IndexMap;
use std::fmt::Display;
use std::str::FromStr;

/// The relationship an edge expresses between a consumer and its dependency.
///
/// Computed once when an edge is constructed.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DependencyType {
    Prod,
    Dev,
    Peer,
    PeerOptional,
    Optional,
}

impl DependencyType {
    /// Manifest fields in the order they are collected.
    pub const FIELDS: [&'static str; 4] = [
        "dependencies",
        "optionalDependencies",
        "devDependencies",
        "peerDependencies",
    ];

    pub fn from_short(s: &str) -> Result<Self, Error> {
        match s {
            "prod" => Ok(Self::Prod),
            "dev" => Ok(Self::Dev),
            "peer" => Ok(Self::Peer),
            "peerOptional" => Ok(Self::PeerOptional),
            "optional" => Ok(Self::Optional),
            _ => Err(Error::DependencyTypeNotFound(s.to_string())),
        }
    }

    pub fn as_short(&self) -> &'static str {
        match self {
            Self::Prod => "prod",
            Self::Dev => "dev",
            Self::Peer => "peer",
            Self::PeerOptional => "peerOptional",
            Self::Optional => "optional",
        }
    }

    /// Maps a manifest field name to its type.
    ///
    /// Peers map to `Peer`. Whether a peer is optional depends on its metadata.
    pub fn from_field(s: &str) -> Option<Self> {
        match s {
            "dependencies" => Some(Self::Prod),
            "devDependencies" => Some(Self::Dev),
            "peerDependencies" => Some(Self::Peer),
            "optionalDependencies" => Some(Self::Optional),
            _ => None,
        }
    }

    /// Names the manifest field an edge of this type is declared in.
    pub fn as_field(&self) -> &'static str {
        match self {
            Self::Prod => "dependencies",
            Self::Dev => "devDependencies",
            Self::Peer | Self::PeerOptional => "peerDependencies",
            Self::Optional => "optionalDependencies",
        }
    }

    pub fn is_dev(&self) -> bool {
        self == &Self::Dev
    }

    pub fn is_optional(&self) -> bool {
        match self {
            Self::Optional | Self::PeerOptional => true,
            _ => false,
        }
    }

    pub fn is_peer_optional(&self) -> bool {
        self == &Self::PeerOptional
    }
}

impl Display for DependencyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_short())
    }
}

impl FromStr for DependencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_short(s)
    }
}

/// A dependency as declared by a manifest.
#[derive(Debug, PartialEq, Clone)]
pub struct Declared {
    pub bare: String,
    pub dep_type: DependencyType,
}

/// Collects the dependencies a manifest declares, keyed by name.
///
/// `devDependencies` are only included when `include_dev` is set, which is the
/// case for importers. An optional entry replaces a production entry of the same
/// name. Otherwise the first declaration wins.
pub fn collect(manifest: &Manifest, include_dev: bool) -> IndexMap<String, Declared> {
    let mut map: IndexMap<String, Declared> = IndexMap::new();
    for field in DependencyType::FIELDS {
        let base = match DependencyType::from_field(field) {
            Some(t) => t,
            None => continue,
        };
        if base == DependencyType::Dev && include_dev == false {
            continue;
        }
        for (name, bare) in manifest.get_dependencies(field) {
            let dep_type = match base {
                DependencyType::Peer if manifest.is_peer_optional(name) == true => {
                    DependencyType::PeerOptional
                }
                _ => base,
            };
            let entry = Declared {
                bare: bare.to_string(),
                dep_type: dep_type,
            };
            match map.get(name) {
                None => {
                    map.insert(name.to_string(), entry);
                }
                Some(existing) => {
                    if existing.dep_type == DependencyType::Prod
                        && dep_type == DependencyType::Optional
                    {
                        map.insert(name.to_string(), entry);
                    }
                }
            }
        }
    }
    map
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn short_tags() {
        for t in [
            DependencyType::Prod,
            DependencyType::Dev,
            DependencyType::Peer,
            DependencyType::PeerOptional,
            DependencyType::Optional,
        ] {
            assert_eq!(DependencyType::from_short(t.as_short()).unwrap(), t);
        }
        assert_eq!(
            DependencyType::from_short("bogus").unwrap_err(),
            Error::DependencyTypeNotFound(String::from("bogus"))
        );
    }

    #[test]
    fn field_bijection() {
        for field in DependencyType::FIELDS {
            assert_eq!(DependencyType::from_field(field).unwrap().as_field(), field);
        }
        assert_eq!(DependencyType::PeerOptional.as_field(), "peerDependencies");
        assert_eq!(DependencyType::from_field("bundledDependencies"), None);
    }

    #[test]
    fn derived_flags() {
        assert_eq!(DependencyType::Dev.is_dev(), true);
        assert_eq!(DependencyType::PeerOptional.is_optional(), true);
        assert_eq!(DependencyType::Optional.is_optional(), true);
        assert_eq!(DependencyType::Peer.is_optional(), false);
        assert_eq!(DependencyType::PeerOptional.is_peer_optional(), true);
    }

    #[test]
    fn collection_rules() {
        let m = Manifest::from_str(
            r#"{
            "dependencies": { "a": "^1", "b": "^1" },
            "optionalDependencies": { "b": "^2" },
            "devDependencies": { "a": "^3", "c": "^1" },
            "peerDependencies": { "d": "*", "e": "*" },
            "peerDependenciesMeta": { "e": { "optional": true } }
        }"#,
        )
        .unwrap();
        let deps = collect(&m, true);
        let got: Vec<(&str, &str, DependencyType)> = deps
            .iter()
            .map(|(k, v)| (k.as_str(), v.bare.as_str(), v.dep_type))
            .collect();
        assert_eq!(
            got,
            vec![
                ("a", "^1", DependencyType::Prod),
                ("b", "^2", DependencyType::Optional),
                ("c", "^1", DependencyType::Dev),
                ("d", "*", DependencyType::Peer),
                ("e", "*", DependencyType::PeerOptional),
            ]
        );
        let deps = collect(&m, false);
        assert_eq!(deps.contains_key("c"), false);
        assert_eq!(deps.len(), 4);
    }
}

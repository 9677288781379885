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

use crate::core::dependency::DependencyType;
use crate::core::version::Version;
use crate::error::{Error, LastError};
use crate::util::anyerror::{AnyError, Fault};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const MANIFEST_FILE: &str = "package.json";

pub trait FromFile: FromStr
where
    Self: Sized,
{
    fn from_file(path: &PathBuf) -> Result<Self, Fault>;
}

/// A parsed `package.json` document.
///
/// The raw document is kept so unknown fields and their order survive a
/// read/write cycle.
#[derive(Debug, PartialEq, Clone)]
pub struct Manifest {
    data: Map<String, Value>,
}

impl Manifest {
    pub fn new() -> Self {
        Self { data: Map::new() }
    }

    /// Creates a manifest holding only a `name` and `version`.
    pub fn with(name: &str, version: &str) -> Self {
        let mut data = Map::new();
        data.insert(String::from("name"), Value::String(name.to_string()));
        if version.is_empty() == false {
            data.insert(String::from("version"), Value::String(version.to_string()));
        }
        Self { data: data }
    }

    pub fn from_value(value: Value) -> Result<Self, AnyError> {
        match value {
            Value::Object(map) => Ok(Self { data: map }),
            _ => Err(AnyError(String::from("manifest is not a json object"))),
        }
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.data.clone())
    }

    pub fn get_name(&self) -> Option<&str> {
        self.data.get("name").and_then(|v| v.as_str())
    }

    /// Returns the raw version text.
    pub fn get_version_str(&self) -> Option<&str> {
        self.data.get("version").and_then(|v| v.as_str())
    }

    /// Returns the version when it is a valid semantic version.
    pub fn get_version(&self) -> Option<Version> {
        self.get_version_str()
            .and_then(|s| Version::from_str(s.trim()).ok())
    }

    /// Lists the string entries of the dependency table `field`.
    ///
    /// Entries whose value is not a string are ignored.
    pub fn get_dependencies(&self, field: &str) -> Vec<(&str, &str)> {
        match self.data.get(field).and_then(|v| v.as_object()) {
            Some(table) => table
                .iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.as_str(), s)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Checks if `name` is marked optional in `peerDependenciesMeta`.
    pub fn is_peer_optional(&self, name: &str) -> bool {
        self.data
            .get("peerDependenciesMeta")
            .and_then(|m| m.get(name))
            .and_then(|m| m.get("optional"))
            .and_then(|o| o.as_bool())
            .unwrap_or(false)
    }

    pub fn get_script(&self, name: &str) -> Option<&str> {
        self.data
            .get("scripts")
            .and_then(|s| s.get(name))
            .and_then(|s| s.as_str())
    }

    /// Lists the workspace paths declared by the manifest.
    ///
    /// Accepts both the array form and the `{ "packages": [...] }` form.
    pub fn get_workspaces(&self) -> Vec<&str> {
        let list = match self.data.get("workspaces") {
            Some(Value::Array(a)) => Some(a),
            Some(Value::Object(o)) => o.get("packages").and_then(|p| p.as_array()),
            _ => None,
        };
        match list {
            Some(a) => a.iter().filter_map(|v| v.as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Sets `name` to `bare` in the dependency table for `dep_type`.
    ///
    /// The entry is removed from every other dependency table first.
    pub fn set_dependency(&mut self, name: &str, bare: &str, dep_type: DependencyType) {
        let field = dep_type.as_field();
        for other in DependencyType::FIELDS {
            if other != field {
                self.remove_from(other, name);
            }
        }
        if dep_type == DependencyType::PeerOptional {
            let meta = self
                .data
                .entry("peerDependenciesMeta")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(m) = meta {
                let mut flag = Map::new();
                flag.insert(String::from("optional"), Value::Bool(true));
                m.insert(name.to_string(), Value::Object(flag));
            }
        }
        let table = self
            .data
            .entry(field)
            .or_insert_with(|| Value::Object(Map::new()));
        if table.is_object() == false {
            *table = Value::Object(Map::new());
        }
        if let Some(t) = table.as_object_mut() {
            t.insert(name.to_string(), Value::String(bare.to_string()));
        }
    }

    /// Removes `name` from every dependency table.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let mut removed = false;
        for field in DependencyType::FIELDS {
            removed |= self.remove_from(field, name);
        }
        if let Some(Value::Object(m)) = self.data.get_mut("peerDependenciesMeta") {
            m.shift_remove(name);
        }
        removed
    }

    fn remove_from(&mut self, field: &str, name: &str) -> bool {
        match self.data.get_mut(field) {
            Some(Value::Object(t)) => t.shift_remove(name).is_some(),
            _ => false,
        }
    }
}

impl FromStr for Manifest {
    type Err = AnyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match serde_json::from_str::<Value>(s) {
            Ok(v) => Self::from_value(v),
            Err(e) => Err(AnyError(e.to_string())),
        }
    }
}

impl FromFile for Manifest {
    fn from_file(path: &PathBuf) -> Result<Self, Fault> {
        Ok(ManifestFile::read(path)?.into_manifest())
    }
}

/// A manifest paired with the file it was read from and the text style of that
/// file.
#[derive(Debug, PartialEq, Clone)]
pub struct ManifestFile {
    path: PathBuf,
    manifest: Manifest,
    indent: String,
    newline: String,
    trailing_newline: bool,
}

impl ManifestFile {
    /// Reads the manifest at `path`, remembering its indentation and newline style.
    pub fn read(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ManifestUnreadable(path.to_path_buf(), LastError(e.to_string()))
        })?;
        let manifest = Manifest::from_str(&text)
            .map_err(|e| Error::ManifestInvalid(path.to_path_buf(), LastError(e.to_string())))?;
        Ok(Self {
            path: path.to_path_buf(),
            manifest: manifest,
            indent: Self::detect_indent(&text),
            newline: match text.contains("\r\n") {
                true => String::from("\r\n"),
                false => String::from("\n"),
            },
            trailing_newline: text.ends_with('\n'),
        })
    }

    /// Reads the manifest within the directory `dir`.
    pub fn read_dir(dir: &Path) -> Result<Self, Error> {
        Self::read(&dir.join(MANIFEST_FILE))
    }

    fn detect_indent(text: &str) -> String {
        text.lines()
            .skip(1)
            .find_map(|line| {
                let ws: String = line
                    .chars()
                    .take_while(|c| *c == ' ' || *c == '\t')
                    .collect();
                match ws.is_empty() == false && line.trim().is_empty() == false {
                    true => Some(ws),
                    false => None,
                }
            })
            .unwrap_or(String::from("  "))
    }

    pub fn get_path(&self) -> &PathBuf {
        &self.path
    }

    pub fn get_manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn get_manifest_mut(&mut self) -> &mut Manifest {
        &mut self.manifest
    }

    pub fn into_manifest(self) -> Manifest {
        self.manifest
    }

    /// Renders the manifest in the style of the original file.
    pub fn render(&self) -> Result<String, Fault> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(self.indent.as_bytes());
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.manifest.as_value().serialize(&mut ser)?;
        let mut text = String::from_utf8(buf)?;
        if self.newline != "\n" {
            text = text.replace('\n', &self.newline);
        }
        if self.trailing_newline == true {
            text.push_str(&self.newline);
        }
        Ok(text)
    }

    /// Writes the manifest back to its file.
    pub fn write(&self) -> Result<(), Fault> {
        std::fs::write(&self.path, self.render()?)?;
        Ok(())
    }
}

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

//! Package archive handling: subresource integrity and gzipped tar extraction.

use crate::core::manifest::{Manifest, MANIFEST_FILE};
use crate::error::Error;
use crate::util::anyerror::{AnyError, Fault};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tar::{Archive, EntryType};

/// Computes the sha512 subresource integrity string of `data`.
pub fn integrity_of(data: &[u8]) -> String {
    format!("sha512-{}", BASE64_STANDARD.encode(Sha512::digest(data)))
}

/// Checks `data` against an integrity string for the package `what`.
///
/// The string may list several hashes separated by whitespace. The strongest
/// supported algorithm listed decides.
pub fn verify(what: &str, data: &[u8], integrity: &str) -> Result<(), Error> {
    let mut best: Option<(u8, &str, &str)> = None;
    for item in integrity.split_whitespace() {
        let (algo, hash) = match item.split_once('-') {
            Some(p) => p,
            None => continue,
        };
        // drop any options after the hash
        let hash = hash.split('?').next().unwrap_or(hash);
        let rank = match algo {
            "sha512" => 3,
            "sha384" => 2,
            "sha256" => 1,
            _ => continue,
        };
        if best.map_or(true, |(r, _, _)| rank > r) {
            best = Some((rank, algo, hash));
        }
    }
    let (_, algo, expected) = match best {
        Some(b) => b,
        None => {
            return Err(Error::UnsupportedIntegrity(
                integrity.to_string(),
                what.to_string(),
            ))
        }
    };
    let computed = match algo {
        "sha512" => BASE64_STANDARD.encode(Sha512::digest(data)),
        "sha384" => BASE64_STANDARD.encode(Sha384::digest(data)),
        _ => BASE64_STANDARD.encode(Sha256::digest(data)),
    };
    match computed == expected {
        true => Ok(()),
        false => Err(Error::IntegrityMismatch(
            what.to_string(),
            format!("{}-{}", algo, expected),
            format!("{}-{}", algo, computed),
        )),
    }
}

/// Removes the leading package directory of an archive entry path.
fn strip_first(path: &Path) -> PathBuf {
    path.components().skip(1).collect::<PathBuf>()
}

/// Unpacks a gzipped tarball into `dest`, dropping the first path component of
/// every entry.
pub fn extract(data: &[u8], dest: &Path) -> Result<(), Fault> {
    std::fs::create_dir_all(dest)?;
    let dest = std::fs::canonicalize(dest)?;
    let mut archive = Archive::new(GzDecoder::new(data));
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    let mut created_dirs = HashSet::new();

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_type = entry.header().entry_type();
        // global pax headers carry no file data
        if entry_type == EntryType::XGlobalHeader {
            continue;
        }
        let relative = strip_first(&entry.path()?);
        if relative.as_os_str().is_empty() == true {
            continue;
        }
        let absolute = dest.join(&relative);
        let dir = match entry_type == EntryType::Directory {
            true => absolute.clone(),
            false => match absolute.parent() {
                Some(p) => p.to_path_buf(),
                None => continue,
            },
        };
        if created_dirs.insert(dir.clone()) == true {
            std::fs::create_dir_all(&dir)?;
            if std::fs::canonicalize(&dir)?.starts_with(&dest) == false {
                return Err(AnyError(format!(
                    "archive entry {:?} escapes the destination directory",
                    relative
                )))?;
            }
        }
        match entry_type {
            EntryType::Regular => {
                entry.unpack(&absolute)?;
            }
            EntryType::Symlink | EntryType::Link => {
                log::warn!(
                    "ignoring archive entry type {:?} for {:?}",
                    entry_type,
                    absolute
                );
            }
            _ => (),
        }
    }
    Ok(())
}

/// Reads the package manifest out of a gzipped tarball without unpacking it.
pub fn read_manifest(data: &[u8]) -> Result<Manifest, Fault> {
    let mut archive = Archive::new(GzDecoder::new(data));
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type() != EntryType::Regular {
            continue;
        }
        if strip_first(&entry.path()?) == Path::new(MANIFEST_FILE) {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            return Ok(Manifest::from_str(&text)?);
        }
    }
    Err(AnyError(format!("archive has no {} file", MANIFEST_FILE)))?
}

/// Builds a gzipped tarball with every file placed under `package/`.
#[cfg(test)]
pub fn pack(files: &[(&str, &str)]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("package/{}", path), contents.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

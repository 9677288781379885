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

use std::error::Error;
use std::fmt::Display;
use std::path::PathBuf;

/// Quickly implement a custom/unique error message.
///
/// Can also be used to wrap an error's message.
#[derive(Debug, PartialEq)]
pub struct AnyError(pub String);

impl Error for AnyError {}

impl Display for AnyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Fault> for AnyError {
    fn from(value: Fault) -> Self {
        AnyError(value.to_string())
    }
}

impl From<&str> for AnyError {
    fn from(value: &str) -> Self {
        AnyError(value.to_string())
    }
}

/// Thread-safe boxed error used as the common failure type across the crate.
///
/// Faults cross `rayon` task boundaries during resolution and reification, so
/// the box must be `Send + Sync`.
pub type Fault = Box<dyn Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
/// Stores the (filesystem path, error message) that produced a fault.
pub struct PathFault(pub PathBuf, pub Fault);

impl PathFault {
    /// References the path that was being operated on.
    pub fn as_path(&self) -> &PathBuf {
        &self.0
    }

    pub fn into_fault(self) -> Fault {
        self.1
    }
}

impl Display for PathFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to access path {:?}: {}", self.0, self.1)
    }
}

/// Attaches the `path` to an error produced while operating on it.
pub fn at_path<E: Into<Fault>>(path: &std::path::Path) -> impl FnOnce(E) -> Fault + '_ {
    move |e| Box::new(PathFault(path.to_path_buf(), e.into()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn path_fault_message() {
        let e: Fault = at_path(std::path::Path::new("a/b"))(AnyError::from("denied"));
        assert_eq!(e.to_string(), "failed to access path \"a/b\": denied");
    }
}

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

//! A dependency graph engine for `node_modules` installs.
//!
//! The ideal graph describes what the manifests ask for, the actual graph
//! describes what is on disk, and the reifier applies the difference between
//! them as one reversible transaction. The lockfile captures the ideal graph so
//! later installs prefer the same versions.

pub mod core;
pub mod error;
pub mod util;

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

pub mod actual;
pub mod config;
pub mod context;
pub mod dependency;
pub mod depid;
pub mod diff;
pub mod extgit;
pub mod graph;
pub mod ideal;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod registry;
pub mod reify;
pub mod resolver;
pub mod retry;
pub mod spec;
pub mod tarball;
pub mod version;

#[cfg(test)]
pub mod testing;

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

use crate::util::environment::{Environment, ARBOR_LOG, NO_COLOR};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::str::FromStr;

/// Writes log records to stderr with a short level prefix.
pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level: level }
    }

    /// Forms the text printed for a record.
    pub fn format(record: &Record) -> String {
        let prefix = match record.level() {
            Level::Error => "error:".red().bold(),
            Level::Warn => "warning:".yellow().bold(),
            Level::Info => "info:".green().bold(),
            Level::Debug => "debug:".blue(),
            Level::Trace => "trace:".normal(),
        };
        match record.level() <= Level::Info {
            true => format!("{} {}", prefix, record.args()),
            false => format!("{} [{}] {}", prefix, record.target(), record.args()),
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) == true {
            eprintln!("{}", Self::format(record));
        }
    }

    fn flush(&self) {}
}

/// Decides the level to log at.
///
/// The `ARBOR_LOG` environment variable wins over the `configured` level.
pub fn level_of(configured: Option<LevelFilter>) -> LevelFilter {
    Environment::read(ARBOR_LOG)
        .and_then(|s| LevelFilter::from_str(&s).ok())
        .or(configured)
        .unwrap_or(LevelFilter::Warn)
}

/// Installs the logger for the process.
///
/// Installing twice keeps the first logger.
pub fn init(configured: Option<LevelFilter>) {
    if Environment::read(NO_COLOR).is_some() == true {
        colored::control::set_override(false);
    }
    let level = level_of(configured);
    if log::set_boxed_logger(Box::new(Logger::new(level))).is_ok() == true {
        log::set_max_level(level);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefixes() {
        colored::control::set_override(false);
        let text = Logger::format(
            &Record::builder()
                .level(Level::Warn)
                .args(format_args!("missing dependency {}", "bar@^1.0.0"))
                .build(),
        );
        assert_eq!(text, "warning: missing dependency bar@^1.0.0");
        let text = Logger::format(
            &Record::builder()
                .level(Level::Debug)
                .target("arbor::core::diff")
                .args(format_args!("3 edges"))
                .build(),
        );
        assert_eq!(text, "debug: [arbor::core::diff] 3 edges");
    }

    #[test]
    fn configured_level_applies() {
        if Environment::read(ARBOR_LOG).is_none() == true {
            assert_eq!(level_of(Some(LevelFilter::Debug)), LevelFilter::Debug);
            assert_eq!(level_of(None), LevelFilter::Warn);
        }
    }
}

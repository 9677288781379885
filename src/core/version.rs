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

//! Semantic versions and the npm range algebra used to select them.

use serde::de;
use serde::Serializer;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fmt::Display;
use std::num::ParseIntError;
use std::str::FromStr;

type VerNum = u64;

/// Checks if `ver` is within the `range`.
pub fn satisfies(ver: &Version, range: &Range) -> bool {
    range.sets.iter().any(|set| test_set(set, ver))
}

/// Finds the highest version among `space` that is within the `range`.
///
/// Returns `None` if zero versions meet the criteria.
pub fn max_satisfying<'a, I>(space: I, range: &Range) -> Option<&'a Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    let mut highest: Option<&Version> = None;
    space
        .into_iter()
        .filter(|v| satisfies(v, range))
        .for_each(|v| {
            if highest.is_none() || highest.unwrap() < v {
                highest = Some(v);
            }
        });
    highest
}

fn test_set(set: &[Comparator], ver: &Version) -> bool {
    if set.iter().all(|c| c.test(ver)) == false {
        return false;
    }
    if ver.pre.is_empty() == true {
        return true;
    }
    // prereleases only match when a comparator opts into the same tuple
    set.iter().any(|c| {
        c.version.pre.is_empty() == false
            && c.version.major == ver.major
            && c.version.minor == ver.minor
            && c.version.patch == ver.patch
    })
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Identifier {
    Numeric(VerNum),
    Alpha(String),
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{}", n),
            Self::Alpha(s) => write!(f, "{}", s),
        }
    }
}

impl Identifier {
    fn parse(s: &str) -> Result<Self, VersionError> {
        if s.is_empty() == true {
            return Err(VersionError::EmptyIdentifier);
        }
        if s.chars().all(|c| c.is_ascii_digit()) == true {
            Ok(Self::Numeric(s.parse::<VerNum>()?))
        } else if s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') == true {
            Ok(Self::Alpha(s.to_string()))
        } else {
            Err(VersionError::InvalidIdentifier(s.to_string()))
        }
    }
}

#[derive(Debug, Clone, Eq)]
pub struct Version {
    major: VerNum,
    minor: VerNum,
    patch: VerNum,
    pre: Vec<Identifier>,
    build: Vec<String>,
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl std::hash::Hash for Version {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // build metadata does not participate in precedence
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => (),
            o => return o,
        }
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.pre.cmp(&other.pre),
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    pub fn new(major: VerNum, minor: VerNum, patch: VerNum) -> Self {
        Self {
            major: major,
            minor: minor,
            patch: patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Creates the lowest possible prerelease of the given tuple (`x.y.z-0`).
    fn floor(major: VerNum, minor: VerNum, patch: VerNum) -> Self {
        let mut v = Self::new(major, minor, patch);
        v.pre = vec![Identifier::Numeric(0)];
        v
    }

    pub fn get_major(&self) -> VerNum {
        self.major
    }

    pub fn get_minor(&self) -> VerNum {
        self.minor
    }

    pub fn get_patch(&self) -> VerNum {
        self.patch
    }

    pub fn is_prerelease(&self) -> bool {
        self.pre.is_empty() == false
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pv = PartialVersion::from_str(s)?;
        match pv.is_fully_qualified() {
            true => Ok(pv.fill()),
            false => Err(VersionError::NotFullyQualified(s.trim().to_string())),
        }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.pre.is_empty() == false {
            let pre: Vec<String> = self.pre.iter().map(|p| p.to_string()).collect();
            write!(f, "-{}", pre.join("."))?;
        }
        if self.build.is_empty() == false {
            write!(f, "+{}", self.build.join("."))?;
        }
        Ok(())
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        struct LayerVisitor;

        impl<'de> de::Visitor<'de> for LayerVisitor {
            type Value = Version;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a semantic version number")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match Version::from_str(v) {
                    Ok(v) => Ok(v),
                    Err(e) => Err(de::Error::custom(e)),
                }
            }
        }

        deserializer.deserialize_str(LayerVisitor)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A version where the `minor` and `patch` levels (or everything) may be
/// wildcards, as in `1`, `1.2.x`, or `*`.
#[derive(Debug, PartialEq, Clone)]
pub struct PartialVersion {
    major: Option<VerNum>,
    minor: Option<VerNum>,
    patch: Option<VerNum>,
    pre: Vec<Identifier>,
    build: Vec<String>,
}

impl PartialVersion {
    /// Checks if there are 3 specified version numbers.
    pub fn is_fully_qualified(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }

    fn is_any(&self) -> bool {
        self.major.is_none()
    }

    /// Replaces any wildcard levels with zero.
    fn fill(self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre,
            build: self.build,
        }
    }
}

impl FromStr for PartialVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut s = s.trim();
        if s.is_empty() {
            return Err(VersionError::EmptyVersion);
        }
        // loose prefixes
        s = s.trim_start_matches('=').trim_start_matches('v').trim();

        let (s, build) = match s.split_once('+') {
            Some((l, r)) => (l, r.split('.').map(|b| b.to_string()).collect()),
            None => (s, Vec::new()),
        };
        let (core, pre) = match s.split_once('-') {
            Some((l, r)) => (
                l,
                r.split('.')
                    .map(|i| Identifier::parse(i))
                    .collect::<Result<Vec<Identifier>, VersionError>>()?,
            ),
            None => (s, Vec::new()),
        };

        let mut levels = core.split('.').map(|p| match p {
            "x" | "X" | "*" => Ok(None),
            _ => match p.parse::<VerNum>() {
                Ok(n) => Ok(Some(n)),
                Err(e) => Err(VersionError::InvalidDigit(p.to_string(), e)),
            },
        });
        let major = match levels.next() {
            Some(v) => v?,
            None => return Err(VersionError::MissingMajor),
        };
        let minor = match levels.next() {
            Some(v) => v?,
            None => None,
        };
        let patch = match levels.next() {
            Some(v) => v?,
            None => None,
        };
        if levels.next().is_some() {
            return Err(VersionError::ExtraLevels(core.split('.').count()));
        }
        // a wildcard cannot be followed by a concrete level
        if (major.is_none() && (minor.is_some() || patch.is_some()))
            || (minor.is_none() && patch.is_some())
        {
            return Err(VersionError::MisplacedWildcard(core.to_string()));
        }
        Ok(Self {
            major: major,
            minor: minor,
            patch: patch,
            pre: pre,
            build: build,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Op {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

impl Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Lt => "<",
                Self::Le => "<=",
                Self::Gt => ">",
                Self::Ge => ">=",
                Self::Eq => "",
            }
        )
    }
}

#[derive(Debug, PartialEq, Clone)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self {
            op: op,
            version: version,
        }
    }

    fn test(&self, ver: &Version) -> bool {
        match self.op {
            Op::Lt => ver < &self.version,
            Op::Le => ver <= &self.version,
            Op::Gt => ver > &self.version,
            Op::Ge => ver >= &self.version,
            Op::Eq => ver == &self.version,
        }
    }
}

impl Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op, self.version)
    }
}

/// A union (`||`) of comparator sets.
#[derive(Debug, PartialEq, Clone)]
pub struct Range {
    raw: String,
    sets: Vec<Vec<Comparator>>,
}

impl Range {
    /// Creates a range that is satisfied by every non-prerelease version.
    pub fn any() -> Self {
        Self {
            raw: String::from("*"),
            sets: vec![Vec::new()],
        }
    }

    /// References the text the range was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Checks if `ver` is within this range.
    pub fn matches(&self, ver: &Version) -> bool {
        satisfies(ver, self)
    }

    /// Desugars a single comparator token (`^1.2`, `>=3`, `1.x`) into primitives.
    fn desugar(token: &str) -> Result<Vec<Comparator>, VersionError> {
        let (op, rest) = if let Some(r) = token.strip_prefix(">=") {
            (">=", r)
        } else if let Some(r) = token.strip_prefix("<=") {
            ("<=", r)
        } else if let Some(r) = token.strip_prefix('>') {
            (">", r)
        } else if let Some(r) = token.strip_prefix('<') {
            ("<", r)
        } else if let Some(r) = token.strip_prefix('^') {
            ("^", r)
        } else if let Some(r) = token.strip_prefix("~>") {
            ("~", r)
        } else if let Some(r) = token.strip_prefix('~') {
            ("~", r)
        } else if let Some(r) = token.strip_prefix('=') {
            ("=", r)
        } else {
            ("=", token)
        };
        let pv = PartialVersion::from_str(rest)?;
        Ok(match op {
            "^" => Self::caret(pv),
            "~" => Self::tilde(pv),
            "=" => Self::xrange(pv),
            _ => Self::primitive(op, pv),
        })
    }

    fn xrange(pv: PartialVersion) -> Vec<Comparator> {
        match (pv.major, pv.minor, pv.patch) {
            (None, _, _) => Vec::new(),
            (Some(m), None, _) => vec![
                Comparator::new(Op::Ge, Version::new(m, 0, 0)),
                Comparator::new(Op::Lt, Version::floor(m + 1, 0, 0)),
            ],
            (Some(m), Some(n), None) => vec![
                Comparator::new(Op::Ge, Version::new(m, n, 0)),
                Comparator::new(Op::Lt, Version::floor(m, n + 1, 0)),
            ],
            (Some(_), Some(_), Some(_)) => vec![Comparator::new(Op::Eq, pv.fill())],
        }
    }

    fn tilde(pv: PartialVersion) -> Vec<Comparator> {
        match (pv.major, pv.minor, pv.patch) {
            (None, _, _) => Vec::new(),
            (Some(_), None, _) => Self::xrange(pv),
            (Some(m), Some(n), _) => vec![
                Comparator::new(Op::Ge, pv.fill()),
                Comparator::new(Op::Lt, Version::floor(m, n + 1, 0)),
            ],
        }
    }

    fn caret(pv: PartialVersion) -> Vec<Comparator> {
        let upper = match (pv.major, pv.minor, pv.patch) {
            (None, _, _) => return Vec::new(),
            (Some(0), Some(0), Some(p)) => Version::floor(0, 0, p + 1),
            (Some(0), Some(n), _) => Version::floor(0, n + 1, 0),
            (Some(0), None, _) => Version::floor(1, 0, 0),
            (Some(m), _, _) => Version::floor(m + 1, 0, 0),
        };
        vec![
            Comparator::new(Op::Ge, pv.fill()),
            Comparator::new(Op::Lt, upper),
        ]
    }

    fn primitive(op: &str, pv: PartialVersion) -> Vec<Comparator> {
        if pv.is_any() == true {
            return match op {
                // nothing is greater than or less than everything
                ">" | "<" => vec![Comparator::new(Op::Lt, Version::floor(0, 0, 0))],
                _ => Vec::new(),
            };
        }
        let m = pv.major.unwrap_or(0);
        match (op, pv.minor, pv.patch) {
            (">", None, _) => vec![Comparator::new(Op::Ge, Version::new(m + 1, 0, 0))],
            (">", Some(n), None) => vec![Comparator::new(Op::Ge, Version::new(m, n + 1, 0))],
            ("<=", None, _) => vec![Comparator::new(Op::Lt, Version::floor(m + 1, 0, 0))],
            ("<=", Some(n), None) => vec![Comparator::new(Op::Lt, Version::floor(m, n + 1, 0))],
            ("<", _, None) => vec![Comparator::new(Op::Lt, Version::floor(m, pv.minor.unwrap_or(0), 0))],
            (">", _, _) => vec![Comparator::new(Op::Gt, pv.fill())],
            (">=", _, _) => vec![Comparator::new(Op::Ge, pv.fill())],
            ("<=", _, _) => vec![Comparator::new(Op::Le, pv.fill())],
            _ => vec![Comparator::new(Op::Lt, pv.fill())],
        }
    }

    fn hyphen(lower: &str, upper: &str) -> Result<Vec<Comparator>, VersionError> {
        let lo = PartialVersion::from_str(lower)?;
        let hi = PartialVersion::from_str(upper)?;
        let mut set = Vec::new();
        if lo.is_any() == false {
            set.push(Comparator::new(Op::Ge, lo.fill()));
        }
        match (hi.major, hi.minor, hi.patch) {
            (None, _, _) => (),
            (Some(m), None, _) => set.push(Comparator::new(Op::Lt, Version::floor(m + 1, 0, 0))),
            (Some(m), Some(n), None) => {
                set.push(Comparator::new(Op::Lt, Version::floor(m, n + 1, 0)))
            }
            _ => set.push(Comparator::new(Op::Le, hi.fill())),
        }
        Ok(set)
    }

    fn parse_set(s: &str) -> Result<Vec<Comparator>, VersionError> {
        let s = s.trim();
        if let Some((lower, upper)) = s.split_once(" - ") {
            return Self::hyphen(lower, upper);
        }
        // glue operators separated from their versions by whitespace
        let mut tokens: Vec<String> = Vec::new();
        let mut pending = String::new();
        for word in s.split_whitespace() {
            if word.chars().all(|c| "<>=^~".contains(c)) == true {
                pending.push_str(word);
            } else {
                tokens.push(format!("{}{}", pending, word));
                pending.clear();
            }
        }
        if pending.is_empty() == false {
            return Err(VersionError::DanglingOperator(pending));
        }
        let mut set = Vec::new();
        for token in tokens {
            set.append(&mut Self::desugar(&token)?);
        }
        Ok(set)
    }
}

impl FromStr for Range {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let mut sets = Vec::new();
        for part in raw.split("||") {
            sets.push(Self::parse_set(part)?);
        }
        Ok(Self {
            raw: raw.to_string(),
            sets: sets,
        })
    }
}

impl Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[derive(Debug, PartialEq)]
pub enum VersionError {
    EmptyVersion,
    EmptyIdentifier,
    MissingMajor,
    NotFullyQualified(String),
    ExtraLevels(usize),
    InvalidDigit(String, ParseIntError),
    InvalidIdentifier(String),
    DanglingOperator(String),
    MisplacedWildcard(String),
}

impl std::error::Error for VersionError {}

impl From<ParseIntError> for VersionError {
    fn from(e: ParseIntError) -> Self {
        Self::InvalidDigit(String::new(), e)
    }
}

impl Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use VersionError::*;
        match self {
            EmptyVersion => write!(f, "empty version"),
            EmptyIdentifier => write!(f, "empty prerelease identifier"),
            MissingMajor => write!(f, "missing major number"),
            NotFullyQualified(s) => write!(f, "version {:?} is not fully qualified", s),
            ExtraLevels(l) => write!(f, "too many version levels ({}), expected 3", l),
            InvalidDigit(s, e) => write!(f, "invalid version level {:?}: {}", s, e),
            InvalidIdentifier(s) => write!(f, "invalid prerelease identifier {:?}", s),
            DanglingOperator(s) => write!(f, "operator {:?} is missing a version", s),
            MisplacedWildcard(s) => write!(f, "wildcard in {:?} is followed by a number", s),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn r(s: &str) -> Range {
        Range::from_str(s).unwrap()
    }

    #[test]
    fn parse_version() {
        let ver = v("1.2.3-beta.4+build.5");
        assert_eq!(ver.get_major(), 1);
        assert_eq!(ver.get_minor(), 2);
        assert_eq!(ver.get_patch(), 3);
        assert_eq!(ver.is_prerelease(), true);
        assert_eq!(ver.to_string(), "1.2.3-beta.4+build.5");
        assert_eq!(v("v1.0.0"), v("1.0.0"));
        assert!(Version::from_str("1.2").is_err());
        assert!(Version::from_str("").is_err());
        assert!(Version::from_str("1.2.3.4").is_err());
        assert!(Version::from_str("1.a.3").is_err());
    }

    #[test]
    fn precedence() {
        let mut list = vec![
            v("1.0.0"),
            v("1.0.0-rc.1"),
            v("1.0.0-beta.11"),
            v("1.0.0-alpha"),
            v("1.0.0-beta.2"),
            v("1.0.0-alpha.1"),
            v("0.9.9"),
        ];
        list.sort();
        let order: Vec<String> = list.iter().map(|f| f.to_string()).collect();
        assert_eq!(
            order,
            vec![
                "0.9.9",
                "1.0.0-alpha",
                "1.0.0-alpha.1",
                "1.0.0-beta.2",
                "1.0.0-beta.11",
                "1.0.0-rc.1",
                "1.0.0"
            ]
        );
        assert_eq!(v("1.0.0+a"), v("1.0.0+b"));
    }

    #[test]
    fn caret_ranges() {
        assert!(satisfies(&v("1.0.0"), &r("^1.0.0")));
        assert!(satisfies(&v("1.9.9"), &r("^1.0.0")));
        assert!(!satisfies(&v("2.0.0"), &r("^1.0.0")));
        assert!(satisfies(&v("0.2.5"), &r("^0.2.3")));
        assert!(!satisfies(&v("0.3.0"), &r("^0.2.3")));
        assert!(satisfies(&v("0.0.3"), &r("^0.0.3")));
        assert!(!satisfies(&v("0.0.4"), &r("^0.0.3")));
        assert!(satisfies(&v("0.0.9"), &r("^0.0")));
        assert!(!satisfies(&v("0.1.0"), &r("^0.0")));
        assert!(satisfies(&v("0.9.0"), &r("^0")));
        assert!(satisfies(&v("1.5.0"), &r("^1.2.x")));
    }

    #[test]
    fn tilde_ranges() {
        assert!(satisfies(&v("1.2.9"), &r("~1.2.3")));
        assert!(!satisfies(&v("1.3.0"), &r("~1.2.3")));
        assert!(satisfies(&v("1.2.0"), &r("~1.2")));
        assert!(satisfies(&v("1.9.0"), &r("~1")));
        assert!(!satisfies(&v("2.0.0"), &r("~1")));
        assert!(satisfies(&v("1.2.3-beta.4"), &r("~1.2.3-beta.2")));
    }

    #[test]
    fn xranges_and_primitives() {
        assert!(satisfies(&v("3.1.4"), &r("*")));
        assert!(satisfies(&v("3.1.4"), &r("")));
        assert!(satisfies(&v("1.2.7"), &r("1.2.x")));
        assert!(!satisfies(&v("1.3.0"), &r("1.2")));
        assert!(satisfies(&v("1.2.3"), &r("1.2.3")));
        assert!(satisfies(&v("1.2.3"), &r("=1.2.3")));
        assert!(satisfies(&v("2.0.0"), &r(">1")));
        assert!(!satisfies(&v("1.9.9"), &r(">1")));
        assert!(satisfies(&v("1.2.9"), &r("<=1.2")));
        assert!(!satisfies(&v("1.3.0"), &r("<=1.2")));
        assert!(!satisfies(&v("1.2.0"), &r("<1.2")));
        assert!(satisfies(&v("1.5.0"), &r(">= 1.2.0 < 2")));
        assert!(!satisfies(&v("0.0.0"), &r("<*")));
    }

    #[test]
    fn hyphen_and_union() {
        assert!(satisfies(&v("1.2.3"), &r("1.2.3 - 2.3.4")));
        assert!(satisfies(&v("2.3.4"), &r("1.2.3 - 2.3.4")));
        assert!(!satisfies(&v("2.3.5"), &r("1.2.3 - 2.3.4")));
        assert!(satisfies(&v("2.3.9"), &r("1.2 - 2.3")));
        assert!(!satisfies(&v("2.4.0"), &r("1.2 - 2.3")));
        assert!(satisfies(&v("3.0.0"), &r("^1.0.0 || ^3.0.0")));
        assert!(!satisfies(&v("2.0.0"), &r("^1.0.0 || ^3.0.0")));
    }

    #[test]
    fn prerelease_gating() {
        assert!(!satisfies(&v("1.5.0-beta"), &r("^1.2.3")));
        assert!(satisfies(&v("1.2.3-beta.5"), &r("^1.2.3-beta.2")));
        assert!(!satisfies(&v("1.2.4-beta.5"), &r("^1.2.3-beta.2")));
        assert!(!satisfies(&v("2.0.0-0"), &r("*")));
    }

    #[test]
    fn max_satisfying_picks_highest() {
        let space = vec![v("1.0.0"), v("1.4.2"), v("1.10.0"), v("2.0.0"), v("1.11.0-rc.1")];
        assert_eq!(max_satisfying(&space, &r("^1.0.0")), Some(&v("1.10.0")));
        assert_eq!(max_satisfying(&space, &r("~1.4")), Some(&v("1.4.2")));
        assert_eq!(max_satisfying(&space, &r("^3")), None);
    }

    #[test]
    fn invalid_ranges() {
        assert!(Range::from_str(">=").is_err());
        assert!(Range::from_str("latest").is_err());
        assert!(Range::from_str("1.x.2").is_err());
    }
}

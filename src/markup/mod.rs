pub mod headings;
pub mod outline;
pub mod strip;

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

pub use headings::parse_headings;

/// A section heading recovered from wikitext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Heading {
    /// Nesting level, 2 (`== x ==`) through 6 (`====== x ======`)
    pub level: u8,
    /// Label with inline markup stripped
    pub text: String,
}

/// Extract the headings of `raw` whose level is in `levels`, in document order.
///
/// Absent or empty text yields no headings. Never fails: markup that cannot be
/// parsed is kept as literal text.
pub fn extract_headings(raw: Option<&str>, levels: LevelSet) -> Vec<Heading> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if levels.is_empty() {
        return Vec::new();
    }
    let mut headings = parse_headings(raw);
    headings.retain(|h| levels.contains(h.level));
    headings
}

/// A set of heading levels within `2..=6`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelSet(u8);

impl LevelSet {
    pub const MIN_LEVEL: u8 = 2;
    pub const MAX_LEVEL: u8 = 6;
    pub const ALL: LevelSet = LevelSet(0b0111_1100);

    pub const fn empty() -> Self {
        LevelSet(0)
    }

    /// Add `level`. Levels outside `2..=6` are ignored.
    pub fn with(self, level: u8) -> Self {
        if (Self::MIN_LEVEL..=Self::MAX_LEVEL).contains(&level) {
            LevelSet(self.0 | (1 << level))
        } else {
            self
        }
    }

    pub fn contains(self, level: u8) -> bool {
        level <= Self::MAX_LEVEL && self.0 & (1 << level) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = u8> {
        (Self::MIN_LEVEL..=Self::MAX_LEVEL).filter(move |&l| self.contains(l))
    }
}

impl Default for LevelSet {
    fn default() -> Self {
        Self::ALL
    }
}

impl FromIterator<u8> for LevelSet {
    fn from_iter<I: IntoIterator<Item = u8>>(iter: I) -> Self {
        iter.into_iter().fold(LevelSet::empty(), LevelSet::with)
    }
}

impl fmt::Display for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|l| l.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

impl fmt::Debug for LevelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LevelSet({})", self)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid heading levels {0:?}: expected levels 2-6 as \"2,3\", \"2-4\" or \"all\"")]
pub struct InvalidLevels(pub String);

impl FromStr for LevelSet {
    type Err = InvalidLevels;

    /// Accepts `all`, comma lists (`2,3,5`), ranges (`2-4`) and mixes of both.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidLevels(s.to_string());
        let s_trim = s.trim();
        if s_trim.eq_ignore_ascii_case("all") {
            return Ok(Self::ALL);
        }

        let mut set = LevelSet::empty();
        for part in s_trim.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (lo, hi) = match part.split_once('-') {
                Some((lo, hi)) => (lo.trim(), hi.trim()),
                None => (part, part),
            };
            let lo: u8 = lo.parse().map_err(|_| invalid())?;
            let hi: u8 = hi.parse().map_err(|_| invalid())?;
            if lo > hi || lo < Self::MIN_LEVEL || hi > Self::MAX_LEVEL {
                return Err(invalid());
            }
            for level in lo..=hi {
                set = set.with(level);
            }
        }
        if set.is_empty() {
            return Err(invalid());
        }
        Ok(set)
    }
}

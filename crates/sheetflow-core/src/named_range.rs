//! Named range tables
//!
//! Each worksheet owns one [`NamedRangeCollection`]. Names are
//! case-insensitive and resolve to a rectangle on the owning sheet.

use crate::error::{Error, Result};
use crate::position::RangePosition;
use ahash::AHashMap;

/// A named alias for a range on the owning worksheet
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NamedRange {
    /// The name as originally written
    pub name: String,
    /// The range it refers to
    pub range: RangePosition,
}

/// Collection of named ranges with case-insensitive lookup
#[derive(Debug, Default, Clone)]
pub struct NamedRangeCollection {
    /// Keyed by lowercase name
    ranges: AHashMap<String, NamedRange>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that a name can be used in formula text.
    ///
    /// Names start with a letter or underscore, contain only letters, digits,
    /// `_` and `.`, and must not look like a cell address.
    pub fn validate_name(name: &str) -> Result<()> {
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        if !valid_start || !valid_rest {
            return Err(Error::InvalidName(name.to_string()));
        }
        if crate::CellPosition::parse(name).is_ok() {
            return Err(Error::InvalidName(format!("{} looks like a cell address", name)));
        }
        let upper = name.to_ascii_uppercase();
        if upper == "TRUE" || upper == "FALSE" {
            return Err(Error::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Define or redefine a named range
    pub fn define(&mut self, name: &str, range: RangePosition) -> Result<()> {
        Self::validate_name(name)?;
        self.ranges.insert(
            name.to_lowercase(),
            NamedRange {
                name: name.to_string(),
                range,
            },
        );
        Ok(())
    }

    /// Look up a name
    pub fn get(&self, name: &str) -> Option<&NamedRange> {
        self.ranges.get(&name.to_lowercase())
    }

    /// Look up the range a name refers to
    pub fn range(&self, name: &str) -> Option<RangePosition> {
        self.get(name).map(|n| n.range)
    }

    /// Remove a name
    pub fn remove(&mut self, name: &str) -> Option<NamedRange> {
        self.ranges.remove(&name.to_lowercase())
    }

    /// Check if a name is defined
    pub fn contains(&self, name: &str) -> bool {
        self.ranges.contains_key(&name.to_lowercase())
    }

    /// Replace the range of every name through `f`; names mapped to `None` are dropped
    pub fn retain_map<F>(&mut self, mut f: F)
    where
        F: FnMut(RangePosition) -> Option<RangePosition>,
    {
        self.ranges.retain(|_, named| match f(named.range) {
            Some(range) => {
                named.range = range;
                true
            }
            None => false,
        });
    }

    /// Iterate over all named ranges
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.ranges.values()
    }

    /// Number of named ranges
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Remove every name
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_insensitive_lookup() {
        let mut names = NamedRangeCollection::new();
        names.define("Sales", RangePosition::parse("A1:A10").unwrap()).unwrap();

        assert!(names.contains("SALES"));
        assert_eq!(names.range("sales"), RangePosition::parse("A1:A10").ok());
        assert_eq!(names.get("sAlEs").map(|n| n.name.as_str()), Some("Sales"));

        names.define("SALES", RangePosition::parse("B1").unwrap()).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.range("Sales"), RangePosition::parse("B1").ok());
    }

    #[test]
    fn test_invalid_names() {
        let mut names = NamedRangeCollection::new();
        let range = RangePosition::parse("A1").unwrap();
        assert!(names.define("A1", range).is_err());
        assert!(names.define("1abc", range).is_err());
        assert!(names.define("with space", range).is_err());
        assert!(names.define("true", range).is_err());
        assert!(names.define("_rate.2", range).is_ok());
    }

    #[test]
    fn test_retain_map() {
        let mut names = NamedRangeCollection::new();
        names.define("keep", RangePosition::parse("A5").unwrap()).unwrap();
        names.define("drop", RangePosition::parse("A1").unwrap()).unwrap();
        names.retain_map(|r| if r.row == 0 { None } else { Some(RangePosition::new(r.row - 1, r.col, 1, 1)) });
        assert!(!names.contains("drop"));
        assert_eq!(names.range("keep"), RangePosition::parse("A4").ok());
    }
}

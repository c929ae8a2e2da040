//! Cell and range positions
//!
//! A [`CellPosition`] is both a coordinate and, through its per-axis
//! [`PositionKind`] tags, an instruction for how the coordinate moves when a
//! formula is copied. A [`RangePosition`] is a normalized rectangle described
//! by its top-left corner and extent.

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// How one axis of a reference behaves when the owning formula moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PositionKind {
    /// Shifts with the formula (`A1`)
    #[default]
    Relative,
    /// Stays fixed (`$A$1`)
    Absolute,
}

impl PositionKind {
    /// Whether the axis is absolute
    #[inline]
    pub fn is_absolute(self) -> bool {
        self == PositionKind::Absolute
    }

    fn from_flag(absolute: bool) -> Self {
        if absolute {
            PositionKind::Absolute
        } else {
            PositionKind::Relative
        }
    }
}

/// A single cell position (e.g. "A1", "$B$2")
///
/// Rows and columns are 0-based internally and 1-based / lettered in display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellPosition {
    /// Row index (0-based)
    pub row: u32,
    /// Column index (0-based, A=0)
    pub col: u16,
    /// Row axis tag
    pub row_kind: PositionKind,
    /// Column axis tag
    pub col_kind: PositionKind,
}

impl CellPosition {
    /// Create a position with both axes relative
    pub const fn new(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_kind: PositionKind::Relative,
            col_kind: PositionKind::Relative,
        }
    }

    /// Create a position with both axes absolute (`$A$1` style)
    pub const fn absolute(row: u32, col: u16) -> Self {
        Self {
            row,
            col,
            row_kind: PositionKind::Absolute,
            col_kind: PositionKind::Absolute,
        }
    }

    /// Create a position with explicit axis tags
    pub const fn with_kinds(row: u32, col: u16, row_kind: PositionKind, col_kind: PositionKind) -> Self {
        Self {
            row,
            col,
            row_kind,
            col_kind,
        }
    }

    /// Same coordinate with both axes relative
    pub fn coordinate(self) -> Self {
        Self::new(self.row, self.col)
    }

    /// Whether two positions address the same cell, ignoring axis tags
    pub fn same_cell(self, other: CellPosition) -> bool {
        self.row == other.row && self.col == other.col
    }

    /// Parse A1-style notation
    ///
    /// # Examples
    /// ```
    /// use sheetflow_core::{CellPosition, PositionKind};
    ///
    /// let pos = CellPosition::parse("$B3").unwrap();
    /// assert_eq!((pos.row, pos.col), (2, 1));
    /// assert_eq!(pos.col_kind, PositionKind::Absolute);
    /// assert_eq!(pos.row_kind, PositionKind::Relative);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidAddress("empty address".into()));
        }

        let bytes = s.as_bytes();
        let mut pos = 0;

        let col_absolute = bytes.first() == Some(&b'$');
        if col_absolute {
            pos += 1;
        }

        let col_start = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_alphabetic() {
            pos += 1;
        }
        if pos == col_start {
            return Err(Error::InvalidAddress(format!("no column letters in '{}'", s)));
        }
        let col = letters_to_column(&s[col_start..pos])?;

        let row_absolute = bytes.get(pos) == Some(&b'$');
        if row_absolute {
            pos += 1;
        }

        let row_str = &s[pos..];
        if row_str.is_empty() || !row_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::InvalidAddress(format!("invalid row number in '{}'", s)));
        }
        let row: u32 = row_str
            .parse()
            .map_err(|_| Error::InvalidAddress(format!("invalid row number in '{}'", s)))?;
        if row == 0 {
            return Err(Error::InvalidAddress(format!("row number must be >= 1 in '{}'", s)));
        }
        let row = row - 1;
        if row >= MAX_ROWS {
            return Err(Error::RowOutOfBounds(row, MAX_ROWS - 1));
        }

        Ok(Self::with_kinds(
            row,
            col,
            PositionKind::from_flag(row_absolute),
            PositionKind::from_flag(col_absolute),
        ))
    }

    /// Format as A1-style text, including `$` markers
    pub fn to_a1_string(&self) -> String {
        let mut out = String::new();
        if self.col_kind.is_absolute() {
            out.push('$');
        }
        out.push_str(&column_to_letters(self.col));
        if self.row_kind.is_absolute() {
            out.push('$');
        }
        out.push_str(&(self.row + 1).to_string());
        out
    }

    /// Move the position by a signed delta, honouring axis tags.
    ///
    /// Absolute axes stay put. Returns `None` when a relative axis would leave
    /// the grid.
    pub fn offset(self, row_delta: i64, col_delta: i64) -> Option<Self> {
        let row = if self.row_kind.is_absolute() {
            self.row as i64
        } else {
            self.row as i64 + row_delta
        };
        let col = if self.col_kind.is_absolute() {
            self.col as i64
        } else {
            self.col as i64 + col_delta
        };
        if row < 0 || row >= MAX_ROWS as i64 || col < 0 || col >= MAX_COLS as i64 {
            return None;
        }
        Some(Self::with_kinds(row as u32, col as u16, self.row_kind, self.col_kind))
    }
}

impl fmt::Display for CellPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_string())
    }
}

impl FromStr for CellPosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Convert a column index to letters (0 = A, 25 = Z, 26 = AA)
pub fn column_to_letters(col: u16) -> String {
    let mut letters = Vec::new();
    let mut n = col as u32 + 1;
    while n > 0 {
        n -= 1;
        letters.push((n % 26) as u8 + b'A');
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Convert column letters to an index (A = 0, AA = 26)
pub fn letters_to_column(letters: &str) -> Result<u16> {
    if letters.is_empty() {
        return Err(Error::InvalidAddress("empty column letters".into()));
    }
    let mut col: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return Err(Error::InvalidAddress(format!("invalid column letter '{}'", c)));
        }
        col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        if col > MAX_COLS as u32 {
            return Err(Error::ColumnOutOfBounds(u16::MAX, MAX_COLS - 1));
        }
    }
    Ok((col - 1) as u16)
}

/// A normalized rectangular range (top-left corner plus extent)
///
/// `rows` and `cols` are always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangePosition {
    /// First row (0-based)
    pub row: u32,
    /// First column (0-based)
    pub col: u16,
    /// Number of rows
    pub rows: u32,
    /// Number of columns
    pub cols: u16,
}

impl RangePosition {
    /// Create a range from a corner and an extent; zero extents are bumped to 1
    pub fn new(row: u32, col: u16, rows: u32, cols: u16) -> Self {
        Self {
            row,
            col,
            rows: rows.max(1),
            cols: cols.max(1),
        }
    }

    /// A range covering exactly one cell
    pub fn single(pos: CellPosition) -> Self {
        Self::new(pos.row, pos.col, 1, 1)
    }

    /// Build a range from two corners in any order
    pub fn from_corners(a: CellPosition, b: CellPosition) -> Self {
        let (r0, r1) = (a.row.min(b.row), a.row.max(b.row));
        let (c0, c1) = (a.col.min(b.col), a.col.max(b.col));
        Self::new(r0, c0, r1 - r0 + 1, c1 - c0 + 1)
    }

    /// Build a range from a possibly negative span.
    ///
    /// A negative extent means the range grows up/left from `(row, col)`. The
    /// result is normalized, but not clamped; use [`fix_range`](Self::fix_range)
    /// to clamp to sheet extents.
    pub fn from_span(row: i64, col: i64, rows: i64, cols: i64) -> Self {
        let (r0, r1) = span_bounds(row, rows);
        let (c0, c1) = span_bounds(col, cols);
        let r0 = r0.clamp(0, MAX_ROWS as i64 - 1);
        let r1 = r1.clamp(r0, MAX_ROWS as i64 - 1);
        let c0 = c0.clamp(0, MAX_COLS as i64 - 1);
        let c1 = c1.clamp(c0, MAX_COLS as i64 - 1);
        Self::new(r0 as u32, c0 as u16, (r1 - r0 + 1) as u32, (c1 - c0 + 1) as u16)
    }

    /// Parse "A1:B2" or "A1"
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidRange("empty range".into()));
        }
        match s.split_once(':') {
            Some((a, b)) => {
                let a = CellPosition::parse(a)
                    .map_err(|e| Error::InvalidRange(format!("{}: {}", s, e)))?;
                let b = CellPosition::parse(b)
                    .map_err(|e| Error::InvalidRange(format!("{}: {}", s, e)))?;
                Ok(Self::from_corners(a, b))
            }
            None => Ok(Self::single(CellPosition::parse(s)?)),
        }
    }

    /// Last row covered (inclusive)
    #[inline]
    pub fn end_row(&self) -> u32 {
        self.row.saturating_add(self.rows.saturating_sub(1))
    }

    /// Last column covered (inclusive)
    #[inline]
    pub fn end_col(&self) -> u16 {
        self.col.saturating_add(self.cols.saturating_sub(1))
    }

    /// Top-left position (relative)
    pub fn start(&self) -> CellPosition {
        CellPosition::new(self.row, self.col)
    }

    /// Bottom-right position (relative)
    pub fn end(&self) -> CellPosition {
        CellPosition::new(self.end_row(), self.end_col())
    }

    /// Total number of cells
    pub fn cell_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// Whether the range is a single cell
    pub fn is_single_cell(&self) -> bool {
        self.rows == 1 && self.cols == 1
    }

    /// Check whether a cell falls inside the range (axis tags ignored)
    pub fn contains(&self, pos: CellPosition) -> bool {
        self.contains_cell(pos.row, pos.col)
    }

    /// Check whether a raw coordinate falls inside the range
    #[inline]
    pub fn contains_cell(&self, row: u32, col: u16) -> bool {
        row >= self.row && row <= self.end_row() && col >= self.col && col <= self.end_col()
    }

    /// Check whether `other` lies fully inside this range
    pub fn contains_range(&self, other: &RangePosition) -> bool {
        other.row >= self.row
            && other.end_row() <= self.end_row()
            && other.col >= self.col
            && other.end_col() <= self.end_col()
    }

    /// Check whether two ranges share at least one cell
    pub fn intersects(&self, other: &RangePosition) -> bool {
        self.row <= other.end_row()
            && other.row <= self.end_row()
            && self.col <= other.end_col()
            && other.col <= self.end_col()
    }

    /// The overlapping rectangle, if any
    pub fn intersect_with(&self, other: &RangePosition) -> Option<RangePosition> {
        if !self.intersects(other) {
            return None;
        }
        let row = self.row.max(other.row);
        let col = self.col.max(other.col);
        let end_row = self.end_row().min(other.end_row());
        let end_col = self.end_col().min(other.end_col());
        Some(Self::new(
            row,
            col,
            (end_row - row).saturating_add(1),
            (end_col - col).saturating_add(1),
        ))
    }

    /// Clamp the range to a sheet of `sheet_rows` x `sheet_cols` cells.
    ///
    /// Never fails: a range lying entirely outside the sheet collapses onto
    /// the nearest edge cell.
    pub fn fix_range(&self, sheet_rows: u32, sheet_cols: u16) -> RangePosition {
        let max_row = sheet_rows.max(1) - 1;
        let max_col = sheet_cols.max(1) - 1;
        let row = self.row.min(max_row);
        let col = self.col.min(max_col);
        let end_row = self.end_row().min(max_row);
        let end_col = self.end_col().min(max_col);
        Self::new(row, col, end_row - row + 1, end_col - col + 1)
    }

    /// Iterate over every cell, row-major
    pub fn cells(&self) -> CellPositions {
        CellPositions {
            range: *self,
            row: self.row,
            col: self.col,
            done: false,
        }
    }
}

fn span_bounds(start: i64, len: i64) -> (i64, i64) {
    if len >= 0 {
        (start, start + len.max(1) - 1)
    } else {
        (start + len + 1, start)
    }
}

impl fmt::Display for RangePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single_cell() {
            write!(f, "{}", self.start())
        } else {
            write!(f, "{}:{}", self.start(), self.end())
        }
    }
}

impl FromStr for RangePosition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<CellPosition> for RangePosition {
    fn from(pos: CellPosition) -> Self {
        Self::single(pos)
    }
}

/// Row-major iterator over the cells of a [`RangePosition`]
#[derive(Debug, Clone)]
pub struct CellPositions {
    range: RangePosition,
    row: u32,
    col: u16,
    done: bool,
}

impl Iterator for CellPositions {
    type Item = CellPosition;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = CellPosition::new(self.row, self.col);
        if self.col < self.range.end_col() {
            self.col += 1;
        } else if self.row < self.range.end_row() {
            self.col = self.range.col;
            self.row += 1;
        } else {
            self.done = true;
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_parse_cell_position() {
        let pos = CellPosition::parse("A1").unwrap();
        assert_eq!(pos, CellPosition::new(0, 0));

        let pos = CellPosition::parse("$AA$10").unwrap();
        assert_eq!(pos, CellPosition::absolute(9, 26));

        let pos = CellPosition::parse("c$4").unwrap();
        assert_eq!(pos.row_kind, PositionKind::Absolute);
        assert_eq!(pos.col_kind, PositionKind::Relative);
        assert_eq!(pos.to_a1_string(), "C$4");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(CellPosition::parse("").is_err());
        assert!(CellPosition::parse("A0").is_err());
        assert!(CellPosition::parse("1A").is_err());
        assert!(CellPosition::parse("A1B").is_err());
        assert!(CellPosition::parse("XFE1").is_err());
    }

    #[test]
    fn test_column_letters() {
        assert_eq!(column_to_letters(0), "A");
        assert_eq!(column_to_letters(25), "Z");
        assert_eq!(column_to_letters(26), "AA");
        assert_eq!(column_to_letters(16383), "XFD");
        assert_eq!(letters_to_column("xfd").unwrap(), 16383);
    }

    #[test]
    fn test_offset_respects_kinds() {
        let pos = CellPosition::parse("B$2").unwrap();
        let moved = pos.offset(5, 2).unwrap();
        assert_eq!(moved.to_a1_string(), "D$2");

        assert!(CellPosition::new(0, 0).offset(-1, 0).is_none());
        assert_eq!(
            CellPosition::absolute(0, 0).offset(-1, -1),
            Some(CellPosition::absolute(0, 0))
        );
    }

    #[test]
    fn test_range_parse_and_display() {
        let range = RangePosition::parse("C3:A1").unwrap();
        assert_eq!(range, RangePosition::new(0, 0, 3, 3));
        assert_eq!(range.to_string(), "A1:C3");
        assert_eq!(RangePosition::parse("B2").unwrap().to_string(), "B2");
    }

    #[test]
    fn test_contains_and_intersect() {
        let a = RangePosition::parse("A1:C3").unwrap();
        let b = RangePosition::parse("B2:D4").unwrap();
        assert!(a.contains(CellPosition::new(2, 2)));
        assert!(!a.contains(CellPosition::new(3, 0)));
        assert_eq!(a.intersect_with(&b), Some(RangePosition::parse("B2:C3").unwrap()));
        assert!(a.intersect_with(&RangePosition::parse("E5").unwrap()).is_none());
        assert!(a.contains_range(&RangePosition::parse("B2:C2").unwrap()));
        assert!(!a.contains_range(&b));
    }

    #[test]
    fn test_fix_range_clamps() {
        let range = RangePosition::new(8, 3, 10, 10);
        assert_eq!(range.fix_range(10, 5), RangePosition::new(8, 3, 2, 2));

        let outside = RangePosition::new(50, 50, 2, 2);
        assert_eq!(outside.fix_range(10, 5), RangePosition::new(9, 4, 1, 1));

        // Spans running past the integer range saturate instead of wrapping
        let huge = RangePosition::new(u32::MAX - 1, 0, 5, 1);
        assert_eq!(huge.end_row(), u32::MAX);
        assert_eq!(huge.fix_range(100, 10), RangePosition::new(99, 0, 1, 1));
    }

    #[test]
    fn test_from_span_negative() {
        assert_eq!(RangePosition::from_span(5, 5, -3, 1), RangePosition::new(3, 5, 3, 1));
        assert_eq!(RangePosition::from_span(1, 0, -5, -2), RangePosition::new(0, 0, 2, 1));
    }

    #[test]
    fn test_cells_iterator_row_major() {
        let cells: Vec<String> = RangePosition::parse("A1:B2")
            .unwrap()
            .cells()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
    }

    proptest! {
        #[test]
        fn prop_fix_range_stays_inside(
            row in 0u32..500, col in 0u16..200,
            rows in 1u32..500, cols in 1u16..200,
            sheet_rows in 1u32..300, sheet_cols in 1u16..100,
        ) {
            let fixed = RangePosition::new(row, col, rows, cols).fix_range(sheet_rows, sheet_cols);
            prop_assert!(fixed.rows >= 1 && fixed.cols >= 1);
            prop_assert!(fixed.end_row() < sheet_rows);
            prop_assert!(fixed.end_col() < sheet_cols);
        }

        #[test]
        fn prop_fix_range_clamps_extreme_corners(
            row in (u32::MAX - 1000)..=u32::MAX, col in (u16::MAX - 100)..=u16::MAX,
            rows in 0u32..=u32::MAX, cols in 0u16..=u16::MAX,
            sheet_rows in 1u32..300, sheet_cols in 1u16..100,
        ) {
            let range = RangePosition { row, col, rows, cols };
            prop_assert!(range.end_row() >= range.row);
            prop_assert!(range.end_col() >= range.col);
            let fixed = range.fix_range(sheet_rows, sheet_cols);
            prop_assert_eq!(fixed.row, sheet_rows - 1);
            prop_assert_eq!(fixed.col, sheet_cols - 1);
            prop_assert_eq!((fixed.rows, fixed.cols), (1, 1));
        }

        #[test]
        fn prop_from_span_is_normalized(
            row in 0i64..1000, col in 0i64..1000,
            rows in -2000i64..2000, cols in -2000i64..2000,
        ) {
            let range = RangePosition::from_span(row, col, rows, cols);
            prop_assert!(range.rows >= 1 && range.cols >= 1);
            prop_assert!((range.end_row() as i64) < MAX_ROWS as i64);
            prop_assert!((range.end_col() as i64) < MAX_COLS as i64);
        }

        #[test]
        fn prop_intersection_is_contained(
            r1 in 0u32..50, c1 in 0u16..50, h1 in 1u32..20, w1 in 1u16..20,
            r2 in 0u32..50, c2 in 0u16..50, h2 in 1u32..20, w2 in 1u16..20,
        ) {
            let a = RangePosition::new(r1, c1, h1, w1);
            let b = RangePosition::new(r2, c2, h2, w2);
            match a.intersect_with(&b) {
                Some(i) => {
                    prop_assert!(a.contains_range(&i));
                    prop_assert!(b.contains_range(&i));
                }
                None => prop_assert!(!a.intersects(&b)),
            }
        }
    }
}

//! # sheetflow-core
//!
//! Value types shared by the sheetflow crates.
//!
//! This crate provides:
//! - [`CellPosition`] and [`RangePosition`] - addresses with per-axis absolute/relative tags
//! - [`CellValue`] and [`CellError`] - raw cell data
//! - [`CellStyle`] and [`DifferentialFormat`] - the style subset touched by conditional formats
//! - [`ConditionalFormat`] - rule definitions (anchor range plus ordered rules)
//! - [`NamedRangeCollection`] - per-sheet named range tables
//!
//! ## Example
//!
//! ```rust
//! use sheetflow_core::{CellPosition, RangePosition};
//!
//! let range = RangePosition::parse("B2:D4").unwrap();
//! assert!(range.contains(CellPosition::parse("C3").unwrap()));
//! assert_eq!(range.end_row(), 3);
//! ```

pub mod conditional_format;
pub mod error;
pub mod named_range;
pub mod position;
pub mod style;
pub mod value;

pub use conditional_format::{CfOperator, CfRule, CfRuleType, ConditionalFormat};
pub use error::{Error, Result};
pub use named_range::NamedRangeCollection;
pub use position::{CellPosition, CellPositions, PositionKind, RangePosition};
pub use style::{CellStyle, Color, DifferentialFormat};
pub use value::{CellError, CellValue};

use std::fmt;

/// Maximum number of rows in a worksheet (Excel limit)
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet (Excel limit)
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;

/// Stable identity of a worksheet.
///
/// Ids are handed out by the workbook and never reused, so dependency edges keyed
/// by `SheetId` survive sheet reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SheetId(pub u32);

impl fmt::Display for SheetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sheet#{}", self.0)
    }
}

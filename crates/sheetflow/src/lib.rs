//! # sheetflow
//!
//! An incremental spreadsheet recalculation core.
//!
//! Sheetflow keeps a dependency graph between formula cells and the ranges they
//! read, and recalculates only what an edit can reach. On top of the graph it
//! evaluates conditional formats and extends series with serial auto fill.
//!
//! ## Features
//!
//! - Formula assignment with syntax, self-reference and evaluation status
//! - Incremental propagation guarded by an active stack (no topological sort)
//! - Conditional formats with expression and cell-value rules
//! - Serial auto fill with formula offsetting, text counters and merged spans
//! - Trace arrows, named ranges, merged cells and row/column removal
//! - Undoable actions and synchronous change listeners
//!
//! ## Example
//!
//! ```rust
//! use sheetflow::prelude::*;
//!
//! let mut workbook = Workbook::new();
//! let sheet = workbook.sheet_id_by_name("Sheet1").unwrap();
//!
//! workbook.set_cell_data(sheet, 0, 0, 20.0).unwrap();
//! workbook.set_cell_formula(sheet, 0, 1, "=A1*2").unwrap();
//! assert_eq!(workbook.cell_value(sheet, 0, 1), CellValue::Number(40.0));
//!
//! // Edits propagate to dependents
//! workbook.set_cell_data(sheet, 0, 0, 1.5).unwrap();
//! assert_eq!(workbook.cell_value(sheet, 0, 1), CellValue::Number(3.0));
//! ```

pub mod action;
pub mod autofill;
pub mod calculation;
pub mod cell;
pub mod conditional;
pub mod dependency;
pub mod events;
pub mod formula;
pub mod prelude;
pub mod serial;
pub mod settings;
pub mod structure;
pub mod trace;
pub mod workbook;
pub mod worksheet;

pub use action::{Action, PartialGrid, PartialGridCell, SetPartialGridAction};
pub use calculation::CalculationStats;
pub use cell::{Cell, FormulaStatus};
pub use conditional::CfId;
pub use dependency::{build_references, CellKey, FormulaReferenceRange, ReferenceRange};
pub use events::{AutoFillRequest, CellChange, ChangeKind, EvaluationFailure, WorkbookEvents};
pub use serial::SerialFiller;
pub use settings::WorkbookSettings;
pub use workbook::Workbook;
pub use worksheet::Worksheet;

// Re-export core types
pub use sheetflow_core::{
    CellError,
    CellPosition,
    // Cell types
    CellStyle,
    CellValue,
    // Conditional formatting types
    CfOperator,
    CfRule,
    CfRuleType,
    Color,
    ConditionalFormat,
    DifferentialFormat,
    // Error types
    Error,
    NamedRangeCollection,
    PositionKind,
    RangePosition,
    Result,
    SheetId,

    MAX_COLS,
    // Constants
    MAX_ROWS,
    MAX_SHEET_NAME_LEN,
};

// Re-export formula types
pub use sheetflow_formula::{
    evaluate, offset_references, parse_formula, CellSource, EvaluationContext, FormulaError,
    FormulaExpr, FormulaResult, FormulaValue,
};

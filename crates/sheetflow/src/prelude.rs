//! Prelude module - common imports for sheetflow users
//!
//! ```rust
//! use sheetflow::prelude::*;
//! ```

pub use crate::{
    // Actions
    Action,
    // Calculation types
    CalculationStats,
    CellError,
    CellKey,
    CellPosition,

    CellStyle,
    // Cell types
    CellValue,
    // Conditional formatting types
    CfId,
    CfOperator,
    CfRule,
    Color,
    ConditionalFormat,
    DifferentialFormat,

    // Error types
    Error,
    FormulaStatus,
    RangePosition,
    Result,
    SheetId,

    // Main types
    Workbook,
    WorkbookSettings,
    Worksheet,
};

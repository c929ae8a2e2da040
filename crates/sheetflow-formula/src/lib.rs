//! # sheetflow-formula
//!
//! Formula collaborators for the sheetflow engine.
//!
//! This crate provides:
//! - Formula parsing (text → AST) and rendering (AST → text)
//! - Structural reference offsetting for copied formulas
//! - Reference adjustment when rows or columns are removed
//! - Formula evaluation over any [`CellSource`]
//! - A compact set of built-in functions
//!
//! ## Example
//!
//! ```rust
//! use sheetflow_formula::{offset_references, parse_formula};
//!
//! let ast = parse_formula("=SUM(A1:A3)*$B$1").unwrap();
//! let moved = offset_references(&ast, 0, 2);
//! assert_eq!(moved.to_string(), "SUM(C1:C3)*$B$1");
//! ```

pub mod ast;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod shift;

pub use ast::{BinaryOperator, CellReference, FormulaExpr, RangeReference, UnaryOperator};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, CellSource, EvaluationContext, FormulaValue};
pub use parser::parse_formula;
pub use shift::{adjust_for_removed_columns, adjust_for_removed_rows, offset_references};

//! Formula Abstract Syntax Tree types
//!
//! Every node renders back to formula text through [`Display`](std::fmt::Display),
//! without the leading `=`. Parenthesised groups are kept as [`FormulaExpr::Paren`]
//! so the rendered text matches what was written.

use sheetflow_core::value::format_number;
use sheetflow_core::{CellError, CellPosition, RangePosition};
use std::fmt;

/// Formula expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaExpr {
    // === Literals ===
    /// Numeric literal
    Number(f64),
    /// String literal
    String(String),
    /// Boolean literal
    Boolean(bool),
    /// Error literal
    Error(CellError),

    // === References ===
    /// Single cell reference
    CellRef(CellReference),
    /// Range reference
    RangeRef(RangeReference),
    /// Named range
    NameRef(String),

    // === Operators ===
    /// Binary operation
    BinaryOp {
        op: BinaryOperator,
        left: Box<FormulaExpr>,
        right: Box<FormulaExpr>,
    },
    /// Unary operation
    UnaryOp {
        op: UnaryOperator,
        operand: Box<FormulaExpr>,
    },
    /// Parenthesised sub-expression
    Paren(Box<FormulaExpr>),

    // === Function call ===
    Function {
        name: String,
        args: Vec<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// Rebuild the tree bottom-up, letting `f` replace any node after its
    /// children have been mapped.
    pub fn map<F>(&self, f: &mut F) -> FormulaExpr
    where
        F: FnMut(FormulaExpr) -> FormulaExpr,
    {
        let mapped = match self {
            FormulaExpr::BinaryOp { op, left, right } => FormulaExpr::BinaryOp {
                op: *op,
                left: Box::new(left.map(f)),
                right: Box::new(right.map(f)),
            },
            FormulaExpr::UnaryOp { op, operand } => FormulaExpr::UnaryOp {
                op: *op,
                operand: Box::new(operand.map(f)),
            },
            FormulaExpr::Paren(inner) => FormulaExpr::Paren(Box::new(inner.map(f))),
            FormulaExpr::Function { name, args } => FormulaExpr::Function {
                name: name.clone(),
                args: args.iter().map(|a| a.map(f)).collect(),
            },
            leaf => leaf.clone(),
        };
        f(mapped)
    }
}

/// Cell reference with optional sheet
#[derive(Debug, Clone, PartialEq)]
pub struct CellReference {
    pub sheet: Option<String>,
    pub position: CellPosition,
}

impl CellReference {
    /// Create a reference on the formula's own sheet
    pub fn new(position: CellPosition) -> Self {
        Self {
            sheet: None,
            position,
        }
    }
}

/// Range reference with optional sheet
///
/// `start` is always the top-left corner and `end` the bottom-right one; each
/// carries its own axis tags.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeReference {
    pub sheet: Option<String>,
    pub start: CellPosition,
    pub end: CellPosition,
}

impl RangeReference {
    /// Create a range reference, normalizing the corners per axis
    pub fn new(sheet: Option<String>, a: CellPosition, b: CellPosition) -> Self {
        let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
        let (left, right) = if a.col <= b.col { (a, b) } else { (b, a) };
        Self {
            sheet,
            start: CellPosition::with_kinds(top.row, left.col, top.row_kind, left.col_kind),
            end: CellPosition::with_kinds(bottom.row, right.col, bottom.row_kind, right.col_kind),
        }
    }

    /// The rectangle covered
    pub fn range(&self) -> RangePosition {
        RangePosition::from_corners(self.start, self.end)
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    /// Operator symbol as written in formula text
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Power => "^",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Concat => "&",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Percent,
}

/// Render a sheet name, quoting it when it is not a plain identifier
pub fn format_sheet_name(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if plain {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\'', "''"))
    }
}

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: &Option<String>) -> fmt::Result {
    match sheet {
        Some(name) => write!(f, "{}!", format_sheet_name(name)),
        None => Ok(()),
    }
}

impl fmt::Display for CellReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.sheet)?;
        write!(f, "{}", self.position)
    }
}

impl fmt::Display for RangeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, &self.sheet)?;
        write!(f, "{}:{}", self.start, self.end)
    }
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaExpr::Number(n) => f.write_str(&format_number(*n)),
            FormulaExpr::String(s) => write!(f, "\"{}\"", s.replace('"', "\"\"")),
            FormulaExpr::Boolean(true) => f.write_str("TRUE"),
            FormulaExpr::Boolean(false) => f.write_str("FALSE"),
            FormulaExpr::Error(e) => f.write_str(e.as_str()),
            FormulaExpr::CellRef(r) => write!(f, "{}", r),
            FormulaExpr::RangeRef(r) => write!(f, "{}", r),
            FormulaExpr::NameRef(name) => f.write_str(name),
            FormulaExpr::BinaryOp { op, left, right } => {
                write!(f, "{}{}{}", left, op.symbol(), right)
            }
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Negate,
                operand,
            } => write!(f, "-{}", operand),
            FormulaExpr::UnaryOp {
                op: UnaryOperator::Percent,
                operand,
            } => write!(f, "{}%", operand),
            FormulaExpr::Paren(inner) => write!(f, "({})", inner),
            FormulaExpr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

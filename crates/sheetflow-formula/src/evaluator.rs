//! Formula evaluator
//!
//! Evaluates formula ASTs to produce values. Cell data is read through the
//! [`CellSource`] trait so the evaluator never holds references into the
//! workbook's cell tables.

use crate::ast::{BinaryOperator, FormulaExpr, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{FunctionImpl, FunctionRegistry};
use sheetflow_core::value::format_number;
use sheetflow_core::{CellError, CellValue, RangePosition, SheetId};
use std::cmp::Ordering;
use std::sync::OnceLock;

/// Global function registry (lazily initialized)
static FUNCTION_REGISTRY: OnceLock<FunctionRegistry> = OnceLock::new();

fn get_function_registry() -> &'static FunctionRegistry {
    FUNCTION_REGISTRY.get_or_init(FunctionRegistry::new)
}

/// Whether a function with this name is built in
pub fn is_known_function(name: &str) -> bool {
    get_function_registry().get(name).is_some()
}

/// Value types during formula evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Values of a multi-cell range, row-major
    Array(Vec<Vec<FormulaValue>>),
    Empty,
}

impl FormulaValue {
    /// Convert to number, if possible
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(n) => Some(*n),
            FormulaValue::Boolean(true) => Some(1.0),
            FormulaValue::Boolean(false) => Some(0.0),
            FormulaValue::String(s) => s.trim().parse().ok(),
            FormulaValue::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Force conversion to number for arithmetic
    pub fn to_number(&self) -> FormulaResult<f64> {
        self.as_number()
            .ok_or_else(|| FormulaError::type_mismatch(format!("cannot convert {} to a number", self.as_string())))
    }

    /// Convert to boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FormulaValue::Boolean(b) => Some(*b),
            FormulaValue::Number(n) => Some(*n != 0.0),
            FormulaValue::Empty => Some(false),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("TRUE") => Some(true),
            FormulaValue::String(s) if s.eq_ignore_ascii_case("FALSE") => Some(false),
            _ => None,
        }
    }

    /// Force conversion to boolean
    pub fn to_bool(&self) -> FormulaResult<bool> {
        self.as_bool()
            .ok_or_else(|| FormulaError::type_mismatch(format!("cannot convert {} to a boolean", self.as_string())))
    }

    /// Convert to string
    pub fn as_string(&self) -> String {
        match self {
            FormulaValue::Number(n) => format_number(*n),
            FormulaValue::String(s) => s.clone(),
            FormulaValue::Boolean(true) => "TRUE".to_string(),
            FormulaValue::Boolean(false) => "FALSE".to_string(),
            FormulaValue::Error(e) => e.to_string(),
            FormulaValue::Empty => String::new(),
            FormulaValue::Array(_) => CellError::Value.to_string(),
        }
    }

    /// Check if this is an error
    pub fn is_error(&self) -> bool {
        matches!(self, FormulaValue::Error(_))
    }

    /// Get the error if this is one
    pub fn get_error(&self) -> Option<CellError> {
        match self {
            FormulaValue::Error(e) => Some(*e),
            _ => None,
        }
    }

    /// Iterate over scalar values, flattening arrays row-major
    pub fn flatten(&self) -> Vec<&FormulaValue> {
        match self {
            FormulaValue::Array(rows) => rows.iter().flatten().collect(),
            other => vec![other],
        }
    }
}

impl From<CellValue> for FormulaValue {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Empty => FormulaValue::Empty,
            CellValue::Number(n) => FormulaValue::Number(n),
            CellValue::String(s) => FormulaValue::String(s),
            CellValue::Boolean(b) => FormulaValue::Boolean(b),
            CellValue::Error(e) => FormulaValue::Error(e),
        }
    }
}

impl From<FormulaValue> for CellValue {
    fn from(value: FormulaValue) -> Self {
        match value {
            FormulaValue::Empty => CellValue::Empty,
            FormulaValue::Number(n) if !n.is_finite() => CellValue::Error(CellError::Num),
            FormulaValue::Number(n) => CellValue::Number(n),
            FormulaValue::String(s) => CellValue::String(s),
            FormulaValue::Boolean(b) => CellValue::Boolean(b),
            FormulaValue::Error(e) => CellValue::Error(e),
            FormulaValue::Array(_) => CellValue::Error(CellError::Value),
        }
    }
}

/// Read access to workbook data for the evaluator
pub trait CellSource {
    /// Resolve a sheet name (case-insensitive) to its id
    fn sheet_id(&self, name: &str) -> Option<SheetId>;

    /// Current value of a cell; formula cells report their cached result
    fn cell_value(&self, sheet: SheetId, row: u32, col: u16) -> CellValue;

    /// Resolve a named range visible from `sheet`
    fn resolve_name(&self, sheet: SheetId, name: &str) -> Option<RangePosition>;
}

/// Context for formula evaluation
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Source of cell values
    pub source: &'a dyn CellSource,
    /// Sheet owning the formula
    pub sheet: SheetId,
    /// Row of the formula cell
    pub row: u32,
    /// Column of the formula cell
    pub col: u16,
}

impl<'a> EvaluationContext<'a> {
    /// Create a new evaluation context
    pub fn new(source: &'a dyn CellSource, sheet: SheetId, row: u32, col: u16) -> Self {
        Self {
            source,
            sheet,
            row,
            col,
        }
    }

    /// Resolve an optional sheet qualifier to a sheet id
    pub fn resolve_sheet(&self, sheet: Option<&str>) -> Option<SheetId> {
        match sheet {
            None => Some(self.sheet),
            Some(name) => self.source.sheet_id(name),
        }
    }

    /// Get a single cell value
    pub fn get_cell_value(&self, sheet: Option<&str>, row: u32, col: u16) -> FormulaValue {
        match self.resolve_sheet(sheet) {
            Some(id) => self.source.cell_value(id, row, col).into(),
            None => FormulaValue::Error(CellError::Ref),
        }
    }

    /// Get the values of a range; single cells are returned as scalars
    pub fn get_range_values(&self, sheet: Option<&str>, range: RangePosition) -> FormulaValue {
        let Some(id) = self.resolve_sheet(sheet) else {
            return FormulaValue::Error(CellError::Ref);
        };
        if range.is_single_cell() {
            return self.source.cell_value(id, range.row, range.col).into();
        }
        let rows = (range.row..=range.end_row())
            .map(|row| {
                (range.col..=range.end_col())
                    .map(|col| self.source.cell_value(id, row, col).into())
                    .collect()
            })
            .collect();
        FormulaValue::Array(rows)
    }

    /// Look up a named range and read its values
    pub fn resolve_named_range(&self, name: &str) -> FormulaResult<FormulaValue> {
        let range = self
            .source
            .resolve_name(self.sheet, name)
            .ok_or_else(|| FormulaError::NameNotFound(name.to_string()))?;
        Ok(self.get_range_values(None, range))
    }
}

/// Evaluate a formula expression
pub fn evaluate(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match expr {
        // === Literals ===
        FormulaExpr::Number(n) => Ok(FormulaValue::Number(*n)),
        FormulaExpr::String(s) => Ok(FormulaValue::String(s.clone())),
        FormulaExpr::Boolean(b) => Ok(FormulaValue::Boolean(*b)),
        FormulaExpr::Error(e) => Ok(FormulaValue::Error(*e)),

        // === References ===
        FormulaExpr::CellRef(r) => Ok(ctx.get_cell_value(
            r.sheet.as_deref(),
            r.position.row,
            r.position.col,
        )),
        FormulaExpr::RangeRef(r) => Ok(ctx.get_range_values(r.sheet.as_deref(), r.range())),
        FormulaExpr::NameRef(name) => ctx.resolve_named_range(name),

        // === Operators ===
        FormulaExpr::BinaryOp { op, left, right } => evaluate_binary_op(*op, left, right, ctx),
        FormulaExpr::UnaryOp { op, operand } => evaluate_unary_op(*op, operand, ctx),
        FormulaExpr::Paren(inner) => evaluate(inner, ctx),

        // === Functions ===
        FormulaExpr::Function { name, args } => evaluate_function(name, args, ctx),
    }
}

/// Reduce a range result to the scalar an operator works on
fn scalar(value: FormulaValue) -> FormulaResult<FormulaValue> {
    match value {
        FormulaValue::Array(_) => Err(FormulaError::type_mismatch("range used where a single value is expected")),
        other => Ok(other),
    }
}

/// Evaluate a binary operation
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &FormulaExpr,
    right: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let left_val = scalar(evaluate(left, ctx)?)?;
    let right_val = scalar(evaluate(right, ctx)?)?;

    // Propagate errors
    if let Some(e) = left_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }
    if let Some(e) = right_val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let number = |l: f64, r: f64, f: fn(f64, f64) -> f64| -> FormulaValue {
        let result = f(l, r);
        if result.is_finite() {
            FormulaValue::Number(result)
        } else {
            FormulaValue::Error(CellError::Num)
        }
    };

    match op {
        BinaryOperator::Add => Ok(number(left_val.to_number()?, right_val.to_number()?, |l, r| l + r)),
        BinaryOperator::Subtract => Ok(number(left_val.to_number()?, right_val.to_number()?, |l, r| l - r)),
        BinaryOperator::Multiply => Ok(number(left_val.to_number()?, right_val.to_number()?, |l, r| l * r)),
        BinaryOperator::Divide => {
            let l = left_val.to_number()?;
            let r = right_val.to_number()?;
            if r == 0.0 {
                Ok(FormulaValue::Error(CellError::Div0))
            } else {
                Ok(FormulaValue::Number(l / r))
            }
        }
        BinaryOperator::Power => Ok(number(left_val.to_number()?, right_val.to_number()?, f64::powf)),

        BinaryOperator::Equal => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_eq())),
        BinaryOperator::NotEqual => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_ne())),
        BinaryOperator::LessThan => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_lt())),
        BinaryOperator::LessEqual => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_le())),
        BinaryOperator::GreaterThan => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_gt())),
        BinaryOperator::GreaterEqual => Ok(FormulaValue::Boolean(compare_values(&left_val, &right_val).is_ge())),

        BinaryOperator::Concat => Ok(FormulaValue::String(left_val.as_string() + &right_val.as_string())),
    }
}

/// Compare two scalar values the way spreadsheet comparison operators do.
///
/// Empty compares as 0 against numbers and "" against text. Across types,
/// numbers sort before text, and text before booleans.
pub fn compare_values(left: &FormulaValue, right: &FormulaValue) -> Ordering {
    fn rank(v: &FormulaValue) -> u8 {
        match v {
            FormulaValue::Number(_) | FormulaValue::Empty => 0,
            FormulaValue::String(_) => 1,
            FormulaValue::Boolean(_) => 2,
            _ => 3,
        }
    }

    match (left, right) {
        (FormulaValue::Empty, FormulaValue::String(s)) => "".cmp(s.to_lowercase().as_str()),
        (FormulaValue::String(s), FormulaValue::Empty) => s.to_lowercase().as_str().cmp(""),
        (FormulaValue::String(l), FormulaValue::String(r)) => l.to_lowercase().cmp(&r.to_lowercase()),
        (FormulaValue::Boolean(l), FormulaValue::Boolean(r)) => l.cmp(r),
        (l, r) if rank(l) == 0 && rank(r) == 0 => {
            let l = l.as_number().unwrap_or(0.0);
            let r = r.as_number().unwrap_or(0.0);
            l.partial_cmp(&r).unwrap_or(Ordering::Equal)
        }
        (l, r) => rank(l).cmp(&rank(r)),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(
    op: UnaryOperator,
    operand: &FormulaExpr,
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let val = scalar(evaluate(operand, ctx)?)?;

    if let Some(e) = val.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let n = val.to_number()?;
    match op {
        UnaryOperator::Negate => Ok(FormulaValue::Number(-n)),
        UnaryOperator::Percent => Ok(FormulaValue::Number(n / 100.0)),
    }
}

/// Evaluate a function call
fn evaluate_function(
    name: &str,
    args: &[FormulaExpr],
    ctx: &EvaluationContext,
) -> FormulaResult<FormulaValue> {
    let registry = get_function_registry();

    let func = registry
        .get(name)
        .ok_or_else(|| FormulaError::UnknownFunction(name.to_string()))?;

    if args.len() < func.min_args {
        return Err(FormulaError::ParameterMismatch {
            function: name.to_string(),
            expected: format!("at least {}", func.min_args),
            actual: args.len(),
        });
    }
    if let Some(max) = func.max_args {
        if args.len() > max {
            return Err(FormulaError::ParameterMismatch {
                function: name.to_string(),
                expected: format!("at most {}", max),
                actual: args.len(),
            });
        }
    }

    match func.implementation {
        FunctionImpl::Values(f) => {
            let mut evaluated = Vec::with_capacity(args.len());
            for arg in args {
                evaluated.push(evaluate(arg, ctx)?);
            }
            f(&evaluated, ctx)
        }
        FunctionImpl::Expressions(f) => f(args, ctx),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2").unwrap(), FormulaValue::Number(3.0));
        assert_eq!(eval("=10-3").unwrap(), FormulaValue::Number(7.0));
        assert_eq!(eval("=4*5").unwrap(), FormulaValue::Number(20.0));
        assert_eq!(eval("=20/4").unwrap(), FormulaValue::Number(5.0));
        assert_eq!(eval("=2^10").unwrap(), FormulaValue::Number(1024.0));
        assert_eq!(eval("=(1+2)*3").unwrap(), FormulaValue::Number(9.0));
    }

    #[test]
    fn test_evaluate_unary() {
        assert_eq!(eval("=-5").unwrap(), FormulaValue::Number(-5.0));
        assert_eq!(eval("=50%").unwrap(), FormulaValue::Number(0.5));
        assert_eq!(eval("=--5").unwrap(), FormulaValue::Number(5.0));
    }

    #[test]
    fn test_evaluate_comparison() {
        assert_eq!(eval("=1<2").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=5<>5").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(eval("=\"abc\"=\"ABC\"").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=1<\"a\"").unwrap(), FormulaValue::Boolean(true));
    }

    #[test]
    fn test_division_by_zero_is_a_value() {
        assert_eq!(eval("=1/0").unwrap(), FormulaValue::Error(CellError::Div0));
        assert_eq!(eval("=#REF!+1").unwrap(), FormulaValue::Error(CellError::Ref));
    }

    #[test]
    fn test_text_arithmetic_is_type_mismatch() {
        assert!(matches!(eval("=1+\"abc\""), Err(FormulaError::TypeMismatch(_))));
        assert_eq!(eval("=1+\"2\"").unwrap(), FormulaValue::Number(3.0));
    }

    #[test]
    fn test_references() {
        let mut source = MapSource::new();
        source.set(0, "A1", 10.0);
        source.set(0, "A2", 32.0);
        source.set(1, "B1", "x");
        assert_eq!(eval_in(&source, "=A1+A2").unwrap(), FormulaValue::Number(42.0));
        assert_eq!(eval_in(&source, "=Sheet2!B1").unwrap(), FormulaValue::String("x".into()));
        assert_eq!(eval_in(&source, "=Missing!B1").unwrap(), FormulaValue::Error(CellError::Ref));
        assert_eq!(eval_in(&source, "=A3+1").unwrap(), FormulaValue::Number(1.0));
    }

    #[test]
    fn test_names() {
        let mut source = MapSource::new();
        source.set(0, "B2", 7.0);
        source.names.insert("rate".into(), RangePosition::parse("B2").unwrap());
        assert_eq!(eval_in(&source, "=Rate*2").unwrap(), FormulaValue::Number(14.0));
        assert!(matches!(eval_in(&source, "=nope"), Err(FormulaError::NameNotFound(_))));
    }

    #[test]
    fn test_function_errors() {
        assert!(matches!(eval("=NOSUCH(1)"), Err(FormulaError::UnknownFunction(_))));
        assert!(matches!(eval("=ABS(1,2)"), Err(FormulaError::ParameterMismatch { .. })));
    }

    #[test]
    fn test_range_in_scalar_context() {
        assert!(matches!(eval("=A1:B2+1"), Err(FormulaError::TypeMismatch(_))));
    }
}

//! Built-in functions

pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod text;

use crate::ast::FormulaExpr;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use ahash::AHashMap;

/// Implementation taking evaluated arguments
pub type ValueFn = fn(&[FormulaValue], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// Implementation taking unevaluated arguments
///
/// Used by functions that inspect a reference itself (ROW, COLUMN) or only
/// evaluate some of their arguments (IF, IFERROR).
pub type ExpressionFn = fn(&[FormulaExpr], &EvaluationContext) -> FormulaResult<FormulaValue>;

/// How a function receives its arguments
#[derive(Clone, Copy)]
pub enum FunctionImpl {
    Values(ValueFn),
    Expressions(ExpressionFn),
}

/// Function definition
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    /// Implementation
    pub implementation: FunctionImpl,
}

/// Function registry
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionRegistry {
    /// Create a new registry with all built-in functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: AHashMap::new(),
        };

        registry.register_math_functions();
        registry.register_logical_functions();
        registry.register_text_functions();
        registry.register_info_functions();
        registry.register_lookup_functions();

        registry
    }

    /// Look up a function by name
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    /// Register a function
    pub fn register(&mut self, def: FunctionDef) {
        self.functions.insert(def.name.to_ascii_uppercase(), def);
    }

    fn values(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, f: ValueFn) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation: FunctionImpl::Values(f),
        });
    }

    fn expressions(&mut self, name: &'static str, min_args: usize, max_args: Option<usize>, f: ExpressionFn) {
        self.register(FunctionDef {
            name,
            min_args,
            max_args,
            implementation: FunctionImpl::Expressions(f),
        });
    }

    fn register_math_functions(&mut self) {
        self.values("SUM", 1, None, math::fn_sum);
        self.values("AVERAGE", 1, None, math::fn_average);
        self.values("MIN", 1, None, math::fn_min);
        self.values("MAX", 1, None, math::fn_max);
        self.values("COUNT", 1, None, math::fn_count);
        self.values("ABS", 1, Some(1), math::fn_abs);
        self.values("ROUND", 1, Some(2), math::fn_round);
    }

    fn register_logical_functions(&mut self) {
        self.expressions("IF", 1, Some(3), logical::fn_if);
        self.expressions("IFERROR", 2, Some(2), logical::fn_iferror);
        self.values("AND", 1, None, logical::fn_and);
        self.values("OR", 1, None, logical::fn_or);
        self.values("NOT", 1, Some(1), logical::fn_not);
    }

    fn register_text_functions(&mut self) {
        self.values("CONCATENATE", 1, None, text::fn_concatenate);
        self.values("LEN", 1, Some(1), text::fn_len);
        self.values("UPPER", 1, Some(1), text::fn_upper);
        self.values("LOWER", 1, Some(1), text::fn_lower);
    }

    fn register_info_functions(&mut self) {
        self.values("ISBLANK", 1, Some(1), info::fn_isblank);
    }

    fn register_lookup_functions(&mut self) {
        self.expressions("ROW", 0, Some(1), lookup::fn_row);
        self.expressions("COLUMN", 0, Some(1), lookup::fn_column);
        self.values("ADDRESS", 2, Some(5), lookup::fn_address);
        self.values("INDIRECT", 1, Some(2), lookup::fn_indirect);
    }
}

/// Numbers from a list of arguments, with spreadsheet aggregation rules.
///
/// Direct arguments are coerced (booleans and numeric text count); inside
/// ranges only real numbers count. The first error value wins.
pub(crate) fn collect_numbers(args: &[FormulaValue]) -> Result<Vec<f64>, FormulaValue> {
    let mut numbers = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        FormulaValue::Number(n) => numbers.push(*n),
                        FormulaValue::Error(e) => return Err(FormulaValue::Error(*e)),
                        _ => {}
                    }
                }
            }
            FormulaValue::Error(e) => return Err(FormulaValue::Error(*e)),
            FormulaValue::Empty => {}
            other => match other.as_number() {
                Some(n) => numbers.push(n),
                None => return Err(FormulaValue::Error(sheetflow_core::CellError::Value)),
            },
        }
    }
    Ok(numbers)
}

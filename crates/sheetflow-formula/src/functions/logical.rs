//! Logical functions

use crate::ast::FormulaExpr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate, EvaluationContext, FormulaValue};
use sheetflow_core::CellError;

/// IF function; only the chosen branch is evaluated
pub fn fn_if(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let condition = match args.first() {
        Some(expr) => evaluate(expr, ctx)?,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    if let Some(e) = condition.get_error() {
        return Ok(FormulaValue::Error(e));
    }

    let branch = if condition.to_bool()? { args.get(1) } else { args.get(2) };
    match branch {
        Some(expr) => evaluate(expr, ctx),
        // IF(cond) / IF(cond, x) yield the boolean itself when a branch is missing
        None => Ok(FormulaValue::Boolean(condition.to_bool()?)),
    }
}

/// IFERROR function
///
/// Falls back on error values and on evaluation failures that a spreadsheet
/// would show as an error value. Argument-count mistakes are not caught.
pub fn fn_iferror(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let (Some(value), Some(fallback)) = (args.first(), args.get(1)) else {
        return Ok(FormulaValue::Error(CellError::Value));
    };
    match evaluate(value, ctx) {
        Ok(v) if !v.is_error() => Ok(v),
        Ok(_) => evaluate(fallback, ctx),
        Err(e @ FormulaError::ParameterMismatch { .. }) => Err(e),
        Err(_) => evaluate(fallback, ctx),
    }
}

/// Booleans from a list of arguments; text inside ranges is skipped
fn collect_bools(args: &[FormulaValue]) -> FormulaResult<Result<Vec<bool>, CellError>> {
    let mut bools = Vec::new();
    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                for cell in rows.iter().flatten() {
                    match cell {
                        FormulaValue::Boolean(b) => bools.push(*b),
                        FormulaValue::Number(n) => bools.push(*n != 0.0),
                        FormulaValue::Error(e) => return Ok(Err(*e)),
                        _ => {}
                    }
                }
            }
            FormulaValue::Error(e) => return Ok(Err(*e)),
            FormulaValue::Empty => {}
            other => bools.push(other.to_bool()?),
        }
    }
    if bools.is_empty() {
        return Ok(Err(CellError::Value));
    }
    Ok(Ok(bools))
}

/// AND function
pub fn fn_and(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_bools(args)? {
        Ok(bools) => FormulaValue::Boolean(bools.iter().all(|b| *b)),
        Err(e) => FormulaValue::Error(e),
    })
}

/// OR function
pub fn fn_or(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_bools(args)? {
        Ok(bools) => FormulaValue::Boolean(bools.iter().any(|b| *b)),
        Err(e) => FormulaValue::Error(e),
    })
}

/// NOT function
pub fn fn_not(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.first() {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => Ok(FormulaValue::Boolean(!v.to_bool()?)),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

#[cfg(test)]
mod tests {
    use crate::error::FormulaError;
    use crate::evaluator::test_support::eval;
    use crate::evaluator::FormulaValue;
    use sheetflow_core::CellError;

    #[test]
    fn test_if_is_lazy() {
        assert_eq!(eval("=IF(1>0,\"yes\",1+\"x\")").unwrap(), FormulaValue::String("yes".into()));
        assert_eq!(eval("=IF(FALSE,1)").unwrap(), FormulaValue::Boolean(false));
        assert!(eval("=IF(TRUE,,2)").is_err());
        assert!(matches!(eval("=IF(\"maybe\",1,2)"), Err(FormulaError::TypeMismatch(_))));
    }

    #[test]
    fn test_iferror() {
        assert_eq!(eval("=IFERROR(1/0,-1)").unwrap(), FormulaValue::Number(-1.0));
        assert_eq!(eval("=IFERROR(1+\"x\",\"bad\")").unwrap(), FormulaValue::String("bad".into()));
        assert_eq!(eval("=IFERROR(5,0)").unwrap(), FormulaValue::Number(5.0));
        assert!(eval("=IFERROR(ABS(1,2),0)").is_err());
    }

    #[test]
    fn test_and_or_not() {
        assert_eq!(eval("=AND(TRUE,1,2>1)").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=AND(TRUE,0)").unwrap(), FormulaValue::Boolean(false));
        assert_eq!(eval("=OR(FALSE,0,1)").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=NOT(FALSE)").unwrap(), FormulaValue::Boolean(true));
        assert_eq!(eval("=AND(A1:A3)").unwrap(), FormulaValue::Error(CellError::Value));
    }
}

//! Math and aggregation functions

use super::collect_numbers;
use crate::error::FormulaResult;
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetflow_core::CellError;

/// SUM function
pub fn fn_sum(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_numbers(args) {
        Ok(numbers) => FormulaValue::Number(numbers.iter().sum()),
        Err(e) => e,
    })
}

/// AVERAGE function
pub fn fn_average(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_numbers(args) {
        Ok(numbers) if numbers.is_empty() => FormulaValue::Error(CellError::Div0),
        Ok(numbers) => FormulaValue::Number(numbers.iter().sum::<f64>() / numbers.len() as f64),
        Err(e) => e,
    })
}

/// MIN function; 0 when there are no numbers
pub fn fn_min(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_numbers(args) {
        Ok(numbers) => FormulaValue::Number(numbers.into_iter().reduce(f64::min).unwrap_or(0.0)),
        Err(e) => e,
    })
}

/// MAX function; 0 when there are no numbers
pub fn fn_max(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match collect_numbers(args) {
        Ok(numbers) => FormulaValue::Number(numbers.into_iter().reduce(f64::max).unwrap_or(0.0)),
        Err(e) => e,
    })
}

/// COUNT function; errors and text are skipped, never propagated
pub fn fn_count(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut count = 0usize;
    for arg in args {
        match arg {
            FormulaValue::Array(rows) => {
                count += rows
                    .iter()
                    .flatten()
                    .filter(|v| matches!(v, FormulaValue::Number(_)))
                    .count();
            }
            FormulaValue::Number(_) | FormulaValue::Boolean(_) => count += 1,
            FormulaValue::String(s) if s.trim().parse::<f64>().is_ok() => count += 1,
            _ => {}
        }
    }
    Ok(FormulaValue::Number(count as f64))
}

/// ABS function
pub fn fn_abs(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    match args.first() {
        Some(FormulaValue::Error(e)) => Ok(FormulaValue::Error(*e)),
        Some(v) => Ok(FormulaValue::Number(v.to_number()?.abs())),
        None => Ok(FormulaValue::Error(CellError::Value)),
    }
}

/// ROUND function (half away from zero)
pub fn fn_round(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let number = match args.first() {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => v.to_number()?,
        None => return Ok(FormulaValue::Error(CellError::Value)),
    };
    let digits = match args.get(1) {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(v) => v.to_number()?.trunc() as i32,
        None => 0,
    };

    let multiplier = 10_f64.powi(digits);
    Ok(FormulaValue::Number((number * multiplier).round() / multiplier))
}

#[cfg(test)]
mod tests {
    use crate::evaluator::test_support::{eval, eval_in, MapSource};
    use crate::evaluator::FormulaValue;
    use sheetflow_core::CellError;

    #[test]
    fn test_sum_and_average() {
        let mut source = MapSource::new();
        source.set(0, "A1", 1.0);
        source.set(0, "A2", 2.0);
        source.set(0, "A3", "text");
        source.set(0, "A4", 3.0);
        assert_eq!(eval_in(&source, "=SUM(A1:A4)").unwrap(), FormulaValue::Number(6.0));
        assert_eq!(eval_in(&source, "=AVERAGE(A1:A4)").unwrap(), FormulaValue::Number(2.0));
        assert_eq!(eval_in(&source, "=SUM(A1:A4,TRUE,\"4\")").unwrap(), FormulaValue::Number(11.0));
        assert_eq!(eval("=SUM(\"x\")").unwrap(), FormulaValue::Error(CellError::Value));
        assert_eq!(eval("=AVERAGE(B1:B3)").unwrap(), FormulaValue::Error(CellError::Div0));
    }

    #[test]
    fn test_errors_propagate_through_aggregates() {
        let mut source = MapSource::new();
        source.set(0, "A1", 1.0);
        source.set(0, "A2", CellError::Na);
        assert_eq!(eval_in(&source, "=SUM(A1:A2)").unwrap(), FormulaValue::Error(CellError::Na));
        assert_eq!(eval_in(&source, "=COUNT(A1:A2)").unwrap(), FormulaValue::Number(1.0));
    }

    #[test]
    fn test_min_max_count() {
        assert_eq!(eval("=MIN(3,-1,2)").unwrap(), FormulaValue::Number(-1.0));
        assert_eq!(eval("=MAX(3,-1,2)").unwrap(), FormulaValue::Number(3.0));
        assert_eq!(eval("=MAX(A1:A3)").unwrap(), FormulaValue::Number(0.0));
        assert_eq!(eval("=COUNT(1,\"a\",2)").unwrap(), FormulaValue::Number(2.0));
    }

    #[test]
    fn test_abs_round() {
        assert_eq!(eval("=ABS(-4)").unwrap(), FormulaValue::Number(4.0));
        assert_eq!(eval("=ROUND(2.5)").unwrap(), FormulaValue::Number(3.0));
        assert_eq!(eval("=ROUND(-2.5)").unwrap(), FormulaValue::Number(-3.0));
        assert_eq!(eval("=ROUND(3.14159,2)").unwrap(), FormulaValue::Number(3.14));
        assert_eq!(eval("=ROUND(1234,-2)").unwrap(), FormulaValue::Number(1200.0));
    }
}

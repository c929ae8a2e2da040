//! Text functions

use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{EvaluationContext, FormulaValue};
use sheetflow_core::CellError;

fn single_text(args: &[FormulaValue]) -> FormulaResult<Result<String, CellError>> {
    match args.first() {
        Some(FormulaValue::Error(e)) => Ok(Err(*e)),
        Some(FormulaValue::Array(_)) => Err(FormulaError::type_mismatch("range used where text is expected")),
        Some(v) => Ok(Ok(v.as_string())),
        None => Ok(Err(CellError::Value)),
    }
}

/// CONCATENATE function
pub fn fn_concatenate(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let mut out = String::new();
    for arg in args {
        match arg {
            FormulaValue::Error(e) => return Ok(FormulaValue::Error(*e)),
            FormulaValue::Array(_) => {
                return Err(FormulaError::type_mismatch("CONCATENATE does not accept ranges"))
            }
            v => out.push_str(&v.as_string()),
        }
    }
    Ok(FormulaValue::String(out))
}

/// LEN function (characters, not bytes)
pub fn fn_len(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match single_text(args)? {
        Ok(s) => FormulaValue::Number(s.chars().count() as f64),
        Err(e) => FormulaValue::Error(e),
    })
}

/// UPPER function
pub fn fn_upper(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match single_text(args)? {
        Ok(s) => FormulaValue::String(s.to_uppercase()),
        Err(e) => FormulaValue::Error(e),
    })
}

/// LOWER function
pub fn fn_lower(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    Ok(match single_text(args)? {
        Ok(s) => FormulaValue::String(s.to_lowercase()),
        Err(e) => FormulaValue::Error(e),
    })
}

#[cfg(test)]
mod tests {
    use crate::evaluator::test_support::eval;
    use crate::evaluator::FormulaValue;

    #[test]
    fn test_text_functions() {
        assert_eq!(
            eval("=CONCATENATE(\"a\",1,TRUE)").unwrap(),
            FormulaValue::String("a1TRUE".into())
        );
        assert_eq!(eval("=LEN(\"héllo\")").unwrap(), FormulaValue::Number(5.0));
        assert_eq!(eval("=UPPER(\"abc\")").unwrap(), FormulaValue::String("ABC".into()));
        assert_eq!(eval("=LOWER(\"ABC\")").unwrap(), FormulaValue::String("abc".into()));
        assert!(eval("=CONCATENATE(A1:A2)").is_err());
    }
}

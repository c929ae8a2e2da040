//! Reference functions
//!
//! ROW and COLUMN read the address of their argument rather than its value.
//! INDIRECT turns text into a reference at evaluation time, so whatever it
//! reads is not known until the formula runs.

use crate::ast::{format_sheet_name, FormulaExpr};
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{evaluate, EvaluationContext, FormulaValue};
use crate::parser::parse_formula;
use sheetflow_core::position::column_to_letters;
use sheetflow_core::{CellError, RangePosition};

/// Range named by a reference-like argument
fn reference_range(expr: &FormulaExpr, ctx: &EvaluationContext) -> FormulaResult<RangePosition> {
    match expr {
        FormulaExpr::CellRef(r) => Ok(RangePosition::single(r.position)),
        FormulaExpr::RangeRef(r) => Ok(r.range()),
        FormulaExpr::NameRef(name) => ctx
            .source
            .resolve_name(ctx.sheet, name)
            .ok_or_else(|| FormulaError::NameNotFound(name.clone())),
        FormulaExpr::Paren(inner) => reference_range(inner, ctx),
        other => Err(FormulaError::type_mismatch(format!("{} is not a reference", other))),
    }
}

/// ROW function (1-based)
pub fn fn_row(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let row = match args.first() {
        Some(expr) => reference_range(expr, ctx)?.row,
        None => ctx.row,
    };
    Ok(FormulaValue::Number(row as f64 + 1.0))
}

/// COLUMN function (1-based)
pub fn fn_column(args: &[FormulaExpr], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let col = match args.first() {
        Some(expr) => reference_range(expr, ctx)?.col,
        None => ctx.col,
    };
    Ok(FormulaValue::Number(col as f64 + 1.0))
}

/// ADDRESS(row, column, [abs_num], [a1], [sheet_text])
///
/// `abs_num`: 1 = `$A$1`, 2 = `A$1`, 3 = `$A1`, 4 = `A1`.
pub fn fn_address(args: &[FormulaValue], _ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    for arg in args {
        if let Some(e) = arg.get_error() {
            return Ok(FormulaValue::Error(e));
        }
    }
    let row = args.first().map(|v| v.to_number()).transpose()?.unwrap_or(0.0).trunc();
    let col = args.get(1).map(|v| v.to_number()).transpose()?.unwrap_or(0.0).trunc();
    let abs_num = args.get(2).map(|v| v.to_number()).transpose()?.unwrap_or(1.0).trunc();
    let a1 = args.get(3).map(|v| v.to_bool()).transpose()?.unwrap_or(true);

    if row < 1.0
        || col < 1.0
        || row > sheetflow_core::MAX_ROWS as f64
        || col > sheetflow_core::MAX_COLS as f64
        || !(1.0..=4.0).contains(&abs_num)
    {
        return Ok(FormulaValue::Error(CellError::Value));
    }
    let (row_abs, col_abs) = match abs_num as u8 {
        1 => (true, true),
        2 => (true, false),
        3 => (false, true),
        _ => (false, false),
    };

    let mut out = String::new();
    if let Some(sheet) = args.get(4) {
        let name = sheet.as_string();
        if !name.is_empty() {
            out.push_str(&format_sheet_name(&name));
            out.push('!');
        }
    }

    if a1 {
        if col_abs {
            out.push('$');
        }
        out.push_str(&column_to_letters(col as u16 - 1));
        if row_abs {
            out.push('$');
        }
        out.push_str(&format!("{}", row as u32));
    } else {
        let axis = |prefix: char, n: f64, abs: bool| {
            if abs {
                format!("{}{}", prefix, n as u32)
            } else {
                format!("{}[{}]", prefix, n as u32)
            }
        };
        out.push_str(&axis('R', row, row_abs));
        out.push_str(&axis('C', col, col_abs));
    }

    Ok(FormulaValue::String(out))
}

/// INDIRECT(ref_text, [a1])
///
/// Only A1-style text is supported; anything that does not parse to a
/// reference yields `#REF!`.
pub fn fn_indirect(args: &[FormulaValue], ctx: &EvaluationContext) -> FormulaResult<FormulaValue> {
    let text = match args.first() {
        Some(FormulaValue::Error(e)) => return Ok(FormulaValue::Error(*e)),
        Some(FormulaValue::String(s)) => s.clone(),
        _ => return Ok(FormulaValue::Error(CellError::Ref)),
    };
    if let Some(a1) = args.get(1) {
        if !a1.to_bool()? {
            return Ok(FormulaValue::Error(CellError::Ref));
        }
    }

    match parse_formula(&text) {
        Ok(expr @ (FormulaExpr::CellRef(_) | FormulaExpr::RangeRef(_))) => evaluate(&expr, ctx),
        Ok(FormulaExpr::NameRef(name)) => match ctx.source.resolve_name(ctx.sheet, &name) {
            Some(range) => Ok(ctx.get_range_values(None, range)),
            None => Ok(FormulaValue::Error(CellError::Ref)),
        },
        _ => {
            log::debug!("INDIRECT could not resolve {:?}", text);
            Ok(FormulaValue::Error(CellError::Ref))
        }
    }
}

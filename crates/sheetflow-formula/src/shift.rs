//! Structural reference rewriting
//!
//! [`offset_references`] moves a formula the way a copy does: relative axes
//! follow the delta, absolute axes stay. The `adjust_for_removed_*` functions
//! rewrite references after a band of rows or columns has been deleted.

use crate::ast::{CellReference, FormulaExpr, RangeReference};
use sheetflow_core::{CellError, CellPosition};

/// Shift every relative axis of every reference by the given delta.
///
/// References pushed off the grid become `#REF!`. Names are left alone.
pub fn offset_references(expr: &FormulaExpr, row_delta: i64, col_delta: i64) -> FormulaExpr {
    if row_delta == 0 && col_delta == 0 {
        return expr.clone();
    }
    expr.map(&mut |node| match node {
        FormulaExpr::CellRef(r) => match r.position.offset(row_delta, col_delta) {
            Some(position) => FormulaExpr::CellRef(CellReference {
                sheet: r.sheet,
                position,
            }),
            None => FormulaExpr::Error(CellError::Ref),
        },
        FormulaExpr::RangeRef(r) => {
            match (
                r.start.offset(row_delta, col_delta),
                r.end.offset(row_delta, col_delta),
            ) {
                (Some(start), Some(end)) => {
                    FormulaExpr::RangeRef(RangeReference::new(r.sheet, start, end))
                }
                _ => FormulaExpr::Error(CellError::Ref),
            }
        }
        other => other,
    })
}

/// Rewrite references after `count` rows starting at `start` were removed.
///
/// `targets_sheet` decides, from a reference's optional sheet qualifier,
/// whether the reference points at the sheet that lost the rows.
pub fn adjust_for_removed_rows<F>(expr: &FormulaExpr, targets_sheet: F, start: u32, count: u32) -> FormulaExpr
where
    F: Fn(Option<&str>) -> bool,
{
    adjust_for_removed(expr, &targets_sheet, Axis::Row, start, count)
}

/// Rewrite references after `count` columns starting at `start` were removed.
pub fn adjust_for_removed_columns<F>(
    expr: &FormulaExpr,
    targets_sheet: F,
    start: u16,
    count: u16,
) -> FormulaExpr
where
    F: Fn(Option<&str>) -> bool,
{
    adjust_for_removed(expr, &targets_sheet, Axis::Col, start as u32, count as u32)
}

#[derive(Clone, Copy)]
enum Axis {
    Row,
    Col,
}

fn axis_value(pos: &CellPosition, axis: Axis) -> u32 {
    match axis {
        Axis::Row => pos.row,
        Axis::Col => pos.col as u32,
    }
}

fn with_axis_value(mut pos: CellPosition, axis: Axis, value: u32) -> CellPosition {
    match axis {
        Axis::Row => pos.row = value,
        Axis::Col => pos.col = value as u16,
    }
    pos
}

fn adjust_for_removed<F>(expr: &FormulaExpr, targets_sheet: &F, axis: Axis, start: u32, count: u32) -> FormulaExpr
where
    F: Fn(Option<&str>) -> bool,
{
    if count == 0 {
        return expr.clone();
    }
    let end = start + count;

    expr.map(&mut |node| match node {
        FormulaExpr::CellRef(r) if targets_sheet(r.sheet.as_deref()) => {
            let v = axis_value(&r.position, axis);
            if v < start {
                FormulaExpr::CellRef(r)
            } else if v >= end {
                FormulaExpr::CellRef(CellReference {
                    position: with_axis_value(r.position, axis, v - count),
                    sheet: r.sheet,
                })
            } else {
                FormulaExpr::Error(CellError::Ref)
            }
        }
        FormulaExpr::RangeRef(r) if targets_sheet(r.sheet.as_deref()) => {
            let first = axis_value(&r.start, axis);
            let last = axis_value(&r.end, axis);
            if first >= start && last < end {
                return FormulaExpr::Error(CellError::Ref);
            }
            let new_first = if first < start {
                first
            } else if first >= end {
                first - count
            } else {
                start
            };
            let new_last = if last < start {
                last
            } else if last >= end {
                last - count
            } else {
                start - 1
            };
            FormulaExpr::RangeRef(RangeReference {
                sheet: r.sheet,
                start: with_axis_value(r.start, axis, new_first),
                end: with_axis_value(r.end, axis, new_last),
            })
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_formula;
    use pretty_assertions::assert_eq;

    fn shifted(text: &str, rows: i64, cols: i64) -> String {
        offset_references(&parse_formula(text).unwrap(), rows, cols).to_string()
    }

    #[test]
    fn test_offset_relative_and_absolute() {
        assert_eq!(shifted("=A1", 0, 1), "B1");
        assert_eq!(shifted("=$A$1", 0, 3), "$A$1");
        assert_eq!(shifted("=$A1+A$1", 2, 2), "$A3+C$1");
        assert_eq!(shifted("=SUM(A1:B2)", 3, 0), "SUM(A4:B5)");
        assert_eq!(shifted("=Sheet2!B2*rate", 1, 1), "Sheet2!C3*rate");
    }

    #[test]
    fn test_offset_off_grid_becomes_ref_error() {
        assert_eq!(shifted("=A1+1", -1, 0), "#REF!+1");
        assert_eq!(shifted("=SUM(A1:B2)", 0, -1), "SUM(#REF!)");
    }

    fn removed_rows(text: &str, start: u32, count: u32) -> String {
        adjust_for_removed_rows(&parse_formula(text).unwrap(), |s| s.is_none(), start, count)
            .to_string()
    }

    #[test]
    fn test_removed_rows() {
        // rows 3..=4 (0-based 2..4) removed
        assert_eq!(removed_rows("=A1+A6", 2, 2), "A1+A4");
        assert_eq!(removed_rows("=A3", 2, 2), "#REF!");
        assert_eq!(removed_rows("=SUM(A1:A10)", 2, 2), "SUM(A1:A8)");
        assert_eq!(removed_rows("=SUM(A3:A4)", 2, 2), "SUM(#REF!)");
        assert_eq!(removed_rows("=SUM(A4:A6)", 2, 2), "SUM(A3:A4)");
        assert_eq!(removed_rows("=SUM(A1:A3)", 2, 2), "SUM(A1:A2)");
        assert_eq!(removed_rows("=Other!A6", 2, 2), "Other!A6");
    }

    #[test]
    fn test_removed_columns() {
        let expr = parse_formula("=$D1+SUM(A1:E1)").unwrap();
        let adjusted = adjust_for_removed_columns(&expr, |_| true, 1, 2);
        assert_eq!(adjusted.to_string(), "$B1+SUM(A1:C1)");
    }
}

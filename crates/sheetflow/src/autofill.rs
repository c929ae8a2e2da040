//! Serial auto fill
//!
//! Fills a target range from an adjacent source range, one independent line
//! at a time (a column for vertical fills, a row for horizontal fills). Source
//! formulas are copied with relative references shifted; other values are
//! extrapolated by a [`SerialFiller`] detected from the line's source values.
//!
//! The whole fill is computed into a [`PartialGrid`] first and written by a
//! single [`SetPartialGridAction`], so it applies and reverts as one step.

use crate::action::{PartialGrid, PartialGridCell, SetPartialGridAction};
use crate::events::{AutoFillRequest, ChangeKind};
use crate::serial::SerialFiller;
use crate::workbook::Workbook;
use crate::worksheet::Worksheet;
use log::debug;
use sheetflow_core::{CellValue, Error, RangePosition, Result, SheetId};
use sheetflow_formula::offset_references;

/// Axis along which a fill runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillAxis {
    /// Down or up, one line per column
    Vertical,
    /// Right or left, one line per row
    Horizontal,
}

impl FillAxis {
    /// Cell at `offset` along the axis on `line`
    fn position(self, line: i64, offset: i64) -> (u32, u16) {
        match self {
            FillAxis::Vertical => (offset as u32, line as u16),
            FillAxis::Horizontal => (line as u32, offset as u16),
        }
    }

    /// `(first line, line count, start offset, end offset)` of a range
    fn extent(self, range: &RangePosition) -> (i64, i64, i64, i64) {
        match self {
            FillAxis::Vertical => (
                range.col as i64,
                range.cols as i64,
                range.row as i64,
                range.end_row() as i64,
            ),
            FillAxis::Horizontal => (
                range.row as i64,
                range.rows as i64,
                range.col as i64,
                range.end_col() as i64,
            ),
        }
    }

    /// First offset of a region along the axis
    fn start(self, region: &RangePosition) -> i64 {
        match self {
            FillAxis::Vertical => region.row as i64,
            FillAxis::Horizontal => region.col as i64,
        }
    }

    /// Length of a merged region along the axis
    fn span(self, region: &RangePosition) -> i64 {
        match self {
            FillAxis::Vertical => region.rows as i64,
            FillAxis::Horizontal => region.cols as i64,
        }
    }
}

/// How a source cell continues into the target
#[derive(Debug, Clone)]
enum SourceContent {
    Value,
    /// Formula text and the formula's home position
    Formula(String, u32, u16),
}

/// One source cell of a line; non-origin merged cells are not items
#[derive(Debug, Clone)]
struct SourceItem {
    content: SourceContent,
    value: CellValue,
    span: i64,
}

/// Merged span at a position: `None` for a non-origin merged cell
fn origin_span(ws: &Worksheet, axis: FillAxis, row: u32, col: u16) -> Option<i64> {
    match ws.merged_region_at(row, col) {
        Some(region) if region.row == row && region.col == col => Some(axis.span(&region)),
        Some(_) => None,
        None => Some(1),
    }
}

impl Workbook {
    /// Fill `to` from `from`, extending the series found in the source.
    ///
    /// The ranges must not intersect and must share their column span
    /// (vertical fill) or their row span (horizontal fill). A merged region
    /// only partly inside `to` is rejected. Listeners registered with
    /// [`on_before_auto_fill`](crate::WorkbookEvents::on_before_auto_fill)
    /// can cancel the fill.
    pub fn auto_fill_serial(&mut self, sheet: SheetId, from: RangePosition, to: RangePosition) -> Result<()> {
        let axis = self.validate_fill(sheet, from, to)?;

        let request = AutoFillRequest { sheet, from, to };
        if !self.events.before_auto_fill(&request) {
            return Err(Error::Cancelled(format!("auto fill {} -> {}", from, to)));
        }

        let grid = self.plan_fill(sheet, axis, from, to)?;
        debug!("auto fill {} -> {} on {}", from, to, sheet);
        self.do_action(Box::new(SetPartialGridAction::new(sheet, grid, ChangeKind::AutoFill)))?;
        Ok(())
    }

    fn validate_fill(&self, sheet: SheetId, from: RangePosition, to: RangePosition) -> Result<FillAxis> {
        let ws = self.sheet(sheet)?;
        for range in [&from, &to] {
            ws.check_position(range.row, range.col)?;
            ws.check_position(range.end_row(), range.end_col())?;
        }

        if from.intersects(&to) {
            return Err(Error::InvalidFillRange(format!("{} overlaps {}", from, to)));
        }
        let axis = if from.col == to.col && from.cols == to.cols {
            FillAxis::Vertical
        } else if from.row == to.row && from.rows == to.rows {
            FillAxis::Horizontal
        } else {
            return Err(Error::InvalidFillRange(format!(
                "{} and {} share neither rows nor columns",
                from, to
            )));
        };

        if let Some(region) = ws
            .merged_regions()
            .iter()
            .find(|m| m.intersects(&to) && !to.contains_range(m))
        {
            return Err(Error::MergedCellConflict(format!(
                "{} crosses the fill target {}",
                region, to
            )));
        }
        Ok(axis)
    }

    /// Compute the target contents without touching the sheet
    fn plan_fill(&self, sheet: SheetId, axis: FillAxis, from: RangePosition, to: RangePosition) -> Result<PartialGrid> {
        let ws = self.sheet(sheet)?;
        let mut grid = PartialGrid::capture(self, sheet, to)?;

        let (first_line, lines, src_start, src_end) = axis.extent(&from);
        let (_, _, dst_start, dst_end) = axis.extent(&to);
        let forward = dst_start > src_end;

        for line in first_line..first_line + lines {
            let items = source_items(ws, axis, line, src_start, src_end);
            if items.is_empty() {
                continue;
            }
            let values: Vec<CellValue> = items.iter().map(|i| i.value.clone()).collect();
            let filler = SerialFiller::detect(&values);
            let n = items.len() as i64;

            let mut k: i64 = 0;
            if forward {
                let mut cursor = dst_start;
                while cursor <= dst_end {
                    let (row, col) = axis.position(line, cursor);
                    let Some(target_span) = origin_span(ws, axis, row, col) else {
                        cursor += 1;
                        continue;
                    };
                    let item = &items[k.rem_euclid(n) as usize];
                    grid.set(row, col, fill_content(item, &filler, n + k, row, col));
                    cursor += item.span.max(target_span);
                    k += 1;
                }
            } else {
                // Mirror of the forward walk: each step takes a block of
                // max(source span, target span) cells ending at the cursor,
                // and the item lands on the block's top cell.
                let reversed: Vec<&SourceItem> = items.iter().rev().collect();
                let mut cursor = dst_end;
                while cursor >= dst_start {
                    let item = reversed[k.rem_euclid(n) as usize];
                    let (row, col) = axis.position(line, cursor);
                    let target_span = ws
                        .merged_region_at(row, col)
                        .map_or(1, |region| cursor - axis.start(&region) + 1);
                    let mut landing = (cursor - item.span.max(target_span) + 1).max(dst_start);
                    let (row, col) = axis.position(line, landing);
                    if let Some(region) = ws.merged_region_at(row, col) {
                        landing = axis.start(&region).max(dst_start);
                    }
                    let (row, col) = axis.position(line, landing);
                    grid.set(row, col, fill_content(item, &filler, -(k + 1), row, col));
                    cursor = landing - 1;
                    k += 1;
                }
            }
        }
        Ok(grid)
    }
}

/// Source cells of one line, in order along the axis
fn source_items(ws: &Worksheet, axis: FillAxis, line: i64, start: i64, end: i64) -> Vec<SourceItem> {
    let mut items = Vec::new();
    for offset in start..=end {
        let (row, col) = axis.position(line, offset);
        let Some(span) = origin_span(ws, axis, row, col) else {
            continue;
        };
        let cell = ws.cell_at(row, col);
        let value = cell.map(|c| c.data().clone()).unwrap_or_default();
        let content = match cell.and_then(|c| c.formula()) {
            Some(text) => SourceContent::Formula(text.to_string(), row, col),
            None => SourceContent::Value,
        };
        items.push(SourceItem {
            content,
            value,
            span,
        });
    }
    items
}

/// Target content for one source item landing on `(row, col)`
fn fill_content(item: &SourceItem, filler: &SerialFiller, index: i64, row: u32, col: u16) -> PartialGridCell {
    match &item.content {
        SourceContent::Value => match filler.get_serial_value(index) {
            CellValue::Empty => PartialGridCell::Empty,
            value => PartialGridCell::Value(value),
        },
        SourceContent::Formula(text, src_row, src_col) => match sheetflow_formula::parse_formula(text) {
            Ok(ast) => {
                let shifted = offset_references(
                    &ast,
                    row as i64 - *src_row as i64,
                    col as i64 - *src_col as i64,
                );
                PartialGridCell::Formula(format!("={}", shifted))
            }
            // Unparsable text is copied as is
            Err(_) => PartialGridCell::Formula(text.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FormulaStatus;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    const S: SheetId = SheetId(0);

    fn range(a1: &str) -> RangePosition {
        RangePosition::parse(a1).unwrap()
    }

    fn column_values(wb: &Workbook, col: u16, rows: std::ops::Range<u32>) -> Vec<CellValue> {
        rows.map(|r| wb.cell_value(S, r, col)).collect()
    }

    fn numbers(values: &[f64]) -> Vec<CellValue> {
        values.iter().map(|n| CellValue::Number(*n)).collect()
    }

    #[test]
    fn test_fill_down_extends_series() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A1:A3"), numbers(&[1.0, 2.0, 3.0]))
            .unwrap();
        wb.auto_fill_serial(S, range("A1:A3"), range("A4:A9")).unwrap();
        assert_eq!(
            column_values(&wb, 0, 3..9),
            numbers(&[4.0, 5.0, 6.0, 7.0, 8.0, 9.0])
        );
    }

    #[test]
    fn test_fill_up_counts_backwards() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A4:A6"), numbers(&[4.0, 5.0, 6.0]))
            .unwrap();
        wb.auto_fill_serial(S, range("A4:A6"), range("A1:A3")).unwrap();
        assert_eq!(column_values(&wb, 0, 0..3), numbers(&[1.0, 2.0, 3.0]));
    }

    #[test]
    fn test_fill_right_offsets_formulas() {
        let mut wb = Workbook::new();
        wb.set_cell_formula(S, 1, 0, "=A1").unwrap();
        wb.set_cell_formula(S, 2, 0, "=$A$1").unwrap();
        wb.auto_fill_serial(S, range("A2:A3"), range("B2:D3")).unwrap();

        assert_eq!(wb.cell_formula(S, 1, 1), Some("=B1"));
        assert_eq!(wb.cell_formula(S, 1, 2), Some("=C1"));
        assert_eq!(wb.cell_formula(S, 1, 3), Some("=D1"));
        for col in 1..4 {
            assert_eq!(wb.cell_formula(S, 2, col), Some("=$A$1"));
            assert_eq!(wb.formula_status(S, 2, col), FormulaStatus::Normal);
        }
    }

    #[test]
    fn test_text_series_and_cycles() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, "Week 1").unwrap();
        wb.set_cell_data(S, 0, 1, "x").unwrap();
        wb.set_cell_data(S, 1, 1, "y").unwrap();

        wb.auto_fill_serial(S, range("A1"), range("A2:A3")).unwrap();
        assert_eq!(wb.cell_value(S, 2, 0), CellValue::string("Week 3"));

        wb.auto_fill_serial(S, range("B1:B2"), range("B3:B5")).unwrap();
        assert_eq!(
            column_values(&wb, 1, 2..5),
            vec![CellValue::string("x"), CellValue::string("y"), CellValue::string("x")]
        );
    }

    #[test]
    fn test_invalid_shapes_rejected() {
        let mut wb = Workbook::new();
        assert!(matches!(
            wb.auto_fill_serial(S, range("A1:A3"), range("B4:B6")),
            Err(Error::InvalidFillRange(_))
        ));
        assert!(matches!(
            wb.auto_fill_serial(S, range("A1:A3"), range("A3:A6")),
            Err(Error::InvalidFillRange(_))
        ));
        assert!(wb
            .auto_fill_serial(S, range("A1:A3"), range("A4:A999"))
            .is_err());
    }

    #[test]
    fn test_merged_cells() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A1:A2"), numbers(&[1.0, 2.0]))
            .unwrap();
        wb.merge_range(S, range("A4:B4")).unwrap();
        assert!(matches!(
            wb.auto_fill_serial(S, range("A1:A2"), range("A3:A6")),
            Err(Error::MergedCellConflict(_))
        ));

        wb.unmerge_range(S, range("A4:B4")).unwrap();
        wb.merge_range(S, range("A4:A5")).unwrap();
        wb.auto_fill_serial(S, range("A1:A2"), range("A3:A6")).unwrap();
        // A4:A5 takes one value and two rows
        assert_eq!(
            column_values(&wb, 0, 2..6),
            vec![
                CellValue::Number(3.0),
                CellValue::Number(4.0),
                CellValue::Empty,
                CellValue::Number(5.0)
            ]
        );
    }

    #[test]
    fn test_fill_up_from_merged_source() {
        let mut wb = Workbook::new();
        wb.merge_range(S, range("A5:A6")).unwrap();
        wb.set_cell_data(S, 4, 0, 3.0).unwrap(); // A5:A6
        wb.set_cell_data(S, 6, 0, 4.0).unwrap(); // A7

        wb.auto_fill_serial(S, range("A5:A7"), range("A1:A4")).unwrap();
        // The two-row source item takes A2:A3 and lands on its top cell
        assert_eq!(
            column_values(&wb, 0, 0..4),
            vec![
                CellValue::Number(0.0),
                CellValue::Number(1.0),
                CellValue::Empty,
                CellValue::Number(2.0)
            ]
        );

        // Filling down from the same source uses the same layout
        wb.auto_fill_serial(S, range("A5:A7"), range("A8:A11")).unwrap();
        assert_eq!(
            column_values(&wb, 0, 7..11),
            vec![
                CellValue::Number(5.0),
                CellValue::Empty,
                CellValue::Number(6.0),
                CellValue::Number(7.0)
            ]
        );
    }

    #[test]
    fn test_fill_up_into_merged_target() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A5:A6"), numbers(&[5.0, 6.0]))
            .unwrap();
        wb.merge_range(S, range("A3:A4")).unwrap();
        wb.auto_fill_serial(S, range("A5:A6"), range("A1:A4")).unwrap();
        assert_eq!(
            column_values(&wb, 0, 0..4),
            vec![
                CellValue::Number(2.0),
                CellValue::Number(3.0),
                CellValue::Number(4.0),
                CellValue::Empty
            ]
        );
    }

    #[test]
    fn test_listener_can_cancel() {
        let mut wb = Workbook::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        wb.events_mut().on_before_auto_fill(move |req| {
            sink.borrow_mut().push(req.to);
            false
        });
        wb.set_cell_data(S, 0, 0, 1.0).unwrap();

        assert!(matches!(
            wb.auto_fill_serial(S, range("A1"), range("A2:A3")),
            Err(Error::Cancelled(_))
        ));
        assert_eq!(*seen.borrow(), vec![range("A2:A3")]);
        assert!(wb.cell(S, 1, 0).is_none());
    }
}

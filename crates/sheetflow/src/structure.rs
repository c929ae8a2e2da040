//! Structural edits: row and column removal, sheet reset, full graph rebuild
//!
//! Removing a band shifts the remaining cells, rewrites every formula that
//! addresses the sheet (on any sheet), shrinks named ranges, merged regions
//! and conditional-format ranges, then rebuilds all edges from the stored
//! formulas and recalculates.

use crate::dependency::{build_references, CellKey};
use crate::workbook::Workbook;
use crate::worksheet::Worksheet;
use log::{debug, warn};
use sheetflow_core::{Error, RangePosition, Result, SheetId};
use sheetflow_formula::{adjust_for_removed_columns, adjust_for_removed_rows, FormulaExpr};

/// A removed band of rows or columns
#[derive(Debug, Clone, Copy)]
enum RemovedBand {
    Rows { start: u32, count: u32 },
    Columns { start: u16, count: u16 },
}

impl RemovedBand {
    /// `(start, end)` of the band along its axis, end exclusive
    fn bounds(self) -> (u32, u32) {
        match self {
            RemovedBand::Rows { start, count } => (start, start + count),
            RemovedBand::Columns { start, count } => (start as u32, start as u32 + count as u32),
        }
    }

    fn count(self) -> u32 {
        match self {
            RemovedBand::Rows { count, .. } => count,
            RemovedBand::Columns { count, .. } => count as u32,
        }
    }

    /// Where a cell moves to; `None` when it was removed
    fn shift_cell(self, row: u32, col: u16) -> Option<(u32, u16)> {
        let (start, end) = self.bounds();
        let value = match self {
            RemovedBand::Rows { .. } => row,
            RemovedBand::Columns { .. } => col as u32,
        };
        let moved = if value < start {
            value
        } else if value >= end {
            value - self.count()
        } else {
            return None;
        };
        Some(match self {
            RemovedBand::Rows { .. } => (moved, col),
            RemovedBand::Columns { .. } => (row, moved as u16),
        })
    }

    /// What is left of a range; `None` when it lay entirely in the band
    fn shrink(self, range: RangePosition) -> Option<RangePosition> {
        let (start, end) = self.bounds();
        let (first, last) = match self {
            RemovedBand::Rows { .. } => (range.row, range.end_row()),
            RemovedBand::Columns { .. } => (range.col as u32, range.end_col() as u32),
        };
        if first >= start && last < end {
            return None;
        }
        let new_first = if first < start {
            first
        } else if first >= end {
            first - self.count()
        } else {
            start
        };
        let new_last = if last < start {
            last
        } else if last >= end {
            last - self.count()
        } else {
            start - 1
        };
        let len = new_last - new_first + 1;
        Some(match self {
            RemovedBand::Rows { .. } => RangePosition::new(new_first, range.col, len, range.cols),
            RemovedBand::Columns { .. } => {
                RangePosition::new(range.row, new_first as u16, range.rows, len as u16)
            }
        })
    }

    fn adjust<F>(self, expr: &FormulaExpr, targets_sheet: F) -> FormulaExpr
    where
        F: Fn(Option<&str>) -> bool,
    {
        match self {
            RemovedBand::Rows { start, count } => adjust_for_removed_rows(expr, targets_sheet, start, count),
            RemovedBand::Columns { start, count } => {
                adjust_for_removed_columns(expr, targets_sheet, start, count)
            }
        }
    }
}

impl Workbook {
    /// Remove `count` rows starting at `row` and move the rows below up.
    ///
    /// References into the removed rows become `#REF!`; references below
    /// them follow the moved cells. The sheet shrinks by the removed rows.
    pub fn delete_rows(&mut self, sheet: SheetId, row: u32, count: u32) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(row, 0)?;
        let count = count.min(ws.row_count() - row);
        if count == 0 {
            return Ok(());
        }
        self.remove_band(sheet, RemovedBand::Rows { start: row, count })
    }

    /// Remove `count` columns starting at `col` and move the columns to the
    /// right over.
    pub fn delete_columns(&mut self, sheet: SheetId, col: u16, count: u16) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(0, col)?;
        let count = count.min(ws.column_count() - col);
        if count == 0 {
            return Ok(());
        }
        self.remove_band(sheet, RemovedBand::Columns { start: col, count })
    }

    /// Clear a sheet completely and give it new extents.
    ///
    /// Formulas on other sheets that read it are kept and re-evaluated
    /// against the empty sheet.
    pub fn reset_sheet(&mut self, sheet: SheetId, rows: u32, cols: u16) -> Result<()> {
        let ws = self.sheet_mut(sheet)?;
        ws.clear();
        ws.resize(rows, cols);
        debug!("reset {} to {}x{}", sheet, rows, cols);
        self.rebuild_all_references();
        self.recalculate_all();
        Ok(())
    }

    /// Rebuild every formula edge map and every conditional-format dependency
    /// map from the stored formulas.
    ///
    /// A formula that now references its own cell is discarded as a circular
    /// reference. Any other failure leaves the cell without edges.
    pub fn rebuild_all_references(&mut self) {
        let mut results = Vec::new();
        for ws in self.worksheets() {
            for (row, col) in ws.formula_cells() {
                let key = CellKey::new(ws.id(), row, col);
                let Some(ast) = ws.cell_at(row, col).and_then(|c| c.formula_ast()) else {
                    continue;
                };
                results.push((key, build_references(self, key, ast, true)));
            }
        }
        debug!("rebuilding edges of {} formula cells", results.len());

        for ws in self.worksheets_mut() {
            ws.formula_refs.clear();
        }
        for (key, result) in results {
            match result {
                Ok(edges) => {
                    if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
                        ws.formula_refs.insert((key.row, key.col), edges);
                    }
                }
                Err(Error::CircularReference(_)) => self.mark_circular(key),
                Err(e) => warn!("edges of {} not rebuilt: {}", key, e),
            }
        }

        let sheets: Vec<SheetId> = self.worksheets().map(Worksheet::id).collect();
        for sheet in sheets {
            self.rebuild_conditional_dependencies(sheet);
        }
    }

    fn remove_band(&mut self, sheet: SheetId, band: RemovedBand) -> Result<()> {
        debug!("removing {:?} from {}", band, sheet);
        let target_name = self.sheet(sheet)?.name().to_string();

        for ws in self.worksheets_mut() {
            let same_sheet = ws.id() == sheet;
            let targets = |qualifier: Option<&str>| match qualifier {
                None => same_sheet,
                Some(name) => name.eq_ignore_ascii_case(&target_name),
            };

            for (row, col) in ws.formula_cells() {
                let Some(cell) = ws.cell_at_mut(row, col) else {
                    continue;
                };
                let Some(ast) = cell.formula_ast.as_ref() else {
                    continue;
                };
                let adjusted = band.adjust(ast, targets);
                cell.formula = Some(format!("={}", adjusted));
                cell.formula_ast = Some(adjusted);
            }

            for compiled in ws.conditional_formats.values_mut() {
                for rule in &mut compiled.rules {
                    let adjusted = rule
                        .formulas
                        .iter()
                        .map(|f| f.as_ref().map(|expr| band.adjust(expr, targets)))
                        .collect();
                    rule.set_formulas(adjusted);
                }
            }

            ws.formula_refs.clear();
            ws.traces.clear();
        }

        let ws = self.sheet_mut(sheet)?;
        match band {
            RemovedBand::Rows { start, count } => ws.remove_row_band(start, count),
            RemovedBand::Columns { start, count } => ws.remove_column_band(start, count),
        }
        shrink_sheet_state(ws, band);
        match band {
            RemovedBand::Rows { count, .. } => {
                let rows = ws.row_count().saturating_sub(count).max(1);
                ws.resize(rows, ws.column_count());
            }
            RemovedBand::Columns { count, .. } => {
                let cols = ws.column_count().saturating_sub(count).max(1);
                ws.resize(ws.row_count(), cols);
            }
        }

        self.rebuild_all_references();
        self.recalculate_all();
        Ok(())
    }
}

/// Shrink the ranges a sheet keeps: names, merges, conditional formats and
/// the record of cells styled by them
fn shrink_sheet_state(ws: &mut Worksheet, band: RemovedBand) {
    ws.names_mut().retain_map(|range| band.shrink(range));

    let merged = std::mem::take(ws.merged_regions_mut());
    *ws.merged_regions_mut() = merged
        .into_iter()
        .filter_map(|range| band.shrink(range))
        .filter(|range| !range.is_single_cell())
        .collect();

    let mut emptied = Vec::new();
    for (id, compiled) in ws.conditional_formats.iter_mut() {
        match band.shrink(compiled.sqref) {
            Some(sqref) => compiled.sqref = sqref,
            None => emptied.push(*id),
        }
    }
    for id in emptied {
        debug!("conditional format {} removed with its range", id);
        ws.conditional_formats.remove(&id);
        ws.cf_refs.remove(&id);
    }

    ws.cf_touched = ws
        .cf_touched
        .iter()
        .filter_map(|(row, col)| band.shift_cell(*row, *col))
        .collect();
}

//! Worksheet type - cells, extents and per-sheet graph state

use crate::cell::Cell;
use crate::conditional::{CfId, CompiledFormat};
use crate::dependency::{FormulaReferenceRange, ReferenceRange};
use crate::trace::TraceArrows;
use ahash::{AHashMap, AHashSet};
use sheetflow_core::{
    CellValue, Error, NamedRangeCollection, RangePosition, Result, SheetId, MAX_COLS, MAX_ROWS,
};
use std::collections::BTreeMap;

/// A single worksheet
///
/// Cells live in a sparse row-major table. The forward dependency edges of the
/// sheet's formula cells and the dependency ranges of its conditional formats
/// are owned here, keyed by coordinates rather than by live cell references.
#[derive(Debug)]
pub struct Worksheet {
    id: SheetId,
    name: String,
    rows: u32,
    cols: u16,
    /// Row index → column map
    cells: BTreeMap<u32, BTreeMap<u16, Cell>>,
    /// Formula cell → forward edges
    pub(crate) formula_refs: AHashMap<(u32, u16), Vec<FormulaReferenceRange>>,
    /// Conditional formats in insertion order
    pub(crate) conditional_formats: BTreeMap<CfId, CompiledFormat>,
    /// Conditional format → (widened) dependency ranges
    pub(crate) cf_refs: AHashMap<CfId, Vec<ReferenceRange>>,
    /// Cells whose style a conditional format has overridden at least once
    pub(crate) cf_touched: AHashSet<(u32, u16)>,
    pub(crate) traces: TraceArrows,
    names: NamedRangeCollection,
    merged: Vec<RangePosition>,
}

impl Worksheet {
    pub(crate) fn new(id: SheetId, name: impl Into<String>, rows: u32, cols: u16) -> Self {
        Self {
            id,
            name: name.into(),
            rows: rows.clamp(1, MAX_ROWS),
            cols: cols.clamp(1, MAX_COLS),
            cells: BTreeMap::new(),
            formula_refs: AHashMap::new(),
            conditional_formats: BTreeMap::new(),
            cf_refs: AHashMap::new(),
            cf_touched: AHashSet::new(),
            traces: TraceArrows::default(),
            names: NamedRangeCollection::new(),
            merged: Vec::new(),
        }
    }

    /// Stable id of this sheet
    pub fn id(&self) -> SheetId {
        self.id
    }

    /// Sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of rows in the sheet
    pub fn row_count(&self) -> u32 {
        self.rows
    }

    /// Number of columns in the sheet
    pub fn column_count(&self) -> u16 {
        self.cols
    }

    /// The whole sheet as a range
    pub fn bounds(&self) -> RangePosition {
        RangePosition::new(0, 0, self.rows, self.cols)
    }

    /// Change the sheet extents. Cells outside the new extents are dropped.
    pub(crate) fn resize(&mut self, rows: u32, cols: u16) {
        self.rows = rows.clamp(1, MAX_ROWS);
        self.cols = cols.clamp(1, MAX_COLS);
        let (max_row, max_col) = (self.rows, self.cols);
        self.cells.retain(|row, _| *row < max_row);
        for columns in self.cells.values_mut() {
            columns.retain(|col, _| *col < max_col);
        }
        self.cells.retain(|_, columns| !columns.is_empty());
    }

    /// Fail unless the coordinate lies inside the sheet extents
    pub fn check_position(&self, row: u32, col: u16) -> Result<()> {
        if row >= self.rows {
            return Err(Error::RowOutOfBounds(row, self.rows.saturating_sub(1)));
        }
        if col >= self.cols {
            return Err(Error::ColumnOutOfBounds(col, self.cols.saturating_sub(1)));
        }
        Ok(())
    }

    // === Cell Access ===

    /// Get a cell if it has been materialized
    pub fn cell_at(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(&row).and_then(|r| r.get(&col))
    }

    pub(crate) fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut Cell> {
        self.cells.get_mut(&row).and_then(|r| r.get_mut(&col))
    }

    /// Get a cell, creating it on first address
    pub(crate) fn cell_entry(&mut self, row: u32, col: u16) -> &mut Cell {
        self.cells.entry(row).or_default().entry(col).or_default()
    }

    /// Drop a cell that no longer holds anything
    pub(crate) fn discard_if_blank(&mut self, row: u32, col: u16) {
        if let Some(columns) = self.cells.get_mut(&row) {
            if columns.get(&col).map_or(false, Cell::is_blank) {
                columns.remove(&col);
            }
            if columns.is_empty() {
                self.cells.remove(&row);
            }
        }
    }

    /// Value of a cell (empty when the cell does not exist)
    pub fn value_at(&self, row: u32, col: u16) -> CellValue {
        self.cell_at(row, col)
            .map(|c| c.data.clone())
            .unwrap_or_default()
    }

    /// Iterate over materialized cells in row-major order
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.cells
            .iter()
            .flat_map(|(row, columns)| columns.iter().map(move |(col, cell)| (*row, *col, cell)))
    }

    /// Coordinates of every cell carrying a formula, row-major
    pub(crate) fn formula_cells(&self) -> Vec<(u32, u16)> {
        self.cells()
            .filter(|(_, _, cell)| cell.has_formula())
            .map(|(row, col, _)| (row, col))
            .collect()
    }

    /// Number of materialized cells
    pub fn cell_count(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    /// Remove every cell and all graph state
    pub(crate) fn clear(&mut self) {
        self.cells.clear();
        self.formula_refs.clear();
        self.conditional_formats.clear();
        self.cf_refs.clear();
        self.cf_touched.clear();
        self.traces.clear();
        self.names.clear();
        self.merged.clear();
    }

    // === Structural Shifts ===

    /// Remove a band of rows and move the cells below it up
    pub(crate) fn remove_row_band(&mut self, start: u32, count: u32) {
        let end = start.saturating_add(count);
        let tail = self.cells.split_off(&start);
        for (row, columns) in tail {
            if row >= end {
                self.cells.insert(row - count, columns);
            }
        }
    }

    /// Remove a band of columns and move the cells right of it left
    pub(crate) fn remove_column_band(&mut self, start: u16, count: u16) {
        let end = start.saturating_add(count);
        for columns in self.cells.values_mut() {
            let tail = columns.split_off(&start);
            for (col, cell) in tail {
                if col >= end {
                    columns.insert(col - count, cell);
                }
            }
        }
        self.cells.retain(|_, columns| !columns.is_empty());
    }

    // === Named Ranges ===

    /// Named ranges defined on this sheet
    pub fn names(&self) -> &NamedRangeCollection {
        &self.names
    }

    pub(crate) fn names_mut(&mut self) -> &mut NamedRangeCollection {
        &mut self.names
    }

    // === Merged Cells ===

    /// Merged regions
    pub fn merged_regions(&self) -> &[RangePosition] {
        &self.merged
    }

    /// Merge a range of cells
    pub(crate) fn merge_cells(&mut self, range: RangePosition) -> Result<()> {
        if range.end_row() >= self.rows || range.end_col() >= self.cols {
            return Err(Error::InvalidRange(range.to_string()));
        }
        // Check for overlap with existing merged regions
        for existing in &self.merged {
            if range.intersects(existing) {
                return Err(Error::MergedCellConflict(range.to_string()));
            }
        }
        if !range.is_single_cell() {
            self.merged.push(range);
        }
        Ok(())
    }

    /// Unmerge a merged region
    pub(crate) fn unmerge_cells(&mut self, range: RangePosition) -> bool {
        match self.merged.iter().position(|m| *m == range) {
            Some(i) => {
                self.merged.remove(i);
                true
            }
            None => false,
        }
    }

    /// Merged region covering a cell
    pub fn merged_region_at(&self, row: u32, col: u16) -> Option<RangePosition> {
        self.merged
            .iter()
            .find(|m| m.contains_cell(row, col))
            .copied()
    }

    pub(crate) fn merged_regions_mut(&mut self) -> &mut Vec<RangePosition> {
        &mut self.merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sheet() -> Worksheet {
        Worksheet::new(SheetId(1), "Sheet1", 10, 5)
    }

    #[test]
    fn test_cells_created_on_demand() {
        let mut ws = sheet();
        assert!(ws.cell_at(1, 1).is_none());
        ws.cell_entry(1, 1).set_value(CellValue::Number(3.0));
        assert_eq!(ws.value_at(1, 1), CellValue::Number(3.0));
        assert_eq!(ws.cell_count(), 1);

        ws.cell_entry(1, 1).set_value(CellValue::Empty);
        ws.discard_if_blank(1, 1);
        assert_eq!(ws.cell_count(), 0);
    }

    #[test]
    fn test_check_position() {
        let ws = sheet();
        assert!(ws.check_position(9, 4).is_ok());
        assert_eq!(ws.check_position(10, 0), Err(Error::RowOutOfBounds(10, 9)));
        assert_eq!(ws.check_position(0, 5), Err(Error::ColumnOutOfBounds(5, 4)));
    }

    #[test]
    fn test_remove_row_band() {
        let mut ws = sheet();
        for row in 0..6 {
            ws.cell_entry(row, 0).set_value(CellValue::Number(row as f64));
        }
        ws.remove_row_band(1, 2);
        let values: Vec<_> = ws.cells().map(|(r, _, c)| (r, c.data().clone())).collect();
        assert_eq!(
            values,
            vec![
                (0, CellValue::Number(0.0)),
                (1, CellValue::Number(3.0)),
                (2, CellValue::Number(4.0)),
                (3, CellValue::Number(5.0)),
            ]
        );
    }

    #[test]
    fn test_remove_column_band() {
        let mut ws = sheet();
        for col in 0..4 {
            ws.cell_entry(0, col).set_value(CellValue::Number(col as f64));
        }
        ws.remove_column_band(0, 1);
        assert_eq!(ws.value_at(0, 0), CellValue::Number(1.0));
        assert_eq!(ws.value_at(0, 2), CellValue::Number(3.0));
        assert_eq!(ws.value_at(0, 3), CellValue::Empty);
    }

    #[test]
    fn test_merge_overlap_rejected() {
        let mut ws = sheet();
        ws.merge_cells(RangePosition::parse("A1:B2").unwrap()).unwrap();
        assert!(matches!(
            ws.merge_cells(RangePosition::parse("B2:C3").unwrap()),
            Err(Error::MergedCellConflict(_))
        ));
        assert_eq!(
            ws.merged_region_at(1, 1),
            Some(RangePosition::parse("A1:B2").unwrap())
        );
        assert!(ws.unmerge_cells(RangePosition::parse("A1:B2").unwrap()));
        assert!(ws.merged_regions().is_empty());
    }

    #[test]
    fn test_resize_drops_cells_outside() {
        let mut ws = sheet();
        ws.cell_entry(8, 0).set_value(CellValue::Number(1.0));
        ws.cell_entry(0, 4).set_value(CellValue::Number(2.0));
        ws.resize(5, 3);
        assert_eq!(ws.cell_count(), 0);
        assert_eq!(ws.bounds(), RangePosition::new(0, 0, 5, 3));
    }
}

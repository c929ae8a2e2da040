//! Trace arrows for formula auditing
//!
//! Arrows are stored per worksheet, keyed by the cell they were traced from:
//! precedent arrows point from a formula cell to the ranges it reads, dependent
//! arrows point from a cell to the formula cells reading it. Arrows are a
//! snapshot taken when traced; edits to the traced cell drop them.

use crate::dependency::{CellKey, ReferenceRange};
use crate::workbook::Workbook;
use sheetflow_core::{Result, SheetId};
use std::collections::BTreeMap;

/// Trace arrows of one worksheet
#[derive(Debug, Default)]
pub(crate) struct TraceArrows {
    precedents: BTreeMap<(u32, u16), Vec<ReferenceRange>>,
    dependents: BTreeMap<(u32, u16), Vec<CellKey>>,
}

impl TraceArrows {
    pub(crate) fn clear(&mut self) {
        self.precedents.clear();
        self.dependents.clear();
    }

    /// Drop every arrow traced from a cell
    pub(crate) fn remove_cell(&mut self, row: u32, col: u16) {
        self.precedents.remove(&(row, col));
        self.dependents.remove(&(row, col));
    }
}

impl Workbook {
    /// Draw arrows from a formula cell to every range it reads.
    ///
    /// Returns `false` when the cell has no formula edges.
    pub fn trace_precedents(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<bool> {
        self.sheet(sheet)?.check_position(row, col)?;
        let edges = self.cell_formula_reference_ranges(sheet, row, col);
        if edges.is_empty() {
            return Ok(false);
        }
        self.sheet_mut(sheet)?.traces.precedents.insert((row, col), edges);
        Ok(true)
    }

    /// Draw arrows from a cell to every formula cell that reads it.
    ///
    /// Returns `false` when nothing depends on the cell.
    pub fn trace_dependents(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<bool> {
        self.sheet(sheet)?.check_position(row, col)?;
        let dependents = self.formula_direct_dependents(sheet, row, col);
        if dependents.is_empty() {
            return Ok(false);
        }
        self.sheet_mut(sheet)?.traces.dependents.insert((row, col), dependents);
        Ok(true)
    }

    /// Returns whether the cell had precedent arrows
    pub fn remove_trace_precedents(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<bool> {
        Ok(self.sheet_mut(sheet)?.traces.precedents.remove(&(row, col)).is_some())
    }

    /// Returns whether the cell had dependent arrows
    pub fn remove_trace_dependents(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<bool> {
        Ok(self.sheet_mut(sheet)?.traces.dependents.remove(&(row, col)).is_some())
    }

    pub fn remove_all_trace_arrows(&mut self, sheet: SheetId) -> Result<()> {
        self.sheet_mut(sheet)?.traces.clear();
        Ok(())
    }

    /// Cells on a sheet with precedent arrows, row-major
    pub fn traced_precedent_cells(&self, sheet: SheetId) -> Vec<CellKey> {
        self.worksheet_by_id(sheet)
            .map(|ws| {
                ws.traces
                    .precedents
                    .keys()
                    .map(|(row, col)| CellKey::new(sheet, *row, *col))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cells on a sheet with dependent arrows, row-major
    pub fn traced_dependent_cells(&self, sheet: SheetId) -> Vec<CellKey> {
        self.worksheet_by_id(sheet)
            .map(|ws| {
                ws.traces
                    .dependents
                    .keys()
                    .map(|(row, col)| CellKey::new(sheet, *row, *col))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn precedent_arrows(&self, sheet: SheetId, row: u32, col: u16) -> &[ReferenceRange] {
        self.worksheet_by_id(sheet)
            .and_then(|ws| ws.traces.precedents.get(&(row, col)))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn dependent_arrows(&self, sheet: SheetId, row: u32, col: u16) -> &[CellKey] {
        self.worksheet_by_id(sheet)
            .and_then(|ws| ws.traces.dependents.get(&(row, col)))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

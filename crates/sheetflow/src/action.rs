//! Undoable actions
//!
//! An [`Action`] is one atomic workbook edit that can be reverted. Serial fill
//! and formula reuse both go through [`SetPartialGridAction`], which rewrites
//! a rectangle of cells and remembers what was there before.

use crate::dependency::{build_references, CellKey};
use crate::events::{CellChange, ChangeKind};
use crate::workbook::Workbook;
use crate::FormulaStatus;
use log::debug;
use sheetflow_core::{CellValue, Error, RangePosition, Result, SheetId};
use sheetflow_formula::parse_formula;
use std::fmt;

/// A reversible workbook edit
pub trait Action: fmt::Debug {
    /// Short human-readable name, e.g. for an undo menu
    fn name(&self) -> &str;

    /// Apply the edit
    fn apply(&mut self, workbook: &mut Workbook) -> Result<()>;

    /// Undo a previous [`apply`](Action::apply)
    fn revert(&mut self, workbook: &mut Workbook) -> Result<()>;
}

/// Content of one cell in a [`PartialGrid`]
#[derive(Debug, Clone, PartialEq)]
pub enum PartialGridCell {
    Empty,
    Value(CellValue),
    /// Formula text, with or without the leading `=`
    Formula(String),
}

/// Contents of a rectangle of cells, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct PartialGrid {
    pub range: RangePosition,
    pub cells: Vec<PartialGridCell>,
}

impl PartialGrid {
    /// An all-empty grid over `range`
    pub fn new(range: RangePosition) -> Self {
        Self {
            range,
            cells: vec![PartialGridCell::Empty; range.cell_count() as usize],
        }
    }

    /// Snapshot the current contents of `range`
    pub fn capture(workbook: &Workbook, sheet: SheetId, range: RangePosition) -> Result<Self> {
        let ws = workbook.sheet(sheet)?;
        ws.check_position(range.row, range.col)?;
        ws.check_position(range.end_row(), range.end_col())?;

        let cells = range
            .cells()
            .map(|pos| match ws.cell_at(pos.row, pos.col) {
                Some(cell) => match cell.formula() {
                    Some(text) => PartialGridCell::Formula(text.to_string()),
                    None if cell.data().is_empty() => PartialGridCell::Empty,
                    None => PartialGridCell::Value(cell.data().clone()),
                },
                None => PartialGridCell::Empty,
            })
            .collect();
        Ok(Self { range, cells })
    }

    fn index(&self, row: u32, col: u16) -> Option<usize> {
        if !self.range.contains_cell(row, col) {
            return None;
        }
        let r = (row - self.range.row) as usize;
        let c = (col - self.range.col) as usize;
        Some(r * self.range.cols as usize + c)
    }

    /// Content at an absolute sheet position inside the grid
    pub fn get(&self, row: u32, col: u16) -> Option<&PartialGridCell> {
        self.index(row, col).and_then(|i| self.cells.get(i))
    }

    /// Replace the content at an absolute sheet position; positions outside
    /// the grid are ignored
    pub fn set(&mut self, row: u32, col: u16, cell: PartialGridCell) {
        if let Some(i) = self.index(row, col) {
            self.cells[i] = cell;
        }
    }

    /// Absolute positions paired with their contents, row-major
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &PartialGridCell)> {
        self.range
            .cells()
            .zip(self.cells.iter())
            .map(|(pos, cell)| (pos.row, pos.col, cell))
    }
}

/// Write a [`PartialGrid`] into a sheet, keeping the old contents for revert
#[derive(Debug)]
pub struct SetPartialGridAction {
    sheet: SheetId,
    grid: PartialGrid,
    previous: Option<PartialGrid>,
    kind: ChangeKind,
}

impl SetPartialGridAction {
    pub fn new(sheet: SheetId, grid: PartialGrid, kind: ChangeKind) -> Self {
        Self {
            sheet,
            grid,
            previous: None,
            kind,
        }
    }

    pub fn sheet(&self) -> SheetId {
        self.sheet
    }

    /// The contents written by this action
    pub fn grid(&self) -> &PartialGrid {
        &self.grid
    }

    /// The contents replaced by this action, once applied
    pub fn previous(&self) -> Option<&PartialGrid> {
        self.previous.as_ref()
    }
}

impl Action for SetPartialGridAction {
    fn name(&self) -> &str {
        match self.kind {
            ChangeKind::AutoFill => "Auto Fill",
            ChangeKind::Formula => "Set Formulas",
            _ => "Set Cells",
        }
    }

    fn apply(&mut self, workbook: &mut Workbook) -> Result<()> {
        let previous = PartialGrid::capture(workbook, self.sheet, self.grid.range)?;
        workbook.write_partial_grid(self.sheet, &self.grid, self.kind)?;
        self.previous = Some(previous);
        Ok(())
    }

    fn revert(&mut self, workbook: &mut Workbook) -> Result<()> {
        match self.previous.take() {
            Some(previous) => workbook.write_partial_grid(self.sheet, &previous, self.kind),
            None => Ok(()),
        }
    }
}

impl Workbook {
    /// Apply an action and hand it to the action listeners.
    ///
    /// The applied action is returned so the caller can keep it for revert.
    pub fn do_action(&mut self, mut action: Box<dyn Action>) -> Result<Box<dyn Action>> {
        debug!("applying action {}", action.name());
        action.apply(self)?;
        self.events.action(action.as_ref());
        Ok(action)
    }

    /// Write a whole grid, then propagate once for every written cell.
    ///
    /// Formulas are checked before anything is written: a reference outside
    /// the sheet extents aborts the write with the sheet unchanged. A
    /// self-referencing formula only affects its own cell.
    pub(crate) fn write_partial_grid(&mut self, sheet: SheetId, grid: &PartialGrid, kind: ChangeKind) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(grid.range.row, grid.range.col)?;
        ws.check_position(grid.range.end_row(), grid.range.end_col())?;
        if grid.cells.len() as u64 != grid.range.cell_count() {
            return Err(Error::InvalidRange(format!(
                "{} holds {} cells, grid has {}",
                grid.range,
                grid.range.cell_count(),
                grid.cells.len()
            )));
        }

        for (row, col, cell) in grid.iter() {
            if let PartialGridCell::Formula(text) = cell {
                let Ok(ast) = parse_formula(text) else {
                    continue;
                };
                match build_references(self, CellKey::new(sheet, row, col), &ast, true) {
                    Ok(_) | Err(Error::CircularReference(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        let mut keys = Vec::with_capacity(grid.cells.len());
        let mut formulas = Vec::new();
        for (row, col, cell) in grid.iter() {
            let key = CellKey::new(sheet, row, col);
            keys.push(key);
            match cell {
                PartialGridCell::Empty => self.write_value_quiet(key, CellValue::Empty),
                PartialGridCell::Value(value) => self.write_value_quiet(key, value.clone()),
                PartialGridCell::Formula(text) => match self.write_formula_quiet(key, text) {
                    Ok(FormulaStatus::Normal) => formulas.push(key),
                    Ok(_) | Err(Error::CircularReference(_)) => {}
                    Err(e) => return Err(e),
                },
            }
        }
        for key in formulas {
            self.recalc_key(key);
        }

        self.complete_edit(
            &keys,
            &[],
            CellChange {
                sheet,
                range: grid.range,
                kind,
            },
        );
        Ok(())
    }
}

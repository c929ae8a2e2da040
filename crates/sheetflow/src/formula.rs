//! Formula assignment state machine
//!
//! Owns the formula text, AST, status and forward edges of each cell.
//!
//! ```text
//! set_cell_formula ─┬─ parse fails ────────────────▶ SyntaxError (text kept, no edges)
//!                   ├─ references its own cell ─────▶ CircularReference (text dropped)
//!                   └─ edges built ─▶ recalc_cell ─┬▶ Normal
//!                                                  ├▶ InvalidValue / NameNotFound / MismatchedParameter
//!                                                  └▶ UnspecifiedError (+ failure listeners)
//! ```

use crate::cell::FormulaStatus;
use crate::dependency::{build_references, CellKey};
use crate::events::{CellChange, ChangeKind, EvaluationFailure};
use crate::workbook::Workbook;
use log::{debug, error, trace};
use sheetflow_core::{CellError, CellValue, Error, RangePosition, Result, SheetId};
use sheetflow_formula::{
    evaluate, offset_references, parse_formula, EvaluationContext, FormulaError, FormulaValue,
};

/// Formula text as stored on a cell: trimmed, with a leading `=`
fn normalize_formula_text(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('=') {
        trimmed.to_string()
    } else {
        format!("={}", trimmed)
    }
}

/// Error value cached on a cell whose evaluation failed
fn failure_value(error: &FormulaError) -> CellError {
    match error {
        FormulaError::NameNotFound(_) | FormulaError::UnknownFunction(_) => CellError::Name,
        FormulaError::InvalidReference(_) => CellError::Ref,
        _ => CellError::Value,
    }
}

impl Workbook {
    /// Assign a formula to a cell.
    ///
    /// Returns the resulting status. A formula that references its own cell
    /// is discarded, the cell's status becomes
    /// [`FormulaStatus::CircularReference`] and the error is returned. A
    /// reference outside the sheet extents fails without touching the cell.
    pub fn set_cell_formula(&mut self, sheet: SheetId, row: u32, col: u16, text: &str) -> Result<FormulaStatus> {
        self.sheet(sheet)?.check_position(row, col)?;
        let key = CellKey::new(sheet, row, col);
        let change = CellChange {
            sheet,
            range: RangePosition::new(row, col, 1, 1),
            kind: ChangeKind::Formula,
        };

        match self.write_formula_quiet(key, text) {
            Ok(status) => {
                if status == FormulaStatus::Normal {
                    self.recalc_key(key);
                }
                self.complete_edit(&[key], &[key], change);
                Ok(self.formula_status(sheet, row, col))
            }
            Err(Error::CircularReference(at)) => {
                self.complete_edit(&[key], &[key], change);
                Err(Error::CircularReference(at))
            }
            Err(e) => Err(e),
        }
    }

    /// Remove the formula of a cell together with its value and edges.
    ///
    /// Calling it on a cell without a formula does nothing.
    pub fn delete_cell_formula(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(row, col)?;
        let has_formula_state = ws
            .cell_at(row, col)
            .map_or(false, |c| c.has_formula() || c.status() != FormulaStatus::Normal);
        if !has_formula_state {
            return Ok(());
        }

        let key = CellKey::new(sheet, row, col);
        self.clear_references(key);
        if let Ok(ws) = self.sheet_mut(sheet) {
            if let Some(cell) = ws.cell_at_mut(row, col) {
                cell.clear_formula();
                cell.set_value(CellValue::Empty);
            }
            ws.discard_if_blank(row, col);
        }
        self.complete_edit(
            &[key],
            &[],
            CellChange {
                sheet,
                range: RangePosition::new(row, col, 1, 1),
                kind: ChangeKind::FormulaRemoved,
            },
        );
        Ok(())
    }

    /// Re-evaluate one formula cell without propagating.
    ///
    /// Cells in `SyntaxError` or `CircularReference` keep their state.
    pub fn recalc_cell(&mut self, sheet: SheetId, row: u32, col: u16) -> Result<FormulaStatus> {
        self.sheet(sheet)?.check_position(row, col)?;
        Ok(self.recalc_key(CellKey::new(sheet, row, col)))
    }

    /// Copy the formula at `from` into every cell of `to`, shifting relative
    /// references by each target's distance from the source.
    pub fn reuse_formula(&mut self, sheet: SheetId, from_row: u32, from_col: u16, to: RangePosition) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(to.end_row(), to.end_col())?;
        let ast = ws
            .cell_at(from_row, from_col)
            .and_then(|c| c.formula_ast())
            .ok_or_else(|| {
                Error::FormulaParse(format!(
                    "no formula to copy at {}",
                    sheetflow_core::CellPosition::new(from_row, from_col)
                ))
            })?;

        let mut grid = crate::action::PartialGrid::capture(self, sheet, to)?;
        for pos in to.cells() {
            if pos.row == from_row && pos.col == from_col {
                continue;
            }
            let shifted = offset_references(
                ast,
                pos.row as i64 - from_row as i64,
                pos.col as i64 - from_col as i64,
            );
            grid.set(pos.row, pos.col, crate::action::PartialGridCell::Formula(format!("={}", shifted)));
        }
        self.write_partial_grid(sheet, &grid, ChangeKind::Formula)
    }

    // === Internals ===

    /// Remove a cell's forward edges and trace arrows
    pub(crate) fn clear_references(&mut self, key: CellKey) {
        if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
            ws.formula_refs.remove(&(key.row, key.col));
            ws.traces.remove_cell(key.row, key.col);
        }
    }

    /// Store a raw value, dropping any formula state. No propagation.
    pub(crate) fn write_value_quiet(&mut self, key: CellKey, value: CellValue) {
        let had_formula = self
            .cell(key.sheet, key.row, key.col)
            .map_or(false, |c| c.has_formula() || c.status() != FormulaStatus::Normal);
        if had_formula {
            self.clear_references(key);
        }
        if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
            let cell = ws.cell_entry(key.row, key.col);
            cell.clear_formula();
            cell.set_value(value);
            ws.discard_if_blank(key.row, key.col);
        }
    }

    /// Parse and build edges for a formula and commit the outcome. No
    /// evaluation, no propagation.
    ///
    /// Out-of-range references leave the cell untouched and return the error.
    /// A self-reference commits the `CircularReference` state and returns
    /// the error.
    pub(crate) fn write_formula_quiet(&mut self, key: CellKey, text: &str) -> Result<FormulaStatus> {
        let text = normalize_formula_text(text);
        let ast = match parse_formula(&text) {
            Ok(ast) => ast,
            Err(e) => {
                debug!("{} keeps unparsable formula {}: {}", key, text, e);
                self.clear_references(key);
                if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
                    let cell = ws.cell_entry(key.row, key.col);
                    cell.formula_ast = None;
                    cell.status = FormulaStatus::SyntaxError;
                    cell.data = CellValue::Empty;
                    cell.display_text = text.clone();
                    cell.formula = Some(text);
                }
                return Ok(FormulaStatus::SyntaxError);
            }
        };

        let edges = match build_references(self, key, &ast, true) {
            Ok(edges) => edges,
            Err(Error::CircularReference(at)) => {
                debug!("{} rejected self-referencing formula {}", key, text);
                self.mark_circular(key);
                return Err(Error::CircularReference(at));
            }
            Err(e) => return Err(e),
        };

        self.clear_references(key);
        if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
            let cell = ws.cell_entry(key.row, key.col);
            cell.formula = Some(text);
            cell.formula_ast = Some(ast);
            cell.status = FormulaStatus::Normal;
            ws.formula_refs.insert((key.row, key.col), edges);
        }
        Ok(FormulaStatus::Normal)
    }

    /// Discard a cell's formula after a self-reference was found
    pub(crate) fn mark_circular(&mut self, key: CellKey) {
        self.clear_references(key);
        if let Some(ws) = self.worksheet_by_id_mut(key.sheet) {
            let cell = ws.cell_entry(key.row, key.col);
            cell.formula = None;
            cell.formula_ast = None;
            cell.status = FormulaStatus::CircularReference;
            cell.set_value(CellValue::Empty);
        }
    }

    /// Evaluate a formula cell and cache the outcome
    pub(crate) fn recalc_key(&mut self, key: CellKey) -> FormulaStatus {
        let outcome = {
            let Some(cell) = self.cell(key.sheet, key.row, key.col) else {
                return FormulaStatus::Normal;
            };
            if cell.status().blocks_evaluation() {
                return cell.status();
            }
            let Some(ast) = cell.formula_ast() else {
                return cell.status();
            };
            let ctx = EvaluationContext::new(&*self, key.sheet, key.row, key.col);
            evaluate(ast, &ctx)
        };
        trace!("recalc {}", key);

        let (status, value) = match outcome {
            // A formula reading only blank cells shows zero
            Ok(FormulaValue::Empty) => (FormulaStatus::Normal, CellValue::Number(0.0)),
            Ok(value) => (FormulaStatus::Normal, CellValue::from(value)),
            Err(err) => {
                let status = FormulaStatus::from_evaluation_error(&err);
                if status == FormulaStatus::UnspecifiedError {
                    error!("evaluation of {} failed: {}", key, err);
                    self.events.failure(&EvaluationFailure {
                        cell: key,
                        error: err.clone(),
                    });
                }
                (status, CellValue::Error(failure_value(&err)))
            }
        };

        if let Some(cell) = self
            .worksheet_by_id_mut(key.sheet)
            .and_then(|ws| ws.cell_at_mut(key.row, key.col))
        {
            cell.status = status;
            cell.set_value(value);
        }
        status
    }
}

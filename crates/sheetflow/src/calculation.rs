//! Incremental recalculation
//!
//! A change to a cell recalculates every formula cell whose edges cover it,
//! then recurses from each recalculated cell. The only cycle guard is the
//! active stack: a cell already being recalculated higher up the chain is not
//! entered again. There is no topological ordering; every reachable formula
//! cell is recomputed at least once per pass and recursion is bounded.
//!
//! An indirect cycle therefore settles on one stale pass. With `A1 = B1` and
//! then `B1 = A1 + 1`, assigning `B1` evaluates it to 1, recalculates `A1` to
//! 1, and stops because `B1` is already on the stack.

use crate::dependency::CellKey;
use crate::events::CellChange;
use crate::workbook::Workbook;
use log::debug;

/// Statistics from a full recalculation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalculationStats {
    /// Total number of formula cells
    pub formula_count: usize,
    /// Number of cells visited for recalculation, propagation included
    pub cells_calculated: usize,
    /// Number of cells left in an error status
    pub errors: usize,
}

/// Cells currently being recalculated, one frame per propagation level
#[derive(Debug, Default)]
pub(crate) struct ActiveStack {
    frames: Vec<Vec<CellKey>>,
    /// Every cell recalculated so far, in order
    recalculated: Vec<CellKey>,
}

impl ActiveStack {
    fn contains(&self, key: &CellKey) -> bool {
        self.frames.iter().any(|frame| frame.contains(key))
    }

    fn push(&mut self, frame: Vec<CellKey>) {
        self.frames.push(frame);
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Workbook {
    /// Recalculate everything that depends on the given cells.
    ///
    /// Dependents of all changed cells are gathered into a single frame, so a
    /// formula reading several of them is evaluated once. Returns the cells
    /// recalculated, in evaluation order.
    pub fn propagate_changes(&mut self, changed: &[CellKey]) -> Vec<CellKey> {
        let mut stack = ActiveStack::default();
        self.propagate(changed, &mut stack);
        stack.recalculated
    }

    /// Recalculate every formula cell in the workbook.
    ///
    /// Cells are visited row-major, sheet by sheet, sharing one active stack.
    /// Every formula cell is a starting point, even when propagation already
    /// reached it: a sibling in the same frame may have read it before its
    /// own precedents were fresh. Conditional formats are refreshed afterwards.
    pub fn recalculate_all(&mut self) -> CalculationStats {
        let cells: Vec<CellKey> = self
            .worksheets()
            .flat_map(|ws| {
                let id = ws.id();
                ws.formula_cells()
                    .into_iter()
                    .map(move |(row, col)| CellKey::new(id, row, col))
            })
            .collect();
        debug!("recalculating {} formula cells", cells.len());

        let mut stats = CalculationStats {
            formula_count: cells.len(),
            ..Default::default()
        };
        let mut stack = ActiveStack::default();
        for key in &cells {
            self.recalc_key(*key);
            stack.recalculated.push(*key);
            stack.push(vec![*key]);
            self.propagate(&[*key], &mut stack);
            stack.pop();
            stats.cells_calculated += stack.recalculated.len();
            stack.recalculated.clear();
        }
        stats.errors = cells
            .iter()
            .filter(|k| self.formula_status(k.sheet, k.row, k.col) != crate::FormulaStatus::Normal)
            .count();

        self.recalc_all_conditional_formats();
        stats
    }

    /// Propagate from `changed`, skipping anything already on the stack
    pub(crate) fn propagate(&mut self, changed: &[CellKey], stack: &mut ActiveStack) {
        let dependents: Vec<CellKey> = self
            .collect_dependents(changed)
            .into_iter()
            .filter(|k| !stack.contains(k))
            .collect();
        if dependents.is_empty() {
            return;
        }

        debug!(
            "propagation frame {}: {} dependents",
            stack.depth() + 1,
            dependents.len()
        );
        stack.push(dependents.clone());
        for key in dependents {
            self.recalc_key(key);
            stack.recalculated.push(key);
            self.propagate(&[key], stack);
        }
        stack.pop();
    }

    /// Formula cells with an edge covering any of `changed`, across every
    /// sheet, row-major per sheet
    fn collect_dependents(&self, changed: &[CellKey]) -> Vec<CellKey> {
        let mut dependents = Vec::new();
        for ws in self.worksheets() {
            let mut found: Vec<CellKey> = ws
                .formula_refs
                .iter()
                .filter(|(_, edges)| {
                    edges
                        .iter()
                        .any(|edge| changed.iter().any(|key| edge.contains(*key)))
                })
                .map(|((row, col), _)| CellKey::new(ws.id(), *row, *col))
                .collect();
            found.sort();
            dependents.extend(found);
        }
        dependents
    }

    /// Finish a mutating operation: propagate (when enabled), refresh the
    /// conditional formats touched by the change and notify listeners.
    ///
    /// `root` seeds the active stack, so a freshly assigned formula is not
    /// re-entered through an indirect cycle.
    pub(crate) fn complete_edit(&mut self, changed: &[CellKey], root: &[CellKey], change: CellChange) {
        let mut touched = changed.to_vec();
        if self.settings().auto_recalculate {
            let mut stack = ActiveStack::default();
            if !root.is_empty() {
                stack.push(root.to_vec());
            }
            self.propagate(changed, &mut stack);
            touched.extend(stack.recalculated);
        }
        self.refresh_conditional_formats(&touched);
        self.events.cell_data_changed(&change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorkbookSettings;
    use pretty_assertions::assert_eq;
    use sheetflow_core::{CellValue, RangePosition, SheetId};

    const S: SheetId = SheetId(0);

    fn key(a1: &str) -> CellKey {
        let p = sheetflow_core::CellPosition::parse(a1).unwrap();
        CellKey::new(S, p.row, p.col)
    }

    #[test]
    fn test_chain_propagates() {
        let mut wb = Workbook::new();
        wb.set_cell_formula(S, 0, 1, "=A1+1").unwrap();
        wb.set_cell_formula(S, 0, 2, "=B1*10").unwrap();
        wb.set_cell_data(S, 0, 0, 4.0).unwrap();
        assert_eq!(wb.cell_value(S, 0, 1), CellValue::Number(5.0));
        assert_eq!(wb.cell_value(S, 0, 2), CellValue::Number(50.0));
    }

    #[test]
    fn test_range_dependent_recalculated_once() {
        let mut wb = Workbook::with_settings(WorkbookSettings {
            auto_recalculate: false,
            ..Default::default()
        });
        wb.set_cell_formula(S, 0, 1, "=SUM(A1:A3)").unwrap();
        wb.set_range_data(
            S,
            RangePosition::parse("A1:A3").unwrap(),
            vec![1.0.into(), 2.0.into(), 3.0.into()],
        )
        .unwrap();

        let recalculated = wb.propagate_changes(&[key("A1"), key("A2"), key("A3")]);
        assert_eq!(recalculated, vec![key("B1")]);
        assert_eq!(wb.cell_value(S, 0, 1), CellValue::Number(6.0));
    }

    #[test]
    fn test_diamond_reaches_shared_dependent_twice() {
        let mut wb = Workbook::new();
        wb.set_cell_formula(S, 1, 0, "=A1*2").unwrap(); // A2
        wb.set_cell_formula(S, 2, 0, "=A1*3").unwrap(); // A3
        wb.set_cell_formula(S, 3, 0, "=A2+A3").unwrap(); // A4

        wb.settings_mut().auto_recalculate = false;
        wb.set_cell_data(S, 0, 0, 1.0).unwrap();
        let recalculated = wb.propagate_changes(&[key("A1")]);
        assert_eq!(wb.cell_value(S, 3, 0), CellValue::Number(5.0));
        // A4 is reached through A2 and again through A3
        assert_eq!(
            recalculated,
            vec![key("A2"), key("A4"), key("A3"), key("A4")]
        );
    }

    #[test]
    fn test_indirect_cycle_settles_after_one_pass() {
        let mut wb = Workbook::new();
        wb.set_cell_formula(S, 0, 0, "=B1").unwrap();
        wb.set_cell_formula(S, 0, 1, "=A1+1").unwrap();
        assert_eq!(wb.cell_value(S, 0, 1), CellValue::Number(1.0));
        assert_eq!(wb.cell_value(S, 0, 0), CellValue::Number(1.0));
        assert_eq!(wb.formula_status(S, 0, 0), crate::FormulaStatus::Normal);
    }

    #[test]
    fn test_recalculate_all_stats() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 2.0).unwrap();
        wb.set_cell_formula(S, 1, 0, "=A1*2").unwrap();
        wb.set_cell_formula(S, 2, 0, "=A2*2").unwrap();
        wb.set_cell_formula(S, 3, 0, "=1+").unwrap();

        let stats = wb.recalculate_all();
        assert_eq!(stats.formula_count, 3);
        assert_eq!(stats.errors, 1);
        // A2 reaches A3 and A3 is started again; A4 is visited but not evaluated
        assert_eq!(stats.cells_calculated, 4);
        assert_eq!(wb.cell_value(S, 2, 0), CellValue::Number(8.0));
    }

    #[test]
    fn test_recalculate_all_refreshes_sibling_read_too_early() {
        let mut wb = Workbook::with_settings(WorkbookSettings {
            auto_recalculate: false,
            ..Default::default()
        });
        wb.set_cell_formula(S, 2, 0, "=A1*2").unwrap(); // A3
        wb.set_cell_formula(S, 1, 0, "=A1+A3").unwrap(); // A2
        wb.set_cell_formula(S, 0, 0, "=10").unwrap(); // A1

        // A1 pushes [A2, A3] as one frame; A2 reads A3 before A3 is fresh
        let stats = wb.recalculate_all();
        assert_eq!(wb.cell_value(S, 0, 0), CellValue::Number(10.0));
        assert_eq!(wb.cell_value(S, 2, 0), CellValue::Number(20.0));
        assert_eq!(wb.cell_value(S, 1, 0), CellValue::Number(30.0));
        assert_eq!(stats.formula_count, 3);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_cross_sheet_dependents() {
        let mut wb = Workbook::new();
        let data = wb.add_worksheet("Data").unwrap();
        wb.set_cell_formula(S, 0, 0, "=Data!A1*2").unwrap();
        wb.set_cell_data(data, 0, 0, 21.0).unwrap();
        assert_eq!(wb.cell_value(S, 0, 0), CellValue::Number(42.0));
    }
}

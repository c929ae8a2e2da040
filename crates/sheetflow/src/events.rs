//! Callback registration
//!
//! Listeners are plain closures invoked synchronously after the operation that
//! triggers them. The auto-fill pre-hook is cancellable: any listener returning
//! `false` vetoes the fill.

use crate::action::Action;
use crate::dependency::CellKey;
use sheetflow_core::{RangePosition, SheetId};
use sheetflow_formula::FormulaError;
use std::fmt;

/// What kind of edit produced a [`CellChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Raw values were written
    Data,
    /// A formula was assigned
    Formula,
    /// A formula was removed
    FormulaRemoved,
    /// A serial fill wrote the range
    AutoFill,
}

/// Notification sent after cells changed
#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub sheet: SheetId,
    pub range: RangePosition,
    pub kind: ChangeKind,
}

/// Pending serial fill, offered to listeners before anything is written
#[derive(Debug, Clone, PartialEq)]
pub struct AutoFillRequest {
    pub sheet: SheetId,
    pub from: RangePosition,
    pub to: RangePosition,
}

/// An evaluation failure that maps to no specific formula status
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationFailure {
    pub cell: CellKey,
    pub error: FormulaError,
}

type CellChangedFn = Box<dyn FnMut(&CellChange)>;
type BeforeAutoFillFn = Box<dyn FnMut(&AutoFillRequest) -> bool>;
type FailureFn = Box<dyn FnMut(&EvaluationFailure)>;
type ActionFn = Box<dyn FnMut(&dyn Action)>;

/// Registered listeners of a workbook
#[derive(Default)]
pub struct WorkbookEvents {
    cell_data_changed: Vec<CellChangedFn>,
    before_auto_fill: Vec<BeforeAutoFillFn>,
    failure: Vec<FailureFn>,
    action: Vec<ActionFn>,
}

impl WorkbookEvents {
    /// Listen for cell data and formula changes
    pub fn on_cell_data_changed<F>(&mut self, f: F)
    where
        F: FnMut(&CellChange) + 'static,
    {
        self.cell_data_changed.push(Box::new(f));
    }

    /// Listen for serial fills before they run; return `false` to cancel
    pub fn on_before_auto_fill<F>(&mut self, f: F)
    where
        F: FnMut(&AutoFillRequest) -> bool + 'static,
    {
        self.before_auto_fill.push(Box::new(f));
    }

    /// Listen for evaluation failures with no specific status
    pub fn on_failure<F>(&mut self, f: F)
    where
        F: FnMut(&EvaluationFailure) + 'static,
    {
        self.failure.push(Box::new(f));
    }

    /// Receive every action applied through [`Workbook::do_action`](crate::Workbook::do_action)
    pub fn on_action<F>(&mut self, f: F)
    where
        F: FnMut(&dyn Action) + 'static,
    {
        self.action.push(Box::new(f));
    }

    pub(crate) fn cell_data_changed(&mut self, change: &CellChange) {
        for listener in &mut self.cell_data_changed {
            listener(change);
        }
    }

    /// Every listener is asked, even after one has vetoed
    pub(crate) fn before_auto_fill(&mut self, request: &AutoFillRequest) -> bool {
        let mut proceed = true;
        for listener in &mut self.before_auto_fill {
            proceed &= listener(request);
        }
        proceed
    }

    pub(crate) fn failure(&mut self, failure: &EvaluationFailure) {
        for listener in &mut self.failure {
            listener(failure);
        }
    }

    pub(crate) fn action(&mut self, action: &dyn Action) {
        for listener in &mut self.action {
            listener(action);
        }
    }
}

impl fmt::Debug for WorkbookEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkbookEvents")
            .field("cell_data_changed", &self.cell_data_changed.len())
            .field("before_auto_fill", &self.before_auto_fill.len())
            .field("failure", &self.failure.len())
            .field("action", &self.action.len())
            .finish()
    }
}

//! Tests for formula assignment and incremental recalculation

use proptest::prelude::*;
use sheetflow::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn workbook() -> (Workbook, SheetId) {
    init_logging();
    let wb = Workbook::new();
    let sheet = wb.sheet_id_by_name("Sheet1").unwrap();
    (wb, sheet)
}

fn range(a1: &str) -> RangePosition {
    RangePosition::parse(a1).unwrap()
}

/// A formula reading its own cell is rejected and leaves no formula behind
#[test]
fn test_direct_self_reference() {
    let (mut wb, s) = workbook();
    for text in ["=A1", "=A1+1", "=SUM(A1:B2)"] {
        let err = wb.set_cell_formula(s, 0, 0, text).unwrap_err();
        assert!(err.is_circular_reference());
        assert_eq!(wb.formula_status(s, 0, 0), FormulaStatus::CircularReference);
        assert_eq!(wb.cell_formula(s, 0, 0), None);
        assert!(wb.cell_formula_reference_ranges(s, 0, 0).is_empty());
    }

    // Address functions may read their own cell
    assert_eq!(wb.set_cell_formula(s, 0, 0, "=ROW(A1)").unwrap(), FormulaStatus::Normal);
    assert_eq!(wb.cell_value(s, 0, 0), CellValue::Number(1.0));
}

/// Several edits inside a range recalculate the reader once
#[test]
fn test_range_reader_recalculated_once_per_pass() {
    let (mut wb, s) = workbook();
    wb.set_cell_formula(s, 0, 3, "=SUM(A1:C3)").unwrap(); // D1

    let notified = Rc::new(RefCell::new(Vec::new()));
    let sink = notified.clone();
    wb.events_mut()
        .on_cell_data_changed(move |change| sink.borrow_mut().push(change.range));

    let values: Vec<CellValue> = (1..=9).map(|n| CellValue::Number(n as f64)).collect();
    wb.settings_mut().auto_recalculate = false;
    wb.set_range_data(s, range("A1:C3"), values).unwrap();

    let changed: Vec<CellKey> = range("A1:C3")
        .cells()
        .map(|p| CellKey::new(s, p.row, p.col))
        .collect();
    let pass = wb.propagate_changes(&changed);
    assert_eq!(pass, vec![CellKey::new(s, 0, 3)]);
    assert_eq!(wb.cell_value(s, 0, 3), CellValue::Number(45.0));
    // The block edit is announced once
    assert_eq!(*notified.borrow(), vec![range("A1:C3")]);
}

/// An A1 -> B1 -> A1 loop is not rejected and settles after one stale pass
#[test]
fn test_indirect_cycle_observable_behavior() {
    let (mut wb, s) = workbook();
    wb.set_cell_formula(s, 0, 0, "=B1").unwrap();
    assert_eq!(wb.set_cell_formula(s, 0, 1, "=A1+1").unwrap(), FormulaStatus::Normal);
    assert_eq!(wb.cell_value(s, 0, 0), CellValue::Number(1.0));
    assert_eq!(wb.cell_value(s, 0, 1), CellValue::Number(1.0));

    // Each further edit advances the loop by one pass
    wb.recalc_cell(s, 0, 1).unwrap();
    assert_eq!(wb.cell_value(s, 0, 1), CellValue::Number(2.0));
}

/// Deleting a formula removes its outgoing edges
#[test]
fn test_delete_formula_leaves_no_edges() {
    let (mut wb, s) = workbook();
    wb.set_cell_data(s, 0, 0, 3.0).unwrap();
    wb.set_cell_formula(s, 0, 1, "=A1*A1").unwrap(); // B1
    assert_eq!(wb.formula_direct_dependents(s, 0, 0), vec![CellKey::new(s, 0, 1)]);

    wb.delete_cell_formula(s, 0, 1).unwrap();
    assert!(wb.formula_direct_dependents(s, 0, 0).is_empty());
    assert!(wb.formula_direct_dependents(s, 0, 1).is_empty());
    assert!(wb.cell_formula_reference_ranges(s, 0, 1).is_empty());
    for ws in wb.worksheets() {
        for (row, col, _) in ws.cells() {
            let edges = wb.cell_formula_reference_ranges(ws.id(), row, col);
            assert!(edges.iter().all(|e| !e.contains(CellKey::new(s, 0, 1))));
        }
    }

    // Later edits no longer reach B1
    wb.set_cell_data(s, 0, 0, 4.0).unwrap();
    assert_eq!(wb.cell_value(s, 0, 1), CellValue::Empty);
}

/// Named ranges are resolved for edges and values
#[test]
fn test_named_range_dependencies() {
    let (mut wb, s) = workbook();
    wb.set_range_data(s, range("A1:A3"), vec![1.0.into(), 2.0.into(), 3.0.into()])
        .unwrap();
    wb.set_cell_formula(s, 0, 1, "=SUM(Totals)").unwrap();
    assert_eq!(wb.formula_status(s, 0, 1), FormulaStatus::NameNotFound);

    wb.define_named_range(s, "Totals", range("A1:A3")).unwrap();
    assert_eq!(wb.cell_value(s, 0, 1), CellValue::Number(6.0));

    wb.set_cell_data(s, 1, 0, 10.0).unwrap();
    assert_eq!(wb.cell_value(s, 0, 1), CellValue::Number(14.0));
}

/// The failure sink only hears about failures with no specific status
#[test]
fn test_status_per_evaluation_error() {
    let (mut wb, s) = workbook();
    let failures = Rc::new(RefCell::new(Vec::new()));
    let sink = failures.clone();
    wb.events_mut()
        .on_failure(move |f| sink.borrow_mut().push(f.cell));

    wb.set_cell_data(s, 0, 0, "abc").unwrap();
    assert_eq!(wb.set_cell_formula(s, 1, 0, "=A1*2").unwrap(), FormulaStatus::InvalidValue);
    assert_eq!(wb.set_cell_formula(s, 2, 0, "=missing").unwrap(), FormulaStatus::NameNotFound);
    assert_eq!(wb.set_cell_formula(s, 3, 0, "=(1+").unwrap(), FormulaStatus::SyntaxError);
    assert!(failures.borrow().is_empty());
}

/// Full recalculation reaches every formula on every sheet
#[test]
fn test_calculate_reports_stats() {
    let (mut wb, s) = workbook();
    let data = wb.add_worksheet("Data").unwrap();
    wb.settings_mut().auto_recalculate = false;
    wb.set_cell_data(data, 0, 0, 2.0).unwrap();
    wb.set_cell_formula(s, 0, 0, "=Data!A1*10").unwrap();
    wb.set_cell_formula(data, 1, 0, "=A1+1").unwrap();
    wb.set_cell_data(data, 0, 0, 5.0).unwrap();

    let stats = wb.calculate();
    assert_eq!(stats.formula_count, 2);
    assert_eq!(stats.errors, 0);
    assert_eq!(wb.cell_value(s, 0, 0), CellValue::Number(50.0));
    assert_eq!(wb.cell_value(data, 1, 0), CellValue::Number(6.0));
}

/// A full pass leaves no formula reading a stale sibling
#[test]
fn test_calculate_refreshes_every_formula() {
    let (mut wb, s) = workbook();
    wb.settings_mut().auto_recalculate = false;
    wb.set_cell_formula(s, 2, 0, "=A1*2").unwrap(); // A3
    wb.set_cell_formula(s, 1, 0, "=A1+A3").unwrap(); // A2
    wb.set_cell_formula(s, 0, 0, "=10").unwrap(); // A1

    let stats = wb.calculate();
    assert_eq!(stats.formula_count, 3);
    let column: Vec<CellValue> = (0..3).map(|row| wb.cell_value(s, row, 0)).collect();
    assert_eq!(
        column,
        vec![CellValue::Number(10.0), CellValue::Number(30.0), CellValue::Number(20.0)]
    );
}

proptest! {
    /// However many cells of a range change, one pass evaluates the reader once
    #[test]
    fn prop_range_reader_recalculated_once(changed in prop::collection::btree_set(0u32..10, 1..10)) {
        let mut wb = Workbook::with_settings(WorkbookSettings {
            auto_recalculate: false,
            ..Default::default()
        });
        let s = wb.sheet_id_by_name("Sheet1").unwrap();
        wb.set_cell_formula(s, 0, 1, "=SUM(A1:A10)").unwrap();

        let keys: Vec<CellKey> = changed.iter().map(|row| CellKey::new(s, *row, 0)).collect();
        for key in &keys {
            wb.set_cell_data(s, key.row, 0, 1.0).unwrap();
        }
        let pass = wb.propagate_changes(&keys);
        prop_assert_eq!(pass, vec![CellKey::new(s, 0, 1)]);
        prop_assert_eq!(wb.cell_value(s, 0, 1), CellValue::Number(changed.len() as f64));
    }
}

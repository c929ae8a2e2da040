//! Workbook type - the main document structure

use crate::calculation::CalculationStats;
use crate::cell::{Cell, FormulaStatus};
use crate::dependency::CellKey;
use crate::events::{CellChange, ChangeKind, WorkbookEvents};
use crate::settings::WorkbookSettings;
use crate::worksheet::Worksheet;
use log::debug;
use sheetflow_core::{
    CellStyle, CellValue, Error, NamedRangeCollection, RangePosition, Result, SheetId,
    MAX_SHEET_NAME_LEN,
};
use sheetflow_formula::CellSource;
use std::fmt;

/// A workbook (spreadsheet document)
///
/// The workbook owns every worksheet together with their dependency edges, and
/// drives recalculation and conditional formatting after each edit.
pub struct Workbook {
    /// Worksheets in the workbook
    sheets: Vec<Worksheet>,
    /// Next sheet id to hand out
    next_sheet_id: u32,
    /// Next conditional format id to hand out
    pub(crate) next_cf_id: u32,
    /// Workbook settings
    settings: WorkbookSettings,
    /// Registered listeners
    pub(crate) events: WorkbookEvents,
}

impl Workbook {
    /// Create a new workbook with one worksheet named "Sheet1"
    pub fn new() -> Self {
        Self::with_settings(WorkbookSettings::default())
    }

    /// Create a new workbook with one worksheet and custom settings
    pub fn with_settings(settings: WorkbookSettings) -> Self {
        let first = Worksheet::new(
            SheetId(0),
            "Sheet1",
            settings.default_rows,
            settings.default_columns,
        );
        Self {
            sheets: vec![first],
            next_sheet_id: 1,
            next_cf_id: 0,
            settings,
            events: WorkbookEvents::default(),
        }
    }

    /// Get workbook settings
    pub fn settings(&self) -> &WorkbookSettings {
        &self.settings
    }

    /// Get mutable workbook settings
    pub fn settings_mut(&mut self) -> &mut WorkbookSettings {
        &mut self.settings
    }

    /// Register listeners
    pub fn events_mut(&mut self) -> &mut WorkbookEvents {
        &mut self.events
    }

    // === Worksheets ===

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.sheets.iter()
    }

    pub(crate) fn worksheets_mut(&mut self) -> impl Iterator<Item = &mut Worksheet> {
        self.sheets.iter_mut()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.sheets.get(index)
    }

    /// Get a worksheet by id
    pub fn worksheet_by_id(&self, id: SheetId) -> Option<&Worksheet> {
        self.sheets.iter().find(|ws| ws.id() == id)
    }

    pub(crate) fn worksheet_by_id_mut(&mut self, id: SheetId) -> Option<&mut Worksheet> {
        self.sheets.iter_mut().find(|ws| ws.id() == id)
    }

    /// Get a worksheet by name (case-insensitive)
    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        let lower = name.to_lowercase();
        self.sheets.iter().find(|ws| ws.name().to_lowercase() == lower)
    }

    /// Id of the sheet with the given name (case-insensitive)
    pub fn sheet_id_by_name(&self, name: &str) -> Option<SheetId> {
        self.worksheet_by_name(name).map(Worksheet::id)
    }

    pub(crate) fn sheet(&self, id: SheetId) -> Result<&Worksheet> {
        self.worksheet_by_id(id)
            .ok_or_else(|| Error::SheetNotFound(id.to_string()))
    }

    pub(crate) fn sheet_mut(&mut self, id: SheetId) -> Result<&mut Worksheet> {
        self.worksheet_by_id_mut(id)
            .ok_or_else(|| Error::SheetNotFound(id.to_string()))
    }

    /// Add a new worksheet with the default extents
    pub fn add_worksheet(&mut self, name: &str) -> Result<SheetId> {
        let (rows, cols) = (self.settings.default_rows, self.settings.default_columns);
        self.add_worksheet_with_size(name, rows, cols)
    }

    /// Add a new worksheet with explicit extents
    pub fn add_worksheet_with_size(&mut self, name: &str, rows: u32, cols: u16) -> Result<SheetId> {
        self.validate_sheet_name(name)?;

        let id = SheetId(self.next_sheet_id);
        self.next_sheet_id += 1;
        self.sheets.push(Worksheet::new(id, name, rows, cols));
        debug!("added worksheet {} as {}", name, id);

        // Formulas naming this sheet before it existed now resolve
        self.rebuild_all_references();
        Ok(id)
    }

    /// Validate a sheet name
    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {} characters)",
                MAX_SHEET_NAME_LEN
            )));
        }

        // Check for invalid characters
        const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
        for c in INVALID_CHARS {
            if name.contains(*c) {
                return Err(Error::InvalidSheetName(format!(
                    "Sheet name cannot contain '{}'",
                    c
                )));
            }
        }

        // Check for duplicate names (case-insensitive)
        if self.worksheet_by_name(name).is_some() {
            return Err(Error::DuplicateSheetName(name.into()));
        }

        Ok(())
    }

    // === Cell Access ===

    /// Get a cell if it has been materialized
    pub fn cell(&self, sheet: SheetId, row: u32, col: u16) -> Option<&Cell> {
        self.worksheet_by_id(sheet).and_then(|ws| ws.cell_at(row, col))
    }

    /// Value of a cell (the cached result for formula cells)
    pub fn cell_value(&self, sheet: SheetId, row: u32, col: u16) -> CellValue {
        self.cell(sheet, row, col)
            .map(|c| c.data().clone())
            .unwrap_or_default()
    }

    /// Formula text of a cell, including the leading `=`
    pub fn cell_formula(&self, sheet: SheetId, row: u32, col: u16) -> Option<&str> {
        self.cell(sheet, row, col).and_then(Cell::formula)
    }

    /// Formula status of a cell
    pub fn formula_status(&self, sheet: SheetId, row: u32, col: u16) -> FormulaStatus {
        self.cell(sheet, row, col)
            .map(Cell::status)
            .unwrap_or_default()
    }

    /// Visible style of a cell
    pub fn cell_style(&self, sheet: SheetId, row: u32, col: u16) -> CellStyle {
        self.cell(sheet, row, col)
            .map(|c| *c.style())
            .unwrap_or_default()
    }

    // === Cell Modification ===

    /// Store a raw value, replacing any formula, and recalculate dependents
    pub fn set_cell_data<V: Into<CellValue>>(
        &mut self,
        sheet: SheetId,
        row: u32,
        col: u16,
        value: V,
    ) -> Result<()> {
        self.sheet(sheet)?.check_position(row, col)?;
        let key = CellKey::new(sheet, row, col);
        self.write_value_quiet(key, value.into());
        self.complete_edit(
            &[key],
            &[],
            CellChange {
                sheet,
                range: RangePosition::new(row, col, 1, 1),
                kind: ChangeKind::Data,
            },
        );
        Ok(())
    }

    /// Store a block of raw values (row-major) and recalculate dependents once
    /// for the whole block
    pub fn set_range_data(
        &mut self,
        sheet: SheetId,
        range: RangePosition,
        values: Vec<CellValue>,
    ) -> Result<()> {
        let ws = self.sheet(sheet)?;
        ws.check_position(range.row, range.col)?;
        ws.check_position(range.end_row(), range.end_col())?;
        if values.len() as u64 != range.cell_count() {
            return Err(Error::InvalidRange(format!(
                "{} holds {} cells, got {} values",
                range,
                range.cell_count(),
                values.len()
            )));
        }

        let keys: Vec<CellKey> = range
            .cells()
            .map(|p| CellKey::new(sheet, p.row, p.col))
            .collect();
        for (key, value) in keys.iter().zip(values) {
            self.write_value_quiet(*key, value);
        }
        self.complete_edit(
            &keys,
            &[],
            CellChange {
                sheet,
                range,
                kind: ChangeKind::Data,
            },
        );
        Ok(())
    }

    /// Set the user style of a cell
    ///
    /// When a conditional format currently overrides the cell, the new style
    /// becomes its baseline and formats are re-applied on top of it.
    pub fn set_cell_style(&mut self, sheet: SheetId, row: u32, col: u16, style: CellStyle) -> Result<()> {
        let ws = self.sheet_mut(sheet)?;
        ws.check_position(row, col)?;
        ws.cell_entry(row, col).set_user_style(style);
        ws.discard_if_blank(row, col);
        self.refresh_conditional_formats(&[CellKey::new(sheet, row, col)]);
        Ok(())
    }

    // === Named Ranges ===

    /// Define (or redefine) a named range on a sheet
    pub fn define_named_range(&mut self, sheet: SheetId, name: &str, range: RangePosition) -> Result<()> {
        let ws = self.sheet_mut(sheet)?;
        if range.end_row() >= ws.row_count() || range.end_col() >= ws.column_count() {
            return Err(Error::InvalidRange(range.to_string()));
        }
        ws.names_mut().define(name, range)?;
        self.rebuild_all_references();
        self.recalculate_all();
        Ok(())
    }

    /// Look up a named range on a sheet
    pub fn named_range(&self, sheet: SheetId, name: &str) -> Option<RangePosition> {
        self.worksheet_by_id(sheet).and_then(|ws| ws.names().range(name))
    }

    /// Named ranges defined on a sheet
    pub fn named_ranges(&self, sheet: SheetId) -> Option<&NamedRangeCollection> {
        self.worksheet_by_id(sheet).map(Worksheet::names)
    }

    /// Remove a named range; returns whether it existed
    pub fn undefine_named_range(&mut self, sheet: SheetId, name: &str) -> Result<bool> {
        let removed = self.sheet_mut(sheet)?.names_mut().remove(name).is_some();
        if removed {
            self.rebuild_all_references();
            self.recalculate_all();
        }
        Ok(removed)
    }

    // === Merged Cells ===

    /// Merge a range of cells
    pub fn merge_range(&mut self, sheet: SheetId, range: RangePosition) -> Result<()> {
        self.sheet_mut(sheet)?.merge_cells(range)
    }

    /// Unmerge a merged region; returns whether it existed
    pub fn unmerge_range(&mut self, sheet: SheetId, range: RangePosition) -> Result<bool> {
        Ok(self.sheet_mut(sheet)?.unmerge_cells(range))
    }

    /// Merged region covering a cell
    pub fn merged_range_at(&self, sheet: SheetId, row: u32, col: u16) -> Option<RangePosition> {
        self.worksheet_by_id(sheet)
            .and_then(|ws| ws.merged_region_at(row, col))
    }

    /// Recalculate every formula and report what was done
    pub fn calculate(&mut self) -> CalculationStats {
        self.recalculate_all()
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Workbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workbook")
            .field("sheets", &self.sheets)
            .field("settings", &self.settings)
            .field("events", &self.events)
            .finish()
    }
}

impl CellSource for Workbook {
    fn sheet_id(&self, name: &str) -> Option<SheetId> {
        self.sheet_id_by_name(name)
    }

    fn cell_value(&self, sheet: SheetId, row: u32, col: u16) -> CellValue {
        Workbook::cell_value(self, sheet, row, col)
    }

    fn resolve_name(&self, sheet: SheetId, name: &str) -> Option<RangePosition> {
        self.named_range(sheet, name)
    }
}

//! Workbook settings

/// Workbook-level settings
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkbookSettings {
    /// Row count of newly added worksheets
    pub default_rows: u32,
    /// Column count of newly added worksheets
    pub default_columns: u16,
    /// Propagate edits to dependent formulas immediately
    pub auto_recalculate: bool,
    /// Re-evaluate conditional formats after each edit
    pub conditional_formats_enabled: bool,
    /// Tolerance used by CellIs equality comparisons
    pub cell_is_epsilon: f64,
}

impl Default for WorkbookSettings {
    fn default() -> Self {
        Self {
            default_rows: 200,
            default_columns: 100,
            auto_recalculate: true,
            conditional_formats_enabled: true,
            cell_is_epsilon: 1e-5,
        }
    }
}

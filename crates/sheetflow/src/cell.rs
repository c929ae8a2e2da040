//! Cells and formula status

use sheetflow_core::{CellStyle, CellValue};
use sheetflow_formula::{FormulaError, FormulaExpr};
use std::fmt;

/// Outcome of the last formula assignment or evaluation of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FormulaStatus {
    /// No formula, or the formula evaluated cleanly
    #[default]
    Normal,
    /// The formula text did not parse; it is kept for display and never evaluated
    SyntaxError,
    /// The formula referenced its own cell and was discarded
    CircularReference,
    /// An operand had the wrong type
    InvalidValue,
    /// A name did not resolve
    NameNotFound,
    /// A function was unknown or called with the wrong number of arguments
    MismatchedParameter,
    /// Any other evaluation failure
    UnspecifiedError,
}

impl FormulaStatus {
    /// Whether the cell is excluded from evaluation until its formula is reassigned
    pub fn blocks_evaluation(&self) -> bool {
        matches!(self, FormulaStatus::SyntaxError | FormulaStatus::CircularReference)
    }

    /// Status an evaluation failure maps to
    pub fn from_evaluation_error(error: &FormulaError) -> Self {
        match error {
            FormulaError::TypeMismatch(_) => FormulaStatus::InvalidValue,
            FormulaError::NameNotFound(_) => FormulaStatus::NameNotFound,
            FormulaError::ParameterMismatch { .. } | FormulaError::UnknownFunction(_) => {
                FormulaStatus::MismatchedParameter
            }
            _ => FormulaStatus::UnspecifiedError,
        }
    }
}

impl fmt::Display for FormulaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FormulaStatus::Normal => "normal",
            FormulaStatus::SyntaxError => "syntax error",
            FormulaStatus::CircularReference => "circular reference",
            FormulaStatus::InvalidValue => "invalid value",
            FormulaStatus::NameNotFound => "name not found",
            FormulaStatus::MismatchedParameter => "mismatched parameter",
            FormulaStatus::UnspecifiedError => "unspecified error",
        };
        f.write_str(s)
    }
}

/// A single worksheet cell
///
/// For formula cells `data` holds the last evaluated value.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub(crate) data: CellValue,
    pub(crate) formula: Option<String>,
    pub(crate) formula_ast: Option<FormulaExpr>,
    pub(crate) status: FormulaStatus,
    pub(crate) display_text: String,
    pub(crate) style: CellStyle,
    /// Style before any conditional format touched the cell
    pub(crate) cf_baseline: Option<CellStyle>,
    /// Style currently imposed by conditional formats
    pub(crate) cf_override: Option<CellStyle>,
}

impl Cell {
    /// Raw data, or the cached result for formula cells
    pub fn data(&self) -> &CellValue {
        &self.data
    }

    /// Formula text including the leading `=`
    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    /// Parsed formula, when the text parsed and was accepted
    pub fn formula_ast(&self) -> Option<&FormulaExpr> {
        self.formula_ast.as_ref()
    }

    /// Whether the cell carries formula text
    pub fn has_formula(&self) -> bool {
        self.formula.is_some()
    }

    /// Formula status
    pub fn status(&self) -> FormulaStatus {
        self.status
    }

    /// Text shown in the grid
    pub fn display_text(&self) -> &str {
        &self.display_text
    }

    /// Visible style (including any conditional-format override)
    pub fn style(&self) -> &CellStyle {
        &self.style
    }

    /// Style a conditional format is currently imposing, if any
    pub fn conditional_style(&self) -> Option<&CellStyle> {
        self.cf_override.as_ref()
    }

    /// Whether the cell holds nothing worth keeping
    pub(crate) fn is_blank(&self) -> bool {
        self.data.is_empty()
            && self.formula.is_none()
            && self.style == CellStyle::default()
            && self.cf_baseline.is_none()
    }

    pub(crate) fn set_value(&mut self, value: CellValue) {
        self.display_text = value.display_text();
        self.data = value;
    }

    pub(crate) fn clear_formula(&mut self) {
        self.formula = None;
        self.formula_ast = None;
        self.status = FormulaStatus::Normal;
    }

    /// Apply a style delta from a conditional format, capturing the baseline once
    pub(crate) fn apply_conditional_style(&mut self, style: CellStyle) {
        if self.cf_baseline.is_none() {
            self.cf_baseline = Some(self.style);
        }
        self.style = style;
        self.cf_override = Some(style);
    }

    /// Put the baseline style back; the baseline itself is kept
    pub(crate) fn restore_baseline(&mut self) {
        if let Some(baseline) = self.cf_baseline {
            self.style = baseline;
        }
        self.cf_override = None;
    }

    /// Put the baseline style back and forget it
    pub(crate) fn reset_conditional_style(&mut self) {
        self.restore_baseline();
        self.cf_baseline = None;
    }

    /// Change the user style; a captured baseline follows the new style
    pub(crate) fn set_user_style(&mut self, style: CellStyle) {
        if self.cf_baseline.is_some() {
            self.cf_baseline = Some(style);
        }
        if self.cf_override.is_none() {
            self.style = style;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetflow_core::Color;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            FormulaStatus::from_evaluation_error(&FormulaError::TypeMismatch("x".into())),
            FormulaStatus::InvalidValue
        );
        assert_eq!(
            FormulaStatus::from_evaluation_error(&FormulaError::UnknownFunction("F".into())),
            FormulaStatus::MismatchedParameter
        );
        assert_eq!(
            FormulaStatus::from_evaluation_error(&FormulaError::Evaluation("boom".into())),
            FormulaStatus::UnspecifiedError
        );
        assert!(FormulaStatus::SyntaxError.blocks_evaluation());
        assert!(!FormulaStatus::InvalidValue.blocks_evaluation());
    }

    #[test]
    fn test_baseline_captured_once() {
        let mut cell = Cell::default();
        cell.style = CellStyle::new().bold(true);
        cell.apply_conditional_style(CellStyle::new().back_color(Color::RED));
        cell.apply_conditional_style(CellStyle::new().back_color(Color::BLUE));
        assert_eq!(cell.cf_baseline, Some(CellStyle::new().bold(true)));

        cell.reset_conditional_style();
        assert_eq!(cell.style, CellStyle::new().bold(true));
        assert!(cell.cf_baseline.is_none());
        assert!(cell.conditional_style().is_none());
    }
}

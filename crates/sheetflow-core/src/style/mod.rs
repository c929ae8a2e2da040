//! Cell styling types
//!
//! Only the style attributes a conditional format can change are modelled:
//! - [`CellStyle`] - back color, text color, bold, italic
//! - [`DifferentialFormat`] - a partial [`CellStyle`] applied on top of another
//! - [`Color`] - color representation

mod color;

pub use color::Color;

/// The style of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellStyle {
    /// Background (fill) color
    pub back_color: Color,
    /// Font color
    pub text_color: Color,
    /// Bold font
    pub bold: bool,
    /// Italic font
    pub italic: bool,
}

impl CellStyle {
    /// Create a new default style
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the background color
    pub fn back_color(mut self, color: Color) -> Self {
        self.back_color = color;
        self
    }

    /// Set the font color
    pub fn text_color(mut self, color: Color) -> Self {
        self.text_color = color;
        self
    }

    /// Set font to bold
    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = bold;
        self
    }

    /// Set font to italic
    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }

    /// Return this style with a differential format applied on top
    pub fn with_format(mut self, format: &DifferentialFormat) -> Self {
        if let Some(color) = format.back_color {
            self.back_color = color;
        }
        if let Some(color) = format.text_color {
            self.text_color = color;
        }
        if let Some(bold) = format.bold {
            self.bold = bold;
        }
        if let Some(italic) = format.italic {
            self.italic = italic;
        }
        self
    }
}

/// A style delta applied by a matching conditional-format rule
///
/// `None` leaves the underlying attribute untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DifferentialFormat {
    /// Background color override
    pub back_color: Option<Color>,
    /// Font color override
    pub text_color: Option<Color>,
    /// Bold override
    pub bold: Option<bool>,
    /// Italic override
    pub italic: Option<bool>,
}

impl DifferentialFormat {
    /// Create an empty differential format
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the background color
    pub fn back_color(mut self, color: Color) -> Self {
        self.back_color = Some(color);
        self
    }

    /// Override the font color
    pub fn text_color(mut self, color: Color) -> Self {
        self.text_color = Some(color);
        self
    }

    /// Override bold
    pub fn bold(mut self, bold: bool) -> Self {
        self.bold = Some(bold);
        self
    }

    /// Override italic
    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = Some(italic);
        self
    }

    /// Whether the format changes nothing
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

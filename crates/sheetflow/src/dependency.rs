//! Dependency graph builder
//!
//! Walks a formula AST and produces the reference edges a formula cell reads.
//! Edges are coordinates (`SheetId` plus a range), never live cell handles.
//!
//! The builder rejects direct self-reference only. A formula like `=A1` on
//! `B1` together with `=B1` on `A1` forms an indirect cycle that is accepted
//! here and later stopped by the propagation guard in
//! [`calculation`](crate::calculation).

use crate::workbook::Workbook;
use log::{debug, warn};
use sheetflow_core::{CellPosition, Error, PositionKind, RangePosition, Result, SheetId};
use sheetflow_formula::FormulaExpr;
use std::fmt;

/// Functions allowed to reference the cell that contains them
const ADDRESS_FUNCTIONS: &[&str] = &["ROW", "COLUMN", "ADDRESS", "INDIRECT"];

/// Workbook-wide coordinate of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: SheetId,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    /// Create a key
    pub const fn new(sheet: SheetId, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    /// Position within the sheet (relative on both axes)
    pub fn position(&self) -> CellPosition {
        CellPosition::new(self.row, self.col)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.position())
    }
}

/// One dependency edge target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceRange {
    pub sheet: SheetId,
    pub range: RangePosition,
}

impl ReferenceRange {
    /// Create an edge target
    pub const fn new(sheet: SheetId, range: RangePosition) -> Self {
        Self { sheet, range }
    }

    /// Whether the edge covers a cell
    pub fn contains(&self, key: CellKey) -> bool {
        self.sheet == key.sheet && self.range.contains_cell(key.row, key.col)
    }

    /// Whether the edge fully covers another edge
    pub fn contains_reference(&self, other: &ReferenceRange) -> bool {
        self.sheet == other.sheet && self.range.contains_range(&other.range)
    }
}

/// A dependency edge together with the reference that produced it
///
/// `origin` is the top-left of the referenced range, tagged per axis: an axis
/// is relative when either endpoint of the reference was relative on it. The
/// conditional-format layer uses the tags to widen rule dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormulaReferenceRange {
    pub reference: ReferenceRange,
    pub origin: CellPosition,
}

impl FormulaReferenceRange {
    /// Whether the edge covers a cell
    pub fn contains(&self, key: CellKey) -> bool {
        self.reference.contains(key)
    }
}

/// Collect the reference edges of `expr` evaluated at `anchor`.
///
/// * A reference without a sheet qualifier targets the anchor's sheet; a
///   qualifier naming no sheet is skipped.
/// * A reference beyond the target sheet's extents fails with
///   [`Error::ReferenceOutOfRange`].
/// * With `check_self_reference`, a reference covering the anchor on its own
///   sheet fails with [`Error::CircularReference`]. Arguments of ROW, COLUMN,
///   ADDRESS and INDIRECT are exempt.
/// * Names resolve through the anchor sheet's table; unknown names add no edge.
/// * A candidate already covered by an accepted edge is dropped.
pub fn build_references(
    workbook: &Workbook,
    anchor: CellKey,
    expr: &FormulaExpr,
    check_self_reference: bool,
) -> Result<Vec<FormulaReferenceRange>> {
    let mut builder = ReferenceBuilder {
        workbook,
        anchor,
        edges: Vec::new(),
    };
    builder.visit(expr, check_self_reference)?;
    debug!("{} edges built for {}", builder.edges.len(), anchor);
    Ok(builder.edges)
}

struct ReferenceBuilder<'a> {
    workbook: &'a Workbook,
    anchor: CellKey,
    edges: Vec<FormulaReferenceRange>,
}

impl ReferenceBuilder<'_> {
    fn visit(&mut self, expr: &FormulaExpr, check_self: bool) -> Result<()> {
        match expr {
            FormulaExpr::CellRef(r) => self.add(
                r.sheet.as_deref(),
                RangePosition::single(r.position),
                r.position,
                r.position,
                check_self,
            ),
            FormulaExpr::RangeRef(r) => {
                self.add(r.sheet.as_deref(), r.range(), r.start, r.end, check_self)
            }
            FormulaExpr::NameRef(name) => {
                let range = self
                    .workbook
                    .worksheet_by_id(self.anchor.sheet)
                    .and_then(|ws| ws.names().range(name));
                match range {
                    Some(range) => {
                        let corner = range.start();
                        let origin = CellPosition::absolute(corner.row, corner.col);
                        self.add(None, range, origin, origin, check_self)
                    }
                    None => {
                        debug!("name {} does not resolve, no edge added", name);
                        Ok(())
                    }
                }
            }
            FormulaExpr::BinaryOp { left, right, .. } => {
                self.visit(left, check_self)?;
                self.visit(right, check_self)
            }
            FormulaExpr::UnaryOp { operand, .. } => self.visit(operand, check_self),
            FormulaExpr::Paren(inner) => self.visit(inner, check_self),
            FormulaExpr::Function { name, args } => {
                let check = check_self && !ADDRESS_FUNCTIONS.contains(&name.as_str());
                for arg in args {
                    self.visit(arg, check)?;
                }
                Ok(())
            }
            FormulaExpr::Number(_)
            | FormulaExpr::String(_)
            | FormulaExpr::Boolean(_)
            | FormulaExpr::Error(_) => Ok(()),
        }
    }

    fn add(
        &mut self,
        sheet_name: Option<&str>,
        range: RangePosition,
        start: CellPosition,
        end: CellPosition,
        check_self: bool,
    ) -> Result<()> {
        let sheet = match sheet_name {
            None => self.anchor.sheet,
            Some(name) => match self.workbook.sheet_id_by_name(name) {
                Some(id) => id,
                None => {
                    warn!("reference to unknown sheet '{}' from {}", name, self.anchor);
                    return Ok(());
                }
            },
        };
        let Some(ws) = self.workbook.worksheet_by_id(sheet) else {
            return Ok(());
        };

        if range.end_row() >= ws.row_count() || range.end_col() >= ws.column_count() {
            return Err(Error::ReferenceOutOfRange(format!("{}!{}", ws.name(), range)));
        }

        if check_self && sheet == self.anchor.sheet && range.contains_cell(self.anchor.row, self.anchor.col) {
            return Err(Error::CircularReference(format!(
                "{}!{}",
                ws.name(),
                self.anchor.position()
            )));
        }

        let reference = ReferenceRange::new(sheet, range);
        if self
            .edges
            .iter()
            .any(|e| e.reference.contains_reference(&reference))
        {
            return Ok(());
        }

        let axis_kind = |a: PositionKind, b: PositionKind| {
            if a.is_absolute() && b.is_absolute() {
                PositionKind::Absolute
            } else {
                PositionKind::Relative
            }
        };
        let origin = CellPosition::with_kinds(
            range.row,
            range.col,
            axis_kind(start.row_kind, end.row_kind),
            axis_kind(start.col_kind, end.col_kind),
        );
        self.edges.push(FormulaReferenceRange { reference, origin });
        Ok(())
    }
}

impl Workbook {
    /// Forward edges of a formula cell
    pub fn cell_formula_reference_ranges(&self, sheet: SheetId, row: u32, col: u16) -> Vec<ReferenceRange> {
        self.worksheet_by_id(sheet)
            .and_then(|ws| ws.formula_refs.get(&(row, col)))
            .map(|edges| edges.iter().map(|e| e.reference).collect())
            .unwrap_or_default()
    }

    /// Formula cells with an edge covering the given cell, across every sheet
    pub fn formula_direct_dependents(&self, sheet: SheetId, row: u32, col: u16) -> Vec<CellKey> {
        let key = CellKey::new(sheet, row, col);
        let mut dependents = Vec::new();
        for ws in self.worksheets() {
            let mut found: Vec<CellKey> = ws
                .formula_refs
                .iter()
                .filter(|(_, edges)| edges.iter().any(|e| e.contains(key)))
                .map(|((r, c), _)| CellKey::new(ws.id(), *r, *c))
                .collect();
            found.sort();
            dependents.extend(found);
        }
        dependents
    }
}

//! Conditional-format evaluation
//!
//! Rule formulas are parsed once, relative to the top-left cell of the
//! format's range, and shifted by each cell's offset when evaluated. Rule
//! dependencies come from the same builder as formula edges; references that
//! are relative on an axis are widened to cover the whole format range on
//! that axis, so any cell a rule may read anywhere it applies is a trigger.
//! The format's own range is always a dependency too, since rules read the
//! cell they style.
//!
//! Each rule kind exposes the same two operations (dependency collection and
//! the per-cell predicate); the kind is a tagged union matched in one place.

use crate::dependency::{build_references, CellKey, FormulaReferenceRange, ReferenceRange};
use crate::workbook::Workbook;
use log::{debug, warn};
use sheetflow_core::{
    CfRule, CfRuleType, ConditionalFormat, DifferentialFormat, Error, RangePosition, Result, SheetId,
};
use sheetflow_formula::{evaluate, offset_references, parse_formula, EvaluationContext, FormulaExpr, FormulaValue};
use std::fmt;

/// Identity of a conditional format within its workbook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfId(u32);

impl fmt::Display for CfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cf#{}", self.0)
    }
}

/// A rule with its formulas parsed
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) rule: CfRule,
    /// One entry per rule formula; `None` when the text did not parse
    pub(crate) formulas: Vec<Option<FormulaExpr>>,
}

impl CompiledRule {
    fn compile(rule: CfRule) -> Self {
        let formulas = rule
            .formulas()
            .into_iter()
            .map(|text| match parse_formula(text) {
                Ok(expr) => Some(expr),
                Err(e) => {
                    warn!("conditional format formula {} ignored: {}", text, e);
                    None
                }
            })
            .collect();
        Self { rule, formulas }
    }

    /// Replace the parsed formulas and keep the rule text in step
    pub(crate) fn set_formulas(&mut self, formulas: Vec<Option<FormulaExpr>>) {
        let text = |i: usize| formulas.get(i).and_then(Option::as_ref).map(|f| format!("={}", f));
        match &mut self.rule.rule_type {
            CfRuleType::Expression { formula } => {
                if let Some(t) = text(0) {
                    *formula = t;
                }
            }
            CfRuleType::CellIs {
                formula1, formula2, ..
            } => {
                if let Some(t) = text(0) {
                    *formula1 = t;
                }
                if let (Some(f2), Some(t)) = (formula2.as_mut(), text(1)) {
                    *f2 = t;
                }
            }
        }
        self.formulas = formulas;
    }

    /// Dependency edges of the rule, built relative to `anchor`
    fn add_dependencies(&self, workbook: &Workbook, anchor: CellKey) -> Vec<FormulaReferenceRange> {
        let check_self = self.rule.rule_type.checks_self_reference();
        let mut edges = Vec::new();
        for expr in self.formulas.iter().flatten() {
            match build_references(workbook, anchor, expr, check_self) {
                Ok(found) => edges.extend(found),
                Err(e) => warn!("dependencies of rule at {} not tracked: {}", anchor, e),
            }
        }
        edges
    }

    /// Whether the rule holds for the cell at `anchor` + offset
    fn can_apply_format(&self, workbook: &Workbook, anchor: CellKey, row_offset: u32, col_offset: u16) -> bool {
        let (row, col) = (anchor.row + row_offset, anchor.col + col_offset);
        let ctx = EvaluationContext::new(workbook, anchor.sheet, row, col);
        let eval = |index: usize| -> Option<FormulaValue> {
            let expr = self.formulas.get(index)?.as_ref()?;
            let shifted = offset_references(expr, row_offset as i64, col_offset as i64);
            match evaluate(&shifted, &ctx) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("rule formula failed at {}: {}", CellKey::new(anchor.sheet, row, col), e);
                    None
                }
            }
        };

        match &self.rule.rule_type {
            CfRuleType::Expression { .. } => matches!(eval(0), Some(FormulaValue::Boolean(true))),
            CfRuleType::CellIs { operator, .. } => {
                let Some(value) = workbook.cell_value(anchor.sheet, row, col).as_number() else {
                    return false;
                };
                let number = |v: Option<FormulaValue>| match v {
                    Some(FormulaValue::Number(n)) => Some(n),
                    _ => None,
                };
                let Some(first) = number(eval(0)) else {
                    return false;
                };
                let second = if operator.is_binary_range() {
                    number(eval(1))
                } else {
                    None
                };
                operator.compare(value, first, second, workbook.settings().cell_is_epsilon)
            }
        }
    }
}

/// A conditional format with its rules compiled
#[derive(Debug, Clone)]
pub(crate) struct CompiledFormat {
    pub(crate) sqref: RangePosition,
    pub(crate) rules: Vec<CompiledRule>,
}

impl CompiledFormat {
    fn compile(format: ConditionalFormat) -> Self {
        Self {
            sqref: format.sqref,
            rules: format.rules.into_iter().map(CompiledRule::compile).collect(),
        }
    }

    /// The definition as currently held
    pub(crate) fn definition(&self) -> ConditionalFormat {
        ConditionalFormat {
            sqref: self.sqref,
            rules: self.rules.iter().map(|r| r.rule.clone()).collect(),
        }
    }
}

impl Workbook {
    /// Add conditional formats to a sheet and evaluate them.
    ///
    /// Ranges are clamped to the sheet extents. Rule formulas that do not
    /// parse never match, and rule dependencies that cannot be built are
    /// skipped with a warning; neither fails the call.
    pub fn try_add_conditional_formats(
        &mut self,
        sheet: SheetId,
        formats: Vec<ConditionalFormat>,
    ) -> Result<Vec<CfId>> {
        let (rows, cols) = {
            let ws = self.sheet(sheet)?;
            (ws.row_count(), ws.column_count())
        };

        let mut ids = Vec::with_capacity(formats.len());
        for format in formats {
            let mut compiled = CompiledFormat::compile(format);
            compiled.sqref = compiled.sqref.fix_range(rows, cols);
            let id = CfId(self.next_cf_id);
            self.next_cf_id += 1;

            let deps = self.format_dependencies(sheet, &compiled);
            let ws = self.sheet_mut(sheet)?;
            ws.conditional_formats.insert(id, compiled);
            ws.cf_refs.insert(id, deps);
            debug!("added conditional format {} on {}", id, sheet);
            ids.push(id);
        }

        for id in &ids {
            self.recalc_conditional_format(sheet, *id)?;
        }
        Ok(ids)
    }

    /// Remove a conditional format; returns whether it existed
    pub fn remove_conditional_format(&mut self, sheet: SheetId, id: CfId) -> Result<bool> {
        let ws = self.sheet_mut(sheet)?;
        let Some(removed) = ws.conditional_formats.remove(&id) else {
            return Ok(false);
        };
        ws.cf_refs.remove(&id);
        for pos in removed.sqref.cells() {
            if let Some(cell) = ws.cell_at_mut(pos.row, pos.col) {
                cell.restore_baseline();
            }
        }
        // Formats overlapping the removed range may have been masked by it
        let overlapping: Vec<CfId> = ws
            .conditional_formats
            .iter()
            .filter(|(_, f)| f.sqref.intersects(&removed.sqref))
            .map(|(id, _)| *id)
            .collect();
        for other in overlapping {
            self.recalc_conditional_format(sheet, other)?;
        }
        Ok(true)
    }

    /// Conditional formats of a sheet, in insertion order
    pub fn conditional_formats(&self, sheet: SheetId) -> Vec<(CfId, ConditionalFormat)> {
        self.worksheet_by_id(sheet)
            .map(|ws| {
                ws.conditional_formats
                    .iter()
                    .map(|(id, f)| (*id, f.definition()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dependency ranges tracked for a conditional format
    pub fn conditional_format_reference_ranges(&self, sheet: SheetId, id: CfId) -> Vec<ReferenceRange> {
        self.worksheet_by_id(sheet)
            .and_then(|ws| ws.cf_refs.get(&id))
            .cloned()
            .unwrap_or_default()
    }

    /// Re-evaluate every conditional format of a sheet
    pub fn recalc_conditional_formats(&mut self, sheet: SheetId) -> Result<()> {
        let ids: Vec<CfId> = self.sheet(sheet)?.conditional_formats.keys().copied().collect();
        for id in ids {
            self.recalc_conditional_format(sheet, id)?;
        }
        Ok(())
    }

    /// Re-evaluate one conditional format.
    ///
    /// Every cell of the range gets its baseline style back first. Rules are
    /// then applied in descending priority number, so where several rules
    /// match, the rule with the smallest priority number is applied last and
    /// stays visible.
    pub fn recalc_conditional_format(&mut self, sheet: SheetId, id: CfId) -> Result<()> {
        if !self.settings().conditional_formats_enabled {
            return Ok(());
        }
        let (sqref, applications) = {
            let wb: &Workbook = self;
            let ws = wb.sheet(sheet)?;
            let Some(compiled) = ws.conditional_formats.get(&id) else {
                return Err(Error::other(format!("no conditional format {} on {}", id, sheet)));
            };
            let sqref = compiled.sqref;
            let anchor = CellKey::new(sheet, sqref.row, sqref.col);

            let mut applications: Vec<(u32, u16, DifferentialFormat)> = Vec::new();
            for index in compiled.definition().application_order() {
                let rule = &compiled.rules[index];
                for pos in sqref.cells() {
                    let (row_offset, col_offset) = (pos.row - sqref.row, pos.col - sqref.col);
                    if rule.can_apply_format(wb, anchor, row_offset, col_offset) {
                        applications.push((pos.row, pos.col, rule.rule.format));
                    }
                }
            }
            (sqref, applications)
        };

        let ws = self.sheet_mut(sheet)?;
        for pos in sqref.cells() {
            if let Some(cell) = ws.cell_at_mut(pos.row, pos.col) {
                cell.restore_baseline();
            }
        }
        for (row, col, format) in applications {
            let cell = ws.cell_entry(row, col);
            let style = cell.style().with_format(&format);
            cell.apply_conditional_style(style);
            ws.cf_touched.insert((row, col));
        }
        Ok(())
    }

    /// Put back the baseline style of every cell a conditional format ever
    /// touched on the sheet, and forget the baselines.
    pub fn reset_conditional_formatting(&mut self, sheet: SheetId) -> Result<()> {
        let ws = self.sheet_mut(sheet)?;
        let touched: Vec<(u32, u16)> = ws.cf_touched.drain().collect();
        for (row, col) in touched {
            if let Some(cell) = ws.cell_at_mut(row, col) {
                cell.reset_conditional_style();
            }
            ws.discard_if_blank(row, col);
        }
        Ok(())
    }

    // === Internals ===

    /// Re-evaluate every format, on every sheet
    pub(crate) fn recalc_all_conditional_formats(&mut self) {
        let all: Vec<(SheetId, CfId)> = self
            .worksheets()
            .flat_map(|ws| {
                let sheet = ws.id();
                ws.conditional_formats.keys().map(move |id| (sheet, *id))
            })
            .collect();
        for (sheet, id) in all {
            if let Err(e) = self.recalc_conditional_format(sheet, id) {
                warn!("conditional format {} not refreshed: {}", id, e);
            }
        }
    }

    /// Re-evaluate the formats whose dependencies cover any changed cell
    pub(crate) fn refresh_conditional_formats(&mut self, changed: &[CellKey]) {
        if !self.settings().conditional_formats_enabled || changed.is_empty() {
            return;
        }
        let mut affected: Vec<(SheetId, CfId)> = Vec::new();
        for ws in self.worksheets() {
            for (id, deps) in &ws.cf_refs {
                // One covering range is enough
                if deps
                    .iter()
                    .any(|d| changed.iter().any(|key| d.contains(*key)))
                {
                    affected.push((ws.id(), *id));
                }
            }
        }
        affected.sort();
        for (sheet, id) in affected {
            if let Err(e) = self.recalc_conditional_format(sheet, id) {
                warn!("conditional format {} not refreshed: {}", id, e);
            }
        }
    }

    /// Rebuild the dependency ranges of every format on a sheet
    pub(crate) fn rebuild_conditional_dependencies(&mut self, sheet: SheetId) {
        let rebuilt: Vec<(CfId, Vec<ReferenceRange>)> = match self.worksheet_by_id(sheet) {
            Some(ws) => ws
                .conditional_formats
                .iter()
                .map(|(id, compiled)| (*id, self.format_dependencies(sheet, compiled)))
                .collect(),
            None => return,
        };
        if let Some(ws) = self.worksheet_by_id_mut(sheet) {
            ws.cf_refs = rebuilt.into_iter().collect();
        }
    }

    /// Dependency ranges of a format: its own range plus every rule edge,
    /// widened along relative axes and clamped to the target sheet
    fn format_dependencies(&self, sheet: SheetId, compiled: &CompiledFormat) -> Vec<ReferenceRange> {
        let sqref = compiled.sqref;
        let anchor = CellKey::new(sheet, sqref.row, sqref.col);
        let mut deps = vec![ReferenceRange::new(sheet, sqref)];
        for rule in &compiled.rules {
            for edge in rule.add_dependencies(self, anchor) {
                let Some(target) = self.worksheet_by_id(edge.reference.sheet) else {
                    continue;
                };
                let range = widen_relative_axes(&edge, sqref)
                    .fix_range(target.row_count(), target.column_count());
                let widened = ReferenceRange::new(edge.reference.sheet, range);
                if !deps.iter().any(|d| d.contains_reference(&widened)) {
                    deps.push(widened);
                }
            }
        }
        deps
    }
}

/// Stretch an edge over the format range along every axis its reference
/// left relative
fn widen_relative_axes(edge: &FormulaReferenceRange, sqref: RangePosition) -> RangePosition {
    let range = edge.reference.range;
    let extra_rows = if edge.origin.row_kind.is_absolute() {
        0
    } else {
        sqref.rows as i64 - 1
    };
    let extra_cols = if edge.origin.col_kind.is_absolute() {
        0
    } else {
        sqref.cols as i64 - 1
    };
    RangePosition::from_span(
        range.row as i64,
        range.col as i64,
        range.rows as i64 + extra_rows,
        range.cols as i64 + extra_cols,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sheetflow_core::{CellStyle, CellValue, Color};

    const S: SheetId = SheetId(0);

    fn red() -> DifferentialFormat {
        DifferentialFormat::new().back_color(Color::RED)
    }

    fn blue() -> DifferentialFormat {
        DifferentialFormat::new().back_color(Color::BLUE)
    }

    fn range(s: &str) -> RangePosition {
        RangePosition::parse(s).unwrap()
    }

    #[test]
    fn test_cell_is_rule_applies() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A1:A3"), vec![5.0.into(), 15.0.into(), "x".into()])
            .unwrap();
        let format = ConditionalFormat::new(range("A1:A3"))
            .with_rule(CfRule::cell_is_greater_than("10").with_format(red()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();

        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::Auto);
        assert_eq!(wb.cell_style(S, 1, 0).back_color, Color::RED);
        assert_eq!(wb.cell_style(S, 2, 0).back_color, Color::Auto);
    }

    #[test]
    fn test_lowest_priority_number_wins() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 25.0).unwrap();
        let format = ConditionalFormat::new(range("A1"))
            .with_rule(CfRule::cell_is_greater_than("10").with_priority(1).with_format(red()))
            .with_rule(CfRule::cell_is_greater_than("20").with_priority(2).with_format(blue()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::RED);

        // Only the priority 2 rule matching leaves blue
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 25.0).unwrap();
        let format = ConditionalFormat::new(range("A1"))
            .with_rule(CfRule::cell_is_greater_than("30").with_priority(1).with_format(red()))
            .with_rule(CfRule::cell_is_greater_than("20").with_priority(2).with_format(blue()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::BLUE);
    }

    #[test]
    fn test_expression_rule_shifts_per_cell() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("B1:B3"), vec![1.0.into(), 0.0.into(), 1.0.into()])
            .unwrap();
        let format = ConditionalFormat::new(range("A1:A3"))
            .with_rule(CfRule::expression("=B1=1").with_format(red()));
        let ids = wb.try_add_conditional_formats(S, vec![format]).unwrap();

        let colors: Vec<Color> = (0..3).map(|r| wb.cell_style(S, r, 0).back_color).collect();
        assert_eq!(colors, vec![Color::RED, Color::Auto, Color::RED]);

        // B1 relative on both axes: widened over the three rows
        let deps = wb.conditional_format_reference_ranges(S, ids[0]);
        assert_eq!(
            deps,
            vec![
                ReferenceRange::new(S, range("A1:A3")),
                ReferenceRange::new(S, range("B1:B3")),
            ]
        );

        // A change inside the widened range re-evaluates the format
        wb.set_cell_data(S, 1, 1, 1.0).unwrap();
        assert_eq!(wb.cell_style(S, 1, 0).back_color, Color::RED);
        wb.set_cell_data(S, 2, 1, 5.0).unwrap();
        assert_eq!(wb.cell_style(S, 2, 0).back_color, Color::Auto);
    }

    #[test]
    fn test_absolute_reference_not_widened() {
        let mut wb = Workbook::new();
        let format = ConditionalFormat::new(range("A1:C3"))
            .with_rule(CfRule::expression("=$E$1>0").with_format(red()));
        let ids = wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(
            wb.conditional_format_reference_ranges(S, ids[0]),
            vec![
                ReferenceRange::new(S, range("A1:C3")),
                ReferenceRange::new(S, range("E1")),
            ]
        );

        wb.set_cell_data(S, 0, 4, 1.0).unwrap();
        assert_eq!(wb.cell_style(S, 2, 2).back_color, Color::RED);
    }

    #[test]
    fn test_cell_is_tolerates_self_reference() {
        let mut wb = Workbook::new();
        wb.set_range_data(S, range("A1:A2"), vec![3.0.into(), 3.0.into()])
            .unwrap();
        let format = ConditionalFormat::new(range("A1:A2"))
            .with_rule(CfRule::cell_is_equal_to("=A1").with_format(red()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::RED);
        assert_eq!(wb.cell_style(S, 1, 0).back_color, Color::RED);
    }

    #[test]
    fn test_malformed_rule_does_not_block_others() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 50.0).unwrap();
        let format = ConditionalFormat::new(range("A1"))
            .with_rule(CfRule::expression("=(((").with_priority(1).with_format(blue()))
            .with_rule(CfRule::expression("=NOSUCH(A1)").with_priority(2).with_format(blue()))
            .with_rule(CfRule::cell_is_between("10", "100").with_priority(3).with_format(red()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::RED);
    }

    #[test]
    fn test_reset_restores_baseline() {
        let mut wb = Workbook::new();
        let baseline = CellStyle::new()
            .text_color(Color::GREEN)
            .bold(true)
            .italic(false);
        wb.set_cell_style(S, 0, 0, baseline).unwrap();
        wb.set_cell_data(S, 0, 0, 11.0).unwrap();
        let format = ConditionalFormat::new(range("A1")).with_rule(
            CfRule::cell_is_greater_than("10").with_format(
                DifferentialFormat::new()
                    .back_color(Color::RED)
                    .text_color(Color::WHITE)
                    .bold(false)
                    .italic(true),
            ),
        );
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(
            wb.cell_style(S, 0, 0),
            CellStyle::new()
                .back_color(Color::RED)
                .text_color(Color::WHITE)
                .italic(true)
        );

        wb.reset_conditional_formatting(S).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0), baseline);
    }

    #[test]
    fn test_value_change_reevaluates_and_restores() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 11.0).unwrap();
        let format = ConditionalFormat::new(range("A1"))
            .with_rule(CfRule::cell_is_greater_than("10").with_format(red()));
        wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::RED);

        wb.set_cell_data(S, 0, 0, 9.0).unwrap();
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::Auto);
        assert_eq!(wb.cell_value(S, 0, 0), CellValue::Number(9.0));
    }

    #[test]
    fn test_remove_conditional_format() {
        let mut wb = Workbook::new();
        wb.set_cell_data(S, 0, 0, 11.0).unwrap();
        let format = ConditionalFormat::new(range("A1"))
            .with_rule(CfRule::cell_is_greater_than("10").with_format(red()));
        let ids = wb.try_add_conditional_formats(S, vec![format]).unwrap();
        assert!(wb.remove_conditional_format(S, ids[0]).unwrap());
        assert_eq!(wb.cell_style(S, 0, 0).back_color, Color::Auto);
        assert!(!wb.remove_conditional_format(S, ids[0]).unwrap());
        assert!(wb.conditional_formats(S).is_empty());
    }
}

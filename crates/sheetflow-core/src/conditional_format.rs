//! Conditional formatting rule definitions
//!
//! A [`ConditionalFormat`] binds an anchor range (`sqref`) to an ordered list
//! of [`CfRule`]s. Rule formulas are written relative to the top-left cell of
//! the anchor range and shift across the range like copied formulas.
//!
//! ## Example
//!
//! ```rust
//! use sheetflow_core::{CfRule, ConditionalFormat, RangePosition};
//! use sheetflow_core::style::{Color, DifferentialFormat};
//!
//! let format = ConditionalFormat::new(RangePosition::parse("A1:A10").unwrap())
//!     .with_rule(
//!         CfRule::cell_is_greater_than("100")
//!             .with_priority(1)
//!             .with_format(DifferentialFormat::new().back_color(Color::RED)),
//!     );
//! assert_eq!(format.rules.len(), 1);
//! ```

use crate::position::RangePosition;
use crate::style::DifferentialFormat;

/// A conditional format: anchor range plus rules
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConditionalFormat {
    /// Range the rules apply to
    pub sqref: RangePosition,
    /// Rules, in definition order
    pub rules: Vec<CfRule>,
}

impl ConditionalFormat {
    /// Create a format with no rules
    pub fn new(sqref: RangePosition) -> Self {
        Self {
            sqref,
            rules: Vec::new(),
        }
    }

    /// Add a rule
    pub fn with_rule(mut self, rule: CfRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Rule indices ordered for application: descending priority number.
    ///
    /// Styles of later rules overwrite earlier ones, so the rule with the
    /// smallest priority number ends up visible. Ties keep definition order.
    pub fn application_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.rules.len()).collect();
        order.sort_by(|&a, &b| self.rules[b].priority.cmp(&self.rules[a].priority));
        order
    }
}

/// A single conditional formatting rule
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CfRule {
    /// Rule predicate
    pub rule_type: CfRuleType,
    /// Priority (lower = higher priority)
    pub priority: u32,
    /// Style delta applied when the predicate holds
    pub format: DifferentialFormat,
}

impl CfRule {
    /// Create a rule with priority 1 and an empty format
    pub fn new(rule_type: CfRuleType) -> Self {
        Self {
            rule_type,
            priority: 1,
            format: DifferentialFormat::default(),
        }
    }

    // === Cell Is rules ===

    /// Create a CellIs rule
    pub fn cell_is(operator: CfOperator, formula1: impl Into<String>, formula2: Option<String>) -> Self {
        Self::new(CfRuleType::CellIs {
            operator,
            formula1: formula1.into(),
            formula2,
        })
    }

    /// Highlight cells greater than a value
    pub fn cell_is_greater_than(value: impl Into<String>) -> Self {
        Self::cell_is(CfOperator::GreaterThan, value, None)
    }

    /// Highlight cells less than a value
    pub fn cell_is_less_than(value: impl Into<String>) -> Self {
        Self::cell_is(CfOperator::LessThan, value, None)
    }

    /// Highlight cells equal to a value
    pub fn cell_is_equal_to(value: impl Into<String>) -> Self {
        Self::cell_is(CfOperator::Equal, value, None)
    }

    /// Highlight cells between two values (inclusive)
    pub fn cell_is_between(value1: impl Into<String>, value2: impl Into<String>) -> Self {
        Self::cell_is(CfOperator::Between, value1, Some(value2.into()))
    }

    // === Expression rule ===

    /// Highlight cells where the formula evaluates to TRUE
    pub fn expression(formula: impl Into<String>) -> Self {
        Self::new(CfRuleType::Expression {
            formula: formula.into(),
        })
    }

    /// Set the priority
    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the style delta
    pub fn with_format(mut self, format: DifferentialFormat) -> Self {
        self.format = format;
        self
    }

    /// Formula texts carried by this rule, in order
    pub fn formulas(&self) -> Vec<&str> {
        match &self.rule_type {
            CfRuleType::Expression { formula } => vec![formula.as_str()],
            CfRuleType::CellIs {
                formula1, formula2, ..
            } => {
                let mut out = vec![formula1.as_str()];
                if let Some(f) = formula2 {
                    out.push(f.as_str());
                }
                out
            }
        }
    }
}

/// Rule predicate kinds
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CfRuleType {
    /// Formula evaluates to TRUE
    Expression { formula: String },

    /// Cell value comparison (e.g. "greater than 100")
    CellIs {
        operator: CfOperator,
        formula1: String,
        formula2: Option<String>,
    },
}

impl CfRuleType {
    /// Whether building dependencies for this rule rejects self-references
    pub fn checks_self_reference(&self) -> bool {
        matches!(self, CfRuleType::Expression { .. })
    }
}

/// Operators for CellIs rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CfOperator {
    /// Value is between formula1 and formula2
    #[default]
    Between,
    /// Value is NOT between formula1 and formula2
    NotBetween,
    /// Value equals formula1
    Equal,
    /// Value does NOT equal formula1
    NotEqual,
    /// Value is greater than formula1
    GreaterThan,
    /// Value is less than formula1
    LessThan,
    /// Value is greater than or equal to formula1
    GreaterThanOrEqual,
    /// Value is less than or equal to formula1
    LessThanOrEqual,
}

impl CfOperator {
    /// Whether the operator needs a second operand
    pub fn is_binary_range(&self) -> bool {
        matches!(self, CfOperator::Between | CfOperator::NotBetween)
    }

    /// Compare a cell value against the rule operands.
    ///
    /// Equality is tested with `epsilon`. `Between` accepts its bounds in
    /// either order; a missing second operand makes range operators false.
    pub fn compare(&self, value: f64, first: f64, second: Option<f64>, epsilon: f64) -> bool {
        let eq = |a: f64, b: f64| (a - b).abs() < epsilon;
        match self {
            CfOperator::Equal => eq(value, first),
            CfOperator::NotEqual => !eq(value, first),
            CfOperator::GreaterThan => value > first && !eq(value, first),
            CfOperator::GreaterThanOrEqual => value > first || eq(value, first),
            CfOperator::LessThan => value < first && !eq(value, first),
            CfOperator::LessThanOrEqual => value < first || eq(value, first),
            CfOperator::Between | CfOperator::NotBetween => {
                let Some(second) = second else {
                    return false;
                };
                let (lo, hi) = (first.min(second), first.max(second));
                let inside = (value > lo || eq(value, lo)) && (value < hi || eq(value, hi));
                if *self == CfOperator::Between {
                    inside
                } else {
                    !inside
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-5;

    #[test]
    fn test_compare_operators() {
        assert!(CfOperator::GreaterThan.compare(25.0, 10.0, None, EPS));
        assert!(!CfOperator::GreaterThan.compare(10.000001, 10.0, None, EPS));
        assert!(CfOperator::GreaterThanOrEqual.compare(10.000001, 10.0, None, EPS));
        assert!(CfOperator::Equal.compare(1.000001, 1.0, None, EPS));
        assert!(CfOperator::NotEqual.compare(1.1, 1.0, None, EPS));
        assert!(CfOperator::LessThan.compare(-1.0, 0.0, None, EPS));
        assert!(CfOperator::LessThanOrEqual.compare(0.0, 0.0, None, EPS));
    }

    #[test]
    fn test_between_accepts_swapped_bounds() {
        assert!(CfOperator::Between.compare(5.0, 10.0, Some(1.0), EPS));
        assert!(CfOperator::Between.compare(10.0, 1.0, Some(10.0), EPS));
        assert!(CfOperator::NotBetween.compare(11.0, 1.0, Some(10.0), EPS));
        assert!(!CfOperator::Between.compare(5.0, 1.0, None, EPS));
        assert!(!CfOperator::NotBetween.compare(5.0, 1.0, None, EPS));
    }

    #[test]
    fn test_application_order_descending_priority() {
        let format = ConditionalFormat::new(RangePosition::new(0, 0, 1, 1))
            .with_rule(CfRule::cell_is_greater_than("10").with_priority(1))
            .with_rule(CfRule::cell_is_greater_than("20").with_priority(2))
            .with_rule(CfRule::expression("TRUE").with_priority(2));
        assert_eq!(format.application_order(), vec![1, 2, 0]);
    }

    #[test]
    fn test_formulas() {
        let rule = CfRule::cell_is_between("1", "A1*2");
        assert_eq!(rule.formulas(), vec!["1", "A1*2"]);
        assert!(!rule.rule_type.checks_self_reference());
        assert!(CfRule::expression("A1>0").rule_type.checks_self_reference());
    }
}

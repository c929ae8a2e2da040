//! Serial pattern detection for auto fill
//!
//! A [`SerialFiller`] is detected from the source values of one fill line and
//! then produces a value for any linear index. Index `0` is the first source
//! value; forward fills ask for `n, n + 1, ...` and backward fills for
//! `-1, -2, ...`.

use lazy_regex::regex_captures;
use sheetflow_core::CellValue;

/// Tolerance for treating consecutive steps as equal
const STEP_TOLERANCE: f64 = 1e-9;

/// Extrapolation strategy detected from source values
#[derive(Debug, Clone, PartialEq)]
pub enum SerialFiller {
    /// Numbers on a line: `start + step * index`
    Linear { start: f64, step: f64 },
    /// Text with a trailing counter: `prefix` followed by `start + step * index`,
    /// never below zero
    Counter {
        prefix: String,
        start: i64,
        step: i64,
        /// Zero-padded digit width of the first source value
        width: usize,
    },
    /// Anything else repeats the source values
    Cycle(Vec<CellValue>),
}

impl SerialFiller {
    /// Detect the pattern of a line of source values
    pub fn detect(values: &[CellValue]) -> Self {
        if let Some(numbers) = all_numbers(values) {
            return Self::linear(&numbers);
        }
        if let Some(counter) = Self::counter(values) {
            return counter;
        }
        SerialFiller::Cycle(values.to_vec())
    }

    fn linear(numbers: &[f64]) -> Self {
        let start = numbers[0];
        if numbers.len() == 1 {
            return SerialFiller::Linear { start, step: 0.0 };
        }
        let first_step = numbers[1] - numbers[0];
        let constant = numbers
            .windows(2)
            .all(|w| ((w[1] - w[0]) - first_step).abs() <= STEP_TOLERANCE);
        let step = if constant {
            first_step
        } else {
            (numbers[numbers.len() - 1] - start) / (numbers.len() - 1) as f64
        };
        SerialFiller::Linear { start, step }
    }

    fn counter(values: &[CellValue]) -> Option<Self> {
        let mut parts = Vec::with_capacity(values.len());
        for value in values {
            let text = value.as_str()?;
            let (_, prefix, digits) = regex_captures!(r"^(.*?)(\d+)$", text)?;
            parts.push((prefix, digits.parse::<i64>().ok()?, digits.len()));
        }
        let (prefix, start, width) = *parts.first()?;
        if parts.iter().any(|(p, _, _)| *p != prefix) {
            return None;
        }
        let step = match parts.get(1) {
            Some((_, second, _)) => second - start,
            None => 1,
        };
        let progression = parts
            .windows(2)
            .all(|w| w[1].1 - w[0].1 == step);
        if !progression {
            return None;
        }
        Some(SerialFiller::Counter {
            prefix: prefix.to_string(),
            start,
            step,
            width,
        })
    }

    /// Value at a linear index relative to the first source value
    pub fn get_serial_value(&self, index: i64) -> CellValue {
        match self {
            SerialFiller::Linear { start, step } => CellValue::Number(start + step * index as f64),
            SerialFiller::Counter {
                prefix,
                start,
                step,
                width,
            } => {
                // Counting down stops at zero
                let n = start.saturating_add(step.saturating_mul(index)).max(0);
                CellValue::String(format!("{}{:0width$}", prefix, n, width = *width))
            }
            SerialFiller::Cycle(values) => {
                if values.is_empty() {
                    return CellValue::Empty;
                }
                let i = index.rem_euclid(values.len() as i64) as usize;
                values[i].clone()
            }
        }
    }
}

fn all_numbers(values: &[CellValue]) -> Option<Vec<f64>> {
    if values.is_empty() {
        return None;
    }
    values
        .iter()
        .map(|v| match v {
            CellValue::Number(n) => Some(*n),
            _ => None,
        })
        .collect()
}

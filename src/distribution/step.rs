use std::fmt;

const TOLERANCE: f64 = 1e-6;
const MAX_DECIMALS: u32 = 6;

/// Rounding granularity for assigned marks.
///
/// The engine counts in whole steps ("units") so that sums and multiples are
/// exact; floats only appear at the edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step(f64);

impl Step {
    pub const WHOLE: Step = Step(1.0);
    pub const QUARTER: Step = Step(0.25);

    /// Returns `None` unless `value` is finite and positive.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value > 0.0).then_some(Self(value))
    }

    /// Whole marks for whole totals, quarter marks otherwise.
    pub fn infer(total: f64) -> Self {
        if total.fract() == 0.0 {
            Self::WHOLE
        } else {
            Self::QUARTER
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Number of steps in `value`, or `None` if `value` is negative,
    /// non-finite, or not a multiple of the step.
    pub fn units_of(self, value: f64) -> Option<u64> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let units = (value / self.0).round();
        if units >= u64::MAX as f64 || (units * self.0 - value).abs() > TOLERANCE {
            return None;
        }
        Some(units as u64)
    }

    /// Whole steps that fit under `max`.
    pub fn floor_units(self, max: f64) -> u64 {
        if !max.is_finite() || max <= 0.0 {
            return 0;
        }
        (max / self.0 + TOLERANCE).floor() as u64
    }

    /// Value of `units` steps, rounded to the step's own precision so that
    /// `3 * 0.1` prints as `0.3`.
    pub fn to_value(self, units: u64) -> f64 {
        let scale = 10f64.powi(self.decimals() as i32);
        (units as f64 * self.0 * scale).round() / scale
    }

    /// Decimal places needed to print the step exactly (capped at 6).
    pub fn decimals(self) -> u32 {
        let mut decimals = 0;
        let mut v = self.0;
        while decimals < MAX_DECIMALS && (v - v.round()).abs() > TOLERANCE {
            v *= 10.0;
            decimals += 1;
        }
        decimals
    }
}

impl Default for Step {
    fn default() -> Self {
        Self::WHOLE
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random source used by the engine.
///
/// Kept as a trait so tests can script exact draws.
pub trait MarkRng {
    /// Uniform integer in `low..=high`. Returns `low` if the range is empty.
    fn uniform_int(&mut self, low: u64, high: u64) -> u64;

    /// Uniform real in `low..high`. Returns `low` if the range is empty.
    fn uniform_real(&mut self, low: f64, high: f64) -> f64;
}

/// Adapts any `rand` generator to [`MarkRng`].
#[derive(Debug, Clone)]
pub struct RngSource<R>(R);

impl<R: Rng> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self(rng)
    }
}

impl RngSource<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Independent stream for one row of a batch.
    ///
    /// With a seed the stream depends only on `(seed, row)`, so output does
    /// not change with processing order.
    pub fn for_row(seed: Option<u64>, row: usize) -> Self {
        match seed {
            Some(seed) => {
                Self::seeded(seed.wrapping_add((row as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)))
            }
            None => Self::from_entropy(),
        }
    }
}

impl<R: Rng> MarkRng for RngSource<R> {
    fn uniform_int(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.0.gen_range(low..=high)
    }

    fn uniform_real(&mut self, low: f64, high: f64) -> f64 {
        if !low.is_finite() || !high.is_finite() || high <= low {
            return low;
        }
        self.0.gen_range(low..high)
    }
}

/// Replays fixed draws. Integers are clamped into range; reals are fractions
/// of the requested range. Once exhausted it keeps returning `low`.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ScriptedRng {
    ints: std::collections::VecDeque<u64>,
    fractions: std::collections::VecDeque<f64>,
}

#[cfg(test)]
impl ScriptedRng {
    pub(crate) fn new(ints: &[u64], fractions: &[f64]) -> Self {
        Self {
            ints: ints.iter().copied().collect(),
            fractions: fractions.iter().copied().collect(),
        }
    }
}

#[cfg(test)]
impl MarkRng for ScriptedRng {
    fn uniform_int(&mut self, low: u64, high: u64) -> u64 {
        self.ints.pop_front().unwrap_or(low).clamp(low, high.max(low))
    }

    fn uniform_real(&mut self, low: f64, high: f64) -> f64 {
        let fraction = self.fractions.pop_front().unwrap_or(0.0);
        low + fraction * (high - low)
    }
}

use thiserror::Error;

use super::rng::MarkRng;
use super::step::Step;
use super::template::Template;
use super::types::{Allocation, Distribution, Mark, Mode};

/// Passes of the one-unit-at-a-time residual correction.
pub const MAX_CORRECTION_PASSES: usize = 1000;
/// NA selections tried before giving up on a total the groups cannot hold.
pub const MAX_SELECTION_ATTEMPTS: usize = 64;
/// Redraws of random magnitudes when every draw came out zero.
pub const MAX_RESAMPLES: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DistributeError {
    #[error("invalid total '{total}': {reason}")]
    InvalidTotal { total: String, reason: String },

    #[error("total {total} exceeds the structure's capacity of {capacity}")]
    InfeasibleTotal { total: f64, capacity: f64 },

    #[error("distribution of {total} did not converge after {attempts} attempts")]
    DidNotConverge { total: f64, attempts: usize },
}

impl DistributeError {
    pub fn invalid_total(total: impl ToString, reason: impl Into<String>) -> Self {
        DistributeError::InvalidTotal {
            total: total.to_string(),
            reason: reason.into(),
        }
    }
}

/// Split `total` over the components of `template`.
///
/// One member of every NA-group is marked not attempted. The remaining
/// components receive multiples of `step` that never exceed their maxima and
/// sum to `total` exactly.
pub fn distribute<R: MarkRng + ?Sized>(
    total: f64,
    template: &Template,
    mode: Mode,
    step: Step,
    rng: &mut R,
) -> Result<Distribution, DistributeError> {
    if !total.is_finite() {
        return Err(DistributeError::invalid_total(total, "not a finite number"));
    }
    if total < 0.0 {
        return Err(DistributeError::invalid_total(total, "must not be negative"));
    }
    if total / step.value() >= u64::MAX as f64 {
        return Err(DistributeError::invalid_total(total, "too large"));
    }
    let total_units = step.units_of(total).ok_or_else(|| {
        DistributeError::invalid_total(total, format!("not a multiple of step {}", step))
    })?;

    let caps: Vec<u64> = template
        .components()
        .iter()
        .map(|c| step.floor_units(c.max))
        .collect();
    let capacity = saturating_sum(&caps);
    if total_units > capacity {
        return Err(DistributeError::InfeasibleTotal {
            total,
            capacity: step.to_value(capacity),
        });
    }

    for _ in 0..MAX_SELECTION_ATTEMPTS {
        let excluded = select_not_attempted(template, rng);
        let allowed: Vec<usize> = (0..caps.len()).filter(|i| !excluded.contains(i)).collect();
        let allowed_caps: Vec<u64> = allowed.iter().map(|&i| caps[i]).collect();

        // This selection dropped too much; draw another
        if saturating_sum(&allowed_caps) < total_units {
            continue;
        }

        let units = match mode {
            Mode::Equal => split_equal(&allowed_caps, total_units),
            Mode::Random => split_random(&allowed_caps, total_units, rng),
        }
        .map_err(|attempts| DistributeError::DidNotConverge { total, attempts })?;

        let mut assigned = units.into_iter();
        let entries = template
            .components()
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let mark = if excluded.contains(&i) {
                    Mark::NotAttempted
                } else {
                    Mark::Score(step.to_value(assigned.next().unwrap_or(0)))
                };
                Allocation {
                    id: c.id.clone(),
                    max: c.max,
                    mark,
                }
            })
            .collect();

        return Ok(Distribution {
            total,
            step,
            entries,
        });
    }

    Err(DistributeError::DidNotConverge {
        total,
        attempts: MAX_SELECTION_ATTEMPTS,
    })
}

/// Sum of unit counts. Huge maxima floor to `u64::MAX` units, so plain
/// addition could overflow.
fn saturating_sum(units: &[u64]) -> u64 {
    units.iter().fold(0u64, |acc, &u| acc.saturating_add(u))
}

/// Pick one member of each NA-group uniformly at random.
fn select_not_attempted<R: MarkRng + ?Sized>(template: &Template, rng: &mut R) -> Vec<usize> {
    template
        .group_indices()
        .iter()
        .map(|group| {
            let last = group.len() - 1;
            let pick = (rng.uniform_int(0, last as u64) as usize).min(last);
            group[pick]
        })
        .collect()
}

// Both splitters return the exhausted attempt budget on failure.

fn split_equal(caps: &[u64], total: u64) -> Result<Vec<u64>, usize> {
    let weights: Vec<f64> = caps.iter().map(|&c| c as f64).collect();
    let mut values = apportion(&weights, caps, total);
    if correct(&mut values, caps, total, 0) {
        Ok(values)
    } else {
        Err(MAX_CORRECTION_PASSES)
    }
}

fn split_random<R: MarkRng + ?Sized>(
    caps: &[u64],
    total: u64,
    rng: &mut R,
) -> Result<Vec<u64>, usize> {
    if total == 0 || caps.is_empty() {
        return Ok(vec![0; caps.len()]);
    }

    let mut weights = Vec::new();
    for _ in 0..MAX_RESAMPLES {
        weights = caps
            .iter()
            .map(|&c| rng.uniform_real(0.0, c as f64))
            .collect();
        if weights.iter().sum::<f64>() > 0.0 {
            break;
        }
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        return Err(MAX_RESAMPLES);
    }

    let mut values = apportion(&weights, caps, total);
    let start = rng.uniform_int(0, caps.len() as u64 - 1) as usize;
    if correct(&mut values, caps, total, start) {
        Ok(values)
    } else {
        Err(MAX_CORRECTION_PASSES)
    }
}

/// Proportional split of `total` units by `weights`, capped per component.
///
/// Components whose share would reach their cap are pinned there and the
/// rest is re-split among the others. Shares are floored, so the result
/// undershoots by fewer units than there are open components.
fn apportion(weights: &[f64], caps: &[u64], total: u64) -> Vec<u64> {
    let mut values = vec![0u64; caps.len()];
    let mut remaining = total;
    let mut open: Vec<usize> = (0..caps.len()).filter(|&i| caps[i] > 0).collect();

    while remaining > 0 && !open.is_empty() {
        let mut weight_sum: f64 = open.iter().map(|&i| weights[i]).sum();
        let use_caps = weight_sum <= 0.0;
        if use_caps {
            weight_sum = open.iter().map(|&i| caps[i] as f64).sum();
        }

        let shares: Vec<(usize, u64)> = open
            .iter()
            .map(|&i| {
                let w = if use_caps { caps[i] as f64 } else { weights[i] };
                (i, (remaining as f64 * w / weight_sum).floor() as u64)
            })
            .collect();

        let saturated: Vec<usize> = shares
            .iter()
            .filter(|&&(i, share)| share >= caps[i])
            .map(|&(i, _)| i)
            .collect();

        if saturated.is_empty() {
            for (i, share) in shares {
                let share = share.min(remaining);
                values[i] = share;
                remaining -= share;
            }
            break;
        }

        for &i in &saturated {
            values[i] = caps[i];
            remaining = remaining.saturating_sub(caps[i]);
        }
        open.retain(|i| !saturated.contains(i));
    }

    values
}

/// Move one unit at a time until `values` sums to `total`, cycling from
/// `start`. Returns false if the pass budget runs out first.
fn correct(values: &mut [u64], caps: &[u64], total: u64, start: usize) -> bool {
    let n = values.len();
    let assigned: u128 = values.iter().map(|&v| v as u128).sum();
    let mut residual = total as i128 - assigned as i128;
    if n == 0 {
        return residual == 0;
    }

    let mut passes = 0;
    while residual != 0 && passes < MAX_CORRECTION_PASSES {
        for offset in 0..n {
            if residual == 0 {
                break;
            }
            let i = (start + offset) % n;
            if residual > 0 && values[i] < caps[i] {
                values[i] += 1;
                residual -= 1;
            } else if residual < 0 && values[i] > 0 {
                values[i] -= 1;
                residual += 1;
            }
        }
        passes += 1;
    }

    residual == 0
}

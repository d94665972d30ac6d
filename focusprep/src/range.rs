//! Focuser position sequence generation.
//!
//! A scan range is described by a (lower, upper, step) triple in focuser
//! ticks. The derived sequence starts at the lower limit, increments by the
//! step size and stops at the largest value that does not exceed the upper
//! limit. The sequence therefore never leaves the window it is validated
//! against, even when the span is not an exact multiple of the step.

use crate::error::{DeviceError, DeviceResult};

/// Generate the ordered position sequence for a (lower, upper, step) triple.
///
/// The result is strictly increasing, starts at `lower` and ends at the
/// largest value ≤ `upper`; its length is `(upper - lower) / step + 1`.
///
/// Fails with `InvalidConfiguration` when `step <= 0` or `lower >= upper`.
pub fn focus_positions(lower: i64, upper: i64, step: i64) -> DeviceResult<Vec<i64>> {
    if step <= 0 {
        return Err(DeviceError::InvalidConfiguration(format!(
            "step size must be positive, got {step}"
        )));
    }
    if lower >= upper {
        return Err(DeviceError::InvalidConfiguration(format!(
            "lower limit {lower} must be below upper limit {upper}"
        )));
    }

    let count = ((upper - lower) / step + 1) as usize;
    let mut positions = Vec::with_capacity(count);
    let mut pos = lower;
    while pos <= upper {
        positions.push(pos);
        pos += step;
    }
    Ok(positions)
}

/// Generate a position sequence with both ends offset by a reference
/// position.
///
/// Used when the caller supplies an explicit override triple relative to the
/// focuser's reference position (FOC_DEF): the absolute window is
/// `[reference + lower, reference + upper]`.
pub fn focus_positions_about(
    reference: i64,
    lower: i64,
    upper: i64,
    step: i64,
) -> DeviceResult<Vec<i64>> {
    focus_positions(reference + lower, reference + upper, step)
}

//! Scan-window validation against focuser hardware limits.
//!
//! A derived range is expressed relative to the focuser's reference position
//! (FOC_DEF); the hardware stroke limits are absolute. A window is usable only
//! if it fits inside the stroke when anchored at either of its ends — the
//! two-sided form guards against asymmetric effective limits where one end of
//! the stroke is tighter than the configuration assumes.

use tracing::error;

use crate::entities::{Filter, Focuser};
use crate::error::{DeviceError, DeviceResult};

/// Check that a relative range anchored at `foc_def` fits inside the
/// absolute stroke `[abs_lower, abs_upper]`.
///
/// The window `[foc_def + range_min, foc_def + range_max]` must satisfy both
/// `abs_lower <= lo <= abs_upper - width` and
/// `abs_lower + width <= hi <= abs_upper`. Widening the stroke never turns a
/// valid window invalid.
pub fn fits_stroke(
    range_min: i64,
    range_max: i64,
    abs_lower: i64,
    abs_upper: i64,
    foc_def: i64,
) -> bool {
    let lo = foc_def + range_min;
    let hi = foc_def + range_max;
    let width = hi - lo;

    abs_lower <= lo && lo <= abs_upper - width && abs_lower + width <= hi && hi <= abs_upper
}

/// Validate one filter's derived window against the focuser stroke.
///
/// `subject` identifies the offending wheel/filter pair in diagnostics.
pub fn check_filter_window(
    wheel: &str,
    filter: &Filter,
    focuser: &Focuser,
) -> DeviceResult<()> {
    let range_min = *filter.foc_foff.first().unwrap_or(&0);
    let range_max = *filter.foc_foff.last().unwrap_or(&0);

    if fits_stroke(
        range_min,
        range_max,
        focuser.abs_lower_limit,
        focuser.abs_upper_limit,
        focuser.foc_def,
    ) {
        return Ok(());
    }

    error!(
        "{}/{}: window [{}, {}] outside {} stroke [{}, {}], step size {}, rel. limits [{}, {}]",
        wheel,
        filter.name,
        focuser.foc_def + range_min,
        focuser.foc_def + range_max,
        focuser.name,
        focuser.abs_lower_limit,
        focuser.abs_upper_limit,
        filter.step_size,
        filter.relative_lower_limit,
        filter.relative_upper_limit,
    );
    Err(DeviceError::OutOfRange {
        subject: format!("{}/{}", wheel, filter.name),
        focuser: focuser.name.clone(),
        range_min: focuser.foc_def + range_min,
        range_max: focuser.foc_def + range_max,
        abs_lower: focuser.abs_lower_limit,
        abs_upper: focuser.abs_upper_limit,
    })
}

/// Reject a filter whose derived sequence is too short for a usable scan.
///
/// A sequence of `minimum` positions or fewer fails; the scan needs more
/// samples than that to bracket a focus extremum.
pub fn check_position_count(wheel: &str, filter: &Filter, minimum: usize) -> DeviceResult<()> {
    if filter.foc_foff.len() > minimum {
        return Ok(());
    }
    error!(
        "{}/{}: {} focuser positions <= {} (minimum focuser positions)",
        wheel,
        filter.name,
        filter.foc_foff.len(),
        minimum,
    );
    Err(DeviceError::InsufficientPositions {
        subject: format!("{}/{}", wheel, filter.name),
        positions: filter.foc_foff.len(),
        minimum,
    })
}

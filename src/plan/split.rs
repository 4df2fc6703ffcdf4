//! Aspiration Splitter
//!
//! Divides an oversized transfer into pipette-capacity-bounded sub-transfers.
//! Balanced equal shares are preferred over one large aspiration plus a tiny,
//! inaccurate trailing one.

use crate::error::{AliquotError, Result};

/// Split `total_ul` into the smallest number of equal shares that each fit
/// within `max_ul`.
///
/// Pure and deterministic in `(total_ul, max_ul)`: the result always sums to
/// `total_ul`, every share is at most `max_ul`, and the share count is the
/// minimal feasible one. A total that already fits returns a single share.
pub fn split_volume(total_ul: f64, max_ul: f64) -> Result<Vec<f64>> {
    if !total_ul.is_finite() || total_ul <= 0.0 || !max_ul.is_finite() || max_ul <= 0.0 {
        return Err(AliquotError::SplitInfeasible { total_ul, max_ul });
    }
    if total_ul <= max_ul {
        return Ok(vec![total_ul]);
    }
    let count = (total_ul / max_ul).ceil() as usize;
    let share = total_ul / count as f64;
    Ok(vec![share; count])
}

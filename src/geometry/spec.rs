//! Per-shape liquid level model
//!
//! `height(volume)` estimates how high the liquid surface sits above the
//! container bottom and subtracts a submersion offset so the tip ends up
//! just below the meniscus. Conical containers switch to a tighter offset
//! below the cone transition, where the narrowing walls keep the tip wet
//! at a shallower submersion.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::snap_depth;
use crate::error::{AliquotError, Result};

/// Maximum polynomial degree accepted by the level model.
pub const MAX_POLY_DEGREE: usize = 5;

/// Safety offset override below a geometry transition point,
/// e.g. where a conical tube's cone begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeOffset {
    /// Volume at which the container cross-section changes (ul).
    pub transition_ul: f64,
    /// Submersion offset applied below the transition (mm).
    pub below_mm: f64,
}

/// Calibrated geometry for one container shape.
///
/// Immutable calibration data: defined once in a [`ShapeCatalog`] and shared
/// by every container of that shape.
///
/// [`ShapeCatalog`]: super::ShapeCatalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Shape identifier, unique within a catalog.
    pub shape: String,
    /// Human-readable name.
    pub display_name: String,
    /// Nominal capacity (ul).
    pub capacity_ul: f64,
    /// Level-fit coefficients in ascending order: `a0 + a1*v + a2*v^2 + ...`
    pub coefficients: Vec<f64>,
    /// Minimum tip height above the container bottom (mm).
    ///
    /// When the model dips below this value the tip simply goes to the
    /// bottom; ~1 mm keeps it off the plastic.
    pub floor_mm: f64,
    /// Submersion offset below the estimated meniscus (mm).
    pub offset_mm: f64,
    /// Offset override below a geometry transition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<RegimeOffset>,
}

impl ContainerSpec {
    /// Validate the calibration data
    pub fn validate(&self) -> Result<()> {
        if self.shape.is_empty() {
            return Err(AliquotError::InvalidParameter {
                param: "shape".to_string(),
                value: "\"\"".to_string(),
                expected: "non-empty shape id".to_string(),
            });
        }
        if !self.capacity_ul.is_finite() || self.capacity_ul <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "capacity_ul".to_string(),
                value: self.capacity_ul.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if self.coefficients.is_empty() || self.coefficients.len() > MAX_POLY_DEGREE + 1 {
            return Err(AliquotError::InvalidParameter {
                param: "coefficients".to_string(),
                value: format!("{} terms", self.coefficients.len()),
                expected: format!("1 to {} terms", MAX_POLY_DEGREE + 1),
            });
        }
        if !self.floor_mm.is_finite() || self.floor_mm < 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "floor_mm".to_string(),
                value: self.floor_mm.to_string(),
                expected: ">= 0".to_string(),
            });
        }
        if !self.offset_mm.is_finite() || self.offset_mm < 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "offset_mm".to_string(),
                value: self.offset_mm.to_string(),
                expected: ">= 0".to_string(),
            });
        }
        if let Some(regime) = &self.regime {
            if regime.transition_ul <= 0.0 || regime.transition_ul >= self.capacity_ul {
                return Err(AliquotError::InvalidParameter {
                    param: "regime.transition_ul".to_string(),
                    value: regime.transition_ul.to_string(),
                    expected: format!("within (0, {})", self.capacity_ul),
                });
            }
            if !regime.below_mm.is_finite() || regime.below_mm < 0.0 {
                return Err(AliquotError::InvalidParameter {
                    param: "regime.below_mm".to_string(),
                    value: regime.below_mm.to_string(),
                    expected: ">= 0".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Effective submersion offset at the given volume.
    fn offset_at(&self, volume_ul: f64) -> f64 {
        match &self.regime {
            Some(regime) if volume_ul < regime.transition_ul => regime.below_mm,
            _ => self.offset_mm,
        }
    }

    /// Evaluate the level fit (Horner's rule).
    fn surface_mm(&self, volume_ul: f64) -> f64 {
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * volume_ul + c)
    }

    /// Safe tip height above the container bottom for the given remaining
    /// volume (mm).
    ///
    /// Defined over `[0, capacity_ul]`; volumes beyond the nominal capacity
    /// are extrapolated and flagged. Results below the shape floor are
    /// clamped to the exact floor value rather than surfaced as errors:
    /// a deep, safe aspirate beats aborting a multi-hour run. Everything
    /// else rounds to 0.1 mm.
    pub fn height(&self, volume_ul: f64) -> Result<f64> {
        if !volume_ul.is_finite() || volume_ul < 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "volume_ul".to_string(),
                value: volume_ul.to_string(),
                expected: ">= 0".to_string(),
            });
        }
        if volume_ul > self.capacity_ul {
            warn!(
                shape = %self.shape,
                volume_ul,
                capacity_ul = self.capacity_ul,
                "volume beyond nominal capacity, extrapolating level model"
            );
        }
        let raw = self.surface_mm(volume_ul) - self.offset_at(volume_ul);
        Ok(snap_depth(raw, self.floor_mm))
    }
}

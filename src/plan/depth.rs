//! Depth Planner
//!
//! Couples the geometry models to the volume ledger and owns the ordering
//! between "compute depth" and "mutate ledger". The convention is fixed for
//! a whole planning pass:
//!
//! - ASPIRATE depth comes from the volume **before** the debit (the tip
//!   chases the surface that exists when it enters the liquid);
//! - DISPENSE depth comes from the volume **after** the credit (the rising
//!   meniscus is what the tip must avoid crashing into), unless the planner
//!   is configured for the pre-credit surface instead.
//!
//! The two conventions are never mixed within one pass.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{MixParams, PlannedStep};
use crate::error::{AliquotError, Result};
use crate::geometry::snap_depth;
use crate::ledger::VolumeLedger;

/// Which destination volume a dispense depth is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseDepthMode {
    /// Depth from the destination volume after crediting the dispense
    /// (default, tracks the risen meniscus).
    #[default]
    AfterCredit,
    /// Depth from the destination volume before the credit.
    BeforeCredit,
}

/// Surface-height fractions for the three-stage mix: start deep to
/// homogenize without splashing, finish just below the meniscus.
pub const MIX_STAGE_FRACTIONS: [f64; 3] = [0.3, 0.6, 1.0];

/// Plans depths for individual actions against a live ledger.
///
/// Borrows the ledger exclusively for the duration of one planning pass,
/// which keeps all mutations in strict program order.
pub struct DepthPlanner<'a> {
    ledger: &'a mut VolumeLedger,
    mode: DispenseDepthMode,
}

impl<'a> DepthPlanner<'a> {
    pub fn new(ledger: &'a mut VolumeLedger, mode: DispenseDepthMode) -> Self {
        Self { ledger, mode }
    }

    /// The dispense-depth convention for this pass
    pub fn mode(&self) -> DispenseDepthMode {
        self.mode
    }

    /// Read-only access to the underlying ledger
    pub fn ledger(&self) -> &VolumeLedger {
        self.ledger
    }

    /// Safe tip height at the container's current volume (mm)
    pub fn surface_depth(&self, container: &str) -> Result<f64> {
        self.ledger.state(container)?.surface_height()
    }

    /// Plan an aspirate: depth from the pre-debit volume, then debit.
    pub fn plan_aspirate(
        &mut self,
        container: &str,
        volume_ul: f64,
        flow_rate: f64,
    ) -> Result<PlannedStep> {
        validate_flow_rate(flow_rate)?;
        let depth_mm = self.surface_depth(container)?;
        self.ledger.debit(container, volume_ul)?;
        debug!(container, volume_ul, depth_mm, "planned aspirate");
        Ok(PlannedStep::Aspirate {
            container: container.to_string(),
            depth_mm,
            volume_ul,
            flow_rate,
        })
    }

    /// Plan a dispense at the surface, per the configured depth convention.
    pub fn plan_dispense(
        &mut self,
        container: &str,
        volume_ul: f64,
        flow_rate: f64,
    ) -> Result<PlannedStep> {
        self.plan_dispense_at_fraction(container, volume_ul, flow_rate, 1.0)
    }

    /// Plan a dispense at a fraction of the surface height.
    ///
    /// Dilution transfers dispense mid-column so the incoming stream mixes
    /// in flight instead of layering on top.
    pub fn plan_dispense_at_fraction(
        &mut self,
        container: &str,
        volume_ul: f64,
        flow_rate: f64,
        fraction: f64,
    ) -> Result<PlannedStep> {
        validate_flow_rate(flow_rate)?;
        validate_fraction(fraction)?;
        let depth_mm = match self.mode {
            DispenseDepthMode::AfterCredit => {
                self.ledger.credit(container, volume_ul)?;
                self.fraction_depth(container, fraction)?
            }
            DispenseDepthMode::BeforeCredit => {
                let depth = self.fraction_depth(container, fraction)?;
                self.ledger.credit(container, volume_ul)?;
                depth
            }
        };
        debug!(container, volume_ul, depth_mm, "planned dispense");
        Ok(PlannedStep::Dispense {
            container: container.to_string(),
            depth_mm,
            volume_ul,
            flow_rate,
        })
    }

    /// Plan a three-stage mix at low/mid/high depths.
    ///
    /// Net ledger effect is zero; only the depths matter.
    pub fn plan_mix(&mut self, container: &str, mix: &MixParams) -> Result<Vec<PlannedStep>> {
        mix.validate()?;
        let mut steps = Vec::with_capacity(MIX_STAGE_FRACTIONS.len());
        for fraction in MIX_STAGE_FRACTIONS {
            let depth_mm = self.fraction_depth(container, fraction)?;
            steps.push(PlannedStep::Mix {
                container: container.to_string(),
                depth_mm,
                volume_ul: mix.volume_ul,
                repeats: mix.repeats,
                flow_rate: mix.flow_rate,
            });
        }
        debug!(container, stages = steps.len(), "planned three-stage mix");
        Ok(steps)
    }

    /// Plan a blow-out just below the current surface.
    pub fn plan_blow_out(&mut self, container: &str) -> Result<PlannedStep> {
        let depth_mm = self.surface_depth(container)?;
        Ok(PlannedStep::BlowOut {
            container: container.to_string(),
            depth_mm,
        })
    }

    /// Depth at a fraction of the current surface height, floor-clamped.
    fn fraction_depth(&self, container: &str, fraction: f64) -> Result<f64> {
        let state = self.ledger.state(container)?;
        let surface = state.surface_height()?;
        Ok(snap_depth(surface * fraction, state.spec().floor_mm))
    }
}

fn validate_flow_rate(flow_rate: f64) -> Result<()> {
    if !flow_rate.is_finite() || flow_rate <= 0.0 {
        return Err(AliquotError::InvalidParameter {
            param: "flow_rate".to_string(),
            value: flow_rate.to_string(),
            expected: "> 0".to_string(),
        });
    }
    Ok(())
}

fn validate_fraction(fraction: f64) -> Result<()> {
    if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
        return Err(AliquotError::InvalidParameter {
            param: "depth fraction".to_string(),
            value: fraction.to_string(),
            expected: "within (0, 1]".to_string(),
        });
    }
    Ok(())
}

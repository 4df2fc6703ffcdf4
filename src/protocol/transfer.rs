//! Single-transfer planning
//!
//! One source, one destination. Oversized volumes are split into balanced
//! capacity-bounded sub-transfers; optional pre-/post-mix stages bracket
//! the liquid movement.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AliquotError, Result};
use crate::plan::{split_volume, DepthPlanner, MixParams, PlannedStep};

/// A request to move volume from one container to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Source container id
    pub source: String,
    /// Destination container id
    pub destination: String,
    /// Total volume to move (ul)
    pub volume_ul: f64,
    /// Flow-rate multiplier for aspirates and dispenses
    pub flow_rate: f64,
    /// Mix the source before the first aspirate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_mix: Option<MixParams>,
    /// Mix the destination after the last dispense
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mix: Option<MixParams>,
}

impl TransferRequest {
    /// Create a plain transfer at the default flow rate
    pub fn new(source: &str, destination: &str, volume_ul: f64) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            volume_ul,
            flow_rate: 1.0,
            pre_mix: None,
            post_mix: None,
        }
    }

    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        if !self.volume_ul.is_finite() || self.volume_ul <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "volume_ul".to_string(),
                value: self.volume_ul.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if !self.flow_rate.is_finite() || self.flow_rate <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "flow_rate".to_string(),
                value: self.flow_rate.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if let Some(mix) = &self.pre_mix {
            mix.validate()?;
        }
        if let Some(mix) = &self.post_mix {
            mix.validate()?;
        }
        Ok(())
    }
}

/// Plan a single transfer with a fresh tip.
pub(crate) fn plan_transfer(
    depth: &mut DepthPlanner<'_>,
    capacity_ul: f64,
    req: &TransferRequest,
) -> Result<Vec<PlannedStep>> {
    req.validate()?;
    for mix in [&req.pre_mix, &req.post_mix].into_iter().flatten() {
        if mix.volume_ul > capacity_ul {
            return Err(AliquotError::InvalidParameter {
                param: "mix.volume_ul".to_string(),
                value: mix.volume_ul.to_string(),
                expected: format!("<= pipette capacity {capacity_ul}"),
            });
        }
    }
    let shares = split_volume(req.volume_ul, capacity_ul)?;

    let mut steps = vec![PlannedStep::PickUpTip];
    if let Some(mix) = &req.pre_mix {
        steps.extend(depth.plan_mix(&req.source, mix)?);
    }
    for &share in &shares {
        steps.push(depth.plan_aspirate(&req.source, share, req.flow_rate)?);
        steps.push(depth.plan_dispense(&req.destination, share, req.flow_rate)?);
    }
    if let Some(mix) = &req.post_mix {
        steps.extend(depth.plan_mix(&req.destination, mix)?);
    }
    steps.push(depth.plan_blow_out(&req.destination)?);
    steps.push(PlannedStep::DropTip);

    debug!(
        source = %req.source,
        destination = %req.destination,
        volume_ul = req.volume_ul,
        shares = shares.len(),
        "planned transfer"
    );
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ShapeCatalog;
    use crate::ledger::{DebitPolicy, VolumeLedger};
    use crate::plan::DispenseDepthMode;
    use approx::assert_relative_eq;

    fn ledger() -> VolumeLedger {
        let catalog = ShapeCatalog::builtin();
        let mut ledger = VolumeLedger::new(DebitPolicy::HardFail);
        ledger
            .register("src", catalog.get("conical_15ml").unwrap().clone(), 10000.0)
            .unwrap();
        ledger
            .register("dst", catalog.get("tube_1_5ml").unwrap().clone(), 0.0)
            .unwrap();
        ledger
    }

    fn count_action(steps: &[PlannedStep], name: &str) -> usize {
        steps.iter().filter(|s| s.action_name() == name).count()
    }

    #[test]
    fn test_small_transfer_is_one_pair() {
        let mut ledger = ledger();
        let mut depth = DepthPlanner::new(&mut ledger, DispenseDepthMode::AfterCredit);
        let req = TransferRequest::new("src", "dst", 150.0);
        let steps = plan_transfer(&mut depth, 200.0, &req).unwrap();

        assert_eq!(count_action(&steps, "aspirate"), 1);
        assert_eq!(count_action(&steps, "dispense"), 1);
        assert_eq!(count_action(&steps, "pick_up_tip"), 1);
        assert_eq!(count_action(&steps, "drop_tip"), 1);
        assert_eq!(count_action(&steps, "blow_out"), 1);
        assert_eq!(steps.first().unwrap().action_name(), "pick_up_tip");
        assert_eq!(steps.last().unwrap().action_name(), "drop_tip");

        assert_relative_eq!(ledger.remaining("src").unwrap(), 9850.0);
        assert_relative_eq!(ledger.remaining("dst").unwrap(), 150.0);
    }

    #[test]
    fn test_oversized_transfer_splits_evenly() {
        let mut ledger = ledger();
        let mut depth = DepthPlanner::new(&mut ledger, DispenseDepthMode::AfterCredit);
        let req = TransferRequest::new("src", "dst", 417.3);
        let steps = plan_transfer(&mut depth, 200.0, &req).unwrap();

        assert_eq!(count_action(&steps, "aspirate"), 3);
        assert_eq!(count_action(&steps, "dispense"), 3);
        for step in &steps {
            if let PlannedStep::Aspirate { volume_ul, .. } = step {
                assert_relative_eq!(*volume_ul, 139.1, epsilon = 1e-9);
            }
        }
        assert_relative_eq!(ledger.remaining("dst").unwrap(), 417.3, epsilon = 1e-9);
    }

    #[test]
    fn test_mixes_bracket_the_transfer() {
        let mut ledger = ledger();
        let mut depth = DepthPlanner::new(&mut ledger, DispenseDepthMode::AfterCredit);
        let mut req = TransferRequest::new("src", "dst", 100.0);
        req.pre_mix = Some(MixParams::new(3, 150.0));
        req.post_mix = Some(MixParams::new(2, 50.0));
        let steps = plan_transfer(&mut depth, 200.0, &req).unwrap();

        // Three stages per mix pass
        assert_eq!(count_action(&steps, "mix"), 6);
        // Pre-mix lands before the aspirate, post-mix after the dispense
        let first_mix = steps.iter().position(|s| s.action_name() == "mix").unwrap();
        let aspirate = steps
            .iter()
            .position(|s| s.action_name() == "aspirate")
            .unwrap();
        assert!(first_mix < aspirate);
    }

    #[test]
    fn test_rejects_bad_request() {
        assert!(TransferRequest::new("a", "b", 0.0).validate().is_err());
        assert!(TransferRequest::new("a", "b", f64::INFINITY)
            .validate()
            .is_err());
        let mut req = TransferRequest::new("a", "b", 10.0);
        req.flow_rate = 0.0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_depleted_source_aborts() {
        let catalog = ShapeCatalog::builtin();
        let mut ledger = VolumeLedger::new(DebitPolicy::HardFail);
        ledger
            .register("src", catalog.get("tube_1_5ml").unwrap().clone(), 50.0)
            .unwrap();
        ledger
            .register("dst", catalog.get("tube_1_5ml").unwrap().clone(), 0.0)
            .unwrap();
        let mut depth = DepthPlanner::new(&mut ledger, DispenseDepthMode::AfterCredit);
        let req = TransferRequest::new("src", "dst", 100.0);
        let err = plan_transfer(&mut depth, 200.0, &req).unwrap_err();
        assert_eq!(err.error_code(), "INSUFFICIENT_VOLUME");
    }
}

//! Multi-Destination Distributor
//!
//! Spreads one source's volume across many destinations: aspirate enough
//! for a batch plus a small bolus, dispense down the line, then give the
//! bolus back (or discard it). The bolus stabilizes the first dispenses of
//! a batch; touch-tip between dispenses sheds carry-over droplets.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AliquotError, Result};
use crate::plan::{DepthPlanner, PlannedStep};

/// Slack when packing destination volumes against the pipette capacity (ul).
const BATCH_EPS_UL: f64 = 1e-9;

/// One destination and the volume it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    /// Destination container id
    pub container: String,
    /// Volume to dispense (ul)
    pub volume_ul: f64,
}

/// What happens to the bolus once a batch is dispensed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BolusDisposal {
    /// Dispense it back into the source (default); the ledger gets it back.
    #[default]
    ReturnToSource,
    /// Blow it out over the source as waste; the tracked volume stays down.
    Discard,
}

/// A request to distribute from one source to an ordered set of destinations.
///
/// Per-destination volume tables are the primitive: a standards ladder plus
/// a water control is just a non-uniform table. [`DistributeRequest::uniform`]
/// covers the common equal-aliquot case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributeRequest {
    /// Source container id
    pub source: String,
    /// Ordered destinations with per-destination volumes
    pub destinations: Vec<Destination>,
    /// Extra volume aspirated per batch to stabilize early dispenses (ul)
    pub bolus_ul: f64,
    /// Where the bolus ends up after each batch
    pub bolus_disposal: BolusDisposal,
    /// Touch the tip to the destination wall after each dispense
    pub touch_tip: bool,
    /// Flow-rate multiplier for aspirates and dispenses
    pub flow_rate: f64,
    /// Wait after each dispense so droplets coalesce (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_s: Option<f64>,
}

impl DistributeRequest {
    /// Create a request with no bolus and default options
    pub fn new(source: &str, destinations: Vec<Destination>) -> Self {
        Self {
            source: source.to_string(),
            destinations,
            bolus_ul: 0.0,
            bolus_disposal: BolusDisposal::default(),
            touch_tip: false,
            flow_rate: 1.0,
            settle_delay_s: None,
        }
    }

    /// Create a request that sends the same volume to every destination
    pub fn uniform(source: &str, containers: &[&str], volume_ul: f64) -> Self {
        Self::new(
            source,
            containers
                .iter()
                .map(|c| Destination {
                    container: c.to_string(),
                    volume_ul,
                })
                .collect(),
        )
    }

    /// Validate the request
    pub fn validate(&self) -> Result<()> {
        if self.destinations.is_empty() {
            return Err(AliquotError::InvalidParameter {
                param: "destinations".to_string(),
                value: "[]".to_string(),
                expected: "at least one destination".to_string(),
            });
        }
        for dest in &self.destinations {
            if !dest.volume_ul.is_finite() || dest.volume_ul <= 0.0 {
                return Err(AliquotError::InvalidParameter {
                    param: format!("destination {} volume_ul", dest.container),
                    value: dest.volume_ul.to_string(),
                    expected: "> 0".to_string(),
                });
            }
        }
        if !self.bolus_ul.is_finite() || self.bolus_ul < 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "bolus_ul".to_string(),
                value: self.bolus_ul.to_string(),
                expected: ">= 0".to_string(),
            });
        }
        if !self.flow_rate.is_finite() || self.flow_rate <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "flow_rate".to_string(),
                value: self.flow_rate.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if let Some(delay) = self.settle_delay_s {
            if !delay.is_finite() || delay < 0.0 {
                return Err(AliquotError::InvalidParameter {
                    param: "settle_delay_s".to_string(),
                    value: delay.to_string(),
                    expected: ">= 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Plan a distribution with a single tip across all batches.
pub(crate) fn plan_distribute(
    depth: &mut DepthPlanner<'_>,
    capacity_ul: f64,
    req: &DistributeRequest,
) -> Result<Vec<PlannedStep>> {
    req.validate()?;
    for dest in &req.destinations {
        if dest.volume_ul + req.bolus_ul > capacity_ul + BATCH_EPS_UL {
            return Err(AliquotError::SplitInfeasible {
                total_ul: dest.volume_ul + req.bolus_ul,
                max_ul: capacity_ul,
            });
        }
    }

    let batches = pack_batches(&req.destinations, req.bolus_ul, capacity_ul);
    let mut steps = vec![PlannedStep::PickUpTip];

    for batch in &batches {
        let batch_sum: f64 = batch.iter().map(|d| d.volume_ul).sum();
        steps.push(depth.plan_aspirate(&req.source, batch_sum + req.bolus_ul, req.flow_rate)?);

        for dest in batch {
            steps.push(depth.plan_dispense(&dest.container, dest.volume_ul, req.flow_rate)?);
            if req.touch_tip {
                steps.push(PlannedStep::TouchTip {
                    container: dest.container.clone(),
                });
            }
            if let Some(seconds) = req.settle_delay_s {
                steps.push(PlannedStep::Delay { seconds });
            }
        }

        if req.bolus_ul > 0.0 {
            match req.bolus_disposal {
                BolusDisposal::ReturnToSource => {
                    steps.push(depth.plan_dispense(&req.source, req.bolus_ul, req.flow_rate)?);
                }
                BolusDisposal::Discard => {
                    steps.push(depth.plan_blow_out(&req.source)?);
                }
            }
        }
    }

    steps.push(PlannedStep::DropTip);
    debug!(
        source = %req.source,
        destinations = req.destinations.len(),
        batches = batches.len(),
        bolus_ul = req.bolus_ul,
        "planned distribution"
    );
    Ok(steps)
}

/// Greedily pack destinations into batches bounded by the pipette capacity.
fn pack_batches<'d>(
    destinations: &'d [Destination],
    bolus_ul: f64,
    capacity_ul: f64,
) -> Vec<Vec<&'d Destination>> {
    let mut batches = Vec::new();
    let mut current: Vec<&Destination> = Vec::new();
    let mut current_sum = 0.0;

    for dest in destinations {
        if !current.is_empty()
            && current_sum + dest.volume_ul + bolus_ul > capacity_ul + BATCH_EPS_UL
        {
            batches.push(std::mem::take(&mut current));
            current_sum = 0.0;
        }
        current_sum += dest.volume_ul;
        current.push(dest);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

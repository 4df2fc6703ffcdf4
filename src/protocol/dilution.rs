//! Dilution Series Scheduler
//!
//! Drives a chain of tubes through repeated mix/transfer cycles to realize
//! a serial dilution. Every tube after the first is pre-filled with diluent;
//! each cycle homogenizes the current tube, carries a fixed volume forward
//! at a reduced flow rate, and blows out below the new surface. One fresh
//! tip per transfer, and the last tube gets a final mix-only pass so it is
//! homogenized like the rest.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AliquotError, Result};
use crate::plan::{DepthPlanner, MixParams, PlannedStep};

/// Transfers dispense mid-column so the stream mixes in flight.
const TRANSFER_DISPENSE_FRACTION: f64 = 0.5;

/// Reduced flow keeps shear and bubbling down during carries.
const FLOW_RATE_RANGE: (f64, f64) = (0.4, 0.85);

/// Mixing progress of one tube in a dilution chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TubeMixState {
    /// Not yet touched
    Unmixed,
    /// Received a carry volume, not yet homogenized
    Receiving,
    /// Homogenized
    Mixed,
    /// Homogenized and a carry volume has been drawn off
    PartiallyDepleted,
}

/// An ordered dilution chain descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilutionChain {
    /// Tube container ids, in dilution order
    pub tubes: Vec<String>,
    /// Carry volume per step (ul)
    pub transfer_volume_ul: f64,
    /// Mixing parameters for every homogenization pass
    pub mix: MixParams,
    /// Flow-rate multiplier for the carry aspirate/dispense
    pub flow_rate: f64,
    /// Wait after each blow-out so droplets coalesce (seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_s: Option<f64>,
}

impl DilutionChain {
    /// Create a chain with the default reduced flow rate
    pub fn new(tubes: Vec<String>, transfer_volume_ul: f64, mix: MixParams) -> Self {
        Self {
            tubes,
            transfer_volume_ul,
            mix,
            flow_rate: 0.6,
            settle_delay_s: None,
        }
    }

    /// Validate the chain descriptor
    pub fn validate(&self) -> Result<()> {
        if !self.transfer_volume_ul.is_finite() || self.transfer_volume_ul <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "transfer_volume_ul".to_string(),
                value: self.transfer_volume_ul.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if !self.flow_rate.is_finite()
            || self.flow_rate < FLOW_RATE_RANGE.0
            || self.flow_rate > FLOW_RATE_RANGE.1
        {
            return Err(AliquotError::InvalidParameter {
                param: "flow_rate".to_string(),
                value: self.flow_rate.to_string(),
                expected: format!("within [{}, {}]", FLOW_RATE_RANGE.0, FLOW_RATE_RANGE.1),
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
        self.mix.validate()
    }
}

/// Result of scheduling a dilution chain.
#[derive(Debug, Clone)]
pub struct DilutionOutcome {
    /// The ordered step sequence
    pub steps: Vec<PlannedStep>,
    /// Final mix state per tube, in chain order
    pub tube_states: Vec<(String, TubeMixState)>,
    /// Number of carry cycles performed (`n - 1` for an n-tube chain)
    pub transfer_cycles: usize,
}

/// Schedule a dilution chain. A single-tube chain is a no-op.
pub(crate) fn plan_dilution(
    depth: &mut DepthPlanner<'_>,
    capacity_ul: f64,
    chain: &DilutionChain,
) -> Result<DilutionOutcome> {
    chain.validate()?;
    if chain.transfer_volume_ul > capacity_ul {
        return Err(AliquotError::InvalidParameter {
            param: "transfer_volume_ul".to_string(),
            value: chain.transfer_volume_ul.to_string(),
            expected: format!("<= pipette capacity {capacity_ul}"),
        });
    }
    if chain.mix.volume_ul > capacity_ul {
        return Err(AliquotError::InvalidParameter {
            param: "mix.volume_ul".to_string(),
            value: chain.mix.volume_ul.to_string(),
            expected: format!("<= pipette capacity {capacity_ul}"),
        });
    }

    let n = chain.tubes.len();
    let mut states = vec![TubeMixState::Unmixed; n];
    let mut steps = Vec::new();

    if n <= 1 {
        return Ok(DilutionOutcome {
            steps,
            tube_states: pair_states(&chain.tubes, &states),
            transfer_cycles: 0,
        });
    }

    for i in 0..n - 1 {
        let src = &chain.tubes[i];
        let dst = &chain.tubes[i + 1];

        steps.push(PlannedStep::PickUpTip);
        steps.extend(depth.plan_mix(src, &chain.mix)?);
        states[i] = TubeMixState::Mixed;

        steps.push(depth.plan_aspirate(src, chain.transfer_volume_ul, chain.flow_rate)?);
        states[i] = TubeMixState::PartiallyDepleted;
        states[i + 1] = TubeMixState::Receiving;

        steps.push(depth.plan_dispense_at_fraction(
            dst,
            chain.transfer_volume_ul,
            chain.flow_rate,
            TRANSFER_DISPENSE_FRACTION,
        )?);
        steps.push(depth.plan_blow_out(dst)?);
        if let Some(seconds) = chain.settle_delay_s {
            steps.push(PlannedStep::Delay { seconds });
        }
        steps.push(PlannedStep::DropTip);
    }

    // The last tube never donates; give it the same homogenization pass
    let last = &chain.tubes[n - 1];
    steps.push(PlannedStep::PickUpTip);
    steps.extend(depth.plan_mix(last, &chain.mix)?);
    states[n - 1] = TubeMixState::Mixed;
    steps.push(PlannedStep::DropTip);

    debug!(
        tubes = n,
        transfer_cycles = n - 1,
        transfer_volume_ul = chain.transfer_volume_ul,
        "scheduled dilution chain"
    );
    Ok(DilutionOutcome {
        steps,
        tube_states: pair_states(&chain.tubes, &states),
        transfer_cycles: n - 1,
    })
}

fn pair_states(tubes: &[String], states: &[TubeMixState]) -> Vec<(String, TubeMixState)> {
    tubes
        .iter()
        .cloned()
        .zip(states.iter().copied())
        .collect()
}

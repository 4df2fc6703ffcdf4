//! Planned pipetting actions
//!
//! A plan is an ordered `Vec<PlannedStep>` handed to an external executor,
//! which performs the steps strictly in sequence. Steps are ephemeral:
//! created and consumed within a single planning pass.

mod depth;
mod split;

pub use depth::{DepthPlanner, DispenseDepthMode, MIX_STAGE_FRACTIONS};
pub use split::split_volume;

use serde::{Deserialize, Serialize};

use crate::error::{AliquotError, Result};

/// One atomic pipetting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlannedStep {
    PickUpTip,
    DropTip,
    Aspirate {
        container: String,
        depth_mm: f64,
        volume_ul: f64,
        flow_rate: f64,
    },
    Dispense {
        container: String,
        depth_mm: f64,
        volume_ul: f64,
        flow_rate: f64,
    },
    Mix {
        container: String,
        depth_mm: f64,
        volume_ul: f64,
        repeats: u32,
        flow_rate: f64,
    },
    BlowOut {
        container: String,
        depth_mm: f64,
    },
    TouchTip {
        container: String,
    },
    Delay {
        seconds: f64,
    },
}

impl PlannedStep {
    /// Short action name, used in logs and plan dumps
    pub fn action_name(&self) -> &'static str {
        match self {
            PlannedStep::PickUpTip => "pick_up_tip",
            PlannedStep::DropTip => "drop_tip",
            PlannedStep::Aspirate { .. } => "aspirate",
            PlannedStep::Dispense { .. } => "dispense",
            PlannedStep::Mix { .. } => "mix",
            PlannedStep::BlowOut { .. } => "blow_out",
            PlannedStep::TouchTip { .. } => "touch_tip",
            PlannedStep::Delay { .. } => "delay",
        }
    }

    /// Container this step acts on, if any
    pub fn container(&self) -> Option<&str> {
        match self {
            PlannedStep::Aspirate { container, .. }
            | PlannedStep::Dispense { container, .. }
            | PlannedStep::Mix { container, .. }
            | PlannedStep::BlowOut { container, .. }
            | PlannedStep::TouchTip { container } => Some(container),
            _ => None,
        }
    }
}

/// Mixing parameters shared by transfers and dilution chains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixParams {
    /// Aspirate/dispense cycles per mix stage
    pub repeats: u32,
    /// Volume moved per cycle (ul)
    pub volume_ul: f64,
    /// Flow-rate multiplier for the mix strokes
    pub flow_rate: f64,
}

impl Default for MixParams {
    fn default() -> Self {
        Self {
            repeats: 3,
            volume_ul: 100.0,
            flow_rate: 1.0,
        }
    }
}

impl MixParams {
    /// Create mix parameters with the default flow rate
    pub fn new(repeats: u32, volume_ul: f64) -> Self {
        Self {
            repeats,
            volume_ul,
            flow_rate: 1.0,
        }
    }

    /// Validate mix parameters
    pub fn validate(&self) -> Result<()> {
        if self.repeats == 0 {
            return Err(AliquotError::InvalidParameter {
                param: "mix.repeats".to_string(),
                value: "0".to_string(),
                expected: ">= 1".to_string(),
            });
        }
        if !self.volume_ul.is_finite() || self.volume_ul <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "mix.volume_ul".to_string(),
                value: self.volume_ul.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if !self.flow_rate.is_finite() || self.flow_rate <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "mix.flow_rate".to_string(),
                value: self.flow_rate.to_string(),
                expected: "> 0".to_string(),
            });
        }
        Ok(())
    }
}

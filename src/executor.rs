//! Pipetting executor seam
//!
//! The planner emits [`PlannedStep`]s; this module defines the contract an
//! external executor must satisfy and a dispatcher that walks a plan in
//! order. In production the executor is the vendor robot-control SDK;
//! [`RecordingExecutor`] stands in for it in tests and dry runs.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::plan::PlannedStep;

/// Contract for whatever performs the planned steps.
///
/// Steps are strictly sequential: `delay` must block before the next call,
/// matching the physical single-gantry reality.
pub trait PipettingExecutor {
    fn pick_up_tip(&mut self) -> Result<()>;
    fn drop_tip(&mut self) -> Result<()>;
    fn move_to(&mut self, container: &str, depth_mm: f64) -> Result<()>;
    fn aspirate(&mut self, volume_ul: f64, flow_rate: f64) -> Result<()>;
    fn dispense(&mut self, volume_ul: f64, flow_rate: f64) -> Result<()>;
    fn mix(&mut self, repeats: u32, volume_ul: f64, flow_rate: f64) -> Result<()>;
    fn blow_out(&mut self) -> Result<()>;
    fn touch_tip(&mut self) -> Result<()>;
    fn delay(&mut self, seconds: f64) -> Result<()>;
}

/// Drive an executor through a plan, in order, aborting on the first error.
pub fn execute_plan(steps: &[PlannedStep], executor: &mut dyn PipettingExecutor) -> Result<()> {
    for step in steps {
        debug!(action = step.action_name(), "executing step");
        match step {
            PlannedStep::PickUpTip => executor.pick_up_tip()?,
            PlannedStep::DropTip => executor.drop_tip()?,
            PlannedStep::Aspirate {
                container,
                depth_mm,
                volume_ul,
                flow_rate,
            } => {
                executor.move_to(container, *depth_mm)?;
                executor.aspirate(*volume_ul, *flow_rate)?;
            }
            PlannedStep::Dispense {
                container,
                depth_mm,
                volume_ul,
                flow_rate,
            } => {
                executor.move_to(container, *depth_mm)?;
                executor.dispense(*volume_ul, *flow_rate)?;
            }
            PlannedStep::Mix {
                container,
                depth_mm,
                volume_ul,
                repeats,
                flow_rate,
            } => {
                executor.move_to(container, *depth_mm)?;
                executor.mix(*repeats, *volume_ul, *flow_rate)?;
            }
            PlannedStep::BlowOut {
                container,
                depth_mm,
            } => {
                executor.move_to(container, *depth_mm)?;
                executor.blow_out()?;
            }
            // The tip is already in this container after its dispense
            PlannedStep::TouchTip { container: _ } => executor.touch_tip()?,
            PlannedStep::Delay { seconds } => executor.delay(*seconds)?,
        }
    }
    Ok(())
}

/// One call recorded by [`RecordingExecutor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ExecutorCall {
    PickUpTip,
    DropTip,
    MoveTo { container: String, depth_mm: f64 },
    Aspirate { volume_ul: f64, flow_rate: f64 },
    Dispense { volume_ul: f64, flow_rate: f64 },
    Mix { repeats: u32, volume_ul: f64, flow_rate: f64 },
    BlowOut,
    TouchTip,
    Delay { seconds: f64 },
}

/// Executor that records every call instead of moving hardware.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Vec<ExecutorCall>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls recorded so far, in execution order
    pub fn calls(&self) -> &[ExecutorCall] {
        &self.calls
    }

    /// Consume the recorder and take the call log
    pub fn into_calls(self) -> Vec<ExecutorCall> {
        self.calls
    }
}

impl PipettingExecutor for RecordingExecutor {
    fn pick_up_tip(&mut self) -> Result<()> {
        self.calls.push(ExecutorCall::PickUpTip);
        Ok(())
    }

    fn drop_tip(&mut self) -> Result<()> {
        self.calls.push(ExecutorCall::DropTip);
        Ok(())
    }

    fn move_to(&mut self, container: &str, depth_mm: f64) -> Result<()> {
        self.calls.push(ExecutorCall::MoveTo {
            container: container.to_string(),
            depth_mm,
        });
        Ok(())
    }

    fn aspirate(&mut self, volume_ul: f64, flow_rate: f64) -> Result<()> {
        self.calls.push(ExecutorCall::Aspirate {
            volume_ul,
            flow_rate,
        });
        Ok(())
    }

    fn dispense(&mut self, volume_ul: f64, flow_rate: f64) -> Result<()> {
        self.calls.push(ExecutorCall::Dispense {
            volume_ul,
            flow_rate,
        });
        Ok(())
    }

    fn mix(&mut self, repeats: u32, volume_ul: f64, flow_rate: f64) -> Result<()> {
        self.calls.push(ExecutorCall::Mix {
            repeats,
            volume_ul,
            flow_rate,
        });
        Ok(())
    }

    fn blow_out(&mut self) -> Result<()> {
        self.calls.push(ExecutorCall::BlowOut);
        Ok(())
    }

    fn touch_tip(&mut self) -> Result<()> {
        self.calls.push(ExecutorCall::TouchTip);
        Ok(())
    }

    fn delay(&mut self, seconds: f64) -> Result<()> {
        self.calls.push(ExecutorCall::Delay { seconds });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_aspirate_dispatches_move_then_draw() {
        let steps = vec![
            PlannedStep::PickUpTip,
            PlannedStep::Aspirate {
                container: "mm".to_string(),
                depth_mm: 10.6,
                volume_ul: 120.0,
                flow_rate: 1.0,
            },
            PlannedStep::DropTip,
        ];
        let mut exec = RecordingExecutor::new();
        execute_plan(&steps, &mut exec).unwrap();

        assert_eq!(
            exec.calls(),
            &[
                ExecutorCall::PickUpTip,
                ExecutorCall::MoveTo {
                    container: "mm".to_string(),
                    depth_mm: 10.6,
                },
                ExecutorCall::Aspirate {
                    volume_ul: 120.0,
                    flow_rate: 1.0,
                },
                ExecutorCall::DropTip,
            ]
        );
    }

    #[test]
    fn test_mix_and_delay_dispatch() {
        let steps = vec![
            PlannedStep::Mix {
                container: "t".to_string(),
                depth_mm: 3.2,
                volume_ul: 200.0,
                repeats: 3,
                flow_rate: 0.6,
            },
            PlannedStep::Delay { seconds: 2.5 },
        ];
        let mut exec = RecordingExecutor::new();
        execute_plan(&steps, &mut exec).unwrap();

        assert_eq!(exec.calls().len(), 3);
        assert_eq!(
            exec.calls()[1],
            ExecutorCall::Mix {
                repeats: 3,
                volume_ul: 200.0,
                flow_rate: 0.6,
            }
        );
        assert_eq!(exec.calls()[2], ExecutorCall::Delay { seconds: 2.5 });
    }
}

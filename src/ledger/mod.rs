//! Volume Ledger
//!
//! The only mutable state in a planning pass. Containers are registered at
//! run start; every aspirate debits its source and every dispense credits
//! its destination, so the ledger always reflects the nominal volume each
//! container holds. No I/O side effects.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AliquotError, Result};
use crate::geometry::ContainerSpec;

/// Tolerance for float accumulation across many debits/credits (ul).
const VOLUME_EPS_UL: f64 = 1e-9;

/// Behavior when a debit exceeds the tracked volume.
///
/// Real containers commonly hold overage beyond the nominal value the
/// ledger tracks, so the hard failure can be relaxed to a clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebitPolicy {
    /// Fail the run on any debit that would go negative (default).
    #[default]
    HardFail,
    /// Clamp the tracked volume to zero and keep going, with a warning.
    ClampToZero,
}

/// One registered container: identity, owning spec and current volume.
#[derive(Debug, Clone)]
pub struct ContainerState {
    id: String,
    spec: Arc<ContainerSpec>,
    volume_ul: f64,
}

impl ContainerState {
    /// Container identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Calibrated geometry for this container's shape
    pub fn spec(&self) -> &Arc<ContainerSpec> {
        &self.spec
    }

    /// Current tracked volume (ul)
    pub fn volume_ul(&self) -> f64 {
        self.volume_ul
    }

    /// Safe tip height for the current volume (mm)
    pub fn surface_height(&self) -> Result<f64> {
        self.spec.height(self.volume_ul)
    }
}

/// Tracks current volume per container across a run.
#[derive(Debug, Clone, Default)]
pub struct VolumeLedger {
    containers: HashMap<String, ContainerState>,
    policy: DebitPolicy,
}

impl VolumeLedger {
    /// Create a ledger with the given debit policy
    pub fn new(policy: DebitPolicy) -> Self {
        Self {
            containers: HashMap::new(),
            policy,
        }
    }

    /// The active debit policy
    pub fn policy(&self) -> DebitPolicy {
        self.policy
    }

    /// Register a container at run start.
    ///
    /// The initial volume must lie within `[0, capacity]`; registering the
    /// same id twice is a configuration error.
    pub fn register(&mut self, id: &str, spec: Arc<ContainerSpec>, initial_ul: f64) -> Result<()> {
        if !initial_ul.is_finite() || initial_ul < 0.0 || initial_ul > spec.capacity_ul {
            return Err(AliquotError::InvalidParameter {
                param: "initial_ul".to_string(),
                value: initial_ul.to_string(),
                expected: format!("within [0, {}]", spec.capacity_ul),
            });
        }
        if self.containers.contains_key(id) {
            return Err(AliquotError::DuplicateContainer {
                container: id.to_string(),
            });
        }
        debug!(container = id, shape = %spec.shape, initial_ul, "registered container");
        self.containers.insert(
            id.to_string(),
            ContainerState {
                id: id.to_string(),
                spec,
                volume_ul: initial_ul,
            },
        );
        Ok(())
    }

    /// Look up a container's state
    pub fn state(&self, id: &str) -> Result<&ContainerState> {
        self.containers
            .get(id)
            .ok_or_else(|| AliquotError::UnknownContainer {
                container: id.to_string(),
            })
    }

    /// Current tracked volume of a container (ul)
    pub fn remaining(&self, id: &str) -> Result<f64> {
        Ok(self.state(id)?.volume_ul)
    }

    /// Remove volume from a container (an aspirate).
    ///
    /// A debit beyond the tracked volume fails or clamps to zero depending
    /// on the ledger's [`DebitPolicy`].
    pub fn debit(&mut self, id: &str, volume_ul: f64) -> Result<()> {
        validate_operation_volume("debit", volume_ul)?;
        let policy = self.policy;
        let state = self.state_mut(id)?;
        if volume_ul > state.volume_ul + VOLUME_EPS_UL {
            match policy {
                DebitPolicy::HardFail => {
                    return Err(AliquotError::InsufficientVolume {
                        container: id.to_string(),
                        requested_ul: volume_ul,
                        available_ul: state.volume_ul,
                    });
                }
                DebitPolicy::ClampToZero => {
                    warn!(
                        container = id,
                        requested_ul = volume_ul,
                        available_ul = state.volume_ul,
                        "debit exceeds tracked volume, clamping to zero"
                    );
                    state.volume_ul = 0.0;
                    return Ok(());
                }
            }
        }
        state.volume_ul = (state.volume_ul - volume_ul).max(0.0);
        Ok(())
    }

    /// Add volume to a container (a dispense).
    ///
    /// Credits past nominal capacity are tolerated with a warning; the
    /// overfill exists physically whether or not the model likes it.
    pub fn credit(&mut self, id: &str, volume_ul: f64) -> Result<()> {
        validate_operation_volume("credit", volume_ul)?;
        let state = self.state_mut(id)?;
        state.volume_ul += volume_ul;
        if state.volume_ul > state.spec.capacity_ul {
            warn!(
                container = id,
                volume_ul = state.volume_ul,
                capacity_ul = state.spec.capacity_ul,
                "tracked volume exceeds nominal capacity"
            );
        }
        Ok(())
    }

    /// Check whether a container id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    /// Number of registered containers
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// Check if no containers are registered
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    fn state_mut(&mut self, id: &str) -> Result<&mut ContainerState> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| AliquotError::UnknownContainer {
                container: id.to_string(),
            })
    }
}

fn validate_operation_volume(op: &str, volume_ul: f64) -> Result<()> {
    if !volume_ul.is_finite() || volume_ul < 0.0 {
        return Err(AliquotError::InvalidParameter {
            param: format!("{op} volume_ul"),
            value: volume_ul.to_string(),
            expected: ">= 0".to_string(),
        });
    }
    Ok(())
}

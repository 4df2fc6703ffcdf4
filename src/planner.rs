//! Planner facade
//!
//! Owns the shape catalog, the volume ledger and the run-wide configuration.
//! One planner instance corresponds to one run: containers are registered up
//! front and every planned operation mutates the same ledger in strict
//! program order. A single gantry/pipette pair is active at any instant, so
//! planning is single-threaded and needs no locking.

use serde::{Deserialize, Serialize};
use tracing::{debug_span, info};
use uuid::Uuid;

use crate::error::{AliquotError, Result};
use crate::geometry::ShapeCatalog;
use crate::ledger::{DebitPolicy, VolumeLedger};
use crate::plan::{DepthPlanner, DispenseDepthMode, PlannedStep};
use crate::protocol::{
    plan_dilution, plan_distribute, plan_transfer, DilutionChain, DilutionOutcome,
    DistributeRequest, TransferRequest,
};

/// Run-wide planner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Working capacity of the mounted pipette (ul)
    pub pipette_capacity_ul: f64,
    /// Dispense depth convention, held fixed for the whole run
    pub dispense_depth: DispenseDepthMode,
    /// Ledger behavior when a debit exceeds the tracked volume
    pub debit_policy: DebitPolicy,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            pipette_capacity_ul: 200.0,
            dispense_depth: DispenseDepthMode::default(),
            debit_policy: DebitPolicy::default(),
        }
    }
}

impl PlannerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.pipette_capacity_ul.is_finite() || self.pipette_capacity_ul <= 0.0 {
            return Err(AliquotError::InvalidParameter {
                param: "pipette_capacity_ul".to_string(),
                value: self.pipette_capacity_ul.to_string(),
                expected: "> 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Plans pipetting operations for one run.
pub struct Planner {
    catalog: ShapeCatalog,
    ledger: VolumeLedger,
    config: PlannerConfig,
    run_id: Uuid,
}

impl Planner {
    /// Create a planner for one run
    pub fn new(catalog: ShapeCatalog, config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        let run_id = Uuid::new_v4();
        info!(
            %run_id,
            pipette_capacity_ul = config.pipette_capacity_ul,
            shapes = catalog.len(),
            "planner initialized"
        );
        Ok(Self {
            ledger: VolumeLedger::new(config.debit_policy),
            catalog,
            config,
            run_id,
        })
    }

    /// Create a planner over the built-in shape catalog with default config
    pub fn with_builtin_catalog() -> Result<Self> {
        Self::new(ShapeCatalog::builtin(), PlannerConfig::default())
    }

    /// This run's identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The injected shape catalog
    pub fn catalog(&self) -> &ShapeCatalog {
        &self.catalog
    }

    /// The run configuration
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Register a container of a cataloged shape with its starting volume.
    ///
    /// Unknown shape ids fail here, before any planning happens.
    pub fn register_container(&mut self, id: &str, shape: &str, initial_ul: f64) -> Result<()> {
        let spec = self.catalog.get(shape)?.clone();
        self.ledger.register(id, spec, initial_ul)
    }

    /// Current tracked volume of a container (ul)
    pub fn remaining(&self, id: &str) -> Result<f64> {
        self.ledger.remaining(id)
    }

    /// Read-only access to the ledger
    pub fn ledger(&self) -> &VolumeLedger {
        &self.ledger
    }

    /// Plan a single source-to-destination transfer
    pub fn transfer(&mut self, req: &TransferRequest) -> Result<Vec<PlannedStep>> {
        let span = debug_span!(
            "transfer",
            run_id = %self.run_id,
            source = %req.source,
            destination = %req.destination,
        );
        let _guard = span.enter();
        let mut depth = DepthPlanner::new(&mut self.ledger, self.config.dispense_depth);
        plan_transfer(&mut depth, self.config.pipette_capacity_ul, req)
    }

    /// Plan a one-source-to-many-destinations distribution
    pub fn distribute(&mut self, req: &DistributeRequest) -> Result<Vec<PlannedStep>> {
        let span = debug_span!(
            "distribute",
            run_id = %self.run_id,
            source = %req.source,
            destinations = req.destinations.len(),
        );
        let _guard = span.enter();
        let mut depth = DepthPlanner::new(&mut self.ledger, self.config.dispense_depth);
        plan_distribute(&mut depth, self.config.pipette_capacity_ul, req)
    }

    /// Schedule a serial dilution chain
    pub fn run_dilution(&mut self, chain: &DilutionChain) -> Result<DilutionOutcome> {
        let span = debug_span!(
            "dilution",
            run_id = %self.run_id,
            tubes = chain.tubes.len(),
        );
        let _guard = span.enter();
        let mut depth = DepthPlanner::new(&mut self.ledger, self.config.dispense_depth);
        plan_dilution(&mut depth, self.config.pipette_capacity_ul, chain)
    }
}

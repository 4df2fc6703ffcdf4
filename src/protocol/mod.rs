//! Protocol-level planning operations
//!
//! The operations the bench scripts actually perform: single transfers,
//! serial dilution chains and one-source-to-many-destinations aliquoting.
//! Each consumes a [`DepthPlanner`](crate::plan::DepthPlanner) and emits an
//! ordered step sequence.

mod dilution;
mod distribute;
mod transfer;

pub use dilution::{DilutionChain, DilutionOutcome, TubeMixState};
pub use distribute::{BolusDisposal, Destination, DistributeRequest};
pub use transfer::TransferRequest;

pub(crate) use dilution::plan_dilution;
pub(crate) use distribute::plan_distribute;
pub(crate) use transfer::plan_transfer;

//! Bounded repair loop: policy, state machine and audit log.

pub mod controller;
pub mod log;
pub mod policy;

pub use controller::{
    RepairCollaborators, RepairController, RepairState, INNER_BUDGET_EXHAUSTED,
    OUTER_BUDGET_EXHAUSTED,
};
pub use log::{
    read_repair_log, write_repair_log, RepairAction, RepairDecision, RepairLog, RepairOutcome,
};
pub use policy::RepairPolicy;

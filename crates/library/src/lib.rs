//! The organizing pipeline: clustering, path generation, transactional
//! execution and reporting.
//!
//! Data flows one way: [`cluster::LocationClusterer`] groups extracted
//! records by month and geography, [`path::PathGenerator`] maps each
//! record to a destination, [`plan::OrganizePlan`] orders the work, and
//! [`organize::organize`] executes it under the transaction log.

pub mod cluster;
pub mod error;
pub mod organize;
pub mod path;
pub mod plan;
pub mod report;
mod template;

pub use crate::cluster::{LocationCluster, LocationClusterer, TimeBucket};
pub use crate::organize::{
    Action, Mode, OrganizeEvent, OrganizeOptions, Outcome, Replay, ReplayedOp, TRANSACTION_LOG_NAME, TransactionLog,
    organize, replay,
};
pub use crate::path::{Destination, PathGenerator};
pub use crate::plan::{OrganizePlan, PlanEntry};
pub use crate::report::{DUPLICATES_REPORT_NAME, DuplicateEvent, ExecutionReport, write_duplicates_report};
pub use crate::template::{DEFAULT_FILENAME_PATTERN, FilenamePattern};

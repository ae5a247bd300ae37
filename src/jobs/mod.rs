//! Background jobs.

mod sweeper;

pub use sweeper::{DEFAULT_SWEEP_INTERVAL, ExpirySweeper, SweeperHandle};

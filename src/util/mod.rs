//! Small shared helpers.

pub mod chanmap;
pub mod stats;
pub mod token;

pub use chanmap::{ChanId, ChanMap};
pub use stats::MovingAverage;

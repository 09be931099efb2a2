//! Services - matching, aggregation and the event loop
//!
//! - `matcher` - Per-event hit to particle matching
//! - `aggregator` - Run statistics and their lifecycle
//! - `stage` - `Processor` trait and the HCAL matching stage
//! - `driver` - Generic single-stream event loop

pub mod aggregator;
pub mod driver;
pub mod matcher;
pub mod stage;

// Re-export commonly used types
pub use aggregator::{Aggregator, RunState, RunStatistics, SharedStatistics};
pub use driver::{Driver, DriverOptions, DriverReport};
pub use matcher::{HitMatch, HitMatcher, MatchResult};
pub use stage::{HcalHitMatcher, Processor};

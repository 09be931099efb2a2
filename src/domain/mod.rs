//! Domain models - geometry and event records
//!
//! - `geometry` - `Vec3`, rays and the point-to-segment distance
//! - `types` - trajectory crossings, calorimeter hits and events

pub mod geometry;
pub mod types;

// Re-export commonly used types
pub use geometry::{point_segment_distance, Ray, Vec3};
pub use types::{CalorimeterHit, Collection, Event, Section, TrackId, TrajectoryCrossing};

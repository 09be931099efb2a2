//! Infrastructure - configuration, errors, histograms and particle data
//!
//! - `config` - Application configuration (TOML loading, processor options)
//! - `error` - Stage error taxonomy
//! - `histogram` - Fixed-binning histograms for run statistics
//! - `particles` - PDG rest-mass lookup

pub mod config;
pub mod error;
pub mod histogram;
pub mod particles;

// Re-export commonly used types
pub use config::{Config, MatcherConfig, Parameters};
pub use error::StageError;
pub use particles::{ParticleTable, PdgTable};

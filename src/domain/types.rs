//! Event records consumed by the matcher
//!
//! Records are read-only for the lifetime of one event. Crossings are
//! referred to by their index in the event's collection, never by pointer.

use crate::domain::geometry::Vec3;
use crate::infra::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Newtype wrapper for simulated particle references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TrackId(pub i64);

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HCAL section a hit (or candidate crossing) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Back,
    Side,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Back => "back",
            Section::Side => "side",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulated particle crossing a scoring plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryCrossing {
    pub track_id: TrackId,
    pub pdg_id: i32,
    /// Position [mm]
    pub position: Vec3,
    /// Momentum [GeV]
    pub momentum: Vec3,
    /// Energy deposited [GeV]
    #[serde(default)]
    pub edep: f64,
    /// Time [ns]
    #[serde(default)]
    pub time: f64,
    /// Path length [mm]
    #[serde(default)]
    pub path_length: f64,
    #[serde(default)]
    pub layer_id: i32,
}

/// A reconstructed calorimeter cell hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalorimeterHit {
    #[serde(default)]
    pub id: u32,
    pub layer: i32,
    /// Present for HCAL hits only
    #[serde(default)]
    pub section: Option<Section>,
    #[serde(default)]
    pub strip: i32,
    /// Signal amplitude in photo-electrons
    #[serde(default)]
    pub pe: f64,
    /// Reconstructed energy [MeV]
    #[serde(default)]
    pub energy: f64,
    /// Position [mm]
    pub position: Vec3,
    #[serde(default)]
    pub noise: bool,
}

/// One named collection in an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Crossings(Vec<TrajectoryCrossing>),
    Hits(Vec<CalorimeterHit>),
}

/// A simulated event: a set of named, ordered collections
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub number: u64,
    #[serde(default)]
    pub collections: HashMap<String, Collection>,
}

impl Event {
    pub fn new(number: u64) -> Self {
        Self { number, collections: HashMap::new() }
    }

    pub fn with_crossings(mut self, name: &str, crossings: Vec<TrajectoryCrossing>) -> Self {
        self.collections.insert(name.to_string(), Collection::Crossings(crossings));
        self
    }

    pub fn with_hits(mut self, name: &str, hits: Vec<CalorimeterHit>) -> Self {
        self.collections.insert(name.to_string(), Collection::Hits(hits));
        self
    }

    /// Fetch a crossing collection by name
    ///
    /// A collection of the wrong kind is reported the same as an absent one.
    pub fn crossings(&self, name: &str) -> Result<&[TrajectoryCrossing], StageError> {
        match self.collections.get(name) {
            Some(Collection::Crossings(c)) => Ok(c),
            _ => Err(self.missing(name)),
        }
    }

    /// Fetch a hit collection by name
    pub fn hits(&self, name: &str) -> Result<&[CalorimeterHit], StageError> {
        match self.collections.get(name) {
            Some(Collection::Hits(h)) => Ok(h),
            _ => Err(self.missing(name)),
        }
    }

    fn missing(&self, name: &str) -> StageError {
        StageError::MissingCollection { name: name.to_string(), event: self.number }
    }
}

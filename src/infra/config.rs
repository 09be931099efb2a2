//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! The `[processor]` table is kept as raw named parameters and interpreted by
//! the stage at configure time, so required options without defaults are
//! reported as configuration errors before the first event.

use crate::infra::error::StageError;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

pub const ECAL_HIT_COLLECTION_NAME: &str = "EcalHitCollectionName";
pub const HCAL_HIT_COLLECTION_NAME: &str = "HcalHitCollectionName";
pub const ECAL_SCORING_PLANE_HITS_NAME: &str = "EcalScoringPlaneHitsName";
pub const HCAL_SCORING_PLANE_HITS_NAME: &str = "HcalScoringPlaneHitsName";
pub const MAXIMUM_MATCH_DISTANCE: &str = "MaximumMatchDistance";
pub const MIN_DEPTH_INCLUDE_EVENT_MAX_PE: &str = "MinDepthIncludeEventMaxPE";
pub const BACK_ZERO_LAYER: &str = "BackZeroLayer";
pub const SIDE_ZERO_LAYER: &str = "SideZeroLayer";
pub const ECAL_FRONT_Z: &str = "EcalFrontZ";

/// Named processor options, read once at stage start
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: toml::Table,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for tests and programmatic setup
    pub fn with(mut self, name: &str, value: impl Into<toml::Value>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// String option with a default
    pub fn get_string(&self, name: &str, default: &str) -> Result<String, StageError> {
        match self.values.get(name) {
            None => Ok(default.to_string()),
            Some(toml::Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(wrong_type(name, "string", other)),
        }
    }

    /// Required float option; integers are accepted
    pub fn get_f64(&self, name: &str) -> Result<f64, StageError> {
        match self.values.get(name) {
            None => Err(StageError::Configuration(format!(
                "required option '{name}' is missing"
            ))),
            Some(value) => as_f64(name, value),
        }
    }

    /// Float option with a default
    pub fn get_f64_or(&self, name: &str, default: f64) -> Result<f64, StageError> {
        match self.values.get(name) {
            None => Ok(default),
            Some(value) => as_f64(name, value),
        }
    }
}

fn as_f64(name: &str, value: &toml::Value) -> Result<f64, StageError> {
    let v = match value {
        toml::Value::Float(f) => *f,
        toml::Value::Integer(i) => *i as f64,
        other => return Err(wrong_type(name, "number", other)),
    };
    if !v.is_finite() {
        return Err(StageError::Configuration(format!("option '{name}' must be finite")));
    }
    Ok(v)
}

fn wrong_type(name: &str, expected: &str, found: &toml::Value) -> StageError {
    StageError::Configuration(format!(
        "option '{name}' must be a {expected}, found {}",
        found.type_str()
    ))
}

/// Matcher options resolved from `Parameters`
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    pub ecal_hit_collection: String,
    pub hcal_hit_collection: String,
    pub ecal_scoring_plane: String,
    pub hcal_scoring_plane: String,
    /// Maximum ray-to-hit distance for a match [mm]
    pub max_match_distance: f64,
    /// Minimum layer index for a hit to count toward the excluded event max PE
    pub min_depth_event_max_pe: f64,
    /// z of the zeroth back HCAL layer [mm]
    pub back_zero_layer: f64,
    /// Transverse distance of the zeroth side HCAL layer [mm]
    pub side_zero_layer: f64,
    /// z of the ECAL front face [mm]
    pub ecal_front_z: f64,
}

impl MatcherConfig {
    pub fn from_parameters(params: &Parameters) -> Result<Self, StageError> {
        let max_match_distance = params.get_f64_or(MAXIMUM_MATCH_DISTANCE, 150.0)?;
        if max_match_distance <= 0.0 {
            return Err(StageError::Configuration(format!(
                "option '{MAXIMUM_MATCH_DISTANCE}' must be positive, got {max_match_distance}"
            )));
        }

        Ok(Self {
            ecal_hit_collection: params.get_string(ECAL_HIT_COLLECTION_NAME, "ecalDigis")?,
            hcal_hit_collection: params.get_string(HCAL_HIT_COLLECTION_NAME, "hcalDigis")?,
            ecal_scoring_plane: params
                .get_string(ECAL_SCORING_PLANE_HITS_NAME, "EcalScoringPlaneHits")?,
            hcal_scoring_plane: params
                .get_string(HCAL_SCORING_PLANE_HITS_NAME, "HcalScoringPlaneHits")?,
            max_match_distance,
            min_depth_event_max_pe: params.get_f64(MIN_DEPTH_INCLUDE_EVENT_MAX_PE)?,
            back_zero_layer: params.get_f64(BACK_ZERO_LAYER)?,
            side_zero_layer: params.get_f64(SIDE_ZERO_LAYER)?,
            ecal_front_z: params.get_f64(ECAL_FRONT_Z)?,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Input events (JSONL, one event per line)
    #[serde(default = "default_input")]
    pub input: String,
    /// Output path for the run summary JSON
    #[serde(default = "default_summary")]
    pub summary: String,
    /// Log progress every N events (0 to disable)
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    /// Abort the run instead of skipping events with missing collections
    #[serde(default)]
    pub abort_on_missing_collection: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            summary: default_summary(),
            progress_interval: default_progress_interval(),
            abort_on_missing_collection: false,
        }
    }
}

fn default_input() -> String {
    "events.jsonl".to_string()
}

fn default_summary() -> String {
    "hcal_matcher_summary.json".to_string()
}

fn default_progress_interval() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub processor: Parameters,
    /// Rest-mass overrides [GeV] keyed by PDG id
    #[serde(default)]
    pub particles: HashMap<String, f64>,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    input: String,
    summary: String,
    progress_interval: u64,
    abort_on_missing_collection: bool,
    processor: Parameters,
    particle_masses: Vec<(i32, f64)>,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let run = RunConfig::default();
        Self {
            input: run.input,
            summary: run.summary,
            progress_interval: run.progress_interval,
            abort_on_missing_collection: run.abort_on_missing_collection,
            processor: Parameters::default(),
            particle_masses: Vec::new(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from the CLI value or environment
    pub fn resolve_config_path(cli_path: Option<&str>) -> String {
        if let Some(path) = cli_path {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        // PDG ids are TOML keys, so they arrive as strings
        let mut particle_masses = Vec::with_capacity(toml_config.particles.len());
        for (key, mass) in toml_config.particles {
            let pdg_id = key
                .parse::<i32>()
                .with_context(|| format!("Invalid PDG id '{}' in [particles]", key))?;
            particle_masses.push((pdg_id, mass));
        }
        particle_masses.sort_by_key(|&(id, _)| id);

        Ok(Self {
            input: toml_config.run.input,
            summary: toml_config.run.summary,
            progress_interval: toml_config.run.progress_interval,
            abort_on_missing_collection: toml_config.run.abort_on_missing_collection,
            processor: toml_config.processor,
            particle_masses,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn progress_interval(&self) -> u64 {
        self.progress_interval
    }

    pub fn abort_on_missing_collection(&self) -> bool {
        self.abort_on_missing_collection
    }

    pub fn processor(&self) -> &Parameters {
        &self.processor
    }

    pub fn particle_masses(&self) -> &[(i32, f64)] {
        &self.particle_masses
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to replace the processor options
    pub fn with_processor(mut self, processor: Parameters) -> Self {
        self.processor = processor;
        self
    }

    /// Replace the input/summary pair (command line overrides)
    pub fn with_paths(mut self, input: &str, summary: &str) -> Self {
        self.input = input.to_string();
        self.summary = summary.to_string();
        self
    }
}

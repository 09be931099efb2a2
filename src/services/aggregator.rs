//! Run statistics accumulation
//!
//! The aggregator folds each event's `MatchResult` into `RunStatistics`.
//! Every distribution uses the event's summed ECAL energy as its first axis
//! so energy ranges can be selected after the run without reprocessing.
//!
//! Lifecycle: Uninitialized -> Accumulating -> Finalized. Any operation
//! outside its state returns `StageError::InvalidState` without touching
//! the statistics.
//!
//! Statistics live behind `SharedStatistics`; each event is applied under a
//! single write lock, so readers only ever see whole events.

use crate::domain::types::{Section, TrackId};
use crate::infra::error::StageError;
use crate::infra::histogram::{Axis, CategoryHistogram, Histogram};
use crate::infra::particles::{energies, ParticleTable};
use crate::services::matcher::MatchResult;
use parking_lot::RwLock;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Summed ECAL energy axis [MeV], shared by every distribution
fn ecal_energy_axis() -> Axis {
    Axis::new("ecal_summed_energy_mev", 50, 0.0, 5000.0)
}

/// Named binned distributions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distributions {
    pub ecal_summed_energy: Histogram,
    pub num_hcal_hits: Histogram,
    pub num_hcal_hits_back: Histogram,
    pub num_hcal_hits_side: Histogram,
    pub num_particles: Histogram,
    pub event_max_pe_all: Histogram,
    /// Only hits at or beyond the minimum layer
    pub event_max_pe_excluded: Histogram,
    /// Scoring-plane particles, one entry per valid crossing
    pub particle_id: CategoryHistogram,
    pub particle_energy: Histogram,
    pub particle_kinetic: Histogram,
    /// PDG id of the particle each matched hit was assigned to
    pub hcal_hit_id: CategoryHistogram,
    pub hcal_hit_depth_side: Histogram,
    pub hcal_hit_depth_back: Histogram,
    pub hcal_hit_z_side: Histogram,
    pub hcal_hit_pe_all: Histogram,
    pub hcal_hit_zbyr_all: Histogram,
    pub match_distance: Histogram,
}

impl Distributions {
    pub fn new() -> Self {
        let e = ecal_energy_axis;
        let hits = || Axis::new("num_hits", 100, 0.0, 200.0);
        let pe = || Axis::new("pe", 200, 0.0, 1000.0);
        let gev = || Axis::new("energy_gev", 100, 0.0, 5.0);

        Self {
            ecal_summed_energy: Histogram::one_d("ecal_summed_energy", e()),
            num_hcal_hits: Histogram::two_d("num_hcal_hits", e(), hits()),
            num_hcal_hits_back: Histogram::two_d("num_hcal_hits_back", e(), hits()),
            num_hcal_hits_side: Histogram::two_d("num_hcal_hits_side", e(), hits()),
            num_particles: Histogram::two_d(
                "num_particles",
                e(),
                Axis::new("num_particles", 50, 0.0, 50.0),
            ),
            event_max_pe_all: Histogram::two_d("event_max_pe_all", e(), pe()),
            event_max_pe_excluded: Histogram::two_d("event_max_pe_excluded", e(), pe()),
            particle_id: CategoryHistogram::new("particle_id", e()),
            particle_energy: Histogram::two_d("particle_energy", e(), gev()),
            particle_kinetic: Histogram::two_d("particle_kinetic", e(), gev()),
            hcal_hit_id: CategoryHistogram::new("hcal_hit_id", e()),
            hcal_hit_depth_side: Histogram::two_d(
                "hcal_hit_depth_side",
                e(),
                Axis::new("depth_mm", 100, 0.0, 1000.0),
            ),
            hcal_hit_depth_back: Histogram::two_d(
                "hcal_hit_depth_back",
                e(),
                Axis::new("depth_mm", 150, 0.0, 3000.0),
            ),
            hcal_hit_z_side: Histogram::two_d(
                "hcal_hit_z_side",
                e(),
                Axis::new("z_from_ecal_front_mm", 100, 0.0, 1000.0),
            ),
            hcal_hit_pe_all: Histogram::two_d("hcal_hit_pe_all", e(), pe()),
            hcal_hit_zbyr_all: Histogram::three_d(
                "hcal_hit_zbyr_all",
                e(),
                Axis::new("z_mm", 50, 0.0, 5000.0),
                Axis::new("r_mm", 30, 0.0, 3000.0),
            ),
            match_distance: Histogram::two_d(
                "match_distance",
                e(),
                Axis::new("distance_mm", 100, 0.0, 1000.0),
            ),
        }
    }

    /// Look up a plain histogram by its name
    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        [
            &self.ecal_summed_energy,
            &self.num_hcal_hits,
            &self.num_hcal_hits_back,
            &self.num_hcal_hits_side,
            &self.num_particles,
            &self.event_max_pe_all,
            &self.event_max_pe_excluded,
            &self.particle_energy,
            &self.particle_kinetic,
            &self.hcal_hit_depth_side,
            &self.hcal_hit_depth_back,
            &self.hcal_hit_z_side,
            &self.hcal_hit_pe_all,
            &self.hcal_hit_zbyr_all,
            &self.match_distance,
        ]
        .into_iter()
        .find(|h| h.name == name)
    }
}

impl Default for Distributions {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative statistics for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatistics {
    pub events: u64,
    pub non_noise_hits: u64,
    pub matched_hits: u64,
    /// Matched hit count per PDG id
    pub particles: BTreeMap<i32, u64>,
    /// Events skipped for a missing input collection
    pub skipped_events: u64,
    pub invalid_crossings: u64,
    pub invalid_hits: u64,
    /// Scoring-plane particles whose PDG id had no known mass
    pub unknown_particles: u64,
    pub distributions: Distributions,
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            events: 0,
            non_noise_hits: 0,
            matched_hits: 0,
            particles: BTreeMap::new(),
            skipped_events: 0,
            invalid_crossings: 0,
            invalid_hits: 0,
            unknown_particles: 0,
            distributions: Distributions::new(),
        }
    }

    /// Fraction of non-noise hits matched to a particle
    pub fn match_fraction(&self) -> f64 {
        if self.non_noise_hits > 0 {
            self.matched_hits as f64 / self.non_noise_hits as f64
        } else {
            0.0
        }
    }

    pub fn log(&self) {
        info!(
            events = %self.events,
            skipped_events = %self.skipped_events,
            non_noise_hits = %self.non_noise_hits,
            matched_hits = %self.matched_hits,
            match_fraction = format!("{:.3}", self.match_fraction()),
            distinct_pdg_ids = %self.particles.len(),
            invalid_crossings = %self.invalid_crossings,
            invalid_hits = %self.invalid_hits,
            unknown_particles = %self.unknown_particles,
            "run_statistics"
        );
    }
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-consistent handle on the statistics for reporting threads
#[derive(Debug, Clone, Default)]
pub struct SharedStatistics(Arc<RwLock<RunStatistics>>);

impl SharedStatistics {
    /// Copy of the statistics as of the last completed event
    pub fn snapshot(&self) -> RunStatistics {
        self.0.read().clone()
    }

    pub fn events(&self) -> u64 {
        self.0.read().events
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Uninitialized,
    Accumulating,
    Finalized,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Uninitialized => "uninitialized",
            RunState::Accumulating => "accumulating",
            RunState::Finalized => "finalized",
        }
    }
}

/// Folds per-event match results into run statistics
pub struct Aggregator<P: ParticleTable> {
    state: RunState,
    stats: SharedStatistics,
    particles: P,
    /// Minimum layer for a hit to count toward the excluded event max PE
    min_depth_layer: f64,
}

impl<P: ParticleTable> Aggregator<P> {
    pub fn new(particles: P, min_depth_layer: f64) -> Self {
        Self {
            state: RunState::Uninitialized,
            stats: SharedStatistics::default(),
            particles,
            min_depth_layer,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Handle for concurrent readers
    pub fn shared(&self) -> SharedStatistics {
        self.stats.clone()
    }

    pub fn snapshot(&self) -> RunStatistics {
        self.stats.snapshot()
    }

    fn require(&self, state: RunState, operation: &'static str) -> Result<(), StageError> {
        if self.state == state {
            Ok(())
        } else {
            Err(StageError::InvalidState { operation, state: self.state.as_str() })
        }
    }

    pub fn on_run_start(&mut self) -> Result<(), StageError> {
        self.require(RunState::Uninitialized, "start run")?;
        self.state = RunState::Accumulating;
        Ok(())
    }

    /// Per-event hook; no per-event state is kept today
    pub fn on_event_start(&mut self) {}

    /// Tally an event skipped for a missing collection
    pub fn record_skipped_event(&mut self) -> Result<(), StageError> {
        self.require(RunState::Accumulating, "record skipped event")?;
        self.stats.0.write().skipped_events += 1;
        Ok(())
    }

    /// Fold one event into the run statistics
    ///
    /// `summed_energy` is the event's non-noise ECAL energy [MeV]. Noise
    /// hits are excluded from every counter and distribution.
    pub fn accumulate(
        &mut self,
        result: &MatchResult,
        summed_energy: f64,
    ) -> Result<(), StageError> {
        self.require(RunState::Accumulating, "accumulate")?;

        let mut guard = self.stats.0.write();
        let stats = &mut *guard;
        let e = summed_energy;

        stats.events += 1;
        stats.invalid_crossings += result.invalid_crossings;
        stats.invalid_hits += result.invalid_hits;

        let dist = &mut stats.distributions;
        dist.ecal_summed_energy.fill(&[e]);

        for particle in &result.particles {
            dist.particle_id.fill(e, particle.pdg_id);
            match self.particles.mass_of(particle.pdg_id) {
                Ok(mass) => {
                    let (total, kinetic) = energies(particle.momentum.norm(), mass);
                    dist.particle_energy.fill(&[e, total]);
                    dist.particle_kinetic.fill(&[e, kinetic]);
                }
                Err(err) => {
                    stats.unknown_particles += 1;
                    debug!(error = %err, track_id = %particle.track_id, "particle_energy_skipped");
                }
            }
        }

        let mut num_back = 0u32;
        let mut num_side = 0u32;
        let mut max_pe_all = 0.0f64;
        let mut max_pe_excluded = 0.0f64;
        let mut tracks: SmallVec<[TrackId; 8]> = SmallVec::new();

        for hit in result.hits.iter().filter(|h| !h.noise) {
            stats.non_noise_hits += 1;

            match hit.section {
                Section::Back => num_back += 1,
                Section::Side => num_side += 1,
            }

            max_pe_all = max_pe_all.max(hit.pe);
            if f64::from(hit.layer) >= self.min_depth_layer {
                max_pe_excluded = max_pe_excluded.max(hit.pe);
            }

            if !hit.invalid {
                match hit.section {
                    Section::Back => {
                        dist.hcal_hit_depth_back.fill(&[e, hit.depth]);
                    }
                    Section::Side => {
                        dist.hcal_hit_depth_side.fill(&[e, hit.depth]);
                        dist.hcal_hit_z_side.fill(&[e, hit.z_from_ecal_front]);
                    }
                }
                dist.hcal_hit_pe_all.fill(&[e, hit.pe]);
                dist.hcal_hit_zbyr_all.fill(&[e, hit.position.z, hit.radius]);
                if hit.distance.is_finite() {
                    dist.match_distance.fill(&[e, hit.distance]);
                }
            }

            let Some(particle) = hit.particle else {
                continue;
            };

            stats.matched_hits += 1;
            *stats.particles.entry(particle.pdg_id).or_insert(0) += 1;
            dist.hcal_hit_id.fill(e, particle.pdg_id);
            if !tracks.contains(&particle.track_id) {
                tracks.push(particle.track_id);
            }
        }

        dist.num_hcal_hits.fill(&[e, f64::from(num_back + num_side)]);
        dist.num_hcal_hits_back.fill(&[e, f64::from(num_back)]);
        dist.num_hcal_hits_side.fill(&[e, f64::from(num_side)]);
        dist.num_particles.fill(&[e, tracks.len() as f64]);
        dist.event_max_pe_all.fill(&[e, max_pe_all]);
        dist.event_max_pe_excluded.fill(&[e, max_pe_excluded]);

        Ok(())
    }

    /// Finalize the run and return the final statistics
    pub fn on_run_end(&mut self) -> Result<RunStatistics, StageError> {
        self.require(RunState::Accumulating, "end run")?;
        self.state = RunState::Finalized;
        Ok(self.stats.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Vec3;
    use crate::infra::particles::PdgTable;
    use crate::services::matcher::{CrossingRef, HitMatch, MatchedParticle, ScoringPlane};

    fn scored(track: i64, pdg: i32, momentum: f64) -> MatchedParticle {
        MatchedParticle {
            crossing: CrossingRef { plane: ScoringPlane::Ecal, index: track as usize },
            track_id: TrackId(track),
            pdg_id: pdg,
            momentum: Vec3::new(0.0, 0.0, momentum),
        }
    }

    fn hit_match(section: Section, pe: f64, particle: Option<(i64, i32)>) -> HitMatch {
        HitMatch {
            hit_index: 0,
            section,
            layer: 5,
            noise: false,
            pe,
            position: Vec3::new(0.0, 0.0, 1200.0),
            depth: 100.0,
            z_from_ecal_front: 300.0,
            radius: 0.0,
            distance: if particle.is_some() { 12.0 } else { 400.0 },
            particle: particle.map(|(track, pdg)| MatchedParticle {
                crossing: CrossingRef { plane: ScoringPlane::Hcal, index: 0 },
                track_id: TrackId(track),
                pdg_id: pdg,
                momentum: Vec3::new(0.0, 0.0, 1.0),
            }),
            invalid: false,
        }
    }

    fn running() -> Aggregator<PdgTable> {
        let mut agg = Aggregator::new(PdgTable::new(), 4.0);
        agg.on_run_start().unwrap();
        agg
    }

    #[test]
    fn test_empty_events_counted() {
        let mut agg = running();
        for _ in 0..5 {
            agg.accumulate(&MatchResult::default(), 0.0).unwrap();
        }
        let stats = agg.on_run_end().unwrap();
        assert_eq!(stats.events, 5);
        assert_eq!(stats.matched_hits, 0);
        assert_eq!(stats.non_noise_hits, 0);
        assert_eq!(stats.distributions.ecal_summed_energy.entries, 5);
    }

    #[test]
    fn test_counts_matched_and_unmatched() {
        let mut agg = running();
        let result = MatchResult {
            hits: vec![
                hit_match(Section::Back, 10.0, Some((1, 13))),
                hit_match(Section::Back, 20.0, Some((1, 13))),
                hit_match(Section::Side, 5.0, Some((2, 2112))),
                hit_match(Section::Side, 3.0, None),
            ],
            particles: vec![scored(1, 13, 1.0), scored(2, 2112, 2.0), scored(3, 22, 0.5)],
            invalid_crossings: 1,
            invalid_hits: 0,
        };

        agg.accumulate(&result, 1500.0).unwrap();
        let stats = agg.snapshot();

        assert_eq!(stats.events, 1);
        assert_eq!(stats.non_noise_hits, 4);
        assert_eq!(stats.matched_hits, 3);
        assert_eq!(stats.particles.get(&13), Some(&2));
        assert_eq!(stats.particles.get(&2112), Some(&1));
        assert_eq!(stats.invalid_crossings, 1);

        let d = &stats.distributions;
        assert_eq!(d.num_hcal_hits.count_at(&[1500.0, 4.0]), 1);
        assert_eq!(d.num_hcal_hits_back.count_at(&[1500.0, 2.0]), 1);
        assert_eq!(d.num_hcal_hits_side.count_at(&[1500.0, 2.0]), 1);
        assert_eq!(d.num_particles.count_at(&[1500.0, 2.0]), 1);
        assert_eq!(d.event_max_pe_all.count_at(&[1500.0, 20.0]), 1);
        assert_eq!(d.hcal_hit_id.category_total(13), 2);
        assert_eq!(d.hcal_hit_id.category_total(2112), 1);
        assert_eq!(d.particle_id.category_total(13), 1);
        assert_eq!(d.particle_id.category_total(22), 1);
        assert_eq!(d.particle_kinetic.entries, 3);
        assert_eq!(d.match_distance.entries, 4);
        assert!((stats.match_fraction() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_noise_hits_excluded() {
        let mut agg = running();
        let mut noisy = hit_match(Section::Back, 50.0, Some((1, 13)));
        noisy.noise = true;
        let result = MatchResult { hits: vec![noisy], ..Default::default() };

        agg.accumulate(&result, 100.0).unwrap();
        let stats = agg.snapshot();

        assert_eq!(stats.non_noise_hits, 0);
        assert_eq!(stats.matched_hits, 0);
        assert!(stats.particles.is_empty());
        assert_eq!(stats.distributions.event_max_pe_all.count_at(&[100.0, 0.0]), 1);
    }

    #[test]
    fn test_excluded_max_pe_respects_min_depth() {
        let mut agg = running();
        let mut shallow = hit_match(Section::Back, 80.0, None);
        shallow.layer = 2;
        let deep = hit_match(Section::Back, 30.0, None);
        let result = MatchResult { hits: vec![shallow, deep], ..Default::default() };

        agg.accumulate(&result, 0.0).unwrap();
        let d = agg.snapshot().distributions;

        assert_eq!(d.event_max_pe_all.count_at(&[0.0, 80.0]), 1);
        assert_eq!(d.event_max_pe_excluded.count_at(&[0.0, 30.0]), 1);
    }

    #[test]
    fn test_unknown_particle_counted() {
        let mut agg = Aggregator::new(PdgTable::empty(), 4.0);
        agg.on_run_start().unwrap();
        let result = MatchResult {
            hits: vec![hit_match(Section::Back, 1.0, Some((9, 13)))],
            particles: vec![scored(9, 13, 1.0)],
            ..Default::default()
        };

        agg.accumulate(&result, 0.0).unwrap();
        let stats = agg.snapshot();

        assert_eq!(stats.matched_hits, 1);
        assert_eq!(stats.unknown_particles, 1);
        assert_eq!(stats.distributions.particle_id.category_total(13), 1);
        assert_eq!(stats.distributions.particle_energy.entries, 0);
    }

    #[test]
    fn test_accumulate_before_start_rejected() {
        let mut agg = Aggregator::new(PdgTable::new(), 4.0);
        let err = agg.accumulate(&MatchResult::default(), 0.0).unwrap_err();
        assert!(matches!(err, StageError::InvalidState { state: "uninitialized", .. }));
    }

    #[test]
    fn test_accumulate_after_finalize_rejected() {
        let mut agg = running();
        let result = MatchResult {
            hits: vec![hit_match(Section::Back, 10.0, Some((1, 13)))],
            ..Default::default()
        };
        agg.accumulate(&result, 10.0).unwrap();
        let final_stats = agg.on_run_end().unwrap();

        let err = agg.accumulate(&result, 10.0).unwrap_err();
        assert!(matches!(err, StageError::InvalidState { operation: "accumulate", state: "finalized" }));
        assert_eq!(agg.snapshot(), final_stats);
        assert_eq!(agg.state(), RunState::Finalized);

        assert!(agg.record_skipped_event().is_err());
        assert!(agg.on_run_end().is_err());
        assert!(agg.on_run_start().is_err());
    }

    #[test]
    fn test_shared_snapshot_tracks_events() {
        let mut agg = running();
        let shared = agg.shared();
        agg.accumulate(&MatchResult::default(), 0.0).unwrap();
        agg.record_skipped_event().unwrap();

        assert_eq!(shared.events(), 1);
        assert_eq!(shared.snapshot().skipped_events, 1);
    }

    #[test]
    fn test_particle_histograms_filled_per_crossing() {
        let mut agg = running();
        let result = MatchResult {
            hits: vec![hit_match(Section::Back, 4.0, None)],
            particles: vec![scored(1, 13, 1.0), scored(2, -13, 3.0)],
            ..Default::default()
        };

        agg.accumulate(&result, 250.0).unwrap();
        let d = agg.snapshot().distributions;

        // No hit matched, yet every crossing is histogrammed
        assert_eq!(d.particle_id.entries, 2);
        assert_eq!(d.particle_id.category_total(-13), 1);
        assert_eq!(d.particle_energy.entries, 2);
        assert_eq!(d.particle_kinetic.entries, 2);
        assert_eq!(d.hcal_hit_id.entries, 0);
    }

    #[test]
    fn test_histogram_lookup_by_name() {
        let d = Distributions::new();
        assert!(d.histogram("hcal_hit_zbyr_all").is_some());
        assert_eq!(d.histogram("num_hcal_hits_side").unwrap().axes.len(), 2);
        assert!(d.histogram("nope").is_none());
    }
}

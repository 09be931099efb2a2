//! Calorimeter hit to simulated particle matching
//!
//! Every scoring-plane crossing is turned into a finite ray along its
//! momentum. Each HCAL hit is assigned to the crossing whose ray passes
//! closest to it, provided the distance is below the configured maximum.
//!
//! Selection is stable: when several rays are equally close (within
//! `TIE_TOLERANCE_MM`) the first one in input order wins, ECAL plane
//! crossings before HCAL plane crossings.

use crate::domain::geometry::{Ray, Vec3};
use crate::domain::types::{CalorimeterHit, Section, TrackId, TrajectoryCrossing};
use crate::infra::config::MatcherConfig;
use crate::infra::error::StageError;
use tracing::{debug, trace};

/// Distances closer than this are treated as equal [mm]
pub const TIE_TOLERANCE_MM: f64 = 1e-9;

/// Scoring plane a crossing was recorded on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringPlane {
    Ecal,
    Hcal,
}

/// Stable reference to a crossing within the current event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CrossingRef {
    pub plane: ScoringPlane,
    pub index: usize,
}

/// A scoring-plane particle: the one a hit was matched to, or one of the
/// event's valid crossings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchedParticle {
    pub crossing: CrossingRef,
    pub track_id: TrackId,
    pub pdg_id: i32,
    /// Momentum at the crossing [GeV]
    pub momentum: Vec3,
}

/// Match outcome and derived quantities for one calorimeter hit
#[derive(Debug, Clone, PartialEq)]
pub struct HitMatch {
    pub hit_index: usize,
    pub section: Section,
    pub layer: i32,
    pub noise: bool,
    pub pe: f64,
    pub position: Vec3,
    /// Distance past the section's zeroth layer [mm]
    pub depth: f64,
    /// z relative to the ECAL front face [mm]
    pub z_from_ecal_front: f64,
    /// Distance from the beam axis [mm]
    pub radius: f64,
    /// Minimum ray distance over all candidates, INFINITY when none
    pub distance: f64,
    /// Set only when `distance` is below the maximum match distance
    pub particle: Option<MatchedParticle>,
    /// Hit geometry was unusable and the hit was not matched
    pub invalid: bool,
}

impl HitMatch {
    #[inline]
    pub fn is_matched(&self) -> bool {
        self.particle.is_some()
    }
}

/// One entry per calorimeter hit, in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub hits: Vec<HitMatch>,
    /// Every crossing that was usable as a candidate, ECAL plane first
    pub particles: Vec<MatchedParticle>,
    pub invalid_crossings: u64,
    pub invalid_hits: u64,
}

impl MatchResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.hits.iter().filter(|h| h.is_matched()).count()
    }
}

/// A crossing prepared for matching
#[derive(Debug, Clone, Copy)]
struct Candidate {
    crossing: CrossingRef,
    ray: Ray,
    /// None: candidate for every section
    section: Option<Section>,
    track_id: TrackId,
    pdg_id: i32,
    momentum: Vec3,
}

impl Candidate {
    #[inline]
    fn serves(&self, section: Section) -> bool {
        self.section.map_or(true, |s| s == section)
    }

    fn particle(&self) -> MatchedParticle {
        MatchedParticle {
            crossing: self.crossing,
            track_id: self.track_id,
            pdg_id: self.pdg_id,
            momentum: self.momentum,
        }
    }
}

/// Per-event hit matcher
///
/// Holds the configuration and a candidate buffer reused across events.
pub struct HitMatcher {
    config: MatcherConfig,
    candidates: Vec<Candidate>,
}

impl HitMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config, candidates: Vec::new() }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Section whose zeroth-layer plane lies nearest to a position
    ///
    /// Ties go to the back section.
    pub fn nearest_section(&self, position: Vec3) -> Section {
        let back = (position.z - self.config.back_zero_layer).abs();
        let side = (lateral(position) - self.config.side_zero_layer).abs();
        if back <= side {
            Section::Back
        } else {
            Section::Side
        }
    }

    /// Depth of a position past the given section's zeroth layer [mm]
    pub fn depth(&self, section: Section, position: Vec3) -> f64 {
        match section {
            Section::Back => position.z - self.config.back_zero_layer,
            Section::Side => lateral(position) - self.config.side_zero_layer,
        }
    }

    /// Match every hit against the crossings of one event
    ///
    /// ECAL scoring-plane crossings are candidates for both sections; HCAL
    /// scoring-plane crossings only for the section nearest to them.
    pub fn match_event(
        &mut self,
        ecal_crossings: &[TrajectoryCrossing],
        hcal_crossings: &[TrajectoryCrossing],
        hits: &[CalorimeterHit],
    ) -> MatchResult {
        let mut result = MatchResult::default();

        self.candidates.clear();
        self.candidates.reserve(ecal_crossings.len() + hcal_crossings.len());
        result.invalid_crossings += self.load_candidates(ScoringPlane::Ecal, ecal_crossings);
        result.invalid_crossings += self.load_candidates(ScoringPlane::Hcal, hcal_crossings);
        result.particles.extend(self.candidates.iter().map(Candidate::particle));

        result.hits.reserve(hits.len());
        for (hit_index, hit) in hits.iter().enumerate() {
            let hit_match = self.match_hit(hit_index, hit);
            if hit_match.invalid {
                result.invalid_hits += 1;
            }
            result.hits.push(hit_match);
        }

        trace!(
            candidates = %self.candidates.len(),
            hits = %result.hits.len(),
            matched = %result.matched_count(),
            "event_matched"
        );

        result
    }

    /// Append valid crossings as candidates, returning how many were rejected
    fn load_candidates(&mut self, plane: ScoringPlane, crossings: &[TrajectoryCrossing]) -> u64 {
        let mut rejected = 0;
        for (index, crossing) in crossings.iter().enumerate() {
            let ray = Ray::from_crossing(crossing.position, crossing.momentum, crossing.path_length);
            if let Err(e) = self.check_crossing(plane, index, crossing, &ray) {
                debug!(error = %e, track_id = %crossing.track_id, "crossing_skipped");
                rejected += 1;
                continue;
            }

            let section = match plane {
                ScoringPlane::Ecal => None,
                ScoringPlane::Hcal => Some(self.nearest_section(crossing.position)),
            };

            self.candidates.push(Candidate {
                crossing: CrossingRef { plane, index },
                ray,
                section,
                track_id: crossing.track_id,
                pdg_id: crossing.pdg_id,
                momentum: crossing.momentum,
            });
        }
        rejected
    }

    fn check_crossing(
        &self,
        plane: ScoringPlane,
        index: usize,
        crossing: &TrajectoryCrossing,
        ray: &Ray,
    ) -> Result<(), StageError> {
        let reason = if !crossing.position.is_finite() {
            "non-finite position"
        } else if !crossing.momentum.is_finite() {
            "non-finite momentum"
        } else if !ray.end.is_finite() || !(ray.end - ray.start).norm().is_finite() {
            "ray out of range"
        } else {
            return Ok(());
        };

        let collection = match plane {
            ScoringPlane::Ecal => &self.config.ecal_scoring_plane,
            ScoringPlane::Hcal => &self.config.hcal_scoring_plane,
        };
        Err(StageError::InvalidRecord { collection: collection.clone(), index, reason })
    }

    fn match_hit(&self, hit_index: usize, hit: &CalorimeterHit) -> HitMatch {
        let position = hit.position;

        if !position.is_finite() {
            let e = StageError::InvalidRecord {
                collection: self.config.hcal_hit_collection.clone(),
                index: hit_index,
                reason: "non-finite position",
            };
            debug!(error = %e, hit_id = %hit.id, "hit_unmatchable");
            return HitMatch {
                hit_index,
                section: hit.section.unwrap_or(Section::Back),
                layer: hit.layer,
                noise: hit.noise,
                pe: hit.pe,
                position,
                depth: f64::NAN,
                z_from_ecal_front: f64::NAN,
                radius: f64::NAN,
                distance: f64::INFINITY,
                particle: None,
                invalid: true,
            };
        }

        let section = hit.section.unwrap_or_else(|| self.nearest_section(position));

        let mut best: Option<(&Candidate, f64)> = None;
        for candidate in self.candidates.iter().filter(|c| c.serves(section)) {
            let d = candidate.ray.distance_to(position);
            if d.is_nan() {
                continue;
            }
            match best {
                Some((_, best_d)) if d >= best_d - TIE_TOLERANCE_MM => {}
                _ => best = Some((candidate, d)),
            }
        }

        let distance = best.map_or(f64::INFINITY, |(_, d)| d);
        let particle = best
            .filter(|&(_, d)| d < self.config.max_match_distance)
            .map(|(c, _)| c.particle());

        HitMatch {
            hit_index,
            section,
            layer: hit.layer,
            noise: hit.noise,
            pe: hit.pe,
            position,
            depth: self.depth(section, position),
            z_from_ecal_front: position.z - self.config.ecal_front_z,
            radius: position.transverse(),
            distance,
            particle,
            invalid: false,
        }
    }
}

/// Transverse distance used by the side HCAL (square geometry)
#[inline]
fn lateral(position: Vec3) -> f64 {
    position.x.abs().max(position.y.abs())
}

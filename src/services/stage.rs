//! HCAL hit matching stage
//!
//! Pairs the `HitMatcher` with an `Aggregator` behind the generic
//! `Processor` lifecycle. The driver never sees calorimeter types.

use crate::domain::types::{CalorimeterHit, Event};
use crate::infra::config::{MatcherConfig, Parameters};
use crate::infra::error::StageError;
use crate::infra::particles::ParticleTable;
use crate::services::aggregator::{Aggregator, RunState, RunStatistics, SharedStatistics};
use crate::services::matcher::HitMatcher;
use tracing::info;

/// Lifecycle hooks invoked by the driver
pub trait Processor {
    fn name(&self) -> &str;

    /// Read options; called once before the run starts
    fn configure(&mut self, params: &Parameters) -> Result<(), StageError>;

    fn on_run_start(&mut self) -> Result<(), StageError>;

    /// Process one event. Recoverable errors skip only this event.
    fn process_event(&mut self, event: &Event) -> Result<(), StageError>;

    fn on_run_end(&mut self) -> Result<(), StageError>;

    /// Periodic progress hook
    fn log_progress(&self) {}
}

struct Configured<P: ParticleTable> {
    matcher: HitMatcher,
    aggregator: Aggregator<P>,
}

/// Matches HCAL digis to scoring-plane particles and accumulates statistics
pub struct HcalHitMatcher<P: ParticleTable + Clone> {
    name: String,
    particles: P,
    inner: Option<Configured<P>>,
    final_stats: Option<RunStatistics>,
}

impl<P: ParticleTable + Clone> HcalHitMatcher<P> {
    pub fn new(name: &str, particles: P) -> Self {
        Self { name: name.to_string(), particles, inner: None, final_stats: None }
    }

    /// Statistics handle for reporting threads (None before configure)
    pub fn shared_statistics(&self) -> Option<SharedStatistics> {
        self.inner.as_ref().map(|c| c.aggregator.shared())
    }

    /// Final statistics, available once the run has ended
    pub fn statistics(&self) -> Option<&RunStatistics> {
        self.final_stats.as_ref()
    }

    fn configured(&mut self, operation: &'static str) -> Result<&mut Configured<P>, StageError> {
        self.inner
            .as_mut()
            .ok_or(StageError::InvalidState { operation, state: "unconfigured" })
    }
}

/// Non-noise ECAL energy of an event [MeV]
pub fn summed_ecal_energy(hits: &[CalorimeterHit]) -> f64 {
    hits.iter().filter(|h| !h.noise && h.energy.is_finite()).map(|h| h.energy).sum()
}

impl<P: ParticleTable + Clone> Processor for HcalHitMatcher<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, params: &Parameters) -> Result<(), StageError> {
        if let Some(configured) = &self.inner {
            let state = configured.aggregator.state();
            if state != RunState::Uninitialized {
                return Err(StageError::InvalidState {
                    operation: "configure",
                    state: state.as_str(),
                });
            }
        }

        let config = MatcherConfig::from_parameters(params)?;
        info!(
            processor = %self.name,
            ecal_hits = %config.ecal_hit_collection,
            hcal_hits = %config.hcal_hit_collection,
            ecal_scoring_plane = %config.ecal_scoring_plane,
            hcal_scoring_plane = %config.hcal_scoring_plane,
            max_match_distance_mm = %config.max_match_distance,
            min_depth_event_max_pe = %config.min_depth_event_max_pe,
            back_zero_layer_mm = %config.back_zero_layer,
            side_zero_layer_mm = %config.side_zero_layer,
            ecal_front_z_mm = %config.ecal_front_z,
            "processor_configured"
        );

        let aggregator = Aggregator::new(self.particles.clone(), config.min_depth_event_max_pe);
        self.inner = Some(Configured { matcher: HitMatcher::new(config), aggregator });
        self.final_stats = None;
        Ok(())
    }

    fn on_run_start(&mut self) -> Result<(), StageError> {
        self.configured("start run")?.aggregator.on_run_start()
    }

    fn process_event(&mut self, event: &Event) -> Result<(), StageError> {
        let Configured { matcher, aggregator } = self.configured("process event")?;
        let cfg = matcher.config();

        let fetched = event.hits(&cfg.ecal_hit_collection).and_then(|ecal| {
            Ok((
                ecal,
                event.hits(&cfg.hcal_hit_collection)?,
                event.crossings(&cfg.ecal_scoring_plane)?,
                event.crossings(&cfg.hcal_scoring_plane)?,
            ))
        });
        let (ecal_hits, hcal_hits, ecal_crossings, hcal_crossings) = match fetched {
            Ok(collections) => collections,
            Err(e) => {
                aggregator.record_skipped_event()?;
                return Err(e);
            }
        };

        aggregator.on_event_start();
        let summed_energy = summed_ecal_energy(ecal_hits);
        let result = matcher.match_event(ecal_crossings, hcal_crossings, hcal_hits);
        aggregator.accumulate(&result, summed_energy)
    }

    fn on_run_end(&mut self) -> Result<(), StageError> {
        let stats = self.configured("end run")?.aggregator.on_run_end()?;
        stats.log();
        self.final_stats = Some(stats);
        Ok(())
    }

    fn log_progress(&self) {
        if let Some(shared) = self.shared_statistics() {
            let stats = shared.snapshot();
            info!(
                processor = %self.name,
                events = %stats.events,
                skipped_events = %stats.skipped_events,
                matched_hits = %stats.matched_hits,
                non_noise_hits = %stats.non_noise_hits,
                "progress"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Section, TrackId, TrajectoryCrossing};
    use crate::infra::config::{
        BACK_ZERO_LAYER, ECAL_FRONT_Z, MAXIMUM_MATCH_DISTANCE, MIN_DEPTH_INCLUDE_EVENT_MAX_PE,
        SIDE_ZERO_LAYER,
    };
    use crate::infra::particles::PdgTable;

    fn params() -> Parameters {
        Parameters::new()
            .with(MIN_DEPTH_INCLUDE_EVENT_MAX_PE, 2)
            .with(BACK_ZERO_LAYER, 0.0)
            .with(SIDE_ZERO_LAYER, 600.0)
            .with(ECAL_FRONT_Z, -200.0)
    }

    fn ecal_hit(energy: f64, noise: bool) -> CalorimeterHit {
        CalorimeterHit {
            id: 0,
            layer: 3,
            section: None,
            strip: 0,
            pe: 0.0,
            energy,
            position: [0.0, 0.0, -100.0].into(),
            noise,
        }
    }

    fn hcal_hit(position: [f64; 3]) -> CalorimeterHit {
        CalorimeterHit {
            id: 1,
            layer: 4,
            section: Some(Section::Back),
            strip: 2,
            pe: 15.0,
            energy: 0.0,
            position: position.into(),
            noise: false,
        }
    }

    fn muon() -> TrajectoryCrossing {
        TrajectoryCrossing {
            track_id: TrackId(1),
            pdg_id: 13,
            position: [0.0, 0.0, 0.0].into(),
            momentum: [0.0, 0.0, 1.0].into(),
            edep: 0.0,
            time: 0.0,
            path_length: 10.0,
            layer_id: 1,
        }
    }

    fn event(hcal_hits: Vec<CalorimeterHit>) -> Event {
        Event::new(1)
            .with_hits("ecalDigis", vec![ecal_hit(1200.0, false), ecal_hit(300.0, true)])
            .with_hits("hcalDigis", hcal_hits)
            .with_crossings("EcalScoringPlaneHits", vec![])
            .with_crossings("HcalScoringPlaneHits", vec![muon()])
    }

    fn stage() -> HcalHitMatcher<PdgTable> {
        let mut stage = HcalHitMatcher::new("hcal_matcher", PdgTable::new());
        stage.configure(&params()).unwrap();
        stage.on_run_start().unwrap();
        stage
    }

    #[test]
    fn test_summed_ecal_energy_skips_noise() {
        let hits = [ecal_hit(1200.0, false), ecal_hit(300.0, true), ecal_hit(f64::NAN, false)];
        assert_eq!(summed_ecal_energy(&hits), 1200.0);
    }

    #[test]
    fn test_process_event_matches() {
        let mut stage = stage();
        stage.process_event(&event(vec![hcal_hit([0.0, 0.0, 5.0])])).unwrap();
        stage.on_run_end().unwrap();

        let stats = stage.statistics().unwrap();
        assert_eq!(stats.events, 1);
        assert_eq!(stats.matched_hits, 1);
        assert_eq!(stats.particles.get(&13), Some(&1));
        assert_eq!(stats.distributions.ecal_summed_energy.count_at(&[1200.0]), 1);
    }

    #[test]
    fn test_missing_collection_skips_event() {
        let mut stage = stage();
        let incomplete = Event::new(9).with_hits("hcalDigis", vec![hcal_hit([0.0, 0.0, 5.0])]);

        let err = stage.process_event(&incomplete).unwrap_err();
        assert!(matches!(err, StageError::MissingCollection { ref name, event: 9 } if name == "ecalDigis"));

        stage.on_run_end().unwrap();
        let stats = stage.statistics().unwrap();
        assert_eq!(stats.events, 0);
        assert_eq!(stats.skipped_events, 1);
    }

    #[test]
    fn test_unconfigured_stage_rejects_events() {
        let mut stage = HcalHitMatcher::new("hcal_matcher", PdgTable::new());
        assert!(matches!(
            stage.process_event(&Event::new(0)),
            Err(StageError::InvalidState { state: "unconfigured", .. })
        ));
        assert!(stage.shared_statistics().is_none());
    }

    #[test]
    fn test_reconfigure_after_start_rejected() {
        let mut stage = stage();
        stage.process_event(&event(vec![hcal_hit([0.0, 0.0, 5.0])])).unwrap();

        let err = stage.configure(&params()).unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidState { operation: "configure", state: "accumulating" }
        ));

        // Accumulated statistics survive the rejected call
        stage.on_run_end().unwrap();
        assert_eq!(stage.statistics().unwrap().matched_hits, 1);
    }

    #[test]
    fn test_reconfigure_before_start_allowed() {
        let mut stage = HcalHitMatcher::new("hcal_matcher", PdgTable::new());
        stage.configure(&params()).unwrap();
        stage.configure(&params().with(MAXIMUM_MATCH_DISTANCE, 50.0)).unwrap();
        stage.on_run_start().unwrap();
    }

    #[test]
    fn test_configure_requires_zero_layers() {
        let mut stage = HcalHitMatcher::new("hcal_matcher", PdgTable::new());
        let err = stage.configure(&Parameters::new()).unwrap_err();
        assert!(matches!(err, StageError::Configuration(_)));
    }
}

//! Generic single-stream event loop
//!
//! Runs one `Processor` over an ordered event stream: `on_run_start`, then
//! `process_event` per event, then `on_run_end`. Recoverable per-event
//! errors skip the event unless the driver is told to abort on them;
//! configuration and state errors always abort.

use crate::domain::types::Event;
use crate::infra::error::StageError;
use crate::services::stage::Processor;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct DriverOptions {
    pub abort_on_missing_collection: bool,
    /// Call the processor's progress hook every N events (0 disables)
    pub progress_interval: u64,
}

/// What the driver did with the event stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub processed: u64,
    pub skipped: u64,
    /// Stream entries that could not be decoded into an event
    pub unreadable: u64,
}

pub struct Driver {
    options: DriverOptions,
}

impl Driver {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }

    /// Run the processor over every event in the stream
    pub fn run<P, I, E>(&self, processor: &mut P, events: I) -> Result<DriverReport, StageError>
    where
        P: Processor + ?Sized,
        I: IntoIterator<Item = Result<Event, E>>,
        E: std::fmt::Display,
    {
        let mut report = DriverReport::default();

        processor.on_run_start()?;
        info!(processor = %processor.name(), "run_started");

        for (position, item) in events.into_iter().enumerate() {
            let event = match item {
                Ok(event) => event,
                Err(e) => {
                    warn!(position = %position, error = %e, "event_unreadable");
                    report.unreadable += 1;
                    continue;
                }
            };

            match processor.process_event(&event) {
                Ok(()) => report.processed += 1,
                Err(e) if self.should_skip(&e) => {
                    warn!(event = %event.number, error = %e, "event_skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(event = %event.number, error = %e, "run_aborted");
                    return Err(e);
                }
            }

            let seen = report.processed + report.skipped;
            if self.options.progress_interval > 0 && seen % self.options.progress_interval == 0 {
                processor.log_progress();
            }
        }

        processor.on_run_end()?;
        info!(
            processor = %processor.name(),
            processed = %report.processed,
            skipped = %report.skipped,
            unreadable = %report.unreadable,
            "run_finished"
        );

        Ok(report)
    }

    fn should_skip(&self, error: &StageError) -> bool {
        match error {
            StageError::MissingCollection { .. } => !self.options.abort_on_missing_collection,
            other => other.is_recoverable(),
        }
    }
}

//! JSONL event source
//!
//! One JSON-encoded `Event` per line. Blank lines are ignored. A line that
//! fails to parse is yielded as an error so the driver can tally it and
//! continue with the next line.

use crate::domain::types::Event;
use anyhow::Context;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::info;

pub struct JsonlEventReader<R: BufRead> {
    lines: Lines<R>,
    line_no: usize,
}

impl JsonlEventReader<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open event file {}", path.display()))?;
        info!(path = %path.display(), "event_source_opened");
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> JsonlEventReader<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), line_no: 0 }
    }
}

impl<R: BufRead> Iterator for JsonlEventReader<R> {
    type Item = anyhow::Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line_no = self.line_no;

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(
                        anyhow::Error::new(e).context(format!("Failed to read line {line_no}"))
                    ))
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            return Some(
                serde_json::from_str::<Event>(&line)
                    .with_context(|| format!("Failed to parse event on line {line_no}")),
            );
        }
    }
}

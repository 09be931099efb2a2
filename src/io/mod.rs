//! IO modules - event input and summary output
//!
//! - `event_reader` - JSONL event source
//! - `summary` - Run summary written as JSON

pub mod event_reader;
pub mod summary;

// Re-export commonly used types
pub use event_reader::JsonlEventReader;
pub use summary::{write_summary, RunSummary};

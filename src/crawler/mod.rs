//! Run control and crawling
//!
//! This module contains the orchestration layer, including:
//! - The run state machine and its control surface
//! - Events reported to the consumer of a run
//! - The breadth-first crawl frontier and link discovery
//! - The orchestrator loop tying them to a fetch engine

pub mod control;
pub mod events;
pub mod frontier;
pub mod orchestrator;
mod parser;

pub use control::{Decision, RunControl, RunHandle, RunState, POLL_INTERVAL};
pub use events::{Event, EventSink, LogLevel};
pub use frontier::{CrawlFrontier, IngestReport};
pub use orchestrator::{pause_predicate, Orchestrator, PausePredicate};
pub use parser::resolve_links;

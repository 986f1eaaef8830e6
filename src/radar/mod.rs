//! Release detection and delivery
//!
//! [`ReleaseDetector`] finds new albums and their tracks for a task;
//! [`SyncOrchestrator`] delivers them to the task's playlist and keeps the
//! ledger and run timestamps up to date.

pub mod dates;
pub mod detector;
pub mod orchestrator;
pub mod processing;

pub use dates::{is_on_or_after, parse_release_date, DatePrecision};
pub use detector::{DetectedReleases, ReleaseDetector};
pub use orchestrator::{RunOutcome, SyncOrchestrator, PLAYLIST_CHUNK_SIZE};
pub use processing::{ProcessingClaim, ProcessingTracker};

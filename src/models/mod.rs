//! Domain models for release-radar

pub mod catalog;
pub mod ledger;
pub mod task;
pub mod token;

pub use catalog::{Album, Page, Track};
pub use ledger::{LedgerEntry, LedgerItemKind};
pub use task::{Platform, WatchItem, WatchItemKind, WatchTask};
pub use token::StoredToken;

//! Cadence Script - RON loading for cadence sessions
//!
//! Loads session content from RON files:
//! - Rule documents `(rules: [...])`
//! - Timer documents `(timers: [...])`
//! - Clock configuration `(multiplier: ..., start: ...)`
//! - Session checkpoints

mod checkpoint;
mod error;
mod loader;

pub use checkpoint::{checkpoint_from_ron, checkpoint_to_ron, load_checkpoint, save_checkpoint};
pub use error::{Error, Result};
pub use loader::{LoadReport, Loader};

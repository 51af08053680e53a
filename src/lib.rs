//! Incremental Strava activity export to CSV.

pub mod args;
pub mod ask;
pub mod auth;
pub mod cfg;
pub mod csv_sink;
pub mod error;
pub mod job;
pub mod state;
pub mod strava;
pub mod transform;

pub use error::SyncError;
pub use job::{SyncResult, Synchronizer};

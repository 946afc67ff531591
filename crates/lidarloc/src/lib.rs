#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Vehicle to sensor calibration.
pub mod calibration;

/// One-time heading sweep at the position fix.
pub mod coarse_search;

/// Startup configuration.
pub mod config;

/// Pipeline error types.
pub mod error;

pub mod frames;

/// Inbound and outbound message types.
pub mod messages;

/// Threaded localizer node.
pub mod node;

/// Scan cycle state and processing.
pub mod pipeline;

/// Map and fix readiness tracking.
pub mod readiness;

/// Registration primitive seam.
pub mod registration;

/// Recorded drive input for the replay binary.
pub mod replay;

/// Outbound publishers.
pub mod sink;

/// Warm-started registration.
pub mod tracking;

/// Trajectory log.
pub mod trajectory;

pub use lidarloc_3d as l3d;
pub use lidarloc_icp as icp;

pub use config::LocalizerConfig;
pub use error::LocalizationError;
pub use node::LocalizerNode;
pub use pipeline::{CycleReport, Localizer};

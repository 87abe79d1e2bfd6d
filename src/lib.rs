//! Plausibility scoring for vehicular Cooperative Awareness Messages.
//!
//! Each inbound CAM is compared against a model-based prediction of where
//! the sending station should be, given its recent kinematic history. The
//! resulting 1..=7 quality score is aggregated per station and published in
//! batches to an external dataflow store.

pub mod amqp;
pub mod cam;
pub mod config;
pub mod detector;
pub mod error;
pub mod geo;
pub mod predictors;
pub mod sink;
pub mod station;
pub mod types;

pub use config::Config;
pub use detector::Detector;
pub use error::QualityError;
pub use station::{StationReading, StationState};

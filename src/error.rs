//! Per-item failure classification.
//!
//! Nothing in this crate aborts a batch: a failed item is logged, skipped,
//! and omitted from the result collection. These variants exist so the skip
//! sites can say why.

use thiserror::Error;

use crate::types::FrequencyBand;

/// Reasons a single waveform or event is dropped from a batch.
#[derive(Debug, Error)]
pub enum MeasurementError {
    /// The cut window starts at or after it ends, or lies outside one of the
    /// series being cut.
    #[error("coda window [{start_sec}, {end_sec}] s is out of bounds")]
    WindowOutOfBounds { start_sec: f64, end_sec: f64 },

    /// The cut window is shorter than the band's configured minimum.
    #[error("coda window {length_sec} s shorter than minimum {min_sec} s")]
    WindowTooShort { length_sec: f64, min_sec: f64 },

    /// No end ("F") pick exists, so the coda window cannot be closed.
    #[error("no coda end pick for waveform {waveform_id}")]
    MissingEndPick { waveform_id: i64 },

    /// No calibrated parameters exist for the waveform's frequency band.
    #[error("no band parameters for {band}")]
    MissingBandParameters { band: FrequencyBand },

    /// The event had no usable band measurements to fit against.
    #[error("no positive-amplitude measurements for event {event_id}")]
    NoUsableMeasurements { event_id: String },
}

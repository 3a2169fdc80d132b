//! Core value types shared across the crate.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A (low, high) frequency interval in Hz.
///
/// Value identity: two bands are equal when both edges are bitwise-equal
/// doubles, and bands order by low edge then high edge. Bands are created by
/// configuration loading and never mutated afterwards, which is what makes
/// them safe map keys throughout the crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FrequencyBand {
    low_hz: f64,
    high_hz: f64,
}

impl FrequencyBand {
    pub fn new(low_hz: f64, high_hz: f64) -> Self {
        Self { low_hz, high_hz }
    }

    pub fn low_hz(&self) -> f64 {
        self.low_hz
    }

    pub fn high_hz(&self) -> f64 {
        self.high_hz
    }

    /// Band center frequency in Hz, the frequency spectra are evaluated at.
    pub fn center_hz(&self) -> f64 {
        self.low_hz + (self.high_hz - self.low_hz) / 2.0
    }
}

impl PartialEq for FrequencyBand {
    fn eq(&self, other: &Self) -> bool {
        self.low_hz.to_bits() == other.low_hz.to_bits()
            && self.high_hz.to_bits() == other.high_hz.to_bits()
    }
}

impl Eq for FrequencyBand {}

impl PartialOrd for FrequencyBand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrequencyBand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.low_hz
            .total_cmp(&other.low_hz)
            .then(self.high_hz.total_cmp(&other.high_hz))
    }
}

impl std::hash::Hash for FrequencyBand {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.low_hz.to_bits().hash(state);
        self.high_hz.to_bits().hash(state);
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} Hz", self.low_hz, self.high_hz)
    }
}

/// Event identifier assigned by the upstream catalog.
pub type EventId = String;

/// Seismic phase the spectral model is evaluated for.
///
/// P-type phases use the P radiation pattern and the zeta-scaled corner
/// frequency; S-type phases use the shear values directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Pn,
    Pg,
    Sn,
    Lg,
}

impl Phase {
    /// Whether this phase is compressional (Pn/Pg).
    pub fn is_p(self) -> bool {
        matches!(self, Phase::Pn | Phase::Pg)
    }
}

/// A uniformly sampled envelope amplitude series.
///
/// Sample `j` holds the log10 amplitude at `start_sec + j / sample_rate`
/// seconds after the event origin time. Timing is carried as plain offsets;
/// absolute epochs belong to the I/O layers upstream of this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvelopeSeries {
    /// log10 amplitude samples.
    pub samples: Vec<f64>,
    /// Sampling rate in Hz.
    pub sample_rate: f64,
    /// Time of the first sample, seconds after origin.
    pub start_sec: f64,
}

impl EnvelopeSeries {
    /// Time of the last sample, seconds after origin.
    pub fn end_sec(&self) -> f64 {
        if self.samples.is_empty() {
            self.start_sec
        } else {
            self.start_sec + (self.samples.len() - 1) as f64 / self.sample_rate
        }
    }
}

/// One observed/synthetic envelope pair ready for amplitude measurement.
///
/// Produced upstream by the envelope generation and synthetic modeling
/// stages; this crate only reads it.
#[derive(Debug, Clone)]
pub struct CodaWaveform {
    pub waveform_id: i64,
    pub event_id: EventId,
    pub station: String,
    pub band: FrequencyBand,
    /// Source-receiver distance in km.
    pub distance_km: f64,
    pub observed: EnvelopeSeries,
    pub synthetic: EnvelopeSeries,
    /// Analyst coda-start pick, seconds after origin.
    pub user_start_pick_sec: Option<f64>,
    /// Automatically computed coda-start time, seconds after origin.
    pub coda_start_sec: Option<f64>,
    /// First "F"-type end pick, seconds after origin.
    pub f_pick_sec: Option<f64>,
    /// Site correction term for this station/band, if calibrated.
    pub site_term: Option<f64>,
}

/// Per-band measurement summary for one event, input to the moment fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandSummary {
    /// Mean path/site-corrected log10 amplitude across stations.
    pub mean_amplitude: f64,
    /// Sample standard deviation of those measurements.
    pub std_dev: f64,
    /// Number of station measurements behind the mean.
    pub count: u64,
}

/// A single observed log amplitude-ratio record for an event pair at one
/// station and band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioDetail {
    /// Mean observed log10 amplitude ratio (event A over event B).
    pub diff_avg: f64,
}

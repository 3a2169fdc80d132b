//! Raw and corrected coda amplitude measurement.
//!
//! Each waveform carries an observed envelope and the synthetic envelope
//! generated from the calibrated shape model. The raw amplitude is the
//! median offset between the two over the coda window; the extended
//! Street-Herrmann path model plus a Q term and the station site term turn
//! it into an absolute source spectral amplitude.

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::config::{MeasurerConfig, SharedBandParameters};
use crate::constants::{LOG10_OF_E, PEAK_SEARCH_WINDOW_SEC};
use crate::error::MeasurementError;
use crate::result::AmplitudeMeasurement;
use crate::statistics::{cv_rmsd, median};
use crate::types::{CodaWaveform, EnvelopeSeries};

/// Value of the synthetic coda shape at `t` seconds into the coda for the
/// distance-evaluated decay terms `gr` and `br`. The unit-amplitude
/// intercept is fixed at 1.0; non-positive times sit on the log
/// singularity and return a floor value.
pub fn synthetic_point_at_time(gr: f64, br: f64, t: f64) -> f64 {
    if t <= 0.0 {
        return -10.0;
    }
    1.0 - gr * t.log10() + br * t
}

/// Synthetic shape value at a measurement time and distance, with the
/// decay terms taken from the band's calibrated distance curves.
pub fn point_at_time_and_distance(
    params: &SharedBandParameters,
    measurement_time_sec: f64,
    distance_km: f64,
) -> f64 {
    let br = params.beta.evaluate(distance_km);
    let gr = params.gamma.evaluate(distance_km);
    synthetic_point_at_time(gr, br, measurement_time_sec)
}

/// Extended Street-Herrmann path correction, log10 units, no Q or site
/// terms. Piecewise in distance: slope `s1` inside `xc/xt`, slope `s2`
/// beyond `xc*xt`, log-linear blend between.
pub fn log10_esh(s1: f64, s2: f64, xcross: f64, xtrans: f64, distance_km: f64) -> f64 {
    let xstart = xcross / xtrans;
    let xend = xcross * xtrans;

    if distance_km <= xstart {
        -s1 * distance_km.log10()
    } else if distance_km >= xend {
        let ds = s2 - s1;
        -s1 * xstart.log10()
            - (s1 + ds / 2.0) * (xend / xstart).log10()
            - s2 * (distance_km / xend).log10()
    } else {
        // Singular if xtrans is 1, callers keep it above that.
        let s = (s2 - s1) / (xend / xstart).log10();
        let ds = s * (distance_km / xstart).log10();
        -s1 * xstart.log10() - (s1 + ds / 2.0) * (distance_km / xstart).log10()
    }
}

/// Full path correction: `-log10(esh) + dist*pi*f0*log10(e)/(q*vphase)`,
/// `f0` the geometric band center. Zero when the band has no shape or Q
/// calibration.
pub fn path_correction(
    low_hz: f64,
    high_hz: f64,
    params: &SharedBandParameters,
    distance_km: f64,
    phase_velocity_km_s: f64,
) -> f64 {
    let log10_esh = log10_esh(params.s1, params.s2, params.xc, params.xt, distance_km);
    if log10_esh == 0.0 || params.q == 0.0 {
        return 0.0;
    }
    let f0 = (low_hz * high_hz).sqrt();
    let dist_q = distance_km * std::f64::consts::PI * f0 * LOG10_OF_E
        / (params.q * phase_velocity_km_s);
    -log10_esh + dist_q
}

/// Measures coda amplitudes against calibrated band parameters.
#[derive(Debug, Clone, Default)]
pub struct AmplitudeMeasurer {
    config: MeasurerConfig,
}

impl AmplitudeMeasurer {
    pub fn new(config: MeasurerConfig) -> Self {
        Self { config }
    }

    /// Measure one waveform. The observed envelope is resampled to the
    /// synthetic's rate and both are cut to the common coda window before
    /// the median offset is taken.
    pub fn measure(
        &self,
        waveform: &CodaWaveform,
        params: &SharedBandParameters,
    ) -> Result<AmplitudeMeasurement, MeasurementError> {
        let observed = resample(&waveform.observed, waveform.synthetic.sample_rate);
        let synthetic = &waveform.synthetic;

        let start_sec = self.coda_start_sec(waveform, params, &observed);

        let f_pick = waveform
            .f_pick_sec
            .ok_or(MeasurementError::MissingEndPick {
                waveform_id: waveform.waveform_id,
            })?;
        let end_sec = f_pick.min(start_sec + params.max_length_sec);

        if start_sec >= end_sec {
            return Err(MeasurementError::WindowOutOfBounds {
                start_sec,
                end_sec,
            });
        }

        let (obs_cut, synth_cut) = cut_common(&observed, synthetic, start_sec, end_sec)
            .ok_or(MeasurementError::WindowOutOfBounds { start_sec, end_sec })?;

        let length_sec = end_sec - start_sec;
        if length_sec < params.min_length_sec {
            return Err(MeasurementError::WindowTooShort {
                length_sec,
                min_sec: params.min_length_sec,
            });
        }

        let diffs: Vec<f64> = obs_cut
            .iter()
            .zip(&synth_cut)
            .map(|(o, s)| o - s)
            .collect();
        let raw_amplitude = median(&diffs).ok_or(MeasurementError::WindowOutOfBounds {
            start_sec,
            end_sec,
        })?;

        let shifted: Vec<f64> = synth_cut.iter().map(|s| s + raw_amplitude).collect();
        let fit_residual = cv_rmsd(&obs_cut, &shifted).unwrap_or(f64::MAX);

        let raw_at_measurement_time = if params.measurement_time_sec > 0.0 {
            raw_amplitude
                + point_at_time_and_distance(
                    params,
                    params.measurement_time_sec,
                    waveform.distance_km,
                )
        } else {
            raw_amplitude
        };

        let esh = path_correction(
            waveform.band.low_hz(),
            waveform.band.high_hz(),
            params,
            waveform.distance_km,
            self.config.phase_velocity_km_s,
        );
        let site_term = waveform.site_term.unwrap_or(0.0);

        let path_corrected = raw_at_measurement_time + esh;
        let path_and_site_corrected = if site_term <= 0.0 {
            0.0
        } else {
            path_corrected + site_term
        };

        Ok(AmplitudeMeasurement {
            waveform_id: waveform.waveform_id,
            raw_amplitude,
            raw_at_measurement_time,
            path_corrected,
            path_and_site_corrected,
            start_cut_sec: start_sec,
            end_cut_sec: end_sec,
            fit_residual,
        })
    }

    /// Coda start, seconds from origin: the analyst pick wins, then the
    /// automatic coda pick, then a travel-time estimate from the band's
    /// velocity curve refined to the envelope peak in the first 30 s.
    fn coda_start_sec(
        &self,
        waveform: &CodaWaveform,
        params: &SharedBandParameters,
        observed: &EnvelopeSeries,
    ) -> f64 {
        if let Some(pick) = waveform.user_start_pick_sec {
            return pick;
        }
        if let Some(pick) = waveform.coda_start_sec {
            return pick;
        }
        let mut vr = params.velocity.evaluate(waveform.distance_km);
        if vr == 0.0 {
            vr = 1.0;
        }
        let arrival = waveform.distance_km / vr;
        peak_in_window(observed, arrival, arrival + PEAK_SEARCH_WINDOW_SEC).unwrap_or(arrival)
    }
}

/// Measure a batch in parallel. Failures are logged and dropped.
pub fn measure_amplitudes<'a, I>(
    measurer: &AmplitudeMeasurer,
    waveforms: I,
    params_for: impl Fn(&CodaWaveform) -> Option<&'a SharedBandParameters> + Sync,
) -> Vec<AmplitudeMeasurement>
where
    I: IntoParallelIterator<Item = &'a CodaWaveform>,
{
    waveforms
        .into_par_iter()
        .filter_map(|waveform| {
            let Some(params) = params_for(waveform) else {
                let err = MeasurementError::MissingBandParameters { band: waveform.band };
                trace!(waveform_id = waveform.waveform_id, %err, "skipping waveform");
                return None;
            };
            match measurer.measure(waveform, params) {
                Ok(measurement) => Some(measurement),
                Err(MeasurementError::WindowTooShort { length_sec, min_sec }) => {
                    debug!(
                        waveform_id = waveform.waveform_id,
                        length_sec, min_sec, "coda window too short, skipping"
                    );
                    None
                }
                Err(err) => {
                    warn!(waveform_id = waveform.waveform_id, %err, "skipping waveform");
                    None
                }
            }
        })
        .collect()
}

/// Linear resample to `rate`, preserving the start time.
fn resample(series: &EnvelopeSeries, rate: f64) -> EnvelopeSeries {
    if series.samples.len() < 2 || (series.sample_rate - rate).abs() < 1e-9 {
        return series.clone();
    }
    let duration = (series.samples.len() - 1) as f64 / series.sample_rate;
    let n_out = (duration * rate).floor() as usize + 1;
    let samples = (0..n_out)
        .map(|i| {
            let pos = i as f64 / rate * series.sample_rate;
            let j = pos.floor() as usize;
            if j + 1 >= series.samples.len() {
                series.samples[series.samples.len() - 1]
            } else {
                let frac = pos - j as f64;
                series.samples[j] * (1.0 - frac) + series.samples[j + 1] * frac
            }
        })
        .collect();
    EnvelopeSeries {
        samples,
        sample_rate: rate,
        start_sec: series.start_sec,
    }
}

/// Cut both series to `[start_sec, end_sec]`, then to their exact common
/// overlap so the returned slices have equal sample counts. `None` when
/// the windows do not overlap either series.
fn cut_common(
    a: &EnvelopeSeries,
    b: &EnvelopeSeries,
    start_sec: f64,
    end_sec: f64,
) -> Option<(Vec<f64>, Vec<f64>)> {
    let start = start_sec.max(a.start_sec).max(b.start_sec);
    let end = end_sec.min(a.end_sec()).min(b.end_sec());
    if start >= end {
        return None;
    }
    let a_begin = ((start - a.start_sec) * a.sample_rate).round() as usize;
    let b_begin = ((start - b.start_sec) * b.sample_rate).round() as usize;
    let a_count = a.samples.len().saturating_sub(a_begin);
    let b_count = b.samples.len().saturating_sub(b_begin);
    let window = (((end - start) * a.sample_rate).round() as usize + 1)
        .min(a_count)
        .min(b_count);
    if window == 0 {
        return None;
    }
    Some((
        a.samples[a_begin..a_begin + window].to_vec(),
        b.samples[b_begin..b_begin + window].to_vec(),
    ))
}

/// Time of the envelope maximum within `[from_sec, to_sec]`, seconds from
/// origin.
fn peak_in_window(series: &EnvelopeSeries, from_sec: f64, to_sec: f64) -> Option<f64> {
    let begin = ((from_sec - series.start_sec) * series.sample_rate).ceil().max(0.0) as usize;
    let end = (((to_sec - series.start_sec) * series.sample_rate).floor() as usize)
        .min(series.samples.len().saturating_sub(1));
    if begin > end || begin >= series.samples.len() {
        return None;
    }
    let (offset, _) = series.samples[begin..=end]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))?;
    Some(series.start_sec + (begin + offset) as f64 / series.sample_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DistanceCurveParams;
    use crate::types::FrequencyBand;

    fn band_params(band: FrequencyBand) -> SharedBandParameters {
        SharedBandParameters {
            band,
            velocity: DistanceCurveParams { p0: 3.5, p1: 0.0, p2: 1.0 },
            beta: DistanceCurveParams { p0: -0.02, p1: 0.0, p2: 1.0 },
            gamma: DistanceCurveParams { p0: 0.8, p1: 0.0, p2: 1.0 },
            s1: 0.5,
            s2: 0.7,
            xc: 100.0,
            xt: 2.0,
            q: 200.0,
            min_length_sec: 10.0,
            max_length_sec: 400.0,
            measurement_time_sec: 0.0,
        }
    }

    fn series(start_sec: f64, samples: Vec<f64>) -> EnvelopeSeries {
        EnvelopeSeries {
            samples,
            sample_rate: 1.0,
            start_sec,
        }
    }

    fn waveform(offset: f64) -> CodaWaveform {
        let band = FrequencyBand::new(1.0, 2.0);
        let params = band_params(band);
        let n = 200;
        let synth: Vec<f64> = (0..n)
            .map(|j| {
                point_at_time_and_distance(&params, (j + 1) as f64, 300.0)
            })
            .collect();
        let obs: Vec<f64> = synth.iter().map(|s| s + offset).collect();
        CodaWaveform {
            waveform_id: 1,
            event_id: "ev1".to_string(),
            station: "STA".to_string(),
            band,
            distance_km: 300.0,
            observed: series(90.0, obs),
            synthetic: series(90.0, synth),
            user_start_pick_sec: Some(95.0),
            coda_start_sec: None,
            f_pick_sec: Some(250.0),
            site_term: Some(0.4),
        }
    }

    #[test]
    fn raw_amplitude_is_median_offset() {
        let wf = waveform(2.5);
        let measurer = AmplitudeMeasurer::default();
        let m = measurer.measure(&wf, &band_params(wf.band)).unwrap();
        assert!((m.raw_amplitude - 2.5).abs() < 1e-9);
        // Identical shapes after the shift, so the residual is zero.
        assert!(m.fit_residual < 1e-9);
        assert_eq!(m.start_cut_sec, 95.0);
        assert_eq!(m.end_cut_sec, 250.0);
    }

    #[test]
    fn path_correction_is_added_on_top_of_raw() {
        let wf = waveform(1.0);
        let params = band_params(wf.band);
        let measurer = AmplitudeMeasurer::default();
        let m = measurer.measure(&wf, &params).unwrap();
        let esh = path_correction(1.0, 2.0, &params, 300.0, 3.5);
        assert!(esh > 0.0);
        assert!((m.path_corrected - (m.raw_amplitude + esh)).abs() < 1e-12);
        assert!((m.path_and_site_corrected - (m.path_corrected + 0.4)).abs() < 1e-12);
    }

    #[test]
    fn non_positive_site_term_zeroes_corrected_amplitude() {
        let mut wf = waveform(1.0);
        wf.site_term = Some(-0.2);
        let measurer = AmplitudeMeasurer::default();
        let m = measurer.measure(&wf, &band_params(wf.band)).unwrap();
        assert_eq!(m.path_and_site_corrected, 0.0);
        assert!(m.path_corrected != 0.0);
    }

    #[test]
    fn missing_end_pick_is_an_error() {
        let mut wf = waveform(1.0);
        wf.f_pick_sec = None;
        let measurer = AmplitudeMeasurer::default();
        assert!(matches!(
            measurer.measure(&wf, &band_params(wf.band)),
            Err(MeasurementError::MissingEndPick { .. })
        ));
    }

    #[test]
    fn short_window_is_rejected() {
        let mut wf = waveform(1.0);
        wf.f_pick_sec = Some(99.0);
        let measurer = AmplitudeMeasurer::default();
        assert!(matches!(
            measurer.measure(&wf, &band_params(wf.band)),
            Err(MeasurementError::WindowTooShort { .. })
        ));
    }

    #[test]
    fn start_after_end_is_rejected() {
        let mut wf = waveform(1.0);
        wf.user_start_pick_sec = Some(260.0);
        let measurer = AmplitudeMeasurer::default();
        assert!(matches!(
            measurer.measure(&wf, &band_params(wf.band)),
            Err(MeasurementError::WindowOutOfBounds { .. })
        ));
    }

    #[test]
    fn velocity_fallback_start_snaps_to_envelope_peak() {
        let mut wf = waveform(0.0);
        wf.user_start_pick_sec = None;
        // Distance 300 km over 3.5 km/s puts the arrival near 85.7 s; put
        // a spike shortly after it.
        let mut obs = wf.observed.samples.clone();
        obs[10] += 50.0;
        wf.observed = series(90.0, obs);
        let measurer = AmplitudeMeasurer::default();
        let m = measurer.measure(&wf, &band_params(wf.band)).unwrap();
        assert!((m.start_cut_sec - 100.0).abs() < 1.0, "start {}", m.start_cut_sec);
    }

    #[test]
    fn esh_correction_is_continuous_across_regimes() {
        let params = band_params(FrequencyBand::new(1.0, 2.0));
        let xstart = params.xc / params.xt;
        let xend = params.xc * params.xt;
        let near = log10_esh(params.s1, params.s2, params.xc, params.xt, xstart - 1e-6);
        let after = log10_esh(params.s1, params.s2, params.xc, params.xt, xstart + 1e-6);
        assert!((near - after).abs() < 1e-4);
        let before_end = log10_esh(params.s1, params.s2, params.xc, params.xt, xend - 1e-6);
        let past_end = log10_esh(params.s1, params.s2, params.xc, params.xt, xend + 1e-6);
        assert!((before_end - past_end).abs() < 1e-4);
    }

    #[test]
    fn batch_skips_failures_and_missing_bands() {
        let good = waveform(1.0);
        let mut bad = waveform(1.0);
        bad.waveform_id = 2;
        bad.f_pick_sec = None;
        let params = band_params(good.band);
        let measurer = AmplitudeMeasurer::default();
        let waveforms = vec![good, bad];
        let out = measure_amplitudes(&measurer, &waveforms, |_| Some(&params));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].waveform_id, 1);
    }
}

//! End-to-end shape calibration: per-waveform envelope fits feeding the
//! distance-curve population fits, the way a calibration run strings them
//! together.

use std::collections::BTreeMap;

use coda_spectra::config::DistanceCurveParams;
use coda_spectra::shape::{fit_all_gamma, fit_all_velocity};
use coda_spectra::{fit_envelope, FrequencyBand, ShapeConstraints, SharedBandParameters};

/// Synthetic coda envelope for the decay model at 1 Hz sampling.
fn envelope(intercept: f64, gamma: f64, beta: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|j| {
            let t = j as f64 + 1.0;
            intercept - gamma * t.log10() + beta * t
        })
        .collect()
}

fn blank_band_params(band: FrequencyBand) -> SharedBandParameters {
    let zero = DistanceCurveParams {
        p0: 0.0,
        p1: 0.0,
        p2: 0.0,
    };
    SharedBandParameters {
        band,
        velocity: zero,
        beta: zero,
        gamma: zero,
        s1: 0.0,
        s2: 1.0,
        xc: 100.0,
        xt: 2.0,
        q: 200.0,
        min_length_sec: 30.0,
        max_length_sec: 600.0,
        measurement_time_sec: 0.0,
    }
}

#[test]
fn envelope_fits_feed_gamma_distance_calibration() {
    let constraints = ShapeConstraints::default();
    let band = FrequencyBand::new(1.0, 2.0);

    // Gamma falls off with distance along a known hyperbola; each
    // "waveform" is a clean envelope generated with that gamma.
    let truth = DistanceCurveParams {
        p0: 0.7,
        p1: -60.0,
        p2: 80.0,
    };
    let distances: Vec<f64> = (1..=25).map(|i| i as f64 * 50.0).collect();

    let mut pairs = Vec::new();
    for (i, &distance) in distances.iter().enumerate() {
        let gamma = truth.evaluate(distance);
        let samples = envelope(7.5, gamma, -0.01, 400);
        let fit = fit_envelope(&samples, 1.0, &constraints, false, 100 + i as u64);
        assert!(
            (fit.gamma - gamma).abs() < 0.1,
            "waveform at {} km: gamma {} vs {}",
            distance,
            fit.gamma,
            gamma
        );
        pairs.push((fit.gamma, distance));
    }

    let mut pairs_by_band = BTreeMap::new();
    pairs_by_band.insert(band, pairs);
    let mut params = BTreeMap::new();
    params.insert(band, blank_band_params(band));

    let out = fit_all_gamma(&pairs_by_band, params, &constraints, 9);
    let fitted = &out[&band].gamma;
    assert!(!fitted.is_unfittable());
    for &d in &[100.0, 400.0, 900.0] {
        assert!(
            (fitted.evaluate(d) - truth.evaluate(d)).abs() < 0.1,
            "gamma curve at {} km: {} vs {}",
            d,
            fitted.evaluate(d),
            truth.evaluate(d)
        );
    }
}

#[test]
fn velocity_calibration_recovers_curve_across_bands() {
    let constraints = ShapeConstraints::default();
    let low_band = FrequencyBand::new(1.0, 2.0);
    let high_band = FrequencyBand::new(4.0, 8.0);

    let truth = DistanceCurveParams {
        p0: 3.4,
        p1: 120.0,
        p2: 60.0,
    };
    let distances: Vec<f64> = (1..=30).map(|i| i as f64 * 40.0).collect();
    let pairs: Vec<(f64, f64)> = distances
        .iter()
        .map(|&d| (truth.evaluate(d), d))
        .collect();

    let mut pairs_by_band = BTreeMap::new();
    pairs_by_band.insert(low_band, pairs.clone());
    pairs_by_band.insert(high_band, pairs);
    let mut params = BTreeMap::new();
    params.insert(low_band, blank_band_params(low_band));
    params.insert(high_band, blank_band_params(high_band));

    let out = fit_all_velocity(&pairs_by_band, params, &constraints, 4);
    for band in [low_band, high_band] {
        let fitted = &out[&band].velocity;
        assert!(!fitted.is_unfittable(), "{} unfittable", band);
        for &d in &[80.0, 500.0, 1100.0] {
            assert!(
                (fitted.evaluate(d) - truth.evaluate(d)).abs() < 0.1,
                "{} at {} km: {} vs {}",
                band,
                d,
                fitted.evaluate(d),
                truth.evaluate(d)
            );
        }
    }
}

#[test]
fn auto_picked_envelope_matches_full_window_fit_on_clean_data() {
    let constraints = ShapeConstraints::default();
    let samples = envelope(6.5, 1.0, -0.012, 500);
    let full = fit_envelope(&samples, 1.0, &constraints, false, 21);
    let picked = fit_envelope(&samples, 1.0, &constraints, true, 21);
    assert!((full.gamma - picked.gamma).abs() < 0.1);
    assert!((full.beta - picked.beta).abs() < 0.005);
    assert!(picked.end_time_sec > 350.0, "end {}", picked.end_time_sec);
}

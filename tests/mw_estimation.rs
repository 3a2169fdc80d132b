//! End-to-end Mw/apparent-stress estimation against spectra generated from
//! the MDAC model itself.

use std::collections::BTreeMap;

use coda_spectra::source::measure_mws;
use coda_spectra::{
    BandSummary, BandWeighting, EstimatorConfig, FrequencyBand, MdacFi,
    MomentStressEstimator, MwEstimate, Phase, SourceSpectrumModel,
};

const BAND_EDGES: [f64; 11] = [0.5, 0.7, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0, 8.0, 12.0, 16.0];

/// Band summaries sampled from the model spectrum at a fixed stress.
fn summaries(mw: f64, stress_mpa: f64) -> BTreeMap<FrequencyBand, BandSummary> {
    let model = SourceSpectrumModel::new(MdacFi {
        sigma: stress_mpa,
        psi: 0.0,
        ..MdacFi::default()
    });
    BAND_EDGES
        .windows(2)
        .map(|pair| {
            let band = FrequencyBand::new(pair[0], pair[1]);
            (
                band,
                BandSummary {
                    mean_amplitude: model.log_amp_dyne(mw, band.center_hz(), Phase::Lg),
                    std_dev: 0.08,
                    count: 6,
                },
            )
        })
        .collect()
}

fn estimator() -> MomentStressEstimator {
    MomentStressEstimator::new(EstimatorConfig::default(), MdacFi::default(), Phase::Lg, 23)
}

#[test]
fn recovers_source_parameters_across_magnitudes() {
    let est = estimator();
    for (mw, stress) in [(3.0, 0.3), (4.5, 1.0), (5.5, 3.0)] {
        let fit = est
            .fit_mw("ev", &summaries(mw, stress), BandWeighting::FavorLowFrequencies)
            .expect("fit");
        assert!((fit.mw - mw).abs() < 0.1, "mw {} vs {}", fit.mw, mw);
        assert!(
            fit.apparent_stress_mpa > stress / 2.0 && fit.apparent_stress_mpa < stress * 2.0,
            "stress {} vs {}",
            fit.apparent_stress_mpa,
            stress
        );
        assert!(fit.misfit < 0.02, "misfit {}", fit.misfit);
    }
}

#[test]
fn estimate_is_internally_consistent() {
    let est = estimator();
    let fit = est
        .fit_mw("ev", &summaries(4.2, 1.0), BandWeighting::FavorLowFrequencies)
        .expect("fit");

    // Corner frequency agrees with the stress/moment conversion.
    let model = SourceSpectrumModel::new(MdacFi {
        sigma: fit.apparent_stress_mpa,
        psi: 0.0,
        ..MdacFi::default()
    });
    let corner = model.corner_frequency_hz(fit.mw);
    assert!(
        (fit.corner_frequency_hz - corner).abs() < 1e-9,
        "corner {} vs {}",
        fit.corner_frequency_hz,
        corner
    );

    // Bounds bracket the point estimate, 2-sigma outside 1-sigma.
    assert!(fit.mw_1_min <= fit.mw && fit.mw <= fit.mw_1_max);
    assert!(fit.mw_2_min <= fit.mw_1_min && fit.mw_1_max <= fit.mw_2_max);

    // Clean synthetic data should not trip the quality flag.
    assert!(!fit.likely_poorly_constrained);

    // Energy output ties back to the model energy at the fit.
    let energy = fit.energy.expect("energy");
    assert!(
        (energy.log_total_energy - energy.log_energy_mdac).abs() < 0.5,
        "obs {} vs mdac {}",
        energy.log_total_energy,
        energy.log_energy_mdac
    );
    assert!((energy.me - (energy.log_total_energy / 1.5 - 3.2)).abs() < 1e-12);
}

#[test]
fn batch_estimation_runs_events_in_parallel() {
    let est = estimator();
    let mut events = BTreeMap::new();
    events.insert("small".to_string(), summaries(3.2, 0.5));
    events.insert("medium".to_string(), summaries(4.4, 1.0));
    events.insert("large".to_string(), summaries(5.6, 2.0));
    let fits = measure_mws(&est, &events, |_| BandWeighting::FavorLowFrequencies);
    assert_eq!(fits.len(), 3);
    let by_id: BTreeMap<&str, &MwEstimate> =
        fits.iter().map(|f| (f.event_id.as_str(), f)).collect();
    assert!(by_id["small"].mw < by_id["medium"].mw);
    assert!(by_id["medium"].mw < by_id["large"].mw);
}

#[test]
fn estimates_serialize_for_downstream_consumers() {
    let est = estimator();
    let fit = est
        .fit_mw("ev", &summaries(4.0, 1.0), BandWeighting::FavorLowFrequencies)
        .expect("fit");
    let json = serde_json::to_string(&fit).expect("serialize");
    let back: MwEstimate = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.event_id, fit.event_id);
    assert_eq!(back.mw, fit.mw);
    assert_eq!(back.iterations, fit.iterations);
}

//! Walter-Taylor MDAC2 source spectrum.
//!
//! Moment and Distance Amplitude Corrections, revision 2 (Walter and
//! Taylor, 2002). The model ties seismic moment, apparent stress, and
//! corner frequency together through the constant `K`, and predicts the
//! log moment-rate spectrum used both as the fitting target for coda
//! amplitudes and as the reference model in the ratio inversions.

use crate::config::{MdacFi, MdacPs};
use crate::constants::{DYNE_CM_TO_NEWTON_M, LOG10_OF_E, MPA_TO_PA};
use crate::types::Phase;

/// `log10(M0) = 1.5*Mw + 9.1`, M0 in N-m.
pub fn mw_to_log_m0(mw: f64) -> f64 {
    1.5 * mw + 9.1
}

pub fn mw_to_m0(mw: f64) -> f64 {
    10f64.powf(mw_to_log_m0(mw))
}

pub fn log_m0_to_mw(log_m0: f64) -> f64 {
    (log_m0 - 9.1) / 1.5
}

/// Moment in N-m under the dyne-cm measurement convention,
/// `1e-7 * 10^(1.5*(Mw + 10.73))`. Coda amplitudes are measured in dyne-cm
/// units, so spectra compared against them go through this instead of
/// [`mw_to_m0`].
pub fn mw_in_dyne(mw: f64) -> f64 {
    DYNE_CM_TO_NEWTON_M * 10f64.powf(1.5 * (mw + 10.73))
}

/// MDAC2 spectrum for one set of frequency-independent parameters.
#[derive(Debug, Clone)]
pub struct SourceSpectrumModel {
    fi: MdacFi,
    k: f64,
}

impl SourceSpectrumModel {
    pub fn new(fi: MdacFi) -> Self {
        let k = calculate_k(&fi);
        Self { fi, k }
    }

    /// Walter-Taylor `K`, relating stress, moment, and corner frequency.
    pub fn k(&self) -> f64 {
        self.k
    }

    pub fn fi(&self) -> &MdacFi {
        &self.fi
    }

    /// Apparent stress at moment `m0`, Pa: `sigma * (M0/M0ref)^psi`.
    fn apparent_stress_pa(&self, m0: f64) -> f64 {
        MPA_TO_PA * self.fi.sigma * (m0 / self.fi.m0_ref).powf(self.fi.psi)
    }

    /// Shear angular corner frequency `wcs = (K*sigmaA/M0)^(1/3)` for the
    /// model's own stress scaling; P phases scale it by zeta.
    pub fn angular_corner(&self, m0: f64, phase: Phase) -> f64 {
        let wcs = (self.k * self.apparent_stress_pa(m0) / m0).powf(1.0 / 3.0);
        if phase.is_p() {
            self.fi.zeta * wcs
        } else {
            wcs
        }
    }

    /// S-wave corner frequency in Hz for an event of magnitude `mw`.
    pub fn corner_frequency_hz(&self, mw: f64) -> f64 {
        self.angular_corner(mw_to_m0(mw), Phase::Lg) / (2.0 * std::f64::consts::PI)
    }

    /// log10 moment-rate spectrum at `freq_hz` under the dyne-cm
    /// convention, directly comparable to measured coda amplitudes.
    pub fn log_amp_dyne(&self, mw: f64, freq_hz: f64, phase: Phase) -> f64 {
        let m0 = mw_in_dyne(mw);
        let wc = self.angular_corner(m0, phase);
        let w = 2.0 * std::f64::consts::PI * freq_hz;
        let wwc = w / wc;
        (m0 / (1.0 + wwc * wwc)).log10() + 7.0
    }

    /// Full source spectrum `log10(F*M0) - log10(1 + (w/wc)^2)` with the
    /// Aki-Richards excitation factor `F` for the phase.
    pub fn log_spectrum(&self, mw: f64, freq_hz: f64, phase: Phase) -> f64 {
        let m0 = mw_to_m0(mw);
        let wc = self.angular_corner(m0, phase);
        let (rad_pat, cs5, cr) = if phase.is_p() {
            (self.fi.rad_pat_p, self.fi.alpha_s.powi(5), self.fi.alpha_r)
        } else {
            (self.fi.rad_pat_s, self.fi.beta_s.powi(5), self.fi.beta_r)
        };
        let f = rad_pat
            / (4.0
                * std::f64::consts::PI
                * (self.fi.rho_s * self.fi.rho_r * cs5 * cr).sqrt());
        let w = 2.0 * std::f64::consts::PI * freq_hz;
        let wwc = w / wc;
        (f * m0).log10() - (1.0 + wwc * wwc).log10()
    }

    /// Apparent stress in MPa implied by a moment (N-m) and corner
    /// frequency (Hz): `sigma = (2*pi*fc)^3 * M0 / K`.
    pub fn apparent_stress_from_m0_fc(&self, m0: f64, fc_hz: f64) -> f64 {
        let wfc3 = (2.0 * std::f64::consts::PI * fc_hz).powi(3);
        wfc3 * m0 / self.k / MPA_TO_PA
    }

    /// Inverse of [`Self::apparent_stress_from_m0_fc`].
    pub fn corner_freq_from_stress_m0(&self, m0: f64, stress_mpa: f64) -> f64 {
        ((stress_mpa * MPA_TO_PA * self.k) / m0).powf(1.0 / 3.0)
            / (2.0 * std::f64::consts::PI)
    }

    /// Radiated energy (J) the model predicts at (M0, stress):
    /// `M0 * sigma / (rho_s * beta_s^2)`.
    pub fn energy(&self, m0: f64, stress_mpa: f64) -> f64 {
        m0 * stress_mpa * MPA_TO_PA / (self.fi.rho_s * self.fi.beta_s.powi(2))
    }

    /// Source spectrum with path terms applied: geometric spreading at
    /// the phase's critical distance plus frequency-dependent attenuation
    /// `Q(f) = q0 * f^gamma0` over the travel path.
    pub fn log_path_corrected_spectrum(
        &self,
        mw: f64,
        freq_hz: f64,
        phase: Phase,
        distance_km: f64,
        ps: &MdacPs,
    ) -> f64 {
        let distance_m = distance_km * 1000.0;
        let u0_m_s = ps.u0 * 1000.0;
        let spreading = Self::log_geometric_spreading(distance_m, ps.dist_crit, ps.eta);
        let q_loss = distance_m * std::f64::consts::PI * LOG10_OF_E / (ps.q0 * u0_m_s)
            * freq_hz.powf(1.0 - ps.gamma0);
        self.log_spectrum(mw, freq_hz, phase) + spreading - q_loss
    }

    /// log10 geometric spreading `G(r)`: `1/r` inside the critical
    /// distance, `1/distcrit * (distcrit/r)^eta` beyond it. Distances in
    /// meters.
    pub fn log_geometric_spreading(distance_m: f64, dist_crit_m: f64, eta: f64) -> f64 {
        let g = if distance_m < dist_crit_m {
            1.0 / distance_m
        } else {
            (dist_crit_m / distance_m).powf(eta) / dist_crit_m
        };
        g.log10()
    }
}

/// `K = 16*pi / (betas^2 * (radpatP^2*zeta^3/alphas^5 + radpatS^2/betas^5))`.
fn calculate_k(fi: &MdacFi) -> f64 {
    let z3 = fi.zeta.powi(3);
    let a5 = fi.alpha_s.powi(5);
    let b5 = fi.beta_s.powi(5);
    let b2 = fi.beta_s.powi(2);
    let p_term = fi.rad_pat_p * fi.rad_pat_p * z3 / a5;
    let s_term = fi.rad_pat_s * fi.rad_pat_s / b5;
    16.0 * std::f64::consts::PI / (b2 * (p_term + s_term))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moment_magnitude_conversions_round_trip() {
        for mw in [-1.0, 0.0, 3.3, 5.0, 7.8] {
            let log_m0 = mw_to_log_m0(mw);
            assert!((log_m0_to_mw(log_m0) - mw).abs() < 1e-12);
        }
        // Mw 5.0 is 3.98e16 N-m.
        assert!((mw_to_m0(5.0) / 3.98e16 - 1.0).abs() < 0.01);
    }

    #[test]
    fn stress_corner_conversions_round_trip() {
        let model = SourceSpectrumModel::new(MdacFi::default());
        let m0 = mw_to_m0(4.5);
        for stress in [0.01, 0.3, 10.0] {
            let fc = model.corner_freq_from_stress_m0(m0, stress);
            let back = model.apparent_stress_from_m0_fc(m0, fc);
            assert!((back / stress - 1.0).abs() < 1e-10, "{} vs {}", back, stress);
        }
    }

    #[test]
    fn corner_frequency_rises_with_stress_falls_with_moment() {
        let model = SourceSpectrumModel::new(MdacFi::default());
        let fc_small = model.corner_freq_from_stress_m0(mw_to_m0(3.0), 1.0);
        let fc_large = model.corner_freq_from_stress_m0(mw_to_m0(6.0), 1.0);
        assert!(fc_small > fc_large);
        let fc_weak = model.corner_freq_from_stress_m0(mw_to_m0(4.0), 0.1);
        let fc_strong = model.corner_freq_from_stress_m0(mw_to_m0(4.0), 10.0);
        assert!(fc_strong > fc_weak);
    }

    #[test]
    fn spectrum_is_flat_below_corner_and_rolls_off_above() {
        let model = SourceSpectrumModel::new(MdacFi::default());
        let mw = 4.0;
        let fc = model.corner_frequency_hz(mw);
        let low = model.log_amp_dyne(mw, fc / 100.0, Phase::Lg);
        let lower = model.log_amp_dyne(mw, fc / 200.0, Phase::Lg);
        assert!((low - lower).abs() < 0.01);
        // A decade above the corner the omega-squared model is ~2 decades
        // down.
        let high = model.log_amp_dyne(mw, fc * 10.0, Phase::Lg);
        assert!((lower - high - 2.0).abs() < 0.05, "rolloff {}", lower - high);
    }

    #[test]
    fn p_phase_corner_is_scaled_by_zeta() {
        let fi = MdacFi::default();
        let model = SourceSpectrumModel::new(fi);
        let m0 = mw_to_m0(4.0);
        let s_corner = model.angular_corner(m0, Phase::Lg);
        let p_corner = model.angular_corner(m0, Phase::Pn);
        assert!((p_corner / s_corner - model.fi().zeta).abs() < 1e-12);
    }

    #[test]
    fn path_correction_attenuates_with_distance_and_frequency() {
        let model = SourceSpectrumModel::new(MdacFi::default());
        let ps = MdacPs::default();
        let near = model.log_path_corrected_spectrum(4.0, 2.0, Phase::Lg, 100.0, &ps);
        let far = model.log_path_corrected_spectrum(4.0, 2.0, Phase::Lg, 800.0, &ps);
        assert!(near > far);
        let low = model.log_path_corrected_spectrum(4.0, 0.5, Phase::Lg, 400.0, &ps)
            - model.log_spectrum(4.0, 0.5, Phase::Lg);
        let high = model.log_path_corrected_spectrum(4.0, 8.0, Phase::Lg, 400.0, &ps)
            - model.log_spectrum(4.0, 8.0, Phase::Lg);
        assert!(low > high, "Q loss should grow with frequency");
    }

    #[test]
    fn geometric_spreading_is_continuous_at_critical_distance() {
        let dist_crit = 1.0e5;
        let inside = SourceSpectrumModel::log_geometric_spreading(dist_crit - 1.0, dist_crit, 0.5);
        let outside = SourceSpectrumModel::log_geometric_spreading(dist_crit + 1.0, dist_crit, 0.5);
        assert!((inside - outside).abs() < 1e-4);
    }
}

//! CMOD_IFR2 geophysical model function.
//!
//! The IFREMER C-band model (Quilfen and Bentamy), fitted as Legendre and
//! Chebyshev expansions in incidence angle and wind speed. Unlike the
//! CMOD4/CMOD5 family the directional term enters linearly, without the
//! 1.6 exponent.

use crate::core::invert::{invert_iterative, ForwardModel, InversionParams};
use crate::grid::MaskedGrid;
use crate::types::{GmfModel, WindResult};

const C: [f64; 26] = [
    0.0, -2.437597, -1.5670307, 0.3708242, -0.040590, 0.40464678, 0.188397,
    -0.027262, 0.064650, 0.054500, 0.086350, 0.055100, -0.058450, -0.096100,
    0.412754, 0.121785, -0.024333, 0.072163, -0.062954, 0.015958, -0.069514,
    -0.062945, 0.035538, 0.023049, 0.074654, 0.014713,
];

/// CMOD_IFR2 geophysical model function
#[derive(Debug, Clone, Copy, Default)]
pub struct CmodIfr2;

impl CmodIfr2 {
    pub fn new() -> Self {
        Self
    }

    /// Retrieves wind speed from observed backscatter, see
    /// [`invert_iterative`].
    pub fn inverse(
        &self,
        sigma0: &MaskedGrid<f64>,
        phi: &MaskedGrid<f64>,
        incidence: &MaskedGrid<f64>,
        params: &InversionParams,
    ) -> WindResult<MaskedGrid<f64>> {
        invert_iterative(self, sigma0, phi, incidence, params)
    }
}

impl ForwardModel for CmodIfr2 {
    fn model(&self) -> GmfModel {
        GmfModel::CmodIfr2
    }

    fn sigma0_cell(&self, wind_speed: f64, phi: f64, incidence: f64) -> f64 {
        let v = wind_speed;
        let x = (incidence - 36.0) / 19.0;
        let p1 = x;
        let p2 = (3.0 * x * x - 1.0) / 2.0;
        let p3 = x * (5.0 * x * x - 3.0) / 2.0;

        let v1 = (2.0 * v - 28.0) / 22.0;
        let v2 = 2.0 * v1 * v1 - 1.0;
        let v3 = v2 * v1;

        let y = (2.0 * incidence - 76.0) / 40.0;
        let q1 = y;
        let q2 = 2.0 * y * y - 1.0;

        let alpha = C[1] + C[2] * p1 + C[3] * p2 + C[4] * p3;
        let beta = C[5] + C[6] * p1 + C[7] * p2;

        let b0 = alpha + beta * v.sqrt();
        let b1 = C[8] + C[9] * v1 + (C[10] + C[11] * v1) * q1 + (C[12] + C[13] * v1) * q2;
        let b2 = C[14]
            + C[15] * q1
            + C[16] * q2
            + (C[17] + C[18] * q1 + C[19] * q2) * v1
            + (C[20] + C[21] * q1 + C[22] * q2) * v2
            + (C[23] + C[24] * q1 + C[25] * q2) * v3;

        10f64.powf(b0) * (1.0 + b1 * phi.cos() + b2.tanh() * (2.0 * phi).cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use ndarray::array;

    #[test]
    fn test_forward_reference_values() {
        let model = CmodIfr2::new();
        assert_relative_eq!(
            model.sigma0_cell(10.0, 0.0, 35.0),
            0.0835135976095808,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            model.sigma0_cell(7.0, 0.8, 25.0),
            0.17076734141035832,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            model.sigma0_cell(15.0, 2.4, 45.0),
            0.04764623336828127,
            max_relative = 1e-12
        );
        assert_relative_eq!(
            model.sigma0_cell(5.0, 1.2, 30.0),
            0.03986833866269175,
            max_relative = 1e-12
        );
    }

    #[test]
    fn test_negative_trial_speed_is_undefined() {
        assert!(CmodIfr2::new().sigma0_cell(-1.0, 0.0, 35.0).is_nan());
    }

    #[test]
    fn test_round_trip_recovers_wind() {
        let model = CmodIfr2::new();
        let params = InversionParams::default();
        for v_true in [4.0, 9.5, 13.25] {
            let sigma0 = MaskedGrid::new(array![[model.sigma0_cell(v_true, 0.7, 38.0)]]);
            let phi = MaskedGrid::new(array![[0.7]]);
            let inc = MaskedGrid::new(array![[38.0]]);
            let wind = model.inverse(&sigma0, &phi, &inc, &params).unwrap();
            assert_abs_diff_eq!(wind.get(0, 0).unwrap(), v_true, epsilon = 0.012);
        }
    }
}

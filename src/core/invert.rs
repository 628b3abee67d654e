//! Iterative wind-speed inversion for closed-form CMOD models.
//!
//! The CMOD family gives backscatter as a function of wind speed, so wind
//! retrieval runs the model in reverse: a step-halving search walks the wind
//! speed up or down until the predicted backscatter brackets the observation.
//! Backscatter rises monotonically with wind speed at fixed geometry, which
//! is what makes the bisection-style search valid.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::grid::MaskedGrid;
use crate::types::{GmfModel, WindError, WindResult};

use super::{Cmod4, Cmod5, CmodIfr2};

/// A geophysical model function with a closed-form backscatter kernel.
///
/// Implementors supply the per-cell forward calculation; grid-level forward
/// simulation and the inversion entry points are provided on top of it.
pub trait ForwardModel {
    /// Which member of the CMOD family this is.
    fn model(&self) -> GmfModel;

    /// Starting wind speed in m/s for the step-halving search.
    fn first_guess(&self) -> f64 {
        10.0
    }

    /// Predicted backscatter (linear units) for a single cell.
    ///
    /// `wind_speed` is in m/s, `phi` is the wind direction relative to the
    /// radar look direction in radians, `incidence` is in degrees.
    fn sigma0_cell(&self, wind_speed: f64, phi: f64, incidence: f64) -> f64;

    /// Simulates backscatter over full grids.
    ///
    /// The output mask is the union of the input masks; cells with
    /// non-finite inputs or a non-finite model result are masked as well.
    fn forward(
        &self,
        wind_speed: &MaskedGrid<f64>,
        phi: &MaskedGrid<f64>,
        incidence: &MaskedGrid<f64>,
    ) -> WindResult<MaskedGrid<f64>> {
        check_shapes(wind_speed.dim(), phi.dim(), incidence.dim())?;

        let mut mask = &(wind_speed.mask() | phi.mask()) | incidence.mask();
        let mut data = Array2::zeros(wind_speed.data().raw_dim());
        Zip::from(&mut data)
            .and(&mut mask)
            .and(wind_speed.data())
            .and(phi.data())
            .and(incidence.data())
            .for_each(|out, m, &w, &p, &t| {
                if !*m {
                    if w.is_finite() && p.is_finite() && t.is_finite() {
                        let s = self.sigma0_cell(w, p, t);
                        if s.is_finite() {
                            *out = s;
                        } else {
                            *m = true;
                        }
                    } else {
                        *m = true;
                    }
                }
            });

        MaskedGrid::with_mask(data, mask)
    }
}

/// Parameters for the step-halving inversion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InversionParams {
    /// Number of step-halving refinements
    pub iterations: usize,
    /// Initial wind-speed step in m/s
    pub initial_step: f64,
}

impl Default for InversionParams {
    fn default() -> Self {
        Self {
            iterations: 10,     // brackets the solution to ~0.02 m/s
            initial_step: 10.0, // m/s
        }
    }
}

/// Retrieves wind speed from observed backscatter with one of the
/// closed-form CMOD models.
///
/// `sigma0` is observed backscatter in linear units, `phi` the wind
/// direction relative to the radar look direction in radians, `incidence`
/// the incidence angle in degrees. All three grids must share one shape.
///
/// Each refinement halves the wind-speed step and moves against the sign of
/// `predicted - observed`, so after `iterations` rounds every retrieved
/// value lies within `initial_step / 2^(iterations-1)` of the model
/// inverse. Cells that are masked in any input, carry zero or non-finite
/// backscatter, or have a non-finite angle are masked in the output.
pub fn invert_iterative<M>(
    model: &M,
    sigma0: &MaskedGrid<f64>,
    phi: &MaskedGrid<f64>,
    incidence: &MaskedGrid<f64>,
    params: &InversionParams,
) -> WindResult<MaskedGrid<f64>>
where
    M: ForwardModel + Sync,
{
    check_shapes(sigma0.dim(), phi.dim(), incidence.dim())?;
    if params.iterations == 0 {
        return Err(WindError::InvalidParameter(
            "inversion needs at least one iteration".to_string(),
        ));
    }
    if !(params.initial_step.is_finite() && params.initial_step > 0.0) {
        return Err(WindError::InvalidParameter(format!(
            "initial step must be positive and finite, got {}",
            params.initial_step
        )));
    }

    let (rows, cols) = sigma0.dim();
    let total_pixels = rows * cols;

    // Cells with no measurement (zero backscatter is the nodata fill) and
    // cells with non-finite inputs never enter the search.
    let mut mask = &(sigma0.mask() | phi.mask()) | incidence.mask();
    Zip::from(&mut mask)
        .and(sigma0.data())
        .and(phi.data())
        .and(incidence.data())
        .for_each(|m, &s, &p, &t| {
            if s == 0.0 || !s.is_finite() || !p.is_finite() || !t.is_finite() {
                *m = true;
            }
        });

    let valid_pixels = mask.iter().filter(|&&m| !m).count();
    log::info!(
        "Wind inversion with {}: {}x{} grid, {} valid pixels, {} iterations",
        model.model(),
        rows,
        cols,
        valid_pixels,
        params.iterations
    );

    if valid_pixels == 0 {
        log::warn!("No valid pixels to invert, returning fully masked grid");
        return Ok(MaskedGrid::fully_masked((rows, cols)));
    }

    let wind = if total_pixels > 10_000 {
        invert_cells_parallel(model, &mask, sigma0, phi, incidence, params)
    } else {
        invert_cells_sequential(model, &mask, sigma0, phi, incidence, params)
    };

    // at least one cell is unmasked here, so the range is finite
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    Zip::from(&wind).and(&mask).for_each(|&v, &m| {
        if !m {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    });
    log::info!(
        "Wind inversion with {} completed. Retrieved range: {:.2} to {:.2} m/s",
        model.model(),
        lo,
        hi
    );

    MaskedGrid::with_mask(wind, mask)
}

/// Retrieves wind speed for a model selected by tag.
///
/// CMOD7 has no closed-form kernel and is rejected here; load its lookup
/// table and call [`Cmod7::inverse`](crate::core::Cmod7::inverse) instead.
pub fn retrieve_wind_speed(
    model: GmfModel,
    sigma0: &MaskedGrid<f64>,
    phi: &MaskedGrid<f64>,
    incidence: &MaskedGrid<f64>,
    params: &InversionParams,
) -> WindResult<MaskedGrid<f64>> {
    match model {
        GmfModel::Cmod4 => invert_iterative(&Cmod4::new(), sigma0, phi, incidence, params),
        GmfModel::Cmod5 => invert_iterative(&Cmod5::new(), sigma0, phi, incidence, params),
        GmfModel::Cmod5N => invert_iterative(&Cmod5::neutral(), sigma0, phi, incidence, params),
        GmfModel::CmodIfr2 => invert_iterative(&CmodIfr2::new(), sigma0, phi, incidence, params),
        GmfModel::Cmod7 => Err(WindError::InvalidParameter(
            "CMOD7 is table-driven; load a GMF table and use Cmod7::inverse".to_string(),
        )),
    }
}

/// One step-halving search. A NaN prediction compares false against the
/// observation and walks the speed up, matching the reference behaviour.
fn solve_cell<M: ForwardModel + ?Sized>(
    model: &M,
    observed: f64,
    phi: f64,
    incidence: f64,
    params: &InversionParams,
) -> f64 {
    let mut v = model.first_guess();
    let mut step = params.initial_step;
    for _ in 0..params.iterations {
        let predicted = model.sigma0_cell(v, phi, incidence);
        if predicted - observed > 0.0 {
            v -= step;
        } else {
            v += step;
        }
        step *= 0.5;
    }
    v
}

fn invert_cells_sequential<M: ForwardModel>(
    model: &M,
    mask: &Array2<bool>,
    sigma0: &MaskedGrid<f64>,
    phi: &MaskedGrid<f64>,
    incidence: &MaskedGrid<f64>,
    params: &InversionParams,
) -> Array2<f64> {
    let mut wind = Array2::zeros(mask.raw_dim());
    Zip::from(&mut wind)
        .and(mask)
        .and(sigma0.data())
        .and(phi.data())
        .and(incidence.data())
        .for_each(|w, &m, &s, &p, &t| {
            if !m {
                *w = solve_cell(model, s, p, t, params);
            }
        });
    wind
}

/// Parallel inversion using Rayon (if available)
#[cfg(feature = "parallel")]
fn invert_cells_parallel<M: ForwardModel + Sync>(
    model: &M,
    mask: &Array2<bool>,
    sigma0: &MaskedGrid<f64>,
    phi: &MaskedGrid<f64>,
    incidence: &MaskedGrid<f64>,
    params: &InversionParams,
) -> Array2<f64> {
    use rayon::prelude::*;

    log::debug!("Inverting with parallel processing");

    let mut wind = Array2::zeros(mask.raw_dim());

    // Only unmasked cells enter the worklist
    let cells: Vec<(usize, usize)> = mask
        .indexed_iter()
        .filter(|(_, &m)| !m)
        .map(|(idx, _)| idx)
        .collect();

    let results: Vec<((usize, usize), f64)> = cells
        .into_par_iter()
        .map(|(i, j)| {
            let v = solve_cell(
                model,
                sigma0.data()[[i, j]],
                phi.data()[[i, j]],
                incidence.data()[[i, j]],
                params,
            );
            ((i, j), v)
        })
        .collect();

    for ((i, j), v) in results {
        wind[[i, j]] = v;
    }

    wind
}

#[cfg(not(feature = "parallel"))]
fn invert_cells_parallel<M: ForwardModel + Sync>(
    model: &M,
    mask: &Array2<bool>,
    sigma0: &MaskedGrid<f64>,
    phi: &MaskedGrid<f64>,
    incidence: &MaskedGrid<f64>,
    params: &InversionParams,
) -> Array2<f64> {
    // Fallback to sequential processing if the parallel feature is disabled
    invert_cells_sequential(model, mask, sigma0, phi, incidence, params)
}

pub(crate) fn check_shapes(a: (usize, usize), b: (usize, usize), c: (usize, usize)) -> WindResult<()> {
    if a != b || b != c {
        return Err(WindError::ShapeMismatch(format!(
            "input grids must share one shape, got {:?}, {:?} and {:?}",
            a, b, c
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Backscatter rising linearly with wind speed; the search must home in
    /// on observed / 0.001.
    struct LinearGmf;

    impl ForwardModel for LinearGmf {
        fn model(&self) -> GmfModel {
            GmfModel::Cmod5
        }

        fn sigma0_cell(&self, wind_speed: f64, _phi: f64, _incidence: f64) -> f64 {
            0.001 * wind_speed
        }
    }

    struct NanGmf;

    impl ForwardModel for NanGmf {
        fn model(&self) -> GmfModel {
            GmfModel::Cmod4
        }

        fn sigma0_cell(&self, _wind_speed: f64, _phi: f64, _incidence: f64) -> f64 {
            f64::NAN
        }
    }

    fn grids_1x1(sigma0: f64) -> (MaskedGrid<f64>, MaskedGrid<f64>, MaskedGrid<f64>) {
        (
            MaskedGrid::new(array![[sigma0]]),
            MaskedGrid::new(array![[0.4]]),
            MaskedGrid::new(array![[35.0]]),
        )
    }

    #[test]
    fn test_converges_on_monotonic_model() {
        let (s, p, t) = grids_1x1(0.0073);
        let wind =
            invert_iterative(&LinearGmf, &s, &p, &t, &InversionParams::default()).unwrap();
        assert_abs_diff_eq!(wind.get(0, 0).unwrap(), 7.3, epsilon = 0.02);
    }

    #[test]
    fn test_more_iterations_tighten_the_bracket() {
        let (s, p, t) = grids_1x1(0.0073);
        let params = InversionParams {
            iterations: 16,
            ..InversionParams::default()
        };
        let wind = invert_iterative(&LinearGmf, &s, &p, &t, &params).unwrap();
        assert_abs_diff_eq!(wind.get(0, 0).unwrap(), 7.3, epsilon = 5e-4);
    }

    #[test]
    fn test_zero_backscatter_is_masked() {
        let sigma0 = MaskedGrid::new(array![[0.0, 0.005]]);
        let phi = MaskedGrid::new(array![[0.4, 0.4]]);
        let inc = MaskedGrid::new(array![[35.0, 35.0]]);
        let wind =
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default())
                .unwrap();
        assert_eq!(wind.get(0, 0), None);
        assert_eq!(wind.data()[(0, 0)], 0.0);
        assert!(wind.get(0, 1).is_some());
    }

    #[test]
    fn test_fully_masked_input_short_circuits() {
        let sigma0 = MaskedGrid::<f64>::fully_masked((3, 3));
        let phi = MaskedGrid::from_elem((3, 3), 0.4);
        let inc = MaskedGrid::from_elem((3, 3), 35.0);
        let wind =
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default())
                .unwrap();
        assert_eq!(wind.valid_count(), 0);
    }

    #[test]
    fn test_input_masks_union_into_output() {
        let sigma0 =
            MaskedGrid::with_mask(array![[0.005, 0.005]], array![[false, false]]).unwrap();
        let phi = MaskedGrid::with_mask(array![[0.4, 0.4]], array![[true, false]]).unwrap();
        let inc = MaskedGrid::new(array![[35.0, 35.0]]);
        let wind =
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default())
                .unwrap();
        assert_eq!(wind.get(0, 0), None);
        assert!(wind.get(0, 1).is_some());
    }

    #[test]
    fn test_nonfinite_inputs_are_masked() {
        let sigma0 = MaskedGrid::new(array![[0.005, f64::NAN, 0.005]]);
        let phi = MaskedGrid::new(array![[0.4, 0.4, f64::INFINITY]]);
        let inc = MaskedGrid::new(array![[35.0, 35.0, 35.0]]);
        let wind =
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default())
                .unwrap();
        assert!(wind.get(0, 0).is_some());
        assert_eq!(wind.get(0, 1), None);
        assert_eq!(wind.get(0, 2), None);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let sigma0 = MaskedGrid::<f64>::from_elem((2, 2), 0.005);
        let phi = MaskedGrid::<f64>::from_elem((2, 3), 0.4);
        let inc = MaskedGrid::<f64>::from_elem((2, 2), 35.0);
        assert!(matches!(
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default()),
            Err(WindError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let (s, p, t) = grids_1x1(0.005);
        let params = InversionParams {
            iterations: 0,
            ..InversionParams::default()
        };
        assert!(matches!(
            invert_iterative(&LinearGmf, &s, &p, &t, &params),
            Err(WindError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_nonpositive_step_rejected() {
        let (s, p, t) = grids_1x1(0.005);
        for bad in [0.0, -1.0, f64::NAN] {
            let params = InversionParams {
                initial_step: bad,
                ..InversionParams::default()
            };
            assert!(matches!(
                invert_iterative(&LinearGmf, &s, &p, &t, &params),
                Err(WindError::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn test_nan_prediction_walks_up() {
        // NaN - observed is never > 0, so every round adds the step:
        // 10 + 10 + 5 + ... converges to first_guess + 2 * initial_step
        let (s, p, t) = grids_1x1(0.005);
        let wind =
            invert_iterative(&NanGmf, &s, &p, &t, &InversionParams::default()).unwrap();
        assert_abs_diff_eq!(wind.get(0, 0).unwrap(), 29.98046875);
    }

    #[test]
    fn test_empty_grid() {
        let empty = MaskedGrid::<f64>::new(Array2::zeros((0, 0)));
        let wind = invert_iterative(
            &LinearGmf,
            &empty,
            &empty.clone(),
            &empty.clone(),
            &InversionParams::default(),
        )
        .unwrap();
        assert_eq!(wind.dim(), (0, 0));
    }

    #[test]
    fn test_large_uniform_grid_matches_single_cell() {
        // 120 x 100 pixels crosses the parallel dispatch threshold
        let sigma0 = MaskedGrid::from_elem((120, 100), 0.0073);
        let phi = MaskedGrid::from_elem((120, 100), 0.4);
        let inc = MaskedGrid::from_elem((120, 100), 35.0);
        let wind =
            invert_iterative(&LinearGmf, &sigma0, &phi, &inc, &InversionParams::default())
                .unwrap();

        let (s, p, t) = grids_1x1(0.0073);
        let reference =
            invert_iterative(&LinearGmf, &s, &p, &t, &InversionParams::default()).unwrap();
        let expected = reference.get(0, 0).unwrap();

        assert_eq!(wind.valid_count(), 12_000);
        for (_, v) in wind.iter_valid() {
            assert_eq!(v, expected);
        }
    }

    #[test]
    fn test_forward_masks_nonfinite_model_output() {
        let wind = MaskedGrid::new(array![[5.0, 8.0]]);
        let phi = MaskedGrid::new(array![[0.4, 0.4]]);
        let inc = MaskedGrid::new(array![[35.0, 35.0]]);
        let sim = NanGmf.forward(&wind, &phi, &inc).unwrap();
        assert_eq!(sim.valid_count(), 0);
    }

    #[test]
    fn test_forward_applies_kernel_on_valid_cells() {
        let wind = MaskedGrid::with_mask(array![[5.0, 8.0]], array![[false, true]]).unwrap();
        let phi = MaskedGrid::new(array![[0.4, 0.4]]);
        let inc = MaskedGrid::new(array![[35.0, 35.0]]);
        let sim = LinearGmf.forward(&wind, &phi, &inc).unwrap();
        assert_abs_diff_eq!(sim.get(0, 0).unwrap(), 0.005);
        assert_eq!(sim.get(0, 1), None);
    }

    #[test]
    fn test_retrieve_wind_speed_rejects_cmod7() {
        let (s, p, t) = grids_1x1(0.005);
        assert!(matches!(
            retrieve_wind_speed(GmfModel::Cmod7, &s, &p, &t, &InversionParams::default()),
            Err(WindError::InvalidParameter(_))
        ));
    }
}

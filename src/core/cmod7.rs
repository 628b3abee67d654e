//! CMOD7 table inversion.
//!
//! CMOD7 is distributed as a lookup table rather than a closed-form
//! kernel, so wind retrieval inverts the table directly: pixels are
//! grouped by their (direction, incidence) bin, every pixel in a group
//! shares one backscatter-vs-wind curve, and observed backscatter maps to
//! wind speed by linear interpolation along that curve.

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array2, Zip};

use crate::core::invert::check_shapes;
use crate::grid::MaskedGrid;
use crate::io::GmfTable;
use crate::types::{GmfModel, WindResult};

/// Bin index for a relative wind direction in radians. Mid-edge ties
/// round to the even bin.
fn direction_bin(phi: f64) -> usize {
    let bin = (phi.to_degrees() / GmfTable::DIRECTION_STEP_DEG).round_ties_even() as i64;
    bin.clamp(0, GmfTable::DIRECTION_BINS as i64 - 1) as usize
}

/// Bin index for an incidence angle in degrees. Mid-edge ties round to
/// the even bin.
fn incidence_bin(incidence: f64) -> usize {
    let bin = (incidence - GmfTable::INCIDENCE_MIN_DEG).round_ties_even() as i64;
    bin.clamp(0, GmfTable::INCIDENCE_BINS as i64 - 1) as usize
}

/// Sorts a bin's curve by backscatter and drops exact duplicates, keeping
/// the lowest wind speed for each repeated value. Interpolation needs
/// strictly increasing abscissae.
fn clean_curve(curve: &[f64], speeds: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..curve.len()).collect();
    order.sort_unstable_by(|&a, &b| curve[a].total_cmp(&curve[b]).then(a.cmp(&b)));

    let mut xs: Vec<f64> = Vec::with_capacity(curve.len());
    let mut ys: Vec<f64> = Vec::with_capacity(curve.len());
    for &k in &order {
        if xs.last() != Some(&curve[k]) {
            xs.push(curve[k]);
            ys.push(speeds[k]);
        }
    }
    (xs, ys)
}

/// Linear interpolation of `t` over `(xs, ys)`. Beyond the curve ends the
/// edge segment extends linearly.
fn interpolate(xs: &[f64], ys: &[f64], t: f64) -> f64 {
    let hi = xs.partition_point(|&x| x < t).clamp(1, xs.len() - 1);
    let lo = hi - 1;
    let w = (t - xs[lo]) / (xs[hi] - xs[lo]);
    ys[lo] * (1.0 - w) + ys[hi] * w
}

/// CMOD7 wind retrieval backed by the binary lookup table.
#[derive(Debug, Clone)]
pub struct Cmod7 {
    table: GmfTable,
}

impl Cmod7 {
    pub fn new(table: GmfTable) -> Self {
        Self { table }
    }

    /// Loads the lookup table from disk, see [`GmfTable::from_path`].
    pub fn from_path<P: AsRef<Path>>(path: P) -> WindResult<Self> {
        Ok(Self::new(GmfTable::from_path(path)?))
    }

    pub fn model(&self) -> GmfModel {
        GmfModel::Cmod7
    }

    /// Retrieves wind speed from observed backscatter.
    ///
    /// `sigma0` is observed backscatter in linear units, `phi` the wind
    /// direction relative to the radar look direction in radians,
    /// `incidence` the incidence angle in degrees. Cells that are masked in
    /// any input, carry zero or non-finite values, or fall in a bin whose
    /// curve cannot be interpolated are masked in the output.
    pub fn inverse(
        &self,
        sigma0: &MaskedGrid<f64>,
        phi: &MaskedGrid<f64>,
        incidence: &MaskedGrid<f64>,
    ) -> WindResult<MaskedGrid<f64>> {
        check_shapes(sigma0.dim(), phi.dim(), incidence.dim())?;

        let (rows, cols) = sigma0.dim();

        // Cells with no measurement (zero backscatter is the nodata fill)
        // and cells with non-finite inputs never reach the table.
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
        if valid_pixels == 0 {
            log::warn!("No valid pixels to invert, returning fully masked grid");
            return Ok(MaskedGrid::fully_masked((rows, cols)));
        }

        // One curve serves every pixel that shares a (direction, incidence)
        // bin
        let mut groups: HashMap<(usize, usize), Vec<(usize, usize)>> = HashMap::new();
        for (idx, &m) in mask.indexed_iter() {
            if m {
                continue;
            }
            let key = (
                direction_bin(phi.data()[idx]),
                incidence_bin(incidence.data()[idx]),
            );
            groups.entry(key).or_default().push(idx);
        }

        log::info!(
            "CMOD7 table inversion: {}x{} grid, {} valid pixels in {} bin groups",
            rows,
            cols,
            valid_pixels,
            groups.len()
        );

        let groups: Vec<_> = groups.into_iter().collect();
        let speeds = GmfTable::wind_speeds();

        let retrieved = if valid_pixels > 10_000 {
            self.invert_groups_parallel(&groups, &speeds, sigma0.data())
        } else {
            self.invert_groups_sequential(&groups, &speeds, sigma0.data())
        };

        let mut wind = Array2::zeros((rows, cols));
        let mut retrieved_pixels = 0usize;
        for (idx, value) in retrieved {
            match value {
                Some(v) => {
                    wind[idx] = v;
                    retrieved_pixels += 1;
                }
                None => mask[idx] = true,
            }
        }

        log::info!(
            "CMOD7 table inversion completed: {} of {} valid pixels retrieved",
            retrieved_pixels,
            valid_pixels
        );

        MaskedGrid::with_mask(wind, mask)
    }

    fn invert_group(
        &self,
        bins: (usize, usize),
        cells: &[(usize, usize)],
        speeds: &[f64],
        sigma0: &Array2<f64>,
    ) -> Vec<((usize, usize), Option<f64>)> {
        let curve = self.table.curve(bins.0, bins.1);
        let (xs, ys) = clean_curve(&curve, speeds);
        if xs.len() < 2 {
            log::debug!(
                "Degenerate GMF curve in direction bin {} / incidence bin {}, masking {} pixels",
                bins.0,
                bins.1,
                cells.len()
            );
            return cells.iter().map(|&idx| (idx, None)).collect();
        }
        cells
            .iter()
            .map(|&idx| (idx, Some(interpolate(&xs, &ys, sigma0[idx]))))
            .collect()
    }

    fn invert_groups_sequential(
        &self,
        groups: &[((usize, usize), Vec<(usize, usize)>)],
        speeds: &[f64],
        sigma0: &Array2<f64>,
    ) -> Vec<((usize, usize), Option<f64>)> {
        groups
            .iter()
            .flat_map(|(bins, cells)| self.invert_group(*bins, cells, speeds, sigma0))
            .collect()
    }

    /// Parallel inversion over bin groups using Rayon (if available)
    #[cfg(feature = "parallel")]
    fn invert_groups_parallel(
        &self,
        groups: &[((usize, usize), Vec<(usize, usize)>)],
        speeds: &[f64],
        sigma0: &Array2<f64>,
    ) -> Vec<((usize, usize), Option<f64>)> {
        use rayon::prelude::*;

        log::debug!("Inverting bin groups with parallel processing");

        groups
            .par_iter()
            .flat_map(|(bins, cells)| self.invert_group(*bins, cells, speeds, sigma0))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn invert_groups_parallel(
        &self,
        groups: &[((usize, usize), Vec<(usize, usize)>)],
        speeds: &[f64],
        sigma0: &Array2<f64>,
    ) -> Vec<((usize, usize), Option<f64>)> {
        // Fallback to sequential processing if the parallel feature is disabled
        self.invert_groups_sequential(groups, speeds, sigma0)
    }
}

//! Post-retrieval cleanup of wind fields.
//!
//! Retrieved wind grids occasionally carry a handful of implausibly high
//! values where the backscatter was contaminated by ships, sea ice or
//! range artefacts. [`clamp_outliers`] caps the field at an empirical
//! quantile estimated from a fixed-width histogram of the valid pixels.

use crate::grid::MaskedGrid;
use crate::types::{WindError, WindResult};

/// Quantile used by the reference processing chain
pub const DEFAULT_CLAMP_QUANTILE: f64 = 0.995;

/// Histogram over 0 to 40.999 m/s in 1 mm/s bins
const HIST_BINS: usize = 40_999;
const HIST_BIN_WIDTH: f64 = 0.001;

/// Caps wind speeds above the given quantile of the valid pixels.
///
/// The quantile is estimated from a histogram of the valid values between
/// 0 and ~41 m/s; the cap is the lower edge of the first bin whose
/// cumulative fraction reaches `quantile`. Values above the cap (including
/// values beyond the histogram range) are set to the cap; the mask is
/// unchanged. If no valid value falls inside the histogram range the grid
/// is returned as is.
pub fn clamp_outliers(wind: &MaskedGrid<f64>, quantile: f64) -> WindResult<MaskedGrid<f64>> {
    if !(quantile > 0.0 && quantile <= 1.0) {
        return Err(WindError::InvalidParameter(format!(
            "quantile must lie in (0, 1], got {}",
            quantile
        )));
    }

    let mut histogram = vec![0usize; HIST_BINS];
    let mut in_range = 0usize;
    for (_, v) in wind.iter_valid() {
        if v >= 0.0 {
            let bin = (v / HIST_BIN_WIDTH) as usize;
            if bin < HIST_BINS {
                histogram[bin] += 1;
                in_range += 1;
            }
        }
    }

    if in_range == 0 {
        log::warn!("No wind speeds inside the histogram range, skipping outlier clamp");
        return Ok(wind.clone());
    }

    let mut threshold = (HIST_BINS - 1) as f64 * HIST_BIN_WIDTH;
    let mut cumulative = 0usize;
    for (bin, &count) in histogram.iter().enumerate() {
        cumulative += count;
        if cumulative as f64 / in_range as f64 >= quantile {
            threshold = bin as f64 * HIST_BIN_WIDTH;
            break;
        }
    }

    log::info!(
        "Clamping wind speeds above {:.3} m/s ({:.1}th percentile of {} pixels)",
        threshold,
        quantile * 100.0,
        in_range
    );

    Ok(wind.map(|v| if v > threshold { threshold } else { v }))
}

//! sarwind: CMOD wind-speed retrieval from SAR backscatter
//!
//! This library retrieves ocean surface wind speed from calibrated C-band
//! SAR backscatter using the CMOD family of geophysical model functions:
//! CMOD4, CMOD5, CMOD5.N and CMOD_IFR2 through iterative inversion of
//! their closed-form kernels, and CMOD7 through direct inversion of its
//! binary lookup table. All grids carry validity masks, so nodata borders
//! and land pixels propagate through the chain without contaminating the
//! retrieved field.

pub mod types;
pub mod grid;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::core::{
    clamp_outliers, retrieve_wind_speed, Cmod4, Cmod5, Cmod7, CmodIfr2, ForwardModel,
    InversionParams, DEFAULT_CLAMP_QUANTILE,
};
pub use grid::MaskedGrid;
pub use io::GmfTable;
pub use types::{GmfModel, WindError, WindResult};

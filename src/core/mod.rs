//! Core wind-retrieval modules

pub mod cmod4;
pub mod cmod5;
pub mod cmod7;
pub mod cmod_ifr2;
pub mod invert;
pub mod postprocess;

// Re-export main types
pub use cmod4::Cmod4;
pub use cmod5::Cmod5;
pub use cmod7::Cmod7;
pub use cmod_ifr2::CmodIfr2;
pub use invert::{invert_iterative, retrieve_wind_speed, ForwardModel, InversionParams};
pub use postprocess::{clamp_outliers, DEFAULT_CLAMP_QUANTILE};

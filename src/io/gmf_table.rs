//! Reader for the binary CMOD7 lookup table.
//!
//! The table ships as `gmf_cmod7_vv.dat_little_endian`: one Fortran
//! unformatted record of float32 backscatter values on a (wind speed,
//! direction, incidence) lattice in column-major order. The record is
//! framed by a four-byte marker at each end, which the reader strips.

use std::io::Read;
use std::path::Path;

use ndarray::{s, Array3, ShapeBuilder};

use crate::types::{WindError, WindResult};

/// CMOD7 backscatter lookup table.
///
/// Axis 0 is wind speed (250 steps of 0.2 m/s starting at 0.2), axis 1 the
/// relative wind direction (73 bins of 2.5 degrees from 0 to 180), axis 2
/// the incidence angle (51 bins of 1 degree from 16 to 66).
#[derive(Debug, Clone)]
pub struct GmfTable {
    values: Array3<f32>,
}

impl GmfTable {
    pub const WIND_STEPS: usize = 250;
    pub const DIRECTION_BINS: usize = 73;
    pub const INCIDENCE_BINS: usize = 51;

    pub const WIND_STEP_MS: f64 = 0.2;
    pub const DIRECTION_STEP_DEG: f64 = 2.5;
    pub const INCIDENCE_MIN_DEG: f64 = 16.0;

    /// Loads the table from a little-endian `.dat` file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> WindResult<Self> {
        let path = path.as_ref();
        log::info!("Reading CMOD7 GMF table from {}", path.display());
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Loads the table from any reader producing the `.dat` byte stream.
    pub fn from_reader<R: Read>(mut reader: R) -> WindResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(&bytes)
    }

    /// Parses the raw `.dat` bytes: a leading record marker, the
    /// column-major float32 payload, a trailing record marker.
    pub fn from_bytes(bytes: &[u8]) -> WindResult<Self> {
        let cells = Self::WIND_STEPS * Self::DIRECTION_BINS * Self::INCIDENCE_BINS;
        let expected = (cells + 2) * 4;
        if bytes.len() != expected {
            return Err(WindError::TableFormat(format!(
                "expected {} bytes ({} float32 values plus record markers), got {}",
                expected,
                cells,
                bytes.len()
            )));
        }

        let payload = &bytes[4..bytes.len() - 4];
        let values: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let shape = (
            Self::WIND_STEPS,
            Self::DIRECTION_BINS,
            Self::INCIDENCE_BINS,
        );
        let values = Array3::from_shape_vec(shape.f(), values)
            .map_err(|e| WindError::TableFormat(format!("table reshape failed: {}", e)))?;
        Ok(Self { values })
    }

    /// Wraps an already-shaped value array, for synthetic tables.
    pub fn from_values(values: Array3<f32>) -> WindResult<Self> {
        let shape = (
            Self::WIND_STEPS,
            Self::DIRECTION_BINS,
            Self::INCIDENCE_BINS,
        );
        if values.dim() != shape {
            return Err(WindError::TableFormat(format!(
                "expected value array of shape {:?}, got {:?}",
                shape,
                values.dim()
            )));
        }
        Ok(Self { values })
    }

    /// The wind-speed lattice: 0.2, 0.4, .., 50.0 m/s.
    pub fn wind_speeds() -> Vec<f64> {
        (0..Self::WIND_STEPS)
            .map(|k| Self::WIND_STEP_MS * k as f64 + Self::WIND_STEP_MS)
            .collect()
    }

    /// One backscatter value on the lattice.
    pub fn value(&self, wind_idx: usize, direction_bin: usize, incidence_bin: usize) -> f32 {
        self.values[(wind_idx, direction_bin, incidence_bin)]
    }

    /// The backscatter-vs-wind curve for one (direction, incidence) bin,
    /// widened to f64 for interpolation.
    pub fn curve(&self, direction_bin: usize, incidence_bin: usize) -> Vec<f64> {
        self.values
            .slice(s![.., direction_bin, incidence_bin])
            .iter()
            .map(|&v| v as f64)
            .collect()
    }
}

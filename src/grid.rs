//! Masked 2D grids.
//!
//! SAR scenes routinely contain cells that carry no usable measurement:
//! nodata borders, land pixels, azimuth gaps. [`MaskedGrid`] pairs an
//! `ndarray` array with a boolean mask (`true` = invalid) so that every
//! operation in the retrieval pipeline propagates validity alongside the
//! values instead of leaking fill values into downstream maths.

use ndarray::{Array2, Zip};
use num_traits::Float;

use crate::types::{WindError, WindResult};

/// A 2D data grid with an element-wise validity mask.
///
/// Masked cells (`mask == true`) hold zero and must never be interpreted as
/// measurements. All element-wise operations preserve this: a cell is valid
/// in the output only if it was valid in every input, and invalid output
/// cells are reset to zero.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedGrid<T: Float> {
    data: Array2<T>,
    mask: Array2<bool>,
}

impl<T: Float> MaskedGrid<T> {
    /// Wraps an array with every cell valid.
    pub fn new(data: Array2<T>) -> Self {
        let mask = Array2::from_elem(data.raw_dim(), false);
        Self { data, mask }
    }

    /// Wraps an array with an explicit mask. Masked cells are reset to zero.
    pub fn with_mask(data: Array2<T>, mask: Array2<bool>) -> WindResult<Self> {
        if data.dim() != mask.dim() {
            return Err(WindError::ShapeMismatch(format!(
                "data {:?} vs mask {:?}",
                data.dim(),
                mask.dim()
            )));
        }
        let mut grid = Self { data, mask };
        grid.zero_masked();
        Ok(grid)
    }

    /// A grid of the given shape filled with one valid value.
    pub fn from_elem(dim: (usize, usize), value: T) -> Self {
        Self {
            data: Array2::from_elem(dim, value),
            mask: Array2::from_elem(dim, false),
        }
    }

    /// A grid of the given shape with every cell invalid.
    pub fn fully_masked(dim: (usize, usize)) -> Self {
        Self {
            data: Array2::zeros(dim),
            mask: Array2::from_elem(dim, true),
        }
    }

    /// Returns a copy with all cells equal to `value` masked out.
    pub fn masked_equal(&self, value: T) -> Self {
        let mut out = self.clone();
        Zip::from(&mut out.mask)
            .and(&self.data)
            .for_each(|m, &v| {
                if v == value {
                    *m = true;
                }
            });
        out.zero_masked();
        out
    }

    /// Returns a copy with all NaN and infinite cells masked out.
    pub fn masked_invalid(&self) -> Self {
        let mut out = self.clone();
        Zip::from(&mut out.mask)
            .and(&self.data)
            .for_each(|m, &v| {
                if !v.is_finite() {
                    *m = true;
                }
            });
        out.zero_masked();
        out
    }

    /// Grid shape as (rows, columns).
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// The underlying data array. Masked cells hold zero.
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// The validity mask (`true` = invalid).
    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Consumes the grid and returns `(data, mask)`.
    pub fn into_parts(self) -> (Array2<T>, Array2<bool>) {
        (self.data, self.mask)
    }

    /// The value at `(row, col)`, or `None` if out of bounds or masked.
    pub fn get(&self, row: usize, col: usize) -> Option<T> {
        match self.mask.get((row, col)) {
            Some(false) => Some(self.data[(row, col)]),
            _ => None,
        }
    }

    /// Stores a valid value at `(row, col)`. Panics if out of bounds.
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        self.data[(row, col)] = value;
        self.mask[(row, col)] = false;
    }

    /// Marks `(row, col)` invalid. Panics if out of bounds.
    pub fn mask_cell(&mut self, row: usize, col: usize) {
        self.data[(row, col)] = T::zero();
        self.mask[(row, col)] = true;
    }

    /// Number of valid cells.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&m| !m).count()
    }

    /// Iterator over `((row, col), value)` for valid cells only.
    pub fn iter_valid(&self) -> impl Iterator<Item = ((usize, usize), T)> + '_ {
        self.data
            .indexed_iter()
            .filter(|(idx, _)| !self.mask[*idx])
            .map(|(idx, &v)| (idx, v))
    }

    /// Applies `f` to every valid cell; masked cells stay masked and zero.
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T,
    {
        let mut data = Array2::zeros(self.data.raw_dim());
        Zip::from(&mut data)
            .and(&self.data)
            .and(&self.mask)
            .for_each(|out, &v, &m| {
                if !m {
                    *out = f(v);
                }
            });
        Self {
            data,
            mask: self.mask.clone(),
        }
    }

    /// Combines two grids element-wise with `f`. The output mask is the
    /// union of both input masks. Errors if the shapes differ.
    pub fn zip_with<F>(&self, other: &Self, f: F) -> WindResult<Self>
    where
        F: Fn(T, T) -> T,
    {
        if self.dim() != other.dim() {
            return Err(WindError::ShapeMismatch(format!(
                "{:?} vs {:?}",
                self.dim(),
                other.dim()
            )));
        }
        Ok(self.combine(other, f))
    }

    fn combine<F>(&self, other: &Self, f: F) -> Self
    where
        F: Fn(T, T) -> T,
    {
        let mask = &self.mask | &other.mask;
        let mut data = Array2::zeros(self.data.raw_dim());
        Zip::from(&mut data)
            .and(&self.data)
            .and(&other.data)
            .and(&mask)
            .for_each(|out, &a, &b, &m| {
                if !m {
                    *out = f(a, b);
                }
            });
        Self { data, mask }
    }

    fn zero_masked(&mut self) {
        Zip::from(&mut self.data)
            .and(&self.mask)
            .for_each(|d, &m| {
                if m {
                    *d = T::zero();
                }
            });
    }
}

impl MaskedGrid<f64> {
    /// Converts linear power to decibels. Non-positive cells cannot be
    /// expressed in dB and become masked.
    pub fn to_db(&self) -> MaskedGrid<f64> {
        let mut data = Array2::zeros(self.data.raw_dim());
        let mut mask = self.mask.clone();
        Zip::from(&mut data)
            .and(&mut mask)
            .and(&self.data)
            .for_each(|out, m, &v| {
                if !*m {
                    if v > 0.0 {
                        *out = 10.0 * v.log10();
                    } else {
                        *m = true;
                    }
                }
            });
        MaskedGrid { data, mask }
    }

    /// Converts decibels back to linear power.
    pub fn from_db(&self) -> MaskedGrid<f64> {
        self.map(|v| 10f64.powf(v / 10.0))
    }
}

macro_rules! impl_grid_op {
    ($trait:ident, $method:ident, $op:tt) => {
        impl<T: Float> std::ops::$trait for &MaskedGrid<T> {
            type Output = MaskedGrid<T>;

            /// Element-wise operation; output mask is the union of input
            /// masks. Panics if the shapes differ.
            fn $method(self, rhs: Self) -> MaskedGrid<T> {
                assert_eq!(
                    self.dim(),
                    rhs.dim(),
                    "MaskedGrid shape mismatch in element-wise op"
                );
                self.combine(rhs, |a, b| a $op b)
            }
        }

        impl<T: Float> std::ops::$trait<T> for &MaskedGrid<T> {
            type Output = MaskedGrid<T>;

            fn $method(self, rhs: T) -> MaskedGrid<T> {
                self.map(|v| v $op rhs)
            }
        }
    };
}

impl_grid_op!(Add, add, +);
impl_grid_op!(Sub, sub, -);
impl_grid_op!(Mul, mul, *);

impl<T: Float> std::ops::Div for &MaskedGrid<T> {
    type Output = MaskedGrid<T>;

    /// Element-wise division. Cells with a zero divisor are masked rather
    /// than producing infinities. Panics if the shapes differ.
    fn div(self, rhs: Self) -> MaskedGrid<T> {
        assert_eq!(
            self.dim(),
            rhs.dim(),
            "MaskedGrid shape mismatch in element-wise op"
        );
        let mut mask = &self.mask | &rhs.mask;
        Zip::from(&mut mask).and(&rhs.data).for_each(|m, &d| {
            if d == T::zero() {
                *m = true;
            }
        });
        let mut data = Array2::zeros(self.data.raw_dim());
        Zip::from(&mut data)
            .and(&self.data)
            .and(&rhs.data)
            .and(&mask)
            .for_each(|out, &a, &b, &m| {
                if !m {
                    *out = a / b;
                }
            });
        MaskedGrid { data, mask }
    }
}

impl<T: Float> std::ops::Div<T> for &MaskedGrid<T> {
    type Output = MaskedGrid<T>;

    fn div(self, rhs: T) -> MaskedGrid<T> {
        if rhs == T::zero() {
            return MaskedGrid::fully_masked(self.dim());
        }
        self.map(|v| v / rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_new_is_fully_valid() {
        let g = MaskedGrid::new(array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(g.dim(), (2, 2));
        assert_eq!(g.valid_count(), 4);
    }

    #[test]
    fn test_with_mask_rejects_shape_mismatch() {
        let data = Array2::<f64>::zeros((2, 3));
        let mask = Array2::from_elem((3, 2), false);
        assert!(matches!(
            MaskedGrid::with_mask(data, mask),
            Err(WindError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_with_mask_zeroes_masked_cells() {
        let data = array![[5.0, 7.0]];
        let mask = array![[false, true]];
        let g = MaskedGrid::with_mask(data, mask).unwrap();
        assert_eq!(g.data()[(0, 1)], 0.0);
        assert_eq!(g.get(0, 1), None);
        assert_eq!(g.get(0, 0), Some(5.0));
    }

    #[test]
    fn test_masked_equal() {
        let g = MaskedGrid::new(array![[0.0, 1.5], [0.0, 2.5]]).masked_equal(0.0);
        assert_eq!(g.valid_count(), 2);
        assert_eq!(g.get(0, 0), None);
        assert_eq!(g.get(1, 1), Some(2.5));
    }

    #[test]
    fn test_masked_invalid() {
        let g = MaskedGrid::new(array![[f64::NAN, 1.0], [f64::INFINITY, 2.0]]).masked_invalid();
        assert_eq!(g.valid_count(), 2);
        assert_eq!(g.data()[(0, 0)], 0.0);
        assert_eq!(g.get(1, 1), Some(2.0));
    }

    #[test]
    fn test_add_unions_masks() {
        let a = MaskedGrid::with_mask(array![[1.0, 2.0]], array![[true, false]]).unwrap();
        let b = MaskedGrid::with_mask(array![[3.0, 4.0]], array![[false, false]]).unwrap();
        let sum = &a + &b;
        assert_eq!(sum.get(0, 0), None);
        assert_eq!(sum.get(0, 1), Some(6.0));
        assert_eq!(sum.data()[(0, 0)], 0.0);
    }

    #[test]
    fn test_div_masks_zero_divisor() {
        let a = MaskedGrid::new(array![[1.0, 8.0]]);
        let b = MaskedGrid::new(array![[0.0, 2.0]]);
        let q = &a / &b;
        assert_eq!(q.get(0, 0), None);
        assert_eq!(q.get(0, 1), Some(4.0));
    }

    #[test]
    fn test_scalar_ops() {
        let g = MaskedGrid::with_mask(array![[2.0, 4.0]], array![[false, true]]).unwrap();
        let scaled = &g * 3.0;
        assert_eq!(scaled.get(0, 0), Some(6.0));
        assert_eq!(scaled.get(0, 1), None);
        let shifted = &g + 1.0;
        assert_eq!(shifted.get(0, 0), Some(3.0));
        // masked cells never see the operation
        assert_eq!(shifted.data()[(0, 1)], 0.0);
    }

    #[test]
    fn test_scalar_div_by_zero_masks_everything() {
        let g = MaskedGrid::new(array![[1.0, 2.0]]);
        let q = &g / 0.0;
        assert_eq!(q.valid_count(), 0);
    }

    #[test]
    fn test_to_db_masks_nonpositive() {
        let g = MaskedGrid::new(array![[1.0, 0.1, 0.0, -3.0]]);
        let db = g.to_db();
        assert_relative_eq!(db.get(0, 0).unwrap(), 0.0);
        assert_relative_eq!(db.get(0, 1).unwrap(), -10.0, max_relative = 1e-12);
        assert_eq!(db.get(0, 2), None);
        assert_eq!(db.get(0, 3), None);
    }

    #[test]
    fn test_db_round_trip() {
        let g = MaskedGrid::new(array![[0.05, 0.7]]);
        let back = g.to_db().from_db();
        assert_relative_eq!(back.get(0, 0).unwrap(), 0.05, max_relative = 1e-12);
        assert_relative_eq!(back.get(0, 1).unwrap(), 0.7, max_relative = 1e-12);
    }

    #[test]
    fn test_map_skips_masked_cells() {
        let g = MaskedGrid::with_mask(array![[2.0, 9.0]], array![[false, true]]).unwrap();
        let sq = g.map(|v| v * v + 1.0);
        assert_eq!(sq.get(0, 0), Some(5.0));
        assert_eq!(sq.data()[(0, 1)], 0.0);
        assert_eq!(sq.get(0, 1), None);
    }

    #[test]
    fn test_zip_with_shape_check() {
        let a = MaskedGrid::<f64>::from_elem((2, 2), 1.0);
        let b = MaskedGrid::<f64>::from_elem((2, 3), 1.0);
        assert!(matches!(
            a.zip_with(&b, |x, y| x + y),
            Err(WindError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_iter_valid() {
        let g = MaskedGrid::with_mask(array![[1.0, 2.0], [3.0, 4.0]], array![
            [false, true],
            [true, false]
        ])
        .unwrap();
        let cells: Vec<_> = g.iter_valid().collect();
        assert_eq!(cells, vec![((0, 0), 1.0), ((1, 1), 4.0)]);
    }

    #[test]
    fn test_set_and_mask_cell() {
        let mut g = MaskedGrid::<f64>::fully_masked((1, 2));
        g.set(0, 0, 7.5);
        assert_eq!(g.get(0, 0), Some(7.5));
        g.mask_cell(0, 0);
        assert_eq!(g.get(0, 0), None);
        assert_eq!(g.data()[(0, 0)], 0.0);
    }
}

//! Rank-3 tensors with fixed shape and row-major storage.

use std::ops::{Index, IndexMut};

use nalgebra::DMatrix;

use crate::types::LinalgError;

/// Dense rank-3 tensor indexed by `(i, j, k)`.
///
/// Used for rate Hessians (`variables × variables × instruments`) and
/// second-order target sensitivities (`instruments × instruments × variables`).
///
/// # Examples
///
/// ```
/// use calib_core::math::Tensor3;
///
/// let mut t = Tensor3::zeros(2, 2, 3);
/// t[(0, 1, 2)] = 4.0;
/// assert_eq!(t.shape(), (2, 2, 3));
/// assert_eq!(t.contract_last(&[0.0, 0.0, 0.5])[(0, 1)], 2.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor3 {
    shape: (usize, usize, usize),
    data: Vec<f64>,
}

impl Tensor3 {
    /// Tensor of zeros.
    pub fn zeros(d0: usize, d1: usize, d2: usize) -> Self {
        Self {
            shape: (d0, d1, d2),
            data: vec![0.0; d0 * d1 * d2],
        }
    }

    /// Tensor with entries `f(i, j, k)`.
    pub fn from_fn(d0: usize, d1: usize, d2: usize, f: impl Fn(usize, usize, usize) -> f64) -> Self {
        let mut t = Self::zeros(d0, d1, d2);
        for i in 0..d0 {
            for j in 0..d1 {
                for k in 0..d2 {
                    t[(i, j, k)] = f(i, j, k);
                }
            }
        }
        t
    }

    /// Dimensions `(d0, d1, d2)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.shape
    }

    /// Row-major entries.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Matrix `M[i, j] = T[i, j, k]` for fixed `k`.
    pub fn slice_last(&self, k: usize) -> DMatrix<f64> {
        let (d0, d1, _) = self.shape;
        DMatrix::from_fn(d0, d1, |i, j| self[(i, j, k)])
    }

    /// Overwrite `T[.., .., k]` with `m`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if `m` is not `d0 × d1` or
    /// `k` is out of range.
    pub fn set_slice_last(&mut self, k: usize, m: &DMatrix<f64>) -> Result<(), LinalgError> {
        let (d0, d1, d2) = self.shape;
        if m.nrows() != d0 {
            return Err(LinalgError::dimension_mismatch(d0, m.nrows()));
        }
        if m.ncols() != d1 {
            return Err(LinalgError::dimension_mismatch(d1, m.ncols()));
        }
        if k >= d2 {
            return Err(LinalgError::dimension_mismatch(d2, k + 1));
        }
        for i in 0..d0 {
            for j in 0..d1 {
                self[(i, j, k)] = m[(i, j)];
            }
        }
        Ok(())
    }

    /// Copy `block` into this tensor starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`LinalgError::DimensionMismatch`] if the block does not fit.
    pub fn embed(&mut self, offset: (usize, usize, usize), block: &Tensor3) -> Result<(), LinalgError> {
        let (b0, b1, b2) = block.shape;
        let (o0, o1, o2) = offset;
        let (d0, d1, d2) = self.shape;
        for (dim, end) in [(d0, o0 + b0), (d1, o1 + b1), (d2, o2 + b2)] {
            if end > dim {
                return Err(LinalgError::dimension_mismatch(dim, end));
            }
        }
        for i in 0..b0 {
            for j in 0..b1 {
                for k in 0..b2 {
                    self[(o0 + i, o1 + j, o2 + k)] = block[(i, j, k)];
                }
            }
        }
        Ok(())
    }

    /// Matrix `M[i, j] = Σ_k T[i, j, k] v[k]`.
    ///
    /// # Panics
    ///
    /// Panics if `v.len() != d2`.
    pub fn contract_last(&self, v: &[f64]) -> DMatrix<f64> {
        let (d0, d1, d2) = self.shape;
        assert_eq!(v.len(), d2, "vector length mismatch");
        DMatrix::from_fn(d0, d1, |i, j| (0..d2).map(|k| self[(i, j, k)] * v[k]).sum())
    }

    /// `(T[i, j, k] + T[j, i, k]) / 2`.
    ///
    /// # Panics
    ///
    /// Panics if the leading dimensions differ.
    pub fn symmetrize_leading(&self) -> Tensor3 {
        let (d0, d1, d2) = self.shape;
        assert_eq!(d0, d1, "leading dimensions differ");
        Tensor3::from_fn(d0, d1, d2, |i, j, k| 0.5 * (self[(i, j, k)] + self[(j, i, k)]))
    }

    /// Largest absolute entry-wise difference.
    ///
    /// Returns infinity when shapes differ.
    pub fn max_abs_diff(&self, other: &Tensor3) -> f64 {
        if self.shape != other.shape {
            return f64::INFINITY;
        }
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// Multiply every entry by `c`.
    pub fn scale(mut self, c: f64) -> Tensor3 {
        self.data.iter_mut().for_each(|x| *x *= c);
        self
    }

    fn offset(&self, (i, j, k): (usize, usize, usize)) -> usize {
        let (d0, d1, d2) = self.shape;
        assert!(i < d0 && j < d1 && k < d2, "index out of bounds");
        (i * d1 + j) * d2 + k
    }
}

impl Index<(usize, usize, usize)> for Tensor3 {
    type Output = f64;

    fn index(&self, idx: (usize, usize, usize)) -> &f64 {
        &self.data[self.offset(idx)]
    }
}

impl IndexMut<(usize, usize, usize)> for Tensor3 {
    fn index_mut(&mut self, idx: (usize, usize, usize)) -> &mut f64 {
        let offset = self.offset(idx);
        &mut self.data[offset]
    }
}

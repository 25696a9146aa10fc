use num_complex::Complex;
use rayon::prelude::*;

use crate::error::Result;
use crate::utils::fft::NufftFloat;
use crate::utils::try_alloc;

/// Complex grid whose cells can be accumulated into from many threads.
///
/// Real and imaginary parts live in adjacent atomic cells. Used for the
/// atomic merge of host subproblems and for all device-style scatter.
pub struct AtomicGrid<T: NufftFloat> {
    cells: Vec<T::Atomic>,
}

impl<T: NufftFloat> AtomicGrid<T> {
    /// Zeroed grid of `len` complex cells.
    ///
    /// ### Params
    ///
    /// * `len` - Number of complex cells
    ///
    /// ### Returns
    ///
    /// The grid, or `NufftError::Internal` if the cells cannot be allocated
    pub fn new(len: usize) -> Result<Self> {
        let n = len.checked_mul(2).unwrap_or(usize::MAX);
        let mut cells = try_alloc(n, "atomic grid")?;
        cells.extend((0..n).map(|_| T::atomic_zero()));
        Ok(Self { cells })
    }

    /// Number of complex cells
    pub fn len(&self) -> usize {
        self.cells.len() / 2
    }

    /// Returns `true` for an empty grid
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `grid[idx] += val`, lock-free
    #[inline]
    pub fn add(&self, idx: usize, val: Complex<T>) {
        T::atomic_add(&self.cells[2 * idx], val.re);
        T::atomic_add(&self.cells[2 * idx + 1], val.im);
    }

    /// Current value of one cell
    #[inline]
    pub fn get(&self, idx: usize) -> Complex<T> {
        Complex::new(
            T::atomic_load(&self.cells[2 * idx]),
            T::atomic_load(&self.cells[2 * idx + 1]),
        )
    }

    /// Overwrite `out` with the accumulated values.
    ///
    /// ### Params
    ///
    /// * `out` - Destination, same length as the grid
    pub fn write_to(&self, out: &mut [Complex<T>]) {
        out.par_iter_mut()
            .enumerate()
            .for_each(|(idx, v)| *v = self.get(idx));
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NufftError;
    use approx::assert_relative_eq;

    #[test]
    fn test_concurrent_adds_accumulate() {
        let grid = AtomicGrid::<f64>::new(4).unwrap();
        (0..1000).into_par_iter().for_each(|i| {
            grid.add(i % 4, Complex::new(1.0, -0.5));
        });
        let mut out = vec![Complex::new(9.0, 9.0); 4];
        grid.write_to(&mut out);
        for v in out {
            assert_relative_eq!(v.re, 250.0);
            assert_relative_eq!(v.im, -125.0);
        }
    }

    #[test]
    fn test_oversized_grid_is_an_error() {
        for len in [usize::MAX / 4, usize::MAX] {
            assert!(matches!(
                AtomicGrid::<f64>::new(len),
                Err(NufftError::Internal(_))
            ));
            assert!(matches!(
                AtomicGrid::<f32>::new(len),
                Err(NufftError::Internal(_))
            ));
        }
    }
}

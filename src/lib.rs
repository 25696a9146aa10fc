#![allow(clippy::needless_range_loop)] // Grid code reads better with index loops

pub mod binsort;
pub mod deconvolve;
pub mod direct;
pub mod error;
pub mod interp;
pub mod kernel;
pub mod macros;
pub mod params;
pub mod plan;
pub mod points;
pub mod prelude;
pub mod spread;
pub mod utils;

use num_complex::Complex;
use std::time::Instant;
use thousands::*;

pub use crate::error::{NufftError, Result};
pub use crate::params::*;
pub use crate::plan::Plan;
pub use crate::utils::fft::NufftFloat;

////////////////////
// One-shot calls //
////////////////////

/// Total mode count of a grid, 0 for an empty dims slice
fn total_modes(grid_dims: &[usize]) -> usize {
    if grid_dims.is_empty() {
        0
    } else {
        grid_dims.iter().product()
    }
}

/// Type 1 NUFFT in one call: plan, set points, execute.
///
/// Computes `f_k = sum_j c_j exp(s i k . x_j)` for every mode `k`.
///
/// ### Params
///
/// * `coords` - One coordinate slice per axis; the rank is `coords.len()`
/// * `weights` - `num_transforms * M` strengths, transform-major
/// * `grid_dims` - Mode count per axis
/// * `direction` - Exponent sign `s`
/// * `num_transforms` - Transforms sharing the points
/// * `tol` - Requested relative accuracy
/// * `options` - Plan options
///
/// ### Returns
///
/// `num_transforms * prod(grid_dims)` modes in `options.mode_order`
pub fn nufft_type1<T: NufftFloat>(
    coords: &[&[T]],
    weights: &[Complex<T>],
    grid_dims: &[usize],
    direction: FftDirection,
    num_transforms: usize,
    tol: T,
    options: &NufftOptions,
) -> Result<Vec<Complex<T>>> {
    let start = Instant::now();
    let mut plan = Plan::new(
        TransformType::Type1,
        coords.len(),
        grid_dims,
        direction,
        num_transforms,
        tol,
        options,
    )?;
    plan.set_points(coords)?;

    let len = num_transforms * total_modes(grid_dims);
    let mut modes = vec![Complex::new(T::zero(), T::zero()); len];
    plan.execute_type1(weights, &mut modes)?;

    log::info!(
        "Type 1 NUFFT of {} points onto {} modes done in {:.2?}",
        plan.num_points().separate_with_underscores(),
        plan.grid_size().separate_with_underscores(),
        start.elapsed()
    );
    Ok(modes)
}

/// Type 2 NUFFT in one call: plan, set points, execute.
///
/// Computes `c_j = sum_k f_k exp(s i k . x_j)` at every point.
///
/// ### Params
///
/// * `coords` - One coordinate slice per axis; the rank is `coords.len()`
/// * `modes` - `num_transforms * prod(grid_dims)` modes in
///   `options.mode_order`
/// * `grid_dims` - Mode count per axis
/// * `direction` - Exponent sign `s`
/// * `num_transforms` - Transforms sharing the points
/// * `tol` - Requested relative accuracy
/// * `options` - Plan options
///
/// ### Returns
///
/// `num_transforms * M` point values
pub fn nufft_type2<T: NufftFloat>(
    coords: &[&[T]],
    modes: &[Complex<T>],
    grid_dims: &[usize],
    direction: FftDirection,
    num_transforms: usize,
    tol: T,
    options: &NufftOptions,
) -> Result<Vec<Complex<T>>> {
    let start = Instant::now();
    let mut plan = Plan::new(
        TransformType::Type2,
        coords.len(),
        grid_dims,
        direction,
        num_transforms,
        tol,
        options,
    )?;
    plan.set_points(coords)?;

    let len = num_transforms * plan.num_points();
    let mut weights = vec![Complex::new(T::zero(), T::zero()); len];
    plan.execute_type2(modes, &mut weights)?;

    log::info!(
        "Type 2 NUFFT of {} modes onto {} points done in {:.2?}",
        plan.grid_size().separate_with_underscores(),
        plan.num_points().separate_with_underscores(),
        start.elapsed()
    );
    Ok(weights)
}

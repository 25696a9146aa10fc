use rayon::prelude::*;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::binsort::SortOutcome;
use crate::points::Points;
use crate::utils::fft::NufftFloat;
use crate::utils::math::{exclusive_prefix_sum, inclusive_prefix_sum};

/// Device bin sizes for rank 2
pub const DEVICE_BIN_SIZES_2D: [usize; 3] = [32, 32, 1];

/// Device bin sizes for rank 3
pub const DEVICE_BIN_SIZES_3D: [usize; 3] = [16, 16, 2];

/// Default maximum points per device subproblem
pub const DEVICE_MAX_SUBPROBLEM_SIZE: usize = 1024;

///////////////
// BinLayout //
///////////////

/// Spatial bins of the device path.
///
/// ### Fields
///
/// * `bin_sizes` - Bin extent per axis in fine grid cells
/// * `num_bins` - `ceil(nf / bin_size)` per axis, 1 on unused axes
/// * `bin_counts` - Points per bin
/// * `bin_starts` - Exclusive prefix sum of `bin_counts`
/// * `subproblems` - Subproblem decomposition, when requested
#[derive(Clone, Debug)]
pub struct BinLayout {
    pub bin_sizes: [usize; 3],
    pub num_bins: [usize; 3],
    pub bin_counts: Vec<usize>,
    pub bin_starts: Vec<usize>,
    pub subproblems: Option<Subproblems>,
}

/// Bins split into chunks of at most `max_size` points.
///
/// ### Fields
///
/// * `max_size` - Upper bound on points per subproblem
/// * `starts` - `starts[b]` is the first subproblem of bin `b`;
///   `starts[num_bins]` is the total
/// * `to_bin` - Owning bin of every subproblem
#[derive(Clone, Debug)]
pub struct Subproblems {
    pub max_size: usize,
    pub starts: Vec<usize>,
    pub to_bin: Vec<usize>,
}

impl BinLayout {
    /// Total number of bins
    pub fn total_bins(&self) -> usize {
        self.num_bins.iter().product()
    }

    /// Per-axis bin coordinates of flat bin `b`
    #[inline]
    pub fn bin_coords(&self, b: usize) -> [usize; 3] {
        let [n0, n1, _] = self.num_bins;
        [b % n0, (b / n0) % n1, b / (n0 * n1)]
    }

    /// Fine grid cell at the lower corner of bin `b`
    #[inline]
    pub fn bin_origin(&self, b: usize) -> [usize; 3] {
        let c = self.bin_coords(b);
        [
            c[0] * self.bin_sizes[0],
            c[1] * self.bin_sizes[1],
            c[2] * self.bin_sizes[2],
        ]
    }

    /// Positions (in permutation order) of the points of bin `b`
    pub fn bin_range(&self, b: usize) -> Range<usize> {
        self.bin_starts[b]..self.bin_starts[b] + self.bin_counts[b]
    }
}

impl Subproblems {
    /// Number of subproblems
    pub fn len(&self) -> usize {
        self.to_bin.len()
    }

    /// Returns `true` if there are no subproblems
    pub fn is_empty(&self) -> bool {
        self.to_bin.is_empty()
    }

    /// Positions (in permutation order) of the points of subproblem `s`
    pub fn point_range(&self, s: usize, layout: &BinLayout) -> Range<usize> {
        let b = self.to_bin[s];
        let bin = layout.bin_range(b);
        let begin = bin.start + (s - self.starts[b]) * self.max_size;
        begin..(begin + self.max_size).min(bin.end)
    }
}

/////////////
// Binning //
/////////////

/// Number of device bins per axis, `ceil(nf / bin_size)`
pub fn device_bin_counts(dims: [usize; 3], bin_sizes: [usize; 3], rank: usize) -> [usize; 3] {
    let mut nbins = [1; 3];
    for axis in 0..rank {
        nbins[axis] = dims[axis].div_ceil(bin_sizes[axis]).max(1);
    }
    nbins
}

#[inline]
fn device_bin_index<T: NufftFloat>(
    points: &Points<T>,
    i: usize,
    bin_sizes: &[usize; 3],
    nbins: &[usize; 3],
) -> usize {
    let mut idx = [0usize; 3];
    for axis in 0..points.rank() {
        let x = points.rescaled(axis, i).to_f64_lossy();
        let b = (x / bin_sizes[axis] as f64).floor();
        idx[axis] = if b < 0.0 {
            0
        } else {
            (b as usize).min(nbins[axis] - 1)
        };
    }
    idx[0] + nbins[0] * (idx[1] + nbins[1] * idx[2])
}

/// Bin points one work item per point.
///
/// Every point takes its slot inside its bin with an atomic
/// fetch-and-increment on the bin counter; an exclusive scan over the
/// counts gives bin starts and a second pass scatters each point into
/// `permutation[bin_start + slot]`. Order within a bin is unspecified.
///
/// ### Params
///
/// * `points` - Folded point set
/// * `bin_sizes` - Bin extent per axis
///
/// ### Returns
///
/// Tuple of `(permutation, layout)`; the layout has no subproblems yet
pub fn bin_points_device<T: NufftFloat>(
    points: &Points<T>,
    bin_sizes: [usize; 3],
) -> (Vec<usize>, BinLayout) {
    let m = points.len();
    let num_bins = device_bin_counts(points.dims(), bin_sizes, points.rank());
    let total_bins: usize = num_bins.iter().product();

    let counters: Vec<AtomicUsize> = (0..total_bins).map(|_| AtomicUsize::new(0)).collect();
    let (bins, slots): (Vec<usize>, Vec<usize>) = (0..m)
        .into_par_iter()
        .map(|i| {
            let b = device_bin_index(points, i, &bin_sizes, &num_bins);
            (b, counters[b].fetch_add(1, Ordering::Relaxed))
        })
        .unzip();

    let bin_counts: Vec<usize> = counters.into_iter().map(AtomicUsize::into_inner).collect();
    let bin_starts = exclusive_prefix_sum(&bin_counts);

    let permutation: Vec<AtomicUsize> = (0..m).map(|_| AtomicUsize::new(0)).collect();
    (0..m).into_par_iter().for_each(|i| {
        permutation[bin_starts[bins[i]] + slots[i]].store(i, Ordering::Relaxed);
    });

    let layout = BinLayout {
        bin_sizes,
        num_bins,
        bin_counts,
        bin_starts,
        subproblems: None,
    };
    (
        permutation.into_iter().map(AtomicUsize::into_inner).collect(),
        layout,
    )
}

/// Split each bin into subproblems of at most `max_size` points.
///
/// `ceil(count / max_size)` subproblems per bin; an inclusive scan gives
/// `starts[1..]` and every subproblem records its owning bin.
pub fn build_subproblems(layout: &BinLayout, max_size: usize) -> Subproblems {
    let max_size = max_size.max(1);
    let per_bin: Vec<usize> = layout
        .bin_counts
        .par_iter()
        .map(|&c| c.div_ceil(max_size))
        .collect();

    let mut starts = Vec::with_capacity(per_bin.len() + 1);
    starts.push(0);
    starts.extend(inclusive_prefix_sum(&per_bin));

    let to_bin: Vec<usize> = (0..per_bin.len())
        .into_par_iter()
        .flat_map_iter(|b| std::iter::repeat(b).take(per_bin[b]))
        .collect();

    Subproblems {
        max_size,
        starts,
        to_bin,
    }
}

/// Device sort entry point.
///
/// ### Params
///
/// * `points` - Folded point set
/// * `bin_sizes` - Bin extent per axis
/// * `max_subproblem_size` - `Some` to build subproblems as well
///
/// ### Returns
///
/// The sorted outcome with its bin layout attached
pub fn sort_points_device<T: NufftFloat>(
    points: &Points<T>,
    bin_sizes: [usize; 3],
    max_subproblem_size: Option<usize>,
) -> SortOutcome {
    let (permutation, mut layout) = bin_points_device(points, bin_sizes);
    if let Some(max) = max_subproblem_size {
        let subproblems = build_subproblems(&layout, max);
        log::debug!(
            "Device binning: {} bins, {} subproblems of at most {} points",
            layout.total_bins(),
            subproblems.len(),
            max
        );
        layout.subproblems = Some(subproblems);
    }
    SortOutcome::sorted(permutation, Some(layout))
}

///////////
// Tests //
///////////

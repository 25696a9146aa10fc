use num_complex::Complex;
use num_traits::Float;
use rayon::prelude::*;
use std::time::Instant;
use thousands::*;

use crate::binsort::device::{
    sort_points_device, DEVICE_BIN_SIZES_2D, DEVICE_BIN_SIZES_3D, DEVICE_MAX_SUBPROBLEM_SIZE,
};
use crate::binsort::{sort_points_host, SortOutcome};
use crate::deconvolve::Deconvolver;
use crate::ensure_min_len;
use crate::error::{NufftError, Result};
use crate::interp::interp_batch;
use crate::kernel::{resolve_kernel_eval_algo, KernelEvaluator, KernelParams};
use crate::params::{
    Backend, FftDirection, KernelEvalAlgo, NufftOptions, SortPoints, SpreadMethod,
    SpreadThreading, TransformType,
};
use crate::points::Points;
use crate::spread::{
    spread_batch, SpreadContext, SpreadOpts, SpreadStrategy, MAX_SUBPROBLEM_SIZE_1D,
    MAX_SUBPROBLEM_SIZE_ND,
};
use crate::utils::fft::{BatchedFft, NufftFloat};
use crate::utils::math::next_smooth_even;
use crate::utils::try_alloc;

/// Device batches never exceed this many transforms by default
const DEVICE_DEFAULT_BATCH: usize = 8;

/////////////////////
// Setup decisions //
/////////////////////

/// Default upsampling factor on the host: 2.0, or 1.25 for loose
/// tolerances on large grids.
///
/// ### Params
///
/// * `tol` - Clamped tolerance
/// * `rank` - Number of active axes
/// * `grid_size` - Total number of modes
pub fn default_upsampling_factor(tol: f64, rank: usize, grid_size: usize) -> f64 {
    let large = match rank {
        1 => grid_size > 10_000_000,
        2 => grid_size > 300_000,
        _ => grid_size > 3_000_000,
    };
    if tol >= 1e-9 && large {
        1.25
    } else {
        2.0
    }
}

/// Split `num_transforms` into batches.
///
/// ### Params
///
/// * `num_transforms` - Transforms per execution
/// * `threads` - Pool size
/// * `max_batch_size` - User cap, 0 for automatic
/// * `backend` - Host spreads the work over the threads, device caps at 8
///
/// ### Returns
///
/// Tuple of `(batch_size, num_batches)`
pub fn batch_layout(
    num_transforms: usize,
    threads: usize,
    max_batch_size: usize,
    backend: Backend,
) -> (usize, usize) {
    let batch_size = match (max_batch_size, backend) {
        (0, Backend::Host) => {
            let num_batches = num_transforms.div_ceil(threads.max(1));
            num_transforms.div_ceil(num_batches)
        }
        (0, Backend::Device) => num_transforms.min(DEVICE_DEFAULT_BATCH),
        (max, _) => max.min(num_transforms),
    };
    (batch_size, num_transforms.div_ceil(batch_size))
}

/// Fine grid size along one axis.
///
/// ### Params
///
/// * `n` - Mode count
/// * `upsampling_factor` - Oversampling
/// * `width` - Kernel width
/// * `spread_only` - Use `n` itself, which must already be valid
/// * `max_size` - Hard cap for the float type
///
/// ### Returns
///
/// The smallest smooth even size `>= max(sigma * n, 2w)`
pub fn fine_grid_dim(
    n: usize,
    upsampling_factor: f64,
    width: usize,
    spread_only: bool,
    max_size: usize,
) -> Result<usize> {
    let base = if spread_only {
        n
    } else {
        (upsampling_factor * n as f64) as usize
    };
    let base = base.max(2 * width);
    if base > max_size {
        return Err(NufftError::internal(format!(
            "upsampled dim size too big: {} > {}",
            base, max_size
        )));
    }
    let nf = next_smooth_even(base);
    if spread_only && nf != n {
        return Err(NufftError::internal(format!(
            "invalid grid size {}: spread-only grids must be even, at least {} and have no prime \
             factors larger than 5",
            n,
            2 * width
        )));
    }
    Ok(nf)
}

/// Pick the spreading/interpolation strategy once at setup.
///
/// ### Params
///
/// * `backend` - Host or device
/// * `method` - Requested spread method
/// * `transform_type` - Type 1 spreads, type 2 interpolates
/// * `threading` - Host batch threading
///
/// ### Returns
///
/// The strategy, or `Unimplemented` for the placeholder methods
pub fn resolve_spread_strategy(
    backend: Backend,
    method: SpreadMethod,
    transform_type: TransformType,
    threading: SpreadThreading,
) -> Result<SpreadStrategy> {
    if matches!(method, SpreadMethod::Paul | SpreadMethod::BlockGather) {
        return Err(NufftError::unimplemented(format!(
            "spread method {:?} is not implemented",
            method
        )));
    }
    Ok(match backend {
        Backend::Host => SpreadStrategy::Host(match threading {
            SpreadThreading::Auto => SpreadThreading::ParallelSingleThreaded,
            t => t,
        }),
        Backend::Device => match (method, transform_type) {
            (SpreadMethod::NuptsDriven, _) => SpreadStrategy::DeviceNuptsDriven,
            (SpreadMethod::Subproblem, _) | (_, TransformType::Type1) => {
                SpreadStrategy::DeviceSubproblem
            }
            _ => SpreadStrategy::DeviceNuptsDriven,
        },
    })
}

//////////
// Plan //
//////////

/// A configured NUFFT: fine grid, kernel, FFT and point ordering, reused
/// across any number of executions.
///
/// Point coordinates are borrowed by [`Plan::set_points`] and must outlive
/// the plan's use of them (`'a`).
pub struct Plan<'a, T: NufftFloat> {
    transform_type: TransformType,
    rank: usize,
    grid_dims: [usize; 3],
    fine_dims: [usize; 3],
    direction: FftDirection,
    num_transforms: usize,
    batch_size: usize,
    num_batches: usize,
    tol: T,
    upsampling_factor: f64,
    threads: usize,
    options: NufftOptions,
    kernel_params: KernelParams<T>,
    kernel: KernelEvaluator<T>,
    deconvolver: Deconvolver<T>,
    spread_opts: SpreadOpts<T>,
    strategy: SpreadStrategy,
    bin_sizes: [usize; 3],
    fine: Vec<Complex<T>>,
    points: Option<Points<'a, T>>,
    sort: SortOutcome,
    fft: Option<BatchedFft<T>>,
    pool: rayon::ThreadPool,
}

impl<'a, T: NufftFloat> Plan<'a, T> {
    /// Create a plan.
    ///
    /// ### Params
    ///
    /// * `transform_type` - Type 1 or type 2
    /// * `rank` - Number of dimensions (1 to 3)
    /// * `grid_dims` - Mode count per axis (`rank` entries, axis 0 fastest)
    /// * `direction` - Exponent sign
    /// * `num_transforms` - Transforms sharing the points
    /// * `tol` - Requested relative accuracy
    /// * `options` - Plan options
    ///
    /// ### Returns
    ///
    /// The plan, or the first validation error
    pub fn new(
        transform_type: TransformType,
        rank: usize,
        grid_dims: &[usize],
        direction: FftDirection,
        num_transforms: usize,
        tol: T,
        options: &NufftOptions,
    ) -> Result<Self> {
        if transform_type == TransformType::Type3 {
            return Err(NufftError::unimplemented(
                "type-3 transforms are not implemented",
            ));
        }
        if !(1..=3).contains(&rank) {
            return Err(NufftError::unimplemented(format!(
                "rank {} is not implemented",
                rank
            )));
        }
        if grid_dims.len() != rank {
            return Err(NufftError::invalid(format!(
                "expected {} mode counts, got {}",
                rank,
                grid_dims.len()
            )));
        }
        if grid_dims.contains(&0) {
            return Err(NufftError::invalid(format!(
                "mode counts must be positive, got {:?}",
                grid_dims
            )));
        }
        if num_transforms < 1 {
            return Err(NufftError::invalid("num_transforms must be >= 1"));
        }
        if options.bin_sizes.iter().any(|&b| b < 0) {
            return Err(NufftError::invalid(format!(
                "bin sizes must not be negative, got {:?}",
                options.bin_sizes
            )));
        }
        if let Some(sigma) = options.upsampling_factor {
            if !(sigma > 1.0) {
                return Err(NufftError::invalid(format!(
                    "upsampling factor must be greater than 1, got {}",
                    sigma
                )));
            }
        }
        let backend = options.backend;
        if backend == Backend::Device && rank == 1 {
            return Err(NufftError::unimplemented(
                "the device backend supports ranks 2 and 3 only",
            ));
        }
        let strategy = resolve_spread_strategy(
            backend,
            options.spread_method,
            transform_type,
            options.spread_threading,
        )?;

        let threads = if options.num_threads > 0 {
            options.num_threads
        } else {
            rayon::current_num_threads()
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| NufftError::internal(format!("failed to build thread pool: {}", e)))?;

        let mut dims = [1usize; 3];
        dims[..rank].copy_from_slice(grid_dims);
        let grid_size: usize = dims.iter().product();

        let tol = Float::max(tol, T::MACHINE_EPSILON);
        let upsampling_factor = match (options.upsampling_factor, backend) {
            (Some(sigma), _) => sigma,
            (None, Backend::Host) => default_upsampling_factor(tol.to_f64_lossy(), rank, grid_size),
            (None, Backend::Device) => 2.0,
        };

        let algo = resolve_kernel_eval_algo(options.kernel_eval_algo, upsampling_factor, backend)?;
        let mut kernel_params = KernelParams::from_tolerance(tol, upsampling_factor);
        if options.spread_only {
            kernel_params = kernel_params.with_spread_only_scale(rank);
        }
        let kernel = KernelEvaluator::new(&kernel_params, algo)?;

        let mut fine_dims = [1usize; 3];
        for axis in 0..rank {
            fine_dims[axis] = fine_grid_dim(
                dims[axis],
                upsampling_factor,
                kernel_params.width,
                options.spread_only,
                T::MAX_GRID_SIZE,
            )?;
        }
        let fine_size: usize = fine_dims.iter().product();

        let (batch_size, num_batches) =
            batch_layout(num_transforms, threads, options.max_batch_size, backend);
        if fine_size.saturating_mul(batch_size) > T::MAX_GRID_SIZE {
            return Err(NufftError::internal(format!(
                "batched fine grid too big: {} x {} > {}",
                fine_size,
                batch_size,
                T::MAX_GRID_SIZE
            )));
        }

        let deconvolver =
            Deconvolver::new(rank, dims, fine_dims, &kernel_params, options.mode_order);

        let (fft, fine) = if options.spread_only {
            (None, Vec::new())
        } else {
            let len = fine_size * batch_size;
            let mut fine = try_alloc(len, "fine grid")?;
            fine.resize(len, Complex::new(T::zero(), T::zero()));
            let fft = BatchedFft::new(rank, fine_dims, batch_size, direction)?;
            (Some(fft), fine)
        };

        let max_subproblem_size = match (options.max_subproblem_size, backend) {
            (0, Backend::Host) if rank == 1 => MAX_SUBPROBLEM_SIZE_1D,
            (0, Backend::Host) => MAX_SUBPROBLEM_SIZE_ND,
            (0, Backend::Device) => DEVICE_MAX_SUBPROBLEM_SIZE,
            (max, _) => max,
        };

        let defaults = if rank == 2 {
            DEVICE_BIN_SIZES_2D
        } else {
            DEVICE_BIN_SIZES_3D
        };
        let mut bin_sizes = [1usize; 3];
        for axis in 0..rank {
            bin_sizes[axis] = match options.bin_sizes[axis] {
                0 => defaults[axis],
                b => b as usize,
            };
        }

        let spread_opts = SpreadOpts {
            rank,
            dims: fine_dims,
            max_subproblem_size,
            atomic_threshold: options.atomic_threshold,
            spread_only: options.spread_only,
            scale: kernel_params.scale,
        };

        log::debug!(
            "NUFFT {:?} plan: rank {}, modes {:?}, fine grid {:?}, {} transform(s) in {} batch(es) \
             of {}",
            transform_type,
            rank,
            &dims[..rank],
            &fine_dims[..rank],
            num_transforms,
            num_batches,
            batch_size
        );
        log::debug!(
            "Kernel: width {}, beta {:.3}, sigma {}, {:?} evaluation; {:?} on {} thread(s)",
            kernel_params.width,
            kernel_params.beta,
            upsampling_factor,
            kernel.algo(),
            strategy,
            threads
        );

        Ok(Self {
            transform_type,
            rank,
            grid_dims: dims,
            fine_dims,
            direction,
            num_transforms,
            batch_size,
            num_batches,
            tol,
            upsampling_factor,
            threads,
            options: options.clone(),
            kernel_params,
            kernel,
            deconvolver,
            spread_opts,
            strategy,
            bin_sizes,
            fine,
            points: None,
            sort: SortOutcome::default(),
            fft,
            pool,
        })
    }

    /// Set (or replace) the nonuniform points.
    ///
    /// ### Params
    ///
    /// * `coords` - One coordinate slice per axis, all of the same length
    pub fn set_points(&mut self, coords: &[&'a [T]]) -> Result<()> {
        let points = Points::new(
            coords,
            self.rank,
            self.fine_dims,
            self.options.point_domain,
        )?;
        if self.options.check_points_range {
            points.check_range()?;
        }

        let start = Instant::now();
        let strategy = self.strategy;
        let policy = self.options.sort_points;
        let direction = self.transform_type.spread_direction();
        let threads = self.threads;
        let sort_threads = self.options.sort_threads;
        let bin_sizes = self.bin_sizes;
        let max_sub = self.spread_opts.max_subproblem_size;

        let sort = self.pool.install(|| match strategy {
            SpreadStrategy::Host(_) => {
                sort_points_host(&points, policy, direction, threads, sort_threads)
            }
            SpreadStrategy::DeviceSubproblem => {
                sort_points_device(&points, bin_sizes, Some(max_sub))
            }
            SpreadStrategy::DeviceNuptsDriven if policy == SortPoints::No => {
                SortOutcome::identity(points.len())
            }
            SpreadStrategy::DeviceNuptsDriven => sort_points_device(&points, bin_sizes, None),
        });

        log::debug!(
            "Set {} points (sorted: {}) in {:.2?}",
            points.len().separate_with_underscores(),
            sort.did_sort,
            start.elapsed()
        );

        self.points = Some(points);
        self.sort = sort;
        Ok(())
    }

    /// Run the transform on every batch.
    ///
    /// Type 1 reads `weights` and writes `modes`; type 2 reads `modes` and
    /// writes `weights`.
    ///
    /// ### Params
    ///
    /// * `weights` - `num_transforms * num_points` point values
    /// * `modes` - `num_transforms * grid_size` mode values
    pub fn execute(
        &mut self,
        weights: &mut [Complex<T>],
        modes: &mut [Complex<T>],
    ) -> Result<()> {
        match self.transform_type {
            TransformType::Type2 => self.execute_type2(modes, weights),
            _ => self.execute_type1(weights, modes),
        }
    }

    /// Type 1 execution: spread, FFT, deconvolve.
    ///
    /// ### Params
    ///
    /// * `weights` - `num_transforms * num_points` strengths
    /// * `modes` - `num_transforms * grid_size` outputs
    pub fn execute_type1(
        &mut self,
        weights: &[Complex<T>],
        modes: &mut [Complex<T>],
    ) -> Result<()> {
        self.check_executable(TransformType::Type1)?;
        let m = self.num_points();
        let gs = self.grid_size();
        let fs = self.fine_size();
        ensure_min_len!(weights, self.num_transforms * m, "weights");
        ensure_min_len!(modes, self.num_transforms * gs, "modes");

        let Self {
            pool,
            fine,
            fft,
            points,
            sort,
            kernel,
            spread_opts,
            deconvolver,
            strategy,
            threads,
            batch_size,
            num_batches,
            num_transforms,
            ..
        } = self;
        let (Some(points), Some(fft)) = (points.as_ref(), fft.as_ref()) else {
            return Err(NufftError::internal("plan is missing points or FFT"));
        };
        let ctx = SpreadContext {
            points,
            sort,
            kernel,
            opts: spread_opts,
            threads: *threads,
        };
        let deconvolver = &*deconvolver;
        let (bs, nt, strategy) = (*batch_size, *num_transforms, *strategy);

        pool.install(|| {
            for b in 0..*num_batches {
                let first = b * bs;
                let count = (nt - first).min(bs);
                let start = Instant::now();

                let c_batch = &weights[first * m..(first + count) * m];
                spread_batch(fine, c_batch, count, &ctx, strategy)?;
                fft.execute(fine)?;
                modes[first * gs..(first + count) * gs]
                    .par_chunks_mut(gs)
                    .zip(fine.par_chunks(fs))
                    .for_each(|(fk, fw)| deconvolver.modes_from_fine(fw, fk));

                log::trace!("Type 1 batch {} ({} transforms) in {:.2?}", b, count, start.elapsed());
            }
            Ok(())
        })
    }

    /// Type 2 execution: deconvolve and zero-pad, FFT, interpolate.
    ///
    /// ### Params
    ///
    /// * `modes` - `num_transforms * grid_size` inputs
    /// * `weights` - `num_transforms * num_points` outputs
    pub fn execute_type2(
        &mut self,
        modes: &[Complex<T>],
        weights: &mut [Complex<T>],
    ) -> Result<()> {
        self.check_executable(TransformType::Type2)?;
        let m = self.num_points();
        let gs = self.grid_size();
        let fs = self.fine_size();
        ensure_min_len!(weights, self.num_transforms * m, "weights");
        ensure_min_len!(modes, self.num_transforms * gs, "modes");

        let Self {
            pool,
            fine,
            fft,
            points,
            sort,
            kernel,
            spread_opts,
            deconvolver,
            strategy,
            threads,
            batch_size,
            num_batches,
            num_transforms,
            ..
        } = self;
        let (Some(points), Some(fft)) = (points.as_ref(), fft.as_ref()) else {
            return Err(NufftError::internal("plan is missing points or FFT"));
        };
        let ctx = SpreadContext {
            points,
            sort,
            kernel,
            opts: spread_opts,
            threads: *threads,
        };
        let deconvolver = &*deconvolver;
        let (bs, nt, strategy) = (*batch_size, *num_transforms, *strategy);

        pool.install(|| {
            for b in 0..*num_batches {
                let first = b * bs;
                let count = (nt - first).min(bs);
                let start = Instant::now();

                fine[..count * fs]
                    .par_chunks_mut(fs)
                    .zip(modes[first * gs..(first + count) * gs].par_chunks(gs))
                    .for_each(|(fw, fk)| deconvolver.fine_from_modes(fk, fw));
                fft.execute(fine)?;
                interp_batch(
                    fine,
                    &mut weights[first * m..(first + count) * m],
                    count,
                    &ctx,
                    strategy,
                )?;

                log::trace!("Type 2 batch {} ({} transforms) in {:.2?}", b, count, start.elapsed());
            }
            Ok(())
        })
    }

    /// Spread only: points to uniform grids, no FFT and no deconvolution.
    ///
    /// ### Params
    ///
    /// * `weights` - `num_transforms * num_points` strengths
    /// * `grid` - `num_transforms * fine_size` outputs
    pub fn spread(&self, weights: &[Complex<T>], grid: &mut [Complex<T>]) -> Result<()> {
        let ctx = self.context()?;
        let m = self.num_points();
        let fs = self.fine_size();
        ensure_min_len!(weights, self.num_transforms * m, "weights");
        ensure_min_len!(grid, self.num_transforms * fs, "grid");

        self.pool.install(|| {
            for b in 0..self.num_batches {
                let first = b * self.batch_size;
                let count = (self.num_transforms - first).min(self.batch_size);
                spread_batch(
                    &mut grid[first * fs..(first + count) * fs],
                    &weights[first * m..(first + count) * m],
                    count,
                    &ctx,
                    self.strategy,
                )?;
            }
            Ok(())
        })
    }

    /// Interpolate only: uniform grids to points, no FFT and no
    /// deconvolution.
    ///
    /// ### Params
    ///
    /// * `grid` - `num_transforms * fine_size` inputs
    /// * `weights` - `num_transforms * num_points` outputs
    pub fn interp(&self, grid: &[Complex<T>], weights: &mut [Complex<T>]) -> Result<()> {
        let ctx = self.context()?;
        let m = self.num_points();
        let fs = self.fine_size();
        ensure_min_len!(weights, self.num_transforms * m, "weights");
        ensure_min_len!(grid, self.num_transforms * fs, "grid");

        self.pool.install(|| {
            for b in 0..self.num_batches {
                let first = b * self.batch_size;
                let count = (self.num_transforms - first).min(self.batch_size);
                interp_batch(
                    &grid[first * fs..(first + count) * fs],
                    &mut weights[first * m..(first + count) * m],
                    count,
                    &ctx,
                    self.strategy,
                )?;
            }
            Ok(())
        })
    }

    fn check_executable(&self, expected: TransformType) -> Result<()> {
        if self.options.spread_only {
            return Err(NufftError::invalid(
                "execute is not available on a spread-only plan; use spread or interp",
            ));
        }
        if self.transform_type != expected {
            return Err(NufftError::invalid(format!(
                "plan computes {:?} transforms, not {:?}",
                self.transform_type, expected
            )));
        }
        if self.points.is_none() {
            return Err(NufftError::invalid("set_points must be called before execution"));
        }
        Ok(())
    }

    fn context(&self) -> Result<SpreadContext<'_, 'a, T>> {
        let points = self
            .points
            .as_ref()
            .ok_or_else(|| NufftError::invalid("set_points must be called before execution"))?;
        Ok(SpreadContext {
            points,
            sort: &self.sort,
            kernel: &self.kernel,
            opts: &self.spread_opts,
            threads: self.threads,
        })
    }

    ///////////////
    // Accessors //
    ///////////////

    /// Transform type
    pub fn transform_type(&self) -> TransformType {
        self.transform_type
    }

    /// Number of dimensions
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Exponent sign
    pub fn direction(&self) -> FftDirection {
        self.direction
    }

    /// Mode counts of the active axes
    pub fn grid_dims(&self) -> &[usize] {
        &self.grid_dims[..self.rank]
    }

    /// Fine grid dims of the active axes
    pub fn fine_dims(&self) -> &[usize] {
        &self.fine_dims[..self.rank]
    }

    /// Modes per transform
    pub fn grid_size(&self) -> usize {
        self.grid_dims.iter().product()
    }

    /// Fine grid cells per transform
    pub fn fine_size(&self) -> usize {
        self.fine_dims.iter().product()
    }

    /// Transforms per execution
    pub fn num_transforms(&self) -> usize {
        self.num_transforms
    }

    /// Transforms handled per FFT execution
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches per execution
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Points from the last `set_points`, 0 before
    pub fn num_points(&self) -> usize {
        self.points.as_ref().map_or(0, |p| p.len())
    }

    /// Clamped tolerance
    pub fn tolerance(&self) -> T {
        self.tol
    }

    /// Resolved upsampling factor
    pub fn upsampling_factor(&self) -> f64 {
        self.upsampling_factor
    }

    /// Size of the plan's thread pool
    pub fn num_threads(&self) -> usize {
        self.threads
    }

    /// Kernel parameters
    pub fn kernel_params(&self) -> &KernelParams<T> {
        &self.kernel_params
    }

    /// Resolved kernel evaluation algorithm
    pub fn kernel_eval_algo(&self) -> KernelEvalAlgo {
        self.kernel.algo()
    }

    /// Kernel Fourier-series coefficients of one axis
    pub fn fseries(&self, axis: usize) -> &[T] {
        &self.deconvolver.fseries[axis]
    }

    /// Resolved spreading strategy
    pub fn spread_strategy(&self) -> SpreadStrategy {
        self.strategy
    }

    /// Device bin sizes
    pub fn bin_sizes(&self) -> [usize; 3] {
        self.bin_sizes
    }

    /// Processing order of the points
    pub fn permutation(&self) -> &[usize] {
        &self.sort.permutation
    }

    /// Whether the last `set_points` sorted the points
    pub fn did_sort(&self) -> bool {
        self.sort.did_sort
    }
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> NufftOptions {
        NufftOptions {
            num_threads: 2,
            ..Default::default()
        }
    }

    fn forward_plan<'a, T: NufftFloat>(
        transform_type: TransformType,
        grid_dims: &[usize],
        num_transforms: usize,
        tol: T,
        options: &NufftOptions,
    ) -> Result<Plan<'a, T>> {
        Plan::new(
            transform_type,
            grid_dims.len(),
            grid_dims,
            FftDirection::Forward,
            num_transforms,
            tol,
            options,
        )
    }

    #[test]
    fn test_batch_layout() {
        assert_eq!(batch_layout(5, 8, 2, Backend::Host), (2, 3));
        assert_eq!(batch_layout(5, 2, 0, Backend::Host), (2, 3));
        assert_eq!(batch_layout(8, 4, 0, Backend::Host), (4, 2));
        assert_eq!(batch_layout(3, 16, 0, Backend::Host), (3, 1));
        assert_eq!(batch_layout(20, 4, 0, Backend::Device), (8, 3));
        assert_eq!(batch_layout(3, 4, 10, Backend::Device), (3, 1));
    }

    #[test]
    fn test_default_upsampling_factor() {
        assert_eq!(default_upsampling_factor(1e-6, 1, 10_000_001), 1.25);
        assert_eq!(default_upsampling_factor(1e-6, 1, 10_000_000), 2.0);
        assert_eq!(default_upsampling_factor(1e-6, 2, 300_001), 1.25);
        assert_eq!(default_upsampling_factor(1e-6, 3, 3_000_001), 1.25);
        assert_eq!(default_upsampling_factor(1e-10, 2, 10_000_000), 2.0);
    }

    #[test]
    fn test_fine_grid_dim() {
        assert_eq!(fine_grid_dim(10, 2.0, 7, false, usize::MAX).unwrap(), 20);
        assert_eq!(fine_grid_dim(3, 2.0, 7, false, usize::MAX).unwrap(), 16);
        assert_eq!(fine_grid_dim(51, 2.0, 7, false, usize::MAX).unwrap(), 108);
        assert_eq!(fine_grid_dim(32, 2.0, 7, true, usize::MAX).unwrap(), 32);
        assert!(matches!(
            fine_grid_dim(34, 2.0, 7, true, usize::MAX),
            Err(NufftError::Internal(_))
        ));
        assert!(matches!(
            fine_grid_dim(1000, 2.0, 7, false, 1000),
            Err(NufftError::Internal(_))
        ));
    }

    #[test]
    fn test_plan_validation() {
        let o = opts();
        let new = |t, rank, dims: &[usize], nt, o: &NufftOptions| {
            Plan::<f64>::new(t, rank, dims, FftDirection::Forward, nt, 1e-6, o).err()
        };
        assert!(matches!(
            new(TransformType::Type3, 1, &[8], 1, &o),
            Some(NufftError::Unimplemented(_))
        ));
        assert!(matches!(
            new(TransformType::Type1, 4, &[8, 8, 8, 8], 1, &o),
            Some(NufftError::Unimplemented(_))
        ));
        assert!(matches!(
            new(TransformType::Type1, 2, &[8], 1, &o),
            Some(NufftError::InvalidArgument(_))
        ));
        assert!(matches!(
            new(TransformType::Type1, 1, &[8], 0, &o),
            Some(NufftError::InvalidArgument(_))
        ));

        let bad_bins = NufftOptions {
            bin_sizes: [4, -1, 0],
            ..opts()
        };
        assert!(matches!(
            new(TransformType::Type1, 2, &[8, 8], 1, &bad_bins),
            Some(NufftError::InvalidArgument(_))
        ));

        let bad_sigma = NufftOptions {
            upsampling_factor: Some(1.0),
            ..opts()
        };
        assert!(matches!(
            new(TransformType::Type1, 1, &[8], 1, &bad_sigma),
            Some(NufftError::InvalidArgument(_))
        ));

        let horner = NufftOptions {
            upsampling_factor: Some(1.5),
            kernel_eval_algo: KernelEvalAlgo::Horner,
            ..opts()
        };
        assert!(matches!(
            new(TransformType::Type1, 1, &[8], 1, &horner),
            Some(NufftError::Unimplemented(_))
        ));

        let device_1d = NufftOptions {
            backend: Backend::Device,
            ..opts()
        };
        assert!(matches!(
            new(TransformType::Type1, 1, &[8], 1, &device_1d),
            Some(NufftError::Unimplemented(_))
        ));

        let paul = NufftOptions {
            spread_method: SpreadMethod::Paul,
            ..opts()
        };
        assert!(matches!(
            new(TransformType::Type1, 2, &[8, 8], 1, &paul),
            Some(NufftError::Unimplemented(_))
        ));
    }

    #[test]
    fn test_plan_setup_values() {
        let plan = Plan::<f64>::new(
            TransformType::Type1,
            2,
            &[10, 12],
            FftDirection::Forward,
            5,
            1e-20,
            &NufftOptions {
                max_batch_size: 2,
                ..opts()
            },
        )
        .unwrap();
        assert_eq!(plan.tolerance(), f64::EPSILON);
        assert_eq!(plan.batch_size(), 2);
        assert_eq!(plan.num_batches(), 3);
        assert_eq!(plan.kernel_params().width, 16);
        assert_eq!(plan.fine_dims(), &[32, 32]);
        assert_eq!(plan.fseries(0).len(), 17);
        assert_eq!(plan.kernel_eval_algo(), KernelEvalAlgo::Horner);
        assert_eq!(
            plan.spread_strategy(),
            SpreadStrategy::Host(SpreadThreading::ParallelSingleThreaded)
        );
    }

    #[test]
    fn test_device_strategy_defaults() {
        let device = NufftOptions {
            backend: Backend::Device,
            ..opts()
        };
        let t1 = forward_plan(TransformType::Type1, &[16, 16], 1, 1e-4f32, &device).unwrap();
        assert_eq!(t1.spread_strategy(), SpreadStrategy::DeviceSubproblem);
        assert_eq!(t1.kernel_eval_algo(), KernelEvalAlgo::Direct);
        assert_eq!(t1.bin_sizes(), [32, 32, 1]);

        let t2 = forward_plan(TransformType::Type2, &[8, 8, 8], 1, 1e-4f32, &device).unwrap();
        assert_eq!(t2.spread_strategy(), SpreadStrategy::DeviceNuptsDriven);
        assert_eq!(t2.bin_sizes(), [16, 16, 2]);
    }

    #[test]
    fn test_execute_guards() {
        let spread_only = NufftOptions {
            spread_only: true,
            ..opts()
        };
        let x = vec![0.0];
        let far = vec![10.0];
        let mut plan = forward_plan(TransformType::Type1, &[32], 1, 1e-6, &spread_only).unwrap();
        plan.set_points(&[&x[..]]).unwrap();
        let mut w = vec![Complex::new(1.0, 0.0)];
        let mut f = vec![Complex::new(0.0, 0.0); 32];
        assert!(matches!(
            plan.execute(&mut w, &mut f),
            Err(NufftError::InvalidArgument(_))
        ));

        let mut plan = forward_plan(TransformType::Type1, &[16], 2, 1e-6, &opts()).unwrap();
        assert!(matches!(
            plan.execute(&mut w, &mut f),
            Err(NufftError::InvalidArgument(_))
        ));
        plan.set_points(&[&x[..]]).unwrap();
        // Two transforms need two weights
        assert!(matches!(
            plan.execute(&mut w, &mut f),
            Err(NufftError::InvalidArgument(_))
        ));

        assert!(matches!(
            plan.set_points(&[&far[..]]),
            Err(NufftError::InvalidArgument(_))
        ));
    }
}

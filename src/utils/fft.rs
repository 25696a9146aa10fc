use num_complex::Complex;
use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustfft::{Fft, FftDirection as RustFftDirection, FftNum, FftPlanner};
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::{NufftError, Result};
use crate::params::FftDirection;

/// Planned 1-D transforms keyed by `(length, is_forward)`.
pub type FftCache<T> = HashMap<(usize, bool), Arc<dyn Fft<T>>>;

////////////
// Traits //
////////////

/// Trait defining floating-point types the NUFFT pipeline runs on.
///
/// Provides the machine constants the plan clamps against, an atomic cell
/// type for lock-free grid accumulation and a per-type cache of planned
/// FFTs owned by the process-wide [`FftService`].
pub trait NufftFloat:
    FftNum
    + Float
    + NumAssign
    + FromPrimitive
    + ToPrimitive
    + Send
    + Sync
    + Debug
    + Display
    + 'static
{
    /// Smallest relative spacing; tolerances are clamped to at least this
    const MACHINE_EPSILON: Self;

    /// Hard cap on fine grid elements (per axis and per batch)
    const MAX_GRID_SIZE: usize;

    /// Atomic storage with the same bit width as `Self`
    type Atomic: Send + Sync;

    /// Atomic cell holding zero
    fn atomic_zero() -> Self::Atomic;

    /// Lock-free `cell += val`
    fn atomic_add(cell: &Self::Atomic, val: Self);

    /// Read the current value of an atomic cell
    fn atomic_load(cell: &Self::Atomic) -> Self;

    /// Convert from f64, rounding to the nearest representable value
    fn from_f64_lossy(v: f64) -> Self;

    /// Widen or pass through to f64
    fn to_f64_lossy(self) -> f64;

    /// Process-wide cache of planned transforms for this float type
    fn fft_cache() -> &'static Mutex<FftCache<Self>>;
}

/////////
// f64 //
/////////

impl NufftFloat for f64 {
    const MACHINE_EPSILON: Self = f64::EPSILON;
    const MAX_GRID_SIZE: usize = 100_000_000_000;

    type Atomic = AtomicU64;

    #[inline]
    fn atomic_zero() -> Self::Atomic {
        AtomicU64::new(0.0f64.to_bits())
    }

    #[inline]
    fn atomic_add(cell: &Self::Atomic, val: Self) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + val).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(seen) => current = seen,
            }
        }
    }

    #[inline]
    fn atomic_load(cell: &Self::Atomic) -> Self {
        f64::from_bits(cell.load(Ordering::Relaxed))
    }

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64_lossy(self) -> f64 {
        self
    }

    fn fft_cache() -> &'static Mutex<FftCache<Self>> {
        static CACHE: OnceLock<Mutex<FftCache<f64>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }
}

/////////
// f32 //
/////////

impl NufftFloat for f32 {
    const MACHINE_EPSILON: Self = f32::EPSILON;
    const MAX_GRID_SIZE: usize = 1_000_000_000;

    type Atomic = AtomicU32;

    #[inline]
    fn atomic_zero() -> Self::Atomic {
        AtomicU32::new(0.0f32.to_bits())
    }

    #[inline]
    fn atomic_add(cell: &Self::Atomic, val: Self) {
        let mut current = cell.load(Ordering::Relaxed);
        loop {
            let next = (f32::from_bits(current) + val).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(seen) => current = seen,
            }
        }
    }

    #[inline]
    fn atomic_load(cell: &Self::Atomic) -> Self {
        f32::from_bits(cell.load(Ordering::Relaxed))
    }

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64_lossy(self) -> f64 {
        self as f64
    }

    fn fft_cache() -> &'static Mutex<FftCache<Self>> {
        static CACHE: OnceLock<Mutex<FftCache<f32>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }
}

////////////////
// FftService //
////////////////

#[derive(Debug, Default)]
struct ServiceState {
    active: usize,
    init_count: usize,
    cleanup_count: usize,
}

fn service_state() -> &'static Mutex<ServiceState> {
    static STATE: OnceLock<Mutex<ServiceState>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(ServiceState::default()))
}

/// Process-wide, reference-counted FFT service.
///
/// Every plan that needs transforms holds an [`FftLease`]. The first live
/// lease initialises the service, dropping the last live lease tears it
/// down (planned transforms are released) exactly once. All plan creation
/// happens under the service mutex.
pub struct FftService;

/// Proof of a live reference on the [`FftService`]. Released on drop.
#[derive(Debug)]
pub struct FftLease {
    _private: (),
}

impl FftService {
    /// Take a reference on the service, initialising it if this is the
    /// first live lease.
    pub fn acquire() -> FftLease {
        let mut state = service_state().lock();
        if state.active == 0 {
            state.init_count += 1;
            log::debug!("FFT service initialised (cycle {})", state.init_count);
        }
        state.active += 1;
        FftLease { _private: () }
    }

    fn release() {
        let mut state = service_state().lock();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            f32::fft_cache().lock().clear();
            f64::fft_cache().lock().clear();
            state.cleanup_count += 1;
            log::debug!("FFT service cleaned up (cycle {})", state.cleanup_count);
        }
    }

    /// Plan (or fetch from the cache) a 1-D transform.
    ///
    /// ### Params
    ///
    /// * `_lease` - A live lease; planning without one is not allowed
    /// * `len` - Transform length
    /// * `direction` - Exponent sign of the transform
    ///
    /// ### Returns
    ///
    /// Shared handle to the planned transform
    pub fn plan<T: NufftFloat>(
        _lease: &FftLease,
        len: usize,
        direction: FftDirection,
    ) -> Arc<dyn Fft<T>> {
        let _state = service_state().lock();
        let forward = direction == FftDirection::Forward;
        let mut cache = T::fft_cache().lock();
        cache
            .entry((len, forward))
            .or_insert_with(|| {
                let rust_direction = if forward {
                    RustFftDirection::Forward
                } else {
                    RustFftDirection::Inverse
                };
                FftPlanner::<T>::new().plan_fft(len, rust_direction)
            })
            .clone()
    }

    /// Number of live leases across the process
    pub fn active_leases() -> usize {
        service_state().lock().active
    }

    /// How many times the service has been initialised
    pub fn init_count() -> usize {
        service_state().lock().init_count
    }

    /// How many times the service has been torn down
    pub fn cleanup_count() -> usize {
        service_state().lock().cleanup_count
    }
}

impl Drop for FftLease {
    fn drop(&mut self) {
        FftService::release();
    }
}

////////////////
// BatchedFft //
////////////////

/// Batched, in-place, unnormalised complex transform over fine grids.
///
/// ### Fields
///
/// * `dims` - Fine grid dims, axis 0 fastest; unused axes are 1
/// * `rank` - Number of active axes
/// * `batch_size` - Number of contiguous grids transformed per call
/// * `axes` - One planned 1-D transform per active axis
/// * `_lease` - Service reference; dropped after the planned transforms
pub struct BatchedFft<T: NufftFloat> {
    dims: [usize; 3],
    rank: usize,
    batch_size: usize,
    axes: Vec<Arc<dyn Fft<T>>>,
    _lease: FftLease,
}

impl<T: NufftFloat> BatchedFft<T> {
    /// Plan a batched transform.
    ///
    /// ### Params
    ///
    /// * `rank` - Number of active axes (1 to 3)
    /// * `dims` - Fine grid dims per axis
    /// * `batch_size` - Grids per execution
    /// * `direction` - Exponent sign
    ///
    /// ### Returns
    ///
    /// The planned transform, or an `Internal` error for empty grids
    pub fn new(
        rank: usize,
        dims: [usize; 3],
        batch_size: usize,
        direction: FftDirection,
    ) -> Result<Self> {
        if dims[..rank].iter().any(|&n| n == 0) || batch_size == 0 {
            return Err(NufftError::internal(format!(
                "cannot plan FFT over dims {:?} with batch size {}",
                &dims[..rank],
                batch_size
            )));
        }
        let lease = FftService::acquire();
        let axes = (0..rank)
            .map(|axis| FftService::plan::<T>(&lease, dims[axis], direction))
            .collect();

        Ok(Self {
            dims,
            rank,
            batch_size,
            axes,
            _lease: lease,
        })
    }

    /// Elements per grid
    pub fn element_len(&self) -> usize {
        self.dims.iter().product()
    }

    /// Grids per execution
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Transform every grid of the batch in place.
    ///
    /// ### Params
    ///
    /// * `data` - `batch_size` contiguous grids
    pub fn execute(&self, data: &mut [Complex<T>]) -> Result<()> {
        let elem_len = self.element_len();
        if data.len() != elem_len * self.batch_size {
            return Err(NufftError::internal(format!(
                "FFT buffer holds {} elements, plan expects {}",
                data.len(),
                elem_len * self.batch_size
            )));
        }

        data.par_chunks_mut(elem_len).for_each(|grid| {
            for axis in 0..self.rank {
                transform_axis(grid, &self.dims, axis, &self.axes[axis]);
            }
        });

        Ok(())
    }
}

/////////////
// Helpers //
/////////////

/// Apply a 1-D transform along one axis of a single grid.
///
/// Axis 0 is contiguous and transformed in place; other axes are gathered
/// into contiguous lines, transformed and scattered back.
fn transform_axis<T: NufftFloat>(
    grid: &mut [Complex<T>],
    dims: &[usize; 3],
    axis: usize,
    fft: &Arc<dyn Fft<T>>,
) {
    let n = dims[axis];
    if n <= 1 {
        return;
    }
    let zero = Complex::new(T::zero(), T::zero());
    let scratch_len = fft.get_inplace_scratch_len();

    if axis == 0 {
        grid.par_chunks_mut(n).for_each_init(
            || vec![zero; scratch_len],
            |scratch, line| fft.process_with_scratch(line, scratch),
        );
        return;
    }

    let stride: usize = dims[..axis].iter().product();
    let block = stride * n;
    let mut lines = vec![zero; grid.len()];

    {
        let src: &[Complex<T>] = grid;
        lines
            .par_chunks_mut(n)
            .enumerate()
            .for_each(|(l, line)| {
                let base = (l / stride) * block + l % stride;
                for (i, v) in line.iter_mut().enumerate() {
                    *v = src[base + i * stride];
                }
            });
    }

    lines.par_chunks_mut(n).for_each_init(
        || vec![zero; scratch_len],
        |scratch, line| fft.process_with_scratch(line, scratch),
    );

    grid.par_chunks_mut(block)
        .enumerate()
        .for_each(|(outer, blk)| {
            for inner in 0..stride {
                let line = &lines[(outer * stride + inner) * n..(outer * stride + inner + 1) * n];
                for (i, &v) in line.iter().enumerate() {
                    blk[inner + i * stride] = v;
                }
            }
        });
}

///////////
// Tests //
///////////

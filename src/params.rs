/////////////////////
// Transform enums //
/////////////////////

/// Which transform a plan computes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformType {
    /// Nonuniform points to uniform modes
    Type1,
    /// Uniform modes to nonuniform points
    Type2,
    /// Nonuniform to nonuniform; recognised but not implemented
    Type3,
}

/// Sign of the exponent in the transform
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FftDirection {
    /// `exp(-i k x)`
    #[default]
    Forward,
    /// `exp(+i k x)`
    Backward,
}

impl FftDirection {
    /// Exponent sign as a float (`-1.0` or `1.0`)
    pub fn sign(self) -> f64 {
        match self {
            FftDirection::Forward => -1.0,
            FftDirection::Backward => 1.0,
        }
    }
}

/// Whether the kernel moves data from points to the grid or back
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadDirection {
    /// Points to fine grid
    Spread,
    /// Fine grid to points
    Interp,
}

impl TransformType {
    /// Spreading direction used by step 1/3 of the transform
    pub fn spread_direction(self) -> SpreadDirection {
        match self {
            TransformType::Type2 => SpreadDirection::Interp,
            _ => SpreadDirection::Spread,
        }
    }
}

//////////////////
// Option enums //
//////////////////

/// Kernel evaluation algorithm
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KernelEvalAlgo {
    /// Horner where available, else direct
    #[default]
    Auto,
    /// Exponential of semicircle evaluated directly
    Direct,
    /// Piecewise polynomial fitted at setup
    Horner,
}

/// Ordering of Fourier modes in the user-facing mode array
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ModeOrder {
    /// Contiguous from the most negative to the most positive mode
    #[default]
    Cmcl,
    /// Non-negative modes first, then the wrapped negative modes
    Fft,
}

/// Point sorting policy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortPoints {
    /// Sort when the density heuristic says it pays off
    #[default]
    Auto,
    /// Always sort
    Yes,
    /// Never sort
    No,
}

/// Spreading decomposition family
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpreadMethod {
    /// Subproblem for type 1, nonuniform-point driven for type 2
    #[default]
    Auto,
    /// One work item per point, atomic scatter
    NuptsDriven,
    /// Points grouped by bin into local buffers
    Subproblem,
    /// Recognised decomposition, not implemented
    Paul,
    /// Recognised decomposition, not implemented
    BlockGather,
}

/// How batch elements share the thread pool while spreading
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SpreadThreading {
    /// Resolves to `ParallelSingleThreaded`
    #[default]
    Auto,
    /// One batch element at a time, all threads on its subproblems
    SequentialMultiThreaded,
    /// Batch elements in parallel, each spread single-threaded
    ParallelSingleThreaded,
}

/// Periodic domain the nonuniform coordinates live in
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PointDomain {
    /// `[-pi, pi)`
    #[default]
    Pi,
    /// `[0, N)` in fine grid units
    Grid,
}

/// Execution backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Backend {
    /// Multi-core host design with bin sort and subproblem merges
    #[default]
    Host,
    /// Data-parallel design: one work item per point or subproblem, atomic
    /// accumulation into the shared grid
    Device,
}

/////////////
// Options //
/////////////

/// Plan configuration
///
/// ### Fields
///
/// * `max_batch_size` - Transforms per FFT execution; 0 picks automatically
/// * `upsampling_factor` - Fine grid oversampling; `None` picks 2.0 (host
///   may drop to 1.25 for large, loose-tolerance problems)
/// * `kernel_eval_algo` - Direct or Horner kernel evaluation
/// * `mode_order` - Layout of the mode array
/// * `sort_points` - Point sorting policy
/// * `spread_method` - Device spreading decomposition
/// * `spread_threading` - Host batch threading strategy
/// * `num_threads` - Worker threads; 0 uses the global rayon pool size
/// * `sort_threads` - Threads for the host bin sort; 0 uses the density
///   heuristic
/// * `atomic_threshold` - Host merges use atomics above this many threads
/// * `bin_sizes` - Device bin sizes per axis; 0 picks defaults, negative is
///   rejected
/// * `max_subproblem_size` - Points per subproblem; 0 picks defaults
/// * `spread_only` - Plan only spreads/interpolates (no FFT, normalised
///   kernel)
/// * `check_points_range` - Validate coordinates in `set_points`
/// * `point_domain` - Periodic coordinate domain
/// * `backend` - Host or device-style execution
#[derive(Clone, Debug)]
pub struct NufftOptions {
    pub max_batch_size: usize,
    pub upsampling_factor: Option<f64>,
    pub kernel_eval_algo: KernelEvalAlgo,
    pub mode_order: ModeOrder,
    pub sort_points: SortPoints,
    pub spread_method: SpreadMethod,
    pub spread_threading: SpreadThreading,
    pub num_threads: usize,
    pub sort_threads: usize,
    pub atomic_threshold: usize,
    pub bin_sizes: [i64; 3],
    pub max_subproblem_size: usize,
    pub spread_only: bool,
    pub check_points_range: bool,
    pub point_domain: PointDomain,
    pub backend: Backend,
}

impl Default for NufftOptions {
    /// Returns the default plan configuration
    ///
    /// ### Returns
    ///
    /// * `max_batch_size = 0` - Automatic batching
    /// * `upsampling_factor = None` - Automatic (2.0 or 1.25)
    /// * `kernel_eval_algo = Auto`
    /// * `mode_order = Cmcl`
    /// * `sort_points = Auto`
    /// * `spread_method = Auto`
    /// * `spread_threading = Auto`
    /// * `num_threads = 0` - Global pool size
    /// * `sort_threads = 0` - Density heuristic
    /// * `atomic_threshold = 10`
    /// * `bin_sizes = [0, 0, 0]` - Backend defaults
    /// * `max_subproblem_size = 0` - Backend defaults
    /// * `spread_only = false`
    /// * `check_points_range = true`
    /// * `point_domain = Pi`
    /// * `backend = Host`
    fn default() -> Self {
        Self {
            max_batch_size: 0,
            upsampling_factor: None,
            kernel_eval_algo: KernelEvalAlgo::default(),
            mode_order: ModeOrder::default(),
            sort_points: SortPoints::default(),
            spread_method: SpreadMethod::default(),
            spread_threading: SpreadThreading::default(),
            num_threads: 0,
            sort_threads: 0,
            atomic_threshold: 10,
            bin_sizes: [0; 3],
            max_subproblem_size: 0,
            spread_only: false,
            check_points_range: true,
            point_domain: PointDomain::default(),
            backend: Backend::default(),
        }
    }
}

/////////////
// Parsers //
/////////////

/// Parse the transform type (`"type1"`, `"1"`, ...)
pub fn parse_transform_type(s: &str) -> Option<TransformType> {
    match s.to_lowercase().as_str() {
        "type1" | "type_1" | "1" => Some(TransformType::Type1),
        "type2" | "type_2" | "2" => Some(TransformType::Type2),
        "type3" | "type_3" | "3" => Some(TransformType::Type3),
        _ => None,
    }
}

/// Parse the transform direction (`"forward"` / `"backward"`)
pub fn parse_fft_direction(s: &str) -> Option<FftDirection> {
    match s.to_lowercase().as_str() {
        "forward" | "-1" => Some(FftDirection::Forward),
        "backward" | "inverse" | "1" | "+1" => Some(FftDirection::Backward),
        _ => None,
    }
}

/// Parse the kernel evaluation algorithm
pub fn parse_kernel_eval_algo(s: &str) -> Option<KernelEvalAlgo> {
    match s.to_lowercase().as_str() {
        "auto" => Some(KernelEvalAlgo::Auto),
        "direct" => Some(KernelEvalAlgo::Direct),
        "horner" => Some(KernelEvalAlgo::Horner),
        _ => None,
    }
}

/// Parse the mode order
pub fn parse_mode_order(s: &str) -> Option<ModeOrder> {
    match s.to_lowercase().as_str() {
        "cmcl" => Some(ModeOrder::Cmcl),
        "fft" => Some(ModeOrder::Fft),
        _ => None,
    }
}

/// Parse the sorting policy
pub fn parse_sort_points(s: &str) -> Option<SortPoints> {
    match s.to_lowercase().as_str() {
        "auto" => Some(SortPoints::Auto),
        "yes" | "true" => Some(SortPoints::Yes),
        "no" | "false" => Some(SortPoints::No),
        _ => None,
    }
}

/// Parse the spreading method
pub fn parse_spread_method(s: &str) -> Option<SpreadMethod> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "auto" => Some(SpreadMethod::Auto),
        "nupts-driven" | "point-driven" => Some(SpreadMethod::NuptsDriven),
        "subproblem" => Some(SpreadMethod::Subproblem),
        "paul" => Some(SpreadMethod::Paul),
        "block-gather" => Some(SpreadMethod::BlockGather),
        _ => None,
    }
}

/// Parse the batch threading strategy
pub fn parse_spread_threading(s: &str) -> Option<SpreadThreading> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "auto" => Some(SpreadThreading::Auto),
        "sequential-multi-threaded" => Some(SpreadThreading::SequentialMultiThreaded),
        "parallel-single-threaded" => Some(SpreadThreading::ParallelSingleThreaded),
        _ => None,
    }
}

/// Parse the point domain (`"pi"` or `"grid"`)
pub fn parse_point_domain(s: &str) -> Option<PointDomain> {
    match s.to_lowercase().as_str() {
        "pi" | "pirange" => Some(PointDomain::Pi),
        "grid" => Some(PointDomain::Grid),
        _ => None,
    }
}

/// Parse the backend (`"host"` or `"device"`)
pub fn parse_backend(s: &str) -> Option<Backend> {
    match s.to_lowercase().as_str() {
        "host" | "cpu" => Some(Backend::Host),
        "device" | "gpu" => Some(Backend::Device),
        _ => None,
    }
}

///////////
// Tests //
///////////

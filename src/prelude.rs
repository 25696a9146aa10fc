pub use crate::binsort::SortOutcome;
pub use crate::error::{NufftError, Result};
pub use crate::kernel::{KernelEvaluator, KernelParams};
pub use crate::params::{
    parse_backend, parse_fft_direction, parse_kernel_eval_algo, parse_mode_order,
    parse_point_domain, parse_sort_points, parse_spread_method, parse_spread_threading,
    parse_transform_type, Backend, FftDirection, KernelEvalAlgo, ModeOrder, NufftOptions,
    PointDomain, SortPoints, SpreadMethod, SpreadThreading, TransformType,
};
pub use crate::plan::Plan;
pub use crate::spread::SpreadStrategy;
pub use crate::utils::fft::NufftFloat;
pub use crate::{nufft_type1, nufft_type2};

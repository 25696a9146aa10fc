///////////////////
// Vector macros //
///////////////////

/// Return an `InvalidArgument` error unless all slices have the same length.
#[macro_export]
macro_rules! ensure_same_len {
    ($($vec:expr),+ $(,)?) => {
        {
            let lengths: Vec<usize> = vec![$($vec.len()),+];
            let first_len = lengths[0];

            if !lengths.iter().all(|&len| len == first_len) {
                return Err($crate::error::NufftError::InvalidArgument(format!(
                    "coordinate arrays have different lengths: {:?}",
                    lengths
                )));
            }
        }
    };
}

/// Return an `InvalidArgument` error unless a buffer holds at least `$min`
/// elements.
#[macro_export]
macro_rules! ensure_min_len {
    ($buf:expr, $min:expr, $what:expr) => {
        if $buf.len() < $min {
            return Err($crate::error::NufftError::InvalidArgument(format!(
                "{} buffer holds {} elements, expected at least {}",
                $what,
                $buf.len(),
                $min
            )));
        }
    };
}

pub mod atomic;
pub mod fft;
pub mod math;

use thousands::*;

use crate::error::{NufftError, Result};

/// Empty vector with room for exactly `len` elements.
///
/// Large grid buffers go through here so that an allocation the system
/// cannot serve surfaces as an error instead of aborting the process.
///
/// ### Params
///
/// * `len` - Number of elements to reserve
/// * `what` - Buffer name for the error message
///
/// ### Returns
///
/// The vector, or `NufftError::Internal` if the reservation fails
pub fn try_alloc<T>(len: usize, what: &str) -> Result<Vec<T>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        NufftError::internal(format!(
            "could not allocate {} with {} elements: {}",
            what,
            len.separate_with_underscores(),
            e
        ))
    })?;
    Ok(buf)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex;

    #[test]
    fn test_try_alloc_reserves_exactly() {
        let buf = try_alloc::<Complex<f64>>(1000, "grid").unwrap();
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 1000);
    }

    #[test]
    fn test_try_alloc_reports_impossible_sizes() {
        let err = try_alloc::<Complex<f64>>(usize::MAX / 8, "fine grid").unwrap_err();
        match err {
            NufftError::Internal(msg) => assert!(msg.contains("fine grid")),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(
            try_alloc::<Complex<f32>>(usize::MAX, "scratch"),
            Err(NufftError::Internal(_))
        ));
    }
}

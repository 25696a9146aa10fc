use rayon::prelude::*;
use std::f64::consts::PI;

/// Scan chunk; shorter inputs are scanned sequentially
const SCAN_CHUNK: usize = 4096;

//////////////////
// Grid helpers //
//////////////////

/// Smallest even integer `>= n` whose only prime factors are 2, 3 and 5.
///
/// ### Params
///
/// * `n` - Lower bound
///
/// ### Returns
///
/// The smooth size; 2 for any `n <= 2`
pub fn next_smooth_even(n: usize) -> usize {
    if n <= 2 {
        return 2;
    }
    let mut candidate = if n % 2 == 1 { n + 1 } else { n };
    loop {
        let mut rest = candidate;
        for p in [2, 3, 5] {
            while rest % p == 0 {
                rest /= p;
            }
        }
        if rest == 1 {
            return candidate;
        }
        candidate += 2;
    }
}

/// Returns `true` if `n` is even and 5-smooth (what [`next_smooth_even`]
/// would return for itself)
pub fn is_smooth_even(n: usize) -> bool {
    next_smooth_even(n) == n
}

/////////////////
// Prefix sums //
/////////////////

/// Exclusive prefix sum, parallel over chunks for long inputs.
///
/// ### Params
///
/// * `counts` - Values to scan
///
/// ### Returns
///
/// `out[i] = counts[0] + ... + counts[i - 1]`, `out[0] = 0`
pub fn exclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    if counts.len() <= SCAN_CHUNK {
        let mut out = Vec::with_capacity(counts.len());
        let mut acc = 0;
        for &c in counts {
            out.push(acc);
            acc += c;
        }
        return out;
    }

    let totals: Vec<usize> = counts
        .par_chunks(SCAN_CHUNK)
        .map(|chunk| chunk.iter().sum())
        .collect();
    let bases = exclusive_prefix_sum(&totals);

    let mut out = vec![0; counts.len()];
    out.par_chunks_mut(SCAN_CHUNK)
        .zip(counts.par_chunks(SCAN_CHUNK))
        .zip(bases.par_iter())
        .for_each(|((dst, src), &base)| {
            let mut acc = base;
            for (d, &c) in dst.iter_mut().zip(src) {
                *d = acc;
                acc += c;
            }
        });
    out
}

/// Inclusive prefix sum: `out[i] = counts[0] + ... + counts[i]`
pub fn inclusive_prefix_sum(counts: &[usize]) -> Vec<usize> {
    let mut out = exclusive_prefix_sum(counts);
    out.par_iter_mut()
        .zip(counts.par_iter())
        .for_each(|(o, &c)| *o += c);
    out
}

///////////////
// Quadrature //
///////////////

/// Gauss-Legendre nodes and weights on [-1, 1].
///
/// Newton iteration on the Legendre polynomial from the usual cosine
/// initial guesses.
///
/// ### Params
///
/// * `n` - Number of nodes
///
/// ### Returns
///
/// Tuple of `(nodes, weights)`, nodes in descending order
pub fn gauss_legendre(n: usize) -> (Vec<f64>, Vec<f64>) {
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    let nf = n as f64;

    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();

        for _ in 0..100 {
            let (p, p_prev) = legendre_pair(n, x);
            let dp = nf * (x * p - p_prev) / (x * x - 1.0);
            let dx = p / dp;
            x -= dx;
            if dx.abs() < 1e-15 {
                break;
            }
        }
        let (p, p_prev) = legendre_pair(n, x);
        let dp = nf * (x * p - p_prev) / (x * x - 1.0);

        nodes[i] = x;
        weights[i] = 2.0 / ((1.0 - x * x) * dp * dp);
    }

    (nodes, weights)
}

/// `(P_n(x), P_{n-1}(x))` by the three-term recurrence
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    let mut p_prev = 1.0;
    let mut p = x;
    if n == 0 {
        return (1.0, 0.0);
    }
    for k in 2..=n {
        let kf = k as f64;
        let next = ((2.0 * kf - 1.0) * x * p - (kf - 1.0) * p_prev) / kf;
        p_prev = p;
        p = next;
    }
    (p, p_prev)
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_smooth_even() {
        assert_eq!(next_smooth_even(0), 2);
        assert_eq!(next_smooth_even(2), 2);
        assert_eq!(next_smooth_even(3), 4);
        assert_eq!(next_smooth_even(13), 16);
        assert_eq!(next_smooth_even(14), 16);
        assert_eq!(next_smooth_even(17), 18);
        assert_eq!(next_smooth_even(31), 32);
        assert_eq!(next_smooth_even(33), 36);
        assert_eq!(next_smooth_even(97), 100);
        assert_eq!(next_smooth_even(121), 128);
        assert!(is_smooth_even(250));
        assert!(!is_smooth_even(14));
        assert!(!is_smooth_even(15));
    }

    #[test]
    fn test_prefix_sums_short_and_long() {
        let short = vec![3, 0, 2, 5];
        assert_eq!(exclusive_prefix_sum(&short), vec![0, 3, 3, 5]);
        assert_eq!(inclusive_prefix_sum(&short), vec![3, 3, 5, 10]);

        let long: Vec<usize> = (0..10_000).map(|i| i % 7).collect();
        let ex = exclusive_prefix_sum(&long);
        let mut acc = 0;
        for (i, &c) in long.iter().enumerate() {
            assert_eq!(ex[i], acc, "mismatch at {}", i);
            acc += c;
        }
        assert_eq!(*inclusive_prefix_sum(&long).last().unwrap(), acc);
    }

    #[test]
    fn test_gauss_legendre_integrates_polynomials() {
        let (x, w) = gauss_legendre(6);
        let total: f64 = w.iter().sum();
        assert!((total - 2.0).abs() < 1e-13);

        // Exact up to degree 11
        let int_x10: f64 = x.iter().zip(&w).map(|(xi, wi)| wi * xi.powi(10)).sum();
        assert!((int_x10 - 2.0 / 11.0).abs() < 1e-13);

        let odd: f64 = x.iter().zip(&w).map(|(xi, wi)| wi * xi.powi(5)).sum();
        assert!(odd.abs() < 1e-13);
    }
}

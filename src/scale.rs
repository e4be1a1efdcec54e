//! # Scaling and R2C geometry
//!
//! Post-pass element-wise scaling applied after the forward or backward
//! pipeline (spec §4.5/§6) plus the Hermitian-half geometry helper for an
//! R2C axis.

use num_complex::Complex;

/// Which scale factor a `forward`/`backward` call applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// No scaling.
    None,
    /// Multiply by `1 / (N0 * N1 * N2)`.
    Full,
    /// Multiply by `1 / sqrt(N0 * N1 * N2)` on both forward and backward.
    Symmetric,
}

/// `floor(n / 2) + 1`: the Hermitian-half length along an R2C axis.
#[must_use]
pub fn hermitian_half_len(n: usize) -> usize {
    n / 2 + 1
}

/// Compute the scale factor for `scaling` given the three FFT axes' full
/// (unshortened) real lengths.
#[must_use]
pub fn scale_factor(scaling: Scaling, lengths: [usize; 3]) -> f64 {
    let base = 1.0 / (lengths[0] * lengths[1] * lengths[2]) as f64;
    match scaling {
        Scaling::None => 1.0,
        Scaling::Full => base,
        Scaling::Symmetric => base.sqrt(),
    }
}

/// Apply `factor` to every element of `data` in a single linear pass.
pub fn apply_real<T: rustfft::FftNum>(data: &mut [T], factor: T) {
    if factor == T::one() {
        return;
    }
    for v in data.iter_mut() {
        *v = *v * factor;
    }
}

/// Apply `factor` to every complex element of `data` in a single linear
/// pass.
pub fn apply_complex<T: rustfft::FftNum>(data: &mut [Complex<T>], factor: T) {
    if factor == T::one() {
        return;
    }
    for v in data.iter_mut() {
        *v = *v * factor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn scale_factors_match_spec() {
        let lengths = [4, 6, 8];
        let n = (4 * 6 * 8) as f64;
        assert_relative_eq!(scale_factor(Scaling::None, lengths), 1.0);
        assert_relative_eq!(scale_factor(Scaling::Full, lengths), 1.0 / n);
        assert_relative_eq!(scale_factor(Scaling::Symmetric, lengths), 1.0 / n.sqrt());
    }

    #[test]
    fn hermitian_half_matches_floor_formula() {
        assert_eq!(hermitian_half_len(8), 5);
        assert_eq!(hermitian_half_len(9), 5);
        assert_eq!(hermitian_half_len(1), 1);
    }

    #[test]
    fn apply_real_scales_every_element() {
        let mut data = vec![1.0_f64, 2.0, 3.0];
        apply_real(&mut data, 2.0);
        assert_eq!(data, vec![2.0, 4.0, 6.0]);
    }
}

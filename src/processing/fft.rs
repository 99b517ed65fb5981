//! In-place iterative radix-2 FFT.
//!
//! Fixed-size, allocation-free transform for the vibration window: a
//! bit-reversal permutation followed by log2(N) butterfly passes. Twiddle
//! factors come from the recurrence `w *= w_len` inside each group rather
//! than a precomputed table.

use std::f64::consts::PI;

use num_complex::Complex;

use super::ProcessingError;

/// Forward FFT of `buf` in place.
///
/// Lengths 0 and 1 are left untouched. Any other length must be a power of
/// two.
pub fn fft_in_place(buf: &mut [Complex<f64>]) -> Result<(), ProcessingError> {
    let n = buf.len();
    if n <= 1 {
        return Ok(());
    }
    if !n.is_power_of_two() {
        return Err(ProcessingError::NotPowerOfTwo(n));
    }

    // Bit-reversed addressing permutation
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            buf.swap(i, j);
        }
    }

    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let w_len = Complex::new(angle.cos(), angle.sin());
        let half = len / 2;
        for group in buf.chunks_exact_mut(len) {
            let mut w = Complex::new(1.0, 0.0);
            let (lo, hi) = group.split_at_mut(half);
            for (u, v) in lo.iter_mut().zip(hi.iter_mut()) {
                let t = *v * w;
                *v = *u - t;
                *u += t;
                w *= w_len;
            }
        }
        len <<= 1;
    }

    Ok(())
}

/// Complex modulus of every bin.
pub fn magnitude(buf: &[Complex<f64>]) -> Vec<f64> {
    buf.iter().map(|c| c.norm()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(xs: &[f64]) -> Vec<Complex<f64>> {
        xs.iter().map(|&x| Complex::new(x, 0.0)).collect()
    }

    /// O(N²) reference transform.
    fn naive_dft(xs: &[Complex<f64>]) -> Vec<Complex<f64>> {
        let n = xs.len();
        (0..n)
            .map(|k| {
                xs.iter().enumerate().fold(Complex::new(0.0, 0.0), |acc, (t, x)| {
                    let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                    acc + x * Complex::new(angle.cos(), angle.sin())
                })
            })
            .collect()
    }

    #[test]
    fn test_dc_signal_lands_in_bin_zero() {
        let mut buf = real(&[1.0; 8]);
        fft_in_place(&mut buf).expect("fft");
        let mags = magnitude(&buf);
        assert!((mags[0] - 8.0).abs() < 1e-9);
        assert!(mags[1..].iter().all(|m| m.abs() < 1e-9), "{mags:?}");
    }

    #[test]
    fn test_full_window_bin_zero_is_the_sum() {
        let input: Vec<f64> = (0..2048)
            .map(|i| 512.0 + f64::from((i * 37) % 101) - 50.0 + 80.0 * (f64::from(i) * 0.3).sin())
            .collect();
        let sum: f64 = input.iter().sum();
        let mean = sum / 2048.0;

        let mut buf = real(&input);
        fft_in_place(&mut buf).expect("fft");

        assert!((buf[0].re - sum).abs() < 1e-6 * sum, "{} vs {sum}", buf[0].re);
        assert!(buf[0].im.abs() < 1e-6);
        assert!((magnitude(&buf)[0] - mean * 2048.0).abs() < 1e-6 * sum);
    }

    #[test]
    fn test_matches_naive_dft() {
        let input: Vec<f64> = (0..64).map(|i| ((i * 37) % 11) as f64 - 5.0).collect();
        let mut fast = real(&input);
        fft_in_place(&mut fast).expect("fft");
        let slow = naive_dft(&real(&input));
        for (a, b) in fast.iter().zip(&slow) {
            assert!((a - b).norm() < 1e-9, "{a} vs {b}");
        }
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let n = 2048;
        let bin = 307;
        let mut buf: Vec<Complex<f64>> = (0..n)
            .map(|i| Complex::new((2.0 * PI * bin as f64 * i as f64 / n as f64).sin(), 0.0))
            .collect();
        fft_in_place(&mut buf).expect("fft");
        let mags = magnitude(&buf);
        let peak = (0..n / 2)
            .max_by(|&a, &b| mags[a].total_cmp(&mags[b]))
            .unwrap_or(0);
        assert_eq!(peak, bin);
        assert!((mags[bin] - n as f64 / 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_trivial_lengths_are_noops() {
        let mut empty: Vec<Complex<f64>> = Vec::new();
        assert!(fft_in_place(&mut empty).is_ok());

        let mut one = real(&[3.5]);
        fft_in_place(&mut one).expect("fft");
        assert_eq!(one[0], Complex::new(3.5, 0.0));
    }

    #[test]
    fn test_rejects_non_power_of_two() {
        let mut buf = real(&[0.0; 12]);
        assert_eq!(fft_in_place(&mut buf), Err(ProcessingError::NotPowerOfTwo(12)));
    }
}

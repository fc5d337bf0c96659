//! Radix-2 FFT used by the night analysis.
use std::f64::consts::PI;

use num_complex::Complex64;

use crate::error::WobbleError;

/// Recursive decimation-in-time FFT.
///
/// The length must be a power of two, zero-pad with [`zero_padded`] first.
pub fn fft(input: &[Complex64]) -> Result<Vec<Complex64>, WobbleError> {
    let n = input.len();
    if n <= 1 {
        return Ok(input.to_vec());
    }
    if n % 2 != 0 {
        return Err(WobbleError::FftLength(n));
    }

    let even: Vec<Complex64> = input.iter().step_by(2).copied().collect();
    let odd: Vec<Complex64> = input.iter().skip(1).step_by(2).copied().collect();
    let even = fft(&even)?;
    let odd = fft(&odd)?;

    let half = n / 2;
    let mut out = vec![Complex64::default(); n];
    for k in 0..half {
        let twiddle = Complex64::from_polar(1.0, -2.0 * PI * k as f64 / n as f64);
        let t = twiddle * odd[k];
        out[k] = even[k] + t;
        out[k + half] = even[k] - t;
    }
    Ok(out)
}

/// Copy a real series into a complex buffer padded with zeros up to the next
/// power of two.
pub fn zero_padded(series: &[f64]) -> Vec<Complex64> {
    let n = series.len().next_power_of_two();
    series
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .chain(std::iter::repeat(Complex64::default()))
        .take(n)
        .collect()
}

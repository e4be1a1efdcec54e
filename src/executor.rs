//! # 1D executor adapter
//!
//! Uniform interface around external 1D FFT engines (spec §4.4). Two
//! variants: complex-to-complex and real-to-complex, batched over the
//! pencil's cross dimensions. The only backend shipped in-tree wraps the
//! pure-Rust `rustfft`/`realfft` pair, which is the combination the wider
//! corpus reaches for whenever it needs real-input spectra alongside a
//! general complex transform (see `other_examples`'s audio/DSP crates).
use std::sync::Arc;

use num_complex::Complex;
use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};

use crate::error::Error;

/// Closed set of 1D FFT backends a [`crate::plan::Plan`] may be built
/// with. Dispatch on this tag is closed-world: adding a backend means
/// adding a variant here, not registering a plugin (spec §9 "static
/// dispatch over backends").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Pure-Rust `rustfft` for C2C, `realfft` for R2C.
    RustFft,
}

/// A real scalar type an executor can operate on, sealed to `f32`/`f64`
/// (spec §9 "real-vs-complex typing" via tagged precision parameters).
pub trait Real: rustfft::FftNum {}
impl Real for f32 {}
impl Real for f64 {}

/// Complex-to-complex 1D executor: direction-agnostic at construction,
/// sign supplied by which method is called.
pub struct C2CExecutor<T: Real> {
    len: usize,
    batch: usize,
    forward: Arc<dyn Fft<T>>,
    backward: Arc<dyn Fft<T>>,
}

impl<T: Real> C2CExecutor<T> {
    /// Build an executor for `batch` transforms of length `len`.
    #[must_use]
    pub fn new(backend: Backend, len: usize, batch: usize) -> Result<Self, Error> {
        match backend {
            Backend::RustFft => {
                let mut planner = FftPlanner::<T>::new();
                let forward = planner.plan_fft_forward(len);
                let backward = planner.plan_fft_inverse(len);
                Ok(Self {
                    len,
                    batch,
                    forward,
                    backward,
                })
            }
        }
    }

    #[must_use]
    pub fn scratch_size(&self) -> usize {
        self.forward
            .get_inplace_scratch_len()
            .max(self.backward.get_inplace_scratch_len())
    }

    /// Transform `batch` contiguous length-`len` lanes in place. `data`
    /// must hold exactly `len * batch` elements.
    ///
    /// # Errors
    /// [`Error::ExecutorFailure`] if `data`'s length does not match
    /// `len * batch`.
    pub fn forward(&self, data: &mut [Complex<T>], scratch: &mut [Complex<T>]) -> Result<(), Error> {
        self.run(&self.forward, data, scratch)
    }

    /// # Errors
    /// See [`C2CExecutor::forward`].
    pub fn backward(&self, data: &mut [Complex<T>], scratch: &mut [Complex<T>]) -> Result<(), Error> {
        self.run(&self.backward, data, scratch)
    }

    fn run(
        &self,
        fft: &Arc<dyn Fft<T>>,
        data: &mut [Complex<T>],
        scratch: &mut [Complex<T>],
    ) -> Result<(), Error> {
        if data.len() != self.len * self.batch {
            return Err(Error::ExecutorFailure {
                axis: self.len,
                detail: format!(
                    "expected {} elements ({} x {}), got {}",
                    self.len * self.batch,
                    self.len,
                    self.batch,
                    data.len()
                ),
            });
        }
        for lane in data.chunks_mut(self.len) {
            fft.process_with_scratch(lane, scratch);
        }
        Ok(())
    }
}

/// Real-to-complex 1D executor: `forward` produces `floor(len/2)+1`
/// complex outputs per lane, `backward` consumes that many.
pub struct R2CExecutor<T: Real> {
    len: usize,
    batch: usize,
    forward: Arc<dyn RealToComplex<T>>,
    backward: Arc<dyn ComplexToReal<T>>,
}

impl<T: Real> R2CExecutor<T> {
    #[must_use]
    pub fn new(backend: Backend, len: usize, batch: usize) -> Result<Self, Error> {
        match backend {
            Backend::RustFft => {
                let mut planner = RealFftPlanner::<T>::new();
                let forward = planner.plan_fft_forward(len);
                let backward = planner.plan_fft_inverse(len);
                Ok(Self {
                    len,
                    batch,
                    forward,
                    backward,
                })
            }
        }
    }

    /// Number of complex outputs per lane: `floor(len/2) + 1`.
    #[must_use]
    pub fn half_len(&self) -> usize {
        self.len / 2 + 1
    }

    #[must_use]
    pub fn scratch_size(&self) -> usize {
        self.forward
            .get_scratch_len()
            .max(self.backward.get_scratch_len())
    }

    /// # Errors
    /// [`Error::ExecutorFailure`] if buffer lengths don't match
    /// `len`/`half_len` times `batch`, or the backend rejects the length.
    pub fn forward(
        &self,
        real_in: &mut [T],
        complex_out: &mut [Complex<T>],
        scratch: &mut [Complex<T>],
    ) -> Result<(), Error> {
        check_lens(real_in.len(), self.len * self.batch, self.len)?;
        check_lens(complex_out.len(), self.half_len() * self.batch, self.len)?;
        for (rin, cout) in real_in
            .chunks_mut(self.len)
            .zip(complex_out.chunks_mut(self.half_len()))
        {
            to_executor_err(self.forward.process_with_scratch(rin, cout, scratch), self.len)?;
        }
        Ok(())
    }

    /// # Errors
    /// See [`R2CExecutor::forward`].
    pub fn backward(
        &self,
        complex_in: &mut [Complex<T>],
        real_out: &mut [T],
        scratch: &mut [Complex<T>],
    ) -> Result<(), Error> {
        check_lens(complex_in.len(), self.half_len() * self.batch, self.len)?;
        check_lens(real_out.len(), self.len * self.batch, self.len)?;
        for (cin, rout) in complex_in
            .chunks_mut(self.half_len())
            .zip(real_out.chunks_mut(self.len))
        {
            to_executor_err(self.backward.process_with_scratch(cin, rout, scratch), self.len)?;
        }
        Ok(())
    }
}

fn check_lens(got: usize, want: usize, axis_len: usize) -> Result<(), Error> {
    if got != want {
        return Err(Error::ExecutorFailure {
            axis: axis_len,
            detail: format!("expected {want} elements, got {got}"),
        });
    }
    Ok(())
}

fn to_executor_err(r: Result<(), FftError>, axis_len: usize) -> Result<(), Error> {
    r.map_err(|e| Error::ExecutorFailure {
        axis: axis_len,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn c2c_round_trip_recovers_input() {
        let len = 8;
        let batch = 1;
        let exec = C2CExecutor::<f64>::new(Backend::RustFft, len, batch).unwrap();
        let mut scratch = vec![Complex::new(0.0, 0.0); exec.scratch_size()];
        let original: Vec<Complex<f64>> = (0..len).map(|i| Complex::new(i as f64, 0.0)).collect();
        let mut data = original.clone();
        exec.forward(&mut data, &mut scratch).unwrap();
        exec.backward(&mut data, &mut scratch).unwrap();
        for (a, b) in data.iter().zip(original.iter()) {
            assert_relative_eq!(a.re / len as f64, b.re, epsilon = 1e-10);
            assert_relative_eq!(a.im / len as f64, b.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn r2c_half_len_matches_spec() {
        let exec = R2CExecutor::<f64>::new(Backend::RustFft, 9, 1).unwrap();
        assert_eq!(exec.half_len(), 5); // floor(9/2)+1
        let exec2 = R2CExecutor::<f64>::new(Backend::RustFft, 8, 1).unwrap();
        assert_eq!(exec2.half_len(), 5); // floor(8/2)+1
    }

    #[test]
    fn r2c_round_trip_recovers_real_input() {
        let len = 10;
        let exec = R2CExecutor::<f64>::new(Backend::RustFft, len, 1).unwrap();
        let mut scratch = vec![Complex::new(0.0, 0.0); exec.scratch_size()];
        let original: Vec<f64> = (0..len).map(|i| i as f64).collect();
        let mut real_in = original.clone();
        let mut spectrum = vec![Complex::new(0.0, 0.0); exec.half_len()];
        exec.forward(&mut real_in, &mut spectrum, &mut scratch).unwrap();
        let mut recovered = vec![0.0; len];
        exec.backward(&mut spectrum, &mut recovered, &mut scratch).unwrap();
        for (a, b) in recovered.iter().zip(original.iter()) {
            assert_relative_eq!(a / len as f64, b, epsilon = 1e-10);
        }
    }
}

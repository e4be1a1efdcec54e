//! # Pipeline driver primitives
//!
//! Small stage-running helpers shared by [`crate::plan::Plan`]'s forward
//! and backward orchestration (spec §4.5): run a reshape over a real or
//! complex local buffer, run a batched 1D FFT in place over a contiguous
//! buffer whose fastest axis is the active FFT axis.
use mpi::topology::SimpleCommunicator;
use num_complex::Complex;

use crate::error::Error;
use crate::executor::{C2CExecutor, R2CExecutor, Real};
use crate::partition::Partition;
use crate::reshape::{local_shape, ReshapeOp};
use crate::wire::HasComplexWire;

/// Allocate the local buffer for `part`'s box owned by `rank`.
#[must_use]
pub fn alloc_real<T: Real>(part: &Partition, rank: usize) -> ndarray::Array3<T> {
    ndarray::Array3::zeros(local_shape(part.rank_box(rank)))
}

/// Allocate the local complex buffer for `part`'s box owned by `rank`.
#[must_use]
pub fn alloc_complex<T: Real>(part: &Partition, rank: usize) -> ndarray::Array3<Complex<T>> {
    ndarray::Array3::zeros(local_shape(part.rank_box(rank)))
}

/// Run a reshape over real-valued local buffers.
///
/// # Errors
/// See [`ReshapeOp::execute`].
pub fn reshape_real<T: Real>(
    op: &ReshapeOp,
    comm: &SimpleCommunicator,
    input: &ndarray::Array3<T>,
    output: &mut ndarray::Array3<T>,
) -> Result<(), Error> {
    op.execute(comm, input, output)
}

/// Run a reshape over complex local buffers, round-tripping through the
/// `Equivalence`-capable wire mirror (see [`crate::wire`]).
///
/// # Errors
/// See [`ReshapeOp::execute`].
pub fn reshape_complex<T: HasComplexWire>(
    op: &ReshapeOp,
    comm: &SimpleCommunicator,
    input: &ndarray::Array3<Complex<T>>,
    output: &mut ndarray::Array3<Complex<T>>,
) -> Result<(), Error> {
    let wire_in = crate::wire::to_wire(input);
    let mut wire_out = ndarray::Array3::<T::Wire>::zeros(output.dim());
    op.execute(comm, &wire_in, &mut wire_out)?;
    *output = crate::wire::from_wire(&wire_out);
    Ok(())
}

/// Run a batched complex-to-complex 1D FFT in place. `data`'s fastest
/// (ndarray axis-2) extent must equal the executor's configured length.
///
/// # Errors
/// [`Error::ExecutorFailure`] if `data` isn't in standard (contiguous)
/// layout, or its length doesn't match the executor's `len * batch`.
pub fn fft_c2c_inplace<T: Real>(
    exec: &C2CExecutor<T>,
    data: &mut ndarray::Array3<Complex<T>>,
    scratch: &mut [Complex<T>],
    forward: bool,
) -> Result<(), Error> {
    let slice = data.as_slice_mut().ok_or_else(|| Error::ExecutorFailure {
        axis: 0,
        detail: "FFT buffer is not in standard contiguous layout".to_string(),
    })?;
    if forward {
        exec.forward(slice, scratch)
    } else {
        exec.backward(slice, scratch)
    }
}

/// Run the real-to-complex forward transform: `real` (full length along
/// the active axis) in, `complex` (Hermitian half length) out.
///
/// # Errors
/// See [`R2CExecutor::forward`].
pub fn fft_r2c_forward<T: Real>(
    exec: &R2CExecutor<T>,
    real: &mut ndarray::Array3<T>,
    complex: &mut ndarray::Array3<Complex<T>>,
    scratch: &mut [Complex<T>],
) -> Result<(), Error> {
    let rin = real.as_slice_mut().ok_or_else(|| Error::ExecutorFailure {
        axis: 0,
        detail: "R2C input buffer is not in standard contiguous layout".to_string(),
    })?;
    let cout = complex.as_slice_mut().ok_or_else(|| Error::ExecutorFailure {
        axis: 0,
        detail: "R2C output buffer is not in standard contiguous layout".to_string(),
    })?;
    exec.forward(rin, cout, scratch)
}

/// Run the complex-to-real backward transform: `complex` (Hermitian half
/// length) in, `real` (full length) out.
///
/// # Errors
/// See [`R2CExecutor::backward`].
pub fn fft_r2c_backward<T: Real>(
    exec: &R2CExecutor<T>,
    complex: &mut ndarray::Array3<Complex<T>>,
    real: &mut ndarray::Array3<T>,
    scratch: &mut [Complex<T>],
) -> Result<(), Error> {
    let cin = complex.as_slice_mut().ok_or_else(|| Error::ExecutorFailure {
        axis: 0,
        detail: "R2C input buffer is not in standard contiguous layout".to_string(),
    })?;
    let rout = real.as_slice_mut().ok_or_else(|| Error::ExecutorFailure {
        axis: 0,
        detail: "R2C output buffer is not in standard contiguous layout".to_string(),
    })?;
    exec.backward(cin, rout, scratch)
}

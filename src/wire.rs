//! # Wire format for complex elements
//!
//! [`crate::reshape::ReshapeOp`] is generic over `T: Equivalence`, which the
//! `mpi` crate provides for bare `f32`/`f64` but not for `num_complex`'s
//! `Complex<T>` (an orphan-rule gap: neither the trait nor the type is
//! ours). These small local POD mirrors close the gap so complex pencils
//! can be reshaped the same way real ones are.
use mpi::traits::Equivalence;
use num_complex::Complex;
use num_traits::Zero;

/// Wire-compatible mirror of `Complex<f32>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Equivalence)]
#[repr(C)]
pub struct CplxWireF32 {
    pub re: f32,
    pub im: f32,
}

/// Wire-compatible mirror of `Complex<f64>`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Equivalence)]
#[repr(C)]
pub struct CplxWireF64 {
    pub re: f64,
    pub im: f64,
}

impl From<Complex<f32>> for CplxWireF32 {
    fn from(c: Complex<f32>) -> Self {
        Self { re: c.re, im: c.im }
    }
}
impl From<CplxWireF32> for Complex<f32> {
    fn from(w: CplxWireF32) -> Self {
        Complex::new(w.re, w.im)
    }
}
impl Zero for CplxWireF32 {
    fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
}

impl From<Complex<f64>> for CplxWireF64 {
    fn from(c: Complex<f64>) -> Self {
        Self { re: c.re, im: c.im }
    }
}
impl From<CplxWireF64> for Complex<f64> {
    fn from(w: CplxWireF64) -> Self {
        Complex::new(w.re, w.im)
    }
}
impl Zero for CplxWireF64 {
    fn zero() -> Self {
        Self { re: 0.0, im: 0.0 }
    }
    fn is_zero(&self) -> bool {
        self.re == 0.0 && self.im == 0.0
    }
}

/// Associates a real scalar type with its complex wire mirror, so generic
/// code can reshape `Complex<T>` pencils without repeating the match on
/// `T` at every call site.
pub trait HasComplexWire: crate::executor::Real {
    /// The `Equivalence`-capable mirror of `Complex<Self>`.
    type Wire: Copy + Zero + Equivalence + From<Complex<Self>> + Into<Complex<Self>>;
}

impl HasComplexWire for f32 {
    type Wire = CplxWireF32;
}
impl HasComplexWire for f64 {
    type Wire = CplxWireF64;
}

/// Convert a complex ndarray buffer to its wire mirror for transport.
#[must_use]
pub fn to_wire<T: HasComplexWire>(data: &ndarray::Array3<Complex<T>>) -> ndarray::Array3<T::Wire> {
    data.mapv(T::Wire::from)
}

/// Convert a wire-mirror buffer back to `Complex<T>` after transport.
#[must_use]
pub fn from_wire<T: HasComplexWire>(data: &ndarray::Array3<T::Wire>) -> ndarray::Array3<Complex<T>> {
    data.mapv(Into::into)
}

//! # Plan: the public entry point
//!
//! Ties the logic planner, reshape operators and 1D executors together
//! into the object an application actually calls `forward`/`backward` on
//! (spec §4.6, §6, §9). A [`Plan`] is built once per domain/partition/axis
//! combination and reused across many transform calls; there is no
//! separate destroy step; resources are released on [`Drop`] the ordinary
//! Rust way.
use mpi::topology::{Communicator, SimpleCommunicator};
use num_complex::Complex;
use num_traits::FromPrimitive;

use crate::box3::Box3;
use crate::error::Error;
use crate::executor::{Backend, C2CExecutor, R2CExecutor, Real};
use crate::options::Options;
use crate::partition::Partition;
use crate::pipeline;
use crate::planner::{self, LogicPlan};
use crate::reshape::{ReshapeOp, Transport};
use crate::scale::{self, Scaling};
use crate::wire::HasComplexWire;

enum FirstStage<T: Real> {
    C2C(C2CExecutor<T>),
    R2C(R2CExecutor<T>),
}

/// A constructed 3D FFT plan over a fixed MPI group, input/output
/// partition pair and (optional) R2C axis.
pub struct Plan<T: Real> {
    comm: SimpleCommunicator,
    my_rank: usize,
    logic: LogicPlan,
    l3_prime: Partition,
    r0_fwd: ReshapeOp,
    r0_bwd: ReshapeOp,
    r1_fwd: ReshapeOp,
    r1_bwd: ReshapeOp,
    r2_fwd: ReshapeOp,
    r2_bwd: ReshapeOp,
    r3_fwd: ReshapeOp,
    r3_bwd: ReshapeOp,
    /// Real-valued L0 -> real-preimage-of-L1 reshape, present only when
    /// this plan has an R2C axis.
    r0_real_fwd: Option<ReshapeOp>,
    r0_real_bwd: Option<ReshapeOp>,
    exec0: FirstStage<T>,
    exec1: C2CExecutor<T>,
    exec2: C2CExecutor<T>,
    size_workspace: usize,
}

impl<T: Real + HasComplexWire> Plan<T> {
    /// Build a plan (spec §4.2 + §4.6): run the logic planner, validate
    /// the output partition, build the reshape operators for both
    /// directions and the three 1D executors.
    ///
    /// # Errors
    /// [`Error::UnsupportedOption`] if `options.reorder_axes` is `false`
    /// (see that field's docs). [`Error::InvalidR2CAxis`],
    /// [`Error::InvalidPartition`] from the logic planner; an additional
    /// [`Error::InvalidPartition`] if `p_out` is not, rank by rank, a
    /// pencil along the plan's third FFT axis. Required so the final 1D
    /// FFT runs locally with no further cross-rank reshape beyond a
    /// same-box axis relabel (see `DESIGN.md`).
    pub fn new(
        comm: SimpleCommunicator,
        g_in: Box3,
        g_out: Box3,
        p_in: Partition,
        p_out: Partition,
        r2c_axis: Option<usize>,
        backend: Backend,
        options: Options,
    ) -> Result<Self, Error> {
        if !options.reorder_axes {
            return Err(Error::UnsupportedOption {
                option: "reorder_axes",
                reason: "C2CExecutor/R2CExecutor batch over contiguous lanes only; disabling \
                         axis reordering would require threading an explicit stride/distance \
                         through the 1D executors, which this build does not implement"
                    .to_string(),
            });
        }
        let my_rank = comm.rank() as usize;
        let (logic, _scale_base) = planner::plan(g_in, g_out, p_in, p_out, r2c_axis, options)?;

        let a2 = logic.fft_axes[2];
        let g_work = *logic.layouts[3].global();
        for b in logic.layouts[3].boxes() {
            if !b.is_pencil(a2, &g_work) {
                return Err(Error::InvalidPartition {
                    reason: format!(
                        "output partition must be a pencil along axis {a2} (the last FFT axis) on every rank"
                    ),
                });
            }
        }

        let order2 = planner::order_for(a2, options);
        let l3_prime = logic.layouts[3].with_order(order2);

        let transport = if options.use_pencils {
            Transport::PencilPipelined
        } else if options.use_pairwise {
            Transport::Pairwise
        } else {
            Transport::AllToAll
        };

        let sc = options.use_subcomm;
        let r0_fwd = ReshapeOp::new(&logic.layouts[0], &logic.layouts[1], my_rank, transport, &comm, sc);
        let r0_bwd = ReshapeOp::new(&logic.layouts[1], &logic.layouts[0], my_rank, transport, &comm, sc);
        let r1_fwd = ReshapeOp::new(&logic.layouts[1], &logic.layouts[2], my_rank, transport, &comm, sc);
        let r1_bwd = ReshapeOp::new(&logic.layouts[2], &logic.layouts[1], my_rank, transport, &comm, sc);
        let r2_fwd = ReshapeOp::new(&logic.layouts[2], &l3_prime, my_rank, transport, &comm, sc);
        let r2_bwd = ReshapeOp::new(&l3_prime, &logic.layouts[2], my_rank, transport, &comm, sc);
        // R3 never crosses ranks: same boxes, only the axis-order tag
        // differs, so the transport choice (and any subcomm) is moot.
        let r3_fwd = ReshapeOp::new(&l3_prime, &logic.layouts[3], my_rank, Transport::AllToAll, &comm, false);
        let r3_bwd = ReshapeOp::new(&logic.layouts[3], &l3_prime, my_rank, Transport::AllToAll, &comm, false);

        let l1_shape = crate::reshape::local_shape(logic.layouts[1].rank_box(my_rank));
        let l2_shape = crate::reshape::local_shape(logic.layouts[2].rank_box(my_rank));
        let l3p_shape = crate::reshape::local_shape(l3_prime.rank_box(my_rank));

        let (exec0, r0_real_fwd, r0_real_bwd) = match r2c_axis {
            Some(_) => {
                let real_preimage = logic.real_preimage_of_l1();
                let fwd = ReshapeOp::new(&logic.layouts[0], &real_preimage, my_rank, Transport::AllToAll, &comm, sc);
                let bwd = ReshapeOp::new(&real_preimage, &logic.layouts[0], my_rank, Transport::AllToAll, &comm, sc);
                let exec = FirstStage::R2C(R2CExecutor::<T>::new(
                    backend,
                    logic.full_lengths[0],
                    l1_shape[0] * l1_shape[1],
                )?);
                (exec, Some(fwd), Some(bwd))
            }
            None => (
                FirstStage::C2C(C2CExecutor::<T>::new(
                    backend,
                    logic.full_lengths[0],
                    l1_shape[0] * l1_shape[1],
                )?),
                None,
                None,
            ),
        };
        let exec1 = C2CExecutor::<T>::new(backend, logic.full_lengths[1], l2_shape[0] * l2_shape[1])?;
        let exec2 = C2CExecutor::<T>::new(backend, logic.full_lengths[2], l3p_shape[0] * l3p_shape[1])?;

        let send_recv_max = [&r0_fwd, &r1_fwd, &r2_fwd, &r3_fwd, &r0_bwd, &r1_bwd, &r2_bwd, &r3_bwd]
            .iter()
            .map(|op| op.send_volume() + op.recv_volume())
            .max()
            .unwrap_or(0);
        let scratch_max = match &exec0 {
            FirstStage::C2C(e) => e.scratch_size(),
            FirstStage::R2C(e) => e.scratch_size(),
        }
        .max(exec1.scratch_size())
        .max(exec2.scratch_size());
        let size_workspace = send_recv_max + scratch_max;

        Ok(Self {
            comm,
            my_rank,
            logic,
            l3_prime,
            r0_fwd,
            r0_bwd,
            r1_fwd,
            r1_bwd,
            r2_fwd,
            r2_bwd,
            r3_fwd,
            r3_bwd,
            r0_real_fwd,
            r0_real_bwd,
            exec0,
            exec1,
            exec2,
            size_workspace,
        })
    }

    /// Build a plan the way spec §6 phrases external construction: each
    /// rank supplies only its own local input/output box, not a
    /// pre-assembled [`Partition`]. The global domain and every other
    /// rank's box are recovered via the collective [`crate::box3::gather`]
    /// primitive (spec §4.1) rather than built by the caller ahead of
    /// time. [`Plan::new`] remains available as a supplemental fast path
    /// for callers that already have both partitions assembled (e.g. every
    /// rank deterministically computing the same `Partition::pencil`).
    ///
    /// # Errors
    /// [`Error::InvalidPartition`] if the gathered per-rank boxes overlap
    /// or leave a gap in their bounding box. Otherwise as [`Plan::new`].
    pub fn new_from_local_boxes(
        comm: SimpleCommunicator,
        local_in: Box3,
        local_out: Box3,
        r2c_axis: Option<usize>,
        backend: Backend,
        options: Options,
    ) -> Result<Self, Error> {
        let (in_boxes, out_boxes) = crate::box3::gather(&local_in, &local_out, &comm);
        let g_in = bounding_box(&in_boxes);
        let g_out = bounding_box(&out_boxes);
        let p_in = Partition::new(g_in, in_boxes)?;
        let p_out = Partition::new(g_out, out_boxes)?;
        Self::new(comm, g_in, g_out, p_in, p_out, r2c_axis, backend, options)
    }

    /// This rank's input box, exactly as given to [`Plan::new`].
    #[must_use]
    pub fn inbox(&self) -> Box3 {
        *self.logic.layouts[0].rank_box(self.my_rank)
    }

    /// This rank's output box, exactly as given to [`Plan::new`].
    #[must_use]
    pub fn outbox(&self) -> Box3 {
        *self.logic.layouts[3].rank_box(self.my_rank)
    }

    /// Element count of this rank's input box.
    #[must_use]
    pub fn size_inbox(&self) -> usize {
        self.inbox().count()
    }

    /// Element count of this rank's output box.
    #[must_use]
    pub fn size_outbox(&self) -> usize {
        self.outbox().count()
    }

    /// The scale factor a `forward`/`backward` call would apply for
    /// `scaling` under this plan's FFT axis lengths (spec §6's
    /// `scale_factor(scaling)`).
    #[must_use]
    pub fn scale_factor(&self, scaling: Scaling) -> f64 {
        scale::scale_factor(scaling, self.logic.full_lengths)
    }

    /// Upper bound on the number of complex elements a caller-provided
    /// workspace buffer should hold, were one used. This plan allocates
    /// owned per-stage buffers internally rather than carving a single
    /// raw workspace (see `DESIGN.md`); the bound is advertised for API
    /// parity and informational sizing only.
    #[must_use]
    pub fn size_workspace(&self) -> usize {
        self.size_workspace
    }

    /// Whether this plan was built with an R2C axis.
    #[must_use]
    pub fn is_r2c(&self) -> bool {
        self.logic.r2c_axis.is_some()
    }

    /// Run the complex-to-complex forward transform.
    ///
    /// # Errors
    /// [`Error::PrecisionMismatch`] if this plan was built with an R2C
    /// axis. [`Error::SizeMismatch`] if `input`/`output` don't match
    /// [`Plan::size_inbox`]/[`Plan::size_outbox`]. Propagates reshape and
    /// executor failures.
    pub fn forward_c2c(
        &self,
        input: &[Complex<T>],
        output: &mut [Complex<T>],
        scaling: Scaling,
    ) -> Result<(), Error> {
        if self.logic.r2c_axis.is_some() {
            return Err(Error::PrecisionMismatch {
                expected: "r2c plan",
                actual: "c2c call",
            });
        }
        check_len("input", input.len(), self.size_inbox())?;
        check_len("output", output.len(), self.size_outbox())?;

        let FirstStage::C2C(exec0) = &self.exec0 else {
            unreachable!("r2c_axis is None, exec0 must be C2C")
        };

        let buf0 = complex_buf_from(&self.logic.layouts[0], self.my_rank, input);
        let mut buf1 = pipeline::alloc_complex::<T>(&self.logic.layouts[1], self.my_rank);
        pipeline::reshape_complex(&self.r0_fwd, &self.comm, &buf0, &mut buf1)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); exec0.scratch_size()];
        pipeline::fft_c2c_inplace(exec0, &mut buf1, &mut scratch, true)?;

        let mut buf2 = pipeline::alloc_complex::<T>(&self.logic.layouts[2], self.my_rank);
        pipeline::reshape_complex(&self.r1_fwd, &self.comm, &buf1, &mut buf2)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec1.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec1, &mut buf2, &mut scratch, true)?;

        let mut buf3p = pipeline::alloc_complex::<T>(&self.l3_prime, self.my_rank);
        pipeline::reshape_complex(&self.r2_fwd, &self.comm, &buf2, &mut buf3p)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec2.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec2, &mut buf3p, &mut scratch, true)?;

        let mut buf3 = pipeline::alloc_complex::<T>(&self.logic.layouts[3], self.my_rank);
        pipeline::reshape_complex(&self.r3_fwd, &self.comm, &buf3p, &mut buf3)?;

        let factor = T::from_f64(scale::scale_factor(scaling, self.logic.full_lengths)).unwrap_or_else(T::one);
        crate::scale::apply_complex(buf3.as_slice_mut().unwrap(), factor);
        output.copy_from_slice(buf3.as_slice().unwrap());
        Ok(())
    }

    /// Run the complex-to-complex backward (inverse) transform.
    ///
    /// # Errors
    /// See [`Plan::forward_c2c`].
    pub fn backward_c2c(
        &self,
        input: &[Complex<T>],
        output: &mut [Complex<T>],
        scaling: Scaling,
    ) -> Result<(), Error> {
        if self.logic.r2c_axis.is_some() {
            return Err(Error::PrecisionMismatch {
                expected: "r2c plan",
                actual: "c2c call",
            });
        }
        check_len("input", input.len(), self.size_outbox())?;
        check_len("output", output.len(), self.size_inbox())?;

        let FirstStage::C2C(exec0) = &self.exec0 else {
            unreachable!("r2c_axis is None, exec0 must be C2C")
        };

        let buf3 = complex_buf_from(&self.logic.layouts[3], self.my_rank, input);
        let mut buf3p = pipeline::alloc_complex::<T>(&self.l3_prime, self.my_rank);
        pipeline::reshape_complex(&self.r3_bwd, &self.comm, &buf3, &mut buf3p)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec2.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec2, &mut buf3p, &mut scratch, false)?;

        let mut buf2 = pipeline::alloc_complex::<T>(&self.logic.layouts[2], self.my_rank);
        pipeline::reshape_complex(&self.r2_bwd, &self.comm, &buf3p, &mut buf2)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec1.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec1, &mut buf2, &mut scratch, false)?;

        let mut buf1 = pipeline::alloc_complex::<T>(&self.logic.layouts[1], self.my_rank);
        pipeline::reshape_complex(&self.r1_bwd, &self.comm, &buf2, &mut buf1)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); exec0.scratch_size()];
        pipeline::fft_c2c_inplace(exec0, &mut buf1, &mut scratch, false)?;

        let mut buf0 = pipeline::alloc_complex::<T>(&self.logic.layouts[0], self.my_rank);
        pipeline::reshape_complex(&self.r0_bwd, &self.comm, &buf1, &mut buf0)?;

        let factor = T::from_f64(scale::scale_factor(scaling, self.logic.full_lengths)).unwrap_or_else(T::one);
        crate::scale::apply_complex(buf0.as_slice_mut().unwrap(), factor);
        output.copy_from_slice(buf0.as_slice().unwrap());
        Ok(())
    }

    /// Run the real-to-complex forward transform.
    ///
    /// # Errors
    /// [`Error::PrecisionMismatch`] if this plan was not built with an
    /// R2C axis. Otherwise as [`Plan::forward_c2c`].
    pub fn forward_r2c(&self, input: &[T], output: &mut [Complex<T>], scaling: Scaling) -> Result<(), Error> {
        let FirstStage::R2C(exec0) = &self.exec0 else {
            return Err(Error::PrecisionMismatch {
                expected: "c2c plan",
                actual: "r2c call",
            });
        };
        check_len("input", input.len(), self.size_inbox())?;
        check_len("output", output.len(), self.size_outbox())?;

        let buf0 = real_buf_from(&self.logic.layouts[0], self.my_rank, input);
        let real_preimage = self.logic.real_preimage_of_l1();
        let mut buf1_real = pipeline::alloc_real::<T>(&real_preimage, self.my_rank);
        let r0_real = self.r0_real_fwd.as_ref().expect("r2c plan always has r0_real_fwd");
        pipeline::reshape_real(r0_real, &self.comm, &buf0, &mut buf1_real)?;

        let mut buf1 = pipeline::alloc_complex::<T>(&self.logic.layouts[1], self.my_rank);
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); exec0.scratch_size()];
        pipeline::fft_r2c_forward(exec0, &mut buf1_real, &mut buf1, &mut scratch)?;

        let mut buf2 = pipeline::alloc_complex::<T>(&self.logic.layouts[2], self.my_rank);
        pipeline::reshape_complex(&self.r1_fwd, &self.comm, &buf1, &mut buf2)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec1.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec1, &mut buf2, &mut scratch, true)?;

        let mut buf3p = pipeline::alloc_complex::<T>(&self.l3_prime, self.my_rank);
        pipeline::reshape_complex(&self.r2_fwd, &self.comm, &buf2, &mut buf3p)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec2.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec2, &mut buf3p, &mut scratch, true)?;

        let mut buf3 = pipeline::alloc_complex::<T>(&self.logic.layouts[3], self.my_rank);
        pipeline::reshape_complex(&self.r3_fwd, &self.comm, &buf3p, &mut buf3)?;

        let factor = T::from_f64(scale::scale_factor(scaling, self.logic.full_lengths)).unwrap_or_else(T::one);
        crate::scale::apply_complex(buf3.as_slice_mut().unwrap(), factor);
        output.copy_from_slice(buf3.as_slice().unwrap());
        Ok(())
    }

    /// Run the complex-to-real backward transform.
    ///
    /// # Errors
    /// See [`Plan::forward_r2c`].
    pub fn backward_r2c(&self, input: &[Complex<T>], output: &mut [T], scaling: Scaling) -> Result<(), Error> {
        let FirstStage::R2C(exec0) = &self.exec0 else {
            return Err(Error::PrecisionMismatch {
                expected: "c2c plan",
                actual: "r2c call",
            });
        };
        check_len("input", input.len(), self.size_outbox())?;
        check_len("output", output.len(), self.size_inbox())?;

        let buf3 = complex_buf_from(&self.logic.layouts[3], self.my_rank, input);
        let mut buf3p = pipeline::alloc_complex::<T>(&self.l3_prime, self.my_rank);
        pipeline::reshape_complex(&self.r3_bwd, &self.comm, &buf3, &mut buf3p)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec2.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec2, &mut buf3p, &mut scratch, false)?;

        let mut buf2 = pipeline::alloc_complex::<T>(&self.logic.layouts[2], self.my_rank);
        pipeline::reshape_complex(&self.r2_bwd, &self.comm, &buf3p, &mut buf2)?;
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); self.exec1.scratch_size()];
        pipeline::fft_c2c_inplace(&self.exec1, &mut buf2, &mut scratch, false)?;

        let mut buf1 = pipeline::alloc_complex::<T>(&self.logic.layouts[1], self.my_rank);
        pipeline::reshape_complex(&self.r1_bwd, &self.comm, &buf2, &mut buf1)?;

        let real_preimage = self.logic.real_preimage_of_l1();
        let mut buf1_real = pipeline::alloc_real::<T>(&real_preimage, self.my_rank);
        let mut scratch = vec![Complex::new(T::zero(), T::zero()); exec0.scratch_size()];
        pipeline::fft_r2c_backward(exec0, &mut buf1, &mut buf1_real, &mut scratch)?;

        let mut buf0 = pipeline::alloc_real::<T>(&self.logic.layouts[0], self.my_rank);
        let r0_real = self.r0_real_bwd.as_ref().expect("r2c plan always has r0_real_bwd");
        pipeline::reshape_real(r0_real, &self.comm, &buf1_real, &mut buf0)?;

        let factor = T::from_f64(scale::scale_factor(scaling, self.logic.full_lengths)).unwrap_or_else(T::one);
        crate::scale::apply_real(buf0.as_slice_mut().unwrap(), factor);
        output.copy_from_slice(buf0.as_slice().unwrap());
        Ok(())
    }
}

/// Smallest box enclosing every non-empty box in `boxes`, with the
/// identity axis order. `Partition::new`'s `validate_tiling` then confirms
/// the gathered boxes actually tile it exactly, rather than merely fit
/// inside it.
fn bounding_box(boxes: &[Box3]) -> Box3 {
    let mut lo = [i64::MAX; 3];
    let mut hi = [i64::MIN; 3];
    for b in boxes.iter().filter(|b| !b.is_empty()) {
        for i in 0..3 {
            lo[i] = lo[i].min(b.lo()[i]);
            hi[i] = hi[i].max(b.hi()[i]);
        }
    }
    Box3::new(lo, hi)
}

fn check_len(which: &'static str, got: usize, needed: usize) -> Result<(), Error> {
    if got != needed {
        return Err(Error::SizeMismatch { which, needed, got });
    }
    Ok(())
}

fn complex_buf_from<T: Real>(part: &Partition, rank: usize, data: &[Complex<T>]) -> ndarray::Array3<Complex<T>> {
    let shape = crate::reshape::local_shape(part.rank_box(rank));
    ndarray::Array3::from_shape_vec(shape, data.to_vec()).expect("length checked by caller")
}

fn real_buf_from<T: Real>(part: &Partition, rank: usize, data: &[T]) -> ndarray::Array3<T> {
    let shape = crate::reshape::local_shape(part.rank_box(rank));
    ndarray::Array3::from_shape_vec(shape, data.to_vec()).expect("length checked by caller")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    use crate::test_world as world;

    #[test]
    fn single_rank_c2c_round_trip_matches_s1() {
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(global, vec![global]).unwrap();
        let p_out = Partition::new(global, vec![global]).unwrap();
        let plan = Plan::<f64>::new(
            world(),
            global,
            global,
            p_in,
            p_out,
            None,
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();

        let shape = crate::reshape::local_shape(&global);
        let mut input = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    let x = k as f64 + 4.0 * j as f64 + 16.0 * i as f64;
                    input[(i * shape[1] + j) * shape[2] + k] = Complex::new(x, 0.0);
                }
            }
        }

        let mut spectrum = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
        plan.forward_c2c(&input, &mut spectrum, Scaling::None).unwrap();
        let mut round_trip = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        plan.backward_c2c(&spectrum, &mut round_trip, Scaling::Full).unwrap();

        for (a, b) in input.iter().zip(round_trip.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn single_rank_r2c_round_trip_with_symmetric_scaling() {
        let g_in = Box3::new([0, 0, 0], [3, 3, 3]);
        let g_out = Box3::new([0, 0, 0], [2, 3, 3]); // hermitian_half_len(4) = 3
        let p_in = Partition::new(g_in, vec![g_in]).unwrap();
        let p_out = Partition::new(g_out, vec![g_out]).unwrap();
        let plan = Plan::<f64>::new(
            world(),
            g_in,
            g_out,
            p_in,
            p_out,
            Some(0),
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();
        assert!(plan.is_r2c());

        let shape = crate::reshape::local_shape(&g_in);
        let mut input = vec![0.0_f64; plan.size_inbox()];
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    input[(i * shape[1] + j) * shape[2] + k] = (i + j + k) as f64;
                }
            }
        }

        let mut spectrum = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
        plan.forward_r2c(&input, &mut spectrum, Scaling::Symmetric).unwrap();
        let mut round_trip = vec![0.0_f64; plan.size_inbox()];
        plan.backward_r2c(&spectrum, &mut round_trip, Scaling::Symmetric).unwrap();

        for (a, b) in input.iter().zip(round_trip.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn forward_c2c_rejects_r2c_plan() {
        let g_in = Box3::new([0, 0, 0], [3, 3, 3]);
        let g_out = Box3::new([0, 0, 0], [2, 3, 3]);
        let p_in = Partition::new(g_in, vec![g_in]).unwrap();
        let p_out = Partition::new(g_out, vec![g_out]).unwrap();
        let plan = Plan::<f64>::new(
            world(),
            g_in,
            g_out,
            p_in,
            p_out,
            Some(0),
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();

        let input = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
        let err = plan.forward_c2c(&input, &mut output, Scaling::None).unwrap_err();
        assert!(matches!(err, Error::PrecisionMismatch { .. }));
    }

    #[test]
    fn new_from_local_boxes_round_trips_like_new() {
        // Single rank stands in for spec §6's per-rank construction path:
        // this rank's own box happens to be the whole domain, and
        // `gather` (exercised via `test_world`'s size-1 communicator)
        // recovers the global box and the (trivial, one-entry) partition
        // from it instead of the caller assembling one.
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let plan =
            Plan::<f64>::new_from_local_boxes(world(), global, global, None, Backend::RustFft, Options::default())
                .unwrap();
        assert_eq!(plan.inbox(), global);
        assert_eq!(plan.outbox(), global);

        let shape = crate::reshape::local_shape(&global);
        let mut input = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    let x = k as f64 + 4.0 * j as f64 + 16.0 * i as f64;
                    input[(i * shape[1] + j) * shape[2] + k] = Complex::new(x, 0.0);
                }
            }
        }
        let mut spectrum = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
        plan.forward_c2c(&input, &mut spectrum, Scaling::None).unwrap();
        let mut round_trip = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        plan.backward_c2c(&spectrum, &mut round_trip, Scaling::Full).unwrap();

        for (a, b) in input.iter().zip(round_trip.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn new_rejects_reorder_axes_disabled() {
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(global, vec![global]).unwrap();
        let p_out = Partition::new(global, vec![global]).unwrap();
        let opts = Options {
            reorder_axes: false,
            ..Options::default()
        };
        let err = Plan::<f64>::new(world(), global, global, p_in, p_out, None, Backend::RustFft, opts).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOption {
                option: "reorder_axes",
                ..
            }
        ));
    }

    #[test]
    fn new_rejects_output_partition_not_a_pencil_on_last_axis() {
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(global, vec![global]).unwrap();
        // A single-rank partition is trivially a pencil on every axis, so
        // split it into two boxes along axis 2 (the spec's default last
        // FFT axis) to violate the invariant.
        let a = Box3::new([0, 0, 0], [3, 3, 1]);
        let b = Box3::new([0, 0, 2], [3, 3, 3]);
        let p_out = Partition::new(global, vec![a, b]).unwrap();
        let err = Plan::<f64>::new(
            world(),
            global,
            global,
            p_in,
            p_out,
            None,
            Backend::RustFft,
            Options::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPartition { .. }));
    }

    /// Flat buffer index for box-axis coordinates `(a0, a1, a2)` under the
    /// identity axis order, matching the convention every other test in
    /// this module builds its input arrays with: `local_shape` reverses a
    /// box's own `(s0, s1, s2)` extents, so axis 0 is the fastest-varying
    /// (ndarray's last) dimension.
    fn flat_identity(local_shape: [usize; 3], a0: usize, a1: usize, a2: usize) -> usize {
        (a2 * local_shape[1] + a1) * local_shape[2] + a0
    }

    #[test]
    fn forward_c2c_is_linear() {
        // Spec property 2: forward(alpha*x + beta*y) == alpha*forward(x) + beta*forward(y).
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(global, vec![global]).unwrap();
        let p_out = Partition::new(global, vec![global]).unwrap();
        let plan = Plan::<f64>::new(
            world(),
            global,
            global,
            p_in,
            p_out,
            None,
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();

        let shape = crate::reshape::local_shape(&global);
        let n = plan.size_inbox();
        let mut x = vec![Complex::new(0.0, 0.0); n];
        let mut y = vec![Complex::new(0.0, 0.0); n];
        for a0 in 0..shape[2] {
            for a1 in 0..shape[1] {
                for a2 in 0..shape[0] {
                    let idx = flat_identity(shape, a0, a1, a2);
                    x[idx] = Complex::new(a0 as f64, a1 as f64 - a2 as f64);
                    y[idx] = Complex::new((a1 * a2) as f64, a0 as f64);
                }
            }
        }
        let alpha = Complex::new(1.5, 0.5);
        let beta = Complex::new(-2.0, 1.0);
        let combined: Vec<Complex<f64>> = x.iter().zip(&y).map(|(&xi, &yi)| alpha * xi + beta * yi).collect();

        let mut fx = vec![Complex::new(0.0, 0.0); n];
        let mut fy = vec![Complex::new(0.0, 0.0); n];
        let mut f_combined = vec![Complex::new(0.0, 0.0); n];
        plan.forward_c2c(&x, &mut fx, Scaling::None).unwrap();
        plan.forward_c2c(&y, &mut fy, Scaling::None).unwrap();
        plan.forward_c2c(&combined, &mut f_combined, Scaling::None).unwrap();

        for i in 0..n {
            let expected = alpha * fx[i] + beta * fy[i];
            assert_relative_eq!(f_combined[i].re, expected.re, epsilon = 1e-9);
            assert_relative_eq!(f_combined[i].im, expected.im, epsilon = 1e-9);
        }
    }

    #[test]
    fn forward_c2c_delta_has_unit_magnitude_spectrum() {
        // Spec property 3: the forward transform of a field that is 1 at
        // one lattice point and 0 elsewhere has unit magnitude everywhere.
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(global, vec![global]).unwrap();
        let p_out = Partition::new(global, vec![global]).unwrap();
        let plan = Plan::<f64>::new(
            world(),
            global,
            global,
            p_in,
            p_out,
            None,
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();

        let shape = crate::reshape::local_shape(&global);
        let mut input = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
        input[flat_identity(shape, 1, 2, 3)] = Complex::new(1.0, 0.0);

        let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
        plan.forward_c2c(&input, &mut output, Scaling::None).unwrap();
        for v in &output {
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn r2c_half_spectrum_matches_full_c2c_restricted_and_mirrors_hermitian() {
        // Spec property 4: cross-check the R2C half against a full C2C
        // transform of the same real data. Indices inside the stored half
        // must match the full spectrum exactly; indices outside it are
        // recovered by conjugating and mirroring every axis.
        let global = Box3::new([0, 0, 0], [3, 3, 3]); // N0 = N1 = N2 = 4
        let half = Box3::new([0, 0, 0], [2, 3, 3]); // hermitian_half_len(4) = 3

        let c2c_plan = Plan::<f64>::new(
            world(),
            global,
            global,
            Partition::new(global, vec![global]).unwrap(),
            Partition::new(global, vec![global]).unwrap(),
            None,
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();
        let r2c_plan = Plan::<f64>::new(
            world(),
            global,
            half,
            Partition::new(global, vec![global]).unwrap(),
            Partition::new(half, vec![half]).unwrap(),
            Some(0),
            Backend::RustFft,
            Options::default(),
        )
        .unwrap();
        assert_eq!(c2c_plan.size_inbox(), r2c_plan.size_inbox());

        let in_shape = crate::reshape::local_shape(&global);
        let mut real_input = vec![0.0_f64; r2c_plan.size_inbox()];
        let mut complex_input = vec![Complex::new(0.0, 0.0); c2c_plan.size_inbox()];
        for a0 in 0..in_shape[2] {
            for a1 in 0..in_shape[1] {
                for a2 in 0..in_shape[0] {
                    let idx = flat_identity(in_shape, a0, a1, a2);
                    let v = (a0 + 2 * a1 + 3 * a2 + 1) as f64;
                    real_input[idx] = v;
                    complex_input[idx] = Complex::new(v, 0.0);
                }
            }
        }

        let mut half_spectrum = vec![Complex::new(0.0, 0.0); r2c_plan.size_outbox()];
        r2c_plan.forward_r2c(&real_input, &mut half_spectrum, Scaling::None).unwrap();
        let mut full_spectrum = vec![Complex::new(0.0, 0.0); c2c_plan.size_outbox()];
        c2c_plan.forward_c2c(&complex_input, &mut full_spectrum, Scaling::None).unwrap();

        let half_shape = crate::reshape::local_shape(&half);
        let full_shape = crate::reshape::local_shape(&global);
        let n0 = 4usize;
        let n1 = 4usize;
        let n2 = 4usize;
        for a0 in 0..n0 {
            for a1 in 0..n1 {
                for a2 in 0..n2 {
                    let full_idx = flat_identity(full_shape, a0, a1, a2);
                    let got = full_spectrum[full_idx];
                    if a0 <= 2 {
                        let half_idx = flat_identity(half_shape, a0, a1, a2);
                        let expected = half_spectrum[half_idx];
                        assert_relative_eq!(got.re, expected.re, epsilon = 1e-9);
                        assert_relative_eq!(got.im, expected.im, epsilon = 1e-9);
                    } else {
                        let mirror_idx = flat_identity(half_shape, n0 - a0, (n1 - a1) % n1, (n2 - a2) % n2);
                        let expected = half_spectrum[mirror_idx].conj();
                        assert_relative_eq!(got.re, expected.re, epsilon = 1e-9);
                        assert_relative_eq!(got.im, expected.im, epsilon = 1e-9);
                    }
                }
            }
        }
    }
}

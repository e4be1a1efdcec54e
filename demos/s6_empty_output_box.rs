//! cargo mpirun --np 2 --example s6_empty_output_box
//!
//! 2 ranks, R2C axis 0. The output partition is hand-built so rank 1's box
//! is empty (it owns no slabs of the unit-length axis 1); the transform
//! must still succeed, and rank 0's box then holds the entire spectrum.
use distfft3d::{Backend, Box3, Options, Partition, Plan, Scaling};
use mpi::topology::Communicator;
use num_complex::Complex;
use std::f64::consts::PI;

const N0: usize = 4; // r2c axis, full length
const N1: usize = 1;
const N2: usize = 4;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 2, "run with 2 processors");
    let rank = world.rank() as usize;

    let g_in = Box3::new([0, 0, 0], [N0 as i64 - 1, N1 as i64 - 1, N2 as i64 - 1]);
    let g_out = Box3::new([0, 0, 0], [2, N1 as i64 - 1, N2 as i64 - 1]); // hermitian_half_len(4) = 3

    let p_in = Partition::pencil(&g_in, 0, 2, [0, 1, 2]);

    let rank0_box = Box3::new([0, 0, 0], [2, 0, 3]);
    let rank1_box = Box3::with_order([0, 1, 0], [2, 0, 3], [0, 1, 2]); // axis 1 empty: lo=1 > hi=0
    assert!(rank1_box.is_empty());
    let p_out = Partition::new(g_out, vec![rank0_box, rank1_box]).expect("hand-built output partition tiles g_out");

    let plan = Plan::<f64>::new(
        world,
        g_in,
        g_out,
        p_in.clone(),
        p_out.clone(),
        Some(0),
        Backend::RustFft,
        Options::default(),
    )
    .expect("plan construction accepts an empty per-rank output box");

    let my_in_box = *p_in.rank_box(rank);
    let local = local_shape(&my_in_box);
    let mut input = vec![0.0_f64; plan.size_inbox()];
    for a in 0..local[0] {
        for b in 0..local[1] {
            for c in 0..local[2] {
                let g = global_of(&my_in_box, [a, b, c]);
                let flat = (a * local[1] + b) * local[2] + c;
                input[flat] = g[0] as f64 + 4.0 * g[1] as f64 + 16.0 * g[2] as f64;
            }
        }
    }

    let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
    plan.forward_r2c(&input, &mut output, Scaling::None).expect("forward succeeds even with an empty-box peer");

    if rank == 1 {
        assert_eq!(plan.size_outbox(), 0, "rank 1's output box is empty");
        return;
    }

    let my_out_box = *p_out.rank_box(rank);
    let out_local = local_shape(&my_out_box);
    let tol = 1e-9 * (N0 * N1 * N2) as f64;
    for a in 0..out_local[0] {
        for b in 0..out_local[1] {
            for c in 0..out_local[2] {
                let k = global_of(&my_out_box, [a, b, c]);
                let flat = (a * out_local[1] + b) * out_local[2] + c;
                let expected = direct_dft(k);
                let got = output[flat];
                assert!(
                    (got - expected).norm() < tol,
                    "mismatch at {k:?}: got {got:?}, expected {expected:?}"
                );
            }
        }
    }
}

fn direct_dft(k: [i64; 3]) -> Complex<f64> {
    let mut acc = Complex::new(0.0, 0.0);
    for n0 in 0..N0 {
        for n1 in 0..N1 {
            for n2 in 0..N2 {
                let x = n0 as f64 + 4.0 * n1 as f64 + 16.0 * n2 as f64;
                let phase = -2.0
                    * PI
                    * (n0 as f64 * k[0] as f64 / N0 as f64
                        + n1 as f64 * k[1] as f64 / N1 as f64
                        + n2 as f64 * k[2] as f64 / N2 as f64);
                acc += Complex::new(x * phase.cos(), x * phase.sin());
            }
        }
    }
    acc
}

fn local_shape(b: &Box3) -> [usize; 3] {
    let shape = b.shape();
    let order = b.order();
    [shape[order[2]], shape[order[1]], shape[order[0]]]
}

fn global_of(b: &Box3, local: [usize; 3]) -> [i64; 3] {
    let lo = b.lo();
    let order = b.order();
    let mut g = [0i64; 3];
    g[order[2]] = lo[order[2]] + local[0] as i64;
    g[order[1]] = lo[order[1]] + local[1] as i64;
    g[order[0]] = lo[order[0]] + local[2] as i64;
    g
}

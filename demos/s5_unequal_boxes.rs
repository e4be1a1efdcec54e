//! cargo mpirun --np 3 --example s5_unequal_boxes
//!
//! 3 ranks split unevenly along one axis (one rank owns 6 slabs, the other
//! two own 5). Each rank checks its own output box against a brute-force
//! direct DFT of the whole domain rather than a second `Plan`.
use distfft3d::{Backend, Box3, Options, Partition, Plan, Scaling};
use mpi::topology::Communicator;
use num_complex::Complex;
use std::f64::consts::PI;

const N0: usize = 4;
const N1: usize = 16;
const N2: usize = 4;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 3, "run with 3 processors");
    let rank = world.rank() as usize;

    let global = Box3::new([0, 0, 0], [N0 as i64 - 1, N1 as i64 - 1, N2 as i64 - 1]);
    let p_in = Partition::pencil(&global, 2, 3, [0, 1, 2]);
    let p_out = Partition::pencil(&global, 2, 3, [0, 1, 2]);

    let my_in_box = *p_in.rank_box(rank);
    let sizes: Vec<usize> = p_in.boxes().iter().map(Box3::count).collect();
    assert_eq!(sizes.iter().sum::<usize>(), N0 * N1 * N2);
    assert!(sizes.contains(&(6 * N0 * N2)), "one rank should own 6 slabs: {sizes:?}");

    let plan = Plan::<f64>::new(
        world,
        global,
        global,
        p_in.clone(),
        p_out.clone(),
        None,
        Backend::RustFft,
        Options::default(),
    )
    .expect("plan construction");

    let local = local_shape(&my_in_box);
    let mut input = vec![Complex::new(0.0, 0.0); plan.size_inbox()];
    for a in 0..local[0] {
        for b in 0..local[1] {
            for c in 0..local[2] {
                let g = global_of(&my_in_box, [a, b, c]);
                let flat = (a * local[1] + b) * local[2] + c;
                let x = g[0] as f64 + 4.0 * g[1] as f64 + 16.0 * g[2] as f64;
                input[flat] = Complex::new(x, 0.0);
            }
        }
    }

    let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
    plan.forward_c2c(&input, &mut output, Scaling::None).expect("forward");

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

//! cargo mpirun --np 8 --example s4_r2c_round_trip
//!
//! 8 ranks, global box {(0,0,0),(15,15,15)}, R2C axis 2. A symmetric-scaled
//! forward followed by a symmetric-scaled backward recovers the input.
use distfft3d::{Backend, Box3, Options, Partition, Plan, Scaling};
use mpi::topology::Communicator;
use num_complex::Complex;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 8, "run with 8 processors");
    let rank = world.rank() as usize;

    let g_in = Box3::new([0, 0, 0], [15, 15, 15]);
    let g_out = Box3::new([0, 0, 0], [15, 15, 8]); // hermitian_half_len(16) = 9
    let p_in = Partition::pencil(&g_in, 2, 8, [0, 1, 2]);
    let p_out = Partition::pencil(&g_out, 0, 8, [0, 1, 2]);

    let plan = Plan::<f64>::new(
        world,
        g_in,
        g_out,
        p_in.clone(),
        p_out,
        Some(2),
        Backend::RustFft,
        Options::default(),
    )
    .expect("plan construction");

    let my_box = *p_in.rank_box(rank);
    let local = crate_local_shape(&my_box);
    let mut input = vec![0.0_f64; plan.size_inbox()];
    for i in 0..local[2] {
        for j in 0..local[1] {
            for k in 0..local[0] {
                let g = global_of(&my_box, [k, j, i]);
                let flat = (k * local[1] + j) * local[2] + i;
                input[flat] = g[0] as f64 + 4.0 * g[1] as f64 + 16.0 * g[2] as f64;
            }
        }
    }

    let mut spectrum = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
    plan.forward_r2c(&input, &mut spectrum, Scaling::Symmetric).expect("forward");

    let mut roundtrip = vec![0.0_f64; plan.size_inbox()];
    plan.backward_r2c(&spectrum, &mut roundtrip, Scaling::Symmetric).expect("backward");

    for (a, b) in input.iter().zip(roundtrip.iter()) {
        assert!((a - b).abs() < 1e-9, "round trip mismatch: {a} vs {b}");
    }
}

fn crate_local_shape(b: &Box3) -> [usize; 3] {
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

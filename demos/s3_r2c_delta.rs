//! cargo mpirun --np 2 --example s3_r2c_delta
//!
//! 2 ranks split along axis 2, global box {(0,0,0),(5,5,5)}, R2C axis 0.
//! A delta function at the origin has a constant-magnitude spectrum.
use distfft3d::{Backend, Box3, Options, Partition, Plan, Scaling};
use mpi::topology::Communicator;
use num_complex::Complex;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 2, "run with 2 processors");
    let rank = world.rank() as usize;

    let g_in = Box3::new([0, 0, 0], [5, 5, 5]);
    let g_out = Box3::new([0, 0, 0], [3, 5, 5]); // hermitian_half_len(6) = 4
    let p_in = Partition::pencil(&g_in, 0, 2, [0, 1, 2]);
    let p_out = Partition::pencil(&g_out, 2, 2, [0, 1, 2]);

    let plan = Plan::<f64>::new(
        world,
        g_in,
        g_out,
        p_in.clone(),
        p_out,
        Some(0),
        Backend::RustFft,
        Options::default(),
    )
    .expect("plan construction");
    assert!(plan.is_r2c());

    let my_in_box = *p_in.rank_box(rank);
    let mut input = vec![0.0_f64; plan.size_inbox()];
    if contains(&my_in_box, [0, 0, 0]) {
        let idx = local_index(&my_in_box, [0, 0, 0]);
        input[flat_index(&my_in_box, idx)] = 1.0;
    }

    let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
    plan.forward_r2c(&input, &mut output, Scaling::None).expect("forward");

    for v in &output {
        assert!(
            (v.norm() - 1.0).abs() < 1e-10,
            "delta spectrum should have unit magnitude everywhere, got {v:?}"
        );
    }
}

fn contains(b: &Box3, p: [i64; 3]) -> bool {
    (0..3).all(|i| p[i] >= b.lo()[i] && p[i] <= b.hi()[i])
}

fn local_index(b: &Box3, global: [i64; 3]) -> [usize; 3] {
    let lo = b.lo();
    let order = b.order();
    let rel = [
        (global[0] - lo[0]) as usize,
        (global[1] - lo[1]) as usize,
        (global[2] - lo[2]) as usize,
    ];
    [rel[order[2]], rel[order[1]], rel[order[0]]]
}

fn flat_index(b: &Box3, idx: [usize; 3]) -> usize {
    let shape = {
        let s = b.shape();
        let order = b.order();
        [s[order[2]], s[order[1]], s[order[0]]]
    };
    (idx[0] * shape[1] + idx[1]) * shape[2] + idx[2]
}

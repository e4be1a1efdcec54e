//! cargo mpirun --np 4 --example s2_forward_full
//!
//! 4 ranks split 2x2 along axes 0 and 1 (a pencil along axis 2), global box
//! {(0,0,0),(7,7,7)}. A constant input transforms to a delta at the origin.
use distfft3d::{Backend, Box3, Options, Partition, Plan, Scaling};
use mpi::topology::Communicator;
use num_complex::Complex;

fn main() {
    let universe = mpi::initialize().unwrap();
    let world = universe.world();
    assert_eq!(world.size(), 4, "run with 4 processors");
    let rank = world.rank() as usize;

    let global = Box3::new([0, 0, 0], [7, 7, 7]);
    let p_in = Partition::pencil(&global, 2, 4, [0, 1, 2]);
    let p_out = Partition::pencil(&global, 1, 4, [0, 1, 2]);
    let p_out_ref = p_out.clone();

    let plan = Plan::<f64>::new(
        world,
        global,
        global,
        p_in,
        p_out,
        None,
        Backend::RustFft,
        Options::default(),
    )
    .expect("plan construction");

    let input = vec![Complex::new(1.0, 0.0); plan.size_inbox()];
    let mut output = vec![Complex::new(0.0, 0.0); plan.size_outbox()];
    plan.forward_c2c(&input, &mut output, Scaling::Full).expect("forward");

    let my_box = *p_out_ref.rank_box(rank);
    if contains(&my_box, [0, 0, 0]) {
        let idx = local_index(&my_box, [0, 0, 0]);
        let v = output[flat_index(&my_box, idx)];
        assert!((v.re - 1.0).abs() < 1e-10, "DC term should be 1.0, got {v:?}");
    }
    for k in 1..8i64 {
        if contains(&my_box, [0, 0, k]) {
            let idx = local_index(&my_box, [0, 0, k]);
            let v = output[flat_index(&my_box, idx)];
            assert!(v.norm() < 1e-10, "off-origin term should vanish, got {v:?}");
        }
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

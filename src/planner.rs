//! # Logic planner
//!
//! Pure function from the global boxes, per-rank partitions, optional R2C
//! axis and options to a [`LogicPlan`] (spec §4.2): an ordered list of four
//! layouts plus the FFT axis permutation applied at each stage.
use crate::box3::{AxisOrder, Box3, IDENTITY_ORDER};
use crate::error::Error;
use crate::options::Options;
use crate::partition::Partition;

/// Four layouts `L0..L3` plus the FFT axis order `(a0, a1, a2)` (spec §3).
pub struct LogicPlan {
    pub layouts: [Partition; 4],
    pub fft_axes: [usize; 3],
    pub r2c_axis: Option<usize>,
    /// Full (unshortened) real length along each FFT axis, used for the
    /// scale factor (spec §4.2: "uses the full length along the R2C axis,
    /// not the shortened one").
    pub full_lengths: [usize; 3],
}

impl LogicPlan {
    /// `L1`'s pre-FFT shape along `a0` when an R2C axis sits at stage 0:
    /// the real (full-length) version of the otherwise Hermitian-shrunk
    /// `L1`, since a pencil along `a0` always owns the axis's complete
    /// extent by construction.
    #[must_use]
    pub fn real_preimage_of_l1(&self) -> Partition {
        match self.r2c_axis {
            Some(r) if r == self.fft_axes[0] => grow_axis(&self.layouts[1], r, self.full_lengths[0]),
            _ => Partition::new(*self.layouts[1].global(), self.layouts[1].boxes().to_vec())
                .expect("L1 is already a validated partition"),
        }
    }
}

fn grow_axis(part: &Partition, axis: usize, full_len: usize) -> Partition {
    let mut glo = part.global().lo();
    let mut ghi = part.global().hi();
    glo[axis] = 0;
    ghi[axis] = full_len as i64 - 1;
    let global = Box3::with_order(glo, ghi, part.global().order());
    let boxes: Vec<Box3> = part
        .boxes()
        .iter()
        .map(|b| {
            let mut lo = b.lo();
            let mut hi = b.hi();
            lo[axis] = 0;
            hi[axis] = full_len as i64 - 1;
            Box3::with_order(lo, hi, b.order())
        })
        .collect();
    Partition::new(global, boxes).expect("growing the pencil axis cannot break tiling")
}

/// Build the logic plan (spec §4.2) and the base scale factor
/// `1 / prod(N_ai)` over the three FFT axes' full lengths.
///
/// # Errors
/// [`Error::InvalidR2CAxis`] if `r2c_axis` is outside `{0, 1, 2}`.
/// [`Error::InvalidPartition`] if `p_in`/`p_out` don't tile their global
/// boxes, or if the (possibly R2C-shortened) working domain doesn't match
/// `g_out`'s extents.
pub fn plan(
    g_in: Box3,
    g_out: Box3,
    p_in: Partition,
    p_out: Partition,
    r2c_axis: Option<usize>,
    opts: Options,
) -> Result<(LogicPlan, f64), Error> {
    if let Some(r) = r2c_axis {
        if r > 2 {
            return Err(Error::InvalidR2CAxis { axis: r as i64 });
        }
    }

    let a0 = match r2c_axis {
        Some(r) => r,
        None => choose_first_axis(&g_in, &p_in),
    };
    let remaining: Vec<usize> = (0..3).filter(|&a| a != a0).collect();

    let g_work = match r2c_axis {
        Some(r) => {
            let half = crate::scale::hermitian_half_len((g_in.hi()[r] - g_in.lo()[r] + 1) as usize);
            shrink_global(&g_in, r, half)
        }
        None => g_in,
    };

    let order1 = order_for(a0, opts);
    let nranks = p_in.nranks();
    let l1 = Partition::pencil(&g_work, a0, nranks, order1);

    // Among the two remaining axes, prefer whichever yields the smaller
    // L1 -> L2 redistribution volume; tie-break (including the common
    // single-rank case, where every candidate is zero) to the
    // ascending-index axis.
    let candidates = [
        (remaining[0], Partition::pencil(&g_work, remaining[0], nranks, order_for(remaining[0], opts))),
        (remaining[1], Partition::pencil(&g_work, remaining[1], nranks, order_for(remaining[1], opts))),
    ];
    let a1 = choose_second_axis(&l1, &candidates);
    let [(axis_a, part_a), (axis_b, part_b)] = candidates;
    let (l2, a2) = if a1 == axis_a { (part_a, axis_b) } else { (part_b, axis_a) };
    let fft_axes = [a0, a1, a2];

    tracing::debug!(?fft_axes, r2c_axis = ?r2c_axis, "logic planner chose FFT axis order");

    if g_out.shape() != g_work.shape() {
        return Err(Error::InvalidPartition {
            reason: format!(
                "output global box {:?} does not match the expected (possibly R2C-shortened) domain {:?}",
                g_out.shape(),
                g_work.shape()
            ),
        });
    }

    let full_lengths = [
        axis_len(&g_in, fft_axes[0]),
        axis_len(&g_in, fft_axes[1]),
        axis_len(&g_in, fft_axes[2]),
    ];
    let scale = 1.0 / (full_lengths[0] * full_lengths[1] * full_lengths[2]) as f64;

    let plan = LogicPlan {
        layouts: [p_in, l1, l2, p_out],
        fft_axes,
        r2c_axis,
        full_lengths,
    };
    Ok((plan, scale))
}

fn axis_len(b: &Box3, axis: usize) -> usize {
    (b.hi()[axis] - b.lo()[axis] + 1) as usize
}

fn shrink_global(g: &Box3, axis: usize, new_len: usize) -> Box3 {
    let mut lo = g.lo();
    let mut hi = g.hi();
    lo[axis] = 0;
    hi[axis] = new_len as i64 - 1;
    Box3::with_order(lo, hi, g.order())
}

/// Axis order stamping a pencil layout for FFT axis `axis` fastest in
/// memory when `opts.reorder_axes` is set, identity otherwise. Only
/// `plan()` (and direct callers of this module) ever see the identity
/// branch: [`crate::plan::Plan::new`] rejects `reorder_axes = false`
/// before calling here, since its batched 1D executors require the
/// stamped axis to actually be the one the identity branch leaves alone.
pub(crate) fn order_for(axis: usize, opts: Options) -> AxisOrder {
    if !opts.reorder_axes {
        return IDENTITY_ORDER;
    }
    let mut rest: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
    rest.sort_unstable();
    [axis, rest[0], rest[1]]
}

/// Choose the first FFT axis when no R2C axis is pinned: prefer an axis
/// along which the input partition is already pencil-shaped for every
/// rank (avoids an initial reshape); tie-break ascending axis index.
fn choose_first_axis(g_in: &Box3, p_in: &Partition) -> usize {
    for axis in 0..3 {
        if p_in.boxes().iter().all(|b| b.is_pencil(axis, g_in)) {
            return axis;
        }
    }
    0
}

/// Choose which of the two candidate second-stage axes to run next:
/// prefer the one giving the smaller `l1 -> candidate` redistribution
/// volume (spec §4.2's "among remaining axes prefer the one yielding
/// smallest redistribution volume"); tie-break to `candidates[0]`, the
/// ascending-index axis.
fn choose_second_axis(l1: &Partition, candidates: &[(usize, Partition); 2]) -> usize {
    let vol0 = redistribution_volume(l1, &candidates[0].1);
    let vol1 = redistribution_volume(l1, &candidates[1].1);
    if vol1 < vol0 {
        candidates[1].0
    } else {
        candidates[0].0
    }
}

/// Total element count that would cross ranks redistributing from `src`
/// to `dst`: tiles a rank already owns under both partitions don't move.
/// Used only to compare candidate FFT-axis orderings; the reshape itself
/// (`reshape.rs::ReshapeOp`) computes its own tile lists independently.
fn redistribution_volume(src: &Partition, dst: &Partition) -> usize {
    let n = src.nranks();
    let mut moved = 0usize;
    for r in 0..n {
        for p in 0..n {
            if r == p {
                continue;
            }
            moved += src.rank_box(r).intersect(dst.rank_box(p)).count();
        }
    }
    moved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redistribution_volume_zero_when_per_rank_boxes_coincide() {
        // Cube 2x2x2 over 2 ranks: pencil along axis 0 (splits only axis
        // 2, since processor_grid(2) leaves the lower-indexed other axis
        // whole) and pencil along axis 1 (same other-axis assignment, so
        // it ends up splitting axis 2 identically) assign every rank the
        // exact same box, so nothing needs to move between them.
        let g = Box3::new([0, 0, 0], [1, 1, 1]);
        let l1 = Partition::pencil(&g, 0, 2, IDENTITY_ORDER);
        let l2_axis1 = Partition::pencil(&g, 1, 2, IDENTITY_ORDER);
        assert_eq!(redistribution_volume(&l1, &l2_axis1), 0);
    }

    #[test]
    fn redistribution_volume_counts_cross_rank_overlap() {
        let g = Box3::new([0, 0, 0], [1, 1, 1]);
        let l1 = Partition::pencil(&g, 0, 2, IDENTITY_ORDER);
        let l2_axis2 = Partition::pencil(&g, 2, 2, IDENTITY_ORDER);
        assert_eq!(redistribution_volume(&l1, &l2_axis2), 4);
    }

    #[test]
    fn choose_second_axis_prefers_lower_volume_even_as_second_candidate() {
        let g = Box3::new([0, 0, 0], [1, 1, 1]);
        let l1 = Partition::new(g, vec![Box3::new([0, 0, 0], [1, 1, 0]), Box3::new([0, 0, 1], [1, 1, 1])]).unwrap();
        // Tagged "7": nonzero volume against l1 (computed above as 4).
        let high_volume =
            Partition::new(g, vec![Box3::new([0, 0, 0], [1, 0, 1]), Box3::new([0, 1, 0], [1, 1, 1])]).unwrap();
        // Tagged "9": identical per-rank boxes to l1, so zero volume —
        // but it sits second in `candidates`, which an ascending-only
        // tie-break would never reach.
        let low_volume =
            Partition::new(g, vec![Box3::new([0, 0, 0], [1, 1, 0]), Box3::new([0, 0, 1], [1, 1, 1])]).unwrap();
        let candidates = [(7, high_volume), (9, low_volume)];
        assert_eq!(choose_second_axis(&l1, &candidates), 9);
    }

    #[test]
    fn choose_second_axis_tie_breaks_to_first_candidate() {
        let g = Box3::new([0, 0, 0], [1, 1, 1]);
        let l1 = Partition::new(g, vec![Box3::new([0, 0, 0], [1, 1, 0]), Box3::new([0, 0, 1], [1, 1, 1])]).unwrap();
        let same_a = l1.clone();
        let same_b = l1.clone();
        let candidates = [(3, same_a), (5, same_b)];
        assert_eq!(choose_second_axis(&l1, &candidates), 3);
    }

    #[test]
    fn c2c_single_rank_plan_round_trips_layouts() {
        let g = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(g, vec![g]).unwrap();
        let p_out = Partition::new(g, vec![g]).unwrap();
        let (plan, scale) = plan(g, g, p_in, p_out, None, Options::default()).unwrap();
        assert_eq!(plan.layouts[0].global().shape(), [4, 4, 4]);
        assert_eq!(plan.layouts[3].global().shape(), [4, 4, 4]);
        assert_eq!(scale, 1.0 / 64.0);
    }

    #[test]
    fn r2c_axis_forces_first_fft_axis() {
        let g_in = Box3::new([0, 0, 0], [7, 3, 3]);
        let g_out = Box3::new([0, 0, 0], [4, 3, 3]); // floor(8/2)+1 = 5
        let p_in = Partition::new(g_in, vec![g_in]).unwrap();
        let p_out = Partition::new(g_out, vec![g_out]).unwrap();
        let (plan, _scale) = plan(g_in, g_out, p_in, p_out, Some(0), Options::default()).unwrap();
        assert_eq!(plan.fft_axes[0], 0);
        assert_eq!(plan.layouts[1].global().shape()[0], 5);
    }

    #[test]
    fn invalid_r2c_axis_is_rejected() {
        let g = Box3::new([0, 0, 0], [3, 3, 3]);
        let p_in = Partition::new(g, vec![g]).unwrap();
        let p_out = Partition::new(g, vec![g]).unwrap();
        let err = plan(g, g, p_in, p_out, Some(3), Options::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidR2CAxis { axis: 3 }));
    }

    #[test]
    fn mismatched_output_domain_is_rejected() {
        let g_in = Box3::new([0, 0, 0], [7, 3, 3]);
        let g_out_wrong = Box3::new([0, 0, 0], [7, 3, 3]); // should be shortened, isn't
        let p_in = Partition::new(g_in, vec![g_in]).unwrap();
        let p_out = Partition::new(g_out_wrong, vec![g_out_wrong]).unwrap();
        let err = plan(g_in, g_out_wrong, p_in, p_out, Some(0), Options::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidPartition { .. }));
    }
}

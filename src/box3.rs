//! # Box algebra
//!
//! Axis-aligned integer boxes over the 3D lattice, the unit the planner and
//! reshape operator reason about. A [`Box3`] is closed on both ends
//! (`lo..=hi` per axis, not `lo..hi`), matching the corner convention used
//! throughout `spec.md`.
#![allow(clippy::similar_names)]

use mpi::collective::CommunicatorCollectives;
use mpi::topology::Communicator;
use mpi::traits::Equivalence;

/// A permutation of `(0, 1, 2)`. `order[0]` names the axis that is
/// contiguous (unit-stride) in memory, `order[2]` the slowest-varying.
pub type AxisOrder = [usize; 3];

/// The identity axis order: axis 0 fastest, axis 2 slowest.
pub const IDENTITY_ORDER: AxisOrder = [0, 1, 2];

/// Closed-interval axis-aligned box over the integer lattice, tagged with
/// the axis order describing how its points are laid out in memory.
///
/// # Invariants
/// `lo[i] <= hi[i] + 1` for every axis (an empty box has `hi[i] + 1 ==
/// lo[i]` on at least one axis, following the convention that `count`
/// returns zero rather than treating an inverted range as an error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Box3 {
    lo: [i64; 3],
    hi: [i64; 3],
    order: AxisOrder,
}

impl Box3 {
    /// Build a box from inclusive lower/upper corners, with the identity
    /// axis order.
    #[must_use]
    pub fn new(lo: [i64; 3], hi: [i64; 3]) -> Self {
        Self::with_order(lo, hi, IDENTITY_ORDER)
    }

    /// Build a box from inclusive lower/upper corners and an explicit axis
    /// order.
    ///
    /// # Panics
    /// `order` must be a permutation of `(0, 1, 2)`.
    #[must_use]
    pub fn with_order(lo: [i64; 3], hi: [i64; 3], order: AxisOrder) -> Self {
        assert!(is_permutation(order), "axis order must permute (0, 1, 2)");
        Self { lo, hi, order }
    }

    /// Build a box from three independent per-axis `(start, end)` inclusive
    /// ranges, with the identity axis order (callers needing a different
    /// order call [`Box3::reorder`] on the result). `Partition::pencil`
    /// uses this to assemble each rank's box one axis at a time: the
    /// pencil axis gets the global box's own `(lo, hi)`, the other two get
    /// an offset `Distribution::segments` entry — mirroring how the
    /// teacher assembles a pencil's box from one `Distribution` per split
    /// axis.
    #[must_use]
    pub fn from_distribution_triplet(axes: [(i64, i64); 3]) -> Self {
        let lo = [axes[0].0, axes[1].0, axes[2].0];
        let hi = [axes[0].1, axes[1].1, axes[2].1];
        Self::new(lo, hi)
    }

    /// An empty box over axes `0..0, 0..0, 0..0`, useful as a placeholder
    /// for ranks with no data on a given stage.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lo: [0, 0, 0],
            hi: [-1, -1, -1],
            order: IDENTITY_ORDER,
        }
    }

    #[must_use]
    pub fn lo(&self) -> [i64; 3] {
        self.lo
    }

    #[must_use]
    pub fn hi(&self) -> [i64; 3] {
        self.hi
    }

    #[must_use]
    pub fn order(&self) -> AxisOrder {
        self.order
    }

    /// Per-axis extent (`hi - lo + 1`, clamped to zero for an empty box).
    #[must_use]
    pub fn shape(&self) -> [usize; 3] {
        let mut s = [0usize; 3];
        for i in 0..3 {
            let len = self.hi[i] - self.lo[i] + 1;
            s[i] = if len > 0 { len as usize } else { 0 };
        }
        s
    }

    /// True if the box contains no lattice points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|i| self.hi[i] < self.lo[i])
    }

    /// Number of lattice points, `prod(hi_i - lo_i + 1)` when non-empty.
    #[must_use]
    pub fn count(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.shape().iter().product()
        }
    }

    /// Intersection of two boxes. The result carries `self`'s axis order.
    #[must_use]
    pub fn intersect(&self, other: &Box3) -> Box3 {
        let mut lo = [0i64; 3];
        let mut hi = [0i64; 3];
        for i in 0..3 {
            lo[i] = self.lo[i].max(other.lo[i]);
            hi[i] = self.hi[i].min(other.hi[i]);
        }
        Box3 {
            lo,
            hi,
            order: self.order,
        }
    }

    /// Same set of lattice points, tagged with a different in-memory axis
    /// order.
    #[must_use]
    pub fn reorder(&self, order: AxisOrder) -> Box3 {
        Box3::with_order(self.lo, self.hi, order)
    }

    /// True iff `self` spans the full extent of `global` along `axis`,
    /// i.e. `self` is a pencil along that axis.
    #[must_use]
    pub fn is_pencil(&self, axis: usize, global: &Box3) -> bool {
        self.lo[axis] == global.lo[axis] && self.hi[axis] == global.hi[axis]
    }

    /// Union check helper: does `self` equal the union of boxes `parts`
    /// with no overlaps? Returns `Ok(())` or a human-readable mismatch
    /// description.
    ///
    /// # Errors
    /// Returns a description of the first overlap or volume mismatch found.
    pub fn validate_tiling(&self, parts: &[Box3]) -> Result<(), String> {
        for (i, a) in parts.iter().enumerate() {
            for b in &parts[i + 1..] {
                if !a.intersect(b).is_empty() {
                    return Err(format!(
                        "ranks overlap: {a:?} and {b:?} share {} points",
                        a.intersect(b).count()
                    ));
                }
            }
        }
        let total: usize = parts.iter().map(Box3::count).sum();
        if total != self.count() {
            return Err(format!(
                "partition covers {total} points, global box has {}",
                self.count()
            ));
        }
        Ok(())
    }
}

fn is_permutation(order: AxisOrder) -> bool {
    let mut seen = [false; 3];
    for &a in &order {
        if a >= 3 || seen[a] {
            return false;
        }
        seen[a] = true;
    }
    true
}

/// Gather every rank's local input and output box, in rank order.
///
/// Collective over `comm`: every rank must call this with its own local
/// boxes. Implemented with a single `all_gather_into` per box (2 calls
/// total), since a [`Box3`]'s corners serialize trivially to a fixed-size
/// `Equivalence` payload.
#[must_use]
pub fn gather<C: Communicator + CommunicatorCollectives>(
    local_in: &Box3,
    local_out: &Box3,
    comm: &C,
) -> (Vec<Box3>, Vec<Box3>) {
    let nprocs = comm.size() as usize;
    let in_payload = BoxCorners::from(local_in);
    let out_payload = BoxCorners::from(local_out);
    let mut in_all = vec![BoxCorners::default(); nprocs];
    let mut out_all = vec![BoxCorners::default(); nprocs];
    comm.all_gather_into(&in_payload, &mut in_all[..]);
    comm.all_gather_into(&out_payload, &mut out_all[..]);
    (
        in_all.iter().map(BoxCorners::into_box).collect(),
        out_all.iter().map(BoxCorners::into_box).collect(),
    )
}

/// Plain-old-data mirror of a [`Box3`]'s corners, used only to get an
/// `Equivalence` impl for MPI transport without exposing the field layout
/// of `Box3` itself.
#[derive(Debug, Clone, Copy, Default, mpi::traits::Equivalence)]
#[repr(C)]
struct BoxCorners {
    lo: [i64; 3],
    hi: [i64; 3],
}

impl From<&Box3> for BoxCorners {
    fn from(b: &Box3) -> Self {
        Self { lo: b.lo, hi: b.hi }
    }
}

impl BoxCorners {
    fn into_box(&self) -> Box3 {
        Box3::new(self.lo, self.hi)
    }
}

//! # Reshape operator
//!
//! Builds and executes the inter-rank redistribution between two
//! partitions of the same global box: pack local send tiles, exchange
//! them with peers, unpack into the destination layout (spec §4.3).
use mpi::collective::CommunicatorCollectives;
use mpi::datatype::{Partition as MpiPartition, PartitionMut as MpiPartitionMut};
use mpi::request::{scope, WaitGuard};
use mpi::topology::{Color, Communicator, SimpleCommunicator};
use mpi::traits::Equivalence;
use mpi::Count;
use num_traits::Zero;

use crate::box3::Box3;
use crate::error::Error;
use crate::partition::Partition;

/// How a reshape's exchange phase moves packed tiles between ranks (spec
/// §4.3). All three produce the same result; they differ in message
/// count and collective-vs-point-to-point shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// One `all_to_all_varcount` collective call over the full group.
    AllToAll,
    /// One non-blocking send and receive per peer holding a non-empty
    /// tile, then a single wait-all. Peer delivery order is unspecified.
    Pairwise,
    /// Decomposes the exchange into per-axis collective rounds over the
    /// pencil-grid row/column sub-communicators when both partitions were
    /// built by [`Partition::pencil`] and share a process grid; falls
    /// back to [`Transport::AllToAll`] otherwise.
    PencilPipelined,
}

/// One rank's send tile: the overlap between this rank's source box and
/// a peer's destination box.
#[derive(Debug, Clone, Copy)]
struct SendTile {
    peer: usize,
    region: Box3,
}

/// One rank's receive tile: the overlap between a peer's source box and
/// this rank's destination box.
#[derive(Debug, Clone, Copy)]
struct RecvTile {
    peer: usize,
    region: Box3,
}

/// A sub-communicator restricted to ranks with non-empty tiles on either
/// side of a reshape (`use_subcomm`, spec §6), plus the mapping from a
/// peer's original rank to its rank inside `comm`. `MPI_Comm_split`
/// preserves relative rank order within a color, so every rank can derive
/// this mapping locally from the (fully known) `src`/`dst` partitions
/// without any extra communication.
struct SubComm {
    comm: SimpleCommunicator,
    rank_map: Vec<Option<usize>>,
}

/// An executable redistribution from partition `S` to partition `D`,
/// built once and reused for every forward/backward call that needs it.
pub struct ReshapeOp {
    my_rank: usize,
    src_local: Box3,
    dst_local: Box3,
    send: Vec<SendTile>,
    recv: Vec<RecvTile>,
    transport: Transport,
    src_grid: Option<crate::partition::PencilGrid>,
    dst_grid: Option<crate::partition::PencilGrid>,
    nranks: usize,
    sub: Option<SubComm>,
}

impl ReshapeOp {
    /// Construct the send/receive tile lists for redistributing from `src`
    /// to `dst`, both partitions of the same global domain. When
    /// `use_subcomm` is set, also collectively splits `comm` down to the
    /// ranks that actually exchange data for this reshape (spec §6); every
    /// rank must call this with the same `use_subcomm` value in the same
    /// order, since the split is a collective operation.
    #[must_use]
    pub fn new(
        src: &Partition,
        dst: &Partition,
        my_rank: usize,
        transport: Transport,
        comm: &SimpleCommunicator,
        use_subcomm: bool,
    ) -> Self {
        let nranks = src.nranks();
        debug_assert_eq!(nranks, dst.nranks());
        let src_local = *src.rank_box(my_rank);
        let dst_local = *dst.rank_box(my_rank);

        let mut send = Vec::new();
        for peer in 0..nranks {
            let tile = src_local.intersect(dst.rank_box(peer));
            if !tile.is_empty() {
                send.push(SendTile { peer, region: tile });
            }
        }
        let mut recv = Vec::new();
        for peer in 0..nranks {
            let tile = src.rank_box(peer).intersect(&dst_local);
            if !tile.is_empty() {
                recv.push(RecvTile { peer, region: tile });
            }
        }

        tracing::debug!(
            rank = my_rank,
            send_tiles = send.len(),
            recv_tiles = recv.len(),
            ?transport,
            "built reshape operator"
        );

        let sub = if use_subcomm {
            build_subcomm(src, dst, my_rank, comm)
        } else {
            None
        };

        Self {
            my_rank,
            src_local,
            dst_local,
            send,
            recv,
            transport,
            src_grid: src.pencil_grid(),
            dst_grid: dst.pencil_grid(),
            nranks,
            sub,
        }
    }

    /// Total element volume this rank sends.
    #[must_use]
    pub fn send_volume(&self) -> usize {
        self.send.iter().map(|t| t.region.count()).sum()
    }

    /// Total element volume this rank receives.
    #[must_use]
    pub fn recv_volume(&self) -> usize {
        self.recv.iter().map(|t| t.region.count()).sum()
    }

    /// Execute the reshape: pack `input` (laid out per `src`'s local box
    /// and axis order), exchange with peers over `comm`, unpack into
    /// `output` (laid out per `dst`'s local box and axis order).
    ///
    /// # Errors
    /// [`Error::CommFailure`] if the transport reports a failure.
    pub fn execute<T>(
        &self,
        comm: &SimpleCommunicator,
        input: &ndarray::Array3<T>,
        output: &mut ndarray::Array3<T>,
    ) -> Result<(), Error>
    where
        T: Zero + Copy + Equivalence,
    {
        // Self-tiles: source rank equals destination rank. Always a direct
        // copy with transposition, never through the transport (spec §4.3).
        let self_tile = self.src_local.intersect(&self.dst_local);
        if !self_tile.is_empty() {
            copy_transpose(&self_tile, &self.src_local, input, &self.dst_local, output);
        }

        let peer_send: Vec<&SendTile> = self.send.iter().filter(|t| t.peer != self.my_rank).collect();
        let peer_recv: Vec<&RecvTile> = self.recv.iter().filter(|t| t.peer != self.my_rank).collect();

        match self.transport {
            // `exchange_pencil_pipelined` calls `comm.split_by_color`
            // collectively over the *full* `comm` on every invocation, so
            // every rank in `comm` must reach it on every call even if
            // this particular rank has no peer tiles this stage (e.g. it
            // is fully local while siblings still exchange) — otherwise
            // ranks that take the empty-tile shortcut never call the
            // split while the rest do, and the collective deadlocks.
            Transport::PencilPipelined => self.exchange_pencil_pipelined(comm, &peer_send, &peer_recv, input, output),
            _ if peer_send.is_empty() && peer_recv.is_empty() => Ok(()),
            Transport::AllToAll => self.exchange_all_to_all(comm, &peer_send, &peer_recv, input, output),
            Transport::Pairwise => self.exchange_pairwise(comm, &peer_send, &peer_recv, input, output),
        }
    }

    /// Resolve the communicator and peer-rank-renumbering this reshape
    /// should use for the current call: the `use_subcomm`-restricted
    /// group if one was built at construction, else `comm` unchanged with
    /// an identity renumbering.
    fn target_comm<'a>(
        &'a self,
        comm: &'a SimpleCommunicator,
    ) -> (&'a SimpleCommunicator, Box<dyn Fn(usize) -> usize + 'a>) {
        match &self.sub {
            Some(sub) => (
                &sub.comm,
                Box::new(move |r: usize| sub.rank_map[r].expect("peer must be in the use_subcomm group")),
            ),
            None => (comm, Box::new(|r: usize| r)),
        }
    }

    fn exchange_all_to_all<T>(
        &self,
        comm: &SimpleCommunicator,
        sends: &[&SendTile],
        recvs: &[&RecvTile],
        input: &ndarray::Array3<T>,
        output: &mut ndarray::Array3<T>,
    ) -> Result<(), Error>
    where
        T: Zero + Copy + Equivalence,
    {
        let (target, rank_of) = self.target_comm(comm);
        self.exchange_all_to_all_on(target, sends, recvs, input, output, rank_of)
    }

    fn exchange_pairwise<T>(
        &self,
        comm: &SimpleCommunicator,
        sends: &[&SendTile],
        recvs: &[&RecvTile],
        input: &ndarray::Array3<T>,
        output: &mut ndarray::Array3<T>,
    ) -> Result<(), Error>
    where
        T: Zero + Copy + Equivalence,
    {
        let (target, rank_of) = self.target_comm(comm);

        let mut send_bufs: Vec<Vec<T>> = Vec::with_capacity(sends.len());
        for tile in sends {
            let mut buf = Vec::with_capacity(tile.region.count());
            pack(&tile.region, &self.src_local, input, &mut buf);
            send_bufs.push(buf);
        }
        let mut recv_bufs: Vec<Vec<T>> =
            recvs.iter().map(|t| vec![T::zero(); t.region.count()]).collect();

        scope(|scope| {
            let mut guards: Vec<WaitGuard<_, _>> = Vec::new();
            for (tile, buf) in recvs.iter().zip(recv_bufs.iter_mut()) {
                let req = target
                    .process_at_rank(rank_of(tile.peer) as i32)
                    .immediate_receive_into(scope, &mut buf[..]);
                guards.push(WaitGuard::from(req));
            }
            for (tile, buf) in sends.iter().zip(send_bufs.iter()) {
                let req = target
                    .process_at_rank(rank_of(tile.peer) as i32)
                    .immediate_send(scope, &buf[..]);
                guards.push(WaitGuard::from(req));
            }
            // Dropping the guards at scope exit waits on every request;
            // ordering across peers is unspecified per spec §4.3.
        });

        for (tile, buf) in recvs.iter().zip(recv_bufs.iter()) {
            unpack(&tile.region, buf, &self.dst_local, output);
        }
        Ok(())
    }

    /// Per-axis pipelined transport: when both sides are grid pencils
    /// sharing row/column structure, split the exchange into up to two
    /// collective rounds over row/column sub-communicators (mirrors the
    /// teacher's `subcomm_along_axis` + `all_to_all_varcount_into`
    /// pattern generalized from a fixed pencil template to arbitrary
    /// boxes). Falls back to the single all-to-all otherwise.
    fn exchange_pencil_pipelined<T>(
        &self,
        comm: &SimpleCommunicator,
        sends: &[&SendTile],
        recvs: &[&RecvTile],
        input: &ndarray::Array3<T>,
        output: &mut ndarray::Array3<T>,
    ) -> Result<(), Error>
    where
        T: Zero + Copy + Equivalence,
    {
        let (Some(src_grid), Some(dst_grid)) = (self.src_grid, self.dst_grid) else {
            return self.exchange_all_to_all(comm, sends, recvs, input, output);
        };
        if src_grid.dims != dst_grid.dims {
            return self.exchange_all_to_all(comm, sends, recvs, input, output);
        }
        let (p0, p1) = src_grid.dims;
        if p0 * p1 != self.nranks {
            return self.exchange_all_to_all(comm, sends, recvs, input, output);
        }
        // Restrict the collective to the row this rank belongs to
        // (color = rank / p1), which is exactly where every peer this
        // rank can exchange with for an adjacent pencil transpose lives.
        let color = (self.my_rank / p1) as i32;
        let Some(sub) = comm.split_by_color(Color::with_value(color)) else {
            return self.exchange_all_to_all(comm, sends, recvs, input, output);
        };
        let local_sends: Vec<&SendTile> = sends
            .iter()
            .filter(|t| t.peer / p1 == color as usize)
            .copied()
            .collect();
        let local_recvs: Vec<&RecvTile> = recvs
            .iter()
            .filter(|t| t.peer / p1 == color as usize)
            .copied()
            .collect();
        if local_sends.len() + local_recvs.len() < sends.len() + recvs.len() {
            // Some peers fall outside this rank's row: the grids aren't
            // adjacent (e.g. L2 -> L3 with an arbitrary user output
            // layout), so the single-round sub-communicator trick does
            // not cover every tile. Fall back rather than silently
            // dropping data.
            return self.exchange_all_to_all(comm, sends, recvs, input, output);
        }
        self.exchange_all_to_all_on(&sub, &local_sends, &local_recvs, input, output, |r| r % p1)
    }

    #[allow(clippy::too_many_arguments)]
    fn exchange_all_to_all_on<T>(
        &self,
        comm: &SimpleCommunicator,
        sends: &[&SendTile],
        recvs: &[&RecvTile],
        input: &ndarray::Array3<T>,
        output: &mut ndarray::Array3<T>,
        local_rank_of: impl Fn(usize) -> usize,
    ) -> Result<(), Error>
    where
        T: Zero + Copy + Equivalence,
    {
        let local_n = comm.size() as usize;
        let mut send_counts = vec![0 as Count; local_n];
        let mut send_buf: Vec<T> = Vec::new();
        let mut ordered_sends: Vec<&SendTile> = sends.to_vec();
        ordered_sends.sort_by_key(|t| local_rank_of(t.peer));
        for tile in &ordered_sends {
            let before = send_buf.len();
            pack(&tile.region, &self.src_local, input, &mut send_buf);
            send_counts[local_rank_of(tile.peer)] = (send_buf.len() - before) as Count;
        }
        let send_displs = prefix_sum(&send_counts);

        let mut recv_counts = vec![0 as Count; local_n];
        let mut ordered_recvs: Vec<&RecvTile> = recvs.to_vec();
        ordered_recvs.sort_by_key(|t| local_rank_of(t.peer));
        for tile in &ordered_recvs {
            recv_counts[local_rank_of(tile.peer)] = tile.region.count() as Count;
        }
        let recv_displs = prefix_sum(&recv_counts);
        let mut recv_buf = vec![T::zero(); recv_counts.iter().sum::<Count>() as usize];
        {
            let send_partition = MpiPartition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
            let mut recv_partition =
                MpiPartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
            comm.all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }
        for tile in &ordered_recvs {
            let lr = local_rank_of(tile.peer);
            let start = recv_displs[lr] as usize;
            let len = recv_counts[lr] as usize;
            unpack(&tile.region, &recv_buf[start..start + len], &self.dst_local, output);
        }
        Ok(())
    }
}

/// Which ranks have any cross-rank tile (send or receive) between `src`
/// and `dst`. Computed identically on every rank from the two fully-known
/// partitions, with no communication needed.
fn participating_ranks(src: &Partition, dst: &Partition) -> Vec<bool> {
    let nranks = src.nranks();
    let mut participating = vec![false; nranks];
    for r in 0..nranks {
        let s = src.rank_box(r);
        let d = dst.rank_box(r);
        for p in 0..nranks {
            if p == r {
                continue;
            }
            if !s.intersect(dst.rank_box(p)).is_empty() || !d.intersect(src.rank_box(p)).is_empty() {
                participating[r] = true;
                break;
            }
        }
    }
    participating
}

/// Collectively split `comm` down to the ranks with cross-rank traffic for
/// this reshape (spec §6 `use_subcomm`). Every rank must call this, since
/// `split_by_color` is a collective operation; ranks excluded from the
/// group pass `Color::undefined()` and get `None` back from the split,
/// which is reflected here as `sub == None` for them too (their
/// `ReshapeOp` is a no-op for this stage regardless).
fn build_subcomm(src: &Partition, dst: &Partition, my_rank: usize, comm: &SimpleCommunicator) -> Option<SubComm> {
    let participating = participating_ranks(src, dst);
    let color = if participating[my_rank] {
        Color::with_value(0)
    } else {
        Color::undefined()
    };
    let sub_comm = comm.split_by_color(color)?;
    let mut rank_map = vec![None; participating.len()];
    let mut next = 0usize;
    for (r, is_in) in participating.iter().enumerate() {
        if *is_in {
            rank_map[r] = Some(next);
            next += 1;
        }
    }
    Some(SubComm {
        comm: sub_comm,
        rank_map,
    })
}

fn prefix_sum(counts: &[Count]) -> Vec<Count> {
    counts
        .iter()
        .scan(0, |acc, &x| {
            let tmp = *acc;
            *acc += x;
            Some(tmp)
        })
        .collect()
}

/// Map a global lattice coordinate into the local ndarray index for a box
/// laid out per `order`: `order[0]` is the unit-stride (ndarray's last)
/// axis.
fn local_index(local_box: &Box3, global: [i64; 3]) -> [usize; 3] {
    let lo = local_box.lo();
    let order = local_box.order();
    let rel = [
        (global[0] - lo[0]) as usize,
        (global[1] - lo[1]) as usize,
        (global[2] - lo[2]) as usize,
    ];
    // ndarray axis k holds lattice axis order[2 - k].
    [rel[order[2]], rel[order[1]], rel[order[0]]]
}

/// Iterate a tile's lattice points in canonical ascending (axis0, axis1,
/// axis2) order — the same order on both sides of a reshape regardless of
/// either side's axis order, which is what keeps pack/unpack positions in
/// lockstep without encoding order into the wire format.
fn for_each_point(tile: &Box3, mut f: impl FnMut([i64; 3])) {
    let lo = tile.lo();
    let hi = tile.hi();
    for i in lo[0]..=hi[0] {
        for j in lo[1]..=hi[1] {
            for k in lo[2]..=hi[2] {
                f([i, j, k]);
            }
        }
    }
}

fn pack<T: Copy>(tile: &Box3, src_local: &Box3, input: &ndarray::Array3<T>, out: &mut Vec<T>) {
    for_each_point(tile, |p| {
        let idx = local_index(src_local, p);
        out.push(input[idx]);
    });
}

fn unpack<T: Copy>(tile: &Box3, buf: &[T], dst_local: &Box3, output: &mut ndarray::Array3<T>) {
    let mut pos = 0;
    for_each_point(tile, |p| {
        let idx = local_index(dst_local, p);
        output[idx] = buf[pos];
        pos += 1;
    });
}

fn copy_transpose<T: Copy>(
    tile: &Box3,
    src_local: &Box3,
    input: &ndarray::Array3<T>,
    dst_local: &Box3,
    output: &mut ndarray::Array3<T>,
) {
    for_each_point(tile, |p| {
        let si = local_index(src_local, p);
        let di = local_index(dst_local, p);
        output[di] = input[si];
    });
}

/// Local array shape for a box: ndarray axis 2 (fastest) holds the box's
/// `order[0]` lattice axis.
#[must_use]
pub fn local_shape(b: &Box3) -> [usize; 3] {
    let shape = b.shape();
    let order = b.order();
    [shape[order[2]], shape[order[1]], shape[order[0]]]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box3::IDENTITY_ORDER;

    fn single_rank_partition(global: Box3) -> Partition {
        Partition::new(global, vec![global]).unwrap()
    }

    #[test]
    fn self_reshape_transposes_without_transport() {
        // Single-rank reshape between two axis orders of the same box;
        // exercised directly through the tile helpers since it needs no
        // communicator.
        let global = Box3::new([0, 0, 0], [1, 1, 1]);
        let src = global.reorder(IDENTITY_ORDER);
        let dst = global.reorder([2, 1, 0]);

        let mut input = ndarray::Array3::<f64>::zeros(local_shape(&src));
        let mut n = 0.0;
        for v in input.iter_mut() {
            *v = n;
            n += 1.0;
        }
        let mut output = ndarray::Array3::<f64>::zeros(local_shape(&dst));
        copy_transpose(&src, &src, &input, &dst, &mut output);

        // Every global point must match between input and output layouts.
        for_each_point(&src, |p| {
            let si = local_index(&src, p);
            let di = local_index(&dst, p);
            assert_eq!(input[si], output[di]);
        });
    }

    #[test]
    fn tiles_cover_disjoint_destination_ranks() {
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let src = single_rank_partition(global);
        let a = Box3::new([0, 0, 0], [1, 3, 3]);
        let b = Box3::new([2, 0, 0], [3, 3, 3]);
        let dst = Partition::new(global, vec![a, b]).unwrap();
        let comm = crate::test_world();
        let op_rank0 = ReshapeOp::new(&src, &dst, 0, Transport::AllToAll, &comm, false);
        assert_eq!(op_rank0.send_volume(), global.count());
    }

    #[test]
    fn use_subcomm_excludes_idle_ranks_from_the_split() {
        // A single-rank src/dst pair has no cross-rank traffic at all, so
        // `participating_ranks` is all-false and `build_subcomm` must hand
        // every rank `Color::undefined()` (and therefore `sub == None`)
        // rather than deadlock trying to find a peer.
        let global = Box3::new([0, 0, 0], [3, 3, 3]);
        let src = single_rank_partition(global);
        let dst = single_rank_partition(global);
        let comm = crate::test_world();
        let op = ReshapeOp::new(&src, &dst, 0, Transport::AllToAll, &comm, true);
        assert!(op.sub.is_none());
    }
}

//! # Data distribution
//!
//! Split a single dimension's grid points as evenly as possible across a
//! given number of processors.
#![allow(clippy::similar_names)]

/// Distribute grid points to processors along one axis.
pub struct Distribution;

impl Distribution {
    /// Distribute grid points across processors along 1-dimension
    ///
    /// # Arguments
    /// * `n_global`: Total number of grid points along the split dimension
    /// * `nprocs`: Number of processors in the split dimension
    ///
    /// # Return
    /// Vectors containing starting/ending index and size of each
    /// processor
    fn distribute(n_global: usize, nprocs: usize) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
        let size = n_global / nprocs;
        let mut st = vec![0; nprocs];
        let mut en = vec![0; nprocs];
        let mut sz = vec![0; nprocs];
        // Try to distribute N points
        st[0] = 0;
        sz[0] = size;
        en[0] = size - 1;
        // Distribute the rest if necessary
        let nu = n_global - size * nprocs;
        // Define how many processors held exactly N points, the rest holds N+1
        let nl = nprocs - nu;
        // Distribute N points on the first processors
        for i in 1..nl {
            st[i] = st[i - 1] + size;
            sz[i] = size;
            en[i] = en[i - 1] + size;
        }
        // Distribute  N+1 points on the last processors
        let size = size + 1;
        for i in nl..nprocs {
            st[i] = en[i - 1] + 1;
            sz[i] = size;
            en[i] = en[i - 1] + size;
        }
        // Very last processor
        en[nprocs - 1] = n_global - 1;
        sz[nprocs - 1] = en[nprocs - 1] - st[nprocs - 1] + 1;
        (st, en, sz)
    }

    /// Inclusive `(start, end)` of every processor's share, without
    /// pinning to one particular rank. Used by the planner to build pencil
    /// partitions over a 2D processor grid one axis at a time.
    #[must_use]
    pub fn segments(n_global: usize, nprocs: usize) -> Vec<(usize, usize)> {
        let (st, en, _) = Self::distribute(n_global, nprocs);
        st.into_iter().zip(en).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_covers_all_points_without_overlap() {
        let n = 17;
        let nprocs = 5;
        let mut total = 0;
        let mut prev_end: Option<usize> = None;
        for (st, en) in Distribution::segments(n, nprocs) {
            assert!(en >= st);
            if let Some(p) = prev_end {
                assert_eq!(st, p + 1);
            }
            total += en - st + 1;
            prev_end = Some(en);
        }
        assert_eq!(total, n);
        assert_eq!(prev_end, Some(n - 1));
    }

    #[test]
    fn single_processor_gets_the_whole_range() {
        assert_eq!(Distribution::segments(9, 1), vec![(0, 8)]);
    }
}

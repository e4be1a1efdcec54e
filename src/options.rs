//! Plan construction options (spec §6).

/// Options recognized at plan construction. Defaults match spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Stamp pencil layouts with the FFT axis fastest in memory, so each
    /// 1D FFT sees contiguous data. Default on. `Plan::new` rejects
    /// `false` with `Error::UnsupportedOption`: the batched 1D executor
    /// (`executor.rs`) assumes contiguous per-lane data and has no
    /// stride/distance parameter to read strided lanes instead, so turning
    /// this off cannot be honored correctly by this build's executors.
    pub reorder_axes: bool,
    /// Choose pencil-pipelined (per-axis) redistribution over a single
    /// all-to-all. Default on. Takes priority over `use_pairwise` when
    /// both would otherwise apply.
    pub use_pencils: bool,
    /// When `use_pencils` is off, exchange tiles with one non-blocking
    /// send/receive pair per peer instead of a single `all_to_all_varcount`
    /// collective (spec §4.3's third transport strategy). Default off.
    pub use_pairwise: bool,
    /// Pass device pointers directly to the transport instead of staging
    /// through host memory. Default on (when the backend supports it).
    pub use_gpu_aware: bool,
    /// Restrict a stage's communication to the minimal subgroup of peers
    /// with non-empty tiles. Default off.
    pub use_subcomm: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reorder_axes: true,
            use_pencils: true,
            use_pairwise: false,
            use_gpu_aware: true,
            use_subcomm: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let o = Options::default();
        assert!(o.reorder_axes);
        assert!(o.use_pencils);
        assert!(!o.use_pairwise);
        assert!(o.use_gpu_aware);
        assert!(!o.use_subcomm);
    }
}

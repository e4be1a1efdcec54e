//! Error taxonomy for plan construction and transform execution.

/// Errors that can surface from plan construction or a forward/backward call.
///
/// `InvalidPartition` and the size checks are expected to be raised
/// identically on every rank, since the inputs that drive them are
/// collective by contract (spec: inputs are consistent across ranks); this
/// type does not itself attempt to reconcile a divergent verdict.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Per-rank boxes of a partition do not tile the stated global box:
    /// either their union is missing lattice points or two boxes overlap.
    #[error("partition does not tile the global box: {reason}")]
    InvalidPartition {
        /// Human-readable detail (e.g. which ranks overlap, or what is missing).
        reason: String,
    },

    /// The requested R2C axis is outside `{0, 1, 2}`.
    #[error("r2c axis {axis} is not one of 0, 1, 2")]
    InvalidR2CAxis {
        /// The rejected axis value.
        axis: i64,
    },

    /// The requested 1D FFT backend was not compiled into this build.
    #[error("backend {backend:?} is not available in this build")]
    UnsupportedBackend {
        /// The backend tag that was requested.
        backend: crate::executor::Backend,
    },

    /// The call-site element type (precision/complexity) does not match
    /// what the plan was constructed for.
    #[error("precision/complexity mismatch: plan expects {expected}, call site provided {actual}")]
    PrecisionMismatch {
        /// What the plan was built for.
        expected: &'static str,
        /// What the caller passed.
        actual: &'static str,
    },

    /// A caller-provided buffer (input, output, or workspace) is smaller
    /// than the size the plan advertises via its `size_*` queries.
    #[error("buffer {which} too small: need {needed} elements, got {got}")]
    SizeMismatch {
        /// Which buffer failed the check (`"input"`, `"output"`, or `"workspace"`).
        which: &'static str,
        /// Required element count.
        needed: usize,
        /// Provided element count.
        got: usize,
    },

    /// The MPI transport reported a failure during a reshape's exchange
    /// phase. The plan remains usable for subsequent calls.
    #[error("communication failure during {stage}: {detail}")]
    CommFailure {
        /// Which reshape stage failed (e.g. `"R1: L1 -> L2"`).
        stage: String,
        /// Transport-provided detail, if any.
        detail: String,
    },

    /// The underlying 1D FFT engine reported failure (e.g. a real-FFT
    /// backend rejecting a buffer length it cannot factor).
    #[error("1D FFT executor failed on axis {axis}: {detail}")]
    ExecutorFailure {
        /// Which FFT axis the failing executor was driving.
        axis: usize,
        /// Backend-provided detail.
        detail: String,
    },

    /// An `Options` field named a configuration this build cannot execute
    /// correctly, so construction is refused outright rather than risking
    /// silently wrong output. Supplemental beyond spec §7's seven variants,
    /// the same way `use_pairwise` supplements spec §6's named options.
    #[error("unsupported option {option}: {reason}")]
    UnsupportedOption {
        /// Name of the `Options` field that was rejected.
        option: &'static str,
        /// Why this build cannot honor it.
        reason: String,
    },
}

/// Convenience alias used throughout the crate's fallible entry points.
pub type Result<T> = std::result::Result<T, Error>;

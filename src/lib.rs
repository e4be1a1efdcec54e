//! # `distfft3d`: distributed three-dimensional FFTs over MPI sub-brick decompositions
//!
//! Given an input box decomposed across MPI ranks, a target output box
//! decomposition and (optionally) which axis should run a real-to-complex
//! transform, [`plan::Plan`] builds and executes the sequence of local 1D
//! FFTs and inter-rank reshapes that realize the global 3D transform.
//!
//! No axis is assumed to be shared across ranks at any stage except via
//! the redistribution the plan itself performs. See `SPEC_FULL.md` for the
//! full geometry and invariants this crate follows.
#![warn(clippy::pedantic)]
#![allow(clippy::similar_names, clippy::module_name_repetitions)]

pub mod box3;
pub mod distribution;
pub mod error;
pub mod executor;
pub mod options;
pub mod partition;
pub mod pipeline;
pub mod plan;
pub mod planner;
pub mod reshape;
pub mod scale;
pub mod wire;

pub use box3::{gather, AxisOrder, Box3};
pub use error::{Error, Result};
pub use executor::Backend;
pub use options::Options;
pub use partition::Partition;
pub use plan::Plan;
pub use scale::Scaling;

/// A single-process world communicator shared by every module's unit
/// tests. `mpi::initialize` may only be called once per process, and
/// `cargo test` links every module's `#[cfg(test)]` code into one binary,
/// so every test needing a communicator must go through this one
/// `OnceLock` rather than initializing its own.
#[cfg(test)]
pub(crate) fn test_world() -> mpi::topology::SimpleCommunicator {
    static UNIVERSE: std::sync::OnceLock<mpi::environment::Universe> = std::sync::OnceLock::new();
    let universe = UNIVERSE.get_or_init(|| mpi::initialize().expect("mpi initialize"));
    universe.world()
}

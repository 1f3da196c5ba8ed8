//! # modelkit
//!
//! The kernel of a particle-based structural modeling system: typed attribute
//! storage, a deterministic score-state/restraint evaluation graph, and an
//! amortized neighbor-list subsystem.
//!
//! ## Architectural Philosophy
//!
//! - **[`core`]: The Foundation.** Interned attribute keys, key-indexed tables,
//!   model-wide value columns, particles and the derivative accumulator.
//!
//! - **[`engine`]: The Evaluation Graph.** The [`engine::model::Model`] that owns
//!   particles, score states and restraints, and runs one evaluation step at a
//!   time on behalf of an optimizer.
//!
//! - **[`spatial`]: Neighbor Search.** Voxel grids, change tracking, bonded
//!   exclusion and the cached nonbonded pair list that restraints iterate.

pub mod core;
pub mod engine;
pub mod spatial;

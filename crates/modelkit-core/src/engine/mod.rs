//! # Engine Module
//!
//! The evaluation graph of a model.
//!
//! ## Overview
//!
//! A [`model::Model`] owns its particles, score states and restraints. One call
//! to [`model::Model::evaluate`] zeroes derivatives (when requested), runs every
//! [`traits::ScoreState`] in registration order, then sums every active
//! [`traits::Restraint`] in registration order, then gives every score state an
//! after-evaluate hook, newest first. The evaluation is atomic from the
//! caller's point of view: any error aborts it.
//!
//! - **Capability traits** ([`traits`]) - `ScoreState`, `Restraint`, `BondedList`
//! - **Scoring window** ([`context`]) - What a restraint can read and write while scoring
//! - **Weighted groups** ([`restraint_set`]) - Nested restraint sets
//! - **Configuration** ([`config`]) - Nonbonded-list and grid parameters

pub(crate) mod arena;
pub mod config;
pub mod context;
pub mod model;
pub mod restraint_set;
pub mod traits;

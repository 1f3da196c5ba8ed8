//! # Spatial Module
//!
//! Neighbor search over particle positions.
//!
//! ## Overview
//!
//! Restraints that act on nearby particles (excluded volume, contacts, ...)
//! need the set of pairs within some distance, evaluated many times while the
//! particles barely move. [`nonbonded::NonbondedList`] answers that query
//! through a cached candidate list which is only rebuilt when the motion
//! recorded by its [`tracker::MaxChangeTracker`]s exceeds a slack distance.
//!
//! ## Key Components
//!
//! - **Coordinates** ([`coordinates`]) - Conventional position and radius keys
//! - **Spatial Grid** ([`grid`]) - Uniform voxel grid used to build candidate lists
//! - **Change Tracking** ([`tracker`]) - Running maximum of attribute drift since a snapshot
//! - **Bonded Lists** ([`bonded`]) - Pair exclusion by explicit bonds or shared group ids
//! - **Nonbonded Lists** ([`nonbonded`]) - The cached pair list, as a score state

pub mod bonded;
pub mod coordinates;
pub mod grid;
pub mod nonbonded;
pub mod tracker;

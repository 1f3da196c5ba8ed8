//! # Core Module
//!
//! The attribute storage engine shared by every particle of a model.
//!
//! ## Overview
//!
//! Attribute names are interned once by a [`keys::KeyRegistry`] into dense,
//! per-kind indices. A [`particle::Particle`] maps the keys it carries to handles
//! into the model-wide [`data::ModelData`], which stores the values (and, for
//! floats, the derivative accumulator and optimizability flag) in flat columns.
//! After a name has been interned, every attribute access is two array lookups.
//!
//! ## Key Components
//!
//! - [`keys`] - Attribute kinds, typed keys and the name registry
//! - [`attributes`] - Dense key-indexed tables with explicit absence
//! - [`data`] - Model-wide value columns addressed by opaque handles
//! - [`particle`] - Particles and borrowed particle views
//! - [`store`] - The particle arena of a model
//! - [`derivatives`] - Weight-scaling derivative accumulator
//! - [`error`] - The error type shared by the whole kernel

pub mod attributes;
pub mod data;
pub mod derivatives;
pub mod error;
pub mod ids;
pub mod keys;
pub mod particle;
pub mod store;

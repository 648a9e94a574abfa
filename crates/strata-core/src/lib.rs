//! Strata Core - Foundational types for the Strata terrain crates
//!
//! This crate provides the types the terrain crates share:
//! - `Aabb` - Axis-aligned bounding boxes
//! - `Frustum`, `ViewFrustum` - Box visibility predicates
//! - Error types and Result alias
//!
//! `glam` is re-exported so downstream crates agree on one math version.

mod bounds;
mod error;
mod frustum;

pub use bounds::Aabb;
pub use error::{Result, StrataError};
pub use frustum::{Frustum, NoCulling, ViewFrustum};

pub use glam;

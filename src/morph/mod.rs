//! Geometry that morphs between projections and toward an extruded state.

pub mod cone;
pub mod country;
mod geometry;

pub use cone::{ConeLimits, Direction};
pub use country::{Boundary, Polygon};
pub use geometry::{MorphTargets, MorphVertex, MorphableGeometry, TargetKey};

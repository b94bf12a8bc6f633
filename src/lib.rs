//! Country and transport-cone meshes that morph between map projections.
//!
//! Positions live on a spherical earth ([`map::Cartographic`]) and are turned
//! into render space by named projections. Meshes keep every projection's
//! vertices side by side so a board can blend from one to the next, and
//! extrude outward on request.

pub mod board;
pub mod config;
pub mod criteria;
pub mod data;
pub mod error;
pub mod map;
pub mod morph;
pub mod scene;
pub mod tween;

pub use board::{Board, BoardMesh, ConeBoard, CountryBoard};
pub use config::Configuration;
pub use criteria::{Criteria, PropertyValue, Properties};
pub use error::{Error, Result};

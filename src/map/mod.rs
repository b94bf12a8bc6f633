mod cartographic;
pub mod projection;
mod referential;

pub use cartographic::Cartographic;
pub use projection::{ProjectionParams, ProjectionRegistry, Projector};
pub use referential::NedLocal;

use std::io;

/// Errors raised by the morphing core.
///
/// Requests that are merely redundant (re-targeting the current projection,
/// a second transition while one is running) are not errors; boards log and
/// drop them. Everything here is either a bad name, a bad value or a broken
/// construction invariant.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no projection registered under the name {0:?}")]
    UnknownProjection(String),
    #[error("a projection named {0:?} is already registered")]
    DuplicateProjection(String),
    #[error("morph target {target:?} has {found} vertices, base geometry has {expected}")]
    VertexCountMismatch {
        target: String,
        expected: usize,
        found: usize,
    },
    #[error("extrusion {0} is outside [-100, 100]")]
    ExtrusionOutOfRange(f64),
    #[error("projection stage {0} is outside [0, 100]")]
    StageOutOfRange(f64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("triangulation failed: {0}")]
    Triangulation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] simd_json::Error),
    #[error(transparent)]
    GeoJson(#[from] geojson::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::board::{Board, BoardMesh, MeshState};
use crate::config::Configuration;
use crate::criteria::Properties;
use crate::error::Result;
use crate::map::{Cartographic, ProjectionRegistry};
use crate::morph::country::tessellate;
use crate::morph::{Boundary, MorphableGeometry, Polygon};
use crate::scene::{MeshId, RenderKind, Scene};

pub type CountryBoard = Board<CountryMesh>;

/// One country as loaded: its properties and its polygons.
#[derive(Debug, Clone, Default)]
pub struct CountrySource {
    pub properties: Properties,
    pub polygons: Vec<Polygon>,
}

/// An extruded slab for one polygon of a country.
#[derive(Debug, Clone)]
pub struct CountryMesh {
    state: MeshState,
    geometry: MorphableGeometry,
    boundary: Boundary,
}

impl CountryMesh {
    pub fn new(
        registry: &ProjectionRegistry,
        config: &Configuration,
        projection: &str,
        properties: Properties,
        polygon: &Polygon,
    ) -> Result<Self> {
        let shape = tessellate(polygon, config)?;
        let geometry = MorphableGeometry::build(registry, projection, &shape.vertices, shape.indices)?;
        Ok(Self {
            state: MeshState::new(properties),
            geometry,
            boundary: shape.boundary,
        })
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }
}

impl BoardMesh for CountryMesh {
    const KIND: RenderKind = RenderKind::Country;
    type Extra = ();

    fn state(&self) -> &MeshState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut MeshState {
        &mut self.state
    }

    fn geometry(&self) -> &MorphableGeometry {
        &self.geometry
    }

    fn geometries_mut(&mut self) -> impl Iterator<Item = &mut MorphableGeometry> {
        std::iter::once(&mut self.geometry)
    }

    fn covers(&self, point: &Cartographic, _config: &Configuration) -> bool {
        self.boundary.contains(point)
    }
}

impl Board<CountryMesh> {
    /// Append one mesh per polygon. Polygons that cannot be triangulated
    /// are skipped with a warning.
    pub fn add(&mut self, sources: &[CountrySource], scene: &mut dyn Scene) -> Vec<MeshId> {
        let registry = Arc::clone(&self.registry);
        let config = Arc::clone(&self.config);
        let mut added = Vec::new();
        for source in sources {
            for polygon in &source.polygons {
                match CountryMesh::new(&registry, &config, &self.projection, source.properties.clone(), polygon) {
                    Ok(mesh) => added.push(self.insert(mesh, scene)),
                    Err(error) => warn!(%error, "skipping country polygon"),
                }
            }
        }
        debug!(added = added.len(), total = self.meshes.len(), "countries added");
        added
    }

    /// Outlines of every country, for cone limits.
    pub fn boundaries(&self) -> Vec<&Boundary> {
        self.meshes.iter().map(CountryMesh::boundary).collect()
    }
}

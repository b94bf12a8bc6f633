use glam::DVec3;
use std::f64::consts::PI;
use std::fmt;

use crate::error::{Error, Result};
use crate::map::cartographic::Cartographic;

/// Name of the spherical globe projection.
pub const NONE: &str = "none";
pub const EQUIRECTANGULAR: &str = "Equirectangular";
pub const MERCATOR: &str = "Mercator";

/// Parameters shared by every projector of a registry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionParams {
    /// Globe radius in render units
    pub three_earth_radius: f64,
    pub earth_radius_meters: f64,
    /// Origin of the equirectangular plane
    pub reference: Cartographic,
    /// Central meridian of the Mercator plane, radians
    pub lambda0: f64,
    /// Mercator latitude clamp, radians
    pub mercator_max_latitude: f64,
}

impl ProjectionParams {
    /// Render units per meter of height
    #[inline]
    fn height_scale(&self) -> f64 {
        self.three_earth_radius / self.earth_radius_meters
    }
}

/// A deterministic mapping from geographic coordinates to render space.
pub trait Projector: Send + Sync {
    fn project(&self, position: &Cartographic, params: &ProjectionParams) -> DVec3;

    /// Inverse of [`Projector::project`], used to turn picked points back
    /// into geographic coordinates.
    fn unproject(&self, point: DVec3, params: &ProjectionParams) -> Cartographic;
}

/// Direct sphere projection, radius grows with height above the surface.
pub struct Globe;

impl Projector for Globe {
    fn project(&self, position: &Cartographic, params: &ProjectionParams) -> DVec3 {
        let radius = (params.earth_radius_meters + position.height()) * params.height_scale();
        let (sin_lat, cos_lat) = position.latitude().sin_cos();
        let (sin_lon, cos_lon) = position.longitude().sin_cos();
        DVec3::new(
            -cos_lon * radius * cos_lat,
            sin_lat * radius,
            sin_lon * radius * cos_lat,
        )
    }

    fn unproject(&self, point: DVec3, params: &ProjectionParams) -> Cartographic {
        let radius = point.length();
        if radius == 0.0 {
            return Cartographic::from_radians(0.0, 0.0, -params.earth_radius_meters);
        }
        let latitude = (point.y / radius).clamp(-1.0, 1.0).asin();
        let longitude = point.z.atan2(-point.x);
        let height = radius / params.height_scale() - params.earth_radius_meters;
        Cartographic::from_radians(longitude, latitude, height)
    }
}

/// Plate carrée centred on the configured reference point.
pub struct Equirectangular;

impl Projector for Equirectangular {
    fn project(&self, position: &Cartographic, params: &ProjectionParams) -> DVec3 {
        let reference = &params.reference;
        let scale = params.three_earth_radius;
        DVec3::new(
            (position.longitude() - reference.longitude()) * reference.latitude().cos() * scale,
            (position.latitude() - reference.latitude()) * scale,
            (position.height() - reference.height()) * params.height_scale(),
        )
    }

    fn unproject(&self, point: DVec3, params: &ProjectionParams) -> Cartographic {
        let reference = &params.reference;
        let scale = params.three_earth_radius;
        let cos_ref = reference.latitude().cos().max(f64::EPSILON);
        Cartographic::from_radians(
            point.x / (cos_ref * scale) + reference.longitude(),
            point.y / scale + reference.latitude(),
            point.z / params.height_scale() + reference.height(),
        )
    }
}

/// Mercator with latitudes clamped so the poles stay finite.
pub struct Mercator;

impl Projector for Mercator {
    fn project(&self, position: &Cartographic, params: &ProjectionParams) -> DVec3 {
        let scale = params.three_earth_radius;
        let max = params.mercator_max_latitude;
        let latitude = position.latitude().clamp(-max, max);
        DVec3::new(
            (position.longitude() - params.lambda0) * scale,
            (PI / 4.0 + latitude / 2.0).tan().ln() * scale,
            position.height() * params.height_scale(),
        )
    }

    fn unproject(&self, point: DVec3, params: &ProjectionParams) -> Cartographic {
        let scale = params.three_earth_radius;
        Cartographic::from_radians(
            point.x / scale + params.lambda0,
            2.0 * ((point.y / scale).exp().atan() - PI / 4.0),
            point.z / params.height_scale(),
        )
    }
}

/// Named projectors in registration order.
///
/// Built once at startup and shared read-only (usually behind an `Arc`).
/// Its names are the only projection names accepted anywhere else.
pub struct ProjectionRegistry {
    params: ProjectionParams,
    entries: Vec<(String, Box<dyn Projector>)>,
}

impl fmt::Debug for ProjectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectionRegistry")
            .field("params", &self.params)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ProjectionRegistry {
    /// Registry holding the three built-in projections.
    pub fn new(params: ProjectionParams) -> Self {
        Self {
            params,
            entries: vec![
                (NONE.to_string(), Box::new(Globe) as Box<dyn Projector>),
                (EQUIRECTANGULAR.to_string(), Box::new(Equirectangular)),
                (MERCATOR.to_string(), Box::new(Mercator)),
            ],
        }
    }

    pub fn register(&mut self, name: &str, projector: Box<dyn Projector>) -> Result<()> {
        if self.contains(name) {
            return Err(Error::DuplicateProjection(name.to_string()));
        }
        self.entries.push((name.to_string(), projector));
        Ok(())
    }

    #[inline]
    pub fn params(&self) -> &ProjectionParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// Position of `name` in registration order
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(entry, _)| entry == name)
    }

    /// First registered name, the fallback for boards created with a bad name
    pub fn first(&self) -> &str {
        self.entries.first().map_or(NONE, |(name, _)| name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Projector)> {
        self.entries
            .iter()
            .map(|(name, projector)| (name.as_str(), projector.as_ref()))
    }

    pub fn get(&self, name: &str) -> Result<&dyn Projector> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, projector)| projector.as_ref())
            .ok_or_else(|| Error::UnknownProjection(name.to_string()))
    }

    pub fn project(&self, name: &str, position: &Cartographic) -> Result<DVec3> {
        Ok(self.get(name)?.project(position, &self.params))
    }

    pub fn unproject(&self, name: &str, point: DVec3) -> Result<Cartographic> {
        Ok(self.get(name)?.unproject(point, &self.params))
    }
}

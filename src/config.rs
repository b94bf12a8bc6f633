use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::map::{Cartographic, ProjectionParams};

/// Reference point of the equirectangular projection, in degrees and meters.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReferencePoint {
    pub longitude: f64,
    pub latitude: f64,
    pub height: f64,
}

impl Default for ReferencePoint {
    fn default() -> Self {
        Self {
            longitude: 0.0,
            latitude: 0.0,
            height: 0.0,
        }
    }
}

/// Tunables shared by the projection registry, the geometry builders and the boards.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub earth_radius_meters: f64,
    /// Radius of the globe in render-space units
    pub three_earth_radius: f64,
    /// Country slab thickness as a fraction of the earth radius
    pub height_ratio: f64,
    /// Extrusion target offset as a fraction of the earth radius
    pub extruded_height_ratio: f64,
    /// Angular sampling step of cone rims, in [1, 360)
    pub cone_step_degrees: f64,
    /// Longest edge allowed in country tessellation
    pub mesh_step_degrees: f64,
    pub tween_ms: u64,
    /// Duration of the elastic extrusion "pop" after a projection change
    pub settle_ms: u64,
    pub reference_equirectangular: ReferencePoint,
    pub lambda0_mercator_degrees: f64,
    pub mercator_max_latitude_degrees: f64,
    /// Distance (radians) under which a cone counts as sitting on a searched point
    pub cone_search_epsilon: f64,
    pub default_extrusion: f64,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            earth_radius_meters: 6371e3,
            three_earth_radius: 100.0,
            height_ratio: 0.01,
            extruded_height_ratio: 0.6,
            cone_step_degrees: 15.0,
            mesh_step_degrees: 3.0,
            tween_ms: 1000,
            settle_ms: 1000,
            reference_equirectangular: ReferencePoint::default(),
            lambda0_mercator_degrees: 0.0,
            mercator_max_latitude_degrees: 85.051129,
            cone_search_epsilon: 1e-13,
            default_extrusion: 70.0,
        }
    }
}

impl Configuration {
    /// Load a JSON configuration file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let mut bytes = fs::read(path)?;
        let config: Configuration = simd_json::serde::from_slice(&mut bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.earth_radius_meters > 0.0) {
            return Err(Error::InvalidConfig("earth_radius_meters must be positive".into()));
        }
        if !(self.three_earth_radius > 0.0) {
            return Err(Error::InvalidConfig("three_earth_radius must be positive".into()));
        }
        if !(1.0..360.0).contains(&self.cone_step_degrees) {
            return Err(Error::InvalidConfig(format!(
                "cone_step_degrees {} must lie in [1, 360)",
                self.cone_step_degrees
            )));
        }
        if !(self.mesh_step_degrees > 0.0) {
            return Err(Error::InvalidConfig("mesh_step_degrees must be positive".into()));
        }
        if !(0.0..90.0).contains(&self.mercator_max_latitude_degrees) {
            return Err(Error::InvalidConfig(
                "mercator_max_latitude_degrees must lie in [0, 90)".into(),
            ));
        }
        if !(-100.0..=100.0).contains(&self.default_extrusion) {
            return Err(Error::ExtrusionOutOfRange(self.default_extrusion));
        }
        Ok(())
    }

    #[inline]
    pub fn hat_height(&self) -> f64 {
        self.earth_radius_meters * self.height_ratio
    }

    #[inline]
    pub fn extruded_height(&self) -> f64 {
        self.earth_radius_meters * self.extruded_height_ratio
    }

    #[inline]
    pub fn cone_step(&self) -> f64 {
        self.cone_step_degrees.to_radians()
    }

    pub fn tween_timing(&self) -> Duration {
        Duration::from_millis(self.tween_ms)
    }

    pub fn settle_timing(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn projection_params(&self) -> ProjectionParams {
        let reference = self.reference_equirectangular;
        ProjectionParams {
            three_earth_radius: self.three_earth_radius,
            earth_radius_meters: self.earth_radius_meters,
            reference: Cartographic::from_degrees(
                reference.longitude,
                reference.latitude,
                reference.height,
            ),
            lambda0: self.lambda0_mercator_degrees.to_radians(),
            mercator_max_latitude: self.mercator_max_latitude_degrees.to_radians(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hat_height(), 63710.0);
        assert_eq!(config.tween_timing(), Duration::from_millis(1000));
    }

    #[test]
    fn test_cone_step_bounds() {
        let mut config = Configuration::default();
        config.cone_step_degrees = 0.5;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.cone_step_degrees = 360.0;
        assert!(config.validate().is_err());
        config.cone_step_degrees = 5.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut json = br#"{"tween_ms": 250, "reference_equirectangular": {"latitude": 45.0}}"#.to_vec();
        let config: Configuration = simd_json::serde::from_slice(&mut json).unwrap();
        assert_eq!(config.tween_ms, 250);
        assert_eq!(config.reference_equirectangular.latitude, 45.0);
        assert_eq!(config.reference_equirectangular.longitude, 0.0);
        assert_eq!(config.three_earth_radius, 100.0);
        assert_eq!(config.cone_search_epsilon, 1e-13);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Configuration::load(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(config, Configuration::default());
    }
}

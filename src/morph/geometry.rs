use glam::DVec3;
use rayon::prelude::*;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::map::{Cartographic, ProjectionRegistry};

/// One mesh vertex described geographically: where it sits at rest and
/// where the extrusion target moves it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphVertex {
    pub rest: Cartographic,
    pub extruded: Cartographic,
}

impl MorphVertex {
    pub fn fixed(position: Cartographic) -> Self {
        Self {
            rest: position,
            extruded: position,
        }
    }
}

/// Selects one morph target buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKey<'a> {
    /// Rest vertices under the named projection
    Projection(&'a str),
    /// Extruded vertices under the current projection
    Extrusion,
}

/// Vertex buffers for every projection, shared between a geometry and its
/// highlight clones.
#[derive(Debug)]
pub struct MorphTargets {
    names: Vec<String>,
    flat: Vec<Vec<DVec3>>,
    extruded: Vec<Vec<DVec3>>,
}

impl MorphTargets {
    /// Every buffer must hold as many vertices as the first one.
    pub fn new(names: Vec<String>, flat: Vec<Vec<DVec3>>, extruded: Vec<Vec<DVec3>>) -> Result<Self> {
        let expected = flat.first().map_or(0, Vec::len);
        for (i, name) in names.iter().enumerate() {
            let flat_len = flat.get(i).map_or(0, Vec::len);
            let extruded_len = extruded.get(i).map_or(0, Vec::len);
            for found in [flat_len, extruded_len] {
                if found != expected {
                    return Err(Error::VertexCountMismatch {
                        target: name.clone(),
                        expected,
                        found,
                    });
                }
            }
        }
        Ok(Self {
            names,
            flat,
            extruded,
        })
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|entry| entry == name)
    }

    pub fn vertex_count(&self) -> usize {
        self.flat.first().map_or(0, Vec::len)
    }
}

/// A triangle mesh whose vertices blend between projections and toward an
/// extruded state.
///
/// Topology never changes after construction. Only the current projection,
/// the pending projection and the two weights move. Blended positions are
/// `base + w_p·(flat[pending] − base) + w_e·(extruded[current] − base)` where
/// `base` is the rest buffer of the current projection.
#[derive(Debug, Clone)]
pub struct MorphableGeometry {
    targets: Arc<MorphTargets>,
    indices: Arc<[u32]>,
    current: usize,
    pending: Option<usize>,
    projection_weight: f64,
    extrusion_weight: f64,
    /// Last requested extrusion, in percent. Survives projection changes
    /// even while the applied weight is zeroed.
    extrusion: f64,
}

impl MorphableGeometry {
    /// Project every vertex under every registered projection.
    pub fn build(
        registry: &ProjectionRegistry,
        projection: &str,
        vertices: &[MorphVertex],
        indices: Vec<u32>,
    ) -> Result<Self> {
        if !registry.contains(projection) {
            return Err(Error::UnknownProjection(projection.to_string()));
        }
        let params = registry.params();
        let projectors: Vec<_> = registry.iter().collect();

        let (flat, extruded): (Vec<Vec<DVec3>>, Vec<Vec<DVec3>>) = projectors
            .par_iter()
            .map(|(_, projector)| {
                let flat: Vec<DVec3> =
                    vertices.iter().map(|v| projector.project(&v.rest, params)).collect();
                let extruded: Vec<DVec3> = vertices
                    .iter()
                    .map(|v| projector.project(&v.extruded, params))
                    .collect();
                (flat, extruded)
            })
            .unzip();

        let names = projectors.iter().map(|(name, _)| name.to_string()).collect();
        Self::from_targets(MorphTargets::new(names, flat, extruded)?, indices, projection)
    }

    pub fn from_targets(targets: MorphTargets, indices: Vec<u32>, projection: &str) -> Result<Self> {
        let current = targets
            .index_of(projection)
            .ok_or_else(|| Error::UnknownProjection(projection.to_string()))?;
        let count = targets.vertex_count();
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= count) {
            return Err(Error::Triangulation(format!(
                "index {bad} out of range for {count} vertices"
            )));
        }
        Ok(Self {
            targets: Arc::new(targets),
            indices: indices.into(),
            current,
            pending: None,
            projection_weight: 0.0,
            extrusion_weight: 0.0,
            extrusion: 0.0,
        })
    }

    /// Name of the projection the base buffer belongs to.
    pub fn projection(&self) -> &str {
        &self.targets.names[self.current]
    }

    pub fn pending_projection(&self) -> Option<&str> {
        self.pending.map(|i| self.targets.names[i].as_str())
    }

    /// Last requested extrusion, percent in [-100, 100].
    pub fn extruded(&self) -> f64 {
        self.extrusion
    }

    pub fn projection_weight(&self) -> f64 {
        self.projection_weight
    }

    pub fn extrusion_weight(&self) -> f64 {
        self.extrusion_weight
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.targets.vertex_count()
    }

    /// Rest vertices of the current projection.
    pub fn base(&self) -> &[DVec3] {
        &self.targets.flat[self.current]
    }

    pub fn target(&self, key: TargetKey<'_>) -> Option<&[DVec3]> {
        match key {
            TargetKey::Projection(name) => self
                .targets
                .index_of(name)
                .map(|i| self.targets.flat[i].as_slice()),
            TargetKey::Extrusion => Some(&self.targets.extruded[self.current]),
        }
    }

    /// Arm a transition toward `name`.
    ///
    /// `Ok(false)` when `name` is already current. Arming zeroes the applied
    /// weights so the transition starts from the bare base buffer.
    pub fn accept_projection(&mut self, name: &str) -> Result<bool> {
        let index = self
            .targets
            .index_of(name)
            .ok_or_else(|| Error::UnknownProjection(name.to_string()))?;
        if index == self.current {
            return Ok(false);
        }
        self.pending = Some(index);
        self.projection_weight = 0.0;
        self.extrusion_weight = 0.0;
        Ok(true)
    }

    /// Blend toward the pending projection. Reaching 100 commits it.
    pub fn set_projection_weight(&mut self, stage: f64) -> Result<()> {
        if !(0.0..=100.0).contains(&stage) {
            return Err(Error::StageOutOfRange(stage));
        }
        let Some(pending) = self.pending else {
            return Ok(());
        };
        if stage >= 100.0 {
            self.current = pending;
            self.pending = None;
            self.projection_weight = 0.0;
            self.extrusion_weight = 0.0;
        } else {
            self.projection_weight = stage / 100.0;
        }
        Ok(())
    }

    pub fn set_extrusion(&mut self, percent: f64) -> Result<()> {
        if !(-100.0..=100.0).contains(&percent) {
            return Err(Error::ExtrusionOutOfRange(percent));
        }
        self.extrusion = percent;
        self.extrusion_weight = percent / 100.0;
        Ok(())
    }

    /// Copy for a highlight overlay: target buffers are shared, weights are
    /// independent from here on.
    pub fn fuzzy_clone(&self) -> Self {
        self.clone()
    }

    /// Take over projection, pending transition and extrusion from a
    /// geometry this one replaces. Names missing here are skipped.
    pub fn carry_state_from(&mut self, previous: &MorphableGeometry) {
        if let Some(current) = self.targets.index_of(previous.projection()) {
            self.current = current;
        }
        self.pending = previous
            .pending_projection()
            .and_then(|name| self.targets.index_of(name))
            .filter(|&index| index != self.current);
        self.projection_weight = if self.pending.is_some() {
            previous.projection_weight
        } else {
            0.0
        };
        self.extrusion = previous.extrusion;
        self.extrusion_weight = previous.extrusion_weight;
    }

    /// Position of vertex `i` with the current weights applied.
    #[inline]
    pub fn vertex(&self, i: usize) -> DVec3 {
        let base = self.targets.flat[self.current][i];
        let mut out = base;
        if let Some(pending) = self.pending {
            if self.projection_weight != 0.0 {
                out += (self.targets.flat[pending][i] - base) * self.projection_weight;
            }
        }
        if self.extrusion_weight != 0.0 {
            out += (self.targets.extruded[self.current][i] - base) * self.extrusion_weight;
        }
        out
    }

    /// All blended vertices. Equals `base()` exactly while both weights are zero.
    pub fn vertices(&self) -> Vec<DVec3> {
        (0..self.vertex_count()).map(|i| self.vertex(i)).collect()
    }

    /// Blended triangles, in index order.
    pub fn triangles(&self) -> impl Iterator<Item = [DVec3; 3]> + '_ {
        self.indices.chunks_exact(3).map(move |tri| {
            [
                self.vertex(tri[0] as usize),
                self.vertex(tri[1] as usize),
                self.vertex(tri[2] as usize),
            ]
        })
    }

    /// Whether `other` shares this geometry's target buffers.
    pub fn shares_targets(&self, other: &MorphableGeometry) -> bool {
        Arc::ptr_eq(&self.targets, &other.targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::map::projection::{EQUIRECTANGULAR, MERCATOR, NONE};

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    fn registry() -> ProjectionRegistry {
        ProjectionRegistry::new(Configuration::default().projection_params())
    }

    fn triangle(registry: &ProjectionRegistry, projection: &str) -> MorphableGeometry {
        let vertices: Vec<MorphVertex> = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]
            .iter()
            .map(|&(lon, lat)| MorphVertex {
                rest: Cartographic::from_degrees(lon, lat, 0.0),
                extruded: Cartographic::from_degrees(lon, lat, 1_000_000.0),
            })
            .collect();
        MorphableGeometry::build(registry, projection, &vertices, vec![0, 1, 2]).unwrap()
    }

    #[test]
    fn test_build_unknown_projection_fails() {
        let registry = registry();
        let result = MorphableGeometry::build(&registry, "bogus", &[], vec![]);
        assert!(matches!(result, Err(Error::UnknownProjection(_))));
    }

    #[test]
    fn test_mismatched_targets_abort() {
        let names = vec![NONE.to_string(), MERCATOR.to_string()];
        let flat = vec![vec![DVec3::ZERO; 3], vec![DVec3::ZERO; 2]];
        let extruded = vec![vec![DVec3::ZERO; 3], vec![DVec3::ZERO; 3]];
        let result = MorphTargets::new(names, flat, extruded);
        assert!(matches!(
            result,
            Err(Error::VertexCountMismatch { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_out_of_range_index_rejected() {
        let targets = MorphTargets::new(
            vec![NONE.to_string()],
            vec![vec![DVec3::ZERO; 3]],
            vec![vec![DVec3::ZERO; 3]],
        )
        .unwrap();
        assert!(MorphableGeometry::from_targets(targets, vec![0, 1, 3], NONE).is_err());
    }

    #[test]
    fn test_base_matches_projector() {
        let registry = registry();
        let geometry = triangle(&registry, MERCATOR);
        let expected = registry
            .project(MERCATOR, &Cartographic::from_degrees(10.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(geometry.base()[1], expected);
        assert_eq!(geometry.vertices(), geometry.base());
    }

    #[test]
    fn test_accept_projection_contract() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        assert!(!geometry.accept_projection(NONE).unwrap());
        assert!(geometry.pending_projection().is_none());
        assert!(geometry.accept_projection(MERCATOR).unwrap());
        assert_eq!(geometry.pending_projection(), Some(MERCATOR));
        assert!(matches!(
            geometry.accept_projection("bogus"),
            Err(Error::UnknownProjection(_))
        ));
    }

    #[test]
    fn test_half_way_blend() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        geometry.accept_projection(EQUIRECTANGULAR).unwrap();
        geometry.set_projection_weight(50.0).unwrap();
        let from = geometry.base()[1];
        let to = geometry.target(TargetKey::Projection(EQUIRECTANGULAR)).unwrap()[1];
        let mid = geometry.vertex(1);
        assert_close(mid.x, (from.x + to.x) / 2.0, 1e-9);
        assert_close(mid.y, (from.y + to.y) / 2.0, 1e-9);
        assert_close(mid.z, (from.z + to.z) / 2.0, 1e-9);
    }

    #[test]
    fn test_commit_for_every_pair() {
        let registry = registry();
        let names: Vec<&str> = registry.names().collect();
        for from in &names {
            for to in &names {
                let mut geometry = triangle(&registry, from);
                geometry.set_extrusion(40.0).unwrap();
                let armed = geometry.accept_projection(to).unwrap();
                assert_eq!(armed, from != to);
                geometry.set_projection_weight(30.0).unwrap();
                geometry.set_projection_weight(100.0).unwrap();
                assert_eq!(geometry.projection(), *to);
                assert!(geometry.pending_projection().is_none());
                if armed {
                    assert_eq!(geometry.projection_weight(), 0.0);
                    assert_eq!(geometry.extrusion_weight(), 0.0);
                    assert_eq!(geometry.vertices(), geometry.base());
                }
                assert_eq!(geometry.extruded(), 40.0);
            }
        }
    }

    #[test]
    fn test_round_trip_restores_base_bit_for_bit() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        let original = geometry.base().to_vec();
        for name in [MERCATOR, NONE] {
            geometry.accept_projection(name).unwrap();
            for stage in [0.0, 25.0, 50.0, 75.0, 100.0] {
                geometry.set_projection_weight(stage).unwrap();
            }
        }
        assert_eq!(geometry.projection(), NONE);
        assert_eq!(geometry.vertices(), original);
    }

    #[test]
    fn test_weight_without_pending_is_noop() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        geometry.set_projection_weight(100.0).unwrap();
        assert_eq!(geometry.projection(), NONE);
        assert!(matches!(
            geometry.set_projection_weight(101.0),
            Err(Error::StageOutOfRange(_))
        ));
    }

    #[test]
    fn test_extrusion_out_of_range_keeps_state() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        geometry.set_extrusion(70.0).unwrap();
        assert!(matches!(
            geometry.set_extrusion(150.0),
            Err(Error::ExtrusionOutOfRange(v)) if v == 150.0
        ));
        assert_eq!(geometry.extruded(), 70.0);
        assert_close(geometry.extrusion_weight(), 0.7, 1e-12);
    }

    #[test]
    fn test_full_extrusion_reaches_target() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        geometry.set_extrusion(100.0).unwrap();
        let target = geometry.target(TargetKey::Extrusion).unwrap()[2];
        let v = geometry.vertex(2);
        assert_close(v.distance(target), 0.0, 1e-9);
        assert!(v.length() > geometry.base()[2].length());
    }

    #[test]
    fn test_fuzzy_clone_shares_targets_not_weights() {
        let registry = registry();
        let mut geometry = triangle(&registry, NONE);
        geometry.set_extrusion(20.0).unwrap();
        let mut clone = geometry.fuzzy_clone();
        assert!(clone.shares_targets(&geometry));
        assert_eq!(clone.extruded(), 20.0);
        clone.set_extrusion(-50.0).unwrap();
        assert_eq!(geometry.extruded(), 20.0);
    }

    #[test]
    fn test_carry_state_from_previous() {
        let registry = registry();
        let mut previous = triangle(&registry, NONE);
        previous.accept_projection(MERCATOR).unwrap();
        previous.set_projection_weight(100.0).unwrap();
        previous.set_extrusion(-30.0).unwrap();

        let mut rebuilt = triangle(&registry, NONE);
        rebuilt.carry_state_from(&previous);
        assert_eq!(rebuilt.projection(), MERCATOR);
        assert_eq!(rebuilt.extruded(), -30.0);
        assert!(!rebuilt.shares_targets(&previous));
    }
}

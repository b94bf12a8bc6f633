//! Seams toward the rendering side: a scene that holds renderables, and a
//! raycaster for mouse picking.

use glam::DVec3;
use std::collections::BTreeSet;

use crate::morph::MorphableGeometry;

/// Board-assigned identity of a mesh or overlay.
pub type MeshId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderKind {
    Country,
    Cone,
    Highlight,
}

/// What boards hand to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle {
    pub kind: RenderKind,
    pub id: MeshId,
}

/// Scene graph collaborator. Boards insert a handle when a mesh or overlay
/// is created and remove it when it goes away.
pub trait Scene {
    fn insert(&mut self, handle: RenderHandle);
    fn remove(&mut self, handle: RenderHandle);
}

/// Minimal scene that only remembers which handles are live.
#[derive(Debug, Default)]
pub struct SceneIndex {
    handles: BTreeSet<RenderHandle>,
}

impl SceneIndex {
    pub fn contains(&self, handle: &RenderHandle) -> bool {
        self.handles.contains(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn count(&self, kind: RenderKind) -> usize {
        self.handles.iter().filter(|h| h.kind == kind).count()
    }
}

impl Scene for SceneIndex {
    fn insert(&mut self, handle: RenderHandle) {
        self.handles.insert(handle);
    }

    fn remove(&mut self, handle: RenderHandle) {
        self.handles.remove(&handle);
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: DVec3,
    pub dir: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, dir: DVec3) -> Self {
        Self { origin, dir }
    }
}

/// One pickable mesh: its blended geometry and its uniform scale.
#[derive(Debug, Clone, Copy)]
pub struct Pickable<'a> {
    pub geometry: &'a MorphableGeometry,
    pub scale: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Hit {
    /// Position of the hit mesh in the candidate slice
    pub index: usize,
    pub distance: f64,
    pub point: DVec3,
}

pub trait Raycaster {
    /// Closest intersection among `candidates`, if any.
    fn intersect(&self, ray: &Ray, candidates: &[Pickable<'_>]) -> Option<Hit>;
}

/// Brute-force two-sided Möller–Trumbore over every blended triangle.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleRaycaster;

impl Raycaster for TriangleRaycaster {
    fn intersect(&self, ray: &Ray, candidates: &[Pickable<'_>]) -> Option<Hit> {
        let dir = ray.dir.try_normalize()?;
        let mut best: Option<Hit> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            for [a, b, c] in candidate.geometry.triangles() {
                let (a, b, c) = (a * candidate.scale, b * candidate.scale, c * candidate.scale);
                let Some(distance) = intersect_triangle(ray.origin, dir, a, b, c) else {
                    continue;
                };
                // Ties keep the earlier candidate.
                if best.map_or(true, |hit| distance < hit.distance) {
                    best = Some(Hit {
                        index,
                        distance,
                        point: ray.origin + dir * distance,
                    });
                }
            }
        }
        best
    }
}

fn intersect_triangle(origin: DVec3, dir: DVec3, a: DVec3, b: DVec3, c: DVec3) -> Option<f64> {
    const EPSILON: f64 = 1e-12;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let t_vec = origin - a;
    let u = t_vec.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = t_vec.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

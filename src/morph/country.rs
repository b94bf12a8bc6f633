use earcutr::earcut;
use std::collections::HashMap;

use crate::config::Configuration;
use crate::error::{Error, Result};
use crate::map::Cartographic;
use crate::morph::geometry::MorphVertex;

/// Refinement stops after this many passes even if long edges remain.
const MAX_REFINEMENT_ROUNDS: usize = 16;
/// Points closer than this (degrees, Manhattan) are merged.
const DUPLICATE_TOLERANCE: f64 = 1e-5;
const COLLINEAR_TOLERANCE: f64 = 1e-5;

/// A polygon in degrees, `[longitude, latitude]` pairs: exterior ring then holes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub exterior: Vec<[f64; 2]>,
    pub holes: Vec<Vec<[f64; 2]>>,
}

/// Outline of one country polygon kept for point queries and cone limits.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    exterior: Vec<Cartographic>,
    holes: Vec<Vec<Cartographic>>,
    min_longitude: f64,
    max_longitude: f64,
    min_latitude: f64,
    max_latitude: f64,
}

impl Boundary {
    pub fn new(polygon: &Polygon) -> Self {
        let to_ring = |ring: &[[f64; 2]]| -> Vec<Cartographic> {
            ring.iter().map(|&[lon, lat]| surface(lon, lat, 0.0)).collect()
        };
        let exterior = to_ring(&polygon.exterior);
        let holes = polygon.holes.iter().map(|hole| to_ring(hole)).collect();

        let mut boundary = Self {
            exterior,
            holes,
            min_longitude: f64::INFINITY,
            max_longitude: f64::NEG_INFINITY,
            min_latitude: f64::INFINITY,
            max_latitude: f64::NEG_INFINITY,
        };
        for position in &boundary.exterior {
            boundary.min_longitude = boundary.min_longitude.min(position.longitude());
            boundary.max_longitude = boundary.max_longitude.max(position.longitude());
            boundary.min_latitude = boundary.min_latitude.min(position.latitude());
            boundary.max_latitude = boundary.max_latitude.max(position.latitude());
        }
        boundary
    }

    pub fn exterior(&self) -> &[Cartographic] {
        &self.exterior
    }

    /// Every outline point, holes included.
    pub fn points(&self) -> impl Iterator<Item = &Cartographic> {
        self.exterior.iter().chain(self.holes.iter().flatten())
    }

    /// Bounding-box test only.
    pub fn bounds_contain(&self, position: &Cartographic) -> bool {
        let (lon, lat) = (position.longitude(), position.latitude());
        (self.min_longitude..=self.max_longitude).contains(&lon)
            && (self.min_latitude..=self.max_latitude).contains(&lat)
    }

    pub fn contains(&self, position: &Cartographic) -> bool {
        if !self.bounds_contain(position) {
            return false;
        }
        position.is_inside(&self.exterior) && !self.holes.iter().any(|hole| position.is_inside(hole))
    }
}

/// Triangulated slab for one polygon, ready for the morph builder.
#[derive(Debug, Clone)]
pub struct CountryShape {
    pub boundary: Boundary,
    pub vertices: Vec<MorphVertex>,
    pub indices: Vec<u32>,
}

/// Clean, triangulate and extrude one polygon.
///
/// The first half of the vertices is the bottom surface at height 0, the
/// second half the top surface at the hat height. The extrusion target lifts
/// only the top surface.
pub fn tessellate(polygon: &Polygon, config: &Configuration) -> Result<CountryShape> {
    let step = config.mesh_step_degrees;
    let exterior = clean_ring(&polygon.exterior, step);
    if exterior.len() < 3 {
        return Err(Error::Triangulation(format!(
            "exterior ring has {} usable points",
            exterior.len()
        )));
    }
    let mut rings = vec![exterior];
    rings.extend(
        polygon
            .holes
            .iter()
            .map(|hole| clean_ring(hole, step))
            .filter(|hole| hole.len() >= 3),
    );

    let mut points: Vec<[f64; 2]> = Vec::new();
    let mut ring_starts = Vec::with_capacity(rings.len());
    for ring in &rings {
        ring_starts.push(points.len());
        points.extend_from_slice(ring);
    }
    let coords: Vec<f64> = points.iter().flat_map(|p| [p[0], p[1]]).collect();
    let triangles = earcut(&coords, &ring_starts[1..], 2)
        .map_err(|e| Error::Triangulation(format!("{e:?}")))?;
    if triangles.is_empty() {
        return Err(Error::Triangulation("no triangles produced".into()));
    }
    let triangles: Vec<[usize; 3]> = triangles
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();
    let triangles = refine(&mut points, triangles, step);

    let n = points.len();
    let hat = config.hat_height();
    let lifted = hat + config.extruded_height();
    let mut vertices = Vec::with_capacity(2 * n);
    vertices.extend(points.iter().map(|&[lon, lat]| MorphVertex::fixed(surface(lon, lat, 0.0))));
    vertices.extend(points.iter().map(|&[lon, lat]| MorphVertex {
        rest: surface(lon, lat, hat),
        extruded: surface(lon, lat, lifted),
    }));

    let mut indices: Vec<u32> = Vec::with_capacity(6 * triangles.len() + 6 * n);
    for &[a, b, c] in &triangles {
        indices.extend([a, b, c].map(|i| i as u32));
        indices.extend([n + b, n + a, n + c].map(|i| i as u32));
    }
    for (r, ring) in rings.iter().enumerate() {
        let start = ring_starts[r];
        let len = ring.len();
        for i in 0..len {
            let ia = start + i;
            let ib = start + (i + 1) % len;
            let quad = if r == 0 {
                [ia, ib, n + ia, ib, n + ib, n + ia]
            } else {
                [ib, ia, n + ia, ib, n + ia, n + ib]
            };
            indices.extend(quad.map(|i| i as u32));
        }
    }

    Ok(CountryShape {
        boundary: Boundary::new(polygon),
        vertices,
        indices,
    })
}

/// Keeps vertices on the antimeridian from flipping to the other side of
/// planar projections.
fn surface(lon: f64, lat: f64, height: f64) -> Cartographic {
    let lon = if lon <= -180.0 { -180.0 + 1e-9 } else { lon };
    Cartographic::from_degrees(lon, lat, height)
}

fn clean_ring(ring: &[[f64; 2]], step: f64) -> Vec<[f64; 2]> {
    let mut ring = ring.to_vec();
    if ring.len() >= 2 && near(ring[0], ring[ring.len() - 1]) {
        ring.pop();
    }

    let mut done = false;
    while !done && ring.len() >= 3 {
        done = true;
        let mut i = 0;
        while i < ring.len() && ring.len() >= 3 {
            let p = ring[i];
            let q = ring[(i + 1) % ring.len()];
            if near(p, q) {
                ring.remove(i);
                done = false;
            } else {
                i += 1;
            }
        }
        let mut i = 0;
        while i < ring.len() && ring.len() >= 3 {
            let len = ring.len();
            let o = ring[(i + len - 1) % len];
            let p = ring[i];
            let q = ring[(i + 1) % len];
            if collinear(o, p, q) {
                ring.remove(i);
                done = false;
            } else {
                i += 1;
            }
        }
    }
    if ring.len() < 3 {
        return ring;
    }

    let mut dense = Vec::with_capacity(ring.len());
    for i in 0..ring.len() {
        let p = ring[i];
        let q = ring[(i + 1) % ring.len()];
        let n = (edge_length(p, q) / step).ceil().max(1.0) as usize;
        dense.push(p);
        for j in 1..n {
            let t = j as f64 / n as f64;
            dense.push([p[0] + (q[0] - p[0]) * t, p[1] + (q[1] - p[1]) * t]);
        }
    }
    dense
}

#[inline]
fn near(p: [f64; 2], q: [f64; 2]) -> bool {
    (p[0] - q[0]).abs() + (p[1] - q[1]).abs() < DUPLICATE_TOLERANCE
}

fn collinear(o: [f64; 2], p: [f64; 2], q: [f64; 2]) -> bool {
    let a = [o[0] - p[0], o[1] - p[1]];
    let b = [q[0] - p[0], q[1] - p[1]];
    let norms = ((a[0] * a[0] + a[1] * a[1]) * (b[0] * b[0] + b[1] * b[1])).sqrt();
    if norms == 0.0 {
        return true;
    }
    ((a[0] * b[0] + a[1] * b[1]) / norms).abs() > 1.0 - COLLINEAR_TOLERANCE
}

#[inline]
fn edge_length(p: [f64; 2], q: [f64; 2]) -> f64 {
    let (dx, dy) = (q[0] - p[0], q[1] - p[1]);
    (dx * dx + dy * dy).sqrt()
}

/// Split triangles until no edge exceeds `max_edge`.
///
/// Edges are marked globally and every marked edge gets one shared midpoint,
/// so neighbouring triangles stay conforming (no T-junctions).
fn refine(points: &mut Vec<[f64; 2]>, mut triangles: Vec<[usize; 3]>, max_edge: f64) -> Vec<[usize; 3]> {
    let limit = max_edge * (1.0 + 1e-9);
    for _ in 0..MAX_REFINEMENT_ROUNDS {
        let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
        let mut next = Vec::with_capacity(triangles.len() * 2);
        let mut changed = false;

        for tri in &triangles {
            let marks = [0, 1, 2].map(|e| {
                edge_length(points[tri[e]], points[tri[(e + 1) % 3]]) > limit
            });
            let marked = marks.iter().filter(|&&m| m).count();
            if marked == 0 {
                next.push(*tri);
                continue;
            }
            changed = true;
            let rotation = match marked {
                1 => marks.iter().position(|&m| m).unwrap_or(0),
                2 => (marks.iter().position(|&m| !m).unwrap_or(2) + 1) % 3,
                _ => 0,
            };
            let [a, b, c] = [0, 1, 2].map(|i| tri[(i + rotation) % 3]);
            let mab = midpoint(points, &mut midpoints, a, b);
            match marked {
                1 => next.extend([[a, mab, c], [mab, b, c]]),
                2 => {
                    let mbc = midpoint(points, &mut midpoints, b, c);
                    next.extend([[a, mab, mbc], [mab, b, mbc], [a, mbc, c]]);
                }
                _ => {
                    let mbc = midpoint(points, &mut midpoints, b, c);
                    let mca = midpoint(points, &mut midpoints, c, a);
                    next.extend([[a, mab, mca], [mab, b, mbc], [mca, mbc, c], [mab, mbc, mca]]);
                }
            }
        }

        triangles = next;
        if !changed {
            break;
        }
    }
    triangles
}

fn midpoint(
    points: &mut Vec<[f64; 2]>,
    midpoints: &mut HashMap<(usize, usize), usize>,
    a: usize,
    b: usize,
) -> usize {
    let key = (a.min(b), a.max(b));
    *midpoints.entry(key).or_insert_with(|| {
        let (p, q) = (points[a], points[b]);
        points.push([(p[0] + q[0]) / 2.0, (p[1] + q[1]) / 2.0]);
        points.len() - 1
    })
}

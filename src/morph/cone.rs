use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::f64::consts::TAU;

use crate::config::Configuration;
use crate::map::{Cartographic, NedLocal};
use crate::morph::country::Boundary;
use crate::morph::geometry::MorphVertex;

/// A transport link seen from a city: clock angle from north and elevation
/// below the local horizon, both in radians.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Direction {
    pub clock: f64,
    pub elevation: f64,
}

/// Piecewise-linear function over samples sorted by abscissa.
///
/// Below the first sample the first value holds. Above the last one the
/// last segment is extended.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Interpolator {
    samples: Vec<(f64, f64)>,
}

impl Interpolator {
    pub fn new(mut samples: Vec<(f64, f64)>) -> Self {
        samples.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        Self { samples }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn eval(&self, x: f64) -> Option<f64> {
        let samples = &self.samples;
        let (first, last) = (samples.first()?, samples.last()?);
        if samples.len() == 1 || x <= first.0 {
            return Some(first.1);
        }
        let (lo, hi) = if x > last.0 {
            (samples[samples.len() - 2], *last)
        } else {
            let i = samples.partition_point(|s| s.0 < x);
            if samples[i].0 == x {
                return Some(samples[i].1);
            }
            (samples[i - 1], samples[i])
        };
        if hi.0 == lo.0 {
            return Some(hi.1);
        }
        Some(lo.1 + (hi.1 - lo.1) * (x - lo.0) / (hi.0 - lo.0))
    }
}

/// Distance to the nearest coastline per clock sector around a city.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConeLimits {
    by_clock: Interpolator,
}

impl ConeLimits {
    /// Bucket every boundary point by clock sector, keeping the closest one.
    /// Sectors are replicated one turn before and after so lookups wrap.
    pub fn from_boundaries<'a>(
        boundaries: impl IntoIterator<Item = &'a Boundary>,
        frame: &NedLocal,
        step: f64,
    ) -> Self {
        let mut sectors: BTreeMap<i64, f64> = BTreeMap::new();
        for position in boundaries.into_iter().flat_map(Boundary::points) {
            let ned = frame.cartographic_to_ned(position);
            let clock = ned.y.atan2(ned.x);
            let sector = (clock / step).floor() as i64;
            let distance = ned.length();
            sectors
                .entry(sector)
                .and_modify(|d| *d = d.min(distance))
                .or_insert(distance);
        }
        let samples = sectors
            .into_iter()
            .flat_map(|(sector, distance)| {
                let clock = sector as f64 * step;
                [(clock - TAU, distance), (clock, distance), (clock + TAU, distance)]
            })
            .collect();
        Self {
            by_clock: Interpolator::new(samples),
        }
    }

    /// `None` when no boundary was given: no limit applies.
    pub fn at(&self, clock: f64) -> Option<f64> {
        self.by_clock.eval(clock)
    }

    pub fn is_empty(&self) -> bool {
        self.by_clock.is_empty()
    }
}

/// Vertices and faces of one cone epoch.
#[derive(Debug, Clone)]
pub struct ConeShape {
    pub vertices: Vec<MorphVertex>,
    pub indices: Vec<u32>,
}

/// Rim positions sampled every `step` around the closed direction set.
pub fn rim(
    frame: &NedLocal,
    directions: &[Direction],
    distance: f64,
    limits: Option<&ConeLimits>,
    step: f64,
) -> Vec<Cartographic> {
    let mut sorted = directions.to_vec();
    sorted.sort_by(|a, b| a.clock.partial_cmp(&b.clock).unwrap_or(Ordering::Equal));
    let (Some(first), Some(last)) = (sorted.first().copied(), sorted.last().copied()) else {
        return Vec::new();
    };
    let min_clock = first.clock;
    let mut max_clock = last.clock;
    if max_clock - min_clock < TAU {
        max_clock = min_clock + TAU;
        sorted.push(Direction {
            clock: max_clock,
            elevation: first.elevation,
        });
    }
    let elevation_at = Interpolator::new(sorted.iter().map(|d| (d.clock, d.elevation)).collect());

    let count = ((max_clock - min_clock) / step - 1e-9).ceil().max(0.0) as usize;
    (0..count)
        .map(|i| min_clock + i as f64 * step)
        .filter(|&clock| clock < max_clock)
        .map(|clock| {
            let elevation = elevation_at.eval(clock).unwrap_or(first.elevation);
            let cos_el = elevation.cos();
            let length = match limits.and_then(|l| l.at(clock)) {
                Some(limit) if cos_el > 0.0 => distance.min(limit.max(0.0) / cos_el),
                _ => distance,
            };
            frame.project(clock, elevation, length)
        })
        .collect()
}

/// Rim ring, then the summit (the city), then the centre of the base at
/// the mean rim height. Side fan toward the summit, cap fan toward the centre.
///
/// The extrusion target deepens the rim and the centre by the configured
/// ratio. The summit never moves.
pub fn shape(
    frame: &NedLocal,
    directions: &[Direction],
    distance: f64,
    limits: Option<&ConeLimits>,
    config: &Configuration,
) -> ConeShape {
    let ring = rim(frame, directions, distance, limits, config.cone_step());
    let n = ring.len();
    let summit = *frame.summit();
    let mean_height = if n > 0 {
        ring.iter().map(Cartographic::height).sum::<f64>() / n as f64
    } else {
        0.0
    };
    let center = summit.with_height(mean_height);
    let deepen = 1.0 + config.extruded_height_ratio;

    let mut vertices: Vec<MorphVertex> = ring
        .iter()
        .map(|position| MorphVertex {
            rest: *position,
            extruded: position.with_height(position.height() * deepen),
        })
        .collect();
    vertices.push(MorphVertex::fixed(summit));
    vertices.push(MorphVertex {
        rest: center,
        extruded: center.with_height(mean_height * deepen),
    });

    let mut indices = Vec::with_capacity(6 * n);
    for i in 0..n {
        let (a, b) = (i as u32, ((i + 1) % n) as u32);
        indices.extend([a, b, n as u32, a, b, n as u32 + 1]);
    }
    ConeShape { vertices, indices }
}

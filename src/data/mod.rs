//! Loading countries and town transports from disk, plus a coarse built-in
//! world for when no data file is around.

use geojson::{GeoJson, Geometry, JsonValue, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::board::cone::Epochs;
use crate::board::{CountrySource, TownTransport};
use crate::criteria::{Properties, PropertyValue};
use crate::error::Result;
use crate::map::Cartographic;
use crate::morph::{Direction, Polygon};

/// Read a GeoJSON file. Every polygon of a feature keeps the feature's
/// properties; features without polygons are skipped.
pub fn load_countries(path: &Path) -> Result<Vec<CountrySource>> {
    let content = fs::read_to_string(path)?;
    let geojson: GeoJson = content.parse()?;

    let mut countries = Vec::new();
    let mut push = |properties: Option<&geojson::JsonObject>, geometry: Option<&Geometry>| {
        let mut polygons = Vec::new();
        if let Some(geometry) = geometry {
            collect_polygons(geometry, &mut polygons);
        }
        if polygons.is_empty() {
            return;
        }
        let properties = properties
            .map(|object| {
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), json_to_property(value)))
                    .collect::<Properties>()
            })
            .unwrap_or_default();
        countries.push(CountrySource { properties, polygons });
    };
    match &geojson {
        GeoJson::FeatureCollection(fc) => {
            for feature in &fc.features {
                push(feature.properties.as_ref(), feature.geometry.as_ref());
            }
        }
        GeoJson::Feature(feature) => push(feature.properties.as_ref(), feature.geometry.as_ref()),
        GeoJson::Geometry(geometry) => push(None, Some(geometry)),
    }
    debug!(path = %path.display(), countries = countries.len(), "countries loaded");
    Ok(countries)
}

fn collect_polygons(geometry: &Geometry, polygons: &mut Vec<Polygon>) {
    let to_polygon = |rings: &[Vec<Vec<f64>>]| -> Option<Polygon> {
        let mut rings = rings.iter().map(|ring| {
            ring.iter()
                .filter(|position| position.len() >= 2)
                .map(|position| [position[0], position[1]])
                .collect::<Vec<[f64; 2]>>()
        });
        let exterior = rings.next()?;
        Some(Polygon {
            exterior,
            holes: rings.collect(),
        })
    };
    match &geometry.value {
        Value::Polygon(rings) => polygons.extend(to_polygon(rings)),
        Value::MultiPolygon(parts) => polygons.extend(parts.iter().filter_map(|rings| to_polygon(rings))),
        Value::GeometryCollection(geometries) => {
            for g in geometries {
                collect_polygons(g, polygons);
            }
        }
        _ => {}
    }
}

fn json_to_property(value: &JsonValue) -> PropertyValue {
    match value {
        JsonValue::Null => PropertyValue::Null,
        JsonValue::Bool(b) => PropertyValue::Bool(*b),
        JsonValue::Number(n) => n.as_f64().map_or(PropertyValue::Null, PropertyValue::Number),
        JsonValue::String(s) => PropertyValue::Text(s.clone()),
        JsonValue::Array(items) => PropertyValue::List(items.iter().map(json_to_property).collect()),
        JsonValue::Object(object) => PropertyValue::Map(
            object
                .iter()
                .map(|(key, value)| (key.clone(), json_to_property(value)))
                .collect(),
        ),
    }
}

/// One town as stored in a transport file. Directions are in radians.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TownRecord {
    city_code: PropertyValue,
    longitude: f64,
    latitude: f64,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    transports: BTreeMap<String, Epochs>,
}

/// Read a JSON array of towns with their transport directions.
pub fn load_transports(path: &Path) -> Result<Vec<TownTransport>> {
    let mut bytes = fs::read(path)?;
    let records: Vec<TownRecord> = simd_json::serde::from_slice(&mut bytes)?;
    let towns: Vec<TownTransport> = records
        .into_iter()
        .filter_map(|record| {
            let city_code = record.city_code.to_string();
            if city_code.is_empty() {
                warn!("skipping town without city code");
                return None;
            }
            Some(TownTransport {
                city_code,
                position: Cartographic::from_degrees(record.longitude, record.latitude, 0.0),
                properties: record.properties,
                transports: record.transports,
            })
        })
        .collect();
    debug!(path = %path.display(), towns = towns.len(), "transports loaded");
    Ok(towns)
}

/// Continent outlines, one polygon each.
pub fn simple_world() -> Vec<CountrySource> {
    let outline = |name: &str, points: &[(f64, f64)]| CountrySource {
        properties: Properties::from([
            ("name".to_string(), PropertyValue::from(name)),
            ("continent".to_string(), PropertyValue::from(name)),
        ]),
        polygons: vec![Polygon {
            exterior: points.iter().map(|&(lon, lat)| [lon, lat]).collect(),
            holes: vec![],
        }],
    };
    vec![
        outline(
            "North America",
            &[
                (-168.0, 65.0), (-166.0, 60.0), (-141.0, 60.0), (-130.0, 55.0),
                (-125.0, 48.0), (-124.0, 40.0), (-117.0, 32.0), (-110.0, 25.0),
                (-97.0, 25.0), (-97.0, 28.0), (-82.0, 24.0), (-80.0, 25.0),
                (-81.0, 31.0), (-75.0, 35.0), (-70.0, 41.0), (-67.0, 45.0),
                (-65.0, 47.0), (-55.0, 47.0), (-52.0, 47.0), (-55.0, 52.0),
                (-58.0, 55.0), (-64.0, 60.0), (-73.0, 62.0), (-80.0, 63.0),
                (-95.0, 62.0), (-110.0, 68.0), (-130.0, 70.0), (-145.0, 70.0),
            ],
        ),
        outline(
            "South America",
            &[
                (-80.0, 10.0), (-75.0, 5.0), (-70.0, 5.0), (-60.0, 5.0),
                (-50.0, 0.0), (-35.0, -5.0), (-35.0, -10.0), (-38.0, -15.0),
                (-40.0, -22.0), (-48.0, -25.0), (-55.0, -34.0), (-58.0, -38.0),
                (-65.0, -42.0), (-68.0, -50.0), (-75.0, -52.0), (-75.0, -45.0),
                (-72.0, -40.0), (-72.0, -30.0), (-70.0, -20.0), (-70.0, -15.0),
                (-80.0, -5.0), (-80.0, 0.0),
            ],
        ),
        outline(
            "Europe",
            &[
                (-10.0, 36.0), (-5.0, 36.0), (0.0, 38.0), (5.0, 43.0),
                (10.0, 44.0), (15.0, 45.0), (20.0, 40.0), (25.0, 37.0),
                (30.0, 40.0), (35.0, 42.0), (40.0, 43.0), (40.0, 55.0),
                (30.0, 60.0), (25.0, 65.0), (20.0, 70.0), (10.0, 71.0),
                (5.0, 62.0), (5.0, 58.0), (-5.0, 58.0), (-10.0, 52.0),
                (-5.0, 48.0), (-5.0, 43.0),
            ],
        ),
        outline(
            "Africa",
            &[
                (-17.0, 15.0), (-17.0, 20.0), (-15.0, 28.0), (-5.0, 35.0),
                (10.0, 37.0), (20.0, 33.0), (25.0, 32.0), (35.0, 30.0),
                (35.0, 20.0), (42.0, 12.0), (50.0, 12.0), (45.0, 5.0),
                (35.0, -5.0), (35.0, -20.0), (35.0, -25.0), (30.0, -30.0),
                (20.0, -35.0), (18.0, -35.0), (15.0, -30.0), (10.0, -15.0),
                (10.0, 0.0), (5.0, 5.0), (-5.0, 5.0), (-10.0, 10.0),
            ],
        ),
        outline(
            "Asia",
            &[
                (45.0, 41.0), (50.0, 40.0), (55.0, 37.0), (60.0, 25.0),
                (65.0, 25.0), (70.0, 20.0), (75.0, 15.0), (80.0, 8.0),
                (80.0, 15.0), (88.0, 22.0), (92.0, 22.0), (95.0, 16.0),
                (100.0, 14.0), (105.0, 10.0), (110.0, 20.0), (115.0, 22.0),
                (120.0, 22.0), (122.0, 25.0), (125.0, 30.0), (130.0, 35.0),
                (135.0, 35.0), (140.0, 40.0), (145.0, 45.0), (145.0, 50.0),
                (140.0, 55.0), (135.0, 55.0), (130.0, 52.0), (130.0, 43.0),
                (120.0, 40.0), (110.0, 45.0), (90.0, 50.0), (70.0, 55.0),
                (60.0, 55.0), (50.0, 50.0),
            ],
        ),
        outline(
            "Oceania",
            &[
                (115.0, -20.0), (120.0, -18.0), (130.0, -12.0), (140.0, -12.0),
                (145.0, -15.0), (150.0, -25.0), (153.0, -30.0), (150.0, -35.0),
                (145.0, -38.0), (140.0, -38.0), (135.0, -35.0), (130.0, -32.0),
                (125.0, -32.0), (115.0, -35.0), (115.0, -25.0),
            ],
        ),
    ]
}

/// A handful of large cities with generated road and rail directions for
/// two epochs.
pub fn simple_towns() -> Vec<TownTransport> {
    let cities = [
        ("NYC", "New York", -74.0, 40.7),
        ("LON", "London", -0.1, 51.5),
        ("PAR", "Paris", 2.3, 48.9),
        ("TYO", "Tokyo", 139.7, 35.7),
        ("SYD", "Sydney", 151.2, -33.9),
        ("RIO", "Rio", -43.2, -22.9),
        ("MOW", "Moscow", 37.6, 55.8),
        ("DEL", "Delhi", 77.2, 28.6),
    ];
    cities
        .iter()
        .enumerate()
        .map(|(i, &(code, name, lon, lat))| {
            let transports = [("road", 0.35), ("rail", 0.2)]
                .iter()
                .map(|&(transport, base)| {
                    let epochs = [("1990", 1.0), ("2010", 1.6)]
                        .iter()
                        .map(|&(year, speedup)| {
                            (year.to_string(), generated_directions(i, base * speedup))
                        })
                        .collect::<Epochs>();
                    (transport.to_string(), epochs)
                })
                .collect();
            TownTransport {
                city_code: code.to_string(),
                position: Cartographic::from_degrees(lon, lat, 0.0),
                properties: Properties::from([("cityName".to_string(), PropertyValue::from(name))]),
                transports,
            }
        })
        .collect()
}

fn generated_directions(seed: usize, elevation: f64) -> Vec<Direction> {
    (0..8)
        .map(|k| {
            let clock = k as f64 * TAU / 8.0;
            let wobble = ((seed * 7 + k * 3) % 5) as f64 * 0.04;
            Direction {
                clock,
                elevation: (elevation + wobble).min(1.2),
            }
        })
        .collect()
}

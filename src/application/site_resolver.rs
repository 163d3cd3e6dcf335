// Site resolution - turns request coordinates into named site geometries
use crate::application::errors::ExtractionError;
use crate::domain::geometry::{Geometry, LatLon, Site};
use serde::Deserialize;

/// Either a single `[lat, lon]` pair or a list of site entries.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RoiInput {
    Single([f64; 2]),
    Many(Vec<SiteEntry>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SiteEntry {
    /// `[lat, lon]`
    Pair([f64; 2]),
    Feature(SiteFeature),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteFeature {
    pub name: Option<String>,
    pub buffer: Option<f64>,
    pub point: Option<[f64; 2]>,
    pub polygon: Option<Vec<[f64; 2]>>,
}

pub fn resolve_sites(roi: &RoiInput, default_buffer: f64) -> Result<Vec<Site>, ExtractionError> {
    let entries = match roi {
        RoiInput::Single(pair) => vec![SiteEntry::Pair(*pair)],
        RoiInput::Many(entries) => entries.clone(),
    };
    if entries.is_empty() {
        return Err(ExtractionError::InputEmpty);
    }

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| resolve_one(idx, entry, default_buffer))
        .collect()
}

fn resolve_one(idx: usize, entry: &SiteEntry, default_buffer: f64) -> Result<Site, ExtractionError> {
    let default_name = format!("Site_{}", idx);
    match entry {
        SiteEntry::Pair(pair) => Ok(Site {
            name: default_name,
            geometry: Geometry::Point(coordinate(idx, *pair)?),
            buffer: default_buffer,
        }),
        SiteEntry::Feature(feature) => {
            let geometry = match (&feature.point, &feature.polygon) {
                (Some(pair), None) => Geometry::Point(coordinate(idx, *pair)?),
                (None, Some(ring)) => {
                    if ring.len() < 3 {
                        return Err(ExtractionError::InvalidSite(format!(
                            "site {}: polygon needs at least 3 vertices",
                            idx
                        )));
                    }
                    Geometry::Polygon(
                        ring.iter()
                            .map(|pair| coordinate(idx, *pair))
                            .collect::<Result<_, _>>()?,
                    )
                }
                _ => {
                    return Err(ExtractionError::InvalidSite(format!(
                        "site {}: give exactly one of point or polygon",
                        idx
                    )));
                }
            };
            Ok(Site {
                name: feature.name.clone().unwrap_or(default_name),
                geometry,
                buffer: feature
                    .buffer
                    .filter(|b| b.is_finite())
                    .unwrap_or(default_buffer),
            })
        }
    }
}

fn coordinate(idx: usize, [lat, lon]: [f64; 2]) -> Result<LatLon, ExtractionError> {
    let p = LatLon::new(lat, lon);
    if !p.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ExtractionError::InvalidSite(format!(
            "site {}: invalid coordinate [{}, {}]",
            idx, lat, lon
        )));
    }
    Ok(p)
}

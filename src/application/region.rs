// Region classification - picks the archive a geometry belongs to
use crate::domain::geometry::Geometry;
use crate::infrastructure::config::RegionConfig;

pub trait RegionClassifier: Send + Sync {
    /// Name of the region serving `geometry`, if any.
    fn classify(&self, geometry: &Geometry) -> Option<String>;
}

/// Partitions the globe into latitude bands keyed by the geometry centroid.
/// Bands are checked in order and the first match wins, so a shared edge
/// belongs to the earlier band.
#[derive(Debug, Clone)]
pub struct LatitudeBandClassifier {
    bands: Vec<(String, f64, f64)>,
}

impl LatitudeBandClassifier {
    pub fn new(bands: Vec<(String, f64, f64)>) -> Self {
        Self { bands }
    }

    pub fn from_regions(regions: &[RegionConfig]) -> Self {
        Self::new(
            regions
                .iter()
                .map(|r| (r.name.clone(), r.lat_min, r.lat_max))
                .collect(),
        )
    }
}

impl RegionClassifier for LatitudeBandClassifier {
    fn classify(&self, geometry: &Geometry) -> Option<String> {
        let lat = geometry.centroid().lat;
        self.bands
            .iter()
            .find(|(_, min, max)| (*min..=*max).contains(&lat))
            .map(|(name, _, _)| name.clone())
    }
}

// In-memory gridded archive loaded from JSON documents
use crate::application::archive_repository::{ArchiveProvider, VelocityArchive};
use crate::infrastructure::config::RegionConfig;
use anyhow::{Context, Result, bail, ensure};
use chrono::{NaiveDate, NaiveDateTime};
use ndarray::{Array3, ArrayView3, Axis};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Velocity cubes on a shared (time, y, x) grid.
#[derive(Debug, Clone)]
pub struct GridArchive {
    x: Vec<f64>,
    y: Vec<f64>,
    times: Vec<NaiveDateTime>,
    channels: HashMap<String, Array3<f64>>,
}

#[derive(Debug, Deserialize)]
struct ArchiveDocument {
    x: Vec<f64>,
    y: Vec<f64>,
    time: Vec<String>,
    #[serde(default)]
    channels: HashMap<String, Vec<Option<f64>>>,
}

impl GridArchive {
    /// Build an archive, sorting the time axis ascending.
    pub fn new(
        x: Vec<f64>,
        y: Vec<f64>,
        times: Vec<NaiveDateTime>,
        channels: HashMap<String, Array3<f64>>,
    ) -> Result<Self> {
        let shape = (times.len(), y.len(), x.len());
        for (name, cube) in &channels {
            ensure!(
                cube.dim() == shape,
                "channel {} has shape {:?}, expected {:?}",
                name,
                cube.dim(),
                shape
            );
        }

        let mut order: Vec<usize> = (0..times.len()).collect();
        order.sort_by_key(|&i| times[i]);
        if order.windows(2).all(|w| w[0] < w[1]) {
            return Ok(Self {
                x,
                y,
                times,
                channels,
            });
        }

        let times = order.iter().map(|&i| times[i]).collect();
        let channels = channels
            .into_iter()
            .map(|(name, cube)| (name, cube.select(Axis(0), &order)))
            .collect();
        Ok(Self {
            x,
            y,
            times,
            channels,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let doc: ArchiveDocument =
            serde_json::from_str(json).context("Failed to parse archive document")?;

        let times = doc
            .time
            .iter()
            .map(|t| parse_time(t))
            .collect::<Result<Vec<_>>>()?;
        let shape = (times.len(), doc.y.len(), doc.x.len());

        let mut channels = HashMap::new();
        for (name, values) in doc.channels {
            let flat: Vec<f64> = values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
            let cube = Array3::from_shape_vec(shape, flat)
                .with_context(|| format!("channel {} does not match grid {:?}", name, shape))?;
            channels.insert(name, cube);
        }

        Self::new(doc.x, doc.y, times, channels)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read archive {}", path.display()))?;
        Self::from_json_str(&json)
    }
}

fn parse_time(s: &str) -> Result<NaiveDateTime> {
    if let Ok(t) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(t);
    }
    match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        Ok(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
        Err(_) => bail!("Unrecognised timestamp: {}", s),
    }
}

impl VelocityArchive for GridArchive {
    fn x(&self) -> &[f64] {
        &self.x
    }

    fn y(&self) -> &[f64] {
        &self.y
    }

    fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    fn channel(&self, name: &str) -> Option<ArrayView3<'_, f64>> {
        self.channels.get(name).map(Array3::view)
    }
}

/// Opens archive files read-only and keeps them for reuse across requests.
#[derive(Debug, Default)]
pub struct JsonArchiveProvider {
    pool: RwLock<HashMap<PathBuf, Arc<GridArchive>>>,
}

impl JsonArchiveProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveProvider for JsonArchiveProvider {
    fn open(&self, region: &RegionConfig) -> Result<Arc<dyn VelocityArchive>> {
        if let Some(archive) = self
            .pool
            .read()
            .map_err(|_| anyhow::anyhow!("archive pool lock poisoned"))?
            .get(&region.path)
        {
            return Ok(archive.clone());
        }

        tracing::info!("Opening archive for {} at {}", region.name, region.path.display());
        let archive = Arc::new(GridArchive::from_json_file(&region.path)?);

        let mut pool = self
            .pool
            .write()
            .map_err(|_| anyhow::anyhow!("archive pool lock poisoned"))?;
        let archive = pool.entry(region.path.clone()).or_insert(archive).clone();
        Ok(archive)
    }
}

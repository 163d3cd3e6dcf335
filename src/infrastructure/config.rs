use crate::domain::geometry::Crs;
use crate::domain::record::ReconstructionParams;
use anyhow::ensure;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Process-wide settings, loaded once at startup and shared read-only.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub defaults: RequestDefaults,
    #[serde(default = "default_regions")]
    pub regions: Vec<RegionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

/// Values used when a request leaves a field out.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RequestDefaults {
    pub buffer: f64,
    pub variables: Vec<String>,
    pub quality: Vec<String>,
    pub gap_fill: usize,
    pub win_raw: usize,
    pub win_daily: usize,
    pub poly: usize,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        let params = ReconstructionParams::default();
        Self {
            buffer: 500.0,
            variables: vec!["s".to_string()],
            quality: vec!["filt".to_string()],
            gap_fill: params.gap_fill,
            win_raw: params.win_raw,
            win_daily: params.win_daily,
            poly: params.poly,
        }
    }
}

impl RequestDefaults {
    pub fn params(&self) -> ReconstructionParams {
        ReconstructionParams {
            gap_fill: self.gap_fill,
            win_raw: self.win_raw,
            win_daily: self.win_daily,
            poly: self.poly,
        }
    }
}

/// A named archive and the latitude band it serves.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RegionConfig {
    pub name: String,
    pub path: PathBuf,
    pub crs: Crs,
    pub lat_min: f64,
    pub lat_max: f64,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_regions() -> Vec<RegionConfig> {
    vec![
        RegionConfig {
            name: "Greenland".to_string(),
            path: PathBuf::from("data/greenland.json"),
            crs: Crs::Epsg3413,
            lat_min: 0.0,
            lat_max: 90.0,
        },
        RegionConfig {
            name: "Antarctica".to_string(),
            path: PathBuf::from("data/antarctica.json"),
            crs: Crs::Epsg3031,
            lat_min: -90.0,
            lat_max: 0.0,
        },
    ]
}

pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/archives").required(false))
        .add_source(config::Environment::with_prefix("GLACIER").separator("__"))
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

pub fn load_app_config_from(path: &Path) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?;

    let app_config: AppConfig = settings.try_deserialize()?;
    app_config.validate()?;
    Ok(app_config)
}

impl AppConfig {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.regions.is_empty(), "at least one region must be configured");

        let mut names = HashSet::new();
        for region in &self.regions {
            ensure!(
                names.insert(region.name.as_str()),
                "duplicate region name: {}",
                region.name
            );
            ensure!(
                region.lat_min <= region.lat_max,
                "region {}: lat_min {} exceeds lat_max {}",
                region.name,
                region.lat_min,
                region.lat_max
            );
        }
        Ok(())
    }

    pub fn region(&self, name: &str) -> Option<&RegionConfig> {
        self.regions.iter().find(|r| r.name == name)
    }
}

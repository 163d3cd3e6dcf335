// Extraction service - Use case for reconstructing velocity time series at sites
use crate::application::archive_repository::{ArchiveProvider, TIME_SEPARATION, VelocityArchive};
use crate::application::error_combiner::{ERROR_COLUMN, attach_error};
use crate::application::errors::ExtractionError;
use crate::application::reconstruction::{ChannelObservations, reconstruct_channel};
use crate::application::region::RegionClassifier;
use crate::application::spatial_aggregator::aggregate;
use crate::domain::geometry::{Crs, Site};
use crate::domain::observation::{DailyAxis, ObservationTable};
use crate::domain::record::{
    ChannelTraces, ReconstructionParams, SiteMeta, SiteOutcome, SiteSeries, round_to, round_trace,
};
use crate::infrastructure::config::AppConfig;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Upper bound on a site's daily axis; anything longer means corrupt timestamps.
const MAX_AXIS_DAYS: usize = 36_600;

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub variables: Vec<String>,
    pub qualities: Vec<String>,
    pub params: ReconstructionParams,
}

impl ExtractionRequest {
    /// Channel names `<variable>_<quality>`, without duplicates.
    pub fn channel_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for v in &self.variables {
            for q in &self.qualities {
                let key = format!("{}_{}", v, q);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }
}

#[derive(Clone)]
pub struct ExtractionService {
    config: Arc<AppConfig>,
    provider: Arc<dyn ArchiveProvider>,
    classifier: Arc<dyn RegionClassifier>,
}

impl ExtractionService {
    pub fn new(
        config: Arc<AppConfig>,
        provider: Arc<dyn ArchiveProvider>,
        classifier: Arc<dyn RegionClassifier>,
    ) -> Self {
        Self {
            config,
            provider,
            classifier,
        }
    }

    /// Reconstruct every site against the archive of the region the first
    /// site falls in. Site-level failures become error outcomes; only an
    /// empty input or an unavailable archive fails the whole batch.
    #[tracing::instrument(skip_all, fields(sites = sites.len()))]
    pub fn reconstruct(
        &self,
        sites: &[Site],
        request: &ExtractionRequest,
    ) -> Result<BTreeMap<String, SiteOutcome>, ExtractionError> {
        let first = sites.first().ok_or(ExtractionError::InputEmpty)?;

        let region_name = self.classifier.classify(&first.geometry).ok_or_else(|| {
            ExtractionError::RegionUnavailable {
                region: "unknown".to_string(),
                reason: format!(
                    "no region covers latitude {:.3}",
                    first.geometry.centroid().lat
                ),
            }
        })?;
        let region = self.config.region(&region_name).ok_or_else(|| {
            ExtractionError::RegionUnavailable {
                region: region_name.clone(),
                reason: format!("region {} is not configured", region_name),
            }
        })?;
        let archive = self
            .provider
            .open(region)
            .map_err(|e| ExtractionError::RegionUnavailable {
                region: region_name.clone(),
                reason: format!("{:#}", e),
            })?;

        let keys = request.channel_keys();
        let mut results = BTreeMap::new();

        for site in sites {
            let meta = site_meta(site, &region.name, request);
            let outcome = match process_site(archive.as_ref(), region.crs, site, &keys, &request.params)
            {
                Ok(data) => {
                    tracing::info!(site = %site.name, days = data.dates.len(), "Site reconstructed");
                    SiteOutcome::Success { data, meta }
                }
                Err(e) => {
                    tracing::warn!(site = %site.name, error = %e, "Site failed");
                    SiteOutcome::Error {
                        message: e.to_string(),
                        meta,
                    }
                }
            };
            if results.insert(site.name.clone(), outcome).is_some() {
                tracing::warn!(site = %site.name, "Duplicate site name, earlier result replaced");
            }
        }

        tracing::info!(
            region = %region.name,
            succeeded = results.values().filter(|o| o.is_success()).count(),
            failed = results.values().filter(|o| !o.is_success()).count(),
            "Batch complete"
        );
        Ok(results)
    }
}

fn site_meta(site: &Site, region: &str, request: &ExtractionRequest) -> SiteMeta {
    let centroid = site.geometry.centroid();
    SiteMeta {
        site_name: site.name.clone(),
        region: region.to_string(),
        buffer_used: site.buffer,
        lat: round_to(centroid.lat, 5),
        lon: round_to(centroid.lon, 5),
        kind: site.geometry.kind(),
        variables: request.variables.clone(),
        quality: request.qualities.clone(),
        params: request.params,
    }
}

fn process_site(
    archive: &dyn VelocityArchive,
    crs: Crs,
    site: &Site,
    keys: &[String],
    params: &ReconstructionParams,
) -> Result<SiteSeries, ExtractionError> {
    let projected = site.geometry.project(crs);
    let table = aggregate(archive, &projected, site.buffer, keys)?.drop_rows_all_nan(keys);
    if table.is_empty() {
        return Err(ExtractionError::NoValidData);
    }
    let table = attach_error(table).merge_same_day();

    let axis = DailyAxis::spanning(table.times()).ok_or(ExtractionError::NoValidData)?;
    if axis.len() > MAX_AXIS_DAYS {
        return Err(ExtractionError::InternalProcessing(format!(
            "daily axis spans {} days",
            axis.len()
        )));
    }

    let times = table.times();
    let spans = required_column(&table, TIME_SEPARATION)?;
    let errors = required_column(&table, ERROR_COLUMN)?;

    let mut count = vec![0u32; axis.len()];
    for (t, &c) in times.iter().zip(table.valid_count()) {
        if let Some(i) = axis.index_of(t.date()) {
            count[i] = c;
        }
    }

    let mut channels = BTreeMap::new();
    for key in keys {
        let Some(values) = table.column(key) else {
            continue;
        };
        let traces = reconstruct_channel(
            &axis,
            ChannelObservations {
                times,
                values,
                spans,
            },
            params,
        );
        channels.insert(
            key.clone(),
            ChannelTraces {
                raw: round_trace(&traces.raw),
                trend: round_trace(&traces.trend),
            },
        );
    }

    Ok(SiteSeries {
        dates: axis
            .dates()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect(),
        error: round_trace(&axis.reindex(times, errors)),
        dt: round_trace(&axis.reindex(times, spans)),
        count,
        channels,
    })
}

fn required_column<'a>(
    table: &'a ObservationTable,
    name: &str,
) -> Result<&'a [f64], ExtractionError> {
    table
        .column(name)
        .ok_or_else(|| ExtractionError::InternalProcessing(format!("missing column {}", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::region::LatitudeBandClassifier;
    use crate::domain::geometry::{Geometry, LatLon, Xy};
    use crate::infrastructure::config::{RegionConfig, RequestDefaults, ServerSettings};
    use crate::infrastructure::grid_archive::GridArchive;
    use chrono::{NaiveDate, NaiveDateTime};
    use ndarray::Array3;
    use std::collections::HashMap;
    use std::path::PathBuf;

    const SITE: LatLon = LatLon {
        lat: 69.2,
        lon: -49.7,
    };
    const CELL: f64 = 200.0;

    struct StaticProvider(Option<Arc<GridArchive>>);

    impl ArchiveProvider for StaticProvider {
        fn open(&self, _region: &RegionConfig) -> anyhow::Result<Arc<dyn VelocityArchive>> {
            match &self.0 {
                Some(archive) => Ok(archive.clone()),
                None => anyhow::bail!("store is offline"),
            }
        }
    }

    fn config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            server: ServerSettings::default(),
            defaults: RequestDefaults::default(),
            regions: vec![
                RegionConfig {
                    name: "Greenland".to_string(),
                    path: PathBuf::from("unused"),
                    crs: Crs::Epsg3413,
                    lat_min: 0.0,
                    lat_max: 90.0,
                },
                RegionConfig {
                    name: "Antarctica".to_string(),
                    path: PathBuf::from("unused"),
                    crs: Crs::Epsg3031,
                    lat_min: -90.0,
                    lat_max: 0.0,
                },
            ],
        })
    }

    fn service(archive: Option<GridArchive>) -> ExtractionService {
        let config = config();
        let classifier = Arc::new(LatitudeBandClassifier::from_regions(&config.regions));
        ExtractionService::new(config, Arc::new(StaticProvider(archive.map(Arc::new))), classifier)
    }

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2019, 7, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    /// 3x3 grid centred on SITE in EPSG:3413, y descending. `speed(t, iy, ix)`
    /// fills s_filt; every cell reports a time separation of `span` days.
    fn grid(
        times: Vec<NaiveDateTime>,
        span: f64,
        speed: impl Fn(usize, usize, usize) -> f64,
    ) -> GridArchive {
        let spans = vec![span; times.len()];
        grid_with_spans(times, &spans, speed)
    }

    /// Like `grid`, with one time separation per timestep.
    fn grid_with_spans(
        times: Vec<NaiveDateTime>,
        spans: &[f64],
        speed: impl Fn(usize, usize, usize) -> f64,
    ) -> GridArchive {
        let Xy { x, y } = Crs::Epsg3413.project(SITE);
        let shape = (times.len(), 3, 3);
        let mut channels = HashMap::new();
        channels.insert(
            "s_filt".to_string(),
            Array3::from_shape_fn(shape, |(t, iy, ix)| speed(t, iy, ix)),
        );
        channels.insert(
            TIME_SEPARATION.to_string(),
            Array3::from_shape_fn(shape, |(t, _, _)| spans[t]),
        );
        channels.insert("u_err_rock".to_string(), Array3::from_elem(shape, 3.0));
        channels.insert("v_err_rock".to_string(), Array3::from_elem(shape, f64::NAN));
        channels.insert("v_err_off_ice".to_string(), Array3::from_elem(shape, 4.0));
        GridArchive::new(
            vec![x - CELL, x, x + CELL],
            vec![y + CELL, y, y - CELL],
            times,
            channels,
        )
        .unwrap()
    }

    fn request(params: ReconstructionParams) -> ExtractionRequest {
        ExtractionRequest {
            variables: vec!["s".to_string()],
            qualities: vec!["filt".to_string()],
            params,
        }
    }

    fn point_site(name: &str, at: LatLon, buffer: f64) -> Site {
        Site {
            name: name.to_string(),
            geometry: Geometry::Point(at),
            buffer,
        }
    }

    fn success(outcome: &SiteOutcome) -> &SiteSeries {
        match outcome {
            SiteOutcome::Success { data, .. } => data,
            SiteOutcome::Error { message, .. } => panic!("site failed: {}", message),
        }
    }

    fn scenario_a_params() -> ReconstructionParams {
        ReconstructionParams {
            gap_fill: 24,
            win_raw: 5,
            win_daily: 5,
            poly: 2,
        }
    }

    #[test]
    fn test_single_pixel_five_days() {
        let values = [10.0, 12.0, 11.0, 13.0, 12.0];
        let archive = grid((1..=5).map(day).collect(), 1.0, |t, iy, ix| {
            if (iy, ix) == (1, 1) { values[t] } else { 500.0 }
        });

        let sites = vec![point_site("Centre", SITE, 0.0)];
        let out = service(Some(archive))
            .reconstruct(&sites, &request(scenario_a_params()))
            .unwrap();

        let data = success(&out["Centre"]);
        assert_eq!(
            data.dates,
            vec!["2019-07-01", "2019-07-02", "2019-07-03", "2019-07-04", "2019-07-05"]
        );
        assert_eq!(data.count, vec![1; 5]);
        // u = 3, v: missing primary falls back to 4 -> magnitude 5
        assert_eq!(data.error, vec![Some(5.0); 5]);
        assert_eq!(data.dt, vec![Some(1.0); 5]);

        let traces = &data.channels["s_filt"];
        assert!(traces.raw.iter().all(Option::is_some));
        assert!(traces.trend.iter().all(Option::is_some));
        for (raw, v) in traces.raw.iter().zip(values) {
            assert!((raw.unwrap() - v).abs() < 2.0);
        }

        let SiteOutcome::Success { meta, .. } = &out["Centre"] else {
            panic!("expected success");
        };
        assert_eq!(meta.region, "Greenland");
        assert_eq!(meta.lat, 69.2);
        assert_eq!(meta.params, scenario_a_params());
    }

    #[test]
    fn test_polygon_over_masked_cells() {
        let archive = grid((1..=3).map(day).collect(), 6.0, |_, iy, _| {
            if iy == 2 { 100.0 } else { f64::NAN }
        });

        // Small triangle around the grid centre, away from the valid bottom row.
        let ring = vec![
            LatLon::new(SITE.lat + 0.0005, SITE.lon - 0.001),
            LatLon::new(SITE.lat + 0.0005, SITE.lon + 0.001),
            LatLon::new(SITE.lat - 0.0003, SITE.lon),
        ];
        let sites = vec![Site {
            name: "Basin".to_string(),
            geometry: Geometry::Polygon(ring),
            buffer: 0.0,
        }];

        let out = service(Some(archive))
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap();
        let json = serde_json::to_value(&out["Basin"]).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "All pixels masked/NaN");
        assert_eq!(json["meta"]["type"], "Polygon");
    }

    #[test]
    fn test_site_outside_coverage_does_not_abort_batch() {
        let archive = grid((1..=3).map(day).collect(), 6.0, |_, _, _| 100.0);
        let sites = vec![
            point_site("Far", LatLon::new(72.0, -40.0), 0.0),
            point_site("Near", SITE, 0.0),
        ];

        let out = service(Some(archive))
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap();

        match &out["Far"] {
            SiteOutcome::Error { message, .. } => {
                assert_eq!(message, "Location outside data coverage.")
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert!(out["Near"].is_success());
    }

    #[test]
    fn test_duplicate_timestamps_are_merged() {
        // Two steps at the same time; only the middle row carries data.
        let archive = grid(vec![day(4), day(4)], 6.0, |t, iy, ix| match (t, iy, ix) {
            (0, 1, 2) => f64::NAN,
            (0, 1, _) => 10.0,
            (1, 1, _) => 14.0,
            _ => f64::NAN,
        });

        let sites = vec![point_site("Row", SITE, CELL + 50.0)];
        let out = service(Some(archive))
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap();
        let data = success(&out["Row"]);
        assert_eq!(data.dates, vec!["2019-07-04"]);
        // median(10, 14)
        assert_eq!(data.channels["s_filt"].raw, vec![Some(12.0)]);
        // t0: 2 valid of the middle row, t1: 3 valid
        assert_eq!(data.count, vec![5]);
    }

    #[test]
    fn test_axis_and_raw_invariants() {
        let obs_days = [1u32, 2, 6, 7, 15, 16, 30];
        let archive = grid(
            obs_days.iter().map(|&d| day(d)).collect(),
            12.0,
            |t, _, _| 80.0 + (t as f64) * 1.5,
        );
        let sites = vec![point_site("Glacier", SITE, 0.0)];
        let params = ReconstructionParams {
            gap_fill: 5,
            win_raw: 5,
            win_daily: 7,
            poly: 2,
        };

        let out = service(Some(archive))
            .reconstruct(&sites, &request(params))
            .unwrap();
        let data = success(&out["Glacier"]);

        assert_eq!(data.dates.len(), 30);
        let parsed: Vec<NaiveDate> = data
            .dates
            .iter()
            .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap())
            .collect();
        assert!(parsed.windows(2).all(|w| (w[1] - w[0]).num_days() == 1));

        let raw = &data.channels["s_filt"].raw;
        let non_null: Vec<u32> = (0..raw.len())
            .filter(|&i| raw[i].is_some())
            .map(|i| i as u32 + 1)
            .collect();
        assert_eq!(non_null, obs_days.to_vec());

        // Observation gaps are zero on the count axis.
        assert_eq!(data.count[2], 0);
        assert_eq!(data.count[0], 1);
    }

    #[test]
    fn test_idempotent() {
        let make = || {
            grid((1..=20).step_by(3).map(day).collect(), 9.0, |t, iy, ix| {
                50.0 + (t * 7 % 5) as f64 + iy as f64 + ix as f64 * 0.3
            })
        };
        let sites = vec![point_site("A", SITE, 250.0), point_site("B", SITE, 0.0)];
        let req = request(ReconstructionParams::default());

        let first = serde_json::to_string(&service(Some(make())).reconstruct(&sites, &req).unwrap())
            .unwrap();
        let second =
            serde_json::to_string(&service(Some(make())).reconstruct(&sites, &req).unwrap())
                .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unavailable_archive_fails_batch() {
        let sites = vec![point_site("Near", SITE, 0.0)];
        let err = service(None)
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap_err();
        assert!(matches!(err, ExtractionError::RegionUnavailable { ref region, .. } if region == "Greenland"));
        assert!(err.to_string().contains("store is offline"));
    }

    #[test]
    fn test_processing_failure_is_isolated_to_its_site() {
        // The 1900 acquisition is valid only in the corner cell, so the
        // buffered site spans more than a century of days. The 1e12 day
        // separation on 3 July must not take the batch down either.
        let old = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let archive = grid_with_spans(
            vec![old, day(1), day(2), day(3)],
            &[6.0, 6.0, 6.0, 1e12],
            |t, iy, ix| match t {
                0 if (iy, ix) == (0, 0) => 100.0,
                0 => f64::NAN,
                _ => 100.0 + t as f64,
            },
        );
        let sites = vec![
            point_site("Wide", SITE, CELL + 50.0),
            point_site("Near", SITE, 0.0),
        ];

        let out = service(Some(archive))
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap();

        let json = serde_json::to_value(&out["Wide"]).unwrap();
        assert_eq!(json["status"], "error");
        assert!(
            json["message"]
                .as_str()
                .unwrap()
                .starts_with("Processing failed: daily axis spans")
        );
        assert_eq!(json["meta"]["site_name"], "Wide");

        let data = success(&out["Near"]);
        assert_eq!(data.dates, vec!["2019-07-01", "2019-07-02", "2019-07-03"]);
        assert_eq!(data.dt[2], Some(1e12));
        assert!(data.channels["s_filt"].trend.iter().all(Option::is_some));
    }

    #[test]
    fn test_duplicate_site_names_keep_last_outcome() {
        let archive = grid((1..=3).map(day).collect(), 6.0, |_, _, _| 100.0);
        let sites = vec![
            point_site("Camp", LatLon::new(72.0, -40.0), 0.0),
            point_site("Camp", SITE, 0.0),
        ];

        let out = service(Some(archive))
            .reconstruct(&sites, &request(ReconstructionParams::default()))
            .unwrap();
        assert_eq!(out.len(), 1);
        assert!(out["Camp"].is_success());
    }

    #[test]
    fn test_empty_sites() {
        let err = service(None)
            .reconstruct(&[], &request(ReconstructionParams::default()))
            .unwrap_err();
        assert_eq!(err.to_string(), "Input file contains no geometries.");
    }

    #[test]
    fn test_channel_keys() {
        let req = ExtractionRequest {
            variables: vec!["s".to_string(), "u".to_string(), "s".to_string()],
            qualities: vec!["filt".to_string(), "raw".to_string()],
            params: ReconstructionParams::default(),
        };
        assert_eq!(req.channel_keys(), vec!["s_filt", "s_raw", "u_filt", "u_raw"]);
    }
}

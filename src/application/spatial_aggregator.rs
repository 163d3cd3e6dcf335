// Spatial aggregation - collapses archive cells under a site into one series per channel
use crate::application::archive_repository::{AUXILIARY_CHANNELS, TIME_SEPARATION, VelocityArchive};
use crate::application::errors::ExtractionError;
use crate::domain::geometry::{Bounds, ProjectedGeometry, Xy};
use crate::domain::observation::{ObservationTable, nan_median};
use ndarray::{ArrayView3, s};
use std::ops::RangeInclusive;

/// How the cells under a site were sampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sampling {
    /// Nearest cell (ix, iy) to the centroid
    Pixel { ix: usize, iy: usize },
    /// Inclusive index ranges of the cells inside the area
    Area {
        ix: (usize, usize),
        iy: (usize, usize),
    },
}

/// Build the per-timestep table for `geometry`: one column per requested
/// channel present in the archive plus every auxiliary channel, and the
/// per-timestep count of valid cells of the primary channel.
pub fn aggregate(
    archive: &dyn VelocityArchive,
    geometry: &ProjectedGeometry,
    buffer: f64,
    target_keys: &[String],
) -> Result<ObservationTable, ExtractionError> {
    let sampling = choose_sampling(archive, geometry, buffer)?;
    tracing::debug!(?sampling, "Sampling archive");

    let count_channel = target_keys
        .first()
        .filter(|k| archive.channel(k).is_some())
        .map(String::as_str)
        .unwrap_or(TIME_SEPARATION);

    let n_times = archive.times().len();
    let valid_count = match archive.channel(count_channel) {
        Some(cube) => count_valid(&cube, sampling),
        None => vec![0; n_times],
    };

    let mut table = ObservationTable::new(archive.times().to_vec(), valid_count);

    for key in target_keys {
        if let Some(cube) = archive.channel(key) {
            table.insert_column(key.clone(), collapse(&cube, sampling));
        }
    }
    for aux in AUXILIARY_CHANNELS {
        if table.has_column(aux) {
            continue;
        }
        let values = match archive.channel(aux) {
            Some(cube) => collapse(&cube, sampling),
            None => vec![f64::NAN; n_times],
        };
        table.insert_column(aux, values);
    }

    Ok(table)
}

/// Decide between single-pixel and area sampling. Fails when the centroid
/// lies outside the archive's coordinate extent.
pub fn choose_sampling(
    archive: &dyn VelocityArchive,
    geometry: &ProjectedGeometry,
    buffer: f64,
) -> Result<Sampling, ExtractionError> {
    let (xs, ys) = (archive.x(), archive.y());
    let extent = coordinate_extent(xs, ys).ok_or(ExtractionError::OutOfBounds)?;

    let centroid = geometry.centroid();
    if !extent.contains(centroid) {
        return Err(ExtractionError::OutOfBounds);
    }

    if let Some(area) = geometry.sampling_area(buffer) {
        let ix = index_span(xs, area.min_x..=area.max_x);
        let iy = index_span(ys, area.min_y..=area.max_y);
        if let (Some(ix), Some(iy)) = (ix, iy) {
            return Ok(Sampling::Area { ix, iy });
        }
    }

    Ok(nearest_pixel(xs, ys, centroid))
}

fn coordinate_extent(xs: &[f64], ys: &[f64]) -> Option<Bounds> {
    let span = |v: &[f64]| {
        let min = v.iter().copied().fold(f64::INFINITY, f64::min);
        let max = v.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (min <= max).then_some((min, max))
    };
    let (min_x, max_x) = span(xs)?;
    let (min_y, max_y) = span(ys)?;
    Some(Bounds {
        min_x,
        min_y,
        max_x,
        max_y,
    })
}

/// First and last index of the monotonic `coords` falling in `range`.
fn index_span(coords: &[f64], range: RangeInclusive<f64>) -> Option<(usize, usize)> {
    let first = coords.iter().position(|c| range.contains(c))?;
    let last = coords.iter().rposition(|c| range.contains(c))?;
    Some((first, last))
}

fn nearest_index(coords: &[f64], target: f64) -> usize {
    coords
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - target).abs().total_cmp(&(*b - target).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn nearest_pixel(xs: &[f64], ys: &[f64], p: Xy) -> Sampling {
    Sampling::Pixel {
        ix: nearest_index(xs, p.x),
        iy: nearest_index(ys, p.y),
    }
}

fn collapse(cube: &ArrayView3<'_, f64>, sampling: Sampling) -> Vec<f64> {
    match sampling {
        Sampling::Pixel { ix, iy } => cube.slice(s![.., iy, ix]).to_vec(),
        Sampling::Area { ix, iy } => cube
            .slice(s![.., iy.0..=iy.1, ix.0..=ix.1])
            .outer_iter()
            .map(|plane| nan_median(plane.iter().copied()))
            .collect(),
    }
}

fn count_valid(cube: &ArrayView3<'_, f64>, sampling: Sampling) -> Vec<u32> {
    match sampling {
        Sampling::Pixel { ix, iy } => cube
            .slice(s![.., iy, ix])
            .iter()
            .map(|v| u32::from(!v.is_nan()))
            .collect(),
        Sampling::Area { ix, iy } => cube
            .slice(s![.., iy.0..=iy.1, ix.0..=ix.1])
            .outer_iter()
            .map(|plane| plane.iter().filter(|v| !v.is_nan()).count() as u32)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::grid_archive::GridArchive;
    use chrono::NaiveDate;
    use ndarray::Array3;
    use std::collections::HashMap;

    /// 2 timesteps on a 3x3 grid at x, y in {0, 100, 200}; y descending.
    fn archive() -> GridArchive {
        let times = vec![
            NaiveDate::from_ymd_opt(2021, 6, 1).unwrap().and_hms_opt(0, 0, 0).unwrap(),
            NaiveDate::from_ymd_opt(2021, 6, 7).unwrap().and_hms_opt(0, 0, 0).unwrap(),
        ];
        let speed = Array3::from_shape_fn((2, 3, 3), |(t, iy, ix)| {
            if t == 1 && iy == 0 {
                f64::NAN
            } else {
                (t * 100 + iy * 10 + ix) as f64
            }
        });
        let sep = Array3::from_elem((2, 3, 3), 6.0);
        let mut channels = HashMap::new();
        channels.insert("s_filt".to_string(), speed);
        channels.insert(TIME_SEPARATION.to_string(), sep);
        GridArchive::new(
            vec![0.0, 100.0, 200.0],
            vec![200.0, 100.0, 0.0],
            times,
            channels,
        )
        .unwrap()
    }

    fn keys() -> Vec<String> {
        vec!["s_filt".to_string()]
    }

    #[test]
    fn test_single_pixel_nearest_cell() {
        let a = archive();
        let point = ProjectedGeometry::Point(Xy { x: 90.0, y: 180.0 });
        let table = aggregate(&a, &point, 0.0, &keys()).unwrap();

        // Nearest: ix = 1 (x=100), iy = 0 (y=200)
        let s = table.column("s_filt").unwrap();
        assert_eq!(s[0], 1.0);
        assert!(s[1].is_nan());
        assert_eq!(table.valid_count(), &[1, 0]);
        // Missing auxiliary channels come back as NaN columns.
        assert!(table.column("u_err_rock").unwrap().iter().all(|v| v.is_nan()));
        assert_eq!(table.column(TIME_SEPARATION).unwrap(), &[6.0, 6.0]);
    }

    #[test]
    fn test_area_median_and_count() {
        let a = archive();
        let point = ProjectedGeometry::Point(Xy { x: 100.0, y: 100.0 });
        let table = aggregate(&a, &point, 150.0, &keys()).unwrap();

        // t=0: values 0..=22 over the whole grid; median of the 9 cells is 11.
        let s = table.column("s_filt").unwrap();
        assert_eq!(s[0], 11.0);
        // t=1: row iy=0 masked; remaining 110..112, 120..122 -> median 116.
        assert_eq!(s[1], 116.0);
        assert_eq!(table.valid_count(), &[9, 6]);
    }

    #[test]
    fn test_area_without_cells_falls_back_to_pixel() {
        let a = archive();
        // Buffer too small to contain a cell centre.
        let point = ProjectedGeometry::Point(Xy { x: 140.0, y: 60.0 });
        let sampling = choose_sampling(&a, &point, 10.0).unwrap();
        assert_eq!(sampling, Sampling::Pixel { ix: 1, iy: 1 });
    }

    #[test]
    fn test_centroid_outside_extent() {
        let a = archive();
        let point = ProjectedGeometry::Point(Xy { x: 500.0, y: 100.0 });
        let err = aggregate(&a, &point, 0.0, &keys()).unwrap_err();
        assert!(matches!(err, ExtractionError::OutOfBounds));
        assert_eq!(err.to_string(), "Location outside data coverage.");
    }

    #[test]
    fn test_missing_primary_counts_time_separation() {
        let a = archive();
        let point = ProjectedGeometry::Point(Xy { x: 0.0, y: 0.0 });
        let table = aggregate(&a, &point, 0.0, &["v_raw".to_string()]).unwrap();
        assert!(!table.has_column("v_raw"));
        assert_eq!(table.valid_count(), &[1, 1]);
    }
}

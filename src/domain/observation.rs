// Observation table and daily axis domain models
use chrono::{Days, NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

/// Per-timestep table produced by spatial aggregation. Missing values are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    times: Vec<NaiveDateTime>,
    columns: BTreeMap<String, Vec<f64>>,
    valid_count: Vec<u32>,
}

impl ObservationTable {
    pub fn new(times: Vec<NaiveDateTime>, valid_count: Vec<u32>) -> Self {
        debug_assert_eq!(times.len(), valid_count.len());
        Self {
            times,
            columns: BTreeMap::new(),
            valid_count,
        }
    }

    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.times.len());
        self.columns.insert(name.into(), values);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn valid_count(&self) -> &[u32] {
        &self.valid_count
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Remove rows where every one of `keys` is NaN. Keys that are not
    /// columns of the table are ignored; with no such keys nothing is dropped.
    pub fn drop_rows_all_nan(&self, keys: &[String]) -> Self {
        let present: Vec<&Vec<f64>> = keys.iter().filter_map(|k| self.columns.get(k)).collect();
        if present.is_empty() {
            return self.clone();
        }
        let keep: Vec<usize> = (0..self.len())
            .filter(|&i| present.iter().any(|col| !col[i].is_nan()))
            .collect();
        self.select_rows(&keep)
    }

    fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            times: rows.iter().map(|&i| self.times[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, col)| (k.clone(), rows.iter().map(|&i| col[i]).collect()))
                .collect(),
            valid_count: rows.iter().map(|&i| self.valid_count[i]).collect(),
        }
    }

    /// Sort by time and merge rows that fall on the same calendar day:
    /// columns by NaN-skipping median, valid counts by sum. A merged row
    /// keeps the earliest timestamp of its group.
    pub fn merge_same_day(&self) -> Self {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.times[i]);

        let mut groups: Vec<Vec<usize>> = Vec::new();
        for i in order {
            match groups.last_mut() {
                Some(group) if self.times[group[0]].date() == self.times[i].date() => group.push(i),
                _ => groups.push(vec![i]),
            }
        }

        Self {
            times: groups.iter().map(|g| self.times[g[0]]).collect(),
            columns: self
                .columns
                .iter()
                .map(|(k, col)| {
                    let merged = groups
                        .iter()
                        .map(|g| nan_median(g.iter().map(|&i| col[i])))
                        .collect();
                    (k.clone(), merged)
                })
                .collect(),
            valid_count: groups
                .iter()
                .map(|g| g.iter().map(|&i| self.valid_count[i]).sum())
                .collect(),
        }
    }
}

/// Median of the finite values, NaN when there are none.
pub fn nan_median(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut v: Vec<f64> = values.into_iter().filter(|x| !x.is_nan()).collect();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(f64::total_cmp);
    let mid = v.len() / 2;
    if v.len() % 2 == 0 {
        (v[mid - 1] + v[mid]) / 2.0
    } else {
        v[mid]
    }
}

/// Contiguous run of calendar days covering a site's observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyAxis {
    start: NaiveDate,
    len: usize,
}

impl DailyAxis {
    /// Axis from the earliest to the latest timestamp, inclusive.
    pub fn spanning(times: &[NaiveDateTime]) -> Option<Self> {
        let first = times.iter().min()?.date();
        let last = times.iter().max()?.date();
        let len = (last - first).num_days() as usize + 1;
        Some(Self { start: first, len })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn date(&self, index: usize) -> NaiveDate {
        self.start + Days::new(index as u64)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        (0..self.len).map(|i| self.date(i))
    }

    /// Signed offset of `date` from the axis start, in days.
    pub fn offset(&self, date: NaiveDate) -> i64 {
        (date - self.start).num_days()
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let offset = self.offset(date);
        (0..self.len as i64).contains(&offset).then_some(offset as usize)
    }

    /// Place per-observation values onto the axis; other days are NaN.
    pub fn reindex(&self, times: &[NaiveDateTime], values: &[f64]) -> Vec<f64> {
        let mut out = vec![f64::NAN; self.len];
        for (t, &v) in times.iter().zip(values) {
            if let Some(i) = self.index_of(t.date()) {
                out[i] = v;
            }
        }
        out
    }

    /// True on days that carry an observation.
    pub fn observed_mask(&self, times: &[NaiveDateTime]) -> Vec<bool> {
        let mut mask = vec![false; self.len];
        for t in times {
            if let Some(i) = self.index_of(t.date()) {
                mask[i] = true;
            }
        }
        mask
    }
}

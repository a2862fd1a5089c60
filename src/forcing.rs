//! External interfaces (§6): forcings, hydro-units, and results sinks, plus the
//! concrete CSV/in-memory adapters the engine ships (§4.12, §1.1).
//!
//! The engine itself never depends on a file format — it only calls these traits —
//! but a usable crate needs at least one real implementation of each, grounded on
//! `gr6j-core`'s own CSV-facing code (`utils::example::load_data`, the run-off CSV
//! writer in `model.rs`).

use crate::error::EngineError;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::Path;

/// One step's worth of meteorological inputs for a single HRU (§6).
#[derive(Debug, Clone, Copy, Default)]
pub struct ForcingValues {
    pub precipitation: f64,
    pub temperature: f64,
    pub pet: f64,
    pub radiation: Option<f64>,
}

/// A set of time series, one per (variable, HRU id), sharing a time axis (§6).
pub trait ForcingsSource {
    fn dates(&self) -> &[NaiveDate];

    /// The forcing values for `hru_id` at `dates()[step]`.
    fn values_at(&self, hru_id: i32, step: usize) -> Result<ForcingValues, EngineError>;

    /// Validates that the source covers `[start, end]` with continuous, regularly
    /// stepped dates (mirroring `gr6j-core`'s own continuity check).
    fn check_covers(&self, start: NaiveDate, end: NaiveDate) -> Result<(), EngineError> {
        let dates = self.dates();
        if dates.is_empty() {
            return Err(EngineError::InvalidArgument("forcings source has no dates".to_string()));
        }
        if dates[0] > start || *dates.last().unwrap() < end {
            return Err(EngineError::InvalidArgument(format!(
                "forcings source does not cover the requested period [{start}, {end}]"
            )));
        }
        for window in dates.windows(2) {
            if (window[1] - window[0]).num_days() != 1 {
                return Err(EngineError::InvalidArgument(
                    "the forcings time vector must have continuous, daily-spaced dates".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// An in-memory forcings source, holding already-parsed Rust values — the shape
/// `gr6j-core::inputs::GR6JModelInputs` takes for its own series (§9.1).
#[derive(Debug, Clone, Default)]
pub struct InMemoryForcingsSource {
    pub dates: Vec<NaiveDate>,
    pub series: HashMap<i32, Vec<ForcingValues>>,
}

impl InMemoryForcingsSource {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self { dates, series: HashMap::new() }
    }

    pub fn with_hru(mut self, hru_id: i32, values: Vec<ForcingValues>) -> Self {
        self.series.insert(hru_id, values);
        self
    }
}

impl ForcingsSource for InMemoryForcingsSource {
    fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    fn values_at(&self, hru_id: i32, step: usize) -> Result<ForcingValues, EngineError> {
        self.series
            .get(&hru_id)
            .and_then(|series| series.get(step))
            .copied()
            .ok_or_else(|| EngineError::NotFound(format!("no forcing data for HRU {hru_id} at step {step}")))
    }
}

/// Reads a CSV with a date column plus one `precipitation_<id>`/`temperature_<id>`/
/// `pet_<id>` column triplet per HRU.
#[derive(Debug, Clone)]
pub struct CsvForcingsSource {
    inner: InMemoryForcingsSource,
}

impl CsvForcingsSource {
    pub fn from_path(path: impl AsRef<Path>, hru_ids: &[i32]) -> Result<Self, EngineError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let mut dates = Vec::new();
        let mut series: HashMap<i32, Vec<ForcingValues>> = hru_ids.iter().map(|&id| (id, Vec::new())).collect();

        for record in reader.records() {
            let record = record?;
            let date = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d")
                .map_err(|e| EngineError::InvalidArgument(e.to_string()))?;
            dates.push(date);

            for &id in hru_ids {
                let precip = column(&headers, &record, &format!("precipitation_{id}"))?;
                let temperature = column(&headers, &record, &format!("temperature_{id}"))?;
                let pet = column(&headers, &record, &format!("pet_{id}"))?;
                series
                    .get_mut(&id)
                    .unwrap()
                    .push(ForcingValues { precipitation: precip, temperature, pet, radiation: None });
            }
        }

        Ok(Self { inner: InMemoryForcingsSource { dates, series } })
    }
}

impl ForcingsSource for CsvForcingsSource {
    fn dates(&self) -> &[NaiveDate] {
        self.inner.dates()
    }

    fn values_at(&self, hru_id: i32, step: usize) -> Result<ForcingValues, EngineError> {
        self.inner.values_at(hru_id, step)
    }
}

fn column(headers: &csv::StringRecord, record: &csv::StringRecord, name: &str) -> Result<f64, EngineError> {
    let index = headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| EngineError::InvalidArgument(format!("missing column '{name}' in forcings CSV")))?;
    record[index].parse::<f64>().map_err(|e| EngineError::InvalidArgument(e.to_string()))
}

/// One row of the hydro-units source (§6).
#[derive(Debug, Clone)]
pub struct HydroUnitRecord {
    pub id: i32,
    pub area: f64,
    pub elevation: f64,
    pub land_cover_fractions: Vec<(String, f64)>,
}

pub trait HydroUnitsSource {
    fn units(&self) -> &[HydroUnitRecord];
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryHydroUnitsSource {
    pub units: Vec<HydroUnitRecord>,
}

impl HydroUnitsSource for InMemoryHydroUnitsSource {
    fn units(&self) -> &[HydroUnitRecord] {
        &self.units
    }
}

/// Reads a CSV of `id,area,elevation,<land cover name>...` columns.
#[derive(Debug, Clone)]
pub struct CsvHydroUnitsSource {
    inner: InMemoryHydroUnitsSource,
}

impl CsvHydroUnitsSource {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let land_cover_names: Vec<String> = headers.iter().skip(3).map(str::to_string).collect();

        let mut units = Vec::new();
        for record in reader.records() {
            let record = record?;
            let id: i32 = record[0].parse().map_err(|_| EngineError::InvalidArgument("bad HRU id".to_string()))?;
            let area: f64 = record[1].parse().map_err(|_| EngineError::InvalidArgument("bad HRU area".to_string()))?;
            let elevation: f64 =
                record[2].parse().map_err(|_| EngineError::InvalidArgument("bad HRU elevation".to_string()))?;

            let mut fractions = Vec::new();
            let mut total = 0.0;
            for (i, name) in land_cover_names.iter().enumerate() {
                let value: f64 = record[3 + i]
                    .parse()
                    .map_err(|_| EngineError::InvalidArgument(format!("bad fraction for '{name}'")))?;
                total += value;
                fractions.push((name.clone(), value));
            }
            if (total - 1.0).abs() > 1e-4 {
                return Err(EngineError::InvalidArgument(format!(
                    "land cover fractions for HRU {id} sum to {total}, expected 1"
                )));
            }

            units.push(HydroUnitRecord { id, area, elevation, land_cover_fractions: fractions });
        }

        Ok(Self { inner: InMemoryHydroUnitsSource { units } })
    }
}

impl HydroUnitsSource for CsvHydroUnitsSource {
    fn units(&self) -> &[HydroUnitRecord] {
        self.inner.units()
    }
}

/// Results sink (§6): aggregated sub-basin channels are universal; the per-HRU and
/// per-land-cover cubes are NetCDF-only, so the CSV adapter leaves those two as
/// `NotImplemented` rather than guessing a CSV shape for them.
pub trait ResultsSink {
    fn record_aggregated(&mut self, date: NaiveDate, label: &str, value: f64) -> Result<(), EngineError>;

    fn record_distributed(&mut self, _date: NaiveDate, _hru_id: i32, _label: &str, _value: f64) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("per-HRU distributed output requires a NetCDF sink".to_string()))
    }

    fn record_land_cover_fraction(
        &mut self,
        _date: NaiveDate,
        _hru_id: i32,
        _land_cover: &str,
        _fraction: f64,
    ) -> Result<(), EngineError> {
        Err(EngineError::NotImplemented("per-HRU land-cover fraction output requires a NetCDF sink".to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryResultsSink {
    pub aggregated: HashMap<String, Vec<(NaiveDate, f64)>>,
}

impl ResultsSink for InMemoryResultsSink {
    fn record_aggregated(&mut self, date: NaiveDate, label: &str, value: f64) -> Result<(), EngineError> {
        self.aggregated.entry(label.to_string()).or_default().push((date, value));
        Ok(())
    }
}

/// Writes the aggregated channels to a single CSV, one column per label plus the
/// date, grounded on `gr6j-core::model`'s `write_run_off_file`.
pub struct CsvResultsSink {
    writer: csv::Writer<std::fs::File>,
    labels: Vec<String>,
    header_written: bool,
}

impl CsvResultsSink {
    pub fn create(path: impl AsRef<Path>, labels: Vec<String>) -> Result<Self, EngineError> {
        let writer = csv::Writer::from_path(path)?;
        Ok(Self { writer, labels, header_written: false })
    }

    fn write_header(&mut self) -> Result<(), EngineError> {
        let mut row = vec!["date".to_string()];
        row.extend(self.labels.clone());
        self.writer.write_record(&row)?;
        self.header_written = true;
        Ok(())
    }
}

impl ResultsSink for CsvResultsSink {
    fn record_aggregated(&mut self, date: NaiveDate, label: &str, value: f64) -> Result<(), EngineError> {
        if !self.header_written {
            self.write_header()?;
        }
        self.writer.write_record([date.to_string(), label.to_string(), value.to_string()])?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_forcings_round_trip() {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let source = InMemoryForcingsSource::new(vec![d0]).with_hru(
            1,
            vec![ForcingValues { precipitation: 5.0, temperature: 1.0, pet: 0.5, radiation: None }],
        );
        let v = source.values_at(1, 0).unwrap();
        assert_eq!(v.precipitation, 5.0);
        assert!(source.values_at(2, 0).is_err());
    }

    #[test]
    fn check_covers_rejects_gaps() {
        let d0 = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let source = InMemoryForcingsSource::new(vec![d0, d2]);
        assert!(source.check_covers(d0, d2).is_err());
    }
}

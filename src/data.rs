use crate::config::{AppConfig, ColumnsConfig};
use crate::error::{DataError, Result};
use crate::types::{Boundaries, PrisonRecord};
use csv::{ReaderBuilder, StringRecord};
use geojson::{GeoJson, Geometry};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::Path;
use tracing::{info, warn};

/// Marker the statistics table uses for a missing value.
pub const NOT_AVAILABLE: &str = "N/A";

pub fn load_data(config: &AppConfig) -> Result<(HashMap<String, PrisonRecord>, Boundaries)> {
    info!("Loading data...");

    // 1. Load CSV Data
    let records = load_records(&config.input.tabular, &config.columns)?;
    info!("{} territories with prison data", records.len());

    // 2. Load GeoJSON
    let boundaries = load_geometry(&config.input.geometry)?;
    info!("{} territories in the GeoJSON", boundaries.collection.features.len());

    Ok((records, boundaries))
}

/// Converts a raw cell into a number.
///
/// Blank cells and `N/A` (surrounding whitespace ignored) are absent. Otherwise
/// the longest leading decimal literal is parsed, so `"12.5 %"` reads as 12.5;
/// text with no leading number, and values that overflow to infinity, are absent.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NOT_AVAILABLE {
        return None;
    }
    let literal = leading_number(trimmed)?;
    literal.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn leading_number(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let scan_digits = |from: usize| {
        let mut at = from;
        while at < bytes.len() && bytes[at].is_ascii_digit() {
            at += 1;
        }
        at
    };

    let mut end = match bytes.first() {
        Some(b'+') | Some(b'-') => 1,
        _ => 0,
    };
    let int_end = scan_digits(end);
    let mut digits = int_end - end;
    end = int_end;

    if bytes.get(end) == Some(&b'.') {
        let frac_end = scan_digits(end + 1);
        digits += frac_end - (end + 1);
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_start = end + 1;
        if matches!(bytes.get(exp_start), Some(b'+') | Some(b'-')) {
            exp_start += 1;
        }
        let exp_end = scan_digits(exp_start);
        if exp_end > exp_start {
            end = exp_end;
        }
    }

    Some(&text[..end])
}

/// Reads the statistics table into a map keyed by trimmed ISO3 code.
/// Rows with a blank code are skipped; a later row wins over an earlier one with the same code.
pub fn load_records(path: &Path, columns: &ColumnsConfig) -> Result<HashMap<String, PrisonRecord>> {
    let file = File::open(path).map_err(|e| DataError::read(path, e))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers().map_err(|e| csv_error(path, e))?.clone();

    // A repeated header name resolves to its last occurrence, for every column.
    let col_indices: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    let column = |name: &str| col_indices.get(name).copied();

    let iso3_idx = column(&columns.iso3)
        .ok_or_else(|| DataError::parse(path, format!("code column '{}' not found in CSV", columns.iso3)))?;

    let idx = RecordColumns {
        name: column(&columns.name),
        iso2: column(&columns.iso2),
        population_prison: column(&columns.population_prison),
        taux_pour_100k: column(&columns.taux_pour_100k),
        taux_occupation: column(&columns.taux_occupation),
        attente_jugement: column(&columns.attente_jugement),
        femmes: column(&columns.femmes),
        etrangers: column(&columns.etrangers),
        population: column(&columns.population),
    };

    let mut records = HashMap::new();

    for result in rdr.records() {
        let row = result.map_err(|e| csv_error(path, e))?;
        let iso3 = row.get(iso3_idx).unwrap_or("").trim();

        if iso3.is_empty() { continue; }

        let record = idx.extract(&row);
        if records.insert(iso3.to_string(), record).is_some() {
            warn!("Duplicate code {} in {:?}, keeping the last row", iso3, path);
        }
    }

    Ok(records)
}

/// Column positions resolved once from the header row.
struct RecordColumns {
    name: Option<usize>,
    iso2: Option<usize>,
    population_prison: Option<usize>,
    taux_pour_100k: Option<usize>,
    taux_occupation: Option<usize>,
    attente_jugement: Option<usize>,
    femmes: Option<usize>,
    etrangers: Option<usize>,
    population: Option<usize>,
}

impl RecordColumns {
    fn extract(&self, row: &StringRecord) -> PrisonRecord {
        let text = |idx: Option<usize>| idx.and_then(|i| row.get(i)).map(str::to_string);
        let number = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(parse_value);

        PrisonRecord {
            name: text(self.name),
            iso2: text(self.iso2),
            population_prison: number(self.population_prison),
            taux_pour_100k: number(self.taux_pour_100k),
            taux_occupation: number(self.taux_occupation),
            attente_jugement: number(self.attente_jugement),
            femmes: number(self.femmes),
            etrangers: number(self.etrangers),
            population: number(self.population),
        }
    }
}

fn csv_error(path: &Path, err: csv::Error) -> DataError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => DataError::read(path, e),
        _ => DataError::parse(path, message),
    }
}

/// Loads the whole boundaries file. Only a FeatureCollection is accepted.
///
/// Each feature's geometry is validated, then set aside untouched in
/// `raw_geometry` so it round-trips byte for byte in value form.
pub fn load_geometry(path: &Path) -> Result<Boundaries> {
    info!("Loading GeoJSON from {:?}...", path);
    let content = fs::read_to_string(path).map_err(|e| DataError::read(path, e))?;

    let mut value: Value = serde_json::from_str(&content).map_err(|e| DataError::parse(path, e))?;

    let mut raw_geometry = Vec::new();
    if let Some(features) = value.get_mut("features").and_then(Value::as_array_mut) {
        for feature in features.iter_mut() {
            let geometry = feature.get_mut("geometry").map(Value::take).unwrap_or(Value::Null);
            if !geometry.is_null() {
                Geometry::from_json_value(geometry.clone()).map_err(|e| DataError::parse(path, e))?;
            }
            raw_geometry.push(geometry);
        }
    }

    let geojson = GeoJson::from_json_value(value).map_err(|e| DataError::parse(path, e))?;

    match geojson {
        GeoJson::FeatureCollection(collection) => Ok(Boundaries { collection, raw_geometry }),
        _ => Err(DataError::parse(path, "GeoJSON must be a FeatureCollection")),
    }
}

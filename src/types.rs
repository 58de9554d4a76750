use geojson::{FeatureCollection, JsonObject};
use serde_json::{Number, Value};

/// One row of the prison statistics table, keyed elsewhere by its ISO3 code.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrisonRecord {
    pub name: Option<String>, // None when the column is absent
    pub iso2: Option<String>,
    pub population_prison: Option<f64>,
    pub taux_pour_100k: Option<f64>,
    pub taux_occupation: Option<f64>,
    pub attente_jugement: Option<f64>,
    pub femmes: Option<f64>,
    pub etrangers: Option<f64>,
    pub population: Option<f64>,
}

impl PrisonRecord {
    pub fn has_data(&self) -> bool {
        self.population_prison.is_some()
    }

    /// The record as GeoJSON properties, in merge order.
    pub fn to_properties(&self) -> JsonObject {
        let mut props = JsonObject::new();
        if let Some(name) = &self.name {
            props.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(iso2) = &self.iso2 {
            props.insert("iso2".to_string(), Value::String(iso2.clone()));
        }

        let stats = [
            ("population_prison", self.population_prison),
            ("taux_pour_100k", self.taux_pour_100k),
            ("taux_occupation", self.taux_occupation),
            ("attente_jugement", self.attente_jugement),
            ("femmes", self.femmes),
            ("etrangers", self.etrangers),
            ("population", self.population),
        ];
        for (key, value) in stats {
            props.insert(key.to_string(), number_value(value));
        }

        props
    }
}

/// Integral values are written as JSON integers so `70000` stays `70000`.
fn number_value(value: Option<f64>) -> Value {
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() < 9_007_199_254_740_992.0 => {
            Value::Number(Number::from(v as i64))
        }
        Some(v) => Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null),
        None => Value::Null,
    }
}

/// The boundaries file as loaded.
///
/// Properties are typed through `collection`; geometry is kept as the source
/// JSON in `raw_geometry`, indexed by input position, so coordinates are
/// written back exactly as read. Features in `collection` carry no geometry.
#[derive(Debug, Clone)]
pub struct Boundaries {
    pub collection: FeatureCollection,
    pub raw_geometry: Vec<Value>,
}

impl Boundaries {
    /// The collection as JSON, each feature's geometry restored from its `id`.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(&self.collection)?;

        if let Some(features) = value.get_mut("features").and_then(Value::as_array_mut) {
            for feature in features.iter_mut().filter_map(Value::as_object_mut) {
                let raw = feature
                    .get("id")
                    .and_then(Value::as_u64)
                    .and_then(|idx| self.raw_geometry.get(idx as usize));
                if let Some(raw) = raw {
                    feature.insert("geometry".to_string(), raw.clone());
                }
            }
        }

        Ok(value)
    }
}

/// Counters collected while joining, reported once the join is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeStats {
    pub matched: usize,
    pub with_data: usize,
    pub resolved_by_name: usize,
    pub substituted: usize,
    /// Effective code (or name, when no code resolved) of each unmatched feature.
    pub unmatched: Vec<String>,
    /// Records no feature joined to.
    pub unused_records: usize,
}

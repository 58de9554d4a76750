use crate::config::{AppConfig, FilterConfig, InputConfig, OverridesConfig};
use crate::types::{MergeStats, PrisonRecord};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, JsonObject};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub const HAS_DATA: &str = "has_data";

/// The code a feature joins on, and how it was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCode {
    pub code: String,
    pub by_name: bool,
    pub substituted: bool,
}

pub fn process_data(
    config: &AppConfig,
    records: &HashMap<String, PrisonRecord>,
    collection: &mut FeatureCollection,
) -> MergeStats {
    let stats = join_features(config, records, collection);
    info!("{} territories merged", stats.matched);

    let before = collection.features.len();
    filter_excluded(&config.filter, &config.input.code_field, collection);
    info!(
        "{} territories in the final GeoJSON ({} excluded)",
        collection.features.len(),
        before - collection.features.len()
    );

    stats
}

/// Joins every feature against `records`, sets `has_data`, and numbers features by position.
pub fn join_features(
    config: &AppConfig,
    records: &HashMap<String, PrisonRecord>,
    collection: &mut FeatureCollection,
) -> MergeStats {
    let mut stats = MergeStats::default();
    let mut used: HashSet<&str> = HashSet::new();

    for (idx, feature) in collection.features.iter_mut().enumerate() {
        let props = feature.properties.get_or_insert_with(JsonObject::new);
        let resolved = resolve_code(props, &config.input, &config.overrides);

        let matched = resolved
            .as_ref()
            .and_then(|r| records.get_key_value(r.code.as_str()));

        match matched {
            Some((code, record)) => {
                merge_record(props, record);
                used.insert(code.as_str());
                stats.matched += 1;
                if record.has_data() {
                    stats.with_data += 1;
                }
            }
            None => {
                props.insert(HAS_DATA.to_string(), Value::Bool(false));
                let label = resolved
                    .as_ref()
                    .map(|r| r.code.clone())
                    .or_else(|| property_text(props, &config.input.name_field))
                    .unwrap_or_else(|| format!("feature #{}", idx));
                debug!("No prison data for {}", label);
                stats.unmatched.push(label);
            }
        }

        if let Some(r) = &resolved {
            if r.by_name {
                stats.resolved_by_name += 1;
                debug!("Feature #{} resolved to {} by name", idx, r.code);
            }
            if r.substituted {
                stats.substituted += 1;
                debug!("Feature #{} joined through substituted code {}", idx, r.code);
            }
        }

        feature.id = Some(Id::Number(idx.into()));
    }

    stats.unused_records = records.len() - used.len();
    info!(
        "Join: {} matched ({} with data), {} unmatched, {} resolved by name, {} substituted",
        stats.matched,
        stats.with_data,
        stats.unmatched.len(),
        stats.resolved_by_name,
        stats.substituted
    );

    stats
}

/// Works out the tabular code for a feature's properties.
///
/// The primary code is used unless it is missing, empty or the sentinel, in
/// which case the name override table is consulted. The result then goes
/// through the code override table.
pub fn resolve_code(
    props: &JsonObject,
    input: &InputConfig,
    overrides: &OverridesConfig,
) -> Option<ResolvedCode> {
    let (code, by_name) = match property_text(props, &input.code_field) {
        Some(code) if code != input.sentinel_code => (code, false),
        _ => {
            let name = property_text(props, &input.name_field)?;
            (overrides.name_to_code.get(&name)?.clone(), true)
        }
    };

    match overrides.code_to_code.get(&code) {
        Some(mapped) => Some(ResolvedCode { code: mapped.clone(), by_name, substituted: true }),
        None => Some(ResolvedCode { code, by_name, substituted: false }),
    }
}

/// Copies record fields over the properties, then sets `has_data`.
pub fn merge_record(props: &mut JsonObject, record: &PrisonRecord) {
    for (key, value) in record.to_properties() {
        props.insert(key, value);
    }
    props.insert(HAS_DATA.to_string(), Value::Bool(record.has_data()));
}

/// Drops excluded territories, keeping the order (and ids) of the rest.
pub fn filter_excluded(filter: &FilterConfig, code_field: &str, collection: &mut FeatureCollection) {
    collection
        .features
        .retain(|feature| !is_excluded(filter, code_field, feature));
}

pub fn is_excluded(filter: &FilterConfig, code_field: &str, feature: &Feature) -> bool {
    let Some(props) = feature.properties.as_ref() else {
        return false;
    };

    if let Some(code) = property_text(props, code_field) {
        if filter.excluded_codes.iter().any(|c| *c == code) {
            return true;
        }
    }

    let display_name = filter
        .name_fields
        .iter()
        .find_map(|field| match props.get(field) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
            _ => None,
        });

    match display_name {
        Some(name) => filter.excluded_names.iter().any(|n| n == name),
        None => false,
    }
}

/// String properties as-is, numeric ones in decimal form; empty strings count as missing.
fn property_text(props: &JsonObject, field: &str) -> Option<String> {
    match props.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

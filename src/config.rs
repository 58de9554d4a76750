use std::collections::HashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub columns: ColumnsConfig,
    pub overrides: OverridesConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub tabular: PathBuf,
    pub geometry: PathBuf,
    pub code_field: String, // GeoJSON property holding the ISO3 code
    pub name_field: String, // GeoJSON property used for name overrides
    pub sentinel_code: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tabular: PathBuf::from("public/conditionscarcéralesparpays.csv"),
            geometry: PathBuf::from("public/world-boundaries.geojson"),
            code_field: "ISO_A3".to_string(),
            name_field: "NAME".to_string(),
            sentinel_code: "-99".to_string(),
        }
    }
}

/// CSV header names, matched exactly.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnsConfig {
    pub iso3: String,
    pub iso2: String,
    pub name: String,
    pub population_prison: String,
    pub taux_pour_100k: String,
    pub taux_occupation: String,
    pub attente_jugement: String,
    pub femmes: String,
    pub etrangers: String,
    pub population: String,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            iso3: "Code_ISO3".to_string(),
            iso2: "Code_ISO2".to_string(),
            name: "Pays / Nations".to_string(),
            population_prison: "Population carcérale totale".to_string(),
            taux_pour_100k: "Population carcérale pour 100 000 habitants".to_string(),
            taux_occupation: "Taux d'occupation (%)".to_string(),
            attente_jugement: "Détenus en attente de jugement (%)".to_string(),
            femmes: "Femmes détenues (%)".to_string(),
            etrangers: "Prisonniers étrangers (%)".to_string(),
            population: "Population_2023".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OverridesConfig {
    /// Feature name -> ISO3, for features whose code is missing or the sentinel.
    pub name_to_code: HashMap<String, String>,
    /// Geometry-source ISO3 -> tabular-source ISO3.
    pub code_to_code: HashMap<String, String>,
}

impl Default for OverridesConfig {
    fn default() -> Self {
        let name_to_code = [
            ("France", "FRA"),
            ("Norway", "NOR"),
            ("Kosovo", "XKX"),
            ("Somaliland", "SOM"),
        ];
        let code_to_code = [("XKX", "XXK"), ("PSE", "PSE")];

        Self {
            name_to_code: name_to_code.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            code_to_code: code_to_code.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilterConfig {
    pub excluded_codes: Vec<String>,
    pub excluded_names: Vec<String>,
    /// Properties checked in order; the first non-empty string is the display name.
    pub name_fields: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_codes: vec!["ATA".to_string()],
            excluded_names: vec!["Baikonur".to_string()],
            name_fields: vec!["name".to_string(), "NAME".to_string()],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub geometry: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            geometry: PathBuf::from("public/zonzon/world-prison-data.geojson"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PathsConfig {
    pub index_html: PathBuf,
    pub absolute_prefix: String,
    pub relative_prefix: String,
    pub attributes: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            index_html: PathBuf::from("dist/index.html"),
            absolute_prefix: "/assets/".to_string(),
            relative_prefix: "./assets/".to_string(),
            attributes: vec!["href".to_string(), "src".to_string()],
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML configuration: {:?}", path))?;
        Ok(config)
    }

    /// Loads `path`, or the built-in defaults when `path` is the implicit
    /// default and does not exist.
    pub fn load_or_default(path: &Path, explicit: bool) -> Result<Self> {
        if !explicit && !path.exists() {
            info!("No config file at {:?}, using built-in defaults", path);
            return Ok(Self::default());
        }
        Self::load_from_file(path)
    }
}

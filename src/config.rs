// ⚙️ Pipeline Configuration - fixed per-family setup, overridable as data
//
// Defaults are compiled in. A `pipelines.json` next to the binary's working
// directory replaces any subset of them; missing keys keep their defaults.

use crate::emit::{CodeRename, SyntheticCodePolicy};
use crate::entities::country::ReferenceColumns;
use crate::merge::{MetricField, YearRange};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Fixed location of the optional override file
pub const CONFIG_FILE: &str = "pipelines.json";

// ============================================================================
// PIPELINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding every input file
    pub data_dir: PathBuf,

    /// Directory receiving every output file
    pub output_dir: PathBuf,

    pub lives_saved: LivesSavedConfig,
    pub malaria: MalariaConfig,
    pub tuberculosis: TuberculosisConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("out"),
            lives_saved: LivesSavedConfig::default(),
            malaria: MalariaConfig::default(),
            tuberculosis: TuberculosisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        serde_json::from_str(&content).context("Failed to parse pipeline config JSON")
    }

    /// The override file if it exists, otherwise the compiled-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            info!("using pipeline config {}", path.as_ref().display());
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn input_path(&self, file: &str) -> PathBuf {
        self.data_dir.join(file)
    }

    pub fn output_path(&self, file: &str) -> PathBuf {
        self.output_dir.join(file)
    }
}

// ============================================================================
// LIVES SAVED (COVID vaccination)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticEntity {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LivesSavedConfig {
    pub countries_file: String,
    pub reference_columns: ReferenceColumns,

    /// Curated names on top of the reference table's alternates, by code
    pub extra_alternate_names: BTreeMap<String, Vec<String>>,

    /// Pseudo-entities added to the reference before merging
    pub synthetic_entities: Vec<SyntheticEntity>,

    pub coverage_file: String,
    pub coverage_code_column: String,
    pub coverage_date_column: String,
    pub coverage_value_column: String,

    pub deaths_file: String,
    /// The name column has a blank header in the published table
    pub deaths_name_column: String,
    pub deaths_fields: Vec<MetricField>,

    pub synthetic_codes: SyntheticCodePolicy,
    pub output_file: String,
}

impl Default for LivesSavedConfig {
    fn default() -> Self {
        LivesSavedConfig {
            countries_file: "countries.csv".to_string(),
            reference_columns: ReferenceColumns::default(),
            extra_alternate_names: BTreeMap::new(),
            synthetic_entities: vec![SyntheticEntity {
                code: "OWID_WRL".to_string(),
                name: "World".to_string(),
            }],
            coverage_file: "share-people-vaccinated-covid.csv".to_string(),
            coverage_code_column: "Code".to_string(),
            coverage_date_column: "Day".to_string(),
            coverage_value_column: "people_vaccinated_per_hundred".to_string(),
            deaths_file: "reported_death_summary_table.csv".to_string(),
            deaths_name_column: " ".to_string(),
            deaths_fields: vec![
                MetricField::new("Total Deaths,with vaccinations", "deaths"),
                MetricField::new("Deaths Averted by Vaccinations", "averted"),
                MetricField::new("Deaths Averted by Vaccinations Per 10k People", "per10k"),
            ],
            synthetic_codes: SyntheticCodePolicy {
                excluded_prefix: Some("OWID_".to_string()),
                renames: vec![CodeRename {
                    from: "OWID_WRL".to_string(),
                    to: "WLD".to_string(),
                    display_name: Some("World".to_string()),
                }],
            },
            output_file: "lives-saved.csv".to_string(),
        }
    }
}

// ============================================================================
// MALARIA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MalariaConfig {
    /// World Bank incidence workbook, one column per year
    pub incidence_file: String,
    pub incidence_code_column: String,
    pub incidence_type: String,

    /// WHO estimated cases, one row per (country, year)
    pub cases_file: String,
    pub cases_code_column: String,
    pub cases_year_column: String,
    pub cases_value_column: String,
    pub cases_type: String,

    pub years: YearRange,
    pub output_file: String,
}

impl Default for MalariaConfig {
    fn default() -> Self {
        MalariaConfig {
            incidence_file: "wb-malaria.xlsx".to_string(),
            incidence_code_column: "Country Code".to_string(),
            incidence_type: "incidence".to_string(),
            cases_file: "who-malaria-cases.csv".to_string(),
            cases_code_column: "SpatialDimValueCode".to_string(),
            cases_year_column: "Period".to_string(),
            cases_value_column: "FactValueNumeric".to_string(),
            cases_type: "cases".to_string(),
            years: YearRange::new(2000, 2020),
            output_file: "incidence.csv".to_string(),
        }
    }
}

// ============================================================================
// TUBERCULOSIS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuberculosisConfig {
    pub burden_file: String,
    pub code_column: String,
    pub name_column: String,
    pub year_column: String,
    /// Estimate columns → output `type` values
    pub metrics: Vec<MetricField>,
    pub years: YearRange,
    pub output_file: String,
}

impl Default for TuberculosisConfig {
    fn default() -> Self {
        TuberculosisConfig {
            burden_file: "TB_burden_countries_2023-06-23.csv".to_string(),
            code_column: "iso3".to_string(),
            name_column: "country".to_string(),
            year_column: "year".to_string(),
            metrics: vec![
                MetricField::new("e_inc_100k", "per100k"),
                MetricField::new("e_inc_num", "numerical"),
            ],
            years: YearRange::new(2000, 2021),
            output_file: "tb-cases_2021.csv".to_string(),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

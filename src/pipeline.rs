// 🚚 Dataset Families - load → reconcile → merge → emit, once per family
//
// Each family owns its tables for the duration of one run. All inputs are
// loaded before anything is written, so an unreadable input leaves the
// previous output untouched.

use crate::config::{LivesSavedConfig, MalariaConfig, PipelineConfig, TuberculosisConfig};
use crate::emit::{self, Column, ColumnSpec, SyntheticCodePolicy};
use crate::entities::country::CountryRegistry;
use crate::merge::{AttachmentPolicy, MetricField, Merger, ReconciledEntity, SecondaryDataset, SeriesLayout};
use crate::reconciliation::{build_canonical_key_space, KeyStrategy, ReconciliationReport};
use crate::source::{self, SourceTable};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

// ============================================================================
// FAMILY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    LivesSaved,
    Malaria,
    Tuberculosis,
}

impl Family {
    pub fn name(&self) -> &'static str {
        match self {
            Family::LivesSaved => "lives-saved",
            Family::Malaria => "malaria",
            Family::Tuberculosis => "tuberculosis",
        }
    }

    pub fn all() -> [Family; 3] {
        [Family::LivesSaved, Family::Malaria, Family::Tuberculosis]
    }

    pub fn from_name(name: &str) -> Result<Family> {
        Family::all()
            .into_iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown dataset family: {} (expected one of: lives-saved, malaria, tuberculosis)",
                    name
                )
            })
    }
}

/// Result of one family run
#[derive(Debug, Clone)]
pub struct FamilyOutput {
    pub family: Family,
    pub path: PathBuf,
    pub rows: usize,
    /// SHA-256 of the written document
    pub digest: String,
    pub report: ReconciliationReport,
}

impl FamilyOutput {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} rows → {} (sha256 {}), {}",
            self.family.name(),
            self.rows,
            self.path.display(),
            &self.digest[..12],
            self.report.summary()
        )
    }
}

/// Merged entities ready for emission
#[derive(Debug, Clone)]
pub struct Assembled {
    pub entities: Vec<ReconciledEntity>,
    pub spec: ColumnSpec,
    pub report: ReconciliationReport,
}

impl Assembled {
    pub fn document(&self) -> Result<String> {
        emit::emit(&self.entities, &self.spec)
    }
}

// ============================================================================
// RUNNERS
// ============================================================================

pub fn run_family(family: Family, config: &PipelineConfig) -> Result<FamilyOutput> {
    info!("running {}", family.name());
    match family {
        Family::LivesSaved => run_lives_saved(config),
        Family::Malaria => run_malaria(config),
        Family::Tuberculosis => run_tuberculosis(config),
    }
}

/// Every family in order; the first fatal error stops the run.
pub fn run_all(config: &PipelineConfig) -> Result<Vec<FamilyOutput>> {
    Family::all()
        .into_iter()
        .map(|family| run_family(family, config))
        .collect()
}

pub fn run_lives_saved(config: &PipelineConfig) -> Result<FamilyOutput> {
    let cfg = &config.lives_saved;
    let countries = source::load_detected(&config.input_path(&cfg.countries_file))?;
    let coverage = source::load_detected(&config.input_path(&cfg.coverage_file))?;
    let deaths = source::load_detected(&config.input_path(&cfg.deaths_file))?;

    let assembled = assemble_lives_saved(cfg, &countries, coverage, deaths);
    finish(Family::LivesSaved, config.output_path(&cfg.output_file), assembled)
}

pub fn run_malaria(config: &PipelineConfig) -> Result<FamilyOutput> {
    let cfg = &config.malaria;
    let incidence = source::load_detected(&config.input_path(&cfg.incidence_file))?;
    let cases = source::load_detected(&config.input_path(&cfg.cases_file))?;

    let assembled = assemble_malaria(cfg, incidence, cases);
    finish(Family::Malaria, config.output_path(&cfg.output_file), assembled)
}

pub fn run_tuberculosis(config: &PipelineConfig) -> Result<FamilyOutput> {
    let cfg = &config.tuberculosis;
    let burden = source::load_detected(&config.input_path(&cfg.burden_file))?;

    let assembled = assemble_tuberculosis(cfg, burden);
    finish(Family::Tuberculosis, config.output_path(&cfg.output_file), assembled)
}

fn finish(family: Family, path: PathBuf, assembled: Assembled) -> Result<FamilyOutput> {
    let document = assembled.document()?;
    let rows = emit::rows(&assembled.entities, &assembled.spec).len();
    emit::write_output(&path, &document)?;

    let output = FamilyOutput {
        family,
        path,
        rows,
        digest: emit::digest(&document),
        report: assembled.report,
    };
    info!("{}", output.summary());
    Ok(output)
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Reference countries + latest coverage + composite death estimates
pub fn assemble_lives_saved(
    cfg: &LivesSavedConfig,
    countries: &SourceTable,
    coverage: SourceTable,
    deaths: SourceTable,
) -> Assembled {
    let mut registry = CountryRegistry::from_table(countries, &cfg.reference_columns);
    for entity in &cfg.synthetic_entities {
        registry.add_synthetic(&entity.code, &entity.name);
    }
    for (code, names) in &cfg.extra_alternate_names {
        for name in names {
            if let Err(e) = registry.add_alternate_name(code, name) {
                warn!("{:#}", e);
            }
        }
    }

    let keys = build_canonical_key_space(
        Some(&registry),
        &[(&coverage, cfg.coverage_code_column.as_str())],
    );

    let datasets = vec![
        (
            SecondaryDataset::new(coverage, KeyStrategy::code(&cfg.coverage_code_column)),
            AttachmentPolicy::LatestScalar {
                date_column: cfg.coverage_date_column.clone(),
                value_column: cfg.coverage_value_column.clone(),
                metric: "coverage".to_string(),
            },
        ),
        (
            SecondaryDataset::new(deaths, KeyStrategy::name(&cfg.deaths_name_column))
                .with_display_name(&cfg.deaths_name_column),
            AttachmentPolicy::CompositeNumericFields {
                fields: cfg.deaths_fields.clone(),
            },
        ),
    ];

    let outcome = Merger::new(Some(&registry)).merge(&keys, &datasets);

    let mut spec = ColumnSpec::per_entity()
        .column("ISO3", Column::Code)
        .column("country", Column::DisplayName);
    for (_, policy) in &datasets {
        for metric in policy.metrics() {
            spec = spec.column(&metric, Column::Scalar(metric.clone()));
        }
    }

    Assembled {
        entities: cfg.synthetic_codes.apply(outcome.entities),
        spec,
        report: outcome.report,
    }
}

/// Wide incidence workbook + long WHO case estimates, one row per type
pub fn assemble_malaria(cfg: &MalariaConfig, incidence: SourceTable, cases: SourceTable) -> Assembled {
    let keys = build_canonical_key_space(
        None,
        &[
            (&incidence, cfg.incidence_code_column.as_str()),
            (&cases, cfg.cases_code_column.as_str()),
        ],
    );

    let datasets = vec![
        (
            SecondaryDataset::new(incidence, KeyStrategy::code(&cfg.incidence_code_column)),
            AttachmentPolicy::FullYearSeries {
                years: cfg.years,
                layout: SeriesLayout::Wide {
                    metric: cfg.incidence_type.clone(),
                },
            },
        ),
        (
            SecondaryDataset::new(cases, KeyStrategy::code(&cfg.cases_code_column)),
            AttachmentPolicy::FullYearSeries {
                years: cfg.years,
                layout: SeriesLayout::Long {
                    year_column: cfg.cases_year_column.clone(),
                    metrics: vec![MetricField::new(&cfg.cases_value_column, &cfg.cases_type)],
                },
            },
        ),
    ];

    let outcome = Merger::new(None).merge(&keys, &datasets);

    let spec = ColumnSpec::per_metric_type(&[cfg.incidence_type.as_str(), cfg.cases_type.as_str()])
        .column("Country Code", Column::Code)
        .column("type", Column::MetricType)
        .year_columns(cfg.years);

    Assembled {
        entities: SyntheticCodePolicy::default().apply(outcome.entities),
        spec,
        report: outcome.report,
    }
}

/// WHO burden estimates, one row per (country, estimate)
pub fn assemble_tuberculosis(cfg: &TuberculosisConfig, burden: SourceTable) -> Assembled {
    let keys = build_canonical_key_space(None, &[(&burden, cfg.code_column.as_str())]);

    let datasets = vec![(
        SecondaryDataset::new(burden, KeyStrategy::code(&cfg.code_column))
            .with_display_name(&cfg.name_column),
        AttachmentPolicy::FullYearSeries {
            years: cfg.years,
            layout: SeriesLayout::Long {
                year_column: cfg.year_column.clone(),
                metrics: cfg.metrics.clone(),
            },
        },
    )];

    let outcome = Merger::new(None).merge(&keys, &datasets);

    let metric_types: Vec<&str> = cfg.metrics.iter().map(|m| m.metric.as_str()).collect();
    let spec = ColumnSpec::per_metric_type(&metric_types)
        .column("Country Name", Column::DisplayName)
        .column("Country Code", Column::Code)
        .column("type", Column::MetricType)
        .year_columns(cfg.years);

    Assembled {
        entities: SyntheticCodePolicy::default().apply(outcome.entities),
        spec,
        report: outcome.report,
    }
}

// ============================================================================
// TESTS
// ============================================================================

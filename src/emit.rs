// 📤 Wide-Table Emitter - entities → fixed-column delimited text
//
// Rows are always sorted by canonical code. Each row is built as a list of
// fields and handed to the CSV writer once, so there are no stray delimiters
// and fields containing commas are quoted.

use crate::entities::country::normalize_code;
use crate::merge::{ReconciledEntity, YearRange};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

// ============================================================================
// COLUMN SPEC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Column {
    Code,
    DisplayName,
    /// Discriminator column in per-metric-type layouts
    MetricType,
    Scalar(String),
    Year(i32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowLayout {
    /// One row per entity
    PerEntity,

    /// One row per (entity, metric type) the entity actually has
    PerMetricType { metric_types: Vec<String> },
}

/// Ordered (header, column) pairs plus the row layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub columns: Vec<(String, Column)>,
    pub layout: RowLayout,
}

impl ColumnSpec {
    pub fn per_entity() -> Self {
        ColumnSpec {
            columns: Vec::new(),
            layout: RowLayout::PerEntity,
        }
    }

    pub fn per_metric_type(metric_types: &[&str]) -> Self {
        ColumnSpec {
            columns: Vec::new(),
            layout: RowLayout::PerMetricType {
                metric_types: metric_types.iter().map(|m| m.to_string()).collect(),
            },
        }
    }

    pub fn column(mut self, header: &str, column: Column) -> Self {
        self.columns.push((header.to_string(), column));
        self
    }

    /// Append one column per year, headed by the year itself
    pub fn year_columns(mut self, years: YearRange) -> Self {
        for year in years.years() {
            self.columns.push((year.to_string(), Column::Year(year)));
        }
        self
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|(header, _)| header.as_str()).collect()
    }
}

// ============================================================================
// SYNTHETIC CODE POLICY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRename {
    pub from: String,
    pub to: String,
    pub display_name: Option<String>,
}

/// Emission-time handling of provenance-prefixed placeholder codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticCodePolicy {
    /// Codes with this prefix are dropped unless renamed
    pub excluded_prefix: Option<String>,
    pub renames: Vec<CodeRename>,
}

impl SyntheticCodePolicy {
    /// Rename, then drop excluded and empty codes.
    ///
    /// If a rename lands on a code that already exists, the existing entity
    /// is kept and the renamed one dropped.
    pub fn apply(&self, entities: Vec<ReconciledEntity>) -> Vec<ReconciledEntity> {
        let mut kept: Vec<(ReconciledEntity, bool)> = Vec::new();

        for mut entity in entities {
            let code = normalize_code(&entity.code);

            if let Some(rename) = self.renames.iter().find(|r| normalize_code(&r.from) == code) {
                debug!("renaming {} to {}", code, rename.to);
                entity.code = normalize_code(&rename.to);
                if let Some(name) = &rename.display_name {
                    entity.display_name = Some(name.clone());
                }
                kept.push((entity, true));
                continue;
            }

            if code.is_empty() {
                continue;
            }
            if let Some(prefix) = &self.excluded_prefix {
                if code.starts_with(prefix.as_str()) {
                    debug!("excluding synthetic code {}", code);
                    continue;
                }
            }
            kept.push((entity, false));
        }

        kept.sort_by(|(a, a_renamed), (b, b_renamed)| {
            a.code.cmp(&b.code).then(a_renamed.cmp(b_renamed))
        });
        kept.dedup_by(|(later, _), (earlier, _)| {
            let duplicate = later.code == earlier.code;
            if duplicate {
                warn!("renamed code {} collides with an existing entity, dropped", later.code);
            }
            duplicate
        });

        kept.into_iter().map(|(entity, _)| entity).collect()
    }
}

// ============================================================================
// EMITTER
// ============================================================================

/// Project entities onto a column spec and serialise as CSV.
pub fn emit(entities: &[ReconciledEntity], spec: &ColumnSpec) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(spec.headers())
        .context("Failed to write header row")?;

    for fields in rows(entities, spec) {
        writer
            .write_record(&fields)
            .context("Failed to write output row")?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow!("Failed to flush CSV writer: {}", e.error()))?;

    String::from_utf8(bytes).context("Output is not valid UTF-8")
}

/// Field lists for every output row, in emission order
pub fn rows(entities: &[ReconciledEntity], spec: &ColumnSpec) -> Vec<Vec<String>> {
    let mut sorted: Vec<&ReconciledEntity> = entities.iter().collect();
    sorted.sort_by(|a, b| a.code.cmp(&b.code));

    let mut out = Vec::new();
    for entity in sorted {
        match &spec.layout {
            RowLayout::PerEntity => out.push(fields(entity, None, spec)),
            RowLayout::PerMetricType { metric_types } => {
                for metric_type in metric_types {
                    if entity.has_attribute(metric_type) {
                        out.push(fields(entity, Some(metric_type.as_str()), spec));
                    }
                }
            }
        }
    }
    out
}

fn fields(entity: &ReconciledEntity, metric_type: Option<&str>, spec: &ColumnSpec) -> Vec<String> {
    let series = metric_type.and_then(|m| entity.series(m));

    spec.columns
        .iter()
        .map(|(_, column)| match column {
            Column::Code => entity.code.clone(),
            Column::DisplayName => entity.display_name.clone().unwrap_or_default(),
            Column::MetricType => metric_type.unwrap_or_default().to_string(),
            Column::Scalar(metric) => entity.scalar(metric).to_string(),
            Column::Year(year) => series.map(|s| s.get(*year).to_string()).unwrap_or_default(),
        })
        .collect()
}

// ============================================================================
// OUTPUT
// ============================================================================

/// SHA-256 of a document, hex encoded
pub fn digest(document: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replace the file at `path` with `document`.
///
/// Written next to the target and renamed into place, so a failed write never
/// leaves a partial output behind.
pub fn write_output(path: &Path, document: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
    }

    let staging = temp_path(path);
    fs::write(&staging, document)
        .with_context(|| format!("Failed to write output file: {}", staging.display()))?;
    fs::rename(&staging, path)
        .with_context(|| format!("Failed to move output into place: {}", path.display()))?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

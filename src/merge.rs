// 🔗 Merger - fold secondary datasets onto canonical entities
//
// Three attachment policies:
//   latest-scalar             most recent dated value per entity
//   composite-numeric-fields  several leading-number fields from one row
//   full-year-series          year → value per metric, gaps kept as Missing
//
// Entities are keyed by canonical code in a BTreeMap, so the order datasets
// are merged in never changes the order entities come out in.

use crate::numeric::Value;
use crate::reconciliation::{IdentityReconciler, KeySpace, KeyStrategy, ReconciliationReport, Resolution};
use crate::entities::country::CountryRegistry;
use crate::source::{SourceRow, SourceTable};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use tracing::debug;

// ============================================================================
// YEAR SERIES
// ============================================================================

/// Inclusive year range declared per dataset family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub first: i32,
    pub last: i32,
}

impl YearRange {
    pub fn new(first: i32, last: i32) -> Self {
        YearRange { first, last }
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.first..=self.last).contains(&year)
    }

    pub fn years(&self) -> RangeInclusive<i32> {
        self.first..=self.last
    }
}

/// Year → value over a fixed range. Years never set read as Missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearSeries {
    range: YearRange,
    values: BTreeMap<i32, Value>,
}

impl YearSeries {
    pub fn new(range: YearRange) -> Self {
        YearSeries {
            range,
            values: BTreeMap::new(),
        }
    }

    pub fn range(&self) -> YearRange {
        self.range
    }

    /// Record a value for a year unless that year was already recorded.
    ///
    /// Returns false for out-of-range years and already-recorded years.
    pub fn set_first(&mut self, year: i32, value: Value) -> bool {
        if !self.range.contains(year) || self.values.contains_key(&year) {
            return false;
        }
        self.values.insert(year, value);
        true
    }

    pub fn get(&self, year: i32) -> Value {
        self.values.get(&year).copied().unwrap_or(Value::Missing)
    }

    /// Every year of the range, in order
    pub fn iter(&self) -> impl Iterator<Item = (i32, Value)> + '_ {
        self.range.years().map(move |year| (year, self.get(year)))
    }

    /// Years holding an actual number
    pub fn populated_years(&self) -> Vec<i32> {
        self.iter()
            .filter(|(_, value)| !value.is_missing())
            .map(|(year, _)| year)
            .collect()
    }
}

// ============================================================================
// RECONCILED ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Scalar(Value),
    Series(YearSeries),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciledEntity {
    pub code: String,
    pub display_name: Option<String>,
    pub attributes: BTreeMap<String, Attribute>,
}

impl ReconciledEntity {
    pub fn new(code: &str) -> Self {
        ReconciledEntity {
            code: code.to_string(),
            display_name: None,
            attributes: BTreeMap::new(),
        }
    }

    /// First non-empty name wins
    pub fn set_display_name_if_absent(&mut self, name: &str) {
        let name = name.trim();
        if self.display_name.is_none() && !name.is_empty() {
            self.display_name = Some(name.to_string());
        }
    }

    pub fn attach(&mut self, metric: &str, attribute: Attribute) {
        self.attributes.insert(metric.to_string(), attribute);
    }

    /// Scalar value of a metric; Missing when absent or not a scalar
    pub fn scalar(&self, metric: &str) -> Value {
        match self.attributes.get(metric) {
            Some(Attribute::Scalar(value)) => *value,
            _ => Value::Missing,
        }
    }

    pub fn series(&self, metric: &str) -> Option<&YearSeries> {
        match self.attributes.get(metric) {
            Some(Attribute::Series(series)) => Some(series),
            _ => None,
        }
    }

    pub fn has_attribute(&self, metric: &str) -> bool {
        self.attributes.contains_key(metric)
    }
}

// ============================================================================
// ATTACHMENT POLICY
// ============================================================================

/// Source column → metric name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricField {
    pub column: String,
    pub metric: String,
}

impl MetricField {
    pub fn new(column: &str, metric: &str) -> Self {
        MetricField {
            column: column.to_string(),
            metric: metric.to_string(),
        }
    }
}

/// How a year series is laid out in its source table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SeriesLayout {
    /// One row per (code, year); each metric reads its own value column
    Long {
        year_column: String,
        metrics: Vec<MetricField>,
    },

    /// One row per code with one column per year, named by the year
    Wide { metric: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttachmentPolicy {
    LatestScalar {
        date_column: String,
        value_column: String,
        metric: String,
    },
    CompositeNumericFields {
        fields: Vec<MetricField>,
    },
    FullYearSeries {
        years: YearRange,
        layout: SeriesLayout,
    },
}

impl AttachmentPolicy {
    pub fn name(&self) -> &str {
        match self {
            AttachmentPolicy::LatestScalar { .. } => "latest-scalar",
            AttachmentPolicy::CompositeNumericFields { .. } => "composite-numeric-fields",
            AttachmentPolicy::FullYearSeries { .. } => "full-year-series",
        }
    }

    /// Metric names this policy writes
    pub fn metrics(&self) -> Vec<String> {
        match self {
            AttachmentPolicy::LatestScalar { metric, .. } => vec![metric.clone()],
            AttachmentPolicy::CompositeNumericFields { fields } => {
                fields.iter().map(|f| f.metric.clone()).collect()
            }
            AttachmentPolicy::FullYearSeries { layout, .. } => match layout {
                SeriesLayout::Long { metrics, .. } => {
                    metrics.iter().map(|f| f.metric.clone()).collect()
                }
                SeriesLayout::Wide { metric } => vec![metric.clone()],
            },
        }
    }
}

// ============================================================================
// SECONDARY DATASET
// ============================================================================

#[derive(Debug, Clone)]
pub struct SecondaryDataset {
    pub table: SourceTable,
    pub key: KeyStrategy,

    /// Column whose (trimmed) text becomes the entity's display name
    pub display_name_column: Option<String>,
}

impl SecondaryDataset {
    pub fn new(table: SourceTable, key: KeyStrategy) -> Self {
        SecondaryDataset {
            table,
            key,
            display_name_column: None,
        }
    }

    pub fn with_display_name(mut self, column: &str) -> Self {
        self.display_name_column = Some(column.to_string());
        self
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }
}

// ============================================================================
// MERGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// One entity per canonical code, ordered by code
    pub entities: Vec<ReconciledEntity>,
    pub report: ReconciliationReport,
}

pub struct Merger<'a> {
    reference: Option<&'a CountryRegistry>,
}

impl<'a> Merger<'a> {
    pub fn new(reference: Option<&'a CountryRegistry>) -> Self {
        Merger { reference }
    }

    /// Build one entity per canonical code and fold every dataset onto them.
    pub fn merge(
        &self,
        keys: &KeySpace,
        reconcilers: &[(SecondaryDataset, AttachmentPolicy)],
    ) -> MergeOutcome {
        let mut report = ReconciliationReport::new();
        let mut entities: BTreeMap<String, ReconciledEntity> = keys
            .codes()
            .map(|code| (code.to_string(), ReconciledEntity::new(code)))
            .collect();

        if let Some(reference) = self.reference {
            for code in keys.codes().filter(|code| !reference.contains_code(code)) {
                report.code_unreferenced(code);
            }
        }

        let reconciler = IdentityReconciler::new(keys, self.reference);

        for (dataset, policy) in reconcilers {
            debug!("merging {} ({})", dataset.name(), policy.name());
            let groups = group_rows(&reconciler, dataset, &mut report);

            for (code, rows) in &groups {
                // Codes outside the reference stay as bare rows
                if !self.is_referenced(code) {
                    continue;
                }
                let Some(entity) = entities.get_mut(code) else {
                    continue;
                };

                if let Some(column) = &dataset.display_name_column {
                    entity.set_display_name_if_absent(&rows[0].text(column));
                }

                attach(entity, rows, policy, dataset.name(), &mut report);
            }

            self.report_entities_without_rows(keys, &groups, dataset.name(), &mut report);
        }

        MergeOutcome {
            entities: entities.into_values().collect(),
            report,
        }
    }

    /// Without a reference every key-space code is attachable
    fn is_referenced(&self, code: &str) -> bool {
        self.reference
            .map_or(true, |reference| reference.contains_code(code))
    }

    /// Only reference countries are expected to appear in every dataset
    fn report_entities_without_rows(
        &self,
        keys: &KeySpace,
        groups: &BTreeMap<String, Vec<&SourceRow>>,
        dataset: &str,
        report: &mut ReconciliationReport,
    ) {
        let Some(reference) = self.reference else {
            return;
        };

        for code in keys.codes().filter(|code| !groups.contains_key(*code)) {
            if let Some(country) = reference.find_by_code(code) {
                report.entity_unmatched(dataset, code, Some(&country.name));
            }
        }
    }
}

/// Resolve every row of a dataset; matched rows grouped by code in source order.
fn group_rows<'r>(
    reconciler: &IdentityReconciler<'_>,
    dataset: &'r SecondaryDataset,
    report: &mut ReconciliationReport,
) -> BTreeMap<String, Vec<&'r SourceRow>> {
    let mut groups: BTreeMap<String, Vec<&SourceRow>> = BTreeMap::new();

    for row in &dataset.table.rows {
        match reconciler.resolve(row, &dataset.key) {
            Resolution::Matched { code, .. } => groups.entry(code).or_default().push(row),
            Resolution::Unmatched { key } => {
                let reason = match dataset.key {
                    KeyStrategy::Code { .. } => "code not in key space",
                    KeyStrategy::Name { .. } => "name not in reference",
                };
                report.row_unmatched(dataset.name(), row, &key, reason);
            }
        }
    }

    groups
}

fn attach(
    entity: &mut ReconciledEntity,
    rows: &[&SourceRow],
    policy: &AttachmentPolicy,
    dataset: &str,
    report: &mut ReconciliationReport,
) {
    match policy {
        AttachmentPolicy::LatestScalar {
            date_column,
            value_column,
            metric,
        } => {
            let value = latest_value(rows, date_column, value_column);
            entity.attach(metric, Attribute::Scalar(value));
        }

        AttachmentPolicy::CompositeNumericFields { fields } => {
            let row = first_row_only(entity, rows, dataset, report);
            // Each field stands alone: one malformed field does not blank the others
            for field in fields {
                entity.attach(&field.metric, Attribute::Scalar(row.leading_value(&field.column)));
            }
        }

        AttachmentPolicy::FullYearSeries { years, layout } => match layout {
            SeriesLayout::Long {
                year_column,
                metrics,
            } => {
                for field in metrics {
                    let series = long_series(rows, *years, year_column, &field.column, &entity.code);
                    entity.attach(&field.metric, Attribute::Series(series));
                }
            }
            SeriesLayout::Wide { metric } => {
                let row = first_row_only(entity, rows, dataset, report);
                let mut series = YearSeries::new(*years);
                for year in years.years() {
                    series.set_first(year, row.value(&year.to_string()));
                }
                entity.attach(metric, Attribute::Series(series));
            }
        },
    }
}

/// Single-row policies: the first matching row wins, later ones are reported.
fn first_row_only<'r>(
    entity: &ReconciledEntity,
    rows: &[&'r SourceRow],
    dataset: &str,
    report: &mut ReconciliationReport,
) -> &'r SourceRow {
    for extra in &rows[1..] {
        report.row_unmatched(
            dataset,
            extra,
            &entity.code,
            "an earlier row already matched this code",
        );
    }
    rows[0]
}

/// Most recent row by date that carries a number; Missing if none does.
///
/// Undated rows rank below dated ones; ties keep the earlier source row.
fn latest_value(rows: &[&SourceRow], date_column: &str, value_column: &str) -> Value {
    let mut best: Option<(Option<NaiveDate>, Value)> = None;

    for row in rows {
        let value = row.value(value_column);
        if value.is_missing() {
            continue;
        }
        let date = parse_date(&row.text(date_column));
        let newer = match &best {
            None => true,
            Some((best_date, _)) => date > *best_date,
        };
        if newer {
            best = Some((date, value));
        }
    }

    best.map(|(_, value)| value).unwrap_or(Value::Missing)
}

fn long_series(
    rows: &[&SourceRow],
    years: YearRange,
    year_column: &str,
    value_column: &str,
    code: &str,
) -> YearSeries {
    let mut series = YearSeries::new(years);

    for row in rows {
        let Some(year) = parse_year(row.value(year_column)) else {
            debug!("{} line {}: no usable year", code, row.line_number);
            continue;
        };
        if !years.contains(year) {
            continue;
        }
        if !series.set_first(year, row.value(value_column)) {
            debug!(
                "{} line {}: {} already has a value for {}",
                code, row.line_number, value_column, year
            );
        }
    }

    series
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn parse_year(value: Value) -> Option<i32> {
    let year = value.as_f64()?;
    if year.fract() == 0.0 && year >= i32::MIN as f64 && year <= i32::MAX as f64 {
        Some(year as i32)
    } else {
        None
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::country::CountryReference;
    use crate::reconciliation::build_canonical_key_space;

    fn registry() -> CountryRegistry {
        let mut registry = CountryRegistry::new();
        registry.register(CountryReference::new("AGO", "Angola"));
        registry.register(
            CountryReference::new("BOL", "Bolivia (Plurinational State of)")
                .with_alternate_name("Bolivia"),
        );
        registry.add_synthetic("OWID_WRL", "World");
        registry
    }

    fn coverage() -> SourceTable {
        SourceTable::new(
            "coverage.csv",
            vec!["Code".into(), "Day".into(), "share".into()],
            vec![
                SourceRow::from_pairs(2, &[("Code", "AGO"), ("Day", "2022-06-01"), ("share", "25.1")]),
                SourceRow::from_pairs(3, &[("Code", "AGO"), ("Day", "2021-01-01"), ("share", "3.5")]),
                SourceRow::from_pairs(4, &[("Code", "OWID_WRL"), ("Day", "2022-01-01"), ("share", "60")]),
                SourceRow::from_pairs(5, &[("Code", "OWID_KOS"), ("Day", "2022-01-01"), ("share", "45")]),
            ],
        )
    }

    fn deaths() -> SourceTable {
        SourceTable::new(
            "deaths.csv",
            vec![" ".into(), "Total".into(), "Averted".into()],
            vec![
                SourceRow::from_pairs(2, &[(" ", "Angola "), ("Total", "1,234 (1,000–1,500)"), ("Averted", "N/A")]),
                SourceRow::from_pairs(3, &[(" ", "Bolivia"), ("Total", "20,500 (19,000–22,000)"), ("Averted", "7,000 (6,000–8,000)")]),
                SourceRow::from_pairs(4, &[(" ", "Atlantis"), ("Total", "1"), ("Averted", "1")]),
                SourceRow::from_pairs(5, &[(" ", "Angola"), ("Total", "999"), ("Averted", "999")]),
            ],
        )
    }

    fn latest_policy() -> AttachmentPolicy {
        AttachmentPolicy::LatestScalar {
            date_column: "Day".into(),
            value_column: "share".into(),
            metric: "coverage".into(),
        }
    }

    fn composite_policy() -> AttachmentPolicy {
        AttachmentPolicy::CompositeNumericFields {
            fields: vec![MetricField::new("Total", "deaths"), MetricField::new("Averted", "averted")],
        }
    }

    fn find<'e>(entities: &'e [ReconciledEntity], code: &str) -> &'e ReconciledEntity {
        entities.iter().find(|e| e.code == code).unwrap()
    }

    #[test]
    fn test_year_series_gaps_stay_missing() {
        let mut series = YearSeries::new(YearRange::new(2000, 2010));
        assert!(series.set_first(2000, Value::Number(5.0)));
        assert!(series.set_first(2005, Value::Number(7.5)));
        assert!(!series.set_first(2005, Value::Number(9.0))); // First wins
        assert!(!series.set_first(2011, Value::Number(1.0))); // Out of range

        assert_eq!(series.populated_years(), vec![2000, 2005]);
        assert_eq!(series.get(2005), Value::Number(7.5));
        assert_eq!(series.get(2003), Value::Missing);
        assert_eq!(series.iter().count(), 11);
    }

    #[test]
    fn test_latest_scalar_picks_most_recent_date() {
        let reference = registry();
        let coverage = coverage();
        let keys = build_canonical_key_space(Some(&reference), &[(&coverage, "Code")]);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(SecondaryDataset::new(coverage, KeyStrategy::code("Code")), latest_policy())],
        );

        // 2022-06-01 beats 2021-01-01 even though it comes first in the file
        assert_eq!(find(&outcome.entities, "AGO").scalar("coverage"), Value::Number(25.1));
        assert_eq!(find(&outcome.entities, "OWID_WRL").scalar("coverage"), Value::Number(60.0));
    }

    #[test]
    fn test_latest_scalar_skips_rows_without_numbers() {
        let rows_table = SourceTable::new(
            "coverage.csv",
            vec!["Code".into(), "Day".into(), "share".into()],
            vec![
                SourceRow::from_pairs(2, &[("Code", "AGO"), ("Day", "2021-01-01"), ("share", "3.5")]),
                SourceRow::from_pairs(3, &[("Code", "AGO"), ("Day", "2022-01-01"), ("share", "")]),
                SourceRow::from_pairs(4, &[("Code", "AGO"), ("Day", "not a date"), ("share", "9")]),
            ],
        );
        let rows: Vec<&SourceRow> = rows_table.rows.iter().collect();

        assert_eq!(latest_value(&rows, "Day", "share"), Value::Number(3.5));
        assert_eq!(latest_value(&rows[1..2], "Day", "share"), Value::Missing);
        assert_eq!(latest_value(&rows[2..], "Day", "share"), Value::Number(9.0));
    }

    #[test]
    fn test_composite_fields_are_independent_and_never_zero() {
        let reference = registry();
        let keys = KeySpace::from_registry(&reference);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(
                SecondaryDataset::new(deaths(), KeyStrategy::name(" ")).with_display_name(" "),
                composite_policy(),
            )],
        );

        let angola = find(&outcome.entities, "AGO");
        assert_eq!(angola.scalar("deaths"), Value::Number(1234.0));
        // Malformed field is Missing, but the key still exists
        assert_eq!(angola.scalar("averted"), Value::Missing);
        assert!(angola.has_attribute("averted"));
        assert_eq!(angola.display_name.as_deref(), Some("Angola"));
    }

    #[test]
    fn test_alternate_name_row_is_matched_not_reported() {
        let reference = registry();
        let keys = KeySpace::from_registry(&reference);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(SecondaryDataset::new(deaths(), KeyStrategy::name(" ")), composite_policy())],
        );

        let bolivia = find(&outcome.entities, "BOL");
        assert_eq!(bolivia.scalar("deaths"), Value::Number(20500.0));
        assert_eq!(bolivia.scalar("averted"), Value::Number(7000.0));
        assert!(outcome.report.unmatched_rows.iter().all(|r| r.key != "Bolivia"));
    }

    #[test]
    fn test_each_row_contributes_to_at_most_one_entity() {
        let reference = registry();
        let keys = KeySpace::from_registry(&reference);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(SecondaryDataset::new(deaths(), KeyStrategy::name(" ")), composite_policy())],
        );

        // Second Angola row (line 5) loses to line 2 and is reported
        assert_eq!(find(&outcome.entities, "AGO").scalar("deaths"), Value::Number(1234.0));
        let lines: Vec<usize> = outcome.report.unmatched_rows.iter().map(|r| r.line_number).collect();
        assert_eq!(lines, vec![4, 5]);
    }

    #[test]
    fn test_unmatched_entities_and_unreferenced_codes_are_reported() {
        let reference = registry();
        let coverage = coverage();
        let keys = build_canonical_key_space(Some(&reference), &[(&coverage, "Code")]);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(SecondaryDataset::new(coverage, KeyStrategy::code("Code")), latest_policy())],
        );

        assert_eq!(outcome.report.unreferenced_codes, vec!["OWID_KOS".to_string()]);
        let missing: Vec<&str> = outcome
            .report
            .unmatched_entities
            .iter()
            .map(|e| e.code.as_str())
            .collect();
        assert_eq!(missing, vec!["BOL"]);
    }

    #[test]
    fn test_codes_outside_reference_get_no_attachments() {
        let reference = registry();
        let coverage = coverage();
        let keys = build_canonical_key_space(Some(&reference), &[(&coverage, "Code")]);

        let outcome = Merger::new(Some(&reference)).merge(
            &keys,
            &[(SecondaryDataset::new(coverage, KeyStrategy::code("Code")), latest_policy())],
        );

        // Observed-only codes keep their entity but nothing is attached
        let kosovo = find(&outcome.entities, "OWID_KOS");
        assert!(!kosovo.has_attribute("coverage"));
        assert_eq!(kosovo.scalar("coverage"), Value::Missing);
        assert!(kosovo.display_name.is_none());

        // The synthetic world entity is part of the reference
        assert_eq!(find(&outcome.entities, "OWID_WRL").scalar("coverage"), Value::Number(60.0));
    }

    #[test]
    fn test_without_reference_every_code_is_attachable() {
        let coverage = coverage();
        let keys = build_canonical_key_space(None, &[(&coverage, "Code")]);

        let outcome = Merger::new(None).merge(
            &keys,
            &[(SecondaryDataset::new(coverage, KeyStrategy::code("Code")), latest_policy())],
        );

        assert_eq!(find(&outcome.entities, "OWID_KOS").scalar("coverage"), Value::Number(45.0));
        assert!(outcome.report.unreferenced_codes.is_empty());
    }

    #[test]
    fn test_full_year_series_long_layout() {
        let table = SourceTable::new(
            "burden.csv",
            vec!["iso3".into(), "year".into(), "e_inc_num".into()],
            vec![
                SourceRow::from_pairs(2, &[("iso3", "AGO"), ("year", "2000"), ("e_inc_num", "100")]),
                SourceRow::from_pairs(3, &[("iso3", "AGO"), ("year", "2005"), ("e_inc_num", "150")]),
                SourceRow::from_pairs(4, &[("iso3", "AGO"), ("year", "2005"), ("e_inc_num", "999")]),
                SourceRow::from_pairs(5, &[("iso3", "AGO"), ("year", "1999"), ("e_inc_num", "1")]),
                SourceRow::from_pairs(6, &[("iso3", "AGO"), ("year", ""), ("e_inc_num", "1")]),
            ],
        );
        let keys = build_canonical_key_space(None, &[(&table, "iso3")]);
        let policy = AttachmentPolicy::FullYearSeries {
            years: YearRange::new(2000, 2010),
            layout: SeriesLayout::Long {
                year_column: "year".into(),
                metrics: vec![MetricField::new("e_inc_num", "numerical")],
            },
        };

        let outcome = Merger::new(None).merge(
            &keys,
            &[(SecondaryDataset::new(table, KeyStrategy::code("iso3")), policy)],
        );

        let series = outcome.entities[0].series("numerical").unwrap();
        assert_eq!(series.populated_years(), vec![2000, 2005]);
        assert_eq!(series.get(2005), Value::Number(150.0));
        assert!(outcome.report.is_clean());
    }

    #[test]
    fn test_full_year_series_wide_layout() {
        let table = SourceTable::new(
            "wb-malaria.xlsx",
            vec!["Country Code".into(), "2000".into(), "2001".into()],
            vec![SourceRow::new(
                2,
                [
                    ("Country Code".to_string(), crate::source::Cell::Text("AGO".into())),
                    ("2000".to_string(), crate::source::Cell::Number(310.5)),
                    ("2001".to_string(), crate::source::Cell::Empty),
                ]
                .into_iter()
                .collect(),
            )],
        );
        let keys = build_canonical_key_space(None, &[(&table, "Country Code")]);
        let policy = AttachmentPolicy::FullYearSeries {
            years: YearRange::new(2000, 2002),
            layout: SeriesLayout::Wide {
                metric: "incidence".into(),
            },
        };

        let outcome = Merger::new(None).merge(
            &keys,
            &[(SecondaryDataset::new(table, KeyStrategy::code("Country Code")), policy)],
        );

        let series = outcome.entities[0].series("incidence").unwrap();
        assert_eq!(series.get(2000), Value::Number(310.5));
        assert_eq!(series.get(2001), Value::Missing);
        assert_eq!(series.get(2002), Value::Missing);
    }

    #[test]
    fn test_merge_order_does_not_change_entity_order() {
        let reference = registry();
        let coverage_table = coverage();
        let keys = build_canonical_key_space(Some(&reference), &[(&coverage_table, "Code")]);
        let merger = Merger::new(Some(&reference));

        let forward = merger.merge(
            &keys,
            &[
                (SecondaryDataset::new(coverage(), KeyStrategy::code("Code")), latest_policy()),
                (SecondaryDataset::new(deaths(), KeyStrategy::name(" ")), composite_policy()),
            ],
        );
        let backward = merger.merge(
            &keys,
            &[
                (SecondaryDataset::new(deaths(), KeyStrategy::name(" ")), composite_policy()),
                (SecondaryDataset::new(coverage(), KeyStrategy::code("Code")), latest_policy()),
            ],
        );

        assert_eq!(forward.entities, backward.entities);
        let codes: Vec<&str> = forward.entities.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["AGO", "BOL", "OWID_KOS", "OWID_WRL"]);
    }

    #[test]
    fn test_policy_metrics() {
        assert_eq!(latest_policy().metrics(), vec!["coverage"]);
        assert_eq!(composite_policy().metrics(), vec!["deaths", "averted"]);
        assert_eq!(composite_policy().name(), "composite-numeric-fields");
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(Value::Number(2005.0)), Some(2005));
        assert_eq!(parse_year(Value::Number(2005.5)), None);
        assert_eq!(parse_year(Value::Missing), None);
    }
}

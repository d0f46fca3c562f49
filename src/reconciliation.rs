// ⚖️ Identity Reconciliation - one canonical code per real-world entity
//
// Key space = reference codes ∪ codes observed in code-keyed secondary sources.
// Rows resolve by exact (normalised) code, or by exact canonical name and then
// curated alternate names. A miss is reported, never guessed.

use crate::entities::country::{normalize_code, CountryRegistry, NameMatch};
use crate::source::{SourceRow, SourceTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

// ============================================================================
// KEY SPACE
// ============================================================================

/// Where a canonical code came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyOrigin {
    /// Present in the reference table (including synthetic aggregates)
    Reference,

    /// Only seen in a secondary source's code column
    Observed { dataset: String },
}

/// Ordered set of canonical codes. Iteration is lexicographic by code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeySpace {
    keys: BTreeMap<String, KeyOrigin>,
}

impl KeySpace {
    pub fn new() -> Self {
        KeySpace::default()
    }

    /// Seed with every reference code
    pub fn from_registry(registry: &CountryRegistry) -> Self {
        let mut space = KeySpace::new();
        for code in registry.codes() {
            space.insert(code, KeyOrigin::Reference);
        }
        space
    }

    /// Insert a code. Empty codes and codes already present are rejected.
    pub fn insert(&mut self, raw_code: &str, origin: KeyOrigin) -> bool {
        let code = normalize_code(raw_code);
        if code.is_empty() || self.keys.contains_key(&code) {
            return false;
        }
        self.keys.insert(code, origin);
        true
    }

    /// Add every not-yet-known code from a table's code column.
    ///
    /// Returns the number of codes added.
    pub fn extend_from_table(&mut self, table: &SourceTable, code_column: &str) -> usize {
        let mut added = 0;
        for row in &table.rows {
            let origin = KeyOrigin::Observed {
                dataset: table.name.clone(),
            };
            if self.insert(&row.text(code_column), origin) {
                added += 1;
            }
        }
        if added > 0 {
            debug!("{}: {} codes added to key space", table.name, added);
        }
        added
    }

    pub fn contains(&self, code: &str) -> bool {
        self.keys.contains_key(&normalize_code(code))
    }

    pub fn origin(&self, code: &str) -> Option<&KeyOrigin> {
        self.keys.get(&normalize_code(code))
    }

    /// Codes in lexicographic order
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Reference codes first, then codes from each (table, code column) pair.
pub fn build_canonical_key_space(
    reference: Option<&CountryRegistry>,
    secondary_sources: &[(&SourceTable, &str)],
) -> KeySpace {
    let mut space = reference
        .map(KeySpace::from_registry)
        .unwrap_or_default();

    for (table, code_column) in secondary_sources {
        space.extend_from_table(table, code_column);
    }

    space
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// How a secondary source identifies its rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyStrategy {
    /// Exact code column
    Code { column: String },

    /// Free-text name column, matched against the reference
    Name { column: String },
}

impl KeyStrategy {
    pub fn code(column: &str) -> Self {
        KeyStrategy::Code {
            column: column.to_string(),
        }
    }

    pub fn name(column: &str) -> Self {
        KeyStrategy::Name {
            column: column.to_string(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            KeyStrategy::Code { column } | KeyStrategy::Name { column } => column.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchVia {
    Code,
    CanonicalName,
    AlternateName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    Matched { code: String, via: MatchVia },
    Unmatched { key: String },
}

impl Resolution {
    pub fn code(&self) -> Option<&str> {
        match self {
            Resolution::Matched { code, .. } => Some(code.as_str()),
            Resolution::Unmatched { .. } => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }
}

/// Resolves secondary rows against a key space (and, for names, a reference).
pub struct IdentityReconciler<'a> {
    keys: &'a KeySpace,
    reference: Option<&'a CountryRegistry>,
}

impl<'a> IdentityReconciler<'a> {
    pub fn new(keys: &'a KeySpace, reference: Option<&'a CountryRegistry>) -> Self {
        IdentityReconciler { keys, reference }
    }

    pub fn resolve(&self, row: &SourceRow, strategy: &KeyStrategy) -> Resolution {
        match strategy {
            KeyStrategy::Code { column } => self.resolve_code(&row.text(column)),
            KeyStrategy::Name { column } => self.resolve_name(&row.text(column)),
        }
    }

    pub fn resolve_code(&self, raw_code: &str) -> Resolution {
        let code = normalize_code(raw_code);
        if self.keys.contains(&code) {
            Resolution::Matched {
                code,
                via: MatchVia::Code,
            }
        } else {
            Resolution::Unmatched { key: code }
        }
    }

    pub fn resolve_name(&self, raw_name: &str) -> Resolution {
        let name = raw_name.trim();
        let found = self
            .reference
            .and_then(|registry| registry.find_by_name(name))
            .filter(|(country, _)| self.keys.contains(&country.code));

        match found {
            Some((country, how)) => Resolution::Matched {
                code: country.code.clone(),
                via: match how {
                    NameMatch::Canonical => MatchVia::CanonicalName,
                    NameMatch::Alternate => MatchVia::AlternateName,
                },
            },
            None => Resolution::Unmatched {
                key: name.to_string(),
            },
        }
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

/// A secondary row that resolved to no canonical code (or lost to an earlier row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    pub dataset: String,
    pub line_number: usize,
    pub key: String,
    pub reason: String,
}

/// A canonical entity that a dataset had nothing for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedEntity {
    pub dataset: String,
    pub code: String,
    pub name: Option<String>,
}

/// Diagnostics gathered during a merge. Never fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub unmatched_rows: Vec<UnmatchedRow>,
    pub unmatched_entities: Vec<UnmatchedEntity>,
    /// Codes in the key space with no reference entry
    pub unreferenced_codes: Vec<String>,
}

impl ReconciliationReport {
    pub fn new() -> Self {
        ReconciliationReport::default()
    }

    pub fn row_unmatched(&mut self, dataset: &str, row: &SourceRow, key: &str, reason: &str) {
        warn!(
            "{} line {}: no canonical code for {:?} ({})",
            dataset, row.line_number, key, reason
        );
        self.unmatched_rows.push(UnmatchedRow {
            dataset: dataset.to_string(),
            line_number: row.line_number,
            key: key.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn entity_unmatched(&mut self, dataset: &str, code: &str, name: Option<&str>) {
        match name {
            Some(name) => warn!("{}: couldn't find a row for {} ({})", dataset, code, name),
            None => warn!("{}: couldn't find a row for {}", dataset, code),
        }
        self.unmatched_entities.push(UnmatchedEntity {
            dataset: dataset.to_string(),
            code: code.to_string(),
            name: name.map(str::to_string),
        });
    }

    pub fn code_unreferenced(&mut self, code: &str) {
        warn!("couldn't find reference entry for {}", code);
        self.unreferenced_codes.push(code.to_string());
    }

    pub fn is_clean(&self) -> bool {
        self.unmatched_rows.is_empty()
            && self.unmatched_entities.is_empty()
            && self.unreferenced_codes.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} unmatched rows, {} entities without data, {} codes without reference entry",
            self.unmatched_rows.len(),
            self.unmatched_entities.len(),
            self.unreferenced_codes.len()
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::country::CountryReference;

    fn registry() -> CountryRegistry {
        let mut registry = CountryRegistry::new();
        registry.register(CountryReference::new("AGO", "Angola"));
        registry.register(
            CountryReference::new("CIV", "Côte d'Ivoire").with_alternate_name("Cote d'Ivoire"),
        );
        registry.add_synthetic("OWID_WRL", "World");
        registry
    }

    fn coverage_table() -> SourceTable {
        SourceTable::new(
            "coverage.csv",
            vec!["Entity".into(), "Code".into()],
            vec![
                SourceRow::from_pairs(2, &[("Entity", "Angola"), ("Code", "AGO")]),
                SourceRow::from_pairs(3, &[("Entity", "Kosovo"), ("Code", "OWID_KOS")]),
                SourceRow::from_pairs(4, &[("Entity", "Kosovo"), ("Code", "owid_kos")]),
                SourceRow::from_pairs(5, &[("Entity", "Africa"), ("Code", "")]),
            ],
        )
    }

    #[test]
    fn test_key_space_from_registry() {
        let space = KeySpace::from_registry(&registry());

        assert_eq!(space.len(), 3);
        assert_eq!(space.origin("AGO"), Some(&KeyOrigin::Reference));
    }

    #[test]
    fn test_key_space_insert_rejects_empty_and_duplicates() {
        let mut space = KeySpace::new();

        assert!(space.insert("ago", KeyOrigin::Reference));
        assert!(!space.insert(" AGO ", KeyOrigin::Reference));
        assert!(!space.insert("   ", KeyOrigin::Reference));
        assert_eq!(space.len(), 1);
    }

    #[test]
    fn test_build_key_space_extends_with_observed_codes() {
        let reference = registry();
        let coverage = coverage_table();

        let space = build_canonical_key_space(Some(&reference), &[(&coverage, "Code")]);

        // AGO, CIV, OWID_WRL from reference + OWID_KOS observed once
        assert_eq!(space.len(), 4);
        assert_eq!(
            space.origin("OWID_KOS"),
            Some(&KeyOrigin::Observed {
                dataset: "coverage.csv".to_string()
            })
        );
        // Every code is non-empty and unique
        let codes: Vec<&str> = space.codes().collect();
        assert!(codes.iter().all(|c| !c.is_empty()));
        let mut deduped = codes.clone();
        deduped.dedup();
        assert_eq!(codes, deduped);
    }

    #[test]
    fn test_key_space_iterates_lexicographically() {
        let reference = registry();
        let coverage = coverage_table();
        let space = build_canonical_key_space(Some(&reference), &[(&coverage, "Code")]);

        let codes: Vec<&str> = space.codes().collect();
        assert_eq!(codes, vec!["AGO", "CIV", "OWID_KOS", "OWID_WRL"]);
    }

    #[test]
    fn test_build_key_space_without_reference() {
        let coverage = coverage_table();
        let space = build_canonical_key_space(None, &[(&coverage, "Code")]);

        assert_eq!(space.codes().collect::<Vec<_>>(), vec!["AGO", "OWID_KOS"]);
    }

    #[test]
    fn test_resolve_by_code_is_normalized() {
        let reference = registry();
        let space = KeySpace::from_registry(&reference);
        let reconciler = IdentityReconciler::new(&space, Some(&reference));

        let row = SourceRow::from_pairs(2, &[("iso3", " ago ")]);
        assert_eq!(
            reconciler.resolve(&row, &KeyStrategy::code("iso3")),
            Resolution::Matched {
                code: "AGO".to_string(),
                via: MatchVia::Code
            }
        );

        let row = SourceRow::from_pairs(3, &[("iso3", "XKX")]);
        assert!(!reconciler.resolve(&row, &KeyStrategy::code("iso3")).is_matched());
    }

    #[test]
    fn test_resolve_by_alternate_name() {
        let reference = registry();
        let space = KeySpace::from_registry(&reference);
        let reconciler = IdentityReconciler::new(&space, Some(&reference));

        let row = SourceRow::from_pairs(2, &[(" ", "  Cote d'Ivoire ")]);
        let resolution = reconciler.resolve(&row, &KeyStrategy::name(" "));

        assert_eq!(
            resolution,
            Resolution::Matched {
                code: "CIV".to_string(),
                via: MatchVia::AlternateName
            }
        );
    }

    #[test]
    fn test_resolve_by_name_unmatched_is_reported_not_guessed() {
        let reference = registry();
        let space = KeySpace::from_registry(&reference);
        let reconciler = IdentityReconciler::new(&space, Some(&reference));

        let resolution = reconciler.resolve_name("Angolaa");
        assert_eq!(
            resolution,
            Resolution::Unmatched {
                key: "Angolaa".to_string()
            }
        );
        assert_eq!(resolution.code(), None);
    }

    #[test]
    fn test_resolve_by_name_without_reference() {
        let space = KeySpace::new();
        let reconciler = IdentityReconciler::new(&space, None);

        assert!(!reconciler.resolve_name("Angola").is_matched());
    }

    #[test]
    fn test_report_records_diagnostics() {
        let mut report = ReconciliationReport::new();
        assert!(report.is_clean());

        let row = SourceRow::from_pairs(7, &[(" ", "Atlantis")]);
        report.row_unmatched("deaths.csv", &row, "Atlantis", "no reference name");
        report.entity_unmatched("coverage.csv", "AGO", Some("Angola"));
        report.code_unreferenced("OWID_KOS");

        assert!(!report.is_clean());
        assert_eq!(report.unmatched_rows[0].line_number, 7);
        assert_eq!(report.unmatched_entities[0].code, "AGO");
        assert_eq!(
            report.summary(),
            "1 unmatched rows, 1 entities without data, 1 codes without reference entry"
        );
    }
}

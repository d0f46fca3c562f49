// 🌍 Country Entity - canonical code + display name + curated alternate names
//
// "Korea, Republic of", "South Korea" → KOR
//
// The code is the identity. Names are only ever compared exactly; alternate
// names are curated reference data, not guesses.

use crate::source::SourceTable;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Trim and upper-case a code so " ago" and "AGO" are the same key.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

// ============================================================================
// COUNTRY REFERENCE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryReference {
    /// Canonical code (ISO3-like)
    pub code: String,

    /// Canonical display name
    pub name: String,

    /// Other spellings that identify the same country
    pub alternate_names: BTreeSet<String>,

    /// True for pseudo-entities added by hand (e.g. the world aggregate)
    pub synthetic: bool,
}

impl CountryReference {
    pub fn new(code: &str, name: &str) -> Self {
        CountryReference {
            code: normalize_code(code),
            name: name.trim().to_string(),
            alternate_names: BTreeSet::new(),
            synthetic: false,
        }
    }

    pub fn synthetic(code: &str, name: &str) -> Self {
        CountryReference {
            synthetic: true,
            ..CountryReference::new(code, name)
        }
    }

    pub fn add_alternate_name(&mut self, alternate: &str) {
        let alternate = alternate.trim();
        if !alternate.is_empty() && alternate != self.name {
            self.alternate_names.insert(alternate.to_string());
        }
    }

    pub fn with_alternate_name(mut self, alternate: &str) -> Self {
        self.add_alternate_name(alternate);
        self
    }

    /// How (if at all) a free-text name identifies this country
    pub fn name_match(&self, name: &str) -> Option<NameMatch> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        if self.name == name {
            Some(NameMatch::Canonical)
        } else if self.alternate_names.contains(name) {
            Some(NameMatch::Alternate)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameMatch {
    Canonical,
    Alternate,
}

// ============================================================================
// REFERENCE COLUMNS
// ============================================================================

/// Column names of the reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceColumns {
    pub code: String,
    pub name: String,
    /// Optional column of alternate names, `;`-separated
    pub alternates: Option<String>,
}

impl Default for ReferenceColumns {
    fn default() -> Self {
        ReferenceColumns {
            code: "alpha-3".to_string(),
            name: "name".to_string(),
            alternates: Some("alternatives".to_string()),
        }
    }
}

// ============================================================================
// COUNTRY REGISTRY
// ============================================================================

/// Immutable-once-built set of reference countries, indexed by code.
#[derive(Debug, Clone, Default)]
pub struct CountryRegistry {
    countries: Vec<CountryReference>,
    by_code: HashMap<String, usize>,
}

impl CountryRegistry {
    pub fn new() -> Self {
        CountryRegistry::default()
    }

    /// Build from a loaded reference table. Rows without a code are skipped.
    pub fn from_table(table: &SourceTable, columns: &ReferenceColumns) -> Self {
        let mut registry = CountryRegistry::new();

        for row in &table.rows {
            let code = row.text(&columns.code);
            if code.trim().is_empty() {
                warn!(
                    "{} line {}: reference row has no code, skipped",
                    table.name, row.line_number
                );
                continue;
            }

            let mut country = CountryReference::new(&code, &row.text(&columns.name));
            if let Some(alternates) = &columns.alternates {
                for alternate in row.text(alternates).split(';') {
                    country.add_alternate_name(alternate);
                }
            }

            if !registry.register(country) {
                warn!(
                    "{} line {}: duplicate reference code {}, first entry kept",
                    table.name,
                    row.line_number,
                    normalize_code(&code)
                );
            }
        }

        debug!("reference registry built with {} countries", registry.len());
        registry
    }

    /// Add a country. Returns false (and changes nothing) if the code exists.
    pub fn register(&mut self, country: CountryReference) -> bool {
        if country.code.is_empty() || self.by_code.contains_key(&country.code) {
            return false;
        }
        self.by_code.insert(country.code.clone(), self.countries.len());
        self.countries.push(country);
        true
    }

    /// Add a hand-made aggregate such as the world pseudo-entity
    pub fn add_synthetic(&mut self, code: &str, name: &str) -> bool {
        self.register(CountryReference::synthetic(code, name))
    }

    /// Attach a curated alternate name to an existing country
    pub fn add_alternate_name(&mut self, code: &str, alternate: &str) -> Result<()> {
        let index = *self
            .by_code
            .get(&normalize_code(code))
            .ok_or_else(|| anyhow!("Country not found for alternate name: {}", code))?;
        self.countries[index].add_alternate_name(alternate);
        Ok(())
    }

    pub fn find_by_code(&self, code: &str) -> Option<&CountryReference> {
        self.by_code
            .get(&normalize_code(code))
            .map(|&index| &self.countries[index])
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.by_code.contains_key(&normalize_code(code))
    }

    /// Exact canonical-name match first (across all countries), then alternates.
    /// Synthetic aggregates are reachable by code only.
    pub fn find_by_name(&self, name: &str) -> Option<(&CountryReference, NameMatch)> {
        let named = || self.countries.iter().filter(|c| !c.synthetic);

        named()
            .find(|c| c.name_match(name) == Some(NameMatch::Canonical))
            .map(|c| (c, NameMatch::Canonical))
            .or_else(|| {
                named()
                    .find(|c| c.name_match(name) == Some(NameMatch::Alternate))
                    .map(|c| (c, NameMatch::Alternate))
            })
    }

    /// Countries in registration order
    pub fn all(&self) -> &[CountryReference] {
        &self.countries
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.countries.iter().map(|c| c.code.as_str())
    }

    pub fn len(&self) -> usize {
        self.countries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

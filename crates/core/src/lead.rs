//! Collected lead fields for one call

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A lead field the bridge knows how to collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadField {
    Name,
    Email,
    Phone,
    Business,
    BusinessType,
}

impl LeadField {
    /// Human-readable label used in record summaries.
    pub fn label(&self) -> &'static str {
        match self {
            LeadField::Name => "name",
            LeadField::Email => "email",
            LeadField::Phone => "phone",
            LeadField::Business => "business",
            LeadField::BusinessType => "business type",
        }
    }
}

/// Lead fields collected incrementally over a call.
///
/// Keys are populated as utterances yield matches; a later non-empty
/// match overwrites an earlier one (last-write-wins per field).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadSheet {
    fields: BTreeMap<LeadField, String>,
}

impl LeadSheet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value for a field. Empty values are ignored so a missed
    /// match never erases previously collected data.
    pub fn fill(&mut self, field: LeadField, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.fields.insert(field, value.to_string());
        }
    }

    pub fn get(&self, field: LeadField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LeadField, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// One-line human-readable rendering of the collected fields.
    pub fn summary(&self) -> String {
        if self.fields.is_empty() {
            return "no lead fields captured".to_string();
        }
        self.fields
            .iter()
            .map(|(field, value)| format!("{}: {}", field.label(), value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

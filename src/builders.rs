//! Per-property index builders
//!
//! One builder accumulates the value-to-row-id mapping for one configured
//! property as features stream out of the walk. The trait is the seam for
//! future index kinds (numeric ranges, full-text) without touching the
//! walker or the assembler.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kind of index to build for a property
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Distinct string values mapped to the rows carrying them
    Enum,
}

/// Accumulates one property's index as rows are appended
pub trait IndexBuilder: Send + Sync + fmt::Debug {
    /// Name of the indexed property
    fn property(&self) -> &str;

    /// Record that row `row` carries `value` for this property
    fn add_value(&mut self, row: usize, value: &Value);

    /// Seal the index after the last row; idempotent
    fn finalize(&mut self);

    /// Serializable view of the built index, for the writer boundary
    fn to_json(&self) -> Value;
}

/// Construct the builder matching a configured index kind
pub fn new_builder(property: &str, kind: IndexKind) -> Box<dyn IndexBuilder> {
    match kind {
        IndexKind::Enum => Box::new(EnumIndexBuilder::new(property)),
    }
}

/// Maps each distinct string value of a property to the list of row ids
/// carrying it
#[derive(Clone, Debug)]
pub struct EnumIndexBuilder {
    property: String,
    values: BTreeMap<String, Vec<usize>>,
}

impl EnumIndexBuilder {
    /// Create an empty builder for the given property
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            values: BTreeMap::new(),
        }
    }

    /// Row ids recorded for a value, if any
    pub fn rows_for(&self, value: &str) -> Option<&[usize]> {
        self.values.get(value).map(Vec::as_slice)
    }

    /// Number of distinct values seen
    pub fn distinct_values(&self) -> usize {
        self.values.len()
    }
}

/// Render a batch-table value the way it appears in an index key.
/// Strings stay as-is; scalars use their JSON text; null yields nothing.
pub(crate) fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl IndexBuilder for EnumIndexBuilder {
    fn property(&self) -> &str {
        &self.property
    }

    fn add_value(&mut self, row: usize, value: &Value) {
        if let Some(key) = render_value(value) {
            self.values.entry(key).or_default().push(row);
        }
    }

    fn finalize(&mut self) {
        for rows in self.values.values_mut() {
            rows.sort_unstable();
            rows.dedup();
        }
    }

    fn to_json(&self) -> Value {
        serde_json::json!({
            "kind": "enum",
            "property": self.property,
            "values": self.values,
        })
    }
}

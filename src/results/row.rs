use std::collections::HashMap;
use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::RowValues;

/// Column layout shared by every row a statement produces.
///
/// Built once per prepared statement so rows only carry their values plus two `Arc`s.
#[derive(Debug, Clone)]
pub struct ColumnShape {
    names: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
}

impl ColumnShape {
    #[must_use]
    pub fn new(names: Vec<String>) -> Self {
        // First occurrence wins for duplicate column names, matching positional lookup.
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self {
            names: Arc::new(names),
            index: Arc::new(index),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub(crate) fn row(&self, values: Vec<RowValues>) -> Row {
        Row {
            shape: self.clone(),
            values,
        }
    }
}

/// One decoded result row.
///
/// Rows are owned copies of the engine's column buffers, so a callback may keep them after
/// it returns.
#[derive(Debug, Clone)]
pub struct Row {
    shape: ColumnShape,
    values: Vec<RowValues>,
}

impl Row {
    /// Get the index of a column by name
    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        self.shape.index.get(column_name).copied()
    }

    /// Get a value from the row by column name, or None if the column wasn't found
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&RowValues> {
        self.column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the row by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&RowValues> {
        self.values.get(index)
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.shape.names
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row into `(column, value)` pairs in column order.
    #[must_use]
    pub fn into_pairs(self) -> Vec<(String, RowValues)> {
        self.shape
            .names
            .iter()
            .cloned()
            .zip(self.values)
            .collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.shape.names.iter().zip(&self.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_index() {
        let shape = ColumnShape::new(vec!["id".into(), "name".into()]);
        let row = shape.row(vec![RowValues::Int(1), RowValues::Text("Alice".into())]);

        assert_eq!(row.get("name").and_then(RowValues::as_text), Some("Alice"));
        assert_eq!(row.get_by_index(0), Some(&RowValues::Int(1)));
        assert!(row.get("missing").is_none());
        assert_eq!(row.column_names(), ["id", "name"]);
    }

    #[test]
    fn serializes_as_object_in_column_order() {
        let shape = ColumnShape::new(vec!["id".into(), "note".into(), "data".into()]);
        let row = shape.row(vec![
            RowValues::Int(7),
            RowValues::Null,
            RowValues::Blob(vec![1, 2]),
        ]);
        let json = serde_json::to_string(&row).expect("serialize row");
        assert_eq!(json, r#"{"id":7,"note":null,"data":[1,2]}"#);
    }
}

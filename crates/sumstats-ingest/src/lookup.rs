//! Read-only side tables joined onto raw records
//!
//! Loaded once before the worker pool starts and shared by every worker
//! behind an `Arc`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::codec;
use crate::storage::ObjectStore;
use crate::tabular::{self, RawFormat, RawTable};

/// Side table indexed by one key column
#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    name: String,
    columns: Vec<String>,
    index: HashMap<String, Vec<Option<String>>>,
}

impl LookupTable {
    /// Index `raw` by `key_column`, keeping `value_columns`
    ///
    /// Rows with a null key are ignored; for duplicate keys the first row wins.
    pub fn from_raw(
        name: impl Into<String>,
        raw: &RawTable,
        key_column: &str,
        value_columns: &[String],
    ) -> Result<Self> {
        let name = name.into();
        let key_index = raw
            .column_index(key_column)
            .with_context(|| format!("Lookup table {} has no key column {}", name, key_column))?;
        let value_indices = value_columns
            .iter()
            .map(|c| {
                raw.column_index(c)
                    .with_context(|| format!("Lookup table {} has no column {}", name, c))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut index = HashMap::with_capacity(raw.len());
        for row in raw.rows() {
            let Some(key) = row.get(key_index).cloned().flatten() else {
                continue;
            };
            index
                .entry(key)
                .or_insert_with(|| value_indices.iter().map(|&i| row.get(i).cloned().flatten()).collect());
        }

        Ok(Self {
            name,
            columns: value_columns.to_vec(),
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn column_position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of the row matching `key`, in value column order
    pub fn get(&self, key: &str) -> Option<&[Option<String>]> {
        self.index.get(key).map(Vec::as_slice)
    }
}

/// Encoding of a stored side table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LookupFormat {
    Delimited(RawFormat),
    Parquet,
}

/// Where a side table lives and which columns to keep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSpec {
    pub name: String,
    pub key: String,
    pub format: LookupFormat,
    pub key_column: String,
    pub value_columns: Vec<String>,
}

impl LookupSpec {
    pub async fn load(&self, store: &dyn ObjectStore) -> Result<LookupTable> {
        let data = store
            .get(&self.key)
            .await
            .with_context(|| format!("Failed to load lookup table {} from {}", self.name, self.key))?;

        let raw = match self.format {
            LookupFormat::Delimited(format) => tabular::read_table(&data, format)?,
            LookupFormat::Parquet => {
                let mut wanted: Vec<&str> = vec![self.key_column.as_str()];
                wanted.extend(self.value_columns.iter().map(String::as_str));
                codec::parquet_to_raw_table(data, &wanted)?
            }
        };

        let table = LookupTable::from_raw(&self.name, &raw, &self.key_column, &self.value_columns)?;
        info!(
            table = %self.name,
            rows = raw.len(),
            keys = table.len(),
            "Loaded lookup table"
        );
        Ok(table)
    }
}

/// Every side table of a run, by name
#[derive(Debug, Clone, Default)]
pub struct LookupSet {
    tables: HashMap<String, Arc<LookupTable>>,
}

impl LookupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: LookupTable) {
        self.tables.insert(table.name().to_string(), Arc::new(table));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LookupTable>> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub async fn load_all(specs: &[LookupSpec], store: &dyn ObjectStore) -> Result<Self> {
        let mut set = Self::new();
        for spec in specs {
            if set.get(&spec.name).is_some() {
                bail!("Lookup table {} is defined twice", spec.name);
            }
            set.insert(spec.load(store).await?);
        }
        Ok(set)
    }
}

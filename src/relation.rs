//! Foreign-key lookup tables.
//!
//! A [`RelationMap`] is built by replaying the rows of the document a relation
//! points at: it is a [`RowSink`] that keeps only the relation's `key` and
//! `column` fields. Once frozen it is published to the pipeline's
//! [`RelationCache`] and read concurrently by every conversion job.

use crate::convert::RowSink;
use crate::error::ConvertError;
use crate::schema::{Field, FieldType, JobDescriptor, Relation};
use crate::value::Value;
use anyhow::{Context, Result, bail};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapState {
    Empty,
    Populating,
    Frozen,
}

#[derive(Debug)]
pub struct RelationMap {
    pub relation: Relation,
    key_type: FieldType,
    column_type: FieldType,
    key_index: usize,
    column_index: usize,
    state: MapState,
    by_str: HashMap<String, i64>,
    by_int: HashMap<i64, i64>,
    current_key: Option<Value>,
    current_column: Option<Value>,
}

fn find_field<'d>(doc: &'d JobDescriptor, column: &str, role: &str) -> Result<&'d Field> {
    doc.field_by_column(column)
        .ok_or_else(|| ConvertError::config(format!("relation {role} is not found.")).into())
}

impl RelationMap {
    /// Prepare an empty map for `relation` over the fields of `doc`, the
    /// document named by `relation.from`.
    ///
    /// # Errors
    /// Fails unless `column` is an `int` field and `key` an `int` or `char` field.
    pub fn new(relation: &Relation, doc: &JobDescriptor) -> Result<Self> {
        let build = || -> Result<Self> {
            let column = find_field(doc, &relation.column, "column")?;
            let key = find_field(doc, &relation.key, "key")?;
            if column.kind != FieldType::Int {
                bail!(ConvertError::config("relation column type must be int."));
            }
            if !matches!(key.kind, FieldType::Int | FieldType::Char) {
                bail!(ConvertError::config("relation key type must be int or char."));
            }
            Ok(Self {
                relation: relation.clone(),
                key_type: key.kind,
                column_type: column.kind,
                key_index: key.index,
                column_index: column.index,
                state: MapState::Empty,
                by_str: HashMap::new(),
                by_int: HashMap::new(),
                current_key: None,
                current_column: None,
            })
        };
        build().with_context(|| format!("relation={}", relation.id))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.relation.id
    }

    #[must_use]
    pub fn key_type(&self) -> FieldType {
        self.key_type
    }

    #[must_use]
    pub fn column_type(&self) -> FieldType {
        self.column_type
    }

    #[must_use]
    pub fn state(&self) -> MapState {
        self.state
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_str.len() + self.by_int.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reject further writes. Lookups are only valid afterwards.
    pub fn freeze(&mut self) {
        self.state = MapState::Frozen;
    }

    /// Resolve a key to its surrogate value.
    ///
    /// # Errors
    /// Fails with [`ConvertError::RelationKeyNotFound`] for unknown keys and with
    /// a data error when the key has the wrong type.
    pub fn lookup(&self, key: &Value) -> Result<i64> {
        if self.state != MapState::Frozen {
            bail!(ConvertError::config(format!(
                "relation map {} is not frozen.",
                self.relation.id
            )));
        }
        let found = match self.key_type {
            FieldType::Int => {
                let Some(k) = key.as_int() else {
                    bail!(ConvertError::data("not matched relation key_type."));
                };
                self.by_int.get(&k)
            }
            _ => match key {
                Value::Str(s) => self.by_str.get(s),
                other => self.by_str.get(&other.to_string()),
            },
        };
        found.copied().ok_or_else(|| {
            ConvertError::RelationKeyNotFound {
                key: key.to_string(),
            }
            .into()
        })
    }

    fn writable(&self) -> Result<()> {
        if self.state == MapState::Frozen {
            bail!(ConvertError::config(format!(
                "relation map {} is frozen.",
                self.relation.id
            )));
        }
        Ok(())
    }
}

impl RowSink for RelationMap {
    fn begin(&mut self) -> Result<()> {
        self.writable()?;
        self.state = MapState::Populating;
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()> {
        self.writable()?;
        self.current_key = None;
        self.current_column = None;
        Ok(())
    }

    fn field(&mut self, field: &Field, value: Value) -> Result<()> {
        self.writable()?;
        if field.index == self.column_index {
            self.current_column = Some(value);
        } else if field.index == self.key_index {
            self.current_key = Some(value);
        }
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        self.writable()?;
        let key = self.current_key.take();
        let column = self.current_column.take();
        let Some(key) = key.filter(|v| !v.is_null()) else {
            bail!(ConvertError::data("relation key could not be read."));
        };
        let Some(column) = column.and_then(|v| v.as_int()) else {
            bail!(ConvertError::data("relation column could not be read."));
        };
        match (self.key_type, key) {
            (FieldType::Int, Value::Int(k)) => {
                self.by_int.insert(k, column);
            }
            (FieldType::Char, Value::Str(k)) => {
                self.by_str.insert(k, column);
            }
            (FieldType::Char, other) => {
                self.by_str.insert(other.to_string(), column);
            }
            _ => bail!(ConvertError::data("relation key could not be read.")),
        }
        Ok(())
    }
}

/// Publish-once store of frozen relation maps, keyed by relation id.
#[derive(Debug, Default)]
pub struct RelationCache {
    maps: DashMap<String, Arc<RelationMap>>,
}

impl RelationCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has(&self, id: &str) -> bool {
        self.maps.contains_key(id)
    }

    /// # Errors
    /// Fails with [`ConvertError::RelationMissing`] when nothing is published
    /// under `id`.
    pub fn find(&self, id: &str) -> Result<Arc<RelationMap>> {
        self.maps
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ConvertError::RelationMissing(id.to_string()).into())
    }

    /// Publish `map`. If a map with the same id is already published, that one
    /// is returned and `map` is dropped.
    pub fn store(&self, map: RelationMap) -> Arc<RelationMap> {
        self.publish(map).0
    }

    /// Like [`store`](Self::store), also reporting whether `map` itself was
    /// published.
    pub fn publish(&self, map: RelationMap) -> (Arc<RelationMap>, bool) {
        match self.maps.entry(map.relation.id.clone()) {
            Entry::Occupied(existing) => (Arc::clone(existing.get()), false),
            Entry::Vacant(slot) => {
                let map = Arc::new(map);
                slot.insert(Arc::clone(&map));
                (map, true)
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

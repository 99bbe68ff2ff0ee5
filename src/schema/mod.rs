//! Schema documents: what to read, how to type it, where to write it.
//!
//! A document is a YAML file naming a source table (`target`), the header row,
//! a list of typed fields and one or more output handlers. Loading produces an
//! immutable [`JobDescriptor`].

mod field;
mod handler;

pub use field::{Field, FieldType, Relation, ValidateSpec};
pub use handler::{HandlerKind, HandlerSpec};

use crate::config::Settings;
use crate::error::ConvertError;
use crate::io::glob::{expand_glob, is_pattern};
use anyhow::{Context, Result};
use field::RawField;
use handler::RawHandler;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

const TARGET_SCHEME: &str = "xls:///";

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    target: String,
    row: usize,
    #[serde(default)]
    handler: Option<RawHandler>,
    #[serde(default)]
    handlers: Option<Vec<RawHandler>>,
    #[serde(default)]
    fields: Vec<RawField>,
}

/// A loaded schema document.
#[derive(Clone, Debug)]
pub struct JobDescriptor {
    pub name: String,
    /// Document name as requested (relative to the schema search path).
    pub path: String,
    /// Raw `target` string.
    pub target: String,
    /// Source path (possibly a glob) relative to the source search path.
    pub source_path: String,
    /// Empty means the first sheet.
    pub sheet_name: String,
    /// 1-based header row.
    pub row: usize,
    pub handlers: Vec<HandlerSpec>,
    pub fields: Vec<Field>,
    source_root: PathBuf,
}

impl JobDescriptor {
    /// Locate `name` on the schema search paths and parse it.
    ///
    /// # Errors
    /// Fails when the document is missing, is not valid YAML or declares an
    /// invalid field or handler. The message is prefixed with `name`.
    pub fn load(name: &str, settings: &Settings) -> Result<Self> {
        let path = settings.search_schema_path(name)?;
        let text = fs::read_to_string(&path)
            .map_err(|e| ConvertError::resource(name, e.to_string()))?;
        let raw: RawDocument =
            serde_yaml::from_str(&text).map_err(|e| ConvertError::resource(name, e.to_string()))?;
        Self::from_raw(name, raw, settings).with_context(|| name.to_string())
    }

    /// Parse a document from YAML text without touching the schema search path.
    ///
    /// # Errors
    /// Same as [`load`](Self::load), minus the lookup.
    pub fn from_yaml(name: &str, text: &str, settings: &Settings) -> Result<Self> {
        let raw: RawDocument =
            serde_yaml::from_str(text).map_err(|e| ConvertError::resource(name, e.to_string()))?;
        Self::from_raw(name, raw, settings).with_context(|| name.to_string())
    }

    fn from_raw(name: &str, raw: RawDocument, settings: &Settings) -> Result<Self> {
        let doc_name = raw.name.unwrap_or_else(|| default_name(name));
        let (source_path, sheet_name) = split_target(&raw.target);
        if raw.row == 0 {
            return Err(ConvertError::config("row must be 1 or greater.").into());
        }

        let mut handlers = Vec::new();
        if let Some(h) = raw.handler {
            handlers.push(HandlerSpec::try_from(h)?);
        }
        for h in raw.handlers.unwrap_or_default() {
            handlers.push(HandlerSpec::try_from(h)?);
        }
        for handler in &mut handlers {
            if let Some(source) = &handler.source
                && source.is_relative()
                && let Ok(found) = settings.search_schema_path(&source.to_string_lossy())
            {
                handler.source = Some(found);
            }
        }

        let mut fields = raw
            .fields
            .into_iter()
            .map(Field::try_from)
            .collect::<Result<Vec<_>>>()?;
        if handlers.iter().any(|h| h.sort_keys) {
            fields.sort_by(|a, b| a.column.cmp(&b.column));
        }
        for (index, field) in fields.iter_mut().enumerate() {
            field.index = index;
        }

        Ok(Self {
            name: doc_name,
            path: name.to_string(),
            target: raw.target,
            source_path,
            sheet_name,
            row: raw.row,
            handlers,
            fields,
            source_root: settings.source_search_path.clone(),
        })
    }

    /// Every relation referenced by this document's fields, in field order.
    #[must_use]
    pub fn relations(&self) -> Vec<Relation> {
        self.fields
            .iter()
            .filter_map(|f| f.relation.clone())
            .collect()
    }

    /// Physical source paths. A glob target expands to every matching file,
    /// sorted; a plain target yields one path whether or not it exists.
    ///
    /// # Errors
    /// Fails on an invalid glob pattern.
    pub fn source_paths(&self) -> Result<Vec<PathBuf>> {
        let joined = self.source_root.join(&self.source_path);
        if !is_pattern(&self.source_path) {
            return Ok(vec![joined]);
        }
        expand_glob(&joined.to_string_lossy())
            .with_context(|| format!("{}: target={}", self.path, self.target))
    }

    /// Whether every handler is `none`, so the job produces no output.
    #[must_use]
    pub fn writes_nothing(&self) -> bool {
        self.handlers.iter().all(|h| h.kind == HandlerKind::None)
    }

    #[must_use]
    pub fn field_by_column(&self, column: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.column == column)
    }
}

fn default_name(path: &str) -> String {
    let stem = match path.rfind('.') {
        Some(pos) => &path[..pos],
        None => path,
    };
    stem.replace('/', "_")
}

fn split_target(target: &str) -> (String, String) {
    let rest = target.strip_prefix(TARGET_SCHEME).unwrap_or(target);
    match rest.split_once('#') {
        Some((path, sheet)) => (path.to_string(), sheet.to_string()),
        None => (rest.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_defaults_to_path_stem() {
        assert_eq!(default_name("master/items.yaml"), "master_items");
        assert_eq!(default_name("plain"), "plain");
    }

    #[test]
    fn target_scheme_and_sheet() {
        assert_eq!(
            split_target("xls:///data/items.xlsx#Items"),
            ("data/items.xlsx".to_string(), "Items".to_string())
        );
        assert_eq!(split_target("items.csv"), ("items.csv".to_string(), String::new()));
    }
}

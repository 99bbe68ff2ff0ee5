//! Output handlers.
//!
//! Every handler is a [`RowSink`] that buffers the converted rows of one job and
//! renders them into a single output file on [`OutputHandler::save`]:
//!
//! - `json` / `djangofixture` - [`json::JsonHandler`]
//! - `lua` - [`lua::LuaHandler`]
//! - `csv` - [`csv::CsvHandler`]
//! - `messagepack` - [`msgpack::MessagePackHandler`] (feature `msgpack`)
//! - `template` - [`template::TemplateHandler`] (feature `template`)

pub mod csv;
pub mod json;
pub mod lua;
#[cfg(feature = "msgpack")]
pub mod msgpack;
#[cfg(feature = "template")]
pub mod template;

use crate::convert::RowSink;
use crate::error::ConvertError;
use crate::io::write_file;
use crate::relation::RelationCache;
use crate::schema::{Field, HandlerKind, HandlerSpec, JobDescriptor};
use crate::value::Value;
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// A row sink that turns buffered rows into one output file.
pub trait OutputHandler: RowSink + Send {
    fn spec(&self) -> &HandlerSpec;

    /// The complete file contents.
    ///
    /// # Errors
    /// Fails when the buffered rows cannot be encoded.
    fn render(&self) -> Result<Vec<u8>>;

    /// Render and write to `<output_base>/<path>`, creating parent directories.
    /// Returns the written path.
    ///
    /// # Errors
    /// Fails when rendering or writing fails.
    fn save(&self, output_base: &Path) -> Result<PathBuf> {
        let path = output_base.join(&self.spec().path);
        let bytes = self.render()?;
        write_file(&path, &bytes).with_context(|| format!("output {}", self.spec().path))?;
        Ok(path)
    }
}

/// Build the handler for `spec`. `none` handlers yield `None`.
///
/// # Errors
/// Fails when the document lacks what the handler needs (an `id` field for
/// fixtures, a published relation map for typed csv headers) or the handler
/// type is not compiled in.
pub fn build(
    spec: &HandlerSpec,
    doc: &JobDescriptor,
    relations: &RelationCache,
) -> Result<Option<Box<dyn OutputHandler>>> {
    let handler: Box<dyn OutputHandler> = match spec.kind {
        HandlerKind::None => return Ok(None),
        HandlerKind::Json => Box::new(json::JsonHandler::new(spec.clone())),
        HandlerKind::DjangoFixture => Box::new(json::JsonHandler::fixture(spec.clone(), doc)?),
        HandlerKind::Lua => Box::new(lua::LuaHandler::new(spec.clone(), doc)?),
        HandlerKind::Csv => Box::new(csv::CsvHandler::new(spec.clone(), doc, relations)?),
        #[cfg(feature = "msgpack")]
        HandlerKind::MessagePack => Box::new(msgpack::MessagePackHandler::new(spec.clone(), doc)),
        #[cfg(not(feature = "msgpack"))]
        HandlerKind::MessagePack => {
            bail!(ConvertError::config("handler.type=messagepack: not compiled in."))
        }
        #[cfg(feature = "template")]
        HandlerKind::Template => Box::new(template::TemplateHandler::new(spec.clone())?),
        #[cfg(not(feature = "template"))]
        HandlerKind::Template => {
            bail!(ConvertError::config("handler.type=template: not compiled in."))
        }
    };
    Ok(Some(handler))
}

/// Rows collected in field order, keyed by output column. Comment rows are
/// dropped.
#[derive(Debug, Default)]
pub(crate) struct Rows {
    rows: Vec<Vec<(String, Value)>>,
    in_comment: bool,
}

impl Rows {
    pub(crate) fn begin_comment_row(&mut self) {
        self.in_comment = true;
    }

    pub(crate) fn end_comment_row(&mut self) {
        self.in_comment = false;
    }

    pub(crate) fn begin_row(&mut self) {
        self.rows.push(Vec::new());
    }

    pub(crate) fn field(&mut self, field: &Field, value: Value) {
        if self.in_comment {
            return;
        }
        if let Some(row) = self.rows.last_mut() {
            row.push((field.column.clone(), value));
        }
    }

    pub(crate) fn last(&self) -> Option<&[(String, Value)]> {
        self.rows.last().map(Vec::as_slice)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &[(String, Value)]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Output column used as the fixture primary key.
pub(crate) fn primary_key_column(doc: &JobDescriptor) -> Result<String> {
    doc.fields
        .iter()
        .rev()
        .find(|f| matches!(f.column.as_str(), "id" | "ID" | "Id"))
        .map(|f| f.column.clone())
        .ok_or_else(|| ConvertError::config("id field is not found.").into())
}

/// The primary key of a buffered row.
pub(crate) fn primary_key<'r>(row: &'r [(String, Value)], column: &str) -> Result<&'r Value> {
    match row.iter().find(|(c, _)| c == column).map(|(_, v)| v) {
        Some(v @ (Value::Int(_) | Value::Str(_))) => Ok(v),
        Some(_) => bail!(ConvertError::data("bad pk type.")),
        None => bail!(ConvertError::data("pk column not found.")),
    }
}

/// `item_id` → `ItemId`: letters after a non-letter are upper-cased, letters
/// after a letter lower-cased, underscores dropped.
#[must_use]
pub fn upper_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c != '_' {
            let after_letter = prev.is_some_and(|p| p.is_ascii_alphabetic());
            if !after_letter && c.is_ascii_lowercase() {
                out.push(c.to_ascii_uppercase());
            } else if after_letter && c.is_ascii_uppercase() {
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        }
        prev = Some(c);
    }
    out
}

/// `item_id` → `itemId`. Like [`upper_camel`] but the first letter is kept.
#[must_use]
pub fn lower_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c != '_' {
            match prev.map(|p| p.is_ascii_alphabetic()) {
                Some(false) if c.is_ascii_lowercase() => out.push(c.to_ascii_uppercase()),
                Some(true) if c.is_ascii_uppercase() => out.push(c.to_ascii_lowercase()),
                _ => out.push(c),
            }
        }
        prev = Some(c);
    }
    out
}

/// `itemId` → `item_id`. Runs of capitals stay together.
#[must_use]
pub fn snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev: Option<char> = None;
    for c in s.chars() {
        if c.is_ascii_uppercase()
            && prev.is_some_and(|p| p != '_' && !p.is_ascii_uppercase())
        {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
        prev = Some(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{lower_camel, snake_case, upper_camel};

    #[test]
    fn upper_camel_names() {
        assert_eq!(upper_camel("item_id"), "ItemId");
        assert_eq!(upper_camel("name"), "Name");
        assert_eq!(upper_camel("ID"), "Id");
        assert_eq!(upper_camel("slot_2x"), "Slot2X");
    }

    #[test]
    fn lower_camel_names() {
        assert_eq!(lower_camel("snake_case_string"), "snakeCaseString");
        assert_eq!(lower_camel("item_ID"), "itemId");
        assert_eq!(lower_camel("name"), "name");
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(snake_case("camelCaseString"), "camel_case_string");
        assert_eq!(snake_case("Test1TTest_Abc"), "test1_ttest_abc");
        assert_eq!(snake_case("ItemID"), "item_id");
    }
}

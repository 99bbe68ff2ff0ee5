//! `template` output: rows rendered through a user-supplied Handlebars template.
//!
//! The template sees the handler's `context` map plus `records`, a list with one
//! object per row. Each record maps output columns to the value's text and
//! carries `fields`, a list of `{column, name, type, value}` in field order.
//!
//! Besides the Handlebars built-ins (`eq`, `ne`, `if`, `each`, ...) the
//! registry provides `upper`, `lower`, `snake_case`, `upper_camel` and
//! `lower_camel`. Non-string arguments pass through unchanged.

use super::{OutputHandler, lower_camel, snake_case, upper_camel};
use crate::convert::RowSink;
use crate::error::ConvertError;
use crate::schema::{Field, HandlerSpec};
use crate::value::Value;
use anyhow::{Context, Result};
use handlebars::{Handlebars, handlebars_helper, no_escape};
use serde_json::{Map, Value as Json, json};
use std::fs;

const TEMPLATE_NAME: &str = "output";

fn map_str(value: &Json, f: impl Fn(&str) -> String) -> Json {
    match value.as_str() {
        Some(s) => Json::String(f(s)),
        None => value.clone(),
    }
}

handlebars_helper!(upper_helper: |v: Json| map_str(v, str::to_ascii_uppercase));
handlebars_helper!(lower_helper: |v: Json| map_str(v, str::to_ascii_lowercase));
handlebars_helper!(snake_case_helper: |v: Json| map_str(v, snake_case));
handlebars_helper!(upper_camel_helper: |v: Json| map_str(v, upper_camel));
handlebars_helper!(lower_camel_helper: |v: Json| map_str(v, lower_camel));

/// A registry holding the parsed template and the case helpers. Output is not
/// HTML-escaped.
///
/// # Errors
/// Fails when the template does not parse.
pub fn registry(text: &str) -> Result<Handlebars<'static>> {
    let mut registry = Handlebars::new();
    registry.register_escape_fn(no_escape);
    registry.register_helper("upper", Box::new(upper_helper));
    registry.register_helper("lower", Box::new(lower_helper));
    registry.register_helper("snake_case", Box::new(snake_case_helper));
    registry.register_helper("upper_camel", Box::new(upper_camel_helper));
    registry.register_helper("lower_camel", Box::new(lower_camel_helper));
    registry
        .register_template_string(TEMPLATE_NAME, text)
        .map_err(|e| ConvertError::config(format!("template: {e}")))?;
    Ok(registry)
}

pub struct TemplateHandler {
    spec: HandlerSpec,
    registry: Handlebars<'static>,
    records: Vec<Json>,
    record: Map<String, Json>,
    fields: Vec<Json>,
    in_comment: bool,
}

impl TemplateHandler {
    /// Read and parse the template named by `spec.source`.
    ///
    /// # Errors
    /// Fails when the template is missing, unreadable or malformed.
    pub fn new(spec: HandlerSpec) -> Result<Self> {
        let source = spec
            .source
            .clone()
            .ok_or_else(|| ConvertError::config("handler.type=template: requires source."))?;
        let text = fs::read_to_string(&source)
            .map_err(|e| ConvertError::resource(source.display(), e.to_string()))?;
        let registry = registry(&text).with_context(|| source.display().to_string())?;
        Ok(Self {
            spec,
            registry,
            records: Vec::new(),
            record: Map::new(),
            fields: Vec::new(),
            in_comment: false,
        })
    }

    fn context(&self) -> Json {
        let mut context = match &self.spec.context {
            Json::Object(map) => map.clone(),
            _ => Map::new(),
        };
        context.insert("records".to_string(), Json::Array(self.records.clone()));
        Json::Object(context)
    }
}

impl RowSink for TemplateHandler {
    fn begin(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn begin_comment_row(&mut self) -> Result<()> {
        self.in_comment = true;
        Ok(())
    }

    fn end_comment_row(&mut self) -> Result<()> {
        self.in_comment = false;
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()> {
        self.record = Map::new();
        self.fields = Vec::new();
        Ok(())
    }

    fn field(&mut self, field: &Field, value: Value) -> Result<()> {
        if self.in_comment {
            return Ok(());
        }
        let text = value.to_string();
        self.fields.push(json!({
            "column": field.column,
            "name": field.name,
            "type": field.kind.as_str(),
            "value": text,
        }));
        self.record.insert(field.column.clone(), Json::String(text));
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        let mut record = std::mem::take(&mut self.record);
        record.insert("fields".to_string(), Json::Array(std::mem::take(&mut self.fields)));
        self.records.push(Json::Object(record));
        Ok(())
    }
}

impl OutputHandler for TemplateHandler {
    fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    fn render(&self) -> Result<Vec<u8>> {
        let text = self
            .registry
            .render(TEMPLATE_NAME, &self.context())
            .map_err(|e| ConvertError::data(format!("template: {e}")))?;
        Ok(text.into_bytes())
    }
}

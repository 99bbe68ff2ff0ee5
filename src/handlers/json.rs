//! `json` and `djangofixture` output.

use super::{OutputHandler, Rows, primary_key, primary_key_column};
use crate::convert::RowSink;
use crate::schema::{Field, HandlerSpec, JobDescriptor};
use crate::value::Value;
use anyhow::Result;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::ser::{CompactFormatter, PrettyFormatter};

/// One buffered row serialized as an object in field order.
struct Object<'r>(&'r [(String, Value)]);

impl Serialize for Object<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct FixtureRow<'r> {
    fields: Object<'r>,
    pk: &'r Value,
}

pub struct JsonHandler {
    spec: HandlerSpec,
    rows: Rows,
    /// Set for `djangofixture`: rows are wrapped as `{"fields": .., "pk": ..}`.
    pk_column: Option<String>,
}

impl JsonHandler {
    #[must_use]
    pub fn new(spec: HandlerSpec) -> Self {
        Self {
            spec,
            rows: Rows::default(),
            pk_column: None,
        }
    }

    /// # Errors
    /// Fails when the document has no `id`/`ID`/`Id` field.
    pub fn fixture(spec: HandlerSpec, doc: &JobDescriptor) -> Result<Self> {
        Ok(Self {
            pk_column: Some(primary_key_column(doc)?),
            ..Self::new(spec)
        })
    }

    fn to_writer<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        if self.spec.indent < 0 {
            let mut ser = serde_json::Serializer::with_formatter(&mut out, CompactFormatter);
            value.serialize(&mut ser)?;
        } else {
            let indent = " ".repeat(usize::try_from(self.spec.indent).unwrap_or_default());
            let mut ser = serde_json::Serializer::with_formatter(
                &mut out,
                PrettyFormatter::with_indent(indent.as_bytes()),
            );
            value.serialize(&mut ser)?;
        }
        out.push(b'\n');
        Ok(out)
    }
}

/// Replace every non-ASCII character with `\uXXXX` escapes (surrogate pairs
/// above the BMP). Valid on serialized JSON since such characters only occur
/// inside strings.
#[must_use]
pub fn escape_non_ascii(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut units = [0u16; 2];
    for c in json.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

impl RowSink for JsonHandler {
    fn begin_comment_row(&mut self) -> Result<()> {
        self.rows.begin_comment_row();
        Ok(())
    }

    fn end_comment_row(&mut self) -> Result<()> {
        self.rows.end_comment_row();
        Ok(())
    }

    fn begin_row(&mut self) -> Result<()> {
        self.rows.begin_row();
        Ok(())
    }

    fn field(&mut self, field: &Field, value: Value) -> Result<()> {
        self.rows.field(field, value);
        Ok(())
    }

    fn end_row(&mut self) -> Result<()> {
        if let (Some(column), Some(row)) = (&self.pk_column, self.rows.last()) {
            primary_key(row, column)?;
        }
        Ok(())
    }
}

impl OutputHandler for JsonHandler {
    fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    fn render(&self) -> Result<Vec<u8>> {
        let bytes = match &self.pk_column {
            None => {
                let objects: Vec<Object<'_>> = self.rows.iter().map(Object).collect();
                self.to_writer(&objects)?
            }
            Some(column) => {
                let rows = self
                    .rows
                    .iter()
                    .map(|row| {
                        Ok(FixtureRow {
                            fields: Object(row),
                            pk: primary_key(row, column)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                self.to_writer(&rows)?
            }
        };
        if self.spec.allow_non_ascii {
            return Ok(bytes);
        }
        let text = String::from_utf8(bytes)?;
        Ok(escape_non_ascii(&text).into_bytes())
    }
}

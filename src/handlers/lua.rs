//! `lua` output: a chunk returning a table of `{fields = {...}, pk = ...}` rows.

use super::{OutputHandler, Rows, primary_key, primary_key_column};
use crate::convert::RowSink;
use crate::schema::{Field, HandlerSpec, JobDescriptor};
use crate::value::{Value, format_float};
use anyhow::Result;
use std::fmt::Write;

pub struct LuaHandler {
    spec: HandlerSpec,
    rows: Rows,
    pk_column: String,
}

/// Layout strings derived from the handler indent.
struct Layout {
    indent: String,
    space: &'static str,
    endl: &'static str,
}

impl LuaHandler {
    /// # Errors
    /// Fails when the document has no `id`/`ID`/`Id` field.
    pub fn new(spec: HandlerSpec, doc: &JobDescriptor) -> Result<Self> {
        Ok(Self {
            spec,
            rows: Rows::default(),
            pk_column: primary_key_column(doc)?,
        })
    }

    fn layout(&self) -> Layout {
        match usize::try_from(self.spec.indent) {
            Ok(n) => Layout {
                indent: " ".repeat(n),
                space: " ",
                endl: "\n",
            },
            Err(_) => Layout {
                indent: String::new(),
                space: "",
                endl: "",
            },
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("[{}]", quote(name))
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(v) => format_float(*v),
        Value::Str(s) => quote(s),
    }
}

impl RowSink for LuaHandler {
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
        if let Some(row) = self.rows.last() {
            primary_key(row, &self.pk_column)?;
        }
        Ok(())
    }
}

impl OutputHandler for LuaHandler {
    fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    fn render(&self) -> Result<Vec<u8>> {
        let Layout { indent, space, endl } = self.layout();
        let eq = format!("{space}={space}");
        let mut out = format!("return{space}{{");
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write!(out, "{endl}{indent}{{{endl}{indent}{indent}fields{eq}{{")?;
            for (j, (column, value)) in row.iter().enumerate() {
                if j > 0 {
                    out.push(',');
                }
                write!(
                    out,
                    "{endl}{indent}{indent}{indent}{}{eq}{}",
                    key(column),
                    literal(value)
                )?;
            }
            if !row.is_empty() {
                write!(out, "{endl}{indent}{indent}")?;
            }
            let pk = primary_key(row, &self.pk_column)?;
            write!(
                out,
                "}},{endl}{indent}{indent}pk{eq}{}{endl}{indent}}}",
                literal(pk)
            )?;
        }
        write!(out, "{endl}}}\n")?;
        Ok(out.into_bytes())
    }
}

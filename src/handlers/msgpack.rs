//! `messagepack` output: an array of rows, each an array of values, headed by
//! the column names unless `messagepack_no_header` is set.

use super::{OutputHandler, Rows, upper_camel};
use crate::convert::RowSink;
use crate::schema::{Field, FieldType, HandlerSpec, JobDescriptor};
use crate::value::Value;
use anyhow::Result;

pub struct MessagePackHandler {
    spec: HandlerSpec,
    header: Option<Vec<Value>>,
    rows: Rows,
}

impl MessagePackHandler {
    #[must_use]
    pub fn new(spec: HandlerSpec, doc: &JobDescriptor) -> Self {
        let header = (!spec.messagepack_no_header).then(|| {
            doc.fields
                .iter()
                .filter(|f| f.kind != FieldType::IsIgnored)
                .map(|f| {
                    if spec.messagepack_upper_camelize {
                        Value::Str(upper_camel(&f.column))
                    } else {
                        Value::Str(f.column.clone())
                    }
                })
                .collect()
        });
        Self {
            spec,
            header,
            rows: Rows::default(),
        }
    }
}

impl RowSink for MessagePackHandler {
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
        Ok(())
    }
}

impl OutputHandler for MessagePackHandler {
    fn spec(&self) -> &HandlerSpec {
        &self.spec
    }

    fn render(&self) -> Result<Vec<u8>> {
        let mut table: Vec<Vec<&Value>> = Vec::new();
        if let Some(header) = &self.header {
            table.push(header.iter().collect());
        }
        for row in self.rows.iter() {
            table.push(row.iter().map(|(_, v)| v).collect());
        }
        Ok(rmp_serde::to_vec(&table)?)
    }
}

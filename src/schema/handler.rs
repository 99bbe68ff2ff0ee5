use crate::error::ConvertError;
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value as Json;
use serde_yaml::Value as Yaml;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    None,
    Json,
    Csv,
    DjangoFixture,
    Lua,
    MessagePack,
    Template,
}

impl HandlerKind {
    /// Parse a handler type. Dotted names (`handlers.json`) use their last segment.
    ///
    /// # Errors
    /// Fails for unknown handler types.
    pub fn parse(name: &str) -> Result<Self> {
        let short = name.rsplit('.').next().unwrap_or(name);
        Ok(match short {
            "none" => HandlerKind::None,
            "json" => HandlerKind::Json,
            "csv" => HandlerKind::Csv,
            "djangofixture" => HandlerKind::DjangoFixture,
            "lua" => HandlerKind::Lua,
            "messagepack" => HandlerKind::MessagePack,
            "template" => HandlerKind::Template,
            other => {
                return Err(ConvertError::config(format!("unknown handler.type: {other}")).into());
            }
        })
    }
}

/// Output options of one handler entry.
#[derive(Clone, Debug)]
pub struct HandlerSpec {
    pub kind: HandlerKind,
    pub type_name: String,
    /// Output path relative to the output base.
    pub path: String,
    /// Pretty-print indent; negative means compact output.
    pub indent: i32,
    pub sort_keys: bool,
    pub allow_non_ascii: bool,
    /// 1-based sheet row written first as a comment row (csv).
    pub comment_row: Option<usize>,
    pub csv_field_type: bool,
    pub csv_field_column: bool,
    pub messagepack_no_header: bool,
    pub messagepack_upper_camelize: bool,
    /// Template file (template). Relative paths are resolved on the schema
    /// search paths when the document is loaded.
    pub source: Option<PathBuf>,
    /// Extra template variables; `records` is always overwritten.
    pub context: Json,
}

impl Default for HandlerSpec {
    fn default() -> Self {
        Self {
            kind: HandlerKind::None,
            type_name: "none".to_string(),
            path: String::new(),
            indent: 4,
            sort_keys: false,
            allow_non_ascii: false,
            comment_row: None,
            csv_field_type: false,
            csv_field_column: false,
            messagepack_no_header: false,
            messagepack_upper_camelize: false,
            source: None,
            context: Json::Null,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawHandler {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    indent: Option<i32>,
    #[serde(default)]
    sort_keys: bool,
    #[serde(default)]
    allow_non_ascii: bool,
    #[serde(default)]
    comment_row: Option<usize>,
    #[serde(default)]
    csv_field_type: bool,
    #[serde(default)]
    csv_field_column: bool,
    #[serde(default)]
    messagepack_no_header: bool,
    #[serde(default)]
    messagepack_upper_camelize: bool,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    context: Option<Yaml>,
}

impl TryFrom<RawHandler> for HandlerSpec {
    type Error = anyhow::Error;

    fn try_from(raw: RawHandler) -> Result<Self> {
        let kind = HandlerKind::parse(&raw.kind)?;
        if kind != HandlerKind::None && raw.path.is_empty() {
            return Err(ConvertError::config(format!("handler.type={}: requires path.", raw.kind)).into());
        }
        if kind == HandlerKind::Template && raw.source.as_deref().is_none_or(str::is_empty) {
            return Err(ConvertError::config("handler.type=template: requires source.").into());
        }
        let context = match raw.context {
            None | Some(Yaml::Null) => Json::Null,
            Some(yaml @ Yaml::Mapping(_)) => serde_json::to_value(yaml)
                .map_err(|e| ConvertError::config(format!("handler.context: {e}")))?,
            Some(_) => return Err(ConvertError::config("handler.context must be a map.").into()),
        };
        Ok(HandlerSpec {
            kind,
            type_name: raw.kind,
            path: raw.path,
            indent: raw.indent.unwrap_or(4),
            sort_keys: raw.sort_keys,
            allow_non_ascii: raw.allow_non_ascii,
            comment_row: raw.comment_row,
            csv_field_type: raw.csv_field_type,
            csv_field_column: raw.csv_field_column,
            messagepack_no_header: raw.messagepack_no_header,
            messagepack_upper_camelize: raw.messagepack_upper_camelize,
            source: raw.source.map(PathBuf::from),
            context,
        })
    }
}

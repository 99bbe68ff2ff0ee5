use crate::error::ConvertError;
use crate::value::Value;
use anyhow::Result;
use serde::Deserialize;
use serde_yaml::Value as Yaml;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Char,
    DateTime,
    UnixTime,
    Any,
    ForeignKey,
    IsIgnored,
}

impl FieldType {
    /// # Errors
    /// Fails for names outside the supported set.
    pub fn parse(name: &str) -> Result<Self> {
        Ok(match name {
            "int" => FieldType::Int,
            "float" => FieldType::Float,
            "bool" => FieldType::Bool,
            "char" => FieldType::Char,
            "datetime" => FieldType::DateTime,
            "unixtime" => FieldType::UnixTime,
            "any" => FieldType::Any,
            "foreignkey" => FieldType::ForeignKey,
            "isignored" => FieldType::IsIgnored,
            other => {
                return Err(ConvertError::config(format!("unknown field.type: {other}")).into());
            }
        })
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Char => "char",
            FieldType::DateTime => "datetime",
            FieldType::UnixTime => "unixtime",
            FieldType::Any => "any",
            FieldType::ForeignKey => "foreignkey",
            FieldType::IsIgnored => "isignored",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A foreign-key reference: values of `key` in document `from` map to `column`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "RawRelation")]
pub struct Relation {
    pub column: String,
    pub from: String,
    pub key: String,
    /// `<column>:<from>:<key>`; equal ids denote the same lookup table.
    pub id: String,
}

#[derive(Deserialize)]
struct RawRelation {
    column: String,
    from: String,
    key: String,
}

impl From<RawRelation> for Relation {
    fn from(raw: RawRelation) -> Self {
        Relation::new(raw.column, raw.from, raw.key)
    }
}

impl Relation {
    pub fn new(column: impl Into<String>, from: impl Into<String>, key: impl Into<String>) -> Self {
        let (column, from, key) = (column.into(), from.into(), key.into());
        let id = format!("{column}:{from}:{key}");
        Self {
            column,
            from,
            key,
            id,
        }
    }
}

/// Per-field validation rules.
#[derive(Clone, Debug, Default)]
pub struct ValidateSpec {
    pub unique: bool,
    pub sorted: bool,
    pub sequential: bool,
    pub min: Option<i64>,
    pub max: Option<i64>,
    /// Accepted values as written; integer-looking entries also land in `anyof_ints`.
    pub anyof: Option<HashSet<String>>,
    pub anyof_ints: HashSet<i64>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct RawValidate {
    unique: bool,
    sorted: bool,
    sequential: bool,
    min: Option<i64>,
    max: Option<i64>,
    anyof: Option<Vec<Yaml>>,
}

impl TryFrom<RawValidate> for ValidateSpec {
    type Error = anyhow::Error;

    fn try_from(raw: RawValidate) -> Result<Self> {
        let mut spec = ValidateSpec {
            unique: raw.unique,
            sorted: raw.sorted,
            sequential: raw.sequential,
            min: raw.min,
            max: raw.max,
            ..ValidateSpec::default()
        };
        if let Some(items) = raw.anyof {
            let mut strings = HashSet::new();
            for item in &items {
                let s = scalar_to_string(item)?;
                if let Ok(i) = s.parse::<i64>() {
                    spec.anyof_ints.insert(i);
                }
                strings.insert(s);
            }
            spec.anyof = Some(strings);
        }
        Ok(spec)
    }
}

/// A typed column of a schema document.
#[derive(Clone, Debug)]
pub struct Field {
    /// Output key.
    pub column: String,
    /// Header text that locates the column in the sheet.
    pub name: String,
    pub kind: FieldType,
    pub type_alias: Option<String>,
    pub optional: bool,
    pub default: Option<Value>,
    pub validate: Option<ValidateSpec>,
    pub relation: Option<Relation>,
    pub definition: Option<HashMap<String, String>>,
    /// Position in the document's (possibly sorted) field list.
    pub index: usize,
}

#[derive(Deserialize)]
pub(crate) struct RawField {
    column: String,
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    type_alias: Option<String>,
    #[serde(default)]
    optional: bool,
    // Present-but-null must stay distinguishable from absent.
    #[serde(default, deserialize_with = "present")]
    default: Option<Yaml>,
    #[serde(default)]
    validate: Option<RawValidate>,
    #[serde(default)]
    relation: Option<Relation>,
    #[serde(default)]
    definition: Option<serde_yaml::Mapping>,
}

fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Yaml>, D::Error> {
    Yaml::deserialize(d).map(Some)
}

impl TryFrom<RawField> for Field {
    type Error = anyhow::Error;

    fn try_from(raw: RawField) -> Result<Self> {
        let kind = FieldType::parse(&raw.kind)?;
        let default = raw.default.as_ref().map(yaml_to_value).transpose()?;
        if default.is_some() && raw.definition.is_some() {
            return Err(ConvertError::config(format!(
                "field={}: using 'default' and 'definition' at same field.",
                raw.column
            ))
            .into());
        }
        if kind == FieldType::ForeignKey && raw.relation.is_none() {
            return Err(ConvertError::config(format!(
                "field={}: foreignkey requires relation.",
                raw.column
            ))
            .into());
        }
        let definition = match raw.definition {
            Some(mapping) => {
                let mut map = HashMap::with_capacity(mapping.len());
                for (k, v) in &mapping {
                    map.insert(scalar_to_string(k)?, scalar_to_string(v)?);
                }
                Some(map)
            }
            None => None,
        };
        Ok(Field {
            column: raw.column,
            name: raw.name,
            kind,
            type_alias: raw.type_alias.filter(|s| !s.is_empty()),
            optional: raw.optional,
            default,
            validate: raw.validate.map(ValidateSpec::try_from).transpose()?,
            relation: raw.relation,
            definition,
            index: 0,
        })
    }
}

fn yaml_to_value(node: &Yaml) -> Result<Value> {
    Ok(match node {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(*b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Yaml::String(s) => Value::Str(s.clone()),
        Yaml::Sequence(_) => return Err(ConvertError::config("bad default type: sequence.").into()),
        Yaml::Mapping(_) => return Err(ConvertError::config("bad default type: map.").into()),
        Yaml::Tagged(tagged) => yaml_to_value(&tagged.value)?,
    })
}

fn scalar_to_string(node: &Yaml) -> Result<String> {
    Ok(match node {
        Yaml::Null => String::new(),
        Yaml::Bool(b) => b.to_string(),
        Yaml::Number(n) => n.to_string(),
        Yaml::String(s) => s.clone(),
        Yaml::Tagged(tagged) => scalar_to_string(&tagged.value)?,
        Yaml::Sequence(_) | Yaml::Mapping(_) => {
            return Err(ConvertError::config("expected a scalar value.").into());
        }
    })
}

//! Tests for schema document loading.

mod common;

use anyhow::Result;
use common::Fixture;
use ironsheet::schema::HandlerKind;
use ironsheet::{FieldType, JobDescriptor, Relation, Settings, Value};

fn parse(text: &str) -> Result<JobDescriptor> {
    JobDescriptor::from_yaml("master/items.yaml", text, &Settings::default())
}

fn error_text(text: &str) -> String {
    match parse(text) {
        Ok(_) => panic!("document should be rejected"),
        Err(err) => format!("{err:#}"),
    }
}

#[test]
fn test_document_fields_and_target() -> Result<()> {
    let doc = parse(
        r#"
target: xls:///data/items.xlsx#Items
row: 2
handler: {type: json, path: out/items.json, indent: 2}
fields:
  - {column: id, name: ID, type: int, validate: {unique: true, min: 1}}
  - {column: kind, name: Kind, type: char, type_alias: ItemKind, validate: {anyof: [a, b, 3]}}
  - {column: note, name: Note, type: char, optional: true, default: ~}
  - {column: rank, name: Rank, type: int, definition: {S: 3, A: 2}}
"#,
    )?;
    assert_eq!(doc.name, "master_items");
    assert_eq!(doc.path, "master/items.yaml");
    assert_eq!(doc.source_path, "data/items.xlsx");
    assert_eq!(doc.sheet_name, "Items");
    assert_eq!(doc.row, 2);
    assert_eq!(doc.handlers.len(), 1);
    assert_eq!(doc.handlers[0].kind, HandlerKind::Json);
    assert_eq!(doc.handlers[0].indent, 2);

    let id = doc.field_by_column("id").unwrap();
    assert_eq!(id.kind, FieldType::Int);
    let validate = id.validate.as_ref().unwrap();
    assert!(validate.unique);
    assert_eq!(validate.min, Some(1));

    let kind = doc.field_by_column("kind").unwrap();
    assert_eq!(kind.type_alias.as_deref(), Some("ItemKind"));
    let anyof = kind.validate.as_ref().unwrap();
    assert!(anyof.anyof.as_ref().unwrap().contains("a"));
    assert!(anyof.anyof_ints.contains(&3));

    let note = doc.field_by_column("note").unwrap();
    assert!(note.optional);
    assert_eq!(note.default, Some(Value::Null));

    let rank = doc.field_by_column("rank").unwrap();
    assert_eq!(rank.definition.as_ref().unwrap()["S"], "3");
    assert!(rank.default.is_none());
    Ok(())
}

#[test]
fn test_explicit_name_and_merged_handlers() -> Result<()> {
    let doc = parse(
        r#"
name: Items
target: items.csv
row: 1
handler: {type: handlers.json, path: a.json}
handlers:
  - {type: csv, path: a.csv}
  - {type: none}
fields: []
"#,
    )?;
    assert_eq!(doc.name, "Items");
    let kinds: Vec<_> = doc.handlers.iter().map(|h| h.kind).collect();
    assert_eq!(kinds, vec![HandlerKind::Json, HandlerKind::Csv, HandlerKind::None]);
    assert!(!doc.writes_nothing());
    Ok(())
}

#[test]
fn test_sort_keys_orders_fields_and_indices() -> Result<()> {
    let doc = parse(
        r#"
target: items.csv
row: 1
handler: {type: json, path: a.json, sort_keys: true}
fields:
  - {column: zeta, name: Z, type: int}
  - {column: alpha, name: A, type: int}
  - {column: mid, name: M, type: int}
"#,
    )?;
    let columns: Vec<_> = doc.fields.iter().map(|f| f.column.as_str()).collect();
    assert_eq!(columns, vec!["alpha", "mid", "zeta"]);
    let indices: Vec<_> = doc.fields.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    Ok(())
}

#[test]
fn test_relations_in_field_order() -> Result<()> {
    let doc = parse(
        r#"
target: items.csv
row: 1
handler: {type: none}
fields:
  - {column: a, name: A, type: foreignkey, relation: {column: id, from: x.yaml, key: code}}
  - {column: b, name: B, type: int}
  - {column: c, name: C, type: foreignkey, relation: {column: id, from: y.yaml, key: name}}
"#,
    )?;
    let relations = doc.relations();
    assert_eq!(
        relations,
        vec![
            Relation::new("id", "x.yaml", "code"),
            Relation::new("id", "y.yaml", "name"),
        ]
    );
    assert_eq!(relations[0].id, "id:x.yaml:code");
    assert!(doc.writes_nothing());
    Ok(())
}

#[test]
fn test_invalid_documents() {
    let cases = [
        (
            "target: a.csv\nrow: 1\nfields:\n  - {column: a, name: A, type: decimal}\n",
            "unknown field.type: decimal",
        ),
        (
            "target: a.csv\nrow: 1\nfields:\n  - {column: a, name: A, type: int, default: 1, definition: {x: 1}}\n",
            "using 'default' and 'definition' at same field.",
        ),
        (
            "target: a.csv\nrow: 1\nfields:\n  - {column: a, name: A, type: foreignkey}\n",
            "foreignkey requires relation.",
        ),
        (
            "target: a.csv\nrow: 1\nhandler: {type: mustache, path: a.txt}\n",
            "unknown handler.type: mustache",
        ),
        (
            "target: a.csv\nrow: 1\nhandler: {type: template, path: a.txt}\n",
            "handler.type=template: requires source.",
        ),
        (
            "target: a.csv\nrow: 1\nhandler: {type: template, path: a.txt, source: a.hbs, context: [1, 2]}\n",
            "handler.context must be a map.",
        ),
        (
            "target: a.csv\nrow: 1\nhandler: {type: json}\n",
            "requires path.",
        ),
        ("target: a.csv\nrow: 0\n", "row must be 1 or greater."),
    ];
    for (text, expected) in cases {
        let message = error_text(text);
        assert!(message.starts_with("master/items.yaml"), "{message}");
        assert!(message.contains(expected), "{message}");
    }
}

#[test]
fn test_load_missing_and_broken_documents() -> Result<()> {
    let fx = Fixture::new()?;
    let settings = fx.settings(1);

    let err = JobDescriptor::load("nope.yaml", &settings).unwrap_err();
    assert!(format!("{err:#}").contains("nope.yaml: does not exist."));

    fx.schema("broken.yaml", "target: [unterminated\n")?;
    let err = JobDescriptor::load("broken.yaml", &settings).unwrap_err();
    assert!(format!("{err:#}").starts_with("broken.yaml"));
    Ok(())
}

#[test]
fn test_source_paths_expand_globs() -> Result<()> {
    let fx = Fixture::new()?;
    fx.table("parts_b.csv", "ID\n2\n")?;
    fx.table("parts_a.csv", "ID\n1\n")?;
    fx.table("~parts_c.csv", "ID\n3\n")?;
    fx.table("other.csv", "ID\n4\n")?;
    let settings = fx.settings(1);

    let doc = JobDescriptor::from_yaml("parts.yaml", "target: \"*parts_*.csv\"\nrow: 1\n", &settings)?;
    assert_eq!(
        doc.source_paths()?,
        vec![fx.tables.join("parts_a.csv"), fx.tables.join("parts_b.csv")]
    );

    let plain = JobDescriptor::from_yaml("x.yaml", "target: missing.csv\nrow: 1\n", &settings)?;
    assert_eq!(plain.source_paths()?, vec![fx.tables.join("missing.csv")]);
    Ok(())
}

#[test]
fn test_template_source_and_context() -> Result<()> {
    let fx = Fixture::new()?;
    fx.schema("templates/items.hbs", "{{title}}\n")?;
    let settings = fx.settings(1);

    let doc = JobDescriptor::from_yaml(
        "items.yaml",
        "target: items.csv\nrow: 1\nhandler:\n  type: template\n  path: items.txt\n  source: templates/items.hbs\n  context: {title: Items, limits: {max: 3}}\n",
        &settings,
    )?;
    let handler = &doc.handlers[0];
    assert_eq!(handler.kind, HandlerKind::Template);
    assert_eq!(handler.source, Some(fx.schemas.join("templates/items.hbs")));
    assert_eq!(
        handler.context,
        serde_json::json!({"title": "Items", "limits": {"max": 3}})
    );

    let unresolved = JobDescriptor::from_yaml(
        "items.yaml",
        "target: items.csv\nrow: 1\nhandler: {type: template, path: items.txt, source: elsewhere.hbs}\n",
        &settings,
    )?;
    assert_eq!(
        unresolved.handlers[0].source,
        Some(std::path::PathBuf::from("elsewhere.hbs"))
    );
    Ok(())
}

//! End-to-end runs of the staged pipeline over csv sources.

mod common;

use anyhow::Result;
use common::Fixture;
use ironsheet::sync::{KeyedCache, MutexMap};
use ironsheet::{Pipeline, RunStats, SourceProvider, Workbook};
use serde_json::json;
use std::sync::Arc;

fn targets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

#[test]
fn test_foreign_keys_resolve() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    for jobs in [1, 4] {
        let pipeline = Pipeline::new(fx.settings(jobs));
        let report = pipeline.run(&targets(&["items.yaml"]))?;
        assert_eq!(report.jobs, 1);
        assert_eq!(report.outputs, vec![fx.out.join("items.json")]);
        assert_eq!(
            fx.output_json("items.json")?,
            json!([
                {"id": 10, "name": "Sword", "category_id": 1},
                {"id": 11, "name": "Buckler", "category_id": 2},
            ])
        );
        let stats = pipeline.stats();
        assert_eq!(stats.relations_discovered(), 1);
        assert_eq!(stats.relation_replays(), 1);
        assert_eq!(stats.relation_maps_published(), 1);
        assert!(report.relations.has("id:categories.yaml:code"));
    }
    Ok(())
}

#[test]
fn test_unknown_key_fails_the_run() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.table("items.csv", "ID,Name,Category\n10,Sword,WEAPON\n12,Plate,ARMOR\n")?;

    let pipeline = Pipeline::new(fx.settings(2));
    let err = pipeline.run(&targets(&["items.yaml"])).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.starts_with("items.yaml: "), "{message}");
    assert!(
        message.contains("field=category_id: cell[C3]={value=ARMOR,type=string}"),
        "{message}"
    );
    assert!(message.ends_with("relation: key=ARMOR: not found"), "{message}");
    assert!(!fx.out.join("items.json").exists());
    Ok(())
}

#[test]
fn test_transitive_relations() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.schema(
        "groups.yaml",
        "target: groups.csv\nrow: 1\nhandler: {type: none}\nfields:\n  - {column: id, name: ID, type: int}\n  - {column: label, name: Label, type: char}\n",
    )?;
    fx.table("groups.csv", "ID,Label\n100,arms\n200,defense\n")?;
    fx.schema(
        "categories.yaml",
        r#"
target: categories.csv
row: 1
handler: {type: json, path: categories.json, indent: -1}
fields:
  - {column: id, name: ID, type: int}
  - {column: code, name: Code, type: char}
  - column: group_id
    name: Group
    type: foreignkey
    relation: {column: id, from: groups.yaml, key: label}
"#,
    )?;
    fx.table("categories.csv", "ID,Code,Group\n1,WEAPON,arms\n2,SHIELD,defense\n")?;

    let pipeline = Pipeline::new(fx.settings(3));
    let report = pipeline.run(&targets(&["items.yaml", "categories.yaml"]))?;
    assert_eq!(report.jobs, 2);
    assert_eq!(
        report.outputs,
        vec![fx.out.join("categories.json"), fx.out.join("items.json")]
    );
    assert_eq!(
        fx.output_json("categories.json")?,
        json!([
            {"id": 1, "code": "WEAPON", "group_id": 100},
            {"id": 2, "code": "SHIELD", "group_id": 200},
        ])
    );
    assert_eq!(fx.output_json("items.json")?[1]["category_id"], json!(2));
    assert!(report.relations.has("id:categories.yaml:code"));
    assert!(report.relations.has("id:groups.yaml:label"));
    assert_eq!(pipeline.stats().relation_replays(), 2);
    Ok(())
}

#[test]
fn test_shared_relation_materialized_once() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    for name in ["shops", "drops", "quests"] {
        fx.schema(
            &format!("{name}.yaml"),
            &format!(
                "target: {name}.csv\nrow: 1\nhandler: {{type: json, path: {name}.json}}\nfields:\n  - {{column: category_id, name: Category, type: foreignkey, relation: {{column: id, from: categories.yaml, key: code}}}}\n"
            ),
        )?;
        fx.table(&format!("{name}.csv"), "Category\nSHIELD\nWEAPON\n")?;
    }

    let pipeline = Pipeline::new(fx.settings(4));
    let report = pipeline.run(&targets(&["items.yaml", "shops.yaml", "drops.yaml", "quests.yaml"]))?;
    assert_eq!(report.jobs, 4);
    assert_eq!(pipeline.stats().relations_discovered(), 1);
    assert_eq!(pipeline.stats().relation_replays(), 1);
    assert_eq!(
        fx.output_json("quests.json")?,
        json!([{"category_id": 2}, {"category_id": 1}])
    );
    Ok(())
}

#[test]
fn test_jobs_without_relations() -> Result<()> {
    let fx = Fixture::new()?;
    fx.schema(
        "plain.yaml",
        "target: plain.csv\nrow: 1\nhandlers:\n  - {type: json, path: plain.json, indent: -1}\n  - {type: csv, path: plain.csv, csv_field_column: true}\nfields:\n  - {column: id, name: ID, type: int}\n",
    )?;
    fx.table("plain.csv", "ID\n1\n2\n")?;
    fx.schema(
        "quiet.yaml",
        "target: plain.csv\nrow: 1\nhandler: {type: none}\nfields:\n  - {column: id, name: ID, type: int}\n",
    )?;

    let pipeline = Pipeline::new(fx.settings(4));
    let report = pipeline.run(&targets(&["plain.yaml", "quiet.yaml", "plain.yaml"]))?;
    assert_eq!(report.jobs, 2);
    assert_eq!(report.skipped, vec!["quiet.yaml"]);
    assert_eq!(fx.output("plain.json")?, "[{\"id\":1},{\"id\":2}]\n");
    assert_eq!(fx.output("plain.csv")?, "id\n1\n2\n");
    assert_eq!(pipeline.stats().relations_discovered(), 0);
    assert_eq!(pipeline.stats().jobs_loaded(), 2);
    assert_eq!(pipeline.stats().jobs_skipped(), 1);
    assert_eq!(pipeline.stats().outputs_written(), 2);
    Ok(())
}

#[test]
fn test_shared_sources_are_read_once() -> Result<()> {
    let fx = Fixture::new()?;
    fx.table("shared.csv", "ID,Name\n1,a\n2,b\n")?;
    for name in ["left", "right"] {
        fx.schema(
            &format!("{name}.yaml"),
            &format!(
                "target: shared.csv\nrow: 1\nhandler: {{type: json, path: {name}.json}}\nfields:\n  - {{column: id, name: ID, type: int}}\n"
            ),
        )?;
    }
    fx.table("solo.csv", "ID\n9\n")?;
    fx.schema(
        "solo.yaml",
        "target: solo.csv\nrow: 1\nhandler: {type: json, path: solo.json}\nfields:\n  - {column: id, name: ID, type: int}\n",
    )?;

    let pipeline = Pipeline::new(fx.settings(2));
    let report = pipeline.run(&targets(&["left.yaml", "right.yaml", "solo.yaml"]))?;
    let stats = pipeline.stats();
    assert_eq!(stats.shared_opens(), 2);
    assert_eq!(stats.private_opens(), 1);
    assert_eq!(stats.workbook_reads(), 2);
    assert!(report.workbooks.get(&fx.tables.join("shared.csv")).is_some());
    assert!(report.workbooks.get(&fx.tables.join("solo.csv")).is_none());
    Ok(())
}

#[test]
fn test_no_cache_opens_privately() -> Result<()> {
    let fx = Fixture::new()?;
    fx.table("shared.csv", "ID\n1\n")?;
    for name in ["left", "right"] {
        fx.schema(
            &format!("{name}.yaml"),
            &format!(
                "target: shared.csv\nrow: 1\nhandler: {{type: json, path: {name}.json}}\nfields:\n  - {{column: id, name: ID, type: int}}\n"
            ),
        )?;
    }
    let mut settings = fx.settings(2);
    settings.no_cache = true;
    let pipeline = Pipeline::new(settings);
    let report = pipeline.run(&targets(&["left.yaml", "right.yaml"]))?;
    assert_eq!(pipeline.stats().shared_opens(), 0);
    assert_eq!(pipeline.stats().workbook_reads(), 2);
    assert!(report.workbooks.is_empty());
    Ok(())
}

#[test]
fn test_provider_shares_handles() -> Result<()> {
    let fx = Fixture::new()?;
    let shared_path = fx.table("shared.csv", "ID\n1\n")?;
    let private_path = fx.table("private.csv", "ID\n2\n")?;

    let cache: KeyedCache<_, Workbook> = KeyedCache::new();
    let shared = MutexMap::new();
    shared.add(shared_path.clone(), 2usize);
    let stats = RunStats::new();
    let provider = SourceProvider::new(&cache, &shared, false, &stats);

    assert!(provider.is_shared(&shared_path));
    assert!(!provider.is_shared(&private_path));
    assert!(Arc::ptr_eq(&provider.open(&shared_path)?, &provider.open(&shared_path)?));
    assert!(!Arc::ptr_eq(&provider.open(&private_path)?, &provider.open(&private_path)?));
    assert_eq!(stats.workbook_reads(), 3);

    let bypass = SourceProvider::new(&cache, &shared, true, &stats);
    assert!(!bypass.is_shared(&shared_path));
    Ok(())
}

#[test]
fn test_relation_source_failure_cancels_run() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.schema(
        "categories.yaml",
        "target: categories.csv\nrow: 1\nfields:\n  - {column: id, name: ID, type: decimal}\n",
    )?;
    fx.schema(
        "plain.yaml",
        "target: plain.csv\nrow: 1\nhandler: {type: json, path: plain.json}\nfields:\n  - {column: id, name: ID, type: int}\n",
    )?;
    fx.table("plain.csv", "ID\n1\n")?;

    let pipeline = Pipeline::new(fx.settings(3));
    let err = pipeline.run(&targets(&["items.yaml", "plain.yaml"])).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.starts_with("relation source categories.yaml"), "{message}");
    assert!(message.contains("unknown field.type: decimal"), "{message}");
    assert_eq!(pipeline.stats().relation_replays(), 0);
    assert_eq!(pipeline.stats().jobs_converted(), 0);
    assert!(!fx.out.exists() || std::fs::read_dir(&fx.out)?.next().is_none());
    Ok(())
}

#[test]
fn test_converted_jobs_keep_outputs_when_a_later_job_fails() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.schema(
        "plain.yaml",
        "target: plain.csv\nrow: 1\nhandler: {type: json, path: plain.json, indent: -1}\nfields:\n  - {column: id, name: ID, type: int}\n",
    )?;
    fx.table("plain.csv", "ID\n1\n")?;
    fx.table("items.csv", "ID,Name,Category\n12,Plate,ARMOR\n")?;

    let pipeline = Pipeline::new(fx.settings(1));
    let err = pipeline.run(&targets(&["plain.yaml", "items.yaml"])).unwrap_err();
    assert!(format!("{err:#}").contains("relation: key=ARMOR: not found"));
    assert_eq!(fx.output("plain.json")?, "[{\"id\":1}]\n");
    assert!(!fx.out.join("items.json").exists());
    assert_eq!(pipeline.stats().jobs_converted(), 1);
    Ok(())
}

#[test]
fn test_missing_relation_source_fails_at_load() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    std::fs::remove_file(fx.schemas.join("categories.yaml"))?;

    let pipeline = Pipeline::new(fx.settings(2));
    let err = pipeline.run(&targets(&["items.yaml"])).unwrap_err();
    assert!(format!("{err:#}").contains("categories.yaml: does not exist."));
    assert_eq!(pipeline.stats().relations_discovered(), 0);
    Ok(())
}

#[test]
fn test_missing_target_document() -> Result<()> {
    let fx = Fixture::new()?;
    let pipeline = Pipeline::new(fx.settings(2));
    let err = pipeline.run(&targets(&["ghost.yaml"])).unwrap_err();
    assert!(format!("{err:#}").contains("ghost.yaml: does not exist."));
    Ok(())
}

#[test]
fn test_each_run_rereads_relation_sources() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.table("shared.csv", "ID\n1\n")?;
    for name in ["left", "right"] {
        fx.schema(
            &format!("{name}.yaml"),
            &format!(
                "target: shared.csv\nrow: 1\nhandler: {{type: json, path: {name}.json}}\nfields:\n  - {{column: id, name: ID, type: int}}\n"
            ),
        )?;
    }
    let all = targets(&["items.yaml", "left.yaml", "right.yaml"]);
    let pipeline = Pipeline::new(fx.settings(2));
    let first = pipeline.run(&all)?;
    assert_eq!(pipeline.stats().relation_replays(), 1);
    assert_eq!(fx.output_json("items.json")?[0]["category_id"], json!(1));

    fx.table("categories.csv", "ID,Code\n5,WEAPON\n6,SHIELD\n")?;
    fx.table("shared.csv", "ID\n7\n")?;
    let second = pipeline.run(&all)?;
    assert_eq!(second.jobs, 3);
    assert_eq!(pipeline.stats().relation_replays(), 2);
    assert_eq!(fx.output_json("items.json")?[0]["category_id"], json!(5));
    assert_eq!(fx.output_json("left.json")?, json!([{"id": 7}]));

    let key = "id:categories.yaml:code";
    assert!(!Arc::ptr_eq(&first.relations.find(key)?, &second.relations.find(key)?));
    assert_eq!(first.relations.find(key)?.lookup(&"WEAPON".into())?, 1);
    let shared = fx.tables.join("shared.csv");
    assert!(!Arc::ptr_eq(
        &first.workbooks.get(&shared).unwrap(),
        &second.workbooks.get(&shared).unwrap()
    ));
    Ok(())
}

#[cfg(feature = "template")]
#[test]
fn test_template_output_with_foreign_keys() -> Result<()> {
    let fx = Fixture::new()?;
    fx.items_and_categories()?;
    fx.schema(
        "templates/items.hbs",
        "enum {{name}} {\n{{#each records}}  {{upper_camel name}} = {{category_id}},\n{{/each}} }\n",
    )?;
    fx.schema(
        "item_enum.yaml",
        "target: items.csv\nrow: 1\nhandler: {type: template, path: gen/items.cs, source: templates/items.hbs, context: {name: Items}}\nfields:\n  - {column: name, name: Name, type: char}\n  - {column: category_id, name: Category, type: foreignkey, relation: {column: id, from: categories.yaml, key: code}}\n",
    )?;

    let report = Pipeline::new(fx.settings(2)).run(&targets(&["item_enum.yaml"]))?;
    assert_eq!(report.outputs, vec![fx.out.join("gen/items.cs")]);
    assert_eq!(
        fx.output("gen/items.cs")?,
        "enum Items {\n  Sword = 1,\n  Buckler = 2,\n }\n"
    );
    Ok(())
}

#[test]
fn test_empty_run() -> Result<()> {
    let fx = Fixture::new()?;
    let report = Pipeline::new(fx.settings(3)).run(&[])?;
    assert_eq!(report.jobs, 0);
    assert!(report.outputs.is_empty());
    Ok(())
}

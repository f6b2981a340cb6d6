//! End-to-end runs over rule files and the in-memory store.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rowport::core::source_row;
use rowport::rules::file;
use rowport::{FormattedRow, MemorySink, MemoryStore, MigrateError, Orchestrator, RunMode};

const RULE_C: &str = r#"
old_table: c
new_table: new_c
append: {}
steps:
  - convert: { type: string, field: name }
  - convert: { type: string, field: gender, to: sex }
  - convert: { type: datetime_to_timestamp, field: date }
"#;

const RULE_B: &str = r#"
old_table: b
new_table: new_b
skip: [2]
steps:
  - convert: { type: integer, field: id }
  - convert: { type: string, field: name }
  - convert: { type: string, field: gender, to: sex }
  - convert: { type: datetime_to_timestamp, field: date }
  - convert: { type: timestamp_to_datetime, field: tstamp }
"#;

const RULE_D: &str = r#"
old_table: d
new_table: new_d
steps:
  - convert: { type: int, field: id }
  - foreign_key: { field: c_id, table: new_c }
  - convert: { type: int, field: c_id }
"#;

fn write_rules(dir: &Path) {
    fs::write(dir.join("10_c.yaml"), RULE_C).unwrap();
    fs::write(dir.join("20_b.yaml"), RULE_B).unwrap();
    fs::write(dir.join("30_d.yaml"), RULE_D).unwrap();
}

fn store() -> Arc<MemoryStore> {
    let existing_b: FormattedRow = [
        ("id", "1"),
        ("name", "\"old_name\""),
        ("sex", "\"i\""),
        ("date", "1234452913"),
        ("tstamp", "\"2009-02-12 15:48:03\""),
    ]
    .into_iter()
    .collect();

    Arc::new(
        MemoryStore::new()
            .with_source_rows(
                "c",
                vec![
                    source_row([("id", Some("1")), ("name", Some("one")), ("gender", Some("f")), ("date", None)]),
                    source_row([("id", Some("2")), ("name", Some("two")), ("gender", Some("m")), ("date", Some("0000-00-00 00:00:00"))]),
                ],
            )
            .with_source_rows(
                "b",
                vec![
                    source_row([
                        ("id", Some("1")),
                        ("name", Some("old_name")),
                        ("gender", Some("i")),
                        ("date", Some("2009-02-12 15:35:13")),
                        ("tstamp", Some("1234450083")),
                    ]),
                    source_row([
                        ("id", Some("2")),
                        ("name", Some("skipped")),
                        ("gender", Some("i")),
                        ("date", Some("corrupt")),
                        ("tstamp", None),
                    ]),
                    source_row([
                        ("id", Some("3")),
                        ("name", Some("O'Hara")),
                        ("gender", None),
                        ("date", None),
                        ("tstamp", Some("0")),
                    ]),
                ],
            )
            .with_source_rows(
                "d",
                vec![
                    source_row([("id", Some("1")), ("c_id", Some("1"))]),
                    source_row([("id", Some("2")), ("c_id", Some("2"))]),
                    source_row([("id", Some("3")), ("c_id", Some("9"))]),
                ],
            )
            .with_auto_increment("new_c", 10)
            .with_target_row("new_b", existing_b),
    )
}

#[tokio::test]
async fn test_apply_run_over_rule_files() {
    let dir = tempfile::tempdir().unwrap();
    write_rules(dir.path());
    let rules = file::load_dir(dir.path()).unwrap();

    let store = store();
    let sink = MemorySink::new();
    let console = MemorySink::new();
    let mut orchestrator = Orchestrator::new(rules, store.clone(), store.clone())
        .with_progress(true)
        .with_sink(Box::new(sink.clone()))
        .with_console(Box::new(console.clone()));
    let result = orchestrator.run().await.unwrap();

    let names: Vec<_> = result.tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["c", "b", "d"]);

    let c = &result.tables[0].stats;
    assert_eq!((c.inserted, c.updated, c.nochange, c.skipped), (2, 0, 0, 0));
    let b = &result.tables[1].stats;
    assert_eq!((b.inserted, b.updated, b.nochange, b.skipped), (1, 0, 1, 1));
    let d = &result.tables[2].stats;
    assert_eq!((d.inserted, d.updated, d.nochange, d.skipped), (3, 0, 0, 0));

    let new_c = store.target_rows("new_c");
    assert_eq!(new_c[0].get("id"), Some("10"));
    assert_eq!(new_c[0].get("date"), Some("0"));
    assert_eq!(new_c[1].get("id"), Some("11"));
    assert_eq!(new_c[1].get("date"), Some("0"));

    let new_b = store.target_rows("new_b");
    assert_eq!(new_b.len(), 2);
    assert_eq!(new_b[1].get("name"), Some("\"O\\'Hara\""));
    assert_eq!(new_b[1].get("sex"), Some("\"\""));
    assert_eq!(new_b[1].get("tstamp"), Some("\"1970-01-01 01:00:00\""));

    let new_d = store.target_rows("new_d");
    let c_ids: Vec<_> = new_d.iter().map(|row| row.get("c_id").unwrap_or("")).collect();
    assert_eq!(c_ids, vec!["10", "11", "9"]);

    // The skipped row carries an unparseable date and is never converted.
    assert!(sink.lines().is_empty());
    assert!(console
        .lines()
        .contains(&"-- Inserted: 1, Updated: 0, No change: 1, Skipped: 1".to_string()));
}

#[tokio::test]
async fn test_dump_run_over_rule_files() {
    let dir = tempfile::tempdir().unwrap();
    write_rules(dir.path());
    let rules = file::load_dir(dir.path()).unwrap();

    let store = store();
    let sink = MemorySink::new();
    let mut orchestrator = Orchestrator::new(rules, store.clone(), store.clone())
        .with_mode(RunMode::Dump)
        .with_sink(Box::new(sink.clone()));
    orchestrator.run().await.unwrap();

    assert!(store.executed().is_empty());
    let lines = sink.lines();
    assert_eq!(
        lines,
        vec![
            "-- ----- c -----",
            "insert into `new_c`( `name`,`sex`,`date` ) values( \"one\",\"f\",0 );",
            "set @new_c_1 = last_insert_id();",
            "insert into `new_c`( `name`,`sex`,`date` ) values( \"two\",\"m\",0 );",
            "set @new_c_2 = last_insert_id();",
            "-- Inserted: 2, Updated: 0, No change: 0, Skipped: 0",
            "-- ----- b -----",
            "insert into `new_b`( `id`,`name`,`sex`,`date`,`tstamp` ) values( 3,\"O\\'Hara\",\"\",0,\"1970-01-01 01:00:00\" );",
            "-- Inserted: 1, Updated: 0, No change: 1, Skipped: 1",
            "-- ----- d -----",
            "insert into `new_d`( `id`,`c_id` ) values( 1,@new_c_1 );",
            "insert into `new_d`( `id`,`c_id` ) values( 2,@new_c_2 );",
            "insert into `new_d`( `id`,`c_id` ) values( 3,9 );",
            "-- Inserted: 3, Updated: 0, No change: 0, Skipped: 0",
        ]
    );
}

#[tokio::test]
async fn test_strict_foreign_keys_stop_on_miss() {
    let dir = tempfile::tempdir().unwrap();
    write_rules(dir.path());
    let rules = file::load_dir(dir.path()).unwrap();

    let store = store();
    let mut orchestrator = Orchestrator::new(rules, store.clone(), store.clone())
        .with_strict_foreign_keys(true)
        .with_console(Box::new(MemorySink::new()));

    let err = orchestrator.run().await.unwrap_err();
    assert!(matches!(err, MigrateError::UnresolvedForeignKey { .. }));
    // Rows before the failing one stay written.
    assert_eq!(store.target_rows("new_d").len(), 2);
}

#[tokio::test]
async fn test_forbidden_inserts_with_abort_policy() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("b.yaml"),
        format!("{}config: {{ insert: false, on_error: abort }}\n", RULE_B),
    )
    .unwrap();
    let rules = file::load_dir(dir.path()).unwrap();

    let store = store();
    let mut orchestrator = Orchestrator::new(rules, store.clone(), store.clone())
        .with_console(Box::new(MemorySink::new()));

    let err = orchestrator.run().await.unwrap_err();
    assert_eq!(err.to_string(), "new_b: insert explicitly forbidden");
    assert_eq!(err.exit_code(), rowport::error::EXIT_POLICY_ERROR);
    assert_eq!(store.target_rows("new_b").len(), 1);
}

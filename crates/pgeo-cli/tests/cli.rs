use std::path::{Path, PathBuf};

use assert_cmd::Command;
use pgeo_core_common::{ColumnDescriptor, RawValue, SqlType};
use pgeo_memory::{GeometryColumn, MemorySource, MemoryTable};
use pgeo_shape::{Coord, Geometry, LineString, MultiLineString, encode};
use predicates::prelude::*;
use tempfile::TempDir;

fn pipe(x: f64) -> RawValue {
    encode(&Geometry::MultiLineString(MultiLineString(vec![LineString(vec![
        Coord::xy(x, 0.0),
        Coord::xy(x + 5.0, 5.0),
    ])])))
    .into()
}

fn write_container(dir: &Path) -> PathBuf {
    let pipes = MemoryTable::new(
        "SDPipes",
        vec![
            ColumnDescriptor::new("OBJECTID", SqlType::Integer).with_primary_key(true),
            ColumnDescriptor::new("IDNUM", SqlType::Integer),
            ColumnDescriptor::new("OWNER", SqlType::VarChar),
            ColumnDescriptor::new("SHAPE", SqlType::LongVarBinary),
        ],
    )
    .with_row(vec![1i64.into(), 9424i64.into(), "City".into(), pipe(0.0)])
    .unwrap()
    .with_row(vec![2i64.into(), 9425i64.into(), "Private".into(), pipe(100.0)])
    .unwrap()
    .with_row(vec![3i64.into(), 9426i64.into(), "City".into(), vec![3u8, 0, 0].into()])
    .unwrap();
    let notes = MemoryTable::new("notes", vec![ColumnDescriptor::new("text", SqlType::VarChar)])
        .with_row(vec!["hello".into()])
        .unwrap();

    let mut source = MemorySource::new().with_table(pipes).with_table(notes);
    source.register_geometry(&GeometryColumn::new("SDPipes", "SHAPE", 3).with_srid(2230));

    let path = dir.join("city.json");
    source.save(&path).unwrap();
    path
}

fn pgeo() -> Command {
    Command::cargo_bin("pgeo").unwrap()
}

#[test]
fn layers_lists_visible_tables() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("layers")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Layers (2 total)"))
        .stdout(predicate::str::contains("SDPipes"))
        .stdout(predicate::str::contains("MultiLineString"))
        .stdout(predicate::str::contains("notes"))
        .stdout(predicate::str::contains("GDB_GeomColumns").not());
}

#[test]
fn all_tables_shows_the_registry() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .args(["--all-tables", "layers"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("GDB_GeomColumns"));
}

#[test]
fn info_filters_features() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("info")
        .arg(&path)
        .args(["--layer", "sdpipes", "--where", "OWNER = 'Private'"])
        .assert()
        .success()
        .stdout(predicate::str::contains("SRID: 2230"))
        .stdout(predicate::str::contains("Feature Count: 1"))
        .stdout(predicate::str::contains("9425"))
        .stdout(predicate::str::contains("MULTILINESTRING"))
        .stdout(predicate::str::contains("9424").not());
}

#[test]
fn info_bbox_filter() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("info")
        .arg(&path)
        .args(["--layer", "SDPipes", "--bbox", "-1,-1,6,6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feature Count: 1"))
        .stdout(predicate::str::contains("9424"))
        .stdout(predicate::str::contains("9425").not());
}

#[test]
fn undecodable_rows_are_skipped_or_tolerated() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("info")
        .arg(&path)
        .args(["--layer", "SDPipes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9426").not())
        .stderr(predicate::str::contains("Skipping row"));

    pgeo()
        .args(["--tolerate-decode-errors", "info"])
        .arg(&path)
        .args(["--layer", "SDPipes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9426"));
}

#[test]
fn sql_prints_result_set() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("sql")
        .arg(&path)
        .arg("SELECT * FROM SDPipes WHERE OBJECTID = 1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Layer: SELECT"))
        .stdout(predicate::str::contains("9424"))
        .stdout(predicate::str::contains("City"));
}

#[test]
fn sql_bbox_filters_result_set() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("sql")
        .arg(&path)
        .arg("SELECT * FROM SDPipes")
        .args(["--bbox", "99,-1,106,6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Spatial Filter:"))
        .stdout(predicate::str::contains("9425"))
        .stdout(predicate::str::contains("9424").not());
}

#[test]
fn rejected_query_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("sql")
        .arg(&path)
        .arg("DROP TABLE SDPipes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Database error"));
}

#[test]
fn bad_filter_reports_hint() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("info")
        .arg(&path)
        .args(["--layer", "SDPipes", "--where", "COLOR = 'red'"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown column 'COLOR'"))
        .stderr(predicate::str::contains("Hint:"));
}

#[test]
fn unknown_layer_fails() {
    let dir = TempDir::new().unwrap();
    let path = write_container(dir.path());

    pgeo()
        .arg("info")
        .arg(&path)
        .args(["--layer", "roads"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Layer 'roads' not found"));
}

#[test]
fn missing_container_fails() {
    let dir = TempDir::new().unwrap();

    pgeo()
        .arg("layers")
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn bad_bbox_is_rejected_by_argument_parsing() {
    pgeo()
        .args(["info", "city.json", "--bbox", "1,2,3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 4 comma-separated numbers"));
}

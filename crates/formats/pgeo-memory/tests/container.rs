use std::fs;

use pgeo_core_common::{
    ColumnDescriptor, Connector, RawValue, SourceError, SqlType, TabularSource,
};
use pgeo_memory::{
    GEOMETRY_REGISTRY, GeometryColumn, JsonContainerConnector, MemorySource, MemoryTable,
};
use tempfile::TempDir;

fn sample_source() -> MemorySource {
    let pipes = MemoryTable::new(
        "SDPipes",
        vec![
            ColumnDescriptor::new("OBJECTID", SqlType::Integer).with_primary_key(true),
            ColumnDescriptor::new("IDNUM", SqlType::Integer),
            ColumnDescriptor::new("OWNER", SqlType::VarChar),
            ColumnDescriptor::new("SHAPE", SqlType::LongVarBinary),
        ],
    )
    .with_row(vec![1.into(), 9424.into(), "City".into(), vec![3u8, 0, 0, 0].into()])
    .unwrap()
    .with_row(vec![2.into(), 9425.into(), RawValue::Null, RawValue::Null])
    .unwrap();

    let mut source = MemorySource::new().with_table(pipes);
    source.register_geometry(&GeometryColumn::new("SDPipes", "SHAPE", 3).with_srid(2230));
    source
}

#[test]
fn saved_container_reopens_with_same_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipes.json");
    sample_source().save(&path).unwrap();

    let source = JsonContainerConnector.connect(&path).unwrap();
    assert_eq!(
        source.list_tables().unwrap(),
        vec!["SDPipes".to_string(), GEOMETRY_REGISTRY.to_string()]
    );

    let columns = source.columns("sdpipes").unwrap();
    assert_eq!(columns.len(), 4);
    assert!(columns[0].primary_key);
    assert_eq!(columns[3].sql_type, SqlType::LongVarBinary);

    let row = source.fetch("SDPipes", "OBJECTID", 1).unwrap().unwrap();
    assert_eq!(row[3], RawValue::Binary(vec![3, 0, 0, 0]));
    assert_eq!(source.count_rows("SDPipes").unwrap(), Some(2));
}

#[test]
fn queries_run_against_loaded_container() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipes.json");
    sample_source().save(&path).unwrap();

    let source = JsonContainerConnector.connect(&path).unwrap();
    let mut result = source
        .query("SELECT TableName, FieldName, ShapeType FROM GDB_GeomColumns")
        .unwrap();
    assert_eq!(result.columns.len(), 3);
    let row = result.cursor.next_row().unwrap().unwrap();
    assert_eq!(row[2], RawValue::Integer(3));
    assert!(result.cursor.next_row().unwrap().is_none());
}

#[test]
fn hand_written_container_with_booleans_and_dates() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flags.json");
    fs::write(
        &path,
        r#"{
          "format": "pgeo-json",
          "version": 1,
          "tables": [{
            "name": "Flags",
            "columns": [
              {"name": "active", "type": "YesNo"},
              {"name": "since", "type": "DateTime"},
              {"name": "ratio", "type": "Single"}
            ],
            "rows": [[true, "2020/01/30 00:00:00", 0.5], [false, null, 2]]
          }]
        }"#,
    )
    .unwrap();

    let source = JsonContainerConnector.connect(&path).unwrap();
    let mut cursor = source.scan("Flags").unwrap();
    let first = cursor.next_row().unwrap().unwrap();
    assert_eq!(first[0], RawValue::Integer(-1));
    assert_eq!(first[1], RawValue::Text("2020/01/30 00:00:00".into()));
    let second = cursor.next_row().unwrap().unwrap();
    assert_eq!(second[2], RawValue::Real(2.0));
}

#[test]
fn missing_and_foreign_files_fail_to_connect() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("absent.json");
    assert!(matches!(
        JsonContainerConnector.connect(&missing),
        Err(SourceError::Io { .. })
    ));

    let foreign = dir.path().join("feature.geojson");
    fs::write(&foreign, r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
    assert!(matches!(
        JsonContainerConnector.connect(&foreign),
        Err(SourceError::NotRecognized { .. })
    ));
}

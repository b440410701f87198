//! Display utilities for formatting CLI output.
//!
//! This module provides table row structures and formatting functions
//! for presenting layers, schemas and features in a human-readable format.

use geozero::ToWkt;
use pgeo_core::{Envelope, Feature, FieldDefn, Layer};
use tabled::builder::Builder;
use tabled::{Table, Tabled};

/// Table row representation for the `layers` listing.
#[derive(Tabled)]
pub struct LayerRow {
    /// Name of the layer (table name).
    #[tabled(rename = "Layer")]
    pub name: String,
    /// Declared geometry type, or `None` for non-spatial tables.
    #[tabled(rename = "Geometry")]
    pub geometry: String,
    /// Number of features, or the error met while counting.
    #[tabled(rename = "Features")]
    pub features: String,
    #[tabled(rename = "FID Column")]
    pub fid_column: String,
}

impl LayerRow {
    /// Describes `layer`, counting its features.
    pub fn from_layer(layer: &mut Layer) -> Self {
        let features = match layer.feature_count() {
            Ok(count) => count.to_string(),
            Err(err) => format!("error: {}", err.user_message()),
        };
        Self {
            name: layer.name().to_string(),
            geometry: geometry_label(layer),
            features,
            fid_column: layer.fid_column().unwrap_or("(row number)").to_string(),
        }
    }
}

/// Table row representation for displaying field information.
#[derive(Tabled)]
pub struct FieldRow {
    /// Name of the field.
    #[tabled(rename = "Field")]
    pub name: String,
    /// Field type exposed on features.
    #[tabled(rename = "Type")]
    pub field_type: String,
    /// Column type reported by the engine.
    #[tabled(rename = "Column Type")]
    pub sql_type: String,
    /// Whether the field can contain null values.
    #[tabled(rename = "Nullable")]
    pub nullable: String,
}

impl From<&FieldDefn> for FieldRow {
    fn from(field: &FieldDefn) -> Self {
        Self {
            name: field.name.clone(),
            field_type: field.field_type.to_string(),
            sql_type: field.sql_type.to_string(),
            nullable: if field.nullable { "Yes" } else { "No" }.to_string(),
        }
    }
}

fn geometry_label(layer: &Layer) -> String {
    layer
        .geometry_type()
        .map_or_else(|| "None".to_string(), |t| t.to_string())
}

fn envelope_label(envelope: &Envelope) -> String {
    format!(
        "({}, {}) - ({}, {})",
        envelope.min_x, envelope.min_y, envelope.max_x, envelope.max_y
    )
}

/// Renders the `layers` listing.
#[must_use]
pub fn layer_table(rows: Vec<LayerRow>) -> String {
    Table::new(rows).to_string()
}

/// Renders a field schema.
#[must_use]
pub fn field_table(fields: &[FieldDefn]) -> String {
    Table::new(fields.iter().map(FieldRow::from)).to_string()
}

/// Renders a feature's geometry as WKT, or a placeholder.
#[must_use]
pub fn geometry_wkt(feature: &Feature) -> String {
    match feature.geometry() {
        None => String::new(),
        Some(geometry) => geometry
            .to_wkt()
            .unwrap_or_else(|err| format!("<invalid geometry: {err}>")),
    }
}

/// Renders features as a table with one column per field, the identifier
/// first and the geometry (if any) last.
#[must_use]
pub fn feature_table(fields: &[FieldDefn], spatial: bool, features: &[Feature]) -> String {
    let mut builder = Builder::default();

    let mut header = vec!["FID".to_string()];
    header.extend(fields.iter().map(|f| f.name.clone()));
    if spatial {
        header.push("Geometry".to_string());
    }
    builder.push_record(header);

    for feature in features {
        let mut record = vec![feature.fid().to_string()];
        record.extend(feature.values().iter().map(ToString::to_string));
        if spatial {
            record.push(geometry_wkt(feature));
        }
        builder.push_record(record);
    }
    builder.build().to_string()
}

/// Prints a layer's metadata and field schema.
pub fn display_layer_info(layer: &mut Layer) {
    println!("\nLayer: {}", layer.name());
    println!("Geometry: {}", geometry_label(layer));
    if let Some(column) = layer.geometry_column() {
        println!("Geometry Column: {column}");
    }
    if let Some(srid) = layer.srid() {
        println!("SRID: {srid}");
    }
    if let Some(extent) = layer.extent() {
        println!("Extent: {}", envelope_label(&extent));
    }
    if let Some(filter) = layer.attribute_filter() {
        println!("Attribute Filter: {filter}");
    }
    if let Some(filter) = layer.spatial_filter() {
        println!("Spatial Filter: {}", envelope_label(filter));
    }
    match layer.feature_count() {
        Ok(count) => println!("Feature Count: {count}"),
        Err(err) => println!("Feature Count: error: {}", err.user_message()),
    }

    if !layer.fields().is_empty() {
        println!("\n=== Fields ===");
        println!("{}", field_table(layer.fields()));
    }
}

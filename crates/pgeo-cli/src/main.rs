//! Command-line interface for `pgeo`, a read-only browser for personal
//! geodatabase containers.
//!
//! This binary is a thin façade over [`pgeo_core`]: it parses arguments,
//! configures logging and renders layers, schemas and features as tables.
//!
//! # Available Commands
//!
//! - `layers` - List the layers of a container with their geometry types and counts
//! - `info` - Show a layer's schema and features, optionally filtered
//! - `sql` - Run a query and show its result set

mod display;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgeo_core::{Dataset, Envelope, Feature, Layer, OpenOptions, PGeoError};
use pgeo_memory::JsonContainerConnector;
use tracing::{Level, debug, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use crate::display::{LayerRow, display_layer_info, feature_table, layer_table};

#[derive(Parser)]
#[command(
    name = "pgeo",
    version,
    about = "Read-only access to personal geodatabase containers",
    long_about = "pgeo lists the layers of a personal geodatabase container, describes their\n\
                  schemas and prints features with their geometries as WKT."
)]
/// Command-line arguments and options for the `pgeo` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Also list internal tables (engine catalog, geodatabase system tables
    /// and spatial index tables).
    #[arg(long, global = true)]
    all_tables: bool,

    /// Deliver rows whose geometry cannot be decoded without a geometry
    /// instead of reporting them as errors.
    #[arg(long, global = true)]
    tolerate_decode_errors: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `pgeo` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Lists the layers of a container.
    Layers {
        /// Path to the container.
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,
    },

    /// Displays a layer's schema and features.
    ///
    /// Without `--layer` every layer is described.
    Info {
        /// Path to the container.
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,

        /// Name of the layer to describe.
        #[arg(short, long, value_name = "NAME")]
        layer: Option<String>,

        /// Attribute filter, for example "OWNER = 'City' AND OBJECTID < 10".
        #[arg(long = "where", value_name = "EXPR")]
        filter: Option<String>,

        /// Spatial filter rectangle.
        #[arg(long, value_name = "MINX,MINY,MAXX,MAXY", value_parser = parse_bbox)]
        bbox: Option<Envelope>,

        /// Maximum number of features to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Runs a query and displays its result set.
    Sql {
        /// Path to the container.
        #[arg(value_name = "CONTAINER")]
        input: PathBuf,

        /// The query, passed to the engine verbatim.
        #[arg(value_name = "QUERY")]
        query: String,

        /// Spatial filter rectangle applied to the result.
        #[arg(long, value_name = "MINX,MINY,MAXX,MAXY", value_parser = parse_bbox)]
        bbox: Option<Envelope>,

        /// Maximum number of features to print.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

/// Parses `MINX,MINY,MAXX,MAXY`.
fn parse_bbox(text: &str) -> std::result::Result<Envelope, String> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|err| format!("invalid coordinate: {err}"))?;
    match values.as_slice() {
        [min_x, min_y, max_x, max_y] => Ok(Envelope::new(*min_x, *min_y, *max_x, *max_y)),
        _ => Err(format!("expected 4 comma-separated numbers, got {}", values.len())),
    }
}

/// Wraps a library error with its user-facing message and hint.
fn report(err: PGeoError) -> anyhow::Error {
    let mut message = err.user_message();
    if let Some(suggestion) = err.recovery_suggestion() {
        message.push_str("\nHint: ");
        message.push_str(&suggestion);
    }
    anyhow::Error::new(err).context(message)
}

/// Entry point for the `pgeo` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity flags
    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let options = OpenOptions::default()
        .with_list_all_tables(cli.all_tables)
        .with_tolerate_decode_errors(cli.tolerate_decode_errors);

    match cli.command {
        Commands::Layers { input } => {
            info!("Listing layers of {}", input.display());
            handle_layers(&input, options)?;
        },
        Commands::Info {
            input,
            layer,
            filter,
            bbox,
            limit,
        } => {
            info!("Displaying info for {}", input.display());
            handle_info(&input, options, layer.as_deref(), filter.as_deref(), bbox, limit)?;
        },
        Commands::Sql {
            input,
            query,
            bbox,
            limit,
        } => {
            info!("Running query against {}", input.display());
            handle_sql(&input, options, &query, bbox, limit)?;
        },
    }

    Ok(())
}

fn open(input: &Path, options: OpenOptions) -> Result<Dataset> {
    Dataset::open(input, &JsonContainerConnector, options).map_err(report)
}

/// Reads up to `limit` features, skipping rows that fail to convert.
fn read_features(layer: &mut Layer, limit: usize) -> Result<Vec<Feature>> {
    let mut features = Vec::new();
    while features.len() < limit {
        match layer.next_feature() {
            Ok(Some(feature)) => features.push(feature),
            Ok(None) => break,
            Err(err) if err.is_feature_level() => warn!("Skipping row: {err}"),
            Err(err) => return Err(report(err)),
        }
    }
    debug!("Read {} features from '{}'", features.len(), layer.name());
    Ok(features)
}

fn print_features(layer: &mut Layer, limit: usize) -> Result<()> {
    let features = read_features(layer, limit)?;
    println!("\n=== Features ===");
    println!(
        "{}",
        feature_table(layer.fields(), layer.schema().is_spatial(), &features)
    );
    Ok(())
}

fn handle_layers(input: &Path, options: OpenOptions) -> Result<()> {
    let mut dataset = open(input, options)?;

    println!("\nLayers ({} total):\n", dataset.layer_count());
    let rows: Vec<LayerRow> = dataset.layers_mut().iter_mut().map(LayerRow::from_layer).collect();
    println!("{}", layer_table(rows));

    dataset.close();
    Ok(())
}

fn handle_info(
    input: &Path,
    options: OpenOptions,
    layer_name: Option<&str>,
    filter: Option<&str>,
    bbox: Option<Envelope>,
    limit: usize,
) -> Result<()> {
    let mut dataset = open(input, options)?;
    println!("\nContainer: {}", input.display());

    let layers: Vec<&mut Layer> = match layer_name {
        Some(name) => {
            let layer = dataset
                .layer_by_name(name)
                .with_context(|| format!("Layer '{name}' not found in {}", input.display()))?;
            vec![layer]
        },
        None => dataset.layers_mut().iter_mut().collect(),
    };

    for layer in layers {
        layer.set_attribute_filter(filter).map_err(report)?;
        layer.set_spatial_filter(bbox);
        display_layer_info(layer);
        print_features(layer, limit)?;
    }

    dataset.close();
    Ok(())
}

fn handle_sql(
    input: &Path,
    options: OpenOptions,
    query: &str,
    bbox: Option<Envelope>,
    limit: usize,
) -> Result<()> {
    let mut dataset = open(input, options)?;
    debug!("Query: {query}");

    let Some(id) = dataset.execute_query_filtered(query, bbox).map_err(report)? else {
        println!("Statement produced no result set.");
        dataset.close();
        return Ok(());
    };

    let outcome = dataset.result_set(id).map_err(report).and_then(|layer| {
        display_layer_info(layer);
        print_features(layer, limit)
    });
    dataset.release_result_set(id).map_err(report)?;
    dataset.close();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("1, 2,3,4").unwrap();
        assert_eq!(bbox, Envelope::new(1.0, 2.0, 3.0, 4.0));

        // Corners are normalized.
        let bbox = parse_bbox("3,4,1,2").unwrap();
        assert_eq!(bbox.min_x, 1.0);
        assert_eq!(bbox.max_y, 4.0);
    }

    #[test]
    fn test_parse_bbox_rejects_bad_input() {
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("1,2,3,x").is_err());
        assert!(parse_bbox("").is_err());
    }

    #[test]
    fn test_report_includes_hint() {
        let err = PGeoError::Open(pgeo_core::OpenError::NotFound {
            path: PathBuf::from("missing.json"),
        });
        let message = format!("{:#}", report(err));
        assert!(message.contains("File not found: missing.json"));
        assert!(message.contains("Hint:"));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "pgeo",
            "info",
            "data.json",
            "--layer",
            "SDPipes",
            "--where",
            "OBJECTID = 1",
            "--bbox",
            "0,0,10,10",
            "--tolerate-decode-errors",
        ])
        .unwrap();
        assert!(cli.tolerate_decode_errors);
        assert!(!cli.all_tables);
        match cli.command {
            Commands::Info {
                layer,
                filter,
                bbox,
                limit,
                ..
            } => {
                assert_eq!(layer.as_deref(), Some("SDPipes"));
                assert_eq!(filter.as_deref(), Some("OBJECTID = 1"));
                assert!(bbox.is_some());
                assert_eq!(limit, 10);
            },
            _ => panic!("expected info"),
        }
    }
}

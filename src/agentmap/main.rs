// Copyright: Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Removal of the attribution is not allowed, as covered under the AGPL license

use agentmap::config::MapConfig;
use agentmap::controller::MapController;
use agentmap::export::{CsvFileExporter, SelectionExporter};
use agentmap::filter::{FilterAttribute, FilterCriteria, FilterOptions};
use agentmap::layers::Visualization;
use agentmap::source::{RecordLocation, fetch_records};
use agentmap::spatial::MIN_POLYGON_VERTICES;
use agentmap::surface::headless::HeadlessSurface;
use agentmap::surface::{PointerEventKind, ScreenPoint};
use anyhow::Context;
use clap::Parser;
use geo_types::Coord;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Print the distinct values offered by each filter
    Options {
        /// Record endpoint URL or path to a saved response
        #[arg(long)]
        records: Option<RecordLocation>,
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Select the agents inside a polygon and write them to CSV
    Select {
        #[arg(long)]
        records: Option<RecordLocation>,
        /// Vertices as "lon,lat;lon,lat;lon,lat"
        #[arg(long)]
        polygon: String,
        #[arg(long)]
        location: Vec<String>,
        #[arg(long)]
        division: Vec<String>,
        #[arg(long)]
        department: Vec<String>,
        #[arg(long)]
        manager: Vec<String>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Defaults to selected_employees_<date>.csv in the working directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Error, Debug, PartialEq)]
enum PolygonParseError {
    #[error("vertex '{0}' is not a lon,lat pair")]
    BadVertex(String),
    #[error("polygon needs at least 3 vertices, got {0}")]
    TooFewVertices(usize),
}

fn parse_polygon(input: &str) -> Result<Vec<Coord<f64>>, PolygonParseError> {
    let vertices = input
        .split(';')
        .map(str::trim)
        .filter(|vertex| !vertex.is_empty())
        .map(|vertex| {
            let (lon, lat) = vertex
                .split_once(',')
                .ok_or_else(|| PolygonParseError::BadVertex(vertex.to_string()))?;

            match (lon.trim().parse::<f64>(), lat.trim().parse::<f64>()) {
                (Ok(x), Ok(y)) if x.is_finite() && y.is_finite() => Ok(Coord { x, y }),
                _ => Err(PolygonParseError::BadVertex(vertex.to_string())),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    if vertices.len() < MIN_POLYGON_VERTICES {
        return Err(PolygonParseError::TooFewVertices(vertices.len()));
    }

    Ok(vertices)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MapConfig> {
    let config = match path {
        Some(path) => MapConfig::load(path)?,
        None => MapConfig::default(),
    };

    Ok(config.with_env_overrides())
}

fn resolve_location(
    records: Option<RecordLocation>,
    config: &MapConfig,
) -> anyhow::Result<RecordLocation> {
    records
        .or_else(|| config.records_url.as_deref().map(RecordLocation::from))
        .context("no record source: pass --records or set AGENTMAP_RECORDS_URL")
}

fn print_options(options: &FilterOptions) {
    for attribute in FilterAttribute::ALL {
        let values = options.for_attribute(attribute);
        println!("{} ({}):", attribute.label(), values.len());
        for value in values {
            println!("  {}", value);
        }
    }
}

/// Dated by the UTC calendar day, like the browser export it replaces.
fn default_exporter(now: chrono::DateTime<chrono::Utc>) -> CsvFileExporter {
    CsvFileExporter::new(Path::new("."), now.date_naive())
}

/// Replays the polygon as clicks plus a closing double click.
fn draw_polygon<E: SelectionExporter>(
    controller: &mut MapController<HeadlessSurface, E>,
    vertices: &[Coord<f64>],
    now: Instant,
) -> Option<usize> {
    let mut selected = None;

    let gestures = vertices
        .iter()
        .map(|vertex| (PointerEventKind::Click, *vertex))
        .chain(vertices.last().map(|v| (PointerEventKind::DoubleClick, *v)));

    for (kind, lng_lat) in gestures {
        let deliveries = controller
            .surface()
            .pointer(kind, lng_lat, ScreenPoint::default(), None);

        for (subscription, event) in deliveries {
            if let Some(selection) = controller.handle_pointer(subscription, &event, now) {
                selected = Some(selection.len());
            }
        }
    }

    selected
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    match args.cmd {
        Command::Options { records, config } => {
            let config = load_config(config.as_deref())?;
            let location = resolve_location(records, &config)?;

            let (records, _) = fetch_records(&location).await?;
            print_options(&FilterOptions::from_records(&records));
        }
        Command::Select {
            records,
            polygon,
            location,
            division,
            department,
            manager,
            config,
            output,
        } => {
            let vertices = parse_polygon(&polygon)?;
            let config = load_config(config.as_deref())?;
            let source = resolve_location(records, &config)?;

            let mut criteria = FilterCriteria::new();
            criteria.set(FilterAttribute::Location, location);
            criteria.set(FilterAttribute::Division, division);
            criteria.set(FilterAttribute::Department, department);
            criteria.set(FilterAttribute::Manager, manager);

            let exporter = match output {
                Some(path) => CsvFileExporter::to_path(path),
                None => default_exporter(chrono::Utc::now()),
            };
            let grace = config.drawing_grace();

            let fetched = fetch_records(&source).await.map(|(records, _)| records);

            let mut controller = MapController::new(config, HeadlessSurface::new(), exporter);
            controller.on_style_loaded();
            controller.on_records_loaded(fetched);
            controller.set_filters(criteria);
            controller.set_visualization_enabled(Visualization::Markers, true);
            controller.set_visualization_enabled(Visualization::Heatmap, true);
            controller.set_area_select(true);

            let now = Instant::now();
            let selected = draw_polygon(&mut controller, &vertices, now)
                .context("polygon did not close into a selection")?;
            controller.tick(now + grace);

            info!(
                "{} of {} filtered agents selected",
                selected,
                controller.filtered_features().features.len()
            );

            match controller.exporter().written.last() {
                Some(path) => println!("Wrote {} agents to {}", selected, path.display()),
                None => anyhow::bail!(
                    "selection was not written to {}",
                    controller.exporter().path().display()
                ),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_semicolon_separated_vertices() {
        let vertices = parse_polygon("150,-32; 152,-32;152, -34;").unwrap();
        assert_eq!(
            vertices,
            vec![
                Coord { x: 150.0, y: -32.0 },
                Coord { x: 152.0, y: -32.0 },
                Coord { x: 152.0, y: -34.0 },
            ]
        );
    }

    #[test]
    fn default_export_file_uses_the_utc_day() {
        let late_evening = chrono::DateTime::parse_from_rfc3339("2025-03-06T23:30:00-05:00")
            .unwrap()
            .with_timezone(&chrono::Utc);

        let exporter = default_exporter(late_evening);
        assert_eq!(
            exporter.path(),
            Path::new("./selected_employees_2025-03-07.csv")
        );
    }

    #[test]
    fn rejects_bad_and_short_polygons() {
        assert_eq!(
            parse_polygon("150,-32;152"),
            Err(PolygonParseError::BadVertex("152".to_string()))
        );
        assert_eq!(
            parse_polygon("150,-32;abc,1;1,1"),
            Err(PolygonParseError::BadVertex("abc,1".to_string()))
        );
        assert_eq!(
            parse_polygon("150,-32;152,-32"),
            Err(PolygonParseError::TooFewVertices(2))
        );
    }
}

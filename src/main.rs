//! Command-line interface for point-centered Sentinel-2 downloads.

use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use s2clip::bands::Band;
use s2clip::catalog::{CatalogApi, CatalogClient};
use s2clip::download::process_scene;
use s2clip::error::Error;
use s2clip::geometry::{BoundingBox, Point};

/// Download point-centered Sentinel-2 L2A clips as GeoTIFFs.
#[derive(Parser)]
#[command(name = "s2clip")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Download point-centered Sentinel-2 L2A clips", long_about = None)]
struct Cli {
    /// Latitude of the point of interest, degrees
    #[arg(allow_negative_numbers = true)]
    latitude: f64,

    /// Longitude of the point of interest, degrees
    #[arg(allow_negative_numbers = true)]
    longitude: f64,

    /// Directory the clipped GeoTIFFs are written to
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Maximum scene cloud cover, percent
    #[arg(long, default_value_t = 10.0)]
    cloud_cover: f64,

    /// Date range as two ISO dates
    #[arg(long, num_args = 2, value_names = ["START", "END"],
          default_values = ["2024-01-01", "2024-03-01"])]
    date_range: Vec<NaiveDate>,

    /// Bands to download, comma separated (B01..B12)
    #[arg(long, value_delimiter = ',', default_value = "B04,B03,B02")]
    bands: Vec<Band>,

    /// Half-width of the bounding box around the point, kilometers
    #[arg(long, default_value_t = 1.5)]
    delta_km: f64,

    /// Catalog to query
    #[arg(long, value_enum, default_value_t = CatalogApi::Microsoft)]
    api: CatalogApi,

    /// Debug-level logging plus per-asset size reporting
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    run(cli)
}

fn run(cli: Cli) -> anyhow::Result<()> {
    anyhow::ensure!(
        (-90.0..=90.0).contains(&cli.latitude),
        "latitude {} out of range [-90, 90]",
        cli.latitude
    );
    anyhow::ensure!(
        (-180.0..=180.0).contains(&cli.longitude),
        "longitude {} out of range [-180, 180]",
        cli.longitude
    );
    anyhow::ensure!(cli.delta_km > 0.0, "delta-km must be positive");
    anyhow::ensure!(!cli.bands.is_empty(), "at least one band is required");
    let (start, end) = (cli.date_range[0], cli.date_range[1]);
    anyhow::ensure!(start <= end, "date range start {start} is after end {end}");

    let samplings: HashSet<u32> = cli.bands.iter().map(Band::ground_sampling_m).collect();
    if samplings.len() > 1 {
        warn!(
            "requested bands mix ground sampling distances; their windows \
             will disagree in size and the scenes will be rejected"
        );
    }

    let point = Point::lonlat(cli.longitude, cli.latitude);
    let bbox = BoundingBox::around(point, cli.delta_km);
    info!(
        lat = cli.latitude,
        lon = cli.longitude,
        delta_km = cli.delta_km,
        api = %cli.api,
        "searching for scenes"
    );

    let mut client = CatalogClient::new(cli.api)?;
    let scenes = client
        .search(&bbox, cli.cloud_cover, (start, end))
        .context("catalog search failed")?;

    if cli.verbose {
        for scene in &scenes {
            info!(
                id = %scene.id,
                cloud_cover = scene.cloud_cover,
                date = %scene.datetime,
                "matched scene"
            );
        }
    }

    let mut saved = 0usize;
    for scene in &scenes {
        match process_scene(&mut client, scene, &cli.bands, &bbox, &cli.out_dir, cli.verbose) {
            Ok(path) => {
                saved += 1;
                info!(scene = %scene.id, path = %path.display(), "scene saved");
            }
            // Authentication cannot recover within this run
            Err(err @ Error::Authentication(_)) => return Err(err.into()),
            Err(err) => {
                error!(scene = %scene.id, "skipping scene: {err}");
            }
        }
    }

    anyhow::ensure!(
        saved > 0,
        "no scenes could be saved ({} matched the search)",
        scenes.len()
    );
    info!(saved, matched = scenes.len(), "done");
    Ok(())
}

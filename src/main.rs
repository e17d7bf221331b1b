// Treelight - spatial animation controller for a 3D-calibrated LED tree.
// The default subcommand runs the control daemon; the remaining
// subcommands form the calibration pipeline that produces the geometry
// the daemon renders against.
mod animations;
mod calibration;
mod color;
mod config;
mod engine;
mod geometry;
mod httpd;
mod presets;
mod sink;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use animations::{BinFeed, RuntimeContext};
use calibration::cluster::{detect_led, Mask};
use calibration::regression::AngleDetections;
use config::TreeConfig;
use engine::Engine;
use geometry::GeometryStore;
use presets::PresetStore;
use sink::{ChannelOrder, DdpSink, MockSink, PixelSink};

#[derive(Parser, Debug)]
#[command(author, version, about = "Spatial animation controller for a 3D-calibrated LED tree")]
struct Args {
    /// Config file path (defaults to treelight.toml in the working directory)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the control daemon (the default)
    Serve,
    /// Find the LED in every calibration photo of one tree rotation
    Detect {
        /// Directory holding one image per LED, named <index>.jpg or <index>.png
        #[arg(long)]
        images: PathBuf,
        /// Tree rotation in degrees at which the images were captured
        #[arg(long)]
        rotation: f64,
        /// Number of LEDs on the tree
        #[arg(long)]
        leds: usize,
        /// Luma threshold separating the lit LED from the background
        #[arg(long, default_value_t = 128)]
        threshold: u8,
        /// Output detections file
        #[arg(long)]
        out: PathBuf,
    },
    /// Combine per-rotation detections into 3-D coordinates
    Solve {
        /// Directory holding locations_<angle>.json files from `detect`
        #[arg(long)]
        detections: PathBuf,
        /// Number of rotation steps around the full circle
        #[arg(long, default_value_t = 8)]
        steps: usize,
        /// Pixel width of the calibration images
        #[arg(long)]
        width: f64,
        /// Output coordinates file
        #[arg(long)]
        out: PathBuf,
    },
    /// Unwrap the solved coordinates onto a flat rectangle
    Unwrap {
        /// Coordinates file produced by `solve`
        #[arg(long)]
        locations: PathBuf,
        /// Output projection file
        #[arg(long)]
        out: PathBuf,
    },
    /// Precompute the geodesic distance cache for the configured geometry
    Geodesic {
        /// Neighborhood size for the adjacency threshold
        #[arg(long, default_value_t = 8)]
        k: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treelight=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = TreeConfig::load(args.config.as_deref())?;

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Detect {
            images,
            rotation,
            leds,
            threshold,
            out,
        } => detect(&images, rotation, leds, threshold, &out),
        Command::Solve {
            detections,
            steps,
            width,
            out,
        } => solve(&detections, steps, width, &out),
        Command::Unwrap { locations, out } => unwrap(&locations, &out),
        Command::Geodesic { k } => {
            let geometry = GeometryStore::load(&config.locations_file)?;
            calibration::geodesic::load_or_compute(&config.cache_dir, &geometry, k)?;
            info!(k, "geodesic cache ready");
            Ok(())
        }
    }
}

fn parse_channel_order(raw: &str) -> Result<ChannelOrder> {
    match raw {
        "rgb" => Ok(ChannelOrder::Rgb),
        "grb" => Ok(ChannelOrder::Grb),
        other => bail!("Unknown channel order {:?}", other),
    }
}

async fn serve(config: TreeConfig) -> Result<()> {
    let geometry = Arc::new(GeometryStore::load(&config.locations_file)?);
    info!(leds = geometry.len(), "geometry loaded");

    let sink: Box<dyn PixelSink> = if config.wled_ip.is_empty() {
        warn!("no wled_ip configured, rendering to memory only");
        Box::new(MockSink::new(geometry.len()))
    } else {
        let order = parse_channel_order(&config.channel_order)?;
        Box::new(DdpSink::connect(&config.wled_ip, geometry.len(), order)?)
    };

    let bin_feed = BinFeed::default();
    let ctx = RuntimeContext {
        bin_feed: bin_feed.clone(),
        cache_dir: config.cache_dir.clone(),
    };
    let mut engine = Engine::new(Arc::clone(&geometry), sink, ctx);
    if config.startup_sequence {
        engine.startup();
    }

    let presets = PresetStore::open(&config.database_file).await?;
    let state = httpd::AppState {
        engine: Arc::new(Mutex::new(engine)),
        presets,
        bin_feed,
    };
    httpd::serve(&config.listen, state).await
}

/// Per-LED detection over one rotation's photo set. LEDs whose photo is
/// missing or yields no cluster are written as [-1, -1].
fn detect(images: &Path, rotation: f64, leds: usize, threshold: u8, out: &Path) -> Result<()> {
    let mut points = Vec::with_capacity(leds);
    let mut misses = 0usize;
    for i in 0..leds {
        let path = ["jpg", "png"]
            .iter()
            .map(|ext| images.join(format!("{}.{}", i, ext)))
            .find(|p| p.exists());
        let detection = match path {
            Some(path) => {
                let img = image::open(&path)
                    .with_context(|| format!("Failed to open {}", path.display()))?
                    .to_luma8();
                detect_led(&Mask::from_luma(&img, threshold))
            }
            None => None,
        };
        match detection {
            Some(d) => points.push([d.row, d.col]),
            None => {
                misses += 1;
                points.push([-1.0, -1.0]);
            }
        }
    }
    if misses > 0 {
        warn!(misses, rotation, "some LEDs were not detected");
    }
    let detections = AngleDetections {
        angle_deg: rotation,
        points,
    };
    std::fs::write(out, serde_json::to_string(&detections)?)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(rotation, path = %out.display(), "detections written");
    Ok(())
}

fn solve(detections_dir: &Path, steps: usize, width: f64, out: &Path) -> Result<()> {
    if steps == 0 {
        bail!("steps must be positive");
    }
    let mut sets = Vec::with_capacity(steps);
    for i in 0..steps {
        let angle = i as f64 * 360.0 / steps as f64;
        let path = detections_dir.join(format!("locations_{}.json", angle as i64));
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        sets.push(serde_json::from_str::<AngleDetections>(&raw)?);
    }
    let positions = calibration::regression::solve_positions(&sets, width)?;
    std::fs::write(out, serde_json::to_string(&positions)?)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(leds = positions.len(), path = %out.display(), "coordinates written");
    Ok(())
}

/// Project the (x, z) plane of the solved coordinates onto a rectangle.
/// The tree is photographed from the side, so x and height carry the
/// displayable surface; y only disambiguates front from back.
fn unwrap(locations: &Path, out: &Path) -> Result<()> {
    let geometry = GeometryStore::load(locations)?;
    let planar: Vec<[f64; 2]> = geometry.points().iter().map(|p| [p[0], p[2]]).collect();
    let projection = calibration::hull::project_to_rectangle(&planar)?;
    std::fs::write(out, serde_json::to_string(&projection)?)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    info!(path = %out.display(), "projection written");
    Ok(())
}

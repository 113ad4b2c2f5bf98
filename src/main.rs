//! Subsampling Viewer - inspect how a large image is tiled and decoded.
//!
//! `grid` prints the tile layout for a canvas size, `render` runs the full
//! decode pipeline for one viewport and prints the resulting render list.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use subsampling_viewer::{
    config::{Cli, Command, GridConfig, RenderConfig},
    decoder::{ErrorReporter, ImageDecoderFactory, ImageFileDecoder, ImageSource, RegionDecoder},
    error::DecodeError,
    geometry::IntSize,
    pipeline::SubSamplingImage,
    state::ViewSnapshot,
    tile::{CanvasRegionTile, ContentTransformation, SampleSize, TileGrid},
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Grid(config) => run_grid(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so stdout stays valid JSON.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "subsampling_viewer=debug"
    } else {
        "subsampling_viewer=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize output: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Grid Command
// =============================================================================

async fn run_grid(config: GridConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = ImageSource::file(&config.image);
    let decoder = match ImageFileDecoder::open(source, Default::default()).await {
        Ok(decoder) => decoder,
        Err(e) => {
            error!("Failed to open {}: {}", config.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let canvas_size = config.canvas.canvas_size();
    let grid = TileGrid::generate(canvas_size, decoder.image_size());
    info!(
        image = %grid.image_size(),
        canvas = %canvas_size,
        base_sample_size = %grid.base().sample_size,
        tiles = grid.foreground_tile_count(),
        "Generated tile grid"
    );

    print_json(&grid)
}

// =============================================================================
// Render Command
// =============================================================================

/// Forwards source-open failures to the command so it can stop waiting.
struct CliErrorReporter {
    failure: watch::Sender<Option<String>>,
}

impl ErrorReporter for CliErrorReporter {
    fn on_image_loading_failed(&self, error: &DecodeError, source: &ImageSource) {
        error!(source = %source, "Failed to open image: {}", error);
        self.failure.send_replace(Some(error.to_string()));
    }
}

#[derive(Serialize)]
struct RenderOutput<'a> {
    image_size: Option<IntSize>,
    canvas_size: Option<IntSize>,
    transformation: ContentTransformation,
    sample_size: SampleSize,
    loaded: bool,
    full_quality: bool,
    timed_out: bool,
    dispatches: u64,
    tiles: &'a [CanvasRegionTile],
}

async fn run_render(config: RenderConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (failure, mut failed) = watch::channel(None);
    let image = SubSamplingImage::spawn(
        ImageSource::file(&config.image),
        Arc::new(ImageDecoderFactory),
        Arc::new(CliErrorReporter { failure }),
        config.pipeline_config(),
    );

    let transformation = config.transformation();
    image.set_canvas_size(config.canvas.canvas_size());
    image.set_transformation(transformation);

    let (snapshot, timed_out) = tokio::select! {
        snapshot = image.state().wait_until(ViewSnapshot::is_image_loaded_in_full_quality) => {
            (snapshot, false)
        }
        _ = failed.wait_for(Option::is_some) => {
            return ExitCode::FAILURE;
        }
        _ = tokio::time::sleep(config.timeout()) => {
            warn!(
                timeout_ms = config.timeout_ms,
                "Timed out before every tile was decoded"
            );
            (image.state().snapshot(), true)
        }
    };

    let sample_size = match snapshot.image_size {
        Some(image_size) => SampleSize::for_scale(transformation.scale.max_scale(), image_size),
        None => SampleSize::ONE,
    };
    let dispatches = image.cache().map_or(0, |cache| cache.dispatch_count());

    let code = print_json(&RenderOutput {
        image_size: snapshot.image_size,
        canvas_size: snapshot.canvas_size,
        transformation,
        sample_size,
        loaded: snapshot.is_image_loaded(),
        full_quality: snapshot.is_image_loaded_in_full_quality(),
        timed_out,
        dispatches,
        tiles: &snapshot.tiles,
    });

    image.dispose();
    code
}

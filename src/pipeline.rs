//! Pipeline driver for one sub-sampled image.
//!
//! [`SubSamplingImage`] wires everything together for the lifetime of an image
//! source:
//!
//! 1. Opens the source with a [`RegionDecoderFactory`]. Failure goes to the
//!    [`ErrorReporter`] once and the image size stays unset.
//! 2. Creates the [`TileCache`] for the opened decoder.
//! 3. Waits for a usable canvas size and builds the [`TileGrid`].
//! 4. Recomposes the render list whenever the transformation, the canvas size
//!    or the cache's bitmaps change, and publishes it to the [`ViewState`].
//!
//! All of this runs on a spawned Tokio task, so the caller (typically a UI
//! thread) only ever pushes inputs and reads snapshots.
//!
//! # Example
//!
//! ```ignore
//! use subsampling_viewer::{ImageDecoderFactory, ImageSource, NoOpErrorReporter, SubSamplingImage};
//!
//! let image = SubSamplingImage::spawn(
//!     ImageSource::file("scan.jpg"),
//!     Arc::new(ImageDecoderFactory),
//!     Arc::new(NoOpErrorReporter),
//!     PipelineConfig::default(),
//! );
//! image.set_canvas_size(IntSize::new(1080, 1920));
//! image.set_transformation(ContentTransformation::IDENTITY);
//!
//! let mut view = image.state().subscribe();
//! while view.changed().await.is_ok() {
//!     draw(&view.borrow_and_update().tiles);
//! }
//! ```

use std::sync::{Arc, OnceLock};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::decoder::{ErrorReporter, ImageSource, RegionDecoderFactory};
use crate::geometry::IntSize;
use crate::state::ViewState;
use crate::tile::{ContentTransformation, RenderListComposer, TileCache, TileGrid};

// =============================================================================
// Sub-sampling image
// =============================================================================

/// Drives the tile pipeline for one image source at a time.
pub struct SubSamplingImage {
    factory: Arc<dyn RegionDecoderFactory>,
    reporter: Arc<dyn ErrorReporter>,
    config: PipelineConfig,
    source: ImageSource,
    state: ViewState,
    canvas_size: watch::Sender<Option<IntSize>>,
    transformation: watch::Sender<ContentTransformation>,
    session: Session,
}

impl SubSamplingImage {
    /// Start loading `source`. Must be called inside a Tokio runtime.
    pub fn spawn(
        source: ImageSource,
        factory: Arc<dyn RegionDecoderFactory>,
        reporter: Arc<dyn ErrorReporter>,
        config: PipelineConfig,
    ) -> Self {
        let state = ViewState::new();
        let (canvas_size, _) = watch::channel(None);
        let (transformation, _) = watch::channel(ContentTransformation::IDENTITY);

        let session = Session::start(SessionContext {
            source: source.clone(),
            factory: Arc::clone(&factory),
            reporter: Arc::clone(&reporter),
            config,
            epoch: state.begin_session(),
            state: state.clone(),
            cache: Arc::new(OnceLock::new()),
            canvas_size: canvas_size.subscribe(),
            transformation: transformation.subscribe(),
        });

        Self {
            factory,
            reporter,
            config,
            source,
            state,
            canvas_size,
            transformation,
            session,
        }
    }

    /// Drawing state for the UI.
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    /// Report a new viewport size. Zero-sized canvases are ignored.
    pub fn set_canvas_size(&self, size: IntSize) {
        self.canvas_size.send_replace(Some(size));
    }

    /// Report a new zoom/pan transformation.
    pub fn set_transformation(&self, transformation: ContentTransformation) {
        self.transformation.send_if_modified(|current| {
            if *current == transformation {
                false
            } else {
                *current = transformation;
                true
            }
        });
    }

    /// Tile cache of the current session, once the source has been opened.
    pub fn cache(&self) -> Option<Arc<TileCache>> {
        self.session.cache.get().cloned()
    }

    /// Swap in a new image source.
    ///
    /// The current session is torn down first: its decodes are cancelled,
    /// its bitmaps dropped and its view state cleared, so nothing from the
    /// previous image can be drawn over the new one.
    pub fn replace_source(&mut self, source: ImageSource) {
        self.session.teardown();
        info!(from = %self.source, to = %source, "Replacing image source");

        self.source = source;
        self.session = Session::start(SessionContext {
            source: self.source.clone(),
            factory: Arc::clone(&self.factory),
            reporter: Arc::clone(&self.reporter),
            config: self.config,
            epoch: self.state.begin_session(),
            state: self.state.clone(),
            cache: Arc::new(OnceLock::new()),
            canvas_size: self.canvas_size.subscribe(),
            transformation: self.transformation.subscribe(),
        });
    }

    /// Stop the pipeline and release every bitmap. Also done on drop.
    pub fn dispose(&self) {
        self.session.teardown();
        self.state.begin_session();
    }
}

impl Drop for SubSamplingImage {
    fn drop(&mut self) {
        self.session.teardown();
    }
}

// =============================================================================
// Session
// =============================================================================

/// One image source's task and cache.
struct Session {
    task: JoinHandle<()>,
    cache: Arc<OnceLock<Arc<TileCache>>>,
}

impl Session {
    fn start(ctx: SessionContext) -> Self {
        let cache = Arc::clone(&ctx.cache);
        let task = tokio::spawn(run_session(ctx));
        Self { task, cache }
    }

    fn teardown(&self) {
        self.task.abort();
        if let Some(cache) = self.cache.get() {
            cache.close();
        }
    }
}

struct SessionContext {
    source: ImageSource,
    factory: Arc<dyn RegionDecoderFactory>,
    reporter: Arc<dyn ErrorReporter>,
    config: PipelineConfig,
    epoch: u64,
    state: ViewState,
    cache: Arc<OnceLock<Arc<TileCache>>>,
    canvas_size: watch::Receiver<Option<IntSize>>,
    transformation: watch::Receiver<ContentTransformation>,
}

fn usable_canvas(size: Option<IntSize>) -> Option<IntSize> {
    size.filter(|size| size.min_dimension() > 0)
}

/// Wait until the canvas has a non-zero size. `None` once the input is gone.
async fn wait_for_canvas(canvas: &mut watch::Receiver<Option<IntSize>>) -> Option<IntSize> {
    loop {
        let latest = *canvas.borrow_and_update();
        if let Some(size) = usable_canvas(latest) {
            return Some(size);
        }
        if canvas.changed().await.is_err() {
            return None;
        }
    }
}

async fn run_session(mut ctx: SessionContext) {
    let decoder = match ctx
        .factory
        .create(&ctx.source, ctx.config.pixel_format)
        .await
    {
        Ok(decoder) => decoder,
        Err(err) => {
            warn!(source = %ctx.source, "Could not open image: {}", err);
            ctx.reporter.on_image_loading_failed(&err, &ctx.source);
            return;
        }
    };

    let image_size = decoder.image_size();
    info!(source = %ctx.source, size = %image_size, "Opened image");
    ctx.state.set_image_size(ctx.epoch, image_size);

    let cache = Arc::new(TileCache::new(
        decoder,
        Arc::clone(&ctx.reporter),
        ctx.source.clone(),
        ctx.config,
    ));
    if ctx.cache.set(Arc::clone(&cache)).is_err() {
        return;
    }
    let mut bitmaps = cache.observe_bitmaps();

    let Some(mut canvas_size) = wait_for_canvas(&mut ctx.canvas_size).await else {
        return;
    };
    let mut composer = build_composer(canvas_size, image_size);

    loop {
        let transformation = *ctx.transformation.borrow_and_update();
        let loaded = bitmaps.borrow_and_update().clone();
        let tiles = composer.compose_and_request(&transformation, &loaded, &cache);
        ctx.state.set_tiles(ctx.epoch, canvas_size, tiles);

        tokio::select! {
            changed = ctx.transformation.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = bitmaps.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            changed = ctx.canvas_size.changed() => {
                if changed.is_err() {
                    return;
                }
                // Unusable sizes keep the previous grid.
                let latest = *ctx.canvas_size.borrow_and_update();
                if let Some(size) = usable_canvas(latest) {
                    if size != canvas_size {
                        canvas_size = size;
                        composer = build_composer(canvas_size, image_size);
                    }
                }
            }
        }
    }
}

fn build_composer(canvas_size: IntSize, image_size: IntSize) -> RenderListComposer {
    let grid = TileGrid::generate(canvas_size, image_size);
    debug!(
        canvas = %canvas_size,
        base_sample_size = %grid.base().sample_size,
        levels = grid.sample_sizes().count(),
        tiles = grid.foreground_tile_count(),
        "Generated tile grid"
    );
    RenderListComposer::new(Arc::new(grid), canvas_size)
}

//! Pipeline integration tests.
//!
//! Tests verify:
//! - Source-open failures reach the reporter exactly once
//! - The base tile fills in while foreground tiles decode
//! - Rapid viewport changes coalesce into one decode batch
//! - Replacing the source tears the previous session down
//! - The `image`-backed decoder works end to end

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use subsampling_viewer::config::PipelineConfig;
use subsampling_viewer::decoder::{ImageDecoderFactory, ImageSource, RegionDecoderFactory};
use subsampling_viewer::geometry::{IntRect, IntSize, Offset, ScaleFactor};
use subsampling_viewer::pipeline::SubSamplingImage;
use subsampling_viewer::state::ViewSnapshot;
use subsampling_viewer::tile::{
    BitmapRegionTile, ContentTransformation, LoadedBitmaps, RenderListComposer, SampleSize,
    TileGrid,
};

use super::test_utils::{
    create_two_tone_png, mock_source, Gate, MockDecoderFactory, RecordingReporter,
};

const IMAGE: IntSize = IntSize::new(4000, 3000);
const CANVAS: IntSize = IntSize::new(1000, 1000);

fn spawn(
    source: ImageSource,
    factory: &Arc<MockDecoderFactory>,
    reporter: &Arc<RecordingReporter>,
) -> SubSamplingImage {
    let factory: Arc<dyn RegionDecoderFactory> = factory.clone();
    SubSamplingImage::spawn(
        source,
        factory,
        reporter.clone(),
        PipelineConfig::default(),
    )
}

async fn wait_for(
    image: &SubSamplingImage,
    predicate: impl FnMut(&ViewSnapshot) -> bool,
) -> ViewSnapshot {
    tokio::time::timeout(Duration::from_secs(30), image.state().wait_until(predicate))
        .await
        .expect("view state should reach the expected condition")
}

// =============================================================================
// Source Opening
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_open_failure_is_reported_once() {
    let factory = Arc::new(MockDecoderFactory::new());
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("missing"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::IDENTITY);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(factory.open_count(), 1);
    let failures = reporter.load_failures();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("bytes:missing"));

    assert_eq!(image.state().image_size(), None);
    assert!(image.state().tiles().is_empty());
    assert!(!image.state().is_image_loaded());
    assert!(image.cache().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_image_size_published_before_canvas_is_known() {
    let factory = Arc::new(MockDecoderFactory::new().with_image("scan", IMAGE));
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    let snapshot = wait_for(&image, |s| s.image_size.is_some()).await;

    assert_eq!(snapshot.image_size, Some(IMAGE));
    assert!(snapshot.tiles.is_empty());

    // A zero-sized canvas is not usable.
    image.set_canvas_size(IntSize::new(0, 800));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(image.state().tiles().is_empty());
    assert_eq!(factory.last_decoder().unwrap().call_count(), 0);
}

// =============================================================================
// Progressive Loading
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_base_tile_shown_while_foreground_decodes() {
    let gate = Gate::closed();
    let factory = Arc::new(
        MockDecoderFactory::new()
            .with_image("scan", IMAGE)
            .with_gate(SampleSize::ONE, gate.clone()),
    );
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::IDENTITY);

    let partial = wait_for(&image, ViewSnapshot::is_image_loaded).await;
    assert!(!partial.is_image_loaded_in_full_quality());
    assert!(partial.tiles[0].is_base_tile);
    assert!(partial.tiles[0].has_bitmap());
    assert_eq!(partial.tiles[0].bitmap_region.sample_size, SampleSize::new(4));

    let foreground: Vec<_> = partial.tiles.iter().filter(|t| !t.is_base_tile).collect();
    assert_eq!(foreground.len(), 4);
    assert!(foreground.iter().all(|t| !t.has_bitmap()));

    gate.open();
    let full = wait_for(&image, ViewSnapshot::is_image_loaded_in_full_quality).await;

    assert_eq!(full.tiles.len(), 4);
    assert!(full.tiles.iter().all(|t| !t.is_base_tile && t.has_bitmap()));
    assert_eq!(full.canvas_size, Some(CANVAS));

    // Base plus four foreground tiles, decoded once each in one batch.
    let decoder = factory.last_decoder().unwrap();
    assert_eq!(decoder.call_count(), 5);
    assert_eq!(decoder.completed_count(), 5);
    assert_eq!(image.cache().unwrap().dispatch_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_tile_is_reported_and_base_stays_drawn() {
    let failing = BitmapRegionTile::new(
        IntRect::new(0, 0, 500, 500),
        SampleSize::ONE,
    );
    let factory = Arc::new(
        MockDecoderFactory::new()
            .with_image("scan", IMAGE)
            .with_failing_tile(failing),
    );
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::IDENTITY);

    // Three of four foreground tiles load; the base covers the hole.
    let snapshot = wait_for(&image, |s| {
        s.is_image_loaded()
            && s.tiles.iter().filter(|t| !t.is_base_tile && t.has_bitmap()).count() == 3
    })
    .await;

    assert!(snapshot.is_image_loaded());
    assert!(!snapshot.is_image_loaded_in_full_quality());
    assert!(snapshot.tiles[0].is_base_tile);
    assert!(reporter.region_failures().contains(&failing));
    assert!(reporter.load_failures().is_empty());
}

// =============================================================================
// Throttling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_burst_of_transformations_decodes_only_last_viewport() {
    let factory = Arc::new(MockDecoderFactory::new().with_image("scan", IMAGE));
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    wait_for(&image, |s| s.image_size.is_some()).await;

    let mut last = ContentTransformation::IDENTITY;
    for step in 0..20 {
        last = ContentTransformation::new(
            ScaleFactor::uniform(1.0),
            Offset::new(-(step as f32) * 150.0, -(step as f32) * 100.0),
        );
        image.set_transformation(last);
        tokio::task::yield_now().await;
    }

    wait_for(&image, ViewSnapshot::is_image_loaded_in_full_quality).await;

    let composer = RenderListComposer::new(Arc::new(TileGrid::generate(CANVAS, IMAGE)), CANVAS);
    let expected: HashSet<BitmapRegionTile> = composer
        .compose(&last, &LoadedBitmaps::default())
        .wanted
        .into_iter()
        .collect();

    let decoder = factory.last_decoder().unwrap();
    let decoded: HashSet<BitmapRegionTile> = decoder.calls().into_iter().collect();
    assert_eq!(decoded, expected);
    assert_eq!(decoder.call_count(), expected.len());
    assert_eq!(image.cache().unwrap().dispatch_count(), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_replace_source_tears_down_previous_session() {
    let gate = Gate::closed();
    let factory = Arc::new(
        MockDecoderFactory::new()
            .with_image("first", IMAGE)
            .with_image("second", IntSize::new(2000, 1500))
            .with_gate(SampleSize::ONE, gate.clone()),
    );
    let reporter = Arc::new(RecordingReporter::new());

    let mut image = spawn(mock_source("first"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::IDENTITY);

    wait_for(&image, ViewSnapshot::is_image_loaded).await;
    let old_cache = image.cache().unwrap();
    assert_eq!(old_cache.in_flight_count(), 4);

    image.replace_source(mock_source("second"));

    // Torn down synchronously.
    assert!(old_cache.is_closed());
    assert!(old_cache.is_empty());
    assert!(old_cache.loaded_bitmaps().is_empty());
    assert_eq!(image.state().image_size(), None);
    assert!(image.state().tiles().is_empty());

    gate.open();
    let snapshot = wait_for(&image, ViewSnapshot::is_image_loaded_in_full_quality).await;

    let second = IntSize::new(2000, 1500);
    assert_eq!(snapshot.image_size, Some(second));
    assert!(snapshot
        .tiles
        .iter()
        .all(|t| t.bitmap_region.region.fits_within(second)));
    assert!(old_cache.is_empty());
    assert_eq!(factory.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_canvas_change_rebuilds_grid() {
    let factory = Arc::new(MockDecoderFactory::new().with_image("scan", IMAGE));
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::new(
        ScaleFactor::uniform(0.25),
        Offset::ZERO,
    ));

    let first = wait_for(&image, ViewSnapshot::is_image_loaded_in_full_quality).await;
    assert_eq!(first.tiles.len(), 1);
    assert_eq!(first.tiles[0].bitmap_region.sample_size, SampleSize::new(4));

    // A smaller canvas lowers the base resolution, so the same zoom level
    // now has a foreground grid of its own.
    let small = IntSize::new(250, 250);
    image.set_canvas_size(small);
    let second = wait_for(&image, |s| {
        s.canvas_size == Some(small) && s.is_image_loaded_in_full_quality()
    })
    .await;

    // 256px decoded cells at sample size 4: one 1024px tile fills the view.
    assert_eq!(second.tiles.len(), 1);
    let tile = &second.tiles[0];
    assert!(!tile.is_base_tile);
    assert_eq!(tile.bitmap_region.sample_size, SampleSize::new(4));
    assert_eq!(tile.bitmap_region.region, IntRect::new(0, 0, 1024, 1024));
}

#[tokio::test(start_paused = true)]
async fn test_dispose_stops_pipeline_and_clears_state() {
    let factory = Arc::new(
        MockDecoderFactory::new()
            .with_image("scan", IMAGE)
            .with_delay(Duration::from_secs(5)),
    );
    let reporter = Arc::new(RecordingReporter::new());

    let image = spawn(mock_source("scan"), &factory, &reporter);
    image.set_canvas_size(CANVAS);
    image.set_transformation(ContentTransformation::IDENTITY);

    wait_for(&image, |s| !s.tiles.is_empty()).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let cache = image.cache().unwrap();
    assert!(cache.in_flight_count() > 0);

    image.dispose();
    assert!(cache.is_closed());
    assert!(image.state().tiles().is_empty());

    // Aborted decodes never complete.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(factory.last_decoder().unwrap().completed_count(), 0);
    assert!(image.state().tiles().is_empty());
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test]
async fn test_png_renders_in_full_quality() {
    let png = create_two_tone_png(256, 128);
    let reporter = Arc::new(RecordingReporter::new());

    let image = SubSamplingImage::spawn(
        ImageSource::bytes("two-tone", png),
        Arc::new(ImageDecoderFactory),
        reporter.clone(),
        PipelineConfig::default().with_throttle_window(Duration::from_millis(10)),
    );
    image.set_canvas_size(IntSize::new(64, 64));
    image.set_transformation(ContentTransformation::new(
        ScaleFactor::uniform(0.5),
        Offset::ZERO,
    ));

    let snapshot = wait_for(&image, ViewSnapshot::is_image_loaded_in_full_quality).await;

    assert_eq!(snapshot.image_size, Some(IntSize::new(256, 128)));
    assert_eq!(snapshot.tiles.len(), 1);
    for tile in snapshot.tiles.iter() {
        assert!(!tile.is_base_tile);
        assert_eq!(tile.bitmap_region.sample_size, SampleSize::new(2));
        let bitmap = tile.bitmap.as_ref().unwrap();
        assert_eq!(bitmap.size(), tile.bitmap_region.decoded_size());
    }
    assert!(reporter.load_failures().is_empty());
    assert!(reporter.region_failures().is_empty());
}

#[tokio::test]
async fn test_garbage_bytes_fail_to_open() {
    let reporter = Arc::new(RecordingReporter::new());

    let image = SubSamplingImage::spawn(
        ImageSource::bytes("garbage", &b"definitely not an image"[..]),
        Arc::new(ImageDecoderFactory),
        reporter.clone(),
        PipelineConfig::default(),
    );
    image.set_canvas_size(CANVAS);

    tokio::time::timeout(Duration::from_secs(10), async {
        while reporter.load_failures().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("open failure should be reported");

    assert_eq!(reporter.load_failures().len(), 1);
    assert_eq!(image.state().image_size(), None);
}

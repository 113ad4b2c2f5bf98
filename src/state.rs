//! Reactive view state handed to the UI layer.
//!
//! [`ViewState`] is a cheap, cloneable handle over a `watch` channel. The UI
//! reads snapshots or subscribes to changes; only the pipeline writes.

use std::sync::Arc;

use tokio::sync::watch;

use crate::geometry::IntSize;
use crate::tile::CanvasRegionTile;

/// Everything the UI needs to draw one frame.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    /// Unscaled image size, `None` until the source has been opened
    pub image_size: Option<IntSize>,

    /// Canvas size the tiles were composed for
    pub canvas_size: Option<IntSize>,

    /// Tiles in draw order
    pub tiles: Arc<[CanvasRegionTile]>,

    /// Session that produced this snapshot
    epoch: u64,
}

impl Default for ViewSnapshot {
    fn default() -> Self {
        Self {
            image_size: None,
            canvas_size: None,
            tiles: Arc::from(Vec::new()),
            epoch: 0,
        }
    }
}

impl ViewSnapshot {
    /// At least something can be drawn: the low-resolution base tile, or
    /// every foreground tile.
    pub fn is_image_loaded(&self) -> bool {
        self.canvas_size.is_some()
            && !self.tiles.is_empty()
            && (self
                .tiles
                .iter()
                .any(|tile| tile.is_base_tile && tile.has_bitmap())
                || self.tiles.iter().all(CanvasRegionTile::has_bitmap))
    }

    /// Every tile on screen is decoded; nothing leans on the base fallback.
    pub fn is_image_loaded_in_full_quality(&self) -> bool {
        self.is_image_loaded() && self.tiles.iter().all(CanvasRegionTile::has_bitmap)
    }
}

/// Observable drawing state of one sub-sampled image.
#[derive(Debug, Clone)]
pub struct ViewState {
    inner: Arc<watch::Sender<ViewSnapshot>>,
}

impl ViewState {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ViewSnapshot::default());
        Self {
            inner: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ViewSnapshot> {
        self.inner.subscribe()
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        self.inner.borrow().clone()
    }

    pub fn image_size(&self) -> Option<IntSize> {
        self.inner.borrow().image_size
    }

    pub fn tiles(&self) -> Arc<[CanvasRegionTile]> {
        Arc::clone(&self.inner.borrow().tiles)
    }

    pub fn is_image_loaded(&self) -> bool {
        self.inner.borrow().is_image_loaded()
    }

    pub fn is_image_loaded_in_full_quality(&self) -> bool {
        self.inner.borrow().is_image_loaded_in_full_quality()
    }

    /// Wait until `predicate` holds for the current snapshot and return it.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&ViewSnapshot) -> bool,
    ) -> ViewSnapshot {
        let mut receiver = self.subscribe();
        let snapshot = match receiver.wait_for(|snapshot| predicate(snapshot)).await {
            Ok(snapshot) => snapshot.clone(),
            // The sender lives in `self`, so the channel outlives this call.
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Start a new session: clear everything and return its epoch.
    ///
    /// Writes tagged with an older epoch are ignored from now on.
    pub(crate) fn begin_session(&self) -> u64 {
        let mut epoch = 0;
        self.inner.send_modify(|snapshot| {
            epoch = snapshot.epoch + 1;
            *snapshot = ViewSnapshot {
                epoch,
                ..ViewSnapshot::default()
            };
        });
        epoch
    }

    pub(crate) fn set_image_size(&self, epoch: u64, image_size: IntSize) {
        self.inner.send_if_modified(|snapshot| {
            if snapshot.epoch != epoch || snapshot.image_size == Some(image_size) {
                return false;
            }
            snapshot.image_size = Some(image_size);
            true
        });
    }

    /// Publish a composed tile list unless it equals the current one.
    pub(crate) fn set_tiles(&self, epoch: u64, canvas_size: IntSize, tiles: Vec<CanvasRegionTile>) {
        self.inner.send_if_modified(|snapshot| {
            if snapshot.epoch != epoch {
                return false;
            }
            if snapshot.canvas_size == Some(canvas_size) && *snapshot.tiles == *tiles {
                return false;
            }
            snapshot.canvas_size = Some(canvas_size);
            snapshot.tiles = tiles.into();
            true
        });
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new()
    }
}

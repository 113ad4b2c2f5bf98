//! Asynchronous bitmap cache for decoded tiles.
//!
//! The cache keeps exactly the tiles the viewport currently needs. Every call
//! to [`TileCache::request_tiles`] describes the full working set: tiles
//! outside it are evicted immediately (aborting their decode if it is still
//! running), tiles inside it that are not cached yet are queued for decoding.
//!
//! # Throttling
//!
//! Load requests arrive on every frame of a pinch or pan. They go through a
//! latest-wins slot (`tokio::sync::watch`) read by a dispatcher task. Once a
//! request lands, the dispatcher waits one throttle window and then decodes
//! only the most recent batch; everything sent during the window is
//! coalesced away.
//!
//! ```text
//!  request_tiles ──► [latest batch] ──► dispatcher ──► decode task ──┐
//!        │                              (1 per window)               │
//!        └── evict / abort ──┐                                       ▼
//!                            ▼                                 finish(tile, id)
//!                  ┌───────────────────────┐                         │
//!                  │ entries: tile → state │ ◄───────────────────────┘
//!                  └──────────┬────────────┘
//!                             ▼
//!                  observe_bitmaps() (loaded only, deduplicated)
//! ```
//!
//! # Consistency
//!
//! All entries live behind one mutex that is never held across an `.await`.
//! Each in-flight decode carries a generation id; a result is stored only if
//! the entry still holds that same id, so a decode that finishes after its
//! tile was evicted (or evicted and re-requested) never reaches the cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, trace};

use crate::config::PipelineConfig;
use crate::decoder::{Bitmap, ErrorReporter, ImageSource, RegionDecoder};
use crate::error::DecodeError;

use super::grid::BitmapRegionTile;

/// Snapshot of every decoded tile.
pub type LoadedBitmaps = Arc<HashMap<BitmapRegionTile, Arc<Bitmap>>>;

/// Public view of a cached tile's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLoadState {
    /// Decode dispatched but not finished
    InFlight,

    /// Bitmap available
    Loaded,
}

enum LoadingState {
    InFlight { id: u64, handle: AbortHandle },
    Loaded(Arc<Bitmap>),
}

struct CacheState {
    entries: HashMap<BitmapRegionTile, LoadingState>,
    next_id: u64,
    closed: bool,
}

/// State shared between the cache handle, the dispatcher and decode tasks.
struct CacheShared {
    decoder: Arc<dyn RegionDecoder>,
    reporter: Arc<dyn ErrorReporter>,
    source: ImageSource,
    state: Mutex<CacheState>,
    loaded: watch::Sender<LoadedBitmaps>,
    dispatches: AtomicU64,
}

impl CacheShared {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start decoding every tile of `batch` that is still absent.
    fn dispatch(self: &Arc<Self>, batch: Vec<BitmapRegionTile>) {
        let mut state = self.lock();
        if state.closed {
            return;
        }

        let mut started = 0usize;
        for tile in batch {
            if state.entries.contains_key(&tile) {
                continue;
            }

            let id = state.next_id;
            state.next_id += 1;

            let shared = Arc::clone(self);
            let handle = tokio::spawn(async move {
                let result = shared.decoder.decode_region(&tile).await;
                shared.finish(tile, id, result);
            })
            .abort_handle();

            state
                .entries
                .insert(tile, LoadingState::InFlight { id, handle });
            started += 1;
        }

        self.dispatches.fetch_add(1, Ordering::Relaxed);
        debug!(
            started,
            cached = state.entries.len(),
            "Dispatched tile decodes"
        );
    }

    /// Store the outcome of decode `id` for `tile`, unless it was cancelled.
    fn finish(&self, tile: BitmapRegionTile, id: u64, result: Result<Bitmap, DecodeError>) {
        let mut state = self.lock();

        let still_wanted = matches!(
            state.entries.get(&tile),
            Some(LoadingState::InFlight { id: current, .. }) if *current == id
        );
        if !still_wanted {
            trace!(region = %tile.region, "Discarding result of cancelled decode");
            return;
        }

        match result {
            Ok(bitmap) => {
                state
                    .entries
                    .insert(tile, LoadingState::Loaded(Arc::new(bitmap)));
                self.publish(&state);
            }
            Err(DecodeError::Cancelled) => {
                state.entries.remove(&tile);
            }
            Err(err) => {
                state.entries.remove(&tile);
                drop(state);
                self.reporter
                    .on_region_decoding_failed(&err, &self.source, &tile);
            }
        }
    }

    /// Publish the loaded entries if they differ from the last snapshot.
    fn publish(&self, state: &CacheState) {
        let loaded: HashMap<BitmapRegionTile, Arc<Bitmap>> = state
            .entries
            .iter()
            .filter_map(|(tile, entry)| match entry {
                LoadingState::Loaded(bitmap) => Some((*tile, Arc::clone(bitmap))),
                LoadingState::InFlight { .. } => None,
            })
            .collect();

        self.loaded.send_if_modified(|current| {
            let unchanged = current.len() == loaded.len()
                && loaded.iter().all(|(tile, bitmap)| {
                    current
                        .get(tile)
                        .is_some_and(|existing| Arc::ptr_eq(existing, bitmap))
                });
            if unchanged {
                false
            } else {
                *current = Arc::new(loaded);
                true
            }
        });
    }
}

// =============================================================================
// Tile Cache
// =============================================================================

/// Working-set cache of decoded tiles for one image source.
///
/// Create one per opened image and drop (or [`close`](TileCache::close)) it
/// when the source changes. Must be created inside a Tokio runtime.
///
/// # Example
///
/// ```ignore
/// let cache = TileCache::new(decoder, reporter, source, PipelineConfig::default());
///
/// // Each frame: describe everything that should stay resident.
/// cache.request_tiles(&wanted);
///
/// // Elsewhere: react to newly decoded bitmaps.
/// let mut bitmaps = cache.observe_bitmaps();
/// while bitmaps.changed().await.is_ok() {
///     let loaded = bitmaps.borrow_and_update().clone();
///     // ...
/// }
/// ```
pub struct TileCache {
    shared: Arc<CacheShared>,
    requests: watch::Sender<Vec<BitmapRegionTile>>,
    dispatcher: JoinHandle<()>,
}

impl TileCache {
    pub fn new(
        decoder: Arc<dyn RegionDecoder>,
        reporter: Arc<dyn ErrorReporter>,
        source: ImageSource,
        config: PipelineConfig,
    ) -> Self {
        let (loaded, _) = watch::channel(LoadedBitmaps::default());
        let shared = Arc::new(CacheShared {
            decoder,
            reporter,
            source,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_id: 0,
                closed: false,
            }),
            loaded,
            dispatches: AtomicU64::new(0),
        });

        let (requests, pending) = watch::channel(Vec::new());
        let dispatcher = tokio::spawn(run_dispatcher(
            Arc::clone(&shared),
            pending,
            config.throttle_window,
        ));

        Self {
            shared,
            requests,
            dispatcher,
        }
    }

    /// Make `wanted` the cache's working set.
    ///
    /// Evicts every cached or in-flight tile not in `wanted` right away and
    /// queues decodes for the wanted tiles that are not cached yet. Repeating
    /// a request is a no-op. Never blocks on decoding.
    pub fn request_tiles(&self, wanted: &[BitmapRegionTile]) {
        let wanted_set: HashSet<BitmapRegionTile> = wanted.iter().copied().collect();

        let missing: Vec<BitmapRegionTile> = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }

            let unwanted: Vec<BitmapRegionTile> = state
                .entries
                .keys()
                .filter(|tile| !wanted_set.contains(tile))
                .copied()
                .collect();

            let mut evicted_bitmap = false;
            for tile in &unwanted {
                match state.entries.remove(tile) {
                    Some(LoadingState::InFlight { handle, .. }) => handle.abort(),
                    Some(LoadingState::Loaded(_)) => evicted_bitmap = true,
                    None => {}
                }
            }
            if evicted_bitmap {
                self.shared.publish(&state);
            }
            if !unwanted.is_empty() {
                trace!(count = unwanted.len(), "Evicted tiles");
            }

            let mut seen = HashSet::with_capacity(wanted.len());
            wanted
                .iter()
                .filter(|tile| !state.entries.contains_key(tile) && seen.insert(**tile))
                .copied()
                .collect()
        };

        // An empty batch only needs to go out if it replaces a non-empty one.
        self.requests.send_if_modified(|pending| {
            let notify = !missing.is_empty() || !pending.is_empty();
            *pending = missing;
            notify
        });
    }

    /// Live view of the decoded tiles. Emits only when the loaded set changes.
    pub fn observe_bitmaps(&self) -> watch::Receiver<LoadedBitmaps> {
        self.shared.loaded.subscribe()
    }

    /// Current decoded tiles.
    pub fn loaded_bitmaps(&self) -> LoadedBitmaps {
        self.shared.loaded.borrow().clone()
    }

    pub fn state_of(&self, tile: &BitmapRegionTile) -> Option<TileLoadState> {
        self.shared.lock().entries.get(tile).map(|entry| match entry {
            LoadingState::InFlight { .. } => TileLoadState::InFlight,
            LoadingState::Loaded(_) => TileLoadState::Loaded,
        })
    }

    /// Number of tiles present, in flight or loaded.
    pub fn len(&self) -> usize {
        self.shared.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn in_flight_count(&self) -> usize {
        self.shared
            .lock()
            .entries
            .values()
            .filter(|entry| matches!(entry, LoadingState::InFlight { .. }))
            .count()
    }

    /// Number of batches the dispatcher has started.
    pub fn dispatch_count(&self) -> u64 {
        self.shared.dispatches.load(Ordering::Relaxed)
    }

    /// Tear the cache down: stop dispatching, abort every in-flight decode
    /// and drop all bitmaps. Later requests are ignored.
    pub fn close(&self) {
        self.dispatcher.abort();

        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;

        for (_, entry) in state.entries.drain() {
            if let LoadingState::InFlight { handle, .. } = entry {
                handle.abort();
            }
        }
        self.shared.publish(&state);
        debug!(source = %self.shared.source, "Closed tile cache");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for TileCache {
    fn drop(&mut self) {
        self.close();
    }
}

/// Throttled latest-wins dispatch loop.
async fn run_dispatcher(
    shared: Arc<CacheShared>,
    mut pending: watch::Receiver<Vec<BitmapRegionTile>>,
    window: Duration,
) {
    while pending.changed().await.is_ok() {
        // Let the burst settle; everything sent meanwhile replaces the batch.
        tokio::time::sleep(window).await;

        let batch = pending.borrow_and_update().clone();
        if !batch.is_empty() {
            shared.dispatch(batch);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Background tile builds.
//!
//! The [`WorkerPool`] loads the data of every scene source for a tile, runs [`build_tile`] on
//! the blocking thread pool of the runtime and posts exactly one [`BuildResponse`] per request
//! to the channel returned by [`WorkerPool::new`]. Workers only see an immutable
//! [`Scene`] and never touch the graphics context.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ahash::HashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Semaphore;

use crate::build::{build_tile, BuildRequest, BuiltTile, SourceData};
use crate::error::BuildError;
use crate::geometry::TileData;
use crate::scene::{Scene, SourceConfig};
use crate::tile::TileCoords;

/// Error that can occur when loading raw tile data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TileLoadError {
    /// Could not get the data from the source.
    #[error("failed to load tile: {0}")]
    Network(String),
    /// The source has no tile with the given index.
    #[error("tile does not exist")]
    DoesNotExist,
    /// The data is not a valid tile.
    #[error("failed to decode tile: {0}")]
    Decoding(String),
}

/// Loader of raw tile data.
#[async_trait::async_trait]
pub trait TileDataLoader: Send + Sync {
    /// Loads the data tile `coords` of the source.
    async fn load(
        &self,
        source: &str,
        config: &SourceConfig,
        coords: TileCoords,
    ) -> Result<TileData, TileLoadError>;
}

/// Loader serving tiles from memory, keyed by the tile url.
#[derive(Debug, Default, Clone)]
pub struct StaticTileLoader {
    tiles: HashMap<String, TileData>,
}

impl StaticTileLoader {
    /// Creates an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the tile served at `url`.
    pub fn insert(&mut self, url: impl Into<String>, data: TileData) {
        self.tiles.insert(url.into(), data);
    }

    /// Adds the tile served at `url` from a GeoJSON document.
    pub fn insert_geojson(&mut self, url: impl Into<String>, json: &str) -> Result<(), TileLoadError> {
        let data =
            TileData::from_geojson(json).map_err(|err| TileLoadError::Decoding(err.to_string()))?;
        self.insert(url, data);
        Ok(())
    }
}

#[async_trait::async_trait]
impl TileDataLoader for StaticTileLoader {
    async fn load(
        &self,
        source: &str,
        config: &SourceConfig,
        coords: TileCoords,
    ) -> Result<TileData, TileLoadError> {
        let url = config
            .tile_url(coords)
            .map_err(|err| TileLoadError::Network(err.to_string()))?;

        log::trace!("Loading tile {coords} of source {source} from {url}");
        self.tiles
            .get(&url)
            .cloned()
            .ok_or(TileLoadError::DoesNotExist)
    }
}

/// Configuration of the [`WorkerPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolOptions {
    /// Maximum number of tiles loaded and built at the same time.
    pub workers: usize,
}

impl Default for WorkerPoolOptions {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

/// Result of one build request.
#[derive(Debug)]
pub struct BuildResponse {
    /// Key of the tile.
    pub key: String,
    /// Generation of the request.
    pub generation: u64,
    /// Built buffers or the reason the build failed.
    pub result: Result<BuiltTile, BuildError>,
}

/// Pool of background build tasks.
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    loader: Arc<dyn TileDataLoader>,
    responses: UnboundedSender<BuildResponse>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("available", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool running on the given runtime. Responses are posted to the returned
    /// receiver.
    pub fn new(
        runtime: Handle,
        loader: Arc<dyn TileDataLoader>,
        options: WorkerPoolOptions,
    ) -> (Self, UnboundedReceiver<BuildResponse>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let pool = Self {
            runtime,
            permits: Arc::new(Semaphore::new(options.workers.max(1))),
            loader,
            responses: sender,
        };

        (pool, receiver)
    }

    /// Queues a build. A response is posted even if the data cannot be loaded.
    pub fn dispatch(&self, request: BuildRequest, scene: Arc<Scene>) {
        let permits = self.permits.clone();
        let loader = self.loader.clone();
        let responses = self.responses.clone();

        self.runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            let key = request.tile.key.clone();
            let generation = request.generation;
            let result = Self::run(loader.as_ref(), request, scene).await;

            if responses
                .send(BuildResponse {
                    key,
                    generation,
                    result,
                })
                .is_err()
            {
                log::trace!("Build response dropped, the receiver is gone");
            }
        });
    }

    /// Loads the data of all scene sources and builds the tile.
    ///
    /// A source without the tile contributes empty data.
    pub async fn run(
        loader: &dyn TileDataLoader,
        request: BuildRequest,
        scene: Arc<Scene>,
    ) -> Result<BuiltTile, BuildError> {
        let tile = request.tile;
        let mut data = SourceData::default();

        for (name, source) in scene.sources() {
            let tile_data = match loader.load(name, source, tile.coords).await {
                Ok(tile_data) => tile_data,
                Err(TileLoadError::DoesNotExist) => {
                    log::debug!("Source {name} has no data for tile {}", tile.key);
                    TileData::default()
                }
                Err(err) => {
                    return Err(BuildError::new(&tile.key, format!("source '{name}': {err}")))
                }
            };
            data.insert(name.clone(), tile_data);
        }

        static COUNTER: AtomicUsize = AtomicUsize::new(0);

        let key = tile.key.clone();
        tokio::task::spawn_blocking(move || {
            log::debug!("Added worker: {}", COUNTER.fetch_add(1, Ordering::Relaxed) + 1);
            let result = build_tile(&tile, &scene, &data);
            log::debug!("Finished worker: {}", COUNTER.fetch_sub(1, Ordering::Relaxed) - 1);
            result
        })
        .await
        .map_err(|err| BuildError::new(key, format!("build task failed: {err}")))?
    }
}

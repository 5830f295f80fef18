//! Main-side tracking of live tiles.

use std::sync::Arc;

use ahash::{HashMap, HashSet};
use tessera_shader::GraphicsContext;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::build::BuildRequest;
use crate::error::BuildError;
use crate::messenger::Messenger;
use crate::scene::Scene;
use crate::tile::{Tile, TileCoords};
use crate::worker::{BuildResponse, WorkerPool};

const EVENT_CAPACITY: usize = 256;

/// Change of a tile, published to the subscribers of the [`TileManager`].
#[derive(Debug, Clone, PartialEq)]
pub enum TileEvent {
    /// Fresh buffers of the tile were uploaded.
    Built {
        /// Tile key.
        key: String,
    },
    /// The most recent build of the tile failed.
    Failed {
        /// Tile key.
        key: String,
        /// Reason.
        error: BuildError,
    },
    /// The tile was removed and its buffers released.
    Removed {
        /// Tile key.
        key: String,
    },
}

/// Owns the live tiles, sends them to the [`WorkerPool`] and applies the build results.
///
/// Every build request gets a new generation number. A response is applied only if its tile is
/// still alive and the generation is the latest one requested for that tile, so results of
/// superseded builds are dropped without touching the graphics context.
pub struct TileManager {
    scene: Arc<Scene>,
    pool: WorkerPool,
    responses: UnboundedReceiver<BuildResponse>,
    tiles: HashMap<String, Tile>,
    next_generation: u64,
    debug: bool,
    events: broadcast::Sender<TileEvent>,
    messenger: Option<Box<dyn Messenger>>,
}

impl std::fmt::Debug for TileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileManager")
            .field("tiles", &self.tiles.len())
            .field("next_generation", &self.next_generation)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl TileManager {
    /// Creates a manager. `responses` is the receiver returned together with the pool.
    pub fn new(
        scene: Arc<Scene>,
        pool: WorkerPool,
        responses: UnboundedReceiver<BuildResponse>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            scene,
            pool,
            responses,
            tiles: HashMap::default(),
            next_generation: 1,
            debug: false,
            events,
            messenger: None,
        }
    }

    /// Sets the messenger notified after every applied build result.
    pub fn set_messenger(&mut self, messenger: impl Messenger + 'static) {
        self.messenger = Some(Box::new(messenger));
    }

    /// Makes the workers log per-tile counters.
    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    /// Subscribes to tile events.
    pub fn subscribe(&self) -> broadcast::Receiver<TileEvent> {
        self.events.subscribe()
    }

    /// Current scene.
    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Replaces the scene and rebuilds all tiles with it.
    pub fn set_scene(&mut self, scene: Arc<Scene>) {
        self.scene = scene;
        self.rebuild();
    }

    /// Makes the given tiles the visible set: tiles not in it are removed, missing ones are
    /// created and sent to build.
    pub fn update_visible(
        &mut self,
        context: &mut dyn GraphicsContext,
        visible: impl IntoIterator<Item = TileCoords>,
    ) {
        let visible: Vec<TileCoords> = visible.into_iter().collect();
        let keys: HashSet<String> = visible.iter().map(TileCoords::key).collect();

        let hidden: Vec<String> = self
            .tiles
            .keys()
            .filter(|key| !keys.contains(*key))
            .cloned()
            .collect();
        for key in hidden {
            self.remove_tile(context, &key);
        }

        for coords in visible {
            self.load_tile(coords);
        }
    }

    /// Starts tracking the tile and requests its build. Does nothing for a tracked tile.
    pub fn load_tile(&mut self, coords: TileCoords) {
        let key = coords.key();
        if self.tiles.contains_key(&key) {
            return;
        }

        let tile = Tile::new(coords, self.scene.max_zoom());
        self.tiles.insert(key.clone(), tile);
        self.request_build(&key);
    }

    /// Requests a new build of every tracked tile. Uploaded buffers stay until replaced.
    pub fn rebuild(&mut self) {
        let keys: Vec<String> = self.tiles.keys().cloned().collect();
        for key in keys {
            self.request_build(&key);
        }
    }

    /// Requests a new build of one tracked tile, e.g. to retry after [`TileEvent::Failed`].
    /// Returns false for an unknown key.
    pub fn rebuild_tile(&mut self, key: &str) -> bool {
        if !self.tiles.contains_key(key) {
            return false;
        }

        self.request_build(key);
        true
    }

    /// Stops tracking the tile and releases its buffers. Returns false for an unknown key.
    pub fn remove_tile(&mut self, context: &mut dyn GraphicsContext, key: &str) -> bool {
        let Some(mut tile) = self.tiles.remove(key) else {
            return false;
        };

        tile.release(context);
        log::trace!("Removed tile {key}");
        self.publish(TileEvent::Removed {
            key: key.to_string(),
        });

        true
    }

    /// Tracked tiles.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Tile with the given key.
    pub fn tile(&self, key: &str) -> Option<&Tile> {
        self.tiles.get(key)
    }

    /// Applies all build responses received so far. Returns the number of applied results.
    pub fn process_responses(&mut self, context: &mut dyn GraphicsContext) -> usize {
        let mut applied = 0;
        while let Ok(response) = self.responses.try_recv() {
            if self.apply(context, response) {
                applied += 1;
            }
        }

        applied
    }

    /// Waits for the next build response and applies it. Returns `None` when no more responses
    /// can arrive, otherwise whether the response was applied.
    pub async fn process_next(&mut self, context: &mut dyn GraphicsContext) -> Option<bool> {
        let response = self.responses.recv().await?;
        Some(self.apply(context, response))
    }

    fn request_build(&mut self, key: &str) {
        let Some(tile) = self.tiles.get_mut(key) else {
            return;
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        tile.start_build(generation);

        log::trace!("Requesting build of tile {key}, generation {generation}");
        self.pool.dispatch(
            BuildRequest {
                tile: tile.descriptor(self.debug),
                generation,
            },
            self.scene.clone(),
        );
    }

    fn apply(&mut self, context: &mut dyn GraphicsContext, response: BuildResponse) -> bool {
        log::trace!(
            "Received build response for tile {}, generation {}",
            response.key,
            response.generation
        );

        let Some(tile) = self.tiles.get_mut(&response.key) else {
            log::debug!("Discarding result for removed tile {}", response.key);
            return false;
        };

        if tile.generation() != response.generation {
            log::debug!(
                "Discarding stale result for tile {}: generation {}, expected {}",
                response.key,
                response.generation,
                tile.generation()
            );
            return false;
        }

        let event = match response.result {
            Ok(built) => {
                tile.set_built(built);
                tile.finalize(context);
                TileEvent::Built { key: response.key }
            }
            Err(error) => {
                log::warn!("Failed to build tile: {error}");
                TileEvent::Failed {
                    key: response.key,
                    error,
                }
            }
        };

        self.publish(event);
        if let Some(messenger) = &self.messenger {
            messenger.request_redraw();
        }

        true
    }

    fn publish(&self, event: TileEvent) {
        // Sending only fails when nobody is subscribed.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::BuiltTile;
    use crate::builders::VertexBuffer;
    use crate::style::StyleKind;
    use crate::tile::{OrderRange, TileDebug, TileState};
    use crate::worker::{StaticTileLoader, WorkerPoolOptions};
    use assert_matches::assert_matches;
    use bytes::Bytes;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_shader::HeadlessContext;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc::{self, UnboundedSender};

    #[derive(Clone, Default)]
    struct CountingMessenger(Arc<AtomicUsize>);

    impl Messenger for CountingMessenger {
        fn request_redraw(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Manager whose responses come from the returned sender instead of the pool.
    fn manager() -> (TileManager, UnboundedSender<BuildResponse>) {
        let scene = Scene::from_json(
            &json!({
                "sources": {"osm": {"url": "https://tiles/{z}/{x}/{y}.json", "max_zoom": 14}},
                "layers": {"water": {"data": {"source": "osm"}}}
            })
            .to_string(),
        )
        .expect("valid scene");

        let (pool, _) = WorkerPool::new(
            Handle::current(),
            Arc::new(StaticTileLoader::new()),
            WorkerPoolOptions::default(),
        );
        let (sender, receiver) = mpsc::unbounded_channel();

        (TileManager::new(Arc::new(scene), pool, receiver), sender)
    }

    fn built(key: &str) -> BuiltTile {
        let stride = StyleKind::Lines.layout().stride();
        BuiltTile {
            key: key.to_string(),
            buffers: BTreeMap::from([(
                "lines".to_string(),
                VertexBuffer {
                    kind: StyleKind::Lines,
                    data: Bytes::from(vec![0u8; stride * 3]),
                    vertex_count: 3,
                    geometries: 1,
                    order: 2,
                },
            )]),
            order: OrderRange { min: 2, max: 2 },
            debug: TileDebug::default(),
        }
    }

    fn response(key: &str, generation: u64) -> BuildResponse {
        BuildResponse {
            key: key.to_string(),
            generation,
            result: Ok(built(key)),
        }
    }

    #[tokio::test]
    async fn applies_current_generation() {
        let (mut manager, sender) = manager();
        let messenger = CountingMessenger::default();
        manager.set_messenger(messenger.clone());
        let mut events = manager.subscribe();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(1, 2, 3));
        let generation = manager.tile("1/2/3").expect("tracked").generation();
        assert_eq!(
            manager.tile("1/2/3").map(Tile::state),
            Some(TileState::Loading)
        );

        sender.send(response("1/2/3", generation)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 1);

        let tile = manager.tile("1/2/3").expect("tracked");
        assert_eq!(tile.state(), TileState::Finalized);
        assert_eq!(tile.buffers()["lines"].vertex_count, 3);
        assert_eq!(context.live_buffers(), 1);
        assert_eq!(messenger.0.load(Ordering::Relaxed), 1);
        assert_eq!(
            events.try_recv().expect("event"),
            TileEvent::Built {
                key: "1/2/3".into()
            }
        );
    }

    #[tokio::test]
    async fn stale_generation_is_ignored() {
        let (mut manager, sender) = manager();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(0, 0, 1));
        let first = manager.tile("0/0/1").expect("tracked").generation();
        manager.rebuild();
        let second = manager.tile("0/0/1").expect("tracked").generation();
        assert!(second > first);

        sender.send(response("0/0/1", first)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 0);
        assert_eq!(context.live_buffers(), 0);

        sender.send(response("0/0/1", second)).expect("open");
        assert_eq!(manager.process_next(&mut context).await, Some(true));
        assert_eq!(context.live_buffers(), 1);
    }

    #[tokio::test]
    async fn result_for_removed_tile_is_ignored() {
        let (mut manager, sender) = manager();
        let mut events = manager.subscribe();
        let mut context = HeadlessContext::new();

        manager.update_visible(&mut context, [TileCoords::new(0, 0, 1)]);
        let generation = manager.tile("0/0/1").expect("tracked").generation();
        manager.update_visible(&mut context, [TileCoords::new(1, 0, 1)]);

        assert!(manager.tile("0/0/1").is_none());
        assert_eq!(
            events.try_recv().expect("event"),
            TileEvent::Removed {
                key: "0/0/1".into()
            }
        );

        sender.send(response("0/0/1", generation)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 0);
        assert_eq!(context.live_buffers(), 0);
    }

    #[tokio::test]
    async fn result_of_removed_build_skips_reloaded_tile() {
        let (mut manager, sender) = manager();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(2, 1, 2));
        let first = manager.tile("2/1/2").expect("tracked").generation();
        assert!(manager.remove_tile(&mut context, "2/1/2"));
        manager.load_tile(TileCoords::new(2, 1, 2));
        let second = manager.tile("2/1/2").expect("tracked").generation();
        assert_ne!(first, second);

        sender.send(response("2/1/2", first)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 0);
        assert_eq!(
            manager.tile("2/1/2").map(Tile::state),
            Some(TileState::Loading)
        );
        assert_eq!(context.live_buffers(), 0);

        sender.send(response("2/1/2", second)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 1);
        assert_eq!(context.live_buffers(), 1);
    }

    #[tokio::test]
    async fn failed_build_keeps_loading() {
        let (mut manager, sender) = manager();
        let mut events = manager.subscribe();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(3, 3, 3));
        let generation = manager.tile("3/3/3").expect("tracked").generation();
        sender
            .send(BuildResponse {
                key: "3/3/3".into(),
                generation,
                result: Err(BuildError::new("3/3/3", "broken data")),
            })
            .expect("open");

        assert_eq!(manager.process_responses(&mut context), 1);
        assert_eq!(
            manager.tile("3/3/3").map(Tile::state),
            Some(TileState::Loading)
        );
        assert_matches!(
            events.try_recv(),
            Ok(TileEvent::Failed { key, error }) if key == "3/3/3" && error.reason == "broken data"
        );
    }

    #[tokio::test]
    async fn failed_tile_can_be_rebuilt() {
        let (mut manager, sender) = manager();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(3, 3, 3));
        let failed = manager.tile("3/3/3").expect("tracked").generation();
        sender
            .send(BuildResponse {
                key: "3/3/3".into(),
                generation: failed,
                result: Err(BuildError::new("3/3/3", "network down")),
            })
            .expect("open");
        assert_eq!(manager.process_responses(&mut context), 1);

        assert!(!manager.rebuild_tile("9/9/9"));
        assert!(manager.rebuild_tile("3/3/3"));
        let retry = manager.tile("3/3/3").expect("tracked").generation();
        assert!(retry > failed);

        sender.send(response("3/3/3", retry)).expect("open");
        assert_eq!(manager.process_responses(&mut context), 1);
        assert_eq!(
            manager.tile("3/3/3").map(Tile::state),
            Some(TileState::Finalized)
        );
        assert_eq!(context.live_buffers(), 1);
    }

    #[tokio::test]
    async fn rebuild_replaces_buffers() {
        let (mut manager, sender) = manager();
        let mut context = HeadlessContext::new();

        manager.load_tile(TileCoords::new(0, 0, 0));
        let generation = manager.tile("0/0/0").expect("tracked").generation();
        sender.send(response("0/0/0", generation)).expect("open");
        manager.process_responses(&mut context);
        let old = manager.tile("0/0/0").expect("tracked").buffers()["lines"].handle;

        manager.rebuild();
        let generation = manager.tile("0/0/0").expect("tracked").generation();
        sender.send(response("0/0/0", generation)).expect("open");
        manager.process_responses(&mut context);

        let new = manager.tile("0/0/0").expect("tracked").buffers()["lines"].handle;
        assert_ne!(old, new);
        assert!(context.buffer(old).is_none());
        assert_eq!(context.live_buffers(), 1);

        assert!(manager.remove_tile(&mut context, "0/0/0"));
        assert_eq!(context.live_buffers(), 0);
        assert!(!manager.remove_tile(&mut context, "0/0/0"));
    }
}

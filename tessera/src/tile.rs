//! Tile identity, bounds and the main-side tile record.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use tessera_shader::{BufferHandle, GraphicsContext};

use crate::build::BuiltTile;
use crate::builders::VertexBuffer;
use crate::style::StyleKind;

/// Number of tile-local units along one side of a tile.
pub const TILE_SCALE: f64 = 4096.0;

/// Half of the Web-Mercator world width in meters.
pub const HALF_CIRCUMFERENCE: f64 = 20037508.342789244;

/// Index of a tile in the XYZ scheme (`y` grows to the south).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoords {
    /// X index.
    pub x: u32,
    /// Y index.
    pub y: u32,
    /// Zoom level.
    pub z: u8,
}

impl TileCoords {
    /// Creates a new index.
    pub const fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Key identifying the tile: `"{x}/{y}/{z}"`.
    pub fn key(&self) -> String {
        self.to_string()
    }

    /// Index of the tile whose data serves this tile when the source has no data above
    /// `max_zoom`.
    pub fn overzoom(&self, max_zoom: u8) -> TileCoords {
        if self.z <= max_zoom {
            return *self;
        }

        // Zoom gaps of 32 levels or more fold every index to 0.
        let d = u32::from(self.z - max_zoom);
        TileCoords {
            x: self.x.checked_shr(d).unwrap_or(0),
            y: self.y.checked_shr(d).unwrap_or(0),
            z: max_zoom,
        }
    }

    /// Bounds of the tile in Web-Mercator meters.
    pub fn bounds(&self) -> TileBounds {
        let size = 2.0 * HALF_CIRCUMFERENCE / f64::from(1u32 << self.z.min(31));
        let min_x = -HALF_CIRCUMFERENCE + self.x as f64 * size;
        let max_y = HALF_CIRCUMFERENCE - self.y as f64 * size;

        TileBounds {
            min: [min_x, max_y - size],
            max: [min_x + size, max_y],
        }
    }
}

impl Display for TileCoords {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.x, self.y, self.z)
    }
}

/// Axis aligned bounds in projected meters, `y` up.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileBounds {
    /// South-west corner.
    pub min: [f64; 2],
    /// North-east corner.
    pub max: [f64; 2],
}

impl TileBounds {
    /// Width of the bounds in meters.
    pub fn size(&self) -> f64 {
        self.max[0] - self.min[0]
    }

    /// Converts a projected point to tile-local units.
    pub fn to_local(&self, x: f64, y: f64) -> [f32; 2] {
        let scale = TILE_SCALE / self.size();
        [
            ((x - self.min[0]) * scale) as f32,
            ((y - self.min[1]) * scale) as f32,
        ]
    }

    /// Converts a distance in meters to tile-local units.
    pub fn meters_to_local(&self, meters: f64) -> f32 {
        (meters * TILE_SCALE / self.size()) as f32
    }
}

/// Range of draw orders of the features in a tile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRange {
    /// Lowest order.
    pub min: i32,
    /// Highest order.
    pub max: i32,
}

impl Default for OrderRange {
    fn default() -> Self {
        Self {
            min: i32::MAX,
            max: i32::MIN,
        }
    }
}

impl OrderRange {
    /// Widens the range to include `order`.
    pub fn include(&mut self, order: i32) {
        self.min = self.min.min(order);
        self.max = self.max.max(order);
    }

    /// Widens the range to include another range.
    pub fn merge(&mut self, other: &OrderRange) {
        if !other.is_empty() {
            self.include(other.min);
            self.include(other.max);
        }
    }

    /// Returns true if nothing was included yet.
    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }
}

/// Diagnostic counters of a tile build.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileDebug {
    /// Features processed, including those no rule matched.
    pub features: usize,
    /// Geometries written into vertex buffers.
    pub geometries: usize,
    /// Time spent in the build.
    pub build_time_ms: f64,
    /// Total size of the produced vertex data.
    pub buffer_bytes: usize,
}

/// Tile part of a build request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    /// Key of the requested tile.
    pub key: String,
    /// Requested index.
    pub coords: TileCoords,
    /// Index of the tile the data comes from.
    pub source_coords: TileCoords,
    /// South-west corner of the data tile in meters.
    pub min: [f64; 2],
    /// North-east corner of the data tile in meters.
    pub max: [f64; 2],
    /// Order range of the previous build of the tile. Builds start from an empty range.
    pub order: OrderRange,
    /// Whether the worker should log per-tile counters.
    pub debug: bool,
}

impl TileDescriptor {
    /// Bounds of the data tile.
    pub fn bounds(&self) -> TileBounds {
        TileBounds {
            min: self.min,
            max: self.max,
        }
    }
}

/// State of a tile on the main side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileState {
    /// Visible, no build requested yet.
    Pending,
    /// Build requested, waiting for the result. A tile whose build failed stays here.
    Loading,
    /// Result received, buffers not uploaded yet.
    Built,
    /// Buffers uploaded to the graphics context.
    Finalized,
}

/// Vertex buffer living in graphics memory.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UploadedBuffer {
    /// Driver handle.
    pub handle: BufferHandle,
    /// Builder kind of the style.
    pub kind: StyleKind,
    /// Number of vertices.
    pub vertex_count: usize,
    /// Size of the buffer.
    pub byte_length: usize,
    /// Lowest draw order of the features in the buffer.
    pub order: i32,
}

/// A tile tracked by the [`TileManager`](crate::tile_manager::TileManager).
///
/// The tile owns its graphics buffers exclusively. They are released when the tile is removed
/// and replaced when a newer build is finalized.
#[derive(Debug)]
pub struct Tile {
    coords: TileCoords,
    source_coords: TileCoords,
    key: String,
    state: TileState,
    generation: u64,
    order: OrderRange,
    debug: TileDebug,
    built: Option<BTreeMap<String, VertexBuffer>>,
    buffers: BTreeMap<String, UploadedBuffer>,
}

impl Tile {
    /// Creates a pending tile. Data for it is taken from `max_zoom` if the tile is deeper.
    pub fn new(coords: TileCoords, max_zoom: u8) -> Self {
        Self {
            coords,
            source_coords: coords.overzoom(max_zoom),
            key: coords.key(),
            state: TileState::Pending,
            generation: 0,
            order: OrderRange::default(),
            debug: TileDebug::default(),
            built: None,
            buffers: BTreeMap::new(),
        }
    }

    /// Requested index.
    pub fn coords(&self) -> TileCoords {
        self.coords
    }

    /// Index of the tile the data comes from.
    pub fn source_coords(&self) -> TileCoords {
        self.source_coords
    }

    /// Tile key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bounds of the data tile in meters.
    pub fn bounds(&self) -> TileBounds {
        self.source_coords.bounds()
    }

    /// Current state.
    pub fn state(&self) -> TileState {
        self.state
    }

    /// Generation of the most recent build request.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Order range of the last finalized build.
    pub fn order(&self) -> OrderRange {
        self.order
    }

    /// Counters of the last finalized build.
    pub fn debug(&self) -> &TileDebug {
        &self.debug
    }

    /// Uploaded buffers by style name.
    pub fn buffers(&self) -> &BTreeMap<String, UploadedBuffer> {
        &self.buffers
    }

    /// Descriptor sent to the workers.
    pub fn descriptor(&self, debug: bool) -> TileDescriptor {
        let bounds = self.bounds();
        TileDescriptor {
            key: self.key.clone(),
            coords: self.coords,
            source_coords: self.source_coords,
            min: bounds.min,
            max: bounds.max,
            order: self.order,
            debug,
        }
    }

    pub(crate) fn start_build(&mut self, generation: u64) {
        self.generation = generation;
        self.state = TileState::Loading;
    }

    pub(crate) fn set_built(&mut self, built: BuiltTile) {
        self.order = built.order;
        self.debug = built.debug;
        self.built = Some(built.buffers);
        self.state = TileState::Built;
    }

    /// Uploads the built buffers, releasing the ones of the previous build.
    pub(crate) fn finalize(&mut self, context: &mut dyn GraphicsContext) {
        let Some(built) = self.built.take() else {
            return;
        };

        self.release_buffers(context);
        for (style, buffer) in built {
            let handle = context.create_vertex_buffer(&buffer.data);
            self.buffers.insert(
                style,
                UploadedBuffer {
                    handle,
                    kind: buffer.kind,
                    vertex_count: buffer.vertex_count,
                    byte_length: buffer.data.len(),
                    order: buffer.order,
                },
            );
        }

        self.state = TileState::Finalized;
    }

    /// Releases all graphics buffers of the tile.
    pub fn release(&mut self, context: &mut dyn GraphicsContext) {
        self.built = None;
        self.release_buffers(context);
    }

    fn release_buffers(&mut self, context: &mut dyn GraphicsContext) {
        for (_, buffer) in std::mem::take(&mut self.buffers) {
            context.delete_buffer(buffer.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn overzoom_folds_to_max_zoom() {
        let coords = TileCoords::new(19295, 24641, 16);
        assert_eq!(coords.overzoom(14), TileCoords::new(4823, 6160, 14));
        assert_eq!(coords.overzoom(18), coords);
        assert_eq!(coords.key(), "19295/24641/16");
    }

    #[test]
    fn overzoom_across_wide_zoom_gap() {
        assert_eq!(TileCoords::new(0, 0, 40).overzoom(0), TileCoords::new(0, 0, 0));
        assert_eq!(
            TileCoords::new(u32::MAX, 7, 33).overzoom(1),
            TileCoords::new(0, 0, 1)
        );
        assert_eq!(
            TileCoords::new(u32::MAX, 0, 32).overzoom(1),
            TileCoords::new(1, 0, 1)
        );
    }

    #[test]
    fn world_tile_bounds() {
        let bounds = TileCoords::new(0, 0, 0).bounds();
        assert_relative_eq!(bounds.min[0], -HALF_CIRCUMFERENCE);
        assert_relative_eq!(bounds.max[1], HALF_CIRCUMFERENCE);
        assert_relative_eq!(bounds.size(), 2.0 * HALF_CIRCUMFERENCE);

        let local = bounds.to_local(0.0, 0.0);
        assert_relative_eq!(local[0], 2048.0);
        assert_relative_eq!(local[1], 2048.0);
    }

    #[test]
    fn local_y_grows_to_the_north() {
        let bounds = TileCoords::new(1, 1, 1).bounds();
        assert_relative_eq!(bounds.max[1], 0.0);
        let top = bounds.to_local(bounds.min[0], bounds.max[1]);
        assert_relative_eq!(top[1], TILE_SCALE as f32);
    }

    #[test]
    fn order_range() {
        let mut range = OrderRange::default();
        assert!(range.is_empty());
        range.include(3);
        range.include(-1);
        assert_eq!(range, OrderRange { min: -1, max: 3 });
        range.merge(&OrderRange::default());
        assert_eq!(range, OrderRange { min: -1, max: 3 });
    }
}

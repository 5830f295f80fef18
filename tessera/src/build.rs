//! Worker-side tile build: raw tile data in, per-style vertex buffers out.

use std::collections::BTreeMap;

use ahash::HashMap;
use serde::{Deserialize, Serialize};
use web_time::Instant;

use crate::builders::{VertexBuffer, VertexData};
use crate::error::BuildError;
use crate::geometry::TileData;
use crate::resolver::resolve;
use crate::scene::Scene;
use crate::style::matcher::match_feature;
use crate::style::parser::parse_feature;
use crate::style::{FeatureContext, StyleKind};
use crate::tile::{OrderRange, TileDebug, TileDescriptor};

/// Raw tile data by source name.
pub type SourceData = HashMap<String, TileData>;

/// Request for building one tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// The tile.
    pub tile: TileDescriptor,
    /// Build attempt the response is correlated with.
    pub generation: u64,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuiltTile {
    /// Key of the tile.
    pub key: String,
    /// Buffers by style name. Styles nothing was drawn with are absent.
    pub buffers: BTreeMap<String, VertexBuffer>,
    /// Draw orders of the built features.
    pub order: OrderRange,
    /// Counters.
    pub debug: TileDebug,
}

/// Builds the vertex buffers of a tile.
///
/// Layers are processed in the scene order and features of a layer from the last to the first.
/// Within one style the vertices keep this processing order, so of two features with the same
/// draw order the one earlier in the data is drawn on top. Layers without features contribute
/// nothing.
pub fn build_tile(
    tile: &TileDescriptor,
    scene: &Scene,
    data: &SourceData,
) -> Result<BuiltTile, BuildError> {
    let start = Instant::now();
    let bounds = tile.bounds();
    let zoom = f64::from(tile.coords.z);

    let mut order = OrderRange::default();
    let mut debug = TileDebug::default();
    let mut vertex_data: BTreeMap<String, VertexData> = BTreeMap::new();

    for layer in scene.layers() {
        let Some(source) = data.get(&layer.source) else {
            return Err(BuildError::new(
                &tile.key,
                format!("no data for source '{}' of layer '{}'", layer.source, layer.name),
            ));
        };

        let collection = resolve(Some(source), &layer.geometry);
        if collection.features.is_empty() {
            log::trace!("Layer {} is empty in tile {}", layer.name, tile.key);
            continue;
        }

        for feature in collection.features.iter().rev() {
            debug.features += 1;
            let Some(geometry) = &feature.geometry else {
                continue;
            };

            let context = FeatureContext::new(feature, zoom, &layer.name);
            for matched in match_feature(&context, &layer.rules) {
                let style_name = match (matched.style_name(&context), context.geometry) {
                    (Some(name), _) => name,
                    (None, Some(kind)) => StyleKind::for_geometry(kind).name().to_string(),
                    (None, None) => continue,
                };
                let Some(style) = scene.style(&style_name) else {
                    log::warn!(
                        "Rule {} in tile {} resolved to unknown style '{style_name}'",
                        matched.path.join("/"),
                        tile.key
                    );
                    continue;
                };

                let Some(parsed) =
                    parse_feature(&context, &matched, style, layer.order, &mut order)
                else {
                    continue;
                };

                debug.geometries += vertex_data
                    .entry(style_name)
                    .or_insert_with(|| VertexData::new(style.kind))
                    .add_feature(&geometry.value, &parsed, &bounds);
            }
        }
    }

    let buffers: BTreeMap<_, _> = vertex_data
        .into_iter()
        .filter(|(_, data)| !data.is_empty())
        .map(|(name, data)| (name, data.end()))
        .collect();

    debug.buffer_bytes = buffers.values().map(|b| b.data.len()).sum();
    debug.build_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    if tile.debug {
        log::debug!(
            "Built tile {}: {} features, {} geometries, {} bytes in {:.2} ms",
            tile.key,
            debug.features,
            debug.geometries,
            debug.buffer_bytes,
            debug.build_time_ms
        );
    }

    Ok(BuiltTile {
        key: tile.key.clone(),
        buffers,
        order,
        debug,
    })
}

//! Scene configuration and its compiled form.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Deserialize;

use crate::error::TesseraError;
use crate::geometry::TileData;
use crate::layer::{Layer, LayerConfig};
use crate::resolver::GeometryFilter;
use crate::style::filter::Filter;
use crate::style::{Style, StyleConfig, Styles};
use crate::tile::TileCoords;

const DEFAULT_MAX_ZOOM: u8 = 18;

fn default_max_zoom() -> u8 {
    DEFAULT_MAX_ZOOM
}

/// Tiled data endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// URL template with `{x}`, `{y}` and `{z}` placeholders.
    pub url: String,
    /// Deepest zoom level the source has data for.
    #[serde(default = "default_max_zoom")]
    pub max_zoom: u8,
}

impl SourceConfig {
    /// URL of the tile. Deeper tiles are mapped to the source `max_zoom` first.
    pub fn tile_url(&self, coords: TileCoords) -> Result<String, TesseraError> {
        let coords = coords.overzoom(self.max_zoom);
        let vars = HashMap::from([
            ("x".to_string(), coords.x.to_string()),
            ("y".to_string(), coords.y.to_string()),
            ("z".to_string(), coords.z.to_string()),
        ]);

        strfmt::strfmt(&self.url, &vars).map_err(|err| {
            TesseraError::Configuration(format!("invalid url template '{}': {err}", self.url))
        })
    }
}

/// Scene document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneConfig {
    /// Data sources by name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    /// Layers by name.
    #[serde(default)]
    pub layers: BTreeMap<String, LayerConfig>,
    /// Styles by name.
    #[serde(default)]
    pub styles: BTreeMap<String, StyleConfig>,
}

impl SceneConfig {
    /// Decodes the scene document.
    pub fn from_json(json: &str) -> Result<Self, TesseraError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Compiled, immutable scene. Workers get it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Scene {
    sources: BTreeMap<String, SourceConfig>,
    layers: Vec<Layer>,
    styles: Styles,
}

impl Scene {
    /// Decodes and compiles a scene.
    pub fn from_json(json: &str) -> Result<Self, TesseraError> {
        Self::from_config(&SceneConfig::from_json(json)?)
    }

    /// Compiles a scene.
    ///
    /// Layers must reference existing sources, and rules may only name existing styles.
    pub fn from_config(config: &SceneConfig) -> Result<Self, TesseraError> {
        let styles = Styles::compile(&config.styles)?;

        let mut layers = config
            .layers
            .iter()
            .map(|(name, layer)| Layer::from_config(name, layer))
            .collect::<Result<Vec<_>, _>>()?;
        layers.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

        for layer in &layers {
            if !config.sources.contains_key(&layer.source) {
                return Err(TesseraError::Configuration(format!(
                    "layer '{}' uses unknown source '{}'",
                    layer.name, layer.source
                )));
            }

            check_styles(&layer.rules, &styles)
                .map_err(|err| err.in_context(format_args!("layer '{}'", layer.name)))?;
        }

        log::debug!(
            "Compiled scene: {} sources, {} layers, {} styles",
            config.sources.len(),
            layers.len(),
            styles.len()
        );

        Ok(Self {
            sources: config.sources.clone(),
            layers,
            styles,
        })
    }

    /// Source with the given name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }

    /// All sources by name.
    pub fn sources(&self) -> &BTreeMap<String, SourceConfig> {
        &self.sources
    }

    /// Layers in build order: ascending `order`, then name.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// All styles.
    pub fn styles(&self) -> &Styles {
        &self.styles
    }

    /// Style with the given name.
    pub fn style(&self, name: &str) -> Option<&Arc<Style>> {
        self.styles.get(name)
    }

    /// Deepest zoom any source has data for.
    pub fn max_zoom(&self) -> u8 {
        self.sources
            .values()
            .map(|source| source.max_zoom)
            .max()
            .unwrap_or(DEFAULT_MAX_ZOOM)
    }

    /// Makes the layer take its features from a host function over the raw tile layers.
    pub fn set_geometry_transform(
        &mut self,
        layer: &str,
        transform: impl Fn(&TileData) -> geojson::FeatureCollection + Send + Sync + 'static,
    ) -> Result<(), TesseraError> {
        self.layer_mut(layer)?.geometry = GeometryFilter::Transform(Arc::new(transform));
        Ok(())
    }

    /// Replaces the filter of the layer with a host predicate.
    pub fn set_layer_filter(&mut self, layer: &str, filter: Filter) -> Result<(), TesseraError> {
        self.layer_mut(layer)?.set_filter(filter);
        Ok(())
    }

    fn layer_mut(&mut self, name: &str) -> Result<&mut Layer, TesseraError> {
        self.layers
            .iter_mut()
            .find(|layer| layer.name == name)
            .ok_or_else(|| TesseraError::Configuration(format!("unknown layer '{name}'")))
    }
}

fn check_styles(node: &crate::style::rule::RuleNode, styles: &Styles) -> Result<(), TesseraError> {
    if let Some(name) = node.draw.style.as_ref().and_then(|s| s.as_literal()) {
        if styles.get(name).is_none() {
            return Err(TesseraError::Configuration(format!(
                "rule '{}' uses unknown style '{name}'",
                node.name
            )));
        }
    }

    node.children
        .iter()
        .try_for_each(|child| check_styles(child, styles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn scene(value: serde_json::Value) -> Result<Scene, TesseraError> {
        Scene::from_json(&value.to_string())
    }

    #[test]
    fn layers_sorted_by_order_then_name() {
        let scene = scene(json!({
            "sources": {"osm": {"url": "https://tiles/{z}/{x}/{y}.json", "max_zoom": 14}},
            "layers": {
                "roads": {"data": {"source": "osm"}, "order": 2},
                "water": {"data": {"source": "osm"}, "order": 1},
                "earth": {"data": {"source": "osm"}, "order": 1}
            }
        }))
        .expect("valid scene");

        let names: Vec<_> = scene.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["earth", "water", "roads"]);
        assert_eq!(scene.max_zoom(), 14);
    }

    #[test]
    fn tile_url_with_overzoom() {
        let source = SourceConfig {
            url: "https://tiles/{z}/{x}/{y}.json".into(),
            max_zoom: 14,
        };

        assert_eq!(
            source.tile_url(TileCoords::new(19295, 24641, 16)).expect("valid"),
            "https://tiles/14/4823/6160.json"
        );

        let broken = SourceConfig {
            url: "https://tiles/{zoom}".into(),
            max_zoom: 14,
        };
        assert!(broken.tile_url(TileCoords::new(0, 0, 0)).is_err());
    }

    #[test]
    fn configuration_errors() {
        assert_matches!(
            scene(json!({"layers": {"roads": {"data": {"source": "missing"}}}})),
            Err(TesseraError::Configuration(message)) if message.contains("unknown source")
        );

        assert_matches!(
            scene(json!({
                "sources": {"osm": {"url": "u"}},
                "layers": {"roads": {"data": {"source": "osm"}, "rules": [
                    {"name": "major", "draw": {"style": "neon"}}
                ]}}
            })),
            Err(TesseraError::Configuration(message)) if message.contains("unknown style 'neon'")
        );

        assert_matches!(scene(json!({"cameras": {}})), Err(TesseraError::Json(_)));
    }

    #[test]
    fn geometry_transform() {
        let mut scene = scene(json!({
            "sources": {"osm": {"url": "u"}},
            "layers": {"roads": {"data": {"source": "osm"}}}
        }))
        .expect("valid scene");

        scene
            .set_geometry_transform("roads", |_| crate::geometry::empty_collection())
            .expect("layer exists");
        assert_matches!(scene.layers()[0].geometry, GeometryFilter::Transform(_));
        assert!(scene
            .set_geometry_transform("rivers", |_| crate::geometry::empty_collection())
            .is_err());
    }
}

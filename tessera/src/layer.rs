//! Scene layers: a geometry source binding plus a rule tree.

use serde::Deserialize;

use crate::error::TesseraError;
use crate::resolver::GeometryFilter;
use crate::style::filter::Filter;
use crate::style::rule::{DrawProperties, RuleConfig, RuleNode};

/// Where a layer takes its features from.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    /// Name of the scene source.
    pub source: String,
    /// Sub-layer of the source data. Defaults to the layer name, `*` takes all sub-layers.
    pub layer: Option<String>,
}

/// Layer as written in the scene.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayerConfig {
    /// Data binding.
    pub data: DataConfig,
    /// Draw order of the layer. Layers are also built in this order.
    #[serde(default)]
    pub order: i32,
    /// Filter applied to every feature of the layer.
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    /// Draw properties inherited by all rules.
    #[serde(default)]
    pub draw: DrawProperties,
    /// Rules.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Compiled layer.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Name.
    pub name: String,
    /// Source name.
    pub source: String,
    /// Features of the source the layer uses.
    pub geometry: GeometryFilter,
    /// Declared order.
    pub order: i32,
    /// Rule tree. The root node carries the layer filter and draw properties.
    pub rules: RuleNode,
}

impl Layer {
    /// Compiles the layer configuration.
    pub fn from_config(name: &str, config: &LayerConfig) -> Result<Self, TesseraError> {
        let root = RuleConfig {
            name: name.to_string(),
            filter: config.filter.clone(),
            draw: config.draw.clone(),
            rules: config.rules.clone(),
        };

        Ok(Self {
            name: name.to_string(),
            source: config.data.source.clone(),
            geometry: GeometryFilter::from_name(config.data.layer.as_deref().unwrap_or(name)),
            order: config.order,
            rules: RuleNode::from_config(&root)
                .map_err(|err| err.in_context(format_args!("layer '{name}'")))?,
        })
    }

    /// Replaces the layer filter with a host predicate.
    pub fn set_filter(&mut self, filter: Filter) {
        self.rules.filter = Some(filter);
    }
}

//! Rule trees of the layers.

use serde::{Deserialize, Serialize};

use crate::error::TesseraError;
use crate::style::context::FeatureContext;
use crate::style::filter::Filter;
use crate::style::value::StyleValue;
use crate::Color;

/// Shape of the line ends.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineCap {
    /// Line ends exactly at the end point.
    #[default]
    Butt,
    /// Square extending half the width past the end point.
    Square,
    /// Half circle.
    Round,
}

impl From<LineCap> for lyon::lyon_tessellation::LineCap {
    fn from(value: LineCap) -> Self {
        match value {
            LineCap::Butt => Self::Butt,
            LineCap::Square => Self::Square,
            LineCap::Round => Self::Round,
        }
    }
}

/// Draw properties set by a rule. Unset properties are inherited from the parent rule.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DrawProperties {
    /// Name of the style to draw with. Defaults to the built-in style of the geometry kind.
    pub style: Option<StyleValue<String>>,
    /// Whether the feature is drawn at all.
    pub visible: Option<StyleValue<bool>>,
    /// Fill, stroke or point color.
    pub color: Option<StyleValue<Color>>,
    /// Line width in meters.
    pub width: Option<StyleValue<f64>>,
    /// Point size in pixels.
    pub size: Option<StyleValue<f64>>,
    /// Draw order relative to the layer order.
    pub order: Option<StyleValue<f64>>,
    /// Height of extruded polygons in meters.
    pub extrude: Option<StyleValue<f64>>,
    /// Line cap.
    pub cap: Option<LineCap>,
}

impl DrawProperties {
    /// Returns the properties of `self` overridden by those set in `child`.
    pub fn merge(&self, child: &DrawProperties) -> DrawProperties {
        DrawProperties {
            style: child.style.clone().or_else(|| self.style.clone()),
            visible: child.visible.clone().or_else(|| self.visible.clone()),
            color: child.color.clone().or_else(|| self.color.clone()),
            width: child.width.clone().or_else(|| self.width.clone()),
            size: child.size.clone().or_else(|| self.size.clone()),
            order: child.order.clone().or_else(|| self.order.clone()),
            extrude: child.extrude.clone().or_else(|| self.extrude.clone()),
            cap: child.cap.or(self.cap),
        }
    }
}

/// Rule as written in the scene.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleConfig {
    /// Name for diagnostics.
    pub name: String,
    /// Filter in JSON form. A rule without a filter always matches.
    #[serde(default)]
    pub filter: Option<serde_json::Value>,
    /// Property overrides.
    #[serde(default)]
    pub draw: DrawProperties,
    /// Child rules.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// Compiled rule. Immutable once the scene is compiled.
#[derive(Debug, Clone, Default)]
pub struct RuleNode {
    /// Name for diagnostics.
    pub name: String,
    /// Predicate. `None` always matches.
    pub filter: Option<Filter>,
    /// Property overrides.
    pub draw: DrawProperties,
    /// Children in declaration order.
    pub children: Vec<RuleNode>,
}

impl RuleNode {
    /// Compiles the rule and its children.
    pub fn from_config(config: &RuleConfig) -> Result<Self, TesseraError> {
        let filter = config
            .filter
            .as_ref()
            .map(Filter::from_json)
            .transpose()
            .map_err(|err| err.in_context(format_args!("rule '{}'", config.name)))?;

        Ok(Self {
            name: config.name.clone(),
            filter,
            draw: config.draw.clone(),
            children: config
                .rules
                .iter()
                .map(Self::from_config)
                .collect::<Result<_, _>>()?,
        })
    }

    /// Returns true if the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Result of a matching root-to-leaf path of a rule tree.
#[derive(Debug, Clone)]
pub struct MatchedRule {
    /// Merged draw properties, deeper rules override.
    pub draw: DrawProperties,
    /// Names of the rules on the path.
    pub path: Vec<String>,
}

impl MatchedRule {
    /// Whether the feature is drawn. Visible unless stated otherwise.
    pub fn is_visible(&self, context: &FeatureContext) -> bool {
        self.draw
            .visible
            .as_ref()
            .and_then(|v| v.resolve(context))
            .unwrap_or(true)
    }

    /// Name of the style set by the rules, if any.
    pub fn style_name(&self, context: &FeatureContext) -> Option<String> {
        self.draw.style.as_ref().and_then(|v| v.resolve(context))
    }
}

//! Resolution of matched draw properties into a styled feature.

use crate::style::context::FeatureContext;
use crate::style::rule::{LineCap, MatchedRule};
use crate::style::value::StyleValue;
use crate::style::{Style, StyleKind};
use crate::tile::OrderRange;
use crate::Color;

const DEFAULT_WIDTH: f64 = 1.0;
const DEFAULT_SIZE: f64 = 8.0;

/// Concrete values a feature is built with.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleFeature {
    /// Fill, stroke or point color.
    pub color: Color,
    /// Line width in meters.
    pub width: f64,
    /// Point size in pixels.
    pub size: f64,
    /// Extrusion height in meters, `0` for flat polygons.
    pub extrude: f64,
    /// Line cap.
    pub cap: LineCap,
    /// Absolute draw order: layer order plus the rule order.
    pub order: i32,
}

/// Resolves the matched rule into concrete values for the style.
///
/// Returns `None` if the feature should not be drawn: the rule is invisible, the color is fully
/// transparent, or the line width or point size used by the style is not positive. Otherwise
/// the draw order is added to `order_range`.
pub fn parse_feature(
    context: &FeatureContext,
    matched: &MatchedRule,
    style: &Style,
    layer_order: i32,
    order_range: &mut OrderRange,
) -> Option<StyleFeature> {
    if !matched.is_visible(context) {
        return None;
    }

    let draw = &matched.draw;
    let resolve = |value: &Option<StyleValue<f64>>, default: f64| {
        value
            .as_ref()
            .and_then(|v| v.resolve(context))
            .unwrap_or(default)
    };

    let color = draw
        .color
        .as_ref()
        .and_then(|v| v.resolve(context))
        .unwrap_or(Color::WHITE);
    if color.is_transparent() {
        return None;
    }

    let width = resolve(&draw.width, DEFAULT_WIDTH);
    if style.kind == StyleKind::Lines && width <= 0.0 {
        return None;
    }

    let size = resolve(&draw.size, DEFAULT_SIZE);
    if style.kind == StyleKind::Points && size <= 0.0 {
        return None;
    }

    let order = layer_order + resolve(&draw.order, 0.0).round() as i32;
    order_range.include(order);

    Some(StyleFeature {
        color,
        width,
        size,
        extrude: resolve(&draw.extrude, 0.0).max(0.0),
        cap: draw.cap.unwrap_or_default(),
        order,
    })
}

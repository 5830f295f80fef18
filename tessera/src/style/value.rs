//! Style values that may change with zoom or per feature.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use crate::style::context::FeatureContext;
use crate::Color;

/// Host function computing a style value from the feature context.
pub type ComputeFn<T> = dyn Fn(&FeatureContext) -> T + Send + Sync;

/// Value of a draw property.
///
/// In JSON a value is either a literal or a list of `[zoom, value]` stops:
///
/// ```json
/// { "width": [[12, 2], [16, 8]] }
/// ```
pub enum StyleValue<T> {
    /// Fixed value.
    Literal(T),
    /// Zoom stops, interpolated between and clamped outside.
    Stops(Vec<(f64, T)>),
    /// Value computed per feature.
    Computed(Arc<ComputeFn<T>>),
}

impl<T: Clone> Clone for StyleValue<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Literal(v) => Self::Literal(v.clone()),
            Self::Stops(stops) => Self::Stops(stops.clone()),
            Self::Computed(f) => Self::Computed(f.clone()),
        }
    }
}

impl<T: Debug> Debug for StyleValue<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(v) => f.debug_tuple("Literal").field(v).finish(),
            Self::Stops(stops) => f.debug_tuple("Stops").field(stops).finish(),
            Self::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

impl<T> From<T> for StyleValue<T> {
    fn from(value: T) -> Self {
        Self::Literal(value)
    }
}

impl<T> StyleValue<T> {
    /// Creates a computed value.
    pub fn computed(f: impl Fn(&FeatureContext) -> T + Send + Sync + 'static) -> Self {
        Self::Computed(Arc::new(f))
    }

    /// Literal value, if this is one.
    pub fn as_literal(&self) -> Option<&T> {
        match self {
            Self::Literal(v) => Some(v),
            _ => None,
        }
    }
}

impl<T: Interpolate> StyleValue<T> {
    /// Resolves the value for the feature. Empty stops resolve to nothing.
    pub fn resolve(&self, context: &FeatureContext) -> Option<T> {
        match self {
            Self::Literal(v) => Some(v.clone()),
            Self::Computed(f) => Some(f(context)),
            Self::Stops(stops) => interpolate_stops(stops, context.zoom),
        }
    }
}

fn interpolate_stops<T: Interpolate>(stops: &[(f64, T)], zoom: f64) -> Option<T> {
    let (first, last) = (stops.first()?, stops.last()?);
    if zoom <= first.0 {
        return Some(first.1.clone());
    }
    if zoom >= last.0 {
        return Some(last.1.clone());
    }

    stops.windows(2).find_map(|pair| {
        let ((z0, v0), (z1, v1)) = (&pair[0], &pair[1]);
        (zoom >= *z0 && zoom < *z1).then(|| v0.interpolate(v1, (zoom - z0) / (z1 - z0)))
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStyleValue<T> {
    Stops(Vec<(f64, T)>),
    Literal(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for StyleValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawStyleValue::deserialize(deserializer)? {
            RawStyleValue::Stops(stops) => Self::Stops(stops),
            RawStyleValue::Literal(value) => Self::Literal(value),
        })
    }
}

/// Values that can be interpolated between zoom stops.
pub trait Interpolate: Clone {
    /// Value at `t` in `[0, 1]` between `self` and `other`.
    fn interpolate(&self, other: &Self, t: f64) -> Self;
}

impl Interpolate for f64 {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self + (other - self) * t
    }
}

impl Interpolate for Color {
    fn interpolate(&self, other: &Self, t: f64) -> Self {
        self.lerp(other, t as f32)
    }
}

// Discrete values switch at the upper stop.
impl Interpolate for bool {
    fn interpolate(&self, _other: &Self, _t: f64) -> Self {
        *self
    }
}

impl Interpolate for String {
    fn interpolate(&self, _other: &Self, _t: f64) -> Self {
        self.clone()
    }
}

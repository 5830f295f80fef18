//! Predicates of the style rules.
//!
//! Filters are written in JSON:
//!
//! * `{"kind": "park"}` - property equals the value;
//! * `{"kind": ["park", "forest"]}` - property is one of the values;
//! * `{"height": {"min": 10, "max": 50}}` - numeric range, `min` inclusive and `max` exclusive;
//! * `{"name": true}` - property exists (`false` - does not exist);
//! * `{"$zoom": 14}`, `{"$geometry": "polygon"}`, `{"$layer": "water"}` - special keys. An exact
//!   zoom matches the whole zoom level, so `14` matches `[14, 15)`;
//! * `{"all": [..]}`, `{"any": [..]}`, `{"none": [..]}`, `{"not": {..}}` - combinators.
//!
//! A JSON array is the same as `any`, and an object with several keys is the same as `all`.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::TesseraError;
use crate::style::context::FeatureContext;

/// Host predicate.
pub type FilterFn = dyn Fn(&FeatureContext) -> bool + Send + Sync;

/// Compiled predicate.
#[derive(Clone)]
pub enum Filter {
    /// Constant result.
    Bool(bool),
    /// Property equals the value. Numbers are compared as floats.
    Equals {
        /// Property name.
        property: String,
        /// Expected value.
        value: Value,
    },
    /// Property equals one of the values.
    OneOf {
        /// Property name.
        property: String,
        /// Accepted values.
        values: Vec<Value>,
    },
    /// Numeric property is in `[min, max)`.
    Range {
        /// Property name.
        property: String,
        /// Inclusive lower bound.
        min: Option<f64>,
        /// Exclusive upper bound.
        max: Option<f64>,
    },
    /// Property is present (or absent).
    Exists {
        /// Property name.
        property: String,
        /// Whether the property must be present.
        exists: bool,
    },
    /// Every filter matches.
    All(Vec<Filter>),
    /// At least one filter matches.
    Any(Vec<Filter>),
    /// No filter matches.
    None(Vec<Filter>),
    /// Negation.
    Not(Box<Filter>),
    /// Host function.
    Function(Arc<FilterFn>),
}

impl Debug for Filter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Equals { property, value } => write!(f, "Equals({property} == {value})"),
            Self::OneOf { property, values } => write!(f, "OneOf({property} in {values:?})"),
            Self::Range { property, min, max } => {
                write!(f, "Range({property} in [{min:?}, {max:?}))")
            }
            Self::Exists { property, exists } => write!(f, "Exists({property}: {exists})"),
            Self::All(filters) => f.debug_tuple("All").field(filters).finish(),
            Self::Any(filters) => f.debug_tuple("Any").field(filters).finish(),
            Self::None(filters) => f.debug_tuple("None").field(filters).finish(),
            Self::Not(filter) => f.debug_tuple("Not").field(filter).finish(),
            Self::Function(_) => write!(f, "Function(..)"),
        }
    }
}

impl Filter {
    /// Creates a filter from a host function.
    pub fn function(f: impl Fn(&FeatureContext) -> bool + Send + Sync + 'static) -> Self {
        Self::Function(Arc::new(f))
    }

    /// Compiles the JSON form of a filter.
    pub fn from_json(value: &Value) -> Result<Self, TesseraError> {
        match value {
            Value::Bool(v) => Ok(Self::Bool(*v)),
            Value::Array(items) => Ok(Self::Any(Self::list(items)?)),
            Value::Object(map) => Self::object(map),
            other => Err(invalid(format!("unexpected filter value {other}"))),
        }
    }

    fn list(items: &[Value]) -> Result<Vec<Filter>, TesseraError> {
        items.iter().map(Self::from_json).collect()
    }

    fn object(map: &Map<String, Value>) -> Result<Self, TesseraError> {
        let mut conditions = map
            .iter()
            .map(|(key, value)| Self::condition(key, value))
            .collect::<Result<Vec<_>, _>>()?;

        if conditions.len() == 1 {
            Ok(conditions.remove(0))
        } else {
            Ok(Self::All(conditions))
        }
    }

    fn condition(key: &str, value: &Value) -> Result<Self, TesseraError> {
        let nested = || -> Result<Vec<Filter>, TesseraError> {
            match value {
                Value::Array(items) => Self::list(items),
                other => Ok(vec![Self::from_json(other)?]),
            }
        };

        match key {
            "all" => return Ok(Self::All(nested()?)),
            "any" => return Ok(Self::Any(nested()?)),
            "none" => return Ok(Self::None(nested()?)),
            "not" => return Ok(Self::Not(Box::new(Self::from_json(value)?))),
            _ => {}
        }

        let property = key.to_string();
        match value {
            Value::Bool(exists) => Ok(Self::Exists {
                property,
                exists: *exists,
            }),
            Value::Number(n) if key == "$zoom" => Ok(zoom_level(property, n.as_f64())),
            Value::Number(_) | Value::String(_) => Ok(Self::Equals {
                property,
                value: value.clone(),
            }),
            Value::Array(values) if key == "$zoom" => Ok(Self::Any(
                values
                    .iter()
                    .map(|v| match v.as_f64() {
                        Some(zoom) => Ok(zoom_level(property.clone(), Some(zoom))),
                        None => Err(invalid(format!("zoom level must be a number, got {v}"))),
                    })
                    .collect::<Result<_, _>>()?,
            )),
            Value::Array(values) => Ok(Self::OneOf {
                property,
                values: values.clone(),
            }),
            Value::Object(range) => {
                if let Some(unknown) = range.keys().find(|k| *k != "min" && *k != "max") {
                    return Err(invalid(format!(
                        "unknown key '{unknown}' in range filter for '{key}'"
                    )));
                }

                let bound = |name: &str| -> Result<Option<f64>, TesseraError> {
                    match range.get(name) {
                        None => Ok(None),
                        Some(v) => v.as_f64().map(Some).ok_or_else(|| {
                            invalid(format!("range bound '{name}' of '{key}' must be a number"))
                        }),
                    }
                };

                Ok(Self::Range {
                    property,
                    min: bound("min")?,
                    max: bound("max")?,
                })
            }
            Value::Null => Err(invalid(format!("null filter value for '{key}'"))),
        }
    }

    /// Evaluates the filter.
    pub fn eval(&self, context: &FeatureContext) -> bool {
        match self {
            Self::Bool(v) => *v,
            Self::Equals { property, value } => context
                .lookup(property)
                .is_some_and(|actual| values_equal(&actual, value)),
            Self::OneOf { property, values } => context
                .lookup(property)
                .is_some_and(|actual| values.iter().any(|v| values_equal(&actual, v))),
            Self::Range { property, min, max } => {
                let Some(actual) = context.lookup(property).and_then(|v| v.as_f64()) else {
                    return false;
                };
                min.map_or(true, |min| actual >= min) && max.map_or(true, |max| actual < max)
            }
            Self::Exists { property, exists } => context.lookup(property).is_some() == *exists,
            Self::All(filters) => filters.iter().all(|f| f.eval(context)),
            Self::Any(filters) => filters.iter().any(|f| f.eval(context)),
            Self::None(filters) => !filters.iter().any(|f| f.eval(context)),
            Self::Not(filter) => !filter.eval(context),
            Self::Function(f) => f(context),
        }
    }
}

fn zoom_level(property: String, zoom: Option<f64>) -> Filter {
    Filter::Range {
        property,
        min: zoom,
        max: zoom.map(|z| z + 1.0),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn invalid(message: String) -> TesseraError {
    TesseraError::Configuration(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use geojson::{Feature, Geometry, Value as GeoValue};
    use serde_json::json;

    fn feature(properties: Value) -> Feature {
        Feature {
            geometry: Some(Geometry::new(GeoValue::Polygon(vec![]))),
            properties: properties.as_object().cloned(),
            ..Default::default()
        }
    }

    fn eval(filter: Value, properties: Value, zoom: f64) -> bool {
        let filter = Filter::from_json(&filter).expect("valid filter");
        let feature = feature(properties);
        filter.eval(&FeatureContext::new(&feature, zoom, "earth"))
    }

    #[test]
    fn equality_and_membership() {
        assert!(eval(json!({"kind": "park"}), json!({"kind": "park"}), 10.0));
        assert!(!eval(json!({"kind": "park"}), json!({"kind": "lake"}), 10.0));
        assert!(eval(json!({"kind": ["lake", "park"]}), json!({"kind": "park"}), 10.0));
        assert!(eval(json!({"lanes": 2}), json!({"lanes": 2.0}), 10.0));
    }

    #[test]
    fn ranges() {
        let filter = json!({"height": {"min": 10, "max": 20}});
        assert!(eval(filter.clone(), json!({"height": 10}), 10.0));
        assert!(!eval(filter.clone(), json!({"height": 20}), 10.0));
        assert!(!eval(filter, json!({}), 10.0));
    }

    #[test]
    fn existence() {
        assert!(eval(json!({"name": true}), json!({"name": "Elm"}), 10.0));
        assert!(eval(json!({"name": false}), json!({}), 10.0));
    }

    #[test]
    fn special_keys() {
        assert!(eval(json!({"$zoom": 14}), json!({}), 14.5));
        assert!(!eval(json!({"$zoom": 14}), json!({}), 15.0));
        assert!(eval(json!({"$zoom": {"min": 12}}), json!({}), 15.0));
        assert!(eval(json!({"$geometry": "polygon"}), json!({}), 1.0));
        assert!(eval(json!({"$layer": "earth"}), json!({}), 1.0));
    }

    #[test]
    fn combinators() {
        let props = json!({"kind": "park", "area": 500});
        assert!(eval(json!({"kind": "park", "area": {"min": 100}}), props.clone(), 1.0));
        assert!(!eval(json!({"kind": "park", "area": {"min": 1000}}), props.clone(), 1.0));
        assert!(eval(json!([{"kind": "lake"}, {"kind": "park"}]), props.clone(), 1.0));
        assert!(eval(json!({"none": [{"kind": "lake"}]}), props.clone(), 1.0));
        assert!(eval(json!({"not": {"kind": "lake"}}), props.clone(), 1.0));
        assert!(!eval(json!({"all": [true, false]}), props, 1.0));
    }

    #[test]
    fn malformed_filters() {
        assert_matches!(
            Filter::from_json(&json!({"height": {"above": 3}})),
            Err(TesseraError::Configuration(_))
        );
        assert_matches!(
            Filter::from_json(&json!({"kind": null})),
            Err(TesseraError::Configuration(_))
        );
        assert_matches!(Filter::from_json(&json!(3)), Err(TesseraError::Configuration(_)));
    }

    #[test]
    fn host_function() {
        let filter = Filter::function(|context| context.zoom > 3.0);
        let feature = feature(json!({}));
        assert!(filter.eval(&FeatureContext::new(&feature, 4.0, "earth")));
    }
}

//! Injection pragmas: `#pragma tessera: <key>` lines that mark where named code blocks go.
//!
//! Sources are processed line by line. [`scan`] produces the list of injection points, and
//! substitution replaces the marked lines by index, so the result does not depend on the order
//! in which transforms were registered.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Namespace of the injection pragmas recognized by the compiler.
pub const PRAGMA_NAMESPACE: &str = "tessera";

/// Prefix of the define set for every injected key.
pub const TRANSFORM_DEFINE_PREFIX: &str = "TESSERA_TRANSFORM_";

/// Named code blocks. Blocks under the same key are joined with newlines in order.
pub type Transforms = BTreeMap<String, Vec<String>>;

/// Transform as it appears in configuration: a single block or a list of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformSource {
    /// One block.
    Single(String),
    /// Several blocks, injected in order.
    List(Vec<String>),
}

impl TransformSource {
    /// Normalizes the value into a list.
    pub fn into_list(self) -> Vec<String> {
        match self {
            Self::Single(source) => vec![source],
            Self::List(list) => list,
        }
    }
}

impl From<&str> for TransformSource {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<String>> for TransformSource {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

/// A marker line found in a shader source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionPoint {
    /// Zero-based line index.
    pub line: usize,
    /// Transform key named by the pragma.
    pub key: String,
}

/// Parses one line as an injection pragma and returns its key.
pub fn parse_pragma(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#pragma")?;
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let rest = rest.trim_start().strip_prefix(PRAGMA_NAMESPACE)?;
    let key = rest.trim_start().strip_prefix(':')?.trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// Finds all injection points in the source.
pub fn scan(source: &str) -> Vec<InjectionPoint> {
    source
        .split('\n')
        .enumerate()
        .filter_map(|(line, text)| {
            parse_pragma(text).map(|key| InjectionPoint {
                line,
                key: key.to_string(),
            })
        })
        .collect()
}

/// Replaces the injection points that have a transform with the joined transform source.
///
/// Returns the new source and the set of keys that were substituted. Points without a transform
/// are left in place.
pub fn inject(source: &str, transforms: &Transforms) -> (String, BTreeSet<String>) {
    let points = scan(source);
    let mut injected = BTreeSet::new();
    if points.is_empty() {
        return (source.to_string(), injected);
    }

    let mut lines: Vec<String> = source.split('\n').map(str::to_string).collect();
    for point in points {
        let Some(blocks) = transforms.get(&point.key) else {
            continue;
        };

        lines[point.line] = blocks.join("\n");
        injected.insert(point.key);
    }

    (lines.join("\n"), injected)
}

/// Removes every remaining injection pragma line.
pub fn strip(source: &str) -> String {
    if scan(source).is_empty() {
        return source.to_string();
    }

    source
        .split('\n')
        .filter(|line| parse_pragma(line).is_none())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name of the define that records that the transform `key` was injected.
pub fn transform_define(key: &str) -> String {
    let normalized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();

    format!("{TRANSFORM_DEFINE_PREFIX}{normalized}")
}

/// Merges the global transforms with program transforms. Global blocks come first.
pub fn merge(global: &Transforms, program: &Transforms) -> Transforms {
    let mut merged = global.clone();
    for (key, blocks) in program {
        merged
            .entry(key.clone())
            .or_default()
            .extend(blocks.iter().cloned());
    }

    merged
}

//! Styles and the rules that pick them.
//!
//! Three styles are always available: `polygons`, `lines` and `points`. Scene styles derive from
//! one of them, either directly with `base` or through another scene style with `extends`.
//! Deriving keeps the base shader configuration and layers the derived one on top of it:
//! transforms are appended after the base blocks, while defines and uniforms with the same name
//! replace the base values.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_shader::pragma;
use tessera_shader::{Defines, ProgramOptions, TransformSource, Transforms, UniformValue};

use crate::error::TesseraError;
use crate::geometry::GeometryKind;

pub mod context;
pub mod filter;
pub mod matcher;
pub mod parser;
pub mod rule;
pub mod value;

pub use context::FeatureContext;

/// Geometry builder a style uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleKind {
    /// Filled, optionally extruded polygons.
    Polygons,
    /// Stroked lines and polygon outlines.
    Lines,
    /// Screen-sized point quads.
    Points,
}

impl StyleKind {
    /// All kinds.
    pub const ALL: [StyleKind; 3] = [Self::Polygons, Self::Lines, Self::Points];

    /// Name of the built-in style of this kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Polygons => "polygons",
            Self::Lines => "lines",
            Self::Points => "points",
        }
    }

    /// Built-in style used for a geometry when the rules do not name one.
    pub fn for_geometry(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Point => Self::Points,
            GeometryKind::Line => Self::Lines,
            GeometryKind::Polygon => Self::Polygons,
        }
    }

    /// Vertex layout of the buffers.
    pub fn layout(&self) -> &'static VertexLayout {
        match self {
            Self::Polygons => &POLYGON_LAYOUT,
            Self::Lines => &LINE_LAYOUT,
            Self::Points => &POINT_LAYOUT,
        }
    }

    fn vertex_template(&self) -> &'static str {
        match self {
            Self::Polygons => include_str!("shaders/polygons.vert"),
            Self::Lines => include_str!("shaders/lines.vert"),
            Self::Points => include_str!("shaders/points.vert"),
        }
    }

    fn fragment_template(&self) -> &'static str {
        match self {
            Self::Polygons => include_str!("shaders/polygons.frag"),
            Self::Lines => include_str!("shaders/lines.frag"),
            Self::Points => include_str!("shaders/points.frag"),
        }
    }
}

/// Float vertex attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    /// Name in the shader.
    pub name: &'static str,
    /// Number of `f32` components.
    pub components: usize,
}

/// Interleaved layout of a vertex buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct VertexLayout {
    /// Attributes in memory order.
    pub attributes: &'static [VertexAttribute],
}

impl VertexLayout {
    /// Size of one vertex in bytes.
    pub fn stride(&self) -> usize {
        self.attributes
            .iter()
            .map(|a| a.components * std::mem::size_of::<f32>())
            .sum()
    }

    /// Attributes with their byte offsets.
    pub fn offsets(&self) -> impl Iterator<Item = (&VertexAttribute, usize)> {
        self.attributes.iter().scan(0, |offset, attribute| {
            let current = *offset;
            *offset += attribute.components * std::mem::size_of::<f32>();
            Some((attribute, current))
        })
    }
}

const fn attr(name: &'static str, components: usize) -> VertexAttribute {
    VertexAttribute { name, components }
}

static POLYGON_LAYOUT: VertexLayout = VertexLayout {
    attributes: &[
        attr("a_position", 3),
        attr("a_normal", 3),
        attr("a_color", 4),
        attr("a_layer", 1),
    ],
};

static LINE_LAYOUT: VertexLayout = VertexLayout {
    attributes: &[
        attr("a_position", 3),
        attr("a_normal", 2),
        attr("a_color", 4),
        attr("a_layer", 1),
    ],
};

static POINT_LAYOUT: VertexLayout = VertexLayout {
    attributes: &[
        attr("a_position", 3),
        attr("a_offset", 2),
        attr("a_texcoord", 2),
        attr("a_color", 4),
        attr("a_layer", 1),
    ],
};

const LAYER_STEP: f64 = 0.0001;

/// Shader part of a style definition.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// `#define`s of the style programs.
    pub defines: Defines,
    /// Code blocks keyed by injection point.
    pub transforms: BTreeMap<String, TransformSource>,
    /// Uniforms with their initial values. Missing declarations are synthesized.
    pub uniforms: BTreeMap<String, UniformValue>,
}

/// Style as written in the scene.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StyleConfig {
    /// Built-in kind to derive from.
    pub base: Option<StyleKind>,
    /// Scene style to derive from.
    pub extends: Option<String>,
    /// Shader configuration.
    #[serde(default)]
    pub shaders: ShaderConfig,
    /// Replacement vertex template.
    pub vertex: Option<String>,
    /// Replacement fragment template.
    pub fragment: Option<String>,
}

/// Resolved style.
#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    /// Name.
    pub name: String,
    /// Geometry builder.
    pub kind: StyleKind,
    /// Style this one is derived from.
    pub extends: Option<String>,
    /// Vertex template.
    pub vertex: String,
    /// Fragment template.
    pub fragment: String,
    /// Merged defines.
    pub defines: Defines,
    /// Merged transforms, base blocks first.
    pub transforms: Transforms,
    /// Merged uniforms.
    pub uniforms: BTreeMap<String, UniformValue>,
}

impl Style {
    /// Built-in style of the kind.
    pub fn builtin(kind: StyleKind) -> Self {
        let mut defines = Defines::new();
        defines.insert("LAYER_STEP".into(), LAYER_STEP.into());

        let mut transforms = Transforms::new();
        let mut uniforms = BTreeMap::new();
        if kind == StyleKind::Polygons {
            transforms.insert(
                "color".into(),
                vec!["color.rgb *= clamp(dot(normal, -normalize(u_light_direction)), 0.4, 1.0);"
                    .into()],
            );
            uniforms.insert(
                "u_light_direction".into(),
                UniformValue::Vec3([0.3, 0.4, -1.0]),
            );
        }

        Self {
            name: kind.name().to_string(),
            kind,
            extends: None,
            vertex: kind.vertex_template().to_string(),
            fragment: kind.fragment_template().to_string(),
            defines,
            transforms,
            uniforms,
        }
    }

    /// Compilation options of the style program.
    pub fn program_options(&self) -> ProgramOptions {
        ProgramOptions {
            name: Some(self.name.clone()),
            defines: self.defines.clone(),
            transforms: self.transforms.clone(),
            dependent_uniforms: self.uniforms.clone(),
        }
    }

    fn derive(&self, name: &str, config: &StyleConfig) -> Style {
        let mut defines = self.defines.clone();
        defines.extend(config.shaders.defines.clone());

        let own: Transforms = config
            .shaders
            .transforms
            .iter()
            .map(|(key, source)| (key.clone(), source.clone().into_list()))
            .collect();

        let mut uniforms = self.uniforms.clone();
        uniforms.extend(config.shaders.uniforms.clone());

        Style {
            name: name.to_string(),
            kind: self.kind,
            extends: Some(self.name.clone()),
            vertex: config.vertex.clone().unwrap_or_else(|| self.vertex.clone()),
            fragment: config
                .fragment
                .clone()
                .unwrap_or_else(|| self.fragment.clone()),
            defines,
            transforms: pragma::merge(&self.transforms, &own),
            uniforms,
        }
    }
}

/// All styles of a scene, built-in ones included.
#[derive(Debug, Clone)]
pub struct Styles {
    styles: BTreeMap<String, Arc<Style>>,
}

impl Default for Styles {
    fn default() -> Self {
        Self {
            styles: StyleKind::ALL
                .iter()
                .map(|kind| (kind.name().to_string(), Arc::new(Style::builtin(*kind))))
                .collect(),
        }
    }
}

impl Styles {
    /// Resolves the scene styles. Unknown bases, cycles and redefinitions of the built-in styles
    /// are configuration errors.
    pub fn compile(configs: &BTreeMap<String, StyleConfig>) -> Result<Self, TesseraError> {
        let mut styles = Self::default();
        for name in configs.keys() {
            if StyleKind::ALL.iter().any(|kind| kind.name() == name) {
                return Err(TesseraError::Configuration(format!(
                    "style '{name}' redefines a built-in style"
                )));
            }

            let mut chain = vec![];
            styles.resolve(name, configs, &mut chain)?;
        }

        Ok(styles)
    }

    fn resolve(
        &mut self,
        name: &str,
        configs: &BTreeMap<String, StyleConfig>,
        chain: &mut Vec<String>,
    ) -> Result<Arc<Style>, TesseraError> {
        if let Some(style) = self.styles.get(name) {
            return Ok(style.clone());
        }

        let Some(config) = configs.get(name) else {
            return Err(TesseraError::Configuration(format!(
                "unknown style '{name}'"
            )));
        };

        if chain.iter().any(|n| n == name) {
            chain.push(name.to_string());
            return Err(TesseraError::Configuration(format!(
                "cyclic style inheritance: {}",
                chain.join(" -> ")
            )));
        }
        chain.push(name.to_string());

        let base = match (&config.base, &config.extends) {
            (Some(_), Some(_)) => {
                return Err(TesseraError::Configuration(format!(
                    "style '{name}' sets both 'base' and 'extends'"
                )))
            }
            (Some(kind), None) => self.get(kind.name()).cloned().ok_or_else(|| {
                TesseraError::Configuration(format!("unknown base '{}'", kind.name()))
            })?,
            (None, Some(parent)) => self.resolve(parent, configs, chain)?,
            (None, None) => {
                return Err(TesseraError::Configuration(format!(
                    "style '{name}' needs 'base' or 'extends'"
                )))
            }
        };

        let style = Arc::new(base.derive(name, config));
        self.styles.insert(name.to_string(), style.clone());
        chain.pop();

        Ok(style)
    }

    /// Style with the given name.
    pub fn get(&self, name: &str) -> Option<&Arc<Style>> {
        self.styles.get(name)
    }

    /// Iterates over styles in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Style>> {
        self.styles.values()
    }

    /// Number of styles.
    pub fn len(&self) -> usize {
        self.styles.len()
    }

    /// Always false, built-in styles are present.
    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn configs(value: serde_json::Value) -> BTreeMap<String, StyleConfig> {
        serde_json::from_value(value).expect("valid styles")
    }

    #[test]
    fn layouts_match_attribute_sizes() {
        assert_eq!(StyleKind::Polygons.layout().stride(), 44);
        assert_eq!(StyleKind::Lines.layout().stride(), 40);
        assert_eq!(StyleKind::Points.layout().stride(), 48);

        let offsets: Vec<_> = StyleKind::Lines
            .layout()
            .offsets()
            .map(|(a, offset)| (a.name, offset))
            .collect();
        assert_eq!(
            offsets,
            vec![("a_position", 0), ("a_normal", 12), ("a_color", 20), ("a_layer", 36)]
        );
    }

    #[test]
    fn extends_layers_on_top_of_base() {
        let styles = Styles::compile(&configs(json!({
            "rainbow": {
                "extends": "water",
                "shaders": {
                    "defines": {"WAVES": 2},
                    "transforms": {"color": "color.rgb = rainbow(color.rgb);"},
                    "uniforms": {"u_time": 1.5}
                }
            },
            "water": {
                "base": "polygons",
                "shaders": {
                    "defines": {"WAVES": 1},
                    "transforms": {"color": ["color.b += 0.2;"]},
                    "uniforms": {"u_time": 0.0, "u_speed": 3.0}
                }
            }
        })))
        .expect("valid styles");

        let rainbow = styles.get("rainbow").expect("exists");
        assert_eq!(rainbow.kind, StyleKind::Polygons);
        assert_eq!(rainbow.extends.as_deref(), Some("water"));
        assert_eq!(rainbow.defines.get("WAVES"), Some(&2i64.into()));
        assert_eq!(rainbow.uniforms.get("u_time"), Some(&UniformValue::Float(1.5)));
        assert_eq!(rainbow.uniforms.get("u_speed"), Some(&UniformValue::Float(3.0)));

        let color = &rainbow.transforms["color"];
        assert_eq!(color.len(), 3);
        assert!(color[0].contains("u_light_direction"));
        assert_eq!(color[1], "color.b += 0.2;");
        assert_eq!(color[2], "color.rgb = rainbow(color.rgb);");
    }

    #[test]
    fn invalid_inheritance() {
        assert_matches!(
            Styles::compile(&configs(json!({"a": {"extends": "b"}, "b": {"extends": "a"}}))),
            Err(TesseraError::Configuration(message)) if message.contains("cyclic")
        );
        assert_matches!(
            Styles::compile(&configs(json!({"a": {"extends": "missing"}}))),
            Err(TesseraError::Configuration(message)) if message.contains("unknown style")
        );
        assert_matches!(
            Styles::compile(&configs(json!({"a": {}}))),
            Err(TesseraError::Configuration(_))
        );
        assert_matches!(
            Styles::compile(&configs(json!({"lines": {"base": "lines"}}))),
            Err(TesseraError::Configuration(_))
        );
    }

    #[test]
    fn builtins_are_always_present() {
        let styles = Styles::compile(&BTreeMap::new()).expect("valid styles");
        assert_eq!(styles.len(), 3);
        assert!(styles.get("points").is_some());
    }
}

//! Uniform values, setter methods and automatic uniform declarations.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::UniformLocation;
use crate::error::ShaderError;

/// Value of a uniform. The variant is the "shape" of the value and decides which setter is used
/// and which GLSL type a synthesized declaration gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `bool`, uploaded as an integer.
    Bool(bool),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat3`, column-major.
    Mat3([f32; 9]),
    /// `mat4`, column-major.
    Mat4([f32; 16]),
    /// `sampler2D` bound to the named texture.
    Sampler(String),
}

impl UniformValue {
    /// Infers the uniform type from the shape of a JSON value: numbers are floats, booleans are
    /// bools, strings name textures and numeric arrays of length 2, 3, 4, 9 or 16 are vectors and
    /// matrices.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Float(n.as_f64()? as f32)),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::String(s) => Some(Self::Sampler(s.clone())),
            Value::Array(items) => {
                let floats = items
                    .iter()
                    .map(|v| v.as_f64().map(|v| v as f32))
                    .collect::<Option<Vec<f32>>>()?;
                Self::from_floats(&floats)
            }
            _ => None,
        }
    }

    fn from_floats(v: &[f32]) -> Option<Self> {
        Some(match v.len() {
            1 => Self::Float(v[0]),
            2 => Self::Vec2(v.try_into().ok()?),
            3 => Self::Vec3(v.try_into().ok()?),
            4 => Self::Vec4(v.try_into().ok()?),
            9 => Self::Mat3(v.try_into().ok()?),
            16 => Self::Mat4(v.try_into().ok()?),
            _ => return None,
        })
    }

    /// Builds a value from an explicit setter method and raw components.
    pub fn from_method(method: UniformMethod, values: &[f32]) -> Result<Self, ShaderError> {
        let expected = method.arity();
        if values.len() != expected {
            return Err(ShaderError::UniformArity {
                method,
                expected,
                actual: values.len(),
            });
        }

        let value = match method {
            UniformMethod::Uniform1i => Self::Int(values[0] as i32),
            _ => Self::from_floats(values).ok_or(ShaderError::UniformArity {
                method,
                expected,
                actual: values.len(),
            })?,
        };

        Ok(value)
    }

    /// Setter used to upload the value.
    pub fn method(&self) -> UniformMethod {
        match self {
            Self::Float(_) => UniformMethod::Uniform1f,
            Self::Int(_) | Self::Bool(_) | Self::Sampler(_) => UniformMethod::Uniform1i,
            Self::Vec2(_) => UniformMethod::Uniform2f,
            Self::Vec3(_) => UniformMethod::Uniform3f,
            Self::Vec4(_) => UniformMethod::Uniform4f,
            Self::Mat3(_) => UniformMethod::Matrix3fv,
            Self::Mat4(_) => UniformMethod::Matrix4fv,
        }
    }

    /// GLSL type name for a declaration of this value.
    pub fn glsl_type(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Int(_) => "int",
            Self::Bool(_) => "bool",
            Self::Vec2(_) => "vec2",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat3(_) => "mat3",
            Self::Mat4(_) => "mat4",
            Self::Sampler(_) => "sampler2D",
        }
    }

    /// Returns true for texture samplers.
    pub fn is_sampler(&self) -> bool {
        matches!(self, Self::Sampler(_))
    }
}

impl TryFrom<Value> for UniformValue {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(&value).ok_or_else(|| format!("cannot infer uniform type of {value}"))
    }
}

impl From<UniformValue> for Value {
    fn from(value: UniformValue) -> Self {
        match value {
            UniformValue::Float(v) => Value::from(v),
            UniformValue::Int(v) => Value::from(v),
            UniformValue::Bool(v) => Value::from(v),
            UniformValue::Vec2(v) => Value::from(v.to_vec()),
            UniformValue::Vec3(v) => Value::from(v.to_vec()),
            UniformValue::Vec4(v) => Value::from(v.to_vec()),
            UniformValue::Mat3(v) => Value::from(v.to_vec()),
            UniformValue::Mat4(v) => Value::from(v.to_vec()),
            UniformValue::Sampler(v) => Value::from(v),
        }
    }
}

/// Uniform setter variant. The name encodes arity and component type, as in `uniform3f`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UniformMethod {
    /// One float.
    Uniform1f,
    /// Two floats.
    Uniform2f,
    /// Three floats.
    Uniform3f,
    /// Four floats.
    Uniform4f,
    /// One integer, also used for samplers.
    Uniform1i,
    /// 3x3 float matrix.
    Matrix3fv,
    /// 4x4 float matrix.
    Matrix4fv,
}

impl UniformMethod {
    /// Number of components the method consumes.
    pub fn arity(&self) -> usize {
        match self {
            Self::Uniform1f | Self::Uniform1i => 1,
            Self::Uniform2f => 2,
            Self::Uniform3f => 3,
            Self::Uniform4f => 4,
            Self::Matrix3fv => 9,
            Self::Matrix4fv => 16,
        }
    }
}

impl FromStr for UniformMethod {
    type Err = ShaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let short = lower.strip_prefix("uniform").unwrap_or(&lower);
        match short {
            "1f" | "1fv" => Ok(Self::Uniform1f),
            "2f" | "2fv" => Ok(Self::Uniform2f),
            "3f" | "3fv" => Ok(Self::Uniform3f),
            "4f" | "4fv" => Ok(Self::Uniform4f),
            "1i" | "1iv" => Ok(Self::Uniform1i),
            "matrix3fv" => Ok(Self::Matrix3fv),
            "matrix4fv" => Ok(Self::Matrix4fv),
            _ => Err(ShaderError::UnknownUniformMethod(s.to_string())),
        }
    }
}

/// Cached state of one uniform of a program.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBinding {
    /// Last value set by the host.
    pub value: UniformValue,
    /// Location in the currently linked program, if it was resolved.
    pub location: Option<UniformLocation>,
}

lazy_static! {
    static ref COMMENTS: Regex = Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("valid regex");
}

/// Prepends declarations for the uniforms that are referenced in `source` but not declared there.
///
/// Comments are ignored both when looking for references and for existing declarations.
pub(crate) fn declare_missing_uniforms(
    source: &str,
    uniforms: &BTreeMap<String, UniformValue>,
) -> String {
    let stripped = COMMENTS.replace_all(source, "");
    let mut declarations = String::new();

    for (name, value) in uniforms {
        let escaped = regex::escape(name);
        let Ok(reference) = Regex::new(&format!(r"\b{escaped}\b")) else {
            continue;
        };
        // Also matches names further down a declarator list: `uniform float u_a, u_b[2];`.
        let Ok(declaration) = Regex::new(&format!(
            r"\buniform\s+(\w+\s+)?\w+\s+([^;]*,\s*)?{escaped}\s*(\[[^\]]*\])?\s*[,;]"
        )) else {
            continue;
        };

        if reference.is_match(&stripped) && !declaration.is_match(&stripped) {
            let _ = writeln!(declarations, "uniform {} {};", value.glsl_type(), name);
        }
    }

    if declarations.is_empty() {
        source.to_string()
    } else {
        declarations + source
    }
}

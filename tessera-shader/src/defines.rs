//! Compile-time `#define` tables.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

/// Value of a `#define`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefineValue {
    /// `true` defines the bare macro name, `false` leaves it undefined.
    Bool(bool),
    /// Integer constant.
    Int(i64),
    /// Float constant, always rendered with a decimal point.
    Float(f64),
    /// Arbitrary source text.
    Text(String),
}

impl From<bool> for DefineValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for DefineValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for DefineValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DefineValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Table of defines. Ordered, so the rendered block is the same for the same table.
pub type Defines = BTreeMap<String, DefineValue>;

/// Merges the global table with a program table. Program entries win on key collision.
pub fn merge(global: &Defines, program: &Defines) -> Defines {
    let mut merged = global.clone();
    merged.extend(program.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// Renders the table to preprocessor source, one `#define` per line.
pub fn render(defines: &Defines) -> String {
    let mut source = String::new();
    for (name, value) in defines {
        let _ = match value {
            DefineValue::Bool(false) => continue,
            DefineValue::Bool(true) => writeln!(source, "#define {name}"),
            DefineValue::Int(v) => writeln!(source, "#define {name} {v}"),
            DefineValue::Float(v) => writeln!(source, "#define {name} {}", format_float(*v)),
            DefineValue::Text(v) => writeln!(source, "#define {name} {v}"),
        };
    }

    source
}

fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_defines_override_global() {
        let global = Defines::from([
            ("A".to_string(), DefineValue::Int(1)),
            ("B".to_string(), DefineValue::Int(2)),
        ]);
        let program = Defines::from([("B".to_string(), DefineValue::Int(3))]);

        let merged = merge(&global, &program);
        assert_eq!(merged["A"], DefineValue::Int(1));
        assert_eq!(merged["B"], DefineValue::Int(3));
    }

    #[test]
    fn renders_values() {
        let defines = Defines::from([
            ("ENABLED".to_string(), true.into()),
            ("DISABLED".to_string(), false.into()),
            ("SCALE".to_string(), 2.0.into()),
            ("RATIO".to_string(), 0.25.into()),
            ("COUNT".to_string(), 3i64.into()),
            ("EXPR".to_string(), "(1.0 + 2.0)".into()),
        ]);

        assert_eq!(
            render(&defines),
            "#define COUNT 3\n\
             #define ENABLED\n\
             #define EXPR (1.0 + 2.0)\n\
             #define RATIO 0.25\n\
             #define SCALE 2.0\n"
        );
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Element type of a box space or box container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dtype {
    Int,
    Uint,
    Float,
    Double,
}

impl Dtype {
    /// Map a numeric type name onto its dtype. Unknown names fall back to `Float`.
    pub fn from_name(name: &str) -> Dtype {
        match name {
            "int" | "int8" | "int16" | "int32" | "int64" | "int8_t" | "int16_t" | "int32_t"
            | "int64_t" => Dtype::Int,
            "uint" | "uint8" | "uint16" | "uint32" | "uint64" | "uint8_t" | "uint16_t"
            | "uint32_t" | "uint64_t" => Dtype::Uint,
            "double" => Dtype::Double,
            "float" | "float32" | "float64" => Dtype::Float,
            other => {
                tracing::debug!(dtype = other, "unknown dtype name, using float");
                Dtype::Float
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Dtype::Int => "int",
            Dtype::Uint => "uint",
            Dtype::Float => "float",
            Dtype::Double => "double",
        }
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of an observation or action space, sent once during the handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Space {
    Discrete {
        n: u32,
    },
    Box {
        low: f32,
        high: f32,
        shape: Vec<u32>,
        dtype: Dtype,
    },
    Tuple(Vec<Space>),
    Dict(BTreeMap<String, Space>),
}

impl Space {
    pub fn discrete(n: u32) -> Self {
        Space::Discrete { n }
    }

    /// Box space; `dtype` is a type name such as `"uint32"` or `"double"`.
    pub fn boxed(low: f32, high: f32, shape: Vec<u32>, dtype: &str) -> Self {
        Space::Box {
            low,
            high,
            shape,
            dtype: Dtype::from_name(dtype),
        }
    }

    pub fn tuple(elements: impl IntoIterator<Item = Space>) -> Self {
        Space::Tuple(elements.into_iter().collect())
    }

    pub fn dict<K: Into<String>>(elements: impl IntoIterator<Item = (K, Space)>) -> Self {
        Space::Dict(elements.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Number of scalar elements in a box space (product of the shape).
    pub fn element_count(&self) -> Option<usize> {
        match self {
            Space::Box { shape, .. } => Some(shape.iter().map(|&d| d as usize).product()),
            _ => None,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Space::Discrete { n } => write!(f, "Discrete({n})"),
            Space::Box {
                low,
                high,
                shape,
                dtype,
            } => write!(f, "Box({low}, {high}, {shape:?}, {dtype})"),
            Space::Tuple(elements) => {
                f.write_str("Tuple(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{e}")?;
                }
                f.write_str(")")
            }
            Space::Dict(elements) => {
                f.write_str("Dict(")?;
                for (i, (k, v)) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str(")")
            }
        }
    }
}

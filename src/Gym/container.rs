use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::spaces::{Dtype, Space};

/// Flat element storage of a box container, tagged by dtype.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BoxData {
    Int(Vec<i64>),
    Uint(Vec<u64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
}

impl BoxData {
    pub fn dtype(&self) -> Dtype {
        match self {
            BoxData::Int(_) => Dtype::Int,
            BoxData::Uint(_) => Dtype::Uint,
            BoxData::Float(_) => Dtype::Float,
            BoxData::Double(_) => Dtype::Double,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BoxData::Int(v) => v.len(),
            BoxData::Uint(v) => v.len(),
            BoxData::Float(v) => v.len(),
            BoxData::Double(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to f64.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            BoxData::Int(v) => v.iter().map(|&x| x as f64).collect(),
            BoxData::Uint(v) => v.iter().map(|&x| x as f64).collect(),
            BoxData::Float(v) => v.iter().map(|&x| x as f64).collect(),
            BoxData::Double(v) => v.clone(),
        }
    }
}

impl From<Vec<i64>> for BoxData {
    fn from(v: Vec<i64>) -> Self {
        BoxData::Int(v)
    }
}

impl From<Vec<u64>> for BoxData {
    fn from(v: Vec<u64>) -> Self {
        BoxData::Uint(v)
    }
}

impl From<Vec<f32>> for BoxData {
    fn from(v: Vec<f32>) -> Self {
        BoxData::Float(v)
    }
}

impl From<Vec<f64>> for BoxData {
    fn from(v: Vec<f64>) -> Self {
        BoxData::Double(v)
    }
}

/// Observation or action value, shaped like a [`Space`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataContainer {
    Discrete(u32),
    Box { shape: Vec<u32>, data: BoxData },
    Tuple(Vec<DataContainer>),
    Dict(BTreeMap<String, DataContainer>),
}

impl DataContainer {
    /// One-dimensional box holding `data`.
    pub fn vector(data: impl Into<BoxData>) -> Self {
        let data = data.into();
        DataContainer::Box {
            shape: vec![data.len() as u32],
            data,
        }
    }

    pub fn boxed(shape: Vec<u32>, data: impl Into<BoxData>) -> Self {
        DataContainer::Box {
            shape,
            data: data.into(),
        }
    }

    pub fn as_discrete(&self) -> Option<u32> {
        match self {
            DataContainer::Discrete(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_box(&self) -> Option<&BoxData> {
        match self {
            DataContainer::Box { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&DataContainer> {
        match self {
            DataContainer::Tuple(elements) => elements.get(index),
            _ => None,
        }
    }

    pub fn get_key(&self, key: &str) -> Option<&DataContainer> {
        match self {
            DataContainer::Dict(elements) => elements.get(key),
            _ => None,
        }
    }

    /// Structural check against a space: variant, dtype, element count and
    /// discrete range.
    pub fn matches(&self, space: &Space) -> bool {
        match (self, space) {
            (DataContainer::Discrete(v), Space::Discrete { n }) => v < n,
            (DataContainer::Box { shape, data }, Space::Box { shape: s, dtype, .. }) => {
                let expected: usize = s.iter().map(|&d| d as usize).product();
                let actual: usize = shape.iter().map(|&d| d as usize).product();
                data.dtype() == *dtype && actual == data.len() && actual == expected
            }
            (DataContainer::Tuple(values), Space::Tuple(spaces)) => {
                values.len() == spaces.len()
                    && values.iter().zip(spaces).all(|(v, s)| v.matches(s))
            }
            (DataContainer::Dict(values), Space::Dict(spaces)) => {
                values.len() == spaces.len()
                    && values
                        .iter()
                        .all(|(k, v)| spaces.get(k).is_some_and(|s| v.matches(s)))
            }
            _ => false,
        }
    }
}

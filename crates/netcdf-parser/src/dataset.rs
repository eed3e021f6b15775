//! The dataset abstraction shared by the native and in-memory readers.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{NetCdfError, NetCdfResult};
use crate::time::decode_cf_time;

/// A variable or global attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Number(f64),
    Numbers(Vec<f64>),
    Text(String),
}

impl AttrValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Number(v) => Some(*v),
            AttrValue::Numbers(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AttrValue::Number(v) => number_json(*v),
            AttrValue::Numbers(v) => serde_json::Value::Array(v.iter().map(|x| number_json(*x)).collect()),
            AttrValue::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Number(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

/// Non-finite numbers have no JSON form; they become `null`.
fn number_json(v: f64) -> serde_json::Value {
    serde_json::Number::from_f64(v)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// Render an attribute map as a JSON object.
pub fn attributes_json(attrs: &BTreeMap<String, AttrValue>) -> serde_json::Value {
    serde_json::Value::Object(
        attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Shape and attributes of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl VariableInfo {
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attributes.get(name)
    }

    /// Position of a named dimension.
    pub fn dim_index(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read access to one open dataset.
///
/// A reader is owned by a single unit of work and never shared.
pub trait DatasetReader {
    /// All variables in the file, in file order.
    fn variables(&self) -> Vec<VariableInfo>;

    /// Global (file-level) attributes.
    fn global_attributes(&self) -> BTreeMap<String, AttrValue>;

    /// Full contents of a numeric variable in row-major order, with fill
    /// values mapped to `NaN` and CF packing undone.
    fn read_values(&self, name: &str) -> NetCdfResult<Vec<f64>>;

    /// Full contents of an integer variable (mesh connectivity).
    fn read_indices(&self, name: &str) -> NetCdfResult<Vec<i64>>;

    fn variable(&self, name: &str) -> Option<VariableInfo> {
        self.variables().into_iter().find(|v| v.name == name)
    }

    /// Coordinate variable names: dimension coordinates plus anything named
    /// in a `coordinates` attribute.
    fn coordinate_names(&self) -> BTreeSet<String> {
        let vars = self.variables();
        let names: BTreeSet<&str> = vars.iter().map(|v| v.name.as_str()).collect();

        let mut coords = BTreeSet::new();
        for var in &vars {
            if var.dims.len() == 1 && var.dims[0] == var.name {
                coords.insert(var.name.clone());
            }
            if let Some(listed) = var.attr("coordinates").and_then(AttrValue::as_str) {
                for name in listed.split_whitespace() {
                    if names.contains(name) {
                        coords.insert(name.to_string());
                    }
                }
            }
        }
        coords
    }

    /// Every variable that is not a coordinate.
    fn data_variable_names(&self) -> BTreeSet<String> {
        let coords = self.coordinate_names();
        self.variables()
            .into_iter()
            .map(|v| v.name)
            .filter(|name| !coords.contains(name))
            .collect()
    }

    /// Decoded time axis.
    fn time_values(&self, axis: &str) -> NetCdfResult<Vec<DateTime<Utc>>> {
        let info = self
            .variable(axis)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", axis)))?;
        let units = info
            .attr("units")
            .and_then(AttrValue::as_str)
            .ok_or_else(|| NetCdfError::InvalidTime(format!("{} has no units attribute", axis)))?
            .to_string();
        let raw = self.read_values(axis)?;
        decode_cf_time(&raw, &units)
    }

    /// Values of `name` at one index of dimension `dim`, row-major over the
    /// remaining dimensions. A variable without that dimension is returned whole.
    fn read_along(&self, name: &str, dim: &str, index: usize) -> NetCdfResult<Vec<f64>> {
        let info = self
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))?;
        let values = self.read_values(name)?;

        let Some(axis) = info.dim_index(dim) else {
            return Ok(values);
        };
        if index >= info.shape[axis] {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} index {} out of range for {} (len {})",
                dim, index, name, info.shape[axis]
            )));
        }

        // Split into outer (dims before axis) and inner (dims after axis) blocks.
        let outer: usize = info.shape[..axis].iter().product();
        let inner: usize = info.shape[axis + 1..].iter().product();
        let len = info.shape[axis];
        let mut out = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            let start = (o * len + index) * inner;
            out.extend_from_slice(&values[start..start + inner]);
        }
        Ok(out)
    }
}

/// Opens datasets by path. Implementations must be shareable across workers;
/// each call returns a fresh, private reader.
pub trait DatasetOpener: Send + Sync {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn DatasetReader>>;
}

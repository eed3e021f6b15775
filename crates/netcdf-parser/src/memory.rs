//! In-memory datasets for tests and dry runs.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::dataset::{AttrValue, DatasetOpener, DatasetReader, VariableInfo};
use crate::error::{NetCdfError, NetCdfResult};

#[derive(Debug, Clone)]
struct MemoryVariable {
    dims: Vec<String>,
    values: Vec<f64>,
    attributes: BTreeMap<String, AttrValue>,
}

/// A dataset held entirely in memory, assembled with a builder.
///
/// ```
/// use netcdf_parser::{DatasetReader, MemoryDataset};
///
/// let ds = MemoryDataset::new()
///     .dimension("node", 3)
///     .variable("zeta", &["node"], vec![0.1, f64::NAN, 0.3]);
/// assert_eq!(ds.read_values("zeta").unwrap().len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDataset {
    dimensions: Vec<(String, usize)>,
    variables: Vec<(String, MemoryVariable)>,
    global: BTreeMap<String, AttrValue>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(mut self, name: &str, len: usize) -> Self {
        self.dimensions.retain(|(n, _)| n != name);
        self.dimensions.push((name.to_string(), len));
        self
    }

    /// Add (or replace) a variable. Values are row-major over `dims`;
    /// a length mismatch surfaces as an error on read.
    pub fn variable(mut self, name: &str, dims: &[&str], values: Vec<f64>) -> Self {
        self.variables.retain(|(n, _)| n != name);
        self.variables.push((
            name.to_string(),
            MemoryVariable {
                dims: dims.iter().map(|d| d.to_string()).collect(),
                values,
                attributes: BTreeMap::new(),
            },
        ));
        self
    }

    /// Set an attribute on an existing variable; unknown variables are ignored.
    pub fn attribute(mut self, variable: &str, name: &str, value: impl Into<AttrValue>) -> Self {
        if let Some((_, var)) = self.variables.iter_mut().find(|(n, _)| n == variable) {
            var.attributes.insert(name.to_string(), value.into());
        }
        self
    }

    pub fn global_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.global.insert(name.to_string(), value.into());
        self
    }

    /// Declared dimensions in insertion order.
    pub fn dimensions(&self) -> &[(String, usize)] {
        &self.dimensions
    }

    fn dim_len(&self, name: &str) -> usize {
        self.dimensions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }

    fn get(&self, name: &str) -> NetCdfResult<&MemoryVariable> {
        self.variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))
    }

    fn info(&self, name: &str, var: &MemoryVariable) -> VariableInfo {
        VariableInfo {
            name: name.to_string(),
            dims: var.dims.clone(),
            shape: var.dims.iter().map(|d| self.dim_len(d)).collect(),
            attributes: var.attributes.clone(),
        }
    }
}

impl DatasetReader for MemoryDataset {
    fn variables(&self) -> Vec<VariableInfo> {
        self.variables
            .iter()
            .map(|(name, var)| self.info(name, var))
            .collect()
    }

    fn global_attributes(&self) -> BTreeMap<String, AttrValue> {
        self.global.clone()
    }

    fn read_values(&self, name: &str) -> NetCdfResult<Vec<f64>> {
        let var = self.get(name)?;
        let expected = self.info(name, var).len();
        if var.values.len() != expected {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} holds {} values but its dimensions need {}",
                name,
                var.values.len(),
                expected
            )));
        }

        let fill = var.attributes.get("_FillValue").and_then(AttrValue::as_f64);
        let scale = var.attributes.get("scale_factor").and_then(AttrValue::as_f64);
        let offset = var.attributes.get("add_offset").and_then(AttrValue::as_f64);
        Ok(var
            .values
            .iter()
            .map(|&v| unpack(v, fill, scale, offset))
            .collect())
    }

    fn read_indices(&self, name: &str) -> NetCdfResult<Vec<i64>> {
        let var = self.get(name)?;
        var.values
            .iter()
            .map(|&v| {
                if v.is_finite() && v.fract() == 0.0 {
                    Ok(v as i64)
                } else {
                    Err(NetCdfError::InvalidFormat(format!(
                        "{} contains non-integer index {}",
                        name, v
                    )))
                }
            })
            .collect()
    }
}

/// Apply fill masking and CF packing to one raw value.
pub(crate) fn unpack(raw: f64, fill: Option<f64>, scale: Option<f64>, offset: Option<f64>) -> f64 {
    if raw.is_nan() || fill == Some(raw) {
        return f64::NAN;
    }
    raw * scale.unwrap_or(1.0) + offset.unwrap_or(0.0)
}

/// Serves registered in-memory datasets by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    datasets: HashMap<PathBuf, MemoryDataset>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, dataset: MemoryDataset) {
        self.datasets.insert(path.into(), dataset);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, dataset: MemoryDataset) -> Self {
        self.insert(path, dataset);
        self
    }
}

impl DatasetOpener for MemoryOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn DatasetReader>> {
        self.datasets
            .get(path)
            .cloned()
            .map(|ds| Box::new(ds) as Box<dyn DatasetReader>)
            .ok_or_else(|| NetCdfError::Open {
                path: path.display().to_string(),
                message: "no such dataset".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_packing() {
        let ds = MemoryDataset::new()
            .dimension("node", 3)
            .variable("zeta", &["node"], vec![10.0, -99999.0, 20.0])
            .attribute("zeta", "_FillValue", -99999.0)
            .attribute("zeta", "scale_factor", 0.1)
            .attribute("zeta", "add_offset", 1.0);
        let values = ds.read_values("zeta").unwrap();
        assert!((values[0] - 2.0).abs() < 1e-12);
        assert!(values[1].is_nan());
        assert!((values[2] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let ds = MemoryDataset::new()
            .dimension("node", 4)
            .variable("zeta", &["node"], vec![1.0, 2.0]);
        assert!(matches!(
            ds.read_values("zeta"),
            Err(NetCdfError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_read_indices_rejects_fractions() {
        let ds = MemoryDataset::new()
            .dimension("nele", 1)
            .dimension("nvertex", 3)
            .variable("element", &["nele", "nvertex"], vec![1.0, 2.0, 3.5]);
        assert!(ds.read_indices("element").is_err());
    }

    #[test]
    fn test_opener() {
        let opener = MemoryOpener::new().with("/data/a.nc", MemoryDataset::new().dimension("x", 1));
        assert!(opener.open(Path::new("/data/a.nc")).is_ok());
        assert!(matches!(
            opener.open(Path::new("/data/b.nc")),
            Err(NetCdfError::Open { .. })
        ));
    }
}

//! Native NetCDF access using the netcdf library.
//!
//! The netcdf library wraps libnetcdf/HDF5 and needs a real file path, so the
//! reader opens files in place; the storm datasets are already on local disk
//! when a unit runs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tracing::debug;

use crate::dataset::{AttrValue, DatasetOpener, DatasetReader, VariableInfo};
use crate::error::{NetCdfError, NetCdfResult};
use crate::memory::{unpack, MemoryDataset};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints verbose error messages to stderr even when errors
/// are handled gracefully by the Rust code (e.g., when checking for optional
/// attributes that don't exist). This function disables that output by calling
/// H5Eset_auto2 with null handlers. It only needs to be called once per process,
/// but is safe to call multiple times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and we're passing null pointers
        // to disable error output, which is a documented valid use.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(
                hdf5_metno_sys::h5e::H5E_DEFAULT,
                None,
                std::ptr::null_mut(),
            );
        }
    });
}

/// A NetCDF file opened read-only.
pub struct NetCdfDataset {
    path: PathBuf,
    file: netcdf::File,
}

impl NetCdfDataset {
    pub fn open(path: impl AsRef<Path>) -> NetCdfResult<Self> {
        silence_hdf5_errors();

        let path = path.as_ref();
        let file = netcdf::open(path).map_err(|e| NetCdfError::Open {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %path.display(), "Opened NetCDF dataset");

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn var(&self, name: &str) -> NetCdfResult<netcdf::Variable<'_>> {
        self.file
            .variable(name)
            .ok_or_else(|| NetCdfError::MissingData(format!("{} variable", name)))
    }

    /// Read `extents` of a variable with fill values, scale and offset applied.
    fn read_unpacked(&self, name: &str, extents: netcdf::Extents) -> NetCdfResult<Vec<f64>> {
        let var = self.var(name)?;
        let raw: Vec<f64> = var
            .get_values::<f64, _>(extents)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", name, e)))?;

        let fill = get_f64_attr(&var, "_FillValue").or_else(|| get_f64_attr(&var, "missing_value"));
        let scale = get_f64_attr(&var, "scale_factor");
        let offset = get_f64_attr(&var, "add_offset");

        Ok(raw.into_iter().map(|v| unpack(v, fill, scale, offset)).collect())
    }
}

impl DatasetReader for NetCdfDataset {
    fn variables(&self) -> Vec<VariableInfo> {
        self.file
            .variables()
            .map(|var| VariableInfo {
                name: var.name(),
                dims: var.dimensions().iter().map(|d| d.name()).collect(),
                shape: var.dimensions().iter().map(|d| d.len()).collect(),
                attributes: var
                    .attributes()
                    .filter_map(|attr| {
                        let value = convert_attr(attr.value().ok()?)?;
                        Some((attr.name().to_string(), value))
                    })
                    .collect(),
            })
            .collect()
    }

    fn global_attributes(&self) -> BTreeMap<String, AttrValue> {
        self.file
            .attributes()
            .filter_map(|attr| {
                let value = convert_attr(attr.value().ok()?)?;
                Some((attr.name().to_string(), value))
            })
            .collect()
    }

    fn read_values(&self, name: &str) -> NetCdfResult<Vec<f64>> {
        self.read_unpacked(name, netcdf::Extents::All)
    }

    /// Reads only the hyperslab at `index` along `dim`.
    fn read_along(&self, name: &str, dim: &str, index: usize) -> NetCdfResult<Vec<f64>> {
        let var = self.var(name)?;
        let dims = var.dimensions();
        let Some(axis) = dims.iter().position(|d| d.name() == dim) else {
            return self.read_unpacked(name, netcdf::Extents::All);
        };
        let len = dims[axis].len();
        if index >= len {
            return Err(NetCdfError::InvalidFormat(format!(
                "{} index {} out of range for {} (len {})",
                dim, index, name, len
            )));
        }

        let extents: Vec<netcdf::Extent> = dims
            .iter()
            .enumerate()
            .map(|(i, d)| {
                if i == axis {
                    netcdf::Extent::Index(index)
                } else {
                    netcdf::Extent::SliceCount {
                        start: 0,
                        count: d.len(),
                        stride: 1,
                    }
                }
            })
            .collect();
        self.read_unpacked(name, extents.into())
    }

    fn read_indices(&self, name: &str) -> NetCdfResult<Vec<i64>> {
        let var = self.var(name)?;
        var.get_values::<i64, _>(..)
            .map_err(|e| NetCdfError::InvalidFormat(format!("Failed to read {}: {}", name, e)))
    }
}

/// Opens NetCDF files from disk.
#[derive(Debug, Clone, Default)]
pub struct NetCdfOpener;

impl DatasetOpener for NetCdfOpener {
    fn open(&self, path: &Path) -> NetCdfResult<Box<dyn DatasetReader>> {
        Ok(Box::new(NetCdfDataset::open(path)?))
    }
}

/// Write an in-memory dataset to a NetCDF-4 file. Every variable is stored
/// as `f64`; used to build fixtures for the native reader.
pub fn write_netcdf(dataset: &MemoryDataset, path: impl AsRef<Path>) -> NetCdfResult<()> {
    silence_hdf5_errors();

    let mut file = netcdf::create(path.as_ref())?;
    for (name, len) in dataset.dimensions() {
        file.add_dimension(name, *len)?;
    }

    for (name, value) in dataset.global_attributes() {
        file.add_attribute(&name, to_netcdf_attr(value))?;
    }

    for info in dataset.variables() {
        let values = dataset.read_values(&info.name)?;
        let dims: Vec<&str> = info.dims.iter().map(String::as_str).collect();
        let mut var = file.add_variable::<f64>(&info.name, &dims)?;
        for (key, value) in info.attributes {
            // Fill markers were already turned into NaN by read_values.
            if key == "_FillValue" || key == "scale_factor" || key == "add_offset" {
                continue;
            }
            var.put_attribute(&key, to_netcdf_attr(value))?;
        }
        var.put_values(&values, ..)?;
    }

    Ok(())
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Check if a variable has an attribute with the given name.
/// This avoids HDF5 error spam when checking for optional attributes.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// Helper to get f64 attribute.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> Option<f64> {
    if !has_attr(var, name) {
        return None;
    }
    let attr_value = var.attribute_value(name)?.ok()?;
    f64::try_from(attr_value).ok()
}

fn convert_attr(value: netcdf::AttributeValue) -> Option<AttrValue> {
    use netcdf::AttributeValue as V;

    let numbers = |v: Vec<f64>| {
        if v.len() == 1 {
            AttrValue::Number(v[0])
        } else {
            AttrValue::Numbers(v)
        }
    };

    Some(match value {
        V::Uchar(v) => AttrValue::Number(v as f64),
        V::Schar(v) => AttrValue::Number(v as f64),
        V::Ushort(v) => AttrValue::Number(v as f64),
        V::Short(v) => AttrValue::Number(v as f64),
        V::Uint(v) => AttrValue::Number(v as f64),
        V::Int(v) => AttrValue::Number(v as f64),
        V::Ulonglong(v) => AttrValue::Number(v as f64),
        V::Longlong(v) => AttrValue::Number(v as f64),
        V::Float(v) => AttrValue::Number(v as f64),
        V::Double(v) => AttrValue::Number(v),
        V::Uchars(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Schars(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Ushorts(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Shorts(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Uints(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Ints(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Ulonglongs(v) => numbers(v.into_iter().map(|x| x as f64).collect()),
        V::Longlongs(v) => numbers(v.into_iter().map(|x| x as f64).collect()),
        V::Floats(v) => numbers(v.into_iter().map(f64::from).collect()),
        V::Doubles(v) => numbers(v),
        V::Str(s) => AttrValue::Text(s),
        V::Strs(v) => AttrValue::Text(v.join(" ")),
        #[allow(unreachable_patterns)]
        _ => return None,
    })
}

fn to_netcdf_attr(value: AttrValue) -> netcdf::AttributeValue {
    match value {
        AttrValue::Number(v) => netcdf::AttributeValue::Double(v),
        AttrValue::Numbers(v) => netcdf::AttributeValue::Doubles(v),
        AttrValue::Text(s) => netcdf::AttributeValue::Str(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> MemoryDataset {
        MemoryDataset::new()
            .dimension("time", 2)
            .dimension("node", 3)
            .variable("time", &["time"], vec![0.0, 3600.0])
            .attribute("time", "units", "seconds since 2012-10-29 00:00:00")
            .variable("x", &["node"], vec![-75.0, -74.0, -75.0])
            .variable("y", &["node"], vec![38.0, 38.0, 39.0])
            .variable("zeta", &["time", "node"], vec![0.5, f64::NAN, 0.7, 0.6, 0.8, 0.9])
            .attribute("zeta", "coordinates", "time y x")
            .attribute("zeta", "units", "m")
            .global_attribute("model", "ADCIRC")
    }

    #[test]
    fn test_open_missing_file() {
        let result = NetCdfDataset::open("/nonexistent/fort.63.nc");
        assert!(matches!(result, Err(NetCdfError::Open { .. })));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.63.nc");
        write_netcdf(&fixture(), &path).unwrap();

        let ds = NetCdfDataset::open(&path).unwrap();
        let zeta = ds.read_values("zeta").unwrap();
        assert_eq!(zeta.len(), 6);
        assert!(zeta[1].is_nan());
        assert_eq!(zeta[5], 0.9);

        let coords = ds.coordinate_names();
        assert!(coords.contains("x") && coords.contains("y") && coords.contains("time"));
        assert_eq!(
            ds.global_attributes().get("model").and_then(AttrValue::as_str),
            Some("ADCIRC")
        );

        let times = ds.time_values("time").unwrap();
        assert_eq!(times[1].to_rfc3339(), "2012-10-29T01:00:00+00:00");
    }

    #[test]
    fn test_read_along_matches_memory_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fort.63.nc");
        let memory = fixture();
        write_netcdf(&memory, &path).unwrap();
        let ds = NetCdfDataset::open(&path).unwrap();

        assert_eq!(ds.read_along("zeta", "time", 1).unwrap(), vec![0.6, 0.8, 0.9]);
        let first = ds.read_along("zeta", "time", 0).unwrap();
        assert_eq!(first.len(), 3);
        assert!(first[1].is_nan());
        assert_eq!(
            ds.read_along("x", "time", 0).unwrap(),
            memory.read_along("x", "time", 0).unwrap()
        );
        assert!(matches!(
            ds.read_along("zeta", "time", 2),
            Err(NetCdfError::InvalidFormat(_))
        ));
    }
}

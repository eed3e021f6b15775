//! Variable catalog: how each named dataset variable is ingested and displayed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use crate::color::ColorMapName;
use crate::error::{PsaError, PsaResult};

/// Geometry produced for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GeoType {
    /// Filled contour bands.
    Polygon,
    /// Point samples rendered as wind barbs.
    WindBarb,
}

impl GeoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeoType::Polygon => "polygon",
            GeoType::WindBarb => "wind-barb",
        }
    }
}

/// Temporal shape of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataType {
    /// A single snapshot of maximum values, stored without a date.
    MaxValues,
    /// One field per PSA date.
    TimeSeries,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::MaxValues => "max-values",
            DataType::TimeSeries => "time-series",
        }
    }
}

/// Physical element a variable describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Water,
    Wind,
}

impl ElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Water => "water",
            ElementType::Wind => "wind",
        }
    }
}

/// Rendering and ingestion attributes of one named variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub display_name: String,
    pub units: String,
    pub geo_type: GeoType,
    pub data_type: DataType,
    pub element_type: ElementType,
    #[serde(default)]
    pub auto_displayed: bool,
    /// Absent for point variables, which are never contoured.
    #[serde(default)]
    pub color_map: Option<ColorMapName>,
}

impl VariableSpec {
    /// Whether this variable produces contour bands.
    pub fn is_contoured(&self) -> bool {
        self.geo_type == GeoType::Polygon
    }
}

fn invalid(param: &str, value: &str) -> PsaError {
    PsaError::InvalidParameter {
        param: param.to_string(),
        message: format!("unknown value '{}'", value),
    }
}

impl FromStr for GeoType {
    type Err = PsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polygon" => Ok(GeoType::Polygon),
            "wind-barb" => Ok(GeoType::WindBarb),
            other => Err(invalid("geo_type", other)),
        }
    }
}

impl FromStr for DataType {
    type Err = PsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "max-values" => Ok(DataType::MaxValues),
            "time-series" => Ok(DataType::TimeSeries),
            other => Err(invalid("data_type", other)),
        }
    }
}

impl FromStr for ElementType {
    type Err = PsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "water" => Ok(ElementType::Water),
            "wind" => Ok(ElementType::Wind),
            other => Err(invalid("element_type", other)),
        }
    }
}

/// Mapping from variable name to its [`VariableSpec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCatalog {
    pub variables: BTreeMap<String, VariableSpec>,
}

impl Default for VariableCatalog {
    fn default() -> Self {
        use DataType::*;
        use ElementType::*;
        use GeoType::*;

        let defaults = [
            ("water_level", "Water Level", "m", Polygon, TimeSeries, Water, true, Some(ColorMapName::Blues)),
            ("water_level_max", "Water Level", "m", Polygon, MaxValues, Water, false, Some(ColorMapName::Blues)),
            ("wave_height", "Wave Height", "m", Polygon, TimeSeries, Water, true, Some(ColorMapName::Greens)),
            ("wind_speed", "Wind Speed", "m/s", Polygon, TimeSeries, Wind, true, Some(ColorMapName::Reds)),
            ("wind_gust", "Wind Gust", "m/s", Polygon, TimeSeries, Wind, false, Some(ColorMapName::Reds)),
            ("wind_direction", "Wind Barbs", "degrees", WindBarb, TimeSeries, Wind, false, None),
        ];

        let variables = defaults
            .into_iter()
            .map(
                |(name, display_name, units, geo_type, data_type, element_type, auto_displayed, color_map)| {
                    (
                        name.to_string(),
                        VariableSpec {
                            name: name.to_string(),
                            display_name: display_name.to_string(),
                            units: units.to_string(),
                            geo_type,
                            data_type,
                            element_type,
                            auto_displayed,
                            color_map,
                        },
                    )
                },
            )
            .collect();

        Self { variables }
    }
}

impl VariableCatalog {
    /// Load a catalog from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> PsaResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a catalog from YAML. Entries are keyed by variable name; the
    /// `name` field of each entry may be omitted.
    pub fn from_yaml(yaml: &str) -> PsaResult<Self> {
        #[derive(Deserialize)]
        struct Entry {
            #[serde(default)]
            name: Option<String>,
            display_name: String,
            units: String,
            geo_type: GeoType,
            data_type: DataType,
            element_type: ElementType,
            #[serde(default)]
            auto_displayed: bool,
            #[serde(default)]
            color_map: Option<ColorMapName>,
        }

        let raw: BTreeMap<String, Entry> = serde_yaml::from_str(yaml)?;
        let mut variables = BTreeMap::new();
        for (key, entry) in raw {
            if let Some(name) = &entry.name {
                if name != &key {
                    return Err(PsaError::InvalidParameter {
                        param: key,
                        message: format!("entry name '{}' does not match its key", name),
                    });
                }
            }
            let spec = VariableSpec {
                name: key.clone(),
                display_name: entry.display_name,
                units: entry.units,
                geo_type: entry.geo_type,
                data_type: entry.data_type,
                element_type: entry.element_type,
                auto_displayed: entry.auto_displayed,
                color_map: entry.color_map,
            };
            if spec.is_contoured() && spec.color_map.is_none() {
                return Err(PsaError::InvalidParameter {
                    param: key,
                    message: "polygon variables need a color_map".to_string(),
                });
            }
            variables.insert(key, spec);
        }

        Ok(Self { variables })
    }

    /// Overlay another catalog; its entries replace ours by name.
    pub fn merge(mut self, other: VariableCatalog) -> Self {
        self.variables.extend(other.variables);
        self
    }

    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.get(name)
    }

    /// Like [`get`](Self::get) but an unknown name is an error.
    pub fn require(&self, name: &str) -> PsaResult<&VariableSpec> {
        self.get(name)
            .ok_or_else(|| PsaError::UnknownVariable(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = VariableCatalog::default();
        assert_eq!(catalog.len(), 6);

        let wl = catalog.require("water_level_max").unwrap();
        assert_eq!(wl.data_type, DataType::MaxValues);
        assert_eq!(wl.color_map, Some(ColorMapName::Blues));

        let wd = catalog.require("wind_direction").unwrap();
        assert_eq!(wd.geo_type, GeoType::WindBarb);
        assert!(!wd.is_contoured());

        assert!(matches!(
            catalog.require("salinity"),
            Err(PsaError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_enum_strings_round_trip() {
        for g in [GeoType::Polygon, GeoType::WindBarb] {
            assert_eq!(g.as_str().parse::<GeoType>().unwrap(), g);
        }
        for d in [DataType::MaxValues, DataType::TimeSeries] {
            assert_eq!(d.as_str().parse::<DataType>().unwrap(), d);
        }
        assert_eq!("wind".parse::<ElementType>().unwrap(), ElementType::Wind);
        assert!("point".parse::<GeoType>().is_err());
    }

    #[test]
    fn test_yaml_overlay() {
        let yaml = r#"
wind_speed:
  display_name: Sustained Wind
  units: kt
  geo_type: polygon
  data_type: time-series
  element_type: wind
  auto_displayed: true
  color_map: Oranges
"#;
        let catalog = VariableCatalog::default().merge(VariableCatalog::from_yaml(yaml).unwrap());
        let ws = catalog.require("wind_speed").unwrap();
        assert_eq!(ws.units, "kt");
        assert_eq!(ws.color_map, Some(ColorMapName::Oranges));
        assert_eq!(catalog.len(), 6);
    }

    #[test]
    fn test_yaml_polygon_requires_color_map() {
        let yaml = r#"
surge:
  display_name: Surge
  units: m
  geo_type: polygon
  data_type: max-values
  element_type: water
"#;
        assert!(VariableCatalog::from_yaml(yaml).is_err());
    }
}

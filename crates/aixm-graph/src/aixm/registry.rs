//! Feature-type registry: which fields to extract for each AIXM feature type, and how
//! its nodes are displayed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Node shapes understood by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Shape {
    #[default]
    Dot,
    Triangle,
    TriangleDown,
    Box,
    Square,
    Diamond,
    Hexagon,
    Ellipse,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FieldsConfig {
    /// Local names of the time-slice children kept as data fields
    #[serde(default)]
    pub names: Vec<String>,
    /// Whether the front-end concatenates the field values into the node label
    #[serde(default)]
    pub concat: bool,
}

/**
 * Configuration of one feature type, as found in the features configuration file.
 *
 * Only `fields.names` drives extraction; the rest is passed through to graph nodes.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeatureTypeConfig {
    /// Three-character code
    pub abbrev: String,
    /// `#RRGGBB` color
    pub color: String,
    pub shape: Shape,
    #[serde(default)]
    pub fields: FieldsConfig,
}

/// A feature type name with its configuration; shared by every feature of that type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureType {
    pub name: String,
    pub config: FeatureTypeConfig,
}

impl FeatureType {
    pub fn field_names(&self) -> &[String] {
        &self.config.fields.names
    }
}

/// Feature type name to schema handle.
#[derive(Debug, Clone, Default)]
pub struct FeatureTypeRegistry {
    types: BTreeMap<String, Arc<FeatureType>>,
}

impl FeatureTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feature_type(mut self, name: impl Into<String>, config: FeatureTypeConfig) -> Self {
        self.insert(name, config);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, config: FeatureTypeConfig) {
        let name = name.into();
        self.types
            .insert(name.clone(), Arc::new(FeatureType { name, config }));
    }

    /// Decode a `{"Airspace": {"abbrev": ..., ...}, ...}` JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let configs: BTreeMap<String, FeatureTypeConfig> = serde_json::from_str(json)?;
        Ok(Self::from_configs(configs))
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let configs: BTreeMap<String, FeatureTypeConfig> = serde_json::from_reader(reader)?;
        Ok(Self::from_configs(configs))
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_reader(BufReader::new(file))
    }

    fn from_configs(configs: BTreeMap<String, FeatureTypeConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in configs {
            registry.insert(name, config);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<Arc<FeatureType>> {
        self.types.get(name).cloned()
    }

    /// Schema handle for a feature type, failing for unregistered types.
    pub fn lookup(&self, name: &str) -> Result<Arc<FeatureType>> {
        self.get(name).ok_or_else(|| Error::UnknownFeatureType(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r##"{
        "Airspace": {
            "abbrev": "ASP",
            "color": "#ff0000",
            "shape": "triangleDown",
            "fields": {"names": ["type", "designator"], "concat": true}
        },
        "Navaid": {"abbrev": "NAV", "color": "#00ff00", "shape": "dot"}
    }"##;

    #[test]
    fn test_registry_from_json() {
        let registry = FeatureTypeRegistry::from_json_str(CONFIG).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["Airspace", "Navaid"]);

        let airspace = registry.lookup("Airspace").unwrap();
        assert_eq!(airspace.name, "Airspace");
        assert_eq!(airspace.field_names(), ["type", "designator"]);
        assert_eq!(airspace.config.shape, Shape::TriangleDown);
        assert!(airspace.config.fields.concat);

        // omitted fields default to nothing extracted, no concatenation
        let navaid = registry.lookup("Navaid").unwrap();
        assert!(navaid.field_names().is_empty());
        assert!(!navaid.config.fields.concat);
    }

    #[test]
    fn test_unknown_feature_type() {
        let registry = FeatureTypeRegistry::from_json_str(CONFIG).unwrap();
        match registry.lookup("Runway") {
            Err(Error::UnknownFeatureType(name)) => assert_eq!(name, "Runway"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let bad_shape = r##"{"Navaid": {"abbrev": "NAV", "color": "#00ff00", "shape": "star"}}"##;
        assert!(matches!(FeatureTypeRegistry::from_json_str(bad_shape), Err(Error::Registry(_))));

        let unknown_attribute = r##"{"Navaid": {"abbrev": "NAV", "color": "#00ff00", "shape": "dot", "size": 3}}"##;
        assert!(matches!(
            FeatureTypeRegistry::from_json_str(unknown_attribute),
            Err(Error::Registry(_))
        ));
    }
}

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

use super::field::{Association, Extension, Field, XLink};
use super::registry::{FeatureType, FeatureTypeRegistry};
use super::time_slice::{GmlProperty, TimeSlice};
use super::{Element, GML_NS};
use crate::error::{Error, Result};

fn feature_error(feature_type: &str, reason: impl Into<String>) -> Error {
    Error::MalformedFeature {
        feature_type: feature_type.to_string(),
        reason: reason.into(),
    }
}

/**
 * A feature as found in an AIXM dataset, with all its versions (time slices).
 *
 * The feature type is a value: every feature of a type shares the same schema handle
 * from the [`FeatureTypeRegistry`].
 */
#[derive(Debug, Clone, Serialize)]
pub struct Feature {
    /// The `gml:id` of the feature, without its `uuid.` prefix
    pub id: String,
    /// The `gml:identifier` text
    pub identifier: String,
    /// Namespace prefix of the feature element
    pub prefix: String,
    /// Time slices keyed by version, in document order
    pub time_slices: IndexMap<String, TimeSlice>,
    #[serde(skip)]
    schema: Arc<FeatureType>,
}

impl Feature {
    pub fn new(
        id: impl Into<String>,
        identifier: impl Into<String>,
        prefix: impl Into<String>,
        schema: Arc<FeatureType>,
    ) -> Self {
        Feature {
            id: id.into(),
            identifier: identifier.into(),
            prefix: prefix.into(),
            time_slices: IndexMap::new(),
            schema,
        }
    }

    /**
     * Build a feature from a `hasMember` element.
     *
     * The feature is the first child of the member; its local name selects the schema used
     * to extract every `timeSlice/{FeatureType}TimeSlice` of it.
     */
    pub fn from_member(member: &Element, registry: &FeatureTypeRegistry) -> Result<Self> {
        let element = member
            .children
            .first()
            .ok_or_else(|| feature_error(&member.name, "member element without a feature"))?;

        let schema = registry.lookup(&element.name)?;

        let identifier = element
            .child("identifier")
            .map(|e| e.text.trim().to_string())
            .ok_or_else(|| feature_error(&element.name, "missing identifier"))?;

        let id = element
            .attribute(Some(GML_NS), "id")
            .map(|id| id.trim())
            .map(|id| id.strip_prefix("uuid.").unwrap_or(id))
            .filter(|id| !id.is_empty())
            .ok_or_else(|| feature_error(&element.name, format!("feature '{identifier}' has no gml:id")))?;

        let mut feature = Feature::new(id, identifier, element.prefix.clone(), schema.clone());

        let slice_name = format!("{}TimeSlice", element.name);
        for wrapper in element
            .children_named("timeSlice")
            .filter(|wrapper| wrapper.namespace == element.namespace)
        {
            for slice in wrapper
                .children_named(&slice_name)
                .filter(|slice| slice.namespace == element.namespace)
            {
                let time_slice = TimeSlice::from_element(slice, &schema, &feature.id)?;
                feature.insert_time_slice(time_slice);
            }
        }

        Ok(feature)
    }

    /// Add a time slice; a slice with the same version replaces the earlier one.
    pub fn insert_time_slice(&mut self, time_slice: TimeSlice) {
        if let Some(previous) = self.time_slices.insert(time_slice.version.clone(), time_slice) {
            tracing::warn!(
                "Duplicate time slice version '{}' in {} '{}', keeping the last one",
                previous.version,
                self.type_name(),
                self.id
            );
        }
    }

    /// Name of the feature type, e.g. `Airspace`
    pub fn type_name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &Arc<FeatureType> {
        &self.schema
    }

    pub fn data_fields(&self) -> impl Iterator<Item = &Field> {
        self.time_slices.values().flat_map(|ts| ts.data_fields.iter())
    }

    pub fn xlinks(&self) -> impl Iterator<Item = &XLink> {
        self.time_slices.values().flat_map(|ts| ts.xlinks.iter())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &Extension> {
        self.time_slices.values().flat_map(|ts| ts.extensions.iter())
    }

    pub fn associations(&self) -> impl Iterator<Item = Association<'_>> {
        self.time_slices.values().flat_map(|ts| ts.associations())
    }

    pub fn gml_properties(&self) -> impl Iterator<Item = &GmlProperty> {
        self.time_slices.values().flat_map(|ts| ts.gml_properties.iter())
    }

    pub fn has_broken_xlinks(&self) -> bool {
        self.time_slices.values().any(TimeSlice::has_broken_xlinks)
    }

    pub fn matches_field_value(&self, key: &str) -> bool {
        self.time_slices.values().any(|ts| ts.matches_field_value(key))
    }

    /// Attach a reverse reference from the feature `source` to every time slice.
    pub(crate) fn add_reverse_association(&mut self, source_type: &str, source_id: &str) {
        let extension = Extension::new(source_type, source_id);
        for ts in self.time_slices.values_mut() {
            ts.add_extension(extension.clone());
        }
    }

    /// Flag the nested elements with this local id so the skeleton writes them back.
    pub(crate) fn mark_referenced_property(&mut self, id: &str) {
        for ts in self.time_slices.values_mut() {
            for property in ts.gml_properties.iter_mut().filter(|p| p.id == id) {
                property.serializable = true;
            }
        }
    }
}

use serde::Serialize;

use super::field::{Association, Extension, Field, XLink};
use super::registry::FeatureType;
use super::{normalize_reference, Element, GML_NS, XLINK_NS};
use crate::error::{Error, Result};

/// Name prefix of nested elements whose reference belongs to their grandparent component.
const ASSOCIATED_PREFIX: &str = "the";

/// An element nested in a time slice with its own `gml:id`, which other features may
/// reference directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GmlProperty {
    pub id: String,
    pub name: String,
    /// Set by reference resolution when another feature points at this element; the
    /// skeleton then carries its subtree.
    pub serializable: bool,
}

/**
 * One version of a feature: the fields extracted from an AIXM `...TimeSlice` element.
 */
#[derive(Debug, Clone, Serialize)]
pub struct TimeSlice {
    /// The slice element itself (name, prefix and attributes, no text)
    pub element: Field,
    /// `sequenceNumber`, or `sequenceNumber,correctionNumber` when corrected
    pub version: String,
    pub data_fields: Vec<Field>,
    pub xlinks: Vec<XLink>,
    pub extensions: Vec<Extension>,
    pub gml_properties: Vec<GmlProperty>,
}

impl TimeSlice {
    /// Extract a time slice, keeping the direct children listed in the feature type schema.
    pub fn from_element(element: &Element, schema: &FeatureType, feature_id: &str) -> Result<Self> {
        let version = version_label(element).ok_or_else(|| Error::MissingSequenceNumber {
            feature_type: schema.name.clone(),
            feature_id: feature_id.to_string(),
        })?;

        let field_names = schema.field_names();
        let data_fields = element
            .children
            .iter()
            .filter(|child| field_names.iter().any(|name| *name == child.name))
            .map(Field::from)
            .collect();

        let mut xlinks = Vec::new();
        let mut gml_properties = Vec::new();
        let mut ancestors = vec![element];
        for child in element.children.iter() {
            scan_descendants(child, &mut ancestors, &mut xlinks, &mut gml_properties);
        }

        let mut slice_element = Field::from(element);
        slice_element.text.clear();

        Ok(TimeSlice {
            element: slice_element,
            version,
            data_fields,
            xlinks,
            extensions: Vec::new(),
            gml_properties,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.element.prefix
    }

    /// Cross-references first, then extensions.
    pub fn associations(&self) -> impl Iterator<Item = Association<'_>> {
        self.xlinks
            .iter()
            .map(Association::XLink)
            .chain(self.extensions.iter().map(Association::Extension))
    }

    pub fn has_broken_xlinks(&self) -> bool {
        self.xlinks.iter().any(XLink::is_broken)
    }

    /// Case-insensitive substring match over the data field values.
    pub fn matches_field_value(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.data_fields
            .iter()
            .any(|field| field.text.to_lowercase().contains(&key))
    }

    pub(crate) fn add_extension(&mut self, extension: Extension) {
        self.extensions.push(extension);
    }
}

/// Version label from the `sequenceNumber` and optional `correctionNumber` children.
pub fn version_label(element: &Element) -> Option<String> {
    let sequence = element
        .child("sequenceNumber")
        .map(|e| e.text.trim())
        .filter(|text| !text.is_empty())?;

    match element
        .child("correctionNumber")
        .map(|e| e.text.trim())
        .filter(|text| !text.is_empty())
    {
        Some(correction) => Some(format!("{sequence},{correction}")),
        None => Some(sequence.to_string()),
    }
}

/// Depth-first, document-order walk collecting references and locally identified elements.
///
/// `ancestors` starts with the time slice element.
fn scan_descendants<'a>(
    element: &'a Element,
    ancestors: &mut Vec<&'a Element>,
    xlinks: &mut Vec<XLink>,
    gml_properties: &mut Vec<GmlProperty>,
) {
    if element.attribute(Some(XLINK_NS), "href").is_some() {
        let field = if ancestors.len() == 1 {
            Field::from(element)
        } else {
            nested_xlink_field(element, ancestors)
        };
        // references without a target are dropped
        xlinks.extend(XLink::from_field(field));
    }

    if let Some(id) = element.attribute(Some(GML_NS), "id") {
        gml_properties.push(GmlProperty {
            id: normalize_reference(id).to_string(),
            name: element.name.clone(),
            serializable: false,
        });
    }

    ancestors.push(element);
    for child in element.children.iter() {
        scan_descendants(child, ancestors, xlinks, gml_properties);
    }
    ancestors.pop();
}

/**
 * Flatten a reference found below a component wrapper.
 *
 * ```xml
 * <aixm:navaidEquipment>
 *   <aixm:NavaidComponent gml:id="N-a8e60416">
 *     <aixm:collocationGroup>1</aixm:collocationGroup>
 *     <aixm:theNavaidEquipment xlink:href="urn:uuid:13fe226f"/>
 *   </aixm:NavaidComponent>
 * </aixm:navaidEquipment>
 * ```
 *
 * is kept as `<aixm:navaidEquipment_1 xlink:href="urn:uuid:13fe226f"/>`: the grandparent
 * tag joined with the text of the leaf siblings. Other nested references are kept as-is.
 */
fn nested_xlink_field(element: &Element, ancestors: &[&Element]) -> Field {
    if !element.name.starts_with(ASSOCIATED_PREFIX) || ancestors.len() < 2 {
        return Field::from(element);
    }

    let parent = ancestors[ancestors.len() - 1];
    let grandparent = ancestors[ancestors.len() - 2];

    let mut tags = vec![grandparent.name.as_str()];
    tags.extend(
        parent
            .children
            .iter()
            .filter(|sibling| !std::ptr::eq(*sibling, element) && sibling.is_leaf())
            .map(|sibling| sibling.text.as_str()),
    );

    Field {
        name: tags.join("_"),
        text: String::new(),
        attributes: element.attributes.clone(),
        prefix: grandparent.prefix.clone(),
    }
}

use serde::Serialize;
use std::collections::BTreeMap;

use super::{clark_name, normalize_reference, Element, EXTENSION_PREFIX, XLINK_NS};

/**
 * The essential content of an XML element: local name, text, attributes and prefix.
 *
 * Attributes are copied out of the source element, so a field never keeps the parsed
 * subtree alive.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct Field {
    /// Local tag name, namespace stripped
    pub name: String,
    /// Text content, empty if absent
    pub text: String,
    /// Attributes keyed by their `{namespace}local` name
    pub attributes: BTreeMap<String, String>,
    /// Namespace prefix at capture time
    pub prefix: String,
}

impl Field {
    pub fn new(name: impl Into<String>, prefix: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_attribute(mut self, namespace: Option<&str>, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(clark_name(namespace, name), value.into());
        self
    }

    pub fn attribute(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.attributes.get(&clark_name(namespace, name)).map(String::as_str)
    }

    /// The raw `xlink:href` value, if any.
    pub fn href(&self) -> Option<&str> {
        self.attribute(Some(XLINK_NS), "href")
    }
}

impl From<&Element> for Field {
    fn from(element: &Element) -> Self {
        Field {
            name: element.name.clone(),
            text: element.text.clone(),
            attributes: element.attributes.clone(),
            prefix: element.prefix.clone(),
        }
    }
}

/**
 * A field carrying a cross-reference (`xlink:href`) to another feature.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XLink {
    pub field: Field,
    /// Identifier of the referenced feature, URN decoration stripped
    pub target: String,
    broken: bool,
}

impl XLink {
    /// Wraps a field holding a non-empty reference; `None` otherwise.
    pub fn from_field(field: Field) -> Option<Self> {
        let target = normalize_reference(field.href()?).to_string();
        if target.is_empty() {
            return None;
        }
        Some(XLink {
            field,
            target,
            broken: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn set_broken(&mut self) {
        self.broken = true;
    }
}

/**
 * A synthesized reverse reference, pointing from a referenced feature back to the feature
 * referencing it.
 *
 * Extensions only exist in the index and in the skeleton output.
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Extension {
    pub field: Field,
    /// Identifier of the referencing feature
    pub target: String,
}

impl Extension {
    /// Reverse reference to a feature of type `source_type` with the given id.
    pub fn new(source_type: &str, source_id: &str) -> Self {
        let field = Field::new(format!("the{source_type}"), EXTENSION_PREFIX).with_attribute(
            Some(XLINK_NS),
            "href",
            format!("urn:uuid:{source_id}"),
        );
        Extension {
            field,
            target: source_id.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }
}

/// Either kind of link found on a time slice.
#[derive(Debug, Clone, Copy)]
pub enum Association<'a> {
    XLink(&'a XLink),
    Extension(&'a Extension),
}

impl<'a> Association<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Association::XLink(xlink) => xlink.name(),
            Association::Extension(extension) => extension.name(),
        }
    }

    pub fn target(&self) -> &'a str {
        match self {
            Association::XLink(xlink) => &xlink.target,
            Association::Extension(extension) => &extension.target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xlink_target_is_normalized() {
        let field = Field::new("routeFormed", "aixm").with_attribute(Some(XLINK_NS), "href", "urn:uuid:a14a8751");
        let xlink = XLink::from_field(field).unwrap();
        assert_eq!(xlink.target, "a14a8751");
        assert_eq!(xlink.name(), "routeFormed");
        assert!(!xlink.is_broken());
    }

    #[test]
    fn test_xlink_without_reference_is_discarded() {
        assert!(XLink::from_field(Field::new("routeFormed", "aixm")).is_none());
        let empty = Field::new("routeFormed", "aixm").with_attribute(Some(XLINK_NS), "href", "urn:uuid:");
        assert!(XLink::from_field(empty).is_none());
        // an href outside the xlink namespace is not a cross-reference
        let foreign = Field::new("routeFormed", "aixm").with_attribute(None, "href", "urn:uuid:abc");
        assert!(XLink::from_field(foreign).is_none());
    }

    #[test]
    fn test_set_broken_is_idempotent() {
        let field = Field::new("theNavaid", "aixm").with_attribute(Some(XLINK_NS), "href", "uuid.X");
        let mut xlink = XLink::from_field(field).unwrap();
        xlink.set_broken();
        xlink.set_broken();
        assert!(xlink.is_broken());
    }

    #[test]
    fn test_extension() {
        let extension = Extension::new("RouteSegment", "bc430a08");
        assert_eq!(extension.name(), "theRouteSegment");
        assert_eq!(extension.field.prefix, EXTENSION_PREFIX);
        assert_eq!(extension.field.href(), Some("urn:uuid:bc430a08"));
        assert_eq!(Association::Extension(&extension).target(), "bc430a08");
    }
}

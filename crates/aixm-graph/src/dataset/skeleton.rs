//! Skeleton output: the indexed features written back as a reduced AIXM document.
//!
//! Only the identity of each feature, its extracted data fields, its cross-references, the
//! nested elements other features point at and the synthesized reverse associations are
//! written.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::parser::{is_archive, read_dataset};
use super::DatasetIndex;
use crate::aixm::feature::Feature;
use crate::aixm::field::{Extension, Field};
use crate::aixm::time_slice::TimeSlice;
use crate::aixm::{
    normalize_reference, split_clark_name, Element, ReaderEvent, BASIC_MESSAGE_TAG, GML_NS, SEQUENCE_TAG,
    XLINK_NS, XML_NS,
};
use crate::error::{Error, Result};

/// Used for the message elements when no member was found in the source.
const MESSAGE_PREFIX: &str = "message";
const MESSAGE_NS: &str = "http://www.aixm.aero/schema/5.1.1/message";

/// `Airspace.xml` gives `Airspace_skeleton.xml`; archives give an XML file next to them.
pub fn skeleton_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let name = match path.extension() {
        _ if is_archive(path) => format!("{stem}_skeleton.xml"),
        Some(ext) => format!("{stem}_skeleton.{}", ext.to_string_lossy()),
        None => format!("{stem}_skeleton"),
    };
    path.with_file_name(name)
}

impl DatasetIndex {
    /**
     * Write the skeleton file next to the source and return its path.
     *
     * The file is written once; later calls return the same path.
     */
    pub fn generate_skeleton(&mut self) -> Result<PathBuf> {
        if let Some(path) = &self.skeleton_path {
            return Ok(path.clone());
        }
        if !self.processed {
            return Err(Error::NotProcessed);
        }

        let properties = self.referenced_properties()?;
        let path = skeleton_path(&self.path);
        let write_error = |source| Error::Write {
            path: path.clone(),
            source,
        };

        let file = File::create(&path).map_err(write_error)?;
        let mut writer = BufWriter::new(file);
        self.write_document(&mut writer, &properties)
            .and_then(|_| writer.flush())
            .map_err(write_error)?;

        tracing::info!("Skeleton of {} written to {}", self.name(), path.display());
        self.skeleton_path = Some(path.clone());
        Ok(path)
    }

    /**
     * Serialize the skeleton document; the output only depends on the index content and,
     * for referenced nested elements, on the source they are read back from.
     */
    pub fn write_skeleton<W: Write>(&self, inner: W) -> Result<()> {
        let properties = self.referenced_properties()?;
        self.write_document(inner, &properties)
            .map_err(|source| Error::Write {
                path: skeleton_path(&self.path),
                source,
            })
    }

    /**
     * Subtrees of the nested elements other features reference, keyed by local id.
     *
     * The index keeps only their ids, so the source is streamed again when at least one
     * of them is referenced.
     */
    fn referenced_properties(&self) -> Result<HashMap<String, Element>> {
        let wanted = self
            .features
            .values()
            .flat_map(|feature| feature.gml_properties())
            .filter(|property| property.serializable)
            .map(|property| property.id.as_str())
            .collect::<HashSet<_>>();

        let mut found = HashMap::new();
        if wanted.is_empty() {
            return Ok(found);
        }

        tracing::debug!("Reading {} referenced elements back from {}", wanted.len(), self.name());
        read_dataset(&self.path, |event| {
            if let ReaderEvent::Member(member) = event {
                let slices = member
                    .children
                    .iter()
                    .flat_map(|feature| feature.children_named("timeSlice"))
                    .flat_map(|wrapper| wrapper.children.iter());
                for slice in slices {
                    for child in slice.children.iter() {
                        collect_properties(child, &wanted, &mut found);
                    }
                }
            }
            Ok(())
        })?;
        Ok(found)
    }

    fn write_document<W: Write>(&self, inner: W, properties: &HashMap<String, Element>) -> io::Result<()> {
        let namespaces = Namespaces::new(&self.namespaces, self.sequence_namespace.as_deref());
        let mut writer = SkeletonWriter {
            writer: Writer::new_with_indent(inner, b' ', 2),
            namespaces,
            properties,
        };

        writer.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let root = writer.namespaces.sequence_tag(BASIC_MESSAGE_TAG);
        let declarations = writer
            .namespaces
            .declarations
            .iter()
            .map(|(prefix, uri)| match prefix.as_str() {
                "" => ("xmlns".to_string(), uri.clone()),
                prefix => (format!("xmlns:{prefix}"), uri.clone()),
            })
            .collect::<Vec<_>>();
        writer.start(&root, &declarations)?;

        let member = writer.namespaces.sequence_tag(SEQUENCE_TAG);
        for feature in self.features.values() {
            writer.start(&member, &[])?;
            writer.feature(feature)?;
            writer.end(&member)?;
        }

        writer.end(&root)?;
        writer.writer.get_mut().write_all(b"\n")
    }
}

/// First element of each wanted local id; nested ids travel inside their ancestor.
fn collect_properties(element: &Element, wanted: &HashSet<&str>, found: &mut HashMap<String, Element>) {
    if let Some(id) = element.attribute(Some(GML_NS), "id").map(normalize_reference) {
        if wanted.contains(id) {
            found.entry(id.to_string()).or_insert_with(|| element.clone());
            return;
        }
    }
    for child in element.children.iter() {
        collect_properties(child, wanted, found);
    }
}

/// Prefix bindings of the skeleton document, all declared on the root element.
struct Namespaces {
    declarations: BTreeMap<String, String>,
    prefixes: HashMap<String, String>,
    sequence_prefix: String,
}

impl Namespaces {
    /// An empty `sequence_namespace` keeps the message elements unprefixed and out of any namespace.
    fn new(declared: &BTreeMap<String, String>, sequence_namespace: Option<&str>) -> Self {
        let sequence_namespace = sequence_namespace.unwrap_or(MESSAGE_NS);

        let mut declarations = declared.clone();
        // a prefix cannot be bound to the empty name
        declarations.retain(|_, uri| !uri.is_empty());
        if sequence_namespace.is_empty() {
            declarations.remove("");
        }

        let mut required = vec![("gml", GML_NS), ("xlink", XLINK_NS)];
        if !sequence_namespace.is_empty() {
            required.push((MESSAGE_PREFIX, sequence_namespace));
        }
        for (prefix, uri) in required {
            if !declarations.values().any(|value| value == uri) {
                let mut candidate = prefix.to_string();
                while declarations.contains_key(&candidate) {
                    candidate.push('_');
                }
                declarations.insert(candidate, uri.to_string());
            }
        }

        // sorted prefixes: the first named prefix of a namespace wins over the default one
        let mut prefixes = HashMap::<String, String>::new();
        prefixes.insert(XML_NS.to_string(), "xml".to_string());
        for (prefix, uri) in declarations.iter() {
            let bound = prefixes
                .get(uri)
                .is_some_and(|existing| !existing.is_empty() || prefix.is_empty());
            if !bound {
                prefixes.insert(uri.clone(), prefix.clone());
            }
        }

        let sequence_prefix = prefixes.get(sequence_namespace).cloned().unwrap_or_default();

        Namespaces {
            declarations,
            prefixes,
            sequence_prefix,
        }
    }

    fn prefix(&self, namespace: &str) -> &str {
        self.prefixes.get(namespace).map_or("", String::as_str)
    }

    fn sequence_tag(&self, name: &str) -> String {
        qualified(&self.sequence_prefix, name)
    }

    /// Attribute name of a `{namespace}local` key.
    fn attribute_name(&self, key: &str) -> String {
        match split_clark_name(key) {
            (Some(namespace), local) => match self.prefix(namespace) {
                "" => {
                    tracing::debug!("No prefix bound to {}, writing attribute {} unqualified", namespace, local);
                    local.to_string()
                }
                prefix => qualified(prefix, local),
            },
            (None, local) => local.to_string(),
        }
    }
}

fn qualified(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}:{name}")
    }
}

struct SkeletonWriter<'p, W: Write> {
    writer: Writer<W>,
    namespaces: Namespaces,
    properties: &'p HashMap<String, Element>,
}

impl<W: Write> SkeletonWriter<'_, W> {
    fn event(&mut self, event: Event<'_>) -> io::Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| io::Error::other(e.to_string()))
    }

    fn element<'a>(name: &'a str, attributes: &'a [(String, String)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for (key, value) in attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }
        start
    }

    fn start(&mut self, name: &str, attributes: &[(String, String)]) -> io::Result<()> {
        self.event(Event::Start(Self::element(name, attributes)))
    }

    fn end(&mut self, name: &str) -> io::Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn leaf(&mut self, name: &str, attributes: &[(String, String)], text: &str) -> io::Result<()> {
        if text.is_empty() {
            return self.event(Event::Empty(Self::element(name, attributes)));
        }
        self.start(name, attributes)?;
        self.event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn attributes(&self, attributes: &BTreeMap<String, String>) -> Vec<(String, String)> {
        attributes
            .iter()
            .map(|(key, value)| (self.namespaces.attribute_name(key), value.clone()))
            .collect()
    }

    fn field(&mut self, field: &Field) -> io::Result<()> {
        let attributes = self.attributes(&field.attributes);
        self.leaf(&qualified(&field.prefix, &field.name), &attributes, &field.text)
    }

    fn feature(&mut self, feature: &Feature) -> io::Result<()> {
        let gml = self.namespaces.prefix(GML_NS).to_string();
        let name = qualified(&feature.prefix, feature.type_name());

        self.start(&name, &[(qualified(&gml, "id"), format!("uuid.{}", feature.id))])?;
        self.leaf(
            &qualified(&gml, "identifier"),
            &[("codeSpace".to_string(), "urn:uuid:".to_string())],
            &feature.identifier,
        )?;
        for ts in feature.time_slices.values() {
            self.time_slice(feature, ts)?;
        }
        self.end(&name)
    }

    fn time_slice(&mut self, feature: &Feature, ts: &TimeSlice) -> io::Result<()> {
        let wrapper = qualified(ts.prefix(), "timeSlice");
        let name = qualified(ts.prefix(), &ts.element.name);
        let attributes = self.attributes(&ts.element.attributes);

        self.start(&wrapper, &[])?;
        self.start(&name, &attributes)?;
        for field in ts.data_fields.iter() {
            self.field(field)?;
        }
        for xlink in ts.xlinks.iter() {
            self.field(&xlink.field)?;
        }
        for property in ts.gml_properties.iter().filter(|property| property.serializable) {
            if let Some(element) = self.properties.get(&property.id) {
                self.subtree(element)?;
            }
        }
        for extension in ts.extensions.iter() {
            self.extension(feature, extension)?;
        }
        self.end(&name)?;
        self.end(&wrapper)
    }

    fn subtree(&mut self, element: &Element) -> io::Result<()> {
        let name = qualified(&element.prefix, &element.name);
        let attributes = self.attributes(&element.attributes);
        if element.is_leaf() {
            return self.leaf(&name, &attributes, &element.text);
        }

        self.start(&name, &attributes)?;
        if !element.text.is_empty() {
            self.event(Event::Text(BytesText::new(&element.text)))?;
        }
        for child in element.children.iter() {
            self.subtree(child)?;
        }
        self.end(&name)
    }

    /**
     * ```xml
     * <aixm:extension>
     *   <mxia:RouteExtension>
     *     <mxia:theRouteSegment xlink:href="urn:uuid:bc430a08"/>
     *   </mxia:RouteExtension>
     * </aixm:extension>
     * ```
     */
    fn extension(&mut self, feature: &Feature, extension: &Extension) -> io::Result<()> {
        let outer = qualified(&feature.prefix, "extension");
        let inner = qualified(&extension.field.prefix, &format!("{}Extension", feature.type_name()));

        self.start(&outer, &[])?;
        self.start(&inner, &[])?;
        self.field(&extension.field)?;
        self.end(&inner)?;
        self.end(&outer)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{document, member, processed, registry, write_dataset};
    use super::*;
    use crate::aixm::registry::FeatureTypeRegistry;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn members() -> Vec<String> {
        vec![
            member(
                "Airspace",
                "A1",
                r#"<aixm:type>CTR</aixm:type>
                   <aixm:clientNavaid xlink:href="urn:uuid:N1" xlink:title="R&amp;D"/>"#,
            ),
            member("Navaid", "N1", "<aixm:designator>FFM</aixm:designator>"),
        ]
    }

    /// Versions are only written back when they are part of the extracted fields.
    fn reloadable_registry() -> Arc<FeatureTypeRegistry> {
        Arc::new(
            FeatureTypeRegistry::from_json_str(
                r##"{
                    "Airspace": {"abbrev": "ASP", "color": "#336699", "shape": "box",
                                 "fields": {"names": ["sequenceNumber", "type"]}},
                    "Navaid": {"abbrev": "NAV", "color": "#336699", "shape": "box",
                               "fields": {"names": ["sequenceNumber", "designator"]}},
                    "RouteSegment": {"abbrev": "RS", "color": "#336699", "shape": "box",
                                     "fields": {"names": ["sequenceNumber"]}}
                }"##,
            )
            .unwrap(),
        )
    }

    fn skeleton(dataset: &DatasetIndex) -> String {
        let mut buffer = Vec::new();
        dataset.write_skeleton(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_skeleton_path() {
        assert_eq!(
            skeleton_path(Path::new("/data/Airspace.xml")),
            PathBuf::from("/data/Airspace_skeleton.xml")
        );
        assert_eq!(
            skeleton_path(Path::new("/data/Navaid.BASELINE")),
            PathBuf::from("/data/Navaid_skeleton.BASELINE")
        );
        assert_eq!(
            skeleton_path(Path::new("/data/Navaid.BASELINE.zip")),
            PathBuf::from("/data/Navaid.BASELINE_skeleton.xml")
        );
        assert_eq!(skeleton_path(Path::new("dataset")), PathBuf::from("dataset_skeleton"));
    }

    #[test]
    fn test_skeleton_content() {
        let dir = TempDir::new().unwrap();
        let dataset = processed(&dir, &members());
        let xml = skeleton(&dataset);

        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.ends_with("</message:AIXMBasicMessage>\n"));
        for fragment in [
            r#"<message:AIXMBasicMessage xmlns:aixm="http://www.aixm.aero/schema/5.1.1" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:message="http://www.aixm.aero/schema/5.1.1/message" xmlns:mxia="http://www.aixm.aero/schema/5.1.1/extensions/mxia" xmlns:xlink="http://www.w3.org/1999/xlink">"#,
            "<message:hasMember>",
            r#"<aixm:Airspace gml:id="uuid.A1">"#,
            r#"<gml:identifier codeSpace="urn:uuid:">A1</gml:identifier>"#,
            r#"<aixm:AirspaceTimeSlice gml:id="ts-A1">"#,
            "<aixm:type>CTR</aixm:type>",
            r#"<aixm:clientNavaid xlink:href="urn:uuid:N1" xlink:title="R&amp;D"/>"#,
            "<aixm:designator>FFM</aixm:designator>",
            "<aixm:extension>",
            "<mxia:NavaidExtension>",
            r#"<mxia:theAirspace xlink:href="urn:uuid:A1"/>"#,
        ] {
            assert!(xml.contains(fragment), "missing {fragment} in\n{xml}");
        }
        // fields outside the schema are not written
        assert!(!xml.contains("sequenceNumber"));
    }

    #[test]
    fn test_skeleton_is_deterministic() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        assert_eq!(
            skeleton(&processed(&first, &members())),
            skeleton(&processed(&second, &members()))
        );
    }

    #[test]
    fn test_generate_skeleton_once() {
        let dir = TempDir::new().unwrap();
        let mut dataset = processed(&dir, &members());

        let path = dataset.generate_skeleton().unwrap();
        assert_eq!(path, dir.path().join("dataset_skeleton.xml"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, skeleton(&dataset));

        std::fs::write(&path, "edited").unwrap();
        assert_eq!(dataset.generate_skeleton().unwrap(), path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited");
    }

    #[test]
    fn test_skeleton_before_process() {
        let dir = TempDir::new().unwrap();
        let mut dataset = DatasetIndex::new(dir.path().join("dataset.xml"), registry());
        assert!(matches!(dataset.generate_skeleton(), Err(Error::NotProcessed)));
    }

    #[test]
    fn test_skeleton_can_be_processed_again() {
        let registry = reloadable_registry();
        let dir = TempDir::new().unwrap();
        let source = write_dataset(&dir, &document(&members()));
        let mut dataset = DatasetIndex::new(source, registry.clone());
        dataset.process().unwrap();
        let path = dataset.generate_skeleton().unwrap();

        let mut reloaded = DatasetIndex::new(path, registry);
        reloaded.process().unwrap();
        assert_eq!(
            reloaded.features().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            dataset.features().map(|f| f.id.as_str()).collect::<Vec<_>>()
        );
        assert_eq!(reloaded.type_statistics(), dataset.type_statistics());
        assert!(reloaded.feature_by_id("A1").unwrap().matches_field_value("CTR"));
    }

    #[test]
    fn test_unprefixed_message_elements() {
        let dir = TempDir::new().unwrap();
        let xml = document(&members())
            .replace("message:", "")
            .replace(r#" xmlns:message="http://www.aixm.aero/schema/5.1.1/message""#, "");
        let mut dataset = DatasetIndex::new(write_dataset(&dir, &xml), reloadable_registry());
        dataset.process().unwrap();
        let xml = skeleton(&dataset);

        assert!(xml.contains(
            r#"<AIXMBasicMessage xmlns:aixm="http://www.aixm.aero/schema/5.1.1" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:mxia="http://www.aixm.aero/schema/5.1.1/extensions/mxia" xmlns:xlink="http://www.w3.org/1999/xlink">"#
        ), "{xml}");
        assert!(xml.contains("<hasMember>"));
        assert!(xml.ends_with("</AIXMBasicMessage>\n"));
        assert!(!xml.contains(r#"="""#));
        assert!(!xml.contains("message"));

        let path = dataset.generate_skeleton().unwrap();
        let mut reloaded = DatasetIndex::new(path, reloadable_registry());
        reloaded.process().unwrap();
        assert_eq!(reloaded.type_statistics(), dataset.type_statistics());
    }

    #[test]
    fn test_referenced_nested_element_is_written() {
        let dir = TempDir::new().unwrap();
        let source = write_dataset(
            &dir,
            &document(&[
                member(
                    "Navaid",
                    "N1",
                    r#"<aixm:designator>FFM</aixm:designator>
                       <aixm:location>
                         <aixm:ElevatedPoint gml:id="EP1"><gml:pos>50.05 8.63</gml:pos></aixm:ElevatedPoint>
                       </aixm:location>
                       <aixm:navaidEquipment>
                         <aixm:NavaidComponent gml:id="NC1">
                           <aixm:collocationGroup>1</aixm:collocationGroup>
                         </aixm:NavaidComponent>
                       </aixm:navaidEquipment>"#,
                ),
                member("RouteSegment", "RS1", r##"<aixm:start xlink:href="#NC1"/>"##),
            ]),
        );
        let mut dataset = DatasetIndex::new(source, reloadable_registry());
        dataset.process().unwrap();
        let xml = skeleton(&dataset);

        let component = xml.find(r#"<aixm:NavaidComponent gml:id="NC1">"#);
        assert!(component.is_some(), "missing component in\n{xml}");
        assert!(xml.contains("<aixm:collocationGroup>1</aixm:collocationGroup>"));
        // after the references, before the reverse associations
        assert!(component < xml.find("<mxia:NavaidExtension>"));
        assert!(!xml.contains("EP1"));

        let path = dataset.generate_skeleton().unwrap();
        let mut reloaded = DatasetIndex::new(path, reloadable_registry());
        reloaded.process().unwrap();
        assert!(!reloaded.feature_by_id("RS1").unwrap().has_broken_xlinks());
        assert_eq!(reloaded.feature_by_id("NC1").map(|f| f.id.as_str()), Some("N1"));
        assert_eq!(reloaded.type_statistics(), dataset.type_statistics());
    }
}

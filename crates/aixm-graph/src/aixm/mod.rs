//! AIXM (Aeronautical Information Exchange Model) feature model and XML plumbing.
//!
//! AIXM datasets are GML documents made of a flat sequence of `hasMember` elements, each
//! wrapping one feature with one or more time slices. This module provides the streaming
//! reader that cuts such a document into member subtrees, and the value types extracted
//! from them.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Display;
use std::path::{Path, PathBuf};

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::error::Error;

pub mod feature;
pub mod field;
pub mod registry;
pub mod time_slice;

pub const GML_NS: &str = "http://www.opengis.net/gml/3.2";
pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Namespace of the synthesized reverse-association elements.
pub const EXTENSION_PREFIX: &str = "mxia";
pub const EXTENSION_NS: &str = "http://www.aixm.aero/schema/5.1.1/extensions/mxia";

/// Local name of the elements wrapping each feature of a dataset.
pub const SEQUENCE_TAG: &str = "hasMember";
/// Local name of the root element of a (skeleton) dataset.
pub const BASIC_MESSAGE_TAG: &str = "AIXMBasicMessage";

/// Prefixes stripped from reference values, first match wins.
const HREF_PREFIXES: [&str; 4] = ["urn:uuid:", "urn:uuid.", "uuid.", "#"];

/// Builds the `{namespace}local` key under which attributes are stored.
pub fn clark_name(namespace: Option<&str>, local: &str) -> String {
    match namespace {
        Some(ns) => format!("{{{ns}}}{local}"),
        None => local.to_string(),
    }
}

/// Splits a `{namespace}local` key back into its parts.
pub fn split_clark_name(key: &str) -> (Option<&str>, &str) {
    key.strip_prefix('{')
        .and_then(|rest| rest.split_once('}'))
        .map_or((None, key), |(ns, local)| (Some(ns), local))
}

/// Strips the URN/URI decoration from a reference value.
pub fn normalize_reference(value: &str) -> &str {
    let value = value.trim();
    HREF_PREFIXES
        .iter()
        .find_map(|prefix| value.strip_prefix(prefix))
        .unwrap_or(value)
}

/// An XML element captured from a member subtree.
///
/// Detached from the reader: dropping it releases the subtree.
#[derive(Debug, Clone, Default)]
pub struct Element {
    pub prefix: String,
    pub name: String,
    pub namespace: Option<String>,
    /// Attributes keyed by their `{namespace}local` name.
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// First direct child with the given local name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    pub fn attribute(&self, namespace: Option<&str>, name: &str) -> Option<&str> {
        self.attributes.get(&clark_name(namespace, name)).map(String::as_str)
    }
}

/// What the member reader reports while moving through a document.
#[derive(Debug)]
pub enum ReaderEvent {
    /// A namespace declaration, anywhere in the document.
    Namespace { prefix: String, uri: String },
    /// A fully read `hasMember` element.
    Member(Element),
}

/**
 * Forward-only reader yielding namespace declarations and complete member subtrees.
 *
 * Only the member currently being read is held in memory; everything outside members is
 * skipped as soon as it has been scanned for namespace declarations.
 */
pub struct MemberReader<R: std::io::BufRead> {
    reader: Reader<R>,
    path: PathBuf,
    buf: Vec<u8>,
    /// Prefixes declared by each open element.
    scopes: Vec<Vec<(String, String)>>,
    /// Elements of the member being read, outermost first.
    open: Vec<Element>,
    pending: VecDeque<ReaderEvent>,
}

impl<R: std::io::BufRead> MemberReader<R> {
    pub fn new(inner: R, path: &Path) -> Self {
        MemberReader {
            reader: Reader::from_reader(inner),
            path: path.to_path_buf(),
            buf: Vec::new(),
            scopes: Vec::new(),
            open: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    fn error(&self, message: impl Display) -> Error {
        Error::Parse {
            path: self.path.clone(),
            position: self.reader.buffer_position() as u64,
            message: message.to_string(),
        }
    }

    fn resolve(&self, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NS.to_string());
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(declared, _)| declared == prefix)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    }

    /// Opens a namespace scope for the element and captures it.
    fn start_element(&mut self, e: &BytesStart) -> Result<Element, Error> {
        let mut declared = Vec::new();
        let mut raw_attributes = Vec::new();

        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(|err| self.error(err))?;
            let key = std::str::from_utf8(attr.key.as_ref()).map_err(|err| self.error(err))?;
            let value = attr.unescape_value().map_err(|err| self.error(err))?.to_string();

            if key == "xmlns" {
                declared.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declared.push((prefix.to_string(), value));
            } else {
                raw_attributes.push((key.to_string(), value));
            }
        }

        for (prefix, uri) in declared.iter() {
            self.pending.push_back(ReaderEvent::Namespace {
                prefix: prefix.clone(),
                uri: uri.clone(),
            });
        }
        self.scopes.push(declared);

        let qname = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| self.error(err))?
            .to_string();
        let (prefix, name) = qname.split_once(':').unwrap_or(("", qname.as_str()));

        let mut attributes = BTreeMap::new();
        for (key, value) in raw_attributes {
            // unprefixed attributes are never in the default namespace
            let resolved = key
                .split_once(':')
                .and_then(|(prefix, local)| self.resolve(prefix).map(|ns| clark_name(Some(&ns), local)));
            attributes.insert(resolved.unwrap_or(key), value);
        }

        Ok(Element {
            prefix: prefix.to_string(),
            name: name.to_string(),
            namespace: self.resolve(prefix),
            attributes,
            text: String::new(),
            children: Vec::new(),
        })
    }

    /// Closes the innermost open element; returns the member once it is complete.
    fn close_element(&mut self, mut element: Element) -> Option<Element> {
        if element.text.trim().is_empty() {
            element.text.clear();
        }
        match self.open.last_mut() {
            Some(parent) => {
                parent.children.push(element);
                None
            }
            None => Some(element),
        }
    }

    /// Only the text before the first child belongs to an element.
    fn push_text(&mut self, text: &str) {
        if let Some(current) = self.open.last_mut().filter(|current| current.is_leaf()) {
            current.text.push_str(text);
        }
    }

    /// Advances to the next namespace declaration or complete member.
    pub fn next_event(&mut self) -> Result<Option<ReaderEvent>, Error> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            self.buf.clear();
            let event = match self.reader.read_event_into(&mut self.buf).map(|e| e.into_owned()) {
                Ok(event) => event,
                Err(e) => return Err(self.error(e)),
            };

            match event {
                Event::Start(ref e) => {
                    let element = self.start_element(e)?;
                    if !self.open.is_empty() || element.name == SEQUENCE_TAG {
                        self.open.push(element);
                    }
                }
                Event::Empty(ref e) => {
                    let element = self.start_element(e)?;
                    self.scopes.pop();
                    if !self.open.is_empty() || element.name == SEQUENCE_TAG {
                        if let Some(member) = self.close_element(element) {
                            self.pending.push_back(ReaderEvent::Member(member));
                        }
                    }
                }
                Event::End(_) => {
                    self.scopes.pop();
                    if let Some(element) = self.open.pop() {
                        if let Some(member) = self.close_element(element) {
                            self.pending.push_back(ReaderEvent::Member(member));
                        }
                    }
                }
                Event::Text(ref e) if !self.open.is_empty() => {
                    let text = e.decode().map_err(|err| self.error(err))?.to_string();
                    self.push_text(&text);
                }
                Event::CData(ref e) if !self.open.is_empty() => {
                    let text = std::str::from_utf8(e).map_err(|err| self.error(err))?.to_string();
                    self.push_text(&text);
                }
                Event::GeneralRef(ref e) if !self.open.is_empty() => {
                    let resolved = match e.resolve_char_ref().map_err(|err| self.error(err))? {
                        Some(ch) => ch.to_string(),
                        None => {
                            let name = e.decode().map_err(|err| self.error(err))?.to_string();
                            match resolve_predefined_entity(&name) {
                                Some(value) => value.to_string(),
                                None => return Err(self.error(format!("unknown entity '&{name};'"))),
                            }
                        }
                    };
                    self.push_text(&resolved);
                }
                Event::Eof => {
                    if !self.open.is_empty() || !self.scopes.is_empty() {
                        return Err(self.error("unexpected end of document"));
                    }
                    return Ok(None);
                }
                _ => (),
            }
        }
    }
}

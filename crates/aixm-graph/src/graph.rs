//! Node/edge views of the indexed features, as served to the graph front-end.

use indexmap::IndexSet;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::hash::{Hash, Hasher};

use crate::aixm::feature::Feature;
use crate::aixm::registry::Shape;

/// An extracted field value, serialized as `{"name": "text"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    pub name: String,
    pub text: String,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.text)?;
        map.end()
    }
}

/**
 * A feature in a graph, or a ghost standing for a referenced feature that is not in the
 * dataset.
 *
 * Two nodes are the same node when their id, name and abbreviation match.
 */
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: String,
    /// Feature type name, or the reference tag for ghosts
    pub name: String,
    pub abbrev: String,
    pub fields: Vec<FieldValue>,
    pub color: Option<String>,
    pub shape: Option<Shape>,
    pub fields_concat: bool,
    pub is_ghost: bool,
    /// Cross-references and extensions over all time slices
    pub assoc_count: usize,
}

impl Node {
    pub fn from_feature(feature: &Feature) -> Self {
        let config = &feature.schema().config;
        Node {
            id: feature.id.clone(),
            name: feature.type_name().to_string(),
            abbrev: config.abbrev.clone(),
            fields: feature
                .data_fields()
                .map(|field| FieldValue {
                    name: field.name.clone(),
                    text: field.text.clone(),
                })
                .collect(),
            color: Some(config.color.clone()),
            shape: Some(config.shape),
            fields_concat: config.fields.concat,
            is_ghost: false,
            assoc_count: feature.associations().count(),
        }
    }

    /// Node of an unresolved reference: `id` is the reference target, `name` its tag.
    pub fn ghost(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Node {
            id: id.into(),
            abbrev: name.clone(),
            name,
            fields: Vec::new(),
            color: None,
            shape: None,
            fields_concat: false,
            is_ghost: true,
            assoc_count: 0,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name && self.abbrev == other.abbrev
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
        self.abbrev.hash(state);
    }
}

/// A labelled link between two nodes; `(a, b)` and `(b, a)` are the same edge.
#[derive(Debug, Clone, Serialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub name: String,
    pub is_broken: bool,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, name: impl Into<String>) -> Self {
        Edge {
            source: source.into(),
            target: target.into(),
            name: name.into(),
            is_broken: false,
        }
    }

    pub fn broken(source: impl Into<String>, target: impl Into<String>, name: impl Into<String>) -> Self {
        Edge {
            is_broken: true,
            ..Edge::new(source, target, name)
        }
    }

    fn endpoints(&self) -> (&str, &str) {
        if self.source <= self.target {
            (&self.source, &self.target)
        } else {
            (&self.target, &self.source)
        }
    }
}

impl PartialEq for Edge {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.endpoints() == other.endpoints()
    }
}

impl Eq for Edge {}

impl Hash for Edge {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.endpoints().hash(state);
        self.name.hash(state);
    }
}

/// Deduplicated nodes and edges, in discovery order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Graph {
    pub nodes: IndexSet<Node>,
    pub edges: IndexSet<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if an equal node was already there.
    pub fn add_node(&mut self, node: Node) -> bool {
        self.nodes.insert(node)
    }

    pub fn add_edge(&mut self, edge: Edge) -> bool {
        self.edges.insert(edge)
    }

    pub fn merge(&mut self, other: Graph) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /**
     * The feature with every feature it is associated with.
     *
     * `lookup` resolves an association target to an indexed feature. Edges are labelled
     * with the version of the time slice holding the association; unresolved targets give
     * a ghost node and a broken edge.
     */
    pub fn for_feature<'d, L>(feature: &Feature, lookup: L) -> Graph
    where
        L: Fn(&str) -> Option<&'d Feature>,
    {
        let mut graph = Graph::new();
        graph.add_node(Node::from_feature(feature));

        for (version, ts) in feature.time_slices.iter() {
            for association in ts.associations() {
                match lookup(association.target()) {
                    Some(target) => {
                        graph.add_node(Node::from_feature(target));
                        graph.add_edge(Edge::new(&feature.id, &target.id, version));
                    }
                    None => {
                        graph.add_node(Node::ghost(association.target(), association.name()));
                        graph.add_edge(Edge::broken(&feature.id, association.target(), version));
                    }
                }
            }
        }

        graph
    }

    /// Union of the graphs of at most `limit` features, after skipping the first `offset`.
    pub fn for_features<'f, 'd, I, L>(features: I, offset: usize, limit: usize, lookup: L) -> Graph
    where
        I: IntoIterator<Item = &'f Feature>,
        L: Fn(&str) -> Option<&'d Feature>,
    {
        features
            .into_iter()
            .skip(offset)
            .take(limit)
            .fold(Graph::new(), |mut graph, feature| {
                graph.merge(Graph::for_feature(feature, &lookup));
                graph
            })
    }
}

/// Offset of the page after `[offset, offset + limit)`, if there is one.
pub fn next_offset(offset: usize, limit: usize, size: usize) -> Option<usize> {
    let next = offset + limit;
    if next >= size || size <= limit {
        None
    } else {
        Some(next)
    }
}

pub fn prev_offset(offset: usize, limit: usize) -> Option<usize> {
    offset.checked_sub(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aixm::field::{Field, XLink};
    use crate::aixm::registry::{FeatureTypeConfig, FeatureTypeRegistry, FieldsConfig};
    use crate::aixm::time_slice::TimeSlice;
    use crate::aixm::XLINK_NS;
    use std::collections::HashMap;

    fn registry() -> FeatureTypeRegistry {
        FeatureTypeRegistry::new()
            .with_feature_type(
                "Airspace",
                FeatureTypeConfig {
                    abbrev: "ASP".to_string(),
                    color: "#ff0000".to_string(),
                    shape: Shape::Diamond,
                    fields: FieldsConfig {
                        names: vec!["type".to_string()],
                        concat: true,
                    },
                },
            )
            .with_feature_type(
                "Navaid",
                FeatureTypeConfig {
                    abbrev: "NAV".to_string(),
                    color: "#00ff00".to_string(),
                    shape: Shape::Dot,
                    fields: FieldsConfig::default(),
                },
            )
    }

    fn feature(feature_type: &str, id: &str, versions: &[(&str, &[&str])]) -> Feature {
        let schema = registry().lookup(feature_type).unwrap();
        let mut feature = Feature::new(id, id, "aixm", schema);
        for (version, targets) in versions {
            let xlinks = targets
                .iter()
                .filter_map(|target| {
                    XLink::from_field(Field::new("theTarget", "aixm").with_attribute(
                        Some(XLINK_NS),
                        "href",
                        format!("urn:uuid:{target}"),
                    ))
                })
                .collect();
            feature.insert_time_slice(TimeSlice {
                element: Field::new(format!("{feature_type}TimeSlice"), "aixm"),
                version: version.to_string(),
                data_fields: vec![Field::new("type", "aixm").with_text("CTR")],
                xlinks,
                extensions: Vec::new(),
                gml_properties: Vec::new(),
            });
        }
        feature
    }

    fn index(features: &[Feature]) -> HashMap<&str, &Feature> {
        features.iter().map(|f| (f.id.as_str(), f)).collect()
    }

    fn ids(graph: &Graph) -> Vec<&str> {
        graph.nodes.iter().map(|node| node.id.as_str()).collect()
    }

    #[test]
    fn test_edges_are_undirected() {
        let forward = Edge::new("A1", "N1", "1");
        let backward = Edge::broken("N1", "A1", "1");
        assert_eq!(forward, backward);

        let mut graph = Graph::new();
        assert!(graph.add_edge(forward));
        assert!(!graph.add_edge(backward));
        assert!(graph.add_edge(Edge::new("N1", "A1", "2")));
        assert_eq!(graph.edges.len(), 2);
    }

    #[test]
    fn test_node_identity() {
        let mut graph = Graph::new();
        assert!(graph.add_node(Node::ghost("X1", "theNavaid")));
        assert!(!graph.add_node(Node::ghost("X1", "theNavaid")));
        assert!(graph.add_node(Node::ghost("X1", "theRunway")));
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn test_graph_for_feature() {
        let features = vec![
            feature("Airspace", "A1", &[("1", &["N1", "X1"]), ("2", &["N1"])]),
            feature("Navaid", "N1", &[("1", &[])]),
        ];
        let index = index(&features);
        let graph = Graph::for_feature(&features[0], |id| index.get(id).copied());

        assert_eq!(ids(&graph), vec!["A1", "N1", "X1"]);
        let edges = graph
            .edges
            .iter()
            .map(|e| (e.source.as_str(), e.target.as_str(), e.name.as_str(), e.is_broken))
            .collect::<Vec<_>>();
        assert_eq!(
            edges,
            vec![("A1", "N1", "1", false), ("A1", "X1", "1", true), ("A1", "N1", "2", false)]
        );

        let airspace = &graph.nodes[0];
        assert_eq!(airspace.abbrev, "ASP");
        assert_eq!(airspace.shape, Some(Shape::Diamond));
        assert_eq!(airspace.assoc_count, 3);
        assert!(airspace.fields_concat);
        let ghost = &graph.nodes[2];
        assert!(ghost.is_ghost);
        assert_eq!(ghost.name, "theTarget");
        assert_eq!(ghost.abbrev, "theTarget");
    }

    #[test]
    fn test_pagination() {
        let features = (0..10)
            .map(|i| feature("Navaid", &format!("N{i}"), &[("1", &[])]))
            .collect::<Vec<_>>();
        fn lookup(_: &str) -> Option<&'static Feature> {
            None
        }

        let graph = Graph::for_features(features.iter(), 2, 3, lookup);
        assert_eq!(ids(&graph), vec!["N2", "N3", "N4"]);

        assert!(Graph::for_features(features.iter(), 10, 3, lookup).is_empty());
        assert_eq!(Graph::for_features(features.iter(), 8, 5, lookup).nodes.len(), 2);
    }

    #[test]
    fn test_offsets() {
        assert_eq!(next_offset(0, 10, 25), Some(10));
        assert_eq!(next_offset(20, 10, 25), None);
        assert_eq!(next_offset(0, 10, 10), None);
        assert_eq!(next_offset(0, 10, 5), None);
        assert_eq!(prev_offset(20, 10), Some(10));
        assert_eq!(prev_offset(5, 10), None);
    }

    #[test]
    fn test_serialize_graph() {
        let features = vec![feature("Airspace", "A1", &[("1", &["X1"])])];
        let graph = Graph::for_feature(&features[0], |_| None);

        let json = serde_json::to_value(&graph).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "nodes": [
                    {
                        "id": "A1",
                        "name": "Airspace",
                        "abbrev": "ASP",
                        "fields": [{"type": "CTR"}],
                        "color": "#ff0000",
                        "shape": "diamond",
                        "fields_concat": true,
                        "is_ghost": false,
                        "assoc_count": 1
                    },
                    {
                        "id": "X1",
                        "name": "theTarget",
                        "abbrev": "theTarget",
                        "fields": [],
                        "color": null,
                        "shape": null,
                        "fields_concat": false,
                        "is_ghost": true,
                        "assoc_count": 0
                    }
                ],
                "edges": [{"source": "A1", "target": "X1", "name": "1", "is_broken": true}]
            })
        );
    }
}

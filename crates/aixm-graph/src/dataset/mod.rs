//! In-memory index of an AIXM dataset.
//!
//! A [`DatasetIndex`] is filled once by [`DatasetIndex::process`]: the source file is
//! streamed member by member, every feature is indexed by its id, cross-references are
//! resolved into reverse associations and per-type statistics are computed. After that the
//! index is only read, to build graphs or to write the skeleton file.

use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::aixm::feature::Feature;
use crate::aixm::registry::FeatureTypeRegistry;
use crate::aixm::{normalize_reference, EXTENSION_NS, EXTENSION_PREFIX};
use crate::error::Result;
use crate::graph::Graph;

mod parser;
mod resolver;
mod skeleton;
pub mod statistics;

pub use statistics::TypeStatistics;

/**
 * All the features of one dataset file, indexed by id.
 *
 * Each index is self-contained: several datasets can be processed at the same time on
 * separate instances.
 */
#[derive(Debug)]
pub struct DatasetIndex {
    path: PathBuf,
    registry: Arc<FeatureTypeRegistry>,
    /// Features by gml id, in document order
    features: IndexMap<String, Feature>,
    /// `gml:identifier` to gml id
    identifiers: HashMap<String, String>,
    /// gml id of nested elements to the gml id of their feature
    local_ids: HashMap<String, String>,
    /// Every namespace declared in the source, by prefix
    namespaces: BTreeMap<String, String>,
    /// Namespace of the `hasMember` elements
    sequence_namespace: Option<String>,
    statistics: BTreeMap<String, TypeStatistics>,
    processed: bool,
    resolved: bool,
    skeleton_path: Option<PathBuf>,
}

impl DatasetIndex {
    pub fn new<P: AsRef<Path>>(path: P, registry: Arc<FeatureTypeRegistry>) -> Self {
        DatasetIndex {
            path: path.as_ref().to_path_buf(),
            registry,
            features: IndexMap::new(),
            identifiers: HashMap::new(),
            local_ids: HashMap::new(),
            namespaces: default_namespaces(),
            sequence_namespace: None,
            statistics: BTreeMap::new(),
            processed: false,
            resolved: false,
            skeleton_path: None,
        }
    }

    /// Base name of the dataset file.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &FeatureTypeRegistry {
        &self.registry
    }

    /**
     * Parse the dataset, create the reverse associations and compute the statistics.
     *
     * Runs once: later calls return immediately. On error the index is emptied and
     * should be discarded.
     */
    pub fn process(&mut self) -> Result<()> {
        if self.processed {
            tracing::debug!("Dataset {} already processed", self.name());
            return Ok(());
        }

        if let Err(e) = self.parse() {
            self.reset();
            return Err(e);
        }
        self.resolve_reverse_links();
        self.statistics = statistics::compute_statistics(self.features.values());
        self.processed = true;

        tracing::info!(
            "Processed dataset {}: {} features of {} types",
            self.name(),
            self.features.len(),
            self.statistics.len()
        );
        Ok(())
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    fn reset(&mut self) {
        self.features.clear();
        self.identifiers.clear();
        self.local_ids.clear();
        self.namespaces = default_namespaces();
        self.sequence_namespace = None;
        self.statistics.clear();
        self.resolved = false;
    }

    /// Insert a feature, replacing any earlier feature with the same id.
    pub(crate) fn index_feature(&mut self, feature: Feature) {
        if !feature.identifier.is_empty() {
            self.identifiers.insert(feature.identifier.clone(), feature.id.clone());
        }
        for property in feature.gml_properties() {
            self.local_ids.insert(property.id.clone(), feature.id.clone());
        }
        if let Some(previous) = self.features.insert(feature.id.clone(), feature) {
            tracing::warn!("Duplicate feature id '{}' ({}), keeping the last one", previous.id, previous.type_name());
        }
    }

    /// Key of the feature a reference points to: gml id, then identifier, then nested gml id.
    fn resolve_key(&self, id: &str) -> Option<&str> {
        self.resolve_reference(id).map(|(key, _)| key)
    }

    /// Like [`Self::resolve_key`], with the nested gml id when the reference matched one.
    pub(crate) fn resolve_reference(&self, id: &str) -> Option<(&str, Option<&str>)> {
        let id = normalize_reference(id);
        if let Some((key, _)) = self.features.get_key_value(id) {
            return Some((key.as_str(), None));
        }
        if let Some(key) = self.identifiers.get(id).filter(|key| self.features.contains_key(*key)) {
            return Some((key.as_str(), None));
        }
        self.local_ids
            .get_key_value(id)
            .filter(|(_, key)| self.features.contains_key(*key))
            .map(|(local, key)| (key.as_str(), Some(local.as_str())))
    }

    /// All features, in document order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_by_id(&self, id: &str) -> Option<&Feature> {
        self.resolve_key(id).and_then(|key| self.features.get(key))
    }

    /// Features of a type, optionally restricted to those with a data field containing `key`.
    ///
    /// An empty `key` does not filter.
    pub fn features_by_type<'a>(
        &'a self,
        name: &'a str,
        key: Option<&'a str>,
    ) -> impl Iterator<Item = &'a Feature> + 'a {
        let key = key.filter(|key| !key.is_empty());
        self.features
            .values()
            .filter(move |feature| feature.type_name() == name)
            .filter(move |feature| key.map_or(true, |key| feature.matches_field_value(key)))
    }

    pub fn has_feature_type(&self, name: &str) -> bool {
        self.features.values().any(|feature| feature.type_name() == name)
    }

    /// Per-type feature counts; empty until [`DatasetIndex::process`] has run.
    pub fn type_statistics(&self) -> &BTreeMap<String, TypeStatistics> {
        &self.statistics
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    pub fn sequence_namespace(&self) -> Option<&str> {
        self.sequence_namespace.as_deref()
    }

    /// Graph of a feature and everything it is associated with.
    ///
    /// Only meaningful once the dataset has been processed.
    pub fn graph_for(&self, feature: &Feature) -> Graph {
        Graph::for_feature(feature, |id| self.feature_by_id(id))
    }

    /// Union of the graphs of `limit` features, after skipping `offset` of them.
    pub fn graph_for_features<'a, I>(&'a self, features: I, offset: usize, limit: usize) -> Graph
    where
        I: IntoIterator<Item = &'a Feature>,
    {
        Graph::for_features(features, offset, limit, |id| self.feature_by_id(id))
    }
}

fn default_namespaces() -> BTreeMap<String, String> {
    BTreeMap::from([(EXTENSION_PREFIX.to_string(), EXTENSION_NS.to_string())])
}

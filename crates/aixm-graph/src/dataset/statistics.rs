use serde::Serialize;
use std::collections::BTreeMap;

use crate::aixm::feature::Feature;

/// Feature counts of one feature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct TypeStatistics {
    pub size: usize,
    /// Features with at least one broken cross-reference
    pub broken_count: usize,
}

/// Count the features of each type, in a single pass.
pub fn compute_statistics<'a>(features: impl Iterator<Item = &'a Feature>) -> BTreeMap<String, TypeStatistics> {
    let mut statistics = BTreeMap::<String, TypeStatistics>::new();
    for feature in features {
        let entry = statistics.entry(feature.type_name().to_string()).or_default();
        entry.size += 1;
        if feature.has_broken_xlinks() {
            entry.broken_count += 1;
        }
    }
    statistics
}

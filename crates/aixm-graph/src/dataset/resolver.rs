use super::DatasetIndex;

/// A reference to create on a target feature, pointing back at its source.
struct ReverseLink {
    target: String,
    source_type: String,
    source_id: String,
    /// Nested element of the target the reference points at
    local_id: Option<String>,
}

/// Position of an unresolved cross-reference: feature index, time slice version, xlink index.
type XLinkPosition = (usize, String, usize);

impl DatasetIndex {
    /**
     * Create the reverse associations of every cross-reference in the index.
     *
     * A reference whose target is indexed gives the target an extension back to the source
     * feature on each of its time slices; any other reference is flagged broken. Resolution
     * runs once per index: a second call changes nothing.
     */
    pub(crate) fn resolve_reverse_links(&mut self) {
        if self.resolved {
            tracing::debug!("References of {} already resolved", self.name());
            return;
        }

        let mut links = Vec::new();
        let mut broken: Vec<XLinkPosition> = Vec::new();

        for (position, feature) in self.features.values().enumerate() {
            for (version, ts) in feature.time_slices.iter() {
                for (i, xlink) in ts.xlinks.iter().enumerate() {
                    match self.resolve_reference(&xlink.target) {
                        Some((target, local_id)) => links.push(ReverseLink {
                            target: target.to_string(),
                            source_type: feature.type_name().to_string(),
                            source_id: feature.id.clone(),
                            local_id: local_id.map(str::to_string),
                        }),
                        None => broken.push((position, version.clone(), i)),
                    }
                }
            }
        }

        for (position, version, i) in broken.iter() {
            if let Some(xlink) = self
                .features
                .get_index_mut(*position)
                .and_then(|(_, feature)| feature.time_slices.get_mut(version))
                .and_then(|ts| ts.xlinks.get_mut(*i))
            {
                tracing::trace!("Broken reference {} to '{}'", xlink.name(), xlink.target);
                xlink.set_broken();
            }
        }

        for link in links.iter() {
            if let Some(target) = self.features.get_mut(&link.target) {
                target.add_reverse_association(&link.source_type, &link.source_id);
                if let Some(local_id) = &link.local_id {
                    target.mark_referenced_property(local_id);
                }
            }
        }

        if !broken.is_empty() {
            tracing::warn!("{} broken references in {}", broken.len(), self.name());
        }
        tracing::debug!("Created {} reverse associations in {}", links.len(), self.name());
        self.resolved = true;
    }
}

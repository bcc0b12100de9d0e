use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use zip::read::ZipArchive;

use super::DatasetIndex;
use crate::aixm::feature::Feature;
use crate::aixm::{MemberReader, ReaderEvent};
use crate::error::{Error, Result};

/// Archive entries holding AIXM documents.
const ARCHIVE_ENTRY_SUFFIXES: [&str; 2] = [".xml", ".BASELINE"];

pub(crate) fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

/**
 * Stream a dataset file, or every AIXM entry of a ZIP archive, through a [`MemberReader`].
 *
 * Each namespace declaration and complete member is handed to `on_event`, then dropped.
 */
pub(crate) fn read_dataset<F>(path: &Path, mut on_event: F) -> Result<()>
where
    F: FnMut(ReaderEvent) -> Result<()>,
{
    let file = File::open(path).map_err(|source| Error::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if !is_archive(path) {
        return read_stream(BufReader::new(file), path, &mut on_event);
    }

    let mut archive = ZipArchive::new(file)?;
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !ARCHIVE_ENTRY_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            tracing::debug!("Skipping archive entry {}", name);
            continue;
        }
        tracing::debug!("Reading archive entry {}", name);
        read_stream(BufReader::new(entry), &path.join(&name), &mut on_event)?;
    }
    Ok(())
}

fn read_stream<R, F>(inner: R, source: &Path, on_event: &mut F) -> Result<()>
where
    R: BufRead,
    F: FnMut(ReaderEvent) -> Result<()>,
{
    let mut reader = MemberReader::new(inner, source);
    while let Some(event) = reader.next_event()? {
        on_event(event)?;
    }
    Ok(())
}

impl DatasetIndex {
    /// Stream the source into the index, one member at a time.
    pub(crate) fn parse(&mut self) -> Result<()> {
        let path = self.path.clone();
        tracing::info!("Parsing dataset {}", path.display());

        read_dataset(&path, |event| self.index_event(event))?;

        tracing::debug!("Indexed {} features from {}", self.features.len(), path.display());
        Ok(())
    }

    fn index_event(&mut self, event: ReaderEvent) -> Result<()> {
        match event {
            ReaderEvent::Namespace { prefix, uri } => {
                self.namespaces.insert(prefix, uri);
            }
            ReaderEvent::Member(member) => {
                if self.sequence_namespace.is_none() {
                    self.sequence_namespace = Some(member.namespace.clone().unwrap_or_default());
                }
                let feature = Feature::from_member(&member, &self.registry)?;
                drop(member);
                self.index_feature(feature);
            }
        }
        Ok(())
    }
}

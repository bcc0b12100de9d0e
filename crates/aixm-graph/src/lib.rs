//! Streaming ingestion of AIXM datasets into a cross-referenced feature index, from which
//! association graphs and reduced "skeleton" documents are derived.
//!
//! ```no_run
//! use std::sync::Arc;
//! use aixm_graph::{DatasetIndex, FeatureTypeRegistry};
//!
//! # fn main() -> aixm_graph::Result<()> {
//! let registry = Arc::new(FeatureTypeRegistry::from_json_file("features_config.json")?);
//! let mut dataset = DatasetIndex::new("Airspace.BASELINE.zip", registry);
//! dataset.process()?;
//!
//! for (name, stats) in dataset.type_statistics() {
//!     println!("{name}: {} features, {} with broken references", stats.size, stats.broken_count);
//! }
//! println!("Skeleton written to {}", dataset.generate_skeleton()?.display());
//! # Ok(())
//! # }
//! ```

pub mod aixm;
pub mod dataset;
pub mod error;
pub mod graph;

pub use aixm::feature::Feature;
pub use aixm::registry::{FeatureType, FeatureTypeConfig, FeatureTypeRegistry, Shape};
pub use dataset::{DatasetIndex, TypeStatistics};
pub use error::{Error, Result};
pub use graph::{next_offset, prev_offset, Edge, Graph, Node};

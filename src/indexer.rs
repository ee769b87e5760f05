//! High-level indexing pipeline
//!
//! The [`Indexer`] ties the pieces together: it walks a tileset through a
//! [`Walker`], decodes every visited payload, resolves one representative
//! position per batched feature, and assembles the final row table plus the
//! configured per-property indexes. Features accumulate in a concurrent map
//! keyed by the configured id property; when two tiles claim the same id the
//! later write wins.

use crate::builders::{IndexBuilder, IndexKind, new_builder, render_value};
use crate::geometry::Cartographic;
use crate::mesh::{GeometryResolver, MeshAttributeReader};
use crate::source::Source;
use crate::walker::{TileVisitor, Walker, WalkerOptions};
use crate::writer::Writer;
use crate::{BatchPayload, Result, Tile};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use glam::DMat4;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Build configuration for one indexing run
#[derive(Clone, Debug)]
pub struct Config {
    /// Batch-table property whose value identifies a feature
    pub id_property: String,
    /// Indexes to build: (property name, index kind)
    pub indexes: Vec<(String, IndexKind)>,
    /// Traversal tuning
    pub walker: WalkerOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_property: "id".to_string(),
            indexes: Vec::new(),
            walker: WalkerOptions::default(),
        }
    }
}

/// One extracted feature: its batch-table properties and representative
/// geographic position
#[derive(Clone, Debug)]
pub struct TilesetFeature {
    /// Batch-table properties of the feature
    pub properties: HashMap<String, Value>,
    /// Bounding-rectangle center; the height field carries the feature's
    /// vertical extent
    pub position: Cartographic,
}

/// Output of a completed build: the finalized index builders and the flat
/// row table, ordered by feature id
pub struct IndexResult {
    /// Finalized per-property indexes, in configuration order
    pub builders: Vec<Box<dyn IndexBuilder>>,
    /// One record per feature: id, position columns, and the rendered value
    /// of every indexed property
    pub data: Vec<HashMap<String, String>>,
}

impl IndexResult {
    /// Number of features in the row table
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the build produced no features
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Visitor that decodes payloads and accumulates features during the walk
struct FeatureCollector {
    id_property: String,
    resolver: GeometryResolver,
    features: DashMap<String, TilesetFeature>,
}

#[async_trait]
impl TileVisitor for FeatureCollector {
    async fn visit(&self, path: &str, _tile: &Tile, world: DMat4, content: Bytes) -> Result<()> {
        let payload = BatchPayload::decode(&content)?;
        let positions = self.resolver.resolve(&payload, &world)?;
        tracing::debug!(
            path,
            batches = payload.batch_length,
            positioned = positions.len(),
            "decoded tile payload"
        );

        for batch_id in 0..payload.batch_length {
            let Some(id_value) = payload.property(&self.id_property, batch_id) else {
                tracing::warn!(
                    path,
                    batch_id,
                    property = self.id_property.as_str(),
                    "batch lacks the id property, skipping"
                );
                continue;
            };
            let Some(id) = render_value(id_value) else {
                tracing::warn!(path, batch_id, "batch id value is null, skipping");
                continue;
            };
            let Some(position) = positions.get(&(batch_id as u32)) else {
                tracing::debug!(path, batch_id, "batch has no vertices, skipping");
                continue;
            };

            // Last write wins when the same id appears in multiple tiles
            self.features.insert(
                id,
                TilesetFeature {
                    properties: payload.properties_of(batch_id),
                    position: *position,
                },
            );
        }
        Ok(())
    }
}

/// Orchestrates a full walk-decode-index run over one tileset
pub struct Indexer {
    config: Config,
    resolver: GeometryResolver,
}

impl Indexer {
    /// Create an indexer for the given configuration
    pub fn new(config: Config) -> Indexer {
        Indexer {
            config,
            resolver: GeometryResolver::default(),
        }
    }

    /// Accept Draco-compressed content by decoding it with `reader`
    pub fn with_compressed_reader(mut self, reader: Arc<dyn MeshAttributeReader>) -> Self {
        self.resolver = GeometryResolver::new(Some(reader));
        self
    }

    /// Walk the tileset rooted at `root_path` and build the configured
    /// indexes plus the row table
    pub async fn build(&self, source: Arc<dyn Source>, root_path: &str) -> Result<IndexResult> {
        let collector = Arc::new(FeatureCollector {
            id_property: self.config.id_property.clone(),
            resolver: self.resolver.clone(),
            features: DashMap::new(),
        });

        let walker = Walker::new(source, self.config.walker);
        walker.walk(root_path, collector.clone()).await?;

        tracing::info!(features = collector.features.len(), "walk complete");
        Ok(self.assemble(&collector.features))
    }

    /// Build and hand the result to `writer`; nothing is written when the
    /// build fails
    pub async fn build_and_write(
        &self,
        source: Arc<dyn Source>,
        root_path: &str,
        writer: &dyn Writer,
    ) -> Result<()> {
        let result = self.build(source, root_path).await?;
        writer.write(&result).await
    }

    /// Turn the accumulated feature map into row-ordered output
    ///
    /// Rows are ordered by feature id so repeated builds over the same data
    /// produce identical output.
    fn assemble(&self, features: &DashMap<String, TilesetFeature>) -> IndexResult {
        let ordered: BTreeMap<String, TilesetFeature> = features
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut builders: Vec<Box<dyn IndexBuilder>> = self
            .config
            .indexes
            .iter()
            .map(|(property, kind)| new_builder(property, *kind))
            .collect();

        let mut data = Vec::with_capacity(ordered.len());
        for (row, (id, feature)) in ordered.into_iter().enumerate() {
            let mut record = HashMap::new();
            record.insert(self.config.id_property.clone(), id);
            record.insert(
                "Longitude".to_string(),
                format!("{:.5}", feature.position.longitude_degrees()),
            );
            record.insert(
                "Latitude".to_string(),
                format!("{:.5}", feature.position.latitude_degrees()),
            );
            record.insert("Height".to_string(), format!("{:.3}", feature.position.height));

            for builder in &mut builders {
                let value = feature
                    .properties
                    .get(builder.property())
                    .cloned()
                    .unwrap_or(Value::Null);
                builder.add_value(row, &value);
                if let Some(rendered) = render_value(&value) {
                    record.insert(builder.property().to_string(), rendered);
                }
            }
            data.push(record);
        }

        for builder in &mut builders {
            builder.finalize();
        }
        IndexResult { builders, data }
    }
}

//! Persistence boundary for built indexes
//!
//! The assembler hands a finished [`IndexResult`] to a [`Writer`]; everything
//! about the storage format lives behind this trait. [`JsonWriter`] is the
//! built-in implementation and serializes the row table plus every index
//! into a single JSON document.

use crate::indexer::IndexResult;
use crate::{Error, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Persists a completed build
#[async_trait]
pub trait Writer: Send + Sync {
    /// Write the result; called at most once per build, and only after the
    /// whole walk succeeded
    async fn write(&self, result: &IndexResult) -> Result<()>;
}

/// Writes the result as one pretty-printed JSON document
#[derive(Clone, Debug)]
pub struct JsonWriter {
    path: PathBuf,
}

impl JsonWriter {
    /// Write to the given file path, replacing any existing file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn render(result: &IndexResult) -> serde_json::Value {
        serde_json::json!({
            "featureCount": result.len(),
            "data": result.data,
            "indexes": result
                .builders
                .iter()
                .map(|builder| builder.to_json())
                .collect::<Vec<_>>(),
        })
    }
}

#[async_trait]
impl Writer for JsonWriter {
    async fn write(&self, result: &IndexResult) -> Result<()> {
        let document = Self::render(result);
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| Error::Write(e.to_string()))?;
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::Write(format!("{}: {e}", self.path.display())))?;
        tracing::info!(
            path = %self.path.display(),
            features = result.len(),
            "index written"
        );
        Ok(())
    }
}

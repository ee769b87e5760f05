//! Tileset Indexer - Attribute Index Extraction for 3D Tiles Datasets
//!
//! This library walks a Cesium-style 3D Tiles tileset, decodes every batched
//! 3D model payload (`.b3dm`) it references, computes one representative
//! geographic position per batched feature, and accumulates per-property
//! value-to-row indexes plus a flat row table that downstream storage can
//! persist.
//!
//! # Architecture
//!
//! - **[`Tileset`]**: Immutable in-memory tree parsed from `tileset.json`
//! - **[`Walker`]**: Concurrent tile-tree traversal with bounded fan-out and retry
//! - **[`BatchPayload`]**: Decoded b3dm content (feature table, batch table, embedded glTF)
//! - **[`Indexer`]**: High-level pipeline producing an [`IndexResult`]
//! - **[`IndexBuilder`]**: Per-property value-to-row-id index accumulation
//!
//! # Concurrency
//!
//! The walk runs on parallel tokio tasks. Fan-out is bounded by a single
//! global semaphore shared across the whole traversal, and the only shared
//! mutable state is the feature map inside the [`Indexer`]. Cancel a build by
//! dropping its future.

mod b3dm;
mod builders;
#[cfg(test)]
mod fixtures;
pub mod geometry;
mod indexer;
mod mesh;
mod source;
mod tileset;
mod walker;
mod writer;

// Public API exports
pub use b3dm::BatchPayload;
pub use builders::{EnumIndexBuilder, IndexBuilder, IndexKind};
pub use geometry::{Cartographic, Rectangle};
pub use indexer::{Config, IndexResult, Indexer, TilesetFeature};
pub use mesh::{GeometryResolver, MeshAttributeReader, PlainAttributeReader, PrimitiveAttributes};
pub use source::{LocalSource, MemorySource, Source};
pub use tileset::{Tile, Tileset};
pub use walker::{TileVisitor, Walker, WalkerOptions};
pub use writer::{JsonWriter, Writer};

/// Error types for the indexing pipeline
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed tileset descriptor or batch payload. Fatal for the build.
    #[error("parse error: {0}")]
    Parse(String),

    /// Tile content (or the root descriptor) could not be found.
    /// Subject to the walker's retry policy before becoming fatal.
    #[error("not found: {0}")]
    NotFound(String),

    /// Read failure on tile content. Subject to the walker's retry policy.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// glTF document error inside a batch payload.
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),

    /// A capability the content requires is not available in this
    /// configuration (e.g. Draco-compressed mesh attributes without a
    /// compressed-attribute reader).
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// One or more child tiles failed after retries were exhausted. Produced
    /// only after all siblings finished.
    #[error("{} tile(s) failed under '{uri}': {first}", errors.len())]
    Subtree {
        /// Content URI (or "<root>") of the tile whose children failed
        uri: String,
        /// First collected child error, for display
        first: String,
        /// All collected child errors
        errors: Vec<Error>,
    },

    /// A spawned walker task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),

    /// Writer collaborator failure while persisting a built index.
    #[error("write error: {0}")]
    Write(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

impl Error {
    /// Whether the walker should retry the operation that produced this error.
    /// Only content I/O is transient; format and capability errors are not.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Error::Io(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

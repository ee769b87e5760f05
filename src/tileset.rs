//! Tileset descriptor parsing
//!
//! Parses a 3D Tiles `tileset.json` document into an immutable in-memory
//! tree. The raw serde model mirrors the descriptor, and the public
//! [`Tileset`]/[`Tile`] types hold the decoded form: column-major transforms
//! as matrices, children behind `Arc` so the concurrent walker can hand
//! subtrees to spawned tasks.

use crate::{Error, Result};
use glam::DMat4;
use serde::Deserialize;
use std::sync::Arc;

/// Hierarchical description of a tiled 3D dataset. Immutable once parsed.
#[derive(Clone, Debug)]
pub struct Tileset {
    /// Root tile of the hierarchy
    pub root: Arc<Tile>,
    /// Top-level geometric error, when declared
    pub geometric_error: Option<f64>,
}

/// One node in the tileset tree. Read-only after parsing.
#[derive(Clone, Debug, Default)]
pub struct Tile {
    /// Local transform (column-major in the descriptor); `None` means identity
    pub transform: Option<DMat4>,
    /// Content reference: a batch payload or a nested tileset descriptor
    pub content_uri: Option<String>,
    /// Ordered child tiles; empty for leaves
    pub children: Vec<Arc<Tile>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTileset {
    root: Option<RawTile>,
    geometric_error: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTile {
    transform: Option<Vec<f64>>,
    content: Option<RawContent>,
    children: Option<Vec<RawTile>>,
}

/// 3D Tiles 1.0 uses `uri`; pre-1.0 datasets in the wild still carry `url`.
#[derive(Deserialize)]
struct RawContent {
    uri: Option<String>,
    url: Option<String>,
}

impl Tileset {
    /// Parse a tileset descriptor from its raw bytes
    ///
    /// Fails with [`Error::Parse`] when the document is not well-formed JSON
    /// or lacks a root tile. No side effects beyond allocation.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: RawTileset = serde_json::from_slice(bytes)?;
        let root = raw
            .root
            .ok_or_else(|| Error::Parse("tileset descriptor has no root tile".to_string()))?;

        Ok(Self {
            root: Arc::new(Tile::from_raw(root)?),
            geometric_error: raw.geometric_error,
        })
    }
}

impl Tile {
    fn from_raw(raw: RawTile) -> Result<Self> {
        let transform = match raw.transform {
            Some(values) => Some(decode_transform(&values)?),
            None => None,
        };

        let content_uri = raw.content.and_then(|c| c.uri.or(c.url));

        let children = raw
            .children
            .unwrap_or_default()
            .into_iter()
            .map(|child| Tile::from_raw(child).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            transform,
            content_uri,
            children,
        })
    }

    /// Whether this tile's content reference points at a nested tileset
    /// descriptor rather than a batch payload
    pub fn content_is_tileset(&self) -> bool {
        self.content_uri
            .as_deref()
            .map(|uri| {
                // Strip any query string before checking the suffix
                let path = uri.split('?').next().unwrap_or(uri);
                path.ends_with(".json")
            })
            .unwrap_or(false)
    }

    /// Whether this tile has no children
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Decode a 16-element column-major transform array
fn decode_transform(values: &[f64]) -> Result<DMat4> {
    let array: &[f64; 16] = values.try_into().map_err(|_| {
        Error::Parse(format!(
            "tile transform must have 16 elements, got {}",
            values.len()
        ))
    })?;
    Ok(DMat4::from_cols_array(array))
}

//! Content sources for tileset descriptors and tile payloads
//!
//! The walker fetches every piece of content through the [`Source`] trait so
//! the pipeline stays independent of where a dataset lives. [`LocalSource`]
//! serves a dataset rooted at a local directory; [`MemorySource`] backs tests
//! and embedded fixtures.

use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::PathBuf;

/// Read access to tileset content by reference path
#[async_trait]
pub trait Source: Send + Sync {
    /// Fetch the content at `path`, relative to the source root.
    ///
    /// Missing content surfaces as [`Error::NotFound`]; transport failures as
    /// [`Error::Io`]. Both are subject to the walker's retry policy.
    async fn open(&self, path: &str) -> Result<Bytes>;
}

/// Source backed by a local directory
#[derive(Clone, Debug)]
pub struct LocalSource {
    base: PathBuf,
}

impl LocalSource {
    /// Create a source rooted at the given directory
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl Source for LocalSource {
    async fn open(&self, path: &str) -> Result<Bytes> {
        let full = self.base.join(path);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(full.display().to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// In-memory source for tests and embedding
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    files: HashMap<String, Bytes>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Register content under the given path
    pub fn insert(&mut self, path: impl Into<String>, data: impl Into<Bytes>) -> &mut Self {
        self.files.insert(path.into(), data.into());
        self
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn open(&self, path: &str) -> Result<Bytes> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

/// Join a content URI onto the directory of the document that referenced it
///
/// Tile content URIs are relative to their tileset descriptor, so nested
/// descriptors shift the base for everything below them. `.` and `..`
/// segments are normalized; `..` never escapes above the source root.
pub(crate) fn resolve_uri(base_dir: &str, uri: &str) -> String {
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in uri.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Directory part of a reference path ("" when the path has no directory)
pub(crate) fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

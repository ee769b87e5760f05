//! Concurrent tileset-tree traversal
//!
//! The walker visits every tile of a (possibly multi-document) tileset
//! forest exactly once, composing transforms top-down and handing each
//! content tile to a [`TileVisitor`]. Nested tileset descriptors are never
//! recursed into directly: they land on an explicit worklist that is
//! processed to completion, which keeps tileset-of-tilesets composition flat
//! and makes the grow-while-draining invariant obvious.
//!
//! Fan-out is bounded by one semaphore shared across the whole walk. The
//! permit covers only a tile's own fetch-and-visit work and is released
//! before its children run, so the bound can be smaller than the tree depth
//! without deadlocking. Children always rendezvous: every child task is
//! awaited even after a sibling fails, and their errors are collected into a
//! plain vector (sized by the children that actually failed, never by the
//! concurrency limit).

use crate::geometry;
use crate::source::{Source, parent_dir, resolve_uri};
use crate::{Error, Result, Tile, Tileset};
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use glam::DMat4;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;

/// Per-tile callback invoked by the walker
#[async_trait]
pub trait TileVisitor: Send + Sync {
    /// Visit one content tile
    ///
    /// `path` is the resolved content path, `world` the fully-composed world
    /// transform of the tile, and `content` its fetched payload. Transient
    /// errors returned here are retried together with the fetch.
    async fn visit(&self, path: &str, tile: &Tile, world: DMat4, content: Bytes) -> Result<()>;
}

/// Tuning knobs for the walk
#[derive(Clone, Copy, Debug)]
pub struct WalkerOptions {
    /// Maximum number of tiles fetched/decoded concurrently, shared across
    /// the whole walk
    pub concurrency: usize,
    /// Total attempts (first try included) for a tile's fetch-and-visit
    pub retry_attempts: usize,
    /// Base delay between attempts; grows linearly with the attempt number
    pub retry_backoff: Duration,
}

impl Default for WalkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            retry_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Shared state for one tileset document being walked
struct DocumentWalk {
    /// Directory of the document; content URIs resolve relative to it
    base_dir: String,
    visitor: Arc<dyn TileVisitor>,
    /// Nested tileset descriptors discovered while walking this document:
    /// (resolved path, world transform of the referencing tile)
    discovered: Mutex<Vec<(String, DMat4)>>,
}

/// Walks a tileset forest with bounded concurrency and per-tile retry
#[derive(Clone)]
pub struct Walker {
    source: Arc<dyn Source>,
    options: WalkerOptions,
    limiter: Arc<Semaphore>,
}

impl Walker {
    /// Create a walker reading content from `source`
    pub fn new(source: Arc<dyn Source>, options: WalkerOptions) -> Self {
        let limiter = Arc::new(Semaphore::new(options.concurrency.max(1)));
        Self {
            source,
            options,
            limiter,
        }
    }

    /// Walk the tileset rooted at `root_path`, invoking `visitor` once per
    /// content tile
    ///
    /// The worklist is seeded with the root document; nested descriptors
    /// discovered during a document's walk are appended and processed after
    /// it, each with the world transform of the tile that referenced it.
    pub async fn walk(&self, root_path: &str, visitor: Arc<dyn TileVisitor>) -> Result<()> {
        let mut queue: VecDeque<(String, DMat4)> = VecDeque::new();
        queue.push_back((root_path.to_string(), DMat4::IDENTITY));

        while let Some((path, base_transform)) = queue.pop_front() {
            tracing::debug!(path = path.as_str(), "walking tileset document");
            let bytes = self.fetch_with_retry(&path).await?;
            let tileset = Tileset::parse(&bytes)?;

            let walk = Arc::new(DocumentWalk {
                base_dir: parent_dir(&path).to_string(),
                visitor: visitor.clone(),
                discovered: Mutex::new(Vec::new()),
            });
            self.walk_tile(tileset.root.clone(), base_transform, walk.clone())
                .await?;

            let discovered = std::mem::take(&mut *walk.discovered.lock().await);
            queue.extend(discovered);
        }
        Ok(())
    }

    /// Visit one tile and, concurrently, its children
    ///
    /// Returns a boxed future because the recursion crosses spawned tasks.
    fn walk_tile(
        &self,
        tile: Arc<Tile>,
        parent_transform: DMat4,
        walk: Arc<DocumentWalk>,
    ) -> BoxFuture<'static, Result<()>> {
        let walker = self.clone();
        Box::pin(async move {
            let world = geometry::compose(&parent_transform, tile.transform.as_ref());

            if let Some(uri) = tile.content_uri.clone() {
                let path = resolve_uri(&walk.base_dir, &uri);
                if tile.content_is_tileset() {
                    walk.discovered.lock().await.push((path, world));
                } else {
                    walker.visit_with_retry(&path, &tile, world, &walk).await?;
                }
            }

            if tile.children.is_empty() {
                return Ok(());
            }

            let mut children = JoinSet::new();
            for child in &tile.children {
                let future = walker.walk_tile(child.clone(), world, walk.clone());
                children.spawn(future);
            }

            // Rendezvous: drain every child before judging the subtree, so a
            // failing sibling never cancels the ones still in flight
            let mut errors: Vec<Error> = Vec::new();
            while let Some(joined) = children.join_next().await {
                match joined {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => errors.push(e),
                    Err(join_error) => errors.push(Error::Task(join_error.to_string())),
                }
            }

            if errors.is_empty() {
                Ok(())
            } else {
                Err(Error::Subtree {
                    uri: tile
                        .content_uri
                        .clone()
                        .unwrap_or_else(|| "<no content>".to_string()),
                    first: errors[0].to_string(),
                    errors,
                })
            }
        })
    }

    /// Fetch and visit one content tile under the global concurrency limit,
    /// retrying transient failures
    async fn visit_with_retry(
        &self,
        path: &str,
        tile: &Tile,
        world: DMat4,
        walk: &DocumentWalk,
    ) -> Result<()> {
        // The permit covers fetch + decode only; it is released before the
        // caller descends into children
        let _permit = self
            .limiter
            .acquire()
            .await
            .expect("walker semaphore is never closed");

        let mut attempt = 1;
        loop {
            let outcome = match self.source.open(path).await {
                Ok(content) => walk.visitor.visit(path, tile, world, content).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.options.retry_attempts => {
                    tracing::warn!(
                        path,
                        attempt,
                        error = %e,
                        "transient tile failure, retrying"
                    );
                    tokio::time::sleep(self.options.retry_backoff * attempt as u32).await;
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(path, attempt, error = %e, "tile visit failed");
                    return Err(e);
                }
            }
        }
    }

    /// Fetch a tileset descriptor with the same retry policy as tile content
    async fn fetch_with_retry(&self, path: &str) -> Result<Bytes> {
        let mut attempt = 1;
        loop {
            match self.source.open(path).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_transient() && attempt < self.options.retry_attempts => {
                    tracing::warn!(path, attempt, error = %e, "descriptor fetch failed, retrying");
                    tokio::time::sleep(self.options.retry_backoff * attempt as u32).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

//! Fetch pipeline: cache check, upstream fetch, normalize, cache write.

use futures::{stream, StreamExt, TryStreamExt};
use std::collections::HashSet;

use crate::cache::{CacheLayer, CacheResult, CacheStorage};
use crate::error::{Error, Result};
use crate::hackmd::{NoteSource, RawNote, UpstreamError};

use super::normalize::{normalize, NormalizeOptions};
use super::types::Post;

/// Tuning for the cold-fetch path.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
  pub normalize: NormalizeOptions,
  /// Fetch note detail for list entries that carry no content
  pub fetch_details: bool,
  /// Detail requests allowed in flight at once
  pub detail_concurrency: usize,
}

impl Default for PipelineOptions {
  fn default() -> Self {
    Self {
      normalize: NormalizeOptions::default(),
      fetch_details: true,
      detail_concurrency: 4,
    }
  }
}

/// Serves posts from the cache, falling back to the upstream notes API.
///
/// Single posts fetched directly from upstream are returned but never
/// written back: the cache only ever holds a complete collection.
pub struct PostPipeline<U: NoteSource, S: CacheStorage> {
  upstream: U,
  cache: CacheLayer<S>,
  options: PipelineOptions,
}

impl<U: NoteSource, S: CacheStorage> PostPipeline<U, S> {
  pub fn new(upstream: U, storage: S) -> Self {
    Self {
      upstream,
      cache: CacheLayer::new(storage),
      options: PipelineOptions::default(),
    }
  }

  pub fn with_options(mut self, options: PipelineOptions) -> Self {
    self.options = options;
    self
  }

  pub fn cache(&self) -> &CacheLayer<S> {
    &self.cache
  }

  pub fn upstream(&self) -> &U {
    &self.upstream
  }

  /// All posts; warm cache is returned as-is, cold cache is populated.
  pub async fn list(&self) -> Result<CacheResult<Vec<Post>>> {
    self.cache.fetch_collection(|| self.fetch_all()).await
  }

  /// A single post by slug.
  ///
  /// Scans a warm cache first. On a miss the note is fetched directly from
  /// upstream; an upstream 404 becomes [`Error::NotFound`].
  pub async fn get_by_slug(&self, slug: &str) -> Result<CacheResult<Post>> {
    if let Some(hit) = self.cache.find::<Post>(slug)? {
      return Ok(hit);
    }

    tracing::debug!(slug, "post not in cache, asking upstream");
    let raw = self.upstream.get_note(slug).await.map_err(|e| match e {
      UpstreamError::NotFound { .. } => Error::NotFound {
        slug: slug.to_string(),
      },
      cause => Error::FetchFailed { cause },
    })?;

    let post = normalize(raw, &self.options.normalize)?;
    Ok(CacheResult::from_network(post))
  }

  /// Drop the cache and rebuild it from upstream.
  pub async fn refresh(&self) -> Result<CacheResult<Vec<Post>>> {
    self.cache.refresh(|| self.fetch_all()).await
  }

  /// List, hydrate and normalize every note. All or nothing.
  async fn fetch_all(&self) -> Result<Vec<Post>> {
    let notes = self.upstream.list_notes().await?;
    tracing::info!(count = notes.len(), "listed upstream notes");

    let notes: Vec<RawNote> = stream::iter(notes)
      .map(|note| self.hydrate(note))
      .buffered(self.options.detail_concurrency.max(1))
      .try_collect()
      .await?;

    let posts = notes
      .into_iter()
      .map(|note| normalize(note, &self.options.normalize))
      .collect::<Result<Vec<_>, _>>()?;

    Ok(dedupe_slugs(posts))
  }

  /// Fill in content for a list entry that omitted it.
  async fn hydrate(&self, note: RawNote) -> Result<RawNote, UpstreamError> {
    if note.has_content() || !self.options.fetch_details {
      return Ok(note);
    }
    match note.id.as_deref() {
      Some(id) if !id.is_empty() => self.upstream.get_note_detail(id).await,
      // Left for the normalizer to reject
      _ => Ok(note),
    }
  }
}

/// Keep the first post for each slug.
fn dedupe_slugs(posts: Vec<Post>) -> Vec<Post> {
  let mut seen = HashSet::new();
  posts
    .into_iter()
    .filter(|post| {
      let fresh = seen.insert(post.slug.clone());
      if !fresh {
        tracing::warn!(slug = %post.slug, id = %post.id, "duplicate slug dropped");
      }
      fresh
    })
    .collect()
}

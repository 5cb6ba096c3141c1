//! Conversion of raw upstream notes into [`Post`]s.

use crate::error::MalformedRecord;
use crate::hackmd::RawNote;

use super::types::Post;

/// Appended to derived excerpts.
pub const ELLIPSIS: &str = "...";

/// Knobs for [`normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
  /// Characters (not bytes) of content kept in a derived excerpt
  pub excerpt_length: usize,
}

impl Default for NormalizeOptions {
  fn default() -> Self {
    Self {
      excerpt_length: 150,
    }
  }
}

/// Map a raw note to a post.
///
/// Fails when the record has no id, no title, or nothing usable as a slug.
pub fn normalize(raw: RawNote, options: &NormalizeOptions) -> Result<Post, MalformedRecord> {
  let id = non_empty(raw.id).ok_or(MalformedRecord {
    id: None,
    field: "id",
  })?;

  let title = raw.title.ok_or_else(|| MalformedRecord {
    id: Some(id.clone()),
    field: "title",
  })?;

  let slug = non_empty(raw.permalink)
    .or_else(|| non_empty(raw.short_id))
    .ok_or_else(|| MalformedRecord {
      id: Some(id.clone()),
      field: "permalink",
    })?;

  let content = raw.content.unwrap_or_default();

  let excerpt = match non_empty(raw.excerpt) {
    Some(excerpt) => excerpt,
    None => derive_excerpt(&content, options.excerpt_length),
  };

  Ok(Post {
    id,
    title,
    publish_date: raw
      .published_at
      .or(raw.created_at)
      .map(|t| t.to_opaque()),
    last_modified: raw.last_changed_at.map(|t| t.to_opaque()),
    excerpt,
    slug,
    cover_image: raw.cover_image,
    reading_time: raw.reading_time.map(|t| t.to_opaque()),
    content,
  })
}

/// First `length` characters of `content` followed by [`ELLIPSIS`].
///
/// Empty content yields an empty excerpt instead of a bare marker.
pub fn derive_excerpt(content: &str, length: usize) -> String {
  if content.is_empty() {
    return String::new();
  }

  let mut excerpt: String = content.chars().take(length).collect();
  excerpt.push_str(ELLIPSIS);
  excerpt
}

fn non_empty(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.is_empty())
}

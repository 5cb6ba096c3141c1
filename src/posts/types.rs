use serde::{Deserialize, Serialize};

use crate::cache::Cacheable;

/// A normalized blog post.
///
/// Timestamps are opaque strings: whatever upstream sent, rendered without
/// parsing. Absent optional fields are omitted from JSON so they stay absent
/// across a cache round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
  pub id: String,
  pub title: String,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub publish_date: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_modified: Option<String>,
  pub excerpt: String,
  pub slug: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cover_image: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reading_time: Option<String>,
}

impl Cacheable for Post {
  fn cache_key(&self) -> &str {
    &self.slug
  }

  fn entity_type() -> &'static str {
    "post"
  }
}

//! Serde-deserializable types matching HackMD API responses.
//!
//! Every field is optional at the wire level. Which ones are actually
//! required is decided by the normalizer, not by deserialization.

use serde::{Deserialize, Serialize};

/// A scalar the upstream may send as a number or as a string.
///
/// Timestamps have been epoch milliseconds in some API versions and ISO
/// strings in others, so both are accepted and kept opaque.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawScalar {
  Integer(i64),
  Float(f64),
  Text(String),
}

impl RawScalar {
  /// Render the value as an opaque string without interpreting it.
  pub fn to_opaque(&self) -> String {
    match self {
      RawScalar::Integer(n) => n.to_string(),
      RawScalar::Float(n) => n.to_string(),
      RawScalar::Text(s) => s.clone(),
    }
  }
}

/// A note as returned by `GET /notes` or `GET /notes/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNote {
  #[serde(default)]
  pub id: Option<String>,
  #[serde(default)]
  pub title: Option<String>,
  /// Omitted by the list endpoint
  #[serde(default)]
  pub content: Option<String>,
  #[serde(default)]
  pub excerpt: Option<String>,
  #[serde(default)]
  pub published_at: Option<RawScalar>,
  #[serde(default)]
  pub created_at: Option<RawScalar>,
  #[serde(default)]
  pub last_changed_at: Option<RawScalar>,
  #[serde(default)]
  pub permalink: Option<String>,
  #[serde(default)]
  pub short_id: Option<String>,
  #[serde(default)]
  pub cover_image: Option<String>,
  #[serde(default)]
  pub reading_time: Option<RawScalar>,
}

impl RawNote {
  /// Whether the record carries a body; list responses usually don't.
  pub fn has_content(&self) -> bool {
    self.content.is_some()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_deserialize_list_entry_without_content() {
    let json = r#"{
      "id": "abc",
      "title": "Hello",
      "shortId": "Sk1",
      "publishedAt": null,
      "createdAt": 1700000000000,
      "lastChangedAt": 1700000500000,
      "permalink": "hello-world",
      "tags": ["rust"]
    }"#;

    let note: RawNote = serde_json::from_str(json).unwrap();
    assert_eq!(note.id.as_deref(), Some("abc"));
    assert_eq!(note.permalink.as_deref(), Some("hello-world"));
    assert_eq!(note.published_at, None);
    assert_eq!(note.created_at, Some(RawScalar::Integer(1700000000000)));
    assert!(!note.has_content());
  }

  #[test]
  fn test_scalar_keeps_strings_verbatim() {
    let note: RawNote =
      serde_json::from_str(r#"{"publishedAt": "2024-01-02T03:04:05Z", "readingTime": 4.5}"#)
        .unwrap();

    assert_eq!(
      note.published_at.unwrap().to_opaque(),
      "2024-01-02T03:04:05Z"
    );
    assert_eq!(note.reading_time.unwrap().to_opaque(), "4.5");
  }
}

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::hackmd::api_types::RawNote;

/// Failure talking to the notes API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
  #[error("upstream returned {status}: {message}")]
  Status { status: u16, message: String },

  #[error("upstream has no {resource}")]
  NotFound { resource: String },

  #[error("upstream request failed: {message}")]
  Transport { message: String },

  #[error("upstream response could not be decoded: {message}")]
  Decode { message: String },
}

/// Characters of an upstream error body kept in [`UpstreamError::Status`].
pub const ERROR_BODY_LIMIT: usize = 200;

/// Bearer token passed through to the upstream API.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  fn expose(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for Credential {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("Credential(***)")
  }
}

/// Source of raw notes.
///
/// The pipeline only talks to upstream through this trait, so tests can
/// substitute an in-memory source.
#[async_trait]
pub trait NoteSource: Send + Sync {
  /// List all notes. Entries may omit `content`.
  async fn list_notes(&self) -> Result<Vec<RawNote>, UpstreamError>;

  /// Fetch the full record for one note by upstream id.
  async fn get_note_detail(&self, id: &str) -> Result<RawNote, UpstreamError>;

  /// Fetch one note directly by slug or identifier.
  async fn get_note(&self, slug: &str) -> Result<RawNote, UpstreamError>;
}

/// HackMD API client
#[derive(Clone)]
pub struct HackmdClient {
  http: reqwest::Client,
  base: Url,
  credential: Option<Credential>,
}

impl HackmdClient {
  pub fn new(config: &UpstreamConfig, credential: Option<Credential>) -> Result<Self, UpstreamError> {
    let base = Url::parse(&config.url).map_err(|e| UpstreamError::Transport {
      message: format!("invalid upstream url {}: {}", config.url, e),
    })?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("hackpost/", env!("CARGO_PKG_VERSION")))
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| UpstreamError::Transport {
        message: format!("failed to build http client: {}", e),
      })?;

    Ok(Self {
      http,
      base,
      credential,
    })
  }

  /// Append path segments to the base url, percent-encoding each one.
  fn endpoint(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| UpstreamError::Transport {
        message: format!("upstream url {} cannot be a base", self.base),
      })?
      .pop_if_empty()
      .extend(segments);
    Ok(url)
  }

  async fn get_json<T: DeserializeOwned>(
    &self,
    url: Url,
    resource: &str,
  ) -> Result<T, UpstreamError> {
    let mut request = self.http.get(url.clone());
    if let Some(credential) = &self.credential {
      request = request.bearer_auth(credential.expose());
    }

    tracing::debug!(%url, "upstream request");

    let response = request.send().await.map_err(|e| UpstreamError::Transport {
      message: e.to_string(),
    })?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Err(UpstreamError::NotFound {
        resource: resource.to_string(),
      });
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      let message = truncate_body(&body);
      return Err(UpstreamError::Status {
        status: status.as_u16(),
        message,
      });
    }

    response.json::<T>().await.map_err(|e| UpstreamError::Decode {
      message: e.to_string(),
    })
  }
}

/// Upstream error pages can be large HTML documents; keep only the start.
fn truncate_body(body: &str) -> String {
  let mut chars = body.chars();
  let mut message: String = chars.by_ref().take(ERROR_BODY_LIMIT).collect();
  if chars.next().is_some() {
    message.push_str("...");
  }
  message
}

#[async_trait]
impl NoteSource for HackmdClient {
  async fn list_notes(&self) -> Result<Vec<RawNote>, UpstreamError> {
    let url = self.endpoint(&["notes"])?;
    self.get_json(url, "notes").await
  }

  async fn get_note_detail(&self, id: &str) -> Result<RawNote, UpstreamError> {
    let url = self.endpoint(&["notes", id])?;
    self.get_json(url, &format!("note {}", id)).await
  }

  async fn get_note(&self, slug: &str) -> Result<RawNote, UpstreamError> {
    // HackMD resolves both note ids and permalinks on the same route
    let url = self.endpoint(&["notes", slug])?;
    self.get_json(url, &format!("note {}", slug)).await
  }
}

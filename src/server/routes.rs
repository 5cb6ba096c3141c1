use axum::extract::{Path, Query, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use crate::backup::BackupManager;
use crate::cache::{CacheResult, CacheStorage};
use crate::hackmd::NoteSource;
use crate::posts::PostPipeline;

/// Reports whether a response came from the cache.
pub const CACHE_HEADER: &str = "x-cache";

/// Shared state for the HTTP handlers.
pub struct AppState<U: NoteSource, S: CacheStorage> {
  pub pipeline: Arc<PostPipeline<U, S>>,
  pub backups: Option<BackupManager>,
}

impl<U: NoteSource, S: CacheStorage> Clone for AppState<U, S> {
  fn clone(&self) -> Self {
    Self {
      pipeline: Arc::clone(&self.pipeline),
      backups: self.backups.clone(),
    }
  }
}

/// Build the router with CORS open to any origin and request tracing.
pub fn router<U, S>(state: AppState<U, S>) -> Router
where
  U: NoteSource + 'static,
  S: CacheStorage + 'static,
{
  Router::new()
    .route("/notes", get(list_posts::<U, S>))
    .route("/notes/refresh", post(refresh_posts::<U, S>))
    .route("/notes/:slug", get(get_post::<U, S>))
    .route("/api/backups", get(list_backups::<U, S>))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

async fn list_posts<U: NoteSource, S: CacheStorage>(
  State(state): State<AppState<U, S>>,
) -> Result<Response, ApiError> {
  let result = state.pipeline.list().await?;
  Ok(cached_json(result))
}

async fn get_post<U: NoteSource, S: CacheStorage>(
  State(state): State<AppState<U, S>>,
  Path(slug): Path<String>,
) -> Result<Response, ApiError> {
  let result = state.pipeline.get_by_slug(&slug).await?;
  Ok(cached_json(result))
}

async fn refresh_posts<U: NoteSource, S: CacheStorage>(
  State(state): State<AppState<U, S>>,
) -> Result<Response, ApiError> {
  let result = state.pipeline.refresh().await?;
  tracing::info!(count = result.data.len(), "posts refreshed");
  Ok(cached_json(result))
}

#[derive(Debug, Deserialize)]
struct BackupQuery {
  filename: Option<String>,
}

async fn list_backups<U: NoteSource, S: CacheStorage>(
  State(state): State<AppState<U, S>>,
  Query(query): Query<BackupQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
  let Some(backups) = &state.backups else {
    return Ok(Json(Vec::new()));
  };
  Ok(Json(backups.list_backups(query.filename.as_deref())?))
}

fn cached_json<T: Serialize>(result: CacheResult<T>) -> Response {
  let marker = if result.is_hit() { "hit" } else { "miss" };
  (
    [(
      HeaderName::from_static(CACHE_HEADER),
      HeaderValue::from_static(marker),
    )],
    Json(result.data),
  )
    .into_response()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FileStorage;
  use crate::hackmd::{RawNote, UpstreamError};
  use crate::posts::Post;
  use async_trait::async_trait;
  use axum::body::{to_bytes, Body};
  use axum::http::{Request, StatusCode};
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;
  use tower::ServiceExt;

  struct StaticNotes {
    notes: Vec<RawNote>,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl NoteSource for StaticNotes {
    async fn list_notes(&self) -> Result<Vec<RawNote>, UpstreamError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.notes.clone())
    }

    async fn get_note_detail(&self, id: &str) -> Result<RawNote, UpstreamError> {
      self.get_note(id).await
    }

    async fn get_note(&self, slug: &str) -> Result<RawNote, UpstreamError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self
        .notes
        .iter()
        .find(|n| n.permalink.as_deref() == Some(slug) || n.id.as_deref() == Some(slug))
        .cloned()
        .ok_or(UpstreamError::NotFound {
          resource: slug.to_string(),
        })
    }
  }

  fn create_app() -> (Router, Arc<PostPipeline<StaticNotes, FileStorage>>, TempDir) {
    create_app_keeping(0)
  }

  fn create_app_keeping(
    max_backups: usize,
  ) -> (Router, Arc<PostPipeline<StaticNotes, FileStorage>>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let upstream = StaticNotes {
      notes: vec![RawNote {
        id: Some("1".to_string()),
        title: Some("Hello".to_string()),
        content: Some("Hello world".to_string()),
        permalink: Some("hello-world".to_string()),
        ..RawNote::default()
      }],
      calls: AtomicUsize::new(0),
    };
    let backups = BackupManager::new(temp_dir.path(), temp_dir.path().join("backups"))
      .with_max_backups(max_backups);
    let storage =
      FileStorage::new(temp_dir.path().join("posts_cache.json")).with_backups(backups.clone());
    let pipeline = Arc::new(PostPipeline::new(upstream, storage));
    let state = AppState {
      pipeline: Arc::clone(&pipeline),
      backups: Some(backups),
    };
    (router(state), pipeline, temp_dir)
  }

  async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
      .clone()
      .oneshot(
        Request::builder()
          .method(method)
          .uri(uri)
          .body(Body::empty())
          .unwrap(),
      )
      .await
      .unwrap();

    let status = response.status();
    let cache = response
      .headers()
      .get(CACHE_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, cache, body.to_vec())
  }

  #[tokio::test]
  async fn test_list_is_miss_then_hit() {
    let (app, pipeline, _temp_dir) = create_app();

    let (status, cache, body) = send(&app, "GET", "/notes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("miss"));
    let posts: Vec<Post> = serde_json::from_slice(&body).unwrap();
    assert_eq!(posts[0].slug, "hello-world");

    let (status, cache, _) = send(&app, "GET", "/notes").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("hit"));
    assert_eq!(pipeline.cache().storage().read::<Post>().unwrap().unwrap().entities.len(), 1);
  }

  #[tokio::test]
  async fn test_get_post_by_slug() {
    let (app, _pipeline, _temp_dir) = create_app();

    let (status, _, body) = send(&app, "GET", "/notes/hello-world").await;
    assert_eq!(status, StatusCode::OK);
    let post: Post = serde_json::from_slice(&body).unwrap();
    assert_eq!(post.excerpt, "Hello world...");
  }

  #[tokio::test]
  async fn test_missing_post_is_404() {
    let (app, _pipeline, _temp_dir) = create_app();

    let (status, _, body) = send(&app, "GET", "/notes/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "NOT_FOUND");
  }

  #[tokio::test]
  async fn test_refresh_goes_upstream_and_backs_up_old_cache() {
    let (app, pipeline, _temp_dir) = create_app();
    send(&app, "GET", "/notes").await;
    let calls_before = pipeline_calls(&pipeline);

    let (status, cache, _) = send(&app, "POST", "/notes/refresh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cache.as_deref(), Some("miss"));
    assert!(pipeline_calls(&pipeline) > calls_before);

    let (status, _, body) = send(&app, "GET", "/api/backups?filename=posts_cache.json").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(names.len(), 1);
    assert!(names[0].starts_with("posts_cache_"));
  }

  #[tokio::test]
  async fn test_backups_empty_before_any_refresh() {
    let (app, _pipeline, _temp_dir) = create_app();

    let (status, _, body) = send(&app, "GET", "/api/backups").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert!(names.is_empty());
  }

  #[tokio::test]
  async fn test_repeated_refreshes_keep_bounded_backups() {
    let (app, _pipeline, _temp_dir) = create_app_keeping(3);
    send(&app, "GET", "/notes").await;

    for _ in 0..20 {
      let (status, _, _) = send(&app, "POST", "/notes/refresh").await;
      assert_eq!(status, StatusCode::OK);
    }

    let (_, _, body) = send(&app, "GET", "/api/backups").await;
    let names: Vec<String> = serde_json::from_slice(&body).unwrap();
    assert_eq!(names.len(), 3);
  }

  fn pipeline_calls(pipeline: &PostPipeline<StaticNotes, FileStorage>) -> usize {
    pipeline.upstream().calls.load(Ordering::SeqCst)
  }
}

//! HTTP client for the RUZ timetable API.
//!
//! Implements [`ScheduleSource`]: identifier resolution through the search
//! endpoints and schedule retrieval. Every failure is absorbed here and
//! surfaces as [`Fetch::Failed`]; callers never see a transport error.

use std::{
  collections::HashMap,
  sync::Mutex,
  time::Duration,
};

use reqwest::Client;
use schedwatch_core::{
  source::{Fetch, ScheduleSource},
  subject::SubjectKind,
};
use thiserror::Error;
use tracing::debug;

/// Public RUZ instance used when no base URL is configured.
pub const DEFAULT_BASE_URL: &str = "https://ruz.spbstu.ru/api/v1/ruz";

/// Query parameter names tried, in order, against the search endpoints.
const SEARCH_PARAMS: [&str; 3] = ["term", "q", "name"];

#[derive(Debug, Error)]
pub enum Error {
  #[error("failed to build HTTP client: {0}")]
  Client(#[from] reqwest::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Async client for the RUZ API.
///
/// Cheap to share behind an `Arc`; the inner [`reqwest::Client`] pools
/// connections. Resolved identifiers are cached for the life of the client.
pub struct RuzClient {
  client:   Client,
  base_url: String,
  resolved: Mutex<HashMap<(SubjectKind, String), String>>,
}

impl RuzClient {
  /// Build a client. `timeout` bounds every request, so one slow subject
  /// cannot stall a polling cycle.
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self {
      client,
      base_url: base_url.into().trim_end_matches('/').to_owned(),
      resolved: Mutex::new(HashMap::new()),
    })
  }

  fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

  /// Where the schedule for a resolved identifier lives.
  pub fn schedule_url(&self, kind: SubjectKind, id: &str) -> String {
    match kind {
      SubjectKind::Teacher => self.url(&format!("/teachers/{id}/scheduler")),
      SubjectKind::Course => self.url(&format!("/scheduler/{id}")),
    }
  }

  fn search_path(kind: SubjectKind) -> &'static str {
    match kind {
      SubjectKind::Teacher => "/search/teachers",
      SubjectKind::Course => "/search/groups",
    }
  }

  /// Run one search and return the first hit's `id` (or `Id`).
  async fn first_hit(&self, kind: SubjectKind, param: &str, query: &str) -> Option<String> {
    let resp = self
      .client
      .get(self.url(Self::search_path(kind)))
      .query(&[(param, query)])
      .send()
      .await
      .inspect_err(|e| debug!(%kind, param, "search request failed: {e}"))
      .ok()?;

    if !resp.status().is_success() {
      debug!(%kind, param, status = %resp.status(), "search returned non-success");
      return None;
    }

    let body: serde_json::Value = resp.json().await.ok()?;
    first_id(&body)
  }

  async fn search(&self, kind: SubjectKind, query: &str) -> Option<String> {
    for param in SEARCH_PARAMS {
      if let Some(id) = self.first_hit(kind, param, query).await {
        return Some(id);
      }
    }
    None
  }

  fn cached(&self, kind: SubjectKind, query: &str) -> Option<String> {
    self
      .resolved
      .lock()
      .ok()?
      .get(&(kind, query.to_owned()))
      .cloned()
  }

  fn remember(&self, kind: SubjectKind, query: &str, id: &str) {
    if let Ok(mut cache) = self.resolved.lock() {
      cache.insert((kind, query.to_owned()), id.to_owned());
    }
  }
}

/// Extract the identifier of the first element of a search response array.
fn first_id(body: &serde_json::Value) -> Option<String> {
  let first = body.as_array()?.first()?;
  let id = first.get("id").or_else(|| first.get("Id"))?;
  match id {
    serde_json::Value::String(s) => Some(s.clone()),
    serde_json::Value::Null => None,
    other => Some(other.to_string()),
  }
}

/// Digits of a teacher code such as `T-4874` or `t_4874`, if `query` is one.
pub fn teacher_code_digits(query: &str) -> Option<String> {
  let query = query.trim();
  let rest = ["T-", "t-", "T_", "t_"]
    .iter()
    .find_map(|prefix| query.strip_prefix(*prefix))?;
  let digits: String = rest.chars().filter(char::is_ascii_digit).collect();
  (!digits.is_empty()).then_some(digits)
}

impl ScheduleSource for RuzClient {
  async fn resolve_identifier(&self, kind: SubjectKind, query: &str) -> Option<String> {
    if kind == SubjectKind::Teacher
      && let Some(digits) = teacher_code_digits(query)
    {
      return Some(digits);
    }

    if let Some(id) = self.cached(kind, query) {
      return Some(id);
    }

    match (self.search(kind, query).await, kind) {
      (Some(id), _) => {
        self.remember(kind, query, &id);
        Some(id)
      }
      // Teacher keys are often usable as-is.
      (None, SubjectKind::Teacher) => Some(query.to_owned()),
      (None, SubjectKind::Course) => None,
    }
  }

  async fn fetch_payload(&self, kind: SubjectKind, external_id: &str) -> Fetch {
    let url = self.schedule_url(kind, external_id);

    let resp = match self.client.get(&url).send().await {
      Ok(resp) => resp,
      Err(e) => return Fetch::failed(format!("GET {url} failed: {e}")),
    };

    let status = resp.status();
    if !status.is_success() {
      return Fetch::failed(format!("GET {url} → {status}"));
    }

    let body = match resp.text().await {
      Ok(body) => body,
      Err(e) => return Fetch::failed(format!("reading {url}: {e}")),
    };

    if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
      return Fetch::failed(format!("malformed body from {url}: {e}"));
    }

    Fetch::from_body(body)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use axum::{
    Json, Router,
    extract::{Path, Query},
    http::StatusCode,
    routing::get,
  };
  use serde_json::{Value, json};

  use super::*;

  async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
  }

  fn client(base: &str) -> RuzClient {
    RuzClient::new(base, Duration::from_secs(5)).unwrap()
  }

  /// Groups are only found through the `name` parameter.
  async fn search_groups(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    match q.get("name").map(String::as_str) {
      Some("3530901/10001") => Json(json!([{ "id": 35407, "name": "3530901/10001" }])),
      _ => Json(json!([])),
    }
  }

  async fn search_teachers(Query(q): Query<HashMap<String, String>>) -> Json<Value> {
    match q.get("term").map(String::as_str) {
      Some("Ivanov") => Json(json!([{ "Id": "777" }, { "Id": "778" }])),
      _ => Json(json!([])),
    }
  }

  async fn group_schedule(Path(id): Path<String>) -> Result<String, StatusCode> {
    match id.as_str() {
      "35407" => Ok(r#"{"week":"odd","room":"101"}"#.to_owned()),
      "500" => Err(StatusCode::INTERNAL_SERVER_ERROR),
      "html" => Ok("<html>maintenance</html>".to_owned()),
      "sentinel" => Ok(r#"{"error":"fetch_failed"}"#.to_owned()),
      _ => Err(StatusCode::NOT_FOUND),
    }
  }

  async fn teacher_schedule(Path(id): Path<String>) -> String {
    format!(r#"{{"teacher":"{id}"}}"#)
  }

  fn ruz() -> Router {
    Router::new()
      .route("/search/groups", get(search_groups))
      .route("/search/teachers", get(search_teachers))
      .route("/scheduler/{id}", get(group_schedule))
      .route("/teachers/{id}/scheduler", get(teacher_schedule))
  }

  #[test]
  fn teacher_digits_extraction() {
    assert_eq!(teacher_code_digits("T-4874").as_deref(), Some("4874"));
    assert_eq!(teacher_code_digits("t-48 74").as_deref(), Some("4874"));
    assert_eq!(teacher_code_digits("t_4874").as_deref(), Some("4874"));
    assert_eq!(teacher_code_digits("T_4874").as_deref(), Some("4874"));
    assert_eq!(teacher_code_digits("T-"), None);
    assert_eq!(teacher_code_digits("4874"), None);
  }

  #[test]
  fn first_id_accepts_both_spellings() {
    assert_eq!(first_id(&json!([{ "id": 5 }])).as_deref(), Some("5"));
    assert_eq!(first_id(&json!([{ "Id": "x" }])).as_deref(), Some("x"));
    assert_eq!(first_id(&json!([])), None);
    assert_eq!(first_id(&json!({ "id": 5 })), None);
  }

  #[test]
  fn schedule_urls_per_kind() {
    let c = client("http://ruz.example/api/");
    assert_eq!(
      c.schedule_url(SubjectKind::Teacher, "4874"),
      "http://ruz.example/api/teachers/4874/scheduler"
    );
    assert_eq!(
      c.schedule_url(SubjectKind::Course, "35407"),
      "http://ruz.example/api/scheduler/35407"
    );
  }

  #[tokio::test]
  async fn teacher_code_short_circuits_without_network() {
    // Nothing listens here; any request would fail and fall back to the
    // query text itself.
    let c = client("http://127.0.0.1:9");
    let id = c.resolve_identifier(SubjectKind::Teacher, "T-4874").await;
    assert_eq!(id.as_deref(), Some("4874"));
    let id = c.resolve_identifier(SubjectKind::Teacher, "t_4874").await;
    assert_eq!(id.as_deref(), Some("4874"));
  }

  #[tokio::test]
  async fn search_strategies_are_tried_in_order() {
    let base = serve(ruz()).await;
    let c = client(&base);

    let id = c.resolve_identifier(SubjectKind::Course, "3530901/10001").await;
    assert_eq!(id.as_deref(), Some("35407"));

    let id = c.resolve_identifier(SubjectKind::Teacher, "Ivanov").await;
    assert_eq!(id.as_deref(), Some("777"));
  }

  #[tokio::test]
  async fn exhausted_strategies() {
    let base = serve(ruz()).await;
    let c = client(&base);

    assert_eq!(c.resolve_identifier(SubjectKind::Course, "nope").await, None);
    assert_eq!(
      c.resolve_identifier(SubjectKind::Teacher, "Petrov").await.as_deref(),
      Some("Petrov")
    );
  }

  #[tokio::test]
  async fn fetch_returns_payload() {
    let base = serve(ruz()).await;
    let c = client(&base);

    assert_eq!(
      c.fetch_payload(SubjectKind::Course, "35407").await,
      Fetch::Payload(r#"{"week":"odd","room":"101"}"#.to_owned())
    );
    assert_eq!(
      c.fetch_payload(SubjectKind::Teacher, "4874").await,
      Fetch::Payload(r#"{"teacher":"4874"}"#.to_owned())
    );
  }

  #[tokio::test]
  async fn fetch_failures_become_failed() {
    let base = serve(ruz()).await;
    let c = client(&base);

    for id in ["500", "missing", "html", "sentinel"] {
      assert!(
        matches!(c.fetch_payload(SubjectKind::Course, id).await, Fetch::Failed { .. }),
        "{id} should fail"
      );
    }

    let offline = client("http://127.0.0.1:9");
    assert!(matches!(
      offline.fetch_payload(SubjectKind::Course, "35407").await,
      Fetch::Failed { .. }
    ));
  }
}

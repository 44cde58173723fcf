//! Mail transports.

use std::{future::Future, sync::Arc, time::Duration};

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

/// One plain-text message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailMessage {
  pub to:      String,
  pub subject: String,
  pub text:    String,
}

#[derive(Debug, Error)]
pub enum MailError {
  #[error("mail transport error: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("mail relay rejected message: {0}")]
  Rejected(String),
}

/// Something that can deliver a [`MailMessage`].
pub trait Mailer: Send + Sync {
  fn send<'a>(
    &'a self,
    message: &'a MailMessage,
  ) -> impl Future<Output = Result<(), MailError>> + Send + 'a;
}

impl<M: Mailer> Mailer for Arc<M> {
  fn send<'a>(
    &'a self,
    message: &'a MailMessage,
  ) -> impl Future<Output = Result<(), MailError>> + Send + 'a {
    (**self).send(message)
  }
}

// ─── Log transport ───────────────────────────────────────────────────────────

/// Writes messages to the tracing log instead of delivering them.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl Mailer for LogMailer {
  async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
    info!(
      to = %message.to,
      subject = %message.subject,
      "mail (log transport):\n{}",
      message.text
    );
    Ok(())
  }
}

// ─── HTTP relay transport ────────────────────────────────────────────────────

#[derive(Serialize)]
struct RelayRequest<'a> {
  #[serde(skip_serializing_if = "Option::is_none")]
  from:    Option<&'a str>,
  to:      &'a str,
  subject: &'a str,
  text:    &'a str,
}

/// Posts each message as JSON (`{from, to, subject, text}`) to a mail relay.
#[derive(Clone)]
pub struct HttpMailer {
  client:    Client,
  relay_url: String,
  from:      Option<String>,
}

impl HttpMailer {
  pub fn new(
    relay_url: impl Into<String>,
    from: Option<String>,
    timeout: Duration,
  ) -> Result<Self, MailError> {
    let client = Client::builder().timeout(timeout).build()?;
    Ok(Self { client, relay_url: relay_url.into(), from })
  }
}

impl Mailer for HttpMailer {
  async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
    let body = RelayRequest {
      from:    self.from.as_deref(),
      to:      &message.to,
      subject: &message.subject,
      text:    &message.text,
    };

    let resp = self.client.post(&self.relay_url).json(&body).send().await?;
    let status = resp.status();
    if !status.is_success() {
      let detail = resp.text().await.unwrap_or_default();
      return Err(MailError::Rejected(format!("{status}: {detail}")));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
  use serde_json::Value;

  use super::*;

  type Inbox = Arc<Mutex<Vec<Value>>>;

  async fn relay(State(inbox): State<Inbox>, Json(body): Json<Value>) -> StatusCode {
    if body["to"] == "bounce@example.com" {
      return StatusCode::UNPROCESSABLE_ENTITY;
    }
    inbox.lock().unwrap().push(body);
    StatusCode::ACCEPTED
  }

  async fn serve(inbox: Inbox) -> String {
    let router = Router::new().route("/send", post(relay)).with_state(inbox);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/send")
  }

  fn message(to: &str) -> MailMessage {
    MailMessage {
      to:      to.into(),
      subject: "[Schedule Change] Math".into(),
      text:    "room: 101 -> 303".into(),
    }
  }

  #[tokio::test]
  async fn http_mailer_posts_json() {
    let inbox = Inbox::default();
    let url = serve(inbox.clone()).await;
    let mailer =
      HttpMailer::new(url, Some("noreply@example.com".into()), Duration::from_secs(5)).unwrap();

    mailer.send(&message("a@example.com")).await.unwrap();

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["to"], "a@example.com");
    assert_eq!(received[0]["from"], "noreply@example.com");
    assert_eq!(received[0]["text"], "room: 101 -> 303");
  }

  #[tokio::test]
  async fn http_mailer_reports_rejection() {
    let url = serve(Inbox::default()).await;
    let mailer = HttpMailer::new(url, None, Duration::from_secs(5)).unwrap();

    let err = mailer.send(&message("bounce@example.com")).await.unwrap_err();
    assert!(matches!(err, MailError::Rejected(_)));
  }

  #[tokio::test]
  async fn log_mailer_always_succeeds() {
    LogMailer.send(&message("a@example.com")).await.unwrap();
  }
}

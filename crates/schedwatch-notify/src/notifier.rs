//! Fan-out of change events to subscribers.

use std::{sync::Arc, time::Duration};

use schedwatch_core::{
  diff::Diff,
  record::{ACTION_NOTIFY_SENT, NewAuditEntry},
  store::WatchStore,
  subject::Subject,
  subscription::{Channel, Subscriber, Subscription},
};
use serde_json::json;
use tracing::{debug, warn};

use crate::mailer::{MailMessage, Mailer};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// What one [`Notifier::notify`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
  /// Messages accepted by the transport.
  pub sent:    usize,
  /// Subscribers without the email channel or a resolvable address.
  pub skipped: usize,
  /// Dispatches that errored or timed out.
  pub failed:  usize,
}

/// Sends change notifications and records each delivery in the audit log.
pub struct Notifier<S, M> {
  store:   Arc<S>,
  mailer:  M,
  timeout: Duration,
}

impl<S: WatchStore, M: Mailer> Notifier<S, M> {
  pub fn new(store: Arc<S>, mailer: M) -> Self {
    Self { store, mailer, timeout: DEFAULT_TIMEOUT }
  }

  /// Bound each dispatch to `timeout`.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  /// Notify `subscribers` of `subject` about `diff`.
  ///
  /// Diffs that are not meaningful are dropped without side effects. A
  /// failed dispatch is logged and counted; the remaining subscribers are
  /// still attempted.
  pub async fn notify(
    &self,
    subject: &Subject,
    subscribers: &[Subscriber],
    diff: &Diff,
  ) -> NotifyReport {
    let mut report = NotifyReport::default();
    if !diff.is_meaningful() {
      debug!(subject = %subject.name, "diff not meaningful; no notifications");
      return report;
    }

    let text = format!("Schedule changed for {}\n{}", subject.name, diff.render_plain());

    for subscriber in subscribers {
      let subscription = &subscriber.subscription;
      if !subscription.wants(Channel::Email) {
        report.skipped += 1;
        continue;
      }

      let Some(email) = self.recipient(subscriber).await else {
        debug!(
          subscription = %subscription.subscription_id,
          "no email address for subscriber; skipping"
        );
        report.skipped += 1;
        continue;
      };

      let message = MailMessage {
        to:      email,
        subject: mail_subject(subject, subscription),
        text:    text.clone(),
      };

      match tokio::time::timeout(self.timeout, self.mailer.send(&message)).await {
        Ok(Ok(())) => {
          report.sent += 1;
          self.audit(subscription, &message.to).await;
        }
        Ok(Err(e)) => {
          warn!(to = %message.to, subject = %subject.name, "mail dispatch failed: {e}");
          report.failed += 1;
        }
        Err(_) => {
          warn!(
            to = %message.to,
            subject = %subject.name,
            "mail dispatch timed out after {:?}",
            self.timeout
          );
          report.failed += 1;
        }
      }
    }

    report
  }

  /// The subscriber's address: the pre-loaded user first, a store lookup
  /// when the user was not loaded.
  async fn recipient(&self, subscriber: &Subscriber) -> Option<String> {
    let user = match &subscriber.user {
      Some(user) => Some(user.clone()),
      None => self
        .store
        .get_user(subscriber.subscription.user_id)
        .await
        .inspect_err(|e| warn!("user lookup failed: {e}"))
        .ok()
        .flatten(),
    };
    user?.email.filter(|e| !e.trim().is_empty())
  }

  async fn audit(&self, subscription: &Subscription, email: &str) {
    let entry = NewAuditEntry::system(
      ACTION_NOTIFY_SENT,
      Some(subscription.subscription_id),
      json!({ "channel": Channel::Email.as_str(), "email": email }),
    );
    if let Err(e) = self.store.append_audit(entry).await {
      warn!(
        subscription = %subscription.subscription_id,
        "failed to record notification in audit log: {e}"
      );
    }
  }
}

fn mail_subject(subject: &Subject, subscription: &Subscription) -> String {
  let prefix = if subscription.important { "[Important] " } else { "" };
  format!("{prefix}[Schedule Change] {}", subject.name)
}

//! Subscription bookkeeping and administrator corrections.

use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use schedwatch_core::{
  code::parse_code,
  diff::{Diff, manual_diff},
  record::{ACTION_FILTERS_EDITED, ACTOR_ADMIN, Event, NewAuditEntry, NewEvent},
  store::WatchStore,
  subject::{NewSubject, Subject, SubjectKind},
  subscription::{Filters, NewSubscription, Subscription},
};
use schedwatch_notify::{Mailer, Notifier, NotifyReport};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::ServiceError;

type Result<T, E> = std::result::Result<T, ServiceError<E>>;

/// Result of [`SubscriptionService::edit_filters`].
#[derive(Debug, Clone)]
pub struct FilterEdit {
  pub subscription: Subscription,
  pub subject:      Subject,
  pub diff:         Diff,
  /// `None` when an identical correction was already on record.
  pub event:        Option<Event>,
  pub notified:     NotifyReport,
}

pub struct SubscriptionService<S, M> {
  store:    Arc<S>,
  notifier: Arc<Notifier<S, M>>,
}

impl<S: WatchStore, M: Mailer> SubscriptionService<S, M> {
  pub fn new(store: Arc<S>, notifier: Arc<Notifier<S, M>>) -> Self {
    Self { store, notifier }
  }

  /// Subscribe `user_id` to whatever `code` names. Returns `None` if the
  /// user already subscribes to that subject.
  pub async fn add_by_input(
    &self,
    user_id: Uuid,
    code: &str,
  ) -> Result<Option<Subscription>, S::Error> {
    let parsed = parse_code(code)?;
    let subject = self
      .store
      .upsert_subject(NewSubject {
        kind:         parsed.kind,
        external_key: parsed.external_key,
        name:         parsed.name,
      })
      .await
      .map_err(ServiceError::Store)?;

    let input = NewSubscription {
      filters: parsed.filters,
      ..NewSubscription::new(user_id, subject.subject_id)
    };
    self.store.add_subscription(input).await.map_err(ServiceError::Store)
  }

  /// The subscription, if it exists and belongs to `user_id`.
  async fn owned(&self, id: Uuid, user_id: Uuid) -> Result<Option<Subscription>, S::Error> {
    let subscription = self.store.get_subscription(id).await.map_err(ServiceError::Store)?;
    Ok(subscription.filter(|s| s.user_id == user_id))
  }

  /// Delete a subscription owned by `user_id`. Returns `false` if it does
  /// not exist or belongs to someone else.
  pub async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<bool, S::Error> {
    if self.owned(id, user_id).await?.is_none() {
      return Ok(false);
    }
    self.store.delete_subscription(id).await.map_err(ServiceError::Store)
  }

  /// Flip the important flag on a subscription owned by `user_id`.
  pub async fn toggle_important(&self, id: Uuid, user_id: Uuid) -> Result<bool, S::Error> {
    let Some(subscription) = self.owned(id, user_id).await? else {
      return Ok(false);
    };
    self
      .store
      .set_important(id, !subscription.important)
      .await
      .map_err(ServiceError::Store)
  }

  pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Subscription>, S::Error> {
    self.store.list_subscriptions_for_user(user_id).await.map_err(ServiceError::Store)
  }

  /// Events for every subject the user subscribes to, newest first.
  pub async fn events_for_user(&self, user_id: Uuid) -> Result<Vec<Event>, S::Error> {
    let subject_ids: Vec<Uuid> = self
      .list_for_user(user_id)
      .await?
      .into_iter()
      .map(|s| s.subject_id)
      .collect::<BTreeSet<_>>()
      .into_iter()
      .collect();
    if subject_ids.is_empty() {
      return Ok(Vec::new());
    }
    self.store.list_events(&subject_ids).await.map_err(ServiceError::Store)
  }

  /// Administrator correction of a subscription's filters.
  ///
  /// A `teacher` value is stored without its `t-` prefix (`t-200` becomes
  /// `200`). On a teacher subscription it also re-points the subscription at
  /// that teacher's subject, creating the subject if needed. The correction is
  /// recorded as a `manual` event on the (new) subject, the subscriber is
  /// notified and an audit entry is written.
  pub async fn edit_filters(
    &self,
    id: Uuid,
    filters: Filters,
  ) -> Result<FilterEdit, S::Error> {
    let current = self
      .store
      .get_subscription(id)
      .await
      .map_err(ServiceError::Store)?
      .ok_or(ServiceError::SubscriptionNotFound(id))?;

    let mut subject = self
      .store
      .get_subject(current.subject_id)
      .await
      .map_err(ServiceError::Store)?
      .ok_or(ServiceError::SubjectNotFound(current.subject_id))?;

    let mut filters = filters.normalized();
    filters.teacher = filters.teacher.as_deref().and_then(teacher_override);

    if subject.kind == SubjectKind::Teacher
      && let Some(digits) = filters.teacher.as_deref()
    {
      let key = format!("T-{digits}");
      if key != subject.external_key {
        subject = self
          .store
          .upsert_subject(NewSubject {
            kind:         SubjectKind::Teacher,
            external_key: key,
            name:         format!("Teacher {digits}"),
          })
          .await
          .map_err(ServiceError::Store)?;
      }
    }

    self
      .store
      .update_subscription(id, subject.subject_id, filters.clone())
      .await
      .map_err(ServiceError::Store)?;

    let diff = manual_diff(&current.filters, &filters);
    let event = self
      .store
      .insert_event(NewEvent::new(subject.subject_id, Utc::now(), diff.clone()))
      .await
      .map_err(ServiceError::Store)?;

    let subscribers: Vec<_> = self
      .store
      .subscribers_of(subject.subject_id)
      .await
      .map_err(ServiceError::Store)?
      .into_iter()
      .filter(|s| s.subscription.subscription_id == id)
      .collect();
    let notified = self.notifier.notify(&subject, &subscribers, &diff).await;

    self
      .store
      .append_audit(NewAuditEntry {
        actor:     ACTOR_ADMIN.to_owned(),
        action:    ACTION_FILTERS_EDITED.to_owned(),
        target_id: Some(id),
        meta:      json!({
          "subject_id": subject.subject_id,
          "event_id": event.as_ref().map(|e| e.event_id),
          "changes": diff.change_count(),
        }),
      })
      .await
      .map_err(ServiceError::Store)?;

    info!(
      subscription = %id,
      subject = %subject.external_key,
      changes = diff.change_count(),
      "filters edited"
    );

    let subscription = self
      .store
      .get_subscription(id)
      .await
      .map_err(ServiceError::Store)?
      .ok_or(ServiceError::SubscriptionNotFound(id))?;

    Ok(FilterEdit { subscription, subject, diff, event, notified })
  }
}

/// Teacher digits from an override value such as `t-4874` or `4874`.
fn teacher_override(value: &str) -> Option<String> {
  let value = value.trim();
  let rest = value
    .strip_prefix("t-")
    .or_else(|| value.strip_prefix("T-"))
    .unwrap_or(value)
    .trim();
  (!rest.is_empty()).then(|| rest.to_owned())
}

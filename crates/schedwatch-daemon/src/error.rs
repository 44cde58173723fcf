use schedwatch_core::code::InputError;
use thiserror::Error;
use uuid::Uuid;

/// Failure of a subscription-service operation, generic over the store's
/// error type.
#[derive(Debug, Error)]
pub enum ServiceError<E> {
  #[error("invalid subscription code: {0}")]
  Input(#[from] InputError),

  #[error("subscription {0} not found")]
  SubscriptionNotFound(Uuid),

  #[error("subject {0} not found")]
  SubjectNotFound(Uuid),

  #[error("store error: {0}")]
  Store(#[source] E),
}

//! Change notifications for schedwatch.
//!
//! [`Notifier`] gates events on [`Diff::is_meaningful`], fans out one message
//! per resolvable subscriber through a [`Mailer`], and appends an audit entry
//! for every message handed to the transport.
//!
//! [`Diff::is_meaningful`]: schedwatch_core::diff::Diff::is_meaningful

pub mod mailer;
pub mod notifier;

pub use mailer::{HttpMailer, LogMailer, MailError, MailMessage, Mailer};
pub use notifier::{NotifyReport, Notifier};

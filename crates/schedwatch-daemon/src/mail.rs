//! The mail transport selected by configuration.

use schedwatch_notify::{HttpMailer, LogMailer, MailError, MailMessage, Mailer};

use crate::config::{MailSettings, MailTransport};

pub enum ConfiguredMailer {
  Log(LogMailer),
  Http(HttpMailer),
}

impl ConfiguredMailer {
  /// Build the transport named in `settings`. The `http` transport without a
  /// relay URL is a configuration error.
  pub fn from_settings(settings: &MailSettings) -> anyhow::Result<Self> {
    match settings.transport {
      MailTransport::Log => Ok(Self::Log(LogMailer)),
      MailTransport::Http => {
        let url = settings
          .relay_url
          .clone()
          .ok_or_else(|| anyhow::anyhow!("mail.relay_url is required for the http transport"))?;
        Ok(Self::Http(HttpMailer::new(url, settings.from.clone(), settings.timeout())?))
      }
    }
  }
}

impl Mailer for ConfiguredMailer {
  async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
    match self {
      Self::Log(mailer) => mailer.send(message).await,
      Self::Http(mailer) => mailer.send(message).await,
    }
  }
}

//! schedwatch binary.
//!
//! Reads `schedwatch.toml` (or the path given with `--config`), opens the
//! SQLite store and either runs the polling loop or performs one
//! bookkeeping command.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use schedwatch_core::{store::WatchStore, subscription::Filters};
use schedwatch_daemon::{
  Poller, Scheduler, Settings, SubscriptionService, mail::ConfiguredMailer,
};
use schedwatch_notify::Notifier;
use schedwatch_ruz::RuzClient;
use schedwatch_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about = "Schedule change watcher")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "schedwatch.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Poll on the configured interval until interrupted.
  Run,
  /// Run a single polling cycle and print its report.
  Once,
  /// Subscribe a user to a course or teacher code.
  Subscribe {
    #[arg(long)]
    email: String,
    code:  String,
  },
  /// Remove one of a user's subscriptions.
  Unsubscribe {
    #[arg(long)]
    email: String,
    id:    Uuid,
  },
  /// Toggle the important flag on one of a user's subscriptions.
  Important {
    #[arg(long)]
    email: String,
    id:    Uuid,
  },
  /// List a user's subscriptions.
  List {
    #[arg(long)]
    email: String,
  },
  /// List change events for a user's subjects, newest first.
  Events {
    #[arg(long)]
    email: String,
  },
  /// Correct a subscription's filters and notify its owner.
  EditFilters {
    id:      Uuid,
    #[arg(long)]
    room:    Option<String>,
    #[arg(long)]
    date:    Option<String>,
    #[arg(long)]
    from:    Option<String>,
    #[arg(long)]
    to:      Option<String>,
    #[arg(long)]
    teacher: Option<String>,
  },
  /// Correct a subject's display name.
  RenameSubject { id: Uuid, name: String },
}

type Store = SqliteStore;
type AppNotifier = Notifier<Store, ConfiguredMailer>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = Settings::load(&cli.config).context("failed to load configuration")?;

  let store_path = settings.store_path();
  if let Some(parent) = store_path.parent() {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = Arc::new(
    SqliteStore::open(&store_path)
      .await
      .with_context(|| format!("failed to open store at {store_path:?}"))?,
  );

  let mailer = ConfiguredMailer::from_settings(&settings.mail)
    .context("failed to configure mail transport")?;
  let notifier: Arc<AppNotifier> =
    Arc::new(Notifier::new(store.clone(), mailer).with_timeout(settings.mail.timeout()));
  let service = SubscriptionService::new(store.clone(), notifier.clone());

  match cli.command {
    Command::Once => {
      let poller = poller(&settings, store.clone(), notifier)?;
      let report = poller.run_cycle().await;
      println!("{}", serde_json::to_string_pretty(&report)?);
    }

    Command::Run => {
      let poller = poller(&settings, store.clone(), notifier)?;
      let scheduler = Scheduler::new(settings.poller.interval());
      scheduler
        .run(
          || poller.run_cycle(),
          async {
            if let Err(e) = tokio::signal::ctrl_c().await {
              tracing::error!("failed to listen for ctrl-c: {e}");
              std::future::pending::<()>().await;
            }
          },
        )
        .await;
    }

    Command::Subscribe { email, code } => {
      let user = store.ensure_user(email).await?;
      match service.add_by_input(user.user_id, &code).await? {
        Some(subscription) => println!("subscribed: {}", subscription.subscription_id),
        None => println!("already subscribed"),
      }
    }

    Command::Unsubscribe { email, id } => {
      let user_id = lookup_user(&store, email).await?;
      if service.delete(id, user_id).await? {
        println!("unsubscribed");
      } else {
        anyhow::bail!("no subscription {id} for this user");
      }
    }

    Command::Important { email, id } => {
      let user_id = lookup_user(&store, email).await?;
      if !service.toggle_important(id, user_id).await? {
        anyhow::bail!("no subscription {id} for this user");
      }
      let important = store.get_subscription(id).await?.is_some_and(|s| s.important);
      println!("important: {important}");
    }

    Command::List { email } => {
      let user_id = lookup_user(&store, email).await?;
      for subscription in service.list_for_user(user_id).await? {
        let subject = store.get_subject(subscription.subject_id).await?;
        let name = subject.map(|s| s.name).unwrap_or_default();
        println!(
          "{}  {}{}  {}",
          subscription.subscription_id,
          if subscription.important { "! " } else { "" },
          name,
          serde_json::to_string(&subscription.filters)?
        );
      }
    }

    Command::Events { email } => {
      let user_id = lookup_user(&store, email).await?;
      for event in service.events_for_user(user_id).await? {
        println!(
          "{}  {}  {}  {}",
          event.observed_at.to_rfc3339(),
          event.subject_id,
          event.diff.tag(),
          event.diff.to_json()
        );
      }
    }

    Command::EditFilters { id, room, date, from, to, teacher } => {
      let edit = service
        .edit_filters(id, Filters { room, date, from, to, teacher })
        .await?;
      println!(
        "subject: {}  changes: {}  notified: {}",
        edit.subject.name,
        edit.diff.change_count(),
        edit.notified.sent
      );
    }

    Command::RenameSubject { id, name } => {
      if !store.rename_subject(id, name).await? {
        anyhow::bail!("no subject {id}");
      }
      println!("renamed");
    }
  }

  Ok(())
}

fn poller(
  settings: &Settings,
  store: Arc<Store>,
  notifier: Arc<AppNotifier>,
) -> anyhow::Result<Poller<Store, RuzClient, ConfiguredMailer>> {
  let source = RuzClient::new(&settings.source.base_url, settings.source.timeout())
    .context("failed to build RUZ client")?;
  Ok(Poller::new(store, Arc::new(source), notifier, settings.poller.concurrency))
}

async fn lookup_user(store: &Store, email: String) -> anyhow::Result<Uuid> {
  store
    .find_user_by_email(email.clone())
    .await?
    .map(|u| u.user_id)
    .with_context(|| format!("no user with email {email}"))
}

//! Periodic cycle driver.

use std::{
  future::Future,
  sync::atomic::{AtomicBool, Ordering},
  time::Duration,
};

use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::poller::CycleReport;

/// Runs polling cycles on a fixed delay and never lets two overlap.
pub struct Scheduler {
  interval: Duration,
  running:  AtomicBool,
}

/// Held for the duration of one cycle; clears the in-progress flag on drop.
pub struct CycleGuard<'a> {
  flag: &'a AtomicBool,
}

impl Drop for CycleGuard<'_> {
  fn drop(&mut self) { self.flag.store(false, Ordering::Release); }
}

impl Scheduler {
  pub fn new(interval: Duration) -> Self {
    Self { interval, running: AtomicBool::new(false) }
  }

  /// Claim the cycle slot. `None` if a cycle is already in progress.
  pub fn try_begin(&self) -> Option<CycleGuard<'_>> {
    self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| CycleGuard { flag: &self.running })
  }

  pub fn is_running(&self) -> bool { self.running.load(Ordering::Acquire) }

  /// Run `cycle` once per interval until `shutdown` resolves. A cycle in
  /// flight is allowed to finish before the loop exits.
  pub async fn run<F, Fut>(&self, mut cycle: F, shutdown: impl Future<Output = ()>)
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = CycleReport>,
  {
    let mut ticker = tokio::time::interval(self.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    info!(interval = ?self.interval, "scheduler started");
    loop {
      tokio::select! {
        _ = &mut shutdown => {
          info!("shutdown requested; scheduler stopping");
          break;
        }
        _ = ticker.tick() => {
          let Some(_guard) = self.try_begin() else {
            debug!("previous cycle still running; skipping tick");
            continue;
          };
          let report = cycle().await;
          debug!(?report, "cycle finished");
        }
      }
    }
  }
}

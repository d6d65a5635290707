//! Fixed-interval cycle runner with cooperative shutdown.
//!
//! The scheduler is a plain poll loop: check the shutdown flag, run the cycle if it is due, sleep
//! for a short quantum, repeat. Signal handlers never touch the pipeline directly. They only set
//! the [`Shutdown`] flag, which the loop observes at the top of its next iteration. A cycle that
//! is already running is allowed to finish.
//!
//! # Examples
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use harvest::scheduler::{Cycle, Scheduler};
//!
//! struct Hello;
//!
//! #[async_trait::async_trait]
//! impl Cycle for Hello {
//!   async fn run_cycle(&mut self) { println!("hello"); }
//!
//!   async fn shutdown(self) { println!("bye"); }
//! }
//!
//! # async fn example() {
//! let scheduler = Scheduler::new(Duration::from_secs(6 * 3600));
//! tokio::spawn(scheduler.shutdown_handle().listen_for_signals());
//! scheduler.run(Hello).await;
//! # }
//! ```

use std::{
  future::Future,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
  },
  time::Duration,
};

use tokio::{signal, time::Instant};

use super::*;

/// Default sleep between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Exit status after a second interrupt, as a shell reports death by SIGINT.
pub const FORCED_EXIT_CODE: i32 = 130;

/// Shared cancellation flag.
///
/// Cloning shares the flag. Requesting shutdown is idempotent.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
  /// A flag that has not been raised.
  pub fn new() -> Self { Self::default() }

  /// Raises the flag.
  pub fn request(&self) { self.0.store(true, Ordering::SeqCst); }

  /// Whether the flag has been raised.
  pub fn is_requested(&self) -> bool { self.0.load(Ordering::SeqCst) }

  /// Waits for Ctrl+C or, on Unix, SIGTERM, then raises the flag. A second signal exits the
  /// process with status [`FORCED_EXIT_CODE`] without waiting for the running cycle.
  ///
  /// Meant to be spawned as the only background task.
  pub async fn listen_for_signals(self) {
    self.escalate(next_signal, || std::process::exit(FORCED_EXIT_CODE)).await
  }

  /// Raises the flag when `next` first resolves and calls `force` when it resolves again.
  pub async fn escalate<F, Fut, X>(self, mut next: F, force: X)
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = &'static str>,
    X: FnOnce(), {
    let signal = next().await;
    info!("Received {signal}, finishing the current cycle before stopping (repeat to force quit)");
    self.request();

    let signal = next().await;
    warn!("Received {signal} again, exiting without waiting for the current cycle");
    force();
  }
}

/// Resolves with the name of the next Ctrl+C or SIGTERM.
async fn next_signal() -> &'static str {
  let ctrl_c = async {
    if let Err(e) = signal::ctrl_c().await {
      error!("Failed to install Ctrl+C handler: {e}");
      std::future::pending::<()>().await;
    }
  };

  #[cfg(unix)]
  let terminate = async {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
      Ok(mut stream) => {
        stream.recv().await;
      },
      Err(e) => {
        error!("Failed to install SIGTERM handler: {e}");
        std::future::pending::<()>().await;
      },
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => "SIGINT",
    _ = terminate => "SIGTERM",
  }
}

/// Unit of periodic work.
#[async_trait]
pub trait Cycle: Send {
  /// Runs one complete cycle. Must not fail; problems are logged and counted by the implementor.
  async fn run_cycle(&mut self);

  /// Called once after the loop stops.
  async fn shutdown(self);
}

/// Runs a [`Cycle`] every `interval` until shutdown is requested.
#[derive(Debug, Clone)]
pub struct Scheduler {
  /// Time between cycle starts
  interval:        Duration,
  /// Run the first cycle without waiting a full interval
  run_immediately: bool,
  /// Sleep between polls
  poll:            Duration,
  /// Cancellation flag
  shutdown:        Shutdown,
}

impl Scheduler {
  /// Scheduler that runs immediately and then every `interval`.
  pub fn new(interval: Duration) -> Self {
    Self { interval, run_immediately: true, poll: DEFAULT_POLL_INTERVAL, shutdown: Shutdown::new() }
  }

  /// Scheduler with an interval given in hours, as configured.
  pub fn every_hours(hours: f64) -> Self {
    Self::new(Duration::from_secs_f64((hours.max(0.0) * 3600.0).min(u32::MAX as f64)))
  }

  /// Whether the first cycle runs as soon as [`Scheduler::run`] starts.
  pub fn with_run_immediately(mut self, run_immediately: bool) -> Self {
    self.run_immediately = run_immediately;
    self
  }

  /// Sets the poll quantum.
  pub fn with_poll_interval(mut self, poll: Duration) -> Self {
    self.poll = poll;
    self
  }

  /// Uses an existing cancellation flag.
  pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
    self.shutdown = shutdown;
    self
  }

  /// A handle to this scheduler's cancellation flag.
  pub fn shutdown_handle(&self) -> Shutdown { self.shutdown.clone() }

  /// Polls until shutdown, running `cycle` whenever it is due, then calls [`Cycle::shutdown`].
  ///
  /// Cycle start times advance by whole intervals. A cycle that overruns its interval is
  /// followed immediately by the next one, but missed slots are not replayed.
  pub async fn run<C: Cycle>(&self, mut cycle: C) {
    let mut next_due =
      if self.run_immediately { Instant::now() } else { Instant::now() + self.interval };
    info!("Scheduler started, running every {:?}", self.interval);

    loop {
      if self.shutdown.is_requested() {
        info!("Shutdown requested, no further cycles will start");
        break;
      }

      let now = Instant::now();
      if now >= next_due {
        debug!("Cycle due, starting");
        cycle.run_cycle().await;
        next_due += self.interval;
        if next_due <= Instant::now() && !self.interval.is_zero() {
          warn!("Cycle overran its interval of {:?}", self.interval);
          next_due = Instant::now();
        }
        trace!("Next cycle in {:?}", next_due.saturating_duration_since(Instant::now()));
        continue;
      }

      tokio::time::sleep(self.poll.min(next_due - now)).await;
    }

    cycle.shutdown().await;
    info!("Scheduler stopped");
  }
}

#[cfg(test)]
mod tests {
  use std::{pin::Pin, sync::atomic::AtomicUsize};

  use super::*;

  /// Counts cycles and optionally raises the flag after a fixed number of them.
  struct Counter {
    cycles:     Arc<AtomicUsize>,
    stopped:    Arc<AtomicBool>,
    stop_after: Option<(usize, Shutdown)>,
  }

  impl Counter {
    fn new() -> (Self, Arc<AtomicUsize>, Arc<AtomicBool>) {
      let cycles = Arc::new(AtomicUsize::new(0));
      let stopped = Arc::new(AtomicBool::new(false));
      (Self { cycles: cycles.clone(), stopped: stopped.clone(), stop_after: None }, cycles, stopped)
    }
  }

  #[async_trait]
  impl Cycle for Counter {
    async fn run_cycle(&mut self) {
      let n = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
      if let Some((limit, shutdown)) = &self.stop_after {
        if n >= *limit {
          shutdown.request();
        }
      }
    }

    async fn shutdown(self) { self.stopped.store(true, Ordering::SeqCst); }
  }

  #[tokio::test]
  async fn test_flag_raised_mid_cycle_lets_cycle_finish() {
    let scheduler = Scheduler::new(Duration::ZERO).with_poll_interval(Duration::from_millis(1));
    let (mut counter, cycles, stopped) = Counter::new();
    counter.stop_after = Some((3, scheduler.shutdown_handle()));

    scheduler.run(counter).await;
    assert_eq!(cycles.load(Ordering::SeqCst), 3);
    assert!(stopped.load(Ordering::SeqCst));
  }

  #[tokio::test]
  async fn test_shutdown_before_start_runs_nothing() {
    let scheduler = Scheduler::new(Duration::ZERO);
    scheduler.shutdown_handle().request();
    let (counter, cycles, stopped) = Counter::new();

    scheduler.run(counter).await;
    assert_eq!(cycles.load(Ordering::SeqCst), 0);
    assert!(stopped.load(Ordering::SeqCst));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_waits_for_interval_when_not_immediate() {
    let scheduler = Scheduler::new(Duration::from_secs(3600))
      .with_run_immediately(false)
      .with_poll_interval(Duration::from_millis(5));
    let shutdown = scheduler.shutdown_handle();
    let (counter, cycles, _) = Counter::new();

    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(40)).await;
      shutdown.request();
    });
    scheduler.run(counter).await;

    assert_eq!(cycles.load(Ordering::SeqCst), 0);
    assert!(logs_contain("Shutdown requested"));
  }

  #[tokio::test]
  async fn test_runs_immediately_then_waits() {
    let scheduler = Scheduler::new(Duration::from_secs(3600)).with_poll_interval(Duration::from_millis(5));
    let shutdown = scheduler.shutdown_handle();
    let (counter, cycles, _) = Counter::new();

    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(40)).await;
      shutdown.request();
    });
    scheduler.run(counter).await;

    assert_eq!(cycles.load(Ordering::SeqCst), 1);
  }

  /// Signal source that fires `count` times and then never again.
  fn signals(count: usize) -> impl FnMut() -> Pin<Box<dyn Future<Output = &'static str>>> {
    let mut fired = 0;
    move || {
      fired += 1;
      let fire = fired <= count;
      let signal: Pin<Box<dyn Future<Output = &'static str>>> = Box::pin(async move {
        if !fire {
          std::future::pending::<()>().await;
        }
        "SIGINT"
      });
      signal
    }
  }

  #[traced_test]
  #[tokio::test]
  async fn test_first_signal_only_raises_flag() {
    let shutdown = Shutdown::new();
    let forced = Arc::new(AtomicBool::new(false));
    let flag = forced.clone();

    let listener =
      shutdown.clone().escalate(signals(1), move || flag.store(true, Ordering::SeqCst));
    assert!(tokio::time::timeout(Duration::from_millis(50), listener).await.is_err());

    assert!(shutdown.is_requested());
    assert!(!forced.load(Ordering::SeqCst));
    assert!(logs_contain("finishing the current cycle"));
  }

  #[traced_test]
  #[tokio::test]
  async fn test_second_signal_forces_exit() {
    let shutdown = Shutdown::new();
    let forced = Arc::new(AtomicBool::new(false));
    let flag = forced.clone();

    shutdown.clone().escalate(signals(2), move || flag.store(true, Ordering::SeqCst)).await;

    assert!(shutdown.is_requested());
    assert!(forced.load(Ordering::SeqCst));
    assert!(logs_contain("exiting without waiting"));
  }

  #[test]
  fn test_every_hours() {
    let scheduler = Scheduler::every_hours(6.0);
    assert_eq!(scheduler.interval, Duration::from_secs(6 * 3600));
    assert_eq!(Scheduler::every_hours(-1.0).interval, Duration::ZERO);
  }
}

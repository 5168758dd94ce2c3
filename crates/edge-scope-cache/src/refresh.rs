//! Background reconciliation of the scope cache against the directory.
//!
//! [`ScopeRefreshService`] walks the directory's full listing, writes every
//! listed identity into the cache and marks absent every previously present id
//! the listing did not mention. Cycles repeat every `refresh_rate` or earlier
//! on [`ScopeRefreshService::request_refresh`].
//!
//! # Lifecycle
//!
//! ```text
//! Idle → Listing → Diffing → Waiting → Listing → … → Stopped
//!                     ↑                    │
//!                     └── wake / period ───┘
//! ```
//!
//! A supervisor ticks at `refresh_rate` and restarts the cycle task only if it
//! has stopped, so there is never more than one cycle running.
//!
//! # Example
//!
//! ```ignore
//! let service = Arc::new(ScopeRefreshService::new(cache.clone(), &config));
//! let handle = service.start();
//!
//! // After an out-of-band hint that scope changed:
//! service.request_refresh();
//!
//! service.shutdown();
//! handle.await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use edge_identity::DirectoryError;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout_at};
use tracing::{debug, error, info, warn};

use crate::cache::DeviceScopeCache;
use crate::config::ScopeCacheConfig;

// =============================================================================
// State
// =============================================================================

/// Phase of the refresh loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshState {
    /// Not started yet.
    Idle,
    /// Walking the directory listing.
    Listing,
    /// Marking unlisted identities absent.
    Diffing,
    /// Sleeping until the next period or wake request.
    Waiting,
    /// Shut down.
    Stopped,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listing => write!(f, "listing"),
            Self::Diffing => write!(f, "diffing"),
            Self::Waiting => write!(f, "waiting"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

// =============================================================================
// Cycle Outcome
// =============================================================================

/// Counts from one refresh cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Identities returned by the listing.
    pub listed: usize,
    /// Ids marked absent because the listing omitted them.
    pub removed: usize,
    /// Per-identity writes that failed.
    pub failures: usize,
}

/// How a refresh cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The listing was walked to the end and unlisted ids were removed.
    Completed(CycleReport),
    /// A page could not be fetched. No removals were applied.
    Aborted {
        report: CycleReport,
        error: DirectoryError,
    },
    /// The listing exceeded the configured cycle timeout. No removals were applied.
    TimedOut { report: CycleReport },
    /// Shutdown had begun. Nothing was listed or removed.
    Cancelled { report: CycleReport },
}

impl CycleOutcome {
    #[must_use]
    pub fn report(&self) -> &CycleReport {
        match self {
            Self::Completed(report)
            | Self::Aborted { report, .. }
            | Self::TimedOut { report }
            | Self::Cancelled { report } => report,
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

enum ListingFailure {
    Directory(DirectoryError),
    TimedOut,
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics about the refresh service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub cycles_started: u64,
    pub cycles_completed: u64,
    /// Cycles ended by a listing failure.
    pub cycles_aborted: u64,
    /// Cycles ended by the cycle timeout.
    pub cycles_timed_out: u64,
    pub identities_listed: u64,
    pub removals_applied: u64,
    /// Per-identity write failures across all cycles.
    pub item_failures: u64,
    pub wake_requests: u64,
}

// =============================================================================
// Refresh Service
// =============================================================================

/// Periodically reconciles a [`DeviceScopeCache`] with its directory.
pub struct ScopeRefreshService {
    cache: Arc<DeviceScopeCache>,

    refresh_rate: Duration,
    cycle_timeout: Option<Duration>,

    /// Wake signal. A request made while no one waits is kept for the next wait.
    wake: Notify,

    /// Held for the duration of a cycle.
    cycle_lock: Mutex<()>,

    shutdown_tx: watch::Sender<bool>,
    state_tx: watch::Sender<RefreshState>,

    cycles_started: AtomicU64,
    cycles_completed: AtomicU64,
    cycles_aborted: AtomicU64,
    cycles_timed_out: AtomicU64,
    identities_listed: AtomicU64,
    removals_applied: AtomicU64,
    item_failures: AtomicU64,
    wake_requests: AtomicU64,
}

impl ScopeRefreshService {
    /// Create a refresh service for `cache`. Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(cache: Arc<DeviceScopeCache>, config: &ScopeCacheConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(RefreshState::Idle);

        Self {
            cache,
            refresh_rate: config.refresh_rate,
            cycle_timeout: config.cycle_timeout,
            wake: Notify::new(),
            cycle_lock: Mutex::new(()),
            shutdown_tx,
            state_tx,
            cycles_started: AtomicU64::new(0),
            cycles_completed: AtomicU64::new(0),
            cycles_aborted: AtomicU64::new(0),
            cycles_timed_out: AtomicU64::new(0),
            identities_listed: AtomicU64::new(0),
            removals_applied: AtomicU64::new(0),
            item_failures: AtomicU64::new(0),
            wake_requests: AtomicU64::new(0),
        }
    }

    /// Start the supervisor in a background task.
    ///
    /// The first cycle starts immediately. The returned handle completes after
    /// [`shutdown`](Self::shutdown) once the in-flight cycle has finished.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);

        tokio::spawn(async move {
            info!(
                refresh_rate_secs = service.refresh_rate.as_secs(),
                "Scope refresh service started"
            );

            let mut shutdown_rx = service.shutdown_tx.subscribe();
            let mut ticker = interval(service.refresh_rate);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut task: Option<JoinHandle<()>> = None;

            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        if task.as_ref().is_none_or(JoinHandle::is_finished) {
                            if task.is_some() {
                                warn!("Refresh task stopped unexpectedly, restarting");
                            }
                            debug!("Initializing refresh task");
                            task = Some(tokio::spawn(Arc::clone(&service).run()));
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            if let Some(task) = task
                && let Err(e) = task.await
            {
                error!(error = %e, "Refresh task failed");
            }

            service.state_tx.send_replace(RefreshState::Stopped);
            info!("Scope refresh service stopped");
        })
    }

    /// The cycle loop: run a cycle, then wait for a wake, the period, or shutdown.
    async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            self.run_cycle().await;

            if *shutdown_rx.borrow() {
                break;
            }

            self.set_state(RefreshState::Waiting);

            tokio::select! {
                () = self.wake.notified() => {
                    info!("Refresh signalled");
                }
                () = tokio::time::sleep(self.refresh_rate) => {
                    debug!("Refresh period elapsed");
                }
                _ = shutdown_rx.changed() => break,
            }
        }
    }

    /// Run one reconciliation cycle now.
    ///
    /// Waits for any cycle already in progress to finish first. Once shutdown
    /// has begun no new cycle starts and [`CycleOutcome::Cancelled`] is returned.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;

        if self.is_shutting_down() {
            debug!("Shutdown in progress, refresh cycle not started");
            return CycleOutcome::Cancelled {
                report: CycleReport::default(),
            };
        }

        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.set_state(RefreshState::Listing);
        info!("Starting refresh cycle");

        let mut seen = HashSet::new();
        let mut report = CycleReport::default();

        if let Err(failure) = self.list_identities(&mut seen, &mut report).await {
            self.identities_listed
                .fetch_add(report.listed as u64, Ordering::Relaxed);
            self.item_failures
                .fetch_add(report.failures as u64, Ordering::Relaxed);

            return match failure {
                ListingFailure::Directory(error) => {
                    self.cycles_aborted.fetch_add(1, Ordering::Relaxed);
                    error!(
                        error = %error,
                        listed = report.listed,
                        "Error in refresh cycle, skipping removals"
                    );
                    CycleOutcome::Aborted { report, error }
                }
                ListingFailure::TimedOut => {
                    self.cycles_timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        listed = report.listed,
                        "Refresh cycle timed out, skipping removals"
                    );
                    CycleOutcome::TimedOut { report }
                }
            };
        }

        self.set_state(RefreshState::Diffing);

        let present = self.cache.present_ids().await;
        for id in present.difference(&seen) {
            debug!(id = %id, "Identity no longer listed");
            match self.cache.apply_removal(id).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failures += 1;
                    warn!(id = %id, error = %e, "Error removing identity");
                }
            }
        }

        self.identities_listed
            .fetch_add(report.listed as u64, Ordering::Relaxed);
        self.removals_applied
            .fetch_add(report.removed as u64, Ordering::Relaxed);
        self.item_failures
            .fetch_add(report.failures as u64, Ordering::Relaxed);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);

        info!(
            listed = report.listed,
            removed = report.removed,
            failures = report.failures,
            "Done refresh cycle"
        );

        CycleOutcome::Completed(report)
    }

    /// Publishes `next` unless the service has already stopped.
    fn set_state(&self, next: RefreshState) {
        self.state_tx.send_if_modified(|state| {
            if *state == RefreshState::Stopped || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Walks the full listing, applying each identity as its page arrives.
    ///
    /// Ids are added to `seen` even if their write fails, so a failed write is
    /// never followed by a removal in the same cycle.
    async fn list_identities(
        &self,
        seen: &mut HashSet<String>,
        report: &mut CycleReport,
    ) -> Result<(), ListingFailure> {
        let deadline = self.cycle_timeout.map(|limit| Instant::now() + limit);
        let mut pages = self.cache.directory().identities();

        while pages.has_next() {
            let page = match deadline {
                Some(deadline) => timeout_at(deadline, pages.next_page())
                    .await
                    .map_err(|_| ListingFailure::TimedOut)?,
                None => pages.next_page().await,
            }
            .map_err(ListingFailure::Directory)?;

            for identity in page {
                let id = identity.id();
                report.listed += 1;
                seen.insert(id.clone());

                if let Err(e) = self.cache.apply_update(identity).await {
                    report.failures += 1;
                    warn!(id = %id, error = %e, "Error processing listed identity");
                }
            }
        }

        Ok(())
    }

    /// Wake the loop early.
    ///
    /// A request made while a cycle is running ends the following wait
    /// immediately. It never starts a second concurrent cycle.
    pub fn request_refresh(&self) {
        self.wake_requests.fetch_add(1, Ordering::Relaxed);
        debug!("Refresh requested");
        self.wake.notify_one();
    }

    /// Signal the service to shut down.
    pub fn shutdown(&self) {
        info!("Scope refresh service shutting down");
        self.shutdown_tx.send_replace(true);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Current phase of the loop.
    #[must_use]
    pub fn state(&self) -> RefreshState {
        *self.state_tx.borrow()
    }

    /// Subscribe to phase changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<RefreshState> {
        self.state_tx.subscribe()
    }

    /// Get refresh statistics.
    #[must_use]
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            cycles_aborted: self.cycles_aborted.load(Ordering::Relaxed),
            cycles_timed_out: self.cycles_timed_out.load(Ordering::Relaxed),
            identities_listed: self.identities_listed.load(Ordering::Relaxed),
            removals_applied: self.removals_applied.load(Ordering::Relaxed),
            item_failures: self.item_failures.load(Ordering::Relaxed),
            wake_requests: self.wake_requests.load(Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<DeviceScopeCache> {
        &self.cache
    }
}

// =============================================================================
// Tests
// =============================================================================

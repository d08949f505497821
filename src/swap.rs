//! Deferred replacement of the live loader archive.
//!
//! A removal leaves its result in the staged file. The swap then runs as a
//! small state machine on the host's deferred-callback timer:
//!
//! ```text
//! Idle --stage--> Staged --rename step--> Renamed --re-enable step--> Idle
//!                   ^                        |
//!                   +------ restaged --------+
//! ```
//!
//! - Starting a cycle disables the loader package so the host lets go of
//!   the live file, then waits `swap_delay` for platform file locks to clear.
//! - The rename step deletes the live archive and renames the staged one
//!   into its place. A failure is retried once after another `swap_delay`.
//!   If the retry fails too the package is re-enabled and the staged file
//!   is kept as the newest state; the next add or removal swaps it in.
//! - The re-enable step runs `reenable_delay` later. If a removal staged a
//!   new replacement in the meantime, another rename step is scheduled
//!   instead and the package stays disabled.
//!
//! Removals while `Staged` fold into the pending swap; only one cycle is
//! ever in flight. Each step takes the state lock for its file operations
//! only and never holds it across a delay or a host callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loader_host::Host;

use crate::archive::ArchivePaths;
use crate::cache::EntryCache;
use crate::config::SwapTiming;

/// Reason passed to the host when toggling the loader package
pub const LOADER_REASON: &str = "loader";

/// Rename attempts before a swap waits for the next change
const MAX_RENAME_ATTEMPTS: u32 = 2;

/// Where the archive is in the swap cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SwapPhase {
    /// No replacement pending
    #[default]
    Idle,
    /// A replacement is staged and the rename step is scheduled
    Staged,
    /// The rename is done and the re-enable step is scheduled
    Renamed {
        /// A removal staged another replacement after the rename
        restaged: bool,
    },
}

impl SwapPhase {
    pub fn is_swapping(&self) -> bool {
        !matches!(self, SwapPhase::Idle)
    }
}

/// State guarded by the archive lock
#[derive(Debug, Default)]
pub struct ArchiveState {
    pub cache: EntryCache,
    pub phase: SwapPhase,
}

pub type SharedState = Arc<Mutex<ArchiveState>>;

/// Lock the archive state.
///
/// Every critical section leaves the state consistent before doing
/// fallible I/O, so a poisoned lock is still safe to use.
pub fn lock_state(state: &Mutex<ArchiveState>) -> MutexGuard<'_, ArchiveState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives swap cycles for one loader archive.
#[derive(Clone)]
pub struct SwapScheduler {
    host: Arc<dyn Host>,
    package_name: Arc<str>,
    paths: ArchivePaths,
    timing: SwapTiming,
    state: SharedState,
}

impl SwapScheduler {
    pub fn new(
        host: Arc<dyn Host>,
        package_name: &str,
        paths: ArchivePaths,
        timing: SwapTiming,
        state: SharedState,
    ) -> Self {
        Self {
            host,
            package_name: Arc::from(package_name),
            paths,
            timing,
            state,
        }
    }

    /// Record that a replacement has been staged. Must be called with the
    /// state lock held.
    ///
    /// Returns `true` when this starts a new cycle; the caller then calls
    /// [`SwapScheduler::begin`] after releasing the lock.
    pub fn stage(&self, state: &mut ArchiveState) -> bool {
        match state.phase {
            SwapPhase::Idle => {
                state.phase = SwapPhase::Staged;
                true
            }
            SwapPhase::Staged => {
                tracing::debug!(package = %self.package_name, "removal folded into pending loader swap");
                false
            }
            SwapPhase::Renamed { .. } => {
                state.phase = SwapPhase::Renamed { restaged: true };
                tracing::debug!(package = %self.package_name, "loader restaged before re-enable");
                false
            }
        }
    }

    /// Start a cycle staged by [`SwapScheduler::stage`]. Must be called
    /// without the state lock held.
    pub fn begin(&self) {
        tracing::info!(package = %self.package_name, "disabling loader package for archive swap");
        self.host.disable_package(&self.package_name, LOADER_REASON);
        self.schedule_rename(1);
    }

    fn schedule_rename(&self, attempt: u32) {
        let this = self.clone();
        self.host.set_timeout(
            self.timing.swap_delay(),
            Box::new(move || this.rename_step(attempt)),
        );
    }

    fn schedule_reenable(&self) {
        let this = self.clone();
        self.host.set_timeout(
            self.timing.reenable_delay(),
            Box::new(move || this.reenable_step()),
        );
    }

    fn rename_step(&self, attempt: u32) {
        let mut state = lock_state(&self.state);

        match self.paths.promote_staged() {
            Ok(()) => {
                state.phase = SwapPhase::Renamed { restaged: false };
                drop(state);
                tracing::debug!(
                    path = %self.paths.live().display(),
                    "staged loader renamed into place"
                );
                self.schedule_reenable();
            }
            Err(e) if attempt < MAX_RENAME_ATTEMPTS => {
                drop(state);
                tracing::warn!(
                    path = %self.paths.live().display(),
                    attempt,
                    error = %e,
                    "loader swap failed, retrying"
                );
                self.schedule_rename(attempt + 1);
            }
            Err(e) => {
                // The staged file holds changes callers were told about.
                // Keep it: reads and writes go to it, and the next change
                // starts a new cycle.
                tracing::error!(
                    path = %self.paths.live().display(),
                    staged = %self.paths.staged().display(),
                    attempts = attempt,
                    error = %e,
                    "loader swap failed, keeping staged loader for the next change"
                );
                state.cache.invalidate();
                state.phase = SwapPhase::Idle;
                drop(state);
                self.host.reenable_package(&self.package_name, LOADER_REASON);
            }
        }
    }

    fn reenable_step(&self) {
        let mut state = lock_state(&self.state);

        if state.phase == (SwapPhase::Renamed { restaged: true }) {
            state.phase = SwapPhase::Staged;
            drop(state);
            tracing::debug!(package = %self.package_name, "swapping restaged loader");
            self.schedule_rename(1);
            return;
        }

        state.phase = SwapPhase::Idle;
        drop(state);
        tracing::info!(package = %self.package_name, "re-enabling loader package");
        self.host.reenable_package(&self.package_name, LOADER_REASON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{create, list_entries};
    use crate::mock::{HostEvent, MockHost};
    use std::time::Duration;
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir, host: &Arc<MockHost>) -> (SwapScheduler, SharedState, ArchivePaths) {
        let paths = ArchivePaths::new(dir.path().join("loader.sublime-package"));
        let state: SharedState = Arc::new(Mutex::new(ArchiveState::default()));
        let host: Arc<dyn Host> = host.clone();
        let scheduler = SwapScheduler::new(
            host,
            "loader",
            paths.clone(),
            SwapTiming::default(),
            Arc::clone(&state),
        );
        (scheduler, state, paths)
    }

    #[test]
    fn test_phase_predicates() {
        assert!(!SwapPhase::Idle.is_swapping());
        assert!(SwapPhase::Staged.is_swapping());
        assert!(SwapPhase::Renamed { restaged: false }.is_swapping());
    }

    #[test]
    fn test_stage_only_starts_one_cycle() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MockHost::new());
        let (scheduler, state, _) = scheduler(&dir, &host);

        let mut guard = lock_state(&state);
        assert!(scheduler.stage(&mut guard));
        assert!(!scheduler.stage(&mut guard));
        assert_eq!(guard.phase, SwapPhase::Staged);
    }

    #[test]
    fn test_full_cycle() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MockHost::new());
        let (scheduler, state, paths) = scheduler(&dir, &host);

        create(paths.live(), &[("old", &b"old"[..])]).unwrap();
        create(paths.staged(), &[("new", &b"new"[..])]).unwrap();

        let started = scheduler.stage(&mut lock_state(&state));
        assert!(started);
        scheduler.begin();

        assert_eq!(host.pending_timers(), 1);
        assert_eq!(host.timer_delays(), vec![Duration::from_millis(700)]);

        assert!(host.run_next_timer());
        assert_eq!(lock_state(&state).phase, SwapPhase::Renamed { restaged: false });
        assert_eq!(list_entries(paths.live()).unwrap(), vec!["new"]);
        assert!(!paths.has_staged());

        assert!(host.run_next_timer());
        assert_eq!(lock_state(&state).phase, SwapPhase::Idle);
        assert!(!host.run_next_timer());

        assert_eq!(
            host.events(),
            vec![
                HostEvent::Disabled("loader".to_string()),
                HostEvent::Reenabled("loader".to_string()),
            ]
        );
    }

    #[test]
    fn test_restaged_during_reenable_window() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MockHost::new());
        let (scheduler, state, paths) = scheduler(&dir, &host);

        create(paths.staged(), &[("first", &b"1"[..])]).unwrap();
        assert!(scheduler.stage(&mut lock_state(&state)));
        scheduler.begin();
        host.run_next_timer();

        create(paths.staged(), &[("second", &b"2"[..])]).unwrap();
        assert!(!scheduler.stage(&mut lock_state(&state)));
        assert_eq!(lock_state(&state).phase, SwapPhase::Renamed { restaged: true });

        host.run_next_timer();
        assert_eq!(lock_state(&state).phase, SwapPhase::Staged);

        host.run_all_timers();
        assert_eq!(lock_state(&state).phase, SwapPhase::Idle);
        assert_eq!(list_entries(paths.live()).unwrap(), vec!["second"]);
        assert_eq!(
            host.events(),
            vec![
                HostEvent::Disabled("loader".to_string()),
                HostEvent::Reenabled("loader".to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_rename_retries_then_gives_up() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MockHost::new());
        let (scheduler, state, paths) = scheduler(&dir, &host);

        create(paths.live(), &[("live", &b"live"[..])]).unwrap();
        lock_state(&state).cache.replace(vec!["staged".to_string()]);
        assert!(scheduler.stage(&mut lock_state(&state)));
        scheduler.begin();

        // Nothing staged on disk: both rename attempts fail
        assert!(host.run_next_timer());
        assert_eq!(lock_state(&state).phase, SwapPhase::Staged);
        assert_eq!(host.pending_timers(), 1);

        assert!(host.run_next_timer());
        let guard = lock_state(&state);
        assert_eq!(guard.phase, SwapPhase::Idle);
        assert!(!guard.cache.is_populated());
        drop(guard);

        assert_eq!(host.pending_timers(), 0);
        assert_eq!(list_entries(paths.live()).unwrap(), vec!["live"]);
        assert_eq!(
            host.events(),
            vec![
                HostEvent::Disabled("loader".to_string()),
                HostEvent::Reenabled("loader".to_string()),
            ]
        );
    }

    #[test]
    fn test_failed_rename_keeps_staged_replacement() {
        let dir = TempDir::new().unwrap();
        let host = Arc::new(MockHost::new());
        let (scheduler, state, paths) = scheduler(&dir, &host);

        // A non-empty directory at the live path cannot be deleted as a file
        std::fs::create_dir_all(paths.live().join("held")).unwrap();
        create(paths.staged(), &[("new", &b"new"[..])]).unwrap();

        assert!(scheduler.stage(&mut lock_state(&state)));
        scheduler.begin();
        assert_eq!(host.run_all_timers(), 2);

        assert_eq!(lock_state(&state).phase, SwapPhase::Idle);
        assert_eq!(list_entries(paths.staged()).unwrap(), vec!["new"]);
        assert_eq!(paths.current(), paths.staged());
    }
}

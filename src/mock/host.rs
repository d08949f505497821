//! Recording host with a manual timer queue

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use loader_host::{Deferred, Host, HostError, HostResult, Platform};

/// Host call observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Disabled(String),
    Reenabled(String),
    EntryLoaded { archive: PathBuf, entry: String },
}

struct PendingTimer {
    due: Duration,
    seq: u64,
    delay: Duration,
    callback: Deferred,
}

#[derive(Default)]
struct MockState {
    events: Vec<HostEvent>,
    timers: Vec<PendingTimer>,
    now: Duration,
    next_seq: u64,
    installed_packages: Vec<String>,
    saves: usize,
    fail_entry_loads: bool,
}

/// Host double for unit and integration tests
pub struct MockHost {
    platform: Platform,
    state: Mutex<MockState>,
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHost {
    pub fn new() -> Self {
        Self::with_platform(Platform::Linux)
    }

    pub fn with_platform(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Seed the persisted installed-package list
    pub fn with_installed_packages(self, packages: &[&str]) -> Self {
        self.lock().installed_packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Make [`Host::load_entry`] fail
    pub fn fail_entry_loads(&self, fail: bool) {
        self.lock().fail_entry_loads = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Host calls so far, in order
    pub fn events(&self) -> Vec<HostEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// Number of callbacks waiting to run
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }

    /// Requested delays of the waiting callbacks, in due order
    pub fn timer_delays(&self) -> Vec<Duration> {
        let state = self.lock();
        let mut timers: Vec<_> = state.timers.iter().map(|t| (t.due, t.seq, t.delay)).collect();
        timers.sort();
        timers.into_iter().map(|(_, _, delay)| delay).collect()
    }

    /// Run the next due callback, advancing the virtual clock to its due
    /// time. Returns `false` when the queue is empty.
    pub fn run_next_timer(&self) -> bool {
        let timer = {
            let mut state = self.lock();
            let next = state
                .timers
                .iter()
                .enumerate()
                .min_by_key(|(_, t)| (t.due, t.seq))
                .map(|(index, _)| index);
            let Some(index) = next else {
                return false;
            };
            let timer = state.timers.remove(index);
            state.now = timer.due;
            timer
        };

        (timer.callback)();
        true
    }

    /// Run callbacks until the queue is empty, including ones scheduled by
    /// the callbacks themselves. Returns how many ran.
    pub fn run_all_timers(&self) -> usize {
        let mut ran = 0;
        while self.run_next_timer() {
            ran += 1;
        }
        ran
    }

    /// Current persisted installed-package list
    pub fn installed_packages(&self) -> Vec<String> {
        self.lock().installed_packages.clone()
    }

    /// Number of times the installed-package list was saved
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }
}

impl Host for MockHost {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn disable_package(&self, package: &str, _reason: &str) {
        self.lock().events.push(HostEvent::Disabled(package.to_string()));
    }

    fn reenable_package(&self, package: &str, _reason: &str) {
        self.lock().events.push(HostEvent::Reenabled(package.to_string()));
    }

    fn set_timeout(&self, delay: Duration, callback: Deferred) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.timers.push(PendingTimer {
            due,
            seq,
            delay,
            callback,
        });
    }

    fn load_installed_packages(&self) -> HostResult<Vec<String>> {
        Ok(self.lock().installed_packages.clone())
    }

    fn save_installed_packages(&self, packages: &[String]) -> HostResult<()> {
        let mut state = self.lock();
        state.installed_packages = packages.to_vec();
        state.saves += 1;
        Ok(())
    }

    fn load_entry(&self, archive: &Path, entry: &str) -> HostResult<()> {
        let mut state = self.lock();
        if state.fail_entry_loads {
            return Err(HostError::PluginLoad {
                entry: entry.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        state.events.push(HostEvent::EntryLoaded {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
        });
        Ok(())
    }
}

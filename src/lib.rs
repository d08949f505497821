//! Loader manifest manager
//!
//! Keeps the dependency loader package of an editor host in sync with the
//! installed dependencies. Each dependency gets a small loader entry named
//! `NN-<dependency>.py`; the host runs the entries in name order at startup.
//!
//! Entries live either in one zip package archive (the default) or as files
//! in an unpacked package directory. Removing an entry from an archive the
//! host has open is done by staging a rewritten copy and swapping it in on a
//! deferred timer while the loader package is disabled.
//!
//! Everything the manager needs from the running host goes through
//! [`loader_host::Host`]. [`mock::MockHost`] drives the deferred steps by
//! hand in tests.

pub mod archive;
pub mod backend;
pub mod cache;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod mock;
pub mod naming;
pub mod swap;

pub use config::{ConfigError, Layout, LoaderConfig, SwapTiming};
pub use error::{ManifestError, ManifestResult};
pub use manager::ManifestManager;
pub use naming::{EntryMatcher, LoaderEntry, Priority};
pub use swap::SwapPhase;

pub use loader_host::{Deferred, Host, HostError, HostResult, Platform, SettingsFile, TimerHandle, TimerThread};

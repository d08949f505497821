//! In-process host for tests.
//!
//! [`MockHost`] records every lifecycle call and keeps deferred callbacks in
//! a queue driven by the test, on a virtual clock. Nothing runs until
//! [`MockHost::run_next_timer`] or [`MockHost::run_all_timers`] is called,
//! which makes the swap protocol's intermediate states observable.

mod host;

pub use host::{HostEvent, MockHost};

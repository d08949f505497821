//! Single-threaded deferred-callback executor.
//!
//! Mirrors an editor's `set_timeout`: callbacks run one at a time on a
//! dedicated thread, in deadline order, ties in submission order. A
//! callback that was scheduled always runs, including during shutdown:
//! the queue keeps accepting callbacks (through [`TimerHandle`]s) until it
//! has drained, so a callback may schedule its follow-up while the timer
//! is stopping.

use std::collections::BTreeMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::{Deferred, HostError, HostResult};

enum Message {
    Schedule(Instant, Deferred),
    Shutdown,
}

/// Cloneable handle for scheduling onto a [`TimerThread`].
#[derive(Clone)]
pub struct TimerHandle {
    sender: Sender<Message>,
}

impl TimerHandle {
    /// Schedule `callback` to run after `delay`.
    ///
    /// Fails with [`HostError::TimerClosed`] once the timer thread has
    /// drained and exited.
    pub fn set_timeout(&self, delay: Duration, callback: Deferred) -> HostResult<()> {
        self.sender
            .send(Message::Schedule(Instant::now() + delay, callback))
            .map_err(|_| HostError::TimerClosed)
    }
}

/// Background thread running deferred callbacks.
pub struct TimerThread {
    handle: TimerHandle,
    thread: Option<JoinHandle<()>>,
}

impl TimerThread {
    /// Spawn the timer thread.
    pub fn spawn() -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel::<Message>();

        let thread = thread::Builder::new()
            .name("loader-timer".to_string())
            .spawn(move || run_queue(receiver))?;

        Ok(Self {
            handle: TimerHandle { sender },
            thread: Some(thread),
        })
    }

    /// Handle that callbacks can hold to schedule follow-ups.
    pub fn handle(&self) -> TimerHandle {
        self.handle.clone()
    }

    /// Schedule `callback` to run after `delay`.
    pub fn set_timeout(&self, delay: Duration, callback: Deferred) -> HostResult<()> {
        self.handle.set_timeout(delay, callback)
    }

    /// Run every scheduled callback, including ones scheduled while
    /// draining, then stop the thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        // A send error means the thread already exited
        let _ = self.handle.sender.send(Message::Shutdown);

        // Dropped from one of its own callbacks: the thread finishes the
        // drain and exits on its own.
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            tracing::error!("loader timer thread panicked");
        }
    }
}

impl Drop for TimerThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_queue(receiver: Receiver<Message>) {
    let mut pending: BTreeMap<(Instant, u64), Deferred> = BTreeMap::new();
    let mut seq = 0u64;
    let mut open = true;

    let mut push = |pending: &mut BTreeMap<(Instant, u64), Deferred>, deadline: Instant, callback: Deferred| {
        pending.insert((deadline, seq), callback);
        seq += 1;
    };

    loop {
        let now = Instant::now();
        while let Some(entry) = pending.first_entry() {
            if entry.key().0 > now {
                break;
            }
            run_callback(entry.remove());
        }

        if !open {
            // Pick up follow-ups the callbacks just scheduled
            while let Ok(message) = receiver.try_recv() {
                if let Message::Schedule(deadline, callback) = message {
                    push(&mut pending, deadline, callback);
                }
            }
            if pending.is_empty() {
                break;
            }
        }

        let next_deadline = pending.keys().next().map(|(deadline, _)| *deadline);
        let received = match next_deadline {
            Some(deadline) => {
                receiver.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            }
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(Message::Schedule(deadline, callback)) => push(&mut pending, deadline, callback),
            Ok(Message::Shutdown) => open = false,
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                open = false;
                if let Some(deadline) = next_deadline {
                    thread::sleep(deadline.saturating_duration_since(Instant::now()));
                }
            }
        }
    }
}

fn run_callback(callback: Deferred) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        tracing::error!("deferred callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_run_in_deadline_order() {
        let timer = TimerThread::spawn().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, delay_ms) in [("late", 60u64), ("early", 5), ("middle", 30)] {
            let order = Arc::clone(&order);
            timer
                .set_timeout(
                    Duration::from_millis(delay_ms),
                    Box::new(move || order.lock().unwrap().push(label)),
                )
                .unwrap();
        }

        timer.shutdown();
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
    }

    #[test]
    fn test_ties_run_in_submission_order() {
        let timer = TimerThread::spawn().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            timer
                .set_timeout(Duration::ZERO, Box::new(move || order.lock().unwrap().push(i)))
                .unwrap();
        }

        drop(timer);
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_timer() {
        let timer = TimerThread::spawn().unwrap();
        let ran = Arc::new(Mutex::new(false));

        timer
            .set_timeout(Duration::ZERO, Box::new(|| panic!("boom")))
            .unwrap();
        let flag = Arc::clone(&ran);
        timer
            .set_timeout(
                Duration::from_millis(5),
                Box::new(move || *flag.lock().unwrap() = true),
            )
            .unwrap();

        timer.shutdown();
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_callback_can_schedule_on_shared_timer() {
        let timer = Arc::new(TimerThread::spawn().unwrap());
        let (tx, rx) = mpsc::channel();

        let inner_timer = Arc::clone(&timer);
        timer
            .set_timeout(
                Duration::from_millis(1),
                Box::new(move || {
                    inner_timer
                        .set_timeout(
                            Duration::from_millis(1),
                            Box::new(move || tx.send("nested").unwrap()),
                        )
                        .unwrap();
                }),
            )
            .unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "nested");
    }

    #[test]
    fn test_follow_up_scheduled_during_shutdown_runs() {
        let timer = TimerThread::spawn().unwrap();
        let order = Arc::new(Mutex::new(Vec::new()));

        let handle = timer.handle();
        let first = Arc::clone(&order);
        timer
            .set_timeout(
                Duration::from_millis(20),
                Box::new(move || {
                    first.lock().unwrap().push("rename");
                    let second = Arc::clone(&first);
                    handle
                        .set_timeout(
                            Duration::from_millis(5),
                            Box::new(move || second.lock().unwrap().push("reenable")),
                        )
                        .unwrap();
                }),
            )
            .unwrap();

        // Stop before the first callback is due
        timer.shutdown();
        assert_eq!(*order.lock().unwrap(), vec!["rename", "reenable"]);
    }

    #[test]
    fn test_handle_fails_after_timer_exits() {
        let timer = TimerThread::spawn().unwrap();
        let handle = timer.handle();
        timer.shutdown();

        let result = handle.set_timeout(Duration::ZERO, Box::new(|| {}));
        assert!(matches!(result, Err(HostError::TimerClosed)));
    }
}

//! Observer lists for wrapper events
//!
//! Replaces multicast delegates with explicit per-event lists invoked in
//! registration order, on the delivery thread. The list is snapshotted
//! before invocation, so a handler may freely register further observers;
//! they take effect from the next event. A panicking handler is isolated
//! and logged; it never kills the delivery thread or later handlers.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::warn;

pub(crate) type LineObserver = Arc<dyn Fn(&str) + Send + Sync>;
pub(crate) type ExitObserver = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;
pub(crate) type KillObserver = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct Observers {
    output: Mutex<Vec<LineObserver>>,
    error: Mutex<Vec<LineObserver>>,
    exited: Mutex<Vec<ExitObserver>>,
    killed: Mutex<Vec<KillObserver>>,
}

fn guarded(event: &'static str, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(event, "observer panicked; continuing delivery");
    }
}

/// Clone the list under the lock, then invoke with the lock released
fn snapshot<T: ?Sized>(list: &Mutex<Vec<Arc<T>>>) -> Vec<Arc<T>> {
    list.lock().unwrap_or_else(|e| e.into_inner()).clone()
}

impl Observers {
    pub fn push_output(&self, observer: LineObserver) {
        self.output
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn push_error(&self, observer: LineObserver) {
        self.error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn push_exited(&self, observer: ExitObserver) {
        self.exited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn push_killed(&self, observer: KillObserver) {
        self.killed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub fn notify_output(&self, line: &str) {
        for observer in snapshot(&self.output) {
            guarded("output", || observer(line));
        }
    }

    pub fn notify_error(&self, line: &str) {
        for observer in snapshot(&self.error) {
            guarded("error", || observer(line));
        }
    }

    pub fn notify_exited(&self, at: DateTime<Utc>) {
        for observer in snapshot(&self.exited) {
            guarded("exited", || observer(at));
        }
    }

    pub fn notify_killed(&self) {
        for observer in snapshot(&self.killed) {
            guarded("killed", || observer());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_observers_run_in_registration_order() {
        let observers = Observers::default();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            observers.push_output(Arc::new(move |_| {
                seen.lock().unwrap().push(tag);
            }));
        }

        observers.notify_output("line");
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_panicking_observer_does_not_stop_later_ones() {
        let observers = Observers::default();
        let count = Arc::new(AtomicUsize::new(0));

        observers.push_killed(Arc::new(|| panic!("observer bug")));
        {
            let count = count.clone();
            observers.push_killed(Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        observers.notify_killed();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registration_from_inside_a_handler_does_not_deadlock() {
        let observers = Arc::new(Observers::default());
        let late_calls = Arc::new(AtomicUsize::new(0));

        {
            let observers = observers.clone();
            let late_calls = late_calls.clone();
            observers.clone().push_output(Arc::new(move |_| {
                let late_calls = late_calls.clone();
                observers.push_output(Arc::new(move |_| {
                    late_calls.fetch_add(1, Ordering::SeqCst);
                }));
            }));
        }

        observers.notify_output("first");
        // the observer registered during "first" sees the next event
        observers.notify_output("second");
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }
}

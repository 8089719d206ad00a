//! A level-triggered event, the rendezvous primitive shared by a `sent` /
//! `consumed` pair on an edge reference.
//!
//! `tokio::sync::Notify` is edge-triggered (a `notify_waiters` call is lost on
//! anyone not already waiting), so the level state is tracked separately in a
//! `Cell<bool>` and `wait` re-checks it around the notified future to avoid
//! the missed-wakeup race.

use std::cell::Cell as StdCell;
use std::rc::Rc;
use tokio::sync::Notify;

#[derive(Clone)]
pub struct Signal(Rc<Inner>);

struct Inner {
    flag: StdCell<bool>,
    notify: Notify,
}

impl Signal {
    pub fn new() -> Self {
        Self(Rc::new(Inner {
            flag: StdCell::new(false),
            notify: Notify::new(),
        }))
    }

    pub fn set(&self) {
        self.0.flag.set(true);
        self.0.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.0.flag.set(false);
    }

    pub fn is_set(&self) -> bool {
        self.0.flag.get()
    }

    /// Waits until the signal is set, without clearing it.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let notified = self.0.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }

    /// Waits until the signal is set or `timeout` elapses; returns whether it
    /// was observed set.
    pub async fn wait_timeout(&self, timeout: std::time::Duration) -> bool {
        if self.is_set() {
            return true;
        }
        tokio::select! {
            _ = self.wait() => true,
            _ = tokio::time::sleep(timeout) => self.is_set(),
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

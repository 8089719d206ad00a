//! A single-threaded, `LocalSet`-backed [`Scheduler`]: the piece that turns
//! "this input needs a value from that component" into an actual running
//! task, lazily and only once per component.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use log::{debug, warn};
use portwire_core::component::{ComponentHandle, ComponentState, Scheduler};

use crate::component::Driver;

type ComponentKey = *const dyn ComponentHandle;

fn key_of(handle: &Rc<dyn ComponentHandle>) -> ComponentKey {
    Rc::as_ptr(handle)
}

/// Drives components on demand: `create_task_if_needed` spawns a `forward`
/// loop for a peer the first time it's needed, and again after that loop has
/// exited (e.g. the peer hit its bounded iteration count and stopped, then a
/// downstream consumer asks for one more value).
///
/// Must be registered and run from inside a `tokio::task::LocalSet`, since
/// ports are `Rc`-based and not `Send`.
pub struct LocalScheduler {
    self_ref: Weak<Self>,
    drivers: RefCell<HashMap<ComponentKey, Rc<dyn Driver>>>,
    running: RefCell<HashSet<ComponentKey>>,
}

impl LocalScheduler {
    pub fn new() -> Rc<Self> {
        Rc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            drivers: RefCell::new(HashMap::new()),
            running: RefCell::new(HashSet::new()),
        })
    }

    /// Registers the driver for a component. Must be called before any port
    /// connected to it tries to rendezvous.
    pub fn register(&self, driver: Rc<dyn Driver>) {
        let key = key_of(&driver.clone().handle());
        self.drivers.borrow_mut().insert(key, driver);
    }

    fn spawn_loop(&self, driver: Rc<dyn Driver>) {
        let scheduler = self.self_ref.upgrade().expect("scheduler outlives its own tasks");
        let handle = driver.clone().handle();
        let key = key_of(&handle);
        tokio::task::spawn_local(async move {
            loop {
                if handle.is_stopped() {
                    break;
                }
                if let Err(e) = driver.clone().step().await {
                    debug!("{} stopped driving: {e}", handle.name());
                    // A clean stop already set Stopped/StoppedAtIter before
                    // `step` could return an error at all, so this only fires
                    // for a step that failed mid-flight (e.g. its own peer
                    // stopped underneath it) — mark it terminal too, or its
                    // downstream peers would never observe it as stopped.
                    if !handle.is_stopped() {
                        handle.set_state(ComponentState::Failed, Some(&e.to_string()));
                    }
                    break;
                }
            }
            scheduler.running.borrow_mut().remove(&key);
        });
    }
}

impl Scheduler for LocalScheduler {
    fn create_task_if_needed(&self, _requester: &Rc<dyn ComponentHandle>, peer: &Rc<dyn ComponentHandle>) {
        let key = key_of(peer);
        if peer.is_stopped() || self.running.borrow().contains(&key) {
            return;
        }
        let Some(driver) = self.drivers.borrow().get(&key).cloned() else {
            warn!("no driver registered for component '{}'", peer.name());
            return;
        };
        self.running.borrow_mut().insert(key);
        self.spawn_loop(driver);
    }
}

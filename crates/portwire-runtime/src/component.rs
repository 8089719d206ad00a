//! A concrete [`ComponentHandle`] suitable for embedding in a component
//! struct, plus the [`Driver`] contract the scheduler uses to step one.

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use log::trace;
use portwire_core::component::{ComponentHandle, ComponentState};
use portwire_core::CoreError;

/// State and bookkeeping shared by every component built on this runtime.
/// Embed one as a field and delegate [`ComponentHandle`] to it.
pub struct ComponentBase {
    name: String,
    state: Cell<ComponentState>,
    label: RefCell<Option<String>>,
    stopping_iteration: Cell<u32>,
}

impl ComponentBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Cell::new(ComponentState::Created),
            label: RefCell::new(None),
            stopping_iteration: Cell::new(0),
        }
    }

    /// Builds a base that stops after `n` iterations of bounded (polling)
    /// rendezvous waits, per SPEC_FULL.md §4.7.
    pub fn with_stopping_iteration(name: impl Into<String>, n: u32) -> Self {
        let base = Self::new(name);
        base.stopping_iteration.set(n);
        base
    }

    pub fn label(&self) -> Option<String> {
        self.label.borrow().clone()
    }

    /// Marks the component stopped. Idempotent, and distinguishable from a
    /// bounded-iteration stop via [`ComponentState::StoppedAtIter`].
    pub fn stop(&self, at_iter: bool) {
        self.set_state(
            if at_iter {
                ComponentState::StoppedAtIter
            } else {
                ComponentState::Stopped
            },
            None,
        );
    }

    /// Marks the component failed, e.g. a driver's `step` returned an error
    /// unrelated to a peer stopping. Also propagates to downstream peers via
    /// `is_stopped`/`ComponentStopped`, same as a clean stop.
    pub fn fail(&self, reason: &str) {
        self.set_state(ComponentState::Failed, Some(reason));
    }
}

impl ComponentHandle for ComponentBase {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> ComponentState {
        self.state.get()
    }

    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        trace!("{} -> {state:?} {label:?}", self.name);
        self.state.set(state);
        *self.label.borrow_mut() = label.map(str::to_string);
    }

    fn is_stopped(&self) -> bool {
        matches!(
            self.state.get(),
            ComponentState::Stopped | ComponentState::StoppedAtIter | ComponentState::Failed
        )
    }

    fn stopping_iteration(&self) -> u32 {
        self.stopping_iteration.get()
    }
}

/// One runnable step of a component's body, e.g. `Constant::forward` or
/// `Adder::forward` receiving its inputs and sending its output once. The
/// scheduler re-invokes this in a loop until the component stops or a step
/// returns an error.
pub trait Driver: ComponentHandle {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle>;

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>>;
}

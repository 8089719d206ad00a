//! The external collaborators the core relies on but does not implement:
//! component lifecycle/state and the cooperative task scheduler. A real
//! component lifecycle and scheduler are provided by `portwire-runtime`; this
//! module only defines the contract.

use std::rc::Rc;

/// The state labels the core itself sets (`Running`, `ReceivingParams`,
/// `SendingParams`) plus the ones it only reads (`StoppedAtIter`, and the
/// `is_stopped` predicate on the handle covers any other terminal state).
/// `Created` and `Failed` round out a real component lifecycle (a component
/// exists before it ever runs, and can exit abnormally rather than by
/// stopping cleanly); the core itself never sets or reads either. `Other` is
/// the umbrella for anything further a richer lifecycle may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ComponentState {
    Created,
    Running,
    ReceivingParams,
    SendingParams,
    StoppedAtIter,
    Stopped,
    Failed,
    Other,
}

/// The minimal view of a component that the wiring core needs: its current
/// state, whether it has stopped, and how many bounded iterations remain (0 =
/// unbounded / normal wait mode).
pub trait ComponentHandle {
    fn name(&self) -> &str;
    fn state(&self) -> ComponentState;
    fn set_state(&self, state: ComponentState, label: Option<&str>);
    fn is_stopped(&self) -> bool;
    fn stopping_iteration(&self) -> u32;
}

/// The cooperative task-creation hook. Called on every `send`/`receive`
/// round, not only once, so that a peer whose task ended under
/// bounded-iteration mode gets restarted. Implementations must be idempotent.
pub trait Scheduler {
    fn create_task_if_needed(
        &self,
        requester: &Rc<dyn ComponentHandle>,
        peer: &Rc<dyn ComponentHandle>,
    );
}

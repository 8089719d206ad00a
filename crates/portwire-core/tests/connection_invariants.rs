//! Property tests over random sequences of connect/disconnect operations,
//! checking the invariants SPEC_FULL.md §10.6 commits to: fan-in stays ≤ 1,
//! the two endpoints' reference bookkeeping never drifts apart, and a
//! disconnect of a pair that isn't currently connected is always a reported
//! `NotConnected` lookup miss rather than a silent no-op.

use std::cell::Cell as StdCell;
use std::rc::Rc;

use portwire_core::component::{ComponentHandle, ComponentState, Scheduler};
use portwire_core::{CoreError, InputPort, OutputPort, ScalarType, TypeDescriptor};
use proptest::prelude::*;

struct FakeComponent {
    name: String,
    state: StdCell<ComponentState>,
}

impl FakeComponent {
    fn new(name: &str) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            state: StdCell::new(ComponentState::Running),
        })
    }
}

impl ComponentHandle for FakeComponent {
    fn name(&self) -> &str {
        &self.name
    }
    fn state(&self) -> ComponentState {
        self.state.get()
    }
    fn set_state(&self, state: ComponentState, _label: Option<&str>) {
        self.state.set(state);
    }
    fn is_stopped(&self) -> bool {
        matches!(self.state.get(), ComponentState::Stopped | ComponentState::StoppedAtIter)
    }
    fn stopping_iteration(&self) -> u32 {
        0
    }
}

struct NoopScheduler;

impl Scheduler for NoopScheduler {
    fn create_task_if_needed(&self, _requester: &Rc<dyn ComponentHandle>, _peer: &Rc<dyn ComponentHandle>) {}
}

fn scheduler() -> Rc<dyn Scheduler> {
    Rc::new(NoopScheduler)
}

/// One step of a random connect/disconnect sequence against a fixed set of
/// three candidate outputs all racing to connect to the same single input,
/// which is exactly the shape fan-in ≤ 1 constrains.
#[derive(Debug, Clone, Copy)]
enum ConnOp {
    Connect(usize),
    Disconnect(usize),
}

fn conn_op() -> impl Strategy<Value = ConnOp> {
    prop_oneof![
        (0usize..3).prop_map(ConnOp::Connect),
        (0usize..3).prop_map(ConnOp::Disconnect),
    ]
}

proptest! {
    /// After every prefix of a random op sequence: at most one output is
    /// connected to the shared input at a time, both endpoints' reference
    /// counters agree with that, and a disconnect that doesn't match the
    /// currently-connected pair is always `NotConnected`, never silently
    /// accepted.
    #[test]
    fn fan_in_and_bookkeeping_stay_consistent(ops in prop::collection::vec(conn_op(), 0..30)) {
        let owners: Vec<_> = (0..3).map(|i| FakeComponent::new(&format!("o{i}"))).collect();
        let outputs: Vec<OutputPort> = owners
            .iter()
            .enumerate()
            .map(|(i, owner)| {
                OutputPort::new(
                    format!("o{i}"),
                    TypeDescriptor::Scalar(ScalarType::Int),
                    None,
                    None,
                    Rc::downgrade(owner),
                    scheduler(),
                )
                .unwrap()
            })
            .collect();
        let input_owner = FakeComponent::new("i");
        let input = InputPort::new(
            "i",
            TypeDescriptor::Scalar(ScalarType::Int),
            None,
            None,
            Rc::downgrade(&input_owner),
            scheduler(),
        )
        .unwrap();

        let mut connected: Option<usize> = None;

        for op in ops {
            match op {
                ConnOp::Connect(idx) => match outputs[idx].connect(&input) {
                    Ok(()) => {
                        prop_assert!(connected.is_none(), "connect succeeded while fan-in already held");
                        connected = Some(idx);
                    }
                    Err(CoreError::FanInExceeded { .. }) => {
                        prop_assert!(connected.is_some(), "rejected a connect with no existing owner");
                    }
                    Err(e) => prop_assert!(false, "unexpected connect error: {e}"),
                },
                ConnOp::Disconnect(idx) => match outputs[idx].disconnect(&input) {
                    Ok(()) => {
                        prop_assert_eq!(connected, Some(idx), "disconnect succeeded against the wrong owner");
                        connected = None;
                    }
                    Err(CoreError::NotConnected { .. }) => {
                        prop_assert_ne!(
                            connected,
                            Some(idx),
                            "the actually-connected pair was reported as not connected"
                        );
                    }
                    Err(e) => prop_assert!(false, "unexpected disconnect error: {e}"),
                },
            }

            prop_assert_eq!(input.ref_counter(None), if connected.is_some() { 1 } else { 0 });
            for (j, output) in outputs.iter().enumerate() {
                let expected = if connected == Some(j) { 1 } else { 0 };
                prop_assert_eq!(output.ref_counter(None), expected, "output {j} reference count drifted");
            }
        }
    }
}

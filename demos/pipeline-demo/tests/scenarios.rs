//! Integration tests driving the six scenarios of SPEC_FULL.md §8 end to end
//! through `portwire-runtime::LocalScheduler`, using the demo components.

use std::rc::Rc;

use pipeline_demo::{Adder, Constant, Sink, Stack, Unbind};
use portwire_core::component::{ComponentHandle, ComponentState};
use portwire_core::{CoreError, InputPort, OutputPort, ScalarType, Tensor, TypeDescriptor, Value};
use portwire_runtime::{ComponentBase, Driver, LocalScheduler};

/// Initializes `env_logger` once per test binary, so `portwire-core`'s
/// `trace!`/`debug!`/`warn!` output is visible with `RUST_LOG=trace cargo test`.
fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A bare component with no `Driver`, used only to own one or two ports for
/// tests that exercise the connection algebra directly rather than through a
/// running pipeline.
struct Anchor(ComponentBase);

impl Anchor {
    fn new(name: &str) -> Rc<Self> {
        Rc::new(Self(ComponentBase::new(name)))
    }
}

impl ComponentHandle for Anchor {
    fn name(&self) -> &str {
        self.0.name()
    }
    fn state(&self) -> ComponentState {
        self.0.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.0.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.0.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.0.stopping_iteration()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn scalar_pass_through_through_a_running_pipeline() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            let source = Constant::new(
                "source",
                TypeDescriptor::Scalar(ScalarType::Int),
                Value::Int(7),
                Some(1),
                scheduler.clone(),
            );
            let sink = Sink::new("sink", TypeDescriptor::Scalar(ScalarType::Int), scheduler.clone());
            source.out.connect(&sink.inp).unwrap();
            scheduler.register(source.clone());

            sink.clone().step().await.unwrap();

            assert_eq!(sink.received(), vec![Value::Int(7)]);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn list_fan_in_stacks_two_sources_by_index() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            let a = Constant::new(
                "a",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                Value::Tensor(Tensor::scalar(1.0)),
                Some(1),
                scheduler.clone(),
            );
            let b = Constant::new(
                "b",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                Value::Tensor(Tensor::scalar(2.0)),
                Some(1),
                scheduler.clone(),
            );
            let stack = Stack::new("stack", scheduler.clone());
            let sink = Sink::new("sink", TypeDescriptor::Scalar(ScalarType::Tensor), scheduler.clone());

            a.out.connect(&stack.tensors.select(1).unwrap()).unwrap();
            b.out.connect(&stack.tensors.select(0).unwrap()).unwrap();
            stack.out.connect(&sink.inp).unwrap();

            scheduler.register(a.clone());
            scheduler.register(b.clone());
            scheduler.register(stack.clone());

            sink.clone().step().await.unwrap();

            assert_eq!(
                sink.received(),
                vec![Value::Tensor(Tensor::new(vec![2], vec![2.0, 1.0]))]
            );
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn rendezvous_preserves_send_order_across_three_values() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            // `Constant` is only used here as a convenient `Anchor`-with-port;
            // its own `send` is driven manually below to pin down ordering.
            let source = Constant::new(
                "source",
                TypeDescriptor::Scalar(ScalarType::Int),
                Value::Int(0),
                Some(0),
                scheduler.clone(),
            );
            let sink = Sink::new("sink", TypeDescriptor::Scalar(ScalarType::Int), scheduler.clone());
            source.out.connect(&sink.inp).unwrap();

            let producer = async {
                for v in [1i64, 2, 3] {
                    source.out.send(Value::Int(v)).await.unwrap();
                }
            };
            let consumer = async {
                for _ in 0..3 {
                    sink.clone().step().await.unwrap();
                }
            };
            tokio::join!(producer, consumer);

            assert_eq!(sink.received(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        })
        .await;
}

#[test]
fn fan_in_rejection_leaves_first_connection_intact() {
    init_logging();
    let pa = Anchor::new("a");
    let pb = Anchor::new("b");
    let pi = Anchor::new("i");
    let scheduler = LocalScheduler::new();
    let a = OutputPort::new(
        "a",
        TypeDescriptor::Scalar(ScalarType::Int),
        None,
        None,
        Rc::downgrade(&pa),
        scheduler.clone(),
    )
    .unwrap();
    let b = OutputPort::new(
        "b",
        TypeDescriptor::Scalar(ScalarType::Int),
        None,
        None,
        Rc::downgrade(&pb),
        scheduler.clone(),
    )
    .unwrap();
    let i = InputPort::new(
        "i",
        TypeDescriptor::Scalar(ScalarType::Int),
        None,
        None,
        Rc::downgrade(&pi),
        scheduler,
    )
    .unwrap();

    a.connect(&i).unwrap();
    let err = b.connect(&i).unwrap_err();
    assert!(matches!(err, CoreError::FanInExceeded { .. }));
    assert_eq!(i.ref_counter(None), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn termination_propagates_through_a_running_pipeline() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            let source = Constant::new(
                "source",
                TypeDescriptor::Scalar(ScalarType::Int),
                Value::Int(7),
                None,
                scheduler.clone(),
            );
            // Bounded/polling mode so a peer that stops without ever sending
            // is observed on the next poll tick instead of hanging forever.
            let sink = Sink::new_bounded("sink", TypeDescriptor::Scalar(ScalarType::Int), scheduler.clone());
            source.out.connect(&sink.inp).unwrap();

            source.set_state(ComponentState::Stopped, None);

            let err = sink.inp.receive().await.expect_err("peer stopped without sending");
            assert!(matches!(err, CoreError::ComponentStopped { .. }));
        })
        .await;
}

#[test]
fn type_mismatch_on_pre_valued_connect_is_rejected() {
    init_logging();
    let po = Anchor::new("o");
    let pi = Anchor::new("i");
    let scheduler = LocalScheduler::new();
    let o = OutputPort::new(
        "o",
        TypeDescriptor::Scalar(ScalarType::Int),
        Some(Value::Int(7)),
        None,
        Rc::downgrade(&po),
        scheduler.clone(),
    )
    .unwrap();
    let i = InputPort::new(
        "i",
        TypeDescriptor::Scalar(ScalarType::String),
        None,
        None,
        Rc::downgrade(&pi),
        scheduler,
    )
    .unwrap();

    let err = o.connect(&i).unwrap_err();
    assert!(matches!(err, CoreError::TypeMismatch(_)));
    assert_eq!(i.ref_counter(None), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn adder_sums_two_tensor_sources() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            let a = Constant::new(
                "a",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                Value::Tensor(Tensor::scalar(3.0)),
                Some(1),
                scheduler.clone(),
            );
            let b = Constant::new(
                "b",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                Value::Tensor(Tensor::scalar(4.0)),
                Some(1),
                scheduler.clone(),
            );
            let adder = Adder::new("adder", scheduler.clone());
            let sink = Sink::new("sink", TypeDescriptor::Scalar(ScalarType::Tensor), scheduler.clone());

            a.out.connect(&adder.a).unwrap();
            b.out.connect(&adder.b).unwrap();
            adder.out.connect(&sink.inp).unwrap();

            scheduler.register(a.clone());
            scheduler.register(b.clone());
            scheduler.register(adder.clone());

            sink.clone().step().await.unwrap();

            assert_eq!(sink.received(), vec![Value::Tensor(Tensor::scalar(7.0))]);
        })
        .await;
}

#[tokio::test(flavor = "current_thread")]
async fn unbind_fans_a_tensor_out_by_index() {
    init_logging();
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = LocalScheduler::new();
            let source = Constant::new(
                "source",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                Value::Tensor(Tensor::new(vec![2], vec![1.0, 2.0])),
                Some(1),
                scheduler.clone(),
            );
            let unbind = Unbind::new("unbind", scheduler.clone());
            let first = Sink::new("first", TypeDescriptor::Scalar(ScalarType::Tensor), scheduler.clone());
            let second = Sink::new("second", TypeDescriptor::Scalar(ScalarType::Tensor), scheduler.clone());

            source.out.connect(&unbind.input).unwrap();
            unbind.out.select(0).unwrap().connect(&first.inp).unwrap();
            unbind.out.select(1).unwrap().connect(&second.inp).unwrap();

            scheduler.register(source.clone());
            scheduler.register(unbind.clone());

            let (r1, r2) = tokio::join!(first.clone().step(), second.clone().step());
            r1.unwrap();
            r2.unwrap();

            assert_eq!(first.received(), vec![Value::Tensor(Tensor::scalar(1.0))]);
            assert_eq!(second.received(), vec![Value::Tensor(Tensor::scalar(2.0))]);
        })
        .await;
}

//! Test components mirroring `tests/core/components.py` from the original
//! source: a constant source, an elementwise adder, and the `Stack`/`Unbind`
//! pair that exercises subscriptable ports from both the fan-in and fan-out
//! side. Renamed to fit a tensor-pipeline vocabulary rather than the audio
//! one, but each keeps the shape of its Python counterpart.

use std::cell::{Cell as StdCell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use portwire_core::component::{ComponentHandle, ComponentState, Scheduler};
use portwire_core::{CoreError, InputPort, OutputPort, ScalarType, SequenceKind, Tensor, TypeDescriptor, Value};
use portwire_runtime::{ComponentBase, Driver};

fn add_tensors(a: &Tensor, b: &Tensor) -> Tensor {
    let data: Vec<f32> = a.data.iter().zip(b.data.iter()).map(|(x, y)| x + y).collect();
    Tensor::new(a.shape.clone(), data)
}

fn stack_tensors(items: &[Value]) -> Tensor {
    let data: Vec<f32> = items
        .iter()
        .map(|v| match v {
            Value::Tensor(t) => t.data.first().copied().unwrap_or(0.0),
            other => panic!("Stack received a non-tensor element: {other:?}"),
        })
        .collect();
    Tensor::new(vec![data.len()], data)
}

fn unbind_tensor(t: &Tensor) -> Vec<Value> {
    t.data.iter().map(|&x| Value::Tensor(Tensor::scalar(x))).collect()
}

/// Sends the same value every step, optionally stopping after `times` sends.
pub struct Constant {
    base: ComponentBase,
    pub out: OutputPort,
    value: Value,
    remaining: StdCell<Option<u32>>,
}

impl Constant {
    pub fn new(
        name: impl Into<String>,
        declared_type: TypeDescriptor,
        value: Value,
        times: Option<u32>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::new(name),
            out: OutputPort::new("out", declared_type, None, None, weak.clone(), scheduler)
                .expect("no initial value makes this construction infallible"),
            value,
            remaining: StdCell::new(times),
        })
    }
}

impl ComponentHandle for Constant {
    fn name(&self) -> &str {
        self.base.name()
    }
    fn state(&self) -> ComponentState {
        self.base.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.base.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.base.stopping_iteration()
    }
}

impl Driver for Constant {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle> {
        self
    }

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>> {
        Box::pin(async move {
            if self.remaining.get() == Some(0) {
                self.base.stop(false);
                return Ok(());
            }
            self.out.send(self.value.clone()).await?;
            if let Some(n) = self.remaining.get() {
                self.remaining.set(Some(n - 1));
            }
            Ok(())
        })
    }
}

/// Elementwise sum of two tensor inputs.
pub struct Adder {
    base: ComponentBase,
    pub a: InputPort,
    pub b: InputPort,
    pub out: OutputPort,
}

impl Adder {
    pub fn new(name: impl Into<String>, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let name = name.into();
        let tensor_ty = TypeDescriptor::Scalar(ScalarType::Tensor);
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::new(name),
            a: InputPort::new("a", tensor_ty.clone(), None, None, weak.clone(), scheduler.clone())
                .expect("infallible"),
            b: InputPort::new("b", tensor_ty.clone(), None, None, weak.clone(), scheduler.clone())
                .expect("infallible"),
            out: OutputPort::new("out", tensor_ty, None, None, weak.clone(), scheduler).expect("infallible"),
        })
    }
}

impl ComponentHandle for Adder {
    fn name(&self) -> &str {
        self.base.name()
    }
    fn state(&self) -> ComponentState {
        self.base.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.base.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.base.stopping_iteration()
    }
}

impl Driver for Adder {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle> {
        self
    }

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>> {
        Box::pin(async move {
            let (a, b) = tokio::join!(self.a.receive(), self.b.receive());
            let (Value::Tensor(ta), Value::Tensor(tb)) = (a?, b?) else {
                panic!("Adder's inputs must be tensors");
            };
            self.out.send(Value::Tensor(add_tensors(&ta, &tb))).await
        })
    }
}

/// Stacks a list-typed input (fed element by element via indexed connections)
/// into a single tensor output.
pub struct Stack {
    base: ComponentBase,
    pub tensors: InputPort,
    pub out: OutputPort,
}

impl Stack {
    pub fn new(name: impl Into<String>, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::new(name),
            tensors: InputPort::new(
                "tensors",
                TypeDescriptor::Sequence(ScalarType::Tensor, SequenceKind::List),
                None,
                None,
                weak.clone(),
                scheduler.clone(),
            )
            .expect("infallible"),
            out: OutputPort::new(
                "out",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                None,
                None,
                weak.clone(),
                scheduler,
            )
            .expect("infallible"),
        })
    }
}

impl ComponentHandle for Stack {
    fn name(&self) -> &str {
        self.base.name()
    }
    fn state(&self) -> ComponentState {
        self.base.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.base.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.base.stopping_iteration()
    }
}

impl Driver for Stack {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle> {
        self
    }

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>> {
        Box::pin(async move {
            let Value::List(items) = self.tensors.receive().await? else {
                panic!("Stack's input must resolve to a list");
            };
            self.out.send(Value::Tensor(stack_tensors(&items))).await
        })
    }
}

/// Unbinds a tensor input into a list-typed output, downstream ports select
/// individual elements with `out.select(i)`.
pub struct Unbind {
    base: ComponentBase,
    pub input: InputPort,
    pub out: OutputPort,
}

impl Unbind {
    pub fn new(name: impl Into<String>, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::new(name),
            input: InputPort::new(
                "input",
                TypeDescriptor::Scalar(ScalarType::Tensor),
                None,
                None,
                weak.clone(),
                scheduler.clone(),
            )
            .expect("infallible"),
            out: OutputPort::new(
                "out",
                TypeDescriptor::Sequence(ScalarType::Tensor, SequenceKind::List),
                None,
                None,
                weak.clone(),
                scheduler,
            )
            .expect("infallible"),
        })
    }
}

impl ComponentHandle for Unbind {
    fn name(&self) -> &str {
        self.base.name()
    }
    fn state(&self) -> ComponentState {
        self.base.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.base.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.base.stopping_iteration()
    }
}

impl Driver for Unbind {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle> {
        self
    }

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>> {
        Box::pin(async move {
            let Value::Tensor(t) = self.input.receive().await? else {
                panic!("Unbind's input must be a tensor");
            };
            self.out.send(Value::List(Arc::new(unbind_tensor(&t)))).await
        })
    }
}

/// Records every value it receives, for test assertions.
pub struct Sink {
    base: ComponentBase,
    pub inp: InputPort,
    received: RefCell<Vec<Value>>,
}

impl Sink {
    pub fn new(name: impl Into<String>, declared_type: TypeDescriptor, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::new(name),
            inp: InputPort::new("inp", declared_type, None, None, weak.clone(), scheduler).expect("infallible"),
            received: RefCell::new(Vec::new()),
        })
    }

    /// Builds a sink in bounded/polling mode, so a peer that stops without
    /// ever sending is observed on the next poll tick instead of hanging
    /// `receive()` forever. See `portwire_core::port::InputPort::receive`.
    pub fn new_bounded(name: impl Into<String>, declared_type: TypeDescriptor, scheduler: Rc<dyn Scheduler>) -> Rc<Self> {
        let name = name.into();
        Rc::new_cyclic(|weak: &Weak<Self>| Self {
            base: ComponentBase::with_stopping_iteration(name, 1),
            inp: InputPort::new("inp", declared_type, None, None, weak.clone(), scheduler).expect("infallible"),
            received: RefCell::new(Vec::new()),
        })
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.borrow().clone()
    }
}

impl ComponentHandle for Sink {
    fn name(&self) -> &str {
        self.base.name()
    }
    fn state(&self) -> ComponentState {
        self.base.state()
    }
    fn set_state(&self, state: ComponentState, label: Option<&str>) {
        self.base.set_state(state, label)
    }
    fn is_stopped(&self) -> bool {
        self.base.is_stopped()
    }
    fn stopping_iteration(&self) -> u32 {
        self.base.stopping_iteration()
    }
}

impl Driver for Sink {
    fn handle(self: Rc<Self>) -> Rc<dyn ComponentHandle> {
        self
    }

    fn step(self: Rc<Self>) -> Pin<Box<dyn Future<Output = Result<(), CoreError>>>> {
        Box::pin(async move {
            let v = self.inp.receive().await?;
            self.received.borrow_mut().push(v);
            Ok(())
        })
    }
}

//! Ports: the named, typed endpoints owned by a component, and the
//! connection algebra and send/receive rendezvous layered on top of them.

use std::collections::HashMap;
use std::collections::HashSet;
use std::ops::Shr;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{trace, warn};

use crate::cell::{AggregateEntry, Aggregator, Cell, IndexedCell, ValueCell};
use crate::component::{ComponentHandle, ComponentState, Scheduler};
use crate::edge::EdgeRef;
use crate::error::CoreError;
use crate::signal::Signal;
use crate::types::{check_type, TypeDescriptor, Value};

/// How long a bounded-iteration wait re-polls each unsent reference before
/// re-requesting task creation. Intentionally not exposed as a knob — see
/// SPEC_FULL.md §9.
const ITERATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A named, typed port owned by a component. Use [`InputPort`] or
/// [`OutputPort`] to additionally get `receive`/`send`.
pub struct Port {
    name: String,
    declared_type: TypeDescriptor,
    arg_name: Option<String>,
    parent: Weak<dyn ComponentHandle>,
    scheduler: Rc<dyn Scheduler>,
    cell: std::cell::RefCell<Cell>,
    refs: std::cell::RefCell<HashMap<Option<usize>, HashSet<EdgeRef>>>,
    is_subscriptable: bool,
}

impl Port {
    pub fn new(
        name: impl Into<String>,
        declared_type: TypeDescriptor,
        initial_value: Option<Value>,
        arg_name: Option<String>,
        parent: Weak<dyn ComponentHandle>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Rc<Self>, CoreError> {
        let name = name.into();
        let cell = if let Some(v) = &initial_value {
            check_type(&name, v, &declared_type)?;
            Cell::Plain(ValueCell::with_value(v.clone()))
        } else {
            Cell::empty()
        };
        let is_subscriptable = declared_type.is_subscriptable();
        Ok(Rc::new(Port {
            name,
            declared_type,
            arg_name,
            parent,
            scheduler,
            cell: std::cell::RefCell::new(cell),
            refs: std::cell::RefCell::new(HashMap::new()),
            is_subscriptable,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_type(&self) -> &TypeDescriptor {
        &self.declared_type
    }

    pub fn arg_name(&self) -> Option<&str> {
        self.arg_name.as_deref()
    }

    pub fn is_subscriptable(&self) -> bool {
        self.is_subscriptable
    }

    pub fn value(&self) -> Option<Value> {
        match &*self.cell.borrow() {
            Cell::Plain(vc) => vc.get(),
            Cell::Indexed(ic) => ic.value(),
            Cell::Aggregate(agg) => Some(self.declared_type.wrap_sequence(agg.ordered_values())),
        }
    }

    pub fn set_value(&self, value: Value) -> Result<(), CoreError> {
        let cell = self.cell.borrow();
        match &*cell {
            Cell::Plain(vc) => {
                check_type(&self.name, &value, &self.declared_type)?;
                vc.set(value);
                Ok(())
            }
            _ => Err(CoreError::ImmutableCell(self.name.clone())),
        }
    }

    pub fn references(&self) -> Vec<EdgeRef> {
        self.refs.borrow().values().flatten().cloned().collect()
    }

    pub fn ref_counter(&self, index: Option<usize>) -> usize {
        match index {
            Some(_) => self.refs.borrow().get(&index).map_or(0, |s| s.len()),
            None => self.refs.borrow().values().map(|s| s.len()).sum(),
        }
    }

    /// Returns an indexed handle, usable to build a connection or read an
    /// individual element. `index`/`ref_counter` on the handle raise
    /// [`CoreError::UnsupportedQuery`] if this port's cell is already an
    /// aggregator (the handle is then a placeholder for a fresh connection,
    /// not a live per-index address).
    pub fn select(self: &Rc<Self>, i: usize) -> Result<IndexedHandle, CoreError> {
        if !self.is_subscriptable {
            return Err(CoreError::UnsubscriptablePort(self.name.clone()));
        }
        let phantom = matches!(&*self.cell.borrow(), Cell::Aggregate(_));
        Ok(IndexedHandle {
            port: self.clone(),
            index: i,
            phantom,
        })
    }

    pub fn connect(self: &Rc<Self>, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        connect(Endpoint::Whole(self.clone()), dst.into_endpoint())
    }

    pub fn disconnect(self: &Rc<Self>, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        disconnect(Endpoint::Whole(self.clone()), dst.into_endpoint())
    }

    fn add_ref(&self, index: Option<usize>, r: EdgeRef) {
        self.refs.borrow_mut().entry(index).or_default().insert(r);
    }

    fn remove_ref(&self, index: Option<usize>, key: (*const Port, Option<usize>)) -> bool {
        if let Some(set) = self.refs.borrow_mut().get_mut(&index) {
            let before = set.len();
            set.retain(|r| r.key() != key);
            return set.len() != before;
        }
        false
    }

    fn plain_value_cell(&self) -> Option<Rc<ValueCell>> {
        match &*self.cell.borrow() {
            Cell::Plain(vc) => Some(vc.clone()),
            _ => None,
        }
    }
}

/// A short-lived handle returned by [`Port::select`]. Not tracked anywhere;
/// used only to build or tear down one connection, or to read one element.
pub struct IndexedHandle {
    port: Rc<Port>,
    index: usize,
    phantom: bool,
}

impl IndexedHandle {
    pub fn value(&self) -> Option<Value> {
        if self.phantom {
            return self.port.value();
        }
        match &*self.port_cell() {
            Cell::Plain(vc) => vc.get().and_then(|v| v.element(self.index)),
            _ => self.port.value(),
        }
    }

    fn port_cell(&self) -> std::cell::Ref<'_, Cell> {
        // Safety net: exposed only to read through, never to mutate.
        self.port.cell.borrow()
    }

    pub fn index(&self) -> Result<usize, CoreError> {
        if self.phantom {
            Err(CoreError::UnsupportedQuery)
        } else {
            Ok(self.index)
        }
    }

    pub fn ref_counter(&self) -> Result<usize, CoreError> {
        if self.phantom {
            Err(CoreError::UnsupportedQuery)
        } else {
            Ok(self.port.ref_counter(Some(self.index)))
        }
    }

    pub fn connect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        connect(self.endpoint(), dst.into_endpoint())
    }

    pub fn disconnect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        disconnect(self.endpoint(), dst.into_endpoint())
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Indexed(self.port.clone(), self.index)
    }
}

/// Either side of a connection: a whole port, or one selected index of a
/// subscriptable port.
#[derive(Clone)]
pub enum Endpoint {
    Whole(Rc<Port>),
    Indexed(Rc<Port>, usize),
}

impl Endpoint {
    fn port(&self) -> &Rc<Port> {
        match self {
            Endpoint::Whole(p) | Endpoint::Indexed(p, _) => p,
        }
    }

    fn index(&self) -> Option<usize> {
        match self {
            Endpoint::Whole(_) => None,
            Endpoint::Indexed(_, i) => Some(*i),
        }
    }

    fn declared_type(&self) -> TypeDescriptor {
        match self {
            Endpoint::Whole(p) => p.declared_type.clone(),
            Endpoint::Indexed(p, _) => p
                .declared_type
                .element_type()
                .unwrap_or_else(|| p.declared_type.clone()),
        }
    }
}

/// Types that can stand as one side of a connection.
pub trait IntoEndpoint {
    fn into_endpoint(self) -> Endpoint;
}

impl IntoEndpoint for Endpoint {
    fn into_endpoint(self) -> Endpoint {
        self
    }
}

impl IntoEndpoint for &Rc<Port> {
    fn into_endpoint(self) -> Endpoint {
        Endpoint::Whole(self.clone())
    }
}

impl IntoEndpoint for &IndexedHandle {
    fn into_endpoint(self) -> Endpoint {
        self.endpoint()
    }
}

impl IntoEndpoint for &InputPort {
    fn into_endpoint(self) -> Endpoint {
        Endpoint::Whole(self.0.clone())
    }
}

impl IntoEndpoint for &OutputPort {
    fn into_endpoint(self) -> Endpoint {
        Endpoint::Whole(self.0.clone())
    }
}

/// Connects `origin` to `destination`. See SPEC_FULL.md §4.4 for the full
/// case analysis.
pub fn connect(origin: Endpoint, destination: Endpoint) -> Result<(), CoreError> {
    let o_port = origin.port().clone();
    let o_index = origin.index();
    let d_port = destination.port().clone();
    let d_index = destination.index();

    if o_index.is_none() {
        if let Some(v) = o_port.value() {
            check_type(&o_port.name, &v, &destination.declared_type())?;
        }
    }

    if d_port.ref_counter(d_index) > 0 {
        return Err(CoreError::FanInExceeded {
            port: d_port.name.clone(),
            index: d_index,
        });
    }

    match (o_index, d_index) {
        (None, None) => {
            let vc = o_port
                .plain_value_cell()
                .ok_or(CoreError::UnsupportedQuery)?;
            *d_port.cell.borrow_mut() = Cell::Plain(vc);
        }
        (None, Some(j)) => {
            let vc = o_port
                .plain_value_cell()
                .ok_or(CoreError::UnsupportedQuery)?;
            install_aggregate_entry(&d_port, j, AggregateEntry::Whole(vc));
        }
        (Some(i), None) => {
            let vc = o_port
                .plain_value_cell()
                .ok_or(CoreError::UnsupportedQuery)?;
            *d_port.cell.borrow_mut() = Cell::Indexed(Rc::new(IndexedCell { backing: vc, index: i }));
        }
        (Some(i), Some(j)) => {
            let vc = o_port
                .plain_value_cell()
                .ok_or(CoreError::UnsupportedQuery)?;
            let indexed = Rc::new(IndexedCell { backing: vc, index: i });
            install_aggregate_entry(&d_port, j, AggregateEntry::Indexed(indexed));
        }
    }

    let sent = Signal::new();
    let consumed = Signal::new();
    o_port.add_ref(
        o_index,
        EdgeRef {
            peer_port: d_port.clone(),
            peer_index: d_index,
            sent: sent.clone(),
            consumed: consumed.clone(),
        },
    );
    d_port.add_ref(
        d_index,
        EdgeRef {
            peer_port: o_port.clone(),
            peer_index: o_index,
            sent,
            consumed,
        },
    );
    trace!(
        "connected {}{:?} -> {}{:?}",
        o_port.name, o_index, d_port.name, d_index
    );
    Ok(())
}

fn install_aggregate_entry(d_port: &Rc<Port>, index: usize, entry: AggregateEntry) {
    let mut cell = d_port.cell.borrow_mut();
    if let Cell::Aggregate(agg) = &*cell {
        agg.insert(index, entry);
    } else {
        let agg = Aggregator::new();
        agg.insert(index, entry);
        *cell = Cell::Aggregate(agg);
    }
}

/// Disconnects `origin` from `destination`. A lookup miss on either side is
/// reported as [`CoreError::NotConnected`].
pub fn disconnect(origin: Endpoint, destination: Endpoint) -> Result<(), CoreError> {
    let o_port = origin.port().clone();
    let o_index = origin.index();
    let d_port = destination.port().clone();
    let d_index = destination.index();

    let removed_o = o_port.remove_ref(o_index, (Rc::as_ptr(&d_port), d_index));
    let removed_d = d_port.remove_ref(d_index, (Rc::as_ptr(&o_port), o_index));

    if !removed_o || !removed_d {
        return Err(CoreError::NotConnected {
            origin: o_port.name.clone(),
            destination: d_port.name.clone(),
            index: d_index,
        });
    }

    match d_index {
        None => {
            *d_port.cell.borrow_mut() = Cell::empty();
        }
        Some(j) => {
            let mut cell = d_port.cell.borrow_mut();
            let reset = match &*cell {
                Cell::Aggregate(agg) => agg.remove(j),
                _ => true,
            };
            if reset {
                *cell = Cell::empty();
            }
        }
    }
    trace!(
        "disconnected {}{:?} -> {}{:?}",
        o_port.name, o_index, d_port.name, d_index
    );
    Ok(())
}

fn check_peer_stopped(peer: &EdgeRef) -> Result<(), CoreError> {
    if let Some(peer_parent) = peer.peer_port.parent.upgrade() {
        if peer_parent.is_stopped() && peer_parent.state() != ComponentState::StoppedAtIter {
            return Err(CoreError::ComponentStopped {
                component: peer_parent.name().to_string(),
                state: peer_parent.state(),
            });
        }
    }
    Ok(())
}

/// A port specialized for receiving values from its peers.
pub struct InputPort(Rc<Port>);

impl InputPort {
    pub fn new(
        name: impl Into<String>,
        declared_type: TypeDescriptor,
        initial_value: Option<Value>,
        arg_name: Option<String>,
        parent: Weak<dyn ComponentHandle>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self, CoreError> {
        Port::new(name, declared_type, initial_value, arg_name, parent, scheduler).map(Self)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
    pub fn declared_type(&self) -> &TypeDescriptor {
        self.0.declared_type()
    }
    pub fn is_subscriptable(&self) -> bool {
        self.0.is_subscriptable()
    }
    pub fn value(&self) -> Option<Value> {
        self.0.value()
    }
    pub fn references(&self) -> Vec<EdgeRef> {
        self.0.references()
    }
    pub fn ref_counter(&self, index: Option<usize>) -> usize {
        self.0.ref_counter(index)
    }
    pub fn select(&self, i: usize) -> Result<IndexedHandle, CoreError> {
        self.0.select(i)
    }
    pub fn connect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        self.0.connect(dst)
    }
    pub fn disconnect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        self.0.disconnect(dst)
    }

    /// Waits for a value on every connected edge, then returns the port's
    /// (possibly aggregated) value. See SPEC_FULL.md §4.6.
    pub async fn receive(&self) -> Result<Value, CoreError> {
        let refs = self.0.references();
        let parent = self.0.parent.upgrade();

        if refs.is_empty() {
            if let Some(p) = &parent {
                p.set_state(ComponentState::Running, None);
            }
            return Ok(self.0.value().unwrap_or(Value::Unit));
        }

        if let Some(p) = &parent {
            p.set_state(
                ComponentState::ReceivingParams,
                Some(&format!("receiving on '{}'", self.0.name())),
            );
        }
        self.ensure_peer_tasks(&refs, &parent);

        let stopping_iteration = parent.as_ref().map(|p| p.stopping_iteration()).unwrap_or(0);
        if stopping_iteration == 0 {
            // Unbounded mode mirrors the original's unconditional gather: a
            // peer that stops without ever sending leaves this wait pending
            // forever, and it is the scheduler's job to cancel it.
            for r in &refs {
                r.sent.wait().await;
            }
        } else {
            // Bounded mode already re-polls every tick, so checking for a
            // stopped peer here costs nothing and turns that same situation
            // into a reported error instead of a silent hang.
            loop {
                let mut all_set = true;
                for r in &refs {
                    if !r.sent.wait_timeout(ITERATION_POLL_INTERVAL).await {
                        all_set = false;
                        check_peer_stopped(r)?;
                    }
                }
                self.ensure_peer_tasks(&refs, &parent);
                if all_set {
                    break;
                }
            }
        }

        for r in &refs {
            check_peer_stopped(r)?;
        }

        let snapshot = self.0.value().unwrap_or(Value::Unit);
        for r in &refs {
            r.consumed.set();
            r.sent.clear();
        }
        if let Some(p) = &parent {
            p.set_state(ComponentState::Running, None);
        }
        Ok(snapshot)
    }

    fn ensure_peer_tasks(&self, refs: &[EdgeRef], parent: &Option<Rc<dyn ComponentHandle>>) {
        let Some(requester) = parent.clone() else {
            return;
        };
        for r in refs {
            if let Some(peer_parent) = r.peer_port.parent.upgrade() {
                self.0.scheduler.create_task_if_needed(&requester, &peer_parent);
            }
        }
    }
}

/// A port specialized for publishing values to its peers.
pub struct OutputPort(Rc<Port>);

impl OutputPort {
    pub fn new(
        name: impl Into<String>,
        declared_type: TypeDescriptor,
        initial_value: Option<Value>,
        arg_name: Option<String>,
        parent: Weak<dyn ComponentHandle>,
        scheduler: Rc<dyn Scheduler>,
    ) -> Result<Self, CoreError> {
        Port::new(name, declared_type, initial_value, arg_name, parent, scheduler).map(Self)
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
    pub fn declared_type(&self) -> &TypeDescriptor {
        self.0.declared_type()
    }
    pub fn is_subscriptable(&self) -> bool {
        self.0.is_subscriptable()
    }
    pub fn value(&self) -> Option<Value> {
        self.0.value()
    }
    pub fn references(&self) -> Vec<EdgeRef> {
        self.0.references()
    }
    pub fn ref_counter(&self, index: Option<usize>) -> usize {
        self.0.ref_counter(index)
    }
    pub fn select(&self, i: usize) -> Result<IndexedHandle, CoreError> {
        self.0.select(i)
    }
    pub fn connect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        self.0.connect(dst)
    }
    pub fn disconnect(&self, dst: impl IntoEndpoint) -> Result<(), CoreError> {
        self.0.disconnect(dst)
    }

    /// Sets this output's value directly, outside the `send` handshake (e.g.
    /// to give it an initial value before any consumer connects).
    pub fn set_value(&self, value: Value) -> Result<(), CoreError> {
        self.0.set_value(value)
    }

    /// Publishes `value` and waits for every connected peer to consume it.
    /// See SPEC_FULL.md §4.5.
    pub async fn send(&self, value: Value) -> Result<(), CoreError> {
        self.0.set_value(value)?;

        let refs = self.0.references();
        let parent = self.0.parent.upgrade();

        for r in &refs {
            r.consumed.clear();
            r.sent.set();
        }
        self.ensure_peer_tasks(&refs, &parent);

        if let Some(p) = &parent {
            p.set_state(
                ComponentState::SendingParams,
                Some(&format!("sending on '{}'", self.0.name())),
            );
        }

        for r in &refs {
            r.consumed.wait().await;
        }

        for r in &refs {
            if let Err(e) = check_peer_stopped(r) {
                warn!("peer stopped while sending on '{}'", self.0.name());
                return Err(e);
            }
        }
        Ok(())
    }

    fn ensure_peer_tasks(&self, refs: &[EdgeRef], parent: &Option<Rc<dyn ComponentHandle>>) {
        let Some(requester) = parent.clone() else {
            return;
        };
        for r in refs {
            if let Some(peer_parent) = r.peer_port.parent.upgrade() {
                self.0.scheduler.create_task_if_needed(&requester, &peer_parent);
            }
        }
    }
}

impl<D: IntoEndpoint> Shr<D> for OutputPort {
    type Output = ();

    /// Mirrors `self.connect(rhs)`; panics on a connection error. Use
    /// `connect` directly to handle the error.
    fn shr(self, rhs: D) {
        self.connect(rhs).expect("connect");
    }
}

impl<D: IntoEndpoint> Shr<D> for IndexedHandle {
    type Output = ();

    fn shr(self, rhs: D) {
        self.connect(rhs).expect("connect");
    }
}

impl<D: IntoEndpoint> Shr<D> for &OutputPort {
    type Output = ();

    fn shr(self, rhs: D) {
        self.connect(rhs).expect("connect");
    }
}

impl<D: IntoEndpoint> Shr<D> for &IndexedHandle {
    type Output = ();

    fn shr(self, rhs: D) {
        self.connect(rhs).expect("connect");
    }
}

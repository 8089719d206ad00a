//! Cells: the indirection that makes `connect`/`disconnect` a pure pointer
//! rewire. A port never owns its value directly; it owns one of these.

use std::cell::RefCell;
use std::rc::Rc;

use crate::types::Value;

/// A single mutable slot: "no value" or a concrete value. Identity matters —
/// two ports sharing one `ValueCell` is exactly what a whole-to-whole
/// connection means.
#[derive(Debug, Default)]
pub struct ValueCell {
    value: RefCell<Option<Value>>,
}

impl ValueCell {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn with_value(value: Value) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(Some(value)),
        })
    }

    pub fn get(&self) -> Option<Value> {
        self.value.borrow().clone()
    }

    pub fn set(&self, value: Value) {
        *self.value.borrow_mut() = Some(value);
    }
}

/// A view `(backing, index)` whose effective value is `backing.value[index]`.
/// Only constructible against a subscriptable origin, so `backing` always
/// holds a sequence-shaped value by the time anyone reads through it.
#[derive(Debug)]
pub struct IndexedCell {
    pub backing: Rc<ValueCell>,
    pub index: usize,
}

impl IndexedCell {
    pub fn value(&self) -> Option<Value> {
        self.backing.get().and_then(|v| v.element(self.index))
    }
}

/// One contribution to an aggregator slot: either the whole value of a
/// non-subscriptable origin, or a shared indexed view built against a
/// subscriptable one. See SPEC_FULL.md §4.4 for why these two cases don't add
/// a further level of indexing on top of each other.
#[derive(Clone)]
pub enum AggregateEntry {
    Whole(Rc<ValueCell>),
    Indexed(Rc<IndexedCell>),
}

impl AggregateEntry {
    fn value(&self) -> Option<Value> {
        match self {
            AggregateEntry::Whole(vc) => vc.get(),
            AggregateEntry::Indexed(ic) => ic.value(),
        }
    }
}

/// Collects multiple indexed contributions into one ordered-by-index list,
/// used as the cell of a list-typed input fed element by element.
#[derive(Default)]
pub struct Aggregator {
    entries: RefCell<Vec<(usize, AggregateEntry)>>,
}

impl Aggregator {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn insert(&self, index: usize, entry: AggregateEntry) {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(i, _)| *i != index);
        entries.push((index, entry));
    }

    /// Removes the entry at `index`; returns whether the aggregator is now empty.
    pub fn remove(&self, index: usize) -> bool {
        let mut entries = self.entries.borrow_mut();
        entries.retain(|(i, _)| *i != index);
        entries.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.entries.borrow().iter().any(|(i, _)| *i == index)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element values in ascending-index order. An entry whose backing has no
    /// value yet is omitted rather than reported as a placeholder.
    pub fn ordered_values(&self) -> Vec<Value> {
        let mut entries: Vec<(usize, AggregateEntry)> = self.entries.borrow().clone();
        entries.sort_by_key(|(i, _)| *i);
        entries.into_iter().filter_map(|(_, e)| e.value()).collect()
    }
}

/// The three shapes a port's cell can take.
#[derive(Clone)]
pub enum Cell {
    Plain(Rc<ValueCell>),
    Indexed(Rc<IndexedCell>),
    Aggregate(Rc<Aggregator>),
}

impl Cell {
    pub fn empty() -> Self {
        Cell::Plain(ValueCell::new())
    }
}

#![forbid(unsafe_code)]

//! Observable ordered sequences with mapped mirrors.
//!
//! # Design
//!
//! A [`ReactiveSequence`] stores its elements in a `Vec<Value>` next to a
//! [`ReactiveObject`] that provides its event bus (and any named, non-index
//! properties). Every occupied index carries a *reflect* listener on
//! `change:<index>`; the set of covered indices is re-synchronized with the
//! length after every structural mutation, so a per-index write is always
//! observable and no listener survives for an index past the end.
//!
//! Mirrors are registered as subscribers of their source:
//!
//! ```text
//!  source ──subscribers──▶ (mirror, f)      strong
//!  mirror ──source──────▶ source           weak
//! ```
//!
//! Structural operations are replayed on each mirror with inserted items
//! mapped through `f`; per-index writes reach the mirror through the reflect
//! listener. Destroying a mirror removes it from its source.
//!
//! # Events
//!
//! | Operation | Events, in order |
//! |-----------|------------------|
//! | `set(i, v)` | `change:i`, `change` |
//! | `insert_at` | `remove` per removed, `add` per inserted, `change` |
//! | `push_back` / `push_front` | `add` per item, `change` |
//! | `pop_back` / `pop_front` | `change`, `remove` |
//!
//! Mirrors are updated before any event fires on the source.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::error::SequenceError;
use crate::event_bus::{Emitter, Event, EventBus, Listener, ListenerId};
use crate::object::{CHANGE, Change, ReactiveObject, Sink, change_event};
use crate::value::{Function, Value};

/// Fired once per inserted element, carrying the element.
pub const ADD: &str = "add";
/// Fired once per removed element, carrying the element.
pub const REMOVE: &str = "remove";

struct Subscriber {
    id: u64,
    mirror: ReactiveSequence,
    map: Function,
}

struct SequenceShared {
    object: ReactiveObject,
    items: RefCell<Vec<Value>>,
    /// Number of indices carrying a reflect listener.
    covered: Cell<usize>,
    subscribers: RefCell<Vec<Subscriber>>,
    source: RefCell<Option<(Weak<SequenceShared>, u64)>>,
    next_subscriber: Cell<u64>,
}

/// Shared handle to an observable sequence.
#[derive(Clone)]
pub struct ReactiveSequence {
    shared: Rc<SequenceShared>,
}

impl Default for ReactiveSequence {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveSequence")
            .field("len", &self.len())
            .field("mirrors", &self.shared.subscribers.borrow().len())
            .field("is_mirror", &self.shared.source.borrow().is_some())
            .finish()
    }
}

impl From<Vec<Value>> for ReactiveSequence {
    fn from(items: Vec<Value>) -> Self {
        let seq = Self {
            shared: Rc::new(SequenceShared {
                object: ReactiveObject::new(),
                items: RefCell::new(items),
                covered: Cell::new(0),
                subscribers: RefCell::new(Vec::new()),
                source: RefCell::new(None),
                next_subscriber: Cell::new(0),
            }),
        };
        seq.sync_traps();
        seq
    }
}

impl FromIterator<Value> for ReactiveSequence {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl ReactiveSequence {
    #[must_use]
    pub fn new() -> Self {
        Self::from(Vec::new())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        self.shared.items.borrow().get(index).cloned()
    }

    /// Snapshot of the elements.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.shared.items.borrow().clone()
    }

    /// The object carrying this sequence's bus and named properties.
    #[must_use]
    pub fn object(&self) -> &ReactiveObject {
        &self.shared.object
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ReactiveSequence) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.shared.object.is_destroyed()
    }

    #[must_use]
    pub fn mirror_count(&self) -> usize {
        self.shared.subscribers.borrow().len()
    }

    // -- Trap coverage -------------------------------------------------------

    fn sync_traps(&self) {
        let len = self.len();
        let covered = self.shared.covered.get();
        let bus = self.shared.object.bus();

        for index in len..covered {
            bus.forget_event(&change_event(&index.to_string()));
        }
        for index in covered..len {
            let weak = Rc::downgrade(&self.shared);
            bus.listen(&change_event(&index.to_string()), move |_| {
                if let Some(shared) = weak.upgrade() {
                    ReactiveSequence { shared }.reflect(index);
                }
            });
        }
        if covered != len {
            tracing::trace!(from = covered, to = len, "sequence trap coverage resynced");
        }
        self.shared.covered.set(len);
    }

    fn reflect(&self, index: usize) {
        let Some(value) = self.get(index) else {
            return;
        };
        for (mirror, map) in self.subscribers() {
            let result = mirror.set(index, map.call(&value));
            debug_assert!(result.is_ok(), "mirror length diverged from source");
        }
    }

    fn subscribers(&self) -> SmallVec<[(ReactiveSequence, Function); 2]> {
        self.shared
            .subscribers
            .borrow()
            .iter()
            .map(|s| (s.mirror.clone(), s.map.clone()))
            .collect()
    }

    fn fire(&self, name: &str, value: Value) {
        self.shared.object.bus().trigger(name, &Event::Value(value));
    }

    fn fire_change(&self) {
        self.fire(CHANGE, Value::Sequence(self.clone()));
    }

    fn refuse_if_destroyed(&self, operation: &str) -> bool {
        let destroyed = self.is_destroyed();
        if destroyed {
            tracing::warn!(operation, "mutation of a destroyed sequence ignored");
        }
        destroyed
    }

    // -- Mutation ------------------------------------------------------------

    /// Replace the element at `index`. Writing the same value fires nothing.
    pub fn set(&self, index: usize, value: impl Into<Value>) -> Result<(), SequenceError> {
        let value = value.into();
        if self.refuse_if_destroyed("set") {
            return Ok(());
        }
        let old = {
            let mut items = self.shared.items.borrow_mut();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(SequenceError::IndexOutOfBounds { index, len })?;
            if slot.same(&value) {
                return Ok(());
            }
            std::mem::replace(slot, value.clone())
        };

        let key = index.to_string();
        let change = Change {
            object: self.shared.object.clone(),
            key: key.clone(),
            value,
            old,
        };
        let bus = self.shared.object.bus();
        bus.trigger(&change_event(&key), &Event::Change(change));
        self.fire_change();
        Ok(())
    }

    /// Remove `remove_count` elements at `index` and insert `items` in their
    /// place. Both bounds are clamped to the current length. Returns the
    /// removed elements.
    pub fn insert_at(
        &self,
        index: usize,
        remove_count: usize,
        items: impl IntoIterator<Item = Value>,
    ) -> Vec<Value> {
        if self.refuse_if_destroyed("insert_at") {
            return Vec::new();
        }
        let inserted: Vec<Value> = items.into_iter().collect();
        self.sync_traps();

        let (index, removed) = {
            let mut current = self.shared.items.borrow_mut();
            let index = index.min(current.len());
            let end = index.saturating_add(remove_count).min(current.len());
            let removed: Vec<Value> = current
                .splice(index..end, inserted.iter().cloned())
                .collect();
            (index, removed)
        };
        self.sync_traps();
        tracing::debug!(
            index,
            removed = removed.len(),
            inserted = inserted.len(),
            "sequence spliced"
        );

        for (mirror, map) in self.subscribers() {
            let mapped: Box<dyn Iterator<Item = Value> + '_> = Box::new(inserted.iter().map(|v| map.call(v)));
            mirror.insert_at(index, removed.len(), mapped);
        }

        for value in &removed {
            self.fire(REMOVE, value.clone());
        }
        for value in inserted {
            self.fire(ADD, value);
        }
        self.fire_change();
        removed
    }

    pub fn push_back(&self, item: impl Into<Value>) {
        self.append(std::iter::once(item.into()));
    }

    pub fn push_front(&self, item: impl Into<Value>) {
        self.prepend(std::iter::once(item.into()));
    }

    /// Push several items at the end, keeping their order.
    pub fn append(&self, items: impl IntoIterator<Item = Value>) {
        self.push_many(items, End::Back);
    }

    /// Push several items at the front, keeping their order.
    pub fn prepend(&self, items: impl IntoIterator<Item = Value>) {
        self.push_many(items, End::Front);
    }

    fn push_many(&self, items: impl IntoIterator<Item = Value>, end: End) {
        if self.refuse_if_destroyed("push") {
            return;
        }
        let added: Vec<Value> = items.into_iter().collect();
        if added.is_empty() {
            return;
        }
        self.sync_traps();
        {
            let mut current = self.shared.items.borrow_mut();
            match end {
                End::Back => current.extend(added.iter().cloned()),
                End::Front => {
                    current.splice(0..0, added.iter().cloned());
                }
            }
        }
        self.sync_traps();

        for (mirror, map) in self.subscribers() {
            let mapped: Box<dyn Iterator<Item = Value> + '_> = Box::new(added.iter().map(|v| map.call(v)));
            mirror.push_many(mapped, end);
        }

        for value in added {
            self.fire(ADD, value);
        }
        self.fire_change();
    }

    /// Remove and return the last element. `None` and no events when empty.
    pub fn pop_back(&self) -> Option<Value> {
        self.pop(End::Back)
    }

    /// Remove and return the first element. `None` and no events when empty.
    pub fn pop_front(&self) -> Option<Value> {
        self.pop(End::Front)
    }

    fn pop(&self, end: End) -> Option<Value> {
        if self.refuse_if_destroyed("pop") {
            return None;
        }
        self.sync_traps();
        let removed = {
            let mut current = self.shared.items.borrow_mut();
            match end {
                End::Back => current.pop(),
                End::Front if current.is_empty() => None,
                End::Front => Some(current.remove(0)),
            }
        }?;
        self.sync_traps();

        for (mirror, _) in self.subscribers() {
            mirror.pop(end);
        }

        self.fire_change();
        self.fire(REMOVE, removed.clone());
        Some(removed)
    }

    // -- Derivation ----------------------------------------------------------

    /// A new sequence kept equal to `self` mapped through `map`.
    #[must_use]
    pub fn mirror(&self, map: Function) -> ReactiveSequence {
        let mapped: Vec<Value> = self.shared.items.borrow().iter().map(|v| map.call(v)).collect();
        let mirror = ReactiveSequence::from(mapped);
        if self.is_destroyed() {
            return mirror;
        }

        let id = self.shared.next_subscriber.get() + 1;
        self.shared.next_subscriber.set(id);
        self.shared.subscribers.borrow_mut().push(Subscriber {
            id,
            mirror: mirror.clone(),
            map,
        });
        *mirror.shared.source.borrow_mut() = Some((Rc::downgrade(&self.shared), id));
        mirror
    }

    /// Write the whole sequence (optionally mapped) to `target[key]` now and
    /// on every `change`.
    pub fn feed<S>(&self, target: &S, key: &str, map: Option<Function>) -> ListenerId
    where
        S: Sink + Clone + 'static,
    {
        let sink = target.clone();
        let key = key.to_owned();
        let compute: Rc<dyn Fn(&Value)> = Rc::new(move |seq: &Value| {
            let value = match &map {
                Some(f) => f.call(seq),
                None => seq.clone(),
            };
            sink.put(&key, value);
        });

        let on_change = Rc::clone(&compute);
        let listener: Listener = Rc::new(move |event: &Event| {
            if let seq @ Value::Sequence(_) = event.value() {
                on_change(seq);
            }
        });
        let bus = self.shared.object.bus();
        let id = match target.emitter().filter(|cross| !cross.ptr_eq(bus)) {
            Some(cross) => bus.listen_linked_rc(CHANGE, listener, cross),
            None => bus.listen_rc(CHANGE, listener),
        };
        compute(&Value::Sequence(self.clone()));
        id
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Detach from the source (for a mirror), fire `destroy` and drop every
    /// element and mirror.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }
        let source = self.shared.source.borrow_mut().take();
        if let Some((source, id)) = source
            && let Some(source) = source.upgrade()
        {
            source.subscribers.borrow_mut().retain(|s| s.id != id);
        }

        self.shared
            .object
            .destroy_with(&Event::Value(Value::Sequence(self.clone())));

        let stripped = (
            std::mem::take(&mut *self.shared.items.borrow_mut()),
            std::mem::take(&mut *self.shared.subscribers.borrow_mut()),
        );
        self.shared.covered.set(0);
        drop(stripped);
    }
}

#[derive(Debug, Clone, Copy)]
enum End {
    Back,
    Front,
}

impl Emitter for ReactiveSequence {
    fn bus(&self) -> &EventBus {
        self.shared.object.bus()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

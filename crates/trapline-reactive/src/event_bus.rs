#![forbid(unsafe_code)]

//! Named-event subscription and dispatch with cross-reference cleanup.
//!
//! # Design
//!
//! [`EventBus`] is a shared handle (`Rc<RefCell<..>>`) over a table mapping
//! event names to ordered listener lists. A bus may be created with a
//! *class* bus whose listeners run before the instance's own on every
//! trigger; this is how type-level declarations reach every instance.
//!
//! A listener registered with a cross-reference installs a pair of guards,
//! one on each bus. Each guard holds a `Weak` to the peer bus and the id of
//! the peer's guard, so teardown is a lookup-and-remove on the surviving side:
//!
//! ```text
//!  bus A                                bus B (cross-reference)
//!  listeners["change:x"] = [.., h]      guards = [.., g2 -> (A, g1)]
//!  guards = [.., g1 -> (B, g2), owns h]
//! ```
//!
//! Destroying B removes `g1` from A and forgets `h`. Destroying A removes
//! `g2` from B. Either way no reference to the destroyed side survives.
//!
//! # Invariants
//!
//! 1. Listeners run in registration order, class listeners first.
//! 2. Registering the same closure twice yields two independent listeners.
//! 3. A panicking listener is caught and logged; later listeners still run.
//! 4. After `destroy`, the bus holds no listeners and no guards.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Listener panic | Bug in a handler | Logged at `error`, dispatch continues |
//! | Listen after destroy | Use of a dead bus | Logged at `warn`, listener dropped |
//! | Forget unknown id | Already removed | No-op |

use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::object::{Change, ReactiveObject};
use crate::value::Value;

/// Payload passed to listeners.
#[derive(Debug, Clone)]
pub enum Event {
    /// A trapped property changed (`change:<key>` events).
    Change(Change),
    /// Any other payload: the emitting object or sequence for `change`,
    /// `destroy` and `outdate:<key>`, or the element for `add`/`remove`.
    Value(Value),
}

impl Event {
    /// The carried value: the new value for a change, the payload otherwise.
    #[must_use]
    pub fn value(&self) -> &Value {
        match self {
            Self::Change(change) => &change.value,
            Self::Value(value) => value,
        }
    }

    #[must_use]
    pub fn change(&self) -> Option<&Change> {
        match self {
            Self::Change(change) => Some(change),
            Self::Value(_) => None,
        }
    }

    /// The object the event is about, when it carries one.
    #[must_use]
    pub fn object(&self) -> Option<ReactiveObject> {
        match self {
            Self::Change(change) => Some(change.object.clone()),
            Self::Value(Value::Object(object)) => Some(object.clone()),
            Self::Value(Value::Sequence(seq)) => Some(seq.object().clone()),
            Self::Value(_) => None,
        }
    }
}

/// A registered event handler.
pub type Listener = Rc<dyn Fn(&Event)>;

/// Handle returned by [`EventBus::listen`], used to forget one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Name of the event fired by `destroy`.
pub const DESTROY: &str = "destroy";

struct Guard {
    id: u64,
    peer: Weak<RefCell<BusInner>>,
    peer_guard: u64,
    /// Listener on this bus to forget when the peer is destroyed.
    owned: Option<(String, ListenerId)>,
}

#[derive(Default)]
struct BusInner {
    listeners: FxHashMap<String, SmallVec<[(ListenerId, Listener); 2]>>,
    class: Option<EventBus>,
    guards: Vec<Guard>,
    next_id: u64,
    destroyed: bool,
}

impl BusInner {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn snapshot(&self, name: &str) -> SmallVec<[Listener; 4]> {
        self.listeners
            .get(name)
            .map(|list| list.iter().map(|(_, l)| Rc::clone(l)).collect())
            .unwrap_or_default()
    }
}

/// A shared named-event table.
///
/// Cloning an `EventBus` creates a new handle to the **same** table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("EventBus")
            .field("events", &inner.listeners.len())
            .field("guards", &inner.guards.len())
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a bus whose triggers first run `class`'s listeners.
    #[must_use]
    pub fn with_class(class: &EventBus) -> Self {
        let bus = Self::new();
        bus.inner.borrow_mut().class = Some(class.clone());
        bus
    }

    /// Whether both handles share the same table.
    #[must_use]
    pub fn ptr_eq(&self, other: &EventBus) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    /// Register `handler` for `name`. Returns the id to [`forget`](Self::forget) it.
    pub fn listen(&self, name: &str, handler: impl Fn(&Event) + 'static) -> ListenerId {
        self.listen_rc(name, Rc::new(handler))
    }

    pub(crate) fn listen_rc(&self, name: &str, handler: Listener) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.allocate());
        if inner.destroyed {
            tracing::warn!(event = name, "listen on a destroyed bus ignored");
            return id;
        }
        inner
            .listeners
            .entry(name.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    /// Register `handler` for `name`, tied to the lifetime of `cross`.
    ///
    /// Destroying `cross` forgets the listener; destroying `self` removes the
    /// guard left on `cross`.
    pub fn listen_linked(
        &self,
        name: &str,
        handler: impl Fn(&Event) + 'static,
        cross: &EventBus,
    ) -> ListenerId {
        self.listen_linked_rc(name, Rc::new(handler), cross)
    }

    pub(crate) fn listen_linked_rc(
        &self,
        name: &str,
        handler: Listener,
        cross: &EventBus,
    ) -> ListenerId {
        let id = self.listen_rc(name, handler);
        if self.ptr_eq(cross) || self.is_destroyed() || cross.is_destroyed() {
            return id;
        }

        let local_guard = self.inner.borrow_mut().allocate();
        let peer_guard = cross.inner.borrow_mut().allocate();
        self.inner.borrow_mut().guards.push(Guard {
            id: local_guard,
            peer: Rc::downgrade(&cross.inner),
            peer_guard,
            owned: Some((name.to_owned(), id)),
        });
        cross.inner.borrow_mut().guards.push(Guard {
            id: peer_guard,
            peer: Rc::downgrade(&self.inner),
            peer_guard: local_guard,
            owned: None,
        });
        id
    }

    /// Remove one listener, and its cross-reference guards if it has any.
    /// No-op if it is not registered.
    pub fn forget(&self, name: &str, id: ListenerId) {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(list) = inner.listeners.get_mut(name) {
                list.retain(|(lid, _)| *lid != id);
                if list.is_empty() {
                    inner.listeners.remove(name);
                }
            }
        }
        self.release_owned(|n, lid| n == name && lid == id);
    }

    /// Remove every listener for `name`, with their cross-reference guards.
    pub fn forget_event(&self, name: &str) {
        let removed = self.inner.borrow_mut().listeners.remove(name);
        drop(removed);
        self.release_owned(|n, _| n == name);
    }

    /// Remove every listener for every event, with their cross-reference
    /// guards. Guards this bus holds for other buses' listeners stay.
    pub fn forget_all(&self) {
        let removed = std::mem::take(&mut self.inner.borrow_mut().listeners);
        drop(removed);
        self.release_owned(|_, _| true);
    }

    /// Drop the guard pairs of this bus's own listeners matching `owned`.
    fn release_owned(&self, owned: impl Fn(&str, ListenerId) -> bool) {
        let released: Vec<Guard> = {
            let mut inner = self.inner.borrow_mut();
            let (released, kept) = std::mem::take(&mut inner.guards)
                .into_iter()
                .partition(|g| matches!(&g.owned, Some((n, lid)) if owned(n.as_str(), *lid)));
            inner.guards = kept;
            released
        };
        for guard in released {
            if let Some(peer) = guard.peer.upgrade() {
                peer.borrow_mut().guards.retain(|g| g.id != guard.peer_guard);
            }
        }
    }

    /// Call the listeners of `name` with `event`: class listeners first,
    /// then this bus's own, each in registration order.
    pub fn trigger(&self, name: &str, event: &Event) {
        let (class, own) = {
            let inner = self.inner.borrow();
            (inner.class.clone(), inner.snapshot(name))
        };
        if let Some(class) = class {
            let shared = class.inner.borrow().snapshot(name);
            call_listeners(name, &shared, event);
        }
        call_listeners(name, &own, event);
    }

    /// Number of listeners registered for `name` on this bus.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(name)
            .map_or(0, |list| list.len())
    }

    /// Number of cross-reference guards held by this bus.
    #[must_use]
    pub fn guard_count(&self) -> usize {
        self.inner.borrow().guards.len()
    }

    /// Fire [`DESTROY`] with `event`, release every cross-reference guard and
    /// clear the table. The bus ignores further registrations.
    pub fn destroy(&self, event: &Event) {
        if self.is_destroyed() {
            return;
        }
        self.trigger(DESTROY, event);
        self.release_guards();

        let (listeners, class) = {
            let mut inner = self.inner.borrow_mut();
            inner.destroyed = true;
            (std::mem::take(&mut inner.listeners), inner.class.take())
        };
        drop(listeners);
        drop(class);
    }

    fn release_guards(&self) {
        let guards = std::mem::take(&mut self.inner.borrow_mut().guards);
        for guard in guards {
            let Some(peer) = guard.peer.upgrade() else {
                continue;
            };
            let peer = EventBus { inner: peer };
            let removed = {
                let mut inner = peer.inner.borrow_mut();
                inner
                    .guards
                    .iter()
                    .position(|g| g.id == guard.peer_guard)
                    .map(|index| inner.guards.remove(index))
            };
            if let Some(Guard {
                owned: Some((name, id)),
                ..
            }) = removed
            {
                peer.forget(&name, id);
            }
        }
    }
}

fn call_listeners(name: &str, listeners: &[Listener], event: &Event) {
    for listener in listeners {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener(event))) {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_owned());
            tracing::error!(event = name, "listener panicked: {message}");
        }
    }
}

/// Anything that owns an [`EventBus`].
///
/// The provided methods forward to the bus so objects, sequences and
/// components share one listening surface.
pub trait Emitter {
    fn bus(&self) -> &EventBus;

    fn listen(&self, name: &str, handler: impl Fn(&Event) + 'static) -> ListenerId
    where
        Self: Sized,
    {
        self.bus().listen(name, handler)
    }

    /// Like [`listen`](Emitter::listen), but the listener dies with `cross`.
    fn listen_linked(
        &self,
        name: &str,
        handler: impl Fn(&Event) + 'static,
        cross: &dyn Emitter,
    ) -> ListenerId
    where
        Self: Sized,
    {
        self.bus().listen_linked(name, handler, cross.bus())
    }

    fn forget(&self, name: &str, id: ListenerId) {
        self.bus().forget(name, id);
    }

    fn forget_event(&self, name: &str) {
        self.bus().forget_event(name);
    }

    fn forget_all(&self) {
        self.bus().forget_all();
    }

    fn trigger(&self, name: &str, event: &Event) {
        self.bus().trigger(name, event);
    }
}

impl Emitter for EventBus {
    fn bus(&self) -> &EventBus {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#![forbid(unsafe_code)]

//! Objects whose properties can be trapped, projected and derived.
//!
//! # Design
//!
//! [`ReactiveObject`] is a shared handle over an ordered property store and an
//! [`EventBus`]. A property is a plain slot until it is *trapped*; from then
//! on every write that changes the value (by [`Value::same`]) fires
//! `change:<key>` with a [`Change`] record, then `change` with the object.
//!
//! Trap bookkeeping is an explicit set of keys per object. Objects created with
//! [`ReactiveObject::of_type`] also see the keys trapped on their
//! [`ReactiveType`], read its shadow defaults until they write their own, and
//! run its listeners before their own.
//!
//! Everything else is built from `trap_with`:
//!
//! ```text
//! link(k, dest, k2, f)  = trap_with(k, |c| dest[k2] = f(c.object[k]), cross = dest)
//! project(keys, dest)   = link(k, dest, k) for each k
//! define(k, deps, calc) = trap_with(deps, recompute) + listen("outdate:k", recompute)
//! watch(src, keys, cb)  = src.trap_with(keys, cb, cross = self)
//! ```
//!
//! # Invariants
//!
//! 1. A key is trapped at most once per object; re-trapping only adds the
//!    callback.
//! 2. Writing a value that is `same` as the current one fires nothing.
//! 3. `change:<key>` always precedes the generic `change`.
//! 4. After `destroy`, reads return `Null` and writes are ignored.
//!
//! # Failure Modes
//!
//! - **Self-referential writes**: a `change:<key>` callback that writes a
//!   different value to the same key recurses until the values converge.
//!   Equality no-ops are the only circuit breaker.
//! - **Reference cycles**: callbacks capturing the object they are registered
//!   on keep it alive until `destroy`. Built-in callbacks read the object
//!   from the [`Change`] record instead.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::event_bus::{Emitter, Event, EventBus, Listener, ListenerId};
use crate::keys::Keys;
use crate::reactive_type::ReactiveType;
use crate::value::{Function, Value};

/// Name of the generic change event.
pub const CHANGE: &str = "change";

/// Name of the keyed change event for `key`.
#[must_use]
pub fn change_event(key: &str) -> String {
    format!("{CHANGE}:{key}")
}

/// Name of the invalidation event for the derived property `key`.
#[must_use]
pub fn outdate_event(key: &str) -> String {
    format!("outdate:{key}")
}

/// Record carried by `change:<key>` events.
#[derive(Debug, Clone)]
pub struct Change {
    pub object: ReactiveObject,
    pub key: String,
    pub value: Value,
    /// `Null` for the initial callback invocation.
    pub old: Value,
}

/// Options for [`ReactiveObject::trap_with`].
#[derive(Debug, Clone)]
pub struct TrapOptions {
    /// Invoke the callback once with the current value right away.
    pub init: bool,
    /// Tie the callback's lifetime to another bus.
    pub cross_reference: Option<EventBus>,
}

impl Default for TrapOptions {
    fn default() -> Self {
        Self {
            init: true,
            cross_reference: None,
        }
    }
}

impl TrapOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }

    #[must_use]
    pub fn cross_reference(mut self, cross: &dyn Emitter) -> Self {
        self.cross_reference = Some(cross.bus().clone());
        self
    }
}

/// Options for [`ReactiveObject::link`].
#[derive(Debug, Clone)]
pub struct LinkOptions {
    pub transformer: Option<Function>,
    pub init: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            transformer: None,
            init: true,
        }
    }
}

impl LinkOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn transform(mut self, transformer: Function) -> Self {
        self.transformer = Some(transformer);
        self
    }

    #[must_use]
    pub fn init(mut self, init: bool) -> Self {
        self.init = init;
        self
    }
}

/// A destination for projected values.
///
/// Objects are sinks; so are render nodes in the template layer. A sink that
/// exposes an [`EventBus`] becomes the cross-reference of the link.
pub trait Sink {
    fn put(&self, key: &str, value: Value);

    fn emitter(&self) -> Option<&EventBus> {
        None
    }
}

#[derive(Default)]
struct ObjectState {
    values: IndexMap<String, Value>,
    hidden: FxHashMap<String, Value>,
    trapped: FxHashSet<String>,
    kind: Option<ReactiveType>,
    destroyed: bool,
}

impl ObjectState {
    fn is_trapped(&self, key: &str) -> bool {
        self.trapped.contains(key) || self.kind.as_ref().is_some_and(|k| k.is_trapped(key))
    }

    fn current(&self, key: &str) -> Value {
        match self.values.get(key) {
            Some(value) => value.clone(),
            None => self
                .kind
                .as_ref()
                .map_or(Value::Null, |k| k.default_value(key)),
        }
    }
}

struct ObjectShared {
    bus: EventBus,
    state: RefCell<ObjectState>,
}

/// A shared object with trappable properties.
///
/// Cloning creates a new handle to the **same** object.
#[derive(Clone)]
pub struct ReactiveObject {
    shared: Rc<ObjectShared>,
}

/// Non-owning handle to a [`ReactiveObject`].
#[derive(Clone)]
pub struct WeakObject(Weak<ObjectShared>);

impl WeakObject {
    #[must_use]
    pub fn upgrade(&self) -> Option<ReactiveObject> {
        self.0.upgrade().map(|shared| ReactiveObject { shared })
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("ReactiveObject")
            .field("keys", &state.values.keys().collect::<Vec<_>>())
            .field("trapped", &state.trapped.len())
            .field("destroyed", &state.destroyed)
            .finish()
    }
}

impl ReactiveObject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Rc::new(ObjectShared {
                bus: EventBus::new(),
                state: RefCell::new(ObjectState::default()),
            }),
        }
    }

    /// Create an instance of `kind`: its trapped keys, defaults and
    /// type-level listeners apply to the new object.
    #[must_use]
    pub fn of_type(kind: &ReactiveType) -> Self {
        Self {
            shared: Rc::new(ObjectShared {
                bus: EventBus::with_class(kind.bus()),
                state: RefCell::new(ObjectState {
                    kind: Some(kind.clone()),
                    ..ObjectState::default()
                }),
            }),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<ReactiveType> {
        self.shared.state.borrow().kind.clone()
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakObject {
        WeakObject(Rc::downgrade(&self.shared))
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.shared.state.borrow().destroyed
    }

    // -- Plain property access ---------------------------------------------

    /// Current value of `key`, or `Null`.
    #[must_use]
    pub fn get(&self, key: &str) -> Value {
        let state = self.shared.state.borrow();
        if state.destroyed {
            return Value::Null;
        }
        state.current(key)
    }

    /// Whether `key` is an own property.
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.shared.state.borrow().values.contains_key(key)
    }

    /// Own property names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.shared.state.borrow().values.keys().cloned().collect()
    }

    #[must_use]
    pub fn is_trapped(&self, key: &str) -> bool {
        self.shared.state.borrow().is_trapped(key)
    }

    /// Write `key`. On a trapped key a different value fires
    /// `change:<key>` then `change`; an equal value does nothing.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let old = {
            let mut state = self.shared.state.borrow_mut();
            if state.destroyed {
                tracing::warn!(key, "write to a destroyed object ignored");
                return;
            }
            if !state.is_trapped(key) {
                state.values.insert(key.to_owned(), value);
                return;
            }
            let old = state.current(key);
            if old.same(&value) {
                return;
            }
            state.values.insert(key.to_owned(), value.clone());
            old
        };

        let change = Change {
            object: self.clone(),
            key: key.to_owned(),
            value,
            old,
        };
        self.shared
            .bus
            .trigger(&change_event(key), &Event::Change(change));
        self.shared
            .bus
            .trigger(CHANGE, &Event::Value(Value::Object(self.clone())));
    }

    /// Forget the shadow value of each key, then write `value`, so a trapped
    /// key fires even when `value` equals what it held.
    pub fn overwrite(&self, keys: impl Into<Keys>, value: impl Into<Value>) {
        let value = value.into();
        for key in keys.into().resolve(|| self.keys()) {
            {
                let mut state = self.shared.state.borrow_mut();
                if state.destroyed {
                    break;
                }
                state.values.insert(key.clone(), Value::Null);
            }
            self.set(&key, value.clone());
        }
    }

    /// Store a non-enumerable value: excluded from [`keys`](Self::keys),
    /// never trapped.
    pub fn set_hidden(&self, key: &str, value: impl Into<Value>) {
        let mut state = self.shared.state.borrow_mut();
        if state.destroyed {
            return;
        }
        state.hidden.insert(key.to_owned(), value.into());
    }

    #[must_use]
    pub fn hidden(&self, key: &str) -> Value {
        self.shared
            .state
            .borrow()
            .hidden
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    // -- Trapping ------------------------------------------------------------

    fn trap_key(&self, key: &str) -> bool {
        let mut state = self.shared.state.borrow_mut();
        if state.destroyed || state.is_trapped(key) {
            return false;
        }
        state.trapped.insert(key.to_owned());
        if !state.values.contains_key(key) {
            let initial = state.current(key);
            state.values.insert(key.to_owned(), initial);
        }
        tracing::trace!(key, "property trapped");
        true
    }

    /// Turn each key into a trapped property. Idempotent.
    pub fn trap(&self, keys: impl Into<Keys>) {
        for key in keys.into().resolve(|| self.keys()) {
            self.trap_key(&key);
        }
    }

    /// Trap each key and register `callback` on its `change:<key>` event.
    ///
    /// Unless `options.init` is false, the callback runs once per key right
    /// away with the current value.
    pub fn trap_with(
        &self,
        keys: impl Into<Keys>,
        callback: impl Fn(&Change) + 'static,
        options: TrapOptions,
    ) -> Vec<ListenerId> {
        let callback: Rc<dyn Fn(&Change)> = Rc::new(callback);
        let keys = keys.into().resolve(|| self.keys());
        let mut ids = Vec::with_capacity(keys.len());

        for key in keys {
            self.trap_key(&key);
            let cb = Rc::clone(&callback);
            let listener: Listener = Rc::new(move |event: &Event| {
                if let Some(change) = event.change() {
                    cb(change);
                }
            });
            let name = change_event(&key);
            let id = match &options.cross_reference {
                Some(cross) => self.shared.bus.listen_linked_rc(&name, listener, cross),
                None => self.shared.bus.listen_rc(&name, listener),
            };
            ids.push(id);

            if options.init && !self.is_destroyed() {
                callback(&Change {
                    object: self.clone(),
                    value: self.get(&key),
                    key,
                    old: Value::Null,
                });
            }
        }
        ids
    }

    /// Remove every `change:<key>` listener and the cross-reference guards
    /// of linked ones. The keys stay trapped.
    pub fn untrap(&self, keys: impl Into<Keys>) {
        for key in keys.into().resolve(|| self.keys()) {
            self.shared.bus.forget_event(&change_event(&key));
        }
    }

    // -- Projection ----------------------------------------------------------

    /// Copy every change of `src_key` to `dest[dest_key]`, through the
    /// optional transformer. `dest` becomes the cross-reference unless it is
    /// this object.
    pub fn link<S>(
        &self,
        src_key: &str,
        dest: &S,
        dest_key: &str,
        options: LinkOptions,
    ) -> Vec<ListenerId>
    where
        S: Sink + Clone + 'static,
    {
        let cross = dest
            .emitter()
            .filter(|bus| !bus.ptr_eq(&self.shared.bus))
            .cloned();
        let sink = dest.clone();
        let dest_key = dest_key.to_owned();
        let transformer = options.transformer;

        let projector = move |change: &Change| {
            let current = change.object.get(&change.key);
            let value = match &transformer {
                Some(f) => f.call(&current),
                None => current,
            };
            sink.put(&dest_key, value);
        };

        self.trap_with(
            src_key,
            projector,
            TrapOptions {
                init: options.init,
                cross_reference: cross,
            },
        )
    }

    /// [`link`](Self::link) each key to the same key on `dest`.
    pub fn project<S>(&self, keys: impl Into<Keys>, dest: &S, transformer: Option<Function>)
    where
        S: Sink + Clone + 'static,
    {
        for key in keys.into().resolve(|| self.keys()) {
            let options = LinkOptions {
                transformer: transformer.clone(),
                init: true,
            };
            self.link(&key, dest, &key, options);
        }
    }

    // -- Derived properties --------------------------------------------------

    /// Declare `key` as derived from `dependencies`. It is computed now, then
    /// again on any dependency change and on [`compute`](Self::compute).
    pub fn define(
        &self,
        key: &str,
        dependencies: impl Into<Keys>,
        computation: impl Fn(&ReactiveObject) -> Value + 'static,
    ) {
        let recompute = derivation(key, computation);

        let on_change = Rc::clone(&recompute);
        self.trap_with(
            dependencies,
            move |change| on_change(&change.object),
            TrapOptions::new().init(false),
        );

        let on_outdate = Rc::clone(&recompute);
        self.shared.bus.listen(&outdate_event(key), move |event| {
            if let Some(object) = event.object() {
                on_outdate(&object);
            }
        });

        recompute(self);
    }

    /// Invalidate and recompute derived keys.
    pub fn compute(&self, keys: impl Into<Keys>) {
        for key in keys.into().resolve(|| self.keys()) {
            self.shared.bus.trigger(
                &outdate_event(&key),
                &Event::Value(Value::Object(self.clone())),
            );
        }
    }

    /// Register `callback` on `source`'s keys with this object as the
    /// cross-reference, so destroying either side unlinks it.
    pub fn watch(
        &self,
        source: &ReactiveObject,
        keys: impl Into<Keys>,
        callback: impl Fn(&Change) + 'static,
        options: TrapOptions,
    ) -> Vec<ListenerId> {
        let options = TrapOptions {
            cross_reference: Some(self.shared.bus.clone()),
            ..options
        };
        source.trap_with(keys, callback, options)
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Fire `destroy`, release cross-references and strip all state.
    pub fn destroy(&self) {
        self.destroy_with(&Event::Value(Value::Object(self.clone())));
    }

    pub(crate) fn destroy_with(&self, event: &Event) {
        if self.is_destroyed() {
            return;
        }
        self.shared.bus.destroy(event);

        let stripped = {
            let mut state = self.shared.state.borrow_mut();
            state.destroyed = true;
            (
                std::mem::take(&mut state.values),
                std::mem::take(&mut state.hidden),
                std::mem::take(&mut state.trapped),
                state.kind.take(),
            )
        };
        drop(stripped);
        tracing::debug!("object destroyed");
    }
}

/// Shared recompute closure for a derived key.
pub(crate) fn derivation(
    key: &str,
    computation: impl Fn(&ReactiveObject) -> Value + 'static,
) -> Rc<dyn Fn(&ReactiveObject)> {
    let key = key.to_owned();
    Rc::new(move |object: &ReactiveObject| {
        let value = computation(object);
        object.set(&key, value);
    })
}

impl Emitter for ReactiveObject {
    fn bus(&self) -> &EventBus {
        &self.shared.bus
    }
}

impl Sink for ReactiveObject {
    fn put(&self, key: &str, value: Value) {
        self.set(key, value);
    }

    fn emitter(&self) -> Option<&EventBus> {
        Some(&self.shared.bus)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tracing_test::traced_test;

    fn count_events(object: &ReactiveObject, name: &str) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0u32));
        let clone = Rc::clone(&count);
        object.listen(name, move |_| clone.set(clone.get() + 1));
        count
    }

    fn num(object: &ReactiveObject, key: &str) -> f64 {
        object.get(key).as_f64().unwrap_or(f64::NAN)
    }

    #[test]
    fn untrapped_write_is_silent() {
        let obj = ReactiveObject::new();
        let changes = count_events(&obj, CHANGE);
        obj.set("a", 1);
        assert_eq!(num(&obj, "a"), 1.0);
        assert_eq!(changes.get(), 0);
    }

    #[test]
    fn trapped_write_fires_keyed_then_generic() {
        let obj = ReactiveObject::new();
        obj.trap("a");
        let log = Rc::new(RefCell::new(Vec::new()));
        let l = Rc::clone(&log);
        obj.listen("change:a", move |e| {
            let change = e.change().expect("change record");
            l.borrow_mut()
                .push(format!("{}:{}->{}", change.key, change.old, change.value));
        });
        let l = Rc::clone(&log);
        obj.listen(CHANGE, move |_| l.borrow_mut().push("change".into()));

        obj.set("a", 5);
        assert_eq!(*log.borrow(), vec!["a:->5", "change"]);
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let obj = ReactiveObject::new();
        obj.set("a", "x");
        obj.trap("a");
        let keyed = count_events(&obj, "change:a");
        let generic = count_events(&obj, CHANGE);
        obj.set("a", "x");
        assert_eq!(keyed.get(), 0);
        assert_eq!(generic.get(), 0);
    }

    #[test]
    fn trap_is_idempotent_and_init_fires_once_per_registration() {
        let obj = ReactiveObject::new();
        obj.set("a", 1);
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        obj.trap_with("a", move |_| c.set(c.get() + 1), TrapOptions::new());
        assert_eq!(calls.get(), 1);

        obj.trap("a");
        obj.trap("a");
        assert_eq!(obj.listener_count_for("a"), 1);

        obj.set("a", 2);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn init_false_skips_first_call() {
        let obj = ReactiveObject::new();
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        obj.trap_with("a", move |_| c.set(c.get() + 1), TrapOptions::new().init(false));
        assert_eq!(calls.get(), 0);
        obj.set("a", true);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn wildcard_traps_current_keys() {
        let obj = ReactiveObject::new();
        obj.set("a", 1);
        obj.set("b", 2);
        obj.trap("*");
        assert!(obj.is_trapped("a"));
        assert!(obj.is_trapped("b"));
        assert!(!obj.is_trapped("c"));
    }

    #[test]
    fn trapping_makes_key_enumerable() {
        let obj = ReactiveObject::new();
        obj.trap("late");
        assert_eq!(obj.keys(), vec!["late"]);
        assert!(obj.get("late").is_null());
    }

    #[test]
    fn project_copies_with_transformer() {
        let src = ReactiveObject::new();
        let dest = ReactiveObject::new();
        src.project("foo", &dest, None);
        src.project(["bar", "baz"], &dest, Some(Function::new(|v| {
            Value::from(v.as_f64().unwrap_or(0.0) * 2.0)
        })));

        src.set("foo", "Hello, world!");
        src.set("bar", 2);
        src.set("baz", 50);

        assert_eq!(dest.get("foo").as_str(), Some("Hello, world!"));
        assert_eq!(num(&dest, "bar"), 4.0);
        assert_eq!(num(&dest, "baz"), 100.0);
    }

    #[test]
    fn link_renames_destination() {
        let src = ReactiveObject::new();
        let dest = ReactiveObject::new();
        src.link("foo", &dest, "bar", LinkOptions::new());
        src.link(
            "one",
            &dest,
            "two",
            LinkOptions::new().transform(Function::new(|v| {
                Value::from(v.display().to_uppercase())
            })),
        );

        src.set("foo", 50);
        src.set("one", "Hi, all!");

        assert!(dest.get("foo").is_null());
        assert_eq!(num(&dest, "bar"), 50.0);
        assert_eq!(dest.get("two").as_str(), Some("HI, ALL!"));
    }

    #[test]
    fn link_to_self_has_no_cross_reference() {
        let obj = ReactiveObject::new();
        obj.link("a", &obj, "b", LinkOptions::new());
        assert_eq!(obj.bus().guard_count(), 0);
        obj.set("a", 3);
        assert_eq!(num(&obj, "b"), 3.0);
    }

    #[test]
    fn untrap_releases_link_guards() {
        let a = ReactiveObject::new();
        let b = ReactiveObject::new();
        for _ in 0..4 {
            a.link("k", &b, "k", LinkOptions::new());
            a.untrap("k");
        }
        assert_eq!(a.listener_count_for("k"), 0);
        assert_eq!((a.bus().guard_count(), b.bus().guard_count()), (0, 0));

        a.set("k", 1);
        assert!(b.get("k").is_null());
    }

    #[test]
    fn destroying_destination_unlinks() {
        let src = ReactiveObject::new();
        let dest = ReactiveObject::new();
        src.project("a", &dest, None);
        dest.destroy();
        assert_eq!(src.listener_count_for("a"), 0);
        assert_eq!(src.bus().guard_count(), 0);
        src.set("a", 1);
        assert!(dest.get("a").is_null());
    }

    #[test]
    fn define_sum_and_product() {
        let obj = ReactiveObject::new();
        obj.define("sum", ["a", "b"], |o| {
            Value::from(o.get("a").as_f64().unwrap_or(0.0) + o.get("b").as_f64().unwrap_or(0.0))
        });
        obj.define("prod", ["a", "b"], |o| {
            Value::from(o.get("a").as_f64().unwrap_or(0.0) * o.get("b").as_f64().unwrap_or(0.0))
        });

        obj.set("a", 3);
        obj.set("b", 5);
        assert_eq!(num(&obj, "sum"), 8.0);
        assert_eq!(num(&obj, "prod"), 15.0);

        obj.set("a", 10);
        assert_eq!(num(&obj, "sum"), 15.0);
        assert_eq!(num(&obj, "prod"), 50.0);
    }

    #[test]
    fn compute_recomputes_external_state() {
        let obj = ReactiveObject::new();
        let clock = Rc::new(Cell::new(1u32));
        let c = Rc::clone(&clock);
        obj.define("stamp", Vec::<String>::new(), move |_| Value::from(c.get()));
        assert_eq!(num(&obj, "stamp"), 1.0);

        clock.set(7);
        assert_eq!(num(&obj, "stamp"), 1.0);
        obj.compute("stamp");
        assert_eq!(num(&obj, "stamp"), 7.0);
    }

    #[test]
    fn watch_unlinks_when_watcher_destroyed() {
        let source = ReactiveObject::new();
        let watcher = ReactiveObject::new();
        source.set("count", 1);
        watcher.set("outdated", false);

        let w = watcher.downgrade();
        watcher.watch(
            &source,
            "count",
            move |_| {
                if let Some(w) = w.upgrade() {
                    w.set("outdated", true);
                }
            },
            TrapOptions::new().init(false),
        );

        source.set("count", 2);
        assert_eq!(watcher.get("outdated").as_bool(), Some(true));

        watcher.destroy();
        assert_eq!(source.listener_count_for("count"), 0);
        assert_eq!(source.bus().guard_count(), 0);
    }

    #[test]
    fn untrap_removes_listeners_but_keeps_trap() {
        let obj = ReactiveObject::new();
        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        obj.trap_with("a", move |_| c.set(c.get() + 1), TrapOptions::new().init(false));
        obj.untrap("a");
        let generic = count_events(&obj, CHANGE);
        obj.set("a", 1);
        assert_eq!(calls.get(), 0);
        assert_eq!(generic.get(), 1);
    }

    #[test]
    fn overwrite_fires_on_equal_value() {
        let obj = ReactiveObject::new();
        obj.trap("a");
        obj.set("a", 1);
        let keyed = count_events(&obj, "change:a");
        obj.overwrite("a", 1);
        assert_eq!(keyed.get(), 1);
    }

    #[test]
    fn hidden_values_are_not_keys() {
        let obj = ReactiveObject::new();
        obj.set_hidden("domNode", 3);
        assert!(obj.keys().is_empty());
        assert_eq!(obj.hidden("domNode").as_f64(), Some(3.0));
    }

    #[test]
    fn destroy_strips_state_and_ignores_writes() {
        let obj = ReactiveObject::new();
        obj.trap("a");
        obj.set("a", 1);
        let destroyed = count_events(&obj, "destroy");
        obj.destroy();
        assert_eq!(destroyed.get(), 1);
        assert!(obj.is_destroyed());
        assert!(obj.keys().is_empty());

        obj.set("a", 2);
        assert!(obj.get("a").is_null());
        obj.destroy();
        assert_eq!(destroyed.get(), 1);
    }

    #[test]
    #[traced_test]
    fn write_after_destroy_is_logged() {
        let obj = ReactiveObject::new();
        obj.destroy();
        obj.set("late", 1);
        assert!(logs_contain("write to a destroyed object ignored"));
    }

    #[test]
    fn projector_reads_latest_value_after_reentrant_write() {
        let src = ReactiveObject::new();
        let dest = ReactiveObject::new();
        // Clamp to 10 before the projection runs.
        src.trap_with(
            "n",
            |change| {
                if change.value.as_f64().is_some_and(|n| n > 10.0) {
                    change.object.set("n", 10);
                }
            },
            TrapOptions::new().init(false),
        );
        src.project("n", &dest, None);
        src.set("n", 42);
        assert_eq!(num(&src, "n"), 10.0);
        assert_eq!(num(&dest, "n"), 10.0);
    }

    impl ReactiveObject {
        fn listener_count_for(&self, key: &str) -> usize {
            self.bus().listener_count(&change_event(key))
        }
    }
}

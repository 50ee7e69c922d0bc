#![forbid(unsafe_code)]

//! Type-level declarations shared by every instance.
//!
//! A [`ReactiveType`] is the declaration stub of a family of objects. Keys
//! trapped here are trapped on every instance created with
//! [`ReactiveObject::of_type`], and listeners registered here run before
//! the instance's own. Unlike instance traps, type traps never invoke their
//! callback on registration: there is no instance to read a value from yet.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::event_bus::{Emitter, Event, EventBus, Listener, ListenerId};
use crate::keys::Keys;
use crate::object::{Change, ReactiveObject, change_event, derivation, outdate_event};
use crate::value::Value;

#[derive(Default)]
struct TypeState {
    trapped: FxHashSet<String>,
    defaults: IndexMap<String, Value>,
}

struct TypeShared {
    name: String,
    bus: EventBus,
    state: RefCell<TypeState>,
}

/// Shared handle to a type declaration.
#[derive(Clone)]
pub struct ReactiveType {
    shared: Rc<TypeShared>,
}

impl fmt::Debug for ReactiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("ReactiveType")
            .field("name", &self.shared.name)
            .field("trapped", &state.trapped.len())
            .finish()
    }
}

impl ReactiveType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Rc::new(TypeShared {
                name: name.into(),
                bus: EventBus::new(),
                state: RefCell::new(TypeState::default()),
            }),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &ReactiveType) -> bool {
        Rc::ptr_eq(&self.shared, &other.shared)
    }

    /// Create an instance of this type.
    #[must_use]
    pub fn instantiate(&self) -> ReactiveObject {
        ReactiveObject::of_type(self)
    }

    #[must_use]
    pub fn is_trapped(&self, key: &str) -> bool {
        self.shared.state.borrow().trapped.contains(key)
    }

    /// Shadow default read by instances that have not written `key`.
    #[must_use]
    pub fn default_value(&self, key: &str) -> Value {
        self.shared
            .state
            .borrow()
            .defaults
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    pub fn set_default(&self, key: &str, value: impl Into<Value>) {
        self.shared
            .state
            .borrow_mut()
            .defaults
            .insert(key.to_owned(), value.into());
    }

    /// Declared keys in declaration order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.shared.state.borrow().defaults.keys().cloned().collect()
    }

    pub fn trap(&self, keys: impl Into<Keys>) {
        for key in keys.into().resolve(|| self.keys()) {
            let mut state = self.shared.state.borrow_mut();
            if state.trapped.insert(key.clone()) {
                state.defaults.entry(key.clone()).or_insert(Value::Null);
                tracing::trace!(kind = %self.shared.name, key, "type property trapped");
            }
        }
    }

    /// Trap each key and register `callback` for every instance. The
    /// callback is never invoked on registration.
    pub fn trap_with(
        &self,
        keys: impl Into<Keys>,
        callback: impl Fn(&Change) + 'static,
    ) -> Vec<ListenerId> {
        let callback: Rc<dyn Fn(&Change)> = Rc::new(callback);
        let keys = keys.into().resolve(|| self.keys());
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            self.trap(key.as_str());
            let cb = Rc::clone(&callback);
            let listener: Listener = Rc::new(move |event: &Event| {
                if let Some(change) = event.change() {
                    cb(change);
                }
            });
            ids.push(self.shared.bus.listen_rc(&change_event(&key), listener));
        }
        ids
    }

    /// Declare a derived key for every instance. Instances compute it on
    /// the first dependency change or on [`ReactiveObject::compute`].
    pub fn define(
        &self,
        key: &str,
        dependencies: impl Into<Keys>,
        computation: impl Fn(&ReactiveObject) -> Value + 'static,
    ) {
        let recompute = derivation(key, computation);
        self.trap(key);

        let on_change = Rc::clone(&recompute);
        self.trap_with(dependencies, move |change| on_change(&change.object));

        self.shared.bus.listen(&outdate_event(key), move |event| {
            if let Some(object) = event.object() {
                recompute(&object);
            }
        });
    }
}

impl Emitter for ReactiveType {
    fn bus(&self) -> &EventBus {
        &self.shared.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn instances_share_type_traps_and_defaults() {
        let point = ReactiveType::new("Point");
        point.set_default("x", 0);
        point.trap("x");

        let a = point.instantiate();
        let b = point.instantiate();
        assert!(a.is_trapped("x"));
        assert_eq!(a.get("x").as_f64(), Some(0.0));
        assert!(a.keys().is_empty());

        a.set("x", 4);
        assert_eq!(a.get("x").as_f64(), Some(4.0));
        assert_eq!(b.get("x").as_f64(), Some(0.0));
    }

    #[test]
    fn type_callbacks_never_init_and_see_the_instance() {
        let kind = ReactiveType::new("Counter");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        kind.trap_with("n", move |change| {
            s.borrow_mut().push(change.object.clone());
        });
        assert!(seen.borrow().is_empty());

        let obj = kind.instantiate();
        obj.set("n", 1);
        assert_eq!(seen.borrow().len(), 1);
        assert!(seen.borrow()[0].ptr_eq(&obj));
    }

    #[test]
    fn type_listeners_run_before_instance_listeners() {
        let kind = ReactiveType::new("T");
        let order = Rc::new(RefCell::new(Vec::new()));
        let o = Rc::clone(&order);
        kind.trap_with("v", move |_| o.borrow_mut().push("type"));

        let obj = kind.instantiate();
        let o = Rc::clone(&order);
        obj.listen("change:v", move |_| o.borrow_mut().push("instance"));
        obj.set("v", true);
        assert_eq!(*order.borrow(), vec!["type", "instance"]);
    }

    #[test]
    fn type_define_computes_per_instance() {
        let rect = ReactiveType::new("Rect");
        rect.define("area", ["w", "h"], |o| {
            Value::from(o.get("w").as_f64().unwrap_or(0.0) * o.get("h").as_f64().unwrap_or(0.0))
        });

        let r = rect.instantiate();
        r.set("w", 2);
        r.set("h", 3);
        assert_eq!(r.get("area").as_f64(), Some(6.0));

        let calls = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&calls);
        r.listen("change:area", move |_| c.set(c.get() + 1));
        r.compute("area");
        assert_eq!(calls.get(), 0, "recompute to the same value is silent");
    }
}

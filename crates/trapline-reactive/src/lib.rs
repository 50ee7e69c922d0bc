#![forbid(unsafe_code)]

//! Observable objects and sequences for trapline.
//!
//! - [`EventBus`]: named events with cross-reference cleanup
//! - [`ReactiveObject`]: trapped properties, projection, derived keys
//! - [`ReactiveType`]: type-level declarations shared by instances
//! - [`ReactiveSequence`]: observable sequences with mapped mirrors
//!
//! Everything here is single-threaded (`Rc`-based). Writes propagate
//! synchronously: when `set` returns, every listener, projection and mirror
//! has already run.

pub mod error;
pub mod event_bus;
pub mod keys;
pub mod object;
pub mod reactive_type;
pub mod sequence;
pub mod value;

pub use error::SequenceError;
pub use event_bus::{DESTROY, Emitter, Event, EventBus, Listener, ListenerId};
pub use keys::{Keys, WILDCARD};
pub use object::{
    CHANGE, Change, LinkOptions, ReactiveObject, Sink, TrapOptions, WeakObject, change_event,
    outdate_event,
};
pub use reactive_type::ReactiveType;
pub use sequence::{ADD, REMOVE, ReactiveSequence};
pub use value::{Function, NodeId, Value};

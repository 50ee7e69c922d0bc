#![forbid(unsafe_code)]

//! Trapped properties driving a render tree.
//!
//! This crate re-exports the three layers:
//!
//! | Crate | Provides |
//! |-------|----------|
//! | [`reactive`] | [`ReactiveObject`], [`ReactiveSequence`], [`EventBus`] |
//! | [`dom`] | [`RenderTarget`], [`HeadlessDom`] |
//! | [`template`] | [`Component`], [`Runtime`], [`TemplateConfig`] |
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use trapline::{Component, HeadlessDom, ReactiveObject, RenderTarget, Runtime};
//!
//! let dom = Rc::new(HeadlessDom::new());
//! let runtime = Runtime::new(dom.clone());
//!
//! let person = ReactiveObject::new();
//! person.set("name", "Ada");
//! let view = Component::new(&runtime, "<span>%name</span>", person.clone()).unwrap();
//! assert_eq!(dom.to_markup(view.root()), "<span>Ada</span>");
//!
//! person.set("name", "Grace");
//! assert_eq!(dom.text(view.root()), "Grace");
//! ```

pub use trapline_dom as dom;
pub use trapline_reactive as reactive;
pub use trapline_template as template;

pub use trapline_dom::{DomEvent, HeadlessDom, RenderTarget};
pub use trapline_reactive::{
    CHANGE, Change, DESTROY, Emitter, Event, EventBus, Function, Keys, LinkOptions, ListenerId,
    NodeId, ReactiveObject, ReactiveSequence, ReactiveType, SequenceError, Sink, TrapOptions,
    Value,
};
pub use trapline_template::{
    Component, ConfigError, Runtime, Scheduler, TemplateConfig, TemplateError, compile, expand,
};

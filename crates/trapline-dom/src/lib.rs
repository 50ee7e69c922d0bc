#![forbid(unsafe_code)]

//! Render targets for trapline.
//!
//! The template binder never touches a concrete node type. It drives a
//! [`RenderTarget`]: a handful of tree, attribute and event operations over
//! opaque [`NodeId`](trapline_reactive::NodeId) handles. [`HeadlessDom`] is
//! the in-memory implementation used by tests and non-browser hosts.

pub mod headless;
pub mod target;

pub use headless::{HeadlessDom, VOID_ELEMENTS};
pub use target::{DomEvent, DomListener, RenderTarget};

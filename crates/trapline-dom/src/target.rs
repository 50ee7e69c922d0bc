#![forbid(unsafe_code)]

//! The render-target capability set the binder drives.

use std::rc::Rc;

use trapline_reactive::{NodeId, ReactiveObject, Value};

/// A native event delivered to node listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomEvent {
    pub target: NodeId,
    pub name: String,
}

/// Listener registered with [`RenderTarget::add_listener`].
pub type DomListener = Rc<dyn Fn(&DomEvent)>;

/// A tree of DOM-like nodes.
///
/// Methods take `&self`; implementations use interior mutability so that
/// listeners may mutate the tree while an event is being dispatched.
/// Operations on unknown node ids are ignored.
pub trait RenderTarget {
    fn create_element(&self, tag: &str) -> NodeId;

    /// Create a leaf node showing `text`.
    fn create_text(&self, text: &str) -> NodeId;

    /// Append `child`, detaching it from its current parent first.
    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None` or not a child of `parent`.
    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>);

    /// Put `new` at `old`'s position and detach `old`.
    fn replace(&self, old: NodeId, new: NodeId);

    /// Detach `node` from its parent.
    fn remove(&self, node: NodeId);

    /// Detach every child of `node`.
    fn clear(&self, node: NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    /// Lowercase tag name, `None` for text nodes.
    fn tag(&self, node: NodeId) -> Option<String>;

    /// Concatenated text of the subtree.
    fn text(&self, node: NodeId) -> String;

    /// Set an attribute or property. `className` is an alias of `class`.
    fn set_attribute(&self, node: NodeId, name: &str, value: Value);

    /// Current attribute value, `Null` when absent.
    fn attribute(&self, node: NodeId, name: &str) -> Value;

    /// The node's style object. The same object is returned on every call.
    fn style(&self, node: NodeId) -> ReactiveObject;

    fn add_listener(&self, node: NodeId, event: &str, listener: DomListener);

    /// Fire `event` on `node`: the `on<event>` attribute function first,
    /// then listeners in registration order.
    fn dispatch(&self, node: NodeId, event: &str);

    /// Simulate activation, including checkbox and radio state changes.
    fn click(&self, node: NodeId);
}

#![forbid(unsafe_code)]

//! In-memory render target for tests and hosts without a browser.
//!
//! `HeadlessDom` keeps every node in an arena indexed by [`NodeId`]. Nodes
//! are never freed; detached nodes simply have no parent. It emulates the
//! host behaviours the binder depends on:
//!
//! - `click` toggles checkboxes, checks radios (unchecking same-`name`
//!   radios), then fires `click` and, when state changed, `change`
//! - `dispatch` calls the `on<event>` attribute function before listeners
//! - `className` reads and writes `class`
//!
//! # Example
//!
//! ```
//! use trapline_dom::{HeadlessDom, RenderTarget};
//!
//! let dom = HeadlessDom::new();
//! let span = dom.create_element("span");
//! let text = dom.create_text("Ada");
//! dom.append_child(span, text);
//! assert_eq!(dom.to_markup(span), "<span>Ada</span>");
//! ```

use std::cell::RefCell;
use std::fmt;
use std::fmt::Write as _;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use trapline_reactive::{NodeId, ReactiveObject, Value};

use crate::target::{DomEvent, DomListener, RenderTarget};

/// Elements serialized without a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

enum NodeKind {
    Element(String),
    Text(String),
}

struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: IndexMap<String, Value>,
    style: Option<ReactiveObject>,
    listeners: Vec<(String, DomListener)>,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attributes: IndexMap::new(),
            style: None,
            listeners: Vec::new(),
        }
    }
}

fn attribute_key(name: &str) -> &str {
    if name == "className" { "class" } else { name }
}

/// An arena-backed DOM-like tree.
#[derive(Default)]
pub struct HeadlessDom {
    nodes: RefCell<Vec<NodeData>>,
}

impl fmt::Debug for HeadlessDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDom")
            .field("nodes", &self.nodes.borrow().len())
            .finish()
    }
}

impl HeadlessDom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes ever created.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    fn push(&self, kind: NodeKind) -> NodeId {
        let mut nodes = self.nodes.borrow_mut();
        let id = NodeId::from_raw(nodes.len() as u32);
        nodes.push(NodeData::new(kind));
        id
    }

    fn with_node<R>(&self, id: NodeId, f: impl FnOnce(&NodeData) -> R) -> Option<R> {
        let nodes = self.nodes.borrow();
        let node = nodes.get(id.raw() as usize);
        if node.is_none() {
            tracing::warn!(node = id.raw(), "unknown node");
        }
        node.map(f)
    }

    fn with_node_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut NodeData) -> R) -> Option<R> {
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get_mut(id.raw() as usize);
        if node.is_none() {
            tracing::warn!(node = id.raw(), "unknown node");
        }
        node.map(f)
    }

    fn exists(&self, id: NodeId) -> bool {
        (id.raw() as usize) < self.nodes.borrow().len()
    }

    fn detach(&self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        let mut nodes = self.nodes.borrow_mut();
        if let Some(p) = nodes.get_mut(parent.raw() as usize) {
            p.children.retain(|c| *c != child);
        }
        if let Some(c) = nodes.get_mut(child.raw() as usize) {
            c.parent = None;
        }
    }

    fn is_input_of_type(&self, node: NodeId, kind: &str) -> bool {
        self.tag(node).as_deref() == Some("input")
            && self.attribute(node, "type").as_str() == Some(kind)
    }

    fn is_checked(&self, node: NodeId) -> bool {
        self.attribute(node, "checked").truthy()
    }

    fn radios_named(&self, name: &str) -> Vec<NodeId> {
        let nodes = self.nodes.borrow();
        nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| {
                matches!(&n.kind, NodeKind::Element(tag) if tag == "input")
                    && n.attributes.get("type").and_then(Value::as_str) == Some("radio")
                    && n.attributes.get("name").and_then(Value::as_str) == Some(name)
            })
            .map(|(i, _)| NodeId::from_raw(i as u32))
            .collect()
    }

    /// Simulate a user editing a form control: set `value`, then fire
    /// `input` and `change`.
    pub fn enter_value(&self, node: NodeId, value: impl Into<Value>) {
        self.set_attribute(node, "value", value.into());
        self.dispatch(node, "input");
        self.dispatch(node, "change");
    }

    /// Serialize the subtree rooted at `node`.
    #[must_use]
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let snapshot = self.with_node(node, |n| match &n.kind {
            NodeKind::Text(text) => Err(text.clone()),
            NodeKind::Element(tag) => Ok((
                tag.clone(),
                n.attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<Vec<_>>(),
                n.style.clone(),
                n.children.clone(),
            )),
        });
        let Some(snapshot) = snapshot else {
            return;
        };
        let (tag, attributes, style, children) = match snapshot {
            Err(text) => {
                out.push_str(&escape(&text, false));
                return;
            }
            Ok(parts) => parts,
        };

        out.push('<');
        out.push_str(&tag);
        for (name, value) in &attributes {
            match value {
                Value::Bool(true) => {
                    let _ = write!(out, " {name}");
                }
                Value::Bool(false) | Value::Null | Value::Function(_) | Value::Object(_) => {}
                Value::Node(id) => {
                    let _ = write!(out, " {name}=\"#{}\"", id.raw());
                }
                other => {
                    let _ = write!(out, " {name}=\"{}\"", escape(&other.display(), true));
                }
            }
        }
        if let Some(style) = style {
            let rules: Vec<String> = style
                .keys()
                .into_iter()
                .filter_map(|k| {
                    let v = style.get(&k);
                    (!v.is_null()).then(|| format!("{k}: {}", v.display()))
                })
                .collect();
            if !rules.is_empty() {
                let _ = write!(out, " style=\"{}\"", escape(&rules.join("; "), true));
            }
        }
        out.push('>');
        if VOID_ELEMENTS.contains(&tag.as_str()) {
            return;
        }
        for child in children {
            self.write_markup(child, out);
        }
        let _ = write!(out, "</{tag}>");
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

impl RenderTarget for HeadlessDom {
    fn create_element(&self, tag: &str) -> NodeId {
        self.push(NodeKind::Element(tag.to_ascii_lowercase()))
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_owned()))
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if parent == child || !self.exists(parent) || !self.exists(child) {
            return;
        }
        self.detach(child);
        let mut nodes = self.nodes.borrow_mut();
        let Some(p) = nodes.get_mut(parent.raw() as usize) else {
            return;
        };
        let position = reference.and_then(|r| p.children.iter().position(|c| *c == r));
        match position {
            Some(index) => p.children.insert(index, child),
            None => p.children.push(child),
        }
        if let Some(c) = nodes.get_mut(child.raw() as usize) {
            c.parent = Some(parent);
        }
    }

    fn replace(&self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let Some(parent) = self.parent(old) else {
            tracing::debug!(node = old.raw(), "replace on a detached node ignored");
            return;
        };
        self.insert_before(parent, new, Some(old));
        self.detach(old);
    }

    fn remove(&self, node: NodeId) {
        self.detach(node);
    }

    fn clear(&self, node: NodeId) {
        for child in self.children(node) {
            self.detach(child);
        }
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.with_node(node, |n| n.parent).flatten()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.with_node(node, |n| n.children.clone())
            .unwrap_or_default()
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = self.children(parent);
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    fn tag(&self, node: NodeId) -> Option<String> {
        self.with_node(node, |n| match &n.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            NodeKind::Text(_) => None,
        })
        .flatten()
    }

    fn text(&self, node: NodeId) -> String {
        let own = self.with_node(node, |n| match &n.kind {
            NodeKind::Text(text) => Some(text.clone()),
            NodeKind::Element(_) => None,
        });
        match own {
            Some(Some(text)) => text,
            Some(None) => self
                .children(node)
                .into_iter()
                .map(|child| self.text(child))
                .collect(),
            None => String::new(),
        }
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: Value) {
        if name == "style" {
            if let Value::Object(source) = &value {
                let style = self.style(node);
                for key in source.keys() {
                    style.set(&key, source.get(&key));
                }
            }
            return;
        }
        self.with_node_mut(node, |n| {
            n.attributes.insert(attribute_key(name).to_owned(), value);
        });
    }

    fn attribute(&self, node: NodeId, name: &str) -> Value {
        if name == "style" {
            return Value::Object(self.style(node));
        }
        self.with_node(node, |n| n.attributes.get(attribute_key(name)).cloned())
            .flatten()
            .unwrap_or_default()
    }

    fn style(&self, node: NodeId) -> ReactiveObject {
        self.with_node_mut(node, |n| n.style.get_or_insert_with(ReactiveObject::new).clone())
            .unwrap_or_default()
    }

    fn add_listener(&self, node: NodeId, event: &str, listener: DomListener) {
        self.with_node_mut(node, |n| n.listeners.push((event.to_owned(), listener)));
    }

    fn dispatch(&self, node: NodeId, event: &str) {
        let handler = self.attribute(node, &format!("on{event}"));
        let listeners: SmallVec<[DomListener; 2]> = self
            .with_node(node, |n| {
                n.listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, l)| Rc::clone(l))
                    .collect()
            })
            .unwrap_or_default();
        tracing::trace!(node = node.raw(), event, listeners = listeners.len(), "dispatch");

        if let Value::Function(handler) = handler {
            handler.call(&Value::Node(node));
        }
        let dom_event = DomEvent {
            target: node,
            name: event.to_owned(),
        };
        for listener in listeners {
            listener(&dom_event);
        }
    }

    fn click(&self, node: NodeId) {
        let mut changed = false;
        if self.is_input_of_type(node, "checkbox") {
            let checked = self.is_checked(node);
            self.set_attribute(node, "checked", Value::Bool(!checked));
            changed = true;
        } else if self.is_input_of_type(node, "radio") && !self.is_checked(node) {
            if let Some(name) = self.attribute(node, "name").as_str() {
                for other in self.radios_named(name) {
                    if other != node {
                        self.set_attribute(other, "checked", Value::Bool(false));
                    }
                }
            }
            self.set_attribute(node, "checked", Value::Bool(true));
            changed = true;
        }

        self.dispatch(node, "click");
        if changed {
            self.dispatch(node, "change");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use trapline_reactive::Function;

    fn list(dom: &HeadlessDom, items: &[&str]) -> (NodeId, Vec<NodeId>) {
        let ul = dom.create_element("ul");
        let children = items
            .iter()
            .map(|t| {
                let li = dom.create_element("li");
                let text = dom.create_text(t);
                dom.append_child(li, text);
                dom.append_child(ul, li);
                li
            })
            .collect();
        (ul, children)
    }

    #[test]
    fn tree_edits() {
        let dom = HeadlessDom::new();
        let (ul, items) = list(&dom, &["a", "b", "c"]);
        assert_eq!(dom.text(ul), "abc");

        let x = dom.create_text("x");
        dom.insert_before(ul, x, Some(items[1]));
        assert_eq!(dom.text(ul), "axbc");

        let y = dom.create_text("y");
        dom.replace(x, y);
        assert_eq!(dom.text(ul), "aybc");
        assert_eq!(dom.parent(x), None);

        dom.remove(items[0]);
        assert_eq!(dom.text(ul), "ybc");
        assert_eq!(dom.next_sibling(y), Some(items[1]));

        dom.clear(ul);
        assert!(dom.children(ul).is_empty());
    }

    #[test]
    fn appending_moves_an_attached_node() {
        let dom = HeadlessDom::new();
        let (a, items) = list(&dom, &["1", "2"]);
        let b = dom.create_element("div");
        dom.append_child(b, items[0]);
        assert_eq!(dom.children(a), vec![items[1]]);
        assert_eq!(dom.parent(items[0]), Some(b));
    }

    #[test]
    fn class_name_aliases_class() {
        let dom = HeadlessDom::new();
        let div = dom.create_element("DIV");
        dom.set_attribute(div, "className", Value::from("big"));
        assert_eq!(dom.attribute(div, "class").as_str(), Some("big"));
        assert_eq!(dom.to_markup(div), "<div class=\"big\"></div>");
    }

    #[test]
    fn style_object_is_stable_and_serialized() {
        let dom = HeadlessDom::new();
        let p = dom.create_element("p");
        let style = dom.style(p);
        style.set("color", "red");
        assert!(dom.style(p).ptr_eq(&style));
        assert_eq!(dom.to_markup(p), "<p style=\"color: red\"></p>");
    }

    #[test]
    fn dispatch_runs_handler_attribute_then_listeners() {
        let dom = HeadlessDom::new();
        let button = dom.create_element("button");
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = Rc::clone(&log);
        dom.add_listener(button, "click", Rc::new(move |_: &DomEvent| l.borrow_mut().push("listener")));
        let l = Rc::clone(&log);
        dom.set_attribute(
            button,
            "onclick",
            Value::from(Function::handler(move |_| l.borrow_mut().push("handler"))),
        );

        dom.click(button);
        assert_eq!(*log.borrow(), vec!["handler", "listener"]);
    }

    #[test]
    fn checkbox_click_toggles_and_fires_change() {
        let dom = HeadlessDom::new();
        let input = dom.create_element("input");
        dom.set_attribute(input, "type", Value::from("checkbox"));
        let changes = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&changes);
        dom.add_listener(input, "change", Rc::new(move |_: &DomEvent| c.set(c.get() + 1)));

        dom.click(input);
        assert_eq!(dom.attribute(input, "checked").as_bool(), Some(true));
        dom.click(input);
        assert_eq!(dom.attribute(input, "checked").as_bool(), Some(false));
        assert_eq!(changes.get(), 2);
    }

    #[test]
    fn radio_click_unchecks_same_name() {
        let dom = HeadlessDom::new();
        let radios: Vec<NodeId> = (0..3)
            .map(|i| {
                let r = dom.create_element("input");
                dom.set_attribute(r, "type", Value::from("radio"));
                dom.set_attribute(r, "name", Value::from(if i < 2 { "g" } else { "other" }));
                r
            })
            .collect();
        dom.click(radios[2]);
        dom.click(radios[0]);
        dom.click(radios[1]);
        assert!(!dom.is_checked(radios[0]));
        assert!(dom.is_checked(radios[1]));
        assert!(dom.is_checked(radios[2]));

        let changes = Rc::new(Cell::new(0u32));
        let c = Rc::clone(&changes);
        dom.add_listener(radios[1], "change", Rc::new(move |_: &DomEvent| c.set(c.get() + 1)));
        dom.click(radios[1]);
        assert_eq!(changes.get(), 0, "already checked");
    }

    #[test]
    fn markup_escapes_and_skips_void_close() {
        let dom = HeadlessDom::new();
        let div = dom.create_element("div");
        let input = dom.create_element("input");
        dom.set_attribute(input, "value", Value::from("a\"b"));
        dom.set_attribute(input, "disabled", Value::Bool(true));
        let text = dom.create_text("1 < 2");
        dom.append_child(div, input);
        dom.append_child(div, text);
        assert_eq!(
            dom.to_markup(div),
            "<div><input value=\"a&quot;b\" disabled>1 &lt; 2</div>"
        );
    }

    #[test]
    fn enter_value_fires_input_and_change() {
        let dom = HeadlessDom::new();
        let input = dom.create_element("input");
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["input", "change"] {
            let l = Rc::clone(&log);
            dom.add_listener(input, name, Rc::new(move |e: &DomEvent| l.borrow_mut().push(e.name.clone())));
        }
        dom.enter_value(input, "hi");
        assert_eq!(dom.attribute(input, "value").as_str(), Some("hi"));
        assert_eq!(*log.borrow(), vec!["input", "change"]);
    }
}

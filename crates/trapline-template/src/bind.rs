#![forbid(unsafe_code)]

//! Phase 2: instantiate a compiled template and wire its bindings.
//!
//! # Design
//!
//! Binding runs in two passes. The first creates every node, sets literal
//! attributes and records each directive and placeholder in document order
//! (a node's attributes before its children). The second applies them, so
//! directives that look at the surrounding tree (`-label`) see it complete.
//!
//! | Compiled item | Binding |
//! |---------------|---------|
//! | `-ref=%k` | `object[k] = node` |
//! | `-label="t"` | `<label><span>t</span></label>` after the node, forwarding clicks |
//! | `-group=%k` | shared synthetic `name`, `object[k] = value` on change, siblings notified |
//! | `%a`, `a=%k`, `a=%f:k` | `object.link(k, node, a, f)` plus two-way write-back on form controls |
//! | variable placeholder | trapped key re-renders one position |
//! | list placeholder | trapped key re-renders a run of positions before an anchor |
//!
//! # Invariants
//!
//! 1. Closures stored in the render target hold the bound object and the
//!    runtime weakly; the target never keeps a component alive.
//! 2. `on*` handlers on `input` and `select` run one scheduler turn after the
//!    native event, so two-way write-back has already happened.
//! 3. A list binding listens to at most one sequence at a time.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;
use trapline_dom::{DomEvent, RenderTarget};
use trapline_reactive::{
    CHANGE, DESTROY, Emitter, Event, Function, LinkOptions, ListenerId, NodeId, ReactiveObject,
    ReactiveSequence, Sink, TrapOptions, Value,
};

use crate::directive::AttrDirective;
use crate::markup::{CompiledNode, Marker, MarkerKind};
use crate::runtime::Runtime;

/// Hidden property holding a component's root node.
pub const DOM_NODE: &str = "domNode";

/// The node that renders `value`: a node as is, a component's root, or a
/// new text node.
pub fn to_node(target: &dyn RenderTarget, value: &Value) -> NodeId {
    match value {
        Value::Node(id) => *id,
        Value::Object(object) => match object.hidden(DOM_NODE) {
            Value::Node(id) => id,
            _ => target.create_text(&value.display()),
        },
        other => target.create_text(&other.display()),
    }
}

/// Writes linked values to one node's attributes.
#[derive(Clone)]
struct NodeSink {
    runtime: Weak<Runtime>,
    node: NodeId,
}

impl Sink for NodeSink {
    fn put(&self, key: &str, value: Value) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.target().set_attribute(self.node, key, value);
        }
    }
}

struct Group {
    name: String,
    key: String,
    members: RefCell<Vec<NodeId>>,
    notifying: Cell<bool>,
}

enum Pending<'t> {
    Attributes {
        node: NodeId,
        directives: &'t [AttrDirective],
    },
    Placeholder {
        anchor: NodeId,
        marker: &'t Marker,
    },
}

pub(crate) struct Binder<'a, 't> {
    runtime: &'a Rc<Runtime>,
    object: &'a ReactiveObject,
    groups: FxHashMap<String, Rc<Group>>,
    pending: Vec<Pending<'t>>,
}

impl<'a, 't> Binder<'a, 't> {
    pub(crate) fn new(runtime: &'a Rc<Runtime>, object: &'a ReactiveObject) -> Self {
        Self {
            runtime,
            object,
            groups: FxHashMap::default(),
            pending: Vec::new(),
        }
    }

    fn target(&self) -> &dyn RenderTarget {
        self.runtime.target()
    }

    fn weak_runtime(&self) -> Weak<Runtime> {
        Rc::downgrade(self.runtime)
    }

    // -- Pass 1: build ---------------------------------------------------------

    pub(crate) fn build(&mut self, node: &'t CompiledNode) -> NodeId {
        match node {
            CompiledNode::Text(text) => self.target().create_text(text),
            CompiledNode::Placeholder(marker) => {
                let anchor = self.target().create_text("");
                self.pending.push(Pending::Placeholder { anchor, marker });
                anchor
            }
            CompiledNode::Element {
                tag,
                attributes,
                children,
            } => {
                let id = self.target().create_element(tag);
                let mut bound = false;
                for directive in attributes {
                    match directive {
                        AttrDirective::Literal { name, value } => {
                            let value = value.as_deref().map_or(Value::Bool(true), Value::from);
                            self.target().set_attribute(id, name, value);
                        }
                        _ => bound = true,
                    }
                }
                if bound {
                    self.pending.push(Pending::Attributes {
                        node: id,
                        directives: attributes,
                    });
                }
                for child in children {
                    let child = self.build(child);
                    self.target().append_child(id, child);
                }
                id
            }
        }
    }

    // -- Pass 2: bind ----------------------------------------------------------

    pub(crate) fn bind(mut self) {
        let pending = std::mem::take(&mut self.pending);
        for item in pending {
            match item {
                Pending::Attributes { node, directives } => {
                    for directive in directives {
                        self.bind_directive(node, directive);
                    }
                }
                Pending::Placeholder { anchor, marker } => match marker.kind {
                    MarkerKind::Variable => self.bind_variable(anchor, marker),
                    MarkerKind::List => self.bind_list(anchor, marker),
                },
            }
        }
    }

    fn bind_directive(&mut self, node: NodeId, directive: &AttrDirective) {
        match directive {
            AttrDirective::Reference { key } => self.object.set(key, Value::Node(node)),
            AttrDirective::Label { text } => self.bind_label(node, text),
            AttrDirective::Group { key } => self.join_group(node, key),
            AttrDirective::ShorthandBind { key } => self.link_attribute(key, node, key, None),
            AttrDirective::FuncBind { attr, func, key } => {
                let transform = self.transform(func);
                self.link_attribute(key, node, attr, Some(transform));
            }
            AttrDirective::PlainBind { attr, key } => self.link_attribute(key, node, attr, None),
            AttrDirective::Literal { .. } => {}
        }
    }

    /// The function property `name`, or a pass-through that keeps looking
    /// it up when it is missing.
    fn transform(&self, name: &str) -> Function {
        if let Some(found) = self.object.get(name).as_function() {
            return found.clone();
        }
        let object = self.object.downgrade();
        let name = name.to_owned();
        Function::new(move |value| {
            match object.upgrade().map(|o| o.get(&name)) {
                Some(Value::Function(f)) => f.call(value),
                _ => {
                    tracing::warn!(transform = %name, "transform missing, value passed through");
                    value.clone()
                }
            }
        })
    }

    // -- Directives --------------------------------------------------------------

    fn bind_label(&self, node: NodeId, text: &str) {
        let target = self.target();
        let Some(parent) = target.parent(node) else {
            tracing::debug!(node = node.raw(), "-label on a root node ignored");
            return;
        };
        let label = target.create_element("label");
        let span = target.create_element("span");
        let caption = target.create_text(text);
        target.append_child(span, caption);
        target.append_child(label, span);
        target.set_attribute(label, "for", Value::Node(node));

        let runtime = self.weak_runtime();
        target.set_attribute(
            label,
            "onclick",
            Value::from(Function::handler(move |_| {
                if let Some(runtime) = runtime.upgrade() {
                    runtime.target().click(node);
                }
            })),
        );
        target.insert_before(parent, label, target.next_sibling(node));
    }

    fn join_group(&mut self, node: NodeId, key: &str) {
        let runtime = self.runtime;
        let group = Rc::clone(self.groups.entry(key.to_owned()).or_insert_with(|| {
            Rc::new(Group {
                name: runtime.unique_name(),
                key: key.to_owned(),
                members: RefCell::new(Vec::new()),
                notifying: Cell::new(false),
            })
        }));
        group.members.borrow_mut().push(node);
        self.target()
            .set_attribute(node, "name", Value::from(group.name.as_str()));

        let object = self.object.downgrade();
        let runtime = self.weak_runtime();
        self.target().add_listener(
            node,
            "change",
            Rc::new(move |event: &DomEvent| {
                let (Some(object), Some(runtime)) = (object.upgrade(), runtime.upgrade()) else {
                    return;
                };
                if group.notifying.replace(true) {
                    return;
                }
                let target = runtime.target();
                object.set(&group.key, target.attribute(event.target, "value"));
                let siblings: Vec<NodeId> = group.members.borrow().clone();
                for sibling in siblings.into_iter().filter(|s| *s != event.target) {
                    target.dispatch(sibling, "change");
                }
                group.notifying.set(false);
            }),
        );
    }

    fn link_attribute(&self, src: &str, node: NodeId, dest: &str, transform: Option<Function>) {
        let target = self.target();
        let mut dest = match dest {
            "class" => "className".to_owned(),
            other => other.to_owned(),
        };
        if dest == "style" {
            self.object.set(src, Value::Object(target.style(node)));
            return;
        }

        let tag = target.tag(node).unwrap_or_default();
        let form_control = tag == "input" || tag == "select";
        if form_control && dest.starts_with("on") {
            dest = self.defer_handler(node, &dest);
        }

        let sink = NodeSink {
            runtime: self.weak_runtime(),
            node,
        };
        self.object.link(
            src,
            &sink,
            &dest,
            LinkOptions {
                transformer: transform,
                init: true,
            },
        );

        let input_type = target.attribute(node, "type");
        let input_type = input_type.as_str().unwrap_or("text");
        let two_way = match tag.as_str() {
            "select" => matches!(dest.as_str(), "value" | "selectedIndex" | "selectedOptions"),
            "input" => match input_type {
                "radio" | "checkbox" => dest == "checked",
                _ => dest == "value",
            },
            _ => false,
        };
        if two_way {
            self.write_back(node, src, &dest);
        }
    }

    /// Install a native `dest` handler that runs the function stored under
    /// `.dest` one scheduler turn later. Returns the new destination.
    fn defer_handler(&self, node: NodeId, dest: &str) -> String {
        let deferred = format!(".{dest}");
        let hidden = deferred.clone();
        let runtime = self.weak_runtime();
        self.target().set_attribute(
            node,
            dest,
            Value::from(Function::handler(move |event| {
                let Some(rt) = runtime.upgrade() else {
                    return;
                };
                let runtime = Rc::downgrade(&rt);
                let hidden = hidden.clone();
                let event = event.clone();
                rt.scheduler().schedule(move || {
                    let Some(rt) = runtime.upgrade() else {
                        return;
                    };
                    if let Value::Function(handler) = rt.target().attribute(node, &hidden) {
                        handler.call(&event);
                    }
                });
            })),
        );
        deferred
    }

    fn write_back(&self, node: NodeId, src: &str, dest: &str) {
        let object = self.object.downgrade();
        let runtime = self.weak_runtime();
        let src = src.to_owned();
        let dest = dest.to_owned();
        self.target().add_listener(
            node,
            "change",
            Rc::new(move |_: &DomEvent| {
                if let (Some(object), Some(runtime)) = (object.upgrade(), runtime.upgrade()) {
                    object.set(&src, runtime.target().attribute(node, &dest));
                }
            }),
        );
    }

    // -- Placeholders --------------------------------------------------------------

    fn bind_variable(&self, anchor: NodeId, marker: &Marker) {
        let transform = marker.func.as_deref().map(|f| self.transform(f));
        let runtime = self.weak_runtime();
        let current = Cell::new(anchor);

        self.object.trap_with(
            marker.key.as_str(),
            move |change| {
                let Some(runtime) = runtime.upgrade() else {
                    return;
                };
                let value = change.object.get(&change.key);
                let value = match &transform {
                    Some(f) => f.call(&value),
                    None => value,
                };
                let target = runtime.target();
                let node = to_node(target, &value);
                target.replace(current.get(), node);
                current.set(node);
            },
            TrapOptions::new(),
        );
    }

    fn bind_list(&self, anchor: NodeId, marker: &Marker) {
        let transform = marker.func.as_deref().map(|f| self.transform(f));
        let state = Rc::new(RefCell::new(ListState::default()));

        let on_destroy = Rc::downgrade(&state);
        self.object.listen(DESTROY, move |_| {
            if let Some(state) = on_destroy.upgrade() {
                state.borrow_mut().unsubscribe();
            }
        });

        let runtime = self.weak_runtime();
        let key = marker.key.clone();
        self.object.trap_with(
            marker.key.as_str(),
            move |change| {
                let Some(rt) = runtime.upgrade() else {
                    return;
                };
                state.borrow_mut().unsubscribe();

                let items = match change.object.get(&change.key) {
                    Value::Sequence(seq) => {
                        let (watched, mirror) = match &transform {
                            Some(f) => {
                                let mirror = seq.mirror(f.clone());
                                (mirror.clone(), Some(mirror))
                            }
                            None => (seq, None),
                        };
                        let listener = watched.bus().listen_linked(
                            CHANGE,
                            rerender(Rc::downgrade(&rt), Rc::downgrade(&state), anchor),
                            change.object.bus(),
                        );
                        let items = watched.to_vec();
                        state.borrow_mut().subscription = Some(Subscription {
                            sequence: watched,
                            listener,
                            mirror,
                        });
                        items
                    }
                    Value::Null => Vec::new(),
                    other => {
                        tracing::warn!(key = %key, "list binding received a non-sequence value");
                        let item = match &transform {
                            Some(f) => f.call(&other),
                            None => other,
                        };
                        vec![item]
                    }
                };
                state.borrow_mut().render(rt.target(), anchor, &items);
            },
            TrapOptions::new(),
        );
    }
}

struct Subscription {
    sequence: ReactiveSequence,
    listener: ListenerId,
    /// Mirror created for a transformed list, owned by the binding.
    mirror: Option<ReactiveSequence>,
}

#[derive(Default)]
struct ListState {
    rendered: Vec<NodeId>,
    subscription: Option<Subscription>,
}

impl ListState {
    fn unsubscribe(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.sequence.forget(CHANGE, sub.listener);
            if let Some(mirror) = sub.mirror {
                mirror.destroy();
            }
        }
    }

    /// Replace the rendered run before `anchor` with nodes for `items`.
    fn render(&mut self, target: &dyn RenderTarget, anchor: NodeId, items: &[Value]) {
        let parent = target.parent(anchor);
        for node in self.rendered.drain(..) {
            if target.parent(node) == parent {
                target.remove(node);
            }
        }
        let Some(parent) = parent else {
            return;
        };
        for item in items {
            let node = to_node(target, item);
            target.insert_before(parent, node, Some(anchor));
            self.rendered.push(node);
        }
        tracing::trace!(items = items.len(), "list re-rendered");
    }
}

fn rerender(
    runtime: Weak<Runtime>,
    state: Weak<RefCell<ListState>>,
    anchor: NodeId,
) -> impl Fn(&Event) + 'static {
    move |event: &Event| {
        let (Some(runtime), Some(state)) = (runtime.upgrade(), state.upgrade()) else {
            return;
        };
        if let Value::Sequence(seq) = event.value() {
            let items = seq.to_vec();
            state.borrow_mut().render(runtime.target(), anchor, &items);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Component;
    use trapline_dom::HeadlessDom;

    fn setup() -> (Rc<HeadlessDom>, Rc<Runtime>) {
        let dom = Rc::new(HeadlessDom::new());
        let runtime = Runtime::new(dom.clone());
        (dom, runtime)
    }

    // ---- to_node ----

    #[test]
    fn scalars_become_text_nodes() {
        let dom = HeadlessDom::new();
        let node = to_node(&dom, &Value::from(2.5));
        assert_eq!(dom.text(node), "2.5");
        assert_eq!(to_node(&dom, &Value::Node(node)), node);
        let plain = ReactiveObject::new();
        assert_eq!(dom.text(to_node(&dom, &Value::Object(plain))), "[object]");
    }

    // ---- Directives ----

    #[test]
    fn reference_stores_the_node() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        let _c = Component::new(&rt, "<form><input -ref=%field></form>", object.clone()).unwrap();
        let field = object.get("field").as_node().unwrap();
        assert_eq!(dom.tag(field).as_deref(), Some("input"));
    }

    #[test]
    fn label_follows_its_node_and_forwards_clicks() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        object.set("checked", false);
        let c = Component::new(
            &rt,
            r#"<div><input type="checkbox" %checked -label="Remember me"></div>"#,
            object.clone(),
        )
        .unwrap();

        let children = dom.children(c.root());
        assert_eq!(children.len(), 2);
        let label = children[1];
        assert_eq!(dom.tag(label).as_deref(), Some("label"));
        assert_eq!(dom.text(label), "Remember me");

        dom.click(label);
        assert_eq!(object.get("checked").as_bool(), Some(true));
        dom.click(label);
        assert_eq!(object.get("checked").as_bool(), Some(false));
    }

    #[test]
    fn groups_share_one_name_per_key() {
        let (dom, rt) = setup();
        let c = Component::new(
            &rt,
            r#"<div>
                <input type="radio" value="a" -group=%x>
                <input type="radio" value="b" -group=%x>
                <input type="radio" value="c" -group=%y>
            </div>"#,
            ReactiveObject::new(),
        )
        .unwrap();

        let names: Vec<String> = dom
            .children(c.root())
            .into_iter()
            .filter(|n| dom.tag(*n).is_some())
            .map(|n| dom.attribute(n, "name").display())
            .collect();
        assert_eq!(names, vec!["group.1", "group.1", "group.2"]);
    }

    #[test]
    fn text_input_is_two_way() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        object.set("value", "a");
        let c = Component::new(&rt, "<input %value>", object.clone()).unwrap();
        assert_eq!(dom.attribute(c.root(), "value").as_str(), Some("a"));

        dom.enter_value(c.root(), "b");
        assert_eq!(object.get("value").as_str(), Some("b"));

        object.set("value", "c");
        assert_eq!(dom.attribute(c.root(), "value").as_str(), Some("c"));
    }

    #[test]
    fn plain_attribute_is_one_way() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        object.set("tip", "hello");
        let c = Component::new(&rt, "<input title=%tip>", object.clone()).unwrap();
        dom.set_attribute(c.root(), "title", Value::from("edited"));
        dom.dispatch(c.root(), "change");
        assert_eq!(object.get("tip").as_str(), Some("hello"));
    }

    #[test]
    fn form_control_handlers_run_after_write_back() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let weak = object.downgrade();
        let s = Rc::clone(&seen);
        object.set("value", "");
        object.set(
            "changed",
            Function::handler(move |_| {
                if let Some(object) = weak.upgrade() {
                    s.borrow_mut().push(object.get("value").display());
                }
            }),
        );
        let c = Component::new(&rt, "<input %value onchange=%changed>", object.clone()).unwrap();

        dom.enter_value(c.root(), "typed");
        assert!(seen.borrow().is_empty());
        assert_eq!(rt.scheduler().pending(), 1);

        rt.run_pending();
        assert_eq!(*seen.borrow(), vec!["typed".to_owned()]);
    }

    #[test]
    fn handlers_on_other_elements_are_immediate() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        let clicks = Rc::new(Cell::new(0));
        let c2 = Rc::clone(&clicks);
        object.set("press", Function::handler(move |_| c2.set(c2.get() + 1)));
        let c = Component::new(&rt, "<button onclick=%press>Go</button>", object).unwrap();
        dom.click(c.root());
        assert_eq!(clicks.get(), 1);
        assert_eq!(rt.scheduler().pending(), 0);
    }

    #[test]
    fn class_and_style_redirects() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        object.set("kind", "big");
        let c = Component::new(&rt, "<p class=%kind style=%look>x</p>", object.clone()).unwrap();

        let look = object.get("look");
        let style = look.as_object().unwrap();
        assert!(style.ptr_eq(&dom.style(c.root())));
        style.set("color", "red");
        assert_eq!(dom.to_markup(c.root()), "<p class=\"big\" style=\"color: red\">x</p>");

        object.set("kind", "small");
        assert_eq!(dom.attribute(c.root(), "class").as_str(), Some("small"));
    }

    // ---- Placeholders ----

    #[test]
    fn list_switches_sequences() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        let first = ReactiveSequence::from(vec![Value::from("a")]);
        object.set("items", Value::Sequence(first.clone()));
        let c = Component::new(&rt, "<ul>%items...</ul>", object.clone()).unwrap();
        assert_eq!(dom.text(c.root()), "a");

        let second = ReactiveSequence::from(vec![Value::from("x"), Value::from("y")]);
        object.set("items", Value::Sequence(second.clone()));
        assert_eq!(dom.text(c.root()), "xy");
        assert_eq!(first.bus().listener_count(CHANGE), 0);

        first.push_back("ignored");
        assert_eq!(dom.text(c.root()), "xy");
        second.push_back("z");
        assert_eq!(dom.text(c.root()), "xyz");
    }

    #[test]
    fn transformed_list_renders_through_a_mirror() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        object.set(
            "li",
            Function::new(|v| Value::from(format!("[{}]", v.display()))),
        );
        let items = ReactiveSequence::from(vec![Value::from(1), Value::from(2)]);
        object.set("items", Value::Sequence(items.clone()));
        let c = Component::new(&rt, "<ol>%li:items...</ol>", object.clone()).unwrap();
        assert_eq!(dom.text(c.root()), "[1][2]");
        assert_eq!(items.mirror_count(), 1);

        items.set(0, 5).unwrap();
        assert_eq!(dom.text(c.root()), "[5][2]");

        object.set("items", Value::Null);
        assert_eq!(dom.text(c.root()), "");
        assert_eq!(items.mirror_count(), 0);
    }

    #[test]
    fn list_render_leaves_surrounding_nodes() {
        let (dom, rt) = setup();
        let object = ReactiveObject::new();
        let items = ReactiveSequence::from(vec![Value::from("b")]);
        object.set("items", Value::Sequence(items.clone()));
        let c = Component::new(&rt, "<p>a%{items...}c</p>", object).unwrap();
        assert_eq!(dom.text(c.root()), "abc");
        items.push_front("0");
        assert_eq!(dom.text(c.root()), "a0bc");
        items.pop_back();
        assert_eq!(dom.text(c.root()), "a0c");
    }
}

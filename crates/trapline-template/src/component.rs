#![forbid(unsafe_code)]

//! A template bound to a reactive object.
//!
//! [`Component`] compiles a template (or takes a [`CompiledTemplate`]),
//! builds its nodes in the runtime's render target and wires every
//! directive and placeholder to the bound object. The root node is stored
//! on the object under the hidden [`DOM_NODE`] property, so a component's
//! object can be placed into another component's placeholder. An object
//! made from a [`ReactiveType`](trapline_reactive::ReactiveType) also gets
//! the type's name as a class on the root.
//!
//! # Failure Modes
//!
//! | Situation | Result |
//! |-----------|--------|
//! | Malformed markup | [`TemplateError::Parse`] |
//! | `func:` name not a function, validation on | [`TemplateError::UnknownTransform`] |
//! | `func:` name not a function, validation off | `warn!`, value passes through |
//! | Object destroyed | root cleared, bindings released |

use std::rc::Rc;

use trapline_dom::RenderTarget;
use trapline_reactive::{DESTROY, Emitter, EventBus, NodeId, ReactiveObject, Value};

use crate::bind::{Binder, DOM_NODE};
use crate::error::TemplateError;
use crate::markup::{CompiledTemplate, compile};
use crate::runtime::Runtime;

/// Tag of the element wrapping multi-root and placeholder-root templates.
const WRAPPER_TAG: &str = "div";

pub struct Component {
    runtime: Rc<Runtime>,
    object: ReactiveObject,
    root: NodeId,
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("root", &self.root)
            .field("object", &self.object)
            .finish_non_exhaustive()
    }
}

impl Component {
    /// Compile `template` and bind it to `object`.
    pub fn new(
        runtime: &Rc<Runtime>,
        template: &str,
        object: ReactiveObject,
    ) -> Result<Self, TemplateError> {
        let compiled = compile(template, runtime.config())?;
        Self::from_compiled(runtime, &compiled, object, None)
    }

    /// Like [`Component::new`], then project from `values` every key the
    /// bound object holds after binding that `values` also holds. `style`
    /// is not projected: when the object has a `style` key, the entries of
    /// `values.style` are copied into it instead.
    pub fn with_values(
        runtime: &Rc<Runtime>,
        template: &str,
        object: ReactiveObject,
        values: &ReactiveObject,
    ) -> Result<Self, TemplateError> {
        let compiled = compile(template, runtime.config())?;
        Self::from_compiled(runtime, &compiled, object, Some(values))
    }

    /// Bind an already compiled template. The same [`CompiledTemplate`] can
    /// be bound any number of times.
    pub fn from_compiled(
        runtime: &Rc<Runtime>,
        compiled: &CompiledTemplate,
        object: ReactiveObject,
        values: Option<&ReactiveObject>,
    ) -> Result<Self, TemplateError> {
        let span = tracing::debug_span!("component_bind", roots = compiled.roots.len());
        let _guard = span.enter();

        check_transforms(runtime, compiled, &object)?;

        let target = runtime.target();
        let mut binder = Binder::new(runtime, &object);
        let root = if compiled.needs_wrapper() {
            let wrapper = target.create_element(WRAPPER_TAG);
            for node in &compiled.roots {
                let child = binder.build(node);
                target.append_child(wrapper, child);
            }
            wrapper
        } else {
            binder.build(&compiled.roots[0])
        };
        if let Some(kind) = object.kind() {
            add_class(target, root, kind.name());
        }
        binder.bind();

        if let Some(values) = values {
            project_values(values, &object);
        }

        object.set_hidden(DOM_NODE, Value::Node(root));
        let weak = Rc::downgrade(runtime);
        object.listen(DESTROY, move |_| {
            if let Some(runtime) = weak.upgrade() {
                runtime.target().clear(root);
            }
        });

        tracing::debug!(root = root.raw(), "component bound");
        Ok(Self {
            runtime: Rc::clone(runtime),
            object,
            root,
        })
    }

    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    #[must_use]
    pub fn object(&self) -> &ReactiveObject {
        &self.object
    }

    #[must_use]
    pub fn runtime(&self) -> &Rc<Runtime> {
        &self.runtime
    }

    /// Destroy the bound object, clearing the rendered tree.
    pub fn destroy(&self) {
        self.object.destroy();
    }
}

impl Emitter for Component {
    fn bus(&self) -> &EventBus {
        self.object.bus()
    }
}

fn add_class(target: &dyn RenderTarget, node: NodeId, class: &str) {
    let current = target.attribute(node, "class").display();
    let classes = if current.is_empty() {
        class.to_owned()
    } else {
        format!("{current} {class}")
    };
    target.set_attribute(node, "class", Value::from(classes));
}

fn project_values(values: &ReactiveObject, object: &ReactiveObject) {
    let keys: Vec<String> = object
        .keys()
        .into_iter()
        .filter(|key| key != "style" && values.has(key))
        .collect();
    values.project(keys, object, None);

    if !object.has("style") {
        return;
    }
    if let (Value::Object(from), Value::Object(into)) = (values.get("style"), object.get("style")) {
        for key in from.keys() {
            into.set(&key, from.get(&key));
        }
    }
}

fn check_transforms(
    runtime: &Runtime,
    compiled: &CompiledTemplate,
    object: &ReactiveObject,
) -> Result<(), TemplateError> {
    for name in compiled.transforms() {
        if object.get(name).as_function().is_some() {
            continue;
        }
        if runtime.config().validate_transforms {
            return Err(TemplateError::UnknownTransform {
                name: name.to_owned(),
            });
        }
        tracing::warn!(transform = name, "transform is not a function yet");
    }
    Ok(())
}

#![forbid(unsafe_code)]

//! Dynamically typed property values.
//!
//! Every trapped property, sequence element and bound attribute holds a
//! [`Value`]. The set of variants is closed: scalars, text, opaque render
//! node handles, and shared handles to the reactive containers themselves.
//!
//! # Equality
//!
//! [`Value::same`] is the strict-equality test used to decide whether a write
//! is a no-op:
//!
//! | Variant | Compared by |
//! |---------|-------------|
//! | `Null`, `Bool`, `Number`, `Text`, `Node` | value (`NaN` never equals itself) |
//! | `Object`, `Sequence`, `Function` | identity (`Rc::ptr_eq`) |

use std::fmt;
use std::rc::Rc;

use crate::object::ReactiveObject;
use crate::sequence::ReactiveSequence;

/// Opaque handle to a node owned by a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Wrap a raw index handed out by a render target.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A shared callable taking one value and returning one value.
///
/// Used for transforms (`%func:key`, projection transformers, sequence
/// mirrors) and for event handlers stored in `on*` attributes.
#[derive(Clone)]
pub struct Function(Rc<dyn Fn(&Value) -> Value>);

impl Function {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Value) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Wrap a closure whose result is irrelevant, such as an event handler.
    pub fn handler(f: impl Fn(&Value) + 'static) -> Self {
        Self(Rc::new(move |value| {
            f(value);
            Value::Null
        }))
    }

    /// Invoke the function.
    pub fn call(&self, arg: &Value) -> Value {
        (self.0)(arg)
    }

    /// Whether both handles point at the same closure.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").finish_non_exhaustive()
    }
}

/// A property value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent or unset.
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    /// A node owned by the render target.
    Node(NodeId),
    Object(ReactiveObject),
    Sequence(ReactiveSequence),
    Function(Function),
}

impl Value {
    /// Strict equality: value comparison for scalars, identity for shared
    /// handles.
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Node(a), Self::Node(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Sequence(a), Self::Sequence(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sequence(&self) -> Option<&ReactiveSequence> {
        match self {
            Self::Sequence(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Loose truthiness: `Null`, `false`, `0`, `NaN` and `""` are falsy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The text a leaf node shows for this value.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.to_string(),
            Self::Node(_) => String::new(),
            Self::Object(_) => "[object]".to_owned(),
            Self::Sequence(seq) => seq
                .to_vec()
                .iter()
                .map(Value::display)
                .collect::<Vec<_>>()
                .join(","),
            Self::Function(_) => "[function]".to_owned(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::Text(s) => write!(f, "Text({s:?})"),
            Self::Node(id) => write!(f, "Node({})", id.raw()),
            Self::Object(o) => o.fmt(f),
            Self::Sequence(s) => s.fmt(f),
            Self::Function(func) => func.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(Rc::from(s))
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<ReactiveObject> for Value {
    fn from(o: ReactiveObject) -> Self {
        Self::Object(o)
    }
}

impl From<ReactiveSequence> for Value {
    fn from(s: ReactiveSequence) -> Self {
        Self::Sequence(s)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Self::Function(f)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

#![forbid(unsafe_code)]

//! Attribute directive grammar.
//!
//! Every attribute of a compiled element is classified once, at compile
//! time, into an [`AttrDirective`]:
//!
//! ```text
//! -ref=%key             Reference
//! -label="text"         Label
//! -group=%key           Group
//! %key                  ShorthandBind   (attribute name is the key)
//! name=%func:key        FuncBind
//! name=%key             PlainBind
//! anything else         Literal
//! ```
//!
//! A marker must span the whole name or value; `class="a %b"` is literal.

/// A classified attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrDirective {
    /// Store the node under `key` on the bound object.
    Reference { key: String },
    /// Insert a label after the node that forwards clicks to it.
    Label { text: String },
    /// Join the virtual group stored under `key`.
    Group { key: String },
    /// Bind property `key` to the attribute of the same name.
    ShorthandBind { key: String },
    /// Bind property `key`, passed through the function property `func`,
    /// to attribute `attr`.
    FuncBind {
        attr: String,
        func: String,
        key: String,
    },
    /// Bind property `key` to attribute `attr`.
    PlainBind { attr: String, key: String },
    /// A static attribute.
    Literal { name: String, value: Option<String> },
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// `%word` → `word`.
fn bare_marker(s: &str) -> Option<&str> {
    s.strip_prefix('%').filter(|word| is_word(word))
}

/// `%func:word` → `(func, word)`.
fn func_marker(s: &str) -> Option<(&str, &str)> {
    let (func, key) = s.strip_prefix('%')?.split_once(':')?;
    (is_word(func) && is_word(key)).then_some((func, key))
}

impl AttrDirective {
    /// Classify an attribute by its name and optional value.
    #[must_use]
    pub fn classify(name: &str, value: Option<&str>) -> Self {
        let marker = value.and_then(bare_marker);
        match (name, marker) {
            ("-ref", Some(key)) => {
                return Self::Reference {
                    key: key.to_owned(),
                };
            }
            ("-group", Some(key)) => {
                return Self::Group {
                    key: key.to_owned(),
                };
            }
            ("-label", _) => {
                return Self::Label {
                    text: value.unwrap_or_default().to_owned(),
                };
            }
            _ => {}
        }

        if let Some(key) = bare_marker(name) {
            return Self::ShorthandBind {
                key: key.to_owned(),
            };
        }
        if let Some((func, key)) = value.and_then(func_marker) {
            return Self::FuncBind {
                attr: name.to_owned(),
                func: func.to_owned(),
                key: key.to_owned(),
            };
        }
        if let Some(key) = marker {
            return Self::PlainBind {
                attr: name.to_owned(),
                key: key.to_owned(),
            };
        }
        Self::Literal {
            name: name.to_owned(),
            value: value.map(str::to_owned),
        }
    }

    /// The transform function this directive needs, if any.
    #[must_use]
    pub fn transform(&self) -> Option<&str> {
        match self {
            Self::FuncBind { func, .. } => Some(func),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_attributes() {
        assert_eq!(
            AttrDirective::classify("-ref", Some("%field")),
            AttrDirective::Reference { key: "field".into() }
        );
        assert_eq!(
            AttrDirective::classify("-group", Some("%choice")),
            AttrDirective::Group { key: "choice".into() }
        );
        assert_eq!(
            AttrDirective::classify("-label", Some("Remember me")),
            AttrDirective::Label { text: "Remember me".into() }
        );
    }

    #[test]
    fn bindings() {
        assert_eq!(
            AttrDirective::classify("%value", None),
            AttrDirective::ShorthandBind { key: "value".into() }
        );
        assert_eq!(
            AttrDirective::classify("title", Some("%upper:name")),
            AttrDirective::FuncBind {
                attr: "title".into(),
                func: "upper".into(),
                key: "name".into()
            }
        );
        assert_eq!(
            AttrDirective::classify("class", Some("%kind")),
            AttrDirective::PlainBind { attr: "class".into(), key: "kind".into() }
        );
    }

    #[test]
    fn partial_markers_are_literal() {
        for value in ["a %b", "%", "%a:", "%:b", "%a-b", "%a:b:c"] {
            assert!(
                matches!(AttrDirective::classify("title", Some(value)), AttrDirective::Literal { .. }),
                "{value}"
            );
        }
        assert_eq!(
            AttrDirective::classify("-ref", Some("field")),
            AttrDirective::Literal { name: "-ref".into(), value: Some("field".into()) }
        );
        assert_eq!(
            AttrDirective::classify("disabled", None),
            AttrDirective::Literal { name: "disabled".into(), value: None }
        );
    }

    #[test]
    fn transform_name() {
        assert_eq!(AttrDirective::classify("x", Some("%f:k")).transform(), Some("f"));
        assert_eq!(AttrDirective::classify("x", Some("%k")).transform(), None);
    }
}

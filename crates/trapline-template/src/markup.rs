#![forbid(unsafe_code)]

//! Structural parser for expanded markup.
//!
//! Turns the output of [`expand`](crate::expand::expand) into a
//! [`CompiledTemplate`]: a tree of static elements, text and placeholders,
//! with every attribute already classified into an [`AttrDirective`].
//!
//! The accepted markup is a small HTML subset: elements, quoted or unquoted
//! attribute values, void elements, `/>` self-closing, comments (dropped)
//! and the five predefined entities. Malformed input is a
//! [`TemplateError::Parse`] carrying the byte offset in the template as
//! written, before trimming and expansion.

use crate::config::TemplateConfig;
use crate::directive::AttrDirective;
use crate::error::TemplateError;
use crate::expand::expand_mapped;

/// Element names that never have children.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// One value, one rendered position.
    Variable,
    /// A sequence rendered as a run of positions.
    List,
}

/// A compiled placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub kind: MarkerKind,
    /// Name of a function property applied before rendering.
    pub func: Option<String>,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompiledNode {
    Element {
        tag: String,
        attributes: Vec<AttrDirective>,
        children: Vec<CompiledNode>,
    },
    Text(String),
    Placeholder(Marker),
}

impl CompiledNode {
    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a CompiledNode)) {
        f(self);
        if let Self::Element { children, .. } = self {
            for child in children {
                child.visit(f);
            }
        }
    }
}

/// The result of compiling a template string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    pub roots: Vec<CompiledNode>,
}

impl CompiledTemplate {
    /// Whether binding needs a wrapper element: several roots, or a
    /// placeholder at the root. Placeholders re-render in place and need a
    /// parent to do it.
    #[must_use]
    pub fn needs_wrapper(&self) -> bool {
        !matches!(self.roots.as_slice(), [CompiledNode::Element { .. }])
    }

    /// Every transform name referenced by a placeholder or attribute, in
    /// document order, without duplicates.
    #[must_use]
    pub fn transforms(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for root in &self.roots {
            root.visit(&mut |node| {
                let found: Vec<&str> = match node {
                    CompiledNode::Placeholder(marker) => marker.func.as_deref().into_iter().collect(),
                    CompiledNode::Element { attributes, .. } => {
                        attributes.iter().filter_map(AttrDirective::transform).collect()
                    }
                    CompiledNode::Text(_) => Vec::new(),
                };
                for name in found {
                    if !names.contains(&name) {
                        names.push(name);
                    }
                }
            });
        }
        names
    }
}

/// Trim (per `config`), expand and parse `template`.
pub fn compile(template: &str, config: &TemplateConfig) -> Result<CompiledTemplate, TemplateError> {
    let (source, lead) = if config.trim {
        let start = template.trim_start();
        (start.trim_end(), template.len() - start.len())
    } else {
        (template, 0)
    };
    let (expanded, map) = expand_mapped(source);
    let roots = Parser::new(&expanded).parse().map_err(|err| match err {
        TemplateError::Parse { offset, message } => TemplateError::Parse {
            offset: lead + map.source_offset(offset),
            message,
        },
        other => other,
    })?;
    if roots.is_empty() {
        return Err(TemplateError::EmptyTemplate);
    }
    tracing::trace!(roots = roots.len(), "template compiled");
    Ok(CompiledTemplate { roots })
}

struct Open {
    tag: String,
    offset: usize,
    attributes: Vec<AttrDirective>,
    raw: Vec<(String, Option<String>)>,
    children: Vec<CompiledNode>,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::parse(self.pos, message)
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn parse(mut self) -> Result<Vec<CompiledNode>, TemplateError> {
        let mut roots = Vec::new();
        let mut stack: Vec<Open> = Vec::new();

        while self.pos < self.src.len() {
            let rest = self.rest();
            let node = if rest.starts_with("<!--") {
                let end = rest
                    .find("-->")
                    .ok_or_else(|| self.error("unterminated comment"))?;
                self.pos += end + 3;
                None
            } else if rest.starts_with("</") {
                let offset = self.pos;
                self.pos += 2;
                let tag = self.take_while(is_name_char).to_ascii_lowercase();
                self.skip_whitespace();
                if !self.rest().starts_with('>') {
                    return Err(self.error("expected '>' after closing tag"));
                }
                self.pos += 1;
                let open = stack.pop().ok_or_else(|| {
                    TemplateError::parse(offset, format!("unexpected closing tag </{tag}>"))
                })?;
                if open.tag != tag {
                    return Err(TemplateError::parse(
                        offset,
                        format!("expected </{}>, found </{tag}>", open.tag),
                    ));
                }
                Some(close(open))
            } else if rest.starts_with('<') {
                let open = self.open_tag()?;
                match open {
                    OpenTag::Complete(node) => Some(node),
                    OpenTag::Open(open) => {
                        stack.push(open);
                        None
                    }
                }
            } else {
                let text = self.take_while(|c| c != '<');
                Some(CompiledNode::Text(decode_entities(text)))
            };

            if let Some(node) = node {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => roots.push(node),
                }
            }
        }

        if let Some(open) = stack.pop() {
            return Err(TemplateError::parse(
                open.offset,
                format!("unclosed element <{}>", open.tag),
            ));
        }
        Ok(roots)
    }

    fn open_tag(&mut self) -> Result<OpenTag, TemplateError> {
        let offset = self.pos;
        self.pos += 1;
        let tag = self.take_while(is_name_char).to_ascii_lowercase();
        if tag.is_empty() {
            return Err(self.error("expected tag name"));
        }

        let mut raw = Vec::new();
        let self_closing = loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(TemplateError::parse(offset, format!("unterminated tag <{tag}")));
            }
            if let Some(after) = rest.strip_prefix("/>") {
                self.pos = self.src.len() - after.len();
                break true;
            }
            if rest.starts_with('>') {
                self.pos += 1;
                break false;
            }
            raw.push(self.attribute()?);
        };

        let attributes = raw
            .iter()
            .map(|(name, value)| AttrDirective::classify(name, value.as_deref()))
            .collect();
        let open = Open {
            tag,
            offset,
            attributes,
            raw,
            children: Vec::new(),
        };
        if self_closing || VOID_ELEMENTS.contains(&open.tag.as_str()) {
            Ok(OpenTag::Complete(close(open)))
        } else {
            Ok(OpenTag::Open(open))
        }
    }

    fn attribute(&mut self) -> Result<(String, Option<String>), TemplateError> {
        let name = self.take_while(|c| !c.is_whitespace() && !matches!(c, '=' | '>' | '/' | '"' | '\''));
        if name.is_empty() {
            return Err(self.error("expected attribute name"));
        }
        self.skip_whitespace();
        if !self.rest().starts_with('=') {
            return Ok((name.to_owned(), None));
        }
        self.pos += 1;
        self.skip_whitespace();

        let rest = self.rest();
        let value = match rest.chars().next() {
            Some(q @ ('"' | '\'')) => {
                let end = rest[1..]
                    .find(q)
                    .ok_or_else(|| self.error("unterminated attribute value"))?;
                self.pos += end + 2;
                &rest[1..=end]
            }
            _ => self.take_while(|c| !c.is_whitespace() && c != '>'),
        };
        Ok((name.to_owned(), Some(decode_entities(value))))
    }
}

enum OpenTag {
    Complete(CompiledNode),
    Open(Open),
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':')
}

/// Finish an element, turning expanded placeholders into markers.
fn close(open: Open) -> CompiledNode {
    if open.tag == "template" {
        let attr = |name: &str| {
            open.raw
                .iter()
                .find(|(n, _)| n == name)
                .and_then(|(_, v)| v.clone())
        };
        let kind = match attr("data-type").as_deref() {
            Some("variable") => Some(MarkerKind::Variable),
            Some("ellipsis") => Some(MarkerKind::List),
            _ => None,
        };
        if let Some(kind) = kind {
            let key = open
                .children
                .iter()
                .map(|child| match child {
                    CompiledNode::Text(text) => text.as_str(),
                    _ => "",
                })
                .collect::<String>();
            return CompiledNode::Placeholder(Marker {
                kind,
                func: attr("data-func").filter(|f| !f.is_empty()),
                key: key.trim().to_owned(),
            });
        }
    }
    CompiledNode::Element {
        tag: open.tag,
        attributes: open.attributes,
        children: open.children,
    }
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(index) = rest.find('&') {
        out.push_str(&rest[..index]);
        rest = &rest[index..];
        let entity = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ]
        .into_iter()
        .find(|(name, _)| rest.starts_with(name));
        match entity {
            Some((name, c)) => {
                out.push(c);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_default(template: &str) -> CompiledTemplate {
        compile(template, &TemplateConfig::default()).expect("template compiles")
    }

    fn element(tag: &str, children: Vec<CompiledNode>) -> CompiledNode {
        CompiledNode::Element {
            tag: tag.into(),
            attributes: Vec::new(),
            children,
        }
    }

    fn variable(func: Option<&str>, key: &str) -> CompiledNode {
        CompiledNode::Placeholder(Marker {
            kind: MarkerKind::Variable,
            func: func.map(str::to_owned),
            key: key.into(),
        })
    }

    #[test]
    fn span_with_variable() {
        let compiled = compile_default("  <span>%name</span>\n");
        assert_eq!(compiled.roots, vec![element("span", vec![variable(None, "name")])]);
        assert!(!compiled.needs_wrapper());
    }

    #[test]
    fn placeholder_roots_need_wrapper() {
        let compiled = compile_default("%f:items...");
        assert_eq!(
            compiled.roots,
            vec![CompiledNode::Placeholder(Marker {
                kind: MarkerKind::List,
                func: Some("f".into()),
                key: "items".into(),
            })]
        );
        assert!(compiled.needs_wrapper());
        assert!(compile_default("<b></b><i></i>").needs_wrapper());
        assert!(compile_default("%name").needs_wrapper());
    }

    #[test]
    fn attributes_are_classified() {
        let compiled = compile_default(r#"<input type="checkbox" %checked -ref=%box disabled>"#);
        let CompiledNode::Element { tag, attributes, children } = &compiled.roots[0] else {
            panic!("expected element");
        };
        assert_eq!(tag, "input");
        assert!(children.is_empty());
        assert_eq!(
            attributes,
            &vec![
                AttrDirective::Literal { name: "type".into(), value: Some("checkbox".into()) },
                AttrDirective::ShorthandBind { key: "checked".into() },
                AttrDirective::Reference { key: "box".into() },
                AttrDirective::Literal { name: "disabled".into(), value: None },
            ]
        );
    }

    #[test]
    fn void_and_self_closing() {
        let compiled = compile_default("<p>a<br>b<x-icon/>c</p>");
        assert_eq!(
            compiled.roots,
            vec![element(
                "p",
                vec![
                    CompiledNode::Text("a".into()),
                    element("br", vec![]),
                    CompiledNode::Text("b".into()),
                    element("x-icon", vec![]),
                    CompiledNode::Text("c".into()),
                ]
            )]
        );
    }

    #[test]
    fn entities_and_comments() {
        let compiled = compile_default("<p title='a &amp; b'><!-- hidden -->1 &lt; 2 &copy;</p>");
        let CompiledNode::Element { attributes, children, .. } = &compiled.roots[0] else {
            panic!("expected element");
        };
        assert_eq!(
            attributes[0],
            AttrDirective::Literal { name: "title".into(), value: Some("a & b".into()) }
        );
        assert_eq!(children, &vec![CompiledNode::Text("1 < 2 &copy;".into())]);
    }

    #[test]
    fn plain_template_element_is_kept() {
        let compiled = compile_default("<template><b>x</b></template>");
        assert!(matches!(&compiled.roots[0], CompiledNode::Element { tag, .. } if tag == "template"));
    }

    #[test]
    fn transforms_are_collected_once() {
        let compiled =
            compile_default(r#"<div title=%up:name>%up:name %fmt:items... <i class=%k></i></div>"#);
        assert_eq!(compiled.transforms(), vec!["up", "fmt"]);
    }

    #[test]
    fn malformed_markup_reports_offsets() {
        let config = TemplateConfig::default();
        assert_eq!(
            compile("<div><span></div>", &config),
            Err(TemplateError::Parse {
                offset: 11,
                message: "expected </span>, found </div>".into()
            })
        );
        assert_eq!(
            compile("<ul>", &config),
            Err(TemplateError::Parse { offset: 0, message: "unclosed element <ul>".into() })
        );
        assert!(matches!(
            compile("</p>", &config),
            Err(TemplateError::Parse { offset: 0, .. })
        ));
        assert!(matches!(
            compile("<a href=\"x>", &config),
            Err(TemplateError::Parse { .. })
        ));
    }

    #[test]
    fn offsets_point_into_the_template_as_written() {
        let config = TemplateConfig::default();
        assert!(matches!(
            compile("%name<p></q>", &config),
            Err(TemplateError::Parse { offset: 8, .. })
        ));
        assert!(matches!(
            compile("<p>%first %last</b>", &config),
            Err(TemplateError::Parse { offset: 15, .. })
        ));
        assert_eq!(
            compile("  \n<ul>", &config),
            Err(TemplateError::Parse { offset: 3, message: "unclosed element <ul>".into() })
        );
    }

    #[test]
    fn empty_template() {
        let config = TemplateConfig::default();
        assert_eq!(compile("   ", &config), Err(TemplateError::EmptyTemplate));
        assert_eq!(compile("<!-- only -->", &config), Err(TemplateError::EmptyTemplate));
    }

    #[test]
    fn trim_can_be_disabled() {
        let config = TemplateConfig::default().with_trim(false);
        let compiled = compile(" <i></i>", &config).expect("compiles");
        assert_eq!(compiled.roots.len(), 2);
    }
}

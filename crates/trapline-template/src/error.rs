#![forbid(unsafe_code)]

/// Errors raised while compiling or binding a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The markup is malformed at byte `offset` of the template.
    Parse { offset: usize, message: String },
    /// A `func:` transform names something that is not a function on the
    /// bound object.
    UnknownTransform { name: String },
    /// The template produced no nodes.
    EmptyTemplate,
}

impl TemplateError {
    pub(crate) fn parse(offset: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { offset, message } => write!(f, "parse error at {offset}: {message}"),
            Self::UnknownTransform { name } => write!(f, "unknown transform '{name}'"),
            Self::EmptyTemplate => write!(f, "template is empty"),
        }
    }
}

impl std::error::Error for TemplateError {}

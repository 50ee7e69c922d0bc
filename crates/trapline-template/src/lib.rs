#![forbid(unsafe_code)]

//! Templates bound to reactive objects.
//!
//! Compilation runs in two phases. [`expand`] rewrites text-content markers
//! (`%key`, `%func:key`, `%key...`) into placeholder elements; [`compile`]
//! parses the result into a [`CompiledTemplate`] with every attribute
//! classified as an [`AttrDirective`]. A [`Component`] then builds the nodes
//! in a [`Runtime`]'s render target and wires them to a
//! [`ReactiveObject`](trapline_reactive::ReactiveObject).
//!
//! ```text
//! <label>%name</label>            text follows object.name
//! <input %value -ref=%field>      two-way value, node stored in object.field
//! <ul>%li:items...</ul>           one <li> per element of object.items
//! ```

mod bind;
pub mod component;
pub mod config;
pub mod directive;
pub mod error;
pub mod expand;
pub mod markup;
pub mod runtime;

pub use bind::{DOM_NODE, to_node};
pub use component::Component;
pub use config::{ConfigError, TemplateConfig, TemplateConfigParse};
pub use directive::AttrDirective;
pub use error::TemplateError;
pub use expand::{SourceMap, expand, expand_mapped};
pub use markup::{CompiledNode, CompiledTemplate, Marker, MarkerKind, compile};
pub use runtime::{IdGenerator, Runtime, Scheduler};

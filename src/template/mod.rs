//! Template module - turns server-supplied markup into mounted render units
//!
//! - [`syntax`]: lexer and parser for the template grammar
//! - [`Template`] / [`RenderUnit`]: compiled templates and their page-bound instances
//! - [`MountPoint`]: the single slot a unit is displayed in
//! - [`TemplateLoader`]: follows the content store and keeps the mount point current

mod loader;
mod mount;
pub mod syntax;
mod unit;

use thiserror::Error;

use crate::fetch::FetchError;

pub use loader::TemplateLoader;
pub use mount::{MountPoint, MountTicket, MountedView};
pub use unit::{RenderUnit, Template};

/// Template loading and compilation errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Unknown component `{name}` at line {line}")]
    UnknownComponent { name: String, line: usize },

    #[error("Unclosed `{tag}` block opened at line {line}")]
    Unclosed { tag: String, line: usize },

    #[error("Invalid template reference {reference}: {message}")]
    Reference { reference: String, message: String },

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

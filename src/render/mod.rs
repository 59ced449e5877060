//! Content tree renderer
//!
//! Renders a schema-open content document into markup. The renderer knows
//! only the shape it needs (`content.heading`, `sections`, `paragraphs`);
//! everything else in a section is left to [`Delegate`]s, which receive the
//! section exactly as the server sent it.
//!
//! A document without sections renders to nothing at all, not an empty
//! wrapper. Sections may nest to any depth.

mod delegates;
pub mod html;

use serde_json::{Map, Value};

pub use delegates::{ImageDelegate, LinkDelegate, MarkupDelegate};

/// Renders one kind of richer section content
pub trait Delegate: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Whether this delegate has something to render for `section`
    fn accepts(&self, section: &Map<String, Value>) -> bool;

    /// Append markup for `section`
    ///
    /// `tree` is the calling renderer, for delegates whose content nests
    /// further documents.
    fn render(&self, section: &Map<String, Value>, tree: &ContentTree, out: &mut String);
}

/// Recursive renderer for content documents
#[derive(Default)]
pub struct ContentTree {
    delegates: Vec<Box<dyn Delegate>>,
}

impl ContentTree {
    /// A renderer with no delegates
    pub fn new() -> Self {
        Self::default()
    }

    /// A renderer with the built-in delegates
    pub fn with_builtin_delegates() -> Self {
        Self::new()
            .with_delegate(Box::new(ImageDelegate))
            .with_delegate(Box::new(LinkDelegate))
            .with_delegate(Box::new(MarkupDelegate))
    }

    /// Add a delegate; delegates run in the order they were added
    pub fn with_delegate(mut self, delegate: Box<dyn Delegate>) -> Self {
        tracing::debug!("Registered content delegate {}", delegate.name());
        self.delegates.push(delegate);
        self
    }

    /// Render a content node
    pub fn render(&self, node: &Value) -> String {
        let mut out = String::new();
        self.render_into(node, &mut out);
        out
    }

    /// Append the markup for a content node to `out`
    pub fn render_into(&self, node: &Value, out: &mut String) {
        let Some(sections) = sections(node) else {
            return;
        };

        out.push_str("<article>");
        if let Some(heading) = node
            .get("content")
            .and_then(|c| c.get("heading"))
            .and_then(Value::as_str)
        {
            out.push_str("<h1>");
            out.push_str(&html::escape(heading));
            out.push_str("</h1>");
        }
        for section in sections {
            self.render_section(section, out);
        }
        out.push_str("</article>");
    }

    fn render_section(&self, section: &Value, out: &mut String) {
        out.push_str("<section>");
        if let Value::Object(fields) = section {
            if let Some(Value::Array(paragraphs)) = fields.get("paragraphs") {
                for paragraph in paragraphs.iter().filter_map(Value::as_str) {
                    out.push_str("<p>");
                    out.push_str(&html::escape(paragraph));
                    out.push_str("</p>");
                }
            }

            for delegate in &self.delegates {
                if delegate.accepts(fields) {
                    delegate.render(fields, self, out);
                }
            }

            if let Some(nested) = sections(section) {
                for child in nested {
                    self.render_section(child, out);
                }
            }
        }
        out.push_str("</section>");
    }
}

/// Non-empty `sections` array of a node
fn sections(node: &Value) -> Option<&Vec<Value>> {
    match node.get("sections") {
        Some(Value::Array(sections)) if !sections.is_empty() => Some(sections),
        _ => None,
    }
}

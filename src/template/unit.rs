//! Compiled templates and render units

use serde_json::Value;
use std::sync::Arc;

use super::syntax::{self, Component, Expr, Node, ROOT};
use super::TemplateError;
use crate::render::{html, ContentTree};

/// A compiled template
///
/// Every call to [`Template::compile`] builds an independent node tree; two
/// templates never share state.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Arc<Vec<Node>>,
}

impl Template {
    /// Compile template markup
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        Ok(Self {
            nodes: Arc::new(syntax::parse(source)?),
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Render against page data
    ///
    /// Rendering cannot fail: missing values render as nothing.
    pub fn render(&self, page: &Value, tree: &ContentTree) -> String {
        let mut evaluator = Evaluator {
            page,
            locals: Vec::new(),
            tree,
        };
        let mut output = String::new();
        evaluator.render_nodes(&self.nodes, &mut output);
        output
    }
}

/// A compiled template bound to page data, ready to be mounted
#[derive(Debug)]
pub struct RenderUnit {
    id: u64,
    reference: String,
    template: Template,
    page: Value,
}

impl RenderUnit {
    pub fn new(id: u64, reference: impl Into<String>, template: Template) -> Self {
        Self {
            id,
            reference: reference.into(),
            template,
            page: Value::Null,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Reference of the template this unit was compiled from
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The page data slot
    pub fn page(&self) -> &Value {
        &self.page
    }

    pub fn set_page(&mut self, page: Value) {
        self.page = page;
    }

    pub fn render(&self, tree: &ContentTree) -> String {
        self.template.render(&self.page, tree)
    }

    /// Release the unit
    pub fn dispose(self) {
        tracing::debug!("Disposing render unit #{} ({})", self.id, self.reference);
    }
}

// ============================================================================
// Evaluator - nodes to output
// ============================================================================

struct Evaluator<'a> {
    page: &'a Value,
    locals: Vec<(String, Value)>,
    tree: &'a ContentTree,
}

impl Evaluator<'_> {
    fn render_nodes(&mut self, nodes: &[Node], output: &mut String) {
        for node in nodes {
            self.render_node(node, output);
        }
    }

    fn render_node(&mut self, node: &Node, output: &mut String) {
        match node {
            Node::Text(text) => output.push_str(text),
            Node::Output(expr) => {
                let value = self.evaluate(expr);
                output.push_str(&html::escape(&to_output_string(&value)));
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let taken = branches
                    .iter()
                    .find(|(condition, _)| is_truthy(&self.evaluate(condition)));
                match taken {
                    Some((_, body)) => self.render_nodes(body, output),
                    None => {
                        if let Some(body) = otherwise {
                            self.render_nodes(body, output);
                        }
                    }
                }
            }
            Node::For {
                item,
                index,
                iterable,
                body,
            } => {
                if let Value::Array(items) = self.evaluate(iterable) {
                    for (i, value) in items.into_iter().enumerate() {
                        let depth = self.locals.len();
                        self.locals.push((item.clone(), value));
                        if let Some(index) = index {
                            self.locals.push((index.clone(), Value::from(i)));
                        }
                        self.render_nodes(body, output);
                        self.locals.truncate(depth);
                    }
                }
            }
            Node::Render { component, arg } => {
                let value = self.evaluate(arg);
                match component {
                    Component::Article => output.push_str(&self.tree.render(&value)),
                }
            }
        }
    }

    fn evaluate(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Var(name) => self.resolve(name),
            Expr::Member(base, name) => member(&self.evaluate(base), name),
            Expr::Index(base, key) => index(&self.evaluate(base), &self.evaluate(key)),
            Expr::Not(inner) => Value::Bool(!is_truthy(&self.evaluate(inner))),
            Expr::Eq(a, b) => Value::Bool(equals(&self.evaluate(a), &self.evaluate(b))),
            Expr::Ne(a, b) => Value::Bool(!equals(&self.evaluate(a), &self.evaluate(b))),
            Expr::And(a, b) => {
                let left = self.evaluate(a);
                if is_truthy(&left) {
                    self.evaluate(b)
                } else {
                    left
                }
            }
            Expr::Or(a, b) => {
                let left = self.evaluate(a);
                if is_truthy(&left) {
                    left
                } else {
                    self.evaluate(b)
                }
            }
        }
    }

    fn resolve(&self, name: &str) -> Value {
        if let Some((_, value)) = self.locals.iter().rev().find(|(n, _)| n == name) {
            return value.clone();
        }
        if name == ROOT {
            return self.page.clone();
        }
        Value::Null
    }
}

fn member(value: &Value, name: &str) -> Value {
    if let Some(found) = value.as_object().and_then(|map| map.get(name)) {
        return found.clone();
    }
    match (value, name) {
        (Value::Array(items), "length") => Value::from(items.len()),
        (Value::String(s), "length") => Value::from(s.chars().count()),
        (Value::Object(map), "length") => Value::from(map.len()),
        _ => Value::Null,
    }
}

fn index(value: &Value, key: &Value) -> Value {
    match (value, key) {
        (Value::Array(items), Value::Number(n)) => n
            .as_u64()
            .and_then(|i| items.get(i as usize))
            .cloned()
            .unwrap_or(Value::Null),
        (Value::Object(map), Value::Number(n)) => {
            map.get(&n.to_string()).cloned().unwrap_or(Value::Null)
        }
        (_, Value::String(name)) => member(value, name),
        _ => Value::Null,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => a == b,
    }
}

/// Convert a value to interpolated text
fn to_output_string(value: &Value) -> String {
    match value {
        Value::Null | Value::Object(_) => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(to_output_string)
            .collect::<Vec<_>>()
            .join(","),
    }
}

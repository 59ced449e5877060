//! Template syntax
//!
//! Templates are markup with a small, closed set of constructs:
//!
//! - `{{ expr }}` interpolates a value, HTML-escaped
//! - `{# ... #}` is a comment
//! - `{% if expr %} ... {% else if expr %} ... {% else %} ... {% end %}`
//! - `{% for item in expr %} ... {% end %}`, optionally `{% for item, i in expr %}`
//! - `{% render article expr %}` hands a value to a built-in component
//!
//! Expressions are paths rooted at `page` or a loop variable, with `.name`,
//! `[index]` and `["key"]` access, literals, `!`, `==`, `!=`, `&&`, `||` and
//! parentheses. Everything else is rejected when the template is compiled.

use serde_json::Value;

use super::TemplateError;

// ============================================================================
// Lexer - markup to tokens
// ============================================================================

/// Token types produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw markup
    Text(String),
    /// `{{ ... }}`
    Output { source: String, line: usize },
    /// `{% ... %}`
    Tag { source: String, line: usize },
}

/// Lexer for template markup - character based so multi-byte text is safe
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            line: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, TemplateError> {
        let mut tokens = Vec::new();

        while self.pos < self.chars.len() {
            if self.starts_with("{{") {
                let (source, line) = self.read_delimited("{{", "}}")?;
                tokens.push(Token::Output { source, line });
            } else if self.starts_with("{%") {
                let (source, line) = self.read_delimited("{%", "%}")?;
                tokens.push(Token::Tag { source, line });
            } else if self.starts_with("{#") {
                self.read_delimited("{#", "#}")?;
            } else {
                let text = self.read_text();
                if !text.is_empty() {
                    tokens.push(Token::Text(text));
                }
            }
        }

        Ok(tokens)
    }

    fn starts_with(&self, s: &str) -> bool {
        let mut i = self.pos;
        for c in s.chars() {
            if self.chars.get(i) != Some(&c) {
                return false;
            }
            i += 1;
        }
        true
    }

    fn at_delimiter(&self) -> bool {
        self.starts_with("{{") || self.starts_with("{%") || self.starts_with("{#")
    }

    fn read_text(&mut self) -> String {
        let mut result = String::new();
        while self.pos < self.chars.len() && !self.at_delimiter() {
            let c = self.chars[self.pos];
            if c == '\n' {
                self.line += 1;
            }
            result.push(c);
            self.pos += 1;
        }
        result
    }

    fn read_delimited(&mut self, open: &str, close: &str) -> Result<(String, usize), TemplateError> {
        let start_line = self.line;
        self.pos += open.chars().count();
        let content_start = self.pos;

        while self.pos < self.chars.len() {
            if self.starts_with(close) {
                let content: String = self.chars[content_start..self.pos].iter().collect();
                self.pos += close.chars().count();
                return Ok((content.trim().to_string(), start_line));
            }
            if self.chars[self.pos] == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }

        Err(TemplateError::Parse {
            line: start_line,
            message: format!("Unclosed {} ... {}", open, close),
        })
    }
}

// ============================================================================
// AST
// ============================================================================

/// Compiled expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    /// Template root (`page`) or a loop variable
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Built-in components a template may render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    /// Content tree renderer
    Article,
}

impl Component {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "article" => Some(Component::Article),
            _ => None,
        }
    }
}

/// Compiled template node
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Output(Expr),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    For {
        item: String,
        index: Option<String>,
        iterable: Expr,
        body: Vec<Node>,
    },
    Render {
        component: Component,
        arg: Expr,
    },
}

// ============================================================================
// Parser - tokens to nodes
// ============================================================================

/// Name every template can refer to
pub const ROOT: &str = "page";

/// Deepest nesting of blocks and sub-expressions a template may use
pub const MAX_DEPTH: usize = 128;

/// How a nested block ended
enum BlockEnd {
    Eof,
    End,
    Else,
    ElseIf(Expr),
}

/// Parser that converts tokens into nodes, resolving names as it goes
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    scope: Vec<String>,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            scope: vec![ROOT.to_string()],
            depth: 0,
        }
    }

    /// Parse all tokens into nodes
    pub fn parse(&mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, end, line) = self.parse_block(1)?;
        match end {
            BlockEnd::Eof => Ok(nodes),
            BlockEnd::End => Err(parse_error(line, "`end` without an open block")),
            BlockEnd::Else | BlockEnd::ElseIf(_) => {
                Err(parse_error(line, "`else` outside of an `if` block"))
            }
        }
    }

    /// Parse nodes until a block keyword or the end of input
    ///
    /// `line` is where the enclosing block opened.
    fn parse_block(&mut self, line: usize) -> Result<(Vec<Node>, BlockEnd, usize), TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(parse_error(
                line,
                &format!("blocks nested deeper than {} levels", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        let result = self.parse_nodes();
        self.depth -= 1;
        result
    }

    fn parse_nodes(&mut self) -> Result<(Vec<Node>, BlockEnd, usize), TemplateError> {
        let mut nodes = Vec::new();

        while self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;

            match token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::Output { source, line } => {
                    nodes.push(Node::Output(self.parse_expr(&source, line)?));
                }
                Token::Tag { source, line } => {
                    let (keyword, rest) = split_keyword(&source);
                    match keyword {
                        "if" => nodes.push(self.parse_if(rest, line)?),
                        "for" => nodes.push(self.parse_for(rest, line)?),
                        "render" => nodes.push(self.parse_render(rest, line)?),
                        "end" if rest.is_empty() => return Ok((nodes, BlockEnd::End, line)),
                        "else" => {
                            let (next, cond) = split_keyword(rest);
                            return match next {
                                "" => Ok((nodes, BlockEnd::Else, line)),
                                "if" => {
                                    let cond = self.parse_expr(cond, line)?;
                                    Ok((nodes, BlockEnd::ElseIf(cond), line))
                                }
                                _ => Err(parse_error(line, "expected `else` or `else if`")),
                            };
                        }
                        _ => {
                            return Err(parse_error(
                                line,
                                &format!("unknown tag `{}`", source),
                            ))
                        }
                    }
                }
            }
        }

        let line = self.last_line();
        Ok((nodes, BlockEnd::Eof, line))
    }

    fn parse_if(&mut self, condition: &str, line: usize) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut condition = self.parse_expr(condition, line)?;

        loop {
            let (body, end, _) = self.parse_block(line)?;
            match end {
                BlockEnd::End => {
                    branches.push((condition, body));
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                BlockEnd::ElseIf(next) => {
                    branches.push((condition, body));
                    condition = next;
                }
                BlockEnd::Else => {
                    branches.push((condition, body));
                    let (otherwise, end, else_line) = self.parse_block(line)?;
                    return match end {
                        BlockEnd::End => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        BlockEnd::Eof => Err(unclosed("if", line)),
                        _ => Err(parse_error(else_line, "`else` after `else`")),
                    };
                }
                BlockEnd::Eof => return Err(unclosed("if", line)),
            }
        }
    }

    fn parse_for(&mut self, header: &str, line: usize) -> Result<Node, TemplateError> {
        let (vars, iterable) = header
            .split_once(" in ")
            .ok_or_else(|| parse_error(line, "expected `for item in expr`"))?;

        let mut names = vars.split(',').map(str::trim);
        let item = names.next().unwrap_or_default().to_string();
        let index = names.next().map(str::to_string);
        if names.next().is_some() {
            return Err(parse_error(line, "`for` takes at most two variables"));
        }
        for name in std::iter::once(&item).chain(index.iter()) {
            if !is_identifier(name) || name == ROOT {
                return Err(parse_error(line, &format!("invalid loop variable `{}`", name)));
            }
        }

        let iterable = self.parse_expr(iterable, line)?;

        let depth = self.scope.len();
        self.scope.push(item.clone());
        self.scope.extend(index.clone());
        let result = self.parse_block(line);
        self.scope.truncate(depth);

        let (body, end, _) = result?;
        match end {
            BlockEnd::End => Ok(Node::For {
                item,
                index,
                iterable,
                body,
            }),
            BlockEnd::Eof => Err(unclosed("for", line)),
            _ => Err(parse_error(line, "`else` inside `for`")),
        }
    }

    fn parse_render(&mut self, rest: &str, line: usize) -> Result<Node, TemplateError> {
        let (name, arg) = split_keyword(rest);
        let component = Component::from_name(name).ok_or_else(|| TemplateError::UnknownComponent {
            name: name.to_string(),
            line,
        })?;
        if arg.is_empty() {
            return Err(parse_error(line, &format!("`render {}` needs a value", name)));
        }
        Ok(Node::Render {
            component,
            arg: self.parse_expr(arg, line)?,
        })
    }

    fn parse_expr(&self, source: &str, line: usize) -> Result<Expr, TemplateError> {
        ExprParser::new(source, line, &self.scope, self.depth).parse()
    }

    fn last_line(&self) -> usize {
        self.tokens
            .iter()
            .rev()
            .find_map(|t| match t {
                Token::Output { line, .. } | Token::Tag { line, .. } => Some(*line),
                Token::Text(_) => None,
            })
            .unwrap_or(1)
    }
}

// ============================================================================
// Expression parser
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum ExprToken {
    Ident(String),
    Str(String),
    Num(f64),
    Dot,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Not,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
}

/// Recursive-descent parser for a single expression
struct ExprParser<'a> {
    tokens: Vec<ExprToken>,
    pos: usize,
    /// Nesting so far, counting the blocks the expression sits in
    depth: usize,
    line: usize,
    source: &'a str,
    scope: &'a [String],
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str, line: usize, scope: &'a [String], depth: usize) -> Self {
        Self {
            tokens: Vec::new(),
            pos: 0,
            depth,
            line,
            source,
            scope,
        }
    }

    fn parse(mut self) -> Result<Expr, TemplateError> {
        self.tokens = tokenize_expr(self.source).map_err(|m| parse_error(self.line, &m))?;
        if self.tokens.is_empty() {
            return Err(self.error("empty expression"));
        }
        let expr = self.parse_or()?;
        if self.pos < self.tokens.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn parse_or(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_and()?;
        while self.eat(&ExprToken::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, TemplateError> {
        let mut left = self.parse_equality()?;
        while self.eat(&ExprToken::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, TemplateError> {
        let left = self.parse_unary()?;
        if self.eat(&ExprToken::EqEq) {
            let right = self.parse_unary()?;
            return Ok(Expr::Eq(Box::new(left), Box::new(right)));
        }
        if self.eat(&ExprToken::NotEq) {
            let right = self.parse_unary()?;
            return Ok(Expr::Ne(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, TemplateError> {
        if self.eat(&ExprToken::Not) {
            return Ok(Expr::Not(Box::new(self.nested(Self::parse_unary)?)));
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, TemplateError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&ExprToken::Dot) {
                match self.next() {
                    Some(ExprToken::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                    _ => return Err(self.error("expected a name after `.`")),
                }
            } else if self.eat(&ExprToken::LBracket) {
                let index = self.nested(Self::parse_or)?;
                if !self.eat(&ExprToken::RBracket) {
                    return Err(self.error("expected `]`"));
                }
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, TemplateError> {
        match self.next() {
            Some(ExprToken::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(ExprToken::Num(n)) => Ok(Expr::Literal(number(n))),
            Some(ExprToken::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                if !self.eat(&ExprToken::RParen) {
                    return Err(self.error("expected `)`"));
                }
                Ok(inner)
            }
            Some(ExprToken::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                "null" => Ok(Expr::Literal(Value::Null)),
                _ if self.scope.contains(&name) => Ok(Expr::Var(name.clone())),
                _ => Err(self.error(&format!("unknown name `{}`", name))),
            },
            Some(other) => Err(self.error(&format!("unexpected {:?}", other))),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn next(&mut self) -> Option<ExprToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &ExprToken) -> bool {
        if self.tokens.get(self.pos) == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Run `parse` one nesting level deeper
    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Expr, TemplateError>,
    ) -> Result<Expr, TemplateError> {
        if self.depth >= MAX_DEPTH {
            return Err(parse_error(
                self.line,
                &format!("expression nested deeper than {} levels", MAX_DEPTH),
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn error(&self, message: &str) -> TemplateError {
        parse_error(self.line, &format!("{} in `{}`", message, self.source))
    }
}

fn tokenize_expr(source: &str) -> Result<Vec<ExprToken>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(ExprToken::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(ExprToken::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(ExprToken::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(ExprToken::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(ExprToken::RParen);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(ExprToken::NotEq);
                i += 2;
            }
            '!' => {
                tokens.push(ExprToken::Not);
                i += 1;
            }
            '=' if next == Some('=') => {
                tokens.push(ExprToken::EqEq);
                i += 2;
            }
            '&' if next == Some('&') => {
                tokens.push(ExprToken::AndAnd);
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push(ExprToken::OrOr);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string".to_string()),
                        Some('\\') => {
                            match chars.get(i + 1) {
                                Some(escaped) => s.push(*escaped),
                                None => return Err("unterminated string".to_string()),
                            }
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            s.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(ExprToken::Str(s));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // `items.0.name` style access is not numeric
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number `{}`", text))?;
                tokens.push(ExprToken::Num(n));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(ExprToken::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character `{}`", other)),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Helpers
// ============================================================================

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn split_keyword(source: &str) -> (&str, &str) {
    let source = source.trim();
    match source.find(char::is_whitespace) {
        Some(pos) => (&source[..pos], source[pos..].trim()),
        None => (source, ""),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(name, "true" | "false" | "null")
}

fn parse_error(line: usize, message: &str) -> TemplateError {
    TemplateError::Parse {
        line,
        message: message.to_string(),
    }
}

fn unclosed(tag: &str, line: usize) -> TemplateError {
    TemplateError::Unclosed {
        tag: tag.to_string(),
        line,
    }
}

/// Lex and parse template markup
pub fn parse(source: &str) -> Result<Vec<Node>, TemplateError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse()
}

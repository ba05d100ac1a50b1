//! Path expressions: a small XPath subset.
//!
//! Grammar:
//! - `path := '.' | '/' | ['/'] step ('/' step)*`
//! - `step := ('.' | '*' | qname) predicate*`
//! - `predicate := '[@' qname '=' literal ']' | '[' position ']'`
//!
//! Literals use single or double quotes; a doubled quote inside a literal
//! stands for one quote character. Positions are 1-based.

use super::{XmlError, XmlResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

static QNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\p{L}_][\p{L}\p{N}_.\-]*(:[\p{L}_][\p{L}\p{N}_.\-]*)?$")
        .expect("valid qname regex")
});

/// What a step matches among the children of the context node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTest {
    /// `.`: the context node itself.
    Context,
    /// `*`: any child element.
    Any,
    /// Child elements with this qualified name.
    Name(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    AttributeEquals { name: String, value: String },
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    test: NodeTest,
    predicates: Vec<Predicate>,
}

impl Step {
    pub fn test(&self) -> &NodeTest {
        &self.test
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Attribute equality predicates, in declaration order.
    pub fn attribute_predicates(&self) -> impl Iterator<Item = (&str, &str)> {
        self.predicates.iter().filter_map(|predicate| match predicate {
            Predicate::AttributeEquals { name, value } => Some((name.as_str(), value.as_str())),
            Predicate::Position(_) => None,
        })
    }
}

/// Parsed path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPath {
    source: String,
    absolute: bool,
    steps: Vec<Step>,
}

impl XmlPath {
    /// Parses a path expression.
    ///
    /// # Errors
    /// - `InvalidPath` for empty input, empty steps, trailing `/`, bad names,
    ///   unterminated literals, unbalanced brackets and zero positions.
    pub fn parse(input: &str) -> XmlResult<Self> {
        let source = input.trim();
        if source.is_empty() {
            return Err(invalid(input, "path is empty"));
        }

        let (absolute, body) = match source.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, source),
        };
        if absolute && body.is_empty() {
            return Ok(Self {
                source: source.to_string(),
                absolute,
                steps: Vec::new(),
            });
        }

        let mut cursor = Cursor {
            source,
            chars: body.chars().collect(),
            pos: 0,
        };
        let steps = cursor.parse_steps()?;

        Ok(Self {
            source: source.to_string(),
            absolute,
            steps,
        })
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the step when the path is exactly one relative, named step
    /// without positional predicates; the shape a creatable element needs.
    pub fn creatable_step(&self) -> Option<(&str, &Step)> {
        match self.steps.as_slice() {
            [step] if !self.absolute => match &step.test {
                NodeTest::Name(name)
                    if step
                        .predicates
                        .iter()
                        .all(|predicate| matches!(predicate, Predicate::AttributeEquals { .. })) =>
                {
                    Some((name.as_str(), step))
                }
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromStr for XmlPath {
    type Err = XmlError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for XmlPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// Quotes `value` as a path literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

struct Cursor<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl Cursor<'_> {
    fn parse_steps(&mut self) -> XmlResult<Vec<Step>> {
        let mut steps = Vec::new();
        loop {
            steps.push(self.parse_step()?);
            match self.peek() {
                None => break,
                Some('/') => {
                    self.pos += 1;
                    if self.peek().is_none() {
                        return Err(self.error("path ends with `/`"));
                    }
                }
                Some(other) => return Err(self.error(&format!("unexpected `{other}`"))),
            }
        }
        Ok(steps)
    }

    fn parse_step(&mut self) -> XmlResult<Step> {
        let test = if self.eat('.') {
            NodeTest::Context
        } else if self.eat('*') {
            NodeTest::Any
        } else {
            NodeTest::Name(self.parse_name("step")?)
        };

        let mut predicates = Vec::new();
        while self.eat('[') {
            let predicate = if self.eat('@') {
                let name = self.parse_name("attribute")?;
                if !self.eat('=') {
                    return Err(self.error("expected `=` after attribute name"));
                }
                let value = self.parse_literal()?;
                Predicate::AttributeEquals { name, value }
            } else {
                let digits = self.take_while(|c| c.is_ascii_digit());
                let position = digits
                    .parse::<usize>()
                    .map_err(|_| self.error("expected `@name='value'` or a position"))?;
                if position == 0 {
                    return Err(self.error("positions start at 1"));
                }
                Predicate::Position(position)
            };
            if !self.eat(']') {
                return Err(self.error("expected `]`"));
            }
            predicates.push(predicate);
        }

        Ok(Step { test, predicates })
    }

    fn parse_name(&mut self, what: &str) -> XmlResult<String> {
        let name = self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
        if name.is_empty() {
            return Err(self.error(&format!("empty {what} name")));
        }
        if !QNAME_RE.is_match(&name) {
            return Err(self.error(&format!("`{name}` is not a valid {what} name")));
        }
        Ok(name)
    }

    fn parse_literal(&mut self) -> XmlResult<String> {
        let quote = match self.peek() {
            Some(c @ ('\'' | '"')) => c,
            _ => return Err(self.error("expected a quoted literal")),
        };
        self.pos += 1;

        let mut value = String::new();
        loop {
            match self.next() {
                None => return Err(self.error("unterminated literal")),
                Some(c) if c == quote => {
                    if self.eat(quote) {
                        value.push(quote);
                    } else {
                        return Ok(value);
                    }
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&accept) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &str) -> XmlError {
        invalid(self.source, &format!("{reason} (at {})", self.pos))
    }
}

fn invalid(path: &str, reason: &str) -> XmlError {
    XmlError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

//! Recursive-descent parser for the annotation tag grammar.
//!
//! ```text
//! @Get(path="/projects", tags={"Projects"}, @Response(response=200, description="OK"))
//! ```
//!
//! A block may hold several top-level tags. Each one is parsed in isolation: a
//! malformed tag is reported and skipped, and parsing resumes at the next
//! top-level tag whose indentation is not deeper than the broken one.

use crate::annotation::{is_known_tag, AnnotationNode, AttrValue, NESTED_ONLY_TAGS};
use crate::error::Position;
use log::debug;
use std::collections::BTreeMap;

/// Parses raw annotation text into [`AnnotationNode`] trees.
///
/// Bare identifiers are substituted from the constant table while parsing;
/// identifiers missing from the table are kept as [`AttrValue::Constant`].
pub struct AnnotationParser<'a> {
    constants: &'a BTreeMap<String, serde_json::Value>,
}

/// Everything parsed out of one block.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub nodes: Vec<AnnotationNode>,
    pub errors: Vec<ParseError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl<'a> AnnotationParser<'a> {
    pub fn new(constants: &'a BTreeMap<String, serde_json::Value>) -> Self {
        Self { constants }
    }

    /// Parses a block whose first text line is source line `first_line`.
    pub fn parse(&self, text: &str, first_line: usize) -> ParseOutcome {
        let mut cursor = Cursor::new(text, first_line, self.constants);
        let candidates = cursor.tag_line_starts();
        let mut outcome = ParseOutcome::default();
        let mut resume = 0;

        for &(start, indent) in &candidates {
            if start < resume {
                continue;
            }
            cursor.pos = start;
            match cursor.top_level_tag() {
                Ok(Some(node)) => {
                    outcome.nodes.push(node);
                    resume = cursor.pos;
                }
                Ok(None) => resume = cursor.pos,
                Err(err) => {
                    debug!("Parse error at {:?}: {}", err.position, err.message);
                    outcome.errors.push(err);
                    let failed_line = cursor.line_index(start);
                    let tag_end = cursor.tag_extent(start);
                    resume = candidates
                        .iter()
                        .find(|&&(idx, ind)| match tag_end {
                            Some(end) => idx >= end,
                            None => idx > start && cursor.line_index(idx) > failed_line && ind <= indent,
                        })
                        .map(|&(idx, _)| idx)
                        .unwrap_or(cursor.chars.len());
                }
            }
        }

        outcome
    }
}

struct Cursor<'a> {
    chars: Vec<char>,
    pos: usize,
    line_starts: Vec<usize>,
    first_line: usize,
    constants: &'a BTreeMap<String, serde_json::Value>,
}

type ParseResult<T> = Result<T, ParseError>;

impl<'a> Cursor<'a> {
    fn new(text: &str, first_line: usize, constants: &'a BTreeMap<String, serde_json::Value>) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let mut line_starts = vec![0];
        for (idx, c) in chars.iter().enumerate() {
            if *c == '\n' {
                line_starts.push(idx + 1);
            }
        }
        Self {
            chars,
            pos: 0,
            line_starts,
            first_line,
            constants,
        }
    }

    /// Offsets and indentation of every line that starts with `@`.
    fn tag_line_starts(&self) -> Vec<(usize, usize)> {
        let mut starts = Vec::new();
        for &line_start in &self.line_starts {
            let mut idx = line_start;
            while matches!(self.chars.get(idx), Some(' ') | Some('\t')) {
                idx += 1;
            }
            if self.chars.get(idx) == Some(&'@') {
                starts.push((idx, idx - line_start));
            }
        }
        starts
    }

    /// End offset of the tag starting at `start`, found by balancing its
    /// parentheses outside string literals. `None` when they never balance.
    fn tag_extent(&self, start: usize) -> Option<usize> {
        let mut idx = start + 1;
        while self
            .chars
            .get(idx)
            .is_some_and(|&c| c.is_alphanumeric() || c == '_' || c == '\\')
        {
            idx += 1;
        }
        if self.chars.get(idx) != Some(&'(') {
            return Some(idx);
        }

        let mut depth = 0usize;
        let mut in_string = false;
        while let Some(&c) = self.chars.get(idx) {
            if in_string {
                match c {
                    '\\' => idx += 1,
                    '"' => in_string = false,
                    _ => {}
                }
            } else {
                match c {
                    '"' => in_string = true,
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some(idx + 1);
                        }
                    }
                    _ => {}
                }
            }
            idx += 1;
        }
        None
    }

    fn line_index(&self, idx: usize) -> usize {
        self.line_starts.partition_point(|&s| s <= idx) - 1
    }

    fn position(&self, idx: usize) -> Position {
        let line = self.line_index(idx);
        Position::new(self.first_line + line, idx - self.line_starts[line] + 1)
    }

    fn error_at(&self, idx: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.position(idx),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.pos, message)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Consumes `@Name` and returns the name without its namespace.
    fn tag_name(&mut self) -> String {
        self.bump();
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '\\')
        {
            self.bump();
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        raw.rsplit('\\').next().unwrap_or_default().to_string()
    }

    fn top_level_tag(&mut self) -> ParseResult<Option<AnnotationNode>> {
        let start = self.pos;
        let name = self.tag_name();
        if name.is_empty() {
            return Ok(None);
        }
        let nested_only = NESTED_ONLY_TAGS.contains(&name.as_str());

        if self.peek() != Some('(') {
            // Prose tags such as `@param` or `@return` are not annotations
            if !is_known_tag(&name) {
                return Ok(None);
            }
            if nested_only {
                return Err(self.error_at(start, format!("tag @{} cannot appear at top level", name)));
            }
            return Ok(Some(AnnotationNode::new(name, self.position(start))));
        }

        if !is_known_tag(&name) {
            return Err(self.error_at(start, format!("unknown tag @{}", name)));
        }
        if nested_only {
            return Err(self.error_at(start, format!("tag @{} cannot appear at top level", name)));
        }
        self.tag_body(name, start).map(Some)
    }

    fn tag(&mut self) -> ParseResult<AnnotationNode> {
        let start = self.pos;
        let name = self.tag_name();
        if name.is_empty() {
            return Err(self.error_at(start, "expected a tag name after '@'"));
        }
        if self.peek() == Some('(') {
            self.tag_body(name, start)
        } else {
            Ok(AnnotationNode::new(name, self.position(start)))
        }
    }

    fn tag_body(&mut self, name: String, start: usize) -> ParseResult<AnnotationNode> {
        let mut node = AnnotationNode::new(name, self.position(start));
        self.bump();

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.unclosed(&node, start)),
                Some(')') => {
                    self.bump();
                    return Ok(node);
                }
                Some('@') => {
                    let child = self.tag()?;
                    node.children.push(child);
                }
                Some(_) => {
                    let key_pos = self.pos;
                    let key = self.attribute_key().unwrap_or_else(|| "value".to_string());
                    let value = self.value()?;
                    if node.attributes.contains_key(&key) {
                        let message = if key == "value" {
                            format!("@{} has more than one positional value", node.name)
                        } else {
                            format!("duplicate attribute '{}' in @{}", key, node.name)
                        };
                        return Err(self.error_at(key_pos, message));
                    }
                    node.attributes.insert(key, value);
                }
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                Some(')') => {}
                None => return Err(self.unclosed(&node, start)),
                Some(c) => {
                    return Err(self.error_here(format!("expected ',' or ')' but found '{}'", c)))
                }
            }
        }
    }

    fn unclosed(&self, node: &AnnotationNode, start: usize) -> ParseError {
        self.error_at(start, format!("unclosed '(' in @{}", node.name))
    }

    /// Consumes `key =` if present.
    fn attribute_key(&mut self) -> Option<String> {
        let save = self.pos;
        let key = self.simple_ident();
        self.skip_ws();
        if !key.is_empty() && self.peek() == Some('=') {
            self.bump();
            return Some(key);
        }
        self.pos = save;
        None
    }

    fn simple_ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.bump();
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn value(&mut self) -> ParseResult<AttrValue> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.error_here("expected a value")),
            Some('"') => self.string().map(AttrValue::Str),
            Some('{') => self.collection(),
            Some('@') => self.tag().map(|node| AttrValue::Tag(Box::new(node))),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            Some(c) if is_ident_start(c) => Ok(self.identifier()),
            Some(c) => Err(self.error_here(format!("unexpected character '{}'", c))),
        }
    }

    fn string(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(start, "unterminated string")),
                Some('"') => {
                    self.bump();
                    return Ok(out);
                }
                Some('\\') => {
                    self.bump();
                    match self.peek() {
                        Some('n') => out.push('\n'),
                        Some('t') => out.push('\t'),
                        Some('"') => out.push('"'),
                        Some('\\') => out.push('\\'),
                        Some(other) => {
                            out.push('\\');
                            out.push(other);
                        }
                        None => return Err(self.error_at(start, "unterminated string")),
                    }
                    self.bump();
                }
                Some(c) => {
                    out.push(c);
                    self.bump();
                }
            }
        }
    }

    fn number(&mut self) -> ParseResult<AttrValue> {
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.bump(),
                '.' | 'e' | 'E' => {
                    is_float = true;
                    self.bump();
                    if matches!(c, 'e' | 'E') && matches!(self.peek(), Some('-') | Some('+')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let literal: String = self.chars[start..self.pos].iter().collect();
        let parsed = if is_float {
            literal.parse::<f64>().ok().map(AttrValue::Float)
        } else {
            literal.parse::<i64>().ok().map(AttrValue::Int)
        };
        parsed.ok_or_else(|| self.error_at(start, format!("invalid number '{}'", literal)))
    }

    /// Booleans, `null`, or a constant placeholder.
    fn identifier(&mut self) -> AttrValue {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '\\' || c == '.' {
                self.bump();
            } else if c == ':' && self.peek_at(1) == Some(':') {
                self.pos += 2;
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        match name.to_ascii_lowercase().as_str() {
            "true" => AttrValue::Bool(true),
            "false" => AttrValue::Bool(false),
            "null" => AttrValue::Null,
            _ => match self.constants.get(&name) {
                Some(value) => AttrValue::from_json(value),
                None => AttrValue::Constant(name),
            },
        }
    }

    fn collection(&mut self) -> ParseResult<AttrValue> {
        let start = self.pos;
        self.bump();
        let mut items = Vec::new();
        let mut entries = Vec::new();

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error_at(start, "unclosed '{'")),
                Some('}') => {
                    self.bump();
                    break;
                }
                _ => {}
            }

            let entry_pos = self.pos;
            match self.map_key()? {
                Some(key) => entries.push((key, self.value()?)),
                None => items.push(self.value()?),
            }
            if !items.is_empty() && !entries.is_empty() {
                return Err(self.error_at(entry_pos, "cannot mix keyed and positional entries"));
            }

            self.skip_ws();
            match self.peek() {
                Some(',') => self.bump(),
                Some('}') => {}
                None => return Err(self.error_at(start, "unclosed '{'")),
                Some(c) => {
                    return Err(self.error_here(format!("expected ',' or '}}' but found '{}'", c)))
                }
            }
        }

        if entries.is_empty() {
            Ok(AttrValue::Array(items))
        } else {
            Ok(AttrValue::Map(entries))
        }
    }

    /// Consumes `"key":`, `key:` or `key=` inside braces if present.
    fn map_key(&mut self) -> ParseResult<Option<String>> {
        let save = self.pos;
        let key = match self.peek() {
            Some('"') => self.string()?,
            Some(c) if c.is_alphanumeric() || c == '_' => self.simple_ident(),
            _ => return Ok(None),
        };
        self.skip_ws();
        match (self.peek(), self.peek_at(1)) {
            (Some('='), _) => {
                self.bump();
                Ok(Some(key))
            }
            (Some(':'), next) if next != Some(':') => {
                self.bump();
                Ok(Some(key))
            }
            _ => {
                self.pos = save;
                Ok(None)
            }
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '\\'
}

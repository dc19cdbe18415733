//! Reader and writer for Valve's nested key-value text format (VDF).
//!
//! A document is a sequence of entries. Each entry is a key followed by either a
//! scalar value or a brace-delimited block of further entries:
//!
//! ```text
//! "users"
//! {
//!     "76561197960265730"
//!     {
//!         "AccountName"    "someone"
//!         "MostRecent"     "1"
//!     }
//! }
//! ```
//!
//! Entry order is kept end to end so a decode/encode cycle only changes whitespace.

use thiserror::Error;

pub const DEFAULT_MAX_TOKEN_SIZE: usize = 16_384;
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// A value in a document: either text or a nested block of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Scalar(String),
    Mapping(Mapping),
}

/// Ordered key/value entries with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mapping {
    entries: Vec<(String, Node)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unexpected end of input at line {line}")]
    UnexpectedEof { line: usize },
    #[error("unbalanced '}}' at line {line}")]
    UnbalancedBrace { line: usize },
    #[error("unexpected '{{' where a key was expected at line {line}")]
    UnexpectedOpenBrace { line: usize },
    #[error("key \"{key}\" has no value at line {line}")]
    MissingValue { key: String, line: usize },
    #[error("top-level key \"{key}\" holds a scalar where a block is required (line {line})")]
    ScalarAtRoot { key: String, line: usize },
    #[error("token at line {line} exceeds the maximum size of {limit} bytes")]
    TokenTooLarge { line: usize, limit: usize },
    #[error("unterminated quoted string starting at line {line}")]
    UnterminatedString { line: usize },
    #[error("nesting deeper than {limit} levels at line {line}")]
    TooDeep { line: usize, limit: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("key path not found: {path}")]
pub struct PathNotFoundError {
    pub path: String,
}

impl PathNotFoundError {
    fn new<S: AsRef<str>>(path: &[S]) -> Self {
        Self {
            path: display_key_path(path),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    pub max_token_size: usize,
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_token_size: DEFAULT_MAX_TOKEN_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

pub fn display_key_path<S: AsRef<str>>(path: &[S]) -> String {
    path.iter()
        .map(|key| key.as_ref())
        .collect::<Vec<_>>()
        .join(" / ")
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, node)| node)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.entries
            .iter_mut()
            .find(|(existing, _)| existing == key)
            .map(|(_, node)| node)
    }

    /// Replaces the value of an existing key in place, or appends a new entry.
    /// Returns the previous value when the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: Node) -> Option<Node> {
        let key = key.into();
        match self.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.entries.iter().map(|(key, node)| (key.as_str(), node))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }
}

impl Node {
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar(value) => Some(value),
            Node::Mapping(_) => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            Node::Scalar(_) => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Node::Mapping(mapping) => Some(mapping),
            Node::Scalar(_) => None,
        }
    }

    /// Descends one key at a time. Stops with `None` at the first scalar or missing key.
    pub fn navigate<S: AsRef<str>>(&self, path: &[S]) -> Option<&Node> {
        let mut current = self;
        for key in path {
            current = current.as_mapping()?.get(key.as_ref())?;
        }
        Some(current)
    }

    pub fn navigate_mut<S: AsRef<str>>(&mut self, path: &[S]) -> Option<&mut Node> {
        let mut current = self;
        for key in path {
            current = current.as_mapping_mut()?.get_mut(key.as_ref())?;
        }
        Some(current)
    }

    pub fn get_scalar<S: AsRef<str>>(&self, path: &[S]) -> Option<&str> {
        self.navigate(path)?.as_scalar()
    }

    /// Writes `value` at `path`. Everything but the last key must already exist and
    /// resolve to a mapping; the last key is overwritten in place or appended.
    pub fn set_scalar<S: AsRef<str>>(
        &mut self,
        path: &[S],
        value: impl Into<String>,
    ) -> Result<Option<Node>, PathNotFoundError> {
        let Some((last, prefix)) = path.split_last() else {
            return Err(PathNotFoundError::new(path));
        };
        let parent = self
            .navigate_mut(prefix)
            .and_then(Node::as_mapping_mut)
            .ok_or_else(|| PathNotFoundError::new(path))?;
        Ok(parent.insert(last.as_ref(), Node::Scalar(value.into())))
    }
}

pub fn decode(text: &str) -> Result<Node, FormatError> {
    decode_with(text, &DecodeOptions::default())
}

pub fn decode_with(text: &str, options: &DecodeOptions) -> Result<Node, FormatError> {
    let mut parser = Parser {
        lexer: Lexer::new(text, options.max_token_size),
        max_depth: options.max_depth,
    };
    parser.parse_block(None, 0).map(Node::Mapping)
}

/// Re-emits a tree with one tab of indentation per level. Every key and scalar is quoted.
pub fn encode(node: &Node) -> String {
    let mut out = String::new();
    match node {
        Node::Mapping(mapping) => write_entries(&mut out, mapping, 0),
        Node::Scalar(value) => {
            push_quoted(&mut out, value);
            out.push('\n');
        }
    }
    out
}

fn write_entries(out: &mut String, mapping: &Mapping, depth: usize) {
    for (key, value) in mapping.iter() {
        push_indent(out, depth);
        push_quoted(out, key);
        match value {
            Node::Scalar(scalar) => {
                out.push_str("\t\t");
                push_quoted(out, scalar);
                out.push('\n');
            }
            Node::Mapping(child) => {
                out.push('\n');
                push_indent(out, depth);
                out.push_str("{\n");
                write_entries(out, child, depth + 1);
                push_indent(out, depth);
                out.push_str("}\n");
            }
        }
    }
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push('\t');
    }
}

fn push_quoted(out: &mut String, value: &str) {
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
}

#[derive(Debug, PartialEq, Eq)]
enum TokenKind {
    Text(String),
    Open,
    Close,
    Conditional,
}

#[derive(Debug)]
struct Token {
    kind: TokenKind,
    line: usize,
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    max_token_size: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, max_token_size: usize) -> Self {
        // A leading byte order mark is common in files written by Windows tools.
        let src = src.strip_prefix('\u{feff}').unwrap_or(src);
        Self {
            src,
            pos: 0,
            line: 1,
            max_token_size,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn skip_trivia(&mut self) {
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.bump();
            }
            if self.src[self.pos..].starts_with("//") {
                while self.peek().is_some_and(|ch| ch != '\n') {
                    self.bump();
                }
                continue;
            }
            return;
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, FormatError> {
        self.skip_trivia();
        let line = self.line;
        let kind = match self.peek() {
            None => return Ok(None),
            Some('{') => {
                self.bump();
                TokenKind::Open
            }
            Some('}') => {
                self.bump();
                TokenKind::Close
            }
            Some('"') => {
                self.bump();
                TokenKind::Text(self.quoted(line)?)
            }
            Some('[') => {
                self.conditional(line)?;
                TokenKind::Conditional
            }
            Some(_) => TokenKind::Text(self.bare(line)?),
        };
        Ok(Some(Token { kind, line }))
    }

    fn check_size(&self, token: &str, line: usize) -> Result<(), FormatError> {
        if token.len() > self.max_token_size {
            return Err(FormatError::TokenTooLarge {
                line,
                limit: self.max_token_size,
            });
        }
        Ok(())
    }

    fn quoted(&mut self, line: usize) -> Result<String, FormatError> {
        let mut out = String::new();
        loop {
            let ch = self
                .bump()
                .ok_or(FormatError::UnterminatedString { line })?;
            match ch {
                '"' => return Ok(out),
                '\\' => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('\\') => out.push('\\'),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(FormatError::UnterminatedString { line }),
                },
                other => out.push(other),
            }
            self.check_size(&out, line)?;
        }
    }

    fn bare(&mut self, line: usize) -> Result<String, FormatError> {
        let mut out = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() || matches!(ch, '"' | '{' | '}') {
                break;
            }
            out.push(ch);
            self.bump();
            self.check_size(&out, line)?;
        }
        Ok(out)
    }

    // Platform conditionals such as `[$WIN32]` are accepted and discarded.
    fn conditional(&mut self, line: usize) -> Result<(), FormatError> {
        let start = self.pos;
        while let Some(ch) = self.bump() {
            if ch == ']' {
                return Ok(());
            }
            if ch == '\n' {
                break;
            }
            self.check_size(&self.src[start..self.pos], line)?;
        }
        Err(FormatError::UnexpectedEof { line })
    }
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    max_depth: usize,
}

impl Parser<'_> {
    /// Parses entries until the matching `}` (when `open_line` is set) or end of input.
    fn parse_block(
        &mut self,
        open_line: Option<usize>,
        depth: usize,
    ) -> Result<Mapping, FormatError> {
        let mut mapping = Mapping::new();
        loop {
            let Some(token) = self.lexer.next_token()? else {
                return match open_line {
                    Some(_) => Err(FormatError::UnexpectedEof {
                        line: self.lexer.line,
                    }),
                    None => Ok(mapping),
                };
            };
            let key = match token.kind {
                TokenKind::Close if open_line.is_some() => return Ok(mapping),
                TokenKind::Close => return Err(FormatError::UnbalancedBrace { line: token.line }),
                TokenKind::Open => {
                    return Err(FormatError::UnexpectedOpenBrace { line: token.line })
                }
                TokenKind::Conditional => continue,
                TokenKind::Text(key) => key,
            };
            let value = self.parse_value(key.clone(), token.line, open_line.is_none(), depth)?;
            mapping.insert(key, value);
        }
    }

    fn parse_value(
        &mut self,
        key: String,
        key_line: usize,
        at_root: bool,
        depth: usize,
    ) -> Result<Node, FormatError> {
        let token = self
            .lexer
            .next_token()?
            .ok_or(FormatError::UnexpectedEof {
                line: self.lexer.line,
            })?;
        match token.kind {
            TokenKind::Text(_) if at_root => Err(FormatError::ScalarAtRoot {
                key,
                line: key_line,
            }),
            TokenKind::Text(value) => Ok(Node::Scalar(value)),
            TokenKind::Open => {
                if depth + 1 > self.max_depth {
                    return Err(FormatError::TooDeep {
                        line: token.line,
                        limit: self.max_depth,
                    });
                }
                self.parse_block(Some(token.line), depth + 1)
                    .map(Node::Mapping)
            }
            TokenKind::Close | TokenKind::Conditional => Err(FormatError::MissingValue {
                key,
                line: key_line,
            }),
        }
    }
}

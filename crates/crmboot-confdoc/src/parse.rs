//! Recursive-descent parser for the supported PHP config subset.
//!
//! Grammar (whitespace and comments allowed between any two tokens):
//!
//! ```text
//! document := "<?php"? "$" ident "=" array ";" "?>"?
//! array    := ("array" "(" entries ")") | ("[" entries "]")
//! entries  := (string "=>" value ",")* (string "=>" value)?
//! value    := string | integer | "true" | "false" | array
//! string   := single- or double-quoted, with \\ and \<quote> escapes
//! ```

use crate::value::{ConfMap, ConfValue};
use crate::{ConfDoc, Error, Result};

/// Parse a full config document.
pub fn parse_document(source: &str) -> Result<ConfDoc> {
    let mut parser = Parser::new(source);
    parser.skip_trivia();
    if parser.eat_str("<?php") {
        parser.skip_trivia();
    }
    parser.expect_byte(b'$')?;
    let var_name = parser.ident()?;
    parser.skip_trivia();
    parser.expect_byte(b'=')?;
    parser.skip_trivia();
    let root = parser.array()?;
    parser.skip_trivia();
    parser.expect_byte(b';')?;
    parser.skip_trivia();
    if parser.eat_str("?>") {
        parser.skip_trivia();
    }
    if !parser.at_end() {
        return Err(parser.error("trailing content after configuration array"));
    }
    Ok(ConfDoc::from_parts(var_name, root))
}

impl ConfDoc {
    pub(crate) fn from_parts(var_name: String, root: ConfMap) -> Self {
        // Constructed only by the parser; field layout stays private.
        let mut doc = ConfDoc::new(var_name);
        doc.replace_root(root);
        doc
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    line: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    /// Skip whitespace plus `//`, `#`, and `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'#') => self.skip_line(),
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'/') => self.skip_line(),
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some(b'*') if self.peek() == Some(b'/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(b) = self.bump() {
            if b == b'\n' {
                break;
            }
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.bytes[self.pos..].starts_with(s.as_bytes()) {
            for _ in 0..s.len() {
                self.bump();
            }
            true
        } else {
            false
        }
    }

    fn expect_byte(&mut self, expected: u8) -> Result<()> {
        match self.peek() {
            Some(b) if b == expected => {
                self.bump();
                Ok(())
            }
            Some(b) => Err(self.error(format!(
                "expected {:?}, found {:?}",
                expected as char, b as char,
            ))),
            None => Err(self.error(format!(
                "expected {:?}, found end of input",
                expected as char,
            ))),
        }
    }

    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b == b'_' || b.is_ascii_alphanumeric()) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        // Identifier bytes are ASCII by construction.
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn array(&mut self) -> Result<ConfMap> {
        let close = if self.eat_str("array") {
            self.skip_trivia();
            self.expect_byte(b'(')?;
            b')'
        } else if self.peek() == Some(b'[') {
            self.bump();
            b']'
        } else {
            return Err(self.error("expected array literal"));
        };

        let mut map = ConfMap::new();
        loop {
            self.skip_trivia();
            if self.peek() == Some(close) {
                self.bump();
                return Ok(map);
            }
            let key = self.quoted_string()?;
            self.skip_trivia();
            if !self.eat_str("=>") {
                return Err(self.error("expected '=>' after array key"));
            }
            self.skip_trivia();
            let value = self.value()?;
            map.set(&key, value);
            self.skip_trivia();
            match self.peek() {
                Some(b',') => {
                    self.bump();
                }
                Some(b) if b == close => {}
                _ => return Err(self.error("expected ',' or close of array")),
            }
        }
    }

    fn value(&mut self) -> Result<ConfValue> {
        match self.peek() {
            Some(b'\'') | Some(b'"') => Ok(ConfValue::Str(self.quoted_string()?)),
            Some(b'a') | Some(b'[') => Ok(ConfValue::Map(self.array()?)),
            Some(b't') if self.eat_str("true") => Ok(ConfValue::Bool(true)),
            Some(b'f') if self.eat_str("false") => Ok(ConfValue::Bool(false)),
            Some(b) if b == b'-' || b.is_ascii_digit() => self.integer(),
            _ => Err(self.error("expected string, integer, boolean, or array")),
        }
    }

    fn integer(&mut self) -> Result<ConfValue> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.bump();
        }
        let text = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        text.parse::<i64>()
            .map(ConfValue::Int)
            .map_err(|_| self.error(format!("invalid integer {text:?}")))
    }

    fn quoted_string(&mut self) -> Result<String> {
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => q,
            _ => return Err(self.error("expected quoted string")),
        };
        self.bump();
        let mut out = Vec::new();
        loop {
            match self.bump() {
                Some(b'\\') => match self.bump() {
                    Some(b) if b == quote || b == b'\\' => out.push(b),
                    // PHP leaves unknown escapes intact in single quotes.
                    Some(b) => {
                        out.push(b'\\');
                        out.push(b);
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some(b) if b == quote => break,
                Some(b) => out.push(b),
                None => return Err(self.error("unterminated string")),
            }
        }
        String::from_utf8(out).map_err(|_| self.error("string is not valid UTF-8"))
    }
}

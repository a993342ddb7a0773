//! Tokenizer for the build script text form.

use std::fmt;

use super::error::{ParseError, Position};

/// Token kinds produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare identifier.
    Ident(String),
    /// Decoded string literal.
    Str(String),
    /// Numeric literal.
    Number(f64),
    /// `null`
    Null,
    /// `=`
    Equals,
    /// `,`
    Comma,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Ident(name) => write!(f, "identifier '{}'", name),
            TokenKind::Str(text) => write!(f, "string {:?}", text),
            TokenKind::Number(num) => write!(f, "number {}", num),
            TokenKind::Null => f.write_str("'null'"),
            TokenKind::Equals => f.write_str("'='"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::Eof => f.write_str("end of input"),
        }
    }
}

/// A token and where it starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was scanned.
    pub kind: TokenKind,
    /// Start of the token.
    pub position: Position,
}

/// Split build script text into tokens. The last token is always [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    index: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            index: 0,
            line: 1,
            column: 1,
        }
    }

    fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.index,
        }
    }

    fn current(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    fn advance(&mut self) {
        let Some(byte) = self.current() else {
            return;
        };
        self.index += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else if byte & 0xC0 != 0x80 {
            // UTF-8 continuation bytes do not start a new column
            self.column += 1;
        }
    }

    fn skip_ws(&mut self) {
        while let Some(ch) = self.current() {
            if ch.is_ascii_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_ws();
        let position = self.position();
        let Some(ch) = self.current() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position,
            });
        };

        let kind = match ch {
            b'=' => self.punct(TokenKind::Equals),
            b',' => self.punct(TokenKind::Comma),
            b'(' => self.punct(TokenKind::LParen),
            b')' => self.punct(TokenKind::RParen),
            b'[' => self.punct(TokenKind::LBracket),
            b']' => self.punct(TokenKind::RBracket),
            b'{' => self.punct(TokenKind::LBrace),
            b'}' => self.punct(TokenKind::RBrace),
            b'"' => self.scan_string(position)?,
            b'-' | b'0'..=b'9' => self.scan_number(position)?,
            c if c == b'_' || c.is_ascii_alphabetic() => self.scan_ident(),
            _ => {
                let found = self.src[self.index..].chars().next().unwrap_or('?');
                return Err(ParseError::new(
                    position,
                    format!("unexpected character '{}'", found),
                ));
            }
        };

        Ok(Token { kind, position })
    }

    fn punct(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn scan_string(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.index;
        self.advance(); // opening quote
        loop {
            match self.current() {
                None | Some(b'\n') => {
                    return Err(ParseError::new(start, "unterminated string literal"));
                }
                Some(b'\\') => {
                    self.advance();
                    if self.current().is_none() {
                        return Err(ParseError::new(start, "unterminated string literal"));
                    }
                    self.advance();
                }
                Some(b'"') => {
                    self.advance();
                    break;
                }
                Some(_) => self.advance(),
            }
        }

        let literal = &self.src[begin..self.index];
        serde_json::from_str::<String>(literal)
            .map(TokenKind::Str)
            .map_err(|err| ParseError::new(start, format!("invalid string literal: {}", err)))
    }

    fn scan_number(&mut self, start: Position) -> Result<TokenKind, ParseError> {
        let begin = self.index;
        if self.current() == Some(b'-') {
            self.advance();
        }
        if !matches!(self.current(), Some(b'0'..=b'9')) {
            return Err(ParseError::new(start, "unexpected character '-'"));
        }
        self.skip_digits();

        if self.current() == Some(b'.') && matches!(self.peek(), Some(b'0'..=b'9')) {
            self.advance();
            self.skip_digits();
        }

        if matches!(self.current(), Some(b'e' | b'E')) {
            let exponent_start = self.index;
            self.advance();
            if matches!(self.current(), Some(b'+' | b'-')) {
                self.advance();
            }
            if matches!(self.current(), Some(b'0'..=b'9')) {
                self.skip_digits();
            } else {
                return Err(ParseError::new(
                    start,
                    format!(
                        "malformed exponent in number literal '{}'",
                        &self.src[begin..exponent_start + 1]
                    ),
                ));
            }
        }

        let text = &self.src[begin..self.index];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ParseError::new(start, format!("invalid number literal '{}'", text)))
    }

    fn skip_digits(&mut self) {
        while matches!(self.current(), Some(b'0'..=b'9')) {
            self.advance();
        }
    }

    fn scan_ident(&mut self) -> TokenKind {
        let begin = self.index;
        while let Some(ch) = self.current() {
            if ch == b'_' || ch.is_ascii_alphanumeric() {
                self.advance();
            } else {
                break;
            }
        }
        match &self.src[begin..self.index] {
            "null" => TokenKind::Null,
            text => TokenKind::Ident(text.to_string()),
        }
    }
}

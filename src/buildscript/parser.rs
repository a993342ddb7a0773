//! Recursive-descent parser for the build script text form.
//!
//! The parser is purely structural: any function name is accepted and no
//! requirement or timestamp validation happens here.

use super::ast::{Assignment, FuncCall, Value};
use super::error::ParseError;
use super::lexer::{Token, TokenKind, tokenize};

/// Parse build script source into its top-level assignments.
pub fn parse_assignments(source: &str) -> Result<Vec<Assignment>, ParseError> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut assignments = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        assignments.push(parser.parse_assignment()?);
    }
    if assignments.is_empty() {
        return Err(parser.error("expected at least one assignment"));
    }
    Ok(assignments)
}

/// Parse a single value, such as `Eq(value = "1.0")`.
pub fn parse_value(source: &str) -> Result<Value, ParseError> {
    let mut parser = Parser::new(tokenize(source)?);
    let value = parser.parse_value()?;
    if !parser.at(&TokenKind::Eof) {
        return Err(parser.unexpected("end of input"));
    }
    Ok(value)
}

/// Deepest nesting of lists, objects and calls the parser accepts.
pub const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    depth: usize,
}

type ParseResult<T> = std::result::Result<T, ParseError>;

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            index: 0,
            depth: 0,
        }
    }

    fn current(&self) -> &Token {
        // tokenize always terminates the stream with Eof
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        let next = (self.index + 1).min(self.tokens.len() - 1);
        &self.tokens[next].kind
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<()> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn expect_ident(&mut self) -> ParseResult<String> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_assignment(&mut self) -> ParseResult<Assignment> {
        let key = self.expect_ident()?;
        self.expect(&TokenKind::Equals)?;
        let value = self.parse_value()?;
        Ok(Assignment::new(key, value))
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        self.depth += 1;
        let value = self.parse_nested_value();
        self.depth -= 1;
        value
    }

    fn parse_nested_value(&mut self) -> ParseResult<Value> {
        let token = self.current().clone();
        match token.kind {
            TokenKind::Ident(name) => {
                self.advance();
                if self.at(&TokenKind::LParen) {
                    Ok(Value::FuncCall(self.parse_func_call(name)?))
                } else {
                    Ok(Value::Ident(name))
                }
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Value::Str(text))
            }
            TokenKind::Number(num) => {
                self.advance();
                Ok(Value::Number(num))
            }
            TokenKind::Null => {
                self.advance();
                Ok(Value::Null)
            }
            TokenKind::LBracket => self.parse_list(),
            TokenKind::LBrace => self.parse_object(),
            _ => Err(self.unexpected("value")),
        }
    }

    fn parse_func_call(&mut self, name: String) -> ParseResult<FuncCall> {
        self.expect(&TokenKind::LParen)?;
        let mut arguments = Vec::new();
        while !self.eat(&TokenKind::RParen) {
            arguments.push(self.parse_argument()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RParen)?;
                break;
            }
        }
        Ok(FuncCall::new(name, arguments))
    }

    fn parse_argument(&mut self) -> ParseResult<Value> {
        let is_named = matches!(self.current().kind, TokenKind::Ident(_))
            && self.peek_kind() == &TokenKind::Equals;
        if is_named {
            let assignment = self.parse_assignment()?;
            Ok(Value::Assignment(Box::new(assignment)))
        } else {
            self.parse_value()
        }
    }

    fn parse_list(&mut self) -> ParseResult<Value> {
        self.expect(&TokenKind::LBracket)?;
        let mut items = Vec::new();
        while !self.eat(&TokenKind::RBracket) {
            items.push(self.parse_value()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBracket)?;
                break;
            }
        }
        Ok(Value::List(items))
    }

    fn parse_object(&mut self) -> ParseResult<Value> {
        self.expect(&TokenKind::LBrace)?;
        let mut fields = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            fields.push(self.parse_assignment()?);
            if !self.eat(&TokenKind::Comma) {
                self.expect(&TokenKind::RBrace)?;
                break;
            }
        }
        Ok(Value::Object(fields))
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let token = self.current();
        ParseError::new(
            token.position,
            format!("expected {}, found {}", expected, token.kind),
        )
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError::new(self.current().position, message)
    }
}

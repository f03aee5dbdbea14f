//! Tokenizer shared by the expression, key predicate and skip token grammars.

use bigdecimal::BigDecimal;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::PrimitiveValue;
use odata_model::value::parse_datetime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Identifier(String),
    Literal(PrimitiveValue),
    OpenParen,
    CloseParen,
    Comma,
    Slash,
    Equal,
    Star,
    Minus,
    End,
}

/// A token with its byte offset and source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
    pub text: String,
}

impl Token {
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this is the identifier `word`, compared case-sensitively.
    #[must_use]
    pub fn is_keyword(&self, word: &str) -> bool {
        self.identifier() == Some(word)
    }
}

pub(crate) fn syntax(position: usize, detail: impl std::fmt::Display) -> ODataError {
    ODataError::syntax_error(messages::expression_syntax(position, detail))
}

/// Split `source` into tokens. The last token is always [`TokenKind::End`].
///
/// # Errors
/// Fails on unterminated quotes, malformed typed literals and characters that
/// are not part of the grammar.
pub fn tokenize(source: &str) -> ODataResult<Vec<Token>> {
    Scanner {
        source,
        chars: source.char_indices().collect(),
        index: 0,
    }
    .run()
}

struct Scanner<'a> {
    source: &'a str,
    chars: Vec<(usize, char)>,
    index: usize,
}

impl Scanner<'_> {
    fn run(mut self) -> ODataResult<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            while self.peek().is_some_and(char::is_whitespace) {
                self.index += 1;
            }
            let start = self.offset();
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::End,
                    position: start,
                    text: String::new(),
                });
                return Ok(tokens);
            };
            let kind = match c {
                '(' => self.single(TokenKind::OpenParen),
                ')' => self.single(TokenKind::CloseParen),
                ',' => self.single(TokenKind::Comma),
                '/' => self.single(TokenKind::Slash),
                '=' => self.single(TokenKind::Equal),
                '*' => self.single(TokenKind::Star),
                '\'' => TokenKind::Literal(PrimitiveValue::String(self.quoted(true)?)),
                '-' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                '-' if self.rest().starts_with("-INF") => {
                    self.index += 4;
                    TokenKind::Literal(PrimitiveValue::Double(f64::NEG_INFINITY))
                }
                '-' => self.single(TokenKind::Minus),
                c if c.is_ascii_digit() => self.number()?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                other => return Err(syntax(start, format!("unexpected character '{other}'"))),
            };
            let end = self.offset();
            tokens.push(Token {
                kind,
                position: start,
                text: self.source[start..end].to_owned(),
            });
        }
    }

    fn peek(&self) -> Option<char> {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.index)
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn rest(&self) -> &str {
        &self.source[self.offset()..]
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.index += 1;
        kind
    }

    /// Read a single-quoted body starting at the opening quote. Doubled quotes
    /// are unescaped only for string literals.
    fn quoted(&mut self, escapes: bool) -> ODataResult<String> {
        let start = self.offset();
        self.index += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => return Err(syntax(start, "unterminated string literal")),
                Some('\'') if escapes && self.peek_at(1) == Some('\'') => {
                    out.push('\'');
                    self.index += 2;
                }
                Some('\'') => {
                    self.index += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.index += 1;
                }
            }
        }
    }

    fn digits(&mut self) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.index += 1;
            count += 1;
        }
        count
    }

    fn number(&mut self) -> ODataResult<TokenKind> {
        let source = self.source;
        let start = self.offset();
        if self.peek() == Some('-') {
            self.index += 1;
        }
        self.digits();
        let mut integral = true;
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            integral = false;
            self.index += 1;
            self.digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+' | '-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                integral = false;
                self.index += 1 + sign;
                self.digits();
            }
        }
        let body = &source[start..self.offset()];
        let suffix = self.peek().filter(|c| matches!(c, 'L' | 'l' | 'M' | 'm' | 'D' | 'd' | 'F' | 'f'));
        if suffix.is_some() {
            self.index += 1;
        }
        if let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            let scanned = &source[start..self.offset()];
            return Err(syntax(start, format!("invalid numeric literal '{scanned}{c}'")));
        }
        let invalid = || syntax(start, format!("invalid numeric literal '{body}'"));
        let value = match suffix.map(|c| c.to_ascii_uppercase()) {
            Some('L') if integral => PrimitiveValue::Int64(body.parse().map_err(|_| invalid())?),
            Some('L') => return Err(invalid()),
            Some('M') => PrimitiveValue::Decimal(body.parse::<BigDecimal>().map_err(|_| invalid())?),
            Some('F') => PrimitiveValue::Single(body.parse().map_err(|_| invalid())?),
            Some(_) => PrimitiveValue::Double(body.parse().map_err(|_| invalid())?),
            None if integral => {
                if let Ok(v) = body.parse::<i32>() {
                    PrimitiveValue::Int32(v)
                } else if let Ok(v) = body.parse::<i64>() {
                    PrimitiveValue::Int64(v)
                } else {
                    PrimitiveValue::Decimal(body.parse::<BigDecimal>().map_err(|_| invalid())?)
                }
            }
            None => PrimitiveValue::Double(body.parse().map_err(|_| invalid())?),
        };
        Ok(TokenKind::Literal(value))
    }

    fn word(&mut self) -> ODataResult<TokenKind> {
        let source = self.source;
        let start = self.offset();
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.index += 1;
        }
        let word = &source[start..self.offset()];
        if self.peek() == Some('\'') {
            let prefix = word.to_ascii_lowercase();
            if matches!(prefix.as_str(), "guid" | "datetime" | "x" | "binary") {
                let body = self.quoted(false)?;
                let value = typed_literal(&prefix, &body)
                    .ok_or_else(|| syntax(start, format!("invalid {prefix} literal '{body}'")))?;
                return Ok(TokenKind::Literal(value));
            }
        }
        Ok(match word {
            "null" => TokenKind::Literal(PrimitiveValue::Null),
            "true" => TokenKind::Literal(PrimitiveValue::Boolean(true)),
            "false" => TokenKind::Literal(PrimitiveValue::Boolean(false)),
            "INF" => TokenKind::Literal(PrimitiveValue::Double(f64::INFINITY)),
            "NaN" => TokenKind::Literal(PrimitiveValue::Double(f64::NAN)),
            _ => TokenKind::Identifier(word.to_owned()),
        })
    }
}

fn typed_literal(prefix: &str, body: &str) -> Option<PrimitiveValue> {
    match prefix {
        "guid" => Uuid::parse_str(body).ok().map(PrimitiveValue::Guid),
        "datetime" => parse_datetime(body).map(PrimitiveValue::DateTime),
        _ => decode_hex(body).map(PrimitiveValue::Binary),
    }
}

fn decode_hex(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 || !text.is_ascii() {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

/// Cursor over a token list with the lookahead the recursive-descent parsers need.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    index: usize,
}

impl TokenStream {
    /// # Errors
    /// See [`tokenize`].
    pub fn new(source: &str) -> ODataResult<Self> {
        Ok(Self {
            tokens: tokenize(source)?,
            index: 0,
        })
    }

    /// The current token; [`TokenKind::End`] once exhausted.
    #[must_use]
    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    #[must_use]
    pub fn peek_at(&self, ahead: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.index + ahead).min(last)]
    }

    pub fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    #[must_use]
    pub fn at_end(&self) -> bool {
        self.peek().kind == TokenKind::End
    }

    /// Consume the current token when it is `kind`.
    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.peek().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    /// # Errors
    /// Fails when the current token is not `kind`.
    pub fn expect(&mut self, kind: &TokenKind, what: &str) -> ODataResult<Token> {
        if &self.peek().kind == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    /// # Errors
    /// Fails when the current token is not an identifier.
    pub fn expect_identifier(&mut self) -> ODataResult<(String, usize)> {
        let token = self.peek();
        match &token.kind {
            TokenKind::Identifier(name) => {
                let out = (name.clone(), token.position);
                self.advance();
                Ok(out)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// # Errors
    /// Fails unless every token was consumed.
    pub fn expect_end(&self) -> ODataResult<()> {
        if self.at_end() {
            Ok(())
        } else {
            Err(self.unexpected("end of expression"))
        }
    }

    #[must_use]
    pub fn unexpected(&self, expected: &str) -> ODataError {
        let token = self.peek();
        let found = if token.kind == TokenKind::End {
            "end of input".to_owned()
        } else {
            format!("'{}'", token.text)
        };
        syntax(token.position, format!("expected {expected}, found {found}"))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::EdmPrimitiveType as K;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn scans_operators_and_identifiers() {
        assert_eq!(
            kinds("Price gt 5 and Address/City eq 'Berlin'"),
            vec![
                TokenKind::Identifier("Price".into()),
                TokenKind::Identifier("gt".into()),
                TokenKind::Literal(PrimitiveValue::Int32(5)),
                TokenKind::Identifier("and".into()),
                TokenKind::Identifier("Address".into()),
                TokenKind::Slash,
                TokenKind::Identifier("City".into()),
                TokenKind::Identifier("eq".into()),
                TokenKind::Literal(PrimitiveValue::String("Berlin".into())),
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn numeric_suffixes_pick_the_kind() {
        let values: Vec<_> = ["7L", "1.5M", "2.5d", "1E+10", "1.5f", "1.5", "3000000000"]
            .iter()
            .map(|s| match kinds(s).remove(0) {
                TokenKind::Literal(v) => v.kind(),
                other => panic!("not a literal: {other:?}"),
            })
            .collect();
        assert_eq!(
            values,
            [K::Int64, K::Decimal, K::Double, K::Double, K::Single, K::Double, K::Int64].map(Some)
        );
    }

    #[test]
    fn negative_numbers_and_unary_minus() {
        assert_eq!(kinds("-5")[0], TokenKind::Literal(PrimitiveValue::Int32(-5)));
        assert_eq!(kinds("-Price")[0], TokenKind::Minus);
    }

    #[test]
    fn typed_literals() {
        let tokens = kinds("guid'05b242e7-52eb-46bd-8f0e-6568b72cd9a5' X'0AFF' datetime'2011-03-04T10:20:30'");
        assert!(matches!(tokens[0], TokenKind::Literal(PrimitiveValue::Guid(_))));
        assert_eq!(tokens[1], TokenKind::Literal(PrimitiveValue::Binary(vec![0x0A, 0xFF])));
        assert!(matches!(tokens[2], TokenKind::Literal(PrimitiveValue::DateTime(_))));
    }

    #[test]
    fn doubled_quotes_escape() {
        assert_eq!(
            kinds("'O''Neil'")[0],
            TokenKind::Literal(PrimitiveValue::String("O'Neil".into()))
        );
    }

    #[test]
    fn errors_carry_positions() {
        let err = tokenize("Name eq 'open").unwrap_err();
        assert!(err.message().contains("position 8"), "{}", err.message());
        assert!(tokenize("guid'nope'").is_err());
        assert!(tokenize("12abc").is_err());
        assert!(tokenize("a # b").is_err());
    }

    #[test]
    fn token_text_is_the_source_slice() {
        let tokens = tokenize("'ALFKI', guid'05b242e7-52eb-46bd-8f0e-6568b72cd9a5'").unwrap();
        assert_eq!(tokens[0].text, "'ALFKI'");
        assert_eq!(tokens[2].text, "guid'05b242e7-52eb-46bd-8f0e-6568b72cd9a5'");
    }
}

//! Byte stream -> token stream.
//!
//! Single pass over the source buffer tracking `(line, column)`. Whitespace
//! and `--`-to-end-of-line comments are skipped by the same helper. On an
//! unexpected byte the lexer never panics: it emits `TokenKind::Error` and
//! reports a diagnostic, leaving resynchronization to the parser.

use crate::arena::Arena;
use crate::bigint::BigUInt;
use crate::diagnostics::{Diagnostics, Location};

/// Reserved words, Ada 83, case-insensitive. Indices are not
/// significant; lookup is by case-insensitive string match against this
/// fixed table, exactly as the reference's "63-word table".
pub const KEYWORDS: &[&str] = &[
    "abort", "abs", "accept", "access", "all", "and", "array", "at", "begin", "body", "case",
    "constant", "declare", "delay", "delta", "digits", "do", "else", "elsif", "end", "entry",
    "exception", "exit", "for", "function", "generic", "goto", "if", "in", "is", "limited",
    "loop", "mod", "new", "not", "null", "of", "or", "others", "out", "package", "pragma",
    "private", "procedure", "raise", "range", "record", "rem", "renames", "return", "reverse",
    "select", "separate", "subtype", "task", "terminate", "then", "type", "use", "when", "while",
    "with", "xor",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Eof,
    Error,

    // Literals
    Integer(i64),
    /// Literal too wide for `i64`; kept as arbitrary-precision magnitude.
    BigInteger(BigUInt),
    Real(f64),
    Character(u8),
    /// Arena-owned byte buffer (doubled `""` already collapsed to one `"`).
    String(crate::arena::Slice),
    Identifier(crate::arena::Slice),

    // Keywords (Ada 83)
    Abort, Abs, Accept, Access, All, And, AndThen, Array, At, Begin, Body, Case,
    Constant, Declare, Delay, Delta, Digits, Do, Else, Elsif, End, Entry, Exception,
    Exit, For, Function, Generic, Goto, If, In, Is, Limited, Loop, Mod, New, Not,
    Null, Of, Or, OrElse, Others, Out, Package, Pragma, Private, Procedure, Raise,
    Range, Record, Rem, Renames, Return, Reverse, Select, Separate, Subtype, Task,
    Terminate, Then, Type, Use, When, While, With, Xor,

    // Delimiters / operators
    Ampersand,       // &
    Apostrophe,      // '
    LParen,          // (
    RParen,          // )
    Star,            // *
    StarStar,        // **
    Plus,            // +
    Comma,           // ,
    Minus,           // -
    Dot,             // .
    DotDot,          // ..
    Slash,           // /
    SlashEqual,      // /=
    Colon,           // :
    Assign,          // :=
    Semicolon,       // ;
    Less,            // <
    LessEqual,       // <=
    LessLess,        // <<
    Equal,           // =
    Arrow,           // =>
    Greater,         // >
    GreaterEqual,    // >=
    GreaterGreater,  // >>
    Box,             // <>
    Bar,             // |
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub location: Location,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

/// Keyword lookup via case-insensitive compare against the fixed table,
/// folded with FNV-1a. Hashing the candidate first lets us
/// skip most of the table on a miss without allocating.
fn lookup_keyword(text: &[u8]) -> Option<TokenKind> {
    let folded_hash = crate::arena::fnv1a_fold(text);
    for &kw in KEYWORDS {
        if crate::arena::fnv1a_fold(kw.as_bytes()) == folded_hash
            && kw.len() == text.len()
            && kw.as_bytes().eq_ignore_ascii_case(text)
        {
            return Some(keyword_kind(kw));
        }
    }
    None
}

fn keyword_kind(kw: &str) -> TokenKind {
    use TokenKind::*;
    match kw {
        "abort" => Abort, "abs" => Abs, "accept" => Accept, "access" => Access,
        "all" => All, "and" => And, "array" => Array, "at" => At, "begin" => Begin,
        "body" => Body, "case" => Case, "constant" => Constant, "declare" => Declare,
        "delay" => Delay, "delta" => Delta, "digits" => Digits, "do" => Do, "else" => Else,
        "elsif" => Elsif, "end" => End, "entry" => Entry, "exception" => Exception,
        "exit" => Exit, "for" => For, "function" => Function, "generic" => Generic,
        "goto" => Goto, "if" => If, "in" => In, "is" => Is, "limited" => Limited,
        "loop" => Loop, "mod" => Mod, "new" => New, "not" => Not, "null" => Null,
        "of" => Of, "or" => Or, "others" => Others, "out" => Out, "package" => Package,
        "pragma" => Pragma, "private" => Private, "procedure" => Procedure, "raise" => Raise,
        "range" => Range, "record" => Record, "rem" => Rem, "renames" => Renames,
        "return" => Return, "reverse" => Reverse, "select" => Select, "separate" => Separate,
        "subtype" => Subtype, "task" => Task, "terminate" => Terminate, "then" => Then,
        "type" => Type, "use" => Use, "when" => When, "while" => While, "with" => With,
        "xor" => Xor,
        _ => unreachable!("keyword table / keyword_kind out of sync"),
    }
}

pub struct Lexer<'a> {
    source: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    file: String,
    arena: &'a Arena,
}

impl<'a> Lexer<'a> {
    pub fn new(file: impl Into<String>, source: &'a [u8], arena: &'a Arena) -> Self {
        Lexer { source, pos: 0, line: 1, column: 1, file: file.into(), arena }
    }

    /// Tokenize the whole buffer, fusing `and then` / `or else` at the end.
    pub fn tokenize(mut self, diags: &mut Diagnostics) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token(diags);
            let is_eof = tok.is_eof();
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        fuse_compound_keywords(&mut tokens);
        tokens
    }

    fn loc(&self) -> Location {
        Location::new(self.file.clone(), self.line, self.column)
    }

    fn peek(&self) -> Option<u8> {
        self.source.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.source.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.advance();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self, diags: &mut Diagnostics) -> Token {
        self.skip_whitespace_and_comments();
        let start = self.loc();
        let Some(c) = self.peek() else {
            return Token { kind: TokenKind::Eof, location: start };
        };

        if c.is_ascii_alphabetic() {
            return self.lex_identifier_or_keyword(start);
        }
        if c.is_ascii_digit() {
            return self.lex_number(start, diags);
        }
        match c {
            b'\'' => self.lex_character_or_tick(start, diags),
            b'"' => self.lex_string(start, diags),
            _ => self.lex_delimiter(start, diags),
        }
    }

    fn lex_identifier_or_keyword(&mut self, start: Location) -> Token {
        let begin = self.pos;
        self.advance();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == b'_' {
                self.advance();
            } else {
                break;
            }
        }
        let text = &self.source[begin..self.pos];
        let kind = lookup_keyword(text).unwrap_or_else(|| {
            TokenKind::Identifier(self.arena.intern(std::str::from_utf8(text).unwrap_or("")))
        });
        Token { kind, location: start }
    }

    /// Numeric literal: decimal digits with optional `_`, optional
    /// `.`+digits for a real, optional exponent, and the based-literal
    /// forms `base#digits#` / `base:digits:`.
    fn lex_number(&mut self, start: Location, diags: &mut Diagnostics) -> Token {
        let mut digits: Vec<u8> = Vec::new();
        self.collect_digit_run(&mut digits);

        // based literal?
        if matches!(self.peek(), Some(b'#') | Some(b':')) {
            let delim = self.peek().unwrap();
            let base_text = String::from_utf8_lossy(&digits).into_owned();
            let base: u32 = base_text.parse().unwrap_or(0);
            if !(2..=16).contains(&base) {
                diags.report_error(start.clone(), format!("based literal base {} out of range 2..16", base));
                self.advance();
                return Token { kind: TokenKind::Error, location: start };
            }
            self.advance(); // consume delim
            let mut based_digits = Vec::new();
            let mut is_real = false;
            while let Some(c) = self.peek() {
                if c.is_ascii_hexdigit() || c == b'_' {
                    if c != b'_' {
                        based_digits.push(c);
                    }
                    self.advance();
                } else if c == b'.' {
                    is_real = true;
                    based_digits.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
            if self.peek() != Some(delim) {
                diags.report_error(self.loc(), "unterminated based literal");
                return Token { kind: TokenKind::Error, location: start };
            }
            self.advance(); // closing delim
            // Optional exponent.
            let mut exponent = 0i32;
            if matches!(self.peek(), Some(b'e') | Some(b'E')) {
                exponent = self.lex_exponent();
            }
            if is_real {
                let text = String::from_utf8_lossy(&based_digits).into_owned();
                let parts: Vec<&str> = text.splitn(2, '.').collect();
                let whole = crate::bigint::BigUInt::from_based_digits(parts[0].as_bytes(), base)
                    .map(|v| v.fits_in_i64(false).unwrap_or(0) as f64)
                    .unwrap_or(0.0);
                let frac_str = parts.get(1).copied().unwrap_or("");
                let mut frac = 0.0f64;
                let mut scale = 1.0f64 / base as f64;
                for &b in frac_str.as_bytes() {
                    if let Some(dv) = hex_digit_value(b) {
                        frac += dv as f64 * scale;
                        scale /= base as f64;
                    }
                }
                let value = (whole + frac) * 10f64.powi(exponent);
                return Token { kind: TokenKind::Real(value), location: start };
            }
            let mut value = crate::bigint::BigUInt::from_based_digits(&based_digits, base)
                .unwrap_or_else(crate::bigint::BigUInt::zero);
            for _ in 0..exponent {
                value = value.mul_small_add_small(base as u64, 0);
            }
            return int_token(value, start);
        }

        let mut is_real = false;
        if self.peek() == Some(b'.') && self.peek_at(1) != Some(b'.') && self.peek_at(1).map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_real = true;
            digits.push(b'.');
            self.advance();
            self.collect_digit_run(&mut digits);
        }
        let mut exponent = 0i32;
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            exponent = self.lex_exponent();
        }
        if is_real || exponent != 0 {
            let text = String::from_utf8_lossy(&digits).into_owned();
            let base_value: f64 = text.parse().unwrap_or(0.0);
            let value = base_value * 10f64.powi(exponent);
            return Token { kind: TokenKind::Real(value), location: start };
        }
        let value = crate::bigint::BigUInt::from_decimal_digits(&digits);
        int_token(value, start)
    }

    fn collect_digit_run(&mut self, out: &mut Vec<u8>) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                out.push(c);
                self.advance();
            } else if c == b'_' && self.peek_at(1).map(|d| d.is_ascii_digit()).unwrap_or(false) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn lex_exponent(&mut self) -> i32 {
        self.advance(); // e/E
        let negative = match self.peek() {
            Some(b'+') => { self.advance(); false }
            Some(b'-') => { self.advance(); true }
            _ => false,
        };
        let mut digits = Vec::new();
        self.collect_digit_run(&mut digits);
        let text = String::from_utf8_lossy(&digits).into_owned();
        let magnitude: i32 = text.parse().unwrap_or(0);
        if negative { -magnitude } else { magnitude }
    }

    /// `'c'` character literal, or a bare `'` used as the `Attribute` tick —
    /// disambiguated by the parser, not here: we always try a character
    /// literal first (needs a byte then a closing `'`), falling back to a
    /// lone `Apostrophe` token otherwise.
    fn lex_character_or_tick(&mut self, start: Location, diags: &mut Diagnostics) -> Token {
        // `''''` (quoted quote) and `'x'` are character literals; anything
        // else starting with `'` is the tick used before an attribute name.
        if self.peek_at(1).is_some() && self.peek_at(2) == Some(b'\'') {
            self.advance(); // opening '
            let ch = self.advance().unwrap();
            self.advance(); // closing '
            return Token { kind: TokenKind::Character(ch), location: start };
        }
        self.advance();
        let _ = diags;
        Token { kind: TokenKind::Apostrophe, location: start }
    }

    /// `"..."` with doubled `""` meaning a literal `"`.
    fn lex_string(&mut self, start: Location, diags: &mut Diagnostics) -> Token {
        self.advance(); // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.peek() {
                None => {
                    diags.report_error(start.clone(), "unterminated string literal");
                    return Token { kind: TokenKind::Error, location: start };
                }
                Some(b'"') => {
                    if self.peek_at(1) == Some(b'"') {
                        bytes.push(b'"');
                        self.advance();
                        self.advance();
                    } else {
                        self.advance();
                        break;
                    }
                }
                Some(b) => {
                    bytes.push(b);
                    self.advance();
                }
            }
        }
        let slice = self.arena.alloc_bytes(&bytes);
        Token { kind: TokenKind::String(crate::arena::Slice::from_bytes(slice)), location: start }
    }

    fn lex_delimiter(&mut self, start: Location, diags: &mut Diagnostics) -> Token {
        use TokenKind::*;
        let c = self.advance().unwrap();
        let kind = match c {
            b'&' => Ampersand,
            b'(' => LParen,
            b')' => RParen,
            b',' => Comma,
            b';' => Semicolon,
            b'|' => Bar,
            b'*' => {
                if self.peek() == Some(b'*') {
                    self.advance();
                    StarStar
                } else {
                    Star
                }
            }
            b'+' => Plus,
            b'-' => Minus,
            b'.' => {
                if self.peek() == Some(b'.') {
                    self.advance();
                    DotDot
                } else {
                    Dot
                }
            }
            b'/' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    SlashEqual
                } else {
                    Slash
                }
            }
            b':' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    Assign
                } else {
                    Colon
                }
            }
            b'<' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    LessEqual
                } else if self.peek() == Some(b'<') {
                    self.advance();
                    LessLess
                } else if self.peek() == Some(b'>') {
                    self.advance();
                    Box
                } else {
                    Less
                }
            }
            b'=' => {
                if self.peek() == Some(b'>') {
                    self.advance();
                    Arrow
                } else {
                    Equal
                }
            }
            b'>' => {
                if self.peek() == Some(b'=') {
                    self.advance();
                    GreaterEqual
                } else if self.peek() == Some(b'>') {
                    self.advance();
                    GreaterGreater
                } else {
                    Greater
                }
            }
            other => {
                diags.report_error(start.clone(), format!("unexpected character '{}'", other as char));
                Error
            }
        };
        Token { kind, location: start }
    }
}

fn int_token(value: BigUInt, location: Location) -> Token {
    match value.fits_in_i64(false) {
        Some(v) => Token { kind: TokenKind::Integer(v), location },
        None => Token { kind: TokenKind::BigInteger(value), location },
    }
}

fn hex_digit_value(b: u8) -> Option<u32> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as u32),
        b'a'..=b'f' => Some((b - b'a') as u32 + 10),
        b'A'..=b'F' => Some((b - b'A') as u32 + 10),
        _ => None,
    }
}

/// After emitting `and`/`or`, if the next token is `then`/`else`, rewrite
/// the previous token to the compound variant and drop the consumed one.
fn fuse_compound_keywords(tokens: &mut Vec<Token>) {
    let mut i = 0;
    while i + 1 < tokens.len() {
        let fused = match (&tokens[i].kind, &tokens[i + 1].kind) {
            (TokenKind::And, TokenKind::Then) => Some(TokenKind::AndThen),
            (TokenKind::Or, TokenKind::Else) => Some(TokenKind::OrElse),
            _ => None,
        };
        if let Some(kind) = fused {
            tokens[i].kind = kind;
            tokens.remove(i + 1);
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Token> {
        let arena = Arena::new();
        let mut diags = Diagnostics::new();
        let lexer = Lexer::new("t.ads", src.as_bytes(), &arena);
        lexer.tokenize(&mut diags)
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let t = toks("PROCEDURE Procedure procedure");
        assert!(t.iter().take(3).all(|t| matches!(t.kind, TokenKind::Procedure)));
    }

    #[test]
    fn and_then_or_else_fuse() {
        let t = toks("a and then b or else c");
        let kinds: Vec<_> = t.iter().map(|t| &t.kind).collect();
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::AndThen)));
        assert!(kinds.iter().any(|k| matches!(k, TokenKind::OrElse)));
    }

    #[test]
    fn based_literal_hex() {
        let t = toks("16#FF#");
        assert!(matches!(t[0].kind, TokenKind::Integer(255)));
    }

    #[test]
    fn compound_delimiters() {
        let t = toks(":= => .. << >> <> ** /= <= >=");
        let kinds: Vec<_> = t.iter().map(|t| t.kind.clone()).collect();
        use TokenKind::*;
        assert_eq!(
            kinds,
            vec![Assign, Arrow, DotDot, LessLess, GreaterGreater, Box, StarStar, SlashEqual, LessEqual, GreaterEqual, Eof]
        );
    }

    #[test]
    fn string_with_doubled_quote_escape() {
        let t = toks("\"he said \"\"hi\"\"\"");
        match &t[0].kind {
            TokenKind::String(s) => assert_eq!(s.as_str(), "he said \"hi\""),
            other => panic!("expected string, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_string_reports_error() {
        let arena = Arena::new();
        let mut diags = Diagnostics::new();
        let lexer = Lexer::new("t.ads", b"\"unterminated", &arena);
        let toks = lexer.tokenize(&mut diags);
        assert!(matches!(toks[0].kind, TokenKind::Error));
        assert!(diags.has_errors());
    }

    #[test]
    fn character_literal() {
        let t = toks("'x'");
        assert!(matches!(t[0].kind, TokenKind::Character(b'x')));
    }

    #[test]
    fn unexpected_character_does_not_panic() {
        let arena = Arena::new();
        let mut diags = Diagnostics::new();
        let lexer = Lexer::new("t.ads", b"@", &arena);
        let toks = lexer.tokenize(&mut diags);
        assert!(matches!(toks[0].kind, TokenKind::Error));
        assert!(diags.has_errors());
    }
}

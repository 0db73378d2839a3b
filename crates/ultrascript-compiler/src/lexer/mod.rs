//! Hand-written lexer (spec §4.1).
//!
//! Unlike the rest of this crate's teacher, this scanner is not built on
//! `logos`: disambiguating a leading `/` between "division" and "start of a
//! regex literal" needs to look at the *previous emitted token*, which a
//! generated DFA lexer cannot cheaply express. A plain `char`-position loop
//! keeps that one-token lookbehind trivial.

mod token;

pub use token::{SpannedToken, TemplatePart, TokenKind};

use ultrascript_sdk::{LexError, Span};

/// Tokenizes `source`, always terminating with a single `TokenKind::Eof`.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, LexError> {
    Lexer::new(source).run()
}

struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<SpannedToken>,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<SpannedToken>, LexError> {
        loop {
            self.skip_whitespace_and_comments()?;
            if self.pos >= self.bytes.len() {
                let span = Span::new(self.pos, self.pos, self.line, self.column);
                self.tokens.push(SpannedToken::new(TokenKind::Eof, span));
                return Ok(self.tokens);
            }
            let tok = self.next_token()?;
            self.tokens.push(tok);
        }
    }

    fn peek(&self) -> u8 {
        self.byte_at(self.pos)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.byte_at(self.pos + offset)
    }

    fn byte_at(&self, idx: usize) -> u8 {
        self.bytes.get(idx).copied().unwrap_or(0)
    }

    fn advance(&mut self) -> u8 {
        let b = self.peek();
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        b
    }

    fn source_line_excerpt(&self, line: u32) -> String {
        self.source
            .lines()
            .nth((line.saturating_sub(1)) as usize)
            .unwrap_or("")
            .to_string()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'/' if self.peek_at(1) == b'/' => {
                    while self.pos < self.bytes.len() && self.peek() != b'\n' {
                        self.advance();
                    }
                }
                b'/' if self.peek_at(1) == b'*' => {
                    let (start_line, start_col) = (self.line, self.column);
                    self.advance();
                    self.advance();
                    loop {
                        if self.pos >= self.bytes.len() {
                            return Err(LexError::Unterminated {
                                kind: "block comment",
                                line: start_line,
                                column: start_col,
                                source_line: self.source_line_excerpt(start_line),
                            });
                        }
                        if self.peek() == b'*' && self.peek_at(1) == b'/' {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, LexError> {
        let start = self.pos;
        let (line, column) = (self.line, self.column);
        let c = self.peek();

        let kind = match c {
            b'0'..=b'9' => self.lex_number(),
            b'\'' | b'"' => self.lex_string(c)?,
            b'`' => self.lex_template()?,
            b'/' if self.regex_allowed() => self.lex_regex(line, column)?,
            _ if is_ident_start(c) => self.lex_identifier_or_keyword(),
            _ => self.lex_operator(line, column)?,
        };

        let span = Span::new(start, self.pos, line, column);
        Ok(SpannedToken::new(kind, span))
    }

    /// Spec §4.1: a regex literal is only recognized when the previous
    /// token cannot legally be followed by a division operator.
    fn regex_allowed(&self) -> bool {
        match self.tokens.last() {
            None => true,
            Some(tok) => !tok.kind.ends_expression(),
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        let text = &self.source[start..self.pos];
        TokenKind::Number(text.parse().unwrap_or(0.0))
    }

    fn lex_string(&mut self, quote: u8) -> Result<TokenKind, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening quote
        let mut value = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError::Unterminated {
                    kind: "string",
                    line,
                    column,
                    source_line: self.source_line_excerpt(line),
                });
            }
            let b = self.peek();
            if b == quote {
                self.advance();
                break;
            }
            if b == b'\\' {
                self.advance();
                value.push(self.lex_escape());
                continue;
            }
            value.push(self.advance() as char);
        }
        Ok(TokenKind::String(value))
    }

    fn lex_escape(&mut self) -> char {
        let c = self.advance();
        match c {
            b'n' => '\n',
            b't' => '\t',
            b'r' => '\r',
            b'\\' => '\\',
            b'\'' => '\'',
            b'"' => '"',
            other => other as char,
        }
    }

    fn lex_template(&mut self) -> Result<TokenKind, LexError> {
        let (line, column) = (self.line, self.column);
        self.advance(); // opening backtick
        let mut parts = Vec::new();
        let mut current = String::new();
        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError::Unterminated {
                    kind: "template",
                    line,
                    column,
                    source_line: self.source_line_excerpt(line),
                });
            }
            let b = self.peek();
            if b == b'`' {
                self.advance();
                break;
            }
            if b == b'\\' {
                self.advance();
                current.push(self.lex_escape());
                continue;
            }
            if b == b'$' && self.peek_at(1) == b'{' {
                if !current.is_empty() {
                    parts.push(TemplatePart::String(std::mem::take(&mut current)));
                }
                self.advance();
                self.advance();
                let expr_start = self.pos;
                let mut depth = 1usize;
                while depth > 0 {
                    if self.pos >= self.bytes.len() {
                        return Err(LexError::Unterminated {
                            kind: "template",
                            line,
                            column,
                            source_line: self.source_line_excerpt(line),
                        });
                    }
                    match self.peek() {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        self.advance();
                    }
                }
                let expr_text = self.source[expr_start..self.pos].to_string();
                self.advance(); // closing `}`
                parts.push(TemplatePart::Expression(expr_text));
                continue;
            }
            current.push(self.advance() as char);
        }
        if !current.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::String(current));
        }
        Ok(TokenKind::Template(parts))
    }

    fn lex_regex(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        let start = self.pos;
        self.advance(); // opening '/'
        let pattern_start = self.pos;
        loop {
            if self.pos >= self.bytes.len() {
                return Err(LexError::Unterminated {
                    kind: "regex",
                    line,
                    column,
                    source_line: self.source_line_excerpt(line),
                });
            }
            match self.peek() {
                b'\n' => {
                    return Err(LexError::RegexEmbeddedNewline {
                        line,
                        column,
                        source_line: self.source_line_excerpt(line),
                    })
                }
                b'\\' => {
                    self.advance();
                    if self.pos < self.bytes.len() {
                        self.advance();
                    }
                }
                b'/' => break,
                _ => {
                    self.advance();
                }
            }
        }
        let pattern = self.source[pattern_start..self.pos].to_string();
        self.advance(); // closing '/'
        let flags_start = self.pos;
        while self.peek().is_ascii_alphabetic() {
            self.advance();
        }
        let flags = self.source[flags_start..self.pos].to_string();
        let _ = start;
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn lex_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while is_ident_continue(self.peek()) {
            self.advance();
        }
        let text = &self.source[start..self.pos];
        keyword_or_identifier(text)
    }

    fn lex_operator(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        let c = self.advance();
        use TokenKind::*;
        let kind = match c {
            b'+' => {
                if self.peek() == b'+' {
                    self.advance();
                    PlusPlus
                } else if self.peek() == b'=' {
                    self.advance();
                    PlusEqual
                } else {
                    Plus
                }
            }
            b'-' => {
                if self.peek() == b'-' {
                    self.advance();
                    MinusMinus
                } else if self.peek() == b'=' {
                    self.advance();
                    MinusEqual
                } else {
                    Minus
                }
            }
            b'*' => {
                if self.peek() == b'*' {
                    self.advance();
                    StarStar
                } else if self.peek() == b'=' {
                    self.advance();
                    StarEqual
                } else {
                    Star
                }
            }
            b'/' => {
                if self.peek() == b'=' {
                    self.advance();
                    SlashEqual
                } else {
                    Slash
                }
            }
            b'%' => Percent,
            b'!' => {
                if self.peek() == b'=' {
                    self.advance();
                    if self.peek() == b'=' {
                        self.advance();
                        BangEqualEqual
                    } else {
                        BangEqual
                    }
                } else {
                    Bang
                }
            }
            b'~' => Tilde,
            b'=' => {
                if self.peek() == b'=' {
                    self.advance();
                    if self.peek() == b'=' {
                        self.advance();
                        EqualEqualEqual
                    } else {
                        EqualEqual
                    }
                } else if self.peek() == b'>' {
                    self.advance();
                    Arrow
                } else {
                    Equal
                }
            }
            b'<' => {
                if self.peek() == b'=' {
                    self.advance();
                    LessEqual
                } else {
                    Less
                }
            }
            b'>' => {
                if self.peek() == b'=' {
                    self.advance();
                    GreaterEqual
                } else {
                    Greater
                }
            }
            b'&' => {
                if self.peek() == b'&' {
                    self.advance();
                    AmpAmp
                } else {
                    Amp
                }
            }
            b'|' => {
                if self.peek() == b'|' {
                    self.advance();
                    PipePipe
                } else {
                    Pipe
                }
            }
            b'^' => Caret,
            b'?' => Question,
            b':' => Colon,
            b'[' => {
                if self.peek() == b':' && self.peek_at(1) == b']' {
                    self.advance();
                    self.advance();
                    ColonColonBracket
                } else {
                    LeftBracket
                }
            }
            b']' => RightBracket,
            b'.' => {
                if self.peek() == b'.' && self.peek_at(1) == b'.' {
                    self.advance();
                    self.advance();
                    DotDotDot
                } else {
                    Dot
                }
            }
            b',' => Comma,
            b';' => Semicolon,
            b'(' => LeftParen,
            b')' => RightParen,
            b'{' => LeftBrace,
            b'}' => RightBrace,
            other => {
                return Err(LexError::UnexpectedCharacter {
                    character: other as char,
                    line,
                    column,
                    source_line: self.source_line_excerpt(line),
                })
            }
        };
        Ok(kind)
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn keyword_or_identifier(text: &str) -> TokenKind {
    use TokenKind::*;
    match text {
        "function" => Function,
        "go" => Go,
        "await" => Await,
        "let" => Let,
        "var" => Var,
        "const" => Const,
        "if" => If,
        "else" => Else,
        "for" => For,
        "each" => Each,
        "while" => While,
        "switch" => Switch,
        "case" => Case,
        "default" => Default,
        "break" => Break,
        "return" => Return,
        "import" => Import,
        "export" => Export,
        "from" => From,
        "as" => As,
        "class" => Class,
        "extends" => Extends,
        "super" => Super,
        "this" => This,
        "constructor" => Constructor,
        "public" => Public,
        "private" => Private,
        "protected" => Protected,
        "new" => New,
        "tensor" => Tensor,
        "operator" => Operator,
        "in" => In,
        "true" => True,
        "false" => False,
        other => Identifier(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn regex_vs_division() {
        // spec §8 scenario 6
        let ks = kinds("let x = 6 / 2 / 3;\nlet r = /abc/i;\n");
        let slash_count = ks.iter().filter(|k| matches!(k, TokenKind::Slash)).count();
        assert_eq!(slash_count, 2);
        assert!(ks
            .iter()
            .any(|k| matches!(k, TokenKind::Regex { pattern, flags } if pattern == "abc" && flags == "i")));
    }

    #[test]
    fn division_after_identifier() {
        let ks = kinds("a / b");
        assert_eq!(
            ks,
            vec![
                TokenKind::Identifier("a".into()),
                TokenKind::Slash,
                TokenKind::Identifier("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn compound_operators() {
        let ks = kinds("a += 1; a **= 2; a++ ; a-- ; a === b; a !== b;");
        assert!(ks.contains(&TokenKind::PlusEqual));
        assert!(ks.contains(&TokenKind::PlusPlus));
        assert!(ks.contains(&TokenKind::MinusMinus));
        assert!(ks.contains(&TokenKind::EqualEqualEqual));
        assert!(ks.contains(&TokenKind::BangEqualEqual));
    }

    #[test]
    fn slice_token() {
        let ks = kinds("a[:]");
        assert!(ks.contains(&TokenKind::ColonColonBracket));
    }

    #[test]
    fn unterminated_string_errors() {
        let err = tokenize("let x = \"unterminated").unwrap_err();
        matches!(err, LexError::Unterminated { .. });
    }

    #[test]
    fn unterminated_regex_newline() {
        let err = tokenize("x = (/abc\ndef/)").unwrap_err();
        matches!(err, LexError::RegexEmbeddedNewline { .. });
    }
}

//! Lexer for Ember
//!
//! Converts source code into a stream of tokens.

use crate::frontend::token::{Token, TokenKind};
use crate::utils::{FileId, SourceLoc};

/// The lexer state
pub struct Lexer {
    /// Source code as characters
    source: Vec<char>,
    /// Current position in source
    pos: usize,
    /// Current line (1-based)
    line: u32,
    /// Current column (1-based)
    column: u32,
    /// Location of the first character of the current token
    start: SourceLoc,
    /// File ID for location tracking
    file_id: FileId,
}

impl Lexer {
    /// Create a new lexer for the given source code
    pub fn new(source: &str, file_id: FileId) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            start: SourceLoc::new(file_id, 1, 1),
            file_id,
        }
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek_next(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume the next character if it matches
    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.source.len()
    }

    fn here(&self) -> SourceLoc {
        SourceLoc::new(self.file_id, self.line, self.column)
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.start)
    }

    /// Skip whitespace and comments
    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '/' if self.peek_next() == Some('*') => {
                    self.advance();
                    self.advance();
                    let mut depth = 1;
                    while depth > 0 && !self.is_at_end() {
                        match (self.peek(), self.peek_next()) {
                            (Some('*'), Some('/')) => {
                                self.advance();
                                self.advance();
                                depth -= 1;
                            }
                            (Some('/'), Some('*')) => {
                                self.advance();
                                self.advance();
                                depth += 1;
                            }
                            _ => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword_from_str(&text).unwrap_or(TokenKind::Ident(text));
        self.make_token(kind)
    }

    fn read_digits(&mut self, text: &mut String, radix: u32) {
        while let Some(c) = self.peek() {
            if c.is_digit(radix) {
                text.push(c);
                self.advance();
            } else if c == '_' {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read a number literal (integer or float)
    fn read_number(&mut self) -> Token {
        if self.peek() == Some('0') && matches!(self.peek_next(), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let mut text = String::new();
            self.read_digits(&mut text, 16);
            if text.is_empty() {
                return self.make_token(TokenKind::Unknown('x'));
            }
            return match u64::from_str_radix(&text, 16) {
                Ok(value) => self.make_token(TokenKind::IntLit(value)),
                Err(_) => self.make_token(TokenKind::OversizedInt(format!("0x{}", text))),
            };
        }

        let mut text = String::new();
        let mut is_float = false;
        self.read_digits(&mut text, 10);

        if self.peek() == Some('.') && self.peek_next().map_or(false, |c| c.is_ascii_digit()) {
            is_float = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text, 10);
        }

        if matches!(self.peek(), Some('e') | Some('E')) {
            is_float = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            self.read_digits(&mut text, 10);
        }

        if is_float {
            match text.parse() {
                Ok(value) => self.make_token(TokenKind::FloatLit(value)),
                Err(_) => self.make_token(TokenKind::Unknown('.')),
            }
        } else {
            match text.parse::<u64>() {
                Ok(value) => self.make_token(TokenKind::IntLit(value)),
                Err(_) => self.make_token(TokenKind::OversizedInt(text)),
            }
        }
    }

    fn read_escape(&mut self) -> char {
        match self.advance() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('0') => '\0',
            Some(c) => c,
            None => '\0',
        }
    }

    /// Read a string literal; the opening quote is the next character
    fn read_string(&mut self) -> String {
        self.advance();
        let mut value = String::new();
        while let Some(c) = self.peek() {
            match c {
                '"' => {
                    self.advance();
                    break;
                }
                '\\' => {
                    self.advance();
                    value.push(self.read_escape());
                }
                // Unterminated string
                '\n' => break,
                _ => {
                    value.push(c);
                    self.advance();
                }
            }
        }
        value
    }

    /// Read a character literal; the opening quote is the next character
    fn read_char(&mut self) -> char {
        self.advance();
        let c = match self.advance() {
            Some('\\') => self.read_escape(),
            Some(c) => c,
            None => '\0',
        };
        self.eat('\'');
        c
    }

    /// Get the next token
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.here();

        let Some(c) = self.peek() else {
            return Token::eof(self.start);
        };

        // Prefixed literals: c"..." and b'.'
        if c == 'c' && self.peek_next() == Some('"') {
            self.advance();
            let value = self.read_string();
            return self.make_token(TokenKind::CStringLit(value));
        }
        if c == 'b' && self.peek_next() == Some('\'') {
            self.advance();
            let value = self.read_char();
            return match u8::try_from(u32::from(value)) {
                Ok(byte) => self.make_token(TokenKind::ByteCharLit(byte)),
                Err(_) => self.make_token(TokenKind::Unknown(value)),
            };
        }

        if c.is_alphabetic() || c == '_' {
            return self.read_identifier();
        }
        if c.is_ascii_digit() {
            return self.read_number();
        }
        if c == '"' {
            let value = self.read_string();
            return self.make_token(TokenKind::StringLit(value));
        }
        if c == '\'' {
            let value = self.read_char();
            return self.make_token(TokenKind::CharLit(value));
        }

        self.advance();
        let kind = match c {
            '+' if self.eat('=') => TokenKind::PlusEq,
            '+' => TokenKind::Plus,
            '-' if self.eat('=') => TokenKind::MinusEq,
            '-' => TokenKind::Minus,
            '*' if self.eat('=') => TokenKind::StarEq,
            '*' => TokenKind::Star,
            '/' if self.eat('=') => TokenKind::SlashEq,
            '/' => TokenKind::Slash,
            '%' if self.eat('=') => TokenKind::PercentEq,
            '%' => TokenKind::Percent,
            '=' if self.eat('=') => TokenKind::EqEq,
            '=' => TokenKind::Eq,
            '!' if self.eat('=') => TokenKind::Ne,
            '!' => TokenKind::Not,
            '<' if self.eat('=') => TokenKind::Le,
            '<' if self.eat('<') => TokenKind::Shl,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' if self.eat('>') => TokenKind::Shr,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '&' => TokenKind::And,
            '|' if self.eat('|') => TokenKind::OrOr,
            '|' => TokenKind::Or,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '.' => TokenKind::Dot,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            _ => TokenKind::Unknown(c),
        };

        self.make_token(kind)
    }

    /// Tokenize the entire source and return all tokens
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source, FileId(0)).tokenize().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("def main(): void { }");
        assert!(matches!(tokens[0], TokenKind::Def));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "main"));
        assert!(matches!(tokens[2], TokenKind::LParen));
        assert!(matches!(tokens[3], TokenKind::RParen));
        assert!(matches!(tokens[4], TokenKind::Colon));
        assert!(matches!(tokens[5], TokenKind::Ident(ref s) if s == "void"));
        assert!(matches!(tokens[6], TokenKind::LBrace));
        assert!(matches!(tokens[7], TokenKind::RBrace));
        assert!(matches!(tokens[8], TokenKind::Eof));
    }

    #[test]
    fn test_numbers() {
        let tokens = kinds("42 3.14 0xFF_FF 1e3");
        assert!(matches!(tokens[0], TokenKind::IntLit(42)));
        assert!(matches!(tokens[1], TokenKind::FloatLit(f) if (f - 3.14).abs() < 0.001));
        assert!(matches!(tokens[2], TokenKind::IntLit(0xFFFF)));
        assert!(matches!(tokens[3], TokenKind::FloatLit(f) if (f - 1000.0).abs() < 0.001));
    }

    #[test]
    fn test_integer_literals_beyond_64_bits() {
        let tokens = kinds("9223372036854775808 18446744073709551616 0x1_0000_0000_0000_0000");
        assert!(matches!(tokens[0], TokenKind::IntLit(n) if n == 1 << 63));
        assert!(matches!(tokens[1], TokenKind::OversizedInt(ref s) if s == "18446744073709551616"));
        assert!(matches!(tokens[2], TokenKind::OversizedInt(ref s) if s == "0x10000000000000000"));
    }

    #[test]
    fn test_string_and_char_literals() {
        let tokens = kinds(r#""hello\nworld" c"raw" 'a' b'z' '\n'"#);
        assert!(matches!(tokens[0], TokenKind::StringLit(ref s) if s == "hello\nworld"));
        assert!(matches!(tokens[1], TokenKind::CStringLit(ref s) if s == "raw"));
        assert!(matches!(tokens[2], TokenKind::CharLit('a')));
        assert!(matches!(tokens[3], TokenKind::ByteCharLit(b'z')));
        assert!(matches!(tokens[4], TokenKind::CharLit('\n')));
    }

    #[test]
    fn test_keywords() {
        let tokens = kinds("let var mut copy ref view import module package none inline");
        assert_eq!(
            tokens,
            vec![
                TokenKind::Let,
                TokenKind::Var,
                TokenKind::Mut,
                TokenKind::Copy,
                TokenKind::Ref,
                TokenKind::View,
                TokenKind::Import,
                TokenKind::Module,
                TokenKind::Package,
                TokenKind::None,
                TokenKind::Inline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_compound_operators() {
        let tokens = kinds("+= %= << >= != && ||");
        assert_eq!(
            tokens,
            vec![
                TokenKind::PlusEq,
                TokenKind::PercentEq,
                TokenKind::Shl,
                TokenKind::Ge,
                TokenKind::Ne,
                TokenKind::AndAnd,
                TokenKind::OrOr,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_locations_track_lines() {
        let tokens = Lexer::new("def\n  // note\n  x", FileId(3)).tokenize();
        assert_eq!(tokens[0].loc, SourceLoc::new(FileId(3), 1, 1));
        assert_eq!(tokens[1].loc, SourceLoc::new(FileId(3), 3, 3));
    }
}

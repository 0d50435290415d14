//! Token definitions for Ember

use crate::utils::SourceLoc;

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: SourceLoc,
}

impl Token {
    pub fn new(kind: TokenKind, loc: SourceLoc) -> Self {
        Self { kind, loc }
    }

    pub fn eof(loc: SourceLoc) -> Self {
        Self { kind: TokenKind::Eof, loc }
    }
}

/// Token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ============ Keywords ============
    /// def
    Def,
    /// inline
    Inline,
    /// let
    Let,
    /// var
    Var,
    /// mut
    Mut,
    /// if
    If,
    /// else
    Else,
    /// while
    While,
    /// for
    For,
    /// in
    In,
    /// return
    Return,
    /// import
    Import,
    /// module
    Module,
    /// type (alias declaration)
    Type,
    /// package
    Package,
    /// copy (parameter pass mode)
    Copy,
    /// ref (parameter pass mode)
    Ref,
    /// view (parameter pass mode)
    View,
    /// as (cast)
    As,
    /// true
    True,
    /// false
    False,
    /// none
    None,

    // ============ Identifiers and Literals ============
    /// Identifier (variable name, function name, type name)
    Ident(String),
    /// Integer literal magnitude; the parser applies the sign
    IntLit(u64),
    /// Integer literal that does not fit in 64 bits
    OversizedInt(String),
    /// Floating-point literal
    FloatLit(f64),
    /// String literal
    StringLit(String),
    /// C string literal (c"...")
    CStringLit(String),
    /// Character literal
    CharLit(char),
    /// Byte character literal (b'x')
    ByteCharLit(u8),

    // ============ Operators ============
    /// +
    Plus,
    /// -
    Minus,
    /// *
    Star,
    /// /
    Slash,
    /// %
    Percent,
    /// =
    Eq,
    /// ==
    EqEq,
    /// !=
    Ne,
    /// <
    Lt,
    /// <=
    Le,
    /// >
    Gt,
    /// >=
    Ge,
    /// &&
    AndAnd,
    /// ||
    OrOr,
    /// !
    Not,
    /// &
    And,
    /// |
    Or,
    /// ^
    Caret,
    /// ~
    Tilde,
    /// <<
    Shl,
    /// >>
    Shr,
    /// +=
    PlusEq,
    /// -=
    MinusEq,
    /// *=
    StarEq,
    /// /=
    SlashEq,
    /// %=
    PercentEq,
    /// .
    Dot,

    // ============ Delimiters ============
    /// (
    LParen,
    /// )
    RParen,
    /// {
    LBrace,
    /// }
    RBrace,
    /// [
    LBracket,
    /// ]
    RBracket,
    /// ,
    Comma,
    /// :
    Colon,
    /// ;
    Semicolon,

    // ============ Special ============
    /// End of file
    Eof,
    /// Unknown/invalid character
    Unknown(char),
}

impl TokenKind {
    /// Try to convert an identifier to a keyword
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s {
            "def" => Some(TokenKind::Def),
            "inline" => Some(TokenKind::Inline),
            "let" => Some(TokenKind::Let),
            "var" => Some(TokenKind::Var),
            "mut" => Some(TokenKind::Mut),
            "if" => Some(TokenKind::If),
            "else" => Some(TokenKind::Else),
            "while" => Some(TokenKind::While),
            "for" => Some(TokenKind::For),
            "in" => Some(TokenKind::In),
            "return" => Some(TokenKind::Return),
            "import" => Some(TokenKind::Import),
            "module" => Some(TokenKind::Module),
            "type" => Some(TokenKind::Type),
            "package" => Some(TokenKind::Package),
            "copy" => Some(TokenKind::Copy),
            "ref" => Some(TokenKind::Ref),
            "view" => Some(TokenKind::View),
            "as" => Some(TokenKind::As),
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "none" => Some(TokenKind::None),
            _ => None,
        }
    }

    /// Get the precedence of a binary operator (for Pratt parsing)
    /// Returns None if not a binary operator
    pub fn binary_precedence(&self) -> Option<u8> {
        match self {
            // Assignment (lowest)
            TokenKind::Eq
            | TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::PercentEq => Some(1),

            TokenKind::OrOr => Some(2),
            TokenKind::AndAnd => Some(3),
            TokenKind::Or => Some(4),
            TokenKind::Caret => Some(5),
            TokenKind::And => Some(6),
            TokenKind::EqEq | TokenKind::Ne => Some(7),
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => Some(8),
            TokenKind::Shl | TokenKind::Shr => Some(9),
            TokenKind::Plus | TokenKind::Minus => Some(10),
            TokenKind::Star | TokenKind::Slash | TokenKind::Percent => Some(11),

            // Cast (as) - binds tighter than multiplication
            TokenKind::As => Some(12),

            _ => None,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::PlusEq
                | TokenKind::MinusEq
                | TokenKind::StarEq
                | TokenKind::SlashEq
                | TokenKind::PercentEq
        )
    }
}

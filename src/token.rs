use std::{fmt, ops::Range};

#[derive(Copy, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    lo: usize,
    len: u32,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span, pos: Pos) -> Token {
        Token {
            kind,
            len: span.len,
            lo: span.lo,
            pos,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            len: self.len,
            lo: self.lo,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?}, {} @ {})", self.kind, self.span(), self.pos)
    }
}

/// A line and column pair, both starting at 1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
}

impl Pos {
    pub const START: Pos = Pos { line: 1, col: 1 };
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub len: u32,
    pub lo: usize,
}

impl Span {
    pub fn new_of_bounds(Range { start: lo, end: hi }: Range<usize>) -> Span {
        debug_assert!(hi >= lo);
        let len = u32::try_from(hi - lo).unwrap_or(u32::MAX);
        Self::new_of_length(lo, len)
    }

    pub fn new_of_length(lo: usize, len: u32) -> Span {
        Span { len, lo }
    }

    pub fn hi(self) -> usize {
        self.lo + self.len as usize
    }

    /// Returns the smallest span that covers both spans.
    pub fn to(self, other: Span) -> Span {
        Span::new_of_bounds(self.lo.min(other.lo)..self.hi().max(other.hi()))
    }

    /// Shrinks (or grows) the span on both ends.
    pub fn offset(self, lo: isize, hi: isize) -> Span {
        let new_lo = self.lo.saturating_add_signed(lo);
        let new_hi = self.hi().saturating_add_signed(hi).max(new_lo);
        Span::new_of_bounds(new_lo..new_hi)
    }

    pub fn substr(self, src: &str) -> &str {
        &src[self.lo..self.hi()]
    }

    pub fn wrap<T>(self, inner: T) -> Spanned<T> {
        Spanned { span: self, inner }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Span({self}, len: {})", self.len)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lo = self.lo;
        let hi = self.hi();
        write!(f, "{lo}..{hi}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub inner: T,
}

/// Maps byte offsets back to line and column positions.
///
/// The lexer already records a [`Pos`] for every token; this is used when
/// rendering diagnostics, which only carry spans.
pub struct Lines {
    starts: Vec<usize>,
}

impl Lines {
    pub fn new(src: &str) -> Lines {
        let starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Lines { starts }
    }

    pub fn pos(&self, offset: usize) -> Pos {
        let line = match self.starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let col = offset - self.starts[line];
        Pos {
            line: u32::try_from(line + 1).unwrap_or(u32::MAX),
            col: u32::try_from(col + 1).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Account,
    Assert,
    Bool,
    Break,
    Byte,
    Case,
    Const,
    Continue,
    Contract,
    Create,
    Default,
    Delete,
    Double,
    Drop,
    Else,
    Enum,
    False,
    Float,
    For,
    Func,
    Goto,
    If,
    Implements,
    Import,
    In,
    Insert,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Interface,
    Library,
    Map,
    New,
    Null,
    Payable,
    Public,
    Readonly,
    Return,
    Select,
    String,
    Struct,
    Switch,
    True,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Update,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Shl,
    Shr,
    PlusPlus,
    MinusMinus,
    /// `=`
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    PercentEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    Question,
    Colon,
    Semicolon,
    Comma,
    Dot,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,

    Identifier,
    DecLit,
    OctLit,
    HexLit,
    FloatLit,
    /// A quoted string. Escape sequences are kept raw.
    StrLit,

    Whitespace,
    LineComment,
    BlockComment,
    Eof,

    ErrorUnexpectedChar,
    ErrorUnclosedString,
    ErrorUnescapedLineBreak,
    ErrorUnclosedComment,
}

impl TokenKind {
    pub fn is_error(self) -> bool {
        matches!(
            self,
            TokenKind::ErrorUnexpectedChar
                | TokenKind::ErrorUnclosedString
                | TokenKind::ErrorUnescapedLineBreak
                | TokenKind::ErrorUnclosedComment
        )
    }

    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }

    /// Whether this token starts a type name.
    pub fn is_primitive_type(self) -> bool {
        use TokenKind::*;
        matches!(
            self,
            Account
                | Bool
                | Byte
                | Double
                | Float
                | Int
                | Int8
                | Int16
                | Int32
                | Int64
                | String
                | Uint
                | Uint8
                | Uint16
                | Uint32
                | Uint64
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use TokenKind::*;
        if let Some((kw, _)) = KEYWORDS.entries().find(|(_, kind)| **kind == *self) {
            return write!(f, "`{kw}`");
        }
        let s = match self {
            Plus => "`+`",
            Minus => "`-`",
            Star => "`*`",
            Slash => "`/`",
            Percent => "`%`",
            Amp => "`&`",
            Pipe => "`|`",
            Caret => "`^`",
            Tilde => "`~`",
            Bang => "`!`",
            Less => "`<`",
            LessEq => "`<=`",
            Greater => "`>`",
            GreaterEq => "`>=`",
            EqEq => "`==`",
            NotEq => "`!=`",
            AndAnd => "`&&`",
            OrOr => "`||`",
            Shl => "`<<`",
            Shr => "`>>`",
            PlusPlus => "`++`",
            MinusMinus => "`--`",
            Assign => "`=`",
            PlusEq => "`+=`",
            MinusEq => "`-=`",
            StarEq => "`*=`",
            SlashEq => "`/=`",
            PercentEq => "`%=`",
            AmpEq => "`&=`",
            PipeEq => "`|=`",
            CaretEq => "`^=`",
            ShlEq => "`<<=`",
            ShrEq => "`>>=`",
            Question => "`?`",
            Colon => "`:`",
            Semicolon => "`;`",
            Comma => "`,`",
            Dot => "`.`",
            LParen => "`(`",
            RParen => "`)`",
            LBrace => "`{`",
            RBrace => "`}`",
            LBracket => "`[`",
            RBracket => "`]`",
            Identifier => "identifier",
            DecLit | OctLit | HexLit => "integer",
            FloatLit => "float",
            StrLit => "string",
            Whitespace => "whitespace",
            LineComment | BlockComment => "comment",
            Eof => "end of file",
            ErrorUnexpectedChar => "unexpected character",
            ErrorUnclosedString => "unclosed string",
            ErrorUnescapedLineBreak => "unescaped line break",
            ErrorUnclosedComment => "unclosed comment",
            _ => "keyword",
        };
        f.write_str(s)
    }
}

pub static KEYWORDS: phf::Map<&'static str, TokenKind> = phf::phf_map! {
    "account" => TokenKind::Account,
    "assert" => TokenKind::Assert,
    "bool" => TokenKind::Bool,
    "break" => TokenKind::Break,
    "byte" => TokenKind::Byte,
    "case" => TokenKind::Case,
    "const" => TokenKind::Const,
    "continue" => TokenKind::Continue,
    "contract" => TokenKind::Contract,
    "create" => TokenKind::Create,
    "default" => TokenKind::Default,
    "delete" => TokenKind::Delete,
    "double" => TokenKind::Double,
    "drop" => TokenKind::Drop,
    "else" => TokenKind::Else,
    "enum" => TokenKind::Enum,
    "false" => TokenKind::False,
    "float" => TokenKind::Float,
    "for" => TokenKind::For,
    "func" => TokenKind::Func,
    "goto" => TokenKind::Goto,
    "if" => TokenKind::If,
    "implements" => TokenKind::Implements,
    "import" => TokenKind::Import,
    "in" => TokenKind::In,
    "insert" => TokenKind::Insert,
    "int" => TokenKind::Int,
    "int8" => TokenKind::Int8,
    "int16" => TokenKind::Int16,
    "int32" => TokenKind::Int32,
    "int64" => TokenKind::Int64,
    "interface" => TokenKind::Interface,
    "library" => TokenKind::Library,
    "map" => TokenKind::Map,
    "new" => TokenKind::New,
    "null" => TokenKind::Null,
    "payable" => TokenKind::Payable,
    "public" => TokenKind::Public,
    "readonly" => TokenKind::Readonly,
    "return" => TokenKind::Return,
    "select" => TokenKind::Select,
    "string" => TokenKind::String,
    "struct" => TokenKind::Struct,
    "switch" => TokenKind::Switch,
    "true" => TokenKind::True,
    "uint" => TokenKind::Uint,
    "uint8" => TokenKind::Uint8,
    "uint16" => TokenKind::Uint16,
    "uint32" => TokenKind::Uint32,
    "uint64" => TokenKind::Uint64,
    "update" => TokenKind::Update,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_map_offsets() {
        let lines = Lines::new("ab\ncd\n\nx");
        assert_eq!(lines.pos(0), Pos { line: 1, col: 1 });
        assert_eq!(lines.pos(2), Pos { line: 1, col: 3 });
        assert_eq!(lines.pos(3), Pos { line: 2, col: 1 });
        assert_eq!(lines.pos(6), Pos { line: 3, col: 1 });
        assert_eq!(lines.pos(7), Pos { line: 4, col: 1 });
    }

    #[test]
    fn span_helpers() {
        let a = Span::new_of_bounds(2..5);
        let b = Span::new_of_bounds(7..9);
        assert_eq!(a.to(b), Span::new_of_bounds(2..9));
        assert_eq!(b.to(a), Span::new_of_bounds(2..9));
        assert_eq!(Span::new_of_bounds(0..6).offset(1, -1), Span::new_of_bounds(1..5));
        assert_eq!(Span::new_of_bounds(3..6).substr("abcdefg"), "def");
    }
}

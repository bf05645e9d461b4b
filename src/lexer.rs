use std::{
    borrow::Cow,
    iter::Peekable,
    num::{ParseFloatError, ParseIntError},
};

use tracing::trace;

use crate::token::{Pos, Span, Token, TokenKind, KEYWORDS};

pub const SUGGESTED_TOKENS_CAPACITY: usize = 8_192;

/// Tokenizes `src` into `tokens`, which must be empty.
pub fn lex(src: &str, tokens: &mut Vec<Token>) {
    Lexer::new(src, tokens).lex();
    trace!(count = tokens.len(), "lexed source");
}

/// Like [`lex`], with a fresh buffer.
pub fn lex_in_new(src: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(SUGGESTED_TOKENS_CAPACITY);
    lex(src, &mut tokens);
    tokens
}

struct Lexer<'src, 'tok> {
    src: &'src str,
    iter: Peekable<std::str::Chars<'src>>,
    cursor: usize,
    pos: Pos,
    current_lo: usize,
    current_pos: Pos,
    tokens: &'tok mut Vec<Token>,
}

impl Lexer<'_, '_> {
    /// Runs until the end of the source. The final token is always
    /// [`TokenKind::Eof`].
    fn lex(mut self) {
        assert_eq!(self.tokens.len(), 0, "must pass clean tokens buffer");
        loop {
            let next = self.scan_token_kind();
            let is_eof = matches!(next, TokenKind::Eof);
            self.produce(next);
            if is_eof {
                break;
            }
        }
    }

    /// Scans one token starting at the cursor.
    fn scan_token_kind(&mut self) -> TokenKind {
        use TokenKind::*;
        match self.mark_advance() {
            '\0' => Eof,
            '+' => match self.peek() {
                '+' => self.advance_with(PlusPlus),
                '=' => self.advance_with(PlusEq),
                _ => Plus,
            },
            '-' => match self.peek() {
                '-' => self.advance_with(MinusMinus),
                '=' => self.advance_with(MinusEq),
                _ => Minus,
            },
            '*' => match self.peek() {
                '=' => self.advance_with(StarEq),
                _ => Star,
            },
            '/' => match self.peek() {
                '/' => self.line_comment(),
                '*' => self.block_comment(),
                '=' => self.advance_with(SlashEq),
                _ => Slash,
            },
            '%' => match self.peek() {
                '=' => self.advance_with(PercentEq),
                _ => Percent,
            },
            '&' => match self.peek() {
                '&' => self.advance_with(AndAnd),
                '=' => self.advance_with(AmpEq),
                _ => Amp,
            },
            '|' => match self.peek() {
                '|' => self.advance_with(OrOr),
                '=' => self.advance_with(PipeEq),
                _ => Pipe,
            },
            '^' => match self.peek() {
                '=' => self.advance_with(CaretEq),
                _ => Caret,
            },
            '<' => match self.peek() {
                '<' => {
                    self.advance();
                    match self.peek() {
                        '=' => self.advance_with(ShlEq),
                        _ => Shl,
                    }
                }
                '=' => self.advance_with(LessEq),
                _ => Less,
            },
            '>' => match self.peek() {
                '>' => {
                    self.advance();
                    match self.peek() {
                        '=' => self.advance_with(ShrEq),
                        _ => Shr,
                    }
                }
                '=' => self.advance_with(GreaterEq),
                _ => Greater,
            },
            '=' => match self.peek() {
                '=' => self.advance_with(EqEq),
                _ => Assign,
            },
            '!' => match self.peek() {
                '=' => self.advance_with(NotEq),
                _ => Bang,
            },
            '~' => Tilde,
            '?' => Question,
            ':' => Colon,
            ';' => Semicolon,
            ',' => Comma,
            '.' => Dot,
            '(' => LParen,
            ')' => RParen,
            '{' => LBrace,
            '}' => RBrace,
            '[' => LBracket,
            ']' => RBracket,
            '"' => self.string(),
            c if c.is_ascii_alphabetic() || c == '_' => self.identifier_or_keyword(),
            c if c.is_ascii_digit() => self.number(c),
            c if c.is_ascii_whitespace() => self.whitespace(),
            _ => ErrorUnexpectedChar,
        }
    }

    /// Lexes a string token.
    ///
    /// Escape sequences are validated for termination only; decoding them is
    /// left to whoever materializes the literal (see [`unescape`]).
    fn string(&mut self) -> TokenKind {
        let mut is_escaping = false;
        loop {
            let (current, current_span, current_pos) = self.advance_with_span();
            match (is_escaping, current) {
                (_, '\0') => return TokenKind::ErrorUnclosedString,
                (false, '"') => return TokenKind::StrLit,
                // Keep scanning so that the rest of the string is not lexed as
                // code.
                (false, '\n') => {
                    self.produce_spanned(TokenKind::ErrorUnescapedLineBreak, current_span, current_pos);
                }
                (false, '\\') => is_escaping = true,
                (_, _) => is_escaping = false,
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> TokenKind {
        let valid_identifier_suffix = |c: char| c.is_ascii_alphanumeric() || c == '_';
        while valid_identifier_suffix(self.peek()) {
            self.advance();
        }
        KEYWORDS
            .get(self.substr())
            .copied()
            .unwrap_or(TokenKind::Identifier)
    }

    fn number(&mut self, first: char) -> TokenKind {
        if first == '0' && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            return TokenKind::HexLit;
        }
        while self.peek().is_ascii_digit() {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == '.' && self.peek_second().is_ascii_digit() {
            is_float = true;
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }
        if matches!(self.peek(), 'e' | 'E') {
            let sign = matches!(self.peek_second(), '+' | '-');
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_nth(digit_at).is_ascii_digit() {
                is_float = true;
                for _ in 0..=digit_at {
                    self.advance();
                }
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
            }
        }
        if is_float {
            TokenKind::FloatLit
        } else if first == '0' && self.cursor - self.current_lo > 1 {
            TokenKind::OctLit
        } else {
            TokenKind::DecLit
        }
    }

    fn whitespace(&mut self) -> TokenKind {
        while self.peek().is_ascii_whitespace() {
            self.advance();
        }
        TokenKind::Whitespace
    }

    fn line_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), '/');
        while !matches!(self.peek(), '\n' | '\0') {
            self.advance();
        }
        TokenKind::LineComment
    }

    fn block_comment(&mut self) -> TokenKind {
        assert_eq!(self.advance(), '*');
        loop {
            match self.advance() {
                '*' => (),
                '\0' => return TokenKind::ErrorUnclosedComment,
                _ => continue,
            }
            match self.peek() {
                '/' => {
                    self.advance();
                    break;
                }
                '\0' => return TokenKind::ErrorUnclosedComment,
                _ => continue,
            }
        }
        TokenKind::BlockComment
    }
}

impl Lexer<'_, '_> {
    fn new<'src, 'tok>(src: &'src str, tokens: &'tok mut Vec<Token>) -> Lexer<'src, 'tok> {
        Lexer {
            src,
            iter: src.chars().peekable(),
            cursor: 0,
            pos: Pos::START,
            current_lo: 0,
            current_pos: Pos::START,
            tokens,
        }
    }

    /// Marks the start of a token and consumes its first character.
    fn mark_advance(&mut self) -> char {
        self.current_lo = self.cursor;
        self.current_pos = self.pos;
        self.advance()
    }

    /// Returns the next character and advances the iterator, keeping track of
    /// the current line and column.
    fn advance(&mut self) -> char {
        let Some(c) = self.iter.next() else {
            return '\0';
        };
        self.cursor += c.len_utf8();
        if c == '\n' {
            self.pos.line += 1;
            self.pos.col = 1;
        } else {
            self.pos.col += 1;
        }
        c
    }

    fn advance_with<T>(&mut self, value: T) -> T {
        self.advance();
        value
    }

    /// Returns the next character (with its span and position) and advances
    /// the iterator.
    fn advance_with_span(&mut self) -> (char, Span, Pos) {
        let lo = self.cursor;
        let pos = self.pos;
        let char = self.advance();
        let hi = lo + char.len_utf8();
        (char, Span::new_of_bounds(lo..hi), pos)
    }

    /// Returns the next character without advancing the iterator.
    fn peek(&mut self) -> char {
        self.iter.peek().copied().unwrap_or('\0')
    }

    fn peek_second(&self) -> char {
        self.peek_nth(1)
    }

    fn peek_nth(&self, n: usize) -> char {
        self.src[self.cursor..].chars().nth(n).unwrap_or('\0')
    }

    fn span(&self) -> Span {
        Span::new_of_bounds(self.current_lo..self.cursor)
    }

    /// Source text of the token being scanned.
    fn substr(&self) -> &str {
        self.span().substr(self.src)
    }

    /// Pushes a token spanning from the mark to the cursor.
    fn produce(&mut self, kind: TokenKind) {
        self.produce_spanned(kind, self.span(), self.current_pos);
    }

    fn produce_spanned(&mut self, kind: TokenKind, span: Span, pos: Pos) {
        self.tokens.push(Token::new(kind, span, pos));
    }
}

pub mod extract {
    use super::*;

    pub fn int(token: Token, src: &str) -> Result<i128, ParseIntError> {
        let s = token.span().substr(src);
        match token.kind {
            TokenKind::HexLit => i128::from_str_radix(&s[2..], 16),
            TokenKind::OctLit => i128::from_str_radix(&s[1..], 8),
            kind => {
                debug_assert_eq!(kind, TokenKind::DecLit);
                s.parse()
            }
        }
    }

    pub fn float(token: Token, src: &str) -> Result<f64, ParseFloatError> {
        debug_assert_eq!(token.kind, TokenKind::FloatLit);
        token.span().substr(src).parse()
    }

    pub fn ident(token: Token, src: &str) -> &str {
        debug_assert_eq!(token.kind, TokenKind::Identifier);
        token.span().substr(src)
    }

    /// Returns the raw contents of a string token, without the quotes.
    pub fn string(token: Token, src: &str) -> &str {
        debug_assert_eq!(token.kind, TokenKind::StrLit);
        token.span().offset(1, -1).substr(src)
    }
}

/// Decodes the escape sequences of a raw string literal.
///
/// Only allocates if the literal has at least one escape sequence.
pub fn unescape(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }
    let mut buf = String::with_capacity(raw.len());
    let mut escaped = false;
    for char in raw.chars() {
        let char = match (escaped, char) {
            (true, '0') => '\0',
            (true, 'b') => '\x08',
            (true, 't') => '\t',
            (true, 'n') => '\n',
            (true, 'f') => '\x0c',
            (true, 'r') => '\r',
            (false, '\\') => {
                escaped = true;
                continue;
            }
            (_, char) => char,
        };
        escaped = false;
        buf.push(char);
    }
    Cow::Owned(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn tests_with_span() {
        use TokenKind::*;
        let cases = cases!(match .. {
            "+-*/%" => [
                (Plus, 0..1),
                (Minus, 1..2),
                (Star, 2..3),
                (Slash, 3..4),
                (Percent, 4..5),
                (Eof, 5..5),
            ],
            "a+=b<<=c>>d" => [
                (Identifier, 0..1),
                (PlusEq, 1..3),
                (Identifier, 3..4),
                (ShlEq, 4..7),
                (Identifier, 7..8),
                (Shr, 8..10),
                (Identifier, 10..11),
                (Eof, 11..11),
            ],
            "i++ --j !x != y && z || w" => [
                (Identifier, 0..1),
                (PlusPlus, 1..3),
                (Whitespace, 3..4),
                (MinusMinus, 4..6),
                (Identifier, 6..7),
                (Whitespace, 7..8),
                (Bang, 8..9),
                (Identifier, 9..10),
                (Whitespace, 10..11),
                (NotEq, 11..13),
                (Whitespace, 13..14),
                (Identifier, 14..15),
                (Whitespace, 15..16),
                (AndAnd, 16..18),
                (Whitespace, 18..19),
                (Identifier, 19..20),
                (Whitespace, 20..21),
                (OrOr, 21..23),
                (Whitespace, 23..24),
                (Identifier, 24..25),
                (Eof, 25..25),
            ],
            "contract Contract _x int64 uint" => [
                (Contract, 0..8),
                (Whitespace, 8..9),
                (Identifier, 9..17),
                (Whitespace, 17..18),
                (Identifier, 18..20),
                (Whitespace, 20..21),
                (Int64, 21..26),
                (Whitespace, 26..27),
                (Uint, 27..31),
                (Eof, 31..31),
            ],
            "1 0x1F 017 1.5 2e3 7.e" => [
                (DecLit, 0..1),
                (Whitespace, 1..2),
                (HexLit, 2..6),
                (Whitespace, 6..7),
                (OctLit, 7..10),
                (Whitespace, 10..11),
                (FloatLit, 11..14),
                (Whitespace, 14..15),
                (FloatLit, 15..18),
                (Whitespace, 18..19),
                (DecLit, 19..20),
                (Dot, 20..21),
                (Identifier, 21..22),
                (Eof, 22..22),
            ],
            r#"""/"hi there"/"oi"# => [
                (StrLit, 0..2),
                (Slash, 2..3),
                (StrLit, 3..13),
                (Slash, 13..14),
                (ErrorUnclosedString, 14..17),
                (Eof, 17..17),
            ],
            r#"("\"")("\\")"# => [
                (LParen, 0..1),
                (StrLit, 1..5),
                (RParen, 5..6),
                (LParen, 6..7),
                (StrLit, 7..11),
                (RParen, 11..12),
                (Eof, 12..12),
            ],
            "\"won't\nwork\"" => [
                (ErrorUnescapedLineBreak, 6..7),
                (StrLit, 0..12),
                (Eof, 12..12),
            ],
            "a /* b\n c */ 1 // tail" => [
                (Identifier, 0..1),
                (Whitespace, 1..2),
                (BlockComment, 2..12),
                (Whitespace, 12..13),
                (DecLit, 13..14),
                (Whitespace, 14..15),
                (LineComment, 15..22),
                (Eof, 22..22),
            ],
            "/* unclosed" => [(ErrorUnclosedComment, 0..11), (Eof, 11..11)],
            "a @ b" => [
                (Identifier, 0..1),
                (Whitespace, 1..2),
                (ErrorUnexpectedChar, 2..3),
                (Whitespace, 3..4),
                (Identifier, 4..5),
                (Eof, 5..5),
            ],
        });

        for (input, expected) in cases {
            let lexed: Vec<_> = lex_in_new(input)
                .into_iter()
                .map(|t| (t.kind, t.span()))
                .collect();
            assert_eq!(&lexed, expected, "input: {input:?}");
        }
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tokens = lex_in_new("contract A {\n  int x;\n}");
        let positions: Vec<_> = tokens
            .iter()
            .filter(|t| !t.kind.is_trivia())
            .map(|t| (t.kind, t.pos.line, t.pos.col))
            .collect();
        assert_eq!(
            positions,
            [
                (TokenKind::Contract, 1, 1),
                (TokenKind::Identifier, 1, 10),
                (TokenKind::LBrace, 1, 12),
                (TokenKind::Int, 2, 3),
                (TokenKind::Identifier, 2, 7),
                (TokenKind::Semicolon, 2, 8),
                (TokenKind::RBrace, 3, 1),
                (TokenKind::Eof, 3, 2),
            ]
        );
    }

    #[test]
    fn extracts_literals() {
        let src = "42 0x2A 052 2.5 \"a\\tb\"";
        let tokens: Vec<_> = lex_in_new(src)
            .into_iter()
            .filter(|t| !t.kind.is_trivia() && !t.is_eof())
            .collect();
        assert_eq!(extract::int(tokens[0], src), Ok(42));
        assert_eq!(extract::int(tokens[1], src), Ok(42));
        assert_eq!(extract::int(tokens[2], src), Ok(42));
        assert_eq!(extract::float(tokens[3], src), Ok(2.5));
        assert_eq!(extract::string(tokens[4], src), "a\\tb");
        assert_eq!(unescape(extract::string(tokens[4], src)), "a\tb");
        assert!(matches!(unescape("plain"), Cow::Borrowed("plain")));
    }

    macro_rules! cases {
        (match .. {
            $($str:expr => [$(($kind:expr, $range:expr)),* $(,)?]),* $(,)?
        }) => {{
            &[$((
                $str,
                vec![
                    $(($kind, Span::new_of_bounds($range.start..$range.end))),*
                ],
            )),*]
        }};
    }
    use cases;
}

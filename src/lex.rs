use std::{fmt::Display, iter::Peekable, str::CharIndices, sync::Arc};

use miette::SourceSpan;
use phf::phf_map;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Symbols
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Semi,
    Comma,
    Eq,

    // Keywords
    Let,
    Fn,
    If,
    Else,
    While,
    Return,

    Number,
    Identifier,

    Eoi,
    // any character the language has no use for
    Invalid,
}

impl TokenKind {
    /// Tokens that split an expression into operand spans.
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Plus | TokenKind::Minus | TokenKind::Star | TokenKind::Slash | TokenKind::Percent
        )
    }

    pub fn closer(self) -> Option<TokenKind> {
        match self {
            TokenKind::LeftParen => Some(TokenKind::RightParen),
            TokenKind::LeftBrace => Some(TokenKind::RightBrace),
            _ => None,
        }
    }

    /// Short lowercase name used by the token dump.
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Plus => "plus",
            TokenKind::Minus => "minus",
            TokenKind::Star => "star",
            TokenKind::Slash => "slash",
            TokenKind::Percent => "percent",
            TokenKind::LeftParen => "left_paren",
            TokenKind::RightParen => "right_paren",
            TokenKind::LeftBrace => "left_brace",
            TokenKind::RightBrace => "right_brace",
            TokenKind::Semi => "semicolon",
            TokenKind::Comma => "comma",
            TokenKind::Eq => "equals",
            TokenKind::Let => "let",
            TokenKind::Fn => "fn",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::While => "while",
            TokenKind::Return => "return",
            TokenKind::Number => "number",
            TokenKind::Identifier => "ident",
            TokenKind::Eoi => "eof",
            TokenKind::Invalid => "invalid",
        }
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Symbols
            TokenKind::Plus => write!(f, "'+'"),
            TokenKind::Minus => write!(f, "'-'"),
            TokenKind::Star => write!(f, "'*'"),
            TokenKind::Slash => write!(f, "'/'"),
            TokenKind::Percent => write!(f, "'%'"),
            TokenKind::LeftParen => write!(f, "'('"),
            TokenKind::RightParen => write!(f, "')'"),
            TokenKind::LeftBrace => write!(f, "'{{'"),
            TokenKind::RightBrace => write!(f, "'}}'"),
            TokenKind::Semi => write!(f, "';'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Eq => write!(f, "'='"),

            // Keywords
            TokenKind::Let => write!(f, "'let'"),
            TokenKind::Fn => write!(f, "'fn'"),
            TokenKind::If => write!(f, "'if'"),
            TokenKind::Else => write!(f, "'else'"),
            TokenKind::While => write!(f, "'while'"),
            TokenKind::Return => write!(f, "'return'"),

            TokenKind::Number => write!(f, "<number>"),
            TokenKind::Identifier => write!(f, "<identifier>"),

            TokenKind::Eoi => write!(f, "end of file"),
            TokenKind::Invalid => write!(f, "<invalid>"),
        }
    }
}

static KEYWORDS: phf::Map<&'static str, TokenKind> = phf_map! {
    "let" => TokenKind::Let,
    "fn" => TokenKind::Fn,
    "if" => TokenKind::If,
    "else" => TokenKind::Else,
    "while" => TokenKind::While,
    "return" => TokenKind::Return,
};

/// Where a token or node came from. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub span: SourceSpan,
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub lexeme: &'src str,
    /// Literal payload of a number token; `None` if the literal does not fit.
    pub value: Option<u64>,
    pub loc: Location,
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}", self.loc.line, self.loc.column, self.kind.name())?;
        match self.kind {
            TokenKind::Number => match self.value {
                Some(value) => write!(f, " {value}"),
                None => write!(f, " {} (out of range)", self.lexeme),
            },
            TokenKind::Identifier | TokenKind::Invalid => write!(f, " {:?}", self.lexeme),
            _ => Ok(()),
        }
    }
}

/// Tokenizes a whole file. The result always ends with a single `Eoi` token.
pub fn tokenize<'src>(file: &str, source: &'src str) -> Vec<Token<'src>> {
    Lexer::new(file, source).collect()
}

#[derive(Debug)]
pub struct Lexer<'src> {
    file: Arc<str>,
    start: usize,
    current: usize,
    line: u32,
    line_start: usize,
    start_line: u32,
    start_column: u32,
    done: bool,
    source: &'src str,
    chars: Peekable<CharIndices<'src>>,
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        Some(self.scan_token())
    }
}

impl<'src> Lexer<'src> {
    pub fn new(file: &str, source: &'src str) -> Lexer<'src> {
        Lexer {
            file: file.into(),
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            start_line: 1,
            start_column: 1,
            done: false,
            source,
            chars: source.char_indices().peekable(),
        }
    }

    pub fn scan_token(&mut self) -> Token<'src> {
        self.skip_whitespace();
        self.start = self.current;
        self.start_line = self.line;
        self.start_column = self.source[self.line_start..self.start].chars().count() as u32 + 1;

        if self.is_at_end() {
            self.done = true;
            return self.make_token(TokenKind::Eoi);
        }

        let c = self.advance();
        match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            ';' => self.make_token(TokenKind::Semi),
            ',' => self.make_token(TokenKind::Comma),
            '=' => self.make_token(TokenKind::Eq),
            '+' => self.make_token(TokenKind::Plus),
            '-' => self.make_token(TokenKind::Minus),
            '*' => self.make_token(TokenKind::Star),
            '/' => self.make_token(TokenKind::Slash),
            '%' => self.make_token(TokenKind::Percent),
            '0'..='9' => self.number(c),
            'a'..='z' | 'A'..='Z' | '_' => self.identifier(),
            _ => self.make_token(TokenKind::Invalid),
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token<'src> {
        Token {
            kind,
            lexeme: &self.source[self.start..self.current],
            value: None,
            loc: Location {
                file: self.file.clone(),
                line: self.start_line,
                column: self.start_column,
                span: SourceSpan::new(self.start.into(), self.current - self.start),
            },
        }
    }

    fn advance(&mut self) -> char {
        if let Some((idx, ch)) = self.chars.next() {
            self.current = idx + ch.len_utf8();
            if ch == '\n' {
                self.line += 1;
                self.line_start = self.current;
            }
            ch
        } else {
            '\0'
        }
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.peek() == expected {
            self.advance();
            return true;
        }
        false
    }

    fn peek(&mut self) -> char {
        self.chars.peek().map(|&(_, ch)| ch).unwrap_or('\0')
    }

    fn peek_next(&mut self) -> char {
        let mut iter = self.source[self.current..].chars();
        iter.next();
        iter.next().unwrap_or('\0')
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                ' ' | '\r' | '\t' | '\n' => {
                    self.advance();
                }
                '/' if self.peek_next() == '/' => {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                }
                _ => return,
            }
        }
    }

    fn number(&mut self, first: char) -> Token<'src> {
        let value = if first == '0' && self.matches('x') {
            let digits = self.current;
            while self.peek().is_ascii_hexdigit() {
                self.advance();
            }
            match &self.source[digits..self.current] {
                "" => None,
                digits => u64::from_str_radix(digits, 16).ok(),
            }
        } else {
            while self.peek().is_ascii_digit() {
                self.advance();
            }
            self.source[self.start..self.current].parse::<u64>().ok()
        };

        Token {
            value,
            ..self.make_token(TokenKind::Number)
        }
    }

    fn identifier(&mut self) -> Token<'src> {
        while self.peek().is_ascii_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let lexeme = &self.source[self.start..self.current];
        let kind = KEYWORDS
            .get(lexeme)
            .copied()
            .unwrap_or(TokenKind::Identifier);

        self.make_token(kind)
    }

    fn is_at_end(&mut self) -> bool {
        self.chars.peek().is_none()
    }
}

use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Structural punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Colon,
    Dot,
    Semicolon,

    // Operators
    Equal,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparators
    Greater,
    Less,
    EqualEqual,
    BangEqual,
    GreaterEqual,
    LessEqual,

    // Literals
    Number,
    String,
    Identifier,

    // Keywords
    VarDeclaration,
    Print,

    // End of input
    Eof,
}

impl TokenKind {
    pub fn is_comparator(&self) -> bool {
        matches!(
            self,
            TokenKind::Greater
                | TokenKind::Less
                | TokenKind::EqualEqual
                | TokenKind::BangEqual
                | TokenKind::GreaterEqual
                | TokenKind::LessEqual
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenKind::LeftParen => "(",
            TokenKind::RightParen => ")",
            TokenKind::LeftBracket => "[",
            TokenKind::RightBracket => "]",
            TokenKind::LeftBrace => "{",
            TokenKind::RightBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Dot => ".",
            TokenKind::Semicolon => ";",
            TokenKind::Equal => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Greater => ">",
            TokenKind::Less => "<",
            TokenKind::EqualEqual => "==",
            TokenKind::BangEqual => "!=",
            TokenKind::GreaterEqual => ">=",
            TokenKind::LessEqual => "<=",
            TokenKind::Number => "number",
            TokenKind::String => "string",
            TokenKind::Identifier => "identifier",
            TokenKind::VarDeclaration => "let/const",
            TokenKind::Print => "print",
            TokenKind::Eof => "end of input",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn kind(&self) -> &TokenKind {
        &self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedCharacter {
    pub character: char,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenizeError {
    #[error("Unterminated string starting at {span}")]
    UnterminatedString { span: Span },
}

pub struct Tokenizer<'a> {
    remaining: &'a str,
    line: usize,
    column: usize,
    skipped: Vec<SkippedCharacter>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            remaining: source,
            line: 1,
            column: 1,
            skipped: Vec::new(),
        }
    }

    /// Produces the next token. Once the input is exhausted every call
    /// returns an `Eof` token.
    pub fn token(&mut self) -> Result<Token, TokenizeError> {
        loop {
            while let Some((_, rest)) = maximal(&[whitespace, comment], self.remaining) {
                self.advance(rest);
            }

            let Some(first) = self.remaining.chars().next() else {
                return Ok(Token {
                    text: String::new(),
                    kind: TokenKind::Eof,
                    span: Span::point(self.line, self.column),
                });
            };

            let source = self.remaining;
            let matched = maximal(
                &[
                    // Single-character tokens
                    left_paren,
                    right_paren,
                    left_bracket,
                    right_bracket,
                    left_brace,
                    right_brace,
                    comma,
                    colon,
                    dot,
                    semicolon,
                    plus,
                    minus,
                    star,
                    slash,
                    percent,
                    // One or two character tokens
                    equal,
                    equal_equal,
                    bang_equal,
                    greater,
                    greater_equal,
                    less,
                    less_equal,
                    // Literals
                    identifier,
                    string,
                    number,
                ],
                source,
            );

            match matched {
                Some((kind, rest)) => {
                    let lexeme = &source[..source.len() - rest.len()];
                    let text = match kind {
                        TokenKind::String => &lexeme[1..lexeme.len() - 1],
                        _ => lexeme,
                    };
                    let token = Token {
                        text: text.to_string(),
                        kind,
                        span: self.advance(rest),
                    };
                    return Ok(token);
                }
                None if first == '"' => {
                    return Err(TokenizeError::UnterminatedString {
                        span: Span::point(self.line, self.column),
                    })
                }
                None => {
                    let span = self.advance(&source[first.len_utf8()..]);
                    self.skipped.push(SkippedCharacter {
                        character: first,
                        span,
                    });
                }
            }
        }
    }

    pub fn skipped(&self) -> &[SkippedCharacter] {
        &self.skipped
    }

    /// Moves past everything before `rest`, returning the span covered.
    fn advance(&mut self, rest: &'a str) -> Span {
        let consumed = &self.remaining[..self.remaining.len() - rest.len()];
        let start = Span::point(self.line, self.column);
        let mut end = start;
        for c in consumed.chars() {
            end = Span::point(self.line, self.column);
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.remaining = rest;
        start + end
    }
}

pub fn tokens(source: &str) -> Result<Vec<Token>, TokenizeError> {
    let mut tokenizer = Tokenizer::new(source);
    let mut tokens = Vec::new();

    loop {
        let token = tokenizer.token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }

    for skipped in tokenizer.skipped() {
        eprintln!(
            "warning: unrecognised character {:?} at {}",
            skipped.character, skipped.span
        );
    }

    Ok(tokens)
}

pub fn keyword(word: &str) -> Option<TokenKind> {
    match word {
        "let" | "const" => Some(TokenKind::VarDeclaration),
        "print" => Some(TokenKind::Print),
        _ => None,
    }
}

fn maximal<'a, T: std::fmt::Debug>(
    parsers: &[fn(&str) -> Option<(T, &str)>],
    source: &'a str,
) -> Option<(T, &'a str)> {
    let mut min_left = source.len() + 1;
    let mut max_match = None;

    let matching_parsers = parsers.iter().filter_map(|parser| parser(source));
    for (m, rest) in matching_parsers {
        let left = rest.len();
        if left < min_left {
            min_left = left;
            max_match = Some((m, rest));
        }
    }

    max_match
}

fn whitespace(source: &str) -> Option<((), &str)> {
    let len = source
        .chars()
        .take_while(|c| matches!(c, ' ' | '\t' | '\n' | '\r'))
        .map(char::len_utf8)
        .sum();
    if len > 0 {
        Some(((), &source[len..]))
    } else {
        None
    }
}

fn comment(source: &str) -> Option<((), &str)> {
    if source.starts_with('#') {
        let len = source
            .chars()
            .take_while(|c| *c != '\n')
            .map(char::len_utf8)
            .sum();
        Some(((), &source[len..]))
    } else {
        None
    }
}

macro_rules! match_literal {
    ($name:ident, $word:literal, $kind:expr) => {
        fn $name(source: &str) -> Option<(TokenKind, &str)> {
            if source.starts_with($word) {
                Some(($kind, &source[$word.len()..]))
            } else {
                None
            }
        }
    };
}

match_literal! { left_paren, "(", TokenKind::LeftParen }
match_literal! { right_paren, ")", TokenKind::RightParen }
match_literal! { left_bracket, "[", TokenKind::LeftBracket }
match_literal! { right_bracket, "]", TokenKind::RightBracket }
match_literal! { left_brace, "{", TokenKind::LeftBrace }
match_literal! { right_brace, "}", TokenKind::RightBrace }
match_literal! { comma, ",", TokenKind::Comma }
match_literal! { colon, ":", TokenKind::Colon }
match_literal! { dot, ".", TokenKind::Dot }
match_literal! { semicolon, ";", TokenKind::Semicolon }
match_literal! { plus, "+", TokenKind::Plus }
match_literal! { minus, "-", TokenKind::Minus }
match_literal! { star, "*", TokenKind::Star }
match_literal! { slash, "/", TokenKind::Slash }
match_literal! { percent, "%", TokenKind::Percent }
match_literal! { equal, "=", TokenKind::Equal }
match_literal! { equal_equal, "==", TokenKind::EqualEqual }
match_literal! { bang_equal, "!=", TokenKind::BangEqual }
match_literal! { greater, ">", TokenKind::Greater }
match_literal! { greater_equal, ">=", TokenKind::GreaterEqual }
match_literal! { less, "<", TokenKind::Less }
match_literal! { less_equal, "<=", TokenKind::LessEqual }

fn identifier(source: &str) -> Option<(TokenKind, &str)> {
    let len: usize = source
        .chars()
        .take_while(|c| c.is_alphabetic() || *c == '_')
        .map(char::len_utf8)
        .sum();

    if len == 0 {
        return None;
    }

    let kind = keyword(&source[..len]).unwrap_or(TokenKind::Identifier);
    Some((kind, &source[len..]))
}

fn string(source: &str) -> Option<(TokenKind, &str)> {
    let body = source.strip_prefix('"')?;
    let end = body.find('"')?;
    Some((TokenKind::String, &body[end + 1..]))
}

fn number(source: &str) -> Option<(TokenKind, &str)> {
    let len: usize = source
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .map(char::len_utf8)
        .sum();

    if len > 0 {
        Some((TokenKind::Number, &source[len..]))
    } else {
        None
    }
}

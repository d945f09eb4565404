use std::fmt::{Display, Formatter, Result as FmtResult};
use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, Copy)]
pub struct Loc {
    pub line: usize,
    pub col: usize,
}

impl Display for Loc {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "line {}, col {}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word(String),
    StringLit(String),
    LBrace,
    RBrace,
    Semicolon,
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TokenKind::Word(s) => write!(f, "{s}"),
            TokenKind::StringLit(s) => write!(f, "\"{s}\""),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Semicolon => write!(f, ";"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "'{}' at {}", self.kind, self.loc)
    }
}

pub struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.chars().peekable(),
            line: 1,
            col: 1,
        }
    }

    fn advance(&mut self) {
        if let Some(c) = self.input.next() {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }

    fn peek(&mut self) -> Option<&char> {
        self.input.peek()
    }

    fn current_loc(&self) -> Loc {
        Loc {
            line: self.line,
            col: self.col,
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, String> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.peek() {
            if c.is_whitespace() {
                self.advance();
                continue;
            }
            if c == '#' {
                self.skip_comment();
                continue;
            }

            let loc = self.current_loc();
            match c {
                '{' => {
                    tokens.push(Token { kind: TokenKind::LBrace, loc });
                    self.advance();
                }
                '}' => {
                    tokens.push(Token { kind: TokenKind::RBrace, loc });
                    self.advance();
                }
                ';' => {
                    tokens.push(Token { kind: TokenKind::Semicolon, loc });
                    self.advance();
                }
                q if q == '"' || q == '\'' => self.handle_quoted_string(&mut tokens, loc, q),
                _ => self.handle_word(&mut tokens, loc)?,
            }
        }

        Ok(tokens)
    }

    fn skip_comment(&mut self) {
        while let Some(&c) = self.peek() {
            if c == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn handle_quoted_string(&mut self, tokens: &mut Vec<Token>, loc: Loc, quote: char) {
        self.advance();
        let mut val = String::new();
        while let Some(&c) = self.peek() {
            if c == quote {
                self.advance();
                break;
            }
            val.push(c);
            self.advance();
        }
        tokens.push(Token { kind: TokenKind::StringLit(val), loc });
    }

    fn handle_word(&mut self, tokens: &mut Vec<Token>, loc: Loc) -> Result<(), String> {
        let mut val = String::new();
        while let Some(&c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | ';' | '#') {
                break;
            }
            val.push(c);
            self.advance();
        }

        if val.is_empty() {
            let c = *self.peek().unwrap();
            return Err(format!(
                "unexpected character '{}' at line {}, col {}",
                c, self.line, self.col
            ));
        }

        tokens.push(Token { kind: TokenKind::Word(val), loc });
        Ok(())
    }
}

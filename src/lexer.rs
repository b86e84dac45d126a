use std::{iter::Peekable, str::CharIndices};

mod error;

pub use error::{LexError, LexResult};

use crate::token::{Span, Token, TokenKind};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            eof_reached: false,
            line: 1,
            column: 1,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        self.skip_trivia()?;

        let (start_idx, ch) = match self.chars.peek() {
            Some(&(idx, c)) => (idx, c),
            None => {
                self.eof_reached = true;
                let index = self.current_index();
                return Ok(Token::new(TokenKind::EOF, self.span_from(index, self.line, self.column)));
            }
        };

        let start_line = self.line;
        let start_column = self.column;
        let kind = match ch {
            '"' => return self.read_string(start_idx, start_line, start_column),
            c if c.is_alphabetic() || c == '_' => {
                return Ok(self.read_identifier(start_idx, start_line, start_column));
            }
            c if c.is_ascii_digit() => {
                return self.read_integer(start_idx, start_line, start_column);
            }
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ',' => self.single(TokenKind::Comma),
            ':' => self.single(TokenKind::Colon),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '=' => {
                self.advance_char();
                if self.match_char('=') {
                    TokenKind::EqualEqual
                } else if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                self.advance_char();
                if self.match_char('=') {
                    TokenKind::NotEqual
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                self.advance_char();
                if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                }
            }
            '>' => {
                self.advance_char();
                if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                }
            }
            '&' if self.peek_second() == Some('&') => {
                self.advance_char();
                self.advance_char();
                TokenKind::AndAnd
            }
            '|' if self.peek_second() == Some('|') => {
                self.advance_char();
                self.advance_char();
                TokenKind::OrOr
            }
            _ => {
                return Err(LexError::UnexpectedCharacter {
                    character: ch,
                    span: self.span_from(start_idx, start_line, start_column),
                });
            }
        };

        Ok(Token::new(kind, self.span_from(start_idx, start_line, start_column)))
    }

    fn single(&mut self, kind: TokenKind<'a>) -> TokenKind<'a> {
        self.advance_char();
        kind
    }

    fn skip_trivia(&mut self) -> LexResult<()> {
        loop {
            let next = self.chars.peek().copied();
            match next {
                Some((_, c)) if c.is_whitespace() => {
                    self.advance_char();
                }
                Some((_, '/')) if self.peek_second() == Some('/') => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                Some((start, '/')) if self.peek_second() == Some('*') => {
                    let (line, column) = (self.line, self.column);
                    self.advance_char();
                    self.advance_char();
                    loop {
                        match self.advance_char() {
                            Some((_, '*')) if self.match_char('/') => break,
                            Some(_) => {}
                            None => {
                                return Err(LexError::UnterminatedComment {
                                    span: self.span_from(start, line, column),
                                });
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_identifier(&mut self, start: usize, line: usize, column: usize) -> Token<'a> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let ident = &self.input[start..end_idx];
        let kind = match ident {
            "function" => TokenKind::Function,
            "for" => TokenKind::For,
            "in" => TokenKind::In,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => TokenKind::Identifier(ident),
        };
        Token::new(kind, self.span_from(start, line, column))
    }

    fn read_integer(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        let is_hex = self.input[start..].starts_with("0x") || self.input[start..].starts_with("0X");
        if is_hex {
            self.advance_char();
            self.advance_char();
        }
        while let Some(&(_, c)) = self.chars.peek() {
            let accepted = if is_hex {
                c.is_ascii_hexdigit()
            } else {
                c.is_ascii_digit()
            };
            if accepted {
                self.advance_char();
            } else if c.is_alphanumeric() || c == '_' {
                // Swallow the rest so the error reports the whole literal.
                self.advance_char();
                let literal = self.input[start..self.current_index()].to_string();
                return Err(LexError::InvalidIntegerLiteral {
                    literal,
                    span: self.span_from(start, line, column),
                });
            } else {
                break;
            }
        }

        let end_idx = self.current_index();
        let literal = &self.input[start..end_idx];
        let parsed = if is_hex {
            i64::from_str_radix(&literal[2..], 16)
        } else {
            literal.parse::<i64>()
        };
        let value = parsed.map_err(|_| LexError::InvalidIntegerLiteral {
            literal: literal.to_string(),
            span: self.span_from(start, line, column),
        })?;
        Ok(Token::new(TokenKind::Integer(value), self.span_from(start, line, column)))
    }

    fn read_string(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume opening quote
        let mut value = String::new();
        while let Some((idx, c)) = self.advance_char() {
            match c {
                '"' => {
                    return Ok(Token::new(
                        TokenKind::String(value),
                        Span {
                            start,
                            end: idx + 1,
                            line,
                            column,
                        },
                    ));
                }
                '\n' => break,
                '\\' => {
                    let escape_span = self.span_from(idx, self.line, self.column - 1);
                    match self.advance_char() {
                        Some((_, '"')) => value.push('"'),
                        Some((_, '\\')) => value.push('\\'),
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, other)) => {
                            return Err(LexError::InvalidEscape {
                                character: other,
                                span: escape_span,
                            });
                        }
                        None => break,
                    }
                }
                _ => value.push(c),
            }
        }
        Err(LexError::UnterminatedString {
            span: self.span_from(start, line, column),
        })
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.eof_reached {
            return None;
        }
        Some(self.next_token())
    }
}

impl<'a> Lexer<'a> {
    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn match_char(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.advance_char();
            true
        } else {
            false
        }
    }

    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn span_from(&mut self, start: usize, line: usize, column: usize) -> Span {
        Span {
            start,
            end: self.current_index(),
            line,
            column,
        }
    }
}

pub fn tokenize<'a>(input: &'a str) -> LexResult<Vec<Token<'a>>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let is_eof = matches!(token.kind, TokenKind::EOF);
        tokens.push(token);
        if is_eof {
            break;
        }
    }
    Ok(tokens)
}

// Expression lexer - tokenizes expression text on demand

use super::token::{Token, TokenKind};
use crate::error::LexError;

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let input: Vec<char> = input.chars().collect();
        let current_char = input.first().copied();
        Lexer {
            input,
            position: 0,
            current_char,
        }
    }

    /// Get the next token from the input
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start = self.position;
        let ch = match self.current_char {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::End, "", start)),
        };

        let kind = match ch {
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '/' => self.single(TokenKind::Slash),
            '%' => self.single(TokenKind::Percent),
            '(' => self.single(TokenKind::LeftParen),
            ')' => self.single(TokenKind::RightParen),
            '[' => self.single(TokenKind::LeftBracket),
            ']' => self.single(TokenKind::RightBracket),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '?' => self.single(TokenKind::Question),
            ':' => self.single(TokenKind::Colon),
            '$' => self.single(TokenKind::Dollar),
            '~' => self.single(TokenKind::Tilde),
            '^' => self.single(TokenKind::Caret),
            '=' => {
                self.advance();
                match self.current_char {
                    Some('=') => self.single(TokenKind::EqualEqual),
                    Some('>') => self.single(TokenKind::Arrow),
                    _ => TokenKind::Equal,
                }
            }
            '!' => {
                self.advance();
                if self.current_char == Some('=') {
                    self.single(TokenKind::NotEqual)
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                self.advance();
                match self.current_char {
                    Some('=') => self.single(TokenKind::LessEqual),
                    Some('>') => self.single(TokenKind::LessGreater),
                    Some('<') => self.single(TokenKind::ShiftLeft),
                    _ => TokenKind::Less,
                }
            }
            '>' => {
                self.advance();
                match self.current_char {
                    Some('=') => self.single(TokenKind::GreaterEqual),
                    Some('>') => self.single(TokenKind::ShiftRight),
                    _ => TokenKind::Greater,
                }
            }
            '&' => {
                self.advance();
                if self.current_char == Some('&') {
                    self.single(TokenKind::AmpAmp)
                } else {
                    TokenKind::Amp
                }
            }
            '|' => {
                self.advance();
                if self.current_char == Some('|') {
                    self.single(TokenKind::BarBar)
                } else {
                    TokenKind::Bar
                }
            }
            '@' => return self.read_placeholder(),
            '"' | '\'' => return self.read_string(ch),
            c if c.is_alphabetic() || c == '_' => return Ok(self.read_identifier()),
            c if c.is_ascii_digit() => return self.read_number(),
            c => return Err(LexError::UnexpectedCharacter { ch: c, offset: start }),
        };

        Ok(Token::new(kind, self.text_from(start), start))
    }

    /// Advance to the next character
    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    /// Peek at the next character without advancing
    fn peek(&self) -> Option<char> {
        self.input.get(self.position + 1).copied()
    }

    /// Consume one character and yield `kind`
    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.advance();
        kind
    }

    fn text_from(&self, start: usize) -> String {
        self.input[start..self.position].iter().collect()
    }

    /// Skip whitespace characters
    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Read an identifier or keyword
    fn read_identifier(&mut self) -> Token {
        let start = self.position;

        while let Some(ch) = self.current_char {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let identifier = self.text_from(start);
        let kind = TokenKind::keyword_from_str(&identifier).unwrap_or(TokenKind::Identifier);
        Token::new(kind, identifier, start)
    }

    /// Read a `@N` placeholder
    fn read_placeholder(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        self.advance(); // Skip '@'

        let digits_start = self.position;
        while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
            self.advance();
        }
        if self.position == digits_start {
            return Err(LexError::InvalidPlaceholder { offset: start });
        }

        let digits = self.text_from(digits_start);
        let index = digits
            .parse::<usize>()
            .map_err(|_| LexError::InvalidPlaceholder { offset: start })?;
        Ok(Token::new(
            TokenKind::Placeholder(index),
            self.text_from(start),
            start,
        ))
    }

    /// Read a string literal delimited by `quote`; the token text is the unescaped content
    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        let start = self.position;
        self.advance(); // Skip opening quote
        let mut string = String::new();

        loop {
            match self.current_char {
                None => return Err(LexError::UnterminatedString { offset: start }),
                Some(ch) if ch == quote => {
                    if self.peek() == Some(quote) {
                        // Doubled quote
                        string.push(quote);
                        self.advance();
                        self.advance();
                    } else {
                        self.advance(); // Skip closing quote
                        break;
                    }
                }
                Some('\\') => {
                    let escaped = match self.peek() {
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('t') => '\t',
                        Some('0') => '\0',
                        Some(c @ ('\\' | '"' | '\'')) => c,
                        Some(_) => {
                            string.push('\\');
                            self.advance();
                            continue;
                        }
                        None => return Err(LexError::UnterminatedString { offset: start }),
                    };
                    string.push(escaped);
                    self.advance();
                    self.advance();
                }
                Some(ch) => {
                    string.push(ch);
                    self.advance();
                }
            }
        }

        Ok(Token::new(TokenKind::String, string, start))
    }

    /// Read a number: decimal or hex integer, or real, with an optional type suffix
    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut is_real = false;
        let mut is_hex = false;

        if self.current_char == Some('0') && matches!(self.peek(), Some('x' | 'X')) {
            is_hex = true;
            self.advance();
            self.advance();
            let digits_start = self.position;
            while matches!(self.current_char, Some(c) if c.is_ascii_hexdigit()) {
                self.advance();
            }
            if self.position == digits_start {
                return Err(LexError::InvalidNumber {
                    text: self.text_from(start),
                    offset: start,
                });
            }
        } else {
            while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
                self.advance();
            }
            if self.current_char == Some('.') && self.peek().map_or(false, |c| c.is_ascii_digit()) {
                is_real = true;
                self.advance();
                while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
                    self.advance();
                }
            }
            if matches!(self.current_char, Some('e' | 'E')) {
                let sign_or_digit = self.peek();
                let has_sign = matches!(sign_or_digit, Some('+' | '-'));
                let first_digit = if has_sign {
                    self.input.get(self.position + 2).copied()
                } else {
                    sign_or_digit
                };
                if first_digit.map_or(false, |c| c.is_ascii_digit()) {
                    is_real = true;
                    self.advance();
                    if has_sign {
                        self.advance();
                    }
                    while matches!(self.current_char, Some(c) if c.is_ascii_digit()) {
                        self.advance();
                    }
                }
            }
        }

        // Type suffix
        let suffix_start = self.position;
        while matches!(self.current_char, Some(c) if c.is_ascii_alphabetic()) {
            self.advance();
        }
        let suffix = self.text_from(suffix_start).to_ascii_lowercase();

        let kind = match suffix.as_str() {
            "" if is_real => TokenKind::Real,
            "" | "u" | "l" | "ul" | "lu" if !is_real => TokenKind::Integer,
            "f" | "d" if !is_hex => TokenKind::Real,
            _ => {
                return Err(LexError::InvalidNumber {
                    text: self.text_from(start),
                    offset: start,
                })
            }
        };

        Ok(Token::new(kind, self.text_from(start), start))
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::End;
            tokens.push(token);
            if done {
                break;
            }
        }

        Ok(tokens)
    }
}

// Expression tokens for lexical analysis

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Identifier,
    Integer,
    Real,
    String,
    /// `@N` parameter placeholder carrying its index
    Placeholder(usize),

    // Keywords
    True,
    False,
    Null,
    And,
    Or,
    Not,
    In,
    New,
    As,

    // Context symbols
    Dollar,
    Tilde,
    // `^` is both the parent symbol and binary xor; the parser decides by position
    Caret,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    AmpAmp,
    Bar,
    BarBar,
    Bang,
    Equal,
    EqualEqual,
    NotEqual,
    LessGreater,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    ShiftLeft,
    ShiftRight,
    Question,
    Colon,
    Arrow,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Comma,
    Dot,

    // Special
    End,
}

impl TokenKind {
    /// Check if the token kind is a keyword
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::True
                | TokenKind::False
                | TokenKind::Null
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::In
                | TokenKind::New
                | TokenKind::As
        )
    }

    /// Convert a word to a keyword kind if it matches (case-insensitive)
    pub fn keyword_from_str(s: &str) -> Option<TokenKind> {
        match s.to_ascii_lowercase().as_str() {
            "true" => Some(TokenKind::True),
            "false" => Some(TokenKind::False),
            "null" => Some(TokenKind::Null),
            "and" => Some(TokenKind::And),
            "or" => Some(TokenKind::Or),
            "not" => Some(TokenKind::Not),
            "in" => Some(TokenKind::In),
            "new" => Some(TokenKind::New),
            "as" => Some(TokenKind::As),
            _ => None,
        }
    }

    /// Human readable description used in error messages
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Integer => "integer literal",
            TokenKind::Real => "real literal",
            TokenKind::String => "string literal",
            TokenKind::Placeholder(_) => "parameter placeholder",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Not => "'not'",
            TokenKind::In => "'in'",
            TokenKind::New => "'new'",
            TokenKind::As => "'as'",
            TokenKind::Dollar => "'$'",
            TokenKind::Tilde => "'~'",
            TokenKind::Caret => "'^'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Percent => "'%'",
            TokenKind::Amp => "'&'",
            TokenKind::AmpAmp => "'&&'",
            TokenKind::Bar => "'|'",
            TokenKind::BarBar => "'||'",
            TokenKind::Bang => "'!'",
            TokenKind::Equal => "'='",
            TokenKind::EqualEqual => "'=='",
            TokenKind::NotEqual => "'!='",
            TokenKind::LessGreater => "'<>'",
            TokenKind::Less => "'<'",
            TokenKind::LessEqual => "'<='",
            TokenKind::Greater => "'>'",
            TokenKind::GreaterEqual => "'>='",
            TokenKind::ShiftLeft => "'<<'",
            TokenKind::ShiftRight => "'>>'",
            TokenKind::Question => "'?'",
            TokenKind::Colon => "':'",
            TokenKind::Arrow => "'=>'",
            TokenKind::LeftParen => "'('",
            TokenKind::RightParen => "')'",
            TokenKind::LeftBracket => "'['",
            TokenKind::RightBracket => "']'",
            TokenKind::Comma => "','",
            TokenKind::Dot => "'.'",
            TokenKind::End => "end of expression",
        }
    }
}

/// A token with its raw text and char offset in the source expression
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub offset: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            offset,
        }
    }

    pub fn is(&self, kind: &TokenKind) -> bool {
        &self.kind == kind
    }

    /// Identifier token whose text equals `word`, ignoring ASCII case
    pub fn is_word(&self, word: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(word)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    Identifier(&'a str),
    Integer(i64),
    Float(f64),
    /// String literal with escapes already decoded.
    String(String),
    Bytes(String),
    /// Body of an f-string; braces are kept for the parser to split.
    FString(String),

    // Keywords
    True,
    False,
    None,
    And,
    Or,
    Not,
    Is,
    In,
    If,
    Elif,
    Else,
    While,
    For,
    Def,
    Class,
    Return,
    Pass,
    Break,
    Continue,
    Try,
    Except,
    Finally,
    Raise,
    Import,
    From,
    As,
    Global,
    Nonlocal,
    Assert,
    Lambda,
    With,
    Yield,
    Del,
    Async,
    Await,

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    DoubleStar,   // **
    Slash,        // /
    DoubleSlash,  // //
    Percent,      // %
    LeftShift,    // <<
    RightShift,   // >>
    Ampersand,    // &
    Pipe,         // |
    Caret,        // ^
    Tilde,        // ~
    Less,         // <
    Greater,      // >
    LessEqual,    // <=
    GreaterEqual, // >=
    EqualEqual,   // ==
    NotEqual,     // !=
    Equal,        // =
    PlusEqual,    // +=
    MinusEqual,   // -=
    StarEqual,    // *=
    SlashEqual,   // /=
    DoubleSlashEqual,
    PercentEqual,
    DoubleStarEqual,
    LeftShiftEqual,
    RightShiftEqual,
    AmpersandEqual,
    PipeEqual,
    CaretEqual,
    Arrow, // ->
    At,    // @

    // Delimiters
    Colon,     // :
    Comma,     // ,
    Dot,       // .
    Semicolon, // ;
    LParen,    // (
    RParen,    // )
    LBracket,  // [
    RBracket,  // ]
    LBrace,    // {
    RBrace,    // }

    // Structural
    Newline,
    Indent,
    Dedent,
    EOF,
}

impl TokenKind<'_> {
    pub fn keyword(ident: &str) -> Option<TokenKind<'static>> {
        let kind = match ident {
            "True" => TokenKind::True,
            "False" => TokenKind::False,
            "None" => TokenKind::None,
            "and" => TokenKind::And,
            "or" => TokenKind::Or,
            "not" => TokenKind::Not,
            "is" => TokenKind::Is,
            "in" => TokenKind::In,
            "if" => TokenKind::If,
            "elif" => TokenKind::Elif,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "for" => TokenKind::For,
            "def" => TokenKind::Def,
            "class" => TokenKind::Class,
            "return" => TokenKind::Return,
            "pass" => TokenKind::Pass,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "try" => TokenKind::Try,
            "except" => TokenKind::Except,
            "finally" => TokenKind::Finally,
            "raise" => TokenKind::Raise,
            "import" => TokenKind::Import,
            "from" => TokenKind::From,
            "as" => TokenKind::As,
            "global" => TokenKind::Global,
            "nonlocal" => TokenKind::Nonlocal,
            "assert" => TokenKind::Assert,
            "lambda" => TokenKind::Lambda,
            "with" => TokenKind::With,
            "yield" => TokenKind::Yield,
            "del" => TokenKind::Del,
            "async" => TokenKind::Async,
            "await" => TokenKind::Await,
            _ => return None,
        };
        Some(kind)
    }

    pub fn operator(text: &str) -> Option<TokenKind<'static>> {
        let kind = match text {
            "**=" => TokenKind::DoubleStarEqual,
            "//=" => TokenKind::DoubleSlashEqual,
            "<<=" => TokenKind::LeftShiftEqual,
            ">>=" => TokenKind::RightShiftEqual,
            "**" => TokenKind::DoubleStar,
            "//" => TokenKind::DoubleSlash,
            "<<" => TokenKind::LeftShift,
            ">>" => TokenKind::RightShift,
            "<=" => TokenKind::LessEqual,
            ">=" => TokenKind::GreaterEqual,
            "==" => TokenKind::EqualEqual,
            "!=" => TokenKind::NotEqual,
            "+=" => TokenKind::PlusEqual,
            "-=" => TokenKind::MinusEqual,
            "*=" => TokenKind::StarEqual,
            "/=" => TokenKind::SlashEqual,
            "%=" => TokenKind::PercentEqual,
            "&=" => TokenKind::AmpersandEqual,
            "|=" => TokenKind::PipeEqual,
            "^=" => TokenKind::CaretEqual,
            "->" => TokenKind::Arrow,
            "+" => TokenKind::Plus,
            "-" => TokenKind::Minus,
            "*" => TokenKind::Star,
            "/" => TokenKind::Slash,
            "%" => TokenKind::Percent,
            "&" => TokenKind::Ampersand,
            "|" => TokenKind::Pipe,
            "^" => TokenKind::Caret,
            "~" => TokenKind::Tilde,
            "<" => TokenKind::Less,
            ">" => TokenKind::Greater,
            "=" => TokenKind::Equal,
            "@" => TokenKind::At,
            ":" => TokenKind::Colon,
            "," => TokenKind::Comma,
            "." => TokenKind::Dot,
            ";" => TokenKind::Semicolon,
            "(" => TokenKind::LParen,
            ")" => TokenKind::RParen,
            "[" => TokenKind::LBracket,
            "]" => TokenKind::RBracket,
            "{" => TokenKind::LBrace,
            "}" => TokenKind::RBrace,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    pub kind: TokenKind<'a>,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind<'a>, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn kind(&self) -> &TokenKind<'a> {
        &self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

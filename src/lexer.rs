use std::{iter::Peekable, str::CharIndices};

use crate::token::{Span, Token, TokenKind};

pub mod error;

pub use self::error::{LexError, LexResult};

pub struct Lexer<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    indent_stack: Vec<usize>,
    pending_tokens: Vec<Token<'a>>,
    brackets: Vec<char>,
    at_line_start: bool,
    line_has_content: bool,
    eof_reached: bool,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
            indent_stack: vec![0],
            pending_tokens: Vec::new(),
            brackets: Vec::new(),
            at_line_start: true,
            line_has_content: false,
            eof_reached: false,
            line: 1,
            column: 0,
        }
    }

    pub fn next_token(&mut self) -> LexResult<Token<'a>> {
        let token = self.scan()?;
        self.line_has_content = !matches!(
            token.kind,
            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::EOF
        );
        Ok(token)
    }

    fn scan(&mut self) -> LexResult<Token<'a>> {
        if let Some(token) = self.pending_tokens.pop() {
            return Ok(token);
        }

        if self.eof_reached {
            return Ok(Token::new(TokenKind::EOF, self.empty_span()));
        }

        if self.at_line_start && self.brackets.is_empty() {
            self.at_line_start = false;
            if let Some(token) = self.handle_indentation()? {
                return Ok(token);
            }
        }

        self.skip_trivia()?;

        let Some(&(start, ch)) = self.chars.peek() else {
            return self.finish();
        };
        let line = self.line;
        let column = self.column;

        match ch {
            '\n' => {
                self.advance_char();
                self.at_line_start = true;
                Ok(Token::new(
                    TokenKind::Newline,
                    Span {
                        start,
                        end: start + 1,
                        line,
                        column,
                    },
                ))
            }
            '"' | '\'' => self.read_string(start, line, column, ""),
            c if c.is_alphabetic() || c == '_' => self.read_word(start, line, column),
            c if c.is_ascii_digit() => self.read_number(start, line, column),
            '.' if self.peek_second().is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start, line, column)
            }
            _ => self.read_operator(start, line, column),
        }
    }

    /// Emits the closing newline and dedents once input runs out.
    fn finish(&mut self) -> LexResult<Token<'a>> {
        self.eof_reached = true;
        if let Some(&open) = self.brackets.last() {
            return Err(LexError::UnbalancedBracket {
                character: open,
                line: self.line,
                column: self.column,
            });
        }

        let span = self.empty_span();
        let mut tail = Vec::new();
        if self.line_has_content {
            tail.push(Token::new(TokenKind::Newline, span));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tail.push(Token::new(TokenKind::Dedent, span));
        }
        self.pending_tokens.extend(tail.into_iter().rev());

        Ok(self
            .pending_tokens
            .pop()
            .unwrap_or_else(|| Token::new(TokenKind::EOF, span)))
    }

    fn handle_indentation(&mut self) -> LexResult<Option<Token<'a>>> {
        let mut lookahead = self.chars.clone();
        let mut width = 0;
        loop {
            match lookahead.peek() {
                Some(&(_, ' ')) => {
                    width += 1;
                    lookahead.next();
                }
                Some(&(_, '\r')) => {
                    lookahead.next();
                }
                Some(&(_, '\t')) => return Err(LexError::TabIndentation { line: self.line }),
                // Blank and comment-only lines never change indentation.
                Some(&(_, '\n' | '#')) | None => return Ok(None),
                Some(_) => break,
            }
        }

        for _ in 0..width {
            self.advance_char();
        }

        let current = self.current_indent();
        let span = self.empty_span();
        if width > current {
            self.indent_stack.push(width);
            return Ok(Some(Token::new(TokenKind::Indent, span)));
        }
        if width < current {
            while let Some(&top) = self.indent_stack.last() {
                if top > width {
                    self.indent_stack.pop();
                    self.pending_tokens.push(Token::new(TokenKind::Dedent, span));
                } else {
                    break;
                }
            }
            if self.current_indent() != width {
                return Err(LexError::InvalidDedent {
                    indent_level: width,
                    line: self.line,
                    column: self.column,
                });
            }
            return Ok(self.pending_tokens.pop());
        }
        Ok(None)
    }

    fn skip_trivia(&mut self) -> LexResult<()> {
        while let Some(&(_, c)) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\x0c' => {
                    self.advance_char();
                }
                '#' => {
                    while let Some(&(_, c)) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance_char();
                    }
                }
                '\\' => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    while let Some(&(_, '\r')) = lookahead.peek() {
                        lookahead.next();
                    }
                    if !matches!(lookahead.peek(), Some(&(_, '\n'))) {
                        return Err(LexError::UnexpectedCharacter {
                            character: '\\',
                            line: self.line,
                            column: self.column,
                        });
                    }
                    while let Some((_, c)) = self.advance_char() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                '\n' if !self.brackets.is_empty() => {
                    self.advance_char();
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn read_word(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        self.advance_char(); // Consume first char
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }

        let end = self.current_index();
        let word = &self.input[start..end];

        if matches!(self.chars.peek(), Some(&(_, '"' | '\''))) && is_string_prefix(word) {
            return self.read_string(start, line, column, word);
        }

        let kind = TokenKind::keyword(word).unwrap_or(TokenKind::Identifier(word));
        Ok(Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        ))
    }

    fn read_number(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        let radix = if self.chars.peek().is_some_and(|&(_, c)| c == '0') {
            match self.peek_second() {
                Some('x' | 'X') => Some(16),
                Some('o' | 'O') => Some(8),
                Some('b' | 'B') => Some(2),
                _ => None,
            }
        } else {
            None
        };

        if let Some(radix) = radix {
            self.advance_char();
            self.advance_char();
            while let Some(&(_, c)) = self.chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    self.advance_char();
                } else {
                    break;
                }
            }
            let end = self.current_index();
            let literal = &self.input[start..end];
            let digits = literal[2..].replace('_', "");
            let value = i64::from_str_radix(&digits, radix).map_err(|_| {
                LexError::InvalidIntegerLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                }
            })?;
            return Ok(Token::new(
                TokenKind::Integer(value),
                Span {
                    start,
                    end,
                    line,
                    column,
                },
            ));
        }

        let mut is_float = false;
        self.consume_digits();
        if self.chars.peek().is_some_and(|&(_, c)| c == '.') {
            is_float = true;
            self.advance_char();
            self.consume_digits();
        }
        if self.chars.peek().is_some_and(|&(_, c)| c == 'e' || c == 'E') {
            let sign_or_digit = self.peek_second();
            if sign_or_digit.is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-') {
                is_float = true;
                self.advance_char();
                if self.chars.peek().is_some_and(|&(_, c)| c == '+' || c == '-') {
                    self.advance_char();
                }
                self.consume_digits();
            }
        }

        let end = self.current_index();
        let literal = &self.input[start..end];
        let cleaned = literal.replace('_', "");
        let kind = if is_float {
            let value = cleaned
                .parse::<f64>()
                .map_err(|_| LexError::InvalidFloatLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                })?;
            TokenKind::Float(value)
        } else {
            let value = cleaned
                .parse::<i64>()
                .map_err(|_| LexError::InvalidIntegerLiteral {
                    literal: literal.to_string(),
                    line,
                    column,
                })?;
            TokenKind::Integer(value)
        };
        Ok(Token::new(
            kind,
            Span {
                start,
                end,
                line,
                column,
            },
        ))
    }

    fn consume_digits(&mut self) {
        while let Some(&(_, c)) = self.chars.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.advance_char();
            } else {
                break;
            }
        }
    }

    fn read_string(
        &mut self,
        start: usize,
        line: usize,
        column: usize,
        prefix: &str,
    ) -> LexResult<Token<'a>> {
        let prefix = prefix.to_ascii_lowercase();
        let raw = prefix.contains('r');
        let unterminated = LexError::UnterminatedString { line, column };

        let Some((_, quote)) = self.advance_char() else {
            return Err(unterminated);
        };
        let triple = self.peek_run(quote, 2);
        if triple {
            self.advance_char();
            self.advance_char();
        }

        let mut value = String::new();
        loop {
            let Some((_, c)) = self.advance_char() else {
                return Err(unterminated);
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek_run(quote, 2) {
                    self.advance_char();
                    self.advance_char();
                    break;
                }
                value.push(c);
                continue;
            }
            if c == '\n' && !triple {
                return Err(unterminated);
            }
            if c == '\\' {
                if raw {
                    value.push('\\');
                    if let Some((_, next)) = self.advance_char() {
                        value.push(next);
                    }
                } else {
                    self.read_escape(&mut value)?;
                }
                continue;
            }
            value.push(c);
        }

        let kind = if prefix.contains('f') {
            TokenKind::FString(value)
        } else if prefix.contains('b') {
            TokenKind::Bytes(value)
        } else {
            TokenKind::String(value)
        };
        Ok(Token::new(
            kind,
            Span {
                start,
                end: self.current_index(),
                line,
                column,
            },
        ))
    }

    fn read_escape(&mut self, value: &mut String) -> LexResult<()> {
        let line = self.line;
        let column = self.column;
        let Some((_, escaped)) = self.advance_char() else {
            return Err(LexError::UnterminatedString { line, column });
        };
        match escaped {
            'n' => value.push('\n'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            '0' => value.push('\0'),
            'a' => value.push('\x07'),
            'b' => value.push('\x08'),
            'f' => value.push('\x0c'),
            'v' => value.push('\x0b'),
            '\\' => value.push('\\'),
            '\'' => value.push('\''),
            '"' => value.push('"'),
            '\n' => {}
            'x' | 'u' | 'U' => {
                let width = match escaped {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut digits = String::new();
                for _ in 0..width {
                    match self.chars.peek() {
                        Some(&(_, c)) if c.is_ascii_hexdigit() => {
                            digits.push(c);
                            self.advance_char();
                        }
                        _ => break,
                    }
                }
                let decoded = u32::from_str_radix(&digits, 16)
                    .ok()
                    .filter(|_| digits.len() == width)
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => value.push(ch),
                    None => {
                        return Err(LexError::InvalidEscape {
                            sequence: format!("{escaped}{digits}"),
                            line,
                            column,
                        });
                    }
                }
            }
            other => {
                value.push('\\');
                value.push(other);
            }
        }
        Ok(())
    }

    fn read_operator(&mut self, start: usize, line: usize, column: usize) -> LexResult<Token<'a>> {
        let rest = &self.input[start..];
        for width in [3, 2, 1] {
            let Some(text) = rest.get(..width) else {
                continue;
            };
            let Some(kind) = TokenKind::operator(text) else {
                continue;
            };
            for _ in 0..width {
                self.advance_char();
            }
            self.track_bracket(text, line, column)?;
            return Ok(Token::new(
                kind,
                Span {
                    start,
                    end: start + width,
                    line,
                    column,
                },
            ));
        }

        let character = rest.chars().next().unwrap_or('\0');
        Err(LexError::UnexpectedCharacter {
            character,
            line,
            column,
        })
    }

    fn track_bracket(&mut self, text: &str, line: usize, column: usize) -> LexResult<()> {
        let expected_open = match text {
            "(" | "[" | "{" => {
                self.brackets.extend(text.chars());
                return Ok(());
            }
            ")" => '(',
            "]" => '[',
            "}" => '{',
            _ => return Ok(()),
        };
        if self.brackets.pop() != Some(expected_open) {
            return Err(LexError::UnbalancedBracket {
                character: text.chars().next().unwrap_or(expected_open),
                line,
                column,
            });
        }
        Ok(())
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = LexResult<Token<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_token())
    }
}

impl<'a> Lexer<'a> {
    fn advance_char(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_second(&self) -> Option<char> {
        let mut lookahead = self.chars.clone();
        lookahead.next();
        lookahead.next().map(|(_, c)| c)
    }

    fn peek_run(&self, expected: char, count: usize) -> bool {
        let mut lookahead = self.chars.clone();
        (0..count).all(|_| lookahead.next().is_some_and(|(_, c)| c == expected))
    }

    fn current_indent(&self) -> usize {
        self.indent_stack.last().copied().unwrap_or(0)
    }

    fn current_index(&mut self) -> usize {
        self.chars
            .peek()
            .map(|(idx, _)| *idx)
            .unwrap_or(self.input.len())
    }

    fn empty_span(&mut self) -> Span {
        let index = self.current_index();
        Span {
            start: index,
            end: index,
            line: self.line,
            column: self.column,
        }
    }
}

fn is_string_prefix(word: &str) -> bool {
    matches!(
        word.to_ascii_lowercase().as_str(),
        "r" | "u" | "f" | "b" | "rb" | "br" | "fr" | "rf"
    )
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

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn kinds(input: &str) -> Vec<TokenKind<'_>> {
        tokenize(input)
            .expect("tokenize should succeed")
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn test_simple_program() {
        let input = indoc! {"
            def fn(n: int) -> int:
                n += 4
                return n
            fn(1)
        "};
        let expected_tokens = vec![
            TokenKind::Def,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::Identifier("n"),
            TokenKind::Colon,
            TokenKind::Identifier("int"),
            TokenKind::RParen,
            TokenKind::Arrow,
            TokenKind::Identifier("int"),
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Identifier("n"),
            TokenKind::PlusEqual,
            TokenKind::Integer(4),
            TokenKind::Newline,
            TokenKind::Return,
            TokenKind::Identifier("n"),
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Identifier("fn"),
            TokenKind::LParen,
            TokenKind::Integer(1),
            TokenKind::RParen,
            TokenKind::Newline,
            TokenKind::EOF,
        ];
        assert_eq!(kinds(input), expected_tokens);
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let input = "xs = [\n    1,\n    2,\n]\n";
        assert_eq!(
            kinds(input),
            vec![
                TokenKind::Identifier("xs"),
                TokenKind::Equal,
                TokenKind::LBracket,
                TokenKind::Integer(1),
                TokenKind::Comma,
                TokenKind::Integer(2),
                TokenKind::Comma,
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn comment_lines_keep_indentation() {
        let input = indoc! {"
            if x:
                # note
                y = 1

            # trailing
            z = 2
        "};
        let kinds = kinds(input);
        let indents = kinds.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = kinds.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 1);
        assert_eq!(dedents, 1);
    }

    #[test]
    fn adds_newline_and_dedents_at_eof() {
        assert_eq!(
            kinds("if x:\n    pass"),
            vec![
                TokenKind::If,
                TokenKind::Identifier("x"),
                TokenKind::Colon,
                TokenKind::Newline,
                TokenKind::Indent,
                TokenKind::Pass,
                TokenKind::Newline,
                TokenKind::Dedent,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn reads_numbers() {
        assert_eq!(
            kinds("0x1F 1_000 2.5 .5 1e3 0b101\n"),
            vec![
                TokenKind::Integer(31),
                TokenKind::Integer(1000),
                TokenKind::Float(2.5),
                TokenKind::Float(0.5),
                TokenKind::Float(1000.0),
                TokenKind::Integer(5),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn reads_string_forms() {
        assert_eq!(
            kinds("'a\\tb' r'\\n' f\"x={x}\" b'hi' \"\"\"one\ntwo\"\"\"\n"),
            vec![
                TokenKind::String("a\tb".to_string()),
                TokenKind::String("\\n".to_string()),
                TokenKind::FString("x={x}".to_string()),
                TokenKind::Bytes("hi".to_string()),
                TokenKind::String("one\ntwo".to_string()),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn backslash_joins_lines() {
        assert_eq!(
            kinds("x = 1 + \\\n    2\n"),
            vec![
                TokenKind::Identifier("x"),
                TokenKind::Equal,
                TokenKind::Integer(1),
                TokenKind::Plus,
                TokenKind::Integer(2),
                TokenKind::Newline,
                TokenKind::EOF,
            ]
        );
    }

    #[test]
    fn errors_on_invalid_character() {
        let err = tokenize("x = 1 $ 2\n").expect_err("expected lexing failure");
        assert!(err.to_string().contains("Unexpected character '$'"));
    }

    #[test]
    fn errors_on_integer_overflow() {
        let err = tokenize("n = 99999999999999999999999999\n").expect_err("expected overflow");
        assert!(err.to_string().contains("Invalid integer literal"));
    }

    #[test]
    fn errors_on_tab_indentation() {
        let err = tokenize("if x:\n\tpass\n").expect_err("expected tab failure");
        assert_eq!(err, LexError::TabIndentation { line: 2 });
    }

    #[test]
    fn errors_on_inconsistent_dedent() {
        let err = tokenize("if x:\n    a = 1\n  b = 2\n").expect_err("expected dedent failure");
        assert!(matches!(err, LexError::InvalidDedent { indent_level: 2, .. }));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("s = 'abc\n").expect_err("expected unterminated string");
        assert!(matches!(err, LexError::UnterminatedString { line: 1, .. }));
    }

    #[test]
    fn errors_on_unbalanced_bracket() {
        let err = tokenize("x = (1]\n").expect_err("expected bracket mismatch");
        assert!(matches!(err, LexError::UnbalancedBracket { character: ']', .. }));
    }
}

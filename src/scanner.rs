// A lexeme is the raw slice of source text; a token pairs a lexeme with its
// category (and, for literals, a parsed value).

use crate::diagnostics::Diagnostics;
use crate::token::{Token, TokenType, KEYWORDS};

pub struct Scanner<'d> {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Scanner<'d> {
    pub fn new(source: &str, diagnostics: &'d mut Diagnostics) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            diagnostics,
        }
    }

    #[tracing::instrument(skip(self), level = "trace")]
    pub fn scan_tokens(mut self) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        self.tokens
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),

            '!' => {
                let tt = if self.matches('=') {
                    TokenType::BangEqual
                } else {
                    TokenType::Bang
                };
                self.add_token(tt);
            }
            '=' => {
                let tt = if self.matches('=') {
                    TokenType::EqualEqual
                } else {
                    TokenType::Equal
                };
                self.add_token(tt);
            }
            '<' => {
                let tt = if self.matches('=') {
                    TokenType::LessEqual
                } else {
                    TokenType::Less
                };
                self.add_token(tt);
            }
            '>' => {
                let tt = if self.matches('=') {
                    TokenType::GreaterEqual
                } else {
                    TokenType::Greater
                };
                self.add_token(tt);
            }

            '/' => {
                if self.matches('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            ' ' | '\t' | '\r' => (),
            '\n' => self.line += 1,

            '"' => self.string(),

            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => self.identifier(),

            c => self
                .diagnostics
                .error(self.line, &format!("Unexpected character {c}")),
        }
    }

    fn string(&mut self) {
        let start_line = self.line;
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.diagnostics.error(start_line, "Unterminated string");
            return;
        }

        // the closing quote
        self.advance();

        let literal: String = self.source[(self.start + 1)..(self.current - 1)]
            .iter()
            .collect();
        self.add_token(TokenType::String { literal });
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // A trailing '.' with no digit after it is not part of the number —
        // `1.` parses as `1` followed by a `.` token.
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let literal: f64 = text.parse().expect("scanned number lexeme must parse");
        self.add_token(TokenType::Number { literal });
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let token_type = KEYWORDS.get(text.as_str()).cloned().unwrap_or(TokenType::Identifier);
        self.add_token(token_type);
    }

    fn advance(&mut self) -> char {
        let c = self.source[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn matches(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(token_type, &text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(src: &str) -> Vec<Token> {
        let mut diagnostics = Diagnostics::new();
        let tokens = Scanner::new(src, &mut diagnostics).scan_tokens();
        assert!(!diagnostics.had_error, "unexpected scan error for {src:?}");
        tokens
    }

    #[test]
    fn single_and_double_char_operators() {
        let tokens = scan("!= == <= >= < > ! =");
        let kinds: Vec<_> = tokens.iter().map(|t| t.token_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Bang,
                TokenType::Equal,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn line_comment_is_skipped() {
        let tokens = scan("1 // comment\n2");
        assert_eq!(tokens.len(), 3); // 1, 2, EOF
    }

    #[test]
    fn number_with_trailing_dot_is_not_consumed() {
        let tokens = scan("123.");
        match &tokens[0].token_type {
            TokenType::Number { literal } => assert_eq!(*literal, 123.0),
            other => panic!("expected number, got {other:?}"),
        }
        assert_eq!(tokens[1].token_type, TokenType::Dot);
    }

    #[test]
    fn string_spans_newlines_and_bumps_line_count() {
        let tokens = scan("\"a\nb\" 1");
        match &tokens[0].token_type {
            TokenType::String { literal } => assert_eq!(literal, "a\nb"),
            other => panic!("expected string, got {other:?}"),
        }
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn unterminated_string_reports_error() {
        let mut diagnostics = Diagnostics::new();
        Scanner::new("\"abc", &mut diagnostics).scan_tokens();
        assert!(diagnostics.had_error);
    }

    #[test]
    fn keywords_are_recognized() {
        let tokens = scan("class this super");
        assert_eq!(tokens[0].token_type, TokenType::Class);
        assert_eq!(tokens[1].token_type, TokenType::This);
        assert_eq!(tokens[2].token_type, TokenType::Super);
    }
}

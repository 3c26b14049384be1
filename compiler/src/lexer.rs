//! Character stream to token stream.
//!
//! The lexer owns nothing about how source text is stored; it only needs a
//! [`CharSource`] that can read and peek one character at a time. Lines and
//! columns are 1-indexed: `column` counts characters consumed on the
//! current line and resets to 0 the instant a newline is consumed.

use crate::error::LexError;
use crate::source::CharSource;
use crate::token::{keyword_kind, Token, TokenKind};

pub struct Lexer<S: CharSource> {
    source: S,
    line: usize,
    column: usize,
}

impl<S: CharSource> Lexer<S> {
    pub fn new(source: S) -> Self {
        Lexer {
            source,
            line: 1,
            column: 0,
        }
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.source.read_char();
        if let Some(c) = c {
            if c == '\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn peek(&self) -> Option<char> {
        self.source.peek_char()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.advance();
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace();

        let start_line = self.line;
        let start_col = self.column + 1;

        let Some(c) = self.advance() else {
            return Ok(Token::new(TokenKind::Eos, "", start_line, start_col));
        };

        match c {
            '.' => self.simple(TokenKind::Dot, ".", start_line, start_col),
            ',' => self.simple(TokenKind::Comma, ",", start_line, start_col),
            '(' => self.simple(TokenKind::LParen, "(", start_line, start_col),
            ')' => self.simple(TokenKind::RParen, ")", start_line, start_col),
            '[' => self.simple(TokenKind::LBracket, "[", start_line, start_col),
            ']' => self.simple(TokenKind::RBracket, "]", start_line, start_col),
            '{' => self.simple(TokenKind::LBrace, "{", start_line, start_col),
            '}' => self.simple(TokenKind::RBrace, "}", start_line, start_col),
            ';' => self.simple(TokenKind::Semicolon, ";", start_line, start_col),
            '+' => self.simple(TokenKind::Plus, "+", start_line, start_col),
            '-' => self.simple(TokenKind::Minus, "-", start_line, start_col),
            '*' => self.simple(TokenKind::Times, "*", start_line, start_col),
            '/' => self.divide_or_comment(start_line, start_col),
            '=' => self.one_or_two(c, '=', TokenKind::Assign, TokenKind::Equal, start_line, start_col),
            '!' => self.bang(start_line, start_col),
            '<' => self.one_or_two(c, '=', TokenKind::Less, TokenKind::LessEq, start_line, start_col),
            '>' => self.one_or_two(c, '=', TokenKind::Greater, TokenKind::GreaterEq, start_line, start_col),
            '"' => self.string_literal(start_line, start_col),
            c if c.is_ascii_digit() => self.number(c, start_line, start_col),
            c if c.is_alphabetic() => self.identifier(c, start_line, start_col),
            other => Err(LexError::new(
                format!("Unexpected character {other} "),
                start_line,
                start_col,
            )),
        }
    }

    fn simple(
        &self,
        kind: TokenKind,
        lexeme: &str,
        line: usize,
        col: usize,
    ) -> Result<Token, LexError> {
        Ok(Token::new(kind, lexeme, line, col))
    }

    fn divide_or_comment(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        if self.peek() == Some('/') {
            self.advance();
            let mut lexeme = String::from("//");
            while let Some(c) = self.peek() {
                if c == '\n' {
                    break;
                }
                lexeme.push(c);
                self.advance();
            }
            Ok(Token::new(TokenKind::Comment, lexeme, line, col))
        } else {
            Ok(Token::new(TokenKind::Divide, "/", line, col))
        }
    }

    fn one_or_two(
        &mut self,
        first: char,
        second: char,
        one: TokenKind,
        two: TokenKind,
        line: usize,
        col: usize,
    ) -> Result<Token, LexError> {
        if self.peek() == Some(second) {
            self.advance();
            Ok(Token::new(two, format!("{first}{second}"), line, col))
        } else {
            Ok(Token::new(one, first.to_string(), line, col))
        }
    }

    fn bang(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        if self.peek() == Some('=') {
            self.advance();
            Ok(Token::new(TokenKind::NotEqual, "!=", line, col))
        } else {
            Err(LexError::new("Unexpected character ! ", line, col))
        }
    }

    fn string_literal(&mut self, line: usize, col: usize) -> Result<Token, LexError> {
        let mut lexeme = String::new();
        loop {
            match self.peek() {
                None => return Err(LexError::new("Nonterminated string", line, col)),
                Some('\n') => return Err(LexError::new("Cannot have multi-line string!", line, col)),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    lexeme.push(c);
                    self.advance();
                }
            }
        }
        Ok(Token::new(TokenKind::StringVal, lexeme, line, col))
    }

    fn number(&mut self, first: char, line: usize, col: usize) -> Result<Token, LexError> {
        let mut lexeme = String::from(first);
        let mut is_double = false;

        if first == '0' && matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            return Err(LexError::new(
                "Number values may not have leading zeroes!",
                line,
                col,
            ));
        }

        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            lexeme.push(self.advance().unwrap());
        }

        if self.peek() == Some('.') {
            is_double = true;
            lexeme.push(self.advance().unwrap());
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(LexError::new(
                    "Cannot end decimal value with non-numeric character.",
                    line,
                    col,
                ));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                lexeme.push(self.advance().unwrap());
            }
        }

        let kind = if is_double {
            TokenKind::DoubleVal
        } else {
            TokenKind::IntVal
        };
        Ok(Token::new(kind, lexeme, line, col))
    }

    fn identifier(&mut self, first: char, line: usize, col: usize) -> Result<Token, LexError> {
        let mut lexeme = String::from(first);
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            lexeme.push(self.advance().unwrap());
        }

        let kind = match keyword_kind(&lexeme) {
            Some(TokenKind::True) | Some(TokenKind::False) => TokenKind::BoolVal,
            Some(TokenKind::Null) => TokenKind::NullVal,
            Some(k) => k,
            None => TokenKind::Id,
        };
        Ok(Token::new(kind, lexeme, line, col))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StrSource;

    fn lex_all(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(StrSource::new(src));
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token().unwrap();
            let done = tok.kind == TokenKind::Eos;
            tokens.push(tok);
            if done {
                break;
            }
        }
        tokens
    }

    #[test]
    fn lexes_simple_program() {
        let tokens = lex_all("void main() { print(\"hi\"); }");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Void,
                TokenKind::Id,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::LBrace,
                TokenKind::Id,
                TokenKind::LParen,
                TokenKind::StringVal,
                TokenKind::RParen,
                TokenKind::Semicolon,
                TokenKind::RBrace,
                TokenKind::Eos,
            ]
        );
    }

    #[test]
    fn tracks_line_and_column() {
        let tokens = lex_all("a\nb");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[0].column, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[1].column, 1);
    }

    #[test]
    fn rejects_bare_bang() {
        let mut lexer = Lexer::new(StrSource::new("!"));
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn rejects_multiline_string() {
        let mut lexer = Lexer::new(StrSource::new("\"a\nb\""));
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn rejects_leading_zero() {
        let mut lexer = Lexer::new(StrSource::new("007"));
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn rejects_trailing_dot() {
        let mut lexer = Lexer::new(StrSource::new("1.x"));
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn parses_double_literal() {
        let tokens = lex_all("3.14");
        assert_eq!(tokens[0].kind, TokenKind::DoubleVal);
        assert_eq!(tokens[0].lexeme, "3.14");
    }

    #[test]
    fn line_comment_is_its_own_token() {
        let tokens = lex_all("// a comment\nx");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[1].kind, TokenKind::Id);
    }

    #[test]
    fn compound_operators() {
        let tokens = lex_all("== != <= >= < > = / ");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Equal,
                TokenKind::NotEqual,
                TokenKind::LessEq,
                TokenKind::GreaterEq,
                TokenKind::Less,
                TokenKind::Greater,
                TokenKind::Assign,
                TokenKind::Divide,
                TokenKind::Eos,
            ]
        );
    }
}

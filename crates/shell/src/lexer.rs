// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Tokenizer for the script language, generated by logos.
//!
//! Newlines and `;` both end a statement, `//` starts a comment, and a
//! doubled `""` inside a string literal is one quote character.

use crate::error::{Result, ScriptError};
use logos::{Logos, Span};

#[derive(Debug, Clone, PartialEq, Default)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    BadNumber,
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"[ \t\r]+")]
pub enum Token {
    // Literals
    #[regex(r"[0-9]+(\.[0-9]*)?|\.[0-9]+", lex_number)]
    Number(f64),

    #[regex(r#""([^"\n]|"")*""#, lex_string)]
    Str(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", lex_ident)]
    Ident(String),

    // Keywords (exact matches win over Ident)
    #[token("if")]
    If,
    #[token("then")]
    Then,
    #[token("else")]
    Else,
    #[token("end")]
    End,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,
    #[token("function")]
    Function,
    #[token("return")]
    Return,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("null")]
    Null,
    #[token("true")]
    True,
    #[token("false")]
    False,

    // Operators
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("^")]
    Caret,
    #[token("=")]
    Assign,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("@")]
    At,

    // Delimiters
    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,
    #[token("\n")]
    #[token(";")]
    Newline,

    #[regex(r"//[^\n]*", allow_greedy = true)]
    Comment,

    /// Appended after the last token; never lexed
    Eof,
}

fn lex_number(lex: &mut logos::Lexer<Token>) -> std::result::Result<f64, LexError> {
    lex.slice().parse().map_err(|_| LexError::BadNumber)
}

fn lex_string(lex: &mut logos::Lexer<Token>) -> String {
    let s = lex.slice();
    s[1..s.len() - 1].replace("\"\"", "\"")
}

fn lex_ident(lex: &mut logos::Lexer<Token>) -> String {
    lex.slice().to_string()
}

/// A token, the source line it starts on and its byte span
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    pub token: Token,
    pub line: usize,
    pub span: Span,
}

fn lex_error(err: LexError, text: &str, line: usize) -> ScriptError {
    match err {
        LexError::BadNumber => ScriptError::compile(line, format!("bad number '{text}'")),
        LexError::UnexpectedCharacter if text.starts_with('"') => {
            ScriptError::compile(line, "unterminated string")
        }
        LexError::UnexpectedCharacter => {
            let ch = text.chars().next().unwrap_or(' ');
            ScriptError::compile(line, format!("unexpected character '{ch}'"))
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Lexeme>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut counted = 0;

    for (result, span) in Token::lexer(source).spanned() {
        line += source[counted..span.start].matches('\n').count();
        counted = span.start;
        let token = result.map_err(|err| lex_error(err, &source[span.clone()], line))?;
        if token != Token::Comment {
            tokens.push(Lexeme { token, line, span });
        }
    }

    line += source[counted..].matches('\n').count();
    tokens.push(Lexeme {
        token: Token::Eof,
        line,
        span: source.len()..source.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|l| l.token).collect()
    }

    #[test]
    fn test_assignment_line() {
        assert_eq!(
            kinds("x = 3.5 // comment"),
            vec![
                Token::Ident("x".into()),
                Token::Assign,
                Token::Number(3.5),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_strings_and_keywords() {
        assert_eq!(
            kinds("if a != \"say \"\"hi\"\"\" then"),
            vec![
                Token::If,
                Token::Ident("a".into()),
                Token::BangEqual,
                Token::Str("say \"hi\"".into()),
                Token::Then,
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(
            kinds("iffy <= .5"),
            vec![
                Token::Ident("iffy".into()),
                Token::LessEqual,
                Token::Number(0.5),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_line_numbers_and_spans() {
        let lexemes = tokenize("a\nb; c").unwrap();
        let lines: Vec<usize> = lexemes.iter().map(|l| l.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 2, 2, 2]);
        assert_eq!(lexemes[2].span, 2..3);
        assert_eq!(lexemes[5].span, 6..6);
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            tokenize("x = \"open").unwrap_err(),
            ScriptError::compile(1, "unterminated string")
        );
        assert_eq!(
            tokenize("x = 1\ny = 1 # 2").unwrap_err(),
            ScriptError::compile(2, "unexpected character '#'")
        );
    }
}
